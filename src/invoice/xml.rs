//! XML composition for invoices.
//!
//! The composer renders the element tree for the invoice's schema version
//! through serde `Serialize` impls driven by quick-xml. Optional fields are
//! emitted from fixed per-call-site tables; a field with no value produces no
//! tag at all.
use super::{
    InvoiceHeader, LineItem, Party, PartyName, PaymentMethod, TaxRate, TaxTotals, ValidationError,
};
use crate::schema::SchemaConfig;

use helpers::{EmptyElement, FixedDecimal, currency_amount, emit_optional_fields};
use quick_xml::se::{SeError, Serializer as QuickXmlSerializer};
use serde::ser::{Serialize, SerializeStruct, Serializer};
use thiserror::Error;

pub(crate) mod constants;

/// Composition error.
#[derive(Debug, Error)]
pub enum ComposeError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("failed to serialize invoice to XML: {source}")]
    Serialize {
        #[from]
        source: SeError,
    },
    #[error("failed to parse composed document: {0}")]
    Parse(String),
}

mod helpers {
    use rust_decimal::Decimal;
    use serde::ser::{Serialize, SerializeStruct, Serializer};
    use std::fmt::{self, Display, Formatter};

    pub(super) struct FixedDecimal {
        value: Decimal,
        precision: usize,
    }

    impl FixedDecimal {
        pub(super) fn new(value: Decimal, precision: usize) -> Self {
            Self { value, precision }
        }
    }

    impl Display for FixedDecimal {
        fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
            write!(f, "{:.*}", self.precision, self.value)
        }
    }

    impl Serialize for FixedDecimal {
        fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            serializer.collect_str(self)
        }
    }

    struct CurrencyAmountSer<'a> {
        tag: &'static str,
        currency: &'a str,
        value: Decimal,
    }

    pub(super) fn currency_amount<'a>(
        tag: &'static str,
        currency: &'a str,
        value: Decimal,
    ) -> impl Serialize + 'a {
        CurrencyAmountSer {
            tag,
            currency,
            value,
        }
    }

    impl<'a> Serialize for CurrencyAmountSer<'a> {
        fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            let mut st = s.serialize_struct(self.tag, 2)?;
            st.serialize_field("@currencyID", self.currency)?;
            st.serialize_field("$text", &FixedDecimal::new(self.value, 2))?;
            st.end()
        }
    }

    /// Empty element with a fixed tag, e.g. `<cac:TaxScheme/>`.
    pub(super) struct EmptyElement(pub(super) &'static str);

    impl Serialize for EmptyElement {
        fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            let st = s.serialize_struct(self.0, 0)?;
            st.end()
        }
    }

    /// Emit each non-empty value of a fixed (tag, value) table as exactly one
    /// escaped element. Unset or empty values emit nothing.
    pub(super) fn emit_optional_fields<S: SerializeStruct>(
        st: &mut S,
        fields: &[(&'static str, Option<&str>)],
    ) -> Result<(), S::Error> {
        for &(tag, value) in fields {
            if let Some(value) = value {
                if !value.is_empty() {
                    st.serialize_field(tag, value)?;
                }
            }
        }
        Ok(())
    }
}

/// Complete invoice view handed to the composer after validation.
pub(crate) struct InvoiceDocument<'a> {
    pub(crate) schema: &'static SchemaConfig,
    pub(crate) header: &'a InvoiceHeader,
    pub(crate) seller: &'a Party,
    pub(crate) buyer: &'a Party,
    pub(crate) items: &'a [LineItem],
    pub(crate) legal_literals: &'a [String],
    pub(crate) totals: &'a TaxTotals,
}

/// Render the document with the XML declaration prepended. Compact output;
/// whitespace between elements would survive canonicalization.
pub(crate) fn render(document: &InvoiceDocument<'_>) -> Result<String, ComposeError> {
    let mut buffer = String::with_capacity(4096);
    buffer.push_str(constants::XML_PROLOG);
    buffer.push('\n');
    let serializer = QuickXmlSerializer::new(&mut buffer);
    document.serialize(serializer)?;
    Ok(buffer)
}

impl<'a> Serialize for InvoiceDocument<'a> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let header = self.header;
        let currency = header.currency_code();
        let mut root = serializer.serialize_struct("fe:Invoice", 0)?;

        for &(name, uri) in self.schema.namespaces {
            root.serialize_field(name, uri)?;
        }
        root.serialize_field("@xsi:schemaLocation", self.schema.schema_location)?;

        root.serialize_field(
            "ext:UBLExtensions",
            &UblExtensionsXml {
                header,
                schema: self.schema,
            },
        )?;

        root.serialize_field("cbc:UBLVersionID", self.schema.ubl_version)?;
        root.serialize_field("cbc:ProfileID", self.schema.profile_id)?;
        root.serialize_field("cbc:ID", &header.full_number())?;
        // Validation guarantees the issue date before composition.
        let issue_date = header.issue_date.unwrap_or_default();
        root.serialize_field("cbc:IssueDate", &issue_date.to_string())?;
        root.serialize_field(
            "cbc:IssueTime",
            &header.issue_time().format("%H:%M:%S").to_string(),
        )?;
        if self.schema.emits_due_date {
            if let Some(due_date) = header.due_date {
                root.serialize_field("cbc:DueDate", &due_date.to_string())?;
            }
        }
        if let Some(description) = header.description.as_deref() {
            if !description.is_empty() {
                root.serialize_field(
                    "cbc:Note",
                    &NoteXml {
                        language: header.language.as_deref(),
                        text: description,
                    },
                )?;
            }
        }
        root.serialize_field("cbc:DocumentCurrencyCode", currency)?;

        // Header cross-references: fixed optional-field table.
        emit_optional_fields(
            &mut root,
            &[
                ("cbc:FileReference", header.file_reference.as_deref()),
                (
                    "cbc:ReceiverTransactionReference",
                    header.receiver_transaction_reference.as_deref(),
                ),
                (
                    "cbc:ReceiverContractReference",
                    header.receiver_contract_reference.as_deref(),
                ),
            ],
        )?;

        if self.schema.emits_due_date {
            if let (Some(start), Some(end)) = (header.period_start, header.period_end) {
                root.serialize_field("cac:InvoicePeriod", &InvoicePeriodXml { start, end })?;
            }
        }

        root.serialize_field(
            "fe:AccountingSupplierParty",
            &AccountingPartyXml {
                account_id: "1",
                party: self.seller,
            },
        )?;
        root.serialize_field(
            "fe:AccountingCustomerParty",
            &AccountingPartyXml {
                account_id: "2",
                party: self.buyer,
            },
        )?;

        if let Some(method) = &header.payment_method {
            root.serialize_field(
                "cac:PaymentMeans",
                &PaymentMeansXml {
                    method,
                    due_date: header.due_date,
                },
            )?;
        }

        // Invoice-level tax blocks: outputs strictly before withholdings.
        for entry in self.totals.taxes_outputs() {
            root.serialize_field(
                "fe:TaxTotal",
                &TaxBlockXml {
                    currency,
                    withheld: false,
                    base: entry.base,
                    amount: entry.amount,
                    percent: entry.rate,
                    scheme_code: entry.tax_type.code(),
                },
            )?;
        }
        for entry in self.totals.taxes_withheld() {
            root.serialize_field(
                "fe:TaxTotal",
                &TaxBlockXml {
                    currency,
                    withheld: true,
                    base: entry.base,
                    amount: entry.amount,
                    percent: entry.rate,
                    scheme_code: entry.tax_type.code(),
                },
            )?;
        }

        root.serialize_field(
            "fe:LegalMonetaryTotal",
            &MonetaryTotalXml {
                currency,
                totals: self.totals,
            },
        )?;

        for (index, item) in self.items.iter().enumerate() {
            root.serialize_field(
                "fe:InvoiceLine",
                &InvoiceLineXml {
                    id: index + 1,
                    item,
                    currency,
                },
            )?;
        }

        if !self.legal_literals.is_empty() {
            root.serialize_field("fe:LegalLiterals", &LegalLiteralsXml(self.legal_literals))?;
        }

        root.end()
    }
}

struct UblExtensionsXml<'a> {
    header: &'a InvoiceHeader,
    schema: &'static SchemaConfig,
}

impl<'a> Serialize for UblExtensionsXml<'a> {
    fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut st = s.serialize_struct("ext:UBLExtensions", 0)?;
        if self.schema.requires_control_block {
            st.serialize_field("ext:UBLExtension", &ControlExtensionXml(self.header))?;
        }
        // Reserved slot for the enveloped signature.
        st.serialize_field("ext:UBLExtension", &SignatureSlotXml)?;
        st.end()
    }
}

struct SignatureSlotXml;

impl Serialize for SignatureSlotXml {
    fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut st = s.serialize_struct("ext:UBLExtension", 0)?;
        st.serialize_field("ext:ExtensionContent", &EmptyElement("ext:ExtensionContent"))?;
        st.end()
    }
}

struct ControlExtensionXml<'a>(&'a InvoiceHeader);

impl<'a> Serialize for ControlExtensionXml<'a> {
    fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut st = s.serialize_struct("ext:UBLExtension", 0)?;
        st.serialize_field("ext:ExtensionContent", &ControlContentXml(self.0))?;
        st.end()
    }
}

struct ControlContentXml<'a>(&'a InvoiceHeader);

impl<'a> Serialize for ControlContentXml<'a> {
    fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut st = s.serialize_struct("ext:ExtensionContent", 0)?;
        st.serialize_field("sts:DianExtensions", &DianExtensionsXml(self.0))?;
        st.end()
    }
}

/// Jurisdiction control block. Validation ensures every field is present
/// before the composer runs on a version that requires it.
struct DianExtensionsXml<'a>(&'a InvoiceHeader);

impl<'a> Serialize for DianExtensionsXml<'a> {
    fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let header = self.0;
        let mut st = s.serialize_struct("sts:DianExtensions", 0)?;
        st.serialize_field("sts:InvoiceControl", &InvoiceControlXml(header))?;
        st.serialize_field("sts:InvoiceSource", &InvoiceSourceXml(header))?;
        st.serialize_field("sts:SoftwareProvider", &SoftwareProviderXml(header))?;
        st.serialize_field(
            "sts:SoftwareSecurityCode",
            header.software_security_code.as_deref().unwrap_or(""),
        )?;
        st.end()
    }
}

struct InvoiceControlXml<'a>(&'a InvoiceHeader);

impl<'a> Serialize for InvoiceControlXml<'a> {
    fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let header = self.0;
        let mut st = s.serialize_struct("sts:InvoiceControl", 0)?;
        st.serialize_field(
            "sts:InvoiceAuthorization",
            header.authorization.as_deref().unwrap_or(""),
        )?;
        if let (Some(start), Some(end)) = (header.period_start, header.period_end) {
            st.serialize_field(
                "sts:AuthorizationPeriod",
                &AuthorizationPeriodXml { start, end },
            )?;
        }
        st.serialize_field("sts:AuthorizedInvoices", &AuthorizedInvoicesXml(header))?;
        st.end()
    }
}

struct AuthorizationPeriodXml {
    start: chrono::NaiveDate,
    end: chrono::NaiveDate,
}

impl Serialize for AuthorizationPeriodXml {
    fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut st = s.serialize_struct("sts:AuthorizationPeriod", 0)?;
        st.serialize_field("cbc:StartDate", &self.start.to_string())?;
        st.serialize_field("cbc:EndDate", &self.end.to_string())?;
        st.end()
    }
}

struct AuthorizedInvoicesXml<'a>(&'a InvoiceHeader);

impl<'a> Serialize for AuthorizedInvoicesXml<'a> {
    fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let header = self.0;
        let mut st = s.serialize_struct("sts:AuthorizedInvoices", 0)?;
        if let Some(prefix) = header.prefix.as_deref() {
            st.serialize_field("sts:Prefix", prefix)?;
        }
        if let Some(from) = header.range_from {
            st.serialize_field("sts:From", &from.to_string())?;
        }
        if let Some(to) = header.range_to {
            st.serialize_field("sts:To", &to.to_string())?;
        }
        st.end()
    }
}

struct InvoiceSourceXml<'a>(&'a InvoiceHeader);

impl<'a> Serialize for InvoiceSourceXml<'a> {
    fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut st = s.serialize_struct("sts:InvoiceSource", 0)?;
        st.serialize_field(
            "cbc:IdentificationCode",
            self.0.identification_code.as_deref().unwrap_or(""),
        )?;
        st.end()
    }
}

struct SoftwareProviderXml<'a>(&'a InvoiceHeader);

impl<'a> Serialize for SoftwareProviderXml<'a> {
    fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let header = self.0;
        let mut st = s.serialize_struct("sts:SoftwareProvider", 0)?;
        st.serialize_field("sts:ProviderID", header.provider_id.as_deref().unwrap_or(""))?;
        st.serialize_field("sts:SoftwareID", header.software_id.as_deref().unwrap_or(""))?;
        st.end()
    }
}

struct NoteXml<'a> {
    language: Option<&'a str>,
    text: &'a str,
}

impl<'a> Serialize for NoteXml<'a> {
    fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut st = s.serialize_struct("cbc:Note", 2)?;
        if let Some(language) = self.language {
            st.serialize_field("@languageID", language)?;
        }
        st.serialize_field("$text", self.text)?;
        st.end()
    }
}

struct InvoicePeriodXml {
    start: chrono::NaiveDate,
    end: chrono::NaiveDate,
}

impl Serialize for InvoicePeriodXml {
    fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut st = s.serialize_struct("cac:InvoicePeriod", 0)?;
        st.serialize_field("cbc:StartDate", &self.start.to_string())?;
        st.serialize_field("cbc:EndDate", &self.end.to_string())?;
        st.end()
    }
}

struct AccountingPartyXml<'a> {
    account_id: &'static str,
    party: &'a Party,
}

impl<'a> Serialize for AccountingPartyXml<'a> {
    fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let tag = match self.account_id {
            "1" => "fe:AccountingSupplierParty",
            _ => "fe:AccountingCustomerParty",
        };
        let mut st = s.serialize_struct(tag, 0)?;
        st.serialize_field("cbc:AdditionalAccountID", self.account_id)?;
        st.serialize_field("fe:Party", &PartyXml(self.party))?;
        st.end()
    }
}

struct PartyXml<'a>(&'a Party);

impl<'a> Serialize for PartyXml<'a> {
    fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let party = self.0;
        let mut st = s.serialize_struct("fe:Party", 0)?;
        st.serialize_field(
            "cac:PartyIdentification",
            &PartyIdentificationXml(party.tax_number()),
        )?;
        if let PartyName::LegalEntity { name } = party.name() {
            st.serialize_field("cac:PartyName", &PartyNameXml(name))?;
        }
        st.serialize_field("fe:PhysicalLocation", &PhysicalLocationXml(party.address()))?;
        st.serialize_field("fe:PartyTaxScheme", &PartyTaxSchemeXml)?;
        match party.name() {
            PartyName::LegalEntity { name } => {
                st.serialize_field("fe:PartyLegalEntity", &PartyLegalEntityXml(name))?;
            }
            PartyName::Individual {
                first_name,
                first_surname,
                last_surname,
            } => {
                st.serialize_field(
                    "fe:Person",
                    &PersonXml {
                        first_name,
                        first_surname,
                        last_surname,
                    },
                )?;
            }
        }
        st.end()
    }
}

struct PartyIdentificationXml<'a>(&'a str);

impl<'a> Serialize for PartyIdentificationXml<'a> {
    fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut st = s.serialize_struct("cac:PartyIdentification", 0)?;
        st.serialize_field("cbc:ID", self.0)?;
        st.end()
    }
}

struct PartyNameXml<'a>(&'a str);

impl<'a> Serialize for PartyNameXml<'a> {
    fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut st = s.serialize_struct("cac:PartyName", 0)?;
        st.serialize_field("cbc:Name", self.0)?;
        st.end()
    }
}

struct PhysicalLocationXml<'a>(&'a super::Address);

impl<'a> Serialize for PhysicalLocationXml<'a> {
    fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut st = s.serialize_struct("fe:PhysicalLocation", 0)?;
        st.serialize_field("fe:Address", &AddressXml(self.0))?;
        st.end()
    }
}

struct AddressXml<'a>(&'a super::Address);

impl<'a> Serialize for AddressXml<'a> {
    fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let address = self.0;
        let mut st = s.serialize_struct("fe:Address", 0)?;
        st.serialize_field("cbc:Department", &address.province)?;
        st.serialize_field("cbc:CityName", &address.town)?;
        st.serialize_field("cbc:PostalZone", &address.post_code)?;
        st.serialize_field("cac:AddressLine", &AddressLineXml(&address.street))?;
        st.serialize_field("cac:Country", &CountryXml(address.country.alpha2()))?;
        st.end()
    }
}

struct AddressLineXml<'a>(&'a str);

impl<'a> Serialize for AddressLineXml<'a> {
    fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut st = s.serialize_struct("cac:AddressLine", 0)?;
        st.serialize_field("cbc:Line", self.0)?;
        st.end()
    }
}

struct CountryXml<'a>(&'a str);

impl<'a> Serialize for CountryXml<'a> {
    fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut st = s.serialize_struct("cac:Country", 0)?;
        st.serialize_field("cbc:IdentificationCode", self.0)?;
        st.end()
    }
}

struct PartyTaxSchemeXml;

impl Serialize for PartyTaxSchemeXml {
    fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut st = s.serialize_struct("fe:PartyTaxScheme", 0)?;
        st.serialize_field("cbc:TaxLevelCode", "0")?;
        st.serialize_field("cac:TaxScheme", &EmptyElement("cac:TaxScheme"))?;
        st.end()
    }
}

struct PartyLegalEntityXml<'a>(&'a str);

impl<'a> Serialize for PartyLegalEntityXml<'a> {
    fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut st = s.serialize_struct("fe:PartyLegalEntity", 0)?;
        st.serialize_field("cbc:RegistrationName", self.0)?;
        st.end()
    }
}

struct PersonXml<'a> {
    first_name: &'a str,
    first_surname: &'a str,
    last_surname: &'a str,
}

impl<'a> Serialize for PersonXml<'a> {
    fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut st = s.serialize_struct("fe:Person", 0)?;
        st.serialize_field("cbc:FirstName", self.first_name)?;
        st.serialize_field("cbc:FamilyName", self.first_surname)?;
        st.serialize_field("cbc:MiddleName", self.last_surname)?;
        st.end()
    }
}

struct PaymentMeansXml<'a> {
    method: &'a PaymentMethod,
    due_date: Option<chrono::NaiveDate>,
}

impl<'a> Serialize for PaymentMeansXml<'a> {
    fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut st = s.serialize_struct("cac:PaymentMeans", 0)?;
        st.serialize_field("cbc:PaymentMeansCode", self.method.code())?;
        if let Some(due_date) = self.due_date {
            st.serialize_field("cbc:PaymentDueDate", &due_date.to_string())?;
        }
        if let Some(iban) = self.method.iban() {
            st.serialize_field("cac:PayeeFinancialAccount", &FinancialAccountXml(iban))?;
        }
        st.end()
    }
}

struct FinancialAccountXml<'a>(&'a str);

impl<'a> Serialize for FinancialAccountXml<'a> {
    fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut st = s.serialize_struct("cac:PayeeFinancialAccount", 0)?;
        st.serialize_field("cbc:ID", self.0)?;
        st.end()
    }
}

/// One `fe:TaxTotal` block, shared by the invoice level and the line level.
struct TaxBlockXml<'a> {
    currency: &'a str,
    withheld: bool,
    base: rust_decimal::Decimal,
    amount: rust_decimal::Decimal,
    percent: rust_decimal::Decimal,
    scheme_code: &'static str,
}

impl<'a> Serialize for TaxBlockXml<'a> {
    fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut st = s.serialize_struct("fe:TaxTotal", 0)?;
        st.serialize_field(
            "cbc:TaxAmount",
            &currency_amount("cbc:TaxAmount", self.currency, self.amount),
        )?;
        st.serialize_field(
            "cbc:TaxEvidenceIndicator",
            if self.withheld { "true" } else { "false" },
        )?;
        st.serialize_field(
            "fe:TaxSubtotal",
            &TaxSubtotalXml {
                currency: self.currency,
                base: self.base,
                amount: self.amount,
                percent: self.percent,
                scheme_code: self.scheme_code,
            },
        )?;
        st.end()
    }
}

struct TaxSubtotalXml<'a> {
    currency: &'a str,
    base: rust_decimal::Decimal,
    amount: rust_decimal::Decimal,
    percent: rust_decimal::Decimal,
    scheme_code: &'static str,
}

impl<'a> Serialize for TaxSubtotalXml<'a> {
    fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut st = s.serialize_struct("fe:TaxSubtotal", 0)?;
        st.serialize_field(
            "cbc:TaxableAmount",
            &currency_amount("cbc:TaxableAmount", self.currency, self.base),
        )?;
        st.serialize_field(
            "cbc:TaxAmount",
            &currency_amount("cbc:TaxAmount", self.currency, self.amount),
        )?;
        st.serialize_field("cbc:Percent", &FixedDecimal::new(self.percent, 2))?;
        st.serialize_field("cac:TaxCategory", &TaxCategoryXml(self.scheme_code))?;
        st.end()
    }
}

struct TaxCategoryXml(&'static str);

impl Serialize for TaxCategoryXml {
    fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut st = s.serialize_struct("cac:TaxCategory", 0)?;
        st.serialize_field("cac:TaxScheme", &TaxSchemeXml(self.0))?;
        st.end()
    }
}

struct TaxSchemeXml(&'static str);

impl Serialize for TaxSchemeXml {
    fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut st = s.serialize_struct("cac:TaxScheme", 0)?;
        st.serialize_field("cbc:ID", self.0)?;
        st.end()
    }
}

struct MonetaryTotalXml<'a> {
    currency: &'a str,
    totals: &'a TaxTotals,
}

impl<'a> Serialize for MonetaryTotalXml<'a> {
    fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut st = s.serialize_struct("fe:LegalMonetaryTotal", 0)?;
        st.serialize_field(
            "cbc:LineExtensionAmount",
            &currency_amount(
                "cbc:LineExtensionAmount",
                self.currency,
                self.totals.gross_amount(),
            ),
        )?;
        st.serialize_field(
            "cbc:TaxExclusiveAmount",
            &currency_amount(
                "cbc:TaxExclusiveAmount",
                self.currency,
                self.totals.gross_amount_before_taxes(),
            ),
        )?;
        st.serialize_field(
            "cbc:PayableAmount",
            &currency_amount(
                "cbc:PayableAmount",
                self.currency,
                self.totals.invoice_amount(),
            ),
        )?;
        st.end()
    }
}

struct InvoiceLineXml<'a> {
    id: usize,
    item: &'a LineItem,
    currency: &'a str,
}

impl<'a> Serialize for InvoiceLineXml<'a> {
    fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let item = self.item;
        let mut st = s.serialize_struct("fe:InvoiceLine", 0)?;
        st.serialize_field("cbc:ID", &self.id.to_string())?;
        st.serialize_field(
            "cbc:InvoicedQuantity",
            &item.quantity().normalize().to_string(),
        )?;
        st.serialize_field(
            "cbc:LineExtensionAmount",
            &currency_amount("cbc:LineExtensionAmount", self.currency, item.base_amount()),
        )?;

        // Line-level tax sections: withholdings strictly before outputs, the
        // reverse of the invoice level. Some validating authorities reject
        // the other order.
        for tax in item.withheld_taxes() {
            st.serialize_field("fe:TaxTotal", &line_tax_block(item, tax, self.currency, true))?;
        }
        for tax in item.output_taxes() {
            st.serialize_field(
                "fe:TaxTotal",
                &line_tax_block(item, tax, self.currency, false),
            )?;
        }

        st.serialize_field("fe:Item", &ItemXml(item))?;
        st.serialize_field("fe:Price", &PriceXml {
            currency: self.currency,
            unit_price: item.unit_price(),
        })?;
        st.end()
    }
}

fn line_tax_block<'a>(
    item: &'a LineItem,
    tax: &'a TaxRate,
    currency: &'a str,
    withheld: bool,
) -> TaxBlockXml<'a> {
    TaxBlockXml {
        currency,
        withheld,
        base: item.base_amount(),
        amount: item.tax_amount(tax),
        percent: tax.rate,
        scheme_code: tax.tax_type.code(),
    }
}

struct ItemXml<'a>(&'a LineItem);

impl<'a> Serialize for ItemXml<'a> {
    fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let item = self.0;
        let mut st = s.serialize_struct("fe:Item", 0)?;
        st.serialize_field("cbc:Description", item.name())?;
        if let Some(description) = item.description() {
            if !description.is_empty() {
                st.serialize_field("cbc:AdditionalInformation", description)?;
            }
        }
        // Per-item cross-references: fixed optional-field table.
        emit_optional_fields(
            &mut st,
            &[
                (
                    "cbc:IssuerContractReference",
                    item.issuer_contract_reference(),
                ),
                (
                    "cbc:IssuerTransactionReference",
                    item.issuer_transaction_reference(),
                ),
                (
                    "cbc:ReceiverContractReference",
                    item.receiver_contract_reference(),
                ),
                (
                    "cbc:ReceiverTransactionReference",
                    item.receiver_transaction_reference(),
                ),
                ("cbc:FileReference", item.file_reference()),
            ],
        )?;
        st.end()
    }
}

struct PriceXml<'a> {
    currency: &'a str,
    unit_price: rust_decimal::Decimal,
}

impl<'a> Serialize for PriceXml<'a> {
    fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut st = s.serialize_struct("fe:Price", 0)?;
        st.serialize_field(
            "cbc:PriceAmount",
            &currency_amount("cbc:PriceAmount", self.currency, self.unit_price),
        )?;
        st.end()
    }
}

struct LegalLiteralsXml<'a>(&'a [String]);

impl<'a> Serialize for LegalLiteralsXml<'a> {
    fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut st = s.serialize_struct("fe:LegalLiterals", 0)?;
        for literal in self.0 {
            st.serialize_field("cbc:LegalReference", literal.as_str())?;
        }
        st.end()
    }
}
