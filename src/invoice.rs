//! Invoice domain types and lifecycle.
mod builder;
pub mod export;
pub mod hooks;
pub mod sign;
mod totals;
pub mod xml;

pub use builder::{ComposedInvoice, Invoice, SignedInvoice};
pub use totals::{AggregatedTax, TaxTotals};

use chrono::{NaiveDate, NaiveTime};
use iso_currency::Currency;
use isocountry::CountryCode;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha384};
use std::fmt::Write as _;
use thiserror::Error;

/// Invoice-related errors.
#[derive(Debug, Error)]
pub enum InvoiceError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("missing tax number")]
    MissingTaxNumber,
}

/// Structured validation error with field-level issues.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invoice validation failed")]
pub struct ValidationError {
    pub issues: Vec<ValidationIssue>,
}

impl ValidationError {
    pub fn new(issues: Vec<ValidationIssue>) -> Self {
        Self { issues }
    }
}

/// Single validation issue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    pub field: InvoiceField,
    pub kind: ValidationKind,
    pub line_item_index: Option<usize>,
}

#[non_exhaustive]
/// Field associated with a validation issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvoiceField {
    Number,
    IssueDate,
    DueDate,
    Seller,
    Buyer,
    LineItems,
    LineItemName,
    LineItemQuantity,
    LineItemUnitPrice,
    InvoiceAuthorization,
    BillingRange,
    IdentificationCode,
    SoftwareProvider,
    SoftwareSecurityCode,
}

#[non_exhaustive]
/// Classification of validation issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationKind {
    Missing,
    Empty,
    OutOfRange,
}

/// Tax vocabulary shared by both versions. The wire code follows the DIAN
/// tax scheme list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaxType {
    /// Value-added tax.
    Iva,
    /// Industry and commerce tax.
    Ica,
    /// National consumption tax.
    Inc,
    /// Withheld VAT.
    ReteIva,
    /// Withholding at source.
    ReteFuente,
    /// Withheld industry and commerce tax.
    ReteIca,
}

impl TaxType {
    pub fn code(&self) -> &'static str {
        match self {
            TaxType::Iva => "01",
            TaxType::Ica => "02",
            TaxType::Inc => "03",
            TaxType::ReteIva => "05",
            TaxType::ReteFuente => "06",
            TaxType::ReteIca => "07",
        }
    }
}

/// A (tax type, rate) pair attached to a line item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaxRate {
    pub tax_type: TaxType,
    /// Percentage rate. Compared with exact decimal equality when grouping.
    pub rate: Decimal,
}

impl TaxRate {
    pub fn new(tax_type: TaxType, rate: Decimal) -> Self {
        Self { tax_type, rate }
    }
}

/// Postal address for parties.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Address {
    pub street: String,
    pub post_code: String,
    pub town: String,
    pub province: String,
    pub country: CountryCode,
}

/// Party name, split by legal personality. Natural persons carry surname
/// fields instead of a single registered name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartyName {
    LegalEntity {
        name: String,
    },
    Individual {
        first_name: String,
        first_surname: String,
        last_surname: String,
    },
}

impl PartyName {
    pub fn is_legal_entity(&self) -> bool {
        matches!(self, PartyName::LegalEntity { .. })
    }
}

/// Seller or buyer of an invoice.
///
/// # Examples
/// ```rust
/// use facturae_core::invoice::{Address, Party, PartyName};
/// use isocountry::CountryCode;
///
/// let seller = Party::new(
///     "900373115",
///     PartyName::LegalEntity { name: "Perico de los Palotes S.A.".into() },
///     Address {
///         street: "C/ Falsa, 123".into(),
///         post_code: "110111".into(),
///         town: "Bogota".into(),
///         province: "Distrito Capital".into(),
///         country: CountryCode::COL,
///     },
/// )?;
/// assert!(seller.name().is_legal_entity());
/// # Ok::<(), facturae_core::invoice::InvoiceError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Party {
    tax_number: String,
    name: PartyName,
    address: Address,
}

impl Party {
    /// Create a party from validated inputs.
    ///
    /// # Errors
    /// Returns [`InvoiceError::MissingTaxNumber`] if the tax number is empty.
    pub fn new(
        tax_number: impl Into<String>,
        name: PartyName,
        address: Address,
    ) -> Result<Self, InvoiceError> {
        let tax_number = tax_number.into().trim().to_string();
        if tax_number.is_empty() {
            return Err(InvoiceError::MissingTaxNumber);
        }
        Ok(Self {
            tax_number,
            name,
            address,
        })
    }

    pub fn tax_number(&self) -> &str {
        &self.tax_number
    }

    pub fn name(&self) -> &PartyName {
        &self.name
    }

    pub fn address(&self) -> &Address {
        &self.address
    }
}

/// Payment method for the invoice header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentMethod {
    Cash,
    /// Bank transfer; the IBAN is stored with spaces stripped.
    Transfer { iban: String },
}

impl PaymentMethod {
    pub fn transfer(iban: impl Into<String>) -> Self {
        PaymentMethod::Transfer {
            iban: iban.into().replace(' ', ""),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "01",
            PaymentMethod::Transfer { .. } => "04",
        }
    }

    pub fn iban(&self) -> Option<&str> {
        match self {
            PaymentMethod::Cash => None,
            PaymentMethod::Transfer { iban } => Some(iban),
        }
    }
}

/// Invoice header data. Identifiers, dates, currency and the optional
/// cross-reference set.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct InvoiceHeader {
    pub(crate) authorization: Option<String>,
    pub(crate) prefix: Option<String>,
    pub(crate) number: Option<String>,
    pub(crate) issue_date: Option<NaiveDate>,
    pub(crate) issue_time: Option<NaiveTime>,
    pub(crate) due_date: Option<NaiveDate>,
    pub(crate) period_start: Option<NaiveDate>,
    pub(crate) period_end: Option<NaiveDate>,
    pub(crate) range_from: Option<u64>,
    pub(crate) range_to: Option<u64>,
    pub(crate) identification_code: Option<String>,
    pub(crate) provider_id: Option<String>,
    pub(crate) software_id: Option<String>,
    pub(crate) software_security_code: Option<String>,
    pub(crate) currency: Option<Currency>,
    pub(crate) language: Option<String>,
    pub(crate) payment_method: Option<PaymentMethod>,
    pub(crate) description: Option<String>,
    pub(crate) file_reference: Option<String>,
    pub(crate) receiver_transaction_reference: Option<String>,
    pub(crate) receiver_contract_reference: Option<String>,
}

impl InvoiceHeader {
    /// Full invoice identifier: prefix immediately followed by the number.
    pub fn full_number(&self) -> String {
        let mut id = String::new();
        if let Some(prefix) = &self.prefix {
            id.push_str(prefix);
        }
        if let Some(number) = &self.number {
            id.push_str(number);
        }
        id
    }

    pub fn issue_date(&self) -> Option<NaiveDate> {
        self.issue_date
    }

    /// Time of day the invoice was issued. Midnight when never set.
    pub fn issue_time(&self) -> NaiveTime {
        self.issue_time.unwrap_or_default()
    }

    pub fn due_date(&self) -> Option<NaiveDate> {
        self.due_date
    }

    pub fn currency_code(&self) -> &str {
        self.currency.map(|c| c.code()).unwrap_or("COP")
    }
}

/// One-way software security code: SHA-384 over the software identifier
/// concatenated with the shared PIN. The raw PIN is never stored.
pub(crate) fn software_security_code(software_id: &str, pin: &str) -> String {
    let digest = Sha384::digest(format!("{software_id}{pin}").as_bytes());
    let mut hex = String::with_capacity(digest.len() * 2);
    for byte in digest {
        let _ = write!(&mut hex, "{byte:02x}");
    }
    hex
}

/// Single invoice line item. Taxes are split into output taxes (charged to
/// the buyer) and withheld taxes (retained by the buyer).
///
/// # Examples
/// ```rust
/// use facturae_core::invoice::{LineItem, TaxType};
/// use rust_decimal::Decimal;
///
/// let item = LineItem::new("Widget", Decimal::from(3), "20.14".parse().unwrap())
///     .with_output_tax(TaxType::Iva, "21".parse().unwrap());
/// assert_eq!(item.base_amount().to_string(), "60.42");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineItem {
    name: String,
    description: Option<String>,
    quantity: Decimal,
    unit_price: Decimal,
    output_taxes: Vec<TaxRate>,
    withheld_taxes: Vec<TaxRate>,
    issuer_contract_reference: Option<String>,
    issuer_transaction_reference: Option<String>,
    receiver_contract_reference: Option<String>,
    receiver_transaction_reference: Option<String>,
    file_reference: Option<String>,
}

impl LineItem {
    pub fn new(name: impl Into<String>, quantity: Decimal, unit_price: Decimal) -> Self {
        Self {
            name: name.into(),
            description: None,
            quantity,
            unit_price,
            output_taxes: Vec::new(),
            withheld_taxes: Vec::new(),
            issuer_contract_reference: None,
            issuer_transaction_reference: None,
            receiver_contract_reference: None,
            receiver_transaction_reference: None,
            file_reference: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_output_tax(mut self, tax_type: TaxType, rate: Decimal) -> Self {
        self.output_taxes.push(TaxRate::new(tax_type, rate));
        self
    }

    pub fn with_withheld_tax(mut self, tax_type: TaxType, rate: Decimal) -> Self {
        self.withheld_taxes.push(TaxRate::new(tax_type, rate));
        self
    }

    pub fn with_issuer_contract_reference(mut self, value: impl Into<String>) -> Self {
        self.issuer_contract_reference = Some(value.into());
        self
    }

    pub fn with_issuer_transaction_reference(mut self, value: impl Into<String>) -> Self {
        self.issuer_transaction_reference = Some(value.into());
        self
    }

    pub fn with_receiver_contract_reference(mut self, value: impl Into<String>) -> Self {
        self.receiver_contract_reference = Some(value.into());
        self
    }

    pub fn with_receiver_transaction_reference(mut self, value: impl Into<String>) -> Self {
        self.receiver_transaction_reference = Some(value.into());
        self
    }

    pub fn with_file_reference(mut self, value: impl Into<String>) -> Self {
        self.file_reference = Some(value.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn quantity(&self) -> Decimal {
        self.quantity
    }

    pub fn unit_price(&self) -> Decimal {
        self.unit_price
    }

    pub fn output_taxes(&self) -> &[TaxRate] {
        &self.output_taxes
    }

    pub fn withheld_taxes(&self) -> &[TaxRate] {
        &self.withheld_taxes
    }

    pub(crate) fn issuer_contract_reference(&self) -> Option<&str> {
        self.issuer_contract_reference.as_deref()
    }

    pub(crate) fn issuer_transaction_reference(&self) -> Option<&str> {
        self.issuer_transaction_reference.as_deref()
    }

    pub(crate) fn receiver_contract_reference(&self) -> Option<&str> {
        self.receiver_contract_reference.as_deref()
    }

    pub(crate) fn receiver_transaction_reference(&self) -> Option<&str> {
        self.receiver_transaction_reference.as_deref()
    }

    pub(crate) fn file_reference(&self) -> Option<&str> {
        self.file_reference.as_deref()
    }

    /// Taxable base: quantity times tax-exclusive unit price.
    pub fn base_amount(&self) -> Decimal {
        self.quantity * self.unit_price
    }

    /// Amount for one tax applied to this item's base.
    pub fn tax_amount(&self, tax: &TaxRate) -> Decimal {
        self.base_amount() * tax.rate / Decimal::ONE_HUNDRED
    }

    /// Gross amount before any tax: equals the taxable base.
    pub fn gross_amount(&self) -> Decimal {
        self.base_amount()
    }

    pub fn total_taxes_outputs(&self) -> Decimal {
        self.output_taxes.iter().map(|t| self.tax_amount(t)).sum()
    }

    pub fn total_taxes_withheld(&self) -> Decimal {
        self.withheld_taxes.iter().map(|t| self.tax_amount(t)).sum()
    }

    /// Amount payable for this item: base plus output taxes minus withheld
    /// taxes.
    pub fn total_amount(&self) -> Decimal {
        self.base_amount() + self.total_taxes_outputs() - self.total_taxes_withheld()
    }
}
