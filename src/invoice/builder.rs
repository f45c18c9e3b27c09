//! Invoice lifecycle: draft, composed, signed.
//!
//! A draft [`Invoice`] is freely mutable. [`Invoice::compose`] validates the
//! draft and renders the XML document; [`ComposedInvoice::sign`] produces an
//! immutable [`SignedInvoice`]. Signing borrows the composed invoice, so a
//! failed attempt can simply be retried.

use super::export::{self, ExportError};
use super::hooks::ExtensionChain;
use super::sign::{SigningError, XadesSigner, sign_document};
use super::totals::TaxTotals;
use super::xml::{ComposeError, InvoiceDocument, render};
use super::{
    InvoiceField, InvoiceHeader, LineItem, Party, PaymentMethod, ValidationError, ValidationIssue,
    ValidationKind, software_security_code,
};
use crate::schema::SchemaVersion;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use iso_currency::Currency;
use libxml::parser::Parser;
use libxml::tree::Document;
use rust_decimal::Decimal;
use std::path::Path;
use tracing::debug;

/// Mutable invoice draft.
///
/// The schema version is fixed at construction and governs validation and
/// composition. All other data is set through the fluent setters.
///
/// # Examples
/// ```rust
/// use facturae_core::invoice::{Address, Invoice, LineItem, Party, PartyName, TaxType};
/// use facturae_core::schema::SchemaVersion;
/// use chrono::NaiveDate;
/// use isocountry::CountryCode;
/// use rust_decimal::Decimal;
///
/// let party = |name: &str| {
///     Party::new(
///         "900373115",
///         PartyName::LegalEntity { name: name.into() },
///         Address {
///             street: "Calle 1".into(),
///             post_code: "110111".into(),
///             town: "Bogota".into(),
///             province: "Distrito Capital".into(),
///             country: CountryCode::COL,
///         },
///     )
/// };
///
/// let mut invoice = Invoice::new(SchemaVersion::Dian2_1);
/// invoice
///     .set_prefix("PRUE")
///     .set_number("980000001")
///     .set_issue_date(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap())
///     .set_seller(party("Seller S.A.")?)
///     .set_buyer(party("Buyer S.A.")?)
///     .add_item(
///         LineItem::new("Widget", Decimal::from(3), "20.14".parse().unwrap())
///             .with_output_tax(TaxType::Iva, Decimal::from(19)),
///     );
///
/// let composed = invoice.compose()?;
/// assert!(composed.to_xml().contains("PRUE980000001"));
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct Invoice {
    schema: SchemaVersion,
    header: InvoiceHeader,
    seller: Option<Party>,
    buyer: Option<Party>,
    items: Vec<LineItem>,
    legal_literals: Vec<String>,
}

impl Invoice {
    pub fn new(schema: SchemaVersion) -> Self {
        Self {
            schema,
            header: InvoiceHeader::default(),
            seller: None,
            buyer: None,
            items: Vec::new(),
            legal_literals: Vec::new(),
        }
    }

    pub fn schema(&self) -> SchemaVersion {
        self.schema
    }

    pub fn set_authorization(&mut self, authorization: impl Into<String>) -> &mut Self {
        self.header.authorization = Some(authorization.into());
        self
    }

    pub fn set_prefix(&mut self, prefix: impl Into<String>) -> &mut Self {
        self.header.prefix = Some(prefix.into());
        self
    }

    pub fn set_number(&mut self, number: impl Into<String>) -> &mut Self {
        self.header.number = Some(number.into());
        self
    }

    pub fn set_issue_date(&mut self, issue_date: NaiveDate) -> &mut Self {
        self.header.issue_date = Some(issue_date);
        self
    }

    pub fn set_issue_time(&mut self, issue_time: NaiveTime) -> &mut Self {
        self.header.issue_time = Some(issue_time);
        self
    }

    pub fn set_due_date(&mut self, due_date: NaiveDate) -> &mut Self {
        self.header.due_date = Some(due_date);
        self
    }

    pub fn set_billing_period(&mut self, start: NaiveDate, end: NaiveDate) -> &mut Self {
        self.header.period_start = Some(start);
        self.header.period_end = Some(end);
        self
    }

    /// Authorized numbering range granted by the tax authority.
    pub fn set_billing_range(&mut self, from: u64, to: u64) -> &mut Self {
        self.header.range_from = Some(from);
        self.header.range_to = Some(to);
        self
    }

    pub fn set_identification_code(&mut self, code: impl Into<String>) -> &mut Self {
        self.header.identification_code = Some(code.into());
        self
    }

    pub fn set_software_provider(
        &mut self,
        provider_id: impl Into<String>,
        software_id: impl Into<String>,
    ) -> &mut Self {
        self.header.provider_id = Some(provider_id.into());
        self.header.software_id = Some(software_id.into());
        self
    }

    /// Derive the software security code from the registered software
    /// identifier and the given PIN. The PIN itself is never stored. Needs
    /// [`Invoice::set_software_provider`] to have run first.
    pub fn set_software_security_pin(&mut self, pin: &str) -> &mut Self {
        if let Some(software_id) = self.header.software_id.as_deref() {
            self.header.software_security_code = Some(software_security_code(software_id, pin));
        }
        self
    }

    pub fn set_currency(&mut self, currency: Currency) -> &mut Self {
        self.header.currency = Some(currency);
        self
    }

    pub fn set_language(&mut self, language: impl Into<String>) -> &mut Self {
        self.header.language = Some(language.into());
        self
    }

    pub fn set_payment_method(&mut self, method: PaymentMethod) -> &mut Self {
        self.header.payment_method = Some(method);
        self
    }

    pub fn set_description(&mut self, description: impl Into<String>) -> &mut Self {
        self.header.description = Some(description.into());
        self
    }

    pub fn set_file_reference(&mut self, reference: impl Into<String>) -> &mut Self {
        self.header.file_reference = Some(reference.into());
        self
    }

    pub fn set_receiver_transaction_reference(
        &mut self,
        reference: impl Into<String>,
    ) -> &mut Self {
        self.header.receiver_transaction_reference = Some(reference.into());
        self
    }

    pub fn set_receiver_contract_reference(&mut self, reference: impl Into<String>) -> &mut Self {
        self.header.receiver_contract_reference = Some(reference.into());
        self
    }

    pub fn set_seller(&mut self, seller: Party) -> &mut Self {
        self.seller = Some(seller);
        self
    }

    pub fn set_buyer(&mut self, buyer: Party) -> &mut Self {
        self.buyer = Some(buyer);
        self
    }

    pub fn add_item(&mut self, item: LineItem) -> &mut Self {
        self.items.push(item);
        self
    }

    pub fn add_legal_literal(&mut self, literal: impl Into<String>) -> &mut Self {
        self.legal_literals.push(literal.into());
        self
    }

    pub fn items(&self) -> &[LineItem] {
        &self.items
    }

    /// Current totals, recomputed from the item list.
    pub fn totals(&self) -> TaxTotals {
        TaxTotals::compute(&self.items)
    }

    /// Check the draft without composing it. Reports every issue at once.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut issues = Vec::new();
        let header = &self.header;

        match header.number.as_deref() {
            None => issues.push(issue(InvoiceField::Number, ValidationKind::Missing)),
            Some("") => issues.push(issue(InvoiceField::Number, ValidationKind::Empty)),
            Some(_) => {}
        }
        if header.issue_date.is_none() {
            issues.push(issue(InvoiceField::IssueDate, ValidationKind::Missing));
        }
        if let (Some(issue_date), Some(due_date)) = (header.issue_date, header.due_date) {
            if due_date < issue_date {
                issues.push(issue(InvoiceField::DueDate, ValidationKind::OutOfRange));
            }
        }
        if self.seller.is_none() {
            issues.push(issue(InvoiceField::Seller, ValidationKind::Missing));
        }
        if self.buyer.is_none() {
            issues.push(issue(InvoiceField::Buyer, ValidationKind::Missing));
        }

        if self.items.is_empty() {
            issues.push(issue(InvoiceField::LineItems, ValidationKind::Empty));
        }
        for (index, item) in self.items.iter().enumerate() {
            if item.name().trim().is_empty() {
                issues.push(item_issue(InvoiceField::LineItemName, ValidationKind::Empty, index));
            }
            if item.quantity() <= Decimal::ZERO {
                issues.push(item_issue(
                    InvoiceField::LineItemQuantity,
                    ValidationKind::OutOfRange,
                    index,
                ));
            }
            if item.unit_price() < Decimal::ZERO {
                issues.push(item_issue(
                    InvoiceField::LineItemUnitPrice,
                    ValidationKind::OutOfRange,
                    index,
                ));
            }
        }

        if self.schema.config().requires_control_block {
            if header.authorization.as_deref().unwrap_or("").is_empty() {
                issues.push(issue(
                    InvoiceField::InvoiceAuthorization,
                    ValidationKind::Missing,
                ));
            }
            match (header.range_from, header.range_to) {
                (Some(from), Some(to)) if from <= to => {}
                (Some(_), Some(_)) => {
                    issues.push(issue(InvoiceField::BillingRange, ValidationKind::OutOfRange));
                }
                _ => issues.push(issue(InvoiceField::BillingRange, ValidationKind::Missing)),
            }
            if header.identification_code.as_deref().unwrap_or("").is_empty() {
                issues.push(issue(
                    InvoiceField::IdentificationCode,
                    ValidationKind::Missing,
                ));
            }
            if header.provider_id.is_none() || header.software_id.is_none() {
                issues.push(issue(InvoiceField::SoftwareProvider, ValidationKind::Missing));
            }
            if header.software_security_code.is_none() {
                issues.push(issue(
                    InvoiceField::SoftwareSecurityCode,
                    ValidationKind::Missing,
                ));
            }
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::new(issues))
        }
    }

    /// Validate and render the draft into an immutable composed invoice.
    pub fn compose(&self) -> Result<ComposedInvoice, ComposeError> {
        self.validate()?;

        let totals = TaxTotals::compute(&self.items);
        let seller = self.seller.as_ref().ok_or_else(missing_party)?;
        let buyer = self.buyer.as_ref().ok_or_else(missing_party)?;

        let schema = self.schema.config();
        let xml = render(&InvoiceDocument {
            schema,
            header: &self.header,
            seller,
            buyer,
            items: &self.items,
            legal_literals: &self.legal_literals,
            totals: &totals,
        })?;

        let document = Parser::default()
            .parse_string(&xml)
            .map_err(|e| ComposeError::Parse(format!("{e:?}")))?;
        debug!(number = %self.header.full_number(), version = schema.label, "invoice composed");

        Ok(ComposedInvoice {
            document,
            schema: self.schema,
            totals,
            xml,
        })
    }
}

// Unreachable after validation; kept to avoid panicking paths.
fn missing_party() -> ComposeError {
    ComposeError::Validation(ValidationError::new(vec![issue(
        InvoiceField::Seller,
        ValidationKind::Missing,
    )]))
}

fn issue(field: InvoiceField, kind: ValidationKind) -> ValidationIssue {
    ValidationIssue {
        field,
        kind,
        line_item_index: None,
    }
}

fn item_issue(field: InvoiceField, kind: ValidationKind, index: usize) -> ValidationIssue {
    ValidationIssue {
        field,
        kind,
        line_item_index: Some(index),
    }
}

/// Validated, rendered invoice ready for signing.
pub struct ComposedInvoice {
    document: Document,
    schema: SchemaVersion,
    totals: TaxTotals,
    xml: String,
}

impl ComposedInvoice {
    /// The unsigned XML, exactly as rendered.
    pub fn to_xml(&self) -> &str {
        &self.xml
    }

    pub fn schema(&self) -> SchemaVersion {
        self.schema
    }

    pub fn totals(&self) -> &TaxTotals {
        &self.totals
    }

    /// Sign a working copy of the document. The composed invoice itself is
    /// never mutated, so a failure here can be retried with other key
    /// material or an adjusted hook chain.
    pub fn sign(
        &self,
        signer: &XadesSigner,
        hooks: &ExtensionChain,
    ) -> Result<SignedInvoice, SigningError> {
        let signed = sign_document(&self.document, self.schema.config(), signer, hooks)?;
        Ok(SignedInvoice {
            xml: signed.xml,
            invoice_hash: signed.invoice_hash,
            signing_time: signed.signing_time,
        })
    }
}

/// Signed invoice. The XML is frozen; the only remaining operation is export.
pub struct SignedInvoice {
    xml: String,
    invoice_hash: String,
    signing_time: DateTime<Utc>,
}

impl SignedInvoice {
    pub fn xml(&self) -> &str {
        &self.xml
    }

    /// Base64 SHA-256 digest of the signed document body.
    pub fn invoice_hash(&self) -> &str {
        &self.invoice_hash
    }

    pub fn signing_time(&self) -> DateTime<Utc> {
        self.signing_time
    }

    /// Write the signed XML to disk, returning the number of bytes written.
    pub fn export_to_path(&self, path: &Path) -> Result<u64, ExportError> {
        export::write_xml(path, &self.xml)
    }
}
