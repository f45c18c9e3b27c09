//! Electronic invoice assembly and XAdES-EPES signing for the Colombian
//! DIAN UBL profiles.
//!
//! The crate models the invoice lifecycle as three types: a mutable draft
//! ([`invoice::Invoice`]), a validated and rendered document
//! ([`invoice::ComposedInvoice`]) and a frozen, signed result
//! ([`invoice::SignedInvoice`]). Schema dialect differences (namespaces,
//! jurisdiction control block, optional header elements) are data in
//! [`schema::SchemaConfig`], selected once per invoice through
//! [`schema::SchemaVersion`].
//!
//! Signing uses an enveloped XAdES-EPES signature spliced into the reserved
//! `ext:ExtensionContent` slot, with SHA-256 digests over the C14N 1.1 form
//! of the document. Extension hooks ([`invoice::hooks::ExtensionHook`]) can
//! mutate the document before digesting (covered by the signature) or after
//! splicing (not covered).

pub mod invoice;
pub mod schema;

use thiserror::Error;

/// Top-level error type aggregating every stage of the pipeline.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Invoice(#[from] invoice::InvoiceError),
    #[error(transparent)]
    Validation(#[from] invoice::ValidationError),
    #[error(transparent)]
    Configuration(#[from] schema::ConfigurationError),
    #[error(transparent)]
    Compose(#[from] invoice::xml::ComposeError),
    #[error(transparent)]
    Signing(#[from] invoice::sign::SigningError),
    #[error(transparent)]
    Export(#[from] invoice::export::ExportError),
}
