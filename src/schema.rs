//! Per-version schema configuration.
//!
//! Every supported invoice dialect is described by an immutable
//! [`SchemaConfig`] selected through the [`SchemaVersion`] enum at invoice
//! construction time. Namespace tables, profile identifiers and the signature
//! policy live here as plain data so the composer and the signature engine
//! never consult mutable global state.

use std::str::FromStr;
use thiserror::Error;

/// Configuration-level errors. These indicate a programming or deployment
/// mistake and are never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    #[error("unsupported schema version: {0}")]
    UnsupportedSchemaVersion(String),
}

/// Supported invoice schema dialects.
///
/// The version is fixed when the invoice is created and governs the namespace
/// set, the jurisdiction control block and the signature anchor used by the
/// composer and the signature engine.
///
/// # Examples
/// ```rust
/// use facturae_core::schema::SchemaVersion;
///
/// let version: SchemaVersion = "2.1".parse()?;
/// assert_eq!(version, SchemaVersion::Dian2_1);
/// # Ok::<(), facturae_core::schema::ConfigurationError>(())
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SchemaVersion {
    /// DIAN UBL profile 1.0, `fe` namespace v1, requires the
    /// `sts:DianExtensions` control block.
    Dian1_0,
    /// DIAN UBL profile 2.1, `fe` namespace v2. No control block; emits the
    /// extended optional header elements (due date, billing period).
    #[default]
    Dian2_1,
}

impl SchemaVersion {
    pub fn label(&self) -> &'static str {
        self.config().label
    }

    /// The immutable configuration for this version.
    pub fn config(&self) -> &'static SchemaConfig {
        match self {
            SchemaVersion::Dian1_0 => &DIAN_1_0,
            SchemaVersion::Dian2_1 => &DIAN_2_1,
        }
    }
}

impl FromStr for SchemaVersion {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "1.0" => Ok(SchemaVersion::Dian1_0),
            "2.1" => Ok(SchemaVersion::Dian2_1),
            other => Err(ConfigurationError::UnsupportedSchemaVersion(
                other.to_string(),
            )),
        }
    }
}

/// Signature policy referenced from the XAdES signed properties.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignaturePolicy {
    pub identifier: &'static str,
    pub description: &'static str,
    /// Base64 SHA-256 digest of the policy document.
    pub digest_b64: &'static str,
}

/// Immutable description of one schema dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchemaConfig {
    pub label: &'static str,
    /// Namespace URI bound to the `fe` prefix on the root element.
    pub fe_namespace: &'static str,
    /// Full namespace attribute table for the root element, in declaration
    /// order. Attribute names are quick-xml serde field names (`@xmlns:*`).
    pub namespaces: &'static [(&'static str, &'static str)],
    pub schema_location: &'static str,
    pub ubl_version: &'static str,
    pub profile_id: &'static str,
    /// Whether the jurisdiction control block (`sts:DianExtensions`) is
    /// mandatory for this dialect.
    pub requires_control_block: bool,
    /// Whether the extended optional header elements (due date, billing
    /// period) belong to this dialect's vocabulary.
    pub emits_due_date: bool,
    pub policy: SignaturePolicy,
}

pub(crate) const CAC_NS: &str =
    "urn:oasis:names:specification:ubl:schema:xsd:CommonAggregateComponents-2";
pub(crate) const CBC_NS: &str =
    "urn:oasis:names:specification:ubl:schema:xsd:CommonBasicComponents-2";
pub(crate) const EXT_NS: &str =
    "urn:oasis:names:specification:ubl:schema:xsd:CommonExtensionComponents-2";
pub(crate) const STS_NS: &str =
    "http://www.dian.gov.co/contratos/facturaelectronica/v1/Structures";
pub(crate) const XSI_NS: &str = "http://www.w3.org/2001/XMLSchema-instance";

const FE_NS_V1: &str = "http://www.dian.gov.co/contratos/facturaelectronica/v1";
const FE_NS_V2: &str = "http://www.dian.gov.co/contratos/facturaelectronica/v2";

const DIAN_POLICY: SignaturePolicy = SignaturePolicy {
    identifier:
        "https://facturaelectronica.dian.gov.co/politicadefirma/v1/politicadefirmav2.pdf",
    description:
        "Politica de firma para facturas electronicas de la Republica de Colombia",
    digest_b64: "dMoMvtcG5aIzgYo0tIsSQeVJBDnUnfSOfBpxXrmor0Y=",
};

static DIAN_1_0: SchemaConfig = SchemaConfig {
    label: "1.0",
    fe_namespace: FE_NS_V1,
    namespaces: &[
        ("@xmlns:fe", FE_NS_V1),
        ("@xmlns:cac", CAC_NS),
        ("@xmlns:cbc", CBC_NS),
        ("@xmlns:ext", EXT_NS),
        ("@xmlns:sts", STS_NS),
        ("@xmlns:xsi", XSI_NS),
    ],
    schema_location:
        "http://www.dian.gov.co/contratos/facturaelectronica/v1 ../xsd/DIAN_UBL.xsd",
    ubl_version: "UBL 2.0",
    profile_id: "DIAN 1.0",
    requires_control_block: true,
    emits_due_date: false,
    policy: DIAN_POLICY,
};

static DIAN_2_1: SchemaConfig = SchemaConfig {
    label: "2.1",
    fe_namespace: FE_NS_V2,
    namespaces: &[
        ("@xmlns:fe", FE_NS_V2),
        ("@xmlns:cac", CAC_NS),
        ("@xmlns:cbc", CBC_NS),
        ("@xmlns:ext", EXT_NS),
        ("@xmlns:xsi", XSI_NS),
    ],
    schema_location:
        "http://www.dian.gov.co/contratos/facturaelectronica/v2 ../xsd/DIAN_UBL_2_1.xsd",
    ubl_version: "UBL 2.1",
    profile_id: "DIAN 2.1",
    requires_control_block: false,
    emits_due_date: true,
    policy: DIAN_POLICY,
};
