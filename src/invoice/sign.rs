//! XAdES-EPES signature engine.
//!
//! Signing works on a clone of the composed document, so a failed run leaves
//! the invoice untouched and retryable. The pipeline: run the before-phase
//! hooks, splice in hook-provided additional data, digest the document with
//! the extension container excluded, fill the signature template and splice
//! it into the reserved extension slot, then run the after-phase hooks.

use super::hooks::{ExtensionChain, HookError};
use super::xml::constants::{
    DS_NS, UBL_EXTENSION_SLOT_TEMPLATE, XADES_NS, XADES_SIGNATURE_TEMPLATE,
};
use crate::schema::{CAC_NS, CBC_NS, EXT_NS, STS_NS, SchemaConfig};
use base64ct::{Base64, Encoding};
use chrono::{DateTime, Utc};
use k256::ecdsa::signature::Signer as _;
use k256::ecdsa::{Signature, SigningKey};
use k256::pkcs8::DecodePrivateKey;
use libxml::{
    parser::Parser,
    tree::Node,
    tree::{Document, c14n},
    xpath,
};
use sha2::{Digest, Sha256};
use std::time::SystemTime;
use thiserror::Error;
use tracing::{debug, info};
use x509_cert::{
    Certificate,
    der::{Decode, DecodePem, Encode},
};

/// Errors raised by the signature engine.
#[derive(Debug, Error)]
pub enum SigningError {
    #[error("invalid key material: {0}")]
    InvalidKeyMaterial(String),
    #[error("signing certificate expired on {not_after}")]
    CertificateExpired { not_after: String },
    #[error(transparent)]
    Extension(#[from] HookError),
    #[error("xml error: {0}")]
    Xml(String),
    #[error("signature error: {0}")]
    Signature(String),
}

/// Certificate and key pair used to produce XAdES signatures.
#[derive(Debug)]
pub struct XadesSigner {
    certificate: Certificate,
    signing_key: SigningKey,
    signing_time: Option<DateTime<Utc>>,
}

impl XadesSigner {
    pub fn from_pem(cert_pem: &str, private_key_pem: &str) -> Result<Self, SigningError> {
        let certificate = Certificate::from_pem(cert_pem.as_bytes())
            .map_err(|e| SigningError::InvalidKeyMaterial(format!("certificate: {e}")))?;
        let signing_key = SigningKey::from_pkcs8_pem(private_key_pem)
            .map_err(|e| SigningError::InvalidKeyMaterial(format!("private key: {e}")))?;
        Ok(Self {
            certificate,
            signing_key,
            signing_time: None,
        })
    }

    pub fn from_der(cert_der: &[u8], private_key_der: &[u8]) -> Result<Self, SigningError> {
        let certificate = Certificate::from_der(cert_der)
            .map_err(|e| SigningError::InvalidKeyMaterial(format!("certificate: {e}")))?;
        let signing_key = SigningKey::from_pkcs8_der(private_key_der)
            .map_err(|e| SigningError::InvalidKeyMaterial(format!("private key: {e}")))?;
        Ok(Self {
            certificate,
            signing_key,
            signing_time: None,
        })
    }

    /// Pin the signing time instead of taking the wall clock at signing.
    pub fn with_signing_time(mut self, signing_time: DateTime<Utc>) -> Self {
        self.signing_time = Some(signing_time);
        self
    }

    pub fn certificate(&self) -> &Certificate {
        &self.certificate
    }

    fn check_not_expired(&self) -> Result<(), SigningError> {
        let not_after = self
            .certificate
            .tbs_certificate
            .validity
            .not_after
            .to_system_time();
        if SystemTime::now() > not_after {
            return Err(SigningError::CertificateExpired {
                not_after: DateTime::<Utc>::from(not_after).to_rfc3339(),
            });
        }
        Ok(())
    }
}

/// Result of a signing run, consumed by the invoice lifecycle.
pub(crate) struct SignedDocument {
    pub(crate) xml: String,
    pub(crate) invoice_hash: String,
    pub(crate) signing_time: DateTime<Utc>,
}

pub(crate) fn sign_document(
    document: &Document,
    schema: &'static SchemaConfig,
    signer: &XadesSigner,
    hooks: &ExtensionChain,
) -> Result<SignedDocument, SigningError> {
    signer.check_not_expired()?;

    let mut doc = document
        .dup()
        .map_err(|e| SigningError::Xml(format!("failed to clone document: {e:?}")))?;

    hooks.run_before(&mut doc)?;
    splice_additional_data(&mut doc, schema, hooks)?;

    let mut anchor = ensure_signature_anchor(&mut doc, schema)?;

    // Digest covers everything contributed so far except the extension
    // container the signature itself lands in.
    let invoice_hash = document_digest_base64(&doc)?;
    debug!(invoice_hash = %invoice_hash, "document digest computed");

    let signing_time = signer.signing_time.unwrap_or_else(Utc::now);
    let signing_time_value = format_signing_time(&signing_time);

    let cert_der = signer
        .certificate
        .to_der()
        .map_err(|e| SigningError::Signature(format!("certificate DER encoding: {e}")))?;
    let cert_digest = Base64::encode_string(&Sha256::digest(&cert_der));
    let (issuer, serial) = issuer_and_serial(&signer.certificate);

    // The SignedProperties and SignedInfo digests cover the standalone
    // renders below, not the spliced subtrees: canonicalizing in-document
    // would inherit the invoice namespaces and change the bytes. Verifiers
    // of those two references must canonicalize the same standalone form.
    let signed_props_xml = signed_properties_xml_string(
        &signing_time_value,
        &cert_digest,
        &issuer,
        &serial,
        schema,
    );
    let signed_props_digest = canonical_sha256_base64(&signed_props_xml)?;

    let signed_info_xml = signed_info_xml_string(&invoice_hash, &signed_props_digest);
    let signature_value = sign_canonical(&signer.signing_key, &signed_info_xml)?;

    let mut signature = import_fragment(&mut doc, XADES_SIGNATURE_TEMPLATE)?;
    anchor
        .add_child(&mut signature)
        .map_err(|e| SigningError::Xml(e.to_string()))?;

    let ctx = signing_context(&doc, schema)?;
    set_xpath_text(
        &ctx,
        "//ds:Signature/ds:SignedInfo/ds:Reference[@Id='SignedInvoiceData']/ds:DigestValue",
        &invoice_hash,
    )?;
    set_xpath_text(
        &ctx,
        "//ds:Signature/ds:SignedInfo/ds:Reference[@URI='#XadesSignedProperties']/ds:DigestValue",
        &signed_props_digest,
    )?;
    set_xpath_text(&ctx, "//ds:Signature/ds:SignatureValue", &signature_value)?;
    set_xpath_text(
        &ctx,
        "//ds:Signature/ds:KeyInfo/ds:X509Data/ds:X509Certificate",
        &Base64::encode_string(&cert_der),
    )?;
    set_xpath_text(
        &ctx,
        "//xades:SignedSignatureProperties/xades:SigningTime",
        &signing_time_value,
    )?;
    set_xpath_text(
        &ctx,
        "//xades:SigningCertificate/xades:Cert/xades:CertDigest/ds:DigestValue",
        &cert_digest,
    )?;
    set_xpath_text(
        &ctx,
        "//xades:Cert/xades:IssuerSerial/ds:X509IssuerName",
        &issuer,
    )?;
    set_xpath_text(
        &ctx,
        "//xades:Cert/xades:IssuerSerial/ds:X509SerialNumber",
        &serial,
    )?;
    set_xpath_text(
        &ctx,
        "//xades:SignaturePolicyId/xades:SigPolicyId/xades:Identifier",
        schema.policy.identifier,
    )?;
    set_xpath_text(
        &ctx,
        "//xades:SignaturePolicyId/xades:SigPolicyId/xades:Description",
        schema.policy.description,
    )?;
    set_xpath_text(
        &ctx,
        "//xades:SignaturePolicyId/xades:SigPolicyHash/ds:DigestValue",
        schema.policy.digest_b64,
    )?;
    drop(ctx);

    hooks.run_after(&mut doc)?;

    info!(signing_time = %signing_time_value, "invoice signed");
    Ok(SignedDocument {
        xml: doc.to_string(),
        invoice_hash,
        signing_time,
    })
}

/// Recompute the document digest of a signed invoice and compare it against
/// the digest embedded in the signature.
pub fn verify_invoice_digest(xml: &str) -> Result<bool, SigningError> {
    let doc = Parser::default()
        .parse_string(xml)
        .map_err(|e| SigningError::Xml(format!("XML parse error: {e:?}")))?;
    let ctx = xpath::Context::new(&doc)
        .map_err(|e| SigningError::Xml(format!("XPath context error: {e:?}")))?;
    ctx.register_namespace("ds", DS_NS)
        .map_err(|e| SigningError::Xml(format!("XPath context error: {e:?}")))?;

    let nodes = ctx
        .evaluate("//ds:Reference[@Id='SignedInvoiceData']/ds:DigestValue")
        .map_err(|e| SigningError::Xml(format!("XPath error: {e:?}")))?
        .get_nodes_as_vec();
    let embedded = nodes
        .first()
        .map(|node| node.get_content().trim().to_string())
        .ok_or_else(|| SigningError::Xml("missing document digest in signature".into()))?;

    let recomputed = document_digest_base64(&doc)?;
    Ok(embedded == recomputed)
}

/// SHA-256 over the C14N 1.1 form of the document, with every
/// `ext:UBLExtensions` container removed first.
fn document_digest_base64(doc: &Document) -> Result<String, SigningError> {
    let copy = doc
        .dup()
        .map_err(|e| SigningError::Xml(format!("failed to clone document: {e:?}")))?;

    let ctx = xpath::Context::new(&copy)
        .map_err(|e| SigningError::Xml(format!("XPath context error: {e:?}")))?;
    ctx.register_namespace("ext", EXT_NS)
        .map_err(|e| SigningError::Xml(format!("XPath context error: {e:?}")))?;
    let containers = ctx
        .evaluate("//ext:UBLExtensions")
        .map_err(|e| SigningError::Xml(format!("XPath error: {e:?}")))?
        .get_nodes_as_vec();
    for mut node in containers {
        node.unlink();
    }
    drop(ctx);

    let canonical = canonicalize(&copy)?;
    Ok(Base64::encode_string(&Sha256::digest(canonical.as_bytes())))
}

fn canonicalize(doc: &Document) -> Result<String, SigningError> {
    let options = c14n::CanonicalizationOptions {
        mode: c14n::CanonicalizationMode::Canonical1_1,
        inclusive_ns_prefixes: vec![],
        with_comments: false,
    };
    doc.canonicalize(options, None)
        .map_err(|e| SigningError::Xml(format!("failed to canonicalize: {e:?}")))
}

fn canonical_sha256_base64(xml: &str) -> Result<String, SigningError> {
    let doc = Parser::default()
        .parse_string(xml)
        .map_err(|e| SigningError::Xml(format!("XML parse error: {e:?}")))?;
    let canonical = canonicalize(&doc)?;
    Ok(Base64::encode_string(&Sha256::digest(canonical.as_bytes())))
}

/// ECDSA-SHA256 over the canonical form of the given fragment, DER encoded
/// and base64'd.
fn sign_canonical(key: &SigningKey, xml: &str) -> Result<String, SigningError> {
    let doc = Parser::default()
        .parse_string(xml)
        .map_err(|e| SigningError::Xml(format!("XML parse error: {e:?}")))?;
    let canonical = canonicalize(&doc)?;
    let signature: Signature = key
        .try_sign(canonical.as_bytes())
        .map_err(|e| SigningError::Signature(format!("failed to sign: {e}")))?;
    Ok(Base64::encode_string(signature.to_der().as_bytes()))
}

/// Collect hook fragments into one `fe:AdditionalData` element appended as
/// the last child of the root. Nothing is added when no hook contributes.
/// The element lands before digesting, so it is covered by the signature.
fn splice_additional_data(
    doc: &mut Document,
    schema: &'static SchemaConfig,
    hooks: &ExtensionChain,
) -> Result<(), SigningError> {
    let fragments = hooks.additional_data();
    if fragments.is_empty() {
        return Ok(());
    }

    let wrapper = format!(
        "<fe:AdditionalData xmlns:fe=\"{}\">{}</fe:AdditionalData>",
        schema.fe_namespace,
        fragments.concat()
    );
    let mut node = import_fragment(doc, &wrapper)?;
    let mut root = doc
        .get_root_element()
        .ok_or_else(|| SigningError::Xml("missing invoice root".into()))?;
    root.add_child(&mut node)
        .map_err(|e| SigningError::Xml(e.to_string()))?;
    Ok(())
}

/// Locate the reserved empty `ext:ExtensionContent` the signature goes into,
/// creating the extension structure when a hook has stripped it.
fn ensure_signature_anchor(
    doc: &mut Document,
    schema: &'static SchemaConfig,
) -> Result<Node, SigningError> {
    let ctx = signing_context(doc, schema)?;

    if let Some(anchor) = first_matching_node(&ctx, "//ext:UBLExtension/ext:ExtensionContent[not(*)]")? {
        return Ok(anchor);
    }

    let containers = ctx
        .evaluate("//ext:UBLExtensions")
        .map_err(|e| SigningError::Xml(format!("XPath error: {e:?}")))?
        .get_nodes_as_vec();
    drop(ctx);

    match containers.into_iter().next() {
        Some(mut container) => {
            let mut slot = import_fragment(doc, UBL_EXTENSION_SLOT_TEMPLATE)?;
            container
                .add_child(&mut slot)
                .map_err(|e| SigningError::Xml(e.to_string()))?;
        }
        None => {
            let wrapper = format!(
                "<ext:UBLExtensions xmlns:ext=\"{EXT_NS}\">{UBL_EXTENSION_SLOT_TEMPLATE}</ext:UBLExtensions>"
            );
            let mut container = import_fragment(doc, &wrapper)?;
            let mut root = doc
                .get_root_element()
                .ok_or_else(|| SigningError::Xml("missing invoice root".into()))?;
            if let Some(mut first_child) = first_element_child(&root) {
                first_child
                    .add_prev_sibling(&mut container)
                    .map_err(|e| SigningError::Xml(e.to_string()))?;
            } else {
                root.add_child(&mut container)
                    .map_err(|e| SigningError::Xml(e.to_string()))?;
            }
        }
    }

    let ctx = signing_context(doc, schema)?;
    first_matching_node(&ctx, "//ext:UBLExtension/ext:ExtensionContent[not(*)]")?
        .ok_or_else(|| SigningError::Xml("failed to create signature anchor".into()))
}

fn import_fragment(doc: &mut Document, xml: &str) -> Result<Node, SigningError> {
    let fragment = Parser::default()
        .parse_string(xml)
        .map_err(|e| SigningError::Xml(format!("XML parse error: {e:?}")))?;
    let mut node = fragment
        .get_root_element()
        .ok_or_else(|| SigningError::Xml("missing fragment root".into()))?;
    node.unlink();
    doc.import_node(&mut node)
        .map_err(|_| SigningError::Xml("failed to import fragment".into()))
}

fn first_element_child(root: &Node) -> Option<Node> {
    let mut current = root.get_first_child();
    while let Some(node) = current {
        if node.is_element_node() {
            return Some(node);
        }
        current = node.get_next_sibling();
    }
    None
}

fn first_matching_node(ctx: &xpath::Context, path: &str) -> Result<Option<Node>, SigningError> {
    let nodes = ctx
        .evaluate(path)
        .map_err(|e| SigningError::Xml(format!("XPath error: {e:?}")))?
        .get_nodes_as_vec();
    Ok(nodes.into_iter().next())
}

fn set_xpath_text(ctx: &xpath::Context, path: &str, value: &str) -> Result<(), SigningError> {
    let nodes = ctx
        .evaluate(path)
        .map_err(|e| SigningError::Xml(format!("XPath error: {e:?}")))?
        .get_nodes_as_vec();
    if nodes.is_empty() {
        return Err(SigningError::Xml(format!("XPath target not found: {path}")));
    }
    for mut node in nodes {
        node.set_content(value)
            .map_err(|e| SigningError::Xml(e.to_string()))?;
    }
    Ok(())
}

fn signing_context(
    doc: &Document,
    schema: &'static SchemaConfig,
) -> Result<xpath::Context, SigningError> {
    let ctx = xpath::Context::new(doc)
        .map_err(|e| SigningError::Xml(format!("XPath context error: {e:?}")))?;
    let prefixes = [
        ("fe", schema.fe_namespace),
        ("cac", CAC_NS),
        ("cbc", CBC_NS),
        ("ext", EXT_NS),
        ("sts", STS_NS),
        ("ds", DS_NS),
        ("xades", XADES_NS),
    ];
    for (prefix, uri) in prefixes {
        ctx.register_namespace(prefix, uri)
            .map_err(|e| SigningError::Xml(format!("XPath context error: {e:?}")))?;
    }
    Ok(ctx)
}

fn issuer_and_serial(cert: &Certificate) -> (String, String) {
    let serial = serial_bytes_to_decimal_string(cert.tbs_certificate.serial_number.as_bytes());
    let issuer = cert.tbs_certificate.issuer.to_string();
    let issuer = issuer
        .split(',')
        .map(|part| part.trim())
        .collect::<Vec<_>>()
        .join(", ");
    (issuer, serial)
}

/// Big-endian certificate serial rendered as a decimal string.
fn serial_bytes_to_decimal_string(bytes: &[u8]) -> String {
    if bytes.is_empty() {
        return "0".to_string();
    }

    let mut digits: Vec<u8> = vec![0];
    for &byte in bytes {
        let mut carry = byte as u32;
        for digit in digits.iter_mut() {
            let value = (*digit as u32) * 256 + carry;
            *digit = (value % 10) as u8;
            carry = value / 10;
        }
        while carry > 0 {
            digits.push((carry % 10) as u8);
            carry /= 10;
        }
    }

    while digits.len() > 1 && matches!(digits.last(), Some(0)) {
        digits.pop();
    }

    digits.iter().rev().map(|d| (b'0' + *d) as char).collect()
}

fn format_signing_time(time: &DateTime<Utc>) -> String {
    time.format("%Y-%m-%dT%H:%M:%S").to_string()
}

fn xml_escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Standalone rendering of the signed properties, mirroring the subtree the
/// template carries. Digested in canonical form for the SignedProperties
/// reference.
fn signed_properties_xml_string(
    signing_time: &str,
    cert_digest_b64: &str,
    issuer: &str,
    serial: &str,
    schema: &'static SchemaConfig,
) -> String {
    format!(
        r#"<xades:SignedProperties xmlns:ds="{DS_NS}" xmlns:xades="{XADES_NS}" Id="XadesSignedProperties"><xades:SignedSignatureProperties><xades:SigningTime>{signing_time}</xades:SigningTime><xades:SigningCertificate><xades:Cert><xades:CertDigest><ds:DigestMethod Algorithm="http://www.w3.org/2001/04/xmlenc#sha256"/><ds:DigestValue>{cert_digest}</ds:DigestValue></xades:CertDigest><xades:IssuerSerial><ds:X509IssuerName>{issuer}</ds:X509IssuerName><ds:X509SerialNumber>{serial}</ds:X509SerialNumber></xades:IssuerSerial></xades:Cert></xades:SigningCertificate><xades:SignaturePolicyIdentifier><xades:SignaturePolicyId><xades:SigPolicyId><xades:Identifier>{identifier}</xades:Identifier><xades:Description>{description}</xades:Description></xades:SigPolicyId><xades:SigPolicyHash><ds:DigestMethod Algorithm="http://www.w3.org/2001/04/xmlenc#sha256"/><ds:DigestValue>{policy_digest}</ds:DigestValue></xades:SigPolicyHash></xades:SignaturePolicyId></xades:SignaturePolicyIdentifier></xades:SignedSignatureProperties></xades:SignedProperties>"#,
        signing_time = xml_escape(signing_time),
        cert_digest = xml_escape(cert_digest_b64),
        issuer = xml_escape(issuer),
        serial = xml_escape(serial),
        identifier = xml_escape(schema.policy.identifier),
        description = xml_escape(schema.policy.description),
        policy_digest = xml_escape(schema.policy.digest_b64),
    )
}

/// Standalone rendering of the SignedInfo, mirroring the template with both
/// reference digests filled in. Canonicalized and signed as-is.
fn signed_info_xml_string(invoice_hash_b64: &str, signed_props_digest_b64: &str) -> String {
    format!(
        r##"<ds:SignedInfo xmlns:ds="{DS_NS}"><ds:CanonicalizationMethod Algorithm="http://www.w3.org/2006/12/xml-c14n11"/><ds:SignatureMethod Algorithm="http://www.w3.org/2001/04/xmldsig-more#ecdsa-sha256"/><ds:Reference Id="SignedInvoiceData" URI=""><ds:Transforms><ds:Transform Algorithm="http://www.w3.org/2000/09/xmldsig#enveloped-signature"/></ds:Transforms><ds:DigestMethod Algorithm="http://www.w3.org/2001/04/xmlenc#sha256"/><ds:DigestValue>{invoice_hash}</ds:DigestValue></ds:Reference><ds:Reference URI="#XadesSignedProperties" Type="http://uri.etsi.org/01903#SignedProperties"><ds:DigestMethod Algorithm="http://www.w3.org/2001/04/xmlenc#sha256"/><ds:DigestValue>{props_hash}</ds:DigestValue></ds:Reference></ds:SignedInfo>"##,
        invoice_hash = xml_escape(invoice_hash_b64),
        props_hash = xml_escape(signed_props_digest_b64),
    )
}
