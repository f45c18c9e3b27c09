pub(crate) const DS_NS: &str = "http://www.w3.org/2000/09/xmldsig#";
pub(crate) const XADES_NS: &str = "http://uri.etsi.org/01903/v1.3.2#";

pub(crate) const XML_PROLOG: &str = r#"<?xml version="1.0" encoding="UTF-8"?>"#;

pub(crate) const XADES_SIGNATURE_TEMPLATE: &str =
    include_str!("../../../assets/templates/xades_signature.xml");
pub(crate) const UBL_EXTENSION_SLOT_TEMPLATE: &str =
    include_str!("../../../assets/templates/ubl_extension_slot.xml");
