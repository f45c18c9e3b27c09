mod common;

use facturae_core::invoice::hooks::ExtensionChain;
use facturae_core::schema::SchemaVersion;
use std::path::Path;

#[test]
fn export_writes_the_signed_xml_and_reports_the_byte_count() {
    let signed = common::sample_invoice(SchemaVersion::Dian2_1)
        .compose()
        .expect("compose")
        .sign(&common::test_signer(), &ExtensionChain::new())
        .expect("sign");

    let dir = std::env::temp_dir().join("facturae-core-export");
    std::fs::create_dir_all(&dir).expect("temp dir");
    let path = dir.join("signed-invoice.xml");

    let written = signed.export_to_path(&path).expect("export");
    let on_disk = std::fs::read_to_string(&path).expect("read back");
    assert_eq!(written, on_disk.len() as u64);
    assert!(on_disk.starts_with("<?xml version=\"1.0\""));
    assert!(on_disk.contains("ds:SignatureValue"));
    assert_eq!(on_disk, signed.xml());

    std::fs::remove_file(&path).ok();
}

#[test]
fn export_to_an_unwritable_path_is_an_io_error() {
    let signed = common::sample_invoice(SchemaVersion::Dian2_1)
        .compose()
        .expect("compose")
        .sign(&common::test_signer(), &ExtensionChain::new())
        .expect("sign");

    let err = signed
        .export_to_path(Path::new("/nonexistent-dir/invoice.xml"))
        .expect_err("must fail");
    assert!(err.to_string().contains("failed to write invoice"));
}
