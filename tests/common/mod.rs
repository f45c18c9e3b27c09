use chrono::NaiveDate;
use facturae_core::invoice::sign::XadesSigner;
use facturae_core::invoice::{Address, Invoice, LineItem, Party, PartyName, TaxType};
use facturae_core::schema::SchemaVersion;
use k256::ecdsa::SigningKey;
use k256::pkcs8::EncodePrivateKey;
use rust_decimal_macros::dec;
use std::str::FromStr;
use std::time::Duration;
use x509_cert::builder::{Builder, CertificateBuilder, Profile};
use x509_cert::der::Encode;
use x509_cert::der::asn1::UtcTime;
use x509_cert::name::Name;
use x509_cert::serial_number::SerialNumber;
use x509_cert::spki::{EncodePublicKey, SubjectPublicKeyInfoOwned};
use x509_cert::time::Validity;

#[allow(dead_code)]
pub fn test_party(name: &str) -> Party {
    Party::new(
        "900373115",
        PartyName::LegalEntity { name: name.into() },
        test_address(),
    )
    .expect("valid party")
}

#[allow(dead_code)]
pub fn test_individual(first: &str, surname: &str, second_surname: &str) -> Party {
    Party::new(
        "10101010",
        PartyName::Individual {
            first_name: first.into(),
            first_surname: surname.into(),
            last_surname: second_surname.into(),
        },
        test_address(),
    )
    .expect("valid party")
}

#[allow(dead_code)]
pub fn test_address() -> Address {
    Address {
        street: "Calle 1 #2-68".into(),
        post_code: "110111".into(),
        town: "Bogota".into(),
        province: "Distrito Capital".into(),
        country: isocountry::CountryCode::COL,
    }
}

/// Minimal valid draft for the given dialect, control block fields included
/// when the dialect needs them.
#[allow(dead_code)]
pub fn sample_invoice(schema: SchemaVersion) -> Invoice {
    let mut invoice = Invoice::new(schema);
    invoice
        .set_prefix("PRUE")
        .set_number("980000001")
        .set_issue_date(NaiveDate::from_ymd_opt(2024, 3, 1).expect("date"))
        .set_seller(test_party("Perico de los Palotes S.A."))
        .set_buyer(test_party("Gaitan Perez S.A.S."))
        .add_item(
            LineItem::new("Widget", dec!(3), dec!(20.14)).with_output_tax(TaxType::Iva, dec!(19)),
        );

    if schema == SchemaVersion::Dian1_0 {
        invoice
            .set_authorization("9000000112345678")
            .set_billing_period(
                NaiveDate::from_ymd_opt(2024, 1, 1).expect("date"),
                NaiveDate::from_ymd_opt(2024, 12, 31).expect("date"),
            )
            .set_billing_range(980000000, 985000000)
            .set_identification_code("1")
            .set_software_provider("800199436", "0d2e2883")
            .set_software_security_pin("75315");
    }
    invoice
}

#[allow(dead_code)]
pub fn test_signing_key() -> SigningKey {
    // Fixed scalar keeps the suite deterministic.
    let bytes: [u8; 32] = core::array::from_fn(|i| (i + 1) as u8);
    SigningKey::from_slice(&bytes).expect("valid key bytes")
}

#[allow(dead_code)]
pub fn test_certificate_der(key: &SigningKey) -> Vec<u8> {
    let validity = Validity::from_now(Duration::new(3600, 0)).expect("validity");
    certificate_der(key, validity)
}

fn certificate_der(key: &SigningKey, validity: Validity) -> Vec<u8> {
    let serial_number = SerialNumber::from(4386u32);
    let subject = Name::from_str("CN=Pruebas,O=DIAN,C=CO").expect("subject");
    let spki_der = key
        .verifying_key()
        .to_public_key_der()
        .expect("public key der");
    let spki = SubjectPublicKeyInfoOwned::try_from(spki_der.as_bytes()).expect("spki");
    let builder =
        CertificateBuilder::new(Profile::Root, serial_number, validity, subject, spki, key)
            .expect("builder");
    let cert = builder
        .build::<k256::ecdsa::DerSignature>()
        .expect("certificate");
    cert.to_der().expect("cert der")
}

#[allow(dead_code)]
pub fn test_signer() -> XadesSigner {
    let key = test_signing_key();
    let cert_der = test_certificate_der(&key);
    let key_der = key.to_pkcs8_der().expect("key der");
    XadesSigner::from_der(&cert_der, key_der.as_bytes()).expect("signer")
}

/// Signer whose certificate lapsed long ago (valid for one hour in 2017).
#[allow(dead_code)]
pub fn expired_signer() -> XadesSigner {
    let key = test_signing_key();
    let not_before = UtcTime::from_unix_duration(Duration::from_secs(1_500_000_000)).expect("time");
    let not_after = UtcTime::from_unix_duration(Duration::from_secs(1_500_003_600)).expect("time");
    let cert_der = certificate_der(
        &key,
        Validity {
            not_before: not_before.into(),
            not_after: not_after.into(),
        },
    );
    let key_der = key.to_pkcs8_der().expect("key der");
    XadesSigner::from_der(&cert_der, key_der.as_bytes()).expect("signer")
}
