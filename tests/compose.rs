mod common;

use chrono::NaiveTime;
use facturae_core::invoice::{Invoice, LineItem, PaymentMethod, TaxType};
use facturae_core::schema::SchemaVersion;
use libxml::parser::Parser;
use libxml::xpath;
use rust_decimal_macros::dec;

const CBC_NS: &str = "urn:oasis:names:specification:ubl:schema:xsd:CommonBasicComponents-2";
const CAC_NS: &str = "urn:oasis:names:specification:ubl:schema:xsd:CommonAggregateComponents-2";
const EXT_NS: &str = "urn:oasis:names:specification:ubl:schema:xsd:CommonExtensionComponents-2";
const STS_NS: &str = "http://www.dian.gov.co/contratos/facturaelectronica/v1/Structures";
const FE_NS_V1: &str = "http://www.dian.gov.co/contratos/facturaelectronica/v1";
const FE_NS_V2: &str = "http://www.dian.gov.co/contratos/facturaelectronica/v2";

fn xpath_context(xml: &str, fe_ns: &str) -> (libxml::tree::Document, xpath::Context) {
    let doc = Parser::default().parse_string(xml).expect("parse xml");
    let ctx = xpath::Context::new(&doc).expect("xpath context");
    ctx.register_namespace("fe", fe_ns).expect("fe ns");
    ctx.register_namespace("cbc", CBC_NS).expect("cbc ns");
    ctx.register_namespace("cac", CAC_NS).expect("cac ns");
    ctx.register_namespace("ext", EXT_NS).expect("ext ns");
    ctx.register_namespace("sts", STS_NS).expect("sts ns");
    (doc, ctx)
}

fn count(ctx: &xpath::Context, expr: &str) -> usize {
    ctx.evaluate(expr).expect("xpath").get_nodes_as_vec().len()
}

fn text(ctx: &xpath::Context, expr: &str) -> String {
    let nodes = ctx.evaluate(expr).expect("xpath").get_nodes_as_vec();
    nodes
        .first()
        .unwrap_or_else(|| panic!("no node for {expr}"))
        .get_content()
}

#[test]
fn dian_2_1_document_has_no_control_block() {
    let composed = common::sample_invoice(SchemaVersion::Dian2_1)
        .compose()
        .expect("compose");
    let (_doc, ctx) = xpath_context(composed.to_xml(), FE_NS_V2);

    assert_eq!(count(&ctx, "//sts:DianExtensions"), 0);
    assert_eq!(text(&ctx, "/fe:Invoice/cbc:UBLVersionID"), "UBL 2.1");
    assert_eq!(text(&ctx, "/fe:Invoice/cbc:ProfileID"), "DIAN 2.1");
    // Exactly one reserved empty extension slot for the signature.
    assert_eq!(count(&ctx, "//ext:UBLExtension/ext:ExtensionContent[not(*)]"), 1);
}

#[test]
fn dian_1_0_document_carries_the_control_block() {
    let composed = common::sample_invoice(SchemaVersion::Dian1_0)
        .compose()
        .expect("compose");
    let (_doc, ctx) = xpath_context(composed.to_xml(), FE_NS_V1);

    assert_eq!(count(&ctx, "//sts:DianExtensions"), 1);
    assert_eq!(
        text(&ctx, "//sts:InvoiceControl/sts:InvoiceAuthorization"),
        "9000000112345678"
    );
    assert_eq!(text(&ctx, "//sts:AuthorizedInvoices/sts:From"), "980000000");
    assert_eq!(text(&ctx, "//sts:AuthorizedInvoices/sts:To"), "985000000");
    let code = text(&ctx, "//sts:SoftwareSecurityCode");
    assert_eq!(code.len(), 96);
    assert!(code.chars().all(|c| c.is_ascii_hexdigit()));
    // The control block extension comes before the signature slot.
    assert_eq!(count(&ctx, "//ext:UBLExtensions/ext:UBLExtension"), 2);
    assert_eq!(text(&ctx, "/fe:Invoice/cbc:UBLVersionID"), "UBL 2.0");
    // The 1.0 dialect never emits a due date.
    assert_eq!(count(&ctx, "/fe:Invoice/cbc:DueDate"), 0);
}

#[test]
fn issue_time_follows_the_issue_date() {
    let mut invoice = common::sample_invoice(SchemaVersion::Dian2_1);
    invoice.set_issue_time(NaiveTime::from_hms_opt(0, 31, 40).expect("time"));
    let composed = invoice.compose().expect("compose");
    let (_doc, ctx) = xpath_context(composed.to_xml(), FE_NS_V2);

    assert_eq!(text(&ctx, "/fe:Invoice/cbc:IssueTime"), "00:31:40");
    assert_eq!(
        count(
            &ctx,
            "/fe:Invoice/cbc:IssueDate/following-sibling::*[1][self::cbc:IssueTime]"
        ),
        1
    );

    // Drafts that never set a time still emit the element, at midnight.
    let defaulted = common::sample_invoice(SchemaVersion::Dian2_1)
        .compose()
        .expect("compose");
    let (_doc, ctx) = xpath_context(defaulted.to_xml(), FE_NS_V2);
    assert_eq!(text(&ctx, "/fe:Invoice/cbc:IssueTime"), "00:00:00");
}

#[test]
fn invoice_level_outputs_come_before_withholdings() {
    let mut invoice = common::sample_invoice(SchemaVersion::Dian2_1);
    invoice.add_item(
        LineItem::new("Service", dec!(1), dec!(100))
            .with_output_tax(TaxType::Iva, dec!(19))
            .with_withheld_tax(TaxType::ReteFuente, dec!(4)),
    );
    let composed = invoice.compose().expect("compose");
    let (_doc, ctx) = xpath_context(composed.to_xml(), FE_NS_V2);

    let blocks = ctx
        .evaluate("/fe:Invoice/fe:TaxTotal/cbc:TaxEvidenceIndicator")
        .expect("xpath")
        .get_nodes_as_vec();
    let indicators: Vec<String> = blocks.iter().map(|n| n.get_content()).collect();
    assert_eq!(indicators, vec!["false", "true"]);
}

#[test]
fn line_level_withholdings_come_before_outputs() {
    let mut invoice = common::sample_invoice(SchemaVersion::Dian2_1);
    invoice.add_item(
        LineItem::new("Service", dec!(1), dec!(100))
            .with_output_tax(TaxType::Iva, dec!(19))
            .with_withheld_tax(TaxType::ReteFuente, dec!(4)),
    );
    let composed = invoice.compose().expect("compose");
    let (_doc, ctx) = xpath_context(composed.to_xml(), FE_NS_V2);

    let indicators: Vec<String> = ctx
        .evaluate("/fe:Invoice/fe:InvoiceLine[2]/fe:TaxTotal/cbc:TaxEvidenceIndicator")
        .expect("xpath")
        .get_nodes_as_vec()
        .iter()
        .map(|n| n.get_content())
        .collect();
    assert_eq!(indicators, vec!["true", "false"]);
}

#[test]
fn same_rate_taxes_merge_into_one_invoice_level_block() {
    let mut invoice = common::sample_invoice(SchemaVersion::Dian2_1);
    invoice.add_item(
        LineItem::new("Another", dec!(1), dec!(50)).with_output_tax(TaxType::Iva, dec!(19)),
    );
    let composed = invoice.compose().expect("compose");
    let (_doc, ctx) = xpath_context(composed.to_xml(), FE_NS_V2);

    assert_eq!(count(&ctx, "/fe:Invoice/fe:TaxTotal"), 1);
    // 3 x 20.14 + 1 x 50 = 110.42 taxable base.
    assert_eq!(
        text(&ctx, "/fe:Invoice/fe:TaxTotal/fe:TaxSubtotal/cbc:TaxableAmount"),
        "110.42"
    );
}

#[test]
fn optional_header_fields_are_omitted_when_unset() {
    let composed = common::sample_invoice(SchemaVersion::Dian2_1)
        .compose()
        .expect("compose");
    let (_doc, ctx) = xpath_context(composed.to_xml(), FE_NS_V2);

    assert_eq!(count(&ctx, "//cbc:FileReference"), 0);
    assert_eq!(count(&ctx, "//cbc:ReceiverTransactionReference"), 0);
    assert_eq!(count(&ctx, "//cac:PaymentMeans"), 0);
    assert_eq!(count(&ctx, "//fe:LegalLiterals"), 0);
    assert_eq!(count(&ctx, "//cbc:Note"), 0);
}

#[test]
fn optional_values_round_trip_with_escaping() {
    let mut invoice = common::sample_invoice(SchemaVersion::Dian2_1);
    invoice
        .set_file_reference("REF<2024> & Niño")
        .set_description("Entrega única & final")
        .set_language("es")
        .add_legal_literal("Factura expedida conforme al articulo 617");
    let composed = invoice.compose().expect("compose");
    let (_doc, ctx) = xpath_context(composed.to_xml(), FE_NS_V2);

    assert_eq!(text(&ctx, "//cbc:FileReference"), "REF<2024> & Niño");
    assert_eq!(text(&ctx, "//cbc:Note"), "Entrega única & final");
    assert_eq!(text(&ctx, "//cbc:Note/@languageID"), "es");
    assert_eq!(
        text(&ctx, "//fe:LegalLiterals/cbc:LegalReference"),
        "Factura expedida conforme al articulo 617"
    );
}

#[test]
fn transfer_payment_emits_the_account_and_strips_iban_spaces() {
    let mut invoice = common::sample_invoice(SchemaVersion::Dian2_1);
    invoice.set_payment_method(PaymentMethod::transfer("ES91 2100 0418 4502 0005 1332"));
    let composed = invoice.compose().expect("compose");
    let (_doc, ctx) = xpath_context(composed.to_xml(), FE_NS_V2);

    assert_eq!(text(&ctx, "//cac:PaymentMeans/cbc:PaymentMeansCode"), "04");
    assert_eq!(
        text(&ctx, "//cac:PaymentMeans/cac:PayeeFinancialAccount/cbc:ID"),
        "ES9121000418450200051332"
    );
}

#[test]
fn cash_payment_has_no_financial_account() {
    let mut invoice = common::sample_invoice(SchemaVersion::Dian2_1);
    invoice.set_payment_method(PaymentMethod::Cash);
    let composed = invoice.compose().expect("compose");
    let (_doc, ctx) = xpath_context(composed.to_xml(), FE_NS_V2);

    assert_eq!(text(&ctx, "//cac:PaymentMeans/cbc:PaymentMeansCode"), "01");
    assert_eq!(count(&ctx, "//cac:PayeeFinancialAccount"), 0);
}

#[test]
fn individual_buyer_renders_a_person_block() {
    let mut invoice = common::sample_invoice(SchemaVersion::Dian2_1);
    invoice.set_buyer(common::test_individual("Maria", "Gaitan", "Perez"));
    let composed = invoice.compose().expect("compose");
    let (_doc, ctx) = xpath_context(composed.to_xml(), FE_NS_V2);

    let buyer = "/fe:Invoice/fe:AccountingCustomerParty/fe:Party";
    assert_eq!(text(&ctx, &format!("{buyer}/fe:Person/cbc:FirstName")), "Maria");
    assert_eq!(text(&ctx, &format!("{buyer}/fe:Person/cbc:FamilyName")), "Gaitan");
    assert_eq!(text(&ctx, &format!("{buyer}/fe:Person/cbc:MiddleName")), "Perez");
    assert_eq!(count(&ctx, &format!("{buyer}/fe:PartyLegalEntity")), 0);
    // The seller stays a legal entity.
    assert_eq!(
        count(&ctx, "/fe:Invoice/fe:AccountingSupplierParty/fe:Party/fe:PartyLegalEntity"),
        1
    );
}

#[test]
fn monetary_totals_follow_the_item_set() {
    let mut invoice = common::sample_invoice(SchemaVersion::Dian2_1);
    invoice.add_item(
        LineItem::new("Service", dec!(1), dec!(100))
            .with_output_tax(TaxType::Iva, dec!(19))
            .with_withheld_tax(TaxType::ReteFuente, dec!(4)),
    );
    let composed = invoice.compose().expect("compose");
    let (_doc, ctx) = xpath_context(composed.to_xml(), FE_NS_V2);

    // 60.42 + 100 gross; payable adds IVA and subtracts the withholding.
    assert_eq!(
        text(&ctx, "//fe:LegalMonetaryTotal/cbc:LineExtensionAmount"),
        "160.42"
    );
    assert_eq!(
        text(&ctx, "//fe:LegalMonetaryTotal/cbc:TaxExclusiveAmount"),
        "160.42"
    );
    assert_eq!(
        text(&ctx, "//fe:LegalMonetaryTotal/cbc:PayableAmount"),
        "186.90"
    );
    assert_eq!(text(&ctx, "//cbc:DocumentCurrencyCode"), "COP");
}

#[test]
fn due_date_and_billing_period_appear_in_2_1() {
    let mut invoice = common::sample_invoice(SchemaVersion::Dian2_1);
    invoice
        .set_due_date(chrono::NaiveDate::from_ymd_opt(2024, 4, 1).expect("date"))
        .set_billing_period(
            chrono::NaiveDate::from_ymd_opt(2024, 3, 1).expect("date"),
            chrono::NaiveDate::from_ymd_opt(2024, 3, 31).expect("date"),
        );
    let composed = invoice.compose().expect("compose");
    let (_doc, ctx) = xpath_context(composed.to_xml(), FE_NS_V2);

    assert_eq!(text(&ctx, "/fe:Invoice/cbc:DueDate"), "2024-04-01");
    assert_eq!(text(&ctx, "//cac:InvoicePeriod/cbc:StartDate"), "2024-03-01");
    assert_eq!(text(&ctx, "//cac:InvoicePeriod/cbc:EndDate"), "2024-03-31");
}

#[test]
fn unsupported_schema_version_fails_at_parse_time() {
    let err = "3.0".parse::<SchemaVersion>().expect_err("must fail");
    assert_eq!(err.to_string(), "unsupported schema version: 3.0");
}

#[test]
fn composing_twice_yields_identical_xml() {
    let invoice = common::sample_invoice(SchemaVersion::Dian2_1);
    let first = invoice.compose().expect("compose");
    let second = invoice.compose().expect("compose");
    assert_eq!(first.to_xml(), second.to_xml());
}

#[test]
fn item_references_land_in_the_item_block() {
    let mut invoice = Invoice::new(SchemaVersion::Dian2_1);
    invoice
        .set_prefix("PRUE")
        .set_number("980000002")
        .set_issue_date(chrono::NaiveDate::from_ymd_opt(2024, 3, 1).expect("date"))
        .set_seller(common::test_party("Seller S.A."))
        .set_buyer(common::test_party("Buyer S.A."))
        .add_item(
            LineItem::new("Widget", dec!(1), dec!(10))
                .with_description("Widget azul")
                .with_issuer_contract_reference("C-77")
                .with_file_reference("F-12"),
        );
    let composed = invoice.compose().expect("compose");
    let (_doc, ctx) = xpath_context(composed.to_xml(), FE_NS_V2);

    let item = "/fe:Invoice/fe:InvoiceLine[1]/fe:Item";
    assert_eq!(text(&ctx, &format!("{item}/cbc:Description")), "Widget");
    assert_eq!(
        text(&ctx, &format!("{item}/cbc:AdditionalInformation")),
        "Widget azul"
    );
    assert_eq!(text(&ctx, &format!("{item}/cbc:IssuerContractReference")), "C-77");
    assert_eq!(text(&ctx, &format!("{item}/cbc:FileReference")), "F-12");
    assert_eq!(count(&ctx, &format!("{item}/cbc:ReceiverContractReference")), 0);
}
