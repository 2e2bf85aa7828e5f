//! Canned documents for the onboarding compliance run.

use chrono::NaiveDateTime;
use quick_xml::{
    Writer,
    events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event},
};
use uuid::Uuid;

use crate::{
    error::{ComplianceError, Result},
    models::invoice_model::{
        Address, ChainState, InvoiceDocument, InvoiceSubtype, InvoiceTypeCode, LineItem, Party,
    },
};

const NS_INVOICE: &str = "urn:oasis:names:specification:ubl:schema:xsd:Invoice-2";
const NS_CAC: &str = "urn:oasis:names:specification:ubl:schema:xsd:CommonAggregateComponents-2";
const NS_CBC: &str = "urn:oasis:names:specification:ubl:schema:xsd:CommonBasicComponents-2";
const NS_EXT: &str = "urn:oasis:names:specification:ubl:schema:xsd:CommonExtensionComponents-2";

const XADES_EXTENSION_URI: &str = "urn:oasis:names:specification:ubl:dsig:enveloped:xades";
const SIGNATURE_ID: &str = "urn:oasis:names:specification:ubl:signature:Invoice";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComplianceCase {
    pub subtype: InvoiceSubtype,
    pub type_code: InvoiceTypeCode,
}

impl ComplianceCase {
    pub fn label(&self) -> String {
        let subtype = match self.subtype {
            InvoiceSubtype::Standard => "standard",
            InvoiceSubtype::Simplified => "simplified",
        };
        let kind = match self.type_code {
            InvoiceTypeCode::TaxInvoice => "invoice",
            InvoiceTypeCode::DebitNote => "debit_note",
            InvoiceTypeCode::CreditNote => "credit_note",
        };
        format!("{subtype}_{kind}")
    }
}

const fn case(subtype: InvoiceSubtype, type_code: InvoiceTypeCode) -> ComplianceCase {
    ComplianceCase { subtype, type_code }
}

/// Run order matters: each case chains from the one before it.
pub const COMPLIANCE_CASES: [ComplianceCase; 6] = [
    case(InvoiceSubtype::Simplified, InvoiceTypeCode::TaxInvoice),
    case(InvoiceSubtype::Simplified, InvoiceTypeCode::DebitNote),
    case(InvoiceSubtype::Simplified, InvoiceTypeCode::CreditNote),
    case(InvoiceSubtype::Standard, InvoiceTypeCode::TaxInvoice),
    case(InvoiceSubtype::Standard, InvoiceTypeCode::DebitNote),
    case(InvoiceSubtype::Standard, InvoiceTypeCode::CreditNote),
];

fn sample_buyer() -> Party {
    Party {
        name: "Fatoora Samples LTD".to_string(),
        vat_number: Some("399999999800003".to_string()),
        commercial_registration: None,
        address: Address {
            street: "Salah Al-Din".to_string(),
            building_number: Some("1111".to_string()),
            district: "Al-Murooj".to_string(),
            city: "Riyadh".to_string(),
            postal_code: "12222".to_string(),
            country: "SA".to_string(),
        },
    }
}

pub fn sample_document(
    seller: &Party,
    case: ComplianceCase,
    chain: ChainState,
    issued_at: NaiveDateTime,
) -> InvoiceDocument {
    let counter = chain.invoice_counter_value;
    InvoiceDocument {
        uuid: Uuid::new_v4(),
        invoice_number: format!("SME{counter:05}"),
        type_code: case.type_code,
        subtype: case.subtype,
        issue_date: issued_at.date(),
        issue_time: issued_at.time(),
        currency: "SAR".to_string(),
        seller: seller.clone(),
        buyer: match case.subtype {
            InvoiceSubtype::Standard => Some(sample_buyer()),
            InvoiceSubtype::Simplified => None,
        },
        lines: vec![LineItem {
            name: "Compliance test item".to_string(),
            quantity: "1.000000".to_string(),
            unit_price: "4.00".to_string(),
            vat_category: "S".to_string(),
            vat_rate: "15.00".to_string(),
            vat_amount: "0.60".to_string(),
            total_before_vat: "4.00".to_string(),
            total_with_vat: "4.60".to_string(),
        }],
        total_before_vat: "4.00".to_string(),
        total_vat: "0.60".to_string(),
        total_with_vat: "4.60".to_string(),
        billing_reference: case
            .type_code
            .needs_billing_reference()
            .then(|| "SME00001".to_string()),
        chain,
    }
}

struct UblWriter {
    writer: Writer<Vec<u8>>,
}

fn write_error(e: impl std::fmt::Display) -> ComplianceError {
    ComplianceError::Parse(format!("failed to write XML: {e}"))
}

impl UblWriter {
    fn event(&mut self, event: Event<'_>) -> Result<()> {
        self.writer.write_event(event).map_err(write_error)
    }

    fn open(&mut self, name: &str, attrs: &[(&str, &str)]) -> Result<()> {
        let mut start = BytesStart::new(name);
        for attr in attrs {
            start.push_attribute(*attr);
        }
        self.event(Event::Start(start))
    }

    fn close(&mut self, name: &str) -> Result<()> {
        self.event(Event::End(BytesEnd::new(name)))
    }

    fn leaf_with(&mut self, name: &str, attrs: &[(&str, &str)], text: &str) -> Result<()> {
        self.open(name, attrs)?;
        if !text.is_empty() {
            self.event(Event::Text(BytesText::new(text)))?;
        }
        self.close(name)
    }

    fn leaf(&mut self, name: &str, text: &str) -> Result<()> {
        self.leaf_with(name, &[], text)
    }

    fn amount(&mut self, name: &str, currency: &str, value: &str) -> Result<()> {
        self.leaf_with(name, &[("currencyID", currency)], value)
    }

    fn tax_scheme(&mut self) -> Result<()> {
        self.open("cac:TaxScheme", &[])?;
        self.leaf("cbc:ID", "VAT")?;
        self.close("cac:TaxScheme")
    }

    fn party(&mut self, wrapper: &str, party: &Party, scheme: &str) -> Result<()> {
        self.open(wrapper, &[])?;
        self.open("cac:Party", &[])?;
        let identification = match scheme {
            "CRN" => party.commercial_registration.as_deref(),
            _ => party.vat_number.as_deref(),
        };
        if let Some(id) = identification {
            self.open("cac:PartyIdentification", &[])?;
            self.leaf_with("cbc:ID", &[("schemeID", scheme)], id)?;
            self.close("cac:PartyIdentification")?;
        }
        let address = &party.address;
        self.open("cac:PostalAddress", &[])?;
        self.leaf("cbc:StreetName", &address.street)?;
        if let Some(building) = &address.building_number {
            self.leaf("cbc:BuildingNumber", building)?;
        }
        self.leaf("cbc:CitySubdivisionName", &address.district)?;
        self.leaf("cbc:CityName", &address.city)?;
        self.leaf("cbc:PostalZone", &address.postal_code)?;
        self.open("cac:Country", &[])?;
        self.leaf("cbc:IdentificationCode", &address.country)?;
        self.close("cac:Country")?;
        self.close("cac:PostalAddress")?;
        if let Some(vat) = &party.vat_number {
            self.open("cac:PartyTaxScheme", &[])?;
            self.leaf("cbc:CompanyID", vat)?;
            self.tax_scheme()?;
            self.close("cac:PartyTaxScheme")?;
        }
        self.open("cac:PartyLegalEntity", &[])?;
        self.leaf("cbc:RegistrationName", &party.name)?;
        self.close("cac:PartyLegalEntity")?;
        self.close("cac:Party")?;
        self.close(wrapper)
    }

    fn attached_reference(&mut self, id: &str, content: &str) -> Result<()> {
        self.open("cac:AdditionalDocumentReference", &[])?;
        self.leaf("cbc:ID", id)?;
        self.open("cac:Attachment", &[])?;
        let mime = [("mimeCode", "text/plain")];
        self.leaf_with("cbc:EmbeddedDocumentBinaryObject", &mime, content)?;
        self.close("cac:Attachment")?;
        self.close("cac:AdditionalDocumentReference")
    }
}

/// Unsigned UBL 2.1 document with empty signature and QR slots.
pub fn render_unsigned(doc: &InvoiceDocument) -> Result<String> {
    let mut ubl = UblWriter {
        writer: Writer::new_with_indent(Vec::new(), b' ', 4),
    };
    let currency = doc.currency.as_str();

    ubl.event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    ubl.open(
        "Invoice",
        &[
            ("xmlns", NS_INVOICE),
            ("xmlns:cac", NS_CAC),
            ("xmlns:cbc", NS_CBC),
            ("xmlns:ext", NS_EXT),
        ],
    )?;

    ubl.open("ext:UBLExtensions", &[])?;
    ubl.open("ext:UBLExtension", &[])?;
    ubl.leaf("ext:ExtensionURI", XADES_EXTENSION_URI)?;
    ubl.leaf("ext:ExtensionContent", "")?;
    ubl.close("ext:UBLExtension")?;
    ubl.close("ext:UBLExtensions")?;

    ubl.leaf("cbc:ProfileID", "reporting:1.0")?;
    ubl.leaf("cbc:ID", &doc.invoice_number)?;
    ubl.leaf("cbc:UUID", &doc.uuid.to_string())?;
    ubl.leaf("cbc:IssueDate", &doc.issue_date.format("%Y-%m-%d").to_string())?;
    ubl.leaf("cbc:IssueTime", &doc.issue_time.format("%H:%M:%S").to_string())?;
    ubl.leaf_with(
        "cbc:InvoiceTypeCode",
        &[("name", doc.subtype.code())],
        doc.type_code.code(),
    )?;
    ubl.leaf("cbc:DocumentCurrencyCode", currency)?;
    ubl.leaf("cbc:TaxCurrencyCode", currency)?;

    if let Some(reference) = &doc.billing_reference {
        ubl.open("cac:BillingReference", &[])?;
        ubl.open("cac:InvoiceDocumentReference", &[])?;
        ubl.leaf("cbc:ID", reference)?;
        ubl.close("cac:InvoiceDocumentReference")?;
        ubl.close("cac:BillingReference")?;
    }

    ubl.open("cac:AdditionalDocumentReference", &[])?;
    ubl.leaf("cbc:ID", "ICV")?;
    ubl.leaf("cbc:UUID", &doc.chain.invoice_counter_value.to_string())?;
    ubl.close("cac:AdditionalDocumentReference")?;
    ubl.attached_reference("PIH", &doc.chain.previous_invoice_hash)?;
    ubl.attached_reference("QR", "")?;

    ubl.open("cac:Signature", &[])?;
    ubl.leaf("cbc:ID", SIGNATURE_ID)?;
    ubl.leaf("cbc:SignatureMethod", XADES_EXTENSION_URI)?;
    ubl.close("cac:Signature")?;

    ubl.party("cac:AccountingSupplierParty", &doc.seller, "CRN")?;
    match &doc.buyer {
        Some(buyer) => ubl.party("cac:AccountingCustomerParty", buyer, "VAT")?,
        None => {
            ubl.open("cac:AccountingCustomerParty", &[])?;
            ubl.close("cac:AccountingCustomerParty")?;
        }
    }

    if doc.type_code.needs_billing_reference() {
        ubl.open("cac:PaymentMeans", &[])?;
        ubl.leaf("cbc:PaymentMeansCode", "10")?;
        ubl.leaf("cbc:InstructionNote", "CANCELLATION_OR_TERMINATION")?;
        ubl.close("cac:PaymentMeans")?;
    }

    ubl.open("cac:TaxTotal", &[])?;
    ubl.amount("cbc:TaxAmount", currency, &doc.total_vat)?;
    for line in &doc.lines {
        ubl.open("cac:TaxSubtotal", &[])?;
        ubl.amount("cbc:TaxableAmount", currency, &line.total_before_vat)?;
        ubl.amount("cbc:TaxAmount", currency, &line.vat_amount)?;
        ubl.open("cac:TaxCategory", &[])?;
        ubl.leaf("cbc:ID", &line.vat_category)?;
        ubl.leaf("cbc:Percent", &line.vat_rate)?;
        ubl.tax_scheme()?;
        ubl.close("cac:TaxCategory")?;
        ubl.close("cac:TaxSubtotal")?;
    }
    ubl.close("cac:TaxTotal")?;
    ubl.open("cac:TaxTotal", &[])?;
    ubl.amount("cbc:TaxAmount", currency, &doc.total_vat)?;
    ubl.close("cac:TaxTotal")?;

    ubl.open("cac:LegalMonetaryTotal", &[])?;
    ubl.amount("cbc:LineExtensionAmount", currency, &doc.total_before_vat)?;
    ubl.amount("cbc:TaxExclusiveAmount", currency, &doc.total_before_vat)?;
    ubl.amount("cbc:TaxInclusiveAmount", currency, &doc.total_with_vat)?;
    ubl.amount("cbc:PayableAmount", currency, &doc.total_with_vat)?;
    ubl.close("cac:LegalMonetaryTotal")?;

    for (index, line) in doc.lines.iter().enumerate() {
        ubl.open("cac:InvoiceLine", &[])?;
        ubl.leaf("cbc:ID", &(index + 1).to_string())?;
        ubl.leaf_with("cbc:InvoicedQuantity", &[("unitCode", "PCE")], &line.quantity)?;
        ubl.amount("cbc:LineExtensionAmount", currency, &line.total_before_vat)?;
        ubl.open("cac:TaxTotal", &[])?;
        ubl.amount("cbc:TaxAmount", currency, &line.vat_amount)?;
        ubl.amount("cbc:RoundingAmount", currency, &line.total_with_vat)?;
        ubl.close("cac:TaxTotal")?;
        ubl.open("cac:Item", &[])?;
        ubl.leaf("cbc:Name", &line.name)?;
        ubl.open("cac:ClassifiedTaxCategory", &[])?;
        ubl.leaf("cbc:ID", &line.vat_category)?;
        ubl.leaf("cbc:Percent", &line.vat_rate)?;
        ubl.tax_scheme()?;
        ubl.close("cac:ClassifiedTaxCategory")?;
        ubl.close("cac:Item")?;
        ubl.open("cac:Price", &[])?;
        ubl.amount("cbc:PriceAmount", currency, &line.unit_price)?;
        ubl.close("cac:Price")?;
        ubl.close("cac:InvoiceLine")?;
    }

    ubl.close("Invoice")?;
    String::from_utf8(ubl.writer.into_inner()).map_err(write_error)
}
