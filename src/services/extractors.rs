use crate::{
    error::{ComplianceError, Result},
    models::invoice_model::{ChainState, InvoiceSubtype, InvoiceSummary, InvoiceTypeCode},
    services::xml_tree::{Element, Node, NodeTree},
};

/// Removes everything derived from the invoice hash: the signature
/// extensions, the root-level `cac:Signature` and the QR document reference.
pub fn strip_for_hash(tree: &NodeTree) -> NodeTree {
    let mut root = tree.root.clone();
    root.children.retain(|node| match node {
        Node::Element(e) => e.local_name() != "Signature",
        _ => true,
    });
    strip_element(&mut root);
    NodeTree { root }
}

fn strip_element(element: &mut Element) {
    element.children.retain(|node| match node {
        Node::Element(e) => !(e.local_name() == "UBLExtensions" || is_document_reference(e, "QR")),
        _ => true,
    });
    for child in &mut element.children {
        if let Node::Element(e) = child {
            strip_element(e);
        }
    }
}

fn is_document_reference(element: &Element, id: &str) -> bool {
    element.local_name() == "AdditionalDocumentReference"
        && element
            .child("ID")
            .is_some_and(|e| e.text().trim() == id)
}

fn document_reference<'a>(tree: &'a NodeTree, id: &str) -> Option<&'a Element> {
    tree.root
        .child_elements()
        .find(|e| is_document_reference(e, id))
}

fn required_text(element: Option<&Element>, field: &'static str) -> Result<String> {
    let text = element
        .map(|e| e.text().trim().to_string())
        .unwrap_or_default();
    if text.is_empty() {
        return Err(ComplianceError::format(field, "missing from the document"));
    }
    Ok(text)
}

pub fn extract_pih(tree: &NodeTree) -> Result<String> {
    required_text(
        document_reference(tree, "PIH")
            .and_then(|e| e.path(&["Attachment", "EmbeddedDocumentBinaryObject"])),
        "PIH",
    )
}

pub fn extract_icv(tree: &NodeTree) -> Result<u64> {
    let raw = required_text(
        document_reference(tree, "ICV").and_then(|e| e.child("UUID")),
        "ICV",
    )?;
    raw.parse()
        .map_err(|_| ComplianceError::format("ICV", format!("`{raw}` is not a counter value")))
}

pub fn extract_chain_state(tree: &NodeTree) -> Result<ChainState> {
    Ok(ChainState {
        previous_invoice_hash: extract_pih(tree)?,
        invoice_counter_value: extract_icv(tree)?,
    })
}

/// Reads the fields needed for signing, the QR code and routing.
pub fn summarize(tree: &NodeTree) -> Result<InvoiceSummary> {
    let root = &tree.root;
    let type_element = root.child("InvoiceTypeCode");
    let type_code_raw = required_text(type_element, "InvoiceTypeCode")?;
    let type_code = InvoiceTypeCode::from_code(&type_code_raw).ok_or_else(|| {
        ComplianceError::format(
            "InvoiceTypeCode",
            format!("unsupported type code `{type_code_raw}`"),
        )
    })?;
    let subtype_raw = type_element
        .and_then(|e| e.attribute("name"))
        .unwrap_or_default();
    let subtype = InvoiceSubtype::from_code(subtype_raw).ok_or_else(|| {
        ComplianceError::format(
            "InvoiceTypeCode@name",
            format!("unsupported subtype `{subtype_raw}`"),
        )
    })?;

    let seller = root.path(&["AccountingSupplierParty", "Party"]);
    let seller_name = required_text(
        seller.and_then(|p| p.path(&["PartyLegalEntity", "RegistrationName"])),
        "seller RegistrationName",
    )?;
    let seller_vat_number = required_text(
        seller.and_then(|p| p.path(&["PartyTaxScheme", "CompanyID"])),
        "seller CompanyID",
    )?;

    Ok(InvoiceSummary {
        uuid: required_text(root.child("UUID"), "UUID")?,
        type_code,
        subtype,
        seller_name,
        seller_vat_number,
        issue_date: required_text(root.child("IssueDate"), "IssueDate")?,
        issue_time: required_text(root.child("IssueTime"), "IssueTime")?,
        total_with_vat: required_text(
            root.path(&["LegalMonetaryTotal", "TaxInclusiveAmount"]),
            "TaxInclusiveAmount",
        )?,
        total_vat: required_text(root.path(&["TaxTotal", "TaxAmount"]), "TaxAmount")?,
        chain: extract_chain_state(tree)?,
    })
}
