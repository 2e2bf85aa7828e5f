use std::cmp::Ordering;

use crate::{
    error::Result,
    services::xml_tree::{Attribute, Element, Node, NodeTree, parse},
};

pub fn canonicalize_c14n11(xml: &str) -> Result<String> {
    Ok(serialize(&parse(xml)?))
}

pub fn serialize(tree: &NodeTree) -> String {
    let mut out = String::new();
    write_element(&tree.root, &mut out);
    out
}

/// Serializes a single element subtree with the same rules.
pub fn serialize_element(element: &Element) -> String {
    let mut out = String::new();
    write_element(element, &mut out);
    out
}

fn attribute_order(a: &Attribute, b: &Attribute) -> Ordering {
    match (a.is_namespace_declaration(), b.is_namespace_declaration()) {
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        // "xmlns" sorts before "xmlns:*" by byte order already
        _ => a.name.as_bytes().cmp(b.name.as_bytes()),
    }
}

fn write_element(element: &Element, out: &mut String) {
    let mut attributes: Vec<&Attribute> = element.attributes.iter().collect();
    attributes.sort_by(|a, b| attribute_order(a, b));

    out.push('<');
    out.push_str(&element.name);
    for attr in attributes {
        out.push(' ');
        out.push_str(&attr.name);
        out.push_str("=\"");
        escape_attribute(&attr.value, out);
        out.push('"');
    }
    out.push('>');

    for child in &element.children {
        match child {
            Node::Element(e) => write_element(e, out),
            Node::Text(text) => escape_text(text, out),
            Node::Comment(_) | Node::ProcessingInstruction(_) => {}
        }
    }

    out.push_str("</");
    out.push_str(&element.name);
    out.push('>');
}

fn escape_text(text: &str, out: &mut String) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\r' => out.push_str("&#xD;"),
            c => out.push(c),
        }
    }
}

fn escape_attribute(value: &str, out: &mut String) {
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\t' => out.push_str("&#x9;"),
            '\n' => out.push_str("&#xA;"),
            '\r' => out.push_str("&#xD;"),
            c => out.push(c),
        }
    }
}
