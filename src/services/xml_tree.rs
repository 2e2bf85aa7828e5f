//! Minimal owned XML tree.
//!
//! Parsing is delegated to quick-xml; this module only keeps the structure
//! the canonicalizer and the extractors need and rejects anything that is
//! not a single well-formed document.

use quick_xml::{Reader, events::Event};

use crate::error::{ComplianceError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    /// Qualified name as written, e.g. `xmlns:cbc` or `schemeID`.
    pub name: String,
    /// Unescaped value.
    pub value: String,
}

impl Attribute {
    pub fn is_namespace_declaration(&self) -> bool {
        self.name == "xmlns" || self.name.starts_with("xmlns:")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    Text(String),
    Comment(String),
    ProcessingInstruction(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub name: String,
    pub attributes: Vec<Attribute>,
    pub children: Vec<Node>,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Element {
            name: name.into(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn local_name(&self) -> &str {
        local_name(&self.name)
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.value.as_str())
    }

    pub fn child_elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|node| match node {
            Node::Element(e) => Some(e),
            _ => None,
        })
    }

    /// First direct child with the given local name.
    pub fn child(&self, local: &str) -> Option<&Element> {
        self.child_elements().find(|e| e.local_name() == local)
    }

    /// Follows a path of local names through direct children.
    pub fn path(&self, locals: &[&str]) -> Option<&Element> {
        locals
            .iter()
            .try_fold(self, |element, local| element.child(local))
    }

    /// Concatenated text of the direct text children.
    pub fn text(&self) -> String {
        self.children
            .iter()
            .filter_map(|node| match node {
                Node::Text(t) => Some(t.as_str()),
                _ => None,
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeTree {
    pub root: Element,
}

pub fn local_name(qualified: &str) -> &str {
    qualified
        .rsplit_once(':')
        .map_or(qualified, |(_, local)| local)
}

fn utf8(bytes: &[u8]) -> Result<String> {
    String::from_utf8(bytes.to_vec()).map_err(|e| ComplianceError::Parse(e.to_string()))
}

fn attach(stack: &mut [Element], root: &mut Option<Element>, element: Element) -> Result<()> {
    match stack.last_mut() {
        Some(parent) => {
            parent.children.push(Node::Element(element));
            Ok(())
        }
        None if root.is_some() => Err(ComplianceError::Parse(format!(
            "second root element <{}>",
            element.name
        ))),
        None => {
            *root = Some(element);
            Ok(())
        }
    }
}

fn push_text(stack: &mut [Element], text: String) -> Result<()> {
    if text.chars().all(char::is_whitespace) {
        return Ok(());
    }
    let Some(parent) = stack.last_mut() else {
        return Err(ComplianceError::Parse(format!(
            "text outside the root element: {:?}",
            text.trim()
        )));
    };
    // adjacent text and CDATA runs form one node
    if let Some(Node::Text(previous)) = parent.children.last_mut() {
        previous.push_str(&text);
    } else {
        parent.children.push(Node::Text(text));
    }
    Ok(())
}

fn open_element(e: &quick_xml::events::BytesStart<'_>) -> Result<Element> {
    let mut element = Element::new(utf8(e.name().as_ref())?);
    for attr in e.attributes() {
        let attr = attr.map_err(|e| ComplianceError::Parse(e.to_string()))?;
        element.attributes.push(Attribute {
            name: utf8(attr.key.as_ref())?,
            value: attr.unescape_value()?.into_owned(),
        });
    }
    Ok(element)
}

pub fn parse(text: &str) -> Result<NodeTree> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let mut reader = Reader::from_str(text);
    {
        let cfg = reader.config_mut();
        cfg.trim_text(false);
        cfg.check_end_names = true;
        cfg.expand_empty_elements = false;
    }

    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                if stack.is_empty() && root.is_some() {
                    return Err(ComplianceError::Parse(
                        "content after the root element".to_string(),
                    ));
                }
                stack.push(open_element(&e)?);
            }
            Event::Empty(e) => {
                let element = open_element(&e)?;
                attach(&mut stack, &mut root, element)?;
            }
            Event::End(e) => {
                let name = utf8(e.name().as_ref())?;
                let element = stack.pop().ok_or_else(|| {
                    ComplianceError::Parse(format!("unexpected closing tag </{name}>"))
                })?;
                if element.name != name {
                    return Err(ComplianceError::Parse(format!(
                        "expected </{}>, found </{name}>",
                        element.name
                    )));
                }
                attach(&mut stack, &mut root, element)?;
            }
            Event::Text(e) => {
                let text = e.unescape()?.into_owned();
                push_text(&mut stack, text)?;
            }
            Event::CData(e) => {
                let text = utf8(&e.into_inner())?;
                push_text(&mut stack, text)?;
            }
            Event::Comment(e) => {
                if let Some(parent) = stack.last_mut() {
                    parent.children.push(Node::Comment(utf8(&e)?));
                }
            }
            Event::PI(e) => {
                if let Some(parent) = stack.last_mut() {
                    parent
                        .children
                        .push(Node::ProcessingInstruction(utf8(&e)?));
                }
            }
            Event::Decl(_) | Event::DocType(_) => {}
            Event::Eof => break,
        }
    }

    if let Some(open) = stack.last() {
        return Err(ComplianceError::Parse(format!(
            "unterminated element <{}>",
            open.name
        )));
    }
    root.map(|root| NodeTree { root })
        .ok_or_else(|| ComplianceError::Parse("document has no root element".to_string()))
}
