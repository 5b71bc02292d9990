//! Response parsing.
//!
//! # Design
//! Responses are small XML documents. They are read with `quick-xml` into an
//! owned tree that is already normalized: entities resolved, adjacent text
//! and CDATA merged, whitespace-only text nodes dropped. Field lookups can
//! then rely on "first child" meaning the first *meaningful* child.
//!
//! The error envelope is checked in `parse_response` itself, so a caller that
//! holds an `ApiResponse` knows the call succeeded.

use std::borrow::Cow;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::error::{ApiError, Result, StructuredError};

/// Element that signals a failed remote call.
pub const ERROR_TAG: &str = "error_response";

/// A node in a parsed response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    Text(String),
}

impl Node {
    pub fn text_content(&self) -> Cow<'_, str> {
        match self {
            Node::Text(text) => Cow::Borrowed(text),
            Node::Element(element) => element.text_content(),
        }
    }

    pub fn as_element(&self) -> Option<&Element> {
        match self {
            Node::Element(element) => Some(element),
            Node::Text(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<Node>,
}

impl Element {
    fn new(name: String, attributes: Vec<(String, String)>) -> Self {
        Self {
            name,
            attributes,
            children: Vec::new(),
        }
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn first_child(&self) -> Option<&Node> {
        self.children.first()
    }

    /// Concatenated text of all descendants.
    pub fn text_content(&self) -> Cow<'_, str> {
        match self.children.as_slice() {
            [] => Cow::Borrowed(""),
            [Node::Text(text)] => Cow::Borrowed(text),
            children => {
                let mut out = String::new();
                for child in children {
                    out.push_str(&child.text_content());
                }
                Cow::Owned(out)
            }
        }
    }

    /// Child elements, skipping text.
    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(Node::as_element)
    }

    /// This element and its descendants named `name`, in document order.
    pub fn descendants_named<'a>(&'a self, name: &'a str) -> Vec<&'a Element> {
        let mut found = Vec::new();
        self.collect_named(name, &mut found);
        found
    }

    fn collect_named<'a>(&'a self, name: &str, found: &mut Vec<&'a Element>) {
        if self.name == name {
            found.push(self);
        }
        for child in self.elements() {
            child.collect_named(name, found);
        }
    }

    /// First element named `name`, searching this element and its descendants.
    pub fn find(&self, name: &str) -> Option<&Element> {
        if self.name == name {
            return Some(self);
        }
        self.elements().find_map(|child| child.find(name))
    }

    fn push_text(&mut self, text: &str) {
        if let Some(Node::Text(last)) = self.children.last_mut() {
            last.push_str(text);
        } else {
            self.children.push(Node::Text(text.to_string()));
        }
    }

    fn strip_empty_text(&mut self) {
        self.children.retain(|child| match child {
            Node::Text(text) => !text.trim().is_empty(),
            Node::Element(_) => true,
        });
        for child in &mut self.children {
            if let Node::Element(element) = child {
                element.strip_empty_text();
            }
        }
    }
}

/// The unparsed body of a successful call together with its tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    raw: String,
    root: Element,
}

impl ApiResponse {
    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn into_raw(self) -> String {
        self.raw
    }

    /// The document element.
    pub fn root(&self) -> &Element {
        &self.root
    }

    /// Scalar results are the text content of the document element.
    pub fn extract_string(&self) -> String {
        self.root.text_content().into_owned()
    }

    /// `true` only when the scalar is exactly `1`.
    pub fn extract_bool(&self) -> bool {
        self.root.text_content() == "1"
    }

    pub fn extract_int(&self) -> Result<i64> {
        parse_int(&self.root.text_content())
    }

    /// Text of the first element named `name`, anywhere in the tree.
    pub fn field(&self, name: &str) -> Option<String> {
        self.root
            .find(name)
            .map(|element| element.text_content().into_owned())
    }
}

pub(crate) fn parse_int(text: &str) -> Result<i64> {
    text.trim()
        .parse()
        .map_err(|_| ApiError::Parse(format!("expected an integer scalar, got {text:?}")))
}

fn decode(body: &[u8]) -> Result<&str> {
    std::str::from_utf8(body).map_err(|e| ApiError::Parse(format!("response is not UTF-8: {e}")))
}

/// Decode, parse and normalize `body`, then raise the error envelope if the
/// remote side reported failure.
pub fn parse_response(body: &[u8]) -> Result<ApiResponse> {
    let raw = decode(body)?;
    let root = parse_document(raw)?;
    check_error(&root)?;
    Ok(ApiResponse {
        raw: raw.to_string(),
        root,
    })
}

/// Read just the scalar of a response. Documents of the simple
/// `<name attrs>text</name>` shape are answered from the raw text; anything
/// else goes through `parse_response`.
pub fn parse_scalar(body: &[u8]) -> Result<String> {
    let raw = decode(body)?;
    if let Some(text) = scalar_fast_path(raw) {
        return Ok(text.to_string());
    }
    parse_response(body).map(|response| response.extract_string())
}

pub fn parse_bool(body: &[u8]) -> Result<bool> {
    parse_scalar(body).map(|text| text == "1")
}

pub fn parse_int_scalar(body: &[u8]) -> Result<i64> {
    parse_int(&parse_scalar(body)?)
}

/// Raise the error envelope, if present anywhere in the tree.
pub fn check_error(root: &Element) -> Result<()> {
    let Some(envelope) = root.find(ERROR_TAG) else {
        return Ok(());
    };
    let mut fields = envelope.children.iter();
    let code_node = fields
        .next()
        .ok_or_else(|| ApiError::Parse("error envelope has no code".to_string()))?;
    let code_text = match code_node {
        Node::Element(element) => element
            .first_child()
            .map(Node::text_content)
            .unwrap_or_default(),
        Node::Text(text) => Cow::Borrowed(text.as_str()),
    };
    let code = code_text
        .trim()
        .parse()
        .map_err(|_| ApiError::Parse(format!("error code is not numeric: {code_text:?}")))?;
    let message = fields
        .next()
        .map(|node| node.text_content().into_owned())
        .unwrap_or_default();
    Err(StructuredError::new(code, message).into())
}

/// Parse `text` into a normalized element tree.
pub fn parse_document(text: &str) -> Result<Element> {
    let mut reader = Reader::from_str(text);
    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| ApiError::Parse(format!("at byte {}: {e}", reader.buffer_position())))?;
        match event {
            Event::Start(start) => stack.push(open_element(&start)?),
            Event::Empty(start) => {
                let element = open_element(&start)?;
                close_element(element, &mut stack, &mut root)?;
            }
            Event::End(_) => {
                let element = stack
                    .pop()
                    .ok_or_else(|| ApiError::Parse("unexpected closing tag".to_string()))?;
                close_element(element, &mut stack, &mut root)?;
            }
            Event::Text(text) => {
                let text = text
                    .unescape()
                    .map_err(|e| ApiError::Parse(format!("bad entity: {e}")))?;
                append_text(&text, &mut stack)?;
            }
            Event::CData(data) => {
                let bytes = data.into_inner();
                let text = std::str::from_utf8(&bytes)
                    .map_err(|e| ApiError::Parse(format!("CDATA is not UTF-8: {e}")))?;
                append_text(text, &mut stack)?;
            }
            Event::Eof => break,
            Event::Decl(_) | Event::PI(_) | Event::Comment(_) | Event::DocType(_) => {}
        }
    }

    if let Some(open) = stack.last() {
        return Err(ApiError::Parse(format!("unclosed element <{}>", open.name)));
    }
    let mut root = root.ok_or_else(|| ApiError::Parse("document has no root element".to_string()))?;
    root.strip_empty_text();
    Ok(root)
}

fn open_element(start: &BytesStart<'_>) -> Result<Element> {
    let name = String::from_utf8_lossy(start.local_name().as_ref()).into_owned();
    let mut attributes = Vec::new();
    for attr in start.attributes() {
        let attr = attr.map_err(|e| ApiError::Parse(format!("bad attribute on <{name}>: {e}")))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|e| ApiError::Parse(format!("bad attribute value on <{name}>: {e}")))?
            .into_owned();
        attributes.push((key, value));
    }
    Ok(Element::new(name, attributes))
}

fn close_element(element: Element, stack: &mut [Element], root: &mut Option<Element>) -> Result<()> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(Node::Element(element)),
        None if root.is_none() => *root = Some(element),
        None => return Err(ApiError::Parse("more than one root element".to_string())),
    }
    Ok(())
}

fn append_text(text: &str, stack: &mut [Element]) -> Result<()> {
    match stack.last_mut() {
        Some(parent) => parent.push_text(text),
        None if text.trim().is_empty() => {}
        None => return Err(ApiError::Parse("text outside the root element".to_string())),
    }
    Ok(())
}

/// Scalar of a `[<?xml ...?>]<name attrs>text</name>` document, read without
/// building a tree. Returns `None` for every other shape, including any text
/// that would need entity resolution.
fn scalar_fast_path(raw: &str) -> Option<&str> {
    let mut rest = raw.trim();
    if let Some(after_decl) = rest.strip_prefix("<?xml") {
        rest = after_decl[after_decl.find("?>")? + 2..].trim_start();
    }
    let rest = rest.strip_prefix('<')?;
    let tag_end = rest.find('>')?;
    let tag = &rest[..tag_end];
    if tag.starts_with(['/', '!', '?']) {
        return None;
    }
    let name_len = tag.find(|c: char| c.is_whitespace()).unwrap_or(tag.len());
    let name = &tag[..name_len];
    // Prefixed names go to the full parse, which matches on the local name.
    if name.is_empty() || name == ERROR_TAG || name.contains(['/', '"', '\'', '=', ':']) {
        return None;
    }
    let attributes_ok = BytesStart::from_content(tag, name_len)
        .attributes()
        .all(|attr| attr.is_ok());
    if !attributes_ok {
        return None;
    }

    let body = &rest[tag_end + 1..];
    let text_end = body.find('<')?;
    let text = &body[..text_end];
    if text.contains('&') || text.contains('>') {
        return None;
    }
    let closing = body[text_end..].strip_prefix("</")?.strip_prefix(name)?;
    if !closing.strip_prefix('>')?.trim().is_empty() {
        return None;
    }
    // Whitespace-only text is stripped by the full parse.
    Some(if text.trim().is_empty() { "" } else { text })
}
