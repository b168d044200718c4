//! Minimal in-memory XML tree with ElementTree-style path lookups.
//!
//! Patent documents are small enough to hold in memory, and the field
//! fallback chains need random access (`.//a/b/c` lookups), so the quick-xml
//! event stream is folded into a tree once per file.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

/// A node in the tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Element(Element),
    Text(String),
}

/// An XML element. Names are stored without namespace prefixes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Element {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<Node>,
}

impl Element {
    /// Parse a complete document and return its root element.
    pub fn parse(bytes: &[u8]) -> Result<Element, String> {
        let mut reader = Reader::from_reader(bytes);
        let mut buf = Vec::new();
        let mut stack: Vec<Element> = Vec::new();
        let mut root: Option<Element> = None;

        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Start(e)) => stack.push(open_element(&e)),
                Ok(Event::Empty(e)) => {
                    let element = open_element(&e);
                    attach(&mut stack, &mut root, element)?;
                }
                Ok(Event::End(_)) => {
                    let element = stack
                        .pop()
                        .ok_or_else(|| "unbalanced closing tag".to_string())?;
                    attach(&mut stack, &mut root, element)?;
                }
                Ok(Event::Text(e)) => {
                    let text = match e.unescape() {
                        Ok(text) => text.into_owned(),
                        // Undeclared entities are kept verbatim rather than failing the file.
                        Err(_) => String::from_utf8_lossy(&e).into_owned(),
                    };
                    push_text(&mut stack, text);
                }
                Ok(Event::CData(e)) => {
                    let text = String::from_utf8_lossy(&e.into_inner()).into_owned();
                    push_text(&mut stack, text);
                }
                Ok(Event::Eof) => break,
                Err(e) => {
                    return Err(format!(
                        "parse error at byte {}: {e}",
                        reader.buffer_position()
                    ))
                }
                _ => {}
            }
            buf.clear();
        }

        if let Some(open) = stack.last() {
            return Err(format!("unexpected end of document inside <{}>", open.name));
        }
        root.ok_or_else(|| "no root element".to_string())
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Direct child elements, in document order.
    pub fn child_elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|n| match n {
            Node::Element(e) => Some(e),
            Node::Text(_) => None,
        })
    }

    /// All descendant elements (excluding `self`) in document order.
    pub fn descendants(&self) -> Descendants<'_> {
        let mut stack: Vec<&Element> = self.child_elements().collect();
        stack.reverse();
        Descendants { stack }
    }

    /// Text that precedes the first child element, like ElementTree's `.text`.
    pub fn text(&self) -> String {
        let mut out = String::new();
        for node in &self.children {
            match node {
                Node::Text(t) => out.push_str(t),
                Node::Element(_) => break,
            }
        }
        out
    }

    /// Concatenation of every descendant text node.
    pub fn all_text(&self) -> String {
        let mut out = String::new();
        collect_text(self, &mut out);
        out
    }

    /// Equivalent of ElementTree `find(".//p0/p1/...")`: the first descendant
    /// named `path[0]` that has the child chain `path[1..]`.
    pub fn find(&self, path: &[&str]) -> Option<&Element> {
        let (head, rest) = path.split_first()?;
        self.descendants()
            .filter(|e| e.name == *head)
            .find_map(|e| e.find_children(rest))
    }

    /// Equivalent of ElementTree `findall(".//p0/p1/...")`.
    pub fn find_all(&self, path: &[&str]) -> Vec<&Element> {
        let Some((head, rest)) = path.split_first() else {
            return Vec::new();
        };
        let mut out = Vec::new();
        for candidate in self.descendants().filter(|e| e.name == *head) {
            candidate.collect_children(rest, &mut out);
        }
        out
    }

    /// Trimmed direct text of the element at `path`, or empty.
    pub fn path_text(&self, path: &[&str]) -> String {
        self.find(path)
            .map(|e| e.text().trim().to_string())
            .unwrap_or_default()
    }

    fn find_children(&self, path: &[&str]) -> Option<&Element> {
        match path.split_first() {
            None => Some(self),
            Some((head, rest)) => self
                .child_elements()
                .filter(|c| c.name == *head)
                .find_map(|c| c.find_children(rest)),
        }
    }

    fn collect_children<'a>(&'a self, path: &[&str], out: &mut Vec<&'a Element>) {
        match path.split_first() {
            None => out.push(self),
            Some((head, rest)) => {
                for child in self.child_elements().filter(|c| c.name == *head) {
                    child.collect_children(rest, out);
                }
            }
        }
    }
}

/// Pre-order iterator over descendant elements.
pub struct Descendants<'a> {
    stack: Vec<&'a Element>,
}

impl<'a> Iterator for Descendants<'a> {
    type Item = &'a Element;

    fn next(&mut self) -> Option<&'a Element> {
        let next = self.stack.pop()?;
        let mut children: Vec<&Element> = next.child_elements().collect();
        children.reverse();
        self.stack.extend(children);
        Some(next)
    }
}

fn open_element(e: &BytesStart<'_>) -> Element {
    let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
    let attributes = e
        .attributes()
        .flatten()
        .map(|a| {
            let key = String::from_utf8_lossy(a.key.local_name().as_ref()).into_owned();
            let value = a
                .unescape_value()
                .map(|v| v.into_owned())
                .unwrap_or_else(|_| String::from_utf8_lossy(&a.value).into_owned());
            (key, value)
        })
        .collect();
    Element {
        name,
        attributes,
        children: Vec::new(),
    }
}

fn attach(stack: &mut [Element], root: &mut Option<Element>, element: Element) -> Result<(), String> {
    match stack.last_mut() {
        Some(parent) => {
            parent.children.push(Node::Element(element));
            Ok(())
        }
        None if root.is_none() => {
            *root = Some(element);
            Ok(())
        }
        None => Err("multiple root elements".to_string()),
    }
}

fn push_text(stack: &mut [Element], text: String) {
    // Text outside the root (whitespace between prolog and root) is dropped.
    if let Some(parent) = stack.last_mut() {
        parent.children.push(Node::Text(text));
    }
}

fn collect_text(element: &Element, out: &mut String) {
    for node in &element.children {
        match node {
            Node::Text(t) => out.push_str(t),
            Node::Element(e) => collect_text(e, out),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<root>
  <a><b><c>first</c></b></a>
  <x><a><b><c>second</c></b></a></x>
  <note lang="zh">lead<i>inner</i>tail</note>
</root>"#;

    #[test]
    fn test_find_first_in_document_order() {
        let root = Element::parse(DOC.as_bytes()).unwrap();
        assert_eq!(root.path_text(&["a", "b", "c"]), "first");
        assert_eq!(root.find_all(&["a", "b", "c"]).len(), 2);
        assert_eq!(root.path_text(&["a", "missing"]), "");
    }

    #[test]
    fn test_text_variants() {
        let root = Element::parse(DOC.as_bytes()).unwrap();
        let note = root.find(&["note"]).unwrap();
        assert_eq!(note.text(), "lead");
        assert_eq!(note.all_text(), "leadinnertail");
        assert_eq!(note.attr("lang"), Some("zh"));
    }

    #[test]
    fn test_malformed_documents_are_errors() {
        assert!(Element::parse(b"<a><b></a>").is_err());
        assert!(Element::parse(b"<a>").is_err());
        assert!(Element::parse(b"").is_err());
        assert!(Element::parse(b"plain text").is_err());
    }

    #[test]
    fn test_fuzz_never_panics() {
        let inputs = ["<", "<<<>>>", "<a/><b/>", "\x00\x01", "<a x=\"1></a>", "<a>&bogus;</a>"];
        for input in inputs {
            let _ = Element::parse(input.as_bytes());
        }
    }
}
