//! A minimal element tree on top of `quick-xml`.
//!
//! Linker descriptors are small, so they are read into an owned tree once and then walked
//! with plain iterators. Each element remembers the line it starts on for diagnostics.

use std::borrow::Cow;

use quick_xml::{
    events::{BytesStart, Event},
    Reader,
};

use crate::{Error, Result};

/// An XML element with its attributes, child elements and text.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct XmlElement {
    /// Element name.
    pub name: String,
    /// Attributes in document order.
    pub attributes: Vec<(String, String)>,
    /// Child elements in document order.
    pub children: Vec<XmlElement>,
    /// Concatenated text content.
    pub text: String,
    /// 1-based line of the start tag.
    pub line: u32,
}

impl XmlElement {
    /// Returns the value of attribute `name`.
    #[must_use]
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Returns the value of attribute `name` when it is present and not blank.
    #[must_use]
    pub fn non_empty_attr(&self, name: &str) -> Option<&str> {
        self.attr(name).map(str::trim).filter(|v| !v.is_empty())
    }

    /// Iterates over child elements called `name`.
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlElement> {
        self.children.iter().filter(move |child| child.name == name)
    }

    /// Parses `text` and returns the root element.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Xml`] if the text is not well-formed or has no root element.
    pub fn parse(text: &str, source_name: &str) -> Result<XmlElement> {
        let mut reader = Reader::from_str(text);
        reader.config_mut().trim_text(true);

        let mut stack: Vec<XmlElement> = Vec::new();
        let mut root: Option<XmlElement> = None;

        loop {
            let event = reader.read_event().map_err(|e| {
                let line = line_of(text, reader.buffer_position() as usize);
                Error::xml(source_name, format!("line {line}: {e}"))
            })?;

            match event {
                Event::Start(start) => {
                    let line = tag_line(text, reader.buffer_position() as usize);
                    let element = open(&start, line, source_name)?;
                    stack.push(element);
                }
                Event::Empty(start) => {
                    let line = tag_line(text, reader.buffer_position() as usize);
                    let element = open(&start, line, source_name)?;
                    attach(&mut stack, &mut root, element, source_name)?;
                }
                Event::End(_) => {
                    let Some(element) = stack.pop() else {
                        return Err(Error::xml(source_name, "unbalanced end tag"));
                    };
                    attach(&mut stack, &mut root, element, source_name)?;
                }
                Event::Text(content) => {
                    let value = content.unescape().map_err(|e| Error::xml(source_name, e))?;
                    if let Some(current) = stack.last_mut() {
                        current.text.push_str(&value);
                    }
                }
                Event::CData(content) => {
                    if let Some(current) = stack.last_mut() {
                        current
                            .text
                            .push_str(&String::from_utf8_lossy(&content.into_inner()));
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if !stack.is_empty() {
            return Err(Error::xml(source_name, "unexpected end of document"));
        }
        root.ok_or_else(|| Error::xml(source_name, "document has no root element"))
    }
}

fn line_of(text: &str, position: usize) -> u32 {
    let end = position.min(text.len());
    let newlines = text.as_bytes()[..end].iter().filter(|b| **b == b'\n').count();
    u32::try_from(newlines + 1).unwrap_or(u32::MAX)
}

/// Line of the tag ending at `end`. Attribute values cannot hold a raw `<`, so the last one
/// before `end` opens the tag.
fn tag_line(text: &str, end: usize) -> u32 {
    let end = end.min(text.len());
    let start = text.as_bytes()[..end]
        .iter()
        .rposition(|b| *b == b'<')
        .unwrap_or(0);
    line_of(text, start)
}

fn open(start: &BytesStart<'_>, line: u32, source_name: &str) -> Result<XmlElement> {
    let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
    let mut attributes = Vec::new();
    for attribute in start.attributes() {
        let attribute = attribute.map_err(|e| Error::xml(source_name, e))?;
        let key = String::from_utf8_lossy(attribute.key.as_ref()).into_owned();
        let value: Cow<'_, str> = attribute
            .unescape_value()
            .map_err(|e| Error::xml(source_name, e))?;
        attributes.push((key, value.into_owned()));
    }

    Ok(XmlElement {
        name,
        attributes,
        children: Vec::new(),
        text: String::new(),
        line,
    })
}

fn attach(
    stack: &mut [XmlElement],
    root: &mut Option<XmlElement>,
    element: XmlElement,
    source_name: &str,
) -> Result<()> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None if root.is_none() => *root = Some(element),
        None => return Err(Error::xml(source_name, "more than one root element")),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_tree() {
        let text = r#"<?xml version="1.0"?>
<linker>
  <assembly fullname="App">
    <type fullname="Ns.A" preserve="fields" />
    <type fullname="Ns.B"><method name="Run" /></type>
  </assembly>
  <!-- comment -->
  <note>a &amp; b</note>
</linker>"#;
        let root = XmlElement::parse(text, "test.xml").unwrap();
        assert_eq!(root.name, "linker");
        let assembly = root.children_named("assembly").next().unwrap();
        assert_eq!(assembly.attr("fullname"), Some("App"));
        assert_eq!(assembly.line, 3);
        assert_eq!(root.line, 2);

        let types: Vec<_> = assembly.children_named("type").collect();
        assert_eq!(types.len(), 2);
        assert_eq!(types[0].attr("preserve"), Some("fields"));
        assert_eq!(types[1].children[0].attr("name"), Some("Run"));
        assert_eq!(root.children_named("note").next().unwrap().text, "a & b");
    }

    #[test]
    fn lines_follow_leading_whitespace() {
        let text = "<linker>\n\n\n    <type fullname=\"A\"\n          preserve=\"all\" />\n\n  <type fullname=\"B\">\n  </type>\n</linker>";
        let root = XmlElement::parse(text, "lines.xml").unwrap();
        let lines: Vec<u32> = root.children.iter().map(|child| child.line).collect();
        assert_eq!(root.line, 1);
        assert_eq!(lines, vec![4, 7]);
    }

    #[test]
    fn reject_broken_documents() {
        assert!(matches!(
            XmlElement::parse("<linker><assembly></linker>", "bad.xml"),
            Err(Error::Xml { .. })
        ));
        assert!(XmlElement::parse("", "empty.xml").is_err());
        assert!(XmlElement::parse("<a/><b/>", "two.xml").is_err());
    }
}
