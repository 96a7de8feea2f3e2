// src/services/xml.rs

//! Minimal owned XML element tree.
//!
//! JMA reports mix namespace prefixes (`jmx_eb:Magnitude`) with plain
//! elements, so elements are matched by local name only.

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use crate::error::{AppError, Result};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct XmlElement {
    pub name: String,
    pub text: String,
    pub children: Vec<XmlElement>,
}

impl XmlElement {
    /// Parse a document into a nameless root holding the top-level elements.
    pub fn parse(xml: &str) -> Result<Self> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);

        let mut stack = vec![XmlElement::default()];
        loop {
            match reader.read_event().map_err(|e| AppError::parse("xml", e))? {
                Event::Start(start) => stack.push(Self::from_start(&start)),
                Event::Empty(start) => {
                    let element = Self::from_start(&start);
                    if let Some(parent) = stack.last_mut() {
                        parent.children.push(element);
                    }
                }
                Event::End(_) => {
                    let element = stack
                        .pop()
                        .ok_or_else(|| AppError::parse("xml", "unbalanced end tag"))?;
                    let parent = stack
                        .last_mut()
                        .ok_or_else(|| AppError::parse("xml", "unbalanced end tag"))?;
                    parent.children.push(element);
                }
                Event::Text(text) => {
                    let text = text.unescape().map_err(|e| AppError::parse("xml", e))?;
                    if let Some(current) = stack.last_mut() {
                        current.text.push_str(&text);
                    }
                }
                Event::CData(data) => {
                    if let Some(current) = stack.last_mut() {
                        current.text.push_str(&String::from_utf8_lossy(&data.into_inner()));
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        match (stack.pop(), stack.is_empty()) {
            (Some(root), true) => Ok(root),
            _ => Err(AppError::parse("xml", "unclosed element")),
        }
    }

    fn from_start(start: &BytesStart<'_>) -> Self {
        Self {
            name: String::from_utf8_lossy(start.local_name().as_ref()).into_owned(),
            ..Self::default()
        }
    }

    pub fn text(&self) -> &str {
        self.text.trim()
    }

    /// Direct children with the given local name.
    pub fn children_named<'a, 'n>(
        &'a self,
        name: &'n str,
    ) -> impl Iterator<Item = &'a XmlElement> + use<'a, 'n> {
        self.children.iter().filter(move |child| child.name == name)
    }

    pub fn child(&self, name: &str) -> Option<&XmlElement> {
        self.children_named(name).next()
    }

    /// First descendant with the given local name, in document order.
    pub fn find(&self, name: &str) -> Option<&XmlElement> {
        self.children.iter().find_map(|child| {
            if child.name == name {
                Some(child)
            } else {
                child.find(name)
            }
        })
    }

    /// First descendant reached by `path`: the first element is searched
    /// anywhere below `self`, the rest are direct children.
    pub fn find_path(&self, path: &[&str]) -> Option<&XmlElement> {
        let (first, rest) = path.split_first()?;
        let mut current = self.find(first)?;
        for name in rest {
            current = current.child(name)?;
        }
        Some(current)
    }
}
