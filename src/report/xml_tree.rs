use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::HashMap;

/// Generic element tree. No schema: only tag names, attributes and text.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct XmlNode {
    pub name: String,
    pub attributes: HashMap<String, String>,
    pub text: String,
    pub children: Vec<XmlNode>,
}

impl XmlNode {
    pub fn parse(xml: &str) -> Result<XmlNode, String> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);

        // Synthetic document node; the root element becomes its only child.
        let mut stack = vec![XmlNode::default()];

        loop {
            match reader.read_event() {
                Ok(Event::Start(ref e)) => stack.push(Self::open(e)),
                Ok(Event::Empty(ref e)) => {
                    let node = Self::open(e);
                    Self::attach(&mut stack, node);
                }
                Ok(Event::End(_)) => {
                    if stack.len() < 2 {
                        return Err("unbalanced closing tag".to_string());
                    }
                    if let Some(node) = stack.pop() {
                        Self::attach(&mut stack, node);
                    }
                }
                Ok(Event::Text(ref e)) => {
                    let text = e.unescape().map_err(|e| e.to_string())?;
                    if let Some(current) = stack.last_mut() {
                        current.text.push_str(&text);
                    }
                }
                Ok(Event::CData(ref e)) => {
                    if let Some(current) = stack.last_mut() {
                        current.text.push_str(&String::from_utf8_lossy(e));
                    }
                }
                Ok(Event::Eof) => break,
                Ok(_) => {}
                Err(e) => return Err(e.to_string()),
            }
        }

        if stack.len() != 1 {
            return Err("unexpected end of document".to_string());
        }
        stack.pop().ok_or_else(|| "empty document".to_string())
    }

    fn open(e: &BytesStart<'_>) -> XmlNode {
        let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
        let attributes = e
            .attributes()
            .flatten()
            .map(|attr| {
                let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
                let value = attr
                    .unescape_value()
                    .map(|v| v.into_owned())
                    .unwrap_or_else(|_| String::from_utf8_lossy(&attr.value).into_owned());
                (key, value)
            })
            .collect();

        XmlNode {
            name,
            attributes,
            ..Default::default()
        }
    }

    fn attach(stack: &mut [XmlNode], node: XmlNode) {
        if let Some(parent) = stack.last_mut() {
            parent.children.push(node);
        }
    }

    /// First child with the given tag name.
    pub fn child(&self, name: &str) -> Option<&XmlNode> {
        self.children.iter().find(|c| c.name == name)
    }

    /// All children with the given tag name, in document order. A single
    /// element and a repeated element come back in the same shape.
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlNode> {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// Follow a path of child names.
    pub fn find(&self, path: &[&str]) -> Option<&XmlNode> {
        path.iter().try_fold(self, |node, name| node.child(name))
    }

    /// Trimmed text of the child at `path`, if present and non-empty.
    pub fn text_at(&self, path: &[&str]) -> Option<&str> {
        self.find(path)
            .map(|n| n.text.trim())
            .filter(|t| !t.is_empty())
    }
}
