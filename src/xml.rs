//! XML node model and streaming article reader.
//!
//! PubMed elements are optional, repeatable and sometimes carry inline markup,
//! so every element is folded into an [`XmlNode`]: a bare leaf becomes
//! [`XmlNode::Text`], a repeated child name becomes [`XmlNode::List`] and an
//! element with attributes or children becomes [`XmlNode::Attributed`].
//! Extraction code pattern-matches on these shapes.
//!
//! [`ArticleReader`] walks the document with `quick_xml` and materialises one
//! `PubmedArticle` subtree at a time, so memory is bounded by the largest
//! article rather than the whole file.

use std::borrow::Cow;
use std::io::BufRead;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::error::{IngestError, Result};

/// Element name of one article inside a `PubmedArticleSet`.
pub const ARTICLE_ELEMENT: &[u8] = b"PubmedArticle";

/// Expected document root.
pub const ROOT_ELEMENT: &str = "PubmedArticleSet";

/// One parsed XML element, by shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XmlNode {
    /// Leaf element without attributes: its trimmed text
    Text(String),
    /// Sibling elements sharing a name, in document order
    List(Vec<XmlNode>),
    /// Element carrying attributes, children, or both
    Attributed(Element),
}

/// An element with attributes and/or child elements.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Element {
    /// Attributes in document order
    pub attributes: Vec<(String, String)>,
    /// Children by element name, repeated names folded into [`XmlNode::List`]
    pub children: Vec<(String, XmlNode)>,
    /// Text content of the element and its descendants, in document order
    pub text: String,
}

impl XmlNode {
    /// Look up a direct child element by name.
    ///
    /// On a list the lookup goes to its first item.
    #[must_use]
    pub fn child(&self, name: &str) -> Option<&Self> {
        match self {
            Self::Text(_) => None,
            Self::List(items) => items.first().and_then(|first| first.child(name)),
            Self::Attributed(element) => element
                .children
                .iter()
                .find(|(child_name, _)| child_name == name)
                .map(|(_, node)| node),
        }
    }

    /// Follow a chain of child names.
    #[must_use]
    pub fn path(&self, names: &[&str]) -> Option<&Self> {
        names.iter().try_fold(self, |node, name| node.child(name))
    }

    /// Text carried by the node, `None` when empty or when the node is a list.
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        let text = match self {
            Self::Text(text) => text.as_str(),
            Self::Attributed(element) => element.text.as_str(),
            Self::List(_) => return None,
        };
        (!text.is_empty()).then_some(text)
    }

    /// Value of an attribute, when the node carries one.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&str> {
        match self {
            Self::Attributed(element) => element
                .attributes
                .iter()
                .find(|(key, _)| key == name)
                .map(|(_, value)| value.as_str()),
            Self::Text(_) | Self::List(_) => None,
        }
    }

    /// The node's items: a list yields its elements, anything else yields itself.
    pub fn items(&self) -> impl Iterator<Item = &Self> {
        let items: &[Self] = match self {
            Self::List(items) => items,
            other => std::slice::from_ref(other),
        };
        items.iter()
    }
}

/// An element still being read.
struct Frame {
    name: String,
    attributes: Vec<(String, String)>,
    children: Vec<(String, XmlNode)>,
    text: String,
}

impl Frame {
    fn open(start: &BytesStart<'_>) -> Self {
        Self {
            name: String::from_utf8_lossy(start.name().as_ref()).into_owned(),
            attributes: read_attributes(start),
            children: Vec::new(),
            text: String::new(),
        }
    }

    /// Attach a closed child; `raw_text` is its untrimmed text, so whitespace
    /// at inline markup boundaries survives in the parent.
    fn push_child(&mut self, name: String, node: XmlNode, raw_text: &str) {
        self.text.push_str(raw_text);
        match self.children.iter_mut().find(|(child_name, _)| *child_name == name) {
            Some((_, XmlNode::List(items))) => items.push(node),
            Some((_, existing)) => {
                let first = std::mem::replace(existing, XmlNode::List(Vec::with_capacity(2)));
                *existing = XmlNode::List(vec![first, node]);
            }
            None => self.children.push((name, node)),
        }
    }

    fn close(self) -> Closed {
        let text = self.text.trim().to_string();
        let node = if self.attributes.is_empty() && self.children.is_empty() {
            XmlNode::Text(text)
        } else {
            XmlNode::Attributed(Element {
                attributes: self.attributes,
                children: self.children,
                text,
            })
        };
        Closed {
            name: self.name,
            node,
            raw_text: self.text,
        }
    }
}

/// A finished element: its node, trimmed for field reads, and its raw text.
struct Closed {
    name: String,
    node: XmlNode,
    raw_text: String,
}

fn read_attributes(start: &BytesStart<'_>) -> Vec<(String, String)> {
    start
        .attributes()
        .flatten()
        .map(|attr| {
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = attr
                .unescape_value()
                .map(Cow::into_owned)
                .unwrap_or_else(|_| String::from_utf8_lossy(&attr.value).into_owned());
            (key, value)
        })
        .collect()
}

/// Streams `PubmedArticle` subtrees out of a `PubmedArticleSet` document.
pub struct ArticleReader<R: BufRead> {
    reader: Reader<R>,
    buf: Vec<u8>,
    depth: usize,
    root: Option<String>,
    finished: bool,
}

impl<R: BufRead> ArticleReader<R> {
    /// Wrap a decompressed XML byte stream.
    pub fn new(source: R) -> Self {
        let mut reader = Reader::from_reader(source);
        reader.config_mut().trim_text(false);
        Self {
            reader,
            buf: Vec::with_capacity(8192),
            depth: 0,
            root: None,
            finished: false,
        }
    }

    /// Name of the document root, once it has been read.
    #[must_use]
    pub fn root_name(&self) -> Option<&str> {
        self.root.as_deref()
    }

    /// Read the next article, or `None` at the end of the document.
    pub fn next_article(&mut self) -> Result<Option<XmlNode>> {
        if self.finished {
            return Ok(None);
        }
        loop {
            self.buf.clear();
            let article = match self.reader.read_event_into(&mut self.buf)? {
                Event::Start(start) if start.name().as_ref() == ARTICLE_ELEMENT => Frame::open(&start),
                Event::Empty(start) if start.name().as_ref() == ARTICLE_ELEMENT => {
                    return Ok(Some(Frame::open(&start).close().node));
                }
                Event::Start(start) => {
                    if self.root.is_none() {
                        self.root = Some(String::from_utf8_lossy(start.name().as_ref()).into_owned());
                    }
                    self.depth += 1;
                    continue;
                }
                Event::End(_) => {
                    self.depth = self.depth.saturating_sub(1);
                    continue;
                }
                Event::Eof => {
                    self.finished = true;
                    if self.depth > 0 {
                        return Err(IngestError::MalformedXml(format!(
                            "document ended with {} unclosed element(s) at byte {}",
                            self.depth,
                            self.reader.buffer_position()
                        )));
                    }
                    return Ok(None);
                }
                _ => continue,
            };
            return self.read_subtree(article).map(Some);
        }
    }

    fn read_subtree(&mut self, article: Frame) -> Result<XmlNode> {
        let mut stack = vec![article];
        loop {
            self.buf.clear();
            match self.reader.read_event_into(&mut self.buf)? {
                Event::Start(start) => stack.push(Frame::open(&start)),
                Event::Empty(start) => {
                    let closed = Frame::open(&start).close();
                    if let Some(parent) = stack.last_mut() {
                        parent.push_child(closed.name, closed.node, &closed.raw_text);
                    }
                }
                Event::Text(text) => {
                    if let Some(top) = stack.last_mut() {
                        match text.unescape() {
                            Ok(unescaped) => top.text.push_str(&unescaped),
                            Err(_) => top.text.push_str(&String::from_utf8_lossy(&text)),
                        }
                    }
                }
                Event::CData(data) => {
                    if let Some(top) = stack.last_mut() {
                        top.text.push_str(&String::from_utf8_lossy(&data));
                    }
                }
                Event::End(_) => {
                    let Some(frame) = stack.pop() else {
                        return Err(IngestError::MalformedXml("unbalanced end tag".to_string()));
                    };
                    let closed = frame.close();
                    match stack.last_mut() {
                        Some(parent) => parent.push_child(closed.name, closed.node, &closed.raw_text),
                        None => return Ok(closed.node),
                    }
                }
                Event::Eof => {
                    self.finished = true;
                    return Err(IngestError::MalformedXml(format!(
                        "document ended inside an article at byte {}",
                        self.reader.buffer_position()
                    )));
                }
                _ => {}
            }
        }
    }
}

impl<R: BufRead> Iterator for ArticleReader<R> {
    type Item = Result<XmlNode>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.next_article() {
            Ok(Some(node)) => Some(Ok(node)),
            Ok(None) => None,
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}
