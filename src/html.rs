use std::fmt::Write as _;

const VOID_TAGS: &[&str] = &["br", "hr", "img", "input", "meta"];

/// One node of a rendered message fragment. The formatting passes are pure
/// transforms over this tree; serialization to HTML happens once at the end.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Element(Element),
    Text(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub tag: String,
    pub attrs: Vec<(String, String)>,
    pub children: Vec<Node>,
}

impl Element {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            attrs: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_attr(name, value);
        self
    }

    pub fn class(self, value: impl Into<String>) -> Self {
        self.attr("class", value)
    }

    pub fn child(mut self, node: Node) -> Self {
        self.children.push(node);
        self
    }

    pub fn text(self, value: impl Into<String>) -> Self {
        self.child(Node::Text(value.into()))
    }

    pub fn get_attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn set_attr(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        if let Some(entry) = self.attrs.iter_mut().find(|(key, _)| *key == name) {
            entry.1 = value;
        } else {
            self.attrs.push((name, value));
        }
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.get_attr("class")
            .map(|value| value.split_whitespace().any(|c| c == class))
            .unwrap_or(false)
    }

    pub fn add_class(&mut self, class: &str) {
        if self.has_class(class) {
            return;
        }
        match self.get_attr("class") {
            Some(existing) => {
                let merged = format!("{} {}", existing, class);
                self.set_attr("class", merged);
            }
            None => self.set_attr("class", class),
        }
    }

    pub fn text_content(&self) -> String {
        let mut out = String::new();
        collect_text(&self.children, &mut out);
        out
    }

    fn write_html(&self, out: &mut String) {
        out.push('<');
        out.push_str(&self.tag);
        for (name, value) in &self.attrs {
            let _ = write!(out, " {}=\"{}\"", name, escape_attr(value));
        }
        out.push('>');
        if VOID_TAGS.contains(&self.tag.as_str()) {
            return;
        }
        for child in &self.children {
            child.write_html(out);
        }
        let _ = write!(out, "</{}>", self.tag);
    }
}

impl Node {
    pub fn element(element: Element) -> Self {
        Self::Element(element)
    }

    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    pub fn as_element(&self) -> Option<&Element> {
        match self {
            Self::Element(element) => Some(element),
            Self::Text(_) => None,
        }
    }

    pub fn as_element_mut(&mut self) -> Option<&mut Element> {
        match self {
            Self::Element(element) => Some(element),
            Self::Text(_) => None,
        }
    }

    pub fn is_tag(&self, tag: &str) -> bool {
        matches!(self, Self::Element(element) if element.tag == tag)
    }

    pub fn text_content(&self) -> String {
        match self {
            Self::Element(element) => element.text_content(),
            Self::Text(text) => text.clone(),
        }
    }

    fn write_html(&self, out: &mut String) {
        match self {
            Self::Element(element) => element.write_html(out),
            Self::Text(text) => out.push_str(&escape_text(text)),
        }
    }
}

/// A rendered message: an ordered list of block-level nodes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Fragment {
    pub children: Vec<Node>,
}

impl Fragment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, node: Node) {
        self.children.push(node);
    }

    pub fn text_content(&self) -> String {
        let mut out = String::new();
        collect_text(&self.children, &mut out);
        out
    }

    pub fn to_html(&self) -> String {
        let mut out = String::new();
        for child in &self.children {
            child.write_html(&mut out);
        }
        out
    }
}

fn collect_text(nodes: &[Node], out: &mut String) {
    for node in nodes {
        match node {
            Node::Element(element) => collect_text(&element.children, out),
            Node::Text(text) => out.push_str(text),
        }
    }
}

pub fn escape_text(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

pub fn escape_attr(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
