use crate::html::{Element, Fragment, Node};
use pulldown_cmark::{CodeBlockKind, Event, HeadingLevel, Options, Parser, Tag, TagEnd};

/// Renders markdown into the fragment tree the downstream passes operate on.
/// Raw inline HTML is not passed through; the only concession is `<br>`,
/// which the upstream assistant emits for line breaks.
pub fn render_markdown(text: &str) -> Fragment {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);

    let mut builder = TreeBuilder::default();
    for event in Parser::new_ext(text, options) {
        builder.on_event(event);
    }
    builder.finish()
}

#[derive(Default)]
struct TreeBuilder {
    fragment: Fragment,
    stack: Vec<Element>,
    table_head_depth: usize,
}

// Transparent frames (empty tag) keep the stack balanced for container tags
// that have no element equivalent; their children splice into the parent.
const TRANSPARENT: &str = "";

impl TreeBuilder {
    fn on_event(&mut self, event: Event<'_>) {
        match event {
            Event::Start(tag) => self.on_start(tag),
            Event::End(end) => self.on_end(end),
            Event::Text(text) => self.append(Node::text(text.to_string())),
            Event::Code(code) => {
                self.append(Node::element(Element::new("code").text(code.to_string())));
            }
            Event::Html(html) | Event::InlineHtml(html) => self.on_raw_html(&html),
            Event::SoftBreak => self.append(Node::text("\n")),
            Event::HardBreak => self.append(Node::element(Element::new("br"))),
            Event::Rule => self.append(Node::element(Element::new("hr"))),
            Event::TaskListMarker(checked) => {
                self.append(Node::text(if checked { "[x] " } else { "[ ] " }));
            }
            Event::FootnoteReference(name) => self.append(Node::text(format!("[{}]", name))),
            _ => {}
        }
    }

    fn on_start(&mut self, tag: Tag<'_>) {
        let element = match tag {
            Tag::Paragraph => Element::new("p"),
            Tag::Heading { level, .. } => Element::new(heading_tag(level)),
            Tag::BlockQuote(_) => Element::new("blockquote"),
            Tag::CodeBlock(kind) => match kind {
                CodeBlockKind::Fenced(lang) if !lang.is_empty() => {
                    Element::new("code").class(format!("language-{}", lang))
                }
                _ => Element::new("code"),
            },
            Tag::List(Some(start)) => {
                let ol = Element::new("ol");
                if start != 1 {
                    ol.attr("start", start.to_string())
                } else {
                    ol
                }
            }
            Tag::List(None) => Element::new("ul"),
            Tag::Item => Element::new("li"),
            Tag::Table(_) => Element::new("table"),
            Tag::TableHead => {
                self.table_head_depth += 1;
                self.stack.push(Element::new("thead"));
                Element::new("tr")
            }
            Tag::TableRow => Element::new("tr"),
            Tag::TableCell => {
                if self.table_head_depth > 0 {
                    Element::new("th")
                } else {
                    Element::new("td")
                }
            }
            Tag::Emphasis => Element::new("em"),
            Tag::Strong => Element::new("strong"),
            Tag::Strikethrough => Element::new("del"),
            Tag::Link {
                dest_url, title, ..
            } => {
                let anchor = Element::new("a").attr("href", dest_url.to_string());
                if title.is_empty() {
                    anchor
                } else {
                    anchor.attr("title", title.to_string())
                }
            }
            Tag::Image { dest_url, .. } => Element::new("img").attr("src", dest_url.to_string()),
            _ => Element::new(TRANSPARENT),
        };
        self.stack.push(element);
    }

    fn on_end(&mut self, end: TagEnd) {
        match end {
            TagEnd::CodeBlock => {
                if let Some(code) = self.stack.pop() {
                    self.append(Node::element(Element::new("pre").child(Node::element(code))));
                }
            }
            TagEnd::TableHead => {
                // Pop the implicit header row, then the thead itself.
                if let Some(row) = self.stack.pop() {
                    if let Some(mut head) = self.stack.pop() {
                        head.children.push(Node::element(row));
                        self.append(Node::element(head));
                    }
                }
                self.table_head_depth = self.table_head_depth.saturating_sub(1);
            }
            TagEnd::Image => {
                if let Some(mut image) = self.stack.pop() {
                    let alt = image.text_content();
                    image.children.clear();
                    if !alt.is_empty() {
                        image.set_attr("alt", alt);
                    }
                    self.append(Node::element(image));
                }
            }
            _ => self.pop_one(),
        }
    }

    fn on_raw_html(&mut self, html: &str) {
        let trimmed = html.trim();
        if trimmed.eq_ignore_ascii_case("<br>") || trimmed.eq_ignore_ascii_case("<br/>") ||
            trimmed.eq_ignore_ascii_case("<br />")
        {
            self.append(Node::element(Element::new("br")));
        } else if !trimmed.is_empty() {
            self.append(Node::text(html.to_string()));
        }
    }

    fn pop_one(&mut self) {
        let Some(element) = self.stack.pop() else {
            return;
        };
        if element.tag == TRANSPARENT {
            for child in element.children {
                self.append(child);
            }
        } else {
            self.append(Node::element(element));
        }
    }

    fn append(&mut self, node: Node) {
        match self.stack.last_mut() {
            Some(parent) => parent.children.push(node),
            None => self.fragment.push(node),
        }
    }

    fn finish(mut self) -> Fragment {
        while !self.stack.is_empty() {
            self.pop_one();
        }
        self.fragment
    }
}

fn heading_tag(level: HeadingLevel) -> &'static str {
    match level {
        HeadingLevel::H1 => "h1",
        HeadingLevel::H2 => "h2",
        HeadingLevel::H3 => "h3",
        HeadingLevel::H4 => "h4",
        HeadingLevel::H5 => "h5",
        HeadingLevel::H6 => "h6",
    }
}
