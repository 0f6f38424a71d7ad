use std::collections::HashSet;
use std::sync::LazyLock;

use ego_tree::{NodeId, NodeRef};
use regex::Regex;
use scraper::Html;
use scraper::node::{Element, Node as DomNode};

/// Block-level tags that define the paragraph context of an extracted
/// fragment.
const BLOCK_TAGS: [&str; 8] = ["p", "div", "h1", "h2", "h3", "h4", "h5", "h6"];

/// Tags serialized without a closing tag.
const VOID_TAGS: [&str; 8] = ["area", "base", "br", "col", "embed", "hr", "img", "input"];

static BACKGROUND_COLOR_PROPERTY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)background-color\s*:\s*[^;]*;?").expect("style pattern"));

/// An owned copy of an extracted subtree. Highlight detection and style
/// stripping are pure functions over this tree; the parsed document is never
/// mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fragment {
    Element {
        tag: String,
        attrs: Vec<(String, String)>,
        children: Vec<Fragment>,
    },
    Text(String),
}

impl Fragment {
    pub fn render(&self) -> String {
        let mut out = String::new();
        self.render_into(&mut out);
        out
    }

    fn render_into(&self, out: &mut String) {
        match self {
            Self::Text(text) => out.push_str(&escape_text(text)),
            Self::Element {
                tag,
                attrs,
                children,
            } => {
                out.push('<');
                out.push_str(tag);
                for (name, value) in attrs {
                    out.push(' ');
                    out.push_str(name);
                    out.push_str("=\"");
                    out.push_str(&escape_attribute(value));
                    out.push('"');
                }
                out.push('>');
                if VOID_TAGS.contains(&tag.as_str()) {
                    return;
                }
                for child in children {
                    child.render_into(out);
                }
                out.push_str("</");
                out.push_str(tag);
                out.push('>');
            }
        }
    }
}

/// Remove `background-color` from the fragment's `style` attribute and from
/// all descendant styles. Every other style property and attribute is kept
/// verbatim; a style attribute emptied by the removal is dropped entirely.
pub fn strip_background_color(fragment: &mut Fragment) {
    if let Fragment::Element { attrs, children, .. } = fragment {
        attrs.retain_mut(|(name, value)| {
            if !name.eq_ignore_ascii_case("style") {
                return true;
            }
            let cleaned = BACKGROUND_COLOR_PROPERTY.replace_all(value, "");
            let cleaned = cleaned.trim().trim_end_matches(';').trim_end().to_string();
            if cleaned.is_empty() {
                false
            } else {
                *value = cleaned;
                true
            }
        });
        for child in children {
            strip_background_color(child);
        }
    }
}

/// Rewrite a rich-text note body into a digest of its highlighted spans and
/// hyperlinks, grouped by the source paragraph they came from. Returns `None`
/// when nothing in the body qualifies, in which case the caller leaves the
/// note untouched.
pub fn extract_key_passages(body: &str) -> Option<String> {
    let document = Html::parse_fragment(body);
    let mut consumed: HashSet<NodeId> = HashSet::new();
    let mut extracted: Vec<ExtractedFragment> = Vec::new();

    for node in document.root_element().descendants() {
        if consumed.contains(&node.id()) {
            continue;
        }
        let element = match node.value() {
            DomNode::Element(element) => element,
            _ => continue,
        };
        if !qualifies(element) {
            continue;
        }
        // Consume the whole subtree so a link inside a highlighted span is
        // extracted exactly once, as part of the span.
        consumed.insert(node.id());
        for descendant in node.descendants().skip(1) {
            consumed.insert(descendant.id());
        }

        let context = paragraph_context(&node);
        let Some(mut copy) = copy_subtree(&node) else {
            continue;
        };
        strip_background_color(&mut copy);
        extracted.push(ExtractedFragment { copy, context });
    }

    if extracted.is_empty() {
        return None;
    }

    let paragraphs = group_into_paragraphs(&extracted);
    if paragraphs.is_empty() {
        return None;
    }
    Some(paragraphs.join("\n"))
}

struct ExtractedFragment {
    copy: Fragment,
    context: Option<ParagraphContext>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ParagraphContext {
    id: NodeId,
    tag: String,
}

fn qualifies(element: &Element) -> bool {
    if let Some(style) = element.attr("style")
        && style.to_ascii_lowercase().contains("background-color")
    {
        return true;
    }
    element.name() == "a"
        && element
            .attr("href")
            .is_some_and(|href| !href.trim().is_empty())
}

/// Nearest ancestor block element in the original tree. Fragments with no
/// block ancestor share a single unkeyed context.
fn paragraph_context(node: &NodeRef<'_, DomNode>) -> Option<ParagraphContext> {
    node.ancestors().find_map(|ancestor| match ancestor.value() {
        DomNode::Element(element) if BLOCK_TAGS.contains(&element.name()) => {
            Some(ParagraphContext {
                id: ancestor.id(),
                tag: element.name().to_string(),
            })
        }
        _ => None,
    })
}

fn copy_subtree(node: &NodeRef<'_, DomNode>) -> Option<Fragment> {
    match node.value() {
        DomNode::Element(element) => {
            let children = node
                .children()
                .filter_map(|child| copy_subtree(&child))
                .collect();
            Some(Fragment::Element {
                tag: element.name().to_string(),
                attrs: element
                    .attrs()
                    .map(|(name, value)| (name.to_string(), value.to_string()))
                    .collect(),
                children,
            })
        }
        DomNode::Text(text) => Some(Fragment::Text(text.to_string())),
        _ => None,
    }
}

/// Accumulate consecutive fragments that share a paragraph context into one
/// output block, preserving the original block tag for `p`/`div` only.
fn group_into_paragraphs(extracted: &[ExtractedFragment]) -> Vec<String> {
    let mut paragraphs = Vec::new();
    let mut current: Vec<String> = Vec::new();
    let mut current_context: Option<&Option<ParagraphContext>> = None;

    for fragment in extracted {
        if current_context.is_some_and(|context| context != &fragment.context) {
            flush_group(&mut paragraphs, &mut current, current_context);
        }
        current_context = Some(&fragment.context);
        current.push(fragment.copy.render());
    }
    flush_group(&mut paragraphs, &mut current, current_context);
    paragraphs
}

fn flush_group(
    paragraphs: &mut Vec<String>,
    current: &mut Vec<String>,
    context: Option<&Option<ParagraphContext>>,
) {
    if current.is_empty() {
        return;
    }
    let content = current.join(" ");
    current.clear();
    let content = content.trim();
    if content.is_empty() {
        return;
    }
    let tag = match context {
        Some(Some(context)) if context.tag == "p" || context.tag == "div" => context.tag.as_str(),
        _ => "p",
    };
    paragraphs.push(format!("<{tag}>{content}</{tag}>"));
}

fn escape_text(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn escape_attribute(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
}
