//! Deterministic Markdown-like rendering of a **sanitized** alert body.
//!
//! The rule set is small because the sanitizer already reduced the input to
//! a known element whitelist: headings become setext headings, lists become
//! bullet/numbered lines, blockquotes are indented two spaces per line,
//! strikethrough content is dropped, and text decorations are unwrapped.

use ego_tree::NodeRef;
use scraper::{Html, Node};

pub fn to_plaintext(html: &str) -> String {
    let fragment = Html::parse_fragment(html);
    let mut out = String::new();
    render_children(fragment.tree.root(), &mut out);
    normalize(&out)
}

fn render_children(node: NodeRef<Node>, out: &mut String) {
    for child in node.children() {
        render_node(child, out);
    }
}

fn render_node(node: NodeRef<Node>, out: &mut String) {
    match node.value() {
        Node::Text(text) => out.push_str(&text),
        Node::Element(element) => {
            let name = element.name().to_string();
            render_element(&name, node, out);
        }
        _ => {}
    }
}

fn render_element(name: &str, node: NodeRef<Node>, out: &mut String) {
    match name {
        // Struck-through content is withdrawn information; drop it.
        "s" => {}
        "br" => out.push('\n'),
        "hr" => out.push_str("\n\n"),
        "p" => {
            render_children(node, out);
            out.push_str("\n\n");
        }
        "h1" | "h2" | "h3" | "h4" | "h5" => {
            let text = collect(node);
            let text = text.trim();
            if !text.is_empty() {
                let underline = if name == "h1" { '=' } else { '-' };
                out.push_str(text);
                out.push('\n');
                out.extend(std::iter::repeat(underline).take(text.chars().count().max(3)));
                out.push_str("\n\n");
            }
        }
        "blockquote" => {
            let inner = {
                let mut inner = String::new();
                render_children(node, &mut inner);
                normalize(&inner)
            };
            for line in inner.lines() {
                out.push_str("  ");
                out.push_str(line);
                out.push('\n');
            }
            out.push('\n');
        }
        "ul" => {
            render_list(node, out, None);
        }
        "ol" => {
            let start = element_attr(node, "start")
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(1);
            render_list(node, out, Some(start));
        }
        // Decorations carry no meaning in plaintext; keep their content.
        _ => render_children(node, out),
    }
}

fn render_list(node: NodeRef<Node>, out: &mut String, start: Option<u64>) {
    let mut counter = start;
    for child in node.children() {
        let Node::Element(element) = child.value() else {
            continue;
        };
        if element.name() != "li" {
            continue;
        }

        let item = {
            let mut item = String::new();
            render_children(child, &mut item);
            normalize(&item)
        };
        match &mut counter {
            Some(n) => {
                out.push_str(&format!("{n}. {item}\n"));
                *n += 1;
            }
            None => {
                out.push_str(&format!("- {item}\n"));
            }
        }
    }
    out.push('\n');
}

fn collect(node: NodeRef<Node>) -> String {
    let mut text = String::new();
    render_children(node, &mut text);
    text
}

fn element_attr<'a>(node: NodeRef<'a, Node>, name: &str) -> Option<&'a str> {
    match node.value() {
        Node::Element(element) => element.attr(name),
        _ => None,
    }
}

/// Trims trailing space from every line and collapses runs of blank lines,
/// so the same DOM always renders to the same bytes.
fn normalize(text: &str) -> String {
    let mut lines: Vec<&str> = text.lines().map(str::trim_end).collect();

    let mut out = String::new();
    let mut blank_run = 0usize;
    for line in lines.drain(..) {
        if line.is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
        } else {
            blank_run = 0;
        }
        out.push_str(line);
        out.push('\n');
    }
    out.trim_matches('\n').to_string()
}
