//! HTML handling for alert pages: sanitizer policies and the DOM surgery
//! that digs the alert body out of a wtp.waw.pl page.

use std::borrow::Cow;
use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use ammonia::Builder;
use regex::Regex;
use ego_tree::NodeId;
use scraper::{ElementRef, Html, Selector};

use super::Effect;

static COLOR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new("(?i)^#([0-9a-f]{3,4}|[0-9a-f]{6}|[0-9a-f]{8})$").expect("color regex")
});

static STRICT_POLICY: LazyLock<Builder<'static>> = LazyLock::new(strict_policy);
static BODY_POLICY: LazyLock<Builder<'static>> = LazyLock::new(body_policy);

static IMPEDIMENT_ICON: LazyLock<Selector> = LazyLock::new(|| sel(".impediment-category-icon"));
static FORMAT_ICON: LazyLock<Selector> = LazyLock::new(|| sel(".format-icon"));
static IMPEDIMENT_CONTENT: LazyLock<Selector> = LazyLock::new(|| sel("div.impediment-content"));
static PAGE_MAIN: LazyLock<Selector> = LazyLock::new(|| sel("main.page-main"));
static SIDEBAR_PINNED: LazyLock<Selector> = LazyLock::new(|| sel("div.format-sidebar-pinned"));
static SMALL_STYLE: LazyLock<Selector> = LazyLock::new(|| sel("div.is-style-small"));
static HR: LazyLock<Selector> = LazyLock::new(|| sel("hr"));

fn sel(css: &str) -> Selector {
    Selector::parse(css).expect("static selector")
}

/// Strips all markup. Used for alert titles and links.
pub fn strip_markup(input: &str) -> String {
    STRICT_POLICY.clean(input).to_string()
}

/// Sanitizes an alert body with the permissive policy: headings, paragraphs,
/// breaks, blockquotes, lists (`start` kept on ordered lists), text
/// decorations, and span styles limited to hex colors and underlines.
pub fn sanitize_body(input: &str) -> String {
    BODY_POLICY
        .clean(input)
        .to_string()
        .trim_matches(|c| c == '\n' || c == '\t' || c == ' ')
        .to_string()
}

fn strict_policy() -> Builder<'static> {
    let mut policy = Builder::default();
    policy
        .tags(HashSet::new())
        .generic_attributes(HashSet::new());
    policy
}

fn body_policy() -> Builder<'static> {
    let mut policy = Builder::default();
    policy
        .tags(HashSet::from([
            "p",
            "span",
            "blockquote",
            "h1",
            "h2",
            "h3",
            "h4",
            "h5",
            "br",
            "hr",
            "ul",
            "ol",
            "li",
            "strong",
            "em",
            "s",
        ]))
        .generic_attributes(HashSet::new())
        .tag_attributes(HashMap::from([
            ("ol", HashSet::from(["start"])),
            ("span", HashSet::from(["style"])),
        ]))
        .attribute_filter(|element, attribute, value| match (element, attribute) {
            ("ol", "start") => value.parse::<u32>().ok().map(|_| Cow::Borrowed(value)),
            ("span", "style") => filter_span_style(value).map(Cow::Owned),
            _ => Some(Cow::Borrowed(value)),
        });
    policy
}

/// Keeps only the style declarations the policy permits: hex colors and
/// underline text-decorations. Returns `None` when nothing survives, which
/// drops the attribute entirely.
fn filter_span_style(style: &str) -> Option<String> {
    let kept: Vec<String> = style
        .split(';')
        .filter_map(|declaration| {
            let (property, value) = declaration.split_once(':')?;
            let (property, value) = (property.trim(), value.trim());
            let allowed = match property.to_ascii_lowercase().as_str() {
                "color" => COLOR_RE.is_match(value),
                "text-decoration" => value.eq_ignore_ascii_case("underline"),
                _ => false,
            };
            allowed.then(|| format!("{property}: {value}"))
        })
        .collect();

    if kept.is_empty() {
        None
    } else {
        Some(kept.join("; "))
    }
}

/// Collects the `alt` texts of the icon flags describing which route types
/// an alert applies to. Impediment pages and change pages use different
/// icon classes.
pub fn icon_flags(document: &Html, effect: Effect) -> Vec<String> {
    let selector = match effect {
        Effect::ReducedService => &*IMPEDIMENT_ICON,
        Effect::OtherEffect => &*FORMAT_ICON,
    };
    document
        .select(selector)
        .filter_map(|icon| icon.value().attr("alt"))
        .map(str::to_string)
        .collect()
}

/// Digs the alert content out of a detail page and returns its raw inner
/// HTML (unsanitized).
///
/// Impediment pages keep their content in `div.impediment-content`; change
/// pages use `main.page-main`, from which the pinned-sidebar block (and
/// everything before it) and `div.is-style-small` are dropped. In both
/// cases everything from the first `<hr>` on is dropped. An ambiguous page
/// (not exactly one container) yields an empty body.
pub fn extract_body(mut document: Html, effect: Effect) -> String {
    let container_selector = match effect {
        Effect::ReducedService => &*IMPEDIMENT_CONTENT,
        Effect::OtherEffect => &*PAGE_MAIN,
    };

    let containers: Vec<NodeId> = document
        .select(container_selector)
        .map(|el| el.id())
        .collect();
    if containers.len() != 1 {
        return String::new();
    }
    let container = containers[0];

    if effect == Effect::OtherEffect {
        // The pinned sidebar and everything rendered before it is chrome.
        let ids: Vec<NodeId> = with_element(&document, container, |el| {
            el.select(&SIDEBAR_PINNED)
                .next()
                .map(|pinned| {
                    let mut ids: Vec<NodeId> = pinned.prev_siblings().map(|n| n.id()).collect();
                    ids.push(pinned.id());
                    ids
                })
                .unwrap_or_default()
        });
        detach_all(&mut document, ids);

        let ids = with_element(&document, container, |el| {
            el.select(&SMALL_STYLE).map(|small| small.id()).collect()
        });
        detach_all(&mut document, ids);
    }

    // Everything after a horizontal rule is boilerplate (sharing links,
    // contact blocks), and so is the rule itself.
    let ids = with_element(&document, container, |el| {
        let mut ids = Vec::new();
        for rule in el.select(&HR) {
            ids.extend(rule.next_siblings().map(|n| n.id()));
            ids.push(rule.id());
        }
        ids
    });
    detach_all(&mut document, ids);

    with_element(&document, container, |el| el.inner_html())
}

fn with_element<T: Default>(
    document: &Html,
    id: NodeId,
    read: impl FnOnce(ElementRef) -> T,
) -> T {
    document
        .tree
        .get(id)
        .and_then(ElementRef::wrap)
        .map(read)
        .unwrap_or_default()
}

fn detach_all(document: &mut Html, ids: Vec<NodeId>) {
    for id in ids {
        if let Some(mut node) = document.tree.get_mut(id) {
            node.detach();
        }
    }
}
