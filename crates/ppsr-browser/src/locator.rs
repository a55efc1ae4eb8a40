//! Element addressing for the page model.
//!
//! A [`Locator`] describes how to find one element: by CSS selector, by the
//! exact visible text of a tag inside an optional scope, or relative to
//! another locator (child, parent, following sibling). Locators compile to a
//! JavaScript expression that evaluates to the first matching element or
//! `null`, which lets CDP resolve text and sibling relations that plain
//! `DOM.querySelector` cannot express.

use std::fmt;

/// How to find one element on the page.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Locator {
    /// First element matching a CSS selector.
    Css(String),
    /// First `tag` element whose whitespace-normalized text equals `text`,
    /// searched inside `within` (or the whole document).
    Text {
        within: Option<Box<Locator>>,
        tag: String,
        text: String,
    },
    /// First descendant of `parent` matching `css` (`:scope > x` for direct children).
    Child { parent: Box<Locator>, css: String },
    /// Parent element of the inner locator.
    Parent(Box<Locator>),
    /// First following sibling of `of` matching `css`.
    NextSibling { of: Box<Locator>, css: String },
}

impl Locator {
    pub fn css(selector: impl Into<String>) -> Self {
        Locator::Css(selector.into())
    }

    /// Document-wide exact text match.
    pub fn text(tag: impl Into<String>, text: impl Into<String>) -> Self {
        Locator::Text {
            within: None,
            tag: tag.into(),
            text: text.into(),
        }
    }

    /// Exact text match scoped to this locator.
    pub fn text_within(&self, tag: impl Into<String>, text: impl Into<String>) -> Self {
        Locator::Text {
            within: Some(Box::new(self.clone())),
            tag: tag.into(),
            text: text.into(),
        }
    }

    pub fn child(&self, css: impl Into<String>) -> Self {
        Locator::Child {
            parent: Box::new(self.clone()),
            css: css.into(),
        }
    }

    pub fn parent(&self) -> Self {
        Locator::Parent(Box::new(self.clone()))
    }

    pub fn next_sibling(&self, css: impl Into<String>) -> Self {
        Locator::NextSibling {
            of: Box::new(self.clone()),
            css: css.into(),
        }
    }

    /// JavaScript expression yielding the matched `Element` or `null`.
    pub fn to_js(&self) -> String {
        match self {
            Locator::Css(selector) => format!("document.querySelector({})", js_str(selector)),
            Locator::Text { within, tag, text } => {
                let root = match within {
                    Some(scope) => scope.to_js(),
                    None => "document".to_string(),
                };
                format!(
                    "(() => {{ const root = {root}; if (!root) return null; \
                     const want = {want}; \
                     return Array.from(root.querySelectorAll({tag})).find(e => \
                     (e.innerText || e.textContent || '').replace(/\\s+/g, ' ').trim() === want) || null; }})()",
                    want = js_str(&normalize_text(text)),
                    tag = js_str(tag),
                )
            }
            Locator::Child { parent, css } => format!(
                "(() => {{ const p = {}; return p ? p.querySelector({}) : null; }})()",
                parent.to_js(),
                js_str(css)
            ),
            Locator::Parent(inner) => format!(
                "(() => {{ const e = {}; return e ? e.parentElement : null; }})()",
                inner.to_js()
            ),
            Locator::NextSibling { of, css } => format!(
                "(() => {{ let e = {}; if (!e) return null; \
                 for (e = e.nextElementSibling; e; e = e.nextElementSibling) {{ \
                 if (e.matches({})) return e; }} return null; }})()",
                of.to_js(),
                js_str(css)
            ),
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locator::Css(selector) => write!(f, "{selector}"),
            Locator::Text {
                within: Some(scope),
                tag,
                text,
            } => write!(f, "{scope} >> {tag}[text={text:?}]"),
            Locator::Text {
                within: None,
                tag,
                text,
            } => write!(f, "{tag}[text={text:?}]"),
            Locator::Child { parent, css } => write!(f, "{parent} >> {css}"),
            Locator::Parent(inner) => write!(f, "{inner} >> ..",),
            Locator::NextSibling { of, css } => write!(f, "{of} ~ {css}"),
        }
    }
}

/// Collapse runs of whitespace and trim, mirroring the JS side.
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Quote a string as a JavaScript literal.
pub(crate) fn js_str(s: &str) -> String {
    // A JSON string is a valid JS string literal.
    serde_json::Value::String(s.to_string()).to_string()
}
