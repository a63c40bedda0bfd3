//! Locator engine
//!
//! Parses the locator mini-language and compiles it to XPath or CSS.
//! The grammar is the user-visible contract:
//!
//! | prefix | meaning |
//! |---|---|
//! | `xpath:` / `x:` | raw XPath |
//! | `css:` / `c:` | raw CSS selector |
//! | `tag:name` / `t:name` | tag-name equality |
//! | `text=` `text:` `text^` `text$` | exact / contains / startsWith / endsWith |
//! | `tx=` `tx:` `tx^` `tx$` | alias of the above |
//! | `@attr` `@attr=v` `@attr:v` `@attr^v` `@attr$v` | single attribute |
//! | `@@` | AND-combined multi-attribute |
//! | `@\|` | OR-combined multi-attribute |
//! | `@!` | negated attribute inside a multi form |
//! | `.class` / `#id` | class / id shorthand (`:`/`^`/`$` variants) |
//! | bare text | same as `text:` |
//!
//! Anything needing XPath functions (text matching, negation, ends-with on
//! text) compiles to XPath; pure attribute queries compile to CSS.

mod search;

pub use search::{search_in_page, SearchHit};

use crate::{Error, Result};

/// Which query language a compiled locator targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum By {
    /// XPath expression
    XPath,
    /// CSS selector
    Css,
}

/// A compiled locator: the backend query string and its language.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    /// Query language
    pub by: By,
    /// Query string
    pub value: String,
}

impl Selector {
    /// Raw XPath selector
    pub fn xpath<S: Into<String>>(value: S) -> Self {
        Self { by: By::XPath, value: value.into() }
    }

    /// Raw CSS selector
    pub fn css<S: Into<String>>(value: S) -> Self {
        Self { by: By::Css, value: value.into() }
    }
}

/// Comparison operator on an attribute or on element text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchOp {
    /// `=`
    Exact,
    /// `:`
    Contains,
    /// `^`
    StartsWith,
    /// `$`
    EndsWith,
}

/// One predicate inside a parsed locator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    /// Attribute presence: `@attr`
    AttrExists { name: String },
    /// Attribute comparison: `@attr=v` and friends
    Attr { name: String, op: MatchOp, value: String },
    /// Text comparison: `text=v` and friends
    Text { op: MatchOp, value: String },
}

/// How multiple predicates combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Join {
    /// `@@`
    And,
    /// `@|`
    Or,
}

/// A parsed locator, before compilation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    /// Raw XPath passed through unchanged
    RawXPath(String),
    /// Raw CSS passed through unchanged
    RawCss(String),
    /// Structured query: optional tag plus joined predicates
    Query {
        /// Tag-name constraint, `None` for any element
        tag: Option<String>,
        /// AND or OR combination
        join: Join,
        /// Predicates with their negation flags
        predicates: Vec<(bool, Predicate)>,
    },
}

impl Locator {
    /// Parse a locator string.
    pub fn parse(loc: &str) -> Result<Locator> {
        let loc = loc.trim();
        if loc.is_empty() {
            return Err(Error::locator("empty locator"));
        }

        if let Some(rest) = loc.strip_prefix("xpath:").or_else(|| loc.strip_prefix("x:")) {
            return Ok(Locator::RawXPath(rest.to_string()));
        }
        if let Some(rest) = loc.strip_prefix("css:").or_else(|| loc.strip_prefix("c:")) {
            return Ok(Locator::RawCss(rest.to_string()));
        }
        if let Some(rest) = loc.strip_prefix("tag:").or_else(|| loc.strip_prefix("t:")) {
            return Self::parse_tag(rest);
        }
        if let Some(parsed) = Self::try_parse_text(loc)? {
            return Ok(parsed);
        }
        if loc.starts_with("@@") || loc.starts_with("@|") {
            return Self::parse_multi(None, loc);
        }
        if let Some(rest) = loc.strip_prefix('@') {
            let (negated, pred) = Self::parse_segment(rest)?;
            return Ok(Locator::Query {
                tag: None,
                join: Join::And,
                predicates: vec![(negated, pred)],
            });
        }
        if loc.starts_with('.') || loc.starts_with('#') {
            let (negated, pred) = Self::parse_segment(loc)?;
            return Ok(Locator::Query {
                tag: None,
                join: Join::And,
                predicates: vec![(negated, pred)],
            });
        }

        // Bare text means contains
        Ok(Locator::Query {
            tag: None,
            join: Join::And,
            predicates: vec![(
                false,
                Predicate::Text { op: MatchOp::Contains, value: loc.to_string() },
            )],
        })
    }

    /// Parse a `(by, value)` tuple the way external callers spell it.
    pub fn from_tuple(by: &str, value: &str) -> Result<Locator> {
        match by {
            "xpath" => Ok(Locator::RawXPath(value.to_string())),
            "css selector" | "css" => Ok(Locator::RawCss(value.to_string())),
            "id" => Ok(Locator::Query {
                tag: None,
                join: Join::And,
                predicates: vec![(
                    false,
                    Predicate::Attr { name: "id".into(), op: MatchOp::Exact, value: value.into() },
                )],
            }),
            "class name" => Ok(Locator::Query {
                tag: None,
                join: Join::And,
                predicates: vec![(
                    false,
                    Predicate::Attr { name: "class".into(), op: MatchOp::Exact, value: value.into() },
                )],
            }),
            "name" => Ok(Locator::Query {
                tag: None,
                join: Join::And,
                predicates: vec![(
                    false,
                    Predicate::Attr { name: "name".into(), op: MatchOp::Exact, value: value.into() },
                )],
            }),
            "tag name" => Ok(Locator::Query {
                tag: Some(value.to_string()),
                join: Join::And,
                predicates: Vec::new(),
            }),
            other => Err(Error::locator(format!("unknown locator strategy: {}", other))),
        }
    }

    fn try_parse_text(loc: &str) -> Result<Option<Locator>> {
        for prefix in ["text", "tx"] {
            if let Some(rest) = loc.strip_prefix(prefix) {
                let mut chars = rest.chars();
                if let Some(op_char) = chars.next() {
                    if let Some(op) = match_op(op_char) {
                        let value: String = chars.collect();
                        return Ok(Some(Locator::Query {
                            tag: None,
                            join: Join::And,
                            predicates: vec![(false, Predicate::Text { op, value })],
                        }));
                    }
                }
            }
        }
        Ok(None)
    }

    fn parse_tag(rest: &str) -> Result<Locator> {
        match rest.find('@') {
            None => {
                if rest.is_empty() {
                    return Err(Error::locator("tag: needs a tag name"));
                }
                Ok(Locator::Query {
                    tag: Some(rest.to_string()),
                    join: Join::And,
                    predicates: Vec::new(),
                })
            }
            Some(at) => {
                let tag = &rest[..at];
                if tag.is_empty() {
                    return Err(Error::locator("tag: needs a tag name"));
                }
                Self::parse_multi(Some(tag.to_string()), &rest[at..])
            }
        }
    }

    /// Parse the attribute part: either one `@attr...` or a `@@`/`@|` chain.
    fn parse_multi(tag: Option<String>, attrs: &str) -> Result<Locator> {
        let has_and = attrs.contains("@@");
        let has_or = attrs.contains("@|");
        if has_and && has_or {
            return Err(Error::locator("@@ and @| cannot co-occur in one locator"));
        }

        let (join, delim) = if has_or { (Join::Or, "@|") } else { (Join::And, "@@") };

        let body = attrs;
        let segments: Vec<&str> = if has_and || has_or {
            body.split(delim).filter(|s| !s.is_empty()).collect()
        } else {
            // Single @attr after a tag
            vec![body
                .strip_prefix('@')
                .ok_or_else(|| Error::locator(format!("unexpected attribute syntax: {}", body)))?]
        };

        let mut predicates = Vec::new();
        for segment in segments {
            predicates.push(Self::parse_segment(segment)?);
        }
        if predicates.is_empty() {
            return Err(Error::locator("locator has no predicates"));
        }
        Ok(Locator::Query { tag, join, predicates })
    }

    /// Parse one predicate segment: `[!]name[op]value`, with `.`/`#`
    /// shorthands and `text()`/`tx()` matchers.
    fn parse_segment(segment: &str) -> Result<(bool, Predicate)> {
        let (negated, segment) = match segment.strip_prefix('!') {
            Some(rest) => (true, rest),
            None => (false, segment),
        };
        if segment.is_empty() {
            return Err(Error::locator("empty attribute segment"));
        }

        // Class / id shorthand
        for (mark, attr) in [('.', "class"), ('#', "id")] {
            if let Some(rest) = segment.strip_prefix(mark) {
                let (op, value) = match rest.chars().next().and_then(match_op) {
                    Some(op) => (op, rest[1..].to_string()),
                    None => (MatchOp::Exact, rest.to_string()),
                };
                if value.is_empty() {
                    return Err(Error::locator(format!("{}{} has no value", mark, rest)));
                }
                return Ok((
                    negated,
                    Predicate::Attr { name: attr.to_string(), op, value },
                ));
            }
        }

        // Text matcher inside a multi form
        for prefix in ["text()", "tx()"] {
            if let Some(rest) = segment.strip_prefix(prefix) {
                let op_char = rest
                    .chars()
                    .next()
                    .ok_or_else(|| Error::locator(format!("{} needs an operator", prefix)))?;
                let op = match_op(op_char)
                    .ok_or_else(|| Error::locator(format!("unknown operator: {}", op_char)))?;
                return Ok((negated, Predicate::Text { op, value: rest[1..].to_string() }));
            }
        }

        // Plain attribute
        match segment.find(|c| match_op(c).is_some()) {
            None => {
                if !segment
                    .chars()
                    .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
                {
                    return Err(Error::locator(format!("unknown operator in: {}", segment)));
                }
                Ok((negated, Predicate::AttrExists { name: segment.to_string() }))
            }
            Some(pos) => {
                let name = &segment[..pos];
                if name.is_empty() {
                    return Err(Error::locator(format!("attribute has no name: {}", segment)));
                }
                let op_char = segment[pos..].chars().next().expect("op position in range");
                let op = match_op(op_char).expect("position found by match_op");
                let value = segment[pos + op_char.len_utf8()..].to_string();
                Ok((
                    negated,
                    Predicate::Attr { name: name.to_string(), op, value },
                ))
            }
        }
    }

    /// Compile to XPath or CSS, whichever the predicates allow.
    pub fn to_selector(&self) -> Selector {
        match self {
            Locator::RawXPath(x) => Selector::xpath(x.clone()),
            Locator::RawCss(c) => Selector::css(c.clone()),
            Locator::Query { tag, join, predicates } => {
                if Self::css_expressible(predicates) {
                    Selector::css(Self::compile_css(tag.as_deref(), *join, predicates))
                } else {
                    Selector::xpath(Self::compile_xpath(tag.as_deref(), *join, predicates))
                }
            }
        }
    }

    /// Text matching and negation need XPath functions.
    fn css_expressible(predicates: &[(bool, Predicate)]) -> bool {
        predicates
            .iter()
            .all(|(negated, pred)| !negated && !matches!(pred, Predicate::Text { .. }))
    }

    fn compile_css(tag: Option<&str>, join: Join, predicates: &[(bool, Predicate)]) -> String {
        let tag = tag.unwrap_or("");
        let parts: Vec<String> = predicates
            .iter()
            .map(|(_, pred)| match pred {
                Predicate::AttrExists { name } => format!("[{}]", name),
                Predicate::Attr { name, op, value } => {
                    let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
                    match op {
                        // A class-equality locator matches a whole class
                        // token, not the full attribute string.
                        MatchOp::Exact if name == "class" => format!(".{}", css_ident(value)),
                        MatchOp::Exact => format!("[{}=\"{}\"]", name, escaped),
                        MatchOp::Contains => format!("[{}*=\"{}\"]", name, escaped),
                        MatchOp::StartsWith => format!("[{}^=\"{}\"]", name, escaped),
                        MatchOp::EndsWith => format!("[{}$=\"{}\"]", name, escaped),
                    }
                }
                Predicate::Text { .. } => unreachable!("text predicates compile to xpath"),
            })
            .collect();

        match join {
            Join::And => format!("{}{}", tag, parts.concat()),
            Join::Or => parts
                .iter()
                .map(|p| format!("{}{}", tag, p))
                .collect::<Vec<_>>()
                .join(", "),
        }
    }

    fn compile_xpath(tag: Option<&str>, join: Join, predicates: &[(bool, Predicate)]) -> String {
        let base = format!("//{}", tag.unwrap_or("*"));
        if predicates.is_empty() {
            return base;
        }

        let parts: Vec<String> = predicates
            .iter()
            .map(|(negated, pred)| {
                let p = match pred {
                    Predicate::AttrExists { name } => format!("@{}", name),
                    Predicate::Attr { name, op, value } => {
                        let lit = xpath_literal(value);
                        match op {
                            MatchOp::Exact if name == "class" => format!(
                                "contains(concat(\" \",normalize-space(@class),\" \"),{})",
                                xpath_literal(&format!(" {} ", value))
                            ),
                            MatchOp::Exact => format!("@{}={}", name, lit),
                            MatchOp::Contains => format!("contains(@{},{})", name, lit),
                            MatchOp::StartsWith => format!("starts-with(@{},{})", name, lit),
                            MatchOp::EndsWith => format!(
                                "substring(@{0},string-length(@{0})-{1})={2}",
                                name,
                                value.chars().count().saturating_sub(1),
                                lit
                            ),
                        }
                    }
                    Predicate::Text { op, value } => {
                        let lit = xpath_literal(value);
                        match op {
                            MatchOp::Exact => format!("text()={}", lit),
                            MatchOp::Contains => format!("contains(text(),{})", lit),
                            MatchOp::StartsWith => format!("starts-with(text(),{})", lit),
                            MatchOp::EndsWith => format!(
                                "substring(text(),string-length(text())-{})={}",
                                value.chars().count().saturating_sub(1),
                                lit
                            ),
                        }
                    }
                };
                if *negated {
                    format!("not({})", p)
                } else {
                    p
                }
            })
            .collect();

        match join {
            Join::And => {
                let preds: String = parts.iter().map(|p| format!("[{}]", p)).collect();
                format!("{}{}", base, preds)
            }
            Join::Or => format!("{}[{}]", base, parts.join(" or ")),
        }
    }
}

/// Map an operator character to its comparison.
fn match_op(c: char) -> Option<MatchOp> {
    match c {
        '=' => Some(MatchOp::Exact),
        ':' => Some(MatchOp::Contains),
        '^' => Some(MatchOp::StartsWith),
        '$' => Some(MatchOp::EndsWith),
        _ => None,
    }
}

/// Escape CSS identifier characters that would end the simple selector.
fn css_ident(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if c.is_alphanumeric() || c == '-' || c == '_' {
            out.push(c);
        } else {
            out.push('\\');
            out.push(c);
        }
    }
    out
}

/// Quote a string as an XPath 1.0 literal, handling embedded quotes.
fn xpath_literal(value: &str) -> String {
    if !value.contains('"') {
        format!("\"{}\"", value)
    } else if !value.contains('\'') {
        format!("'{}'", value)
    } else {
        let parts: Vec<String> = value
            .split('"')
            .map(|p| format!("\"{}\"", p))
            .collect();
        format!("concat({})", parts.join(",'\"',"))
    }
}

/// Rewrite a selector for searching under an element instead of the
/// document. Relative XPath keeps the element as context node; CSS that
/// starts with a child combinator gets rooted at the element.
pub fn relative_selector(selector: &Selector) -> Selector {
    match selector.by {
        By::XPath => {
            let v = &selector.value;
            if v.starts_with('/') {
                Selector::xpath(format!(".{}", v))
            } else {
                selector.clone()
            }
        }
        By::Css => {
            let v = selector.value.trim_start();
            if v.starts_with('>') {
                Selector::css(format!(":scope {}", v))
            } else {
                selector.clone()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sel(loc: &str) -> Selector {
        Locator::parse(loc).unwrap().to_selector()
    }

    #[test]
    fn test_raw_passthrough() {
        assert_eq!(sel("xpath://div[@id='x']"), Selector::xpath("//div[@id='x']"));
        assert_eq!(sel("x://a"), Selector::xpath("//a"));
        assert_eq!(sel("css:div > span"), Selector::css("div > span"));
        assert_eq!(sel("c:.cls"), Selector::css(".cls"));
    }

    #[test]
    fn test_tag_only() {
        assert_eq!(sel("tag:div"), Selector::css("div"));
        assert_eq!(sel("t:input"), Selector::css("input"));
    }

    #[test]
    fn test_single_attribute_compiles_to_css() {
        assert_eq!(sel("@id=x"), Selector::css("[id=\"x\"]"));
        assert_eq!(sel("@name:part"), Selector::css("[name*=\"part\"]"));
        assert_eq!(sel("@href^https"), Selector::css("[href^=\"https\"]"));
        assert_eq!(sel("@src$.png"), Selector::css("[src$=\".png\"]"));
        assert_eq!(sel("@disabled"), Selector::css("[disabled]"));
    }

    #[test]
    fn test_class_and_id_shorthand() {
        assert_eq!(sel(".c1"), Selector::css(".c1"));
        assert_eq!(sel("#x"), Selector::css("[id=\"x\"]"));
        assert_eq!(sel(".:part"), Selector::css("[class*=\"part\"]"));
        assert_eq!(sel("#^pre"), Selector::css("[id^=\"pre\"]"));
    }

    #[test]
    fn test_shorthand_equals_attribute_form() {
        // `.cls` and `@class=cls` must produce identical target sets
        assert_eq!(sel(".c1"), sel("@class=c1"));
        assert_eq!(sel("#x"), sel("@id=x"));
    }

    #[test]
    fn test_text_locators_compile_to_xpath() {
        assert_eq!(sel("text=hello"), Selector::xpath("//*[text()=\"hello\"]"));
        assert_eq!(sel("text:hello"), Selector::xpath("//*[contains(text(),\"hello\")]"));
        assert_eq!(sel("text^he"), Selector::xpath("//*[starts-with(text(),\"he\")]"));
        assert_eq!(
            sel("text$lo"),
            Selector::xpath("//*[substring(text(),string-length(text())-1)=\"lo\"]")
        );
        assert_eq!(sel("tx:hello"), sel("text:hello"));
    }

    #[test]
    fn test_bare_text_is_contains() {
        assert_eq!(sel("hello there"), sel("text:hello there"));
    }

    #[test]
    fn test_tag_with_multi_attributes() {
        assert_eq!(
            sel("tag:div@@id=x@@.c2"),
            Selector::css("div[id=\"x\"].c2")
        );
        assert_eq!(sel("t:a@href=/home"), Selector::css("a[href=\"/home\"]"));
    }

    #[test]
    fn test_or_combination() {
        assert_eq!(
            sel("tag:div@|id=a@|id=b"),
            Selector::css("div[id=\"a\"], div[id=\"b\"]")
        );
    }

    #[test]
    fn test_negation_goes_to_xpath() {
        assert_eq!(
            sel("tag:div@@class=a@@!name=b"),
            Selector::xpath(
                "//div[contains(concat(\" \",normalize-space(@class),\" \"),\" a \")][not(@name=\"b\")]"
            )
        );
    }

    #[test]
    fn test_text_inside_multi() {
        assert_eq!(
            sel("tag:li@@text():item"),
            Selector::xpath("//li[contains(text(),\"item\")]")
        );
    }

    #[test]
    fn test_mixed_join_rejected() {
        let err = Locator::parse("tag:div@@a=1@|b=2").unwrap_err();
        assert!(matches!(err, Error::Locator(_)));
    }

    #[test]
    fn test_unknown_operator_rejected() {
        let err = Locator::parse("@attr~v").unwrap_err();
        assert!(matches!(err, Error::Locator(_)));
    }

    #[test]
    fn test_tuple_forms() {
        let a = Locator::from_tuple("css selector", "#x").unwrap().to_selector();
        assert_eq!(a, Selector::css("#x"));
        let b = Locator::from_tuple("xpath", "//div[@id='x']").unwrap().to_selector();
        assert_eq!(b, Selector::xpath("//div[@id='x']"));
        let c = Locator::from_tuple("id", "x").unwrap().to_selector();
        assert_eq!(c, Selector::css("[id=\"x\"]"));
        assert!(Locator::from_tuple("partial link text", "x").is_err());
    }

    #[test]
    fn test_xpath_literal_quoting() {
        assert_eq!(xpath_literal("plain"), "\"plain\"");
        assert_eq!(xpath_literal("wi\"th"), "'wi\"th'");
        assert_eq!(xpath_literal("b\"o'th"), "concat(\"b\",'\"',\"o'th\")");
    }

    #[test]
    fn test_relative_rewrites() {
        let x = relative_selector(&Selector::xpath("//div"));
        assert_eq!(x, Selector::xpath(".//div"));
        let same = relative_selector(&Selector::xpath(".//div"));
        assert_eq!(same, Selector::xpath(".//div"));
        let css = relative_selector(&Selector::css("> li"));
        assert_eq!(css, Selector::css(":scope > li"));
    }
}
