//! Security labels: boolean expressions over user attributes.
//!
//! Grammar (`&` binds tighter than `|`):
//!
//! ```text
//! label  := '*' | '!' | or
//! or     := and (('|' | '||') and)*
//! and    := unary (('&' | '&&') unary)*
//! unary  := '!' unary | '(' or ')' | atom
//! atom   := name [('=' | '==') value]
//! ```
//!
//! `*` admits everyone and a lone `!` admits no-one. A `Security-Label`
//! header carries a comma-separated list of labels, all of which apply.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::attributes::UserAttributes;
use crate::error::{CoreError, Result};

// ── Expressions ───────────────────────────────────────────────────

/// Parsed form of a label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LabelExpr {
    Allow,
    Deny,
    Attribute(String),
    Equals(String, String),
    Not(Box<LabelExpr>),
    And(Box<LabelExpr>, Box<LabelExpr>),
    Or(Box<LabelExpr>, Box<LabelExpr>),
}

impl LabelExpr {
    pub fn parse(text: &str) -> Result<Self> {
        let trimmed = text.trim();
        match trimmed {
            "*" => return Ok(Self::Allow),
            "!" => return Ok(Self::Deny),
            "" => return Err(invalid(text, "empty label")),
            _ => {}
        }
        let mut parser = ExprParser::new(trimmed);
        let expr = parser.parse_or()?;
        parser.skip_ws();
        if !parser.at_end() {
            return Err(invalid(text, "unexpected trailing input"));
        }
        Ok(expr)
    }

    pub fn evaluate(&self, attrs: &UserAttributes) -> bool {
        match self {
            Self::Allow => true,
            Self::Deny => false,
            Self::Attribute(name) => attrs.has(name),
            Self::Equals(name, value) => attrs.has_value(name, value),
            Self::Not(inner) => !inner.evaluate(attrs),
            Self::And(a, b) => a.evaluate(attrs) && b.evaluate(attrs),
            Self::Or(a, b) => a.evaluate(attrs) || b.evaluate(attrs),
        }
    }
}

struct ExprParser<'a> {
    text: &'a str,
    chars: Vec<char>,
    pos: usize,
}

impl<'a> ExprParser<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            text,
            chars: text.chars().collect(),
            pos: 0,
        }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.chars.len()
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
    }

    /// Consume one or two copies of an operator character.
    fn eat_operator(&mut self, op: char) -> bool {
        self.skip_ws();
        if self.peek() == Some(op) {
            self.pos += 1;
            if self.peek() == Some(op) {
                self.pos += 1;
            }
            true
        } else {
            false
        }
    }

    fn parse_or(&mut self) -> Result<LabelExpr> {
        let mut left = self.parse_and()?;
        while self.eat_operator('|') {
            let right = self.parse_and()?;
            left = LabelExpr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<LabelExpr> {
        let mut left = self.parse_unary()?;
        while self.eat_operator('&') {
            let right = self.parse_unary()?;
            left = LabelExpr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<LabelExpr> {
        self.skip_ws();
        match self.peek() {
            Some('!') => {
                self.pos += 1;
                Ok(LabelExpr::Not(Box::new(self.parse_unary()?)))
            }
            Some('(') => {
                self.pos += 1;
                let inner = self.parse_or()?;
                self.skip_ws();
                if self.peek() != Some(')') {
                    return Err(invalid(self.text, "missing ')'"));
                }
                self.pos += 1;
                Ok(inner)
            }
            Some('*') => {
                self.pos += 1;
                Ok(LabelExpr::Allow)
            }
            Some(_) => self.parse_atom(),
            None => Err(invalid(self.text, "expression ends early")),
        }
    }

    fn parse_atom(&mut self) -> Result<LabelExpr> {
        let name = self.read_name()?;
        self.skip_ws();
        if self.peek() == Some('=') {
            self.pos += 1;
            if self.peek() == Some('=') {
                self.pos += 1;
            }
            self.skip_ws();
            let value = if self.peek() == Some('"') {
                self.read_quoted()?
            } else {
                self.read_name()?
            };
            return Ok(LabelExpr::Equals(name, value));
        }
        Ok(LabelExpr::Attribute(name))
    }

    fn read_name(&mut self) -> Result<String> {
        let start = self.pos;
        while self.peek().is_some_and(is_attribute_char) {
            self.pos += 1;
        }
        if self.pos == start {
            return Err(invalid(self.text, "expected an attribute name"));
        }
        Ok(self.chars[start..self.pos].iter().collect())
    }

    fn read_quoted(&mut self) -> Result<String> {
        self.pos += 1;
        let start = self.pos;
        while self.peek().is_some_and(|c| c != '"') {
            self.pos += 1;
        }
        if self.at_end() {
            return Err(invalid(self.text, "unterminated quoted value"));
        }
        let value = self.chars[start..self.pos].iter().collect();
        self.pos += 1;
        Ok(value)
    }
}

pub(crate) fn is_attribute_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '-' | '.' | ':' | '/')
}

fn invalid(label: &str, reason: &str) -> CoreError {
    CoreError::InvalidLabel {
        label: label.to_string(),
        reason: reason.to_string(),
    }
}

// ── Labels ────────────────────────────────────────────────────────

/// A validated security label.
///
/// Equality, ordering and hashing use the label text so that re-adding the
/// same label to a statement is a no-op. Clone is cheap.
#[derive(Clone)]
pub struct SecurityLabel {
    text: Arc<str>,
    expr: Arc<LabelExpr>,
}

impl SecurityLabel {
    pub fn parse(text: &str) -> Result<Self> {
        let expr = LabelExpr::parse(text)?;
        Ok(Self {
            text: Arc::from(text.trim()),
            expr: Arc::new(expr),
        })
    }

    /// The label that admits everyone.
    pub fn allow_all() -> Self {
        Self {
            text: Arc::from("*"),
            expr: Arc::new(LabelExpr::Allow),
        }
    }

    /// The label that admits no-one.
    pub fn deny_all() -> Self {
        Self {
            text: Arc::from("!"),
            expr: Arc::new(LabelExpr::Deny),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn expr(&self) -> &LabelExpr {
        &self.expr
    }

    pub fn evaluate(&self, attrs: &UserAttributes) -> bool {
        self.expr.evaluate(attrs)
    }
}

impl PartialEq for SecurityLabel {
    fn eq(&self, other: &Self) -> bool {
        self.text == other.text
    }
}

impl Eq for SecurityLabel {}

impl PartialOrd for SecurityLabel {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SecurityLabel {
    fn cmp(&self, other: &Self) -> Ordering {
        self.text.cmp(&other.text)
    }
}

impl Hash for SecurityLabel {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.text.hash(state);
    }
}

impl fmt::Debug for SecurityLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecurityLabel({})", self.text)
    }
}

impl fmt::Display for SecurityLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl Serialize for SecurityLabel {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.text)
    }
}

impl<'de> Deserialize<'de> for SecurityLabel {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Self::parse(&text).map_err(serde::de::Error::custom)
    }
}

/// Parse a comma-separated label list. Commas inside parentheses or quotes
/// do not split.
pub fn parse_label_list(text: &str) -> Result<Vec<SecurityLabel>> {
    let mut labels = Vec::new();
    let mut depth = 0usize;
    let mut quoted = false;
    let mut current = String::new();

    for c in text.chars() {
        match c {
            '"' => quoted = !quoted,
            '(' if !quoted => depth += 1,
            ')' if !quoted => depth = depth.saturating_sub(1),
            ',' if !quoted && depth == 0 => {
                if !current.trim().is_empty() {
                    labels.push(SecurityLabel::parse(&current)?);
                }
                current.clear();
                continue;
            }
            _ => {}
        }
        current.push(c);
    }
    if !current.trim().is_empty() {
        labels.push(SecurityLabel::parse(&current)?);
    }
    Ok(labels)
}

/// Interpret an optional `Security-Label` header. A missing or blank header
/// yields `None`: the store's default label applies at read time.
pub fn labels_from_header(header: Option<&str>) -> Result<Option<Vec<SecurityLabel>>> {
    match header {
        Some(text) if !text.trim().is_empty() => Ok(Some(parse_label_list(text)?)),
        _ => Ok(None),
    }
}

/// True when every label admits the user.
pub fn all_admit(labels: &[SecurityLabel], attrs: &UserAttributes) -> bool {
    labels.iter().all(|l| l.evaluate(attrs))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attrs(text: &str) -> UserAttributes {
        UserAttributes::parse(text).unwrap()
    }

    #[test]
    fn equality_label() {
        let label = SecurityLabel::parse("clearance=secret").unwrap();
        assert!(label.evaluate(&attrs("clearance=secret")));
        assert!(!label.evaluate(&attrs("clearance=public")));
        assert!(!label.evaluate(&UserAttributes::new()));
    }

    #[test]
    fn precedence_and_over_or() {
        let expr = LabelExpr::parse("a | b & c").unwrap();
        assert!(expr.evaluate(&attrs("a")));
        assert!(!expr.evaluate(&attrs("b")));
        assert!(expr.evaluate(&attrs("b, c")));
    }

    #[test]
    fn negation_and_grouping() {
        let expr = LabelExpr::parse("!(contractor || nation==\"other land\")").unwrap();
        assert!(expr.evaluate(&attrs("employee")));
        assert!(!expr.evaluate(&attrs("contractor")));
        assert!(!expr.evaluate(&attrs("nation=\"other land\"")));
    }

    #[test]
    fn allow_and_deny_words() {
        assert_eq!(LabelExpr::parse("*").unwrap(), LabelExpr::Allow);
        assert_eq!(LabelExpr::parse(" ! ").unwrap(), LabelExpr::Deny);
        assert!(!SecurityLabel::deny_all().evaluate(&attrs("admin")));
    }

    #[test]
    fn malformed_labels_rejected() {
        assert!(LabelExpr::parse("a &").is_err());
        assert!(LabelExpr::parse("(a | b").is_err());
        assert!(LabelExpr::parse("a b").is_err());
        assert!(SecurityLabel::parse("").is_err());
    }

    #[test]
    fn label_list_splits_at_top_level_only() {
        let labels = parse_label_list("employee, (a | b), name=\"x,y\"").unwrap();
        let texts: Vec<&str> = labels.iter().map(SecurityLabel::as_str).collect();
        assert_eq!(texts, vec!["employee", "(a | b)", "name=\"x,y\""]);
    }

    #[test]
    fn blank_header_means_no_labels() {
        assert!(labels_from_header(None).unwrap().is_none());
        assert!(labels_from_header(Some("  ")).unwrap().is_none());
        assert_eq!(labels_from_header(Some("a")).unwrap().unwrap().len(), 1);
    }

    #[test]
    fn labels_compare_by_text() {
        let a = SecurityLabel::parse(" a&b ").unwrap();
        let b = SecurityLabel::parse("a&b").unwrap();
        assert_eq!(a, b);
    }
}
