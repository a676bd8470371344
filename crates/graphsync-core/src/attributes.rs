//! The attributes a reader presents when labels are evaluated.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// Attribute name to the set of values the user holds for it. A flag
/// attribute (`employee`) is present with no values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAttributes {
    attrs: BTreeMap<String, BTreeSet<String>>,
}

impl UserAttributes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse `name=value, flag, name="quoted value"`.
    pub fn parse(text: &str) -> Result<Self> {
        let mut attrs = Self::new();
        for item in split_items(text)? {
            let item = item.trim();
            if item.is_empty() {
                continue;
            }
            match item.split_once('=') {
                Some((name, value)) => {
                    let name = name.trim();
                    let value = value.trim().trim_matches('"');
                    check_name(name, text)?;
                    attrs.insert(name, value);
                }
                None => {
                    check_name(item, text)?;
                    attrs.flag(item);
                }
            }
        }
        Ok(attrs)
    }

    pub fn flag(&mut self, name: &str) {
        self.attrs.entry(name.to_string()).or_default();
    }

    pub fn insert(&mut self, name: &str, value: &str) {
        self.attrs
            .entry(name.to_string())
            .or_default()
            .insert(value.to_string());
    }

    pub fn has(&self, name: &str) -> bool {
        self.attrs.contains_key(name)
    }

    pub fn has_value(&self, name: &str, value: &str) -> bool {
        self.attrs.get(name).is_some_and(|v| v.contains(value))
    }

    pub fn is_empty(&self) -> bool {
        self.attrs.is_empty()
    }
}

fn split_items(text: &str) -> Result<Vec<String>> {
    let mut items = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    for c in text.chars() {
        match c {
            '"' => {
                quoted = !quoted;
                current.push(c);
            }
            ',' if !quoted => items.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    if quoted {
        return Err(CoreError::InvalidAttributes(format!(
            "unterminated quote: {text}"
        )));
    }
    items.push(current);
    Ok(items)
}

fn check_name(name: &str, text: &str) -> Result<()> {
    if name.is_empty() || !name.chars().all(crate::labels::is_attribute_char) {
        return Err(CoreError::InvalidAttributes(format!(
            "bad attribute name '{name}' in: {text}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_flags_and_values() {
        let attrs = UserAttributes::parse("employee, clearance=secret, nation=\"a, b\"").unwrap();
        assert!(attrs.has("employee"));
        assert!(attrs.has_value("clearance", "secret"));
        assert!(attrs.has_value("nation", "a, b"));
        assert!(!attrs.has("admin"));
    }

    #[test]
    fn multiple_values_accumulate() {
        let attrs = UserAttributes::parse("group=a, group=b").unwrap();
        assert!(attrs.has_value("group", "a"));
        assert!(attrs.has_value("group", "b"));
    }

    #[test]
    fn empty_text_is_no_attributes() {
        assert!(UserAttributes::parse("").unwrap().is_empty());
    }

    #[test]
    fn bad_names_rejected() {
        assert!(UserAttributes::parse("a b").is_err());
        assert!(UserAttributes::parse("=x").is_err());
        assert!(UserAttributes::parse("a=\"open").is_err());
    }
}
