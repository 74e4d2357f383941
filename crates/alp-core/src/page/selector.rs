//! Compound selectors: `tag`, `#id`, `[attr]`, `[attr="v"]` and combinations.

use crate::AlpError;
use std::collections::BTreeMap;

/// A parsed compound selector. Every part must match.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Selector {
    tag: Option<String>,
    id: Option<String>,
    attributes: Vec<(String, Option<String>)>,
}

impl Selector {
    /// Parse a selector such as `alp-text[path="notes"]` or `#main`.
    pub fn parse(input: &str) -> Result<Self, AlpError> {
        let invalid = || AlpError::InvalidSelector(input.to_string());
        let source = input.trim();
        if source.is_empty() {
            return Err(invalid());
        }

        let mut selector = Self::default();
        let mut rest = source;

        let tag_len = rest.find(['#', '[']).unwrap_or(rest.len());
        if tag_len > 0 {
            let tag = &rest[..tag_len];
            if !is_ident(tag) && tag != "*" {
                return Err(invalid());
            }
            if tag != "*" {
                selector.tag = Some(tag.to_ascii_lowercase());
            }
            rest = &rest[tag_len..];
        }

        while !rest.is_empty() {
            if let Some(after) = rest.strip_prefix('#') {
                let len = after.find(['#', '[']).unwrap_or(after.len());
                let id = &after[..len];
                if !is_ident(id) {
                    return Err(invalid());
                }
                selector.id = Some(id.to_string());
                rest = &after[len..];
            } else if let Some(after) = rest.strip_prefix('[') {
                let close = after.find(']').ok_or_else(invalid)?;
                let body = &after[..close];
                let (name, value) = match body.split_once('=') {
                    Some((name, value)) => (name.trim(), Some(unquote(value.trim()))),
                    None => (body.trim(), None),
                };
                if !is_ident(name) {
                    return Err(invalid());
                }
                selector.attributes.push((name.to_string(), value.map(str::to_string)));
                rest = &after[close + 1..];
            } else {
                return Err(invalid());
            }
        }

        Ok(selector)
    }

    /// Whether an element with this tag and these attributes matches.
    #[must_use]
    pub fn matches(&self, tag: &str, attributes: &BTreeMap<String, String>) -> bool {
        if self.tag.as_deref().is_some_and(|t| t != tag) {
            return false;
        }
        if self.id.as_ref().is_some_and(|id| attributes.get("id") != Some(id)) {
            return false;
        }
        self.attributes.iter().all(|(name, expected)| match (attributes.get(name), expected) {
            (Some(actual), Some(expected)) => actual == expected,
            (Some(_), None) => true,
            (None, _) => false,
        })
    }
}

fn is_ident(s: &str) -> bool {
    !s.is_empty()
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '@' || c == '.')
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if let Some(inner) = value.strip_prefix(quote).and_then(|v| v.strip_suffix(quote)) {
            return inner;
        }
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attrs(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn tag_only() {
        let sel = Selector::parse("ALP-Text").expect("parse");
        assert!(sel.matches("alp-text", &attrs(&[])));
        assert!(!sel.matches("div", &attrs(&[])));
    }

    #[test]
    fn id_and_attribute_presence() {
        let sel = Selector::parse("#main[path]").expect("parse");
        assert!(sel.matches("div", &attrs(&[("id", "main"), ("path", "x")])));
        assert!(!sel.matches("div", &attrs(&[("id", "main")])));
    }

    #[test]
    fn attribute_values_with_either_quote() {
        let double = Selector::parse("alp-text[path=\"Work/data:bills\"]").expect("parse");
        let single = Selector::parse("alp-text[path='Work/data:bills']").expect("parse");
        let element = attrs(&[("path", "Work/data:bills")]);
        assert!(double.matches("alp-text", &element));
        assert!(single.matches("alp-text", &element));
        assert!(!double.matches("alp-text", &attrs(&[("path", "other")])));
    }

    #[test]
    fn malformed_selectors_rejected() {
        for bad in ["", "  ", "div[path", "di v", "[=x]", "#"] {
            assert!(Selector::parse(bad).is_err(), "{bad:?} should fail");
        }
    }
}
