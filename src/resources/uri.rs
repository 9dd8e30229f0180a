use std::collections::HashMap;

use regex::Regex;
use url::Url;

use crate::errors::ResourceError;

const VALIDATION_BASE: &str = "resource://localhost";

/// A successful match: which pattern fired and what its named groups captured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UriMatch {
    pub pattern: String,
    pub params: HashMap<String, String>,
}

/// Ordered set of named URI patterns. The first registered pattern that matches wins.
#[derive(Debug, Clone, Default)]
pub struct UriParser {
    patterns: Vec<(String, Regex)>,
}

impl UriParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compiles and registers `pattern`. Re-registering a name replaces it in place.
    pub fn add_pattern(&mut self, name: &str, pattern: &str) -> Result<(), ResourceError> {
        let regex = Regex::new(pattern).map_err(|source| ResourceError::InvalidPattern {
            pattern: pattern.to_string(),
            source,
        })?;

        match self.patterns.iter_mut().find(|(existing, _)| existing == name) {
            Some(slot) => slot.1 = regex,
            None => self.patterns.push((name.to_string(), regex)),
        }
        Ok(())
    }

    pub fn with_pattern(mut self, name: &str, pattern: &str) -> Result<Self, ResourceError> {
        self.add_pattern(name, pattern)?;
        Ok(self)
    }

    pub fn pattern_names(&self) -> impl Iterator<Item = &str> {
        self.patterns.iter().map(|(name, _)| name.as_str())
    }

    /// Percent-decodes `uri` and matches it against the registered patterns.
    pub fn parse_uri(&self, uri: &str) -> Result<UriMatch, ResourceError> {
        let decoded = urlencoding::decode(uri).map_err(|err| ResourceError::InvalidUri {
            uri: uri.to_string(),
            reason: format!("failed to decode URI: {err}"),
        })?;

        for (name, regex) in &self.patterns {
            let Some(captures) = regex.captures(&decoded) else {
                continue;
            };

            let params = regex
                .capture_names()
                .flatten()
                .filter_map(|group| {
                    captures
                        .name(group)
                        .map(|value| (group.to_string(), value.as_str().to_string()))
                })
                .collect();
            return Ok(UriMatch {
                pattern: name.clone(),
                params,
            });
        }

        Err(ResourceError::NoPatternMatch {
            uri: uri.to_string(),
        })
    }

    pub fn matches(&self, uri: &str) -> bool {
        self.parse_uri(uri).is_ok()
    }

    /// Cheap syntactic check run before any pattern matching.
    pub fn validate_uri(uri: &str) -> Result<(), ResourceError> {
        let invalid = |reason: &str| ResourceError::InvalidUri {
            uri: uri.to_string(),
            reason: reason.to_string(),
        };

        if uri.is_empty() {
            return Err(invalid("URI cannot be empty"));
        }
        if !uri.starts_with('/') {
            return Err(invalid("URI must start with /"));
        }
        if has_malformed_escape(uri) {
            return Err(invalid("malformed percent-encoding"));
        }

        Url::parse(VALIDATION_BASE)
            .and_then(|base| base.join(uri))
            .map_err(|err| invalid(&format!("invalid URI format: {err}")))?;
        Ok(())
    }

    /// Replaces every `{name}` placeholder with the matching parameter value in a
    /// single left-to-right pass. Substituted values are never expanded again, and
    /// placeholders without a parameter are kept as written.
    pub fn expand_template(template: &str, params: &HashMap<String, String>) -> String {
        let mut expanded = String::with_capacity(template.len());
        let mut rest = template;

        while let Some(open) = rest.find('{') {
            expanded.push_str(&rest[..open]);
            let placeholder = &rest[open..];
            let Some(close) = placeholder.find('}') else {
                rest = placeholder;
                break;
            };

            let name = &placeholder[1..close];
            match params.get(name) {
                Some(value) => expanded.push_str(value),
                None => expanded.push_str(&placeholder[..=close]),
            }
            rest = &placeholder[close + 1..];
        }

        expanded.push_str(rest);
        expanded
    }
}

fn has_malformed_escape(uri: &str) -> bool {
    let bytes = uri.as_bytes();
    bytes.iter().enumerate().any(|(index, byte)| {
        *byte == b'%'
            && !matches!(
                bytes.get(index + 1..index + 3),
                Some([high, low]) if high.is_ascii_hexdigit() && low.is_ascii_hexdigit()
            )
    })
}
