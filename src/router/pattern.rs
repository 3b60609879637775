use crate::error::ServerResult;
use regex::Regex;
use std::collections::HashMap;

/// A compiled route template such as `/users/:id/posts/:postId`.
///
/// Every `:name` segment captures exactly one non-empty value that contains
/// no `/`; everything else matches literally. The regex and the parameter
/// name list come out of the same scan, so the n-th capture group always
/// belongs to the n-th name.
#[derive(Debug, Clone)]
pub struct PathPattern {
    template: String,
    regex: Regex,
    param_names: Vec<String>,
}

impl PathPattern {
    pub fn parse(template: &str) -> ServerResult<Self> {
        let mut source = String::with_capacity(template.len() + 8);
        let mut param_names = Vec::new();
        let mut literal = String::new();
        source.push('^');

        let mut chars = template.chars().peekable();
        while let Some(c) = chars.next() {
            if c != ':' {
                literal.push(c);
                continue;
            }

            let mut name = String::new();
            while let Some(&n) = chars.peek() {
                if n == '/' {
                    break;
                }
                name.push(n);
                chars.next();
            }

            // A bare ':' is just a character.
            if name.is_empty() {
                literal.push(':');
                continue;
            }

            source.push_str(&regex::escape(&literal));
            literal.clear();
            source.push_str("([^/]+)");
            param_names.push(name);
        }
        source.push_str(&regex::escape(&literal));
        source.push('$');

        Ok(Self {
            template: template.to_string(),
            regex: Regex::new(&source)?,
            param_names,
        })
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    pub fn param_names(&self) -> &[String] {
        &self.param_names
    }

    pub fn is_match(&self, path: &str) -> bool {
        self.regex.is_match(path)
    }

    /// Matches the whole `path` and returns the captured parameters by name.
    pub fn captures(&self, path: &str) -> Option<HashMap<String, String>> {
        let caps = self.regex.captures(path)?;
        let params = self
            .param_names
            .iter()
            .enumerate()
            .filter_map(|(i, name)| {
                caps.get(i + 1)
                    .map(|value| (name.clone(), value.as_str().to_string()))
            })
            .collect();
        Some(params)
    }
}
