//! Path templates of the form `prefix/{id}suffix`.
//!
//! Grammar: one or more lowercase literal segments each followed by `/`, the
//! `{id}` placeholder, then one or more literal parts each introduced by `/`
//! or `.`. `projects/{id}/project.json`, `machines/{id}.json` and
//! `library/script-modules/{id}/module.json` are all valid.

use std::fmt;

use crate::conventions::identity::is_identity_char;

pub const PLACEHOLDER: &str = "{id}";

/// A parsed path template and its matcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathTemplate {
    template: String,
    prefix: String,
    suffix: String,
}

impl PathTemplate {
    /// Parse a template, returning a human readable reason on failure.
    pub fn parse(template: &str) -> Result<Self, String> {
        let template = template.replace('\\', "/");

        let (prefix, suffix) = template
            .split_once(PLACEHOLDER)
            .ok_or_else(|| format!("missing {} placeholder", PLACEHOLDER))?;

        if suffix.contains(PLACEHOLDER) {
            return Err(format!("more than one {} placeholder", PLACEHOLDER));
        }

        let segments = prefix
            .strip_suffix('/')
            .ok_or_else(|| format!("{} must follow a directory prefix", PLACEHOLDER))?;
        if segments.is_empty() {
            return Err("empty directory prefix".to_string());
        }
        for segment in segments.split('/') {
            if !is_literal_segment(segment) {
                return Err(format!("invalid prefix segment '{}'", segment));
            }
        }

        validate_suffix(suffix)?;

        Ok(Self {
            prefix: prefix.to_string(),
            suffix: suffix.to_string(),
            template,
        })
    }

    /// Substitute `id` into the template.
    pub fn render(&self, id: &str) -> String {
        format!("{}{}{}", self.prefix, id, self.suffix)
    }

    /// The identity text if `path` was produced by this template.
    pub fn match_path<'p>(&self, path: &'p str) -> Option<&'p str> {
        let id = path.strip_prefix(&self.prefix)?.strip_suffix(&self.suffix)?;
        if !id.is_empty() && id.chars().all(is_identity_char) {
            Some(id)
        } else {
            None
        }
    }

    /// Directory that contains every path of this template.
    pub fn parent_path(&self) -> &str {
        self.prefix.trim_end_matches('/')
    }

    pub fn as_str(&self) -> &str {
        &self.template
    }
}

impl fmt::Display for PathTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.template)
    }
}

fn is_literal_segment(segment: &str) -> bool {
    let mut chars = segment.chars();
    match chars.next() {
        Some(first) if first.is_ascii_lowercase() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

fn validate_suffix(suffix: &str) -> Result<(), String> {
    if suffix.is_empty() {
        return Err("missing suffix after placeholder".to_string());
    }

    let mut expecting_separator = true;
    let mut part_len = 0;
    for c in suffix.chars() {
        match c {
            '/' | '.' => {
                if !expecting_separator && part_len == 0 {
                    return Err(format!("empty part in suffix '{}'", suffix));
                }
                expecting_separator = false;
                part_len = 0;
            }
            c if !expecting_separator && (c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-') => {
                part_len += 1;
            }
            _ if expecting_separator => {
                return Err(format!("suffix '{}' must start with '/' or '.'", suffix));
            }
            c => return Err(format!("invalid character '{}' in suffix '{}'", c, suffix)),
        }
    }

    if part_len == 0 {
        return Err(format!("suffix '{}' ends with a separator", suffix));
    }
    Ok(())
}
