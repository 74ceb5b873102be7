//! Minimal `{{.name}}` template engine used by provider definitions
//!
//! Templates are parsed once when a provider is loaded so that syntax errors
//! surface at construction time. Rendering is a pure lookup of named
//! arguments; no other actions are supported.

use crate::error::{Error, Result};
use std::collections::BTreeMap;

/// Named template arguments
pub type TemplateArgs = BTreeMap<String, String>;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Text(String),
    Var(String),
}

/// A parsed template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    source: String,
    segments: Vec<Segment>,
}

impl Template {
    /// Parse a template, rejecting anything but `{{.name}}` actions
    pub fn parse(source: &str) -> Result<Self> {
        let mut segments = Vec::new();
        let mut rest = source;
        let mut offset = 0;

        while let Some(open) = rest.find("{{") {
            if open > 0 {
                segments.push(Segment::Text(rest[..open].to_string()));
            }
            let after_open = &rest[open + 2..];
            let close = after_open.find("}}").ok_or_else(|| {
                Error::template(format!(
                    "unclosed action at offset {} in {:?}",
                    offset + open,
                    source
                ))
            })?;
            let name = parse_action(&after_open[..close]).ok_or_else(|| {
                Error::template(format!(
                    "unsupported action {{{{{}}}}} in {:?}",
                    &after_open[..close],
                    source
                ))
            })?;
            segments.push(Segment::Var(name.to_string()));

            let consumed = open + 2 + close + 2;
            offset += consumed;
            rest = &rest[consumed..];
        }
        if !rest.is_empty() {
            segments.push(Segment::Text(rest.to_string()));
        }

        Ok(Self {
            source: source.to_string(),
            segments,
        })
    }

    /// Render the template against `args`
    ///
    /// A variable absent from `args` is an error.
    pub fn render(&self, args: &TemplateArgs) -> Result<String> {
        let mut out = String::with_capacity(self.source.len());
        for segment in &self.segments {
            match segment {
                Segment::Text(text) => out.push_str(text),
                Segment::Var(name) => {
                    let value = args.get(name).ok_or_else(|| {
                        Error::template(format!("missing argument {:?} in {:?}", name, self.source))
                    })?;
                    out.push_str(value);
                }
            }
        }
        Ok(out)
    }
}

/// `" .name "` -> `Some("name")`
fn parse_action(action: &str) -> Option<&str> {
    let name = action.trim().strip_prefix('.')?;
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_');
    valid.then_some(name)
}
