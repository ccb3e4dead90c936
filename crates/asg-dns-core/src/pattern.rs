//! DNS name patterns
//!
//! Patterns are hostname templates with a closed set of placeholders, written
//! `{{.Name}}`:
//!
//! ```text
//! {{.Role}}.{{.AvailabilityZone}}.{{.EnvironmentName}}.example.com
//! ```
//!
//! Patterns are parsed once when configuration loads, so an unknown
//! placeholder is rejected before the first event arrives. Rendering fails with
//! [`Error::UnresolvedPlaceholder`] when the context lacks a value; it never
//! emits an empty substitution.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Placeholder names a pattern may reference
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Placeholder {
    AutoScalingGroup,
    Role,
    AvailabilityZone,
    Region,
    EnvironmentName,
    Ip,
    Domain,
}

impl Placeholder {
    /// Every supported placeholder
    pub const ALL: [Placeholder; 7] = [
        Placeholder::AutoScalingGroup,
        Placeholder::Role,
        Placeholder::AvailabilityZone,
        Placeholder::Region,
        Placeholder::EnvironmentName,
        Placeholder::Ip,
        Placeholder::Domain,
    ];

    /// Name as written inside `{{. }}`
    pub fn name(&self) -> &'static str {
        match self {
            Placeholder::AutoScalingGroup => "AutoScalingGroup",
            Placeholder::Role => "Role",
            Placeholder::AvailabilityZone => "AvailabilityZone",
            Placeholder::Region => "Region",
            Placeholder::EnvironmentName => "EnvironmentName",
            Placeholder::Ip => "IP",
            Placeholder::Domain => "Domain",
        }
    }

    /// Look a placeholder up by name
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.name() == name)
    }
}

impl fmt::Display for Placeholder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Field(Placeholder),
}

/// A parsed DNS name template
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NamePattern {
    source: String,
    segments: Vec<Segment>,
}

impl NamePattern {
    /// Parse a pattern, rejecting unknown placeholders and unterminated actions
    pub fn parse(source: impl Into<String>) -> Result<Self> {
        let source = source.into();
        let mut segments = Vec::new();
        let mut rest = source.as_str();

        while let Some(open) = rest.find("{{") {
            if open > 0 {
                segments.push(Segment::Literal(rest[..open].to_string()));
            }

            let after_open = &rest[open + 2..];
            let close = after_open
                .find("}}")
                .ok_or_else(|| Error::invalid_pattern(&source, "unterminated {{"))?;

            let action = after_open[..close].trim();
            let name = action.strip_prefix('.').ok_or_else(|| {
                Error::invalid_pattern(
                    &source,
                    format!("expected {{{{.Name}}}}, found {{{{{action}}}}}"),
                )
            })?;
            let placeholder = Placeholder::from_name(name.trim()).ok_or_else(|| {
                Error::invalid_pattern(&source, format!("unknown placeholder {:?}", name.trim()))
            })?;
            segments.push(Segment::Field(placeholder));

            rest = &after_open[close + 2..];
        }

        if !rest.is_empty() {
            segments.push(Segment::Literal(rest.to_string()));
        }

        Ok(Self { source, segments })
    }

    /// Source text of the pattern
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Placeholders referenced by the pattern, in order of appearance
    pub fn placeholders(&self) -> impl Iterator<Item = Placeholder> + '_ {
        self.segments.iter().filter_map(|s| match s {
            Segment::Field(p) => Some(*p),
            Segment::Literal(_) => None,
        })
    }

    /// Render the pattern against `context`
    pub fn render(&self, context: &RenderContext) -> Result<String> {
        let mut out = String::with_capacity(self.source.len());
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Field(p) => {
                    let value = context.get(*p).ok_or_else(|| Error::UnresolvedPlaceholder {
                        pattern: self.source.clone(),
                        placeholder: p.name().to_string(),
                    })?;
                    out.push_str(value);
                }
            }
        }
        Ok(out)
    }
}

impl FromStr for NamePattern {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for NamePattern {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        Self::parse(s)
    }
}

impl From<NamePattern> for String {
    fn from(pattern: NamePattern) -> Self {
        pattern.source
    }
}

impl fmt::Display for NamePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// Substitution values for one rendering
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderContext {
    values: BTreeMap<Placeholder, String>,
}

impl RenderContext {
    /// Create an empty context
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a value, builder style
    pub fn with(mut self, placeholder: Placeholder, value: impl Into<String>) -> Self {
        self.set(placeholder, value);
        self
    }

    /// Set a value
    pub fn set(&mut self, placeholder: Placeholder, value: impl Into<String>) {
        self.values.insert(placeholder, value.into());
    }

    /// Get a value
    pub fn get(&self, placeholder: Placeholder) -> Option<&str> {
        self.values.get(&placeholder).map(String::as_str)
    }

    /// Whether the context provides a value
    pub fn contains(&self, placeholder: Placeholder) -> bool {
        self.values.contains_key(&placeholder)
    }
}
