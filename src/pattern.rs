//! Operator match strings compiled into matchers.
//!
//! `/fo+/` is an unanchored regular expression; anything else is a literal
//! that must equal the whole candidate.

use std::fmt;
use std::str::FromStr;

use regex::Regex;

use crate::error::ManagerError;

/// A compiled matcher for one operator-supplied string.
#[derive(Debug, Clone)]
pub struct Pattern {
    source: String,
    regex: Regex,
}

impl Pattern {
    /// Compile an operator string.
    ///
    /// # Errors
    ///
    /// Returns [`ManagerError::InvalidPattern`] when a `/.../` pattern is not
    /// a valid regular expression.
    pub fn compile(source: &str) -> Result<Self, ManagerError> {
        let expression = match regex_body(source) {
            Some(body) => body.to_owned(),
            None => format!("^{}$", regex::escape(source)),
        };
        let regex = Regex::new(&expression).map_err(|e| ManagerError::InvalidPattern {
            pattern: source.to_owned(),
            source: e,
        })?;
        Ok(Self {
            source: source.to_owned(),
            regex,
        })
    }

    /// Whether `candidate` satisfies this pattern.
    pub fn is_match(&self, candidate: &str) -> bool {
        self.regex.is_match(candidate)
    }

    /// Whether this pattern was written in `/regex/` form.
    pub fn is_regex(&self) -> bool {
        regex_body(&self.source).is_some()
    }

    /// The string as the operator wrote it.
    pub fn as_str(&self) -> &str {
        &self.source
    }
}

/// Interior of a `/.../` delimited string.
fn regex_body(source: &str) -> Option<&str> {
    source
        .strip_prefix('/')
        .and_then(|rest| rest.strip_suffix('/'))
}

impl FromStr for Pattern {
    type Err = ManagerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::compile(s)
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}
