//! MySQL option-file (`my.cnf`) reader.
//!
//! Understands the subset of the format that carries server settings:
//! `[group]` headers, `key = value` and bare `key` lines, `#`/`;` comments,
//! quoted values, and `!include` / `!includedir` directives. Groups that
//! appear more than once are merged in file order; a repeated key keeps its
//! first position and takes the last value.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::ManagerError;

/// Nesting limit for `!include` chains.
const MAX_INCLUDE_DEPTH: usize = 10;

/// One `[group]` with its options in file order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionGroup {
    /// Group name without brackets.
    pub name: String,
    /// `(key, raw value)` pairs. Bare flags have an empty value.
    pub entries: Vec<(String, String)>,
}

impl OptionGroup {
    fn set(&mut self, key: String, value: String) {
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    /// Value of `key` in this group.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// A parsed option file, includes expanded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OptionFile {
    groups: Vec<OptionGroup>,
}

impl OptionFile {
    /// Read and parse the option file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ManagerError::ConfigNotFound`] if `path` does not exist and
    /// [`ManagerError::OptionFile`] for unreadable or malformed content.
    pub fn load(path: &Path) -> Result<Self, ManagerError> {
        let text = fs::read_to_string(path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => ManagerError::ConfigNotFound {
                path: path.to_path_buf(),
            },
            _ => ManagerError::OptionFile {
                path: path.to_path_buf(),
                line: 0,
                message: e.to_string(),
            },
        })?;
        let mut file = Self::default();
        file.parse_into(&text, path, 0)?;
        Ok(file)
    }

    /// Parse option-file text. Include paths resolve relative to `origin`'s
    /// directory.
    ///
    /// # Errors
    ///
    /// Returns [`ManagerError::OptionFile`] for malformed lines or failing
    /// includes.
    pub fn parse(text: &str, origin: &Path) -> Result<Self, ManagerError> {
        let mut file = Self::default();
        file.parse_into(text, origin, 0)?;
        Ok(file)
    }

    /// Groups in order of first appearance.
    pub fn groups(&self) -> &[OptionGroup] {
        &self.groups
    }

    /// Look up a group by name.
    pub fn group(&self, name: &str) -> Option<&OptionGroup> {
        self.groups.iter().find(|g| g.name == name)
    }

    fn group_mut(&mut self, name: &str) -> &mut OptionGroup {
        let index = match self.groups.iter().position(|g| g.name == name) {
            Some(index) => index,
            None => {
                self.groups.push(OptionGroup {
                    name: name.to_owned(),
                    entries: Vec::new(),
                });
                self.groups.len().saturating_sub(1)
            }
        };
        &mut self.groups[index]
    }

    fn parse_into(&mut self, text: &str, origin: &Path, depth: usize) -> Result<(), ManagerError> {
        let error = |line: usize, message: String| ManagerError::OptionFile {
            path: origin.to_path_buf(),
            line,
            message,
        };

        let mut current: Option<String> = None;

        for (index, raw) in text.lines().enumerate() {
            let line_no = index.saturating_add(1);
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }

            if let Some(dir) = line.strip_prefix("!includedir") {
                let dir = resolve(origin, dir.trim());
                self.include_dir(&dir, depth)
                    .map_err(|e| error(line_no, e.to_string()))?;
                continue;
            }
            if let Some(file) = line.strip_prefix("!include") {
                let file = resolve(origin, file.trim());
                self.include_file(&file, depth)
                    .map_err(|e| error(line_no, e.to_string()))?;
                continue;
            }

            if let Some(header) = line.strip_prefix('[') {
                let name = header
                    .strip_suffix(']')
                    .ok_or_else(|| error(line_no, format!("unterminated group header '{line}'")))?
                    .trim();
                if name.is_empty() {
                    return Err(error(line_no, "empty group name".to_owned()));
                }
                self.group_mut(name);
                current = Some(name.to_owned());
                continue;
            }

            let Some(group) = current.as_deref() else {
                return Err(error(line_no, format!("option '{line}' appears before any group")));
            };
            let (key, value) = match line.split_once('=') {
                Some((key, value)) => (key.trim(), parse_value(value)),
                None => (line, String::new()),
            };
            if key.is_empty() {
                return Err(error(line_no, "option without a name".to_owned()));
            }
            self.group_mut(group).set(key.to_owned(), value);
        }

        Ok(())
    }

    fn include_file(&mut self, path: &Path, depth: usize) -> Result<(), ManagerError> {
        if depth >= MAX_INCLUDE_DEPTH {
            return Err(ManagerError::OptionFile {
                path: path.to_path_buf(),
                line: 0,
                message: format!("includes nested deeper than {MAX_INCLUDE_DEPTH}"),
            });
        }
        let text = fs::read_to_string(path).map_err(|e| ManagerError::OptionFile {
            path: path.to_path_buf(),
            line: 0,
            message: e.to_string(),
        })?;
        self.parse_into(&text, path, depth.saturating_add(1))
    }

    fn include_dir(&mut self, dir: &Path, depth: usize) -> Result<(), ManagerError> {
        let read_error = |e: std::io::Error| ManagerError::OptionFile {
            path: dir.to_path_buf(),
            line: 0,
            message: e.to_string(),
        };
        let mut files = Vec::new();
        for entry in fs::read_dir(dir).map_err(read_error)? {
            let path = entry.map_err(read_error)?.path();
            if path.is_file() && path.extension().is_some_and(|ext| ext == "cnf") {
                files.push(path);
            }
        }
        files.sort();
        for file in files {
            self.include_file(&file, depth)?;
        }
        Ok(())
    }
}

/// Resolve an include target against the including file's directory.
fn resolve(origin: &Path, target: &str) -> PathBuf {
    let target = Path::new(target);
    if target.is_absolute() {
        return target.to_path_buf();
    }
    origin
        .parent()
        .map_or_else(|| target.to_path_buf(), |dir| dir.join(target))
}

/// Strip quotes from a value, or a trailing ` # comment` from an unquoted one.
fn parse_value(raw: &str) -> String {
    let value = raw.trim();
    for quote in ['"', '\''] {
        if let Some(inner) = value
            .strip_prefix(quote)
            .and_then(|rest| rest.find(quote).map(|end| &rest[..end]))
        {
            return inner.to_owned();
        }
    }
    let mut end = value.len();
    let mut previous_blank = false;
    for (index, ch) in value.char_indices() {
        if ch == '#' && previous_blank {
            end = index;
            break;
        }
        previous_blank = ch.is_whitespace();
    }
    value[..end].trim_end().to_owned()
}
