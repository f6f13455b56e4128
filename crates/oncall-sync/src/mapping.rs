//! Escalation policy to user group mapping.
//!
//! The mapping comes from one of two equivalent sources:
//!
//! - a two-column CSV file, one `policy,handle` record per row; quoted
//!   fields may contain commas and line breaks
//! - an inline string of `policy:handle` pairs separated by commas
//!
//! Repeated policies keep the last handle seen.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::ConfigError;

const DELIMITER: char = ',';
const QUOTE: char = '"';
const PAIR_SEPARATOR: char = ':';

/// Where the mapping is loaded from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MappingSource {
    /// Two-column CSV file
    File(PathBuf),
    /// Inline `policy:handle,policy:handle` string
    Inline(String),
}

impl MappingSource {
    /// Pick the single configured source.
    ///
    /// # Errors
    /// Returns [`ConfigError::MissingMapping`] when neither source is set and
    /// [`ConfigError::ConflictingMapping`] when both are.
    pub fn from_options(
        file: Option<PathBuf>,
        inline: Option<String>,
    ) -> Result<Self, ConfigError> {
        let inline = inline.filter(|s| !s.trim().is_empty());
        match (file, inline) {
            (Some(path), None) => Ok(Self::File(path)),
            (None, Some(pairs)) => Ok(Self::Inline(pairs)),
            (Some(_), Some(_)) => Err(ConfigError::ConflictingMapping),
            (None, None) => Err(ConfigError::MissingMapping),
        }
    }
}

/// Escalation policy name to Slack user group handle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncMapping {
    entries: BTreeMap<String, String>,
}

impl SyncMapping {
    /// Load the mapping from its configured source.
    ///
    /// # Errors
    /// Returns error if the source is unreadable, malformed or empty.
    pub fn load(source: &MappingSource) -> Result<Self, ConfigError> {
        let mapping = match source {
            MappingSource::File(path) => Self::from_csv_file(path)?,
            MappingSource::Inline(pairs) => Self::parse_inline(pairs)?,
        };
        debug!(entries = mapping.len(), "Loaded sync mapping");
        Ok(mapping)
    }

    /// Read a two-column CSV mapping file.
    ///
    /// # Errors
    /// Returns error if the file cannot be read or is not valid.
    pub fn from_csv_file(path: &Path) -> Result<Self, ConfigError> {
        let contents =
            std::fs::read_to_string(path).map_err(|source| ConfigError::ReadMapping {
                path: path.to_path_buf(),
                source,
            })?;
        Self::parse_csv(&contents)
    }

    /// Parse two-column CSV content. Blank lines are skipped.
    ///
    /// A quoted field left open at the end of a line continues on the next
    /// one; errors report the line the record starts on.
    ///
    /// # Errors
    /// Returns error on a record that is not exactly two columns or when no
    /// records are present.
    pub fn parse_csv(contents: &str) -> Result<Self, ConfigError> {
        let mut mapping = Self::default();
        let mut lines = contents.lines().enumerate();

        while let Some((index, first)) = lines.next() {
            let line = index + 1;
            if first.trim().is_empty() {
                continue;
            }

            let mut record = first.to_string();
            let fields = loop {
                match split_record(&record) {
                    Record::Fields(fields) => break fields,
                    Record::Unterminated => match lines.next() {
                        Some((_, next)) => {
                            record.push('\n');
                            record.push_str(next);
                        }
                        None => return Err(ConfigError::MalformedQuote { line }),
                    },
                    Record::Malformed => return Err(ConfigError::MalformedQuote { line }),
                }
            };

            match fields.as_slice() {
                [policy, handle] => mapping.insert(policy, handle, &record)?,
                _ => {
                    return Err(ConfigError::ColumnCount {
                        line,
                        found: fields.len(),
                    })
                }
            }
        }

        mapping.ensure_not_empty()
    }

    /// Parse an inline `policy:handle,policy:handle` string.
    ///
    /// Each pair is split on its last `:` so policy names may contain colons.
    ///
    /// # Errors
    /// Returns error on a pair without `:` or when no pairs are present.
    pub fn parse_inline(pairs: &str) -> Result<Self, ConfigError> {
        let mut mapping = Self::default();

        for pair in pairs.split(DELIMITER).map(str::trim) {
            if pair.is_empty() {
                continue;
            }
            let (policy, handle) = pair
                .rsplit_once(PAIR_SEPARATOR)
                .ok_or_else(|| ConfigError::MalformedPair(pair.to_string()))?;
            mapping.insert(policy, handle, pair)?;
        }

        mapping.ensure_not_empty()
    }

    fn insert(&mut self, policy: &str, handle: &str, raw: &str) -> Result<(), ConfigError> {
        let policy = policy.trim();
        let handle = handle.trim();
        if policy.is_empty() || handle.is_empty() {
            return Err(ConfigError::EmptyField(raw.to_string()));
        }
        self.entries.insert(policy.to_string(), handle.to_string());
        Ok(())
    }

    fn ensure_not_empty(self) -> Result<Self, ConfigError> {
        if self.entries.is_empty() {
            Err(ConfigError::EmptyMapping)
        } else {
            Ok(self)
        }
    }

    /// Handle mapped to an escalation policy.
    #[must_use]
    pub fn get(&self, escalation_policy: &str) -> Option<&str> {
        self.entries.get(escalation_policy).map(String::as_str)
    }

    /// Iterate `(escalation_policy, user_group_handle)` pairs in policy order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<P: Into<String>, H: Into<String>> FromIterator<(P, H)> for SyncMapping {
    fn from_iter<I: IntoIterator<Item = (P, H)>>(iter: I) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(p, h)| (p.into(), h.into()))
                .collect(),
        }
    }
}

/// Result of splitting one CSV record.
enum Record {
    Fields(Vec<String>),
    /// A quoted field is still open at the end of the input
    Unterminated,
    /// Text follows a closing quote
    Malformed,
}

/// Split one CSV record into fields.
///
/// Quoted fields may contain the delimiter and line breaks; a doubled quote
/// inside a quoted field is a literal quote.
fn split_record(record: &str) -> Record {
    let mut fields = Vec::new();
    let mut chars = record.chars().peekable();

    loop {
        while chars.next_if(|c| *c == ' ' || *c == '\t').is_some() {}

        if chars.next_if_eq(&QUOTE).is_some() {
            let mut field = String::new();
            let mut closed = false;
            while let Some(c) = chars.next() {
                if c == QUOTE {
                    if chars.next_if_eq(&QUOTE).is_some() {
                        field.push(QUOTE);
                    } else {
                        closed = true;
                        break;
                    }
                } else {
                    field.push(c);
                }
            }
            if !closed {
                return Record::Unterminated;
            }
            fields.push(field);

            while chars.next_if(|c| *c == ' ' || *c == '\t' || *c == '\r').is_some() {}
            match chars.next() {
                Some(DELIMITER) => {}
                None => return Record::Fields(fields),
                Some(_) => return Record::Malformed,
            }
        } else {
            let mut field = String::new();
            loop {
                match chars.next() {
                    Some(DELIMITER) => break,
                    Some(c) => field.push(c),
                    None => {
                        fields.push(field);
                        return Record::Fields(fields);
                    }
                }
            }
            fields.push(field);
        }
    }
}
