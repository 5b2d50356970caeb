//! Watched entries and the inline entry-specification parser.

use crate::error::{Result, SyncError};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::PathBuf;

/// Separator between entries in an inline specification.
pub const ENTRY_DELIMITER: char = '#';

/// Separator between the fields of a single entry.
pub const FIELD_DELIMITER: char = '*';

/// One remote configuration entry paired with the local file it is written to.
///
/// Field names on the wire follow the structured-file format
/// (`dataId`, `group`, `file`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize)]
pub struct WatchedEntry {
    /// Key of the entry in the remote service.
    #[serde(rename = "dataId", alias = "dataid", alias = "data_id")]
    pub remote_id: String,
    /// Group the key lives in.
    pub group: String,
    /// Destination file on the local host.
    #[serde(rename = "file", alias = "path")]
    pub local_path: PathBuf,
}

impl WatchedEntry {
    /// Create a new entry.
    pub fn new(
        remote_id: impl Into<String>,
        group: impl Into<String>,
        local_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            remote_id: remote_id.into(),
            group: group.into(),
            local_path: local_path.into(),
        }
    }

    /// Whether this entry has the given identity.
    pub fn matches(&self, remote_id: &str, group: &str) -> bool {
        self.remote_id == remote_id && self.group == group
    }
}

/// Ordered, immutable set of watched entries.
///
/// Built once before any remote interaction. Every entry has non-empty fields
/// and `(remote_id, group)` is unique within the set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchedEntrySet {
    entries: Vec<WatchedEntry>,
}

impl WatchedEntrySet {
    /// Parse an inline specification of the form
    /// `dataId*group*file#dataId*group*file`.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::ParseError` for an empty specification, an entry
    /// without exactly three fields, an empty field, or a duplicated
    /// `(dataId, group)` pair.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use proxy_config_sync::core::WatchedEntrySet;
    ///
    /// let set = WatchedEntrySet::parse("app*DEFAULT*/etc/nginx/conf.d/app.conf").unwrap();
    /// assert_eq!(set.len(), 1);
    /// ```
    pub fn parse(raw: &str) -> Result<Self> {
        if raw.trim().is_empty() {
            return Err(SyncError::ParseError(
                "entry specification is empty".to_string(),
            ));
        }

        let entries = raw
            .split(ENTRY_DELIMITER)
            .enumerate()
            .map(|(index, chunk)| parse_entry(index, chunk))
            .collect::<Result<Vec<_>>>()?;

        Self::from_entries(entries)
    }

    /// Build a set from already-structured entries, applying the same rules as
    /// [`WatchedEntrySet::parse`].
    pub fn from_entries(entries: Vec<WatchedEntry>) -> Result<Self> {
        if entries.is_empty() {
            return Err(SyncError::ParseError(
                "at least one watched entry is required".to_string(),
            ));
        }

        let mut seen = HashSet::with_capacity(entries.len());
        for (index, entry) in entries.iter().enumerate() {
            if entry.remote_id.is_empty()
                || entry.group.is_empty()
                || entry.local_path.as_os_str().is_empty()
            {
                return Err(SyncError::ParseError(format!(
                    "entry {} has an empty field",
                    index + 1
                )));
            }
            if !seen.insert((entry.remote_id.as_str(), entry.group.as_str())) {
                return Err(SyncError::ParseError(format!(
                    "entry {} duplicates '{}' in group '{}'",
                    index + 1,
                    entry.remote_id,
                    entry.group
                )));
            }
        }

        Ok(Self { entries })
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Always false for a constructed set; provided for API symmetry.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate entries in input order.
    pub fn iter(&self) -> std::slice::Iter<'_, WatchedEntry> {
        self.entries.iter()
    }

    /// Borrow the entries as a slice.
    pub fn as_slice(&self) -> &[WatchedEntry] {
        &self.entries
    }
}

impl<'a> IntoIterator for &'a WatchedEntrySet {
    type Item = &'a WatchedEntry;
    type IntoIter = std::slice::Iter<'a, WatchedEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

fn parse_entry(index: usize, chunk: &str) -> Result<WatchedEntry> {
    let fields: Vec<&str> = chunk.split(FIELD_DELIMITER).collect();
    if fields.len() != 3 {
        return Err(SyncError::ParseError(format!(
            "entry {} ('{}') must have 3 fields separated by '{}', found {}",
            index + 1,
            chunk,
            FIELD_DELIMITER,
            fields.len()
        )));
    }

    let (remote_id, group, path) = (fields[0].trim(), fields[1].trim(), fields[2].trim());
    Ok(WatchedEntry::new(remote_id, group, path))
}
