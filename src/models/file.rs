use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unix directory type bit, as reported by `DavFile::mode`
pub const MODE_DIR: u32 = 0o040000;

/// A remote file or collection as reported by a PROPFIND
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DavFile {
    pub path: String,
    pub name: String,
    pub content_type: String,
    pub size: i64,
    pub modified: Option<DateTime<Utc>>,
    pub etag: String,
    pub is_dir: bool,
}

impl DavFile {
    pub fn mode(&self) -> u32 {
        if self.is_dir {
            MODE_DIR | 0o775
        } else {
            0o664
        }
    }

    /// Parses a `getlastmodified` value (RFC 2822 / HTTP date)
    pub fn parse_modified(value: &str) -> Option<DateTime<Utc>> {
        let value = value.trim();
        if value.is_empty() {
            return None;
        }
        DateTime::parse_from_rfc2822(value)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    }
}

impl fmt::Display for DavFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_dir {
            return write!(f, "Dir : '{}' - '{}'", self.path, self.name);
        }
        let modified = self
            .modified
            .map(|m| m.to_rfc3339())
            .unwrap_or_else(|| "-".to_string());
        write!(
            f,
            "File: '{}' SIZE: {} MODIFIED: {} ETAG: {} CTYPE: {}",
            self.path, self.size, modified, self.etag, self.content_type
        )
    }
}
