//! Configuration for opening SQLite connections.

use crate::ffi;
use serde::Deserialize;
use std::ffi::c_int;

/// Where the database lives.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Location {
    /// A private in-memory database, discarded on close.
    #[default]
    InMemory,
    /// A private temporary on-disk database, deleted on close.
    Temporary,
    /// A file path, or a `file:` URI when [`OpenFlags::uri`] is set.
    Uri(String),
}

impl Location {
    /// The filename passed to `sqlite3_open_v2`.
    pub fn as_filename(&self) -> &str {
        match self {
            Location::InMemory => ":memory:",
            Location::Temporary => "",
            Location::Uri(path) => path,
        }
    }
}

/// Flags controlling how the database is opened.
///
/// Connections are always opened in serialized mode: the handle moves
/// between worker threads and statements may be finalized from any of them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct OpenFlags {
    /// Open for reading only.
    pub read_only: bool,
    /// Open for reading and writing.
    pub read_write: bool,
    /// Create the database if it doesn't exist.
    pub create: bool,
    /// Enable URI filename interpretation.
    pub uri: bool,
    /// Enable shared cache mode.
    pub shared_cache: bool,
    /// Disable shared cache mode.
    pub private_cache: bool,
}

impl OpenFlags {
    /// Create flags for read-only access.
    pub fn read_only() -> Self {
        Self {
            read_only: true,
            ..Default::default()
        }
    }

    /// Create flags for read-write access (database must exist).
    pub fn read_write() -> Self {
        Self {
            read_write: true,
            ..Default::default()
        }
    }

    /// Create flags for read-write access with creation if needed.
    pub fn create_read_write() -> Self {
        Self {
            read_write: true,
            create: true,
            ..Default::default()
        }
    }

    /// Enable URI filename interpretation.
    pub fn with_uri(mut self) -> Self {
        self.uri = true;
        self
    }

    pub(crate) fn to_sqlite_flags(self) -> c_int {
        let mut flags = ffi::SQLITE_OPEN_FULLMUTEX;

        if self.read_only {
            flags |= ffi::SQLITE_OPEN_READONLY;
        }
        if self.read_write {
            flags |= ffi::SQLITE_OPEN_READWRITE;
        }
        if self.create {
            flags |= ffi::SQLITE_OPEN_CREATE;
        }
        if self.uri {
            flags |= ffi::SQLITE_OPEN_URI;
        }
        if self.shared_cache {
            flags |= ffi::SQLITE_OPEN_SHAREDCACHE;
        }
        if self.private_cache {
            flags |= ffi::SQLITE_OPEN_PRIVATECACHE;
        }

        // Default to read-write if no mode specified
        if flags & (ffi::SQLITE_OPEN_READONLY | ffi::SQLITE_OPEN_READWRITE) == 0 {
            flags |= ffi::SQLITE_OPEN_READWRITE | ffi::SQLITE_OPEN_CREATE;
        }

        flags
    }
}

/// Configuration for opening SQLite connections.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SqliteConfig {
    /// Database location.
    pub location: Location,
    /// Open flags (read-only, read-write, create, etc.)
    pub flags: OpenFlags,
    /// Busy timeout in milliseconds.
    pub busy_timeout_ms: u32,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            location: Location::InMemory,
            flags: OpenFlags::create_read_write(),
            busy_timeout_ms: 200,
        }
    }
}

impl SqliteConfig {
    /// Config for a file-based database.
    pub fn file(path: impl Into<String>) -> Self {
        Self {
            location: Location::Uri(path.into()),
            ..Self::default()
        }
    }

    /// Config for an in-memory database.
    pub fn memory() -> Self {
        Self::default()
    }

    /// Config for a temporary on-disk database.
    pub fn temporary() -> Self {
        Self {
            location: Location::Temporary,
            ..Self::default()
        }
    }

    /// Set open flags.
    pub fn flags(mut self, flags: OpenFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Set busy timeout.
    pub fn busy_timeout(mut self, ms: u32) -> Self {
        self.busy_timeout_ms = ms;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_filenames() {
        assert_eq!(Location::InMemory.as_filename(), ":memory:");
        assert_eq!(Location::Temporary.as_filename(), "");
        assert_eq!(Location::Uri("db.sqlite".into()).as_filename(), "db.sqlite");
    }

    #[test]
    fn test_open_flags() {
        let default = OpenFlags::default().to_sqlite_flags();
        assert_ne!(default & ffi::SQLITE_OPEN_READWRITE, 0);
        assert_ne!(default & ffi::SQLITE_OPEN_CREATE, 0);
        assert_ne!(default & ffi::SQLITE_OPEN_FULLMUTEX, 0);

        let ro = OpenFlags::read_only().to_sqlite_flags();
        assert_ne!(ro & ffi::SQLITE_OPEN_READONLY, 0);
        assert_eq!(ro & ffi::SQLITE_OPEN_CREATE, 0);

        let uri = OpenFlags::create_read_write().with_uri().to_sqlite_flags();
        assert_ne!(uri & ffi::SQLITE_OPEN_URI, 0);
    }

    #[test]
    fn test_config_defaults() {
        let config = SqliteConfig::default();
        assert_eq!(config.location, Location::InMemory);
        assert_eq!(config.busy_timeout_ms, 200);

        let file = SqliteConfig::file("app.db").busy_timeout(1000);
        assert_eq!(file.location, Location::Uri("app.db".into()));
        assert_eq!(file.busy_timeout_ms, 1000);
    }
}
