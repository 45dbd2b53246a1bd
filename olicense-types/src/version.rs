//! Schema versioning for published snapshots.

use crate::SCHEMA_VERSION;

/// Schema version information embedded in snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SchemaVersion {
    /// Major version - breaking changes increment this.
    pub major: u32,

    /// Minor version - backwards-compatible additions increment this.
    pub minor: u32,
}

impl SchemaVersion {
    /// Create a new schema version.
    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }

    /// The current schema version used by this library.
    pub const fn current() -> Self {
        Self::new(SCHEMA_VERSION, 0)
    }
}

impl Default for SchemaVersion {
    fn default() -> Self {
        Self::current()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_current_major() {
        let version = SchemaVersion::default();
        assert_eq!(version, SchemaVersion::current());
        assert_eq!(version.major, SCHEMA_VERSION);
        assert_eq!(version.minor, 0);
    }
}
