//! Byte-size value type.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Invalid file size.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileSizeError {
    #[error("file size must not be negative")]
    Negative,

    #[error("file must be non-empty")]
    Empty,
}

/// Size of a file in bytes.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct FileSize(u64);

impl FileSize {
    pub const KIB: u64 = 1024;
    pub const MIB: u64 = 1024 * Self::KIB;
    pub const GIB: u64 = 1024 * Self::MIB;

    pub const fn from_bytes(bytes: u64) -> Self {
        Self(bytes)
    }

    pub const fn from_mib(mib: u64) -> Self {
        Self(mib * Self::MIB)
    }

    /// Convert a signed byte count, as stored in the database.
    pub fn from_i64(bytes: i64) -> Result<Self, FileSizeError> {
        u64::try_from(bytes)
            .map(Self)
            .map_err(|_| FileSizeError::Negative)
    }

    /// Size of an uploaded file. Empty uploads are refused.
    pub fn for_upload(bytes: u64) -> Result<Self, FileSizeError> {
        if bytes == 0 {
            return Err(FileSizeError::Empty);
        }
        Ok(Self(bytes))
    }

    pub fn bytes(&self) -> u64 {
        self.0
    }

    /// Byte count as stored in the database. Saturates above `i64::MAX`.
    pub fn as_i64(&self) -> i64 {
        i64::try_from(self.0).unwrap_or(i64::MAX)
    }
}

impl From<u64> for FileSize {
    fn from(bytes: u64) -> Self {
        Self(bytes)
    }
}

/// Binary units: `1023 B`, `1.0 KiB`, `50.0 MiB`.
impl fmt::Display for FileSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bytes = self.0;
        if bytes < Self::KIB {
            return write!(f, "{} B", bytes);
        }
        let (unit, scale) = if bytes >= Self::GIB {
            ("GiB", Self::GIB)
        } else if bytes >= Self::MIB {
            ("MiB", Self::MIB)
        } else {
            ("KiB", Self::KIB)
        };
        write!(f, "{:.1} {}", bytes as f64 / scale as f64, unit)
    }
}
