//! Error types.

use chrono::{DateTime, Utc};
use diesel::result::DatabaseErrorKind;

#[doc(no_inline)]
pub use diesel::result::{ConnectionError, Error as DieselError};

#[doc(no_inline)]
pub use crate::file_size::FileSizeError;
#[doc(no_inline)]
pub use crate::expiration::ParseExpirationChoiceError;
#[doc(no_inline)]
pub use crate::guest_link::{GuestLinkIdError, LabelTooLong};
#[doc(no_inline)]
pub use crate::lifetime::{LifetimeError, ParseLifetimeError};

use crate::policy::LinkStatus;
use crate::{ExpirationChoice, FileSize, GuestLinkId};

/// Guest link database related errors.
#[derive(thiserror::Error, Debug)]
pub enum DatabaseError {
    #[error("connection failed")]
    ConnectionError(#[from] ConnectionError),

    #[error("migration failed: {0}")]
    MigrationError(String),

    #[error(transparent)]
    DieselError(#[from] DieselError),
}

impl DatabaseError {
    /// Whether the error is unique key violation.
    pub fn is_unique_violation(&self) -> bool {
        matches!(
            *self,
            DatabaseError::DieselError(DieselError::DatabaseError(
                DatabaseErrorKind::UniqueViolation,
                _
            ))
        )
    }

    /// Whether the requested row does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(*self, DatabaseError::DieselError(DieselError::NotFound))
    }
}

/// Malformed guest link setup.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid guest link configuration: {0}")]
pub struct InvalidConfiguration(pub String);

impl From<derive_builder::UninitializedFieldError> for InvalidConfiguration {
    fn from(value: derive_builder::UninitializedFieldError) -> Self {
        Self(value.to_string())
    }
}

/// Guest link policy cannot be evaluated.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PolicyError {
    #[error(transparent)]
    InvalidConfiguration(#[from] InvalidConfiguration),

    #[error("evaluation time {now} precedes guest link creation at {created}")]
    ClockSkew {
        now: DateTime<Utc>,
        created: DateTime<Utc>,
    },
}

/// Reason an upload through a guest link is refused.
///
/// These are expected outcomes and are returned as values.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    #[error("Guest Link Inactive")]
    LinkInactive { status: LinkStatus },

    #[error("file too large - limit {max_bytes}")]
    FileTooLarge { max_bytes: FileSize },

    #[error("expiration '{0}' is not allowed by this guest link")]
    ExpirationNotAllowed(ExpirationChoice),

    #[error("expire time must be at least one hour in the future")]
    ExpirationTooSoon,

    #[error(transparent)]
    Policy(#[from] PolicyError),
}

/// Stored row cannot be turned back into a domain value.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("corrupt record: {0}")]
pub struct CorruptRecord(pub String);

/// Non UTF-8 symbol in path.
#[derive(thiserror::Error, Debug)]
#[error("non-UTF-8 symbol in path")]
pub struct NonUtf8PathError;

/// Guestlink client error.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("guest link {0} not found")]
    NotFound(GuestLinkId),

    #[error("upload {0} not found")]
    UploadNotFound(i32),

    #[error("storage unavailable")]
    StorageUnavailable(#[from] DatabaseError),

    #[error("upload count kept changing concurrently after {attempts} attempts")]
    Contended { attempts: u32 },

    #[error(transparent)]
    CorruptRecord(#[from] CorruptRecord),

    #[error(transparent)]
    Policy(#[from] PolicyError),

    #[error(transparent)]
    InvalidConfiguration(#[from] InvalidConfiguration),

    #[error(transparent)]
    NonUtf8PathError(#[from] NonUtf8PathError),
}

impl Error {
    /// Whether retrying the same call later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::StorageUnavailable(_) | Error::Contended { .. })
    }
}
