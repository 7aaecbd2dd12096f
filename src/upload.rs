use chrono::{DateTime, Utc};

use crate::{FileSize, GuestLinkId};

/// File admitted through a guest link.
///
/// Its expiration is computed once, at upload time, and is independent of the guest link
/// afterwards: deleting the link only detaches the upload from it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Upload {
    /// Primary key of the upload in database.
    pub id: i32,

    /// Guest link the file came through. `None` once that link is deleted.
    pub guest_link_id: Option<GuestLinkId>,

    pub size: FileSize,

    /// Upload timestamp.
    pub uploaded: DateTime<Utc>,

    /// Expiration timestamp. `None` means the file never expires.
    pub expires: Option<DateTime<Utc>>,
}

impl Upload {
    /// Whether the file expired at `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires.is_some_and(|expires| expires <= now)
    }
}
