//! # Guestlink
//!
//! Upload policy of guest links: anonymous upload URLs with an upload quota, a per-file size
//! ceiling, an optional link expiration and a rule for how long uploaded files live.
//!
//! The policy itself lives in [`policy`] and is pure: every call takes the current instant as
//! an argument. [`Client`] keeps guest links in SQLite and counts uploads atomically, so a link
//! never accepts more uploads than allowed, even with many clients on the same database.
//!
//! ## Example
//!
//! ```rust
//! # async fn test(database: &str) {
//! use guestlink::{Client, FileLifetime, FileSize, GuestLinkConfig, RequestedExpiration, Utc};
//!
//! // Create client
//! let mut client = Client::init(database).await.unwrap();
//!
//! // Issue a link for 10 uploads, files live at most a week
//! let config = GuestLinkConfig::builder()
//!     .max_file_uploads(10)
//!     .file_lifetime(FileLifetime::in_days(7).unwrap())
//!     .build()
//!     .unwrap();
//! let link = client.create_guest_link(config).await.unwrap();
//!
//! // What should the upload page offer?
//! let state = client.guest_link_state(link.id(), Utc::now()).await.unwrap();
//! println!("{:?}", state.allowed_expiration_choices);
//!
//! // Count an upload against the link
//! let outcome = client
//!     .record_upload(link.id(), FileSize::from_mib(3), RequestedExpiration::Default, Utc::now())
//!     .await
//!     .unwrap();
//! assert!(outcome.is_accepted());
//! # }
//! ```

mod client;
mod expiration;
mod file_size;
mod guest_link;
mod lifetime;
mod upload;

pub mod database;
pub mod errors;
pub mod policy;

#[cfg(feature = "pool")]
pub mod pool;

pub use client::{Client, ClientBuilder, CommitStatus, UploadOutcome, DEFAULT_CONFLICT_RETRIES};
pub use expiration::{ExpirationChoice, RequestedExpiration};
pub use file_size::FileSize;
pub use guest_link::{
    GuestLink, GuestLinkConfig, GuestLinkConfigBuilder, GuestLinkId, GuestLinkLabel,
    GuestLinkUsage,
};
pub use lifetime::{FileLifetime, FileLifetimePolicy};
pub use upload::Upload;

// Re-exports of public API arguments from extern crates
#[doc(no_inline)]
pub use chrono::{DateTime, Utc};
