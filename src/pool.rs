//! Pool of Guestlink clients.
//!
//! This is based on [`deadpool::managed`].
//!
//! ## Example
//!
//! ```rust
//! # async fn test(database_url: &str) {
//! use guestlink::pool::{Pool, PoolManager};
//! use guestlink::{FileSize, GuestLinkId, RequestedExpiration, Utc};
//!
//! // Build clients pool
//! let pool_manager = PoolManager::new(database_url);
//! let pool = Pool::builder(pool_manager).build().unwrap();
//!
//! // Get Guestlink client from pool
//! let mut client = pool.get().await.unwrap();
//!
//! // Use it as usually
//! let id: GuestLinkId = "abcdefgh23456789".parse().unwrap();
//! let outcome = client
//!     .record_upload(&id, FileSize::from_mib(1), RequestedExpiration::Default, Utc::now())
//!     .await
//!     .unwrap();
//! # }
//! ```

use deadpool::managed;

use crate::errors::Error;
use crate::Client;

/// Manager of pool of Guestlink clients.
pub struct PoolManager {
    database_url: String,
    conflict_retries: Option<u32>,
}

impl PoolManager {
    /// Create new manager.
    pub fn new(database_url: &str) -> Self {
        Self {
            database_url: database_url.to_string(),
            conflict_retries: None,
        }
    }

    /// Conflict retries of every client in the pool. See [`crate::ClientBuilder::conflict_retries`].
    pub fn conflict_retries(mut self, retries: u32) -> Self {
        self.conflict_retries = Some(retries);
        self
    }
}

impl managed::Manager for PoolManager {
    type Type = Client;
    type Error = Error;

    async fn create(&self) -> Result<Client, Error> {
        let mut builder = Client::builder(&self.database_url);
        if let Some(retries) = self.conflict_retries {
            builder.conflict_retries(retries);
        }
        builder.build().await
    }

    async fn recycle(&self, _: &mut Client, _: &managed::Metrics) -> managed::RecycleResult<Error> {
        Ok(())
    }
}

/// Pool of Guestlink clients.
///
/// Alias for [`deadpool::managed::Pool`].
pub type Pool = managed::Pool<PoolManager>;
