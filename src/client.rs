use tracing::{debug, info, trace, warn};

use crate::database::api::{self, CommitOutcome};
use crate::database::models::{GuestLinkEntry, NewUploadEntry};
use crate::database::{self, Connection};
use crate::errors::{CorruptRecord, DatabaseError, Error, InvalidConfiguration, Rejection};
use crate::policy::{self, EffectiveGuestLinkState};
use crate::{
    DateTime, FileSize, GuestLink, GuestLinkConfig, GuestLinkId, GuestLinkUsage,
    RequestedExpiration, Upload, Utc,
};

type StdResult<T, E> = std::result::Result<T, E>;
type Result<T> = StdResult<T, Error>;

/// How many times [`Client::record_upload`] re-fetches the guest link after losing a race
/// on the upload counter, unless configured otherwise.
pub const DEFAULT_CONFLICT_RETRIES: u32 = 1;

/// Used to create precisely configured [`Client`].
#[must_use]
#[derive(Clone, Debug)]
pub struct ClientBuilder {
    database_url: String,
    conflict_retries: u32,
}

impl ClientBuilder {
    /// Create new client builder.
    pub fn new(database_url: &str) -> Self {
        Self {
            database_url: database_url.to_string(),
            conflict_retries: DEFAULT_CONFLICT_RETRIES,
        }
    }

    /// Set how many times a conflicting upload is retried before giving up with
    /// [`Error::Contended`].
    ///
    /// If not set, [`DEFAULT_CONFLICT_RETRIES`] is used.
    pub fn conflict_retries(&mut self, retries: u32) -> &mut Self {
        self.conflict_retries = retries;
        self
    }

    /// Build client.
    ///
    /// # Errors
    ///
    /// Returns error if client initialization fails.
    pub async fn build(self) -> Result<Client> {
        let mut client = Client::init(&self.database_url).await?;
        client.conflict_retries = self.conflict_retries;
        Ok(client)
    }
}

/// Result of [`Client::record_upload`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UploadOutcome {
    /// Upload was counted against the guest link.
    Accepted {
        /// Usage right after this upload.
        usage: GuestLinkUsage,

        /// Recorded upload with its expiration.
        upload: Upload,
    },

    /// Upload was refused. Nothing was written.
    Rejected(Rejection),
}

impl UploadOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted { .. })
    }
}

/// Result of [`Client::commit_upload_count`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommitStatus {
    /// Counter was incremented. Contains usage after the increment.
    Committed(GuestLinkUsage),

    /// Counter did not hold the expected value, or the link is disabled or out of upload slots.
    Conflict,
}

/// Guestlink client.
///
/// Owns a single connection to the guest link database. Any number of clients may work on
/// the same database concurrently: upload counting is an atomic compare-and-increment, so a
/// link never accepts more uploads than its limit.
///
/// See for [crate-level documentation][crate] for more information.
pub struct Client {
    /// Guest link database connection.
    pub(crate) db: Connection,

    conflict_retries: u32,
}

impl Client {
    /// Create [`ClientBuilder`] for precise [`Client`] configuration.
    pub fn builder(database_url: &str) -> ClientBuilder {
        ClientBuilder::new(database_url)
    }

    /// Initialize Guestlink client.
    ///
    /// Initializes database if it doesn't exist.
    pub async fn init(database_url: &str) -> Result<Self> {
        trace!("running migrations on {}", database_url);
        database::run_migrations(database_url).await?;

        trace!("establishing guest link database connection: {}", database_url);
        let db = database::establish_connection(database_url).await?;

        Ok(Self {
            db,
            conflict_retries: DEFAULT_CONFLICT_RETRIES,
        })
    }

    /// Store a new guest link. Nothing is uploaded through it yet and it is enabled.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfiguration`] if a limit is negative or a guest link with the
    /// same ID already exists.
    pub async fn create_guest_link(&mut self, config: GuestLinkConfig) -> Result<GuestLink> {
        debug!("creating guest link {}", config.id);
        config.check()?;
        let entry = match api::insert_guest_link(&mut self.db, GuestLinkEntry::new(&config)).await
        {
            Ok(entry) => entry,
            Err(err) if err.is_unique_violation() => {
                return Err(InvalidConfiguration(format!(
                    "guest link {} already exists",
                    config.id
                ))
                .into())
            }
            Err(err) => return Err(err.into()),
        };
        info!("created guest link {}", entry.id);
        Ok(GuestLink::try_from(entry)?)
    }

    /// Load guest link configuration with its current usage.
    pub async fn load_guest_link(&mut self, id: &GuestLinkId) -> Result<GuestLink> {
        debug!("load guest link {}", id);
        let entry = api::get_guest_link(&mut self.db, id.as_str())
            .await?
            .ok_or_else(|| Error::NotFound(id.clone()))?;
        Ok(GuestLink::try_from(entry)?)
    }

    /// List all guest links, newest first.
    pub async fn list_guest_links(&mut self) -> Result<Vec<GuestLink>> {
        debug!("list guest links");
        let entries = api::get_all_guest_links(&mut self.db).await?;
        let links = entries
            .into_iter()
            .map(GuestLink::try_from)
            .collect::<StdResult<Vec<_>, CorruptRecord>>()?;
        Ok(links)
    }

    /// Evaluate guest link state at `now`.
    pub async fn guest_link_state(
        &mut self,
        id: &GuestLinkId,
        now: DateTime<Utc>,
    ) -> Result<EffectiveGuestLinkState> {
        let link = self.load_guest_link(id).await?;
        Ok(policy::evaluate(&link.config, &link.usage, now)?)
    }

    /// Let the guest link accept uploads again, subject to its quota and expiration.
    pub async fn enable_guest_link(&mut self, id: &GuestLinkId) -> Result<GuestLink> {
        self.set_disabled(id, false).await
    }

    /// Block uploads through the guest link regardless of quota and expiration.
    pub async fn disable_guest_link(&mut self, id: &GuestLinkId) -> Result<GuestLink> {
        self.set_disabled(id, true).await
    }

    async fn set_disabled(&mut self, id: &GuestLinkId, disabled: bool) -> Result<GuestLink> {
        debug!("set guest link {} disabled={}", id, disabled);
        let entry = api::set_disabled(&mut self.db, id.as_str(), disabled)
            .await
            .map_err(not_found(id))?;
        if disabled {
            info!("disabled guest link {}", id);
        } else {
            info!("enabled guest link {}", id);
        }
        Ok(GuestLink::try_from(entry)?)
    }

    /// Delete guest link.
    ///
    /// Files uploaded through it keep their expiration and are only detached from the link.
    pub async fn delete_guest_link(&mut self, id: &GuestLinkId) -> Result<()> {
        debug!("deleting guest link {}", id);
        if api::delete_guest_link(&mut self.db, id.as_str()).await? {
            info!("deleted guest link {}", id);
            Ok(())
        } else {
            Err(Error::NotFound(id.clone()))
        }
    }

    /// Count one upload against the guest link if its counter still equals `expected_prior`.
    ///
    /// A disabled link or one without a free upload slot is never counted against and yields
    /// [`CommitStatus::Conflict`]. No upload record is written. Use [`Client::record_upload`]
    /// to check the full policy and record the upload as well.
    pub async fn commit_upload_count(
        &mut self,
        id: &GuestLinkId,
        expected_prior: i64,
    ) -> Result<CommitStatus> {
        debug!(
            "commit upload count of guest link {}, expected {}",
            id, expected_prior
        );
        let outcome = api::commit_upload_count(&mut self.db, id.as_str(), expected_prior, None)
            .await
            .map_err(not_found(id))?;
        match outcome {
            CommitOutcome::Committed { entry, .. } => {
                let link = GuestLink::try_from(entry)?;
                Ok(CommitStatus::Committed(link.usage))
            }
            CommitOutcome::Conflict => Ok(CommitStatus::Conflict),
        }
    }

    /// Check an upload of `file_size` against the guest link at `now` and record it.
    ///
    /// Rejections are returned as [`UploadOutcome::Rejected`]. When another upload changes the
    /// counter concurrently, the link is re-fetched and checked again, up to the configured
    /// number of conflict retries.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] if there is no such guest link
    /// - [`Error::Policy`] if the stored configuration is invalid or `now` precedes link creation
    /// - [`Error::Contended`] if the counter kept changing on every attempt
    /// - [`Error::StorageUnavailable`] on database failure
    pub async fn record_upload(
        &mut self,
        id: &GuestLinkId,
        file_size: FileSize,
        requested: RequestedExpiration,
        now: DateTime<Utc>,
    ) -> Result<UploadOutcome> {
        debug!("record upload of {} through guest link {}", file_size, id);
        let attempts = self.conflict_retries.saturating_add(1);
        for attempt in 1..=attempts {
            let link = self.load_guest_link(id).await?;
            let admission =
                match policy::admit_upload(&link.config, &link.usage, file_size, requested, now) {
                    Ok(admission) => admission,
                    Err(Rejection::Policy(err)) => return Err(err.into()),
                    Err(rejection) => {
                        info!("upload through guest link {} rejected: {}", id, rejection);
                        return Ok(UploadOutcome::Rejected(rejection));
                    }
                };

            let new_upload = NewUploadEntry {
                guest_link_id: Some(id.to_string()),
                size: file_size.as_i64(),
                uploaded: now,
                expires: admission.expires,
            };
            let outcome = api::commit_upload_count(
                &mut self.db,
                id.as_str(),
                link.usage.uploads_consumed,
                Some(new_upload),
            )
            .await
            .map_err(not_found(id))?;

            match outcome {
                CommitOutcome::Committed { entry, upload } => {
                    let link = GuestLink::try_from(entry)?;
                    let upload = upload.ok_or_else(|| {
                        CorruptRecord(format!("upload through guest link {} not recorded", id))
                    })?;
                    let upload = Upload::try_from(upload)?;
                    info!(
                        "accepted upload {} through guest link {} ({} uploads consumed)",
                        upload.id, id, link.usage.uploads_consumed
                    );
                    return Ok(UploadOutcome::Accepted {
                        usage: link.usage,
                        upload,
                    });
                }
                CommitOutcome::Conflict => {
                    warn!(
                        "upload count of guest link {} changed concurrently (attempt {} of {})",
                        id, attempt, attempts
                    );
                }
            }
        }
        Err(Error::Contended { attempts })
    }

    /// List uploads made through the guest link, oldest first.
    pub async fn uploads_for_guest_link(&mut self, id: &GuestLinkId) -> Result<Vec<Upload>> {
        debug!("list uploads of guest link {}", id);
        if api::get_guest_link(&mut self.db, id.as_str())
            .await?
            .is_none()
        {
            return Err(Error::NotFound(id.clone()));
        }
        let entries = api::uploads_for_guest_link(&mut self.db, id.as_str()).await?;
        let uploads = entries
            .into_iter()
            .map(Upload::try_from)
            .collect::<StdResult<Vec<_>, CorruptRecord>>()?;
        Ok(uploads)
    }

    /// Get upload by its primary key.
    pub async fn get_upload(&mut self, pk: i32) -> Result<Upload> {
        debug!("get upload {}", pk);
        let entry = api::get_upload(&mut self.db, pk)
            .await?
            .ok_or(Error::UploadNotFound(pk))?;
        Ok(Upload::try_from(entry)?)
    }
}

/// Map missing row to [`Error::NotFound`].
fn not_found(id: &GuestLinkId) -> impl FnOnce(DatabaseError) -> Error + '_ {
    move |err| {
        if err.is_not_found() {
            Error::NotFound(id.clone())
        } else {
            err.into()
        }
    }
}
