//! Guest link upload policy.
//!
//! Pure functions turning a [`GuestLinkConfig`] and its [`GuestLinkUsage`] into what an upload
//! page may offer, and deciding whether an upload may consume one slot of the link.
//! Nothing here reads the clock or touches storage: `now` is always passed in.
//!
//! # Link lifecycle
//!
//! ```text
//!            upload (slots left)
//!             +-----+
//!             v     |
//!          Active --+-- last slot used --> Exhausted
//!           |   ^  \
//!   disable |   |   `-- url expires -----> Expired
//!           v   | enable
//!          Disabled
//! ```
//!
//! `Exhausted` and `Expired` are final. Deleting a link is handled by storage and
//! does not touch files already uploaded through it.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{InvalidConfiguration, PolicyError, Rejection};
use crate::{
    ExpirationChoice, FileLifetimePolicy, FileSize, GuestLinkConfig, GuestLinkUsage,
    RequestedExpiration,
};

/// Why a guest link does or does not accept uploads.
///
/// When several conditions hold at once, the first one in declaration order after
/// `Active` wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LinkStatus {
    Active,

    /// Operator switched the link off. Reversible.
    Disabled,

    /// The link URL expired.
    Expired,

    /// Every upload slot was used.
    Exhausted,
}

impl LinkStatus {
    pub fn is_active(&self) -> bool {
        *self == Self::Active
    }

    /// Whether no operation can make the link active again.
    pub fn is_final(&self) -> bool {
        matches!(self, Self::Expired | Self::Exhausted)
    }
}

impl fmt::Display for LinkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Active => "active",
            Self::Disabled => "disabled",
            Self::Expired => "expired",
            Self::Exhausted => "exhausted",
        })
    }
}

/// Guest link state at a given instant. Derived, never stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectiveGuestLinkState {
    pub status: LinkStatus,

    /// Whether the link accepts uploads right now.
    pub is_active: bool,

    /// Expirations an uploader may pick, in catalog order.
    pub allowed_expiration_choices: Vec<ExpirationChoice>,

    /// Preselected expiration, always one of `allowed_expiration_choices`.
    pub default_expiration_choice: ExpirationChoice,

    /// Upload slots left. `None` when the link has no upload limit.
    pub remaining_uploads: Option<i64>,
}

impl EffectiveGuestLinkState {
    pub fn allows(&self, choice: ExpirationChoice) -> bool {
        self.allowed_expiration_choices.contains(&choice)
    }
}

/// Compute the state of a guest link at `now`.
///
/// # Errors
///
/// - [`PolicyError::InvalidConfiguration`] if a limit is negative
/// - [`PolicyError::ClockSkew`] if `now` precedes the link creation
pub fn evaluate(
    config: &GuestLinkConfig,
    usage: &GuestLinkUsage,
    now: DateTime<Utc>,
) -> Result<EffectiveGuestLinkState, PolicyError> {
    config.check()?;
    if now < config.created {
        return Err(PolicyError::ClockSkew {
            now,
            created: config.created,
        });
    }

    let status = link_status(config, usage, now);
    let allowed_expiration_choices = allowed_expiration_choices(&config.file_lifetime, now);
    let default_expiration_choice =
        default_expiration_choice(&config.file_lifetime, &allowed_expiration_choices)
            .ok_or_else(|| {
                InvalidConfiguration(format!(
                    "file lifetime '{}' admits no expiration choice",
                    config.file_lifetime
                ))
            })?;
    let remaining_uploads = config
        .max_file_uploads
        .map(|max| (max - usage.uploads_consumed).max(0));

    Ok(EffectiveGuestLinkState {
        status,
        is_active: status.is_active(),
        allowed_expiration_choices,
        default_expiration_choice,
        remaining_uploads,
    })
}

fn link_status(
    config: &GuestLinkConfig,
    usage: &GuestLinkUsage,
    now: DateTime<Utc>,
) -> LinkStatus {
    if usage.is_disabled {
        LinkStatus::Disabled
    } else if config.url_expires.is_some_and(|expires| expires <= now) {
        LinkStatus::Expired
    } else if config
        .max_file_uploads
        .is_some_and(|max| usage.uploads_consumed >= max)
    {
        LinkStatus::Exhausted
    } else {
        LinkStatus::Active
    }
}

/// `now + duration`, or `None` if the instant is not representable.
fn instant_after(now: DateTime<Utc>, duration: Duration) -> Option<DateTime<Utc>> {
    TimeDelta::from_std(duration)
        .ok()
        .and_then(|delta| now.checked_add_signed(delta))
}

fn allowed_expiration_choices(
    policy: &FileLifetimePolicy,
    now: DateTime<Utc>,
) -> Vec<ExpirationChoice> {
    let Some(ceiling) = policy.ceiling() else {
        return ExpirationChoice::CATALOG.to_vec();
    };
    let latest = instant_after(now, ceiling.duration());
    ExpirationChoice::CATALOG
        .into_iter()
        .filter(|choice| {
            // Never and Custom have no duration and could exceed the ceiling.
            let Some(expires) = choice.duration().and_then(|d| instant_after(now, d)) else {
                return false;
            };
            latest.is_none_or(|latest| expires <= latest)
        })
        .collect()
}

fn default_expiration_choice(
    policy: &FileLifetimePolicy,
    allowed: &[ExpirationChoice],
) -> Option<ExpirationChoice> {
    match policy.ceiling() {
        None => Some(ExpirationChoice::Never),
        Some(lifetime) => ExpirationChoice::for_lifetime(lifetime)
            .filter(|choice| allowed.contains(choice))
            .or_else(|| {
                allowed
                    .iter()
                    .rev()
                    .copied()
                    .find(|choice| choice.duration().is_some())
            }),
    }
}

/// Consume one upload slot of the guest link.
///
/// Checks, first failure wins:
///
/// 1. the link is active, else [`Rejection::LinkInactive`]
/// 2. `file_size` fits the size ceiling, else [`Rejection::FileTooLarge`]
///
/// Returns usage with `uploads_consumed` incremented by one. The caller is responsible for
/// committing it atomically, see [`crate::Client::record_upload`].
pub fn record_upload(
    usage: &GuestLinkUsage,
    file_size: FileSize,
    config: &GuestLinkConfig,
    now: DateTime<Utc>,
) -> Result<GuestLinkUsage, Rejection> {
    let state = evaluate(config, usage, now)?;
    check_upload(&state, usage, file_size, config)
}

fn check_upload(
    state: &EffectiveGuestLinkState,
    usage: &GuestLinkUsage,
    file_size: FileSize,
    config: &GuestLinkConfig,
) -> Result<GuestLinkUsage, Rejection> {
    if !state.is_active {
        return Err(Rejection::LinkInactive {
            status: state.status,
        });
    }
    if let Some(max_bytes) = config.max_file_size() {
        if file_size > max_bytes {
            return Err(Rejection::FileTooLarge { max_bytes });
        }
    }
    Ok(GuestLinkUsage {
        uploads_consumed: usage.uploads_consumed + 1,
        ..*usage
    })
}

/// Turn the uploader's requested expiration into the file's own expiration instant.
///
/// `Ok(None)` means the file never expires.
pub fn resolve_expiration(
    state: &EffectiveGuestLinkState,
    requested: RequestedExpiration,
    now: DateTime<Utc>,
) -> Result<Option<DateTime<Utc>>, Rejection> {
    let choice = match requested {
        RequestedExpiration::Default => state.default_expiration_choice,
        RequestedExpiration::Choice(choice) => choice,
        RequestedExpiration::Custom(at) => {
            if !state.allows(ExpirationChoice::Custom) {
                return Err(Rejection::ExpirationNotAllowed(ExpirationChoice::Custom));
            }
            let earliest = now.checked_add_signed(TimeDelta::hours(1));
            if earliest.is_none_or(|earliest| at < earliest) {
                return Err(Rejection::ExpirationTooSoon);
            }
            return Ok(Some(at));
        }
    };
    if !state.allows(choice) {
        return Err(Rejection::ExpirationNotAllowed(choice));
    }
    match choice {
        ExpirationChoice::Never => Ok(None),
        choice => choice
            .duration()
            .and_then(|d| instant_after(now, d))
            .map(Some)
            .ok_or(Rejection::ExpirationNotAllowed(choice)),
    }
}

/// Upload admitted by [`admit_upload`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Admission {
    /// Usage after this upload.
    pub usage: GuestLinkUsage,

    /// Expiration of the uploaded file. `None` means never.
    pub expires: Option<DateTime<Utc>>,
}

/// [`record_upload`] followed by [`resolve_expiration`], evaluating the link once.
pub fn admit_upload(
    config: &GuestLinkConfig,
    usage: &GuestLinkUsage,
    file_size: FileSize,
    requested: RequestedExpiration,
    now: DateTime<Utc>,
) -> Result<Admission, Rejection> {
    let state = evaluate(config, usage, now)?;
    let usage = check_upload(&state, usage, file_size, config)?;
    let expires = resolve_expiration(&state, requested, now)?;
    Ok(Admission { usage, expires })
}
