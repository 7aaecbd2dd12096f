//! Standard expiration catalog offered to uploaders.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::FileLifetime;

const DAY: Duration = Duration::from_secs(24 * 60 * 60);

/// One entry of the expiration catalog.
///
/// Variants are declared in display order, which is also the ordering of [`Self::CATALOG`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum ExpirationChoice {
    OneDay,
    SevenDays,
    ThirtyDays,
    OneYear,
    Never,
    Custom,
}

impl ExpirationChoice {
    /// Every choice, in the order uploaders see them.
    pub const CATALOG: [Self; 6] = [
        Self::OneDay,
        Self::SevenDays,
        Self::ThirtyDays,
        Self::OneYear,
        Self::Never,
        Self::Custom,
    ];

    /// File lifetime of a fixed-duration choice.
    ///
    /// `None` for [`Self::Never`] and [`Self::Custom`].
    pub fn duration(&self) -> Option<Duration> {
        match self {
            Self::OneDay => Some(DAY),
            Self::SevenDays => Some(DAY * 7),
            Self::ThirtyDays => Some(DAY * 30),
            Self::OneYear => Some(DAY * 365),
            Self::Never | Self::Custom => None,
        }
    }

    /// Catalog entry matching `lifetime` exactly, if any.
    pub fn for_lifetime(lifetime: FileLifetime) -> Option<Self> {
        if lifetime.is_infinite() {
            return Some(Self::Never);
        }
        Self::CATALOG
            .into_iter()
            .find(|choice| choice.duration() == Some(lifetime.duration()))
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::OneDay => "1 day",
            Self::SevenDays => "7 days",
            Self::ThirtyDays => "30 days",
            Self::OneYear => "1 year",
            Self::Never => "Never",
            Self::Custom => "Custom",
        }
    }
}

impl fmt::Display for ExpirationChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Unknown expiration choice label.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("unrecognized expiration '{0}', expected one of: 1 day, 7 days, 30 days, 1 year, Never, Custom")]
pub struct ParseExpirationChoiceError(pub String);

/// Accepts display labels ("7 days") and short forms ("7d", "1y", "never").
impl FromStr for ExpirationChoice {
    type Err = ParseExpirationChoiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "1 day" | "1d" => Ok(Self::OneDay),
            "7 days" | "7d" => Ok(Self::SevenDays),
            "30 days" | "30d" => Ok(Self::ThirtyDays),
            "1 year" | "1y" | "365d" => Ok(Self::OneYear),
            "never" => Ok(Self::Never),
            "custom" => Ok(Self::Custom),
            _ => Err(ParseExpirationChoiceError(s.to_string())),
        }
    }
}

/// Expiration an uploader asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequestedExpiration {
    /// Use the guest link's default choice.
    #[default]
    Default,

    /// A catalog entry. [`ExpirationChoice::Custom`] needs [`Self::Custom`] instead.
    Choice(ExpirationChoice),

    /// Explicit expiration instant.
    Custom(DateTime<Utc>),
}

impl From<ExpirationChoice> for RequestedExpiration {
    fn from(choice: ExpirationChoice) -> Self {
        Self::Choice(choice)
    }
}
