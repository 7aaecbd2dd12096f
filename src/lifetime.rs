//! File lifetime value types.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

const SECS_PER_DAY: u64 = 24 * 60 * 60;

// Imprecise, but file lifetimes are not exact measures of time anyway.
const DAYS_PER_YEAR: u64 = 365;

const MIN_LIFETIME_DAYS: u64 = 1;
const MAX_LIFETIME_YEARS: u64 = 10;

/// Invalid file lifetime.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifetimeError {
    #[error("file lifetime must be at least {} day", MIN_LIFETIME_DAYS)]
    TooShort,

    #[error("file lifetime must be at most {} years", MAX_LIFETIME_YEARS)]
    TooLong,
}

/// File lifetime text cannot be parsed.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseLifetimeError {
    #[error("unrecognized file lifetime '{0}', expected e.g. '7d', '2y' or 'unrestricted'")]
    Unrecognized(String),

    #[error(transparent)]
    OutOfRange(#[from] LifetimeError),
}

/// How long a file lives after being uploaded.
///
/// Finite lifetimes are always between 1 day and 10 years.
/// [`FileLifetime::INFINITE`] stands for "never expires".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u64", into = "u64")]
pub struct FileLifetime(Duration);

impl FileLifetime {
    /// Sentinel lifetime of 876 000 hours (100 years), meaning the file never expires.
    pub const INFINITE: Self = Self(Duration::from_secs(876_000 * 60 * 60));

    /// Lifetime of exactly `days` days.
    pub fn in_days(days: u16) -> Result<Self, LifetimeError> {
        Self::from_duration(Duration::from_secs(u64::from(days) * SECS_PER_DAY))
    }

    /// Lifetime of exactly `years` years (365 days each).
    pub fn in_years(years: u16) -> Result<Self, LifetimeError> {
        Self::from_duration(Duration::from_secs(
            u64::from(years) * DAYS_PER_YEAR * SECS_PER_DAY,
        ))
    }

    /// Validate an arbitrary duration.
    ///
    /// [`FileLifetime::INFINITE`] is accepted as is.
    pub fn from_duration(duration: Duration) -> Result<Self, LifetimeError> {
        if duration == Self::INFINITE.0 {
            return Ok(Self::INFINITE);
        }
        if duration < Duration::from_secs(MIN_LIFETIME_DAYS * SECS_PER_DAY) {
            return Err(LifetimeError::TooShort);
        }
        if duration > Duration::from_secs(MAX_LIFETIME_YEARS * DAYS_PER_YEAR * SECS_PER_DAY) {
            return Err(LifetimeError::TooLong);
        }
        Ok(Self(duration))
    }

    pub fn duration(&self) -> Duration {
        self.0
    }

    /// Whole days, rounded down.
    pub fn days(&self) -> u64 {
        self.0.as_secs() / SECS_PER_DAY
    }

    /// Whole years, rounded down.
    pub fn years(&self) -> u64 {
        self.days() / DAYS_PER_YEAR
    }

    pub fn is_year_boundary(&self) -> bool {
        self.days() % DAYS_PER_YEAR == 0
    }

    pub fn is_infinite(&self) -> bool {
        *self == Self::INFINITE
    }
}

impl TryFrom<u64> for FileLifetime {
    type Error = LifetimeError;

    fn try_from(secs: u64) -> Result<Self, Self::Error> {
        Self::from_duration(Duration::from_secs(secs))
    }
}

impl From<FileLifetime> for u64 {
    fn from(value: FileLifetime) -> Self {
        value.0.as_secs()
    }
}

impl fmt::Display for FileLifetime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_infinite() {
            return f.write_str("Never");
        }
        let (value, unit) = if self.is_year_boundary() {
            (self.years(), "year")
        } else {
            (self.days(), "day")
        };
        let plural = if value > 1 { "s" } else { "" };
        write!(f, "{} {}{}", value, unit, plural)
    }
}

/// Rule for the lifetime of files uploaded through a guest link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum FileLifetimePolicy {
    /// Each upload chooses its own expiration, up to system maximums.
    #[default]
    Unrestricted,

    /// Uploaded files cannot outlive this lifetime.
    Fixed { lifetime: FileLifetime },
}

impl FileLifetimePolicy {
    pub fn fixed(lifetime: FileLifetime) -> Self {
        lifetime.into()
    }

    /// Upper bound on file lifetime. `None` when unrestricted.
    ///
    /// A fixed infinite lifetime has no ceiling either.
    pub fn ceiling(&self) -> Option<FileLifetime> {
        match *self {
            Self::Fixed { lifetime } if !lifetime.is_infinite() => Some(lifetime),
            _ => None,
        }
    }

    pub fn is_unrestricted(&self) -> bool {
        self.ceiling().is_none()
    }
}

impl From<FileLifetime> for FileLifetimePolicy {
    fn from(lifetime: FileLifetime) -> Self {
        if lifetime.is_infinite() {
            Self::Unrestricted
        } else {
            Self::Fixed { lifetime }
        }
    }
}

impl fmt::Display for FileLifetimePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.ceiling() {
            Some(lifetime) => write!(f, "{}", lifetime),
            None => f.write_str("unrestricted"),
        }
    }
}

/// Accepts "unrestricted" or "never", a number of days ("30", "30d", "30 days") or
/// years ("2y", "2 years").
impl FromStr for FileLifetimePolicy {
    type Err = ParseLifetimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let text = s.trim().to_lowercase();
        if text == "unrestricted" || text == "never" {
            return Ok(Self::Unrestricted);
        }
        let unrecognized = || ParseLifetimeError::Unrecognized(s.to_string());
        let split = text
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(text.len());
        let (number, unit) = text.split_at(split);
        let number: u16 = number.parse().map_err(|_| unrecognized())?;
        let lifetime = match unit.trim() {
            "" | "d" | "day" | "days" => FileLifetime::in_days(number)?,
            "y" | "year" | "years" => FileLifetime::in_years(number)?,
            _ => return Err(unrecognized()),
        };
        Ok(lifetime.into())
    }
}
