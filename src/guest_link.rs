use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use derive_builder::Builder;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::errors::InvalidConfiguration;
use crate::{FileLifetimePolicy, FileSize};

// Visually similar characters (I, l, 1) and (0, O) are left out.
const ID_CHARACTERS: &[u8] = b"abcdefghijkmnopqrstuvwxyzABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Malformed guest link identifier.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum GuestLinkIdError {
    #[error("guest link ID ({id}) has invalid length: got {len}, want {want}")]
    InvalidLength { id: String, len: usize, want: usize },

    #[error("guest link ID ({id}) contains invalid character: {character}")]
    InvalidCharacter { id: String, character: char },
}

/// Opaque guest link identifier, also used as the public part of the link URL.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct GuestLinkId(String);

impl GuestLinkId {
    pub const LEN: usize = 16;

    /// Generate new random identifier.
    pub fn generate() -> Self {
        let mut rng = rand::rng();
        let id = (0..Self::LEN)
            .map(|_| ID_CHARACTERS[rng.random_range(0..ID_CHARACTERS.len())] as char)
            .collect();
        Self(id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for GuestLinkId {
    type Err = GuestLinkIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != Self::LEN {
            return Err(GuestLinkIdError::InvalidLength {
                id: s.to_string(),
                len: s.len(),
                want: Self::LEN,
            });
        }
        let invalid = s
            .chars()
            .find(|c| !c.is_ascii() || !ID_CHARACTERS.contains(&(*c as u8)));
        if let Some(character) = invalid {
            return Err(GuestLinkIdError::InvalidCharacter {
                id: s.to_string(),
                character,
            });
        }
        Ok(Self(s.to_string()))
    }
}

impl TryFrom<String> for GuestLinkId {
    type Error = GuestLinkIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<GuestLinkId> for String {
    fn from(value: GuestLinkId) -> Self {
        value.0
    }
}

impl fmt::Display for GuestLinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Label is longer than [`GuestLinkLabel::MAX_LEN`].
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("label too long - limit {} characters", GuestLinkLabel::MAX_LEN)]
pub struct LabelTooLong;

/// Display text of a guest link.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct GuestLinkLabel(String);

impl GuestLinkLabel {
    /// Arbitrary limit to keep labels readable.
    pub const MAX_LEN: usize = 200;

    pub fn new(label: impl Into<String>) -> Result<Self, LabelTooLong> {
        let label = label.into();
        if label.chars().count() > Self::MAX_LEN {
            return Err(LabelTooLong);
        }
        Ok(Self(label))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for GuestLinkLabel {
    type Error = LabelTooLong;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<GuestLinkLabel> for String {
    fn from(value: GuestLinkLabel) -> Self {
        value.0
    }
}

impl fmt::Display for GuestLinkLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Guest link limits, fixed when the link is issued.
///
/// Use [`GuestLinkConfig::builder`] to create. The builder checks creation rules:
///
/// - `max_file_bytes`, if set, is at least [`GuestLinkConfig::MIN_FILE_BYTES`]
/// - `max_file_uploads`, if set, is positive
/// - `url_expires`, if set, is after `created`
///
/// Limits are kept as signed integers, the way they are stored. Configurations read back from
/// storage are re-checked by [`crate::policy::evaluate`].
#[derive(Builder, Clone, Debug, PartialEq, Eq)]
#[builder(build_fn(validate = "Self::validate", error = "InvalidConfiguration"))]
pub struct GuestLinkConfig {
    /// Link identifier. Random by default.
    #[builder(default = "GuestLinkId::generate()")]
    pub id: GuestLinkId,

    #[builder(setter(strip_option), default)]
    pub label: Option<GuestLinkLabel>,

    /// Creation timestamp. Current UTC by default.
    #[builder(default = "Utc::now()")]
    pub created: DateTime<Utc>,

    /// When the link itself stops accepting uploads. `None` means never.
    #[builder(setter(strip_option), default)]
    pub url_expires: Option<DateTime<Utc>>,

    /// Lifetime rule for files uploaded through the link.
    #[builder(setter(into), default)]
    pub file_lifetime: FileLifetimePolicy,

    /// Per-file size ceiling in bytes. `None` means unlimited.
    #[builder(setter(strip_option), default)]
    pub max_file_bytes: Option<i64>,

    /// Total number of uploads accepted over the link lifetime. `None` means unlimited.
    #[builder(setter(strip_option), default)]
    pub max_file_uploads: Option<i64>,
}

impl GuestLinkConfig {
    /// Smallest per-file size ceiling accepted when creating a link.
    pub const MIN_FILE_BYTES: i64 = FileSize::MIB as i64;

    pub fn builder() -> GuestLinkConfigBuilder {
        GuestLinkConfigBuilder::default()
    }

    /// Check the invariants that must hold for any stored configuration.
    pub fn check(&self) -> Result<(), InvalidConfiguration> {
        if self.max_file_bytes.is_some_and(|bytes| bytes < 0) {
            return Err(InvalidConfiguration(
                "guest upload size limit must not be negative".to_string(),
            ));
        }
        if self.max_file_uploads.is_some_and(|count| count < 0) {
            return Err(InvalidConfiguration(
                "guest upload count limit must not be negative".to_string(),
            ));
        }
        Ok(())
    }

    /// Size ceiling as [`FileSize`]. `None` when unlimited or invalid.
    pub fn max_file_size(&self) -> Option<FileSize> {
        self.max_file_bytes
            .and_then(|bytes| FileSize::from_i64(bytes).ok())
    }
}

impl GuestLinkConfigBuilder {
    fn validate(&self) -> Result<(), InvalidConfiguration> {
        if let Some(Some(bytes)) = self.max_file_bytes {
            if bytes < GuestLinkConfig::MIN_FILE_BYTES {
                return Err(InvalidConfiguration(format!(
                    "guest upload size limit must be at least {} bytes",
                    GuestLinkConfig::MIN_FILE_BYTES
                )));
            }
        }
        if let Some(Some(count)) = self.max_file_uploads {
            if count <= 0 {
                return Err(InvalidConfiguration(
                    "guest upload count limit must be a positive number".to_string(),
                ));
            }
        }
        if let Some(Some(expires)) = self.url_expires {
            let created = self.created.unwrap_or_else(Utc::now);
            if expires <= created {
                return Err(InvalidConfiguration(
                    "guest link expiration must be after its creation".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// Usage counters of a guest link, owned by storage.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GuestLinkUsage {
    /// Successful uploads recorded against the link. Never decremented.
    pub uploads_consumed: i64,

    /// Operator switch blocking uploads regardless of quota and expiration.
    pub is_disabled: bool,
}

/// Stored guest link: its configuration with current usage.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GuestLink {
    pub config: GuestLinkConfig,
    pub usage: GuestLinkUsage,
}

impl GuestLink {
    pub fn id(&self) -> &GuestLinkId {
        &self.config.id
    }
}
