use chrono::{DateTime, Utc};
use diesel::deserialize::{self, FromSql, FromSqlRow};
use diesel::serialize::{self, ToSql};
use diesel::sql_types::Text;
use diesel::sqlite::{Sqlite, SqliteValue};
use diesel::{AsExpression, Insertable, Queryable, Selectable};

use crate::database::schema;
use crate::errors::CorruptRecord;
use crate::{
    FileLifetimePolicy, FileSize, GuestLink, GuestLinkConfig, GuestLinkId, GuestLinkLabel,
    GuestLinkUsage, Upload,
};

#[derive(Queryable, Selectable, Insertable)]
#[diesel(table_name = schema::guest_links)]
#[diesel(check_for_backend(Sqlite))]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GuestLinkEntry {
    pub id: String,
    pub label: Option<String>,
    pub created: DateTime<Utc>,
    pub url_expires: Option<DateTime<Utc>>,
    pub file_lifetime: FileLifetimePolicyModel,
    pub max_file_bytes: Option<i64>,
    pub max_file_uploads: Option<i64>,
    pub uploads_consumed: i64,
    pub is_disabled: bool,
}

impl GuestLinkEntry {
    /// Entry for a newly issued link: nothing uploaded, enabled.
    pub fn new(config: &GuestLinkConfig) -> Self {
        Self {
            id: config.id.to_string(),
            label: config.label.as_ref().map(ToString::to_string),
            created: config.created,
            url_expires: config.url_expires,
            file_lifetime: config.file_lifetime.into(),
            max_file_bytes: config.max_file_bytes,
            max_file_uploads: config.max_file_uploads,
            uploads_consumed: 0,
            is_disabled: false,
        }
    }
}

/// Limits are not validated here, so that a bad stored configuration surfaces from
/// [`crate::policy::evaluate`] as [`crate::errors::InvalidConfiguration`].
impl TryFrom<GuestLinkEntry> for GuestLink {
    type Error = CorruptRecord;

    fn try_from(entry: GuestLinkEntry) -> Result<Self, Self::Error> {
        let id = entry
            .id
            .parse::<GuestLinkId>()
            .map_err(|err| CorruptRecord(format!("guest link: {}", err)))?;
        let label = entry
            .label
            .map(GuestLinkLabel::new)
            .transpose()
            .map_err(|err| CorruptRecord(format!("guest link {}: {}", entry.id, err)))?;
        Ok(GuestLink {
            config: GuestLinkConfig {
                id,
                label,
                created: entry.created,
                url_expires: entry.url_expires,
                file_lifetime: entry.file_lifetime.into(),
                max_file_bytes: entry.max_file_bytes,
                max_file_uploads: entry.max_file_uploads,
            },
            usage: GuestLinkUsage {
                uploads_consumed: entry.uploads_consumed,
                is_disabled: entry.is_disabled,
            },
        })
    }
}

#[derive(Queryable, Selectable)]
#[diesel(table_name = schema::uploads)]
#[diesel(check_for_backend(Sqlite))]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UploadEntry {
    pub id: i32,
    pub guest_link_id: Option<String>,
    pub size: i64,
    pub uploaded: DateTime<Utc>,
    pub expires: Option<DateTime<Utc>>,
}

#[derive(Insertable)]
#[diesel(table_name = schema::uploads)]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewUploadEntry {
    pub guest_link_id: Option<String>,
    pub size: i64,
    pub uploaded: DateTime<Utc>,
    pub expires: Option<DateTime<Utc>>,
}

impl TryFrom<UploadEntry> for Upload {
    type Error = CorruptRecord;

    fn try_from(entry: UploadEntry) -> Result<Self, Self::Error> {
        let guest_link_id = entry
            .guest_link_id
            .map(|id| id.parse::<GuestLinkId>())
            .transpose()
            .map_err(|err| CorruptRecord(format!("upload {}: {}", entry.id, err)))?;
        let size = FileSize::from_i64(entry.size)
            .map_err(|err| CorruptRecord(format!("upload {}: {}", entry.id, err)))?;
        Ok(Upload {
            id: entry.id,
            guest_link_id,
            size,
            uploaded: entry.uploaded,
            expires: entry.expires,
        })
    }
}

/// SQLite wrapper for [`FileLifetimePolicy`], providing its serialization through [`serde_json`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromSqlRow, AsExpression)]
#[diesel(sql_type = Text)]
pub struct FileLifetimePolicyModel(pub FileLifetimePolicy);

impl From<FileLifetimePolicy> for FileLifetimePolicyModel {
    fn from(inner: FileLifetimePolicy) -> Self {
        Self(inner)
    }
}

impl From<FileLifetimePolicyModel> for FileLifetimePolicy {
    fn from(value: FileLifetimePolicyModel) -> Self {
        value.0
    }
}

impl FromSql<Text, Sqlite> for FileLifetimePolicyModel {
    fn from_sql(mut bytes: SqliteValue) -> deserialize::Result<Self> {
        Ok(Self(serde_json::from_str(bytes.read_text())?))
    }
}

impl ToSql<Text, Sqlite> for FileLifetimePolicyModel {
    fn to_sql<'b>(&'b self, out: &mut serialize::Output<'b, '_, Sqlite>) -> serialize::Result {
        out.set_value(serde_json::to_string(&self.0)?);
        Ok(serialize::IsNull::No)
    }
}

impl PartialEq<FileLifetimePolicy> for FileLifetimePolicyModel {
    fn eq(&self, other: &FileLifetimePolicy) -> bool {
        self.0.eq(other)
    }
}
