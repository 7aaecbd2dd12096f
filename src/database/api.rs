//! Convenient API to interact with guest link database.
//!
//! Basically just fancy wrappers around transactions on [`Connection`].

use diesel::{
    BoolExpressionMethods, ExpressionMethods, NullableExpressionMethods, OptionalExtension,
    QueryDsl, SelectableHelper,
};
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::{AsyncConnection, RunQueryDsl};
use tracing::trace;

use crate::database::models::{GuestLinkEntry, NewUploadEntry, UploadEntry};
use crate::database::schema::{guest_links, uploads};
use crate::errors::{DatabaseError, DieselError};

use super::{Connection, DatabaseResult};

/// Result of [`commit_upload_count`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CommitOutcome {
    /// Counter was incremented. Contains the updated guest link and the inserted upload, if any.
    Committed {
        entry: GuestLinkEntry,
        upload: Option<UploadEntry>,
    },

    /// Counter did not hold the expected value, the link is disabled or it has no upload slot
    /// left. Nothing was written.
    Conflict,
}

/// Insert a new guest link.
pub async fn insert_guest_link(
    connection: &mut Connection,
    entry: GuestLinkEntry,
) -> DatabaseResult<GuestLinkEntry> {
    connection
        .immediate_transaction(|conn| {
            async {
                trace!("INSERT {:?}", entry);
                let inserted = diesel::insert_into(guest_links::table)
                    .values(&entry)
                    .get_result::<GuestLinkEntry>(conn)
                    .await?;
                Ok(inserted)
            }
            .scope_boxed()
        })
        .await
}

/// Get guest link by its identifier.
pub async fn get_guest_link(
    connection: &mut Connection,
    id: &str,
) -> DatabaseResult<Option<GuestLinkEntry>> {
    connection
        .transaction(|conn| {
            async {
                trace!("SELECT id={}", id);
                guest_links::table
                    .find(id)
                    .select(GuestLinkEntry::as_select())
                    .first(conn)
                    .await
                    .optional()
            }
            .scope_boxed()
        })
        .await
        .map_err(Into::into)
}

/// Get all guest links, newest first.
pub async fn get_all_guest_links(
    connection: &mut Connection,
) -> DatabaseResult<Vec<GuestLinkEntry>> {
    connection
        .transaction(|conn| {
            async {
                trace!("SELECT *");
                guest_links::table
                    .order(guest_links::created.desc())
                    .select(GuestLinkEntry::as_select())
                    .get_results(conn)
                    .await
            }
            .scope_boxed()
        })
        .await
        .map_err(Into::into)
}

/// Set the operator switch of a guest link. Returns updated entry.
pub async fn set_disabled(
    connection: &mut Connection,
    id: &str,
    disabled: bool,
) -> DatabaseResult<GuestLinkEntry> {
    connection
        .immediate_transaction(|conn| {
            async {
                let row = guest_links::table.find(id);
                trace!("UPDATE id={}, is_disabled = {}", id, disabled);
                diesel::update(row)
                    .set(guest_links::is_disabled.eq(disabled))
                    .get_result(conn)
                    .await
            }
            .scope_boxed()
        })
        .await
        .map_err(Into::into)
}

/// Delete guest link and detach uploads made through it.
///
/// Uploads keep their own expiration. Returns `false` if there was no such guest link.
pub async fn delete_guest_link(connection: &mut Connection, id: &str) -> DatabaseResult<bool> {
    connection
        .immediate_transaction(|conn| {
            async {
                trace!("DELETE id={}", id);
                let deleted = diesel::delete(guest_links::table.find(id))
                    .execute(conn)
                    .await?;
                trace!("UPDATE guest_link_id={}, guest_link_id = NULL", id);
                diesel::update(uploads::table.filter(uploads::guest_link_id.eq(id)))
                    .set(uploads::guest_link_id.eq(None::<String>))
                    .execute(conn)
                    .await?;
                Ok::<bool, DatabaseError>(deleted > 0)
            }
            .scope_boxed()
        })
        .await
}

/// Add one upload to the counter (`uploads_consumed++`) if it still equals `expected_prior`.
///
/// Disabled links and links without a free upload slot are never counted against, whatever
/// `expected_prior` says.
///
/// When `new_upload` is given, it is inserted in the same transaction, so the counter and
/// the uploads table never disagree.
///
/// Returns [`DieselError::NotFound`] if there is no such guest link.
pub async fn commit_upload_count(
    connection: &mut Connection,
    id: &str,
    expected_prior: i64,
    new_upload: Option<NewUploadEntry>,
) -> DatabaseResult<CommitOutcome> {
    connection
        .immediate_transaction(|conn| {
            async {
                use crate::database::schema::guest_links::dsl::{
                    is_disabled, max_file_uploads, uploads_consumed,
                };

                let row = guest_links::table
                    .find(id)
                    .filter(uploads_consumed.eq(expected_prior))
                    .filter(is_disabled.eq(false))
                    .filter(
                        max_file_uploads
                            .is_null()
                            .or(max_file_uploads.gt(uploads_consumed.nullable())),
                    );
                let updated: Option<GuestLinkEntry> = diesel::update(row)
                    .set(uploads_consumed.eq(uploads_consumed + 1))
                    .get_result(conn)
                    .await
                    .optional()?;

                let Some(entry) = updated else {
                    let exists = guest_links::table
                        .find(id)
                        .select(guest_links::id)
                        .first::<String>(conn)
                        .await
                        .optional()?
                        .is_some();
                    if !exists {
                        return Err(DatabaseError::from(DieselError::NotFound));
                    }
                    trace!(
                        "UPDATE id={} skipped, expected count {} on an open link",
                        id, expected_prior
                    );
                    return Ok(CommitOutcome::Conflict);
                };
                trace!("UPDATE id={}, uploads consumed = {}", id, entry.uploads_consumed);

                let upload = match new_upload {
                    Some(new_upload) => {
                        trace!("INSERT {:?}", new_upload);
                        let inserted = diesel::insert_into(uploads::table)
                            .values(&new_upload)
                            .get_result::<UploadEntry>(conn)
                            .await?;
                        Some(inserted)
                    }
                    None => None,
                };
                Ok(CommitOutcome::Committed { entry, upload })
            }
            .scope_boxed()
        })
        .await
}

/// Get upload by primary key.
pub async fn get_upload(connection: &mut Connection, pk: i32) -> DatabaseResult<Option<UploadEntry>> {
    connection
        .transaction(|conn| {
            async {
                trace!("SELECT pk={}", pk);
                uploads::table
                    .find(pk)
                    .select(UploadEntry::as_select())
                    .first(conn)
                    .await
                    .optional()
            }
            .scope_boxed()
        })
        .await
        .map_err(Into::into)
}

/// Get all uploads made through a guest link, oldest first.
pub async fn uploads_for_guest_link(
    connection: &mut Connection,
    id: &str,
) -> DatabaseResult<Vec<UploadEntry>> {
    connection
        .transaction(|conn| {
            async {
                trace!("SELECT guest_link_id={}", id);
                uploads::table
                    .filter(uploads::guest_link_id.eq(id))
                    .order(uploads::id.asc())
                    .select(UploadEntry::as_select())
                    .get_results(conn)
                    .await
            }
            .scope_boxed()
        })
        .await
        .map_err(Into::into)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::fixtures::{
        database, database_with_guest_link, GuestLinkDatabaseFixture,
    };
    use chrono::{TimeDelta, Utc};
    use rstest::rstest;
    use tracing_test::traced_test;

    fn new_upload(id: &str) -> NewUploadEntry {
        let now = Utc::now();
        NewUploadEntry {
            guest_link_id: Some(id.to_string()),
            size: 1024,
            uploaded: now,
            expires: Some(now + TimeDelta::days(7)),
        }
    }

    #[rstest]
    #[tokio::test]
    #[traced_test]
    #[awt]
    async fn test_insert_guest_link(#[future] mut database: GuestLinkDatabaseFixture) {
        let entry = GuestLinkDatabaseFixture::default_guest_link();
        let inserted = insert_guest_link(&mut database.conn, entry.clone())
            .await
            .expect("insert guest link");
        assert_eq!(inserted, entry);
        assert_eq!(inserted.uploads_consumed, 0);
        assert!(!inserted.is_disabled);
    }

    #[rstest]
    #[tokio::test]
    #[traced_test]
    #[awt]
    async fn test_insert_duplicate_id_fails(
        #[future] database_with_guest_link: (GuestLinkDatabaseFixture, GuestLinkEntry),
    ) {
        let (mut db_fixture, entry) = database_with_guest_link;
        let result = insert_guest_link(&mut db_fixture.conn, entry).await;
        assert!(
            result
                .as_ref()
                .is_err_and(DatabaseError::is_unique_violation),
            "guest link ID must be unique"
        );
    }

    #[rstest]
    #[tokio::test]
    #[traced_test]
    #[awt]
    async fn test_get_guest_link(
        #[future] database_with_guest_link: (GuestLinkDatabaseFixture, GuestLinkEntry),
    ) {
        let (mut db_fixture, inserted) = database_with_guest_link;
        let entry = get_guest_link(&mut db_fixture.conn, &inserted.id)
            .await
            .expect("get guest link")
            .expect("get some guest link");
        assert_eq!(entry, inserted);

        let missing = get_guest_link(&mut db_fixture.conn, "zzzzzzzzzzzzzzzz")
            .await
            .expect("get missing guest link");
        assert_eq!(missing, None);
    }

    #[rstest]
    #[tokio::test]
    #[traced_test]
    #[awt]
    async fn test_get_all_guest_links(
        #[future] database_with_guest_link: (GuestLinkDatabaseFixture, GuestLinkEntry),
    ) {
        let (mut db_fixture, inserted) = database_with_guest_link;
        let all = get_all_guest_links(&mut db_fixture.conn)
            .await
            .expect("get all guest links");
        assert_eq!(all, vec![inserted]);
    }

    #[rstest]
    #[tokio::test]
    #[traced_test]
    #[awt]
    async fn test_set_disabled(
        #[future] database_with_guest_link: (GuestLinkDatabaseFixture, GuestLinkEntry),
    ) {
        let (mut db_fixture, inserted) = database_with_guest_link;
        let entry = set_disabled(&mut db_fixture.conn, &inserted.id, true)
            .await
            .expect("disable guest link");
        assert!(entry.is_disabled);
        let entry = set_disabled(&mut db_fixture.conn, &inserted.id, false)
            .await
            .expect("enable guest link");
        assert!(!entry.is_disabled);
    }

    #[rstest]
    #[tokio::test]
    #[traced_test]
    #[awt]
    async fn test_set_disabled_missing_link(#[future] mut database: GuestLinkDatabaseFixture) {
        let result = set_disabled(&mut database.conn, "zzzzzzzzzzzzzzzz", true).await;
        assert!(result.is_err_and(|err| err.is_not_found()));
    }

    #[rstest]
    #[tokio::test]
    #[traced_test]
    #[awt]
    async fn test_commit_upload_count(
        #[future] database_with_guest_link: (GuestLinkDatabaseFixture, GuestLinkEntry),
    ) {
        let (mut db_fixture, inserted) = database_with_guest_link;
        let outcome = commit_upload_count(
            &mut db_fixture.conn,
            &inserted.id,
            0,
            Some(new_upload(&inserted.id)),
        )
        .await
        .expect("commit upload count");
        let CommitOutcome::Committed { entry, upload } = outcome else {
            panic!("expected commit, got {:?}", outcome);
        };
        assert_eq!(entry.uploads_consumed, 1);
        let upload = upload.expect("upload inserted");
        assert_eq!(upload.guest_link_id.as_deref(), Some(inserted.id.as_str()));

        let uploads = uploads_for_guest_link(&mut db_fixture.conn, &inserted.id)
            .await
            .unwrap();
        assert_eq!(uploads, vec![upload]);
    }

    #[rstest]
    #[tokio::test]
    #[traced_test]
    #[awt]
    async fn test_commit_upload_count_conflict(
        #[future] database_with_guest_link: (GuestLinkDatabaseFixture, GuestLinkEntry),
    ) {
        let (mut db_fixture, inserted) = database_with_guest_link;
        commit_upload_count(&mut db_fixture.conn, &inserted.id, 0, None)
            .await
            .unwrap();

        // Someone else already moved the counter from 0 to 1.
        let outcome = commit_upload_count(
            &mut db_fixture.conn,
            &inserted.id,
            0,
            Some(new_upload(&inserted.id)),
        )
        .await
        .expect("commit upload count");
        assert_eq!(outcome, CommitOutcome::Conflict);

        let entry = get_guest_link(&mut db_fixture.conn, &inserted.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(entry.uploads_consumed, 1);
        let uploads = uploads_for_guest_link(&mut db_fixture.conn, &inserted.id)
            .await
            .unwrap();
        assert!(uploads.is_empty(), "conflict must not insert an upload");
    }

    #[rstest]
    #[tokio::test]
    #[traced_test]
    #[awt]
    async fn test_commit_upload_count_disabled_after_load(
        #[future] database_with_guest_link: (GuestLinkDatabaseFixture, GuestLinkEntry),
    ) {
        let (mut db_fixture, inserted) = database_with_guest_link;
        let loaded = get_guest_link(&mut db_fixture.conn, &inserted.id)
            .await
            .unwrap()
            .unwrap();
        assert!(!loaded.is_disabled);

        // Operator switches the link off before the upload is counted.
        set_disabled(&mut db_fixture.conn, &inserted.id, true)
            .await
            .unwrap();

        let outcome = commit_upload_count(
            &mut db_fixture.conn,
            &inserted.id,
            loaded.uploads_consumed,
            Some(new_upload(&inserted.id)),
        )
        .await
        .expect("commit upload count");
        assert_eq!(outcome, CommitOutcome::Conflict);

        let entry = get_guest_link(&mut db_fixture.conn, &inserted.id)
            .await
            .unwrap()
            .unwrap();
        assert!(entry.is_disabled);
        assert_eq!(entry.uploads_consumed, 0);
        let uploads = uploads_for_guest_link(&mut db_fixture.conn, &inserted.id)
            .await
            .unwrap();
        assert!(uploads.is_empty());
    }

    #[rstest]
    #[tokio::test]
    #[traced_test]
    #[awt]
    async fn test_commit_upload_count_stops_at_limit(
        #[future] database_with_guest_link: (GuestLinkDatabaseFixture, GuestLinkEntry),
    ) {
        let (mut db_fixture, inserted) = database_with_guest_link;
        let max = inserted.max_file_uploads.expect("limited guest link");
        for expected_prior in 0..max {
            let outcome =
                commit_upload_count(&mut db_fixture.conn, &inserted.id, expected_prior, None)
                    .await
                    .unwrap();
            assert!(matches!(outcome, CommitOutcome::Committed { .. }));
        }

        // The expected count is right, but there is no slot left.
        let outcome = commit_upload_count(&mut db_fixture.conn, &inserted.id, max, None)
            .await
            .unwrap();
        assert_eq!(outcome, CommitOutcome::Conflict);
        let entry = get_guest_link(&mut db_fixture.conn, &inserted.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(entry.uploads_consumed, max);
    }

    #[rstest]
    #[tokio::test]
    #[traced_test]
    #[awt]
    async fn test_commit_upload_count_missing_link(
        #[future] mut database: GuestLinkDatabaseFixture,
    ) {
        let result = commit_upload_count(&mut database.conn, "zzzzzzzzzzzzzzzz", 0, None).await;
        assert!(result.is_err_and(|err| err.is_not_found()));
    }

    #[rstest]
    #[tokio::test]
    #[traced_test]
    #[awt]
    async fn test_delete_guest_link_keeps_uploads(
        #[future] database_with_guest_link: (GuestLinkDatabaseFixture, GuestLinkEntry),
    ) {
        let (mut db_fixture, inserted) = database_with_guest_link;
        let CommitOutcome::Committed {
            upload: Some(upload),
            ..
        } = commit_upload_count(
            &mut db_fixture.conn,
            &inserted.id,
            0,
            Some(new_upload(&inserted.id)),
        )
        .await
        .unwrap()
        else {
            panic!("expected committed upload");
        };

        let deleted = delete_guest_link(&mut db_fixture.conn, &inserted.id)
            .await
            .expect("delete guest link");
        assert!(deleted);
        assert_eq!(
            get_guest_link(&mut db_fixture.conn, &inserted.id)
                .await
                .unwrap(),
            None
        );

        let kept = get_upload(&mut db_fixture.conn, upload.id)
            .await
            .unwrap()
            .expect("upload survives guest link deletion");
        assert_eq!(kept.guest_link_id, None);
        assert_eq!(kept.expires, upload.expires);

        let deleted_again = delete_guest_link(&mut db_fixture.conn, &inserted.id)
            .await
            .unwrap();
        assert!(!deleted_again);
    }
}
