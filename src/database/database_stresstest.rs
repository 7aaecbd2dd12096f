//! Stress-testing upload counting on SQLite guest link database.
//!
//! This test is pretty heavy, so it is hidden behind `stresstest` feature.
//! It is not going to be run by default.

use crate::errors::Error;
use crate::{Client, FileSize, GuestLinkConfig, RequestedExpiration, UploadOutcome, Utc};
use tracing_test::traced_test;

#[tokio::test]
#[traced_test]
async fn test_upload_counting_stress_testing() {
    use std::sync::Arc;
    use tokio::sync::RwLock;
    use tokio::task::JoinSet;

    // This test will hammer a few guest links with uploads
    // from multiple clients at the same time.
    // The goal is to make sure no link ever accepts more uploads than its limit.

    // num of workers
    const N: usize = 24;

    // num of uploads each worker attempts
    const COUNT: usize = 200;

    // upload limit of every guest link
    const MAX_UPLOADS: i64 = 100;

    // num of guest links
    const LINKS: usize = 4;

    let tmp = tempfile::tempdir().unwrap();
    let db_path = tmp.path().join("guestlink.sqlite");
    let db_path = db_path.to_str().unwrap().to_string();

    let now = Utc::now();
    let mut ids = Vec::new();
    let mut client = Client::init(&db_path).await.unwrap();
    for _ in 0..LINKS {
        let config = GuestLinkConfig::builder()
            .created(now)
            .max_file_uploads(MAX_UPLOADS)
            .build()
            .unwrap();
        ids.push(client.create_guest_link(config).await.unwrap().id().clone());
    }
    let ids = Arc::new(ids);

    // accepted uploads per guest link, shared across all workers
    let accepted = Arc::new(RwLock::new(vec![0i64; LINKS]));

    let contended = Arc::new(RwLock::new(0u64));

    // Synchronously initialize clients
    // Asynchronous initialization often fails with "database is locked"
    let mut tasks = JoinSet::new();
    for i in 0..N {
        let mut builder = Client::builder(&db_path);
        builder.conflict_retries(3);
        let client = builder
            .build()
            .await
            .unwrap_or_else(|err| panic!("init client {}: {}", i, err));
        tasks.spawn(inner(
            client,
            ids.clone(),
            accepted.clone(),
            contended.clone(),
        ));
    }

    // this function will spam uploads to random guest links
    async fn inner(
        mut client: Client,
        ids: Arc<Vec<crate::GuestLinkId>>,
        accepted: Arc<RwLock<Vec<i64>>>,
        contended: Arc<RwLock<u64>>,
    ) {
        use rand::Rng;

        for _ in 0..COUNT {
            let link = rand::rng().random_range(0..ids.len());
            let size = FileSize::from_bytes(rand::rng().random_range(1..4096));
            let result = client
                .record_upload(&ids[link], size, RequestedExpiration::Default, Utc::now())
                .await;
            match result {
                Ok(UploadOutcome::Accepted { .. }) => accepted.write().await[link] += 1,
                Ok(UploadOutcome::Rejected(_)) => {}
                Err(Error::Contended { attempts }) => {
                    assert_eq!(attempts, 4, "three retries after the first attempt");
                    *contended.write().await += 1;
                }
                Err(err) => panic!("unexpected error: {}", err),
            }
        }
    }

    while let Some(res) = tasks.join_next().await {
        res.unwrap();
    }

    tracing::info!("contended uploads: {}", contended.read().await);
    let accepted = accepted.read().await;
    for (i, id) in ids.iter().enumerate() {
        let link = client.load_guest_link(id).await.unwrap();
        assert_eq!(link.usage.uploads_consumed, accepted[i]);
        assert!(link.usage.uploads_consumed <= MAX_UPLOADS);
        let uploads = client.uploads_for_guest_link(id).await.unwrap();
        assert_eq!(uploads.len() as i64, accepted[i]);
    }
    // 24 * 200 attempts against 4 * 100 slots
    assert_eq!(accepted.iter().sum::<i64>(), LINKS as i64 * MAX_UPLOADS);
}
