//! Guest link database.
//!
//! An SQLite database built with migrations from `src/database/migrations`.

use diesel::{ConnectionError, ConnectionResult, SqliteConnection};
use diesel_async::async_connection_wrapper::AsyncConnectionWrapper;
use diesel_async::pooled_connection::deadpool;
use diesel_async::pooled_connection::{AsyncDieselConnectionManager, ManagerConfig};
use diesel_async::sync_connection_wrapper::SyncConnectionWrapper;
use diesel_async::{AsyncConnection, SimpleAsyncConnection};
use diesel_migrations::{EmbeddedMigrations, MigrationHarness};
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use std::time::Duration;
use tracing::trace;

#[doc(no_inline)]
pub use diesel_async::pooled_connection::deadpool::BuildError;

use crate::errors::DatabaseError;

pub mod api;
pub mod models;
pub mod schema;

#[cfg(feature = "stresstest")]
#[cfg(test)]
mod database_stresstest;

/// Inner SQLite connection type.
pub type Connection = SyncConnectionWrapper<SqliteConnection>;

/// Result of database operations.
pub type DatabaseResult<T> = Result<T, DatabaseError>;

const MIGRATIONS: EmbeddedMigrations =
    diesel_migrations::embed_migrations!("src/database/migrations");

const BUSY_TIMEOUT: Duration = Duration::from_secs(10);

/// Establish connection with SQLite database and configure it with:
/// - `PRAGMA journal_mode = WAL`
/// - `PRAGMA synchronous = NORMAL`
/// - `PRAGMA busy_timeout = 10_000`
fn establish_connection_inner(database_url: &str) -> BoxFuture<ConnectionResult<Connection>> {
    let fut = async move {
        trace!("establishing connection with {}", database_url);
        let mut connection = Connection::establish(database_url).await?;
        let query = format!(
            "PRAGMA journal_mode = WAL; PRAGMA synchronous = NORMAL; PRAGMA busy_timeout = {};",
            BUSY_TIMEOUT.as_millis()
        );
        trace!("executing: {}", &query);
        connection
            .batch_execute(&query)
            .await
            .map_err(ConnectionError::CouldntSetupConfiguration)?;
        Ok(connection)
    };
    fut.boxed()
}

/// Establish connection to SQLite database with database_url.
///
/// Attempts to establish connection with existing database.
/// If database does not exists, it will be created.
pub async fn establish_connection(database_url: &str) -> DatabaseResult<Connection> {
    Ok(establish_connection_inner(database_url).await?)
}

/// Run pending migrations on SQLite database specified with `database_url`.
pub async fn run_migrations(database_url: &str) -> DatabaseResult<()> {
    let connection = establish_connection_inner(database_url).await?;
    let mut async_wrapper: AsyncConnectionWrapper<Connection> =
        AsyncConnectionWrapper::from(connection);

    trace!("running pending migrations");
    tokio::task::spawn_blocking(move || {
        let applied = async_wrapper
            .run_pending_migrations(MIGRATIONS)
            .map_err(|e| DatabaseError::MigrationError(e.to_string()))?;
        if applied.is_empty() {
            trace!("no migrations applied");
        } else {
            trace!("migrations applied:");
            for migration in &applied {
                trace!(" - {}", migration);
            }
        }
        Ok::<(), DatabaseError>(())
    })
    .await
    .map_err(|e| DatabaseError::MigrationError(e.to_string()))?
}

/// Pool of connections to guest link database.
///
/// Use [`build_pool`] or [`build_pool_with_size`] to create.
pub type Pool = deadpool::Pool<Connection>;

/// Build database connection pool.
/// Max size of the pool defaults to `cpu_count * 4`.
///
/// Backed by [`diesel_async::pooled_connection::deadpool`].
pub fn build_pool(database_url: &str) -> Result<Pool, BuildError> {
    let mut manager_config = ManagerConfig::default();
    manager_config.custom_setup = Box::new(establish_connection_inner);
    let manager =
        AsyncDieselConnectionManager::<Connection>::new_with_config(database_url, manager_config);
    Pool::builder(manager).build()
}

/// Build database connection pool of certain max size.
///
/// Backed by [`diesel_async::pooled_connection::deadpool`].
pub fn build_pool_with_size(database_url: &str, max_size: usize) -> Result<Pool, BuildError> {
    let mut manager_config = ManagerConfig::default();
    manager_config.custom_setup = Box::new(establish_connection_inner);
    let manager =
        AsyncDieselConnectionManager::<Connection>::new_with_config(database_url, manager_config);
    Pool::builder(manager).max_size(max_size).build()
}
