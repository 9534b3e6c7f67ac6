mod from_row;
pub mod queries;
mod schema;

pub use schema::init_db;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::crypto::MasterKey;
use crate::events::EventSink;

pub type DbPool = Pool<SqliteConnectionManager>;

/// Application state shared across request handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    /// Master key for field-level encryption at rest
    pub master_key: MasterKey,
    /// Fire-and-forget domain event sink (audit subscriber)
    pub events: EventSink,
}

pub fn create_pool(database_path: &str) -> Result<DbPool, r2d2::Error> {
    // busy_timeout and foreign_keys are per-connection settings, so they
    // belong in the pool's init hook, not only in the schema batch.
    let manager = SqliteConnectionManager::file(database_path).with_init(|conn| {
        conn.execute_batch("PRAGMA busy_timeout = 5000; PRAGMA foreign_keys = ON;")
    });
    Pool::builder().max_size(10).build(manager)
}
