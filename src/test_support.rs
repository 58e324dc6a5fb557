//! Throwaway stores for unit tests. Each one deletes its file when dropped.

use crate::setup::db_setup::{create_sqlite_schema, setup_articles_db};
use crate::DbPool;
use r2d2_sqlite::SqliteConnectionManager;
use redb::Database;
use std::fs;
use std::ops::Deref;
use std::path::PathBuf;
use uuid::Uuid;

pub(crate) struct TempStore<T> {
    value: Option<T>,
    path: PathBuf,
}

impl<T> Deref for TempStore<T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.value.as_ref().expect("temp store already released")
    }
}

impl<T> Drop for TempStore<T> {
    fn drop(&mut self) {
        // Close the store before its file goes away.
        drop(self.value.take());
        let _ = fs::remove_file(&self.path);
        let _ = fs::remove_file(self.path.with_extension("db-journal"));
    }
}

fn temp_path(extension: &str) -> PathBuf {
    std::env::temp_dir().join(format!("newsroom-unit-{}.{}", Uuid::new_v4(), extension))
}

pub(crate) fn temp_articles_db() -> TempStore<Database> {
    let path = temp_path("redb");
    let db = Database::create(&path).unwrap();
    setup_articles_db(&db).unwrap();
    TempStore { value: Some(db), path }
}

pub(crate) fn temp_users_pool() -> TempStore<DbPool> {
    let path = temp_path("db");
    let pool = r2d2::Pool::builder().max_size(2).build(SqliteConnectionManager::file(&path)).unwrap();
    create_sqlite_schema(&pool.get().unwrap()).unwrap();
    TempStore { value: Some(pool), path }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn files_are_removed_on_drop() {
        let db = temp_articles_db();
        let db_path = db.path.clone();
        assert!(db_path.exists());
        drop(db);
        assert!(!db_path.exists());

        let pool = temp_users_pool();
        let pool_path = pool.path.clone();
        assert!(pool.get().is_ok());
        drop(pool);
        assert!(!pool_path.exists());
    }
}
