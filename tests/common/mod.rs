#![allow(dead_code)]

use actix_web::web;
use chrono::{DateTime, Duration, TimeZone, Utc};
use newsroom_backend::helper::editor_helpers;
use newsroom_backend::models::{Article, ArticleDraft, ArticleStatus, Category, Locale};
use newsroom_backend::setup::db_setup::{create_sqlite_schema, setup_articles_db};
use newsroom_backend::DbPool;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use redb::Database;
use std::fs;
use std::ops::Deref;
use std::path::PathBuf;
use uuid::Uuid;

/// Keeps a store open for the length of a test and deletes its file afterwards.
pub struct TempStore<T> {
    value: Option<T>,
    path: PathBuf,
}

impl<T> TempStore<T> {
    fn new(value: T, path: PathBuf) -> Self {
        TempStore { value: Some(value), path }
    }
}

impl<T> Deref for TempStore<T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.value.as_ref().expect("temp store already released")
    }
}

impl<T> Drop for TempStore<T> {
    fn drop(&mut self) {
        drop(self.value.take());
        let _ = fs::remove_file(&self.path);
        let _ = fs::remove_file(self.path.with_extension("db-journal"));
    }
}

fn temp_path(extension: &str) -> PathBuf {
    std::env::temp_dir().join(format!("newsroom-it-{}.{}", Uuid::new_v4(), extension))
}

fn open_articles_db(path: &PathBuf) -> Database {
    let db = Database::create(path).unwrap();
    setup_articles_db(&db).unwrap();
    db
}

fn open_users_pool(path: &PathBuf) -> DbPool {
    let pool = Pool::builder().max_size(2).build(SqliteConnectionManager::file(path)).unwrap();
    create_sqlite_schema(&pool.get().unwrap()).unwrap();
    pool
}

pub fn temp_articles_db() -> TempStore<Database> {
    let path = temp_path("redb");
    TempStore::new(open_articles_db(&path), path)
}

/// Articles store wrapped for `App::app_data`.
pub fn shared_articles_db() -> TempStore<web::Data<Database>> {
    let path = temp_path("redb");
    TempStore::new(web::Data::new(open_articles_db(&path)), path)
}

/// Users pool wrapped for `App::app_data`.
pub fn shared_users_pool() -> TempStore<web::Data<DbPool>> {
    let path = temp_path("db");
    TempStore::new(web::Data::new(open_users_pool(&path)), path)
}

pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap()
}

pub fn draft(locale: Locale, title: &str, category: Category, raw: &str) -> ArticleDraft {
    ArticleDraft {
        locale: Some(locale),
        title: title.to_string(),
        raw_content: raw.to_string(),
        category: Some(category),
        ..ArticleDraft::default()
    }
}

/// Creates and publishes an article `minutes` after `base_time()`.
pub fn publish(db: &Database, draft: ArticleDraft, minutes: i64) -> Article {
    let at = base_time() + Duration::minutes(minutes);
    let article = editor_helpers::create_article(db, draft, at).unwrap();
    editor_helpers::change_status(db, &article.id, ArticleStatus::Published, at).unwrap()
}
