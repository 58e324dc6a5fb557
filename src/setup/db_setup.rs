use crate::models::db_operations::articles_db_operations::{
    ARTICLES, ARTICLE_GROUPS, BOOK_REVIEWS, BOOK_REVIEW_GROUPS, CHRONOLOGICAL_INDEX,
};
use redb::{CommitError, Database, StorageError, TableError, TransactionError};
use rusqlite::Connection;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SetupError {
    #[error("Rusqlite error: {0}")]
    Rusqlite(#[from] rusqlite::Error),
    #[error("Redb storage error: {0}")]
    RedbStorage(#[from] StorageError),
    #[error("Redb transaction error: {0}")]
    RedbTransaction(#[from] TransactionError),
    #[error("Redb table error: {0}")]
    RedbTable(#[from] TableError),
    #[error("Redb commit error: {0}")]
    RedbCommit(#[from] CommitError),
}

const SQLITE_TABLES: [(&str, &str); 3] = [
    (
        "users",
        "CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            email TEXT NOT NULL UNIQUE,
            password_hash TEXT NOT NULL,
            role TEXT NOT NULL CHECK(role IN ('admin', 'editor', 'viewer')),
            display_name TEXT NOT NULL,
            is_active INTEGER NOT NULL DEFAULT 1,
            last_login_time TEXT
        )",
    ),
    (
        "comments",
        "CREATE TABLE IF NOT EXISTS comments (
            id TEXT PRIMARY KEY,
            article_id TEXT NOT NULL,
            parent_id TEXT,
            user_id INTEGER,
            author_name TEXT NOT NULL,
            guest_session_id TEXT,
            content TEXT NOT NULL,
            edited INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
    ),
    (
        "article_votes",
        "CREATE TABLE IF NOT EXISTS article_votes (
            article_id TEXT NOT NULL,
            voter_key TEXT NOT NULL,
            value INTEGER NOT NULL CHECK(value IN (1, -1)),
            PRIMARY KEY (article_id, voter_key)
        )",
    ),
];

/// Creates the user, comment and vote tables if they are missing.
pub fn create_sqlite_schema(conn: &Connection) -> Result<(), SetupError> {
    let tx = conn.unchecked_transaction()?;
    for (name, ddl) in SQLITE_TABLES {
        log::debug!("Creating '{}' table", name);
        tx.execute(ddl, [])?;
    }
    tx.execute(
        "CREATE INDEX IF NOT EXISTS idx_comments_article ON comments (article_id, created_at)",
        [],
    )?;
    tx.commit()?;
    Ok(())
}

pub fn setup_users_db(conn: &mut Connection) -> Result<(), SetupError> {
    for (name, _) in SQLITE_TABLES {
        println!("- Creating '{}' table...", name);
    }
    create_sqlite_schema(conn)
}

pub fn setup_articles_db(db: &Database) -> Result<(), SetupError> {
    let write_txn = db.begin_write()?;
    {
        println!("- Creating 'articles' table in Redb...");
        write_txn.open_table(ARTICLES)?;

        println!("- Creating 'article_groups' table in Redb...");
        write_txn.open_table(ARTICLE_GROUPS)?;

        println!("- Creating 'chronological_index' table in Redb...");
        write_txn.open_table(CHRONOLOGICAL_INDEX)?;

        println!("- Creating 'book_reviews' table in Redb...");
        write_txn.open_table(BOOK_REVIEWS)?;

        println!("- Creating 'book_review_groups' table in Redb...");
        write_txn.open_table(BOOK_REVIEW_GROUPS)?;
    }
    write_txn.commit()?;
    Ok(())
}
