use crate::helper::filter_helpers;
use crate::models::{Article, BookReview, Engagement, Locale, VoteDelta};
use chrono::{DateTime, Utc};
use redb::{
    CommitError, Database, ReadableTable, StorageError, Table, TableDefinition, TableError,
    TransactionError,
};
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Redb storage error: {0}")]
    RedbStorage(#[from] StorageError),
    #[error("Redb transaction error: {0}")]
    RedbTransaction(#[from] TransactionError),
    #[error("Redb table error: {0}")]
    RedbTable(#[from] TableError),
    #[error("Redb commit error: {0}")]
    RedbCommit(#[from] CommitError),
    #[error("Serde JSON error: {0}")]
    SerdeJson(#[from] serde_json::Error),
    #[error("UUID parse error: {0}")]
    Uuid(#[from] uuid::Error),
    #[error("Item not found in database: {0}")]
    NotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
}

// --- Articles ---
pub const ARTICLES: TableDefinition<&[u8; 16], &str> = TableDefinition::new("articles");
/// (group id, locale) -> article id. Enforces one row per logical article and channel.
pub const ARTICLE_GROUPS: TableDefinition<(&[u8; 16], &str), &[u8; 16]> =
    TableDefinition::new("article_groups");
/// (locale, -display timestamp, article id). Iterating yields newest first.
pub const CHRONOLOGICAL_INDEX: TableDefinition<(&str, i64, &[u8; 16]), ()> =
    TableDefinition::new("chronological_index");

// --- Book reviews ---
pub const BOOK_REVIEWS: TableDefinition<&[u8; 16], &str> = TableDefinition::new("book_reviews");
pub const BOOK_REVIEW_GROUPS: TableDefinition<(&[u8; 16], &str), &[u8; 16]> =
    TableDefinition::new("book_review_groups");

fn id_bytes(id: &str) -> Result<[u8; 16], DbError> {
    Ok(Uuid::parse_str(id)?.into_bytes())
}

fn chrono_key(article: &Article) -> i64 {
    -article.display_date().timestamp()
}

fn read_article_in<T: ReadableTable<&'static [u8; 16], &'static str>>(
    table: &T,
    id: &[u8; 16],
) -> Result<Option<Article>, DbError> {
    match table.get(id)? {
        Some(guard) => Ok(Some(serde_json::from_str(guard.value())?)),
        None => Ok(None),
    }
}

fn write_chrono_entry(
    index: &mut Table<(&str, i64, &[u8; 16]), ()>,
    old: Option<&Article>,
    new: &Article,
    id: &[u8; 16],
) -> Result<(), DbError> {
    if let Some(old) = old {
        index.remove((old.locale.as_str(), chrono_key(old), id))?;
    }
    index.insert((new.locale.as_str(), chrono_key(new), id), ())?;
    Ok(())
}

// ====================================================================
// ======================= ARTICLE OPERATIONS =========================
// ====================================================================

/// Inserts a new article row. Fails with `Conflict` if the group already has a row
/// for this locale.
pub fn create_article(db: &Database, article: &Article) -> Result<(), DbError> {
    let article_id = id_bytes(&article.id)?;
    let group_id = id_bytes(&article.group_id)?;
    let json = serde_json::to_string(article)?;

    let write_txn = db.begin_write()?;
    {
        let mut articles = write_txn.open_table(ARTICLES)?;
        let mut groups = write_txn.open_table(ARTICLE_GROUPS)?;
        let mut chrono_index = write_txn.open_table(CHRONOLOGICAL_INDEX)?;

        if groups.get((&group_id, article.locale.as_str()))?.is_some() {
            return Err(DbError::Conflict(format!(
                "Article group {} already has a '{}' version",
                article.group_id, article.locale
            )));
        }
        if articles.get(&article_id)?.is_some() {
            return Err(DbError::Conflict(format!("Article {} already exists", article.id)));
        }

        articles.insert(&article_id, json.as_str())?;
        groups.insert((&group_id, article.locale.as_str()), &article_id)?;
        write_chrono_entry(&mut chrono_index, None, article, &article_id)?;
    }
    write_txn.commit()?;
    Ok(())
}

pub fn read_article(db: &Database, id: &str) -> Result<Option<Article>, DbError> {
    let article_id = match Uuid::parse_str(id) {
        Ok(uuid) => uuid.into_bytes(),
        Err(_) => return Ok(None),
    };
    let read_txn = db.begin_read()?;
    let articles = read_txn.open_table(ARTICLES)?;
    read_article_in(&articles, &article_id)
}

/// Reads the article inside a write transaction, lets `change` mutate it and stores
/// the result. Concurrent edits resolve as last write wins.
pub fn modify_article<F>(db: &Database, id: &str, change: F) -> Result<Article, DbError>
where
    F: FnOnce(&mut Article) -> Result<(), DbError>,
{
    let article_id = id_bytes(id)?;
    let write_txn = db.begin_write()?;
    let updated = {
        let mut articles = write_txn.open_table(ARTICLES)?;
        let mut chrono_index = write_txn.open_table(CHRONOLOGICAL_INDEX)?;

        let old = read_article_in(&articles, &article_id)?
            .ok_or_else(|| DbError::NotFound(format!("Article {}", id)))?;
        let mut updated = old.clone();
        change(&mut updated)?;
        // Identity fields are fixed at creation.
        updated.id = old.id.clone();
        updated.group_id = old.group_id.clone();
        updated.locale = old.locale;

        let json = serde_json::to_string(&updated)?;
        articles.insert(&article_id, json.as_str())?;
        write_chrono_entry(&mut chrono_index, Some(&old), &updated, &article_id)?;
        updated
    };
    write_txn.commit()?;
    Ok(updated)
}

pub fn delete_article(db: &Database, id: &str) -> Result<bool, DbError> {
    let article_id = id_bytes(id)?;
    let write_txn = db.begin_write()?;
    let existed = {
        let mut articles = write_txn.open_table(ARTICLES)?;
        let mut groups = write_txn.open_table(ARTICLE_GROUPS)?;
        let mut chrono_index = write_txn.open_table(CHRONOLOGICAL_INDEX)?;

        match read_article_in(&articles, &article_id)? {
            Some(old) => {
                let group_id = id_bytes(&old.group_id)?;
                articles.remove(&article_id)?;
                groups.remove((&group_id, old.locale.as_str()))?;
                chrono_index.remove((old.locale.as_str(), chrono_key(&old), &article_id))?;
                true
            }
            None => false,
        }
    };
    write_txn.commit()?;
    Ok(existed)
}

/// All articles of a locale, newest first. With `public_only`, drafts, archived and
/// not-yet-due scheduled articles are left out.
pub fn list_articles(
    db: &Database,
    locale: Locale,
    public_only: bool,
    now: DateTime<Utc>,
) -> Result<Vec<Article>, DbError> {
    let read_txn = db.begin_read()?;
    let chrono_index = read_txn.open_table(CHRONOLOGICAL_INDEX)?;
    let articles = read_txn.open_table(ARTICLES)?;

    let start = (locale.as_str(), i64::MIN, &[0u8; 16]);
    let end = (locale.as_str(), i64::MAX, &[255u8; 16]);

    let mut found = Vec::new();
    for item in chrono_index.range(start..=end)? {
        let (key, _) = item?;
        let article_id = *key.value().2;
        if let Some(article) = read_article_in(&articles, &article_id)? {
            if !public_only || article.is_public(now) {
                found.push(article);
            }
        }
    }
    Ok(found)
}

/// Server-side text search over the public articles of a locale.
pub fn search_articles(
    db: &Database,
    locale: Locale,
    query: &str,
    now: DateTime<Utc>,
) -> Result<Vec<Article>, DbError> {
    Ok(list_articles(db, locale, true, now)?
        .into_iter()
        .filter(|article| filter_helpers::matches_query(article, query))
        .collect())
}

/// The other-locale (or same-locale) row of a logical article, if any.
pub fn find_group_article(
    db: &Database,
    group_id: &str,
    locale: Locale,
) -> Result<Option<Article>, DbError> {
    let group_id = match Uuid::parse_str(group_id) {
        Ok(uuid) => uuid.into_bytes(),
        Err(_) => return Ok(None),
    };
    let read_txn = db.begin_read()?;
    let groups = read_txn.open_table(ARTICLE_GROUPS)?;
    let articles = read_txn.open_table(ARTICLES)?;
    let article_id = match groups.get((&group_id, locale.as_str()))? {
        Some(guard) => *guard.value(),
        None => return Ok(None),
    };
    read_article_in(&articles, &article_id)
}

pub fn increment_views(db: &Database, id: &str) -> Result<Engagement, DbError> {
    modify_article(db, id, |article| {
        article.engagement.views += 1;
        Ok(())
    })
    .map(|article| article.engagement)
}

pub fn apply_vote_delta(db: &Database, id: &str, delta: VoteDelta) -> Result<Engagement, DbError> {
    modify_article(db, id, |article| {
        article.engagement.likes = shift(article.engagement.likes, delta.likes);
        article.engagement.dislikes = shift(article.engagement.dislikes, delta.dislikes);
        Ok(())
    })
    .map(|article| article.engagement)
}

fn shift(counter: u64, delta: i64) -> u64 {
    if delta >= 0 {
        counter.saturating_add(delta as u64)
    } else {
        counter.saturating_sub(delta.unsigned_abs())
    }
}

// ====================================================================
// ===================== BOOK REVIEW OPERATIONS =======================
// ====================================================================

pub fn create_book_review(db: &Database, review: &BookReview) -> Result<(), DbError> {
    let review_id = id_bytes(&review.id)?;
    let group_id = id_bytes(&review.group_id)?;
    let json = serde_json::to_string(review)?;

    let write_txn = db.begin_write()?;
    {
        let mut reviews = write_txn.open_table(BOOK_REVIEWS)?;
        let mut groups = write_txn.open_table(BOOK_REVIEW_GROUPS)?;
        if groups.get((&group_id, review.locale.as_str()))?.is_some() {
            return Err(DbError::Conflict(format!(
                "Book review group {} already has a '{}' version",
                review.group_id, review.locale
            )));
        }
        reviews.insert(&review_id, json.as_str())?;
        groups.insert((&group_id, review.locale.as_str()), &review_id)?;
    }
    write_txn.commit()?;
    Ok(())
}

pub fn read_book_review(db: &Database, id: &str) -> Result<Option<BookReview>, DbError> {
    let review_id = match Uuid::parse_str(id) {
        Ok(uuid) => uuid.into_bytes(),
        Err(_) => return Ok(None),
    };
    let read_txn = db.begin_read()?;
    let reviews = read_txn.open_table(BOOK_REVIEWS)?;
    let review = match reviews.get(&review_id)? {
        Some(guard) => Some(serde_json::from_str(guard.value())?),
        None => None,
    };
    Ok(review)
}

/// Replaces the stored review. Id, group and locale of the stored row are kept.
pub fn update_book_review(db: &Database, review: &BookReview) -> Result<BookReview, DbError> {
    let review_id = id_bytes(&review.id)?;
    let write_txn = db.begin_write()?;
    let stored = {
        let mut reviews = write_txn.open_table(BOOK_REVIEWS)?;
        let old: BookReview = match reviews.get(&review_id)? {
            Some(guard) => serde_json::from_str(guard.value())?,
            None => return Err(DbError::NotFound(format!("Book review {}", review.id))),
        };
        let mut stored = review.clone();
        stored.group_id = old.group_id;
        stored.locale = old.locale;
        stored.created_at = old.created_at;
        let json = serde_json::to_string(&stored)?;
        reviews.insert(&review_id, json.as_str())?;
        stored
    };
    write_txn.commit()?;
    Ok(stored)
}

pub fn delete_book_review(db: &Database, id: &str) -> Result<bool, DbError> {
    let review_id = id_bytes(id)?;
    let write_txn = db.begin_write()?;
    let existed = {
        let mut reviews = write_txn.open_table(BOOK_REVIEWS)?;
        let mut groups = write_txn.open_table(BOOK_REVIEW_GROUPS)?;
        let old: Option<BookReview> = match reviews.get(&review_id)? {
            Some(guard) => Some(serde_json::from_str(guard.value())?),
            None => None,
        };
        match old {
            Some(old) => {
                let group_id = id_bytes(&old.group_id)?;
                reviews.remove(&review_id)?;
                groups.remove((&group_id, old.locale.as_str()))?;
                true
            }
            None => false,
        }
    };
    write_txn.commit()?;
    Ok(existed)
}

/// Reviews of a locale, newest first.
pub fn list_book_reviews(
    db: &Database,
    locale: Locale,
    public_only: bool,
) -> Result<Vec<BookReview>, DbError> {
    let read_txn = db.begin_read()?;
    let reviews = read_txn.open_table(BOOK_REVIEWS)?;
    let mut found: Vec<BookReview> = reviews
        .iter()?
        .filter_map(|res| res.ok())
        .filter_map(|(_, json)| serde_json::from_str::<BookReview>(json.value()).ok())
        .filter(|review| review.locale == locale)
        .filter(|review| !public_only || review.status == crate::models::ArticleStatus::Published)
        .collect();

    // Sort in memory; the review table has no chronological index.
    found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(found)
}
