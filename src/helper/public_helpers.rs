use crate::helper::filter_helpers::{FilterSession, FilterState, Page};
use crate::helper::paragraph_helpers::{render_normalized, RenderedBlock};
use crate::models::db_operations::articles_db_operations::{self, DbError};
use crate::models::db_operations::{comments_db_operations, users_db_operations};
use crate::models::{
    Article, BookReview, Capability, Category, Engagement, Locale, Requester, Role, UserProfile,
    VoteValue,
};
use crate::DbPool;
use chrono::{DateTime, Utc};
use redb::Database;
use serde::Serialize;
use std::collections::BTreeSet;
use std::time::Duration;
use thiserror::Error;

/// Upper bound on the `pages` listing parameter.
pub const MAX_PAGES: usize = 50;

#[derive(Error, Debug)]
pub enum PublicHelperError {
    #[error("Redb Database error: {0}")]
    Database(#[from] DbError),
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("R2D2 Pool error: {0}")]
    Pool(#[from] r2d2::Error),
    #[error("Article not found")]
    NotFound,
}

/// Listing shape of an article: no raw or rendered body.
#[derive(Debug, Clone, Serialize)]
pub struct ArticleSummary {
    pub id: String,
    pub group_id: String,
    pub locale: Locale,
    pub title: String,
    pub excerpt: String,
    pub category: Category,
    pub countries: BTreeSet<String>,
    pub image_url: Option<String>,
    pub video_url: Option<String>,
    pub display_date: DateTime<Utc>,
    pub engagement: Engagement,
}

impl From<&Article> for ArticleSummary {
    fn from(article: &Article) -> Self {
        ArticleSummary {
            id: article.id.clone(),
            group_id: article.group_id.clone(),
            locale: article.locale,
            title: article.title.clone(),
            excerpt: article.excerpt.clone(),
            category: article.category,
            countries: article.countries.clone(),
            image_url: article.image_url.clone(),
            video_url: article.video_url.clone(),
            display_date: article.display_date(),
            engagement: article.engagement.clone(),
        }
    }
}

/// An article ready for reading: metadata, sanitized body blocks and the id of its
/// version in the other locale, if one exists.
#[derive(Debug, Clone, Serialize)]
pub struct ArticleView {
    #[serde(flatten)]
    pub summary: ArticleSummary,
    pub organizations: BTreeSet<String>,
    pub status: crate::models::ArticleStatus,
    pub blocks: Vec<RenderedBlock>,
    pub translation_id: Option<String>,
}

pub fn verify_user_credentials(pool: &DbPool, email: &str, password: &str) -> Option<UserProfile> {
    let conn = pool.get().ok()?;
    match users_db_operations::verify_credentials(&conn, email, password) {
        Ok(Some(profile)) => {
            if let Err(e) = users_db_operations::update_last_login_time(&conn, profile.id) {
                log::warn!("Could not record login time for user {}: {}", profile.id, e);
            }
            Some(profile)
        }
        Ok(None) => None,
        Err(e) => {
            log::error!("Credential check failed: {}", e);
            None
        }
    }
}

/// Filtered, windowed listing of public articles. `pages` is how many page windows
/// the reader has revealed.
pub fn fetch_article_page(
    db: &Database,
    locale: Locale,
    state: FilterState,
    pages: usize,
    page_size: usize,
    now: DateTime<Utc>,
) -> Result<Page<ArticleSummary>, DbError> {
    let base = match state.search_query() {
        Some(query) => articles_db_operations::search_articles(db, locale, query, now)?,
        None => articles_db_operations::list_articles(db, locale, true, now)?,
    };

    let mut session = FilterSession::new(base, page_size, Duration::ZERO).with_state(state);
    for _ in 1..pages.clamp(1, MAX_PAGES) {
        session.load_more();
    }
    let page = session.page(now);
    Ok(Page {
        items: page.items.iter().map(ArticleSummary::from).collect(),
        total: page.total,
        has_more: page.has_more,
    })
}

pub fn search_articles(
    db: &Database,
    locale: Locale,
    query: &str,
    now: DateTime<Utc>,
) -> Result<Vec<ArticleSummary>, DbError> {
    Ok(articles_db_operations::search_articles(db, locale, query, now)?
        .iter()
        .map(ArticleSummary::from)
        .collect())
}

/// Unpublished articles are only visible to roles that may view drafts.
pub fn fetch_article_view(
    db: &Database,
    id: &str,
    viewer_role: Option<Role>,
    now: DateTime<Utc>,
) -> Result<Option<ArticleView>, DbError> {
    let article = match articles_db_operations::read_article(db, id)? {
        Some(article) => article,
        None => return Ok(None),
    };
    let may_preview = viewer_role.map_or(false, |role| role.can(Capability::ViewDrafts));
    if !article.is_public(now) && !may_preview {
        return Ok(None);
    }

    let other_locale = match article.locale {
        Locale::En => Locale::Ar,
        Locale::Ar => Locale::En,
    };
    let translation_id = articles_db_operations::find_group_article(db, &article.group_id, other_locale)?
        .filter(|t| t.is_public(now) || may_preview)
        .map(|t| t.id);

    Ok(Some(ArticleView {
        summary: ArticleSummary::from(&article),
        organizations: article.organizations.clone(),
        status: article.status,
        blocks: render_normalized(&article.content),
        translation_id,
    }))
}

pub fn record_view(db: &Database, id: &str, now: DateTime<Utc>) -> Result<Engagement, PublicHelperError> {
    match articles_db_operations::read_article(db, id)? {
        Some(article) if article.is_public(now) => Ok(articles_db_operations::increment_views(db, id)?),
        _ => Err(PublicHelperError::NotFound),
    }
}

/// Records a like or dislike and returns the article's updated counters.
pub fn cast_vote(
    db: &Database,
    pool: &DbPool,
    id: &str,
    requester: &Requester,
    value: VoteValue,
    now: DateTime<Utc>,
) -> Result<Engagement, PublicHelperError> {
    match articles_db_operations::read_article(db, id)? {
        Some(article) if article.is_public(now) => {}
        _ => return Err(PublicHelperError::NotFound),
    }
    let conn = pool.get()?;
    let delta = comments_db_operations::cast_vote(&conn, id, &requester.voter_key(), value)?;
    Ok(articles_db_operations::apply_vote_delta(db, id, delta)?)
}

pub fn fetch_book_reviews(db: &Database, locale: Locale) -> Result<Vec<BookReview>, DbError> {
    articles_db_operations::list_book_reviews(db, locale, true)
}

pub fn fetch_book_review(
    db: &Database,
    id: &str,
    viewer_role: Option<Role>,
) -> Result<Option<BookReview>, DbError> {
    let may_preview = viewer_role.map_or(false, |role| role.can(Capability::ViewDrafts));
    Ok(articles_db_operations::read_book_review(db, id)?
        .filter(|review| review.status == crate::models::ArticleStatus::Published || may_preview))
}
