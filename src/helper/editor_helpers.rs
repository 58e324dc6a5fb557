use crate::helper::normalization_helpers::{normalize_post, parse_post};
use crate::helper::paragraph_helpers::split_paragraphs;
use crate::helper::sanitization_helpers::{strip_all_html, visible_text};
use crate::models::db_operations::articles_db_operations::{self, DbError};
use crate::models::db_operations::comments_db_operations;
use crate::models::{
    Article, ArticleAutosave, ArticleDraft, ArticleStatus, BookReview, BookReviewDraft, Category,
    Engagement, Locale,
};
use crate::DbPool;
use chrono::{DateTime, Utc};
use redb::Database;
use std::collections::BTreeSet;
use thiserror::Error;
use uuid::Uuid;

pub const MAX_TITLE_CHARS: usize = 300;
pub const MAX_EXCERPT_CHARS: usize = 280;
const MAX_KEY_POINTS: usize = 20;

#[derive(Error, Debug)]
pub enum EditorHelperError {
    #[error("Redb Database error: {0}")]
    Database(#[from] DbError),
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("R2D2 Pool error: {0}")]
    Pool(#[from] r2d2::Error),
    #[error("Invalid input: {0}")]
    Validation(String),
    #[error("Item not found")]
    NotFound,
    #[error("Cannot move from '{from}' to '{to}'")]
    InvalidTransition { from: ArticleStatus, to: ArticleStatus },
}

fn clean_optional(value: Option<String>) -> Option<String> {
    value.map(|v| strip_all_html(&v)).filter(|v| !v.is_empty())
}

fn clean_tags(values: Vec<String>) -> BTreeSet<String> {
    values
        .iter()
        .map(|v| strip_all_html(v))
        .filter(|v| !v.is_empty())
        .collect()
}

fn clean_title(title: &str) -> Result<String, EditorHelperError> {
    let title = strip_all_html(title);
    if title.is_empty() {
        return Err(EditorHelperError::Validation("Title is required.".to_string()));
    }
    Ok(truncate_chars(&title, MAX_TITLE_CHARS))
}

fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let cut: String = text.chars().take(max).collect();
    // Prefer a word boundary.
    match cut.rfind(char::is_whitespace) {
        Some(idx) if idx > max / 2 => format!("{}…", cut[..idx].trim_end()),
        _ => format!("{}…", cut),
    }
}

/// First body paragraph as plain text, shortened for listings.
pub fn derive_excerpt(normalized: &str) -> String {
    split_paragraphs(normalized)
        .iter()
        .map(|p| visible_text(p).replace('\n', " ").trim().to_string())
        .find(|p| !p.is_empty())
        .map(|p| truncate_chars(&p, MAX_EXCERPT_CHARS))
        .unwrap_or_default()
}

fn excerpt_or_derived(excerpt: &str, normalized: &str) -> String {
    let excerpt = strip_all_html(excerpt);
    if excerpt.is_empty() {
        derive_excerpt(normalized)
    } else {
        truncate_chars(&excerpt, MAX_EXCERPT_CHARS)
    }
}

fn parse_group_id(group_id: Option<String>) -> Result<String, EditorHelperError> {
    match group_id.map(|g| g.trim().to_string()).filter(|g| !g.is_empty()) {
        Some(g) => Uuid::parse_str(&g)
            .map(|uuid| uuid.to_string())
            .map_err(|_| EditorHelperError::Validation(format!("Invalid group id '{}'.", g))),
        None => Ok(Uuid::new_v4().to_string()),
    }
}

/// Turns a submitted form into a new draft article. Raw content is normalized on save.
pub fn build_article(draft: ArticleDraft, now: DateTime<Utc>) -> Result<Article, EditorHelperError> {
    let locale = draft
        .locale
        .ok_or_else(|| EditorHelperError::Validation("Locale is required.".to_string()))?;
    let title = clean_title(&draft.title)?;
    let content = normalize_post(&draft.raw_content);

    Ok(Article {
        id: Uuid::new_v4().to_string(),
        group_id: parse_group_id(draft.group_id)?,
        locale,
        title,
        excerpt: excerpt_or_derived(&draft.excerpt, &content),
        raw_content: draft.raw_content,
        content,
        category: draft.category.unwrap_or(Category::General),
        countries: clean_tags(draft.countries),
        organizations: clean_tags(draft.organizations),
        image_url: clean_optional(draft.image_url),
        video_url: clean_optional(draft.video_url),
        status: ArticleStatus::Draft,
        scheduled_at: draft.scheduled_at,
        engagement: Engagement::default(),
        created_at: now,
        updated_at: now,
        published_at: None,
    })
}

pub fn create_article(
    db: &Database,
    draft: ArticleDraft,
    now: DateTime<Utc>,
) -> Result<Article, EditorHelperError> {
    let article = build_article(draft, now)?;
    articles_db_operations::create_article(db, &article)?;
    log::info!("Created article {} ({}) in group {}", article.id, article.locale, article.group_id);
    Ok(article)
}

fn not_found_as_helper_error(e: DbError) -> EditorHelperError {
    match e {
        DbError::NotFound(_) => EditorHelperError::NotFound,
        other => EditorHelperError::Database(other),
    }
}

/// Replaces the editable fields of an article. Group and locale never change.
pub fn update_article(
    db: &Database,
    id: &str,
    draft: ArticleDraft,
    now: DateTime<Utc>,
) -> Result<Article, EditorHelperError> {
    let title = clean_title(&draft.title)?;
    let content = normalize_post(&draft.raw_content);
    let excerpt = excerpt_or_derived(&draft.excerpt, &content);
    let countries = clean_tags(draft.countries);
    let organizations = clean_tags(draft.organizations);
    let image_url = clean_optional(draft.image_url);
    let video_url = clean_optional(draft.video_url);

    articles_db_operations::modify_article(db, id, move |article| {
        article.title = title;
        article.excerpt = excerpt;
        article.raw_content = draft.raw_content;
        article.content = content;
        if let Some(category) = draft.category {
            article.category = category;
        }
        article.countries = countries;
        article.organizations = organizations;
        article.image_url = image_url;
        article.video_url = video_url;
        article.scheduled_at = draft.scheduled_at;
        article.updated_at = now;
        Ok(())
    })
    .map_err(not_found_as_helper_error)
}

/// Stores whichever text fields the editor sent. Last write wins.
pub fn autosave_article(
    db: &Database,
    id: &str,
    autosave: ArticleAutosave,
    now: DateTime<Utc>,
) -> Result<Article, EditorHelperError> {
    let title = match autosave.title.as_deref() {
        Some(t) if !strip_all_html(t).is_empty() => Some(clean_title(t)?),
        _ => None,
    };
    articles_db_operations::modify_article(db, id, move |article| {
        if let Some(title) = title {
            article.title = title;
        }
        if let Some(raw) = autosave.raw_content {
            article.content = normalize_post(&raw);
            article.raw_content = raw;
        }
        if let Some(excerpt) = autosave.excerpt {
            article.excerpt = excerpt_or_derived(&excerpt, &article.content);
        }
        article.updated_at = now;
        Ok(())
    })
    .map_err(not_found_as_helper_error)
}

pub fn change_status(
    db: &Database,
    id: &str,
    next: ArticleStatus,
    now: DateTime<Utc>,
) -> Result<Article, EditorHelperError> {
    let current = articles_db_operations::read_article(db, id)?.ok_or(EditorHelperError::NotFound)?;
    if current.status == next {
        return Ok(current);
    }
    if !current.status.can_transition_to(next) {
        return Err(EditorHelperError::InvalidTransition { from: current.status, to: next });
    }

    let updated = articles_db_operations::modify_article(db, id, move |article| {
        article.status = next;
        if next == ArticleStatus::Published && article.published_at.is_none() {
            article.published_at = Some(now);
        }
        article.updated_at = now;
        Ok(())
    })
    .map_err(not_found_as_helper_error)?;
    log::info!("Article {} moved from {} to {}", id, current.status, next);
    Ok(updated)
}

/// Removes the article together with its comments and votes.
pub fn delete_article(db: &Database, pool: &DbPool, id: &str) -> Result<bool, EditorHelperError> {
    if !articles_db_operations::delete_article(db, id)? {
        return Ok(false);
    }
    let conn = pool.get()?;
    let comments = comments_db_operations::delete_comments_for_article(&conn, id)?;
    let votes = comments_db_operations::delete_votes_for_article(&conn, id)?;
    log::info!("Deleted article {} ({} comments, {} votes)", id, comments, votes);
    Ok(true)
}

/// Creates a draft from a raw channel post. Title, category and countries come from the
/// post header when present.
pub fn import_raw_post(
    db: &Database,
    raw: &str,
    locale: Locale,
    group_id: Option<String>,
    now: DateTime<Utc>,
) -> Result<Article, EditorHelperError> {
    let parsed = parse_post(raw);
    if parsed.body.is_empty() {
        return Err(EditorHelperError::Validation("The post has no body text.".to_string()));
    }

    let title = match parsed.header.title {
        Some(title) => title,
        None => split_paragraphs(&parsed.body)
            .first()
            .map(|p| visible_text(p).lines().next().unwrap_or_default().to_string())
            .unwrap_or_default(),
    };

    let draft = ArticleDraft {
        group_id,
        locale: Some(locale),
        title,
        excerpt: String::new(),
        raw_content: raw.to_string(),
        category: parsed.header.category,
        countries: parsed.header.countries,
        organizations: Vec::new(),
        image_url: None,
        video_url: None,
        scheduled_at: None,
    };
    create_article(db, draft, now)
}

/// Every article of a locale regardless of status, newest first.
pub fn list_for_editing(db: &Database, locale: Locale) -> Result<Vec<Article>, EditorHelperError> {
    Ok(articles_db_operations::list_articles(db, locale, false, Utc::now())?)
}

pub fn fetch_for_editing(db: &Database, id: &str) -> Result<Article, EditorHelperError> {
    articles_db_operations::read_article(db, id)?.ok_or(EditorHelperError::NotFound)
}

// --- Book reviews ---

pub fn list_book_reviews_for_editing(db: &Database, locale: Locale) -> Result<Vec<BookReview>, EditorHelperError> {
    Ok(articles_db_operations::list_book_reviews(db, locale, false)?)
}

fn build_book_review_fields(
    draft: &BookReviewDraft,
) -> Result<(String, String, Vec<String>), EditorHelperError> {
    let title = clean_title(&draft.title)?;
    let author = strip_all_html(&draft.author);
    if author.is_empty() {
        return Err(EditorHelperError::Validation("Author is required.".to_string()));
    }
    if let Some(rating) = draft.rating {
        if !(1..=5).contains(&rating) {
            return Err(EditorHelperError::Validation("Rating must be between 1 and 5.".to_string()));
        }
    }
    let key_points: Vec<String> = draft
        .key_points
        .iter()
        .map(|p| strip_all_html(p))
        .filter(|p| !p.is_empty())
        .take(MAX_KEY_POINTS)
        .collect();
    Ok((title, author, key_points))
}

pub fn create_book_review(
    db: &Database,
    draft: BookReviewDraft,
    now: DateTime<Utc>,
) -> Result<BookReview, EditorHelperError> {
    let (title, author, key_points) = build_book_review_fields(&draft)?;
    let review = BookReview {
        id: Uuid::new_v4().to_string(),
        group_id: parse_group_id(draft.group_id)?,
        locale: draft.locale,
        title,
        author,
        rating: draft.rating,
        recommendation: draft.recommendation,
        key_points,
        cover_url: clean_optional(draft.cover_url),
        telegram_link: clean_optional(draft.telegram_link),
        status: draft.status.unwrap_or(ArticleStatus::Draft),
        created_at: now,
        updated_at: now,
    };
    articles_db_operations::create_book_review(db, &review)?;
    Ok(review)
}

pub fn update_book_review(
    db: &Database,
    id: &str,
    draft: BookReviewDraft,
    now: DateTime<Utc>,
) -> Result<BookReview, EditorHelperError> {
    let existing =
        articles_db_operations::read_book_review(db, id)?.ok_or(EditorHelperError::NotFound)?;
    let (title, author, key_points) = build_book_review_fields(&draft)?;
    let review = BookReview {
        title,
        author,
        rating: draft.rating,
        recommendation: draft.recommendation,
        key_points,
        cover_url: clean_optional(draft.cover_url),
        telegram_link: clean_optional(draft.telegram_link),
        status: draft.status.unwrap_or(existing.status),
        updated_at: now,
        ..existing
    };
    articles_db_operations::update_book_review(db, &review).map_err(not_found_as_helper_error)
}

pub fn delete_book_review(db: &Database, id: &str) -> Result<bool, EditorHelperError> {
    Ok(articles_db_operations::delete_book_review(db, id)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::temp_articles_db;

    fn draft(title: &str, raw: &str) -> ArticleDraft {
        ArticleDraft {
            group_id: None,
            locale: Some(Locale::En),
            title: title.to_string(),
            excerpt: String::new(),
            raw_content: raw.to_string(),
            category: Some(Category::Military),
            countries: vec![" Syria ".into(), "".into()],
            organizations: vec![],
            image_url: Some("  ".into()),
            video_url: None,
            scheduled_at: None,
        }
    }

    #[test]
    fn create_normalizes_content_and_cleans_fields() {
        let db = temp_articles_db();
        let article = create_article(
            &db,
            draft("<b>Front</b> line", "**Category**: Military\n\n**Bold** text here."),
            Utc::now(),
        )
        .unwrap();
        assert_eq!(article.title, "Front line");
        assert_eq!(article.content, "<strong>Bold</strong> text here.");
        assert_eq!(article.excerpt, "Bold text here.");
        assert_eq!(article.countries.iter().collect::<Vec<_>>(), vec!["Syria"]);
        assert_eq!(article.image_url, None);
        assert_eq!(article.status, ArticleStatus::Draft);
    }

    #[test]
    fn empty_title_is_rejected() {
        let err = build_article(draft("  <i></i> ", "body"), Utc::now()).unwrap_err();
        assert!(matches!(err, EditorHelperError::Validation(_)));
    }

    #[test]
    fn second_row_for_same_group_and_locale_conflicts() {
        let db = temp_articles_db();
        let first = create_article(&db, draft("One", "a"), Utc::now()).unwrap();

        let mut same = draft("Two", "b");
        same.group_id = Some(first.group_id.clone());
        let err = create_article(&db, same, Utc::now()).unwrap_err();
        assert!(matches!(err, EditorHelperError::Database(DbError::Conflict(_))));

        let mut arabic = draft("Three", "c");
        arabic.group_id = Some(first.group_id.clone());
        arabic.locale = Some(Locale::Ar);
        assert!(create_article(&db, arabic, Utc::now()).is_ok());
    }

    #[test]
    fn status_transitions_follow_the_table() {
        let db = temp_articles_db();
        let article = create_article(&db, draft("Story", "text"), Utc::now()).unwrap();

        let published = change_status(&db, &article.id, ArticleStatus::Published, Utc::now()).unwrap();
        assert!(published.published_at.is_some());

        let archived = change_status(&db, &article.id, ArticleStatus::Archived, Utc::now()).unwrap();
        assert_eq!(archived.status, ArticleStatus::Archived);

        let err = change_status(&db, &article.id, ArticleStatus::Published, Utc::now()).unwrap_err();
        assert!(matches!(err, EditorHelperError::InvalidTransition { .. }));
    }

    #[test]
    fn autosave_only_touches_sent_fields() {
        let db = temp_articles_db();
        let article = create_article(&db, draft("Story", "first body"), Utc::now()).unwrap();
        let saved = autosave_article(
            &db,
            &article.id,
            ArticleAutosave { title: None, excerpt: None, raw_content: Some("__second__ body".into()) },
            Utc::now(),
        )
        .unwrap();
        assert_eq!(saved.title, "Story");
        assert_eq!(saved.content, "<em>second</em> body");

        let missing = autosave_article(&db, &Uuid::new_v4().to_string(), ArticleAutosave::default(), Utc::now());
        assert!(matches!(missing, Err(EditorHelperError::NotFound)));
    }

    #[test]
    fn import_uses_post_header() {
        let db = temp_articles_db();
        let raw = "🔴 **Title**: Border clashes\n**Category**: Security\n**Countries**: Lebanon, Israel\n\nFirst paragraph.\n\n@channel";
        let article = import_raw_post(&db, raw, Locale::En, None, Utc::now()).unwrap();
        assert_eq!(article.title, "Border clashes");
        assert_eq!(article.category, Category::Security);
        assert!(article.countries.contains("Lebanon"));
        assert_eq!(article.content, "First paragraph.");
    }

    #[test]
    fn book_review_rating_is_bounded() {
        let db = temp_articles_db();
        let draft = BookReviewDraft {
            group_id: None,
            locale: Locale::Ar,
            title: "Book".into(),
            author: "Writer".into(),
            rating: Some(6),
            recommendation: crate::models::RecommendationTier::Essential,
            key_points: vec![],
            cover_url: None,
            telegram_link: None,
            status: None,
        };
        assert!(matches!(create_book_review(&db, draft, Utc::now()), Err(EditorHelperError::Validation(_))));
    }

    #[test]
    fn long_text_is_truncated_on_word_boundary() {
        let text = "word ".repeat(100);
        let out = truncate_chars(text.trim(), 22);
        assert_eq!(out, "word word word word…");
    }
}
