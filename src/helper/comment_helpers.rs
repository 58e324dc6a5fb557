use crate::helper::sanitization_helpers::strip_all_html;
use crate::models::db_operations::articles_db_operations::{self, DbError};
use crate::models::db_operations::{comments_db_operations, users_db_operations};
use crate::models::db_operations::users_db_operations::UserDbError;
use crate::models::{Capability, Comment, CommentAuthor, CommentThread, Requester, Role};
use chrono::{DateTime, Utc};
use redb::Database;
use rusqlite::Connection;
use serde::Deserialize;
use std::collections::HashMap;
use thiserror::Error;
use uuid::Uuid;

pub const MAX_COMMENT_CHARS: usize = 2000;
const MAX_GUEST_NAME_CHARS: usize = 60;

#[derive(Error, Debug)]
pub enum CommentError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Redb Database error: {0}")]
    Articles(#[from] DbError),
    #[error("User lookup failed: {0}")]
    Users(#[from] UserDbError),
    #[error("Article not found")]
    ArticleNotFound,
    #[error("Comment not found")]
    NotFound,
    #[error("Parent comment not found")]
    ParentNotFound,
    #[error("Replies can only be made to top-level comments")]
    NestedReply,
    #[error("Parent comment belongs to a different article")]
    ParentArticleMismatch,
    #[error("Comment cannot be empty")]
    EmptyContent,
    #[error("Comment is too long")]
    TooLong,
    #[error("Guests must provide a name and a session id")]
    MissingGuestIdentity,
    #[error("You may only change your own comments")]
    Forbidden,
}

/// Body of a comment submission.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewComment {
    pub content: String,
    pub parent_id: Option<String>,
    pub guest_name: Option<String>,
    pub guest_session_id: Option<String>,
}

/// A reply must point at a top-level comment of the same article.
pub fn validate_parent(parent: Option<&Comment>, article_id: &str) -> Result<(), CommentError> {
    match parent {
        None => Ok(()),
        Some(parent) if parent.article_id != article_id => Err(CommentError::ParentArticleMismatch),
        Some(parent) if parent.parent_id.is_some() => Err(CommentError::NestedReply),
        Some(_) => Ok(()),
    }
}

pub fn clean_content(content: &str) -> Result<String, CommentError> {
    let content = strip_all_html(content);
    if content.is_empty() {
        return Err(CommentError::EmptyContent);
    }
    if content.chars().count() > MAX_COMMENT_CHARS {
        return Err(CommentError::TooLong);
    }
    Ok(content)
}

/// Works out who is writing. Signed-in users are named from their profile; guests need
/// both a name and a session id.
pub fn resolve_author(
    conn: &Connection,
    requester: &Requester,
    guest_name: Option<&str>,
) -> Result<CommentAuthor, CommentError> {
    match requester {
        Requester::User { user_id, .. } => {
            let profile = users_db_operations::read_user_by_id(conn, *user_id)?
                .ok_or(CommentError::Forbidden)?;
            Ok(CommentAuthor::User { user_id: profile.id, display_name: profile.display_name })
        }
        Requester::Guest { session_id } => {
            let name = guest_name.map(strip_all_html).unwrap_or_default();
            if name.is_empty() || session_id.trim().is_empty() {
                return Err(CommentError::MissingGuestIdentity);
            }
            Ok(CommentAuthor::Guest {
                name: name.chars().take(MAX_GUEST_NAME_CHARS).collect(),
                session_id: session_id.trim().to_string(),
            })
        }
    }
}

/// Comments follow the article's visibility: public articles for everyone, drafts and
/// archived articles only for roles that may view drafts.
pub fn ensure_article_visible(
    db: &Database,
    article_id: &str,
    viewer_role: Option<Role>,
    now: DateTime<Utc>,
) -> Result<(), CommentError> {
    let may_preview = viewer_role.map_or(false, |role| role.can(Capability::ViewDrafts));
    match articles_db_operations::read_article(db, article_id)? {
        Some(article) if article.is_public(now) || may_preview => Ok(()),
        _ => Err(CommentError::ArticleNotFound),
    }
}

pub fn post_comment(
    db: &Database,
    conn: &Connection,
    article_id: &str,
    requester: &Requester,
    submission: NewComment,
    now: DateTime<Utc>,
) -> Result<Comment, CommentError> {
    let viewer_role = match requester {
        Requester::User { role, .. } => Some(*role),
        Requester::Guest { .. } => None,
    };
    ensure_article_visible(db, article_id, viewer_role, now)?;
    let content = clean_content(&submission.content)?;

    let parent_id = submission.parent_id.filter(|p| !p.trim().is_empty());
    if let Some(parent_id) = parent_id.as_deref() {
        let parent = comments_db_operations::read_comment(conn, parent_id)?
            .ok_or(CommentError::ParentNotFound)?;
        validate_parent(Some(&parent), article_id)?;
    }

    let author = resolve_author(conn, requester, submission.guest_name.as_deref())?;
    let comment = Comment {
        id: Uuid::new_v4().to_string(),
        article_id: article_id.to_string(),
        parent_id,
        author,
        content,
        edited: false,
        created_at: now,
        updated_at: now,
    };
    comments_db_operations::insert_comment(conn, &comment)?;
    Ok(comment)
}

pub fn edit_comment(
    conn: &Connection,
    comment_id: &str,
    requester: &Requester,
    content: &str,
    now: DateTime<Utc>,
) -> Result<Comment, CommentError> {
    let existing = comments_db_operations::read_comment(conn, comment_id)?.ok_or(CommentError::NotFound)?;
    if !existing.is_owned_by(requester) {
        return Err(CommentError::Forbidden);
    }
    let content = clean_content(content)?;
    comments_db_operations::update_comment_content(conn, comment_id, &content, now)?;
    Ok(Comment { content, edited: true, updated_at: now, ..existing })
}

/// Owners may delete their comments; moderators may delete any. Replies go with their parent.
pub fn delete_comment(
    conn: &Connection,
    comment_id: &str,
    requester: &Requester,
) -> Result<usize, CommentError> {
    let existing = comments_db_operations::read_comment(conn, comment_id)?.ok_or(CommentError::NotFound)?;
    let moderator = matches!(requester, Requester::User { role, .. } if role.can(Capability::DeleteAnyComment));
    if !existing.is_owned_by(requester) && !moderator {
        return Err(CommentError::Forbidden);
    }
    Ok(comments_db_operations::delete_comment(conn, comment_id)?)
}

/// Groups a flat, oldest-first list into top-level comments with their replies.
/// Replies whose parent is missing are dropped.
pub fn build_threads(comments: Vec<Comment>) -> Vec<CommentThread> {
    let mut threads: Vec<CommentThread> = Vec::new();
    let mut position: HashMap<String, usize> = HashMap::new();
    let mut replies: Vec<Comment> = Vec::new();

    for comment in comments {
        if comment.parent_id.is_none() {
            position.insert(comment.id.clone(), threads.len());
            threads.push(CommentThread { comment, replies: Vec::new() });
        } else {
            replies.push(comment);
        }
    }
    for reply in replies {
        let slot = reply.parent_id.as_ref().and_then(|p| position.get(p)).copied();
        if let Some(idx) = slot {
            threads[idx].replies.push(reply);
        }
    }
    threads
}

pub fn list_threads(conn: &Connection, article_id: &str) -> Result<Vec<CommentThread>, CommentError> {
    Ok(build_threads(comments_db_operations::list_comments(conn, article_id)?))
}

/// Threads of an article the viewer is allowed to read.
pub fn list_visible_threads(
    db: &Database,
    conn: &Connection,
    article_id: &str,
    viewer_role: Option<Role>,
    now: DateTime<Utc>,
) -> Result<Vec<CommentThread>, CommentError> {
    ensure_article_visible(db, article_id, viewer_role, now)?;
    list_threads(conn, article_id)
}
