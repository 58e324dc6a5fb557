use crate::models::{Comment, CommentAuthor, VoteDelta, VoteValue};
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, Error as RusqliteError, OptionalExtension, Row};

const COMMENT_COLUMNS: &str =
    "id, article_id, parent_id, user_id, author_name, guest_session_id, content, edited, created_at, updated_at";

fn parse_timestamp(row: &Row, idx: usize) -> Result<DateTime<Utc>, RusqliteError> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RusqliteError::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn comment_from_row(row: &Row) -> Result<Comment, RusqliteError> {
    let user_id: Option<i64> = row.get(3)?;
    let author_name: String = row.get(4)?;
    let author = match user_id {
        Some(user_id) => CommentAuthor::User { user_id, display_name: author_name },
        None => CommentAuthor::Guest {
            name: author_name,
            session_id: row.get::<_, Option<String>>(5)?.unwrap_or_default(),
        },
    };
    Ok(Comment {
        id: row.get(0)?,
        article_id: row.get(1)?,
        parent_id: row.get(2)?,
        author,
        content: row.get(6)?,
        edited: row.get(7)?,
        created_at: parse_timestamp(row, 8)?,
        updated_at: parse_timestamp(row, 9)?,
    })
}

pub fn insert_comment(conn: &Connection, comment: &Comment) -> Result<(), RusqliteError> {
    let (user_id, author_name, guest_session_id) = match &comment.author {
        CommentAuthor::User { user_id, display_name } => (Some(*user_id), display_name.as_str(), None),
        CommentAuthor::Guest { name, session_id } => (None, name.as_str(), Some(session_id.as_str())),
    };
    conn.execute(
        &format!("INSERT INTO comments ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)", COMMENT_COLUMNS),
        params![
            comment.id,
            comment.article_id,
            comment.parent_id,
            user_id,
            author_name,
            guest_session_id,
            comment.content,
            comment.edited,
            comment.created_at.to_rfc3339(),
            comment.updated_at.to_rfc3339(),
        ],
    )?;
    Ok(())
}

pub fn read_comment(conn: &Connection, comment_id: &str) -> Result<Option<Comment>, RusqliteError> {
    conn.query_row(
        &format!("SELECT {} FROM comments WHERE id = ?1", COMMENT_COLUMNS),
        [comment_id],
        |row| comment_from_row(row),
    )
    .optional()
}

/// All comments of an article, oldest first.
pub fn list_comments(conn: &Connection, article_id: &str) -> Result<Vec<Comment>, RusqliteError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM comments WHERE article_id = ?1 ORDER BY created_at ASC, rowid ASC",
        COMMENT_COLUMNS
    ))?;
    let rows = stmt.query_map([article_id], |row| comment_from_row(row))?;

    let mut comments = Vec::new();
    for comment in rows {
        comments.push(comment?);
    }
    Ok(comments)
}

pub fn update_comment_content(
    conn: &Connection,
    comment_id: &str,
    content: &str,
    now: DateTime<Utc>,
) -> Result<usize, RusqliteError> {
    conn.execute(
        "UPDATE comments SET content = ?1, edited = 1, updated_at = ?2 WHERE id = ?3",
        params![content, now.to_rfc3339(), comment_id],
    )
}

/// Deletes the comment together with its replies. Returns the number of removed rows.
pub fn delete_comment(conn: &Connection, comment_id: &str) -> Result<usize, RusqliteError> {
    conn.execute(
        "DELETE FROM comments WHERE id = ?1 OR parent_id = ?1",
        [comment_id],
    )
}

pub fn delete_comments_for_article(conn: &Connection, article_id: &str) -> Result<usize, RusqliteError> {
    conn.execute("DELETE FROM comments WHERE article_id = ?1", [article_id])
}

// --- Votes ---

pub fn read_vote(conn: &Connection, article_id: &str, voter_key: &str) -> Result<Option<VoteValue>, RusqliteError> {
    let value: Option<i8> = conn
        .query_row(
            "SELECT value FROM article_votes WHERE article_id = ?1 AND voter_key = ?2",
            params![article_id, voter_key],
            |row| row.get(0),
        )
        .optional()?;
    Ok(value.and_then(VoteValue::from_i8))
}

/// Records a vote. Repeating the current vote withdraws it; the opposite vote replaces it.
/// Returns the change to apply to the article's counters.
pub fn cast_vote(
    conn: &Connection,
    article_id: &str,
    voter_key: &str,
    value: VoteValue,
) -> Result<VoteDelta, RusqliteError> {
    let tx = conn.unchecked_transaction()?;
    let previous = read_vote(&tx, article_id, voter_key)?;

    let mut delta = VoteDelta::default();
    match previous {
        Some(existing) if existing == value => {
            tx.execute(
                "DELETE FROM article_votes WHERE article_id = ?1 AND voter_key = ?2",
                params![article_id, voter_key],
            )?;
            bump(&mut delta, value, -1);
        }
        Some(existing) => {
            tx.execute(
                "UPDATE article_votes SET value = ?1 WHERE article_id = ?2 AND voter_key = ?3",
                params![value.as_i8(), article_id, voter_key],
            )?;
            bump(&mut delta, existing, -1);
            bump(&mut delta, value, 1);
        }
        None => {
            tx.execute(
                "INSERT INTO article_votes (article_id, voter_key, value) VALUES (?1, ?2, ?3)",
                params![article_id, voter_key, value.as_i8()],
            )?;
            bump(&mut delta, value, 1);
        }
    }
    tx.commit()?;
    Ok(delta)
}

fn bump(delta: &mut VoteDelta, value: VoteValue, by: i64) {
    match value {
        VoteValue::Like => delta.likes += by,
        VoteValue::Dislike => delta.dislikes += by,
    }
}

pub fn delete_votes_for_article(conn: &Connection, article_id: &str) -> Result<usize, RusqliteError> {
    conn.execute("DELETE FROM article_votes WHERE article_id = ?1", [article_id])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::setup::db_setup::create_sqlite_schema;

    fn conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        create_sqlite_schema(&conn).unwrap();
        conn
    }

    #[test]
    fn vote_toggle_and_switch() {
        let conn = conn();
        let first = cast_vote(&conn, "a1", "guest:s1", VoteValue::Like).unwrap();
        assert_eq!(first, VoteDelta { likes: 1, dislikes: 0 });

        let switched = cast_vote(&conn, "a1", "guest:s1", VoteValue::Dislike).unwrap();
        assert_eq!(switched, VoteDelta { likes: -1, dislikes: 1 });

        let withdrawn = cast_vote(&conn, "a1", "guest:s1", VoteValue::Dislike).unwrap();
        assert_eq!(withdrawn, VoteDelta { likes: 0, dislikes: -1 });
        assert_eq!(read_vote(&conn, "a1", "guest:s1").unwrap(), None);
    }

    #[test]
    fn comments_round_trip_through_rows() {
        let conn = conn();
        let now = Utc::now();
        let comment = Comment {
            id: "c1".into(),
            article_id: "a1".into(),
            parent_id: None,
            author: CommentAuthor::Guest { name: "Sam".into(), session_id: "s1".into() },
            content: "First".into(),
            edited: false,
            created_at: now,
            updated_at: now,
        };
        insert_comment(&conn, &comment).unwrap();
        let reply = Comment {
            id: "c2".into(),
            parent_id: Some("c1".into()),
            author: CommentAuthor::User { user_id: 7, display_name: "Editor".into() },
            ..comment.clone()
        };
        insert_comment(&conn, &reply).unwrap();

        let stored = read_comment(&conn, "c1").unwrap().unwrap();
        assert_eq!(stored.author, comment.author);
        assert_eq!(list_comments(&conn, "a1").unwrap().len(), 2);

        update_comment_content(&conn, "c2", "Edited", Utc::now()).unwrap();
        let edited = read_comment(&conn, "c2").unwrap().unwrap();
        assert!(edited.edited);
        assert_eq!(edited.content, "Edited");

        assert_eq!(delete_comment(&conn, "c1").unwrap(), 2);
        assert!(list_comments(&conn, "a1").unwrap().is_empty());
    }
}
