use crate::models::{Role, UserProfile};
use bcrypt::{hash, verify, BcryptError};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum UserDbError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Password hashing error: {0}")]
    Bcrypt(#[from] BcryptError),
    #[error("Stored role is invalid: {0}")]
    InvalidRole(String),
    #[error("A user with email '{0}' already exists")]
    DuplicateEmail(String),
}

const PROFILE_COLUMNS: &str = "id, email, role, display_name, is_active, last_login_time";

fn profile_from_row(row: &Row) -> Result<(UserProfile, String), rusqlite::Error> {
    let role: String = row.get(2)?;
    Ok((
        UserProfile {
            id: row.get(0)?,
            email: row.get(1)?,
            // Parsed by the caller so a corrupt role surfaces as an error, not a panic.
            role: Role::Viewer,
            display_name: row.get(3)?,
            is_active: row.get(4)?,
            last_login_time: row.get(5)?,
        },
        role,
    ))
}

fn finish_profile((mut profile, role): (UserProfile, String)) -> Result<UserProfile, UserDbError> {
    profile.role = role.parse().map_err(|_| UserDbError::InvalidRole(role))?;
    Ok(profile)
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub fn create_user(
    conn: &Connection,
    email: &str,
    display_name: &str,
    password: &str,
    role: Role,
) -> Result<i64, UserDbError> {
    let email = normalize_email(email);
    if read_user_by_email(conn, &email)?.is_some() {
        return Err(UserDbError::DuplicateEmail(email));
    }
    let hashed_password = hash(password, bcrypt::DEFAULT_COST)?;
    conn.execute(
        "INSERT INTO users (email, password_hash, role, display_name) VALUES (?1, ?2, ?3, ?4)",
        params![email, hashed_password, role.as_str(), display_name.trim()],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn read_all_users(conn: &Connection) -> Result<Vec<UserProfile>, UserDbError> {
    let mut stmt = conn.prepare(&format!("SELECT {} FROM users ORDER BY id", PROFILE_COLUMNS))?;
    let rows = stmt.query_map([], |row| profile_from_row(row))?;

    let mut users = Vec::new();
    for row in rows {
        users.push(finish_profile(row?)?);
    }
    Ok(users)
}

pub fn read_user_by_id(conn: &Connection, user_id: i64) -> Result<Option<UserProfile>, UserDbError> {
    conn.query_row(
        &format!("SELECT {} FROM users WHERE id = ?1", PROFILE_COLUMNS),
        [user_id],
        |row| profile_from_row(row),
    )
    .optional()?
    .map(finish_profile)
    .transpose()
}

pub fn read_user_by_email(conn: &Connection, email: &str) -> Result<Option<UserProfile>, UserDbError> {
    conn.query_row(
        &format!("SELECT {} FROM users WHERE email = ?1", PROFILE_COLUMNS),
        [normalize_email(email)],
        |row| profile_from_row(row),
    )
    .optional()?
    .map(finish_profile)
    .transpose()
}

pub fn update_role(conn: &Connection, user_id: i64, role: Role) -> Result<bool, UserDbError> {
    let changed = conn.execute(
        "UPDATE users SET role = ?1 WHERE id = ?2",
        params![role.as_str(), user_id],
    )?;
    Ok(changed > 0)
}

pub fn set_active(conn: &Connection, user_id: i64, is_active: bool) -> Result<bool, UserDbError> {
    let changed = conn.execute(
        "UPDATE users SET is_active = ?1 WHERE id = ?2",
        params![is_active, user_id],
    )?;
    Ok(changed > 0)
}

pub fn update_password(conn: &Connection, email: &str, new_password: &str) -> Result<bool, UserDbError> {
    let hashed_password = hash(new_password, bcrypt::DEFAULT_COST)?;
    let changed = conn.execute(
        "UPDATE users SET password_hash = ?1 WHERE email = ?2",
        params![hashed_password, normalize_email(email)],
    )?;
    Ok(changed > 0)
}

pub fn delete_user(conn: &Connection, user_id: i64) -> Result<bool, UserDbError> {
    Ok(conn.execute("DELETE FROM users WHERE id = ?1", [user_id])? > 0)
}

pub fn count_admins(conn: &Connection) -> Result<i64, UserDbError> {
    Ok(conn.query_row(
        "SELECT COUNT(*) FROM users WHERE role = 'admin' AND is_active = 1",
        [],
        |row| row.get(0),
    )?)
}

/// Returns the profile when the email exists, the account is active and the password matches.
pub fn verify_credentials(
    conn: &Connection,
    email: &str,
    password: &str,
) -> Result<Option<UserProfile>, UserDbError> {
    let stored: Option<(String, i64)> = conn
        .query_row(
            "SELECT password_hash, id FROM users WHERE email = ?1 AND is_active = 1",
            [normalize_email(email)],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;

    match stored {
        Some((hash, user_id)) if verify(password, &hash).unwrap_or(false) => {
            read_user_by_id(conn, user_id)
        }
        _ => Ok(None),
    }
}

pub fn update_last_login_time(conn: &Connection, user_id: i64) -> Result<(), UserDbError> {
    let now = Utc::now().to_rfc3339();
    conn.execute("UPDATE users SET last_login_time = ?1 WHERE id = ?2", params![now, user_id])?;
    Ok(())
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
    fn create_and_verify() {
        let conn = conn();
        let id = create_user(&conn, " Editor@Example.com ", "Ed", "hunter22", Role::Editor).unwrap();
        let profile = verify_credentials(&conn, "editor@example.com", "hunter22").unwrap().unwrap();
        assert_eq!(profile.id, id);
        assert_eq!(profile.role, Role::Editor);
        assert_eq!(profile.display_name, "Ed");
        assert!(verify_credentials(&conn, "editor@example.com", "wrong").unwrap().is_none());
    }

    #[test]
    fn duplicate_email_rejected() {
        let conn = conn();
        create_user(&conn, "a@b.c", "A", "pw123456", Role::Viewer).unwrap();
        let err = create_user(&conn, "A@B.C", "A2", "pw123456", Role::Viewer).unwrap_err();
        assert!(matches!(err, UserDbError::DuplicateEmail(_)));
    }

    #[test]
    fn inactive_users_cannot_log_in() {
        let conn = conn();
        let id = create_user(&conn, "v@x.y", "V", "pw123456", Role::Viewer).unwrap();
        set_active(&conn, id, false).unwrap();
        assert!(verify_credentials(&conn, "v@x.y", "pw123456").unwrap().is_none());
    }

    #[test]
    fn role_change_and_admin_count() {
        let conn = conn();
        let id = create_user(&conn, "u@x.y", "U", "pw123456", Role::Viewer).unwrap();
        assert_eq!(count_admins(&conn).unwrap(), 0);
        assert!(update_role(&conn, id, Role::Admin).unwrap());
        assert_eq!(count_admins(&conn).unwrap(), 1);
        assert_eq!(read_user_by_id(&conn, id).unwrap().unwrap().role, Role::Admin);
        assert!(delete_user(&conn, id).unwrap());
        assert!(read_user_by_id(&conn, id).unwrap().is_none());
    }
}
