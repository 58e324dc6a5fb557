use crate::helper::sanitization_helpers::strip_all_html;
use crate::models::db_operations::users_db_operations::{self, UserDbError};
use crate::models::{Role, UserProfile};
use crate::DbPool;
use thiserror::Error;

pub const MIN_PASSWORD_CHARS: usize = 8;

#[derive(Error, Debug)]
pub enum AdminHelperError {
    #[error("Database error: {0}")]
    Database(#[from] UserDbError),
    #[error("R2D2 Pool error: {0}")]
    Pool(#[from] r2d2::Error),
    #[error("User not found")]
    NotFound,
    #[error("Invalid input: {0}")]
    Validation(String),
    #[error("Administrators cannot change their own role")]
    SelfRoleChange,
    #[error("At least one active administrator must remain")]
    LastAdmin,
}

// Helper to get a connection from the pool
fn get_conn(
    pool: &DbPool,
) -> Result<r2d2::PooledConnection<r2d2_sqlite::SqliteConnectionManager>, AdminHelperError> {
    pool.get().map_err(AdminHelperError::Pool)
}

pub fn validate_new_user(email: &str, display_name: &str, password: &str) -> Result<(), AdminHelperError> {
    let email = email.trim();
    let valid_email = email
        .split_once('@')
        .map_or(false, |(local, domain)| !local.is_empty() && domain.contains('.') && !email.contains(' '));
    if !valid_email {
        return Err(AdminHelperError::Validation("A valid email address is required.".to_string()));
    }
    if strip_all_html(display_name).is_empty() {
        return Err(AdminHelperError::Validation("Display name is required.".to_string()));
    }
    if password.chars().count() < MIN_PASSWORD_CHARS {
        return Err(AdminHelperError::Validation(format!(
            "Password must be at least {} characters.",
            MIN_PASSWORD_CHARS
        )));
    }
    Ok(())
}

pub fn create_new_user(
    pool: &DbPool,
    email: &str,
    display_name: &str,
    password: &str,
    role: Role,
) -> Result<UserProfile, AdminHelperError> {
    validate_new_user(email, display_name, password)?;
    let conn = get_conn(pool)?;
    let id = users_db_operations::create_user(&conn, email, &strip_all_html(display_name), password, role)?;
    users_db_operations::read_user_by_id(&conn, id)?.ok_or(AdminHelperError::NotFound)
}

pub fn fetch_all_users(pool: &DbPool) -> Result<Vec<UserProfile>, AdminHelperError> {
    let conn = get_conn(pool)?;
    Ok(users_db_operations::read_all_users(&conn)?)
}

fn ensure_not_last_admin(conn: &rusqlite::Connection, target: &UserProfile) -> Result<(), AdminHelperError> {
    if target.role == Role::Admin && target.is_active && users_db_operations::count_admins(conn)? <= 1 {
        return Err(AdminHelperError::LastAdmin);
    }
    Ok(())
}

pub fn change_user_role(
    pool: &DbPool,
    acting_user_id: i64,
    target_user_id: i64,
    role: Role,
) -> Result<UserProfile, AdminHelperError> {
    if acting_user_id == target_user_id {
        return Err(AdminHelperError::SelfRoleChange);
    }
    let conn = get_conn(pool)?;
    let target = users_db_operations::read_user_by_id(&conn, target_user_id)?.ok_or(AdminHelperError::NotFound)?;
    if target.role == role {
        return Ok(target);
    }
    if role != Role::Admin {
        ensure_not_last_admin(&conn, &target)?;
    }
    users_db_operations::update_role(&conn, target_user_id, role)?;
    log::info!("User {} role changed from {} to {} by user {}", target.email, target.role, role, acting_user_id);
    Ok(UserProfile { role, ..target })
}

pub fn set_user_active(pool: &DbPool, target_user_id: i64, is_active: bool) -> Result<(), AdminHelperError> {
    let conn = get_conn(pool)?;
    let target = users_db_operations::read_user_by_id(&conn, target_user_id)?.ok_or(AdminHelperError::NotFound)?;
    if !is_active {
        ensure_not_last_admin(&conn, &target)?;
    }
    users_db_operations::set_active(&conn, target_user_id, is_active)?;
    Ok(())
}

/// Deletes a user. Returns false if no such user existed.
pub fn delete_user(pool: &DbPool, target_user_id: i64) -> Result<bool, AdminHelperError> {
    let conn = get_conn(pool)?;
    let target = match users_db_operations::read_user_by_id(&conn, target_user_id)? {
        Some(target) => target,
        None => return Ok(false),
    };
    ensure_not_last_admin(&conn, &target)?;
    Ok(users_db_operations::delete_user(&conn, target_user_id)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::temp_users_pool;

    #[test]
    fn new_user_validation() {
        assert!(validate_new_user("a@b.io", "A", "longenough").is_ok());
        assert!(validate_new_user("not-an-email", "A", "longenough").is_err());
        assert!(validate_new_user("a@b.io", "<b></b>", "longenough").is_err());
        assert!(validate_new_user("a@b.io", "A", "short").is_err());
    }

    #[test]
    fn admins_cannot_demote_themselves_or_the_last_admin() {
        let pool = temp_users_pool();
        let admin = create_new_user(&pool, "admin@x.io", "Admin", "password1", Role::Admin).unwrap();
        let editor = create_new_user(&pool, "ed@x.io", "Ed", "password1", Role::Editor).unwrap();

        assert!(matches!(
            change_user_role(&pool, admin.id, admin.id, Role::Viewer),
            Err(AdminHelperError::SelfRoleChange)
        ));
        assert!(matches!(delete_user(&pool, admin.id), Err(AdminHelperError::LastAdmin)));

        let promoted = change_user_role(&pool, admin.id, editor.id, Role::Admin).unwrap();
        assert_eq!(promoted.role, Role::Admin);
        let demoted = change_user_role(&pool, editor.id, admin.id, Role::Viewer).unwrap();
        assert_eq!(demoted.role, Role::Viewer);
        assert!(delete_user(&pool, admin.id).unwrap());
        assert!(!delete_user(&pool, admin.id).unwrap());
    }
}
