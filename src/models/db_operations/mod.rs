pub mod articles_db_operations;
pub mod comments_db_operations;
pub mod users_db_operations;
