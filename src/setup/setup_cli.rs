use clap::{Parser, Subcommand};
use newsroom_backend::config::Config;
use newsroom_backend::models::db_operations::users_db_operations::{self, UserDbError};
use newsroom_backend::models::Role;
use newsroom_backend::setup::db_setup;
use redb::Database;
use rusqlite::Connection;
use std::fs;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "setup_cli", author, version, about = "A CLI for initial newsroom setup.", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the .env configuration file.
    #[arg(long, required = true, value_name = "FILE")]
    env_file: PathBuf,
}

#[derive(Subcommand, Debug)]
enum Commands {
    Db {
        #[command(subcommand)]
        action: DbAction,
    },
    User {
        #[command(subcommand)]
        action: UserAction,
    },
}

#[derive(Subcommand, Debug)]
enum DbAction {
    /// Creates the 'users' (sqlite) and/or 'articles' (redb) databases.
    Setup { db_type: Option<String> },
}

#[derive(Subcommand, Debug)]
enum UserAction {
    Create {
        #[arg(long)]
        email: String,
        #[arg(long)]
        display_name: String,
        #[arg(long)]
        password: String,
        #[arg(long, default_value = "admin")]
        role: Role,
    },
    List,
    SetRole {
        #[arg(long)]
        email: String,
        #[arg(long)]
        role: Role,
    },
    ChangePassword {
        #[arg(long)]
        email: String,
        #[arg(long)]
        new_password: String,
    },
}

fn main() {
    let cli = Cli::parse();

    let config = Config::from_env(&cli.env_file).expect("FATAL: Failed to load or parse configuration.");

    match &cli.command {
        Commands::Db { action } => match action {
            DbAction::Setup { db_type } => match db_type.as_deref() {
                Some("users") => setup_users_database(&config),
                Some("articles") => setup_articles_database(&config),
                Some(other) => eprintln!("❌ Error: Unknown database type '{}'. Use 'users' or 'articles'.", other),
                None => {
                    setup_users_database(&config);
                    setup_articles_database(&config);
                }
            },
        },
        Commands::User { action } => {
            let conn = match open_users_db(&config) {
                Some(conn) => conn,
                None => return,
            };
            match action {
                UserAction::Create { email, display_name, password, role } => {
                    create_user(&conn, email, display_name, password, *role)
                }
                UserAction::List => list_users(&conn),
                UserAction::SetRole { email, role } => set_role(&conn, email, *role),
                UserAction::ChangePassword { email, new_password } => change_password(&conn, email, new_password),
            }
        }
    }
}

fn setup_users_database(config: &Config) {
    let db_path = config.users_db_path();
    if db_path.exists() {
        println!("ℹ️ Users database already exists at '{}'. Skipping creation.", db_path.display());
        return;
    }
    println!("\nSetting up users database at '{}'...", db_path.display());

    if let Some(parent_dir) = db_path.parent() {
        if let Err(e) = fs::create_dir_all(parent_dir) {
            eprintln!("❌ Could not create database directory: {}", e);
            return;
        }
    }

    let mut conn = match Connection::open(&db_path) {
        Ok(conn) => conn,
        Err(e) => {
            eprintln!("❌ Could not create users database file: {}", e);
            return;
        }
    };
    match db_setup::setup_users_db(&mut conn) {
        Ok(_) => println!("✅ Users database setup completed successfully."),
        Err(e) => eprintln!("❌ Error setting up users database: {}", e),
    }
}

fn setup_articles_database(config: &Config) {
    let db_path = config.articles_db_path();
    if db_path.exists() {
        println!("ℹ️ Articles database already exists at '{}'. Skipping creation.", db_path.display());
        return;
    }
    println!("\nSetting up articles database at '{}'...", db_path.display());

    if let Some(parent_dir) = db_path.parent() {
        if let Err(e) = fs::create_dir_all(parent_dir) {
            eprintln!("❌ Could not create database directory: {}", e);
            return;
        }
    }

    let db = match Database::create(&db_path) {
        Ok(db) => db,
        Err(e) => {
            eprintln!("❌ Failed to create articles database file: {}", e);
            return;
        }
    };
    match db_setup::setup_articles_db(&db) {
        Ok(_) => println!("✅ Articles database setup completed successfully."),
        Err(e) => eprintln!("❌ Error setting up articles database: {}", e),
    }
}

fn open_users_db(config: &Config) -> Option<Connection> {
    let db_path = config.users_db_path();
    if !db_path.exists() {
        eprintln!(
            "❌ Error: Users database not found at '{}'. Please run `setup_cli db setup` first.",
            db_path.display()
        );
        return None;
    }
    match Connection::open(&db_path) {
        Ok(conn) => Some(conn),
        Err(e) => {
            eprintln!("❌ Could not open users database: {}", e);
            None
        }
    }
}

fn create_user(conn: &Connection, email: &str, display_name: &str, password: &str, role: Role) {
    match users_db_operations::create_user(conn, email, display_name, password, role) {
        Ok(id) => println!("✅ {} '{}' created with id {}.", role, email, id),
        Err(UserDbError::DuplicateEmail(email)) => eprintln!("❌ Error: A user with email '{}' already exists.", email),
        Err(e) => eprintln!("❌ Error creating user: {}", e),
    }
}

fn list_users(conn: &Connection) {
    match users_db_operations::read_all_users(conn) {
        Ok(users) => {
            println!("Listing users:");
            for user in users {
                let status = if user.is_active { "" } else { " (suspended)" };
                println!("- [{}] {} <{}>{}", user.role, user.display_name, user.email, status);
            }
        }
        Err(e) => eprintln!("❌ Error fetching users: {}", e),
    }
}

fn set_role(conn: &Connection, email: &str, role: Role) {
    let user = match users_db_operations::read_user_by_email(conn, email) {
        Ok(Some(user)) => user,
        Ok(None) => {
            eprintln!("❌ Error: No user with email '{}' found.", email);
            return;
        }
        Err(e) => {
            eprintln!("❌ Error reading user: {}", e);
            return;
        }
    };
    match users_db_operations::update_role(conn, user.id, role) {
        Ok(_) => println!("✅ '{}' is now {} (was {}).", user.email, role, user.role),
        Err(e) => eprintln!("❌ Error updating role: {}", e),
    }
}

fn change_password(conn: &Connection, email: &str, new_password: &str) {
    match users_db_operations::update_password(conn, email, new_password) {
        Ok(false) => eprintln!("❌ Error: No user with email '{}' found.", email),
        Ok(true) => println!("✅ Password for '{}' changed successfully.", email),
        Err(e) => eprintln!("❌ Error updating password: {}", e),
    }
}
