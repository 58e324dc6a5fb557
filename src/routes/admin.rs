use crate::config::Config;
use crate::helper::admin_helpers::{self, AdminHelperError};
use crate::helper::editor_helpers::{self, EditorHelperError};
use crate::helper::public_helpers;
use crate::middleware::{current_user, start_user_session, AuthenticatedUser, OptionalUser, RequireRole};
use crate::models::db_operations::articles_db_operations::DbError;
use crate::models::db_operations::users_db_operations::UserDbError;
use crate::models::{
    ArticleAutosave, ArticleDraft, ArticleStatus, BookReviewDraft, Capability, Locale, Notification,
    Role,
};
use crate::routes::{api_created, api_error, api_ok, internal_error};
use crate::DbPool;
use actix_csrf::extractor::{Csrf, CsrfGuarded, CsrfToken};
use actix_session::Session;
use actix_web::{http::StatusCode, web, HttpResponse, Responder};
use chrono::Utc;
use redb::Database;
use serde::Deserialize;
use serde_json::json;
use tera::{Context, Tera};

#[derive(Deserialize)]
struct LoginForm {
    csrf_token: CsrfToken,
    email: String,
    password: String,
}

impl CsrfGuarded for LoginForm {
    fn csrf_token(&self) -> &CsrfToken {
        &self.csrf_token
    }
}

#[derive(Deserialize)]
struct LocaleQuery {
    locale: Option<Locale>,
}

#[derive(Deserialize)]
struct StatusRequest {
    status: ArticleStatus,
}

#[derive(Deserialize)]
struct ImportRequest {
    raw: String,
    locale: Locale,
    group_id: Option<String>,
}

#[derive(Deserialize)]
struct NewUserRequest {
    email: String,
    display_name: String,
    password: String,
    role: Role,
}

#[derive(Deserialize)]
struct RoleRequest {
    role: Role,
}

#[derive(Deserialize)]
struct ActiveRequest {
    is_active: bool,
}

pub fn config_login(cfg: &mut web::ServiceConfig) {
    cfg.route("/login", web::get().to(show_admin_login_form))
        .route("/login", web::post().to(handle_admin_login))
        .route("/logout", web::post().to(handle_admin_logout));
}

pub fn config_dashboard(cfg: &mut web::ServiceConfig) {
    cfg.route("/dashboard", web::get().to(show_admin_dashboard));
}

pub fn config_api(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .wrap(RequireRole::new(Role::Editor))
            .route("/articles", web::get().to(list_articles_action))
            .route("/articles", web::post().to(create_article_action))
            .route("/articles/import", web::post().to(import_article_action))
            .route("/articles/{id}", web::get().to(get_article_action))
            .route("/articles/{id}", web::put().to(update_article_action))
            .route("/articles/{id}", web::delete().to(delete_article_action))
            .route("/articles/{id}/autosave", web::post().to(autosave_article_action))
            .route("/articles/{id}/status", web::post().to(change_status_action))
            .route("/book-reviews", web::get().to(list_book_reviews_action))
            .route("/book-reviews", web::post().to(create_book_review_action))
            .route("/book-reviews/{id}", web::put().to(update_book_review_action))
            .route("/book-reviews/{id}", web::delete().to(delete_book_review_action))
            .route("/users", web::get().to(list_users_action))
            .route("/users", web::post().to(create_user_action))
            .route("/users/{id}/role", web::put().to(change_role_action))
            .route("/users/{id}/active", web::put().to(set_active_action))
            .route("/users/{id}", web::delete().to(delete_user_action)),
    );
}

fn require(user: &AuthenticatedUser, capability: Capability) -> Result<(), HttpResponse> {
    if user.role.can(capability) {
        Ok(())
    } else {
        log::warn!("User {} ({}) lacks {:?}", user.email, user.role, capability);
        Err(api_error(StatusCode::FORBIDDEN, "Permission denied."))
    }
}

fn editor_error_response(err: EditorHelperError) -> HttpResponse {
    match err {
        EditorHelperError::Validation(msg) => api_error(StatusCode::BAD_REQUEST, msg),
        EditorHelperError::NotFound | EditorHelperError::Database(DbError::NotFound(_)) => {
            api_error(StatusCode::NOT_FOUND, "Item not found.")
        }
        EditorHelperError::InvalidTransition { .. } => api_error(StatusCode::CONFLICT, err.to_string()),
        EditorHelperError::Database(DbError::Conflict(msg)) => api_error(StatusCode::CONFLICT, msg),
        other => internal_error("Editor operation failed", other),
    }
}

fn admin_error_response(err: AdminHelperError) -> HttpResponse {
    match err {
        AdminHelperError::Validation(msg) => api_error(StatusCode::BAD_REQUEST, msg),
        AdminHelperError::NotFound => api_error(StatusCode::NOT_FOUND, "User not found."),
        AdminHelperError::SelfRoleChange | AdminHelperError::LastAdmin => {
            api_error(StatusCode::CONFLICT, err.to_string())
        }
        AdminHelperError::Database(UserDbError::DuplicateEmail(_)) => {
            api_error(StatusCode::CONFLICT, err.to_string())
        }
        other => internal_error("User management failed", other),
    }
}

// --- Login / dashboard pages ---

/// Viewers hold accounts for the public site only.
fn may_enter_management(role: Role) -> bool {
    role.can(Capability::EditArticles)
}

async fn show_admin_login_form(
    session: Session,
    tera: web::Data<Tera>,
    token: CsrfToken,
    pool: web::Data<DbPool>,
    config: web::Data<Config>,
) -> impl Responder {
    let admin_url_prefix = &config.admin_url_prefix;
    if current_user(&session, Some(pool.get_ref())).map_or(false, |user| may_enter_management(user.role)) {
        let dashboard_url = format!("/management/{}/dashboard", admin_url_prefix);
        return HttpResponse::Found().append_header(("location", dashboard_url)).finish();
    }

    let mut ctx = Context::new();
    ctx.insert("admin_url_prefix", admin_url_prefix);
    ctx.insert("csrf_token", token.get());

    if let Ok(Some(error)) = session.get::<String>("error") {
        ctx.insert("error", &error);
        session.remove("error");
    }

    match tera.render("admin/login.html", &ctx) {
        Ok(rendered) => HttpResponse::Ok().content_type("text/html; charset=utf-8").body(rendered),
        Err(err) => {
            log::error!("Template rendering error: {}", err);
            HttpResponse::InternalServerError().body("Template error")
        }
    }
}

async fn handle_admin_login(
    session: Session,
    pool: web::Data<DbPool>,
    form: Csrf<web::Form<LoginForm>>,
    config: web::Data<Config>,
) -> impl Responder {
    let admin_url_prefix = &config.admin_url_prefix;
    let login_url = format!("/management/{}/login", admin_url_prefix);
    let dashboard_url = format!("/management/{}/dashboard", admin_url_prefix);

    let login_data = form.into_inner();

    let message = match public_helpers::verify_user_credentials(&pool, &login_data.email, &login_data.password) {
        Some(profile) if may_enter_management(profile.role) => {
            match start_user_session(&session, &profile) {
                Ok(()) => {
                    log::info!("{} '{}' signed in to the management area", profile.role, profile.email);
                    let welcome = Notification {
                        message: format!("Welcome back, {}.", profile.display_name),
                        r#type: "success".to_string(),
                    };
                    if let Err(e) = session.insert("notification", &welcome) {
                        log::warn!("Failed to store notification in session: {}", e);
                    }
                    return HttpResponse::Found().append_header(("location", dashboard_url)).finish();
                }
                Err(e) => {
                    log::error!("Failed to start session: {}", e);
                    "Could not start a session. Please try again."
                }
            }
        }
        Some(_) => "Access denied. Only editors and administrators may log in here.",
        None => "Invalid credentials or account suspended.",
    };

    if let Err(e) = session.insert("error", message) {
        log::error!("Failed to store login error in session: {}", e);
    }
    HttpResponse::Found().append_header(("location", login_url)).finish()
}

async fn handle_admin_logout(session: Session, config: web::Data<Config>) -> impl Responder {
    let login_url = format!("/management/{}/login", &config.admin_url_prefix);
    session.purge();
    HttpResponse::Found().append_header(("location", login_url)).finish()
}

async fn show_admin_dashboard(
    user: OptionalUser,
    session: Session,
    tera: web::Data<Tera>,
    pool: web::Data<DbPool>,
    db: web::Data<Database>,
    config: web::Data<Config>,
) -> impl Responder {
    let auth_user = match user.0 {
        Some(user) if may_enter_management(user.role) => user,
        other => {
            if let Some(user) = other {
                log::warn!("'{}' lost management access (now {}); sending back to login", user.email, user.role);
            }
            let login_url = format!("/management/{}/login", &config.admin_url_prefix);
            return HttpResponse::Found().append_header(("location", login_url)).finish();
        }
    };

    let mut ctx = Context::new();
    ctx.insert("admin_url_prefix", &config.admin_url_prefix);
    ctx.insert("user", &auth_user);
    ctx.insert("capabilities", &auth_user.role.capabilities());
    ctx.insert("is_admin", &auth_user.role.can(Capability::ManageUsers));

    if let Ok(Some(notification)) = session.get::<Notification>("notification") {
        ctx.insert("notification", &notification);
        session.remove("notification");
    }

    let mut articles = Vec::new();
    let mut reviews = Vec::new();
    for locale in [Locale::En, Locale::Ar] {
        match editor_helpers::list_for_editing(&db, locale) {
            Ok(found) => articles.extend(found),
            Err(e) => log::error!("Failed to fetch {} articles for dashboard: {}", locale, e),
        }
        match editor_helpers::list_book_reviews_for_editing(&db, locale) {
            Ok(found) => reviews.extend(found),
            Err(e) => log::error!("Failed to fetch {} book reviews for dashboard: {}", locale, e),
        }
    }
    ctx.insert("articles", &articles);
    ctx.insert("book_reviews", &reviews);

    if auth_user.role.can(Capability::ManageUsers) {
        match admin_helpers::fetch_all_users(&pool) {
            Ok(users) => ctx.insert("users", &users),
            Err(e) => {
                log::error!("Failed to fetch users for admin dashboard: {}", e);
                let notification = Notification {
                    message: "Could not load the user list.".to_string(),
                    r#type: "error".to_string(),
                };
                ctx.insert("notification", &notification);
                ctx.insert("users", &Vec::<String>::new());
            }
        }
    }

    match tera.render("admin/dashboard.html", &ctx) {
        Ok(rendered) => HttpResponse::Ok().content_type("text/html; charset=utf-8").body(rendered),
        Err(err) => {
            log::error!("Template rendering error: {}", err);
            HttpResponse::InternalServerError().body("Error rendering admin dashboard.")
        }
    }
}

// --- Articles ---

async fn list_articles_action(
    auth_user: AuthenticatedUser,
    query: web::Query<LocaleQuery>,
    db: web::Data<Database>,
) -> impl Responder {
    if let Err(response) = require(&auth_user, Capability::ViewDrafts) {
        return response;
    }
    match editor_helpers::list_for_editing(&db, query.locale.unwrap_or(Locale::En)) {
        Ok(articles) => api_ok(articles),
        Err(e) => editor_error_response(e),
    }
}

async fn get_article_action(
    auth_user: AuthenticatedUser,
    id: web::Path<String>,
    db: web::Data<Database>,
) -> impl Responder {
    if let Err(response) = require(&auth_user, Capability::ViewDrafts) {
        return response;
    }
    match editor_helpers::fetch_for_editing(&db, &id) {
        Ok(article) => api_ok(article),
        Err(e) => editor_error_response(e),
    }
}

async fn create_article_action(
    auth_user: AuthenticatedUser,
    payload: web::Json<ArticleDraft>,
    db: web::Data<Database>,
) -> impl Responder {
    if let Err(response) = require(&auth_user, Capability::EditArticles) {
        return response;
    }
    match editor_helpers::create_article(&db, payload.into_inner(), Utc::now()) {
        Ok(article) => api_created(article),
        Err(e) => editor_error_response(e),
    }
}

async fn import_article_action(
    auth_user: AuthenticatedUser,
    payload: web::Json<ImportRequest>,
    db: web::Data<Database>,
) -> impl Responder {
    if let Err(response) = require(&auth_user, Capability::EditArticles) {
        return response;
    }
    let request = payload.into_inner();
    match editor_helpers::import_raw_post(&db, &request.raw, request.locale, request.group_id, Utc::now()) {
        Ok(article) => api_created(article),
        Err(e) => editor_error_response(e),
    }
}

async fn update_article_action(
    auth_user: AuthenticatedUser,
    id: web::Path<String>,
    payload: web::Json<ArticleDraft>,
    db: web::Data<Database>,
) -> impl Responder {
    if let Err(response) = require(&auth_user, Capability::EditArticles) {
        return response;
    }
    match editor_helpers::update_article(&db, &id, payload.into_inner(), Utc::now()) {
        Ok(article) => api_ok(article),
        Err(e) => editor_error_response(e),
    }
}

async fn autosave_article_action(
    auth_user: AuthenticatedUser,
    id: web::Path<String>,
    payload: web::Json<ArticleAutosave>,
    db: web::Data<Database>,
) -> impl Responder {
    if let Err(response) = require(&auth_user, Capability::EditArticles) {
        return response;
    }
    match editor_helpers::autosave_article(&db, &id, payload.into_inner(), Utc::now()) {
        Ok(article) => api_ok(json!({ "id": article.id, "updated_at": article.updated_at })),
        Err(e) => editor_error_response(e),
    }
}

async fn change_status_action(
    auth_user: AuthenticatedUser,
    id: web::Path<String>,
    payload: web::Json<StatusRequest>,
    db: web::Data<Database>,
) -> impl Responder {
    if let Err(response) = require(&auth_user, Capability::PublishArticles) {
        return response;
    }
    match editor_helpers::change_status(&db, &id, payload.status, Utc::now()) {
        Ok(article) => api_ok(article),
        Err(e) => editor_error_response(e),
    }
}

async fn delete_article_action(
    auth_user: AuthenticatedUser,
    id: web::Path<String>,
    db: web::Data<Database>,
    pool: web::Data<DbPool>,
) -> impl Responder {
    if let Err(response) = require(&auth_user, Capability::DeleteArticles) {
        return response;
    }
    match editor_helpers::delete_article(&db, &pool, &id) {
        Ok(true) => api_ok(json!({ "deleted": id.as_str() })),
        Ok(false) => api_error(StatusCode::NOT_FOUND, "Article not found."),
        Err(e) => editor_error_response(e),
    }
}

// --- Book reviews ---

async fn list_book_reviews_action(
    auth_user: AuthenticatedUser,
    query: web::Query<LocaleQuery>,
    db: web::Data<Database>,
) -> impl Responder {
    if let Err(response) = require(&auth_user, Capability::ManageBookReviews) {
        return response;
    }
    match editor_helpers::list_book_reviews_for_editing(&db, query.locale.unwrap_or(Locale::En)) {
        Ok(reviews) => api_ok(reviews),
        Err(e) => editor_error_response(e),
    }
}

async fn create_book_review_action(
    auth_user: AuthenticatedUser,
    payload: web::Json<BookReviewDraft>,
    db: web::Data<Database>,
) -> impl Responder {
    if let Err(response) = require(&auth_user, Capability::ManageBookReviews) {
        return response;
    }
    match editor_helpers::create_book_review(&db, payload.into_inner(), Utc::now()) {
        Ok(review) => api_created(review),
        Err(e) => editor_error_response(e),
    }
}

async fn update_book_review_action(
    auth_user: AuthenticatedUser,
    id: web::Path<String>,
    payload: web::Json<BookReviewDraft>,
    db: web::Data<Database>,
) -> impl Responder {
    if let Err(response) = require(&auth_user, Capability::ManageBookReviews) {
        return response;
    }
    match editor_helpers::update_book_review(&db, &id, payload.into_inner(), Utc::now()) {
        Ok(review) => api_ok(review),
        Err(e) => editor_error_response(e),
    }
}

async fn delete_book_review_action(
    auth_user: AuthenticatedUser,
    id: web::Path<String>,
    db: web::Data<Database>,
) -> impl Responder {
    if let Err(response) = require(&auth_user, Capability::ManageBookReviews) {
        return response;
    }
    match editor_helpers::delete_book_review(&db, &id) {
        Ok(true) => api_ok(json!({ "deleted": id.as_str() })),
        Ok(false) => api_error(StatusCode::NOT_FOUND, "Book review not found."),
        Err(e) => editor_error_response(e),
    }
}

// --- Users ---

async fn list_users_action(auth_user: AuthenticatedUser, pool: web::Data<DbPool>) -> impl Responder {
    if let Err(response) = require(&auth_user, Capability::ManageUsers) {
        return response;
    }
    match admin_helpers::fetch_all_users(&pool) {
        Ok(users) => api_ok(users),
        Err(e) => admin_error_response(e),
    }
}

async fn create_user_action(
    auth_user: AuthenticatedUser,
    payload: web::Json<NewUserRequest>,
    pool: web::Data<DbPool>,
) -> impl Responder {
    if let Err(response) = require(&auth_user, Capability::ManageUsers) {
        return response;
    }
    let request = payload.into_inner();
    match admin_helpers::create_new_user(&pool, &request.email, &request.display_name, &request.password, request.role) {
        Ok(user) => {
            log::info!("User '{}' created by {}", user.email, auth_user.email);
            api_created(user)
        }
        Err(e) => admin_error_response(e),
    }
}

async fn change_role_action(
    auth_user: AuthenticatedUser,
    id: web::Path<i64>,
    payload: web::Json<RoleRequest>,
    pool: web::Data<DbPool>,
) -> impl Responder {
    if let Err(response) = require(&auth_user, Capability::ManageUsers) {
        return response;
    }
    match admin_helpers::change_user_role(&pool, auth_user.user_id, *id, payload.role) {
        Ok(user) => api_ok(user),
        Err(e) => admin_error_response(e),
    }
}

async fn set_active_action(
    auth_user: AuthenticatedUser,
    id: web::Path<i64>,
    payload: web::Json<ActiveRequest>,
    pool: web::Data<DbPool>,
) -> impl Responder {
    if let Err(response) = require(&auth_user, Capability::ManageUsers) {
        return response;
    }
    if *id == auth_user.user_id && !payload.is_active {
        return api_error(StatusCode::CONFLICT, "You cannot suspend your own account.");
    }
    match admin_helpers::set_user_active(&pool, *id, payload.is_active) {
        Ok(()) => api_ok(json!({ "id": *id, "is_active": payload.is_active })),
        Err(e) => admin_error_response(e),
    }
}

async fn delete_user_action(
    auth_user: AuthenticatedUser,
    session: Session,
    id: web::Path<i64>,
    pool: web::Data<DbPool>,
) -> impl Responder {
    if let Err(response) = require(&auth_user, Capability::ManageUsers) {
        return response;
    }
    match admin_helpers::delete_user(&pool, *id) {
        Ok(true) => {
            if *id == auth_user.user_id {
                // The account behind this session is gone.
                session.purge();
            }
            api_ok(json!({ "deleted": *id }))
        }
        Ok(false) => api_error(StatusCode::NOT_FOUND, "User not found."),
        Err(e) => admin_error_response(e),
    }
}
