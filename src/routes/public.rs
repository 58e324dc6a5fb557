use crate::config::Config;
use crate::helper::comment_helpers::{self, CommentError, NewComment};
use crate::helper::filter_helpers::{needs_server_search, FilterState, MIN_SEARCH_CHARS};
use crate::helper::public_helpers::{self, PublicHelperError, MAX_PAGES};
use crate::middleware::{start_user_session, OptionalUser};
use crate::models::{Locale, Requester, VoteValue};
use crate::routes::{api_created, api_error, api_ok, internal_error};
use crate::DbPool;
use actix_session::Session;
use actix_web::{http::StatusCode, web, HttpResponse, Responder};
use chrono::Utc;
use redb::Database;
use serde::Deserialize;
use serde_json::json;

#[derive(Deserialize)]
pub struct ListingQuery {
    category: Option<String>,
    country: Option<String>,
    range: Option<String>,
    video: Option<String>,
    q: Option<String>,
    pages: Option<usize>,
}

#[derive(Deserialize)]
pub struct SearchQuery {
    q: Option<String>,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    email: String,
    password: String,
}

#[derive(Deserialize)]
pub struct VoteRequest {
    value: i8,
    guest_session_id: Option<String>,
}

#[derive(Deserialize)]
pub struct CommentEditRequest {
    content: String,
    guest_session_id: Option<String>,
}

#[derive(Deserialize)]
pub struct GuestQuery {
    guest_session_id: Option<String>,
}

pub fn config_api(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .route("/is_server_active", web::get().to(is_server_active))
            .route("/auth/login", web::post().to(login))
            .route("/auth/logout", web::post().to(logout))
            .route("/auth/me", web::get().to(current_user))
            .route("/articles/{id}", web::get().to(get_article))
            .route("/articles/{id}/view", web::post().to(record_view))
            .route("/articles/{id}/vote", web::post().to(vote))
            .route("/articles/{id}/comments", web::get().to(list_comments))
            .route("/articles/{id}/comments", web::post().to(post_comment))
            .route("/comments/{id}", web::put().to(edit_comment))
            .route("/comments/{id}", web::delete().to(delete_comment))
            .route("/book-reviews/{id}", web::get().to(get_book_review))
            .route("/{locale}/articles", web::get().to(list_articles))
            .route("/{locale}/articles/search", web::get().to(search_articles))
            .route("/{locale}/book-reviews", web::get().to(list_book_reviews)),
    );
}

fn parse_locale(raw: &str) -> Result<Locale, HttpResponse> {
    raw.parse::<Locale>()
        .map_err(|_| api_error(StatusCode::NOT_FOUND, format!("Unknown locale '{}'.", raw)))
}

/// Signed-in users act as themselves; anonymous callers need a guest session id.
fn requester_for(user: &OptionalUser, guest_session_id: Option<&str>) -> Option<Requester> {
    match (&user.0, guest_session_id.map(str::trim)) {
        (Some(user), _) => Some(user.requester()),
        (None, Some(session_id)) if !session_id.is_empty() => {
            Some(Requester::Guest { session_id: session_id.to_string() })
        }
        _ => None,
    }
}

pub(crate) fn comment_error_response(err: CommentError) -> HttpResponse {
    match err {
        CommentError::ArticleNotFound | CommentError::NotFound | CommentError::ParentNotFound => {
            api_error(StatusCode::NOT_FOUND, err.to_string())
        }
        CommentError::Forbidden => api_error(StatusCode::FORBIDDEN, err.to_string()),
        CommentError::NestedReply
        | CommentError::ParentArticleMismatch
        | CommentError::EmptyContent
        | CommentError::TooLong
        | CommentError::MissingGuestIdentity => api_error(StatusCode::BAD_REQUEST, err.to_string()),
        other => internal_error("Comment operation failed", other),
    }
}

async fn is_server_active() -> impl Responder {
    HttpResponse::Ok().body("active")
}

async fn login(
    session: Session,
    pool: web::Data<DbPool>,
    payload: web::Json<LoginRequest>,
) -> impl Responder {
    match public_helpers::verify_user_credentials(&pool, &payload.email, &payload.password) {
        Some(profile) => match start_user_session(&session, &profile) {
            Ok(()) => api_ok(profile),
            Err(e) => internal_error("Failed to start session", e),
        },
        None => api_error(StatusCode::UNAUTHORIZED, "Invalid credentials or account suspended."),
    }
}

async fn logout(session: Session) -> impl Responder {
    session.purge();
    api_ok(json!({ "logged_out": true }))
}

async fn current_user(user: OptionalUser) -> impl Responder {
    match user.0 {
        Some(user) => api_ok(user),
        None => api_error(StatusCode::UNAUTHORIZED, "Not logged in."),
    }
}

async fn list_articles(
    locale: web::Path<String>,
    query: web::Query<ListingQuery>,
    db: web::Data<Database>,
    config: web::Data<Config>,
) -> impl Responder {
    let locale = match parse_locale(&locale) {
        Ok(locale) => locale,
        Err(response) => return response,
    };
    let state = FilterState::from_params(
        query.category.as_deref(),
        query.country.as_deref(),
        query.range.as_deref(),
        query.video.as_deref(),
        query.q.as_deref(),
    );
    let pages = query.pages.unwrap_or(1).clamp(1, MAX_PAGES);

    match public_helpers::fetch_article_page(&db, locale, state, pages, config.page_size, Utc::now()) {
        Ok(page) => api_ok(page),
        Err(e) => internal_error("Failed to list articles", e),
    }
}

async fn search_articles(
    locale: web::Path<String>,
    query: web::Query<SearchQuery>,
    db: web::Data<Database>,
) -> impl Responder {
    let locale = match parse_locale(&locale) {
        Ok(locale) => locale,
        Err(response) => return response,
    };
    let q = query.q.as_deref().unwrap_or_default().trim();
    if !needs_server_search(q) {
        return api_error(
            StatusCode::BAD_REQUEST,
            format!("Search queries need at least {} characters.", MIN_SEARCH_CHARS),
        );
    }
    match public_helpers::search_articles(&db, locale, q, Utc::now()) {
        Ok(results) => api_ok(results),
        Err(e) => internal_error("Search failed", e),
    }
}

async fn get_article(id: web::Path<String>, user: OptionalUser, db: web::Data<Database>) -> impl Responder {
    match public_helpers::fetch_article_view(&db, &id, user.role(), Utc::now()) {
        Ok(Some(view)) => api_ok(view),
        Ok(None) => api_error(StatusCode::NOT_FOUND, "Article not found."),
        Err(e) => internal_error("Failed to read article", e),
    }
}

async fn record_view(id: web::Path<String>, db: web::Data<Database>) -> impl Responder {
    match public_helpers::record_view(&db, &id, Utc::now()) {
        Ok(engagement) => api_ok(engagement),
        Err(PublicHelperError::NotFound) => api_error(StatusCode::NOT_FOUND, "Article not found."),
        Err(e) => internal_error("Failed to record view", e),
    }
}

async fn vote(
    id: web::Path<String>,
    user: OptionalUser,
    payload: web::Json<VoteRequest>,
    db: web::Data<Database>,
    pool: web::Data<DbPool>,
) -> impl Responder {
    let value = match VoteValue::from_i8(payload.value) {
        Some(value) => value,
        None => return api_error(StatusCode::BAD_REQUEST, "Vote value must be 1 or -1."),
    };
    let requester = match requester_for(&user, payload.guest_session_id.as_deref()) {
        Some(requester) => requester,
        None => return api_error(StatusCode::BAD_REQUEST, "A guest session id is required to vote."),
    };

    match public_helpers::cast_vote(&db, &pool, &id, &requester, value, Utc::now()) {
        Ok(engagement) => api_ok(engagement),
        Err(PublicHelperError::NotFound) => api_error(StatusCode::NOT_FOUND, "Article not found."),
        Err(e) => internal_error("Failed to record vote", e),
    }
}

async fn list_comments(
    id: web::Path<String>,
    user: OptionalUser,
    db: web::Data<Database>,
    pool: web::Data<DbPool>,
) -> impl Responder {
    let conn = match pool.get() {
        Ok(conn) => conn,
        Err(e) => return internal_error("Database pool error", e),
    };
    match comment_helpers::list_visible_threads(&db, &conn, &id, user.role(), Utc::now()) {
        Ok(threads) => api_ok(threads),
        Err(e) => comment_error_response(e),
    }
}

async fn post_comment(
    id: web::Path<String>,
    user: OptionalUser,
    payload: web::Json<NewComment>,
    db: web::Data<Database>,
    pool: web::Data<DbPool>,
) -> impl Responder {
    let submission = payload.into_inner();
    let requester = match requester_for(&user, submission.guest_session_id.as_deref()) {
        Some(requester) => requester,
        None => return comment_error_response(CommentError::MissingGuestIdentity),
    };
    let conn = match pool.get() {
        Ok(conn) => conn,
        Err(e) => return internal_error("Database pool error", e),
    };
    match comment_helpers::post_comment(&db, &conn, &id, &requester, submission, Utc::now()) {
        Ok(comment) => api_created(comment),
        Err(e) => comment_error_response(e),
    }
}

async fn edit_comment(
    id: web::Path<String>,
    user: OptionalUser,
    payload: web::Json<CommentEditRequest>,
    pool: web::Data<DbPool>,
) -> impl Responder {
    let requester = match requester_for(&user, payload.guest_session_id.as_deref()) {
        Some(requester) => requester,
        None => return comment_error_response(CommentError::Forbidden),
    };
    let conn = match pool.get() {
        Ok(conn) => conn,
        Err(e) => return internal_error("Database pool error", e),
    };
    match comment_helpers::edit_comment(&conn, &id, &requester, &payload.content, Utc::now()) {
        Ok(comment) => api_ok(comment),
        Err(e) => comment_error_response(e),
    }
}

async fn delete_comment(
    id: web::Path<String>,
    user: OptionalUser,
    query: web::Query<GuestQuery>,
    pool: web::Data<DbPool>,
) -> impl Responder {
    let requester = match requester_for(&user, query.guest_session_id.as_deref()) {
        Some(requester) => requester,
        None => return comment_error_response(CommentError::Forbidden),
    };
    let conn = match pool.get() {
        Ok(conn) => conn,
        Err(e) => return internal_error("Database pool error", e),
    };
    match comment_helpers::delete_comment(&conn, &id, &requester) {
        Ok(removed) => api_ok(json!({ "removed": removed })),
        Err(e) => comment_error_response(e),
    }
}

async fn list_book_reviews(locale: web::Path<String>, db: web::Data<Database>) -> impl Responder {
    let locale = match parse_locale(&locale) {
        Ok(locale) => locale,
        Err(response) => return response,
    };
    match public_helpers::fetch_book_reviews(&db, locale) {
        Ok(reviews) => api_ok(reviews),
        Err(e) => internal_error("Failed to list book reviews", e),
    }
}

async fn get_book_review(id: web::Path<String>, user: OptionalUser, db: web::Data<Database>) -> impl Responder {
    match public_helpers::fetch_book_review(&db, &id, user.role()) {
        Ok(Some(review)) => api_ok(review),
        Ok(None) => api_error(StatusCode::NOT_FOUND, "Book review not found."),
        Err(e) => internal_error("Failed to read book review", e),
    }
}
