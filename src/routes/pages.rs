use crate::config::Config;
use crate::helper::comment_helpers;
use crate::helper::filter_helpers::{FilterState, TimeRange};
use crate::helper::public_helpers::{self, MAX_PAGES};
use crate::middleware::OptionalUser;
use crate::models::{Category, Locale};
use crate::DbPool;
use actix_web::{web, HttpResponse, Responder};
use chrono::Utc;
use redb::Database;
use serde::{Deserialize, Serialize};
use tera::{Context, Tera};

#[derive(Deserialize)]
pub struct PageQuery {
    category: Option<String>,
    country: Option<String>,
    range: Option<String>,
    video: Option<String>,
    q: Option<String>,
    pages: Option<usize>,
}

/// Filter values echoed back into the listing form.
#[derive(Serialize)]
struct FilterForm {
    category: Option<&'static str>,
    country: String,
    range: Option<&'static str>,
    video: bool,
    q: String,
}

impl From<&FilterState> for FilterForm {
    fn from(state: &FilterState) -> Self {
        FilterForm {
            category: state.category.map(Category::as_str),
            country: state.country.clone().unwrap_or_default(),
            range: state.time_range.map(TimeRange::as_str),
            video: state.video_only,
            q: state.query.clone(),
        }
    }
}

pub fn config_pages(cfg: &mut web::ServiceConfig) {
    cfg.route("/", web::get().to(root_redirect))
        .route("/{locale}", web::get().to(show_listing))
        .route("/{locale}/articles/{id}", web::get().to(show_article));
}

fn render(tera: &Tera, template: &str, ctx: &Context) -> HttpResponse {
    match tera.render(template, ctx) {
        Ok(rendered) => HttpResponse::Ok().content_type("text/html; charset=utf-8").body(rendered),
        Err(err) => {
            log::error!("Template rendering error in '{}': {}", template, err);
            HttpResponse::InternalServerError().body("Error rendering page.")
        }
    }
}

fn base_context(locale: Locale) -> Context {
    let mut ctx = Context::new();
    ctx.insert("locale", locale.as_str());
    ctx.insert("dir", locale.dir());
    ctx
}

async fn root_redirect() -> impl Responder {
    HttpResponse::Found().append_header(("location", "/en")).finish()
}

async fn show_listing(
    locale: web::Path<String>,
    query: web::Query<PageQuery>,
    db: web::Data<Database>,
    tera: web::Data<Tera>,
    config: web::Data<Config>,
) -> impl Responder {
    let locale = match locale.parse::<Locale>() {
        Ok(locale) => locale,
        Err(_) => return HttpResponse::NotFound().body("Page not found"),
    };
    let state = FilterState::from_params(
        query.category.as_deref(),
        query.country.as_deref(),
        query.range.as_deref(),
        query.video.as_deref(),
        query.q.as_deref(),
    );
    let pages = query.pages.unwrap_or(1).clamp(1, MAX_PAGES);
    let form = FilterForm::from(&state);

    let page = match public_helpers::fetch_article_page(&db, locale, state, pages, config.page_size, Utc::now()) {
        Ok(page) => page,
        Err(e) => {
            log::error!("Failed to load listing page: {}", e);
            return HttpResponse::InternalServerError().body("Error loading articles.");
        }
    };

    let mut ctx = base_context(locale);
    ctx.insert("page", &page);
    ctx.insert("filters", &form);
    ctx.insert("next_pages", &pages.saturating_add(1).min(MAX_PAGES));
    ctx.insert("search_debounce_ms", &(config.search_debounce().as_millis() as u64));
    ctx.insert("categories", &Category::ALL.iter().map(|c| c.as_str()).collect::<Vec<_>>());
    render(&tera, "index.html", &ctx)
}

async fn show_article(
    path: web::Path<(String, String)>,
    user: OptionalUser,
    db: web::Data<Database>,
    pool: web::Data<DbPool>,
    tera: web::Data<Tera>,
) -> impl Responder {
    let (locale, id) = path.into_inner();
    let locale = match locale.parse::<Locale>() {
        Ok(locale) => locale,
        Err(_) => return HttpResponse::NotFound().body("Page not found"),
    };

    let view = match public_helpers::fetch_article_view(&db, &id, user.role(), Utc::now()) {
        Ok(Some(view)) if view.summary.locale == locale => view,
        Ok(_) => return HttpResponse::NotFound().body("Article not found"),
        Err(e) => {
            log::error!("Failed to load article {}: {}", id, e);
            return HttpResponse::InternalServerError().body("Error loading article.");
        }
    };

    let threads = match pool.get() {
        Ok(conn) => comment_helpers::list_threads(&conn, &id).unwrap_or_else(|e| {
            log::error!("Failed to load comments for {}: {}", id, e);
            Vec::new()
        }),
        Err(e) => {
            log::error!("Database pool error: {}", e);
            Vec::new()
        }
    };

    let mut ctx = base_context(locale);
    ctx.insert("article", &view);
    ctx.insert("threads", &threads);
    render(&tera, "article.html", &ctx)
}
