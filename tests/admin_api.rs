mod common;

use actix_session::{storage::CookieSessionStore, SessionMiddleware};
use actix_web::{cookie::Cookie, cookie::Key, http::StatusCode, test, web, App};
use common::{draft, publish, shared_articles_db, shared_users_pool};
use newsroom_backend::config::{Config, WebConfig};
use newsroom_backend::models::db_operations::users_db_operations;
use newsroom_backend::models::{Category, Locale, Role};
use newsroom_backend::routes;
use serde_json::json;
use tera::Tera;

const PASSWORD: &str = "correct-horse";

fn test_config() -> Config {
    Config {
        web: WebConfig { host: "127.0.0.1".into(), port: 0 },
        database_path: std::env::temp_dir().to_string_lossy().into_owned(),
        allowed_origins: "*".into(),
        log_level: "warn".into(),
        session_secret_key: "ab".repeat(64),
        admin_url_prefix: "desk".into(),
        use_secure_cookies: false,
        admin_login_accept_ip: "*".into(),
        trust_forwarded_for: false,
        page_size: 12,
        search_debounce_ms: 300,
    }
}

/// Public JSON login at `/api/auth/login`, management API under `/desk/api`.
macro_rules! admin_app {
    ($db:expr, $pool:expr) => {
        test::init_service(
            App::new()
                .wrap(SessionMiddleware::new(CookieSessionStore::default(), Key::generate()))
                .app_data(web::Data::new(test_config()))
                .app_data(web::Data::new(Tera::new("templates/**/*.html").unwrap()))
                .app_data($db.clone())
                .app_data($pool.clone())
                .configure(routes::public::config_api)
                .service(
                    web::scope("/desk")
                        .configure(routes::admin::config_api)
                        .configure(routes::admin::config_dashboard),
                ),
        )
        .await
    };
}

fn add_user(pool: &newsroom_backend::DbPool, email: &str, role: Role) -> i64 {
    let conn = pool.get().unwrap();
    users_db_operations::create_user(&conn, email, "Staff", PASSWORD, role).unwrap()
}

/// Logs in through the JSON endpoint and yields the session cookie.
macro_rules! sign_in {
    ($app:expr, $email:expr) => {{
        let req = test::TestRequest::post()
            .uri("/api/auth/login")
            .set_json(json!({ "email": $email, "password": PASSWORD }))
            .to_request();
        let resp = test::call_service(&$app, req).await;
        assert_eq!(resp.status(), StatusCode::OK, "login failed for {}", $email);
        let cookie: Cookie<'static> = resp.response().cookies().next().expect("session cookie").into_owned();
        cookie
    }};
}

#[actix_web::test]
async fn management_api_requires_a_session() {
    let db = shared_articles_db();
    let pool = shared_users_pool();
    let app = admin_app!(db, pool);

    let req = test::TestRequest::get().uri("/desk/api/articles").to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::UNAUTHORIZED);

    let req = test::TestRequest::get().uri("/desk/dashboard").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::FOUND);
    assert_eq!(resp.headers().get("location").unwrap(), "/management/desk/login");
}

#[actix_web::test]
async fn viewers_are_kept_out_of_management() {
    let db = shared_articles_db();
    let pool = shared_users_pool();
    add_user(&pool, "reader@news.io", Role::Viewer);
    let app = admin_app!(db, pool);
    let cookie = sign_in!(app, "reader@news.io");

    let req = test::TestRequest::get().uri("/desk/api/articles").cookie(cookie.clone()).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::FORBIDDEN);

    let req = test::TestRequest::get().uri("/desk/dashboard").cookie(cookie).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::FOUND);
}

#[actix_web::test]
async fn editors_cannot_use_admin_capabilities() {
    let db = shared_articles_db();
    let pool = shared_users_pool();
    let article = publish(&db, draft(Locale::En, "Keep me", Category::General, "Body."), 0);
    add_user(&pool, "editor@news.io", Role::Editor);
    let app = admin_app!(db, pool);
    let cookie = sign_in!(app, "editor@news.io");

    let req = test::TestRequest::get().uri("/desk/api/articles").cookie(cookie.clone()).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);

    let req = test::TestRequest::get().uri("/desk/dashboard").cookie(cookie.clone()).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);

    let req = test::TestRequest::delete()
        .uri(&format!("/desk/api/articles/{}", article.id))
        .cookie(cookie.clone())
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::FORBIDDEN);

    let req = test::TestRequest::get().uri("/desk/api/users").cookie(cookie).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::FORBIDDEN);
}

#[actix_web::test]
async fn demoted_admin_loses_access_on_next_request() {
    let db = shared_articles_db();
    let pool = shared_users_pool();
    add_user(&pool, "chief@news.io", Role::Admin);
    let deputy = add_user(&pool, "deputy@news.io", Role::Admin);
    let target = add_user(&pool, "target@news.io", Role::Editor);
    let app = admin_app!(db, pool);
    let cookie = sign_in!(app, "deputy@news.io");

    let req = test::TestRequest::get().uri("/desk/api/users").cookie(cookie.clone()).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);

    users_db_operations::update_role(&pool.get().unwrap(), deputy, Role::Editor).unwrap();

    let req = test::TestRequest::delete()
        .uri(&format!("/desk/api/users/{}", target))
        .cookie(cookie.clone())
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::FORBIDDEN);

    users_db_operations::update_role(&pool.get().unwrap(), deputy, Role::Viewer).unwrap();
    let req = test::TestRequest::get().uri("/desk/api/articles").cookie(cookie.clone()).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::FORBIDDEN);

    let req = test::TestRequest::get().uri("/desk/dashboard").cookie(cookie).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::FOUND);
    assert_eq!(resp.headers().get("location").unwrap(), "/management/desk/login");

    assert!(users_db_operations::read_user_by_id(&pool.get().unwrap(), target).unwrap().is_some());
}

#[actix_web::test]
async fn suspended_or_deleted_accounts_are_signed_out() {
    let db = shared_articles_db();
    let pool = shared_users_pool();
    add_user(&pool, "chief@news.io", Role::Admin);
    let deputy = add_user(&pool, "deputy@news.io", Role::Admin);
    let editor = add_user(&pool, "editor@news.io", Role::Editor);
    let target = add_user(&pool, "target@news.io", Role::Editor);
    let app = admin_app!(db, pool);
    let deputy_cookie = sign_in!(app, "deputy@news.io");
    let editor_cookie = sign_in!(app, "editor@news.io");

    users_db_operations::set_active(&pool.get().unwrap(), deputy, false).unwrap();
    let req = test::TestRequest::delete()
        .uri(&format!("/desk/api/users/{}", target))
        .cookie(deputy_cookie.clone())
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::UNAUTHORIZED);

    let req = test::TestRequest::get().uri("/api/auth/me").cookie(deputy_cookie).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::UNAUTHORIZED);

    users_db_operations::delete_user(&pool.get().unwrap(), editor).unwrap();
    let req = test::TestRequest::get().uri("/desk/api/articles").cookie(editor_cookie).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::UNAUTHORIZED);

    assert!(users_db_operations::read_user_by_id(&pool.get().unwrap(), target).unwrap().is_some());
}
