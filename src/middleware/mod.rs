use crate::config::Config;
use crate::models::db_operations::users_db_operations;
use crate::models::{Requester, Role, UserProfile};
use crate::DbPool;
use actix_session::{Session, SessionExt, SessionInsertError};
use actix_web::{
    body::EitherBody,
    dev::{self, forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    guard, web, Error, FromRequest, HttpRequest, HttpResponse,
};
use futures_util::future::{ok, LocalBoxFuture, Ready};
use serde::Serialize;
use serde_json::json;
use std::future::{ready, Ready as StdReady};

const SESSION_USER_ID: &str = "user_id";
const SESSION_ROLE: &str = "role";

/// The signed-in user, as currently stored in the users table.
#[derive(Debug, Clone, Serialize)]
pub struct AuthenticatedUser {
    pub user_id: i64,
    pub email: String,
    pub role: Role,
    pub display_name: String,
}

impl AuthenticatedUser {
    pub fn requester(&self) -> Requester {
        Requester::User { user_id: self.user_id, role: self.role }
    }
}

impl From<UserProfile> for AuthenticatedUser {
    fn from(profile: UserProfile) -> Self {
        AuthenticatedUser {
            user_id: profile.id,
            email: profile.email,
            role: profile.role,
            display_name: profile.display_name,
        }
    }
}

/// Resolves the session's account against the users table. The session only carries the
/// user id; role and active flag are read fresh on every call. Sessions whose account is
/// gone or suspended are purged.
pub fn current_user(session: &Session, pool: Option<&DbPool>) -> Option<AuthenticatedUser> {
    let user_id = session.get::<i64>(SESSION_USER_ID).ok()??;
    let pool = match pool {
        Some(pool) => pool,
        None => {
            log::error!("Users database is not registered; session {} treated as anonymous.", user_id);
            return None;
        }
    };
    let stored = match pool.get() {
        Ok(conn) => users_db_operations::read_user_by_id(&conn, user_id),
        Err(e) => {
            log::error!("Database pool error while loading session user: {}", e);
            return None;
        }
    };

    match stored {
        Ok(Some(profile)) if profile.is_active => {
            if session_role(session) != Some(profile.role) {
                if let Err(e) = session.insert(SESSION_ROLE, profile.role.as_str()) {
                    log::warn!("Failed to refresh session role for user {}: {}", user_id, e);
                }
            }
            Some(AuthenticatedUser::from(profile))
        }
        Ok(_) => {
            log::warn!("Ending session of missing or suspended user {}", user_id);
            session.purge();
            None
        }
        Err(e) => {
            log::error!("Failed to load session user {}: {}", user_id, e);
            None
        }
    }
}

fn user_for_request(req: &HttpRequest) -> Option<AuthenticatedUser> {
    let pool = req.app_data::<web::Data<DbPool>>();
    current_user(&req.get_session(), pool.map(|data| data.get_ref()))
}

impl FromRequest for AuthenticatedUser {
    type Error = actix_web::Error;
    type Future = StdReady<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut dev::Payload) -> Self::Future {
        match user_for_request(req) {
            Some(user) => ready(Ok(user)),
            None => ready(Err(actix_web::error::ErrorUnauthorized("Not logged in."))),
        }
    }
}

/// Like `AuthenticatedUser`, but anonymous requests are let through as `None`.
pub struct OptionalUser(pub Option<AuthenticatedUser>);

impl OptionalUser {
    pub fn role(&self) -> Option<Role> {
        self.0.as_ref().map(|user| user.role)
    }
}

impl FromRequest for OptionalUser {
    type Error = actix_web::Error;
    type Future = StdReady<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut dev::Payload) -> Self::Future {
        ready(Ok(OptionalUser(user_for_request(req))))
    }
}

pub fn start_user_session(session: &Session, profile: &UserProfile) -> Result<(), SessionInsertError> {
    session.renew();
    session.insert(SESSION_USER_ID, profile.id)?;
    session.insert(SESSION_ROLE, profile.role.as_str())?;
    Ok(())
}

fn session_role(session: &Session) -> Option<Role> {
    session
        .get::<String>(SESSION_ROLE)
        .unwrap_or(None)
        .and_then(|role| role.parse::<Role>().ok())
}

/// Client address. `X-Forwarded-For` is only honoured when the server is configured to
/// sit behind a reverse proxy; otherwise the socket peer is used.
fn request_ip(head: &dev::RequestHead, trust_forwarded_for: bool) -> Option<String> {
    let forwarded = if trust_forwarded_for {
        head.headers()
            .get("X-Forwarded-For")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.split(',').next())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    } else {
        None
    };
    forwarded.or_else(|| head.peer_addr.map(|addr| addr.ip().to_string()))
}

/// Lets the request through only from addresses on the configured admin allow-list.
pub fn ip_guard(config: &Config, ctx: &guard::GuardContext) -> bool {
    let peer_addr = match request_ip(ctx.head(), config.trust_forwarded_for) {
        Some(ip) => ip,
        None => {
            log::warn!("Could not determine peer IP address for admin login attempt.");
            return false;
        }
    };

    let is_allowed = config.admin_ip_allowed(&peer_addr);
    if !is_allowed {
        log::warn!("Blocked admin access attempt from unauthorized IP: {}", peer_addr);
    }
    is_allowed
}

/// Rejects requests whose stored role is below `minimum` with a JSON 401/403. Missing or
/// suspended accounts get a 401.
pub struct RequireRole {
    minimum: Role,
}

impl RequireRole {
    pub fn new(minimum: Role) -> Self {
        RequireRole { minimum }
    }
}

impl<S, B> Transform<S, ServiceRequest> for RequireRole
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type InitError = ();
    type Transform = RequireRoleMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(RequireRoleMiddleware { service, minimum: self.minimum })
    }
}

pub struct RequireRoleMiddleware<S> {
    service: S,
    minimum: Role,
}

impl<S, B> Service<ServiceRequest> for RequireRoleMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let role = {
            let pool = req.app_data::<web::Data<DbPool>>();
            current_user(&req.get_session(), pool.map(|data| data.get_ref())).map(|user| user.role)
        };

        match role {
            Some(role) if crate::models::has_capability(role, self.minimum) => {
                let fut = self.service.call(req);
                Box::pin(async move {
                    let res = fut.await?;
                    Ok(res.map_into_left_body())
                })
            }
            other => {
                let minimum = self.minimum;
                Box::pin(async move {
                    let (http_req, _payload) = req.into_parts();
                    let res = match other {
                        None => HttpResponse::Unauthorized()
                            .json(json!({ "success": false, "error": "Not logged in." })),
                        Some(role) => {
                            log::warn!("Role '{}' denied access to {} (needs '{}')", role, http_req.path(), minimum);
                            HttpResponse::Forbidden()
                                .json(json!({ "success": false, "error": "Permission denied." }))
                        }
                    };
                    Ok(ServiceResponse::new(http_req, res.map_into_right_body()))
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;
    use std::net::SocketAddr;

    fn forwarded_request() -> HttpRequest {
        let peer: SocketAddr = "10.0.0.7:51000".parse().unwrap();
        TestRequest::default()
            .peer_addr(peer)
            .insert_header(("X-Forwarded-For", "127.0.0.1, 10.0.0.1"))
            .to_http_request()
    }

    #[test]
    fn forwarded_header_is_ignored_unless_trusted() {
        let req = forwarded_request();
        assert_eq!(request_ip(req.head(), false).as_deref(), Some("10.0.0.7"));
        assert_eq!(request_ip(req.head(), true).as_deref(), Some("127.0.0.1"));
    }

    #[test]
    fn missing_peer_and_header_yields_none() {
        let req = TestRequest::default().to_http_request();
        assert_eq!(request_ip(req.head(), true), None);
    }
}
