pub mod api;
pub mod auth;
pub mod cli;
pub mod config;
pub mod database;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod services;
pub mod types;
pub mod validation;

use std::any::Any;
use std::sync::Arc;

use axum::{
    http::{HeaderValue, Method},
    middleware::{from_fn, from_fn_with_state},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Router,
};
use sqlx::SqlitePool;
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::{self, AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use tracing::warn;

use crate::config::{AppConfig, Environment};
use crate::error::ApiError;
use crate::middleware::{jwt_auth_middleware, refresh_token_middleware, skip_envelope, unify_response};

/// Shared state handed to every handler and middleware.
#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub fn new(pool: SqlitePool, config: AppConfig) -> Self {
        Self {
            pool,
            config: Arc::new(config),
        }
    }
}

/// The full HTTP application.
pub fn app(state: AppState) -> Router {
    let cors = cors_layer(&state.config);

    Router::new()
        .merge(public_routes(state.clone()))
        .merge(protected_routes(state.clone()))
        .fallback(handlers::not_found)
        .layer(from_fn_with_state(state.clone(), unify_response))
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn public_routes(state: AppState) -> Router<AppState> {
    use handlers::public;

    Router::new()
        .route("/auth/login", post(public::auth_login))
        .route("/ping", get(public::ping).layer(from_fn(skip_envelope)))
        .merge(
            Router::new()
                .route("/auth/refresh", post(public::auth_refresh))
                .route_layer(from_fn_with_state(state, refresh_token_middleware)),
        )
}

fn protected_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .merge(auth_routes())
        .merge(school_routes())
        .merge(student_routes())
        .merge(admin_routes())
        .merge(evaluation_routes())
        .route_layer(from_fn_with_state(state, jwt_auth_middleware))
}

fn auth_routes() -> Router<AppState> {
    use handlers::protected::{auth, profile};

    Router::new()
        .route("/auth/me", get(auth::me))
        .route("/auth/logout", post(auth::logout))
        .route("/profile", put(profile::put))
}

fn school_routes() -> Router<AppState> {
    use handlers::protected::schools;

    Router::new()
        .route("/schools", get(schools::list).post(schools::create))
        .route(
            "/schools/:id",
            get(schools::show).put(schools::update).delete(schools::delete),
        )
}

fn student_routes() -> Router<AppState> {
    use handlers::protected::students;

    Router::new()
        .route("/students", get(students::list).post(students::create))
        .route("/students/stats", get(students::stats))
        // Self-service for the logged-in student
        .route("/students/me/status", get(students::my_status))
        .route("/students/me/eating-status", put(students::set_eating))
        .route(
            "/students/me/leave",
            post(students::apply_leave).delete(students::cancel_leave),
        )
        .route("/students/:id", put(students::update).delete(students::delete))
}

fn admin_routes() -> Router<AppState> {
    use handlers::protected::admins;

    Router::new()
        .route("/admins", get(admins::list).post(admins::create))
        .route("/admins/:id", put(admins::update).delete(admins::delete))
}

fn evaluation_routes() -> Router<AppState> {
    use handlers::protected::evaluations;

    Router::new()
        .route("/evaluations", get(evaluations::list).post(evaluations::create))
        .route("/evaluations/mine", get(evaluations::mine))
        .route("/evaluations/my-evaluations", get(evaluations::mine))
        // Categories
        .route(
            "/evaluations/categories",
            get(evaluations::all_categories).post(evaluations::create_category),
        )
        .route("/evaluations/categories/list", get(evaluations::list_categories))
        .route(
            "/evaluations/categories/:id",
            put(evaluations::update_category).delete(evaluations::delete_category),
        )
        // Threads
        .route(
            "/evaluations/:id",
            get(evaluations::show).delete(evaluations::delete),
        )
        .route("/evaluations/:id/reply", post(evaluations::admin_reply))
        .route("/evaluations/:id/student-reply", post(evaluations::student_reply))
}

fn cors_layer(config: &AppConfig) -> CorsLayer {
    if config.environment == Environment::Development {
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> = config
        .security
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers(cors::Any)
        .expose_headers([middleware::NEW_ACCESS_TOKEN_HEADER.clone()])
}

/// Panics inside a handler still answer with the failure envelope.
fn handle_panic(payload: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic".to_string()
    };
    ApiError::server_error(detail).into_response()
}
