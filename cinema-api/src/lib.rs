use axum::{http::Method, middleware::{from_fn, from_fn_with_state}, Router};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod bookings;
pub mod error;
pub mod extract;
pub mod middleware;
pub mod screenings;
pub mod state;
pub mod ws;

pub use state::{AppState, AuthConfig};

pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
            axum::http::header::USER_AGENT,
        ]);

    let admin = ws::admin_routes().layer(from_fn(middleware::admin_only));

    Router::new()
        .merge(screenings::routes())
        .merge(bookings::routes())
        .merge(ws::routes())
        .merge(admin)
        .layer(from_fn_with_state(state.clone(), middleware::auth_middleware))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
