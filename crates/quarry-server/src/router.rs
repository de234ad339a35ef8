use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::routing::get;
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::auth::require_token;
use crate::handler::{self, AppState};

/// Build the axum router with every object-store endpoint.
///
/// There is no DELETE route: the store is append-only.
pub fn build_router(state: AppState, max_object_size: usize) -> Router {
    let objects = Router::new()
        .route(
            "/v1/objects/:algorithm/:hex",
            get(handler::get_object)
                .head(handler::head_object)
                .put(handler::put_object),
        )
        .route("/v1/objects/:algorithm", get(handler::list_objects))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_token));

    Router::new()
        .route("/v1/health", get(handler::health_handler))
        .merge(objects)
        .layer(DefaultBodyLimit::max(max_object_size))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
