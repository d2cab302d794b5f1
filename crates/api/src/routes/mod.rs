//! API routes.

pub mod estimate;
pub mod health;
pub mod segments;

use axum::{
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::state::AppState;

/// Creates the API router.
///
/// Write and read routes are mounted only for the services present in `state`.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let mut router = Router::new()
        .route("/health", get(health::health_handler))
        .route("/health/ready", get(health::ready_handler))
        .route("/health/live", get(health::live_handler));

    if let Some(segmentation) = state.segmentation {
        router = router.merge(
            Router::new()
                .route("/v1/segments", post(segments::add_user_segment_handler))
                .with_state(segmentation),
        );
    }

    if let Some(estimation) = state.estimation {
        router = router.merge(
            Router::new()
                .route("/v1/estimate", post(estimate::estimate_users_handler))
                .with_state(estimation),
        );
    }

    router.layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(cors),
    )
}
