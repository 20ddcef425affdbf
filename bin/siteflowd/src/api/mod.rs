pub mod audit;
pub mod backups;
pub mod deploy;
pub mod graph;
pub mod health;
pub mod provision;
pub mod routes;
pub mod sites;
pub mod ws;

use std::sync::Arc;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Top-level route tree, one `nest` per resource the way the teacher's
/// `bin/core` composes its own `api::*::router()` submodules. No auth
/// middleware sits in front of any of these — this control plane is
/// meant to run behind a network boundary the operator already trusts.
/// Every resource lives under `/api`, matching the rest of SiteFlow's
/// external interface.
pub fn router(state: Arc<AppState>) -> Router {
  let api = Router::new()
    .nest("/sites", sites::router())
    .nest("/graph", graph::router())
    .nest("/routes", routes::router())
    .nest("/provision", provision::router())
    .nest("/deploy", deploy::router())
    .nest("/health", health::router())
    .nest("/audit", audit::router())
    .nest("/backups", backups::router())
    .nest("/ws", ws::router())
    .with_state(state);

  Router::new()
    .nest("/api", api)
    .layer(TraceLayer::new_for_http())
    .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
}
