pub mod api;
pub mod config;
pub mod services;
pub mod utils;

use crate::config::RelayConfig;
use crate::services::destination::DestinationStore;
use crate::services::notifier::Notifier;
use crate::services::source::SourceHost;
use axum::{Router, routing::get};
use std::sync::Arc;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(api::handlers::health::health_check, api::handlers::run::trigger_run),
    components(
        schemas(
            api::handlers::health::HealthResponse,
            services::pipeline::RunOutcome,
            services::pipeline::RunStatus,
            services::pipeline::RunStage,
        )
    ),
    tags(
        (name = "system", description = "Liveness and policy introspection"),
        (name = "relay", description = "Backup relay trigger")
    )
)]
pub struct ApiDoc;

#[derive(Clone)]
pub struct AppState {
    pub config: RelayConfig,
    pub source: Arc<dyn SourceHost>,
    pub store: Arc<dyn DestinationStore>,
    pub notifier: Arc<dyn Notifier>,
    /// Guards against overlapping runs: the trigger takes it with
    /// `try_lock` and answers 409 while a run is in flight.
    pub run_lock: Arc<tokio::sync::Mutex<()>>,
}

pub fn create_app(state: AppState) -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/health", get(api::handlers::health::health_check))
        .route(
            "/run",
            get(api::handlers::run::trigger_run).post(api::handlers::run::trigger_run),
        )
        .with_state(state)
}
