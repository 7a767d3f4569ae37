use crate::AppState;
use crate::api::error::AppError;
use crate::services::pipeline::{Pipeline, RunOutcome};
use axum::{Json, extract::State};

#[utoipa::path(
    post,
    path = "/run",
    responses(
        (status = 200, description = "Run completed; outcome may carry warnings", body = RunOutcome),
        (status = 409, description = "A run is already in flight")
    ),
    tag = "relay"
)]
pub async fn trigger_run(State(state): State<AppState>) -> Result<Json<RunOutcome>, AppError> {
    // Single in-flight run: a second trigger is rejected, not queued.
    let Ok(_guard) = state.run_lock.try_lock() else {
        return Err(AppError::Conflict(
            "a backup run is already in progress".to_string(),
        ));
    };

    tracing::info!("🚚 Backup run triggered");
    let pipeline = Pipeline::new(
        state.config.clone(),
        state.source.clone(),
        state.store.clone(),
    );
    let outcome = pipeline.run().await;
    state.notifier.notify(&outcome).await;

    Ok(Json(outcome))
}
