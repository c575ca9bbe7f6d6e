use axum::{Json, extract::State};

use super::{ApiSuccess, success};
use crate::router::BridgeState;
use crate::service::detection::EnvironmentInfo;

/// GET /api/environment/info
pub async fn info(State(state): State<BridgeState>) -> Json<ApiSuccess<EnvironmentInfo>> {
    success(state.detector.get_or_refresh().await)
}

/// POST /api/environment/redetect
pub async fn redetect(State(state): State<BridgeState>) -> Json<ApiSuccess<EnvironmentInfo>> {
    success(state.detector.redetect().await)
}
