//! Last-value table queries

use axum::{
    extract::{Path, State},
    Json,
};

use mm_common::events::{Snapshot, ValueEntry};
use mm_common::MidiChannel;

use crate::{ApiError, ApiResult, AppState};

/// GET /api/values - whole value table
pub async fn get_values(State(state): State<AppState>) -> Json<Snapshot> {
    Json(state.relay.snapshot().await)
}

/// GET /api/values/:source_key - values for one `<deviceName>_ch<channel>`
pub async fn get_source_values(
    State(state): State<AppState>,
    Path(source_key): Path<String>,
) -> ApiResult<Json<Vec<ValueEntry>>> {
    check_source_key(&source_key)?;

    let values = state.relay.values_for(&source_key).await;
    if values.is_empty() {
        return Err(ApiError::NotFound(format!("No values for {}", source_key)));
    }
    Ok(Json(values))
}

fn check_source_key(key: &str) -> ApiResult<()> {
    let channel = key
        .rsplit_once("_ch")
        .filter(|(device, _)| !device.is_empty())
        .and_then(|(_, number)| number.parse::<u8>().ok())
        .and_then(MidiChannel::new);

    match channel {
        Some(_) => Ok(()),
        None => Err(ApiError::BadRequest(format!(
            "'{}' is not of the form <deviceName>_ch<1-16>",
            key
        ))),
    }
}
