use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use plc_common::{LogEntry, validate_operation_log};

use crate::error::AppError;
use crate::importer;
use crate::server::AppState;

/// GET /{did} — validate the stored log from genesis and serve the current
/// document. Unknown and tombstoned DIDs are 404; a stored log that fails
/// validation surfaces as 500 with the validator's message.
pub async fn resolve_did(
    State(state): State<AppState>,
    Path(did): Path<String>,
) -> Result<Response, AppError> {
    if !did.starts_with("did:plc:") {
        return Err(AppError::NotFound(format!("not a did:plc DID: {did}")));
    }

    let pairs = state
        .ops_ks
        .prefix_iter_raw(importer::ops_prefix(&did))
        .await?;
    if pairs.is_empty() {
        return Err(AppError::NotFound(format!("DID not registered: {did}")));
    }

    let entries = pairs
        .iter()
        .map(|(_, value)| serde_json::from_slice::<LogEntry>(value))
        .collect::<Result<Vec<_>, _>>()?;

    match validate_operation_log(&did, &entries)? {
        Some(document) => Ok((
            StatusCode::OK,
            [("content-type", "application/did+ld+json")],
            axum::Json(document),
        )
            .into_response()),
        None => Err(AppError::NotFound(format!("DID has been tombstoned: {did}"))),
    }
}
