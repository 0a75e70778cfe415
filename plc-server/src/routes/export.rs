use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use plc_common::LogEntry;
use serde::Deserialize;

use crate::error::AppError;
use crate::importer;
use crate::server::AppState;

const DEFAULT_COUNT: usize = 100;

#[derive(Debug, Deserialize)]
pub struct ExportParams {
    pub count: Option<String>,
    pub after: Option<String>,
    pub did: Option<String>,
}

/// GET /export — the raw operation log as JSON lines, ordered by `createdAt`
/// ascending. `after` is strict, `did` narrows to one log, `count` is a
/// number or `all`.
pub async fn export(
    State(state): State<AppState>,
    Query(params): Query<ExportParams>,
) -> Result<Response, AppError> {
    let limit = match params.count.as_deref() {
        None => Some(DEFAULT_COUNT),
        Some("all") => None,
        Some(raw) => Some(raw.parse::<usize>().map_err(|_| {
            AppError::BadRequest(format!("invalid count: {raw}, expected a number or 'all'"))
        })?),
    };

    let lines: Vec<Vec<u8>> = match &params.did {
        Some(did) => {
            // The per-DID keyspace is already in append (createdAt) order;
            // the after filter needs the parsed timestamp.
            let pairs = state
                .ops_ks
                .prefix_iter_raw(importer::ops_prefix(did))
                .await?;
            let mut lines = Vec::new();
            for (_, value) in pairs {
                if limit.is_some_and(|limit| lines.len() >= limit) {
                    break;
                }
                if let Some(after) = &params.after {
                    let entry: LogEntry = serde_json::from_slice(&value)?;
                    if entry.created_at.as_str() <= after.as_str() {
                        continue;
                    }
                }
                lines.push(value);
            }
            lines
        }
        None => {
            let start = match &params.after {
                Some(after) => after_bound(after),
                None => Vec::new(),
            };
            state
                .log_ks
                .range_iter_raw(start, limit)
                .await?
                .into_iter()
                .map(|(_, value)| value)
                .collect()
        }
    };

    let mut body = Vec::new();
    for line in lines {
        body.extend_from_slice(&line);
        body.push(b'\n');
    }

    Ok((
        StatusCode::OK,
        [("content-type", "application/jsonlines")],
        body,
    )
        .into_response())
}

/// Smallest key strictly past every global-log key carrying the `after`
/// timestamp (keys are `{createdAt}|{seq}`).
fn after_bound(after: &str) -> Vec<u8> {
    let mut bound = after.as_bytes().to_vec();
    bound.push(b'|');
    bound.push(0xff);
    bound
}
