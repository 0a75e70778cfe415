//! Tails an upstream directory's export stream into the local store.
//!
//! Entries are append-only: each gets a monotonic sequence number and is
//! indexed twice, per DID (for resolution) and globally by `createdAt` (for
//! the mirror's own export stream). The import cursor is the `createdAt` of
//! the last stored entry; the upstream export is strictly-after the cursor,
//! so a restart resumes without duplicates.

use std::time::Duration;

use plc_common::{DirectoryClient, LogEntry};
use tracing::{info, warn};

use crate::error::AppError;
use crate::server::AppState;

const CURSOR_KEY: &str = "cursor";
const SEQ_KEY: &str = "seq";

/// Key for an entry in the per-DID keyspace. `|` never occurs in a DID.
pub(crate) fn ops_key(did: &str, seq: u64) -> String {
    format!("{did}|{seq:020}")
}

pub(crate) fn ops_prefix(did: &str) -> String {
    format!("{did}|")
}

/// Key for an entry in the global keyspace, ordered by `createdAt` with the
/// sequence number as a tie-break.
pub(crate) fn log_key(created_at: &str, seq: u64) -> String {
    format!("{created_at}|{seq:020}")
}

pub async fn run_import_loop(state: AppState) {
    let client = DirectoryClient::new(&state.config.upstream.url);
    let interval = Duration::from_secs(state.config.upstream.poll_interval);
    info!(upstream = %client.base_url(), "tailing upstream directory");
    loop {
        match import_once(&client, &state).await {
            Ok(0) => {}
            Ok(imported) => info!(imported, "imported operations from upstream"),
            Err(e) => warn!("import error: {e}"),
        }
        tokio::time::sleep(interval).await;
    }
}

/// Page through the upstream export until it runs dry. Returns how many
/// entries were stored.
pub async fn import_once(client: &DirectoryClient, state: &AppState) -> Result<u64, AppError> {
    let page_size = state.config.upstream.page_size;
    let mut total = 0u64;
    loop {
        let cursor: Option<String> = state.meta_ks.get(CURSOR_KEY).await?;
        let entries = client.export_page(cursor.as_deref(), page_size).await?;
        if entries.is_empty() {
            break;
        }
        let fetched = entries.len();
        ingest_entries(state, &entries).await?;
        total += fetched as u64;
        if (fetched as u32) < page_size {
            break;
        }
    }
    Ok(total)
}

/// Append a batch of entries and advance the sequence counter and cursor.
pub async fn ingest_entries(state: &AppState, entries: &[LogEntry]) -> Result<(), AppError> {
    let mut seq: u64 = state.meta_ks.get(SEQ_KEY).await?.unwrap_or(0);
    let mut cursor: Option<&str> = None;
    for entry in entries {
        let line = serde_json::to_vec(entry)?;
        state
            .log_ks
            .insert_raw(log_key(&entry.created_at, seq), line.clone())
            .await?;
        state
            .ops_ks
            .insert_raw(ops_key(&entry.did, seq), line)
            .await?;
        cursor = Some(&entry.created_at);
        seq += 1;
    }
    state.meta_ks.insert(SEQ_KEY, &seq).await?;
    if let Some(cursor) = cursor {
        state.meta_ks.insert(CURSOR_KEY, &cursor).await?;
    }
    Ok(())
}

/// The stored import cursor, if any.
pub async fn cursor(state: &AppState) -> Result<Option<String>, AppError> {
    state.meta_ks.get(CURSOR_KEY).await
}
