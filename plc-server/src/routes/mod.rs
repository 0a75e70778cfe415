mod did;
mod export;
mod health;

use axum::Router;
use axum::response::Html;
use axum::routing::get;

use crate::server::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(landing))
        .route("/health", get(health::health))
        .route("/export", get(export::export))
        .route("/{did}", get(did::resolve_did))
}

/// GET / — a plain landing page pointing at the machine routes.
async fn landing() -> Html<&'static str> {
    Html(LANDING)
}

const LANDING: &str = r#"<!doctype html>
<html>
<head><meta charset="utf-8"><title>plc mirror</title></head>
<body>
<h1>plc mirror</h1>
<p>A read-only mirror of a did:plc directory. Documents are derived by
re-validating each DID's full operation log from genesis.</p>
<ul>
<li><code>GET /did:plc:&lt;id&gt;</code> — current DID document</li>
<li><code>GET /export?count=&lt;n|all&gt;&amp;after=&lt;iso&gt;&amp;did=&lt;id&gt;</code> — raw operation log, JSON lines</li>
<li><code>GET /health</code></li>
</ul>
</body>
</html>
"#;
