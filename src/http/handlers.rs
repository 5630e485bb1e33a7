//! Route handlers.
//!
//! Every handler reads the configuration snapshot fresh; nothing is cached
//! between requests.

use axum::{
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;
use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::http::server::AppState;
use crate::observability::metrics;
use crate::sync::{ConfigValue, SyncReport};

#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: u32,
    pub name: &'static str,
    pub email: &'static str,
    pub role: &'static str,
}

pub const MOCK_USERS: [User; 5] = [
    User { id: 1, name: "Alice Johnson", email: "alice@example.com", role: "admin" },
    User { id: 2, name: "Bob Smith", email: "bob@example.com", role: "user" },
    User { id: 3, name: "Carol Davis", email: "carol@example.com", role: "user" },
    User { id: 4, name: "David Wilson", email: "david@example.com", role: "moderator" },
    User { id: 5, name: "Eve Brown", email: "eve@example.com", role: "user" },
];

#[derive(Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
    pub timestamp: f64,
    pub config_loaded: bool,
    pub revision: u64,
    pub sync: SyncReport,
}

fn unix_timestamp() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

pub async fn health(State(state): State<AppState>) -> Json<HealthStatus> {
    let snapshot = state.config.snapshot();
    Json(HealthStatus {
        status: "healthy",
        timestamp: unix_timestamp(),
        config_loaded: !snapshot.values().is_empty(),
        revision: snapshot.revision(),
        sync: state.stats.report(),
    })
}

pub async fn get_config(State(state): State<AppState>) -> Json<BTreeMap<String, ConfigValue>> {
    Json(state.config.snapshot().values().clone())
}

pub async fn list_users(State(state): State<AppState>) -> Response {
    let key = state.gate_key.as_ref();
    let snapshot = state.config.snapshot();
    let enabled = snapshot.is_enabled(key);
    metrics::record_gate_decision(key, enabled);

    if !enabled {
        tracing::debug!(gate = %key, "User listing refused, feature disabled");
        return (
            StatusCode::FORBIDDEN,
            Json(json!({
                "error": "User listing feature is currently disabled",
                "message": format!("This feature is controlled by the '{}' flag in AppConfig", key),
                "current_flag_value": enabled,
            })),
        )
            .into_response();
    }

    Json(json!({
        "users": MOCK_USERS,
        "total_count": MOCK_USERS.len(),
        "feature_enabled": true,
        "timestamp": unix_timestamp(),
    }))
    .into_response()
}

pub async fn home(State(state): State<AppState>) -> Html<String> {
    let snapshot = state.config.snapshot();
    let key = state.gate_key.as_ref();
    let enabled = snapshot.is_enabled(key);
    let config_json = serde_json::to_string_pretty(snapshot.values()).unwrap_or_default();

    let (class, label) = if enabled {
        ("feature-enabled", "ENABLED")
    } else {
        ("feature-disabled", "DISABLED")
    };

    Html(format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <title>AppConfig Gate</title>
    <style>
        body {{ font-family: Arial, sans-serif; margin: 40px; }}
        .config {{ background: #f0f0f0; padding: 20px; border-radius: 5px; margin: 20px 0; }}
        .feature-enabled {{ color: green; }}
        .feature-disabled {{ color: red; }}
        .endpoint {{ background: #e8f4f8; padding: 10px; margin: 10px 0; border-radius: 3px; }}
    </style>
</head>
<body>
    <h1>AppConfig Gate</h1>

    <h2>Current Configuration (revision {revision})</h2>
    <div class="config"><pre>{config}</pre></div>

    <h2>User Listing Feature Status</h2>
    <p class="{class}">Feature <code>{key}</code> is currently <strong>{label}</strong></p>

    <h2>Available Endpoints</h2>
    <div class="endpoint"><strong>GET /</strong> - This page</div>
    <div class="endpoint"><strong>GET /health</strong> - Health check</div>
    <div class="endpoint"><strong>GET /config</strong> - Current configuration (JSON)</div>
    <div class="endpoint"><strong>GET /users</strong> - List users (gated by <code>{key}</code>)</div>

    <p>Configuration is refreshed from the agent every {interval} seconds.</p>
</body>
</html>
"#,
        revision = snapshot.revision(),
        config = escape_html(&config_json),
        class = class,
        key = escape_html(key),
        label = label,
        interval = state.poll_interval_secs,
    ))
}

fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
