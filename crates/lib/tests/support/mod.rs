//! Shared helpers for integration tests: a fake LINE reply API and a fake calendar page on one
//! local listener.

#![allow(dead_code)]

use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, StatusCode},
    response::Html,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

/// Reply API calls seen by the fake: `{ "authorization": ..., "body": ... }`.
pub type Replies = Arc<Mutex<Vec<serde_json::Value>>>;

pub fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind free port");
    listener.local_addr().expect("local_addr").port()
}

pub fn temp_dir(prefix: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("{}-{}", prefix, uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&dir).expect("create temp dir");
    dir
}

async fn record_reply(
    State(replies): State<Replies>,
    headers: HeaderMap,
    Json(body): Json<serde_json::Value>,
) -> Json<serde_json::Value> {
    let authorization = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();
    replies
        .lock()
        .unwrap()
        .push(json!({ "authorization": authorization, "body": body }));
    Json(json!({}))
}

/// Calendar page with `count` release anchors titled `<REGION> Release <i>`, plus noise.
pub fn calendar_html(region: &str, count: usize) -> String {
    let mut html = String::from(
        r#"<html><head><title>Release Calendar</title></head><body>
        <a href="/" class="ipc-link">Home</a><section class="ipc-page-section"><ul>"#,
    );
    for i in 0..count {
        html.push_str(&format!(
            r#"<li class="ipc-metadata-list-summary-item"><div>
               <a class="ipc-metadata-list-summary-item__t" tabindex="0" href="/title/tt{:07}/?ref_=rlm_i_{}">{} Release {}</a>
               </div></li>"#,
            i, i, region, i
        ));
    }
    html.push_str("</ul></section></body></html>");
    html
}

async fn calendar(
    Query(q): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> (StatusCode, Html<String>) {
    let ua = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    if !ua.starts_with("Mozilla/5.0") {
        return (StatusCode::FORBIDDEN, Html(String::new()));
    }
    let region = q.get("region").cloned().unwrap_or_default();
    let count = q
        .get("count")
        .and_then(|c| c.parse().ok())
        .unwrap_or(15);
    (StatusCode::OK, Html(calendar_html(&region, count)))
}

async fn unavailable() -> StatusCode {
    StatusCode::SERVICE_UNAVAILABLE
}

/// Start the fakes; returns their base URL and the recorded reply calls.
pub async fn spawn_fakes() -> (String, Replies) {
    let replies: Replies = Arc::default();
    let app = Router::new()
        .route("/v2/bot/message/reply", post(record_reply))
        .route("/calendar/", get(calendar))
        .route("/unavailable/calendar/", get(unavailable))
        .with_state(replies.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind fake server");
    let addr = listener.local_addr().expect("fake server addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (format!("http://{}", addr), replies)
}
