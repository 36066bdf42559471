use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use retriever_core::RetrieverConfig;
use serde_json::Value;
use std::fs;
use tempfile::{tempdir, TempDir};
use tower::ServiceExt;

fn build_tiny_corpus() -> (TempDir, RetrieverConfig) {
    let dir = tempdir().unwrap();
    let source = dir.path().join("output");
    fs::create_dir_all(&source).unwrap();
    fs::write(
        source.join("rust.md"),
        "## Rust language basics\nRust is great. Rust systems programming is fun.\n## Learning resources\nLearning rust takes time.",
    )
    .unwrap();
    fs::write(source.join("python.md"), "## Python language basics\nPython is a scripting language.").unwrap();
    let config = RetrieverConfig {
        source_dir: source,
        index_path: dir.path().join("bm25.bin"),
        chunk_size: 200,
        ..Default::default()
    };
    (dir, config)
}

async fn call(app: Router, req: Request<Body>) -> (StatusCode, Value) {
    let resp = app.oneshot(req).await.unwrap();
    let status = resp.status();
    let body = resp.into_body().collect().await.unwrap().to_bytes();
    let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, json)
}

fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn search_returns_ranked_results() {
    let (_dir, config) = build_tiny_corpus();
    let app = server::build_app(config).unwrap();

    let (status, json) = call(app, get("/search?q=rust&k=2")).await;
    assert_eq!(status, StatusCode::OK);
    let arr = json["results"].as_array().unwrap();
    assert_eq!(arr.len(), 2);
    assert_eq!(arr[0]["filename"], "rust.md");
    assert_eq!(arr[0]["section"], "Rust language basics");
    assert!(arr[0]["snippet"].as_str().unwrap().contains("<em>Rust</em> is great."));
    assert_eq!(json["total_hits"], 2);
    let output = json["output"].as_str().unwrap();
    assert!(output.starts_with("============================rust.md============================"));
}

#[tokio::test]
async fn search_caps_results_at_five() {
    let (_dir, config) = build_tiny_corpus();
    let app = server::build_app(config).unwrap();
    let (status, json) = call(app, get("/search?q=language&k=10")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(json["results"].as_array().unwrap().len() <= 5);
}

#[tokio::test]
async fn empty_query_returns_empty_output() {
    let (_dir, config) = build_tiny_corpus();
    let app = server::build_app(config).unwrap();
    let (status, json) = call(app, get("/search?q=")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["output"], "");
    assert!(json["results"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn rebuild_requires_admin_token() {
    let (_dir, config) = build_tiny_corpus();
    let app = server::build_app(config).unwrap();
    let req = Request::post("/index/rebuild").body(Body::empty()).unwrap();
    let (status, _) = call(app, req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}
