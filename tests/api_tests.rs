//! API integration tests
//!
//! Requests are driven through the router with `tower::ServiceExt::oneshot`,
//! no socket involved.

use std::path::Path;
use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use costsheet::api::{build_router, ApiConfig, AppState};
use costsheet::excel::{CellRef, CellValue, TemplateImporter};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

const KEY: &str = "ssep2025";

fn app(dir: &TempDir) -> Router {
    let config = ApiConfig {
        template_path: dir.path().join("template.xlsx"),
        store_path: dir.path().join("saved_results.json"),
        ..ApiConfig::default()
    };
    build_router(Arc::new(AppState::new(&config)))
}

fn estimate_json() -> Value {
    json!({
        "header": {
            "partNumber": "96240-BQ000",
            "partName": "ANTENA ASSY",
            "vehicleModel": "QU2i",
            "company": "SSEP"
        },
        "materialLines": [
            {"partName": "BRACKET", "unitPrice": 10, "netWeight": 5, "usPerAssembly": 2,
             "lossRatePct": 10, "wasteCost": 3, "dieCastLossAllowance": 1}
        ],
        "processLines": [
            {"processName": "조립", "cycleTimeSec": 3600}
        ]
    })
}

fn get(uri: &str, key: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(key) = key {
        builder = builder.header("x-access-key", key);
    }
    builder.body(Body::empty()).unwrap()
}

fn post(uri: &str, key: Option<&str>, body: &Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(key) = key {
        builder = builder.header("x-access-key", key);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn write_template(path: &Path) {
    let mut workbook = rust_xlsxwriter::Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.set_name("원가계산서").unwrap();
    sheet.write_string(2, 0, "품 번").unwrap();
    sheet.write_string(46, 1, "(4) 가공비").unwrap();
    workbook.save(path).unwrap();
}

// ═══════════════════════════════════════════════════════════════════════════
// OPEN ENDPOINT TESTS
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_health_is_open() {
    let dir = TempDir::new().unwrap();
    let response = app(&dir).oneshot(get("/health", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["status"], "healthy");
    assert!(body["request_id"].as_str().is_some());
}

#[tokio::test]
async fn test_version_is_open() {
    let dir = TempDir::new().unwrap();
    let response = app(&dir).oneshot(get("/version", None)).await.unwrap();
    let body = body_json(response).await;
    assert_eq!(body["data"]["version"], env!("CARGO_PKG_VERSION"));
}

// ═══════════════════════════════════════════════════════════════════════════
// ACCESS GATE TESTS
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_api_requires_access_key() {
    let dir = TempDir::new().unwrap();
    let app = app(&dir);

    let missing = app.clone().oneshot(get("/api/v1/snapshots", None)).await.unwrap();
    assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(missing).await;
    assert_eq!(body["success"], false);
    assert!(body["error"].as_str().unwrap().contains("비밀번호"));

    let wrong = app
        .oneshot(post("/api/v1/calculate", Some("wrong"), &estimate_json()))
        .await
        .unwrap();
    assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);
}

// ═══════════════════════════════════════════════════════════════════════════
// CALCULATE TESTS
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_calculate_returns_summary() {
    let dir = TempDir::new().unwrap();
    let response = app(&dir)
        .oneshot(post("/api/v1/calculate", Some(KEY), &estimate_json()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let data = body_json(response).await["data"].clone();
    let approx = |v: &Value, expected: f64| (v.as_f64().unwrap() - expected).abs() < 1e-9;
    assert!(approx(&data["materials"][0]["materialCost"], 114.0));
    assert_eq!(data["materials"][0]["partName"], "BRACKET");
    assert!(approx(&data["processes"][0]["effectiveRate"], 3500.0));
    assert!(approx(&data["totalProcessCost"], 3500.0));
    assert!(approx(&data["grandTotal"], 3614.0));
    // Base amount only: 10 × 5 × 2
    assert!(approx(&data["estimatedMaterialTotal"], 100.0));
}

#[tokio::test]
async fn test_calculate_rejects_malformed_json() {
    let dir = TempDir::new().unwrap();
    let request = Request::builder()
        .method("POST")
        .uri("/api/v1/calculate")
        .header(header::CONTENT_TYPE, "application/json")
        .header("x-access-key", KEY)
        .body(Body::from("{ not json"))
        .unwrap();
    let response = app(&dir).oneshot(request).await.unwrap();
    assert!(response.status().is_client_error());
}

// ═══════════════════════════════════════════════════════════════════════════
// SNAPSHOT TESTS
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_snapshot_save_list_get() {
    let dir = TempDir::new().unwrap();
    let app = app(&dir);

    let saved = app
        .clone()
        .oneshot(post(
            "/api/v1/snapshots",
            Some(KEY),
            &json!({"name": "1st quote", "estimate": estimate_json()}),
        ))
        .await
        .unwrap();
    assert_eq!(saved.status(), StatusCode::CREATED);
    let saved = body_json(saved).await;
    let id = saved["data"]["id"].as_str().unwrap().to_string();
    assert_eq!(saved["data"]["name"], "1st quote");

    let listing = app
        .clone()
        .oneshot(get("/api/v1/snapshots", Some(KEY)))
        .await
        .unwrap();
    let listing = body_json(listing).await;
    assert_eq!(listing["data"][0]["id"], id.as_str());
    assert_eq!(listing["data"][0]["number"], 1);
    assert_eq!(listing["data"][0]["partNumber"], "96240-BQ000");

    let one = app
        .oneshot(get(&format!("/api/v1/snapshots/{id}"), Some(KEY)))
        .await
        .unwrap();
    assert_eq!(one.status(), StatusCode::OK);
    let one = body_json(one).await;
    assert_eq!(one["data"]["materialLines"][0]["partName"], "BRACKET");
    assert_eq!(one["data"]["processLines"][0]["processName"], "조립");
}

#[tokio::test]
async fn test_unknown_snapshot_is_404() {
    let dir = TempDir::new().unwrap();
    let response = app(&dir)
        .oneshot(get("/api/v1/snapshots/20000101000000", Some(KEY)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["success"], false);
}

// ═══════════════════════════════════════════════════════════════════════════
// EXPORT TESTS
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_export_without_template_is_404() {
    let dir = TempDir::new().unwrap();
    let response = app(&dir)
        .oneshot(post("/api/v1/export", Some(KEY), &estimate_json()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let body = body_json(response).await;
    assert!(body["error"].as_str().unwrap().contains("template file not found"));
}

#[tokio::test]
async fn test_export_returns_workbook_download() {
    let dir = TempDir::new().unwrap();
    write_template(&dir.path().join("template.xlsx"));

    let response = app(&dir)
        .oneshot(post("/api/v1/export", Some(KEY), &estimate_json()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let headers = response.headers().clone();
    assert_eq!(
        headers[header::CONTENT_TYPE],
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
    );
    let disposition = headers[header::CONTENT_DISPOSITION].to_str().unwrap();
    assert!(disposition.starts_with("attachment;"));
    assert!(disposition.contains("96240-BQ000_ANTENA%20ASSY.xlsx"));
    assert_eq!(headers["x-cells-skipped"], "0");

    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let workbook = TemplateImporter::from_bytes(bytes.to_vec()).unwrap();
    let grid = &workbook.sheets[0].grid;
    assert_eq!(grid.text_at(3, 3).as_deref(), Some("96240-BQ000"));
    match grid.get(CellRef::new(47, 7)) {
        CellValue::Number(total) => assert!((total - 3500.0).abs() < 1e-9),
        other => panic!("expected the processing total, got {other:?}"),
    }
}
