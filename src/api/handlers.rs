//! API request handlers
//!
//! Handlers for all REST API endpoints.

use std::sync::Arc;

use axum::{
    extract::{Path, Request, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

use super::server::AppState;
use crate::auth::ACCESS_KEY_HEADER;
use crate::core::CostCalculator;
use crate::error::ExportError;
use crate::excel::download_file_name;
use crate::store::SnapshotListing;
use crate::types::{CostSummary, Estimate, EstimateSnapshot};

/// MIME type of the exported workbook
pub const XLSX_CONTENT_TYPE: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

/// Response header carrying the number of merged-cell write refusals
pub const CELLS_SKIPPED_HEADER: &str = "x-cells-skipped";

/// Standard API response wrapper
#[derive(Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub request_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            request_id: Uuid::new_v4().to_string(),
            data: Some(data),
            error: None,
        }
    }

    pub fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            request_id: Uuid::new_v4().to_string(),
            data: None,
            error: Some(message.into()),
        }
    }
}

/// Error envelope with a status code
fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(ApiResponse::<()>::err(message))).into_response()
}

/// Root endpoint response
#[derive(Serialize)]
pub struct RootResponse {
    pub name: String,
    pub version: String,
    pub description: String,
    pub endpoints: Vec<EndpointInfo>,
}

#[derive(Serialize)]
pub struct EndpointInfo {
    pub path: String,
    pub method: String,
    pub description: String,
}

impl EndpointInfo {
    fn new(method: &str, path: &str, description: &str) -> Self {
        Self {
            path: path.to_string(),
            method: method.to_string(),
            description: description.to_string(),
        }
    }
}

/// GET / - Root info
pub async fn root(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let response = RootResponse {
        name: "costsheet API Server".to_string(),
        version: state.version.clone(),
        description: "Part cost estimation and cost sheet export".to_string(),
        endpoints: vec![
            EndpointInfo::new("GET", "/health", "Health check endpoint"),
            EndpointInfo::new("GET", "/version", "Get server version"),
            EndpointInfo::new("POST", "/api/v1/calculate", "Compute material and processing costs"),
            EndpointInfo::new("GET", "/api/v1/snapshots", "List saved estimates, newest first"),
            EndpointInfo::new("POST", "/api/v1/snapshots", "Save an estimate"),
            EndpointInfo::new("GET", "/api/v1/snapshots/:id", "Get one saved estimate"),
            EndpointInfo::new("POST", "/api/v1/export", "Fill the cost sheet template (.xlsx)"),
        ],
    };
    Json(ApiResponse::ok(response))
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub uptime_message: String,
}

/// GET /health - Health check
pub async fn health() -> impl IntoResponse {
    Json(ApiResponse::ok(HealthResponse {
        status: "healthy".to_string(),
        uptime_message: "Server is running".to_string(),
    }))
}

/// Version response
#[derive(Serialize)]
pub struct VersionResponse {
    pub version: String,
    pub features: Vec<String>,
}

/// GET /version - Server version
pub async fn version(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(ApiResponse::ok(VersionResponse {
        version: state.version.clone(),
        features: vec![
            "calculate".to_string(),
            "snapshots".to_string(),
            "export".to_string(),
        ],
    }))
}

/// Access gate for `/api/v1/*`: the `x-access-key` header must match
pub async fn require_access_key(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let presented = request
        .headers()
        .get(ACCESS_KEY_HEADER)
        .and_then(|v| v.to_str().ok());

    match state.gate.check(presented) {
        Ok(()) => next.run(request).await,
        Err(e) => {
            warn!(path = %request.uri().path(), "rejected request with invalid access key");
            error_response(StatusCode::UNAUTHORIZED, e.to_string())
        }
    }
}

/// POST /api/v1/calculate - Compute derived costs and totals
pub async fn calculate(Json(estimate): Json<Estimate>) -> Json<ApiResponse<CostSummary>> {
    let summary = CostCalculator::for_estimate(&estimate).compute_estimate(&estimate);
    Json(ApiResponse::ok(summary))
}

/// GET /api/v1/snapshots - Newest-first listing
pub async fn list_snapshots(State(state): State<Arc<AppState>>) -> Json<ApiResponse<Vec<SnapshotListing>>> {
    Json(ApiResponse::ok(state.store.list_newest_first()))
}

/// Save snapshot request
#[derive(Deserialize)]
pub struct SaveSnapshotRequest {
    #[serde(default)]
    pub name: Option<String>,
    pub estimate: Estimate,
}

/// Save snapshot response
#[derive(Serialize, Default)]
pub struct SaveSnapshotResponse {
    pub id: String,
    pub name: String,
    pub saved_at: String,
}

/// POST /api/v1/snapshots - Append a snapshot
pub async fn save_snapshot(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SaveSnapshotRequest>,
) -> Response {
    let (snapshot, written) = state.store.save_estimate(&req.estimate, req.name.as_deref());
    if !written {
        return error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("could not write snapshot store {}", state.store.path().display()),
        );
    }

    info!(id = %snapshot.id, name = %snapshot.name, "snapshot saved");
    (
        StatusCode::CREATED,
        Json(ApiResponse::ok(SaveSnapshotResponse {
            id: snapshot.id,
            name: snapshot.name,
            saved_at: snapshot.saved_at,
        })),
    )
        .into_response()
}

/// GET /api/v1/snapshots/:id - One snapshot
pub async fn get_snapshot(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
    match state.store.find(&id) {
        Some(snapshot) => Json(ApiResponse::<EstimateSnapshot>::ok(snapshot)).into_response(),
        None => error_response(StatusCode::NOT_FOUND, format!("Snapshot not found: {id}")),
    }
}

/// `attachment` disposition with an ASCII fallback and the UTF-8 name (RFC 6266)
fn content_disposition(file_name: &str) -> String {
    let fallback: String = file_name
        .chars()
        .map(|c| if c.is_ascii_graphic() && c != '"' && c != '\\' { c } else { '_' })
        .collect();
    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        fallback,
        urlencoding::encode(file_name)
    )
}

/// POST /api/v1/export - Filled cost sheet as an xlsx download
pub async fn export(State(state): State<Arc<AppState>>, Json(estimate): Json<Estimate>) -> Response {
    let outcome = match state.exporter.export(&state.template_path, &estimate) {
        Ok(outcome) => outcome,
        Err(e @ ExportError::TemplateNotFound(_)) => {
            warn!("{e}");
            return error_response(StatusCode::NOT_FOUND, e.to_string());
        }
        Err(e) => {
            error!("{e}");
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string());
        }
    };

    let file_name = download_file_name(&estimate.header);
    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(XLSX_CONTENT_TYPE));
    if let Ok(value) = HeaderValue::from_str(&content_disposition(&file_name)) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }
    headers.insert(
        CELLS_SKIPPED_HEADER,
        HeaderValue::from(outcome.report.skipped.len()),
    );

    (StatusCode::OK, headers, outcome.bytes).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    // ==================== ApiResponse Tests ====================

    #[test]
    fn test_api_response_ok_creates_success_response() {
        let response = ApiResponse::ok("test data");

        assert!(response.success);
        assert!(!response.request_id.is_empty());
        assert_eq!(response.data, Some("test data"));
        assert!(response.error.is_none());
    }

    #[test]
    fn test_api_response_err_creates_error_response() {
        let response = ApiResponse::<()>::err("Something went wrong");

        assert!(!response.success);
        assert!(response.data.is_none());
        assert_eq!(response.error, Some("Something went wrong".to_string()));
    }

    #[test]
    fn test_api_response_request_id_is_unique() {
        let r1 = ApiResponse::ok(1);
        let r2 = ApiResponse::ok(2);
        assert_ne!(r1.request_id, r2.request_id);
    }

    #[test]
    fn test_api_response_serializes_without_none_fields() {
        let json = serde_json::to_string(&ApiResponse::ok(42)).unwrap();
        assert!(json.contains("\"success\":true"));
        assert!(json.contains("\"data\":42"));
        assert!(!json.contains("\"error\""));
    }

    #[test]
    fn test_api_response_error_serializes_without_data() {
        let json = serde_json::to_string(&ApiResponse::<()>::err("nope")).unwrap();
        assert!(json.contains("\"success\":false"));
        assert!(json.contains("\"error\":\"nope\""));
        assert!(!json.contains("\"data\""));
    }

    // ==================== Request Deserialization Tests ====================

    #[test]
    fn test_save_request_name_is_optional() {
        let json = r#"{"estimate": {"header": {"partNumber": "A-1"}}}"#;
        let req: SaveSnapshotRequest = serde_json::from_str(json).unwrap();
        assert!(req.name.is_none());
        assert_eq!(req.estimate.header.part_number, "A-1");
    }

    // ==================== Content-Disposition Tests ====================

    #[test]
    fn test_content_disposition_encodes_utf8_name() {
        let value = content_disposition("원가계산서_A-1_CASE.xlsx");
        assert!(value.starts_with("attachment; filename=\"______A-1_CASE.xlsx\""));
        assert!(value.contains("filename*=UTF-8''%EC%9B%90"));
        assert!(HeaderValue::from_str(&value).is_ok());
    }

    #[test]
    fn test_content_disposition_replaces_quotes_and_spaces() {
        let value = content_disposition("a \"b\".xlsx");
        assert!(value.starts_with("attachment; filename=\"a__b_.xlsx\""));
    }
}
