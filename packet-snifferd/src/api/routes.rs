use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use crate::service::PacketService;
use shared::protocol::API_PREFIX;
use shared::types::{PacketFilter, PacketResponse, Protocol, Stats};

#[derive(Clone)]
pub struct AppState {
    pub service: PacketService,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, error: &str, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
            message: message.into(),
        }),
    )
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SniffingStatus {
    pub running: bool,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub sniffing: bool,
    pub timestamp: DateTime<Utc>,
}

/// Raw query string for `GET /packets`. Pagination values are kept as text so
/// that malformed ones can be ignored instead of rejecting the request.
#[derive(Debug, Default, Deserialize)]
pub struct PacketQuery {
    pub protocol: Option<String>,
    pub source_ip: Option<String>,
    pub destination_ip: Option<String>,
    pub from_timestamp: Option<String>,
    pub to_timestamp: Option<String>,
    pub limit: Option<String>,
    pub offset: Option<String>,
}

impl PacketQuery {
    fn into_filter(self) -> Result<PacketFilter, String> {
        let protocol = non_empty(self.protocol)
            .map(|p| p.parse::<Protocol>())
            .transpose()
            .map_err(|e| e.to_string())?;

        let from = non_empty(self.from_timestamp)
            .map(|s| parse_timestamp("from_timestamp", &s))
            .transpose()?;
        let to = non_empty(self.to_timestamp)
            .map(|s| parse_timestamp("to_timestamp", &s))
            .transpose()?;

        let limit = self
            .limit
            .and_then(|s| s.trim().parse::<usize>().ok())
            .unwrap_or(0);
        let offset = self
            .offset
            .and_then(|s| s.trim().parse::<usize>().ok())
            .unwrap_or(0);

        Ok(PacketFilter {
            protocol,
            source_ip: non_empty(self.source_ip),
            destination_ip: non_empty(self.destination_ip),
            from,
            to,
            limit,
            offset,
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

fn parse_timestamp(name: &str, value: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| format!("invalid {}: {}", name, e))
}

pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/packets", get(get_packets).delete(clear_packets))
        .route("/packets/:id", get(get_packet).delete(delete_packet))
        .route("/sniffing/start", post(start_sniffing))
        .route("/sniffing/stop", post(stop_sniffing))
        .route("/sniffing/status", get(sniffing_status))
        .route("/health", get(health))
        .route("/stats", get(get_stats));

    Router::new()
        .nest(API_PREFIX, api)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn get_packets(
    State(state): State<AppState>,
    Query(params): Query<PacketQuery>,
) -> Result<Json<PacketResponse>, ApiError> {
    let filter = params
        .into_filter()
        .map_err(|message| api_error(StatusCode::BAD_REQUEST, "Bad request", message))?;

    Ok(Json(state.service.get_packets(Some(&filter))))
}

async fn get_packet(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.service.get_packet(&id) {
        Some(packet) => Json(packet).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    }
}

async fn delete_packet(State(state): State<AppState>, Path(id): Path<String>) -> StatusCode {
    state.service.delete_packet(&id);
    StatusCode::NO_CONTENT
}

async fn clear_packets(State(state): State<AppState>) -> StatusCode {
    state.service.clear_packets();
    StatusCode::NO_CONTENT
}

async fn start_sniffing(State(state): State<AppState>) -> Result<Json<SniffingStatus>, ApiError> {
    state.service.start_sniffing().map_err(|e| {
        tracing::error!("Failed to start sniffing: {:#}", e);
        api_error(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error", "Failed to start sniffing")
    })?;

    Ok(Json(SniffingStatus {
        running: state.service.is_sniffing_running(),
    }))
}

async fn stop_sniffing(State(state): State<AppState>) -> Result<Json<SniffingStatus>, ApiError> {
    state.service.stop_sniffing().await.map_err(|e| {
        tracing::error!("Failed to stop sniffing: {:#}", e);
        api_error(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error", "Failed to stop sniffing")
    })?;

    Ok(Json(SniffingStatus {
        running: state.service.is_sniffing_running(),
    }))
}

async fn sniffing_status(State(state): State<AppState>) -> Json<SniffingStatus> {
    Json(SniffingStatus {
        running: state.service.is_sniffing_running(),
    })
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        sniffing: state.service.is_sniffing_running(),
        timestamp: Utc::now(),
    })
}

async fn get_stats(State(state): State<AppState>) -> Json<Stats> {
    Json(state.service.stats())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tokio_util::sync::CancellationToken;
    use tower::ServiceExt;
    use shared::types::Packet;
    use crate::sniffing::PacketSniffer;
    use crate::store::PacketStore;

    fn test_app() -> (Router, Arc<PacketStore>) {
        let store = Arc::new(PacketStore::new(100));
        let sniffer = Arc::new(PacketSniffer::new(store.clone(), Duration::from_secs(60)));
        let service = PacketService::new(store.clone(), sniffer, CancellationToken::new());
        (router(AppState { service }), store)
    }

    fn request(method: &str, uri: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    async fn json_body<T: serde::de::DeserializeOwned>(resp: Response) -> T {
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn seed(store: &PacketStore) -> (Packet, Packet) {
        let tcp = Packet::new("192.168.1.1", "8.8.8.8", Protocol::Tcp, 80, 1500);
        let udp = Packet::new("192.168.1.2", "1.1.1.1", Protocol::Udp, 53, 512);
        store.insert(tcp.clone());
        store.insert(udp.clone());
        (tcp, udp)
    }

    #[tokio::test]
    async fn test_list_packets_with_protocol_filter() {
        let (app, store) = test_app();
        let (tcp, _) = seed(&store);

        let resp = app.oneshot(request("GET", "/api/v1/packets?protocol=TCP")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let body: PacketResponse = json_body(resp).await;
        assert_eq!(body.total, 1);
        assert_eq!(body.packets, vec![tcp]);
    }

    #[tokio::test]
    async fn test_list_packets_paginates() {
        let (app, store) = test_app();
        seed(&store);

        let resp = app
            .oneshot(request("GET", "/api/v1/packets?limit=1&offset=1"))
            .await
            .unwrap();
        let body: PacketResponse = json_body(resp).await;
        assert_eq!(body.total, 2);
        assert_eq!(body.packets.len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_limit_is_ignored() {
        let (app, store) = test_app();
        seed(&store);

        let resp = app
            .oneshot(request("GET", "/api/v1/packets?limit=abc&offset=-3"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body: PacketResponse = json_body(resp).await;
        assert_eq!(body.packets.len(), 2);
    }

    #[tokio::test]
    async fn test_unknown_protocol_is_rejected() {
        let (app, _) = test_app();

        let resp = app.oneshot(request("GET", "/api/v1/packets?protocol=SCTP")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let body: ErrorResponse = json_body(resp).await;
        assert!(body.message.contains("SCTP"));
    }

    #[tokio::test]
    async fn test_bad_timestamp_is_rejected() {
        let (app, _) = test_app();

        let resp = app
            .oneshot(request("GET", "/api/v1/packets?from_timestamp=yesterday"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_get_packet_by_id() {
        let (app, store) = test_app();
        let (tcp, _) = seed(&store);

        let resp = app
            .clone()
            .oneshot(request("GET", &format!("/api/v1/packets/{}", tcp.id)))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body: Packet = json_body(resp).await;
        assert_eq!(body, tcp);

        let resp = app.oneshot(request("GET", "/api/v1/packets/pkt_missing")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn test_delete_packet_and_clear() {
        let (app, store) = test_app();
        let (tcp, _) = seed(&store);

        let resp = app
            .clone()
            .oneshot(request("DELETE", &format!("/api/v1/packets/{}", tcp.id)))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);
        assert!(store.get(&tcp.id).is_none());

        // Missing id is still a success
        let resp = app
            .clone()
            .oneshot(request("DELETE", "/api/v1/packets/pkt_missing"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);

        let resp = app.oneshot(request("DELETE", "/api/v1/packets")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_sniffing_lifecycle() {
        let (app, _) = test_app();

        let resp = app.clone().oneshot(request("POST", "/api/v1/sniffing/start")).await.unwrap();
        let body: SniffingStatus = json_body(resp).await;
        assert!(body.running);

        let resp = app.clone().oneshot(request("GET", "/api/v1/sniffing/status")).await.unwrap();
        let body: SniffingStatus = json_body(resp).await;
        assert!(body.running);

        let resp = app.clone().oneshot(request("POST", "/api/v1/sniffing/stop")).await.unwrap();
        let body: SniffingStatus = json_body(resp).await;
        assert!(!body.running);

        let resp = app.oneshot(request("POST", "/api/v1/sniffing/stop")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_cross_origin_requests_are_allowed() {
        let (app, _) = test_app();

        let req = Request::builder()
            .method("GET")
            .uri("/api/v1/health")
            .header("origin", "http://dashboard.local")
            .body(Body::empty())
            .unwrap();
        let resp = app.clone().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()["access-control-allow-origin"], "*");

        // Preflight for a DELETE from a browser
        let req = Request::builder()
            .method("OPTIONS")
            .uri("/api/v1/packets")
            .header("origin", "http://dashboard.local")
            .header("access-control-request-method", "DELETE")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert!(resp.status().is_success());
        assert!(resp.headers().contains_key("access-control-allow-methods"));
    }

    #[tokio::test]
    async fn test_stats_and_health() {
        let (app, store) = test_app();
        seed(&store);

        let resp = app.clone().oneshot(request("GET", "/api/v1/stats")).await.unwrap();
        let stats: Stats = json_body(resp).await;
        assert_eq!(stats.total_packets, 2);
        assert_eq!(stats.capacity, 100);
        assert!(stats.oldest_at.is_some());

        let resp = app.oneshot(request("GET", "/api/v1/health")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body: serde_json::Value = json_body(resp).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["sniffing"], false);
    }
}
