use axum_server::tls_rustls::RustlsConfig;
use crate::sensor_logic::config::Config;
use crate::sensor_logic::model::{ControlRequest, ControlResponse, ErrorBody};
use crate::sensor_logic::state::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::sse::{Event, Sse},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures_util::{Stream, StreamExt};
use lib_common::{stats, NoDataError};
use std::convert::Infallible;
use std::net::SocketAddr;
use tokio::sync::broadcast;
use tower_http::cors::{Any, CorsLayer};

const DEFAULT_RECENT_LIMIT: usize = 50;

pub async fn run(
    config: Config,
    app_state: AppState,
    mut shutdown: broadcast::Receiver<()>,
) {
    let app = router(app_state);

    let addr: SocketAddr = format!("{}:{}", config.host(), config.port())
        .parse()
        .expect("Invalid host/port for the HTTP listener");
    log::info!("Downstream server listening on {}", addr);

    if let (Some(cert_path), Some(key_path)) = (config.tls_cert_path, config.tls_key_path) {
        let tls_config = RustlsConfig::from_pem_file(cert_path, key_path)
            .await
            .expect("Failed to load TLS configuration");

        axum_server::bind_rustls(addr, tls_config)
            .serve(app.into_make_service())
            .await
            .unwrap();
    } else {
        let listener = tokio::net::TcpListener::bind(&addr).await.unwrap();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                shutdown.recv().await.ok();
                log::info!("Downstream server shutting down.");
            })
            .await
            .unwrap();
    }
}

// Dashboards are served from other origins, so every route is wide open.
fn router(app_state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/all-data", get(all_data_handler))
        .route("/api/current-data", get(current_data_handler))
        .route("/api/recent-data", get(recent_data_default_handler))
        .route("/api/recent-data/{limit}", get(recent_data_handler))
        .route("/api/statistics", get(statistics_handler))
        .route("/api/realtime-stream", get(realtime_stream_handler))
        .route("/api/realtime-control", post(realtime_control_handler))
        .route("/health", get(health_handler))
        .layer(cors)
        .with_state(app_state)
}

fn no_data_response(err: NoDataError) -> Response {
    (StatusCode::NOT_FOUND, Json(ErrorBody { error: err.to_string() })).into_response()
}

async fn all_data_handler(State(state): State<AppState>) -> Response {
    match state.store.all() {
        Ok(records) => Json((*records).clone()).into_response(),
        Err(err) => no_data_response(err),
    }
}

async fn current_data_handler(State(state): State<AppState>) -> Response {
    match state.cursor.current() {
        Ok(position) => Json(position.reading()).into_response(),
        Err(err) => no_data_response(err),
    }
}

async fn recent_data_default_handler(State(state): State<AppState>) -> Response {
    recent_response(&state, DEFAULT_RECENT_LIMIT)
}

async fn recent_data_handler(
    State(state): State<AppState>,
    Path(limit): Path<String>,
) -> Response {
    // A limit that does not parse falls back to the default instead of 400.
    let limit = limit.parse().unwrap_or(DEFAULT_RECENT_LIMIT);
    recent_response(&state, limit)
}

fn recent_response(state: &AppState, limit: usize) -> Response {
    match state.store.recent(limit) {
        Ok(records) => Json(records).into_response(),
        Err(err) => no_data_response(err),
    }
}

async fn statistics_handler(State(state): State<AppState>) -> Response {
    let records = state.store.snapshot();
    match stats::compute(&records) {
        Some(snapshot) => Json(snapshot).into_response(),
        // This route reports an empty store in the body, not the status line.
        None => (StatusCode::OK, Json(ErrorBody { error: NoDataError.to_string() })).into_response(),
    }
}

async fn realtime_stream_handler(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = state.hub.subscribe().map(|frame| {
        let payload =
            serde_json::to_string(frame.as_ref()).unwrap_or_else(|_| "{}".to_string());
        Ok(Event::default().data(payload))
    });
    Sse::new(stream)
}

async fn realtime_control_handler(Json(request): Json<ControlRequest>) -> impl IntoResponse {
    log::info!(
        "Realtime control request: action={}, speed={:?}",
        request.action,
        request.speed
    );
    Json(ControlResponse {
        status: "success".to_string(),
        action: request.action.clone(),
        speed: request.speed.clone(),
        message: format!("Action '{}' acknowledged", request.action),
    })
}

async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

#[cfg(test)]
mod tests {
    use super::*;
    use lib_common::{CsvFileSource, ReplayScheduler};
    use serde_json::{json, Value};
    use std::time::Duration;
    use tempfile::NamedTempFile;
    use tokio::time::timeout;

    const CSV: &str = "\
timestamp,temperature,humidity,battery_voltage,motion
2025-11-08T09:00:00Z,21.5,45.0,4.2,0
2025-11-08T09:00:02Z,22.0,46.5,4.15,1
2025-11-08T09:00:04Z,22.5,44.0,4.1,1
2025-11-08T09:00:06Z,21.0,47.5,4.05,0
";

    fn seeded_state() -> AppState {
        let file = NamedTempFile::new().unwrap();
        std::fs::write(file.path(), CSV).unwrap();
        let state = AppState::new();
        state.store.load(&CsvFileSource::new(file.path())).unwrap();
        state
    }

    async fn spawn_app(state: AppState) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = router(state);
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    async fn get_json(url: String) -> (reqwest::StatusCode, Value) {
        let response = reqwest::get(url).await.unwrap();
        let status = response.status();
        (status, response.json().await.unwrap())
    }

    /// Accumulates chunks until one full `data: ...\n\n` event is buffered,
    /// then returns its JSON payload.
    async fn next_event(response: &mut reqwest::Response, buffer: &mut String) -> Value {
        let event = timeout(Duration::from_secs(5), async {
            loop {
                if let Some(end) = buffer.find("\n\n") {
                    let event: String = buffer.drain(..end + 2).collect();
                    return event;
                }
                let chunk = response.chunk().await.unwrap().expect("stream ended early");
                buffer.push_str(std::str::from_utf8(&chunk).unwrap());
            }
        })
        .await
        .expect("timed out waiting for an event");

        let payload: String = event
            .lines()
            .filter_map(|line| line.strip_prefix("data: "))
            .collect();
        serde_json::from_str(&payload).unwrap()
    }

    #[tokio::test]
    async fn all_data_returns_the_full_batch_in_order() {
        let base = spawn_app(seeded_state()).await;
        let (status, body) = get_json(format!("{base}/api/all-data")).await;

        assert_eq!(status, reqwest::StatusCode::OK);
        let records = body.as_array().unwrap();
        assert_eq!(records.len(), 4);
        assert_eq!(records[0]["id"], 1);
        assert_eq!(records[0]["temperature"], 21.5);
        assert_eq!(records[3]["id"], 4);
    }

    #[tokio::test]
    async fn all_data_on_an_empty_store_is_404_with_an_error_body() {
        let base = spawn_app(AppState::new()).await;
        let (status, body) = get_json(format!("{base}/api/all-data")).await;

        assert_eq!(status, reqwest::StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "No data available");
    }

    #[tokio::test]
    async fn current_data_merges_cursor_position_and_totals() {
        let state = seeded_state();
        state.cursor.advance().unwrap();
        let base = spawn_app(state).await;

        let (status, body) = get_json(format!("{base}/api/current-data")).await;
        assert_eq!(status, reqwest::StatusCode::OK);
        assert_eq!(body["current_index"], 1);
        assert_eq!(body["total_records"], 4);
        assert_eq!(body["temperature"], 22.0);
        assert!(body["timestamp"].as_str().unwrap().ends_with('Z'));
    }

    #[tokio::test]
    async fn recent_data_tail_and_default_limit() {
        let base = spawn_app(seeded_state()).await;

        let (_, tail) = get_json(format!("{base}/api/recent-data/2")).await;
        let records = tail.as_array().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["id"], 3);
        assert_eq!(records[1]["id"], 4);

        // No limit, an oversized limit, and garbage all return the whole
        // 4-record batch (default limit is 50).
        for suffix in ["", "/100", "/not-a-number"] {
            let (status, body) = get_json(format!("{base}/api/recent-data{suffix}")).await;
            assert_eq!(status, reqwest::StatusCode::OK);
            assert_eq!(body.as_array().unwrap().len(), 4, "suffix {suffix:?}");
        }
    }

    #[tokio::test]
    async fn recent_data_on_an_empty_store_is_404() {
        let base = spawn_app(AppState::new()).await;
        let (status, body) = get_json(format!("{base}/api/recent-data")).await;
        assert_eq!(status, reqwest::StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "No data available");
    }

    #[tokio::test]
    async fn statistics_reflect_the_loaded_batch() {
        let base = spawn_app(seeded_state()).await;
        let (status, body) = get_json(format!("{base}/api/statistics")).await;

        assert_eq!(status, reqwest::StatusCode::OK);
        assert_eq!(body["total_records"], 4);
        assert_eq!(body["temperature"]["min"], 21.0);
        assert_eq!(body["temperature"]["max"], 22.5);
        assert_eq!(body["motion"]["total_detections"], 2);
        assert_eq!(body["motion"]["detection_rate"], "50.0");
        assert_eq!(body["motion"]["longest_activation"], 2);
        let trend = body["battery"]["trend"].as_f64().unwrap();
        assert!((trend - (-0.15)).abs() < 1e-9);
    }

    #[tokio::test]
    async fn statistics_on_an_empty_store_stay_200_with_an_error_body() {
        let base = spawn_app(AppState::new()).await;
        let (status, body) = get_json(format!("{base}/api/statistics")).await;

        assert_eq!(status, reqwest::StatusCode::OK);
        assert_eq!(body["error"], "No data available");
    }

    #[tokio::test]
    async fn control_requests_are_acknowledged_verbatim() {
        let base = spawn_app(seeded_state()).await;
        let client = reqwest::Client::new();
        let response = client
            .post(format!("{base}/api/realtime-control"))
            .json(&json!({"action": "set_speed", "speed": 1000}))
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), reqwest::StatusCode::OK);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["status"], "success");
        assert_eq!(body["action"], "set_speed");
        assert_eq!(body["speed"], 1000);
        assert!(body["message"].as_str().unwrap().contains("set_speed"));
    }

    #[tokio::test]
    async fn realtime_stream_sends_initial_then_tick_updates() {
        let state = seeded_state();
        let scheduler = ReplayScheduler::new(
            state.cursor.clone(),
            state.hub.clone(),
            Duration::from_millis(10),
        );
        let base = spawn_app(state).await;

        let mut response = reqwest::get(format!("{base}/api/realtime-stream")).await.unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::OK);
        let content_type = response.headers()[reqwest::header::CONTENT_TYPE]
            .to_str()
            .unwrap()
            .to_string();
        assert!(content_type.starts_with("text/event-stream"));

        let mut buffer = String::new();
        let first = next_event(&mut response, &mut buffer).await;
        assert_eq!(first["type"], "initial_data");
        assert_eq!(first["data"]["current_index"], 0);
        assert_eq!(first["data"]["total_records"], 4);

        // Drive the replay by hand; each tick becomes one update frame.
        scheduler.tick();
        let second = next_event(&mut response, &mut buffer).await;
        assert_eq!(second["type"], "realtime_update");
        assert_eq!(second["data"]["current_index"], 1);

        scheduler.tick();
        let third = next_event(&mut response, &mut buffer).await;
        assert_eq!(third["data"]["current_index"], 2);
        assert_eq!(third["data"]["temperature"], 22.5);
    }

    #[tokio::test]
    async fn closing_the_stream_connection_frees_its_slot() {
        let state = seeded_state();
        let hub = state.hub.clone();
        let base = spawn_app(state).await;

        let mut response = reqwest::get(format!("{base}/api/realtime-stream")).await.unwrap();
        let mut buffer = String::new();
        next_event(&mut response, &mut buffer).await;
        assert_eq!(hub.subscriber_count(), 1);

        // Teardown is asynchronous; poll until the hub notices the close.
        drop(response);
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while hub.subscriber_count() != 0 {
            assert!(
                tokio::time::Instant::now() < deadline,
                "subscriber was never pruned"
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[tokio::test]
    async fn cors_allows_any_origin() {
        let base = spawn_app(seeded_state()).await;
        let client = reqwest::Client::new();
        let response = client
            .get(format!("{base}/api/all-data"))
            .header(reqwest::header::ORIGIN, "http://dashboard.example")
            .send()
            .await
            .unwrap();

        assert_eq!(
            response
                .headers()
                .get(reqwest::header::ACCESS_CONTROL_ALLOW_ORIGIN)
                .and_then(|v| v.to_str().ok()),
            Some("*")
        );
    }

    #[tokio::test]
    async fn health_endpoint_answers_ok() {
        let base = spawn_app(seeded_state()).await;
        let response = reqwest::get(format!("{base}/health")).await.unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::OK);
        assert_eq!(response.text().await.unwrap(), "OK");
    }
}
