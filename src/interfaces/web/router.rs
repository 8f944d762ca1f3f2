use axum::{
    Router,
    body::Body,
    http::{HeaderValue, Method, Request, header},
    middleware,
    middleware::Next,
    routing::{get, patch},
};
use tower_http::cors::CorsLayer;

use super::AppState;
use super::handlers::{agents, health, outputs, runs};

fn build_localhost_cors(api_host: &str, api_port: u16) -> CorsLayer {
    let origins: Vec<HeaderValue> = [
        format!("http://{}:{}", api_host, api_port),
        format!("http://127.0.0.1:{}", api_port),
        format!("http://localhost:{}", api_port),
    ]
    .iter()
    .filter_map(|o| o.parse().ok())
    .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::OPTIONS])
        .allow_headers(tower_http::cors::Any)
}

pub fn build_api_router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health::healthcheck))
        .route(
            "/api/agents",
            get(agents::get_agents).post(agents::create_agent_endpoint),
        )
        .route(
            "/api/agents/{id}",
            get(agents::get_agent_endpoint).patch(agents::update_agent_endpoint),
        )
        .route("/api/runs", get(runs::get_runs).post(runs::start_run_endpoint))
        .route("/api/runs/{id}", get(runs::get_run_endpoint))
        .route(
            "/api/runs/{id}/status",
            patch(runs::update_run_status_endpoint),
        )
        .route(
            "/api/runs/{id}/outputs",
            get(outputs::get_outputs_endpoint).post(outputs::create_output_endpoint),
        )
        .route("/api/runs/{id}/stream", get(runs::stream_run_endpoint))
        .route("/api/logs", get(super::sse_logs_endpoint))
        .layer(middleware::from_fn(security_headers))
        .layer(build_localhost_cors(&state.api_host, state.api_port))
        .with_state(state)
}

async fn security_headers(req: Request<Body>, next: Next) -> axum::response::Response {
    let mut response = next.run(req).await;
    let headers = response.headers_mut();
    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
    headers.insert(
        header::CONTENT_SECURITY_POLICY,
        HeaderValue::from_static("default-src 'none'"),
    );
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::service::{Services, test_services};
    use crate::core::store::types::{RunStatus, RunStatusChange};
    use axum::http::StatusCode;
    use serde_json::{Value, json};
    use std::collections::HashSet;
    use std::time::Duration;
    use tower::util::ServiceExt;

    async fn test_state() -> AppState {
        state_for(test_services().await)
    }

    fn state_for(services: Services) -> AppState {
        let (log_tx, _) = tokio::sync::broadcast::channel(16);
        AppState {
            services,
            log_tx,
            api_host: "127.0.0.1".to_string(),
            api_port: 17990,
        }
    }

    async fn json_request(
        app: Router,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let body = match body {
            Some(json) => Body::from(serde_json::to_string(&json).unwrap()),
            None => Body::empty(),
        };

        let req = Request::builder()
            .method(method)
            .uri(path)
            .header("content-type", "application/json")
            .body(body)
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        let status = resp.status();
        let body_bytes = axum::body::to_bytes(resp.into_body(), 1024 * 1024)
            .await
            .unwrap();
        let json: Value = serde_json::from_slice(&body_bytes).unwrap_or(json!({}));
        (status, json)
    }

    /// Collects the `data:` payloads of a finished SSE response.
    async fn sse_events(app: Router, path: &str) -> (StatusCode, Vec<Value>) {
        let req = Request::builder()
            .method(Method::GET)
            .uri(path)
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = tokio::time::timeout(
            Duration::from_secs(5),
            axum::body::to_bytes(resp.into_body(), 1024 * 1024),
        )
        .await
        .expect("stream should end")
        .unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        let events = text
            .lines()
            .filter_map(|line| line.strip_prefix("data: "))
            .map(|data| serde_json::from_str(data).unwrap())
            .collect();
        (status, events)
    }

    fn agent_body(name: &str) -> Value {
        json!({
            "name": name,
            "description": "keeps the lights on",
            "role": "operator",
            "goal": "zero downtime",
            "backstory": "ran a datacenter"
        })
    }

    async fn create_agent(state: &AppState, name: &str) -> i64 {
        let (status, json) = json_request(
            build_api_router(state.clone()),
            Method::POST,
            "/api/agents",
            Some(agent_body(name)),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{json}");
        json["agent"]["id"].as_i64().unwrap()
    }

    async fn start_run(state: &AppState, agent_id: i64) -> i64 {
        let (status, json) = json_request(
            build_api_router(state.clone()),
            Method::POST,
            "/api/runs",
            Some(json!({ "agent_id": agent_id, "input_text": "audit the cluster" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{json}");
        json["run"]["id"].as_i64().unwrap()
    }

    #[tokio::test]
    async fn security_headers_present_on_responses() {
        let app = build_api_router(test_state().await);
        let req = Request::builder()
            .method(Method::GET)
            .uri("/api/health")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();

        assert_eq!(
            resp.headers().get("x-content-type-options").unwrap(),
            "nosniff"
        );
        assert_eq!(resp.headers().get("x-frame-options").unwrap(), "DENY");
        assert!(resp.headers().get("content-security-policy").is_some());
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let app = build_api_router(test_state().await);
        let (status, json) = json_request(app, Method::GET, "/api/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["success"], true);
        assert_eq!(json["status"], "ok");
        assert!(json["timestamp"].as_str().is_some());
    }

    #[tokio::test]
    async fn create_and_fetch_agent() {
        let state = test_state().await;
        let id = create_agent(&state, "ops").await;

        let (status, json) = json_request(
            build_api_router(state.clone()),
            Method::GET,
            &format!("/api/agents/{}", id),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["agent"]["name"], "ops");
        assert_eq!(json["agent"]["is_active"], true);

        let (_, json) =
            json_request(build_api_router(state), Method::GET, "/api/agents", None).await;
        assert_eq!(json["agents"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn missing_agent_is_null_not_error() {
        let app = build_api_router(test_state().await);
        let (status, json) = json_request(app, Method::GET, "/api/agents/77", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["success"], true);
        assert!(json["agent"].is_null());
    }

    #[tokio::test]
    async fn blank_agent_field_is_bad_request() {
        let app = build_api_router(test_state().await);
        let mut body = agent_body("ops");
        body["backstory"] = json!("");
        let (status, json) = json_request(app, Method::POST, "/api/agents", Some(body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["success"], false);
        assert_eq!(json["error"], "backstory is required");
    }

    #[tokio::test]
    async fn malformed_body_is_bad_request() {
        let app = build_api_router(test_state().await);
        let (status, json) = json_request(
            app,
            Method::POST,
            "/api/runs",
            Some(json!({ "agent_id": "not-a-number" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["success"], false);
    }

    #[tokio::test]
    async fn non_numeric_ids_get_the_error_envelope() {
        let state = test_state().await;
        for (method, path) in [
            (Method::GET, "/api/agents/abc"),
            (Method::GET, "/api/runs/latest"),
            (Method::GET, "/api/runs/x/outputs"),
            (Method::GET, "/api/runs/x/stream"),
        ] {
            let app = build_api_router(state.clone());
            let (status, json) = json_request(app, method, path, None).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{}", path);
            assert_eq!(json["success"], false, "{}", path);
            assert!(json["error"].as_str().is_some_and(|e| !e.is_empty()), "{}", path);
        }
    }

    #[tokio::test]
    async fn bad_query_string_gets_the_error_envelope() {
        let state = test_state().await;
        for path in ["/api/runs?agent_id=seven", "/api/agents?include_inactive=maybe"] {
            let app = build_api_router(state.clone());
            let (status, json) = json_request(app, Method::GET, path, None).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{}", path);
            assert_eq!(json["success"], false, "{}", path);
            assert!(json["error"].as_str().is_some_and(|e| !e.is_empty()), "{}", path);
        }
    }

    #[tokio::test]
    async fn deactivated_agent_hidden_and_cannot_run() {
        let state = test_state().await;
        let id = create_agent(&state, "retired").await;

        let (status, json) = json_request(
            build_api_router(state.clone()),
            Method::PATCH,
            &format!("/api/agents/{}", id),
            Some(json!({ "is_active": false, "description": null })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["agent"]["is_active"], false);
        assert!(json["agent"]["description"].is_null());

        let (_, json) =
            json_request(build_api_router(state.clone()), Method::GET, "/api/agents", None).await;
        assert_eq!(json["agents"].as_array().unwrap().len(), 0);
        let (_, json) = json_request(
            build_api_router(state.clone()),
            Method::GET,
            "/api/agents?include_inactive=true",
            None,
        )
        .await;
        assert_eq!(json["agents"].as_array().unwrap().len(), 1);

        let (status, json) = json_request(
            build_api_router(state),
            Method::POST,
            "/api/runs",
            Some(json!({ "agent_id": id, "input_text": "one more job" })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(json["success"], false);
    }

    #[tokio::test]
    async fn run_for_missing_agent_is_not_found() {
        let app = build_api_router(test_state().await);
        let (status, json) = json_request(
            app,
            Method::POST,
            "/api/runs",
            Some(json!({ "agent_id": 5, "input_text": "hello" })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["error"], "Agent with ID 5 not found");
    }

    #[tokio::test]
    async fn status_patch_honours_explicit_null() {
        let state = test_state().await;
        let agent_id = create_agent(&state, "ops").await;
        let run_id = start_run(&state, agent_id).await;
        let path = format!("/api/runs/{}/status", run_id);

        let (status, json) = json_request(
            build_api_router(state.clone()),
            Method::PATCH,
            &path,
            Some(json!({ "status": "running" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["run"]["status"], "running");
        assert!(json["run"]["started_at"].is_string());

        let (_, json) = json_request(
            build_api_router(state.clone()),
            Method::PATCH,
            &path,
            Some(json!({ "status": "pending", "started_at": null })),
        )
        .await;
        assert_eq!(json["run"]["status"], "pending");
        assert!(json["run"]["started_at"].is_null());

        let (status, json) = json_request(
            build_api_router(state),
            Method::PATCH,
            "/api/runs/999/status",
            Some(json!({ "status": "failed" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(json["run"].is_null());
    }

    #[tokio::test]
    async fn unknown_status_is_bad_request() {
        let state = test_state().await;
        let agent_id = create_agent(&state, "ops").await;
        let run_id = start_run(&state, agent_id).await;
        let (status, _) = json_request(
            build_api_router(state),
            Method::PATCH,
            &format!("/api/runs/{}/status", run_id),
            Some(json!({ "status": "paused" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn outputs_roundtrip_and_show_in_run_detail() {
        let state = test_state().await;
        let agent_id = create_agent(&state, "ops").await;
        let run_id = start_run(&state, agent_id).await;
        let path = format!("/api/runs/{}/outputs", run_id);

        for (kind, content) in [("log", "scanning"), ("result", "all green")] {
            let (status, json) = json_request(
                build_api_router(state.clone()),
                Method::POST,
                &path,
                Some(json!({ "output_type": kind, "content": content })),
            )
            .await;
            assert_eq!(status, StatusCode::OK, "{json}");
            assert_eq!(json["output"]["run_id"], run_id);
        }

        let (_, json) =
            json_request(build_api_router(state.clone()), Method::GET, &path, None).await;
        let outputs = json["outputs"].as_array().unwrap();
        assert_eq!(outputs.len(), 2);
        assert_eq!(outputs[0]["content"], "scanning");

        let (_, json) = json_request(
            build_api_router(state.clone()),
            Method::GET,
            &format!("/api/runs/{}", run_id),
            None,
        )
        .await;
        assert_eq!(json["run"]["id"], run_id);
        assert_eq!(json["run"]["outputs"].as_array().unwrap().len(), 2);

        let (_, json) = json_request(
            build_api_router(state),
            Method::GET,
            &format!("/api/runs?agent_id={}", agent_id),
            None,
        )
        .await;
        assert_eq!(json["runs"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn output_for_missing_run_is_not_found() {
        let app = build_api_router(test_state().await);
        let (status, json) = json_request(
            app,
            Method::POST,
            "/api/runs/31/outputs",
            Some(json!({ "output_type": "log", "content": "orphan" })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["error"], "Agent run with ID 31 not found");
    }

    #[tokio::test]
    async fn stream_of_missing_run_is_json_404() {
        let app = build_api_router(test_state().await);
        let (status, json) = json_request(app, Method::GET, "/api/runs/8/stream", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["success"], false);
        assert_eq!(json["error"], "Agent run with ID 8 not found");
    }

    #[tokio::test]
    async fn stream_of_finished_run_replays_as_sse() {
        let state = test_state().await;
        let agent_id = create_agent(&state, "ops").await;
        let run_id = start_run(&state, agent_id).await;
        let path = format!("/api/runs/{}/outputs", run_id);
        for (kind, content) in [("result", "A"), ("log", "B"), ("result", "C")] {
            json_request(
                build_api_router(state.clone()),
                Method::POST,
                &path,
                Some(json!({ "output_type": kind, "content": content })),
            )
            .await;
        }
        state
            .services
            .runs
            .set_status(run_id, &RunStatusChange::to(RunStatus::Completed))
            .await
            .unwrap();

        let (status, events) =
            sse_events(build_api_router(state), &format!("/api/runs/{}/stream", run_id)).await;
        assert_eq!(status, StatusCode::OK);
        let kinds: Vec<&str> = events.iter().map(|e| e["type"].as_str().unwrap()).collect();
        assert_eq!(kinds, vec!["output", "output", "output", "complete"]);
        assert_eq!(events[0]["output"]["content"], "A");
        assert_eq!(events[3]["final_result"], "A\nC");
    }

    #[tokio::test]
    async fn stream_of_live_run_follows_status() {
        let state = test_state().await;
        let agent_id = create_agent(&state, "ops").await;
        let run_id = start_run(&state, agent_id).await;

        let runs = state.services.runs.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            runs.set_status(run_id, &RunStatusChange::to(RunStatus::Running))
                .await
                .unwrap();
            tokio::time::sleep(Duration::from_millis(50)).await;
            runs.set_status(run_id, &RunStatusChange::to(RunStatus::Failed))
                .await
                .unwrap();
        });

        let (_, events) =
            sse_events(build_api_router(state), &format!("/api/runs/{}/stream", run_id)).await;
        let last = events.last().unwrap();
        assert_eq!(last["type"], "complete");
        assert!(last.get("final_result").is_none());
        assert!(
            events
                .iter()
                .any(|e| e["type"] == "status_update" && e["status"] == "failed")
        );
    }

    #[tokio::test]
    async fn method_not_allowed_returns_405() {
        let app = build_api_router(test_state().await);
        let req = Request::builder()
            .method(Method::DELETE)
            .uri("/api/agents")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn api_route_contract_has_all_expected_paths() {
        let paths = [
            "/api/health",
            "/api/agents",
            "/api/agents/1",
            "/api/runs",
            "/api/runs/1",
            "/api/runs/1/status",
            "/api/runs/1/outputs",
            "/api/runs/1/stream",
            "/api/logs",
        ];

        let unique: HashSet<&str> = paths.iter().copied().collect();
        assert_eq!(unique.len(), paths.len(), "Duplicate routes found in route contract");

        let app = build_api_router(test_state().await);
        for path in paths {
            let req = Request::builder()
                .method(Method::PUT)
                .uri(path)
                .body(Body::empty())
                .expect("request should build");
            let resp = app
                .clone()
                .oneshot(req)
                .await
                .expect("router oneshot should succeed");
            assert_ne!(
                resp.status(),
                StatusCode::NOT_FOUND,
                "Route missing from router: {}",
                path
            );
        }
    }
}
