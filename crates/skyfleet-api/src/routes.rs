//! Router configuration.
//!
//! This module sets up the Axum router with all routes and middleware.

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use skyfleet_control::ControlPlane;
use skyfleet_jobs::JobScheduler;

use crate::handlers::{health, jobs, mci};
use crate::state::ApiState;

/// Create the API router with all routes and middleware.
///
/// # Routes
///
/// - `GET /health` - Health check
///
/// ## MCIs
/// - `GET /ns/{ns_id}/mci` - List MCIs (`?option=id` for identifiers only)
/// - `POST /ns/{ns_id}/mci` - Create MCI
/// - `GET /ns/{ns_id}/mci/{mci_id}` - Get MCI, `?action=` to control it
/// - `DELETE /ns/{ns_id}/mci/{mci_id}` - Delete MCI
///
/// ## VMs
/// - `POST /ns/{ns_id}/mci/{mci_id}/vm` - Add VMs
/// - `GET /ns/{ns_id}/mci/{mci_id}/vm/{vm_id}` - Get VM, `?action=` to control it
/// - `DELETE /ns/{ns_id}/mci/{mci_id}/vm/{vm_id}` - Delete VM
///
/// ## Scheduled jobs
/// - `GET /scheduledJob` - List jobs (`?nsId=` to filter)
/// - `POST /scheduledJob` - Create job
/// - `DELETE /scheduledJob` - Delete every job
/// - `GET /scheduledJob/{job_id}` - Get job
/// - `PUT /scheduledJob/{job_id}` - Update job
/// - `DELETE /scheduledJob/{job_id}` - Delete job
/// - `POST /scheduledJob/{job_id}/pause` - Pause job
/// - `POST /scheduledJob/{job_id}/resume` - Resume job
pub fn create_router<C, J>(state: ApiState<C, J>) -> Router
where
    C: ControlPlane + 'static,
    J: JobScheduler + 'static,
{
    let cors = build_cors_layer(&state.config.cors_origins);
    let max_body_bytes = state.config.max_body_bytes;
    let request_timeout = state.config.request_timeout();

    let state = Arc::new(state);

    Router::new()
        .route("/health", get(health::health))
        // MCIs
        .route(
            "/ns/{ns_id}/mci",
            get(mci::list_mcis::<C, J>).post(mci::create_mci::<C, J>),
        )
        .route(
            "/ns/{ns_id}/mci/{mci_id}",
            get(mci::get_mci::<C, J>).delete(mci::delete_mci::<C, J>),
        )
        // VMs
        .route("/ns/{ns_id}/mci/{mci_id}/vm", post(mci::add_vm::<C, J>))
        .route(
            "/ns/{ns_id}/mci/{mci_id}/vm/{vm_id}",
            get(mci::get_vm::<C, J>).delete(mci::delete_vm::<C, J>),
        )
        // Scheduled jobs
        .route(
            "/scheduledJob",
            get(jobs::list_jobs::<C, J>)
                .post(jobs::create_job::<C, J>)
                .delete(jobs::delete_all_jobs::<C, J>),
        )
        .route(
            "/scheduledJob/{job_id}",
            get(jobs::get_job::<C, J>)
                .put(jobs::update_job::<C, J>)
                .delete(jobs::delete_job::<C, J>),
        )
        .route(
            "/scheduledJob/{job_id}/pause",
            post(jobs::pause_job::<C, J>),
        )
        .route(
            "/scheduledJob/{job_id}/resume",
            post(jobs::resume_job::<C, J>),
        )
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(TimeoutLayer::new(request_timeout))
        .with_state(state)
}

/// Build the CORS layer from configured origins.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use skyfleet_control::{ControlPlaneService, MockCspClient};
    use skyfleet_jobs::{JobManager, MockRegistrar};
    use skyfleet_store::MemoryStore;
    use tower::ServiceExt;

    use crate::config::ApiConfig;

    fn app() -> Router {
        let store = Arc::new(MemoryStore::new());
        let csp = Arc::new(MockCspClient::new());
        csp.add_connection("aws-east", "aws", "us-east-1");
        let control = Arc::new(ControlPlaneService::with_defaults(Arc::clone(&store), csp));
        let jobs = Arc::new(JobManager::with_defaults(
            store,
            Arc::new(MockRegistrar::new()),
        ));
        create_router(ApiState::new(control, jobs, ApiConfig::default()))
    }

    async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(body.map_or_else(Body::empty, |b| Body::from(b.to_string())))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    fn vm(name: &str) -> Value {
        json!({
            "name": name,
            "connectionName": "aws-east",
            "imageId": "ubuntu22",
            "specId": "t3-small",
            "vnetId": "vnet01",
            "subnetId": "subnet01",
            "securityGroupIds": ["sg01"],
            "sshKeyId": "key01"
        })
    }

    #[test]
    fn cors_specific_origins() {
        let origins = vec![
            "http://localhost:3000".to_string(),
            "https://console.example.com".to_string(),
        ];
        let _layer = build_cors_layer(&origins);
    }

    #[tokio::test]
    async fn health_is_public() {
        let (status, body) = send(&app(), "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
    }

    #[tokio::test]
    async fn mci_lifecycle_over_http() {
        let app = app();

        let (status, body) = send(
            &app,
            "POST",
            "/ns/ns01/mci",
            Some(json!({ "name": "fleet", "vm": [vm("vm-1"), vm("vm-2")] })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "Running");
        assert_eq!(body["vm"].as_array().unwrap().len(), 2);

        let (status, body) = send(&app, "GET", "/ns/ns01/mci/fleet?action=suspend", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Suspending the MCI");

        let (status, body) = send(&app, "GET", "/ns/ns01/mci/fleet?action=status", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "Suspended");
        assert_eq!(body["targetAction"], "Complete");

        let (status, body) = send(&app, "GET", "/ns/ns01/mci/fleet?action=reboot", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["message"].as_str().unwrap().contains("Suspended"));

        let (status, body) = send(&app, "GET", "/ns/ns01/mci?option=id", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ids"], json!(["fleet"]));

        let (status, _) = send(&app, "DELETE", "/ns/ns01/mci/fleet", None).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = send(&app, "GET", "/ns/ns01/mci/fleet", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn vm_routes() {
        let app = app();
        send(
            &app,
            "POST",
            "/ns/ns01/mci",
            Some(json!({ "name": "fleet", "vm": [vm("vm-1")] })),
        )
        .await;

        let mut group = vm("web");
        group["subGroupSize"] = json!(2);
        let (status, body) = send(&app, "POST", "/ns/ns01/mci/fleet/vm", Some(group)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["vm"].as_array().unwrap().len(), 3);

        let (status, body) = send(&app, "GET", "/ns/ns01/mci/fleet/vm/web-2", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["subGroup"], "web");

        let (status, body) =
            send(&app, "GET", "/ns/ns01/mci/fleet/vm/web-2?action=reboot", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["results"].as_array().unwrap().len(), 1);

        let (status, _) = send(&app, "DELETE", "/ns/ns01/mci/fleet/vm/web-2", None).await;
        assert_eq!(status, StatusCode::OK);
        let (status, body) = send(&app, "GET", "/ns/ns01/mci/fleet/vm/web-2", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["message"].is_string());
    }

    #[tokio::test]
    async fn malformed_requests_are_rejected() {
        let app = app();

        let (status, body) = send(&app, "GET", "/ns/Bad_Ns/mci", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["message"].is_string());

        let (status, _) = send(&app, "GET", "/ns/ns01/mci/missing", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        send(
            &app,
            "POST",
            "/ns/ns01/mci",
            Some(json!({ "name": "fleet", "vm": [vm("vm-1")] })),
        )
        .await;
        let (status, body) = send(&app, "GET", "/ns/ns01/mci/fleet?action=explode", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "unknown action: explode");

        let (status, _) = send(&app, "GET", "/scheduledJob/not-a-uuid", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn scheduled_job_routes() {
        let app = app();
        let request = json!({
            "jobType": "registerCspResources",
            "nsId": "ns01",
            "connectionName": "aws-east",
            "namePrefix": "imported",
            "mciFlag": true,
            "intervalSeconds": 3600
        });

        let (status, job) = send(&app, "POST", "/scheduledJob", Some(request.clone())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(job["executionCount"], 1);
        let id = job["id"].as_str().unwrap().to_string();

        let (status, body) = send(&app, "POST", "/scheduledJob", Some(request)).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(body["message"].as_str().unwrap().contains(&id));

        let (status, job) = send(&app, "POST", &format!("/scheduledJob/{id}/pause"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(job["enabled"], false);

        let (status, job) = send(
            &app,
            "PUT",
            &format!("/scheduledJob/{id}"),
            Some(json!({ "intervalSeconds": 5, "enabled": true })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(job["intervalSeconds"], 10);
        assert_eq!(job["enabled"], true);

        let (status, body) = send(&app, "GET", "/scheduledJob?nsId=ns01", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["jobs"].as_array().unwrap().len(), 1);

        let (status, body) = send(&app, "DELETE", &format!("/scheduledJob/{id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "Stopped");

        let (status, _) = send(&app, "GET", &format!("/scheduledJob/{id}"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = send(&app, "DELETE", "/scheduledJob", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["deleted"], 0);
    }
}
