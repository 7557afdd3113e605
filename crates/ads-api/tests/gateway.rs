//! Local gateway over a locally provisioned stage.

use std::sync::Arc;
use std::time::Duration;

use ads_api::{GatewayState, build_router};
use ads_core::{AdsConfig, Manifest};
use ads_pack::DescriptorPackager;
use ads_provision::{
    ControlPlane, LocalCloud, ProvisionSettings, Provisioner, RetryPolicy, RunStatus, WaitPolicy,
};
use ads_state::StateStore;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{Value, json};
use tower::ServiceExt;

async fn provisioned_store() -> StateStore {
    let store = StateStore::open_in_memory().unwrap();
    let cloud = Arc::new(LocalCloud::new(store.clone(), "eu-west-1").with_activation_polls(1));
    let settings = ProvisionSettings {
        propagation_delay: Duration::ZERO,
        table_wait: WaitPolicy {
            timeout: Duration::from_secs(1),
            interval: Duration::from_millis(1),
        },
        retry: RetryPolicy {
            attempts: 1,
            backoff: Duration::ZERO,
        },
        always_redeploy: false,
    };
    let report = Provisioner::new(
        ControlPlane::unified(cloud),
        Arc::new(DescriptorPackager),
        Manifest::classifieds(&AdsConfig::minimal("gateway-test")),
        settings,
    )
    .run()
    .await;
    assert_eq!(report.status(), RunStatus::FullyDeployed, "{report}");
    store
}

fn router(store: StateStore) -> Router {
    build_router(GatewayState::new(store, "ClassifiedsAPI", "prod"))
}

async fn send(router: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, axum::http::HeaderMap, Value) {
    let body = match body {
        Some(v) => Body::from(serde_json::to_vec(&v).unwrap()),
        None => Body::empty(),
    };
    let req = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(body)
        .unwrap();
    let resp = router.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let headers = resp.headers().clone();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, headers, value)
}

#[tokio::test]
async fn listing_lifecycle() {
    let router = router(provisioned_store().await);

    let (status, headers, created) = send(
        &router,
        "POST",
        "/prod/listings",
        Some(json!({"titulo": "Bike", "descripcion": "Red bike"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers["access-control-allow-origin"], "*");
    assert_eq!(created["titulo"], "Bike");
    let id = created["id"].as_str().unwrap().to_string();

    let (status, _, listed) = send(&router, "GET", "/prod/listings", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed.as_array().unwrap().len(), 1);

    let (status, _, fetched) = send(&router, "GET", &format!("/prod/listings/{id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["descripcion"], "Red bike");

    let (status, _, missing) = send(&router, "GET", "/prod/listings/does-not-exist", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(missing["error"].is_string());
}

#[tokio::test]
async fn comments_are_scoped_to_their_listing() {
    let router = router(provisioned_store().await);

    for (listing, text) in [("a1", "first"), ("a1", "second"), ("b2", "other")] {
        let (status, _, comment) = send(
            &router,
            "POST",
            &format!("/prod/listings/{listing}/comments"),
            Some(json!({"usuario": "ana", "mensaje": text})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(comment["listing_id"], listing);
    }

    let (status, _, comments) = send(&router, "GET", "/prod/listings/a1/comments", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(comments.as_array().unwrap().len(), 2);

    let (status, _, _) = send(
        &router,
        "POST",
        "/prod/listings/a1/comments",
        Some(json!({"usuario": "ana"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn cors_preflight_is_answered_by_the_gateway() {
    let router = router(provisioned_store().await);

    let (status, headers, _) = send(&router, "OPTIONS", "/prod/listings/abc/comments", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers["access-control-allow-methods"], "GET,POST,OPTIONS");
    assert_eq!(headers["access-control-allow-origin"], "*");
    assert!(
        headers["access-control-allow-headers"]
            .to_str()
            .unwrap()
            .contains("Content-Type")
    );

    let (_, headers, _) = send(&router, "OPTIONS", "/prod/listings/abc", None).await;
    assert_eq!(headers["access-control-allow-methods"], "GET,OPTIONS");
}

#[tokio::test]
async fn malformed_body_is_rejected_by_the_handler() {
    let router = router(provisioned_store().await);
    let req = Request::builder()
        .method("POST")
        .uri("/prod/listings")
        .body(Body::from("{not json"))
        .unwrap();
    let resp = router.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_routes_and_verbs() {
    let router = router(provisioned_store().await);

    let (status, _, _) = send(&router, "GET", "/prod/users", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _, _) = send(&router, "DELETE", "/prod/listings", None).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);

    let (status, _, _) = send(&router, "GET", "/dev/listings", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn nothing_is_served_before_provisioning() {
    let router = router(StateStore::open_in_memory().unwrap());
    let (status, _, body) = send(&router, "GET", "/prod/listings", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "stage prod is not deployed");
}
