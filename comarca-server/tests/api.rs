//! HTTP surface tests against the in-process router with simulated
//! adapters: job creation, polling, log paging, catalog caching, and error
//! mapping.

use std::{sync::Arc, time::Duration};

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use comarca_core::{
    LogAggregator, MemoryJobStore, Orchestrator, OrchestratorConfig,
    TribunalRegistry, store::JobStore,
};
use comarca_server::{
    config::Config, routes::create_router, sim::simulated_registry,
    state::AppState,
};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

async fn test_app() -> (Router, Arc<Orchestrator>) {
    let store: Arc<dyn JobStore> = Arc::new(MemoryJobStore::default());
    let orchestrator = Arc::new(Orchestrator::new(
        store,
        Arc::new(TribunalRegistry::builtin()),
        simulated_registry(),
        Arc::new(LogAggregator::default()),
        OrchestratorConfig {
            max_concurrent_executions: 2,
            execution_timeout: Duration::from_secs(10),
            dispatch_tick: Duration::from_millis(50),
        },
    ));
    orchestrator.start().await.unwrap();

    let state = AppState::new(
        Arc::clone(&orchestrator),
        None,
        Arc::new(Config::default()),
    );
    (create_router(state), orchestrator)
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

async fn get(router: &Router, uri: &str) -> axum::response::Response {
    router
        .clone()
        .oneshot(Request::get(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
}

async fn post_json(
    router: &Router,
    uri: &str,
    payload: Value,
) -> axum::response::Response {
    router
        .clone()
        .oneshot(
            Request::post(uri)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(payload.to_string()))
                .unwrap(),
        )
        .await
        .unwrap()
}

#[tokio::test]
async fn job_lifecycle_over_http() {
    let (router, orchestrator) = test_app().await;

    let response = post_json(
        &router,
        "/api/v1/jobs",
        json!({
            "scrape_type": "movements",
            "targets": ["TRT3-PJE-1g", "TJSP-ESAJ-unico"],
        }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let created = body_json(response).await;
    let job_id = created["data"]["id"].as_str().unwrap().to_string();
    assert_eq!(created["data"]["total_targets"], 2);

    // Poll until terminal.
    let mut status = String::new();
    for _ in 0..200 {
        let detail = body_json(get(&router, &format!("/api/v1/jobs/{job_id}")).await).await;
        status = detail["data"]["status"].as_str().unwrap().to_string();
        if status != "pending" && status != "running" {
            break;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    assert_eq!(status, "completed");

    // Logs stay queryable after completion; cursor semantics hold.
    let page = body_json(
        get(&router, &format!("/api/v1/jobs/{job_id}/logs?from_index=0")).await,
    )
    .await;
    assert_eq!(page["has_more"], false);
    assert_eq!(page["job_status"], "completed");
    let logs = page["logs"].as_array().unwrap();
    assert!(!logs.is_empty());
    let last_index = page["last_index"].as_u64().unwrap();
    assert_eq!(last_index as usize, logs.len());

    let next = body_json(
        get(
            &router,
            &format!("/api/v1/jobs/{job_id}/logs?from_index={last_index}"),
        )
        .await,
    )
    .await;
    assert!(next["logs"].as_array().unwrap().is_empty());

    orchestrator.stop().await;
}

#[tokio::test]
async fn invalid_targets_yield_bad_request() {
    let (router, orchestrator) = test_app().await;

    let response = post_json(
        &router,
        "/api/v1/jobs",
        json!({ "scrape_type": "movements", "targets": ["trt3-PJE-1g"] }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response =
        post_json(&router, "/api/v1/jobs", json!({ "scrape_type": "movements", "targets": [] }))
            .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    orchestrator.stop().await;
}

#[tokio::test]
async fn unknown_job_is_not_found() {
    let (router, orchestrator) = test_app().await;

    let response = get(
        &router,
        "/api/v1/jobs/00000000-0000-0000-0000-000000000000/logs",
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    orchestrator.stop().await;
}

#[tokio::test]
async fn tribunal_catalog_is_cacheable_and_ordered() {
    let (router, orchestrator) = test_app().await;

    let response = get(&router, "/api/v1/tribunals").await;
    assert_eq!(response.status(), StatusCode::OK);
    let cache = response
        .headers()
        .get(header::CACHE_CONTROL)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    assert!(cache.contains("stale-while-revalidate"));

    let catalog = body_json(response).await;
    let ids: Vec<String> = catalog["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["id"].as_str().unwrap().to_string())
        .collect();
    assert!(!ids.is_empty());
    let mut sorted = ids.clone();
    sorted.sort();
    assert_eq!(ids, sorted);

    orchestrator.stop().await;
}
