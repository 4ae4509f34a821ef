//! Route-level tests driven through the router without a socket.

use std::fs;
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use igpub_export::{
    ExportOrchestrator, PackageArchiveStore, ProgressBroker, StripExportExtensions,
};
use igpub_server::config::AppConfig;
use igpub_server::state::AppState;
use igpub_storage::MemoryRepository;
use serde_json::{Value, json};
use tower::ServiceExt;

fn seeded_repository() -> Arc<MemoryRepository> {
    let repository = MemoryRepository::new();
    repository
        .insert(json!({
            "resourceType": "ImplementationGuide",
            "id": "ig-1",
            "url": "http://example.com/fhir/ImplementationGuide/ig-1",
            "name": "ExampleIg",
            "definition": {
                "resource": [
                    { "reference": { "reference": "ValueSet/vs-1" } }
                ]
            }
        }))
        .unwrap();
    repository
        .insert(json!({ "resourceType": "ValueSet", "id": "vs-1", "name": "ExampleCodes" }))
        .unwrap();
    Arc::new(repository)
}

fn test_state(export_root: &Path) -> AppState {
    let repository = seeded_repository();
    let config = AppConfig::default();
    let mut orchestrator_config = config.orchestrator_config().unwrap();
    orchestrator_config.export_root = export_root.to_path_buf();
    orchestrator_config.deploy_root = export_root.join("deploy");
    orchestrator_config.ready_grace = Duration::from_millis(10);

    AppState {
        repository: repository.clone(),
        orchestrator: Arc::new(ExportOrchestrator::new(
            repository,
            Arc::new(StripExportExtensions::default()),
            ProgressBroker::new(),
            orchestrator_config,
        )),
        archive: Arc::new(PackageArchiveStore::new(export_root)),
    }
}

async fn body_bytes(response: axum::response::Response) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

#[tokio::test]
async fn test_bundle_export_returns_collection() {
    let root = tempfile::tempdir().unwrap();
    let router = igpub_server::build_router(test_state(root.path()));

    let response = router
        .oneshot(
            Request::post("/export/ig-1?exportFormat=1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let document: Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(document["resourceType"], "Bundle");
    assert_eq!(document["type"], "collection");
    assert_eq!(document["total"], 2);
    assert_eq!(
        document["entry"][0]["resource"]["resourceType"],
        "ImplementationGuide"
    );
    assert_eq!(document["entry"][1]["resource"]["id"], "vs-1");
}

#[tokio::test]
async fn test_bundle_export_as_xml() {
    let root = tempfile::tempdir().unwrap();
    let router = igpub_server::build_router(test_state(root.path()));

    let response = router
        .oneshot(
            Request::post("/export/ig-1?exportFormat=1&_format=application/xml")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "application/fhir+xml"
    );
    let body = String::from_utf8(body_bytes(response).await).unwrap();
    assert!(body.contains("<Bundle xmlns=\"http://hl7.org/fhir\">"));
}

#[tokio::test]
async fn test_bundle_export_unknown_guide_is_404() {
    let root = tempfile::tempdir().unwrap();
    let router = igpub_server::build_router(test_state(root.path()));

    let response = router
        .oneshot(
            Request::post("/export/nope?exportFormat=1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_html_export_returns_package_id() {
    let root = tempfile::tempdir().unwrap();
    let state = test_state(root.path());
    let router = igpub_server::build_router(state.clone());

    let response = router
        .oneshot(
            Request::post("/export/ig-1?exportFormat=2&executeIgPublisher=false")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let package_id = String::from_utf8(body_bytes(response).await).unwrap();
    assert!(!package_id.is_empty());
    assert!(state.orchestrator.registry().status(&package_id).is_some());
}

#[tokio::test]
async fn test_package_download_is_zip_and_one_shot() {
    let root = tempfile::tempdir().unwrap();
    let package = root.path().join("ig-test-pkg");
    fs::create_dir_all(package.join("output")).unwrap();
    fs::write(package.join("ig.json"), b"{}").unwrap();
    fs::write(package.join("output/index.html"), b"<html></html>").unwrap();

    let router = igpub_server::build_router(test_state(root.path()));

    let response = router
        .clone()
        .oneshot(
            Request::get("/export/ig-test-pkg")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_DISPOSITION],
        "attachment; filename=ig-package.zip"
    );

    let bytes = body_bytes(response).await;
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
    assert!(archive.by_name("output/index.html").is_ok());

    // The workspace was consumed by the download.
    let second = router
        .oneshot(
            Request::get("/export/ig-test-pkg")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_download_unknown_package_is_404() {
    let root = tempfile::tempdir().unwrap();
    let router = igpub_server::build_router(test_state(root.path()));

    let response = router
        .oneshot(Request::get("/export/missing").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
