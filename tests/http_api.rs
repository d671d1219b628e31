use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
};
use serde_json::Value;
use std::{sync::Arc, time::Duration};
use tempfile::TempDir;
use tower::ServiceExt;
use tracking_evidence::{
    config::UPLOAD_BODY_LIMIT,
    routes::routes::routes,
    services::{
        evidence_service::EvidenceService, file_store::LocalFileStore,
        metadata_store::InMemoryMetadataStore, path_resolver::PathResolver,
        tracking_lookup::StaticTrackingDirectory,
    },
};

const TN: &str = "1Z999AA1234567890";
const BOUNDARY: &str = "evidence-test-boundary";

fn png(len: usize) -> Vec<u8> {
    let mut bytes = vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
    bytes.extend_from_slice(&[0, 0, 0, 13, b'I', b'H', b'D', b'R']);
    bytes.resize(len, 0);
    bytes
}

fn jpeg(len: usize) -> Vec<u8> {
    let mut bytes = vec![0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F'];
    bytes.resize(len, 0);
    bytes
}

fn app() -> (Router, TempDir) {
    let tmp = tempfile::tempdir().unwrap();
    let service = EvidenceService::new(
        Arc::new(StaticTrackingDirectory::seeded()),
        PathResolver::new(tmp.path()),
        Arc::new(LocalFileStore::new(Duration::from_secs(5))),
        Arc::new(InMemoryMetadataStore::new()),
    );
    (routes(UPLOAD_BODY_LIMIT).with_state(service), tmp)
}

/// Build a multipart body with an optional `image` part and text parts.
fn multipart(image: Option<(&str, &str, &[u8])>, fields: &[(&str, &str)]) -> Vec<u8> {
    let mut body = Vec::new();
    if let Some((filename, mime, bytes)) = image {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"image\"; filename=\"{filename}\"\r\nContent-Type: {mime}\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

fn upload_request(tracking_number: &str, body: Vec<u8>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(format!("/api/v1/tracking/{tracking_number}/evidence"))
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn delete(uri: &str) -> Request<Body> {
    Request::builder()
        .method("DELETE")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

#[tokio::test]
async fn upload_list_and_delete_round() {
    let (app, _tmp) = app();
    let image = png(100);

    let (status, body) = send(
        &app,
        upload_request(
            TN,
            multipart(
                Some(("porch.png", "image/png", &image[..])),
                &[("description", "Left at front door"), ("location", "Miami, FL")],
            ),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["success"], true);
    assert_eq!(body["trackingNumber"], TN);
    let evidence = &body["evidence"];
    assert_eq!(evidence["mimeType"], "image/png");
    assert_eq!(evidence["size"], 100);
    assert_eq!(evidence["originalName"], "porch.png");
    assert_eq!(evidence["description"], "Left at front door");
    assert_eq!(evidence["location"], "Miami, FL");
    let id = evidence["id"].as_str().unwrap().to_string();
    assert_eq!(evidence["filename"], format!("{id}.png"));
    assert_eq!(evidence["url"], format!("/uploads/evidence/{TN}/{id}.png"));

    let (status, body) = send(&app, get(&format!("/api/v1/tracking/{TN}/evidence"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["evidenceCount"], 1);
    assert_eq!(body["evidence"][0]["id"], id.as_str());

    let uri = format!("/api/v1/tracking/{TN}/evidence/{id}");
    let (status, body) = send(&app, delete(&uri)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["evidenceId"], id.as_str());

    let (status, body) = send(&app, delete(&uri)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "evidence_not_found");

    let (_, body) = send(&app, get(&format!("/api/v1/tracking/{TN}/evidence"))).await;
    assert_eq!(body["evidenceCount"], 0);
}

#[tokio::test]
async fn stored_image_is_served_back() {
    let (app, _tmp) = app();
    let image = png(256);

    let (_, body) = send(
        &app,
        upload_request(TN, multipart(Some(("a.png", "image/png", &image[..])), &[])),
    )
    .await;
    let url = body["evidence"]["url"].as_str().unwrap().to_string();

    let resp = app.clone().oneshot(get(&url)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()[header::CONTENT_TYPE], "image/png");
    let last_modified = resp.headers()[header::LAST_MODIFIED].to_str().unwrap();
    assert!(last_modified.ends_with(" GMT"), "{last_modified}");
    assert_eq!(last_modified.len(), "Sun, 06 Nov 1994 08:49:37 GMT".len());
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    assert_eq!(bytes.as_ref(), image.as_slice());

    let (status, _) = send(
        &app,
        get(&format!("/uploads/evidence/{TN}/not-an-evidence-name.png")),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn malformed_tracking_number_is_rejected() {
    let (app, _tmp) = app();
    let image = png(100);

    let (status, body) = send(
        &app,
        upload_request("BADID", multipart(Some(("a.png", "image/png", &image[..])), &[])),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_tracking_number");

    let (status, body) = send(&app, get("/api/v1/tracking/BADID/evidence")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_tracking_number");
}

fn json_upload(tracking_number: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(format!("/api/v1/tracking/{tracking_number}/evidence"))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(r#"{"image":"not a file"}"#))
        .unwrap()
}

#[tokio::test]
async fn non_multipart_uploads_get_structured_errors() {
    let (app, tmp) = app();

    let (status, body) = send(&app, json_upload("BADID")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_tracking_number");

    let (status, body) = send(&app, json_upload("ZZ0000000000")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "tracking_not_found");

    let (status, body) = send(&app, json_upload(TN)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_request");
    assert_eq!(body["status"], 400);
    assert!(!tmp.path().join(TN).exists());
}

#[tokio::test]
async fn unknown_shipment_is_not_found() {
    let (app, tmp) = app();
    let image = png(100);

    let (status, body) = send(
        &app,
        upload_request(
            "ZZ0000000000",
            multipart(Some(("a.png", "image/png", &image[..])), &[]),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "tracking_not_found");
    assert!(!tmp.path().join("ZZ0000000000").exists());
}

#[tokio::test]
async fn oversized_image_is_rejected_with_sizes() {
    let (app, tmp) = app();
    let image = jpeg(6 * 1024 * 1024);

    let (status, body) = send(
        &app,
        upload_request(TN, multipart(Some(("big.jpg", "image/jpeg", &image[..])), &[])),
    )
    .await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(body["error"], "file_too_large");
    assert_eq!(body["maxSize"], format!("{} bytes", 5 * 1024 * 1024));
    assert_eq!(body["actualSize"], format!("{} bytes", 6 * 1024 * 1024));
    assert!(!tmp.path().join(TN).exists());
}

#[tokio::test]
async fn missing_and_non_image_files_are_rejected() {
    let (app, _tmp) = app();

    let (status, body) = send(
        &app,
        upload_request(TN, multipart(None, &[("description", "no file")])),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "missing_file");

    let (status, body) = send(
        &app,
        upload_request(TN, multipart(Some(("notes.txt", "text/plain", &b"hello"[..])), &[])),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_file");
    assert_eq!(body["actualType"], "text/plain");

    let (status, body) = send(
        &app,
        upload_request(
            TN,
            multipart(Some(("fake.png", "image/png", &b"definitely not a png"[..])), &[]),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_image");

    let (_, body) = send(&app, get(&format!("/api/v1/tracking/{TN}/evidence"))).await;
    assert_eq!(body["evidenceCount"], 0);
}

#[tokio::test]
async fn tracking_lookup_and_stats() {
    let (app, _tmp) = app();

    let (status, body) = send(&app, get("/api/v1/tracking/FDX123456789012")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["trackingNumber"], "FDX123456789012");

    let (status, body) = send(&app, get("/api/v1/tracking/ZZ0000000000")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "tracking_not_found");

    let image = png(2048);
    for tn in [TN, "DHL9876543210"] {
        let (status, _) = send(
            &app,
            upload_request(tn, multipart(Some(("a.png", "image/png", &image[..])), &[])),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (status, body) = send(&app, get("/api/v1/evidence/stats")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["totalFiles"], 2);
    assert_eq!(body["totalSizeBytes"], 4096);
    assert_eq!(body["totalSize"], "4 KB");
    assert_eq!(body["trackingNumbers"], 2);
}

#[tokio::test]
async fn probes_report_healthy_storage() {
    let (app, _tmp) = app();

    let (status, body) = send(&app, get("/healthz")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    let (status, body) = send(&app, get("/readyz")).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["checks"]["disk"]["ok"], true);
    assert_eq!(body["checks"]["metadata"]["ok"], true);
}
