//! Full middleware stack and real-socket behaviour.

use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
};
use tower::ServiceExt;

use edenframe::http::{Server, ServerError};
use edenframe::lifecycle::Shutdown;

mod common;
use common::{app_of, body_text, get, table_of, table_with, test_config, Scripted, RecordingReporter};

fn pages() -> Arc<Scripted> {
    Scripted::new("pages", |r| {
        r.get("/", "render").view("home/index").title("Home");
        r.get("/api/items", "ok");
        r.get("/broken", "throw");
        r.post("/upload", "ok")
            .upload(edenframe::routing::UploadPolicy::array(["a", "b"]));
    })
}

fn app(dir: &tempfile::TempDir, reporter: Arc<RecordingReporter>) -> axum::Router {
    let config = test_config(dir.path());
    let table = table_with(vec![("pages", 0, pages())], reporter.clone(), &config);
    app_of(table, config, reporter)
}

#[tokio::test]
async fn test_html_responses_carry_framework_headers() {
    let dir = tempfile::tempdir().unwrap();
    let response = app(&dir, Arc::default()).oneshot(get("/")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-powered-by"], "EdenFrame");
    assert!(response.headers()[header::LINK].to_str().unwrap().contains("app.min.css"));
    assert!(response.headers()["x-response-time"].to_str().unwrap().ends_with("ms"));
    assert!(response.headers().contains_key("x-request-id"));
    assert!(response.headers()[header::SET_COOKIE]
        .to_str()
        .unwrap()
        .starts_with("eden.session.id="));
    assert_eq!(body_text(response).await, "home/index|Home");
}

#[tokio::test]
async fn test_json_clients_get_locals_as_json() {
    let dir = tempfile::tempdir().unwrap();
    let req = Request::builder()
        .uri("/")
        .header(header::ACCEPT, "application/json")
        .body(Body::empty())
        .unwrap();
    let response = app(&dir, Arc::default()).oneshot(req).await.unwrap();

    assert_eq!(response.headers()[header::CONTENT_TYPE], "application/json");
    assert!(response.headers().get(header::LINK).is_none());
    let value: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(value["opts"]["title"], "Home");
    assert_eq!(value["opts"]["route"], "/");
}

#[tokio::test]
async fn test_unknown_path_renders_not_found_page() {
    let dir = tempfile::tempdir().unwrap();
    let response = app(&dir, Arc::default()).oneshot(get("/missing")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(body_text(response).await.starts_with("error|"));
}

#[tokio::test]
async fn test_controller_error_never_leaks() {
    let dir = tempfile::tempdir().unwrap();
    let reporter = Arc::new(RecordingReporter::default());
    let response = app(&dir, reporter.clone()).oneshot(get("/broken")).await.unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(!body_text(response).await.contains("boom"));
    assert_eq!(reporter.count(), 1);
}

#[tokio::test]
async fn test_api_routes_allow_cross_origin() {
    let dir = tempfile::tempdir().unwrap();
    let response = app(&dir, Arc::default()).oneshot(get("/api/items")).await.unwrap();
    assert_eq!(response.headers()["access-control-allow-origin"], "*");
}

#[tokio::test]
async fn test_session_cookie_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let router = app(&dir, Arc::default());

    let first = router.clone().oneshot(get("/")).await.unwrap();
    let cookie = first.headers()[header::SET_COOKIE].to_str().unwrap().to_string();
    let pair = cookie.split(';').next().unwrap().to_string();

    let req = Request::builder()
        .uri("/")
        .header(header::COOKIE, &pair)
        .body(Body::empty())
        .unwrap();
    let second = router.oneshot(req).await.unwrap();
    let again = second.headers()[header::SET_COOKIE].to_str().unwrap();
    assert_eq!(again.split(';').next().unwrap(), pair);
}

fn multipart(field: &str) -> Request<Body> {
    multipart_to("/upload", field)
}

fn multipart_to(uri: &str, field: &str) -> Request<Body> {
    let boundary = "XEDENX";
    let body = format!(
        "--{boundary}\r\nContent-Disposition: form-data; name=\"note\"\r\n\r\nhello\r\n\
         --{boundary}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"a.txt\"\r\n\
         Content-Type: text/plain\r\n\r\nfile body\r\n--{boundary}--\r\n"
    );
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={boundary}"))
        .body(Body::from(body))
        .unwrap()
}

#[tokio::test]
async fn test_upload_accepts_declared_fields_only() {
    let dir = tempfile::tempdir().unwrap();

    let response = app(&dir, Arc::default()).oneshot(multipart("a")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);

    let response = app(&dir, Arc::default()).oneshot(multipart("c")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
}

fn locked_and_open(dir: &tempfile::TempDir) -> (axum::Router, Arc<Scripted>, Arc<Scripted>) {
    let locked = Scripted::new("locked", |r| {
        r.post("/upload", "files")
            .capability("admin")
            .priority(1)
            .upload(edenframe::routing::UploadPolicy::array(["a"]));
        r.post("/private", "files")
            .capability("admin")
            .upload(edenframe::routing::UploadPolicy::array(["a"]));
    });
    let open = Scripted::new("open", |r| {
        r.post("/upload", "files").upload(edenframe::routing::UploadPolicy::array(["a"]));
    });

    let config = test_config(dir.path());
    let table = table_with(
        vec![("locked", 0, locked.clone()), ("open", 0, open.clone())],
        Arc::default(),
        &config,
    );
    (app_of(table, config, Arc::default()), locked, open)
}

#[tokio::test]
async fn test_denied_upload_route_hands_files_to_the_next_route() {
    let dir = tempfile::tempdir().unwrap();
    let (router, locked, open) = locked_and_open(&dir);

    let response = router.oneshot(multipart("a")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "files:open:1");
    assert_eq!(locked.calls(), 0);
    assert_eq!(open.calls(), 1);
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
}

#[tokio::test]
async fn test_unanswered_upload_leaves_no_files() {
    let dir = tempfile::tempdir().unwrap();
    let (router, locked, _open) = locked_and_open(&dir);

    let response = router.oneshot(multipart_to("/private", "a")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(locked.calls(), 0);
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_passthroughs_run_before_route_table() {
    let dir = tempfile::tempdir().unwrap();
    let table = table_of(vec![("pages", 0, pages())], Arc::default());
    let router = Server::new(test_config(dir.path()), table)
        .get("/health", || async { "up" })
        .push("/items/{id}", || async { "stored" })
        .into_router();

    let response = router.clone().oneshot(get("/health")).await.unwrap();
    assert_eq!(body_text(response).await, "up");

    let req = Request::builder().method("PUT").uri("/items/1").body(Body::empty()).unwrap();
    assert_eq!(body_text(router.clone().oneshot(req).await.unwrap()).await, "stored");

    // Wrong method on a passthrough path still reaches the table.
    let req = Request::builder().method("POST").uri("/health").body(Body::empty()).unwrap();
    assert_eq!(router.oneshot(req).await.unwrap().status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_serves_over_a_real_socket() {
    let dir = tempfile::tempdir().unwrap();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();

    let table = table_of(vec![("pages", 0, pages())], Arc::default());
    let shutdown = Shutdown::new();
    let server = Server::new(test_config(dir.path()), table);
    let handle = tokio::spawn(server.run(listener, shutdown.wait()));

    let response = reqwest::get(format!("http://{address}/api/items")).await.unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    assert_eq!(response.text().await.unwrap(), "ok:pages");

    shutdown.trigger();
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_port_in_use_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let taken = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();

    let mut config = test_config(dir.path());
    config.server.host = "127.0.0.1".to_string();
    config.server.port = taken.local_addr().unwrap().port();

    let reporter = Arc::new(RecordingReporter::default());
    let table = table_of(vec![("pages", 0, pages())], reporter.clone());
    let err = Server::new(config, table)
        .reporter(reporter.clone())
        .start(std::future::pending())
        .await
        .unwrap_err();

    assert!(matches!(err, ServerError::AddrInUse { .. }));
    assert!(err.is_fatal());
    assert!(err.to_string().contains("already in use"));
    // Fatal bind errors are logged, not reported.
    assert_eq!(reporter.count(), 0);
}
