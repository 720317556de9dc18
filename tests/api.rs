//! HTTP surface tests: health, authentication and full sync round trips

use std::fs::File;
use std::io::{Cursor, Read};
use std::time::{Duration, UNIX_EPOCH};

use axum::body::Body;
use axum::http::{header, HeaderValue, Request, StatusCode};
use axum::Router;
use axum_test::TestServer;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;
use zip::ZipArchive;

use vault_sync_server::config::{AuthConfig, Config, ServerConfig, SyncConfig, VaultConfig};
use vault_sync_server::state::AppState;
use vault_sync_server::sync::now_timestamp;

const API_KEY: &str = "test-key";
const BOUNDARY: &str = "vault-sync-test-boundary";

struct TestApp {
    temp_dir: TempDir,
    router: Router,
}

impl TestApp {
    async fn new() -> Self {
        let temp_dir = TempDir::new().unwrap();
        let config = Config {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0,
                max_upload_bytes: 1024 * 1024,
            },
            vault: VaultConfig {
                vault_path: temp_dir.path().join("vault"),
                buffer_path: temp_dir.path().join("merging/vault"),
            },
            auth: AuthConfig {
                api_key: API_KEY.to_string(),
            },
            sync: SyncConfig::default(),
        };
        let state = AppState::new(config).await.unwrap();
        Self {
            temp_dir,
            router: vault_sync_server::app(state),
        }
    }

    fn vault(&self) -> std::path::PathBuf {
        self.temp_dir.path().join("vault")
    }

    /// Write a vault file with an mtime of `secs` Unix seconds
    fn vault_file(&self, rel: &str, content: &str, secs: u64) {
        let path = self.vault().join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, content).unwrap();
        File::options()
            .write(true)
            .open(&path)
            .unwrap()
            .set_modified(UNIX_EPOCH + Duration::from_secs(secs))
            .unwrap();
    }

    async fn sync(&self, form: Form) -> axum::response::Response {
        let request = Request::builder()
            .method("POST")
            .uri("/api/sync")
            .header(header::AUTHORIZATION, format!("Bearer {}", API_KEY))
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Body::from(form.finish()))
            .unwrap();
        self.router.clone().oneshot(request).await.unwrap()
    }
}

#[derive(Default)]
struct Form {
    body: Vec<u8>,
}

impl Form {
    fn text(mut self, name: &str, value: &str) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                BOUNDARY, name, value
            )
            .as_bytes(),
        );
        self
    }

    fn file(mut self, path: &str, content: &[u8]) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"modified_and_new_client_files\"; filename=\"{}\"\r\nContent-Type: application/octet-stream\r\n\r\n",
                BOUNDARY, path
            )
            .as_bytes(),
        );
        self.body.extend_from_slice(content);
        self.body.extend_from_slice(b"\r\n");
        self
    }

    fn finish(mut self) -> Vec<u8> {
        self.body
            .extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
        self.body
    }
}

fn manifest(response: &axum::response::Response) -> Value {
    let raw = response.headers()["sync-manifest"].to_str().unwrap();
    let json = urlencoding::decode(raw).unwrap();
    serde_json::from_str(&json).unwrap()
}

async fn archive_names(response: axum::response::Response) -> Vec<String> {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let mut archive = ZipArchive::new(Cursor::new(bytes.to_vec())).unwrap();
    let mut names = Vec::new();
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).unwrap();
        let mut sink = Vec::new();
        entry.read_to_end(&mut sink).unwrap();
        names.push(entry.name().to_string());
    }
    names.sort();
    names
}

#[tokio::test]
async fn test_health_is_public() {
    let app = TestApp::new().await;
    let server = TestServer::new(app.router.clone()).unwrap();

    let response = server.get("/health").await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["status"], "healthy");

    server.get("/api/health").await.assert_status_ok();
}

#[tokio::test]
async fn test_sync_requires_bearer_key() {
    let app = TestApp::new().await;
    let server = TestServer::new(app.router.clone()).unwrap();

    let missing = server.post("/api/sync").await;
    missing.assert_status(StatusCode::UNAUTHORIZED);
    assert_eq!(missing.headers()[header::WWW_AUTHENTICATE], "Bearer");
    let body: Value = missing.json();
    assert_eq!(body["error"], "unauthorized");

    let wrong = server
        .post("/api/sync")
        .add_header(header::AUTHORIZATION, HeaderValue::from_static("Bearer nope"))
        .await;
    wrong.assert_status(StatusCode::UNAUTHORIZED);

    let basic = server
        .post("/api/sync")
        .add_header(header::AUTHORIZATION, HeaderValue::from_static("Basic dGVzdC1rZXk="))
        .await;
    basic.assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_missing_timestamp_is_bad_request() {
    let app = TestApp::new().await;

    let response = app
        .sync(Form::default().text("all_client_paths", "note.md"))
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_traversal_path_is_bad_request() {
    let app = TestApp::new().await;

    let response = app
        .sync(
            Form::default()
                .text("last_sync_timestamp", "0")
                .file("../escape.md", b"x"),
        )
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(!app.temp_dir.path().join("merging/escape.md").exists());
}

#[tokio::test]
async fn test_full_round_trip() {
    let app = TestApp::new().await;
    let now = now_timestamp() as u64;
    let last_sync = now - 1_000;

    app.vault_file("note.md", "untouched", now - 2_000);
    app.vault_file("photos/new.jpg", "jpeg", now - 500);
    app.vault_file("doomed.md", "bye", now - 2_000);

    let response = app
        .sync(
            Form::default()
                .text("last_sync_timestamp", &last_sync.to_string())
                .text("all_client_paths", "note.md")
                .text("all_client_paths", "stale, with comma.md")
                .text("all_client_paths", "fresh.md")
                .text("deleted_client_paths", "doomed.md")
                .file("fresh.md", b"from client"),
        )
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "application/zip");
    assert!(response.headers()[header::CONTENT_DISPOSITION]
        .to_str()
        .unwrap()
        .contains("results.zip"));

    let manifest = manifest(&response);
    assert_eq!(
        manifest["deleted_server_paths"],
        serde_json::json!(["stale, with comma.md"])
    );
    let new_timestamp = manifest["new_sync_timestamp"].as_f64().unwrap();
    assert!(new_timestamp >= now as f64);
    let plain: f64 = response.headers()["sync-timestamp"]
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    assert_eq!(plain, new_timestamp);

    assert_eq!(archive_names(response).await, vec!["photos/new.jpg"]);

    let vault = app.vault();
    assert_eq!(std::fs::read_to_string(vault.join("fresh.md")).unwrap(), "from client");
    assert!(!vault.join("doomed.md").exists());
    assert!(vault.join("note.md").exists());
}

#[tokio::test]
async fn test_empty_sentinel_means_no_uploads() {
    let app = TestApp::new().await;

    let response = app
        .sync(
            Form::default()
                .text("last_sync_timestamp", "0")
                .file("empty", b""),
        )
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert!(!app.vault().join("empty").exists());
    assert!(archive_names(response).await.is_empty());
}

#[tokio::test]
async fn test_unrecognized_upload_is_reported() {
    let app = TestApp::new().await;

    let response = app
        .sync(
            Form::default()
                .text("last_sync_timestamp", "0")
                .file("setup.exe", b"MZ"),
        )
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(manifest(&response)["rejected_uploads"], serde_json::json!(["setup.exe"]));
    assert!(!app.vault().join("setup.exe").exists());
}
