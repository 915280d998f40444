use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use picstash::config::{PasswordHashConfig, ServerConfig};
use picstash::server::{AppState, create_router};
use picstash::store::{SqliteStore, Store};
use picstash::types::Role;
use reqwest::StatusCode;
use serde_json::Value;
use tempfile::TempDir;
use tokio::task::JoinHandle;

pub const ADMIN_USERNAME: &str = "alice";
pub const ADMIN_PASSWORD: &str = "pw1";

pub struct TestServer {
    pub temp_dir: TempDir,
    pub base_url: String,
    pub admin_token: String,
    client: reqwest::Client,
    server_task: Option<JoinHandle<()>>,
}

impl TestServer {
    /// Serves a fresh data directory on an ephemeral port, with `alice` as the
    /// first admin.
    pub async fn start() -> Self {
        let temp_dir = TempDir::new().expect("create temp dir");
        let config = ServerConfig {
            data_dir: temp_dir.path().to_path_buf(),
            secret_key: Some("integration-test-secret".to_string()),
            password_hash: PasswordHashConfig {
                memory_kib: 64,
                iterations: 1,
                parallelism: 1,
            },
            ..ServerConfig::default()
        };

        let store = SqliteStore::new(config.db_path()).expect("open store");
        store.initialize().expect("initialize schema");
        let state = Arc::new(AppState::new(&config, Arc::new(store)).expect("build state"));
        state
            .identity
            .create(ADMIN_USERNAME, ADMIN_PASSWORD, Role::Admin)
            .expect("create admin");

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let port = listener.local_addr().expect("local addr").port();
        let base_url = format!("http://127.0.0.1:{}", port);

        let app = create_router(state);
        let server_task = tokio::spawn(async move {
            axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .await
            .expect("serve");
        });

        let mut server = Self {
            temp_dir,
            base_url,
            admin_token: String::new(),
            client: reqwest::Client::new(),
            server_task: Some(server_task),
        };
        server.wait_for_ready().await;
        server.admin_token = server.token_for(ADMIN_USERNAME, ADMIN_PASSWORD).await;
        server
    }

    async fn wait_for_ready(&self) {
        for _ in 0..50 {
            if self.client.get(self.url("/health")).send().await.is_ok() {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        }
        panic!("Server did not become ready");
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    pub fn data_dir(&self) -> &Path {
        self.temp_dir.path()
    }

    pub async fn login(&self, username: &str, password: &str) -> reqwest::Response {
        self.client
            .post(self.url("/auth/login"))
            .json(&serde_json::json!({ "username": username, "password": password }))
            .send()
            .await
            .expect("send login")
    }

    pub async fn token_for(&self, username: &str, password: &str) -> String {
        let resp = self.login(username, password).await;
        assert_eq!(resp.status(), StatusCode::OK, "login failed for {username}");
        let body: Value = resp.json().await.expect("parse login response");
        body["token"].as_str().expect("token").to_string()
    }

    /// Creates a principal through the admin API and returns its id.
    pub async fn add_user(&self, username: &str, password: &str, role: &str) -> i64 {
        let resp = self
            .client
            .post(self.url("/admin/api/add_user"))
            .bearer_auth(&self.admin_token)
            .json(&serde_json::json!({
                "username": username,
                "password": password,
                "role": role,
            }))
            .send()
            .await
            .expect("send add_user");
        assert_eq!(resp.status(), StatusCode::CREATED, "add_user failed for {username}");
        let body: Value = resp.json().await.expect("parse add_user response");
        body["user"]["id"].as_i64().expect("user id")
    }

    pub async fn admin_get(&self, path: &str) -> Value {
        let resp = self
            .client
            .get(self.url(path))
            .bearer_auth(&self.admin_token)
            .send()
            .await
            .expect("send admin request");
        assert_eq!(resp.status(), StatusCode::OK, "GET {path} failed");
        resp.json().await.expect("parse admin response")
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(task) = self.server_task.take() {
            task.abort();
        }
    }
}
