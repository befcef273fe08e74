//! Common test utilities for E2E tests

#![allow(dead_code)]

use chrono::Utc;
use summer_social::data::User;
use summer_social::{AppState, config};
use tempfile::TempDir;
use tokio::net::TcpListener;

/// Header the test configuration reads the caller id from
pub const IDENTITY_HEADER: &str = "x-user-id";

/// Test server instance
pub struct TestServer {
    pub addr: String,
    pub state: AppState,
    pub _temp_dir: TempDir,
    pub client: reqwest::Client,
}

impl TestServer {
    /// Create a new test server instance
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Create a test server after adjusting the default test configuration
    pub async fn with_config(adjust: impl FnOnce(&mut config::AppConfig)) -> Self {
        // Create temporary directory for test database
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");

        // Create test configuration
        let mut config = config::AppConfig {
            server: config::ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0, // Let OS assign port
                cors_origins: Vec::new(),
            },
            database: config::DatabaseConfig { path: db_path },
            auth: config::AuthConfig {
                identity_header: IDENTITY_HEADER.to_string(),
            },
            messaging: config::MessagingConfig {
                queue_capacity: 16,
                read_receipts: config::ReadReceiptScope::Senders,
            },
            feed: config::FeedConfig {
                water_goal_ml: 2000.0,
                step_goal: 10_000,
                step_check_enabled: false,
                utc_offset_minutes: 0,
            },
            logging: config::LoggingConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
            },
        };
        adjust(&mut config);

        // Initialize app state
        summer_social::metrics::init_metrics();
        let state = AppState::new(config).await.unwrap();

        // Create HTTP client
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .unwrap();

        // Bind to random port
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let addr_str = format!("http://{}", addr);

        // Build router
        let app = summer_social::build_router(state.clone());

        // Spawn server in background
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        // Wait a bit for server to start
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;

        Self {
            addr: addr_str,
            state,
            _temp_dir: temp_dir,
            client,
        }
    }

    /// Get base URL for API requests
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.addr, path)
    }

    /// GET as `user_id`
    pub fn get_as(&self, user_id: &str, path: &str) -> reqwest::RequestBuilder {
        self.client
            .get(self.url(path))
            .header(IDENTITY_HEADER, user_id)
    }

    /// POST as `user_id`
    pub fn post_as(&self, user_id: &str, path: &str) -> reqwest::RequestBuilder {
        self.client
            .post(self.url(path))
            .header(IDENTITY_HEADER, user_id)
    }

    /// PUT as `user_id`
    pub fn put_as(&self, user_id: &str, path: &str) -> reqwest::RequestBuilder {
        self.client
            .put(self.url(path))
            .header(IDENTITY_HEADER, user_id)
    }

    /// Insert a user into the users store
    pub async fn create_user(&self, id: &str, first_name: &str, last_name: &str) -> User {
        let now = Utc::now();
        let user = User {
            id: id.to_string(),
            email: format!("{id}@example.com"),
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            created_at: now,
            updated_at: now,
        };
        self.state.db.upsert_user(&user).await.unwrap();
        user
    }

    /// Make `a` and `b` friends through the HTTP API
    pub async fn befriend(&self, a: &str, b: &str) {
        let response = self
            .post_as(a, "/api/friends")
            .json(&serde_json::json!({ "receiver_id": b }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 201);
        let body: serde_json::Value = response.json().await.unwrap();
        let request_id = body["friend"]["id"].as_str().unwrap().to_string();

        let response = self
            .put_as(b, &format!("/api/friends/requests/{request_id}/accept"))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
    }
}
