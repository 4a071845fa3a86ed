#![allow(dead_code)]

use argon2::password_hash::{PasswordHasher, SaltString};
use argon2::Argon2;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tower::ServiceExt;
use uuid::Uuid;

use quill::app::auth::issue_access_token;
use quill::infra::cache::MemoryCache;
use quill::infra::db::Db;
use quill::infra::queue::RecordingQueue;
use quill::AppState;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

// Test-only token key, never used in production.
pub const TEST_TOKEN_KEY: [u8; 32] = *b"0123456789abcdef0123456789abcdef";
pub const DEFAULT_PASSWORD: &str = "testpassword123";

// ---------------------------------------------------------------------------
// TestApp — shared, lazily initialized once per test binary
// ---------------------------------------------------------------------------

pub struct TestApp {
    router: Router,
    pub state: AppState,
    /// Same instance the router's state holds; exposes submitted jobs.
    pub queue: Arc<RecordingQueue>,
    /// Same instance the router's state holds.
    pub cache: Arc<MemoryCache>,
}

pub struct TestResponse {
    pub status: StatusCode,
    body_bytes: bytes::Bytes,
}

impl TestResponse {
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body_bytes).unwrap_or(Value::Null)
    }

    pub fn error_message(&self) -> String {
        self.json()["error"].as_str().unwrap_or("").to_string()
    }
}

pub struct TestUser {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub token: String,
}

static TEST_APP: OnceCell<Option<TestApp>> = OnceCell::const_new();

/// Get the shared TestApp, or `None` when no test database is configured
/// (the integration suite is skipped in that case).
pub async fn try_app() -> Option<&'static TestApp> {
    TEST_APP
        .get_or_init(|| async { TestApp::setup().await })
        .await
        .as_ref()
}

impl TestApp {
    async fn setup() -> Option<Self> {
        let database_url = match std::env::var("TEST_DATABASE_URL") {
            Ok(url) => url,
            Err(_) => {
                eprintln!("TEST_DATABASE_URL not set, skipping integration tests");
                return None;
            }
        };

        // Each #[tokio::test] creates its own runtime while the pool is
        // shared via OnceCell; connections created in one runtime go stale
        // when that runtime drops. A zero idle timeout makes the pool
        // discard idle connections on acquire and open fresh ones.
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .idle_timeout(Duration::from_secs(0))
            .connect(&database_url)
            .await
            .expect("cannot connect to test database");

        run_migrations(&pool).await;

        // Clean slate per test binary.
        sqlx::raw_sql(
            "DO $$ DECLARE r RECORD; BEGIN \
             FOR r IN (SELECT tablename FROM pg_tables WHERE schemaname = 'public') LOOP \
             EXECUTE 'TRUNCATE TABLE ' || quote_ident(r.tablename) || ' CASCADE'; \
             END LOOP; END $$;",
        )
        .execute(&pool)
        .await
        .expect("failed to truncate tables");

        let db = Db::from_pool(pool);
        let cache = Arc::new(MemoryCache::new());
        let queue = Arc::new(RecordingQueue::new());

        let state = AppState {
            db,
            cache: cache.clone(),
            queue: queue.clone(),
            token_key: TEST_TOKEN_KEY,
            token_ttl_hours: 24,
        };

        let router = quill::http::router(state.clone());

        Some(TestApp {
            router,
            state,
            queue,
            cache,
        })
    }

    // ------------------------------------------------------------------
    // Low-level request helper
    // ------------------------------------------------------------------
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> TestResponse {
        let mut builder = Request::builder()
            .method(method)
            .uri(path)
            .header("host", "localhost");

        let auth;
        if let Some(token) = token {
            auth = format!("Bearer {}", token);
            builder = builder.header("Authorization", auth.as_str());
        }

        let request = if let Some(body) = body {
            builder
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_string(&body).unwrap()))
                .unwrap()
        } else {
            builder.body(Body::empty()).unwrap()
        };

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("oneshot failed");

        let status = response.status();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("failed to collect body")
            .to_bytes();

        TestResponse { status, body_bytes }
    }

    // ------------------------------------------------------------------
    // Convenience HTTP helpers
    // ------------------------------------------------------------------
    pub async fn get(&self, path: &str, token: Option<&str>) -> TestResponse {
        self.request(Method::GET, path, None, token).await
    }

    pub async fn post_json(&self, path: &str, body: Value, token: Option<&str>) -> TestResponse {
        self.request(Method::POST, path, Some(body), token).await
    }

    pub async fn put_json(&self, path: &str, body: Value, token: Option<&str>) -> TestResponse {
        self.request(Method::PUT, path, Some(body), token).await
    }

    pub async fn delete(&self, path: &str, token: Option<&str>) -> TestResponse {
        self.request(Method::DELETE, path, None, token).await
    }

    // ------------------------------------------------------------------
    // Test data helpers
    // ------------------------------------------------------------------

    /// Insert a user directly and mint a token for them.
    pub async fn create_user(&self, suffix: &str) -> TestUser {
        let email = format!("test_{}@example.com", suffix);
        self.create_user_with_email(suffix, &email).await
    }

    /// Insert a user with a specific email (may be empty) and mint a token.
    pub async fn create_user_with_email(&self, suffix: &str, email: &str) -> TestUser {
        let username = format!("testuser_{}", suffix);

        let salt = SaltString::generate(&mut argon2::password_hash::rand_core::OsRng);
        let hash = Argon2::default()
            .hash_password(DEFAULT_PASSWORD.as_bytes(), &salt)
            .expect("password hash failed")
            .to_string();

        let user_id: Uuid = sqlx::query_scalar(
            "INSERT INTO users (username, email, password_hash) \
             VALUES ($1, $2, $3) RETURNING id",
        )
        .bind(&username)
        .bind(email)
        .bind(&hash)
        .fetch_one(self.pool())
        .await
        .expect("insert test user failed");

        let issued =
            issue_access_token(&TEST_TOKEN_KEY, user_id, 24).expect("issue token failed");

        TestUser {
            id: user_id,
            username,
            email: email.to_string(),
            token: issued.token,
        }
    }

    /// Insert a post directly in the DB. Returns the post id.
    pub async fn create_post_for_user(&self, author_id: Uuid, title: &str) -> Uuid {
        sqlx::query_scalar(
            "INSERT INTO posts (author_id, title, body) \
             VALUES ($1, $2, 'test body') RETURNING id",
        )
        .bind(author_id)
        .bind(title)
        .fetch_one(self.pool())
        .await
        .expect("insert test post failed")
    }

    /// Insert a comment directly in the DB. Returns the comment id.
    pub async fn create_comment_for_user(&self, post_id: Uuid, author_id: Uuid) -> Uuid {
        sqlx::query_scalar(
            "INSERT INTO comments (post_id, author_id, body) \
             VALUES ($1, $2, 'test comment') RETURNING id",
        )
        .bind(post_id)
        .bind(author_id)
        .fetch_one(self.pool())
        .await
        .expect("insert test comment failed")
    }

    /// Return the pool for direct DB assertions.
    pub fn pool(&self) -> &PgPool {
        self.state.db.pool()
    }
}

async fn run_migrations(pool: &PgPool) {
    let mut migration_files: Vec<_> = std::fs::read_dir("migrations")
        .expect("cannot read migrations/")
        .filter_map(Result::ok)
        .filter(|e| e.path().extension().map_or(false, |ext| ext == "sql"))
        .collect();
    migration_files.sort_by_key(|e| e.file_name());

    for entry in &migration_files {
        let sql = std::fs::read_to_string(entry.path())
            .unwrap_or_else(|_| panic!("cannot read {:?}", entry.path()));
        sqlx::raw_sql(&sql)
            .execute(pool)
            .await
            .unwrap_or_else(|e| panic!("migration {:?} failed: {}", entry.file_name(), e));
    }
}
