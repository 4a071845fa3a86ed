//! Registration and authentication tests.

mod common;

use axum::http::StatusCode;
use common::try_app;
use quill::infra::queue::Job;
use serde_json::json;

// ===========================================================================
// Registration
// ===========================================================================

#[tokio::test]
async fn register_creates_user_and_enqueues_welcome_email() {
    let Some(app) = try_app().await else { return };

    let resp = app
        .post_json(
            "/register",
            json!({
                "username": "reg_welcome",
                "email": "reg_welcome@example.com",
                "password": "supersecret1"
            }),
            None,
        )
        .await;

    assert_eq!(resp.status, StatusCode::CREATED);
    let body = resp.json();
    assert!(body["id"].is_string());
    assert_eq!(body["username"].as_str().unwrap(), "reg_welcome");
    assert_eq!(body["email"].as_str().unwrap(), "reg_welcome@example.com");
    assert!(body.get("password").is_none());
    assert!(body.get("password_hash").is_none());

    let jobs = app.queue.submitted();
    assert!(jobs.contains(&Job::SendWelcomeEmail {
        username: "reg_welcome".to_string(),
        email: "reg_welcome@example.com".to_string(),
    }));
}

#[tokio::test]
async fn register_duplicate_username_conflicts() {
    let Some(app) = try_app().await else { return };

    let payload = json!({
        "username": "reg_duplicate",
        "email": "reg_duplicate@example.com",
        "password": "supersecret1"
    });

    let first = app.post_json("/register", payload.clone(), None).await;
    assert_eq!(first.status, StatusCode::CREATED);

    let second = app.post_json("/register", payload, None).await;
    assert_eq!(second.status, StatusCode::CONFLICT);
    assert_eq!(second.error_message(), "username already taken");
}

#[tokio::test]
async fn register_rejects_short_password() {
    let Some(app) = try_app().await else { return };

    let resp = app
        .post_json(
            "/register",
            json!({ "username": "reg_shortpw", "password": "short" }),
            None,
        )
        .await;

    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn register_rejects_empty_username() {
    let Some(app) = try_app().await else { return };

    let resp = app
        .post_json(
            "/register",
            json!({ "username": "   ", "password": "supersecret1" }),
            None,
        )
        .await;

    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn register_without_email_defaults_to_empty() {
    let Some(app) = try_app().await else { return };

    let resp = app
        .post_json(
            "/register",
            json!({ "username": "reg_noemail", "password": "supersecret1" }),
            None,
        )
        .await;

    assert_eq!(resp.status, StatusCode::CREATED);
    assert_eq!(resp.json()["email"].as_str().unwrap(), "");
}

// ===========================================================================
// Login
// ===========================================================================

#[tokio::test]
async fn login_returns_usable_token() {
    let Some(app) = try_app().await else { return };
    let user = app.create_user("login_ok").await;

    let resp = app
        .post_json(
            "/auth/login",
            json!({ "username": user.username, "password": common::DEFAULT_PASSWORD }),
            None,
        )
        .await;

    assert_eq!(resp.status, StatusCode::OK);
    let token = resp.json()["token"].as_str().unwrap().to_string();
    assert!(resp.json()["expires_at"].is_string());

    let me = app.get("/auth/me", Some(&token)).await;
    assert_eq!(me.status, StatusCode::OK);
    assert_eq!(me.json()["id"].as_str().unwrap(), user.id.to_string());
}

#[tokio::test]
async fn login_rejects_wrong_password() {
    let Some(app) = try_app().await else { return };
    let user = app.create_user("login_badpw").await;

    let resp = app
        .post_json(
            "/auth/login",
            json!({ "username": user.username, "password": "wrongpassword" }),
            None,
        )
        .await;

    assert_eq!(resp.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn login_rejects_unknown_username() {
    let Some(app) = try_app().await else { return };

    let resp = app
        .post_json(
            "/auth/login",
            json!({ "username": "login_nobody", "password": "supersecret1" }),
            None,
        )
        .await;

    assert_eq!(resp.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn me_requires_authentication() {
    let Some(app) = try_app().await else { return };

    let resp = app.get("/auth/me", None).await;
    assert_eq!(resp.status, StatusCode::UNAUTHORIZED);

    let resp = app.get("/auth/me", Some("garbage-token")).await;
    assert_eq!(resp.status, StatusCode::UNAUTHORIZED);
}
