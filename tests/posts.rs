//! Post CRUD, authorization, and notification-job tests.

mod common;

use axum::http::StatusCode;
use common::try_app;
use quill::infra::queue::Job;
use serde_json::json;
use uuid::Uuid;

// ===========================================================================
// Create
// ===========================================================================

#[tokio::test]
async fn create_post_assigns_author_from_identity() {
    let Some(app) = try_app().await else { return };
    let user = app.create_user("post_create").await;

    let resp = app
        .post_json(
            "/posts",
            json!({ "title": "My first post", "body": "hello world" }),
            Some(&user.token),
        )
        .await;

    assert_eq!(resp.status, StatusCode::CREATED);
    let body = resp.json();
    assert!(body["id"].is_string());
    assert_eq!(body["title"].as_str().unwrap(), "My first post");
    assert_eq!(body["author_id"].as_str().unwrap(), user.id.to_string());
    assert_eq!(body["author"].as_str().unwrap(), user.username);
    assert!(body["comments"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn create_post_enqueues_follower_notification() {
    let Some(app) = try_app().await else { return };
    let user = app.create_user("post_notify").await;

    let resp = app
        .post_json(
            "/posts",
            json!({ "title": "Notify me", "body": "content" }),
            Some(&user.token),
        )
        .await;
    assert_eq!(resp.status, StatusCode::CREATED);

    let jobs = app.queue.submitted();
    assert!(jobs.contains(&Job::NotifyFollowers {
        post_title: "Notify me".to_string(),
        author_id: user.id,
    }));
}

#[tokio::test]
async fn create_post_requires_authentication() {
    let Some(app) = try_app().await else { return };

    let resp = app
        .post_json("/posts", json!({ "title": "t", "body": "b" }), None)
        .await;

    assert_eq!(resp.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn create_post_validates_input() {
    let Some(app) = try_app().await else { return };
    let user = app.create_user("post_validate").await;

    let resp = app
        .post_json(
            "/posts",
            json!({ "title": "", "body": "b" }),
            Some(&user.token),
        )
        .await;
    assert_eq!(resp.status, StatusCode::BAD_REQUEST);

    let resp = app
        .post_json(
            "/posts",
            json!({ "title": "a".repeat(256), "body": "b" }),
            Some(&user.token),
        )
        .await;
    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
}

// ===========================================================================
// Read
// ===========================================================================

#[tokio::test]
async fn anonymous_read_is_allowed() {
    let Some(app) = try_app().await else { return };
    let user = app.create_user("post_anonread").await;
    let post_id = app.create_post_for_user(user.id, "Public read").await;

    let list = app.get("/posts", None).await;
    assert_eq!(list.status, StatusCode::OK);

    let detail = app.get(&format!("/posts/{}", post_id), None).await;
    assert_eq!(detail.status, StatusCode::OK);
    assert_eq!(detail.json()["title"].as_str().unwrap(), "Public read");
}

#[tokio::test]
async fn get_missing_post_is_not_found() {
    let Some(app) = try_app().await else { return };

    let resp = app.get(&format!("/posts/{}", Uuid::new_v4()), None).await;
    assert_eq!(resp.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn list_posts_filters_by_title_and_author() {
    let Some(app) = try_app().await else { return };
    let alice = app.create_user("post_filter_a").await;
    let bob = app.create_user("post_filter_b").await;
    app.create_post_for_user(alice.id, "filter-target").await;
    app.create_post_for_user(bob.id, "filter-other").await;

    let by_title = app.get("/posts?title=filter-target", None).await;
    assert_eq!(by_title.status, StatusCode::OK);
    let items = by_title.json();
    let items = items.as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["author"].as_str().unwrap(), alice.username);

    let by_author = app
        .get(&format!("/posts?author={}", bob.username), None)
        .await;
    assert_eq!(by_author.status, StatusCode::OK);
    let items = by_author.json();
    let items = items.as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["title"].as_str().unwrap(), "filter-other");
}

#[tokio::test]
async fn post_detail_nests_comments() {
    let Some(app) = try_app().await else { return };
    let author = app.create_user("post_nest_author").await;
    let commenter = app.create_user("post_nest_commenter").await;
    let post_id = app.create_post_for_user(author.id, "Nested").await;
    app.create_comment_for_user(post_id, commenter.id).await;

    let detail = app.get(&format!("/posts/{}", post_id), None).await;
    assert_eq!(detail.status, StatusCode::OK);
    let comments = detail.json()["comments"].as_array().unwrap().to_vec();
    assert_eq!(comments.len(), 1);
    assert_eq!(
        comments[0]["author"].as_str().unwrap(),
        commenter.username
    );
}

// ===========================================================================
// Update / delete authorization
// ===========================================================================

#[tokio::test]
async fn update_reflects_on_next_read() {
    let Some(app) = try_app().await else { return };
    let user = app.create_user("post_update").await;

    let created = app
        .post_json(
            "/posts",
            json!({ "title": "Before", "body": "b" }),
            Some(&user.token),
        )
        .await;
    assert_eq!(created.status, StatusCode::CREATED);
    let post_id = created.json()["id"].as_str().unwrap().to_string();

    // Prime the caches.
    app.get("/posts", None).await;
    app.get(&format!("/posts/{}", post_id), None).await;

    let updated = app
        .put_json(
            &format!("/posts/{}", post_id),
            json!({ "title": "After", "body": "b" }),
            Some(&user.token),
        )
        .await;
    assert_eq!(updated.status, StatusCode::OK);
    assert_eq!(updated.json()["title"].as_str().unwrap(), "After");

    let detail = app.get(&format!("/posts/{}", post_id), None).await;
    assert_eq!(detail.json()["title"].as_str().unwrap(), "After");
}

#[tokio::test]
async fn non_author_cannot_update_or_delete() {
    let Some(app) = try_app().await else { return };
    let author = app.create_user("post_owner").await;
    let intruder = app.create_user("post_intruder").await;
    let post_id = app.create_post_for_user(author.id, "Owned").await;

    let update = app
        .put_json(
            &format!("/posts/{}", post_id),
            json!({ "title": "Stolen", "body": "b" }),
            Some(&intruder.token),
        )
        .await;
    assert_eq!(update.status, StatusCode::FORBIDDEN);

    let delete = app
        .delete(&format!("/posts/{}", post_id), Some(&intruder.token))
        .await;
    assert_eq!(delete.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn anonymous_write_is_unauthorized() {
    let Some(app) = try_app().await else { return };
    let author = app.create_user("post_anonwrite").await;
    let post_id = app.create_post_for_user(author.id, "Keep out").await;

    let update = app
        .put_json(
            &format!("/posts/{}", post_id),
            json!({ "title": "x", "body": "y" }),
            None,
        )
        .await;
    assert_eq!(update.status, StatusCode::UNAUTHORIZED);

    let delete = app.delete(&format!("/posts/{}", post_id), None).await;
    assert_eq!(delete.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn delete_post_then_read_is_not_found() {
    let Some(app) = try_app().await else { return };
    let user = app.create_user("post_delete").await;
    let post_id = app.create_post_for_user(user.id, "Doomed").await;

    let delete = app
        .delete(&format!("/posts/{}", post_id), Some(&user.token))
        .await;
    assert_eq!(delete.status, StatusCode::NO_CONTENT);

    let detail = app.get(&format!("/posts/{}", post_id), None).await;
    assert_eq!(detail.status, StatusCode::NOT_FOUND);

    let second_delete = app
        .delete(&format!("/posts/{}", post_id), Some(&user.token))
        .await;
    assert_eq!(second_delete.status, StatusCode::NOT_FOUND);
}
