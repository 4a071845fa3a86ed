use axum::{routing::delete, routing::get, routing::post, routing::put, Router};

use crate::http::handlers;
use crate::AppState;

pub fn health() -> Router<AppState> {
    Router::new().route("/health", get(handlers::health))
}

pub fn auth() -> Router<AppState> {
    Router::new()
        .route("/register", post(handlers::register))
        .route("/auth/login", post(handlers::login))
        .route("/auth/me", get(handlers::get_current_user))
}

pub fn posts() -> Router<AppState> {
    Router::new()
        .route("/posts", get(handlers::list_posts))
        .route("/posts", post(handlers::create_post))
        .route("/posts/:id", get(handlers::get_post))
        .route("/posts/:id", put(handlers::update_post))
        .route("/posts/:id", delete(handlers::delete_post))
}

pub fn comments() -> Router<AppState> {
    Router::new()
        .route("/comments", get(handlers::list_comments))
        .route("/comments", post(handlers::create_comment))
        .route("/comments/:id", get(handlers::get_comment))
        .route("/comments/:id", put(handlers::update_comment))
        .route("/comments/:id", delete(handlers::delete_comment))
}

pub fn followers() -> Router<AppState> {
    Router::new()
        .route("/followers", get(handlers::list_followers))
        .route("/followers", post(handlers::create_follower))
        .route("/followers/:id", delete(handlers::delete_follower))
        .route("/followers/unfollow", post(handlers::unfollow))
}
