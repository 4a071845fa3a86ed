use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::app::auth::AuthService;
use crate::app::comments::CommentService;
use crate::app::posts::{PostFilter, PostService};
use crate::app::social::{FollowOutcome, SocialService};
use crate::app::users::UserService;
use crate::domain::comment::Comment;
use crate::domain::follow::FollowEdge;
use crate::domain::post::Post;
use crate::domain::user::User;
use crate::http::{AppError, AuthUser};
use crate::infra::queue::Job;
use crate::AppState;

const MAX_TITLE_LEN: usize = 255;
const MAX_PASSWORD_LEN: usize = 128;

#[derive(Serialize)]
pub(crate) struct HealthResponse {
    status: &'static str,
}

pub(crate) async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let status = if state.db.ping().await.is_ok() {
        "ok"
    } else {
        "degraded"
    };
    Json(HealthResponse { status })
}

// ---------------------------------------------------------------------------
// Registration & auth
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    #[serde(default)]
    pub email: String,
    pub password: String,
}

pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<User>), AppError> {
    if payload.username.trim().is_empty() {
        return Err(AppError::bad_request("username cannot be empty"));
    }
    if payload.password.trim().len() < 8 {
        return Err(AppError::bad_request("password must be at least 8 characters"));
    }
    if payload.password.len() > MAX_PASSWORD_LEN {
        return Err(AppError::bad_request("password must be at most 128 characters"));
    }

    let service = AuthService::new(state.db.clone(), state.token_key, state.token_ttl_hours);
    let user = service
        .register(payload.username, payload.email, payload.password)
        .await
        .map_err(|err| {
            if let Some(sqlx_err) = err.downcast_ref::<sqlx::Error>() {
                if let Some(db_err) = sqlx_err.as_database_error() {
                    if db_err.code().as_deref() == Some("23505") {
                        return AppError::conflict("username already taken");
                    }
                }
            }
            tracing::error!(error = ?err, "failed to register user");
            AppError::internal("failed to register user")
        })?;

    // Fire-and-forget: registration already succeeded, the welcome mail is
    // best-effort from here.
    state
        .queue
        .submit(Job::SendWelcomeEmail {
            username: user.username.clone(),
            email: user.email.clone(),
        })
        .await;

    Ok((StatusCode::CREATED, Json(user)))
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct TokenResponse {
    pub token: String,
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
}

pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<TokenResponse>, AppError> {
    if payload.username.trim().is_empty() || payload.password.trim().is_empty() {
        return Err(AppError::bad_request("username and password are required"));
    }

    let service = AuthService::new(state.db.clone(), state.token_key, state.token_ttl_hours);
    let issued = service
        .login(&payload.username, &payload.password)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, "failed to login");
            AppError::internal("failed to login")
        })?;

    match issued {
        Some(issued) => Ok(Json(TokenResponse {
            token: issued.token,
            expires_at: issued.expires_at,
        })),
        None => Err(AppError::unauthorized("invalid credentials")),
    }
}

pub async fn get_current_user(
    auth: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<User>, AppError> {
    let service = UserService::new(state.db.clone());
    let user = service.get_user(auth.user_id).await.map_err(|err| {
        tracing::error!(error = ?err, user_id = %auth.user_id, "failed to fetch current user");
        AppError::internal("failed to fetch current user")
    })?;

    match user {
        Some(user) => Ok(Json(user)),
        None => Err(AppError::not_found("user not found")),
    }
}

// ---------------------------------------------------------------------------
// Posts
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct PostListQuery {
    pub title: Option<String>,
    pub author: Option<String>,
}

pub async fn list_posts(
    State(state): State<AppState>,
    Query(query): Query<PostListQuery>,
) -> Result<Json<Vec<Post>>, AppError> {
    let filter = PostFilter {
        title: query.title,
        author: query.author,
    };

    let service = PostService::new(state.db.clone(), state.cache.clone());
    let posts = service.list(&filter).await.map_err(|err| {
        tracing::error!(error = ?err, "failed to list posts");
        AppError::internal("failed to list posts")
    })?;

    Ok(Json(posts))
}

#[derive(Deserialize)]
pub struct PostRequest {
    pub title: String,
    pub body: String,
}

fn validate_post_input(payload: &PostRequest) -> Result<(), AppError> {
    if payload.title.trim().is_empty() {
        return Err(AppError::bad_request("title cannot be empty"));
    }
    if payload.title.len() > MAX_TITLE_LEN {
        return Err(AppError::bad_request("title must be at most 255 characters"));
    }
    if payload.body.trim().is_empty() {
        return Err(AppError::bad_request("body cannot be empty"));
    }
    Ok(())
}

pub async fn create_post(
    auth: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<PostRequest>,
) -> Result<(StatusCode, Json<Post>), AppError> {
    validate_post_input(&payload)?;

    let service = PostService::new(state.db.clone(), state.cache.clone());
    let post = service
        .create(auth.user_id, payload.title, payload.body)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, "failed to create post");
            AppError::internal("failed to create post")
        })?;

    state
        .queue
        .submit(Job::NotifyFollowers {
            post_title: post.title.clone(),
            author_id: post.author_id,
        })
        .await;

    Ok((StatusCode::CREATED, Json(post)))
}

pub async fn get_post(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Json<Post>, AppError> {
    let service = PostService::new(state.db.clone(), state.cache.clone());
    let post = service.get(id).await.map_err(|err| {
        tracing::error!(error = ?err, post_id = %id, "failed to fetch post");
        AppError::internal("failed to fetch post")
    })?;

    match post {
        Some(post) => Ok(Json(post)),
        None => Err(AppError::not_found("post not found")),
    }
}

pub async fn update_post(
    Path(id): Path<Uuid>,
    auth: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<PostRequest>,
) -> Result<Json<Post>, AppError> {
    validate_post_input(&payload)?;

    let service = PostService::new(state.db.clone(), state.cache.clone());
    let author_id = service.author_of(id).await.map_err(|err| {
        tracing::error!(error = ?err, post_id = %id, "failed to fetch post author");
        AppError::internal("failed to update post")
    })?;
    let author_id = author_id.ok_or_else(|| AppError::not_found("post not found"))?;
    if author_id != auth.user_id {
        return Err(AppError::forbidden("only the author can modify a post"));
    }

    let post = service
        .update(id, payload.title, payload.body)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, post_id = %id, "failed to update post");
            AppError::internal("failed to update post")
        })?;

    match post {
        Some(post) => Ok(Json(post)),
        None => Err(AppError::not_found("post not found")),
    }
}

pub async fn delete_post(
    Path(id): Path<Uuid>,
    auth: AuthUser,
    State(state): State<AppState>,
) -> Result<StatusCode, AppError> {
    let service = PostService::new(state.db.clone(), state.cache.clone());
    let author_id = service.author_of(id).await.map_err(|err| {
        tracing::error!(error = ?err, post_id = %id, "failed to fetch post author");
        AppError::internal("failed to delete post")
    })?;
    let author_id = author_id.ok_or_else(|| AppError::not_found("post not found"))?;
    if author_id != auth.user_id {
        return Err(AppError::forbidden("only the author can delete a post"));
    }

    let deleted = service.delete(id).await.map_err(|err| {
        tracing::error!(error = ?err, post_id = %id, "failed to delete post");
        AppError::internal("failed to delete post")
    })?;

    if deleted {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::not_found("post not found"))
    }
}

// ---------------------------------------------------------------------------
// Comments
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct CommentListQuery {
    pub post: Option<Uuid>,
}

pub async fn list_comments(
    State(state): State<AppState>,
    Query(query): Query<CommentListQuery>,
) -> Result<Json<Vec<Comment>>, AppError> {
    let service = CommentService::new(state.db.clone(), state.cache.clone());
    let comments = service.list(query.post).await.map_err(|err| {
        tracing::error!(error = ?err, "failed to list comments");
        AppError::internal("failed to list comments")
    })?;

    Ok(Json(comments))
}

#[derive(Deserialize)]
pub struct CreateCommentRequest {
    pub post: Option<Uuid>,
    pub body: String,
}

pub async fn create_comment(
    auth: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<CreateCommentRequest>,
) -> Result<(StatusCode, Json<Comment>), AppError> {
    let post_id = payload
        .post
        .ok_or_else(|| AppError::bad_request("post is required"))?;
    if payload.body.trim().is_empty() {
        return Err(AppError::bad_request("body cannot be empty"));
    }

    let service = CommentService::new(state.db.clone(), state.cache.clone());
    let comment = service
        .create(auth.user_id, post_id, payload.body)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, post_id = %post_id, "failed to create comment");
            AppError::internal("failed to create comment")
        })?;

    match comment {
        Some(comment) => Ok((StatusCode::CREATED, Json(comment))),
        None => Err(AppError::not_found("post not found")),
    }
}

pub async fn get_comment(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Json<Comment>, AppError> {
    let service = CommentService::new(state.db.clone(), state.cache.clone());
    let comment = service.get(id).await.map_err(|err| {
        tracing::error!(error = ?err, comment_id = %id, "failed to fetch comment");
        AppError::internal("failed to fetch comment")
    })?;

    match comment {
        Some(comment) => Ok(Json(comment)),
        None => Err(AppError::not_found("comment not found")),
    }
}

#[derive(Deserialize)]
pub struct UpdateCommentRequest {
    pub body: String,
}

pub async fn update_comment(
    Path(id): Path<Uuid>,
    auth: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<UpdateCommentRequest>,
) -> Result<Json<Comment>, AppError> {
    if payload.body.trim().is_empty() {
        return Err(AppError::bad_request("body cannot be empty"));
    }

    let service = CommentService::new(state.db.clone(), state.cache.clone());
    let author_id = service.author_of(id).await.map_err(|err| {
        tracing::error!(error = ?err, comment_id = %id, "failed to fetch comment author");
        AppError::internal("failed to update comment")
    })?;
    let author_id = author_id.ok_or_else(|| AppError::not_found("comment not found"))?;
    if author_id != auth.user_id {
        return Err(AppError::forbidden("only the author can modify a comment"));
    }

    let comment = service.update(id, payload.body).await.map_err(|err| {
        tracing::error!(error = ?err, comment_id = %id, "failed to update comment");
        AppError::internal("failed to update comment")
    })?;

    match comment {
        Some(comment) => Ok(Json(comment)),
        None => Err(AppError::not_found("comment not found")),
    }
}

pub async fn delete_comment(
    Path(id): Path<Uuid>,
    auth: AuthUser,
    State(state): State<AppState>,
) -> Result<StatusCode, AppError> {
    let service = CommentService::new(state.db.clone(), state.cache.clone());
    let author_id = service.author_of(id).await.map_err(|err| {
        tracing::error!(error = ?err, comment_id = %id, "failed to fetch comment author");
        AppError::internal("failed to delete comment")
    })?;
    let author_id = author_id.ok_or_else(|| AppError::not_found("comment not found"))?;
    if author_id != auth.user_id {
        return Err(AppError::forbidden("only the author can delete a comment"));
    }

    let deleted = service.delete(id).await.map_err(|err| {
        tracing::error!(error = ?err, comment_id = %id, "failed to delete comment");
        AppError::internal("failed to delete comment")
    })?;

    if deleted {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::not_found("comment not found"))
    }
}

// ---------------------------------------------------------------------------
// Follow graph
// ---------------------------------------------------------------------------

pub async fn list_followers(
    auth: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<FollowEdge>>, AppError> {
    let service = SocialService::new(state.db.clone());
    let edges = service.list_following(auth.user_id).await.map_err(|err| {
        tracing::error!(error = ?err, user_id = %auth.user_id, "failed to list follows");
        AppError::internal("failed to list follows")
    })?;

    Ok(Json(edges))
}

#[derive(Deserialize)]
pub struct FollowRequest {
    pub follows: Option<Uuid>,
}

pub async fn create_follower(
    auth: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<FollowRequest>,
) -> Result<(StatusCode, Json<FollowEdge>), AppError> {
    let followee_id = payload
        .follows
        .ok_or_else(|| AppError::bad_request("follows is required"))?;
    if followee_id == auth.user_id {
        return Err(AppError::bad_request("cannot follow yourself"));
    }

    let service = SocialService::new(state.db.clone());
    let outcome = service
        .follow(auth.user_id, followee_id)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, followee_id = %followee_id, "failed to follow user");
            AppError::internal("failed to follow user")
        })?;

    match outcome {
        FollowOutcome::Created(edge) => Ok((StatusCode::CREATED, Json(edge))),
        FollowOutcome::AlreadyFollowing => Err(AppError::conflict("already following this user")),
        FollowOutcome::TargetMissing => Err(AppError::not_found("user not found")),
    }
}

pub async fn delete_follower(
    Path(id): Path<Uuid>,
    auth: AuthUser,
    State(state): State<AppState>,
) -> Result<StatusCode, AppError> {
    let service = SocialService::new(state.db.clone());
    let deleted = service.delete_edge(id, auth.user_id).await.map_err(|err| {
        tracing::error!(error = ?err, edge_id = %id, "failed to delete follow");
        AppError::internal("failed to delete follow")
    })?;

    if deleted {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::not_found("follow relationship does not exist"))
    }
}

pub async fn unfollow(
    auth: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<FollowRequest>,
) -> Result<StatusCode, AppError> {
    let followee_id = payload
        .follows
        .ok_or_else(|| AppError::bad_request("follows is required"))?;

    let service = SocialService::new(state.db.clone());
    let removed = service
        .unfollow(auth.user_id, followee_id)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, followee_id = %followee_id, "failed to unfollow");
            AppError::internal("failed to unfollow")
        })?;

    if removed {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::not_found("follow relationship does not exist"))
    }
}
