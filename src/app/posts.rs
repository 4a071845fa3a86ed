use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use sqlx::Row;
use tracing::debug;
use uuid::Uuid;

use crate::domain::comment::Comment;
use crate::domain::post::Post;
use crate::infra::cache::Cache;
use crate::infra::db::Db;

/// Post payloads are cached briefly; every write below invalidates both the
/// listing and the touched detail entry, so TTL only matters when an
/// invalidation is lost (crash between store write and cache delete).
const POST_CACHE_TTL: Duration = Duration::from_secs(60);

pub const POSTS_LIST_KEY: &str = "posts_list";

pub fn post_key(post_id: Uuid) -> String {
    format!("post_{}", post_id)
}

#[derive(Debug, Default, Clone)]
pub struct PostFilter {
    pub title: Option<String>,
    pub author: Option<String>,
}

impl PostFilter {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.author.is_none()
    }
}

#[derive(Clone)]
pub struct PostService {
    db: Db,
    cache: Arc<dyn Cache>,
}

impl PostService {
    pub fn new(db: Db, cache: Arc<dyn Cache>) -> Self {
        Self { db, cache }
    }

    /// List posts, newest first. Only the unfiltered listing is served
    /// through the cache; a filtered query goes straight to the store so the
    /// single `posts_list` entry never answers for a narrower result set.
    pub async fn list(&self, filter: &PostFilter) -> Result<Vec<Post>> {
        if filter.is_empty() {
            if let Some(payload) = self.cache.get(POSTS_LIST_KEY).await {
                if let Ok(posts) = serde_json::from_str::<Vec<Post>>(&payload) {
                    debug!(key = POSTS_LIST_KEY, "cache hit");
                    return Ok(posts);
                }
            }
            debug!(key = POSTS_LIST_KEY, "cache miss");
        }

        let posts = self.query_posts(filter).await?;

        if filter.is_empty() {
            if let Ok(payload) = serde_json::to_string(&posts) {
                self.cache
                    .set(POSTS_LIST_KEY, payload, POST_CACHE_TTL)
                    .await;
            }
        }

        Ok(posts)
    }

    pub async fn get(&self, post_id: Uuid) -> Result<Option<Post>> {
        let key = post_key(post_id);
        if let Some(payload) = self.cache.get(&key).await {
            if let Ok(post) = serde_json::from_str::<Post>(&payload) {
                debug!(key, "cache hit");
                return Ok(Some(post));
            }
        }
        debug!(key, "cache miss");

        let post = self.query_post(post_id).await?;
        if let Some(post) = &post {
            if let Ok(payload) = serde_json::to_string(post) {
                self.cache.set(&key, payload, POST_CACHE_TTL).await;
            }
        }

        Ok(post)
    }

    /// Author lookup for ownership checks, bypassing the cache.
    pub async fn author_of(&self, post_id: Uuid) -> Result<Option<Uuid>> {
        let author_id = sqlx::query_scalar("SELECT author_id FROM posts WHERE id = $1")
            .bind(post_id)
            .fetch_optional(self.db.pool())
            .await?;
        Ok(author_id)
    }

    pub async fn create(&self, author_id: Uuid, title: String, body: String) -> Result<Post> {
        let row = sqlx::query(
            "WITH inserted AS ( \
                INSERT INTO posts (author_id, title, body) \
                VALUES ($1, $2, $3) \
                RETURNING id, author_id, title, body, created_at \
             ) \
             SELECT p.id, p.title, p.body, p.author_id, u.username AS author, p.created_at \
             FROM inserted p \
             JOIN users u ON u.id = p.author_id",
        )
        .bind(author_id)
        .bind(title)
        .bind(body)
        .fetch_one(self.db.pool())
        .await?;

        let post = Post {
            id: row.get("id"),
            title: row.get("title"),
            body: row.get("body"),
            author_id: row.get("author_id"),
            author: row.get("author"),
            created_at: row.get("created_at"),
            comments: Vec::new(),
        };

        self.cache.delete(POSTS_LIST_KEY).await;
        self.cache.delete(&post_key(post.id)).await;

        Ok(post)
    }

    pub async fn update(&self, post_id: Uuid, title: String, body: String) -> Result<Option<Post>> {
        let row = sqlx::query(
            "WITH updated AS ( \
                UPDATE posts SET title = $2, body = $3 \
                WHERE id = $1 \
                RETURNING id, author_id, title, body, created_at \
             ) \
             SELECT p.id, p.title, p.body, p.author_id, u.username AS author, p.created_at \
             FROM updated p \
             JOIN users u ON u.id = p.author_id",
        )
        .bind(post_id)
        .bind(title)
        .bind(body)
        .fetch_optional(self.db.pool())
        .await?;

        let post = match row {
            Some(row) => {
                let mut post = Post {
                    id: row.get("id"),
                    title: row.get("title"),
                    body: row.get("body"),
                    author_id: row.get("author_id"),
                    author: row.get("author"),
                    created_at: row.get("created_at"),
                    comments: Vec::new(),
                };
                self.attach_comments(std::slice::from_mut(&mut post)).await?;
                Some(post)
            }
            None => None,
        };

        if post.is_some() {
            self.cache.delete(POSTS_LIST_KEY).await;
            self.cache.delete(&post_key(post_id)).await;
        }

        Ok(post)
    }

    /// Delete a post. Invalidates the post's own cache entries; the post's
    /// comment-list entry is intentionally left to expire via TTL.
    pub async fn delete(&self, post_id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM posts WHERE id = $1")
            .bind(post_id)
            .execute(self.db.pool())
            .await?;

        let deleted = result.rows_affected() > 0;
        if deleted {
            self.cache.delete(POSTS_LIST_KEY).await;
            self.cache.delete(&post_key(post_id)).await;
        }

        Ok(deleted)
    }

    async fn query_post(&self, post_id: Uuid) -> Result<Option<Post>> {
        let row = sqlx::query(
            "SELECT p.id, p.title, p.body, p.author_id, u.username AS author, p.created_at \
             FROM posts p \
             JOIN users u ON u.id = p.author_id \
             WHERE p.id = $1",
        )
        .bind(post_id)
        .fetch_optional(self.db.pool())
        .await?;

        let post = match row {
            Some(row) => {
                let mut post = Post {
                    id: row.get("id"),
                    title: row.get("title"),
                    body: row.get("body"),
                    author_id: row.get("author_id"),
                    author: row.get("author"),
                    created_at: row.get("created_at"),
                    comments: Vec::new(),
                };
                self.attach_comments(std::slice::from_mut(&mut post)).await?;
                Some(post)
            }
            None => None,
        };

        Ok(post)
    }

    async fn query_posts(&self, filter: &PostFilter) -> Result<Vec<Post>> {
        let rows = match (&filter.title, &filter.author) {
            (Some(title), Some(author)) => {
                sqlx::query(
                    "SELECT p.id, p.title, p.body, p.author_id, u.username AS author, p.created_at \
                     FROM posts p \
                     JOIN users u ON u.id = p.author_id \
                     WHERE p.title = $1 AND u.username = $2 \
                     ORDER BY p.created_at DESC, p.id DESC",
                )
                .bind(title)
                .bind(author)
                .fetch_all(self.db.pool())
                .await?
            }
            (Some(title), None) => {
                sqlx::query(
                    "SELECT p.id, p.title, p.body, p.author_id, u.username AS author, p.created_at \
                     FROM posts p \
                     JOIN users u ON u.id = p.author_id \
                     WHERE p.title = $1 \
                     ORDER BY p.created_at DESC, p.id DESC",
                )
                .bind(title)
                .fetch_all(self.db.pool())
                .await?
            }
            (None, Some(author)) => {
                sqlx::query(
                    "SELECT p.id, p.title, p.body, p.author_id, u.username AS author, p.created_at \
                     FROM posts p \
                     JOIN users u ON u.id = p.author_id \
                     WHERE u.username = $1 \
                     ORDER BY p.created_at DESC, p.id DESC",
                )
                .bind(author)
                .fetch_all(self.db.pool())
                .await?
            }
            (None, None) => {
                sqlx::query(
                    "SELECT p.id, p.title, p.body, p.author_id, u.username AS author, p.created_at \
                     FROM posts p \
                     JOIN users u ON u.id = p.author_id \
                     ORDER BY p.created_at DESC, p.id DESC",
                )
                .fetch_all(self.db.pool())
                .await?
            }
        };

        let mut posts = Vec::with_capacity(rows.len());
        for row in rows {
            posts.push(Post {
                id: row.get("id"),
                title: row.get("title"),
                body: row.get("body"),
                author_id: row.get("author_id"),
                author: row.get("author"),
                created_at: row.get("created_at"),
                comments: Vec::new(),
            });
        }

        self.attach_comments(&mut posts).await?;
        Ok(posts)
    }

    /// Batch-load the comments for a page of posts in one query.
    async fn attach_comments(&self, posts: &mut [Post]) -> Result<()> {
        if posts.is_empty() {
            return Ok(());
        }

        let post_ids: Vec<Uuid> = posts.iter().map(|post| post.id).collect();
        let rows = sqlx::query(
            "SELECT c.id, c.post_id, c.author_id, u.username AS author, c.body, c.created_at \
             FROM comments c \
             JOIN users u ON u.id = c.author_id \
             WHERE c.post_id = ANY($1) \
             ORDER BY c.created_at DESC, c.id DESC",
        )
        .bind(&post_ids)
        .fetch_all(self.db.pool())
        .await?;

        let mut by_post: HashMap<Uuid, Vec<Comment>> = HashMap::new();
        for row in rows {
            let comment = Comment {
                id: row.get("id"),
                post_id: row.get("post_id"),
                author_id: row.get("author_id"),
                author: row.get("author"),
                body: row.get("body"),
                created_at: row.get("created_at"),
            };
            by_post.entry(comment.post_id).or_default().push(comment);
        }

        for post in posts.iter_mut() {
            post.comments = by_post.remove(&post.id).unwrap_or_default();
        }

        Ok(())
    }
}
