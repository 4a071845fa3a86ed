use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use sqlx::Row;
use tracing::debug;
use uuid::Uuid;

use crate::domain::comment::Comment;
use crate::infra::cache::Cache;
use crate::infra::db::Db;

/// Comment listings change less often than posts, so they keep a longer TTL.
const COMMENT_CACHE_TTL: Duration = Duration::from_secs(600);

/// Cache key for a comment listing: per-post when filtered, one shared entry
/// otherwise. Writes only ever invalidate the per-post entry, so the
/// unfiltered `comments_all` entry serves its snapshot until TTL expiry.
pub fn comment_list_key(post_id: Option<Uuid>) -> String {
    match post_id {
        Some(post_id) => format!("comments_post_{}", post_id),
        None => "comments_all".to_string(),
    }
}

#[derive(Clone)]
pub struct CommentService {
    db: Db,
    cache: Arc<dyn Cache>,
}

impl CommentService {
    pub fn new(db: Db, cache: Arc<dyn Cache>) -> Self {
        Self { db, cache }
    }

    pub async fn list(&self, post_id: Option<Uuid>) -> Result<Vec<Comment>> {
        let key = comment_list_key(post_id);
        if let Some(payload) = self.cache.get(&key).await {
            if let Ok(comments) = serde_json::from_str::<Vec<Comment>>(&payload) {
                debug!(key, "cache hit");
                return Ok(comments);
            }
        }
        debug!(key, "cache miss");

        let rows = match post_id {
            Some(post_id) => {
                sqlx::query(
                    "SELECT c.id, c.post_id, c.author_id, u.username AS author, c.body, c.created_at \
                     FROM comments c \
                     JOIN users u ON u.id = c.author_id \
                     WHERE c.post_id = $1 \
                     ORDER BY c.created_at DESC, c.id DESC",
                )
                .bind(post_id)
                .fetch_all(self.db.pool())
                .await?
            }
            None => {
                sqlx::query(
                    "SELECT c.id, c.post_id, c.author_id, u.username AS author, c.body, c.created_at \
                     FROM comments c \
                     JOIN users u ON u.id = c.author_id \
                     ORDER BY c.created_at DESC, c.id DESC",
                )
                .fetch_all(self.db.pool())
                .await?
            }
        };

        let mut comments = Vec::with_capacity(rows.len());
        for row in rows {
            comments.push(Comment {
                id: row.get("id"),
                post_id: row.get("post_id"),
                author_id: row.get("author_id"),
                author: row.get("author"),
                body: row.get("body"),
                created_at: row.get("created_at"),
            });
        }

        if let Ok(payload) = serde_json::to_string(&comments) {
            self.cache.set(&key, payload, COMMENT_CACHE_TTL).await;
        }

        Ok(comments)
    }

    pub async fn get(&self, comment_id: Uuid) -> Result<Option<Comment>> {
        let row = sqlx::query(
            "SELECT c.id, c.post_id, c.author_id, u.username AS author, c.body, c.created_at \
             FROM comments c \
             JOIN users u ON u.id = c.author_id \
             WHERE c.id = $1",
        )
        .bind(comment_id)
        .fetch_optional(self.db.pool())
        .await?;

        let comment = row.map(|row| Comment {
            id: row.get("id"),
            post_id: row.get("post_id"),
            author_id: row.get("author_id"),
            author: row.get("author"),
            body: row.get("body"),
            created_at: row.get("created_at"),
        });

        Ok(comment)
    }

    pub async fn author_of(&self, comment_id: Uuid) -> Result<Option<Uuid>> {
        let author_id = sqlx::query_scalar("SELECT author_id FROM comments WHERE id = $1")
            .bind(comment_id)
            .fetch_optional(self.db.pool())
            .await?;
        Ok(author_id)
    }

    /// Create a comment under an existing post. Returns `None` when the
    /// parent post does not resolve.
    pub async fn create(
        &self,
        author_id: Uuid,
        post_id: Uuid,
        body: String,
    ) -> Result<Option<Comment>> {
        let row = sqlx::query(
            "WITH inserted AS ( \
                INSERT INTO comments (post_id, author_id, body) \
                SELECT $1, $2, $3 WHERE EXISTS (SELECT 1 FROM posts WHERE id = $1) \
                RETURNING id, post_id, author_id, body, created_at \
             ) \
             SELECT c.id, c.post_id, c.author_id, u.username AS author, c.body, c.created_at \
             FROM inserted c \
             JOIN users u ON u.id = c.author_id",
        )
        .bind(post_id)
        .bind(author_id)
        .bind(body)
        .fetch_optional(self.db.pool())
        .await?;

        let comment = row.map(|row| Comment {
            id: row.get("id"),
            post_id: row.get("post_id"),
            author_id: row.get("author_id"),
            author: row.get("author"),
            body: row.get("body"),
            created_at: row.get("created_at"),
        });

        if let Some(comment) = &comment {
            self.cache
                .delete(&comment_list_key(Some(comment.post_id)))
                .await;
        }

        Ok(comment)
    }

    pub async fn update(&self, comment_id: Uuid, body: String) -> Result<Option<Comment>> {
        let row = sqlx::query(
            "WITH updated AS ( \
                UPDATE comments SET body = $2 \
                WHERE id = $1 \
                RETURNING id, post_id, author_id, body, created_at \
             ) \
             SELECT c.id, c.post_id, c.author_id, u.username AS author, c.body, c.created_at \
             FROM updated c \
             JOIN users u ON u.id = c.author_id",
        )
        .bind(comment_id)
        .bind(body)
        .fetch_optional(self.db.pool())
        .await?;

        let comment = row.map(|row| Comment {
            id: row.get("id"),
            post_id: row.get("post_id"),
            author_id: row.get("author_id"),
            author: row.get("author"),
            body: row.get("body"),
            created_at: row.get("created_at"),
        });

        if let Some(comment) = &comment {
            self.cache
                .delete(&comment_list_key(Some(comment.post_id)))
                .await;
        }

        Ok(comment)
    }

    pub async fn delete(&self, comment_id: Uuid) -> Result<bool> {
        let post_id: Option<Uuid> =
            sqlx::query_scalar("DELETE FROM comments WHERE id = $1 RETURNING post_id")
                .bind(comment_id)
                .fetch_optional(self.db.pool())
                .await?;

        match post_id {
            Some(post_id) => {
                self.cache.delete(&comment_list_key(Some(post_id))).await;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
