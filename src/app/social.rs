use anyhow::Result;
use sqlx::Row;
use uuid::Uuid;

use crate::domain::follow::FollowEdge;
use crate::infra::db::Db;

/// Result of a follow attempt. The (follower, followee) pair is unique at
/// the store level; a duplicate insert affects zero rows instead of raising,
/// which keeps the outcome deterministic under concurrent requests.
#[derive(Debug)]
pub enum FollowOutcome {
    Created(FollowEdge),
    AlreadyFollowing,
    TargetMissing,
}

#[derive(Clone)]
pub struct SocialService {
    db: Db,
}

impl SocialService {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    pub async fn follow(&self, follower_id: Uuid, followee_id: Uuid) -> Result<FollowOutcome> {
        let target_exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE id = $1)")
                .bind(followee_id)
                .fetch_one(self.db.pool())
                .await?;
        if !target_exists {
            return Ok(FollowOutcome::TargetMissing);
        }

        let row = sqlx::query(
            "INSERT INTO follows (follower_id, followee_id) \
             VALUES ($1, $2) \
             ON CONFLICT (follower_id, followee_id) DO NOTHING \
             RETURNING id",
        )
        .bind(follower_id)
        .bind(followee_id)
        .fetch_optional(self.db.pool())
        .await?;

        match row {
            Some(row) => Ok(FollowOutcome::Created(FollowEdge {
                id: row.get("id"),
                follower_id,
                followee_id,
            })),
            None => Ok(FollowOutcome::AlreadyFollowing),
        }
    }

    /// The requester's outgoing edges (who they follow).
    pub async fn list_following(&self, follower_id: Uuid) -> Result<Vec<FollowEdge>> {
        let rows = sqlx::query(
            "SELECT id, follower_id, followee_id \
             FROM follows \
             WHERE follower_id = $1 \
             ORDER BY created_at DESC, id DESC",
        )
        .bind(follower_id)
        .fetch_all(self.db.pool())
        .await?;

        let mut edges = Vec::with_capacity(rows.len());
        for row in rows {
            edges.push(FollowEdge {
                id: row.get("id"),
                follower_id: row.get("follower_id"),
                followee_id: row.get("followee_id"),
            });
        }

        Ok(edges)
    }

    /// Delete an edge by id, scoped to its subject. An edge owned by someone
    /// else is indistinguishable from a missing one.
    pub async fn delete_edge(&self, edge_id: Uuid, follower_id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM follows WHERE id = $1 AND follower_id = $2")
            .bind(edge_id)
            .bind(follower_id)
            .execute(self.db.pool())
            .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn unfollow(&self, follower_id: Uuid, followee_id: Uuid) -> Result<bool> {
        let result =
            sqlx::query("DELETE FROM follows WHERE follower_id = $1 AND followee_id = $2")
                .bind(follower_id)
                .bind(followee_id)
                .execute(self.db.pool())
                .await?;

        Ok(result.rows_affected() > 0)
    }
}
