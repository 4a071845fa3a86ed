use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Directed follow relationship: `user` follows `follows`. The wire names
/// match the public API; internally `user` is the subject (always the
/// authenticated requester) and `follows` the object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FollowEdge {
    pub id: Uuid,
    #[serde(rename = "user")]
    pub follower_id: Uuid,
    #[serde(rename = "follows")]
    pub followee_id: Uuid,
}
