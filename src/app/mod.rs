pub mod auth;
pub mod comments;
pub mod posts;
pub mod social;
pub mod users;
