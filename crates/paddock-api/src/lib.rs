pub mod auth;
pub mod connections;
pub mod conversations;
pub mod error;
pub mod messages;
pub mod middleware;

mod convert;
