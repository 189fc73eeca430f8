pub mod auth_cmd;
pub mod common;
pub mod completions;
pub mod config;
pub mod outbox;
pub mod pets;
pub mod sync;
