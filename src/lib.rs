pub mod archiver;
pub mod board;
pub mod categorizer;
pub mod chat;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod feed;
pub mod model;
pub mod pipeline;
pub mod store;
