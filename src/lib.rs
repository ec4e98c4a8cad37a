pub mod agents;
pub mod api;
pub mod config;
pub mod dispatch;
pub mod domain;
pub mod humanize;
pub mod logs;
pub mod observability;
pub mod queue;
pub mod store;
pub mod webhook;
