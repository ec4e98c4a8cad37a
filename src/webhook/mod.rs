//! Verifies push webhook signatures and expands pushes into jobs via
//! repo→hosts config (spec §4.5).

pub mod error;
pub mod github;
pub mod signature;
pub mod translator;

pub use error::{Result, WebhookError};
pub use translator::WebhookTranslator;
