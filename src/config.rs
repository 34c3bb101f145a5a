//! Configuration helpers reading the process environment.
//!
//! | Variable                | Used by          |
//! |-------------------------|------------------|
//! | `MESSAGES_SDK_BASE_URL` | [`get_base_url`] |
//! | `MESSAGES_SDK_MODEL`    | [`get_model`]    |
//! | `MESSAGES_SDK_API_KEY`  | [`get_api_key`]  |
//!
//! ```rust,no_run
//! use messages_sdk::{AgentOptions, config};
//!
//! # fn main() -> messages_sdk::Result<()> {
//! let options = AgentOptions::builder()
//!     .base_url(config::get_base_url(None))
//!     .model(config::get_model(Some("claude-sonnet-4-5"), true).unwrap_or_default())
//!     .api_key(config::get_api_key().unwrap_or_default())
//!     .build()?;
//! # Ok(())
//! # }
//! ```

use crate::types::DEFAULT_BASE_URL;
use std::env;

pub const BASE_URL_VAR: &str = "MESSAGES_SDK_BASE_URL";
pub const MODEL_VAR: &str = "MESSAGES_SDK_MODEL";
pub const API_KEY_VAR: &str = "MESSAGES_SDK_API_KEY";

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Base URL from the environment, else `fallback`, else the default endpoint.
pub fn get_base_url(fallback: Option<&str>) -> String {
    non_empty_var(BASE_URL_VAR)
        .or_else(|| fallback.map(str::to_string))
        .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
}

/// Model name. With `prefer_env` the environment wins over `fallback`.
pub fn get_model(fallback: Option<&str>, prefer_env: bool) -> Option<String> {
    if prefer_env {
        if let Some(model) = non_empty_var(MODEL_VAR) {
            return Some(model);
        }
    }
    fallback.map(str::to_string)
}

/// API key from the environment, if set.
pub fn get_api_key() -> Option<String> {
    non_empty_var(API_KEY_VAR)
}
