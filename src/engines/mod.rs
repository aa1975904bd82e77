//! Search engine implementations.

mod json_api;

pub use json_api::{JsonApiConfig, JsonApiEngine};
