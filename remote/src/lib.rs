#![allow(dead_code)]

pub mod api;
pub mod limiter;
pub mod names;
pub mod retry;
pub mod token_store;
pub mod virtual_api;

pub use api::{DriveApi, HttpDriveApi};
pub use limiter::RateLimiter;
pub use names::DriveNameCache;
pub use retry::retry_request;
pub use token_store::TokenStore;
pub use virtual_api::VirtualDriveApi;
