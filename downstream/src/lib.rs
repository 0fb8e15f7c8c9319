#![allow(dead_code)]

pub mod notify;
pub mod refresh;
pub mod transport;

pub use notify::NotifyService;
pub use refresh::RefreshService;
pub use transport::{HttpTransport, PostRequest, VirtualTransport, WebhookTransport};
