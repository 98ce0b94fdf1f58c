//! Remote synchronization: API surface, HTTP client and engine

pub mod api;
pub mod engine;
pub mod http;

pub use api::{ApiError, ConfigApi};
pub use engine::{FlushReport, PushOutcome, PushSpec, SyncEngine, SyncFailure};
pub use http::HttpConfigApi;
