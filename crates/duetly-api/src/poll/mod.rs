// Standalone firmware variant
//
// The controller serves `rr_*` endpoints directly and has no push channel:
// the model is polled, and code replies are fetched through `rr_reply`.

mod auth;
mod client;
mod code;
mod files;
mod model;

pub use client::PollClient;

/// Flags selecting a full, verbose section query.
pub const FULL_QUERY_FLAGS: &str = "d99vn";
/// Flags selecting the fast-changing live subset.
pub const LIVE_QUERY_FLAGS: &str = "d99fn";
