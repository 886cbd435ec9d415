// Board computer variant
//
// The control service exposes REST endpoints under `/machine` and pushes
// the object model over a WebSocket: the full model first, then patches.
// Code replies come back synchronously from the code endpoint.

mod auth;
mod client;
mod code;
mod files;
mod websocket;

pub use client::RestClient;
pub use websocket::ModelSubscription;
