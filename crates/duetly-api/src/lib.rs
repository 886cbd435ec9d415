// duetly-api: Async Rust transport for Duet controllers (standalone polling + board computer REST)

pub mod error;
pub mod machine;
pub mod poll;
pub mod progress;
pub mod rest;
pub mod retry;
pub mod session;
pub mod transport;
pub mod types;

pub use error::{Error, ErrorClass};
pub use machine::MachineClient;
pub use poll::PollClient;
pub use progress::{ProgressFn, TransferProgress};
pub use rest::{ModelSubscription, RestClient};
pub use retry::{ReconnectPolicy, RetryDecision, RetryPolicy};
pub use session::Session;
pub use transport::{Deadline, HttpTransport, Request, TlsMode, TransportConfig};
pub use types::{CodeAck, FileEntry, FileInfo, FileKind, Variant};
