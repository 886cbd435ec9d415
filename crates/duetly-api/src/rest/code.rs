// REST variant code execution

use bytes::Bytes;
use tracing::debug;

use crate::error::Error;
use crate::rest::client::RestClient;
use crate::transport::{Deadline, Request, decode_text};
use crate::types::CodeAck;

impl RestClient {
    /// Execute code text.
    ///
    /// When `wait` is set the controller holds the request open until the
    /// code completes and returns its reply; otherwise it is queued
    /// (`async=true`) and acknowledged immediately.
    pub async fn send_code(&self, code: &str, wait: bool) -> Result<CodeAck, Error> {
        debug!(code, wait, "sending code");
        let mut req = Request::post("/machine/code")
            .body(Bytes::from(code.to_owned()), "text/plain")
            .no_retry();
        if wait {
            // Codes such as homing moves can take arbitrarily long.
            req = req.deadline(Deadline::Unbounded);
        } else {
            req = req.query("async", "true");
        }
        let body = self.send(req).await?;
        if wait {
            Ok(CodeAck::Replied(decode_text(&body)))
        } else {
            Ok(CodeAck::Queued { buffer_space: 1 })
        }
    }
}
