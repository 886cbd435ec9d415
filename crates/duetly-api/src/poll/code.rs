// Poll variant code execution

use serde::Deserialize;
use tracing::debug;

use crate::error::Error;
use crate::poll::client::PollClient;
use crate::transport::{Request, decode_json, decode_text};
use crate::types::CodeAck;

#[derive(Debug, Deserialize)]
struct GcodeResponse {
    buff: Option<u32>,
    #[serde(default)]
    err: i64,
}

impl PollClient {
    /// Submit raw code text.
    ///
    /// Not retried transparently: a resubmitted code could run twice.
    pub async fn send_code(&self, code: &str) -> Result<CodeAck, Error> {
        debug!(code, "sending code");
        let req = Request::get("/rr_gcode").query("gcode", code).no_retry();
        let body = self.send(req).await?;
        let resp: GcodeResponse = decode_json(&body)?;

        if resp.err != 0 {
            return Err(Error::CodeResponse {
                message: format!("controller returned err {}", resp.err),
            });
        }
        match resp.buff {
            Some(0) => Err(Error::CodeBuffer),
            Some(buffer_space) => Ok(CodeAck::Queued { buffer_space }),
            None => Err(Error::CodeResponse {
                message: "missing buffer space".into(),
            }),
        }
    }

    /// Fetch the most recent code reply.
    pub async fn reply(&self) -> Result<String, Error> {
        let body = self.send(Request::get("/rr_reply")).await?;
        Ok(decode_text(&body))
    }
}
