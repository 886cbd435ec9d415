// Poll variant model queries
//
// `rr_model` returns one section per request. Large array sections are
// paginated: a non-zero `next` is the array offset to continue from.

use serde::Deserialize;
use serde_json::Value;
use tracing::{trace, warn};

use crate::error::Error;
use crate::poll::client::PollClient;
use crate::poll::{FULL_QUERY_FLAGS, LIVE_QUERY_FLAGS};
use crate::transport::{Request, decode_json};

#[derive(Debug, Deserialize)]
struct ModelResponse {
    #[serde(default)]
    result: Value,
    #[serde(default)]
    next: u64,
}

impl PollClient {
    /// Fetch the complete current value of one model section.
    pub async fn query_section(&self, key: &str) -> Result<Value, Error> {
        let first = self.model_request(key, FULL_QUERY_FLAGS).await?;
        let mut result = first.result;
        let mut next = first.next;

        while next > 0 {
            trace!(key, next, "fetching next model page");
            let page = self
                .model_request(key, &format!("{FULL_QUERY_FLAGS}a{next}"))
                .await?;
            match (&mut result, page.result) {
                (Value::Array(items), Value::Array(more)) => items.extend(more),
                (_, other) => {
                    warn!(key, "paginated model response was not an array");
                    result = other;
                    break;
                }
            }
            if page.next != 0 && page.next <= next {
                return Err(Error::OperationFailed {
                    reason: format!("model pagination for '{key}' did not advance"),
                });
            }
            next = page.next;
        }

        Ok(result)
    }

    /// Fetch the live subset: fast-changing values plus sequence counters.
    pub async fn query_live(&self) -> Result<Value, Error> {
        Ok(self.model_request("", LIVE_QUERY_FLAGS).await?.result)
    }

    async fn model_request(&self, key: &str, flags: &str) -> Result<ModelResponse, Error> {
        let req = Request::get("/rr_model")
            .query("key", key)
            .query("flags", flags);
        let body = self.send(req).await?;
        decode_json(&body)
    }
}
