// ── Code submission bookkeeping ──
//
// The standalone firmware does not tag replies with the code that caused
// them. It bumps a reply sequence counter instead, so a waiting caller is
// matched to the first reply whose counter moved past the value observed
// when the code was sent. Callers are resolved in submission order.

use std::collections::VecDeque;

use tokio::sync::oneshot;
use tracing::{debug, trace};

use crate::error::CoreError;

/// Codes that never produce a reply: emergency stop, reset and firmware
/// update take the controller away before it can answer.
const NO_REPLY_CODES: &[&str] = &["M112", "M999", "M997"];

/// Whether submitting `code` can be expected to produce a reply.
///
/// Comments (`; ...` and `( ... )`) and quoted strings are ignored. Blank
/// input produces no reply.
pub fn expects_reply(code: &str) -> bool {
    let stripped = strip_comments(code);
    if stripped.trim().is_empty() {
        return false;
    }
    let upper = stripped.to_ascii_uppercase();
    !NO_REPLY_CODES.iter().any(|c| contains_word(&upper, c))
}

fn strip_comments(code: &str) -> String {
    let mut out = String::with_capacity(code.len());
    for line in code.lines() {
        let mut in_quotes = false;
        let mut in_paren = false;
        for ch in line.chars() {
            match ch {
                '"' if !in_paren => in_quotes = !in_quotes,
                ';' if !in_quotes && !in_paren => break,
                '(' if !in_quotes => in_paren = true,
                ')' if in_paren => in_paren = false,
                _ if in_quotes || in_paren => {}
                _ => out.push(ch),
            }
        }
        out.push('\n');
    }
    out
}

/// `word` appears in `text` not followed by another digit, so `M1120`
/// does not match `M112`.
fn contains_word(text: &str, word: &str) -> bool {
    text.match_indices(word).any(|(start, _)| {
        let before_ok = text[..start]
            .chars()
            .next_back()
            .is_none_or(|c| !c.is_ascii_alphanumeric());
        let after_ok = text[start + word.len()..]
            .chars()
            .next()
            .is_none_or(|c| !c.is_ascii_digit());
        before_ok && after_ok
    })
}

// ── Pending commands ─────────────────────────────────────────────────

/// Outcome delivered to a waiting caller.
pub type ReplyResult = Result<String, CoreError>;

struct PendingCommand {
    id: u64,
    sequence_at_send: u64,
    tx: oneshot::Sender<ReplyResult>,
}

/// FIFO of callers awaiting a reply.
///
/// The queue is closed while no update loop runs, since nothing would ever
/// fetch a reply for a code sent then.
#[derive(Default)]
pub struct PendingCommands {
    next_id: u64,
    last_reply_seq: u64,
    closed: bool,
    queue: VecDeque<PendingCommand>,
}

impl PendingCommands {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_reply_seq(&mut self, seq: u64) {
        self.last_reply_seq = seq;
    }

    /// The controller restarted and its reply counter starts over.
    pub fn reset_reply_seq(&mut self) {
        self.last_reply_seq = 0;
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Accept callers again once an update loop is running.
    pub fn open(&mut self) {
        self.closed = false;
    }

    /// Fail every waiting caller and refuse new ones until [`open`](Self::open).
    pub fn close(&mut self, make_err: impl Fn() -> CoreError) {
        self.closed = true;
        self.reject_all(make_err);
    }

    /// Enqueue a caller. Must happen before the code is sent so a fast
    /// reply cannot be missed.
    pub fn register(&mut self) -> Result<(u64, oneshot::Receiver<ReplyResult>), CoreError> {
        if self.closed {
            return Err(CoreError::NotConnected);
        }
        let (tx, rx) = oneshot::channel();
        let id = self.next_id;
        self.next_id += 1;
        self.queue.push_back(PendingCommand {
            id,
            sequence_at_send: self.last_reply_seq,
            tx,
        });
        trace!(id, seq = self.last_reply_seq, "code registered");
        Ok((id, rx))
    }

    /// Withdraw a caller whose code never reached the controller.
    pub fn remove(&mut self, id: u64) {
        self.queue.retain(|p| p.id != id);
    }

    /// Deliver `reply` to every caller registered before the reply counter
    /// moved to `new_seq`, oldest first. Returns how many were resolved.
    ///
    /// A caller registered under any other counter value is due, including
    /// one from before a controller restart whose counter is now ahead.
    pub fn resolve(&mut self, new_seq: u64, reply: &str) -> usize {
        self.last_reply_seq = new_seq;
        let mut resolved = 0;
        while self
            .queue
            .front()
            .is_some_and(|p| p.sequence_at_send != new_seq)
        {
            if let Some(pending) = self.queue.pop_front() {
                // Receiver may have given up waiting.
                let _ = pending.tx.send(Ok(reply.to_owned()));
                resolved += 1;
            }
        }
        if resolved > 0 {
            debug!(resolved, seq = new_seq, "codes resolved");
        }
        resolved
    }

    /// Fail every waiting caller.
    pub fn reject_all(&mut self, make_err: impl Fn() -> CoreError) {
        for pending in self.queue.drain(..) {
            let _ = pending.tx.send(Err(make_err()));
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn blank_and_comment_only_codes_expect_no_reply() {
        assert!(!expects_reply(""));
        assert!(!expects_reply("   \n"));
        assert!(!expects_reply("; just a note"));
        assert!(!expects_reply("(pause here)"));
    }

    #[test]
    fn restart_codes_expect_no_reply() {
        assert!(!expects_reply("M112"));
        assert!(!expects_reply("m999"));
        assert!(!expects_reply("G28\nM997 S0"));
    }

    #[test]
    fn codes_in_comments_or_strings_are_ignored() {
        assert!(expects_reply("M117 \"M112 is e-stop\""));
        assert!(expects_reply("G28 ; then M999"));
        assert!(expects_reply("M1120"));
        assert!(expects_reply("M115"));
    }

    #[tokio::test]
    async fn replies_resolve_in_submission_order() {
        let mut pending = PendingCommands::new();
        pending.set_reply_seq(5);
        let (_, first) = pending.register().unwrap();
        let (_, second) = pending.register().unwrap();

        assert_eq!(pending.resolve(6, "ok"), 2);
        assert_eq!(first.await.unwrap().unwrap(), "ok");
        assert_eq!(second.await.unwrap().unwrap(), "ok");
    }

    #[tokio::test]
    async fn later_registration_waits_for_next_reply() {
        let mut pending = PendingCommands::new();
        pending.set_reply_seq(5);
        let (_, early) = pending.register().unwrap();
        pending.resolve(6, "first");
        let (_, late) = pending.register().unwrap();

        assert_eq!(early.await.unwrap().unwrap(), "first");
        assert_eq!(pending.len(), 1);
        pending.resolve(7, "second");
        assert_eq!(late.await.unwrap().unwrap(), "second");
    }

    #[test]
    fn waiter_stays_pending_until_counter_moves() {
        let mut pending = PendingCommands::new();
        pending.set_reply_seq(3);
        let (_, rx) = pending.register().unwrap();
        let mut rx = tokio_test::task::spawn(rx);

        tokio_test::assert_pending!(rx.poll());
        assert_eq!(pending.resolve(3, "stale"), 0);
        tokio_test::assert_pending!(rx.poll());

        pending.resolve(4, "fresh");
        assert!(rx.is_woken());
        let reply = tokio_test::assert_ready!(rx.poll());
        assert_eq!(reply.unwrap().unwrap(), "fresh");
    }

    #[tokio::test]
    async fn reject_all_fails_every_waiter() {
        let mut pending = PendingCommands::new();
        let (_, rx) = pending.register().unwrap();
        pending.reject_all(|| CoreError::NotConnected);
        assert!(matches!(rx.await.unwrap(), Err(CoreError::NotConnected)));
        assert!(pending.is_empty());
    }

    #[tokio::test]
    async fn waiters_survive_a_restarted_counter() {
        let mut pending = PendingCommands::new();
        pending.set_reply_seq(50);
        let (_, before) = pending.register().unwrap();
        pending.reset_reply_seq();
        pending.set_reply_seq(1);
        let (_, after) = pending.register().unwrap();

        assert_eq!(pending.resolve(2, "ok"), 2);
        assert_eq!(before.await.unwrap().unwrap(), "ok");
        assert_eq!(after.await.unwrap().unwrap(), "ok");
    }

    #[tokio::test]
    async fn closed_queue_refuses_new_waiters() {
        let mut pending = PendingCommands::new();
        let (_, rx) = pending.register().unwrap();
        pending.close(|| CoreError::NotConnected);

        assert!(matches!(rx.await.unwrap(), Err(CoreError::NotConnected)));
        assert!(matches!(pending.register(), Err(CoreError::NotConnected)));

        pending.open();
        assert!(pending.register().is_ok());
    }

    #[test]
    fn removed_waiters_are_not_resolved() {
        let mut pending = PendingCommands::new();
        let (id, _rx) = pending.register().unwrap();
        pending.remove(id);
        assert_eq!(pending.resolve(1, "x"), 0);
    }
}
