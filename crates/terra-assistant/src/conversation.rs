//! Conversation state and the single-flight submit discipline.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, warn};

use terra_protocol::{Turn, assistant_content};

use crate::relay::RelayTransport;

/// System prompt injected ahead of every upstream call. Never stored in the
/// visible transcript.
pub const SYSTEM_PROMPT: &str = "You are a travel assistant.";

/// Assistant reply rendered when the relay call itself fails.
pub const RELAY_FAILURE_REPLY: &str = "Error fetching response.";

/// Assistant reply rendered when the relay succeeds but the upstream body
/// carries no `choices[0].message.content`.
pub const UNSURE_REPLY: &str = "I'm not sure, please try again!";

/// How much of the transcript is replayed upstream on each submit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContextMode {
    /// System turn plus the entire visible transcript. Default; gives the
    /// model coherent multi-turn context.
    #[default]
    FullHistory,
    /// System turn plus only the latest user turn. Prior turns stay
    /// display-only and the model answers each question cold.
    LatestOnly,
}

/// Owns the ordered transcript and issues at most one relay call at a time.
///
/// The transcript grows monotonically: turns are never edited or removed.
/// Submissions while a call is in flight are dropped silently, not queued.
/// The store holds no session identity and nothing is persisted; dropping
/// the store is the only reset.
pub struct ConversationStore {
    relay: Arc<dyn RelayTransport>,
    turns: Mutex<Vec<Turn>>,
    busy: AtomicBool,
    system_prompt: String,
    context_mode: ContextMode,
}

/// Clears the busy flag when dropped, so every exit path out of `submit`
/// (reply, fallback, panic) releases the single-flight slot.
struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl ConversationStore {
    pub fn new(relay: Arc<dyn RelayTransport>) -> Self {
        Self {
            relay,
            turns: Mutex::new(Vec::new()),
            busy: AtomicBool::new(false),
            system_prompt: SYSTEM_PROMPT.to_string(),
            context_mode: ContextMode::default(),
        }
    }

    pub fn with_context_mode(mut self, mode: ContextMode) -> Self {
        self.context_mode = mode;
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    /// Whether a relay call is currently in flight.
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Snapshot of the visible transcript, oldest turn first.
    pub fn transcript(&self) -> Vec<Turn> {
        self.turns.lock().expect("transcript lock poisoned").clone()
    }

    /// Submit one user turn.
    ///
    /// Empty or whitespace-only input is ignored, as is any submit that
    /// arrives while a call is in flight. Otherwise the user turn is
    /// appended before the relay call starts, and exactly one assistant
    /// turn is appended after it resolves, on both the success and the
    /// failure path.
    pub async fn submit(&self, text: &str) {
        let text = text.trim();
        if text.is_empty() {
            debug!("ignoring empty submission");
            return;
        }

        // Single-flight: first caller flips the flag, everyone else drops.
        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("dropping submission, relay call already in flight");
            return;
        }
        let _guard = BusyGuard(&self.busy);

        let outbound = {
            let mut turns = self.turns.lock().expect("transcript lock poisoned");
            turns.push(Turn::user(text));
            self.outbound_messages(&turns)
        };

        let reply = match self.relay.send(&outbound).await {
            Ok(body) => assistant_content(&body)
                .unwrap_or(UNSURE_REPLY)
                .to_string(),
            Err(err) => {
                warn!(error = %err, "relay call failed");
                RELAY_FAILURE_REPLY.to_string()
            }
        };

        self.turns
            .lock()
            .expect("transcript lock poisoned")
            .push(Turn::assistant(reply));
    }

    /// Build the upstream message sequence for the current submit. The
    /// system turn always leads; `turns` already ends with the new user
    /// turn.
    fn outbound_messages(&self, turns: &[Turn]) -> Vec<Turn> {
        let mut messages = Vec::with_capacity(turns.len() + 1);
        messages.push(Turn::system(self.system_prompt.clone()));
        match self.context_mode {
            ContextMode::FullHistory => messages.extend_from_slice(turns),
            ContextMode::LatestOnly => {
                if let Some(latest) = turns.last() {
                    messages.push(latest.clone());
                }
            }
        }
        messages
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::AtomicUsize;

    use async_trait::async_trait;
    use serde_json::{Value, json};
    use tokio::sync::Notify;

    use terra_protocol::Role;

    use crate::relay::RelayError;

    /// Scripted relay that records every outbound payload.
    struct MockRelay {
        response: Result<Value, ()>,
        calls: AtomicUsize,
        sent: Mutex<Vec<Vec<Turn>>>,
        /// When set, `send` parks until notified so tests can observe the
        /// in-flight state.
        hold: Option<Arc<Notify>>,
    }

    impl MockRelay {
        fn replying(body: Value) -> Arc<Self> {
            Arc::new(Self {
                response: Ok(body),
                calls: AtomicUsize::new(0),
                sent: Mutex::new(Vec::new()),
                hold: None,
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                response: Err(()),
                calls: AtomicUsize::new(0),
                sent: Mutex::new(Vec::new()),
                hold: None,
            })
        }

        fn held(body: Value, hold: Arc<Notify>) -> Arc<Self> {
            Arc::new(Self {
                response: Ok(body),
                calls: AtomicUsize::new(0),
                sent: Mutex::new(Vec::new()),
                hold: Some(hold),
            })
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl RelayTransport for MockRelay {
        async fn send(&self, messages: &[Turn]) -> Result<Value, RelayError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.sent.lock().unwrap().push(messages.to_vec());
            if let Some(hold) = &self.hold {
                hold.notified().await;
            }
            self.response
                .clone()
                .map_err(|_| RelayError::Status(500))
        }
    }

    fn reply_body(content: &str) -> Value {
        json!({"choices": [{"message": {"role": "assistant", "content": content}}]})
    }

    #[tokio::test]
    async fn test_submit_appends_user_then_assistant_turn() {
        let relay = MockRelay::replying(reply_body("Paris is the capital"));
        let store = ConversationStore::new(relay.clone());

        store.submit("What is the capital of France?").await;

        let transcript = store.transcript();
        assert_eq!(transcript.len(), 2);
        assert_eq!(transcript[0].role, Role::User);
        assert_eq!(transcript[0].content, "What is the capital of France?");
        assert_eq!(transcript[1].role, Role::Assistant);
        assert_eq!(transcript[1].content, "Paris is the capital");
        assert!(!store.is_busy());
    }

    #[tokio::test]
    async fn test_user_turn_recorded_before_relay_resolves() {
        let relay = MockRelay::replying(reply_body("ok"));
        let store = ConversationStore::new(relay.clone());

        store.submit("hello").await;

        // The payload captured at send time already contains the user turn.
        let sent = relay.sent.lock().unwrap();
        let first = &sent[0];
        assert_eq!(first.last().unwrap().content, "hello");
        assert_eq!(first.last().unwrap().role, Role::User);
    }

    #[tokio::test]
    async fn test_empty_and_whitespace_input_ignored() {
        let relay = MockRelay::replying(reply_body("unused"));
        let store = ConversationStore::new(relay.clone());

        store.submit("").await;
        store.submit("   \n\t").await;

        assert!(store.transcript().is_empty());
        assert_eq!(relay.call_count(), 0);
    }

    #[tokio::test]
    async fn test_busy_submissions_are_dropped() {
        let gate = Arc::new(Notify::new());
        let relay = MockRelay::held(reply_body("done"), gate.clone());
        let store = Arc::new(ConversationStore::new(relay.clone()));

        let first = {
            let store = store.clone();
            tokio::spawn(async move { store.submit("first").await })
        };

        // Wait until the first call is parked inside the relay.
        while relay.call_count() == 0 {
            tokio::task::yield_now().await;
        }
        assert!(store.is_busy());

        store.submit("second").await;
        assert_eq!(relay.call_count(), 1);
        assert_eq!(store.transcript().len(), 1);

        gate.notify_one();
        first.await.unwrap();

        let transcript = store.transcript();
        assert_eq!(transcript.len(), 2);
        assert_eq!(transcript[0].content, "first");
        assert!(!store.is_busy());
    }

    #[tokio::test]
    async fn test_missing_choices_falls_back_to_unsure_reply() {
        let relay = MockRelay::replying(json!({"detail": "quota exceeded"}));
        let store = ConversationStore::new(relay);

        store.submit("hello").await;

        let transcript = store.transcript();
        assert_eq!(transcript[1].content, UNSURE_REPLY);
    }

    #[tokio::test]
    async fn test_relay_failure_appends_fixed_error_reply() {
        let relay = MockRelay::failing();
        let store = ConversationStore::new(relay.clone());

        store.submit("hello").await;

        let transcript = store.transcript();
        assert_eq!(transcript.len(), 2);
        assert_eq!(transcript[1].role, Role::Assistant);
        assert_eq!(transcript[1].content, RELAY_FAILURE_REPLY);
        assert!(!store.is_busy());
    }

    #[tokio::test]
    async fn test_resubmitting_same_text_is_not_deduplicated() {
        let relay = MockRelay::replying(reply_body("again"));
        let store = ConversationStore::new(relay.clone());

        store.submit("same question").await;
        store.submit("same question").await;

        assert_eq!(store.transcript().len(), 4);
        assert_eq!(relay.call_count(), 2);
    }

    #[tokio::test]
    async fn test_system_turn_sent_upstream_but_not_displayed() {
        let relay = MockRelay::replying(reply_body("ok"));
        let store = ConversationStore::new(relay.clone());

        store.submit("hello").await;

        let sent = relay.sent.lock().unwrap();
        assert_eq!(sent[0][0].role, Role::System);
        assert_eq!(sent[0][0].content, SYSTEM_PROMPT);
        assert!(
            store
                .transcript()
                .iter()
                .all(|turn| turn.role != Role::System)
        );
    }

    #[tokio::test]
    async fn test_full_history_mode_replays_prior_turns() {
        let relay = MockRelay::replying(reply_body("ok"));
        let store = ConversationStore::new(relay.clone());

        store.submit("first").await;
        store.submit("second").await;

        let sent = relay.sent.lock().unwrap();
        // system + user/assistant pair + new user turn
        assert_eq!(sent[1].len(), 4);
        assert_eq!(sent[1][1].content, "first");
        assert_eq!(sent[1][3].content, "second");
    }

    #[tokio::test]
    async fn test_latest_only_mode_sends_single_user_turn() {
        let relay = MockRelay::replying(reply_body("ok"));
        let store =
            ConversationStore::new(relay.clone()).with_context_mode(ContextMode::LatestOnly);

        store.submit("first").await;
        store.submit("second").await;

        let sent = relay.sent.lock().unwrap();
        assert_eq!(sent[1].len(), 2);
        assert_eq!(sent[1][0].role, Role::System);
        assert_eq!(sent[1][1].content, "second");
    }
}
