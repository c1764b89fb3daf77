//! The session engine — owns one live chat session end to end.
//!
//! Single writer: all session state lives here and mutates only inside
//! `run()`. Frontends talk to it through `SessionCommand` (mpsc in) and
//! `SessionEvent` (broadcast out). Store appends and advisor evaluations
//! run as spawned tasks that report back over a channel, so a slow network
//! call never stalls the countdown.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::StreamExt;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use crate::activity::activity_level;
use crate::advisor::{AdvisorError, TimeoutAdvisor};
use crate::events::SessionEvent;
use crate::handle::derive_handle;
use crate::store::{MessageStore, NewMessage, Snapshot};
use crate::timer::CountdownTimer;
use crate::types::{
    ChatMessage, ParticipantId, Sender, SessionPhase, TimeoutDecisionRequest,
    TimeoutDecisionResult, TimerData,
};

/// Commands a frontend sends into a running session.
#[derive(Debug)]
pub enum SessionCommand {
    SendMessage(String),
    Stop,
}

/// What the per-send pipeline task reports back to the engine loop.
#[derive(Debug)]
enum SendReport {
    AppendFailed(String),
    Evaluated(Result<TimeoutDecisionResult, AdvisorError>),
}

pub struct SessionEngine {
    code: String,
    me: ParticipantId,
    conversation: Vec<ChatMessage>,
    timer: CountdownTimer,
    sending: bool,

    store: Arc<dyn MessageStore>,
    advisor: Arc<dyn TimeoutAdvisor>,

    event_tx: broadcast::Sender<SessionEvent>,
    command_tx: mpsc::Sender<SessionCommand>,
    command_rx: Option<mpsc::Receiver<SessionCommand>>,

    seen_ids: HashSet<String>,
    known_peers: HashSet<ParticipantId>,
}

impl SessionEngine {
    pub fn new(
        code: String,
        me: ParticipantId,
        store: Arc<dyn MessageStore>,
        advisor: Arc<dyn TimeoutAdvisor>,
        timer: CountdownTimer,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(256);
        let (command_tx, command_rx) = mpsc::channel(32);

        Self {
            code,
            me,
            conversation: Vec::new(),
            timer,
            sending: false,
            store,
            advisor,
            event_tx,
            command_tx,
            command_rx: Some(command_rx),
            seen_ids: HashSet::new(),
            known_peers: HashSet::new(),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.event_tx.subscribe()
    }

    pub fn command_sender(&self) -> mpsc::Sender<SessionCommand> {
        self.command_tx.clone()
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn participant_id(&self) -> &ParticipantId {
        &self.me
    }

    fn broadcast(&self, event: SessionEvent) {
        let _ = self.event_tx.send(event);
    }

    fn broadcast_timer(&self) {
        self.broadcast(SessionEvent::Timer(TimerData {
            remaining_secs: self.timer.remaining_secs(),
            timeout_secs: self.timer.timeout_secs(),
        }));
    }

    fn push_message(&mut self, message: ChatMessage) {
        self.seen_ids.insert(message.id.clone());
        self.conversation.push(message.clone());
        self.broadcast(SessionEvent::Message(message));
    }

    fn push_system(&mut self, text: impl Into<String>) {
        self.push_message(ChatMessage::system(text));
    }

    // ── Main loop ──

    pub async fn run(&mut self) {
        info!("session {} starting as {}", self.code, self.me);

        self.push_system(format!(
            "Session started. Code: {}. This chat is ephemeral and will expire after a period of inactivity.",
            self.code
        ));
        self.broadcast_timer();

        let mut command_rx = self.command_rx.take().expect("command_rx already taken");
        let (report_tx, mut report_rx) = mpsc::channel::<SendReport>(8);

        let mut snapshots = match self.store.subscribe(&self.code).await {
            Ok(stream) => stream,
            Err(e) => {
                warn!("store subscribe failed: {}", e);
                self.push_system("Could not connect to the session relay. Messages will not sync.");
                futures::stream::pending().boxed()
            }
        };
        let mut relay_lost = false;

        // First decrement lands a full second after startup.
        let start = tokio::time::Instant::now() + Duration::from_secs(1);
        let mut ticker = tokio::time::interval_at(start, Duration::from_secs(1));
        // A suspended client must not burn its whole budget in a burst.
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if !self.timer.is_expired() {
                        let crossed = self.timer.tick();
                        self.broadcast_timer();
                        if crossed {
                            self.handle_expiry();
                        }
                    }
                }
                Some(cmd) = command_rx.recv() => {
                    match cmd {
                        SessionCommand::SendMessage(text) => self.handle_send(text, &report_tx),
                        SessionCommand::Stop => break,
                    }
                }
                Some(report) = report_rx.recv() => {
                    self.handle_report(report);
                }
                snapshot = snapshots.next() => {
                    match snapshot {
                        Some(snapshot) => self.merge_snapshot(snapshot),
                        None => {
                            if !relay_lost {
                                relay_lost = true;
                                warn!("store subscription ended for {}", self.code);
                                self.push_system(
                                    "Lost connection to the session relay. New messages will not sync.",
                                );
                            }
                            snapshots = futures::stream::pending().boxed();
                        }
                    }
                }
            }
        }

        info!("session {} stopped", self.code);
    }

    // ── Send pipeline ──

    fn handle_send(&mut self, text: String, report_tx: &mpsc::Sender<SendReport>) {
        if self.timer.is_expired() || self.sending || text.trim().is_empty() {
            debug!(
                "send ignored (expired={}, sending={})",
                self.timer.is_expired(),
                self.sending
            );
            return;
        }

        self.sending = true;
        self.broadcast(SessionEvent::Sending(true));

        // Optimistic reset: the send itself is activity, before the advisor
        // has said anything.
        if self.timer.reset(self.timer.timeout_secs()).is_ok() {
            self.broadcast_timer();
        }

        let message = ChatMessage {
            id: uuid::Uuid::new_v4().to_string(),
            sender: Sender::User,
            text: text.clone(),
            timestamp: chrono::Utc::now(),
        };
        let wire = NewMessage {
            id: message.id.clone(),
            author: self.me.clone(),
            text: text.clone(),
        };
        self.push_message(message);

        // Computed after the push, so the just-sent message counts.
        let request = TimeoutDecisionRequest {
            message_content: text,
            user_activity_level: activity_level(&self.conversation, chrono::Utc::now()),
            current_timeout_secs: self.timer.timeout_secs(),
        };

        let store = Arc::clone(&self.store);
        let advisor = Arc::clone(&self.advisor);
        let code = self.code.clone();
        let report_tx = report_tx.clone();
        tokio::spawn(async move {
            if let Err(e) = store.append(&code, wire).await {
                let _ = report_tx.send(SendReport::AppendFailed(e.to_string())).await;
            }
            let result = advisor.evaluate(&request).await;
            let _ = report_tx.send(SendReport::Evaluated(result)).await;
        });
    }

    fn handle_report(&mut self, report: SendReport) {
        match report {
            SendReport::AppendFailed(err) => {
                warn!("store append failed: {}", err);
                self.push_system("Message could not be delivered to the relay.");
            }
            SendReport::Evaluated(result) => {
                self.finish_evaluation(result);
                self.sending = false;
                self.broadcast(SessionEvent::Sending(false));
            }
        }
    }

    fn finish_evaluation(&mut self, result: Result<TimeoutDecisionResult, AdvisorError>) {
        match result {
            Ok(decision) => match self.timer.reset(decision.new_timeout_secs) {
                Ok(()) => {
                    self.broadcast_timer();
                    self.broadcast(SessionEvent::TimeoutAdjusted(decision.clone()));
                    self.push_system(format!("AI Advisor: {}", decision.reason));
                }
                Err(_) => {
                    debug!(
                        "late advisor result discarded ({}s)",
                        decision.new_timeout_secs
                    );
                }
            },
            Err(e) => {
                warn!("advisor evaluation failed: {}", e);
                if !self.timer.is_expired() {
                    self.push_system(
                        "Could not reach AI advisor. Session timeout remains unchanged.",
                    );
                }
            }
        }
    }

    // ── Expiry and snapshots ──

    fn handle_expiry(&mut self) {
        info!("session {} expired", self.code);
        self.push_system("Session expired due to inactivity.");
        self.broadcast(SessionEvent::Phase(SessionPhase::Expired));
    }

    /// Fold a store snapshot into the conversation. Own messages come back
    /// with ids we minted and get skipped; everything else new is the peer's.
    /// The first message from an unseen author announces them by handle.
    fn merge_snapshot(&mut self, snapshot: Snapshot) {
        for wire in snapshot {
            if self.seen_ids.contains(&wire.id) {
                continue;
            }
            let sender = if wire.author == self.me {
                Sender::User
            } else {
                Sender::Peer
            };
            if sender == Sender::Peer && self.known_peers.insert(wire.author.clone()) {
                self.push_system(format!("{} joined the session.", derive_handle(&wire.author)));
            }
            self.push_message(ChatMessage {
                id: wire.id,
                sender,
                text: wire.text,
                timestamp: wire.timestamp,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, StoreError};
    use async_trait::async_trait;
    use futures::stream::BoxStream;

    struct TestAdvisor {
        delay: Duration,
        response: Result<TimeoutDecisionResult, String>,
        requests: std::sync::Mutex<Vec<TimeoutDecisionRequest>>,
    }

    impl TestAdvisor {
        fn ok(new_timeout_secs: u32, reason: &str) -> Arc<Self> {
            Arc::new(Self {
                delay: Duration::ZERO,
                response: Ok(TimeoutDecisionResult {
                    new_timeout_secs,
                    reason: reason.to_string(),
                }),
                requests: std::sync::Mutex::new(Vec::new()),
            })
        }

        fn ok_after(delay: Duration, new_timeout_secs: u32) -> Arc<Self> {
            Arc::new(Self {
                delay,
                response: Ok(TimeoutDecisionResult {
                    new_timeout_secs,
                    reason: "Adjusted.".to_string(),
                }),
                requests: std::sync::Mutex::new(Vec::new()),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                delay: Duration::ZERO,
                response: Err("connection refused".to_string()),
                requests: std::sync::Mutex::new(Vec::new()),
            })
        }

        fn requests(&self) -> Vec<TimeoutDecisionRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl TimeoutAdvisor for TestAdvisor {
        async fn evaluate(
            &self,
            req: &TimeoutDecisionRequest,
        ) -> Result<TimeoutDecisionResult, AdvisorError> {
            self.requests.lock().unwrap().push(req.clone());
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.response.clone().map_err(AdvisorError::Transport)
        }
    }

    struct DeadStore;

    #[async_trait]
    impl MessageStore for DeadStore {
        async fn append(&self, _code: &str, _msg: NewMessage) -> Result<String, StoreError> {
            Err(StoreError::Transport("relay unreachable".into()))
        }

        async fn subscribe(
            &self,
            _code: &str,
        ) -> Result<BoxStream<'static, Snapshot>, StoreError> {
            Err(StoreError::Transport("relay unreachable".into()))
        }
    }

    struct Harness {
        events: broadcast::Receiver<SessionEvent>,
        commands: mpsc::Sender<SessionCommand>,
        store: Arc<MemoryStore>,
        me: ParticipantId,
    }

    fn start(initial_timeout: u32, advisor: Arc<dyn TimeoutAdvisor>) -> Harness {
        let store = Arc::new(MemoryStore::new());
        start_with_store(initial_timeout, advisor, store.clone(), store)
    }

    fn start_with_store(
        initial_timeout: u32,
        advisor: Arc<dyn TimeoutAdvisor>,
        store: Arc<dyn MessageStore>,
        memory: Arc<MemoryStore>,
    ) -> Harness {
        let me = ParticipantId::mint();
        let mut engine = SessionEngine::new(
            "TEST42".to_string(),
            me.clone(),
            store,
            advisor,
            CountdownTimer::new(initial_timeout),
        );
        let events = engine.subscribe();
        let commands = engine.command_sender();
        tokio::spawn(async move { engine.run().await });
        Harness {
            events,
            commands,
            store: memory,
            me,
        }
    }

    async fn send(h: &Harness, text: &str) {
        h.commands
            .send(SessionCommand::SendMessage(text.to_string()))
            .await
            .unwrap();
    }

    /// Collect events until one matches, returning everything seen
    /// (match included). Panics if nothing matches within virtual time.
    async fn collect_until<F>(
        rx: &mut broadcast::Receiver<SessionEvent>,
        mut pred: F,
    ) -> Vec<SessionEvent>
    where
        F: FnMut(&SessionEvent) -> bool,
    {
        tokio::time::timeout(Duration::from_secs(60), async {
            let mut seen = Vec::new();
            loop {
                let event = rx.recv().await.expect("event channel closed");
                let done = pred(&event);
                seen.push(event);
                if done {
                    return seen;
                }
            }
        })
        .await
        .expect("timed out waiting for event")
    }

    fn system_text(event: &SessionEvent) -> Option<&str> {
        match event {
            SessionEvent::Message(m) if m.sender == Sender::System => Some(m.text.as_str()),
            _ => None,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_startup_seeds_session_notice() {
        let mut h = start(300, TestAdvisor::ok(300, "fine"));
        let seen = collect_until(&mut h.events, |e| {
            system_text(e).is_some_and(|t| t.starts_with("Session started. Code: TEST42."))
        })
        .await;
        assert!(!seen.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_pipeline_full_sequence() {
        let advisor = TestAdvisor::ok(240, "Moderate activity.");
        let mut h = start(300, advisor.clone());

        send(&h, "hello there").await;

        collect_until(&mut h.events, |e| matches!(e, SessionEvent::Sending(true))).await;
        collect_until(&mut h.events, |e| {
            matches!(e, SessionEvent::Message(m) if m.sender == Sender::User && m.text == "hello there")
        })
        .await;
        let seen = collect_until(&mut h.events, |e| {
            matches!(e, SessionEvent::TimeoutAdjusted(d) if d.new_timeout_secs == 240)
        })
        .await;
        // Corrective reset lands before the adjustment event.
        assert!(seen.iter().any(
            |e| matches!(e, SessionEvent::Timer(t) if t.timeout_secs == 240 && t.remaining_secs == 240)
        ));
        collect_until(&mut h.events, |e| {
            system_text(e) == Some("AI Advisor: Moderate activity.")
        })
        .await;
        collect_until(&mut h.events, |e| matches!(e, SessionEvent::Sending(false))).await;

        let requests = advisor.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].message_content, "hello there");
        assert_eq!(requests[0].user_activity_level, 1);
        assert_eq!(requests[0].current_timeout_secs, 300);

        let snap = h.store.snapshot("TEST42").await;
        assert_eq!(snap.len(), 1);
        assert_eq!(snap[0].text, "hello there");
        assert_eq!(snap[0].author, h.me);
    }

    #[tokio::test(start_paused = true)]
    async fn test_advisor_failure_leaves_timeout_unchanged() {
        let mut h = start(300, TestAdvisor::failing());

        send(&h, "hi").await;

        let seen = collect_until(&mut h.events, |e| {
            system_text(e) == Some("Could not reach AI advisor. Session timeout remains unchanged.")
        })
        .await;
        assert!(!seen
            .iter()
            .any(|e| matches!(e, SessionEvent::TimeoutAdjusted(_))));

        collect_until(&mut h.events, |e| matches!(e, SessionEvent::Sending(false))).await;

        // Countdown still runs on the original budget.
        let seen = collect_until(&mut h.events, |e| matches!(e, SessionEvent::Timer(_))).await;
        let timer = seen.iter().rev().find_map(|e| match e {
            SessionEvent::Timer(t) => Some(*t),
            _ => None,
        });
        assert_eq!(timer.unwrap().timeout_secs, 300);
    }

    #[tokio::test(start_paused = true)]
    async fn test_activity_level_counts_trailing_sends() {
        let advisor = TestAdvisor::ok(300, "steady");
        let mut h = start(300, advisor.clone());

        for text in ["one", "two", "three"] {
            send(&h, text).await;
            collect_until(&mut h.events, |e| matches!(e, SessionEvent::Sending(false))).await;
        }

        let levels: Vec<u32> = advisor
            .requests()
            .iter()
            .map(|r| r.user_activity_level)
            .collect();
        assert_eq!(levels, [1, 2, 3]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expiry_terminal_sequence() {
        let mut h = start(2, TestAdvisor::ok(300, "unused"));

        let seen = collect_until(&mut h.events, |e| {
            matches!(e, SessionEvent::Phase(SessionPhase::Expired))
        })
        .await;
        let notices = seen
            .iter()
            .filter(|e| system_text(e) == Some("Session expired due to inactivity."))
            .count();
        assert_eq!(notices, 1);

        // Ticking stops: nothing more arrives.
        let quiet =
            tokio::time::timeout(Duration::from_secs(5), h.events.recv()).await;
        assert!(quiet.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_advisor_result_discarded() {
        let advisor = TestAdvisor::ok_after(Duration::from_secs(10), 600);
        let mut h = start(3, advisor);

        send(&h, "last words").await;
        collect_until(&mut h.events, |e| {
            matches!(e, SessionEvent::Phase(SessionPhase::Expired))
        })
        .await;

        // The evaluation finishes well after expiry; its result must vanish.
        let seen =
            collect_until(&mut h.events, |e| matches!(e, SessionEvent::Sending(false))).await;
        assert!(!seen
            .iter()
            .any(|e| matches!(e, SessionEvent::TimeoutAdjusted(_))));
        assert!(!seen.iter().any(|e| matches!(e, SessionEvent::Timer(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_peer_message_merges_without_reset() {
        let mut h = start(300, TestAdvisor::ok(300, "unused"));

        h.store
            .append(
                "TEST42",
                NewMessage {
                    id: "peer-msg-1".to_string(),
                    author: ParticipantId::from("someone-else"),
                    text: "hi from the other side".to_string(),
                },
            )
            .await
            .unwrap();

        collect_until(&mut h.events, |e| {
            matches!(e, SessionEvent::Message(m) if m.sender == Sender::Peer && m.text == "hi from the other side")
        })
        .await;

        // No send pipeline ran and the countdown never jumped back up.
        let seen = collect_until(&mut h.events, |e| {
            matches!(e, SessionEvent::Timer(t) if t.remaining_secs <= 298)
        })
        .await;
        assert!(!seen.iter().any(|e| matches!(e, SessionEvent::Sending(_))));
        let readings: Vec<u32> = seen
            .iter()
            .filter_map(|e| match e {
                SessionEvent::Timer(t) => Some(t.remaining_secs),
                _ => None,
            })
            .collect();
        assert!(readings.windows(2).all(|w| w[1] < w[0]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_peer_message_announces_handle() {
        let mut h = start(300, TestAdvisor::ok(300, "unused"));
        let peer = ParticipantId::from("peer-1");

        for (id, text) in [("p1", "first"), ("p2", "second")] {
            h.store
                .append(
                    "TEST42",
                    NewMessage {
                        id: id.to_string(),
                        author: peer.clone(),
                        text: text.to_string(),
                    },
                )
                .await
                .unwrap();
        }

        let expected = format!("{} joined the session.", derive_handle(&peer));
        let seen = collect_until(&mut h.events, |e| {
            matches!(e, SessionEvent::Message(m) if m.sender == Sender::Peer && m.text == "second")
        })
        .await;
        let notices = seen
            .iter()
            .filter(|e| system_text(e) == Some(expected.as_str()))
            .count();
        assert_eq!(notices, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_rejected_after_expiry() {
        let advisor = TestAdvisor::ok(300, "unused");
        let mut h = start(1, advisor.clone());

        collect_until(&mut h.events, |e| {
            matches!(e, SessionEvent::Phase(SessionPhase::Expired))
        })
        .await;

        send(&h, "too late").await;
        let quiet = tokio::time::timeout(Duration::from_secs(5), h.events.recv()).await;
        assert!(quiet.is_err());
        assert!(advisor.requests().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_whitespace_send_ignored() {
        let advisor = TestAdvisor::ok(300, "unused");
        let mut h = start(300, advisor.clone());

        send(&h, "   ").await;
        let seen = collect_until(&mut h.events, |e| matches!(e, SessionEvent::Timer(_))).await;
        assert!(!seen.iter().any(|e| matches!(e, SessionEvent::Sending(_))));
        assert!(advisor.requests().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_send_ignored_while_in_flight() {
        let advisor = TestAdvisor::ok_after(Duration::from_secs(5), 300);
        let mut h = start(300, advisor.clone());

        send(&h, "first").await;
        collect_until(&mut h.events, |e| matches!(e, SessionEvent::Sending(true))).await;
        send(&h, "second").await;

        let seen =
            collect_until(&mut h.events, |e| matches!(e, SessionEvent::Sending(false))).await;
        let user_messages = seen
            .iter()
            .filter(|e| matches!(e, SessionEvent::Message(m) if m.sender == Sender::User))
            .count();
        assert_eq!(user_messages, 1);
        assert_eq!(advisor.requests().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dead_store_degrades_to_notices() {
        let advisor = TestAdvisor::ok(240, "still deciding");
        let memory = Arc::new(MemoryStore::new());
        let mut h = start_with_store(300, advisor, Arc::new(DeadStore), memory);

        collect_until(&mut h.events, |e| {
            system_text(e) == Some("Could not connect to the session relay. Messages will not sync.")
        })
        .await;

        send(&h, "hello?").await;
        collect_until(&mut h.events, |e| {
            system_text(e) == Some("Message could not be delivered to the relay.")
        })
        .await;

        // The advisor still runs; the session stays alive.
        collect_until(&mut h.events, |e| {
            system_text(e) == Some("AI Advisor: still deciding")
        })
        .await;
        collect_until(&mut h.events, |e| matches!(e, SessionEvent::Sending(false))).await;
    }
}
