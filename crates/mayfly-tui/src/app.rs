//! App state, input handling, session wiring.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::info;

use mayfly_core::advisor::advisor_from_config;
use mayfly_core::code;
use mayfly_core::config::Config;
use mayfly_core::events::SessionEvent;
use mayfly_core::handle::derive_handle;
use mayfly_core::session::{SessionCommand, SessionEngine};
use mayfly_core::store::{MemoryStore, MessageStore, NewMessage, RelayStore};
use mayfly_core::timer::CountdownTimer;
use mayfly_core::types::{ChatMessage, ParticipantId, SessionPhase};

/// Which screen the client is on.
pub enum Screen {
    Home { error: Option<String> },
    Chat(SessionView),
}

/// Live view of one chat session, fed by `SessionEvent`s.
pub struct SessionView {
    pub code: String,
    pub my_handle: String,
    pub messages: Vec<ChatMessage>,
    pub remaining_secs: u32,
    pub timeout_secs: u32,
    pub sending: bool,
    pub phase: SessionPhase,
    pub scroll_offset: usize,
    commands: mpsc::Sender<SessionCommand>,
    events: broadcast::Receiver<SessionEvent>,
    echo_task: Option<JoinHandle<()>>,
}

impl SessionView {
    fn handle_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Message(message) => {
                self.messages.push(message);
                // Auto-scroll to bottom
                self.scroll_offset = 0;
            }
            SessionEvent::Timer(t) => {
                self.remaining_secs = t.remaining_secs;
                self.timeout_secs = t.timeout_secs;
            }
            // The advisor's reason already arrives as a system message.
            SessionEvent::TimeoutAdjusted(_) => {}
            SessionEvent::Phase(phase) => self.phase = phase,
            SessionEvent::Sending(sending) => self.sending = sending,
        }
    }

    fn composable(&self) -> bool {
        self.phase == SessionPhase::Active && !self.sending
    }
}

/// The main application state.
pub struct App {
    pub config: Config,
    pub screen: Screen,
    pub input: String,
    pub should_quit: bool,
}

impl App {
    pub fn new(config: Config) -> Self {
        App {
            config,
            screen: Screen::Home { error: None },
            input: String::new(),
            should_quit: false,
        }
    }

    /// Pull every queued session event into the view. Called once per frame.
    pub fn drain_events(&mut self) {
        if let Screen::Chat(view) = &mut self.screen {
            loop {
                match view.events.try_recv() {
                    Ok(event) => view.handle_event(event),
                    Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                    Err(_) => break,
                }
            }
        }
    }

    /// Enter: join from the home screen, send from the chat screen.
    pub async fn submit(&mut self) {
        match &mut self.screen {
            Screen::Home { error } => match code::parse(&self.input) {
                Ok(code) => self.enter_session(code),
                Err(e) => *error = Some(e.to_string()),
            },
            Screen::Chat(view) => {
                if view.composable() && !self.input.trim().is_empty() {
                    let text = std::mem::take(&mut self.input);
                    let _ = view.commands.send(SessionCommand::SendMessage(text)).await;
                }
            }
        }
    }

    /// Mint a fresh code and jump straight into its session.
    pub fn create_session(&mut self) {
        if matches!(self.screen, Screen::Home { .. }) {
            self.enter_session(code::mint());
        }
    }

    /// Wire up a session: store (relay or loopback), advisor, engine.
    fn enter_session(&mut self, code: String) {
        let me = ParticipantId::mint();

        let mut echo_task = None;
        let store: Arc<dyn MessageStore> = match self.config.relay_url.as_deref() {
            Some(url) => Arc::new(RelayStore::new(url)),
            None => {
                // No relay: an in-process room with a simulated peer, so the
                // client is usable standalone.
                let memory = Arc::new(MemoryStore::new());
                echo_task = Some(spawn_echo_peer(Arc::clone(&memory), code.clone()));
                memory
            }
        };
        let advisor = advisor_from_config(&self.config);

        let mut engine = SessionEngine::new(
            code,
            me,
            store,
            advisor,
            CountdownTimer::new(self.config.initial_timeout_secs),
        );
        let events = engine.subscribe();
        let commands = engine.command_sender();
        let my_handle = derive_handle(engine.participant_id());
        let code = engine.code().to_string();
        tokio::spawn(async move { engine.run().await });

        info!("entered session {}", code);

        let initial = self.config.initial_timeout_secs;
        self.screen = Screen::Chat(SessionView {
            code,
            my_handle,
            messages: Vec::new(),
            remaining_secs: initial,
            timeout_secs: initial,
            sending: false,
            phase: SessionPhase::Active,
            scroll_offset: 0,
            commands,
            events,
            echo_task,
        });
        self.input.clear();
    }

    /// Stop the engine and drop back to the home screen.
    pub async fn leave_session(&mut self) {
        if matches!(self.screen, Screen::Chat(_)) {
            let previous = std::mem::replace(&mut self.screen, Screen::Home { error: None });
            if let Screen::Chat(view) = previous {
                info!("leaving session {}", view.code);
                let _ = view.commands.send(SessionCommand::Stop).await;
                if let Some(echo) = view.echo_task {
                    echo.abort();
                }
            }
            self.input.clear();
        }
    }

    pub async fn on_escape(&mut self) {
        match self.screen {
            Screen::Chat(_) => self.leave_session().await,
            Screen::Home { .. } => self.should_quit = true,
        }
    }

    pub async fn shutdown(&mut self) {
        self.leave_session().await;
    }

    pub fn push_char(&mut self, c: char) {
        match &self.screen {
            Screen::Home { .. } => self.input.push(c),
            // The composer is locked while sending and once expired.
            Screen::Chat(view) if view.composable() => self.input.push(c),
            Screen::Chat(_) => {}
        }
    }

    pub fn pop_char(&mut self) {
        match &self.screen {
            Screen::Home { .. } => {
                self.input.pop();
            }
            Screen::Chat(view) if view.composable() => {
                self.input.pop();
            }
            Screen::Chat(_) => {}
        }
    }

    pub fn scroll_up(&mut self) {
        if let Screen::Chat(view) = &mut self.screen {
            view.scroll_offset = view.scroll_offset.saturating_add(3);
        }
    }

    pub fn scroll_down(&mut self) {
        if let Screen::Chat(view) = &mut self.screen {
            view.scroll_offset = view.scroll_offset.saturating_sub(3);
        }
    }
}

/// Loopback peer: acknowledges every message in the room about a second
/// after it lands, the way a second party would.
fn spawn_echo_peer(store: Arc<MemoryStore>, code: String) -> JoinHandle<()> {
    tokio::spawn(async move {
        let peer = ParticipantId::mint();
        let mut seen: HashSet<String> = HashSet::new();

        let mut snapshots = match store.subscribe(&code).await {
            Ok(stream) => stream,
            Err(_) => return,
        };

        while let Some(snapshot) = snapshots.next().await {
            let mut pending = 0;
            for msg in snapshot {
                if seen.insert(msg.id.clone()) && msg.author != peer {
                    pending += 1;
                }
            }
            for _ in 0..pending {
                tokio::time::sleep(Duration::from_secs(1)).await;
                let reply = NewMessage {
                    id: uuid::Uuid::new_v4().to_string(),
                    author: peer.clone(),
                    text: "Message received.".to_string(),
                };
                if store.append(&code, reply).await.is_err() {
                    return;
                }
            }
        }
    })
}
