//! The inbox command loop.
//!
//! Commands from the view layer and completions of spawned network calls are
//! handled one at a time on a single task. Fetches run concurrently and may
//! finish out of order; the session's refresh tickets decide which ones land.

use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use tokio::sync::mpsc;

use crate::api::MessageGateway;
use crate::api::events::InboxEvent;
use crate::api::models::MessageRecord;
use crate::error::Result;
use crate::locale::Locale;
use crate::scheduler::{ScheduleHandle, Scheduler};
use crate::session::{ApplyOutcome, RefreshTicket, SessionState};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Refresh,
    Select { key: String },
    /// `key: None` sends to the active conversation.
    Send { key: Option<String>, body: String },
    Shutdown,
}

enum Completion {
    Fetched {
        ticket: RefreshTicket,
        result: Result<Vec<MessageRecord>>,
    },
    Sent {
        key: String,
        body: String,
        result: Result<()>,
    },
}

/// Cheap, cloneable way to talk to a running [`Inbox`].
#[derive(Debug, Clone)]
pub struct InboxHandle {
    commands: mpsc::UnboundedSender<Command>,
}

impl InboxHandle {
    pub fn send_command(&self, command: Command) -> bool {
        self.commands.send(command).is_ok()
    }

    pub fn refresh(&self) -> bool {
        self.send_command(Command::Refresh)
    }

    pub fn select(&self, key: impl Into<String>) -> bool {
        self.send_command(Command::Select { key: key.into() })
    }

    pub fn send(&self, key: Option<String>, body: impl Into<String>) -> bool {
        self.send_command(Command::Send {
            key,
            body: body.into(),
        })
    }

    pub fn shutdown(&self) -> bool {
        self.send_command(Command::Shutdown)
    }

    /// Queue a refresh every `interval` until the returned handle is dropped.
    pub fn poll_with<S: Scheduler>(&self, scheduler: &S, interval: Duration) -> ScheduleHandle {
        let commands = self.commands.clone();
        scheduler.schedule_repeating(
            interval,
            Box::new(move || {
                if commands.send(Command::Refresh).is_err() {
                    log::debug!("inbox is gone, skipping scheduled refresh");
                }
            }),
        )
    }
}

pub struct Inbox<G: MessageGateway + 'static> {
    gateway: Arc<G>,
    session: SessionState,
    commands: mpsc::UnboundedReceiver<Command>,
    completions_tx: mpsc::UnboundedSender<Completion>,
    completions: mpsc::UnboundedReceiver<Completion>,
    events: mpsc::UnboundedSender<InboxEvent>,
}

impl<G: MessageGateway + 'static> Inbox<G> {
    pub fn new(
        gateway: Arc<G>,
        locale: &'static Locale,
    ) -> (Self, InboxHandle, mpsc::UnboundedReceiver<InboxEvent>) {
        let (commands_tx, commands) = mpsc::unbounded_channel();
        let (completions_tx, completions) = mpsc::unbounded_channel();
        let (events, events_rx) = mpsc::unbounded_channel();
        let inbox = Self {
            gateway,
            session: SessionState::new(locale),
            commands,
            completions_tx,
            completions,
            events,
        };
        (inbox, InboxHandle { commands: commands_tx }, events_rx)
    }

    pub fn session(&self) -> &SessionState {
        &self.session
    }

    pub async fn run(mut self) {
        while self.step().await {}
        log::info!("inbox stopped");
    }

    /// Handle exactly one command or completion. Returns `false` once the
    /// inbox has been shut down.
    pub async fn step(&mut self) -> bool {
        tokio::select! {
            biased;
            Some(done) = self.completions.recv() => {
                self.on_completion(done);
                true
            }
            command = self.commands.recv() => match command {
                Some(Command::Shutdown) | None => false,
                Some(command) => {
                    self.handle(command);
                    true
                }
            },
        }
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Refresh => self.start_refresh(),
            Command::Select { key } => self.on_select(&key),
            Command::Send { key, body } => self.on_send(key.as_deref(), &body),
            Command::Shutdown => {}
        }
    }

    fn start_refresh(&mut self) {
        let ticket = self.session.begin_refresh();
        let gateway = self.gateway.clone();
        let done = self.completions_tx.clone();
        tokio::spawn(async move {
            let result = gateway.fetch_messages().await;
            let _ = done.send(Completion::Fetched { ticket, result });
        });
    }

    fn on_select(&mut self, key: &str) {
        if let Err(e) = self.session.select(key) {
            log::warn!("cannot select conversation: {e}");
            return;
        }
        self.emit_conversations();
        self.emit_thread();
        self.start_refresh();
    }

    fn on_send(&mut self, key: Option<&str>, body: &str) {
        let (key, body) = match self.session.validate_send(key, body) {
            Ok(target) => target,
            Err(e) => {
                log::info!("send refused: {e}");
                self.emit(InboxEvent::SendFailed {
                    key: key.map(str::to_string),
                    reason: e.to_string(),
                });
                return;
            }
        };
        let gateway = self.gateway.clone();
        let done = self.completions_tx.clone();
        tokio::spawn(async move {
            let result = gateway.send_message(&key, &body).await;
            let _ = done.send(Completion::Sent { key, body, result });
        });
    }

    fn on_completion(&mut self, completion: Completion) {
        match completion {
            Completion::Fetched { ticket, result } => self.on_fetched(ticket, result),
            Completion::Sent { key, body, result } => self.on_sent(key, body, result),
        }
    }

    fn on_fetched(&mut self, ticket: RefreshTicket, result: Result<Vec<MessageRecord>>) {
        let records = match result {
            Ok(records) => records,
            Err(e) => {
                log::warn!("refresh failed, keeping current conversations: {e}");
                self.emit(InboxEvent::FetchFailed {
                    reason: e.to_string(),
                });
                return;
            }
        };
        match self.session.apply_snapshot(ticket, &records, &Local::now()) {
            Ok(ApplyOutcome::Applied) => {
                self.emit_conversations();
                self.emit_thread();
            }
            Ok(ApplyOutcome::Stale) => {}
            Err(e) => {
                log::error!("could not aggregate messages, keeping current conversations: {e}");
                self.emit(InboxEvent::FetchFailed {
                    reason: e.to_string(),
                });
            }
        }
    }

    fn on_sent(&mut self, key: String, body: String, result: Result<()>) {
        if let Err(e) = result {
            self.emit(InboxEvent::SendFailed {
                key: Some(key),
                reason: e.to_string(),
            });
            return;
        }
        if let Err(e) = self.session.record_sent(&key, &body, &Local::now()) {
            log::warn!("sent message has no conversation to show in: {e}");
        }
        self.emit(InboxEvent::MessageSent { key });
        self.emit_conversations();
        self.emit_thread();
        self.start_refresh();
    }

    fn emit_conversations(&self) {
        self.emit(InboxEvent::ConversationsUpdated {
            conversations: self.session.conversations().to_vec(),
            selected: self.session.selected().map(str::to_string),
        });
    }

    fn emit_thread(&self) {
        if let Some(conversation) = self.session.selected_conversation() {
            self.emit(InboxEvent::ThreadUpdated {
                key: conversation.counterpart_address.clone(),
                display_name: conversation.display_name.clone(),
                messages: conversation.messages.clone(),
            });
        }
    }

    fn emit(&self, event: InboxEvent) {
        if self.events.send(event).is_err() {
            log::debug!("no view attached, dropping event");
        }
    }
}
