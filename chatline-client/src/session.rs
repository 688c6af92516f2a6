use chatline_core::{InboundEvent, OutboundPayload, classify, is_allowed_upload_type, user_message};
use thiserror::Error;

use crate::countdown::{IDLE_MAX_SECONDS, IdleCountdown};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionPhase {
    Disconnected,
    Connecting,
    Open,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    User,
    Bot,
    Warning,
}

/// One line of the conversation log. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationEntry {
    pub text: String,
    pub kind: EntryKind,
}

/// A file offered for upload, as declared by the picker. The bytes travel
/// separately, straight to the payload encoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadRequest {
    pub filename: String,
    pub content_type: String,
}

/// Validation failures. None of these mutate the session or its log; all are
/// surfaced at the point of the attempted action and never retried.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("username must not be empty")]
    EmptyUsername,
    #[error("session already started")]
    AlreadyStarted,
    #[error("not connected to the server")]
    NotConnected,
    #[error("no file selected")]
    NoFileSelected,
    #[error("unsupported type: {content_type}")]
    UnsupportedType { content_type: String },
}

/// The connection/session state machine.
///
/// Owns the conversation log and the idle countdown; every transition and
/// every piece of log routing happens through these methods. The transport
/// feeds in `transport_opened` / `inbound_frame` / `transport_closed`; the
/// interactive surface feeds in the connect / send / upload calls.
#[derive(Debug)]
pub struct ChatSession {
    phase: ConnectionPhase,
    username: String,
    log: Vec<ConversationEntry>,
    countdown: IdleCountdown,
}

impl ChatSession {
    pub fn new() -> Self {
        Self {
            phase: ConnectionPhase::Disconnected,
            username: String::new(),
            log: Vec::new(),
            countdown: IdleCountdown::new(),
        }
    }

    pub fn phase(&self) -> ConnectionPhase {
        self.phase
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn entries(&self) -> &[ConversationEntry] {
        &self.log
    }

    pub fn seconds_remaining(&self) -> u32 {
        self.countdown.value()
    }

    pub fn idle_ratio(&self) -> f32 {
        self.countdown.ratio()
    }

    /// Ask to connect as `username`. Rejects an empty username and any
    /// session that already left `Disconnected`; the phase model is
    /// forward-only, so a new session means a new `ChatSession`.
    pub fn connect_requested(&mut self, username: &str) -> Result<(), SessionError> {
        let username = username.trim();
        if username.is_empty() {
            return Err(SessionError::EmptyUsername);
        }
        if self.phase != ConnectionPhase::Disconnected {
            return Err(SessionError::AlreadyStarted);
        }

        self.username = username.to_owned();
        self.phase = ConnectionPhase::Connecting;
        Ok(())
    }

    /// The transport is ready.
    pub fn transport_opened(&mut self) {
        if self.phase != ConnectionPhase::Connecting {
            return;
        }

        self.phase = ConnectionPhase::Open;
        self.append(EntryKind::User, format!("Connected as {}", self.username));
        self.countdown.start(IDLE_MAX_SECONDS);
    }

    /// The transport delivered one text frame.
    pub fn inbound_frame(&mut self, frame: &str) {
        if self.phase != ConnectionPhase::Open {
            return;
        }

        let (kind, text) = match classify(frame) {
            InboundEvent::Progress { percent } => {
                (EntryKind::Bot, format!("⏳ Progress: {percent}%"))
            }
            InboundEvent::Summary { text } => (EntryKind::Bot, text),
            InboundEvent::Generic { text } => (EntryKind::Bot, text),
            InboundEvent::LegacyStatus { text } => (EntryKind::User, text),
            InboundEvent::Warning { text } => (EntryKind::Warning, text),
        };

        self.append(kind, text);
        self.countdown.reset();
    }

    /// The transport went away. Terminal: there is no reconnect.
    pub fn transport_closed(&mut self) {
        if !matches!(
            self.phase,
            ConnectionPhase::Connecting | ConnectionPhase::Open
        ) {
            return;
        }

        self.phase = ConnectionPhase::Closed;
        self.append(EntryKind::Warning, "Disconnected from server".to_owned());
        self.countdown.stop();
    }

    /// Turn user text into an outbound payload. Empty or whitespace-only text
    /// is a silent no-op; anything else requires an open connection.
    pub fn prepare_user_message(
        &mut self,
        text: &str,
    ) -> Result<Option<OutboundPayload>, SessionError> {
        if text.trim().is_empty() {
            return Ok(None);
        }
        if self.phase != ConnectionPhase::Open {
            return Err(SessionError::NotConnected);
        }

        self.append(EntryKind::User, text.to_owned());
        self.countdown.reset();
        Ok(Some(user_message(text)))
    }

    /// Gatekeep an upload before it reaches the payload encoder: a file must
    /// be supplied, its declared type must be on the document allow-list, and
    /// the connection must be open. Acceptance is logged immediately.
    pub fn admit_upload(&mut self, request: Option<&UploadRequest>) -> Result<(), SessionError> {
        let request = request.ok_or(SessionError::NoFileSelected)?;
        if !is_allowed_upload_type(&request.content_type) {
            return Err(SessionError::UnsupportedType {
                content_type: request.content_type.clone(),
            });
        }
        if self.phase != ConnectionPhase::Open {
            return Err(SessionError::NotConnected);
        }

        self.append(EntryKind::User, format!("Uploading {}...", request.filename));
        self.countdown.reset();
        Ok(())
    }

    /// The encoded upload was handed to the transport. Optimistic: no server
    /// acknowledgment is awaited.
    pub fn upload_dispatched(&mut self) {
        if self.phase != ConnectionPhase::Open {
            return;
        }

        self.append(EntryKind::Bot, "Bot is processing the file...".to_owned());
        self.countdown.reset();
    }

    /// Advance the idle countdown by one second.
    pub fn tick(&mut self) {
        self.countdown.tick();
    }

    fn append(&mut self, kind: EntryKind, text: String) {
        self.log.push(ConversationEntry { text, kind });
    }
}

impl Default for ChatSession {
    fn default() -> Self {
        Self::new()
    }
}
