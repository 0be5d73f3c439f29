//! Application state.
//!
//! The `App` is the single owner of the conversation and the attachment
//! staging list. Turn I/O runs in spawned tasks and reports back through
//! [`TurnEvent`]s, which are applied here on the UI loop.

use std::path::PathBuf;
use std::time::Duration;

use valor_chat_core::{
    AttachmentStaging, ChatRequest, ConversationState, ModelConfig, TurnController, TurnEvent,
};

use crate::ingest;

/// Interval between backend health checks.
pub const HEALTH_INTERVAL: Duration = Duration::from_secs(5);

/// Input mode for special operations.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum InputMode {
    /// Normal chat operation.
    #[default]
    Normal,
    /// Prompting for a file path to attach.
    AttachingFile,
}

/// Last known state of the inference backend.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum BackendHealth {
    /// No check has completed yet.
    #[default]
    Unknown,
    /// The health endpoint answered ok.
    Up,
    /// The check failed.
    Down(String),
}

/// Application state.
pub struct App {
    /// Backend base URL, for display.
    base_url: String,
    /// Model options sent with every turn.
    pub model: ModelConfig,
    /// Messages of this session.
    pub conversation: ConversationState,
    /// Files waiting for the next turn.
    pub staging: AttachmentStaging,
    /// State of the current turn.
    pub turn: TurnController,
    /// Current input buffer.
    pub input: String,
    /// Cursor position in input, in characters.
    pub cursor_position: usize,
    /// Current input mode.
    pub input_mode: InputMode,
    /// Whether single-key commands are active instead of typing.
    pub command_mode: bool,
    /// Chat scroll position, in lines up from the bottom.
    pub chat_scroll: usize,
    /// Status message to display.
    pub status_message: Option<String>,
    /// Error message to display.
    pub error_message: Option<String>,
    /// Whether the app should quit.
    pub should_quit: bool,
    /// Backend health from the last check.
    pub backend: BackendHealth,
    /// Animation frame counter for loading indicators.
    pub animation_frame: usize,
    /// Saved chat input when entering a dialog mode.
    saved_chat_input: Option<(String, usize)>,
}

impl App {
    /// Create a new application.
    #[must_use]
    pub fn new(base_url: impl Into<String>, model: ModelConfig) -> Self {
        Self {
            base_url: base_url.into(),
            model,
            conversation: ConversationState::new(),
            staging: AttachmentStaging::new(),
            turn: TurnController::new(),
            input: String::new(),
            cursor_position: 0,
            input_mode: InputMode::Normal,
            command_mode: false,
            chat_scroll: 0,
            status_message: None,
            error_message: None,
            should_quit: false,
            backend: BackendHealth::Unknown,
            animation_frame: 0,
            saved_chat_input: None,
        }
    }

    /// Backend URL for display.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Enter a dialog mode, saving the current chat input.
    pub fn enter_dialog_mode(&mut self, mode: InputMode) {
        self.saved_chat_input = Some((std::mem::take(&mut self.input), self.cursor_position));
        self.cursor_position = 0;
        self.command_mode = false;
        self.input_mode = mode;
    }

    /// Exit dialog mode, restoring the saved chat input.
    pub fn exit_dialog_mode(&mut self) {
        self.input_mode = InputMode::Normal;
        if let Some((input, cursor)) = self.saved_chat_input.take() {
            self.input = input;
            self.cursor_position = cursor;
        } else {
            self.clear_input();
        }
    }

    /// Tick the animation frame (call on each render).
    pub fn tick_animation(&mut self) {
        self.animation_frame = self.animation_frame.wrapping_add(1);
    }

    /// Get current spinner character for loading animation.
    #[must_use]
    pub fn spinner_char(&self) -> &'static str {
        const SPINNER: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];
        SPINNER[self.animation_frame % SPINNER.len()]
    }

    /// Set the status message (also clears any error).
    pub fn set_status(&mut self, message: impl Into<String>) {
        self.status_message = Some(message.into());
        self.error_message = None;
    }

    /// Set the error message.
    pub fn set_error(&mut self, message: impl Into<String>) {
        self.error_message = Some(message.into());
    }

    /// Clear the error message.
    pub fn clear_error(&mut self) {
        self.error_message = None;
    }

    /// Whether a turn is in flight.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.turn.is_busy()
    }

    // =========================================================================
    // Chat Scrolling
    // =========================================================================

    /// Scroll chat up (view older messages).
    pub fn scroll_chat_up(&mut self, amount: usize) {
        self.chat_scroll = self.chat_scroll.saturating_add(amount);
    }

    /// Scroll chat down (view newer messages).
    pub fn scroll_chat_down(&mut self, amount: usize) {
        self.chat_scroll = self.chat_scroll.saturating_sub(amount);
    }

    // =========================================================================
    // Input Handling
    // =========================================================================

    fn byte_index(&self) -> usize {
        self.input
            .char_indices()
            .nth(self.cursor_position)
            .map_or(self.input.len(), |(i, _)| i)
    }

    fn input_chars(&self) -> usize {
        self.input.chars().count()
    }

    /// Insert a character at the cursor position.
    pub fn insert_char(&mut self, c: char) {
        let at = self.byte_index();
        self.input.insert(at, c);
        self.cursor_position += 1;
    }

    /// Insert a string at the cursor position.
    pub fn insert_str(&mut self, text: &str) {
        let at = self.byte_index();
        self.input.insert_str(at, text);
        self.cursor_position += text.chars().count();
    }

    /// Delete the character before the cursor.
    pub fn delete_char(&mut self) {
        if self.cursor_position > 0 {
            self.cursor_position -= 1;
            let at = self.byte_index();
            self.input.remove(at);
        }
    }

    /// Delete the character at the cursor.
    pub fn delete_char_forward(&mut self) {
        if self.cursor_position < self.input_chars() {
            let at = self.byte_index();
            self.input.remove(at);
        }
    }

    /// Delete the word before the cursor, with the whitespace after it.
    pub fn delete_word(&mut self) {
        let before: Vec<char> = self.input.chars().take(self.cursor_position).collect();
        let mut start = before.len();
        while start > 0 && before[start - 1].is_whitespace() {
            start -= 1;
        }
        while start > 0 && !before[start - 1].is_whitespace() {
            start -= 1;
        }
        while self.cursor_position > start {
            self.delete_char();
        }
    }

    /// Move cursor left.
    pub fn move_cursor_left(&mut self) {
        self.cursor_position = self.cursor_position.saturating_sub(1);
    }

    /// Move cursor right.
    pub fn move_cursor_right(&mut self) {
        if self.cursor_position < self.input_chars() {
            self.cursor_position += 1;
        }
    }

    /// Move cursor to the start.
    pub fn move_cursor_start(&mut self) {
        self.cursor_position = 0;
    }

    /// Move cursor to the end.
    pub fn move_cursor_end(&mut self) {
        self.cursor_position = self.input_chars();
    }

    /// Clear the input.
    pub fn clear_input(&mut self) {
        self.input.clear();
        self.cursor_position = 0;
    }

    /// Take the current input (clears it).
    pub fn take_input(&mut self) -> String {
        self.cursor_position = 0;
        std::mem::take(&mut self.input)
    }

    // =========================================================================
    // Attachments
    // =========================================================================

    /// Stage files from disk, reporting how many were accepted.
    pub fn attach_paths(&mut self, paths: Vec<PathBuf>) {
        let offered = paths.len();
        let accepted = self.staging.add(ingest::candidates(paths));
        let skipped = offered - accepted;
        match (accepted, skipped) {
            (0, _) => self.set_error("Only images and PDFs can be attached"),
            (n, 0) => self.set_status(format!("Attached {n} file(s)")),
            (n, s) => self.set_status(format!("Attached {n} file(s), skipped {s} unsupported")),
        }
    }

    /// Attach the path typed into the attach dialog.
    pub fn attach_from_dialog(&mut self) {
        let raw = self.take_input();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return;
        }
        match ingest::dropped_paths(trimmed) {
            Some(paths) => self.attach_paths(paths),
            None => self.set_error(format!("No such file: {trimmed}")),
        }
    }

    /// Remove the staged attachment shown as number `n` (1-based).
    pub fn remove_attachment(&mut self, n: usize) {
        match n.checked_sub(1).and_then(|i| self.staging.remove(i)) {
            Some(removed) => self.set_status(format!("Removed {}", removed.name)),
            None => self.set_status(format!("No attachment #{n}")),
        }
    }

    /// Drop every staged attachment.
    pub fn clear_attachments(&mut self) {
        if !self.staging.is_empty() {
            self.staging.clear();
            self.set_status("Attachments cleared");
        }
    }

    /// Handle a bracketed paste: dropped files are staged, text is typed.
    pub fn handle_paste(&mut self, text: &str) {
        if let Some(paths) = ingest::dropped_paths(text) {
            self.attach_paths(paths);
            return;
        }
        let single_line: String = text
            .chars()
            .map(|c| if c == '\n' || c == '\r' { ' ' } else { c })
            .collect();
        self.insert_str(&single_line);
    }

    /// Refresh previews for the current staging list before a draw.
    pub fn prepare_frame(&mut self) {
        self.staging.derive_previews();
    }

    // =========================================================================
    // Turns
    // =========================================================================

    /// Start a turn from the input line and staged files.
    ///
    /// Returns the request to stream, or `None` when nothing was sent.
    pub fn submit(&mut self) -> Option<ChatRequest> {
        if self.is_busy() {
            self.set_status("Still answering, wait for the current reply");
            return None;
        }
        let request = self.turn.begin(
            &mut self.conversation,
            &mut self.input,
            &mut self.staging,
            &self.model,
        )?;
        self.cursor_position = 0;
        self.chat_scroll = 0;
        self.set_status("Sending...");
        Some(request)
    }

    /// Apply a turn event from the streaming task.
    ///
    /// Returns `true` if the UI should be redrawn.
    pub fn handle_turn_event(&mut self, event: TurnEvent) -> bool {
        match &event {
            TurnEvent::Opened => self.set_status("Answering..."),
            TurnEvent::Delta(_) => self.chat_scroll = 0,
            TurnEvent::Rejected(detail) | TurnEvent::ReadFailed(detail) => {
                self.set_error(format!("Turn failed: {detail}"));
            }
            TurnEvent::Ended => self.set_status("Done"),
        }
        self.turn.apply(&mut self.conversation, event);
        true
    }

    /// Record the result of a health check.
    pub fn set_backend_health(&mut self, health: BackendHealth) {
        if health != self.backend {
            tracing::debug!(?health, "backend health changed");
        }
        self.backend = health;
    }
}
