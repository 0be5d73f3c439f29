//! Turn controller.
//!
//! Drives one user turn through `Idle → Sending → Streaming → Settled`.
//!
//! The controller is split in two halves so that every mutation of the
//! conversation happens on the task that owns it:
//!
//! - [`TurnController`] lives next to the [`ConversationState`] and applies
//!   [`TurnEvent`]s to it.
//! - [`stream_turn`] runs in a spawned task, opens the transport, decodes the
//!   body and forwards events over a channel.

use futures::StreamExt;
use tokio::sync::mpsc;

use crate::attachments::AttachmentStaging;
use crate::config::ModelConfig;
use crate::conversation::{ConversationState, Role};
use crate::decoder::decode_stream;
use crate::ids::MessageId;
use crate::transport::{ChatRequest, ChatTransport};

/// Prefix of every error shown in place of an answer.
pub const ERROR_PREFIX: &str = "Error: ";

/// How a turn ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    /// The stream ended normally.
    Success,
    /// The turn failed with the given detail.
    Error(String),
}

/// Lifecycle of the current turn.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TurnState {
    /// No turn has been sent yet.
    #[default]
    Idle,
    /// Request issued, no response yet.
    Sending,
    /// Response body is being read.
    Streaming,
    /// The last turn finished.
    Settled(TurnOutcome),
}

impl TurnState {
    /// Whether a turn is in flight.
    #[must_use]
    pub const fn is_busy(&self) -> bool {
        matches!(self, Self::Sending | Self::Streaming)
    }
}

/// Progress reported by [`stream_turn`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnEvent {
    /// The backend accepted the request; the body is streaming.
    Opened,
    /// One decoded text delta.
    Delta(String),
    /// The request failed before a body was available.
    Rejected(String),
    /// Reading the body failed mid-stream.
    ReadFailed(String),
    /// The body ended normally.
    Ended,
}

/// Applies turn events to the conversation.
#[derive(Debug, Default)]
pub struct TurnController {
    state: TurnState,
    target: Option<MessageId>,
}

impl TurnController {
    /// Create an idle controller.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> &TurnState {
        &self.state
    }

    /// Whether a turn is in flight.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.state.is_busy()
    }

    /// The assistant message receiving this turn's deltas.
    #[must_use]
    pub fn target(&self) -> Option<MessageId> {
        self.target
    }

    /// Start a turn from the current input and staged attachments.
    ///
    /// Returns the request to hand to [`stream_turn`], or `None` when the
    /// send is a no-op: a turn is already in flight, or there is neither text
    /// nor an attachment.
    ///
    /// On success the user message and an empty assistant message are
    /// appended, the input is cleared and staging is emptied.
    pub fn begin(
        &mut self,
        conversation: &mut ConversationState,
        input: &mut String,
        staging: &mut AttachmentStaging,
        model: &ModelConfig,
    ) -> Option<ChatRequest> {
        if self.is_busy() {
            tracing::debug!("send ignored: turn in flight");
            return None;
        }
        if input.trim().is_empty() && staging.is_empty() {
            return None;
        }

        let history = conversation.snapshot_history();
        let message = std::mem::take(input);
        let files = staging.take();
        let metas = files.iter().map(|f| f.to_meta()).collect();

        conversation.append_message(Role::User, message.clone(), metas);
        let target = conversation.append_message(Role::Assistant, "", Vec::new());

        tracing::info!(
            message_id = %target,
            history = history.len(),
            files = files.len(),
            "turn started"
        );

        self.target = Some(target);
        self.state = TurnState::Sending;

        Some(ChatRequest {
            message,
            history,
            files,
            model: model.clone(),
        })
    }

    /// Apply one event. Returns true if the conversation changed.
    ///
    /// Events arriving while no turn is in flight are ignored.
    pub fn apply(&mut self, conversation: &mut ConversationState, event: TurnEvent) -> bool {
        let Some(target) = self.target.filter(|_| self.is_busy()) else {
            tracing::debug!(?event, "turn event without active turn ignored");
            return false;
        };

        match event {
            TurnEvent::Opened => {
                self.state = TurnState::Streaming;
                false
            }
            TurnEvent::Delta(delta) => {
                self.state = TurnState::Streaming;
                conversation.append_to_message(target, &delta);
                true
            }
            TurnEvent::Rejected(detail) => {
                conversation.replace_message_content(target, format!("{ERROR_PREFIX}{detail}"));
                self.settle(conversation, TurnOutcome::Error(detail));
                true
            }
            TurnEvent::ReadFailed(detail) => {
                let streamed = conversation
                    .get(target)
                    .is_some_and(|m| !m.content.is_empty());
                if streamed {
                    conversation.append_to_message(target, &format!("\n\n{ERROR_PREFIX}{detail}"));
                } else {
                    conversation
                        .replace_message_content(target, format!("{ERROR_PREFIX}{detail}"));
                }
                self.settle(conversation, TurnOutcome::Error(detail));
                true
            }
            TurnEvent::Ended => {
                self.settle(conversation, TurnOutcome::Success);
                true
            }
        }
    }

    fn settle(&mut self, conversation: &mut ConversationState, outcome: TurnOutcome) {
        match &outcome {
            TurnOutcome::Success => tracing::info!("turn completed"),
            TurnOutcome::Error(detail) => tracing::warn!(%detail, "turn failed"),
        }
        conversation.close_open_message();
        self.target = None;
        self.state = TurnState::Settled(outcome);
    }
}

/// Run the I/O side of one turn, reporting progress on `events`.
///
/// Sends exactly one terminal event (`Rejected`, `ReadFailed` or `Ended`).
/// Stops early if the receiver is dropped.
pub async fn stream_turn<T>(transport: &T, request: ChatRequest, events: mpsc::Sender<TurnEvent>)
where
    T: ChatTransport + ?Sized,
{
    let body = match transport.open(request).await {
        Ok(body) => body,
        Err(e) => {
            let _ = events.send(TurnEvent::Rejected(e.to_string())).await;
            return;
        }
    };
    if events.send(TurnEvent::Opened).await.is_err() {
        return;
    }

    let mut deltas = std::pin::pin!(decode_stream(body));
    while let Some(item) = deltas.next().await {
        let event = match item {
            Ok(delta) => TurnEvent::Delta(delta),
            Err(e) => {
                let _ = events.send(TurnEvent::ReadFailed(e.to_string())).await;
                return;
            }
        };
        if events.send(event).await.is_err() {
            tracing::debug!("turn event receiver dropped");
            return;
        }
    }
    let _ = events.send(TurnEvent::Ended).await;
}
