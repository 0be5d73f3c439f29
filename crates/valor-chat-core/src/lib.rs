//! Core of the ValorMM multimodal chat client.
//!
//! This crate holds everything between the user's input and the rendered
//! answer, with no terminal code:
//!
//! - **Attachment staging**: image/PDF files waiting for the next turn
//! - **Conversation state**: the ordered message list
//! - **Transport**: one multipart HTTP request per turn, body as a byte stream
//! - **Frame decoder**: byte chunks to ordered text deltas
//! - **Turn controller**: the per-turn state machine tying them together
//!
//! # Example
//!
//! ```
//! use valor_chat_core::decoder::FrameDecoder;
//!
//! let mut decoder = FrameDecoder::new();
//! let mut deltas = decoder.push(b"data: Hel");
//! deltas.extend(decoder.push(b"lo\n\ndata: [DONE]\n\n"));
//! assert_eq!(deltas, [" Hello"]);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod attachments;
pub mod config;
pub mod conversation;
pub mod decoder;
pub mod error;
pub mod ids;
pub mod transport;
pub mod turn;

pub use attachments::{AttachmentStaging, CandidateFile, FileHandle, Preview, StagedAttachment};
pub use config::{ClientConfig, ModelConfig};
pub use conversation::{AttachmentMeta, ConversationState, HistoryEntry, Message, Role};
pub use decoder::{decode_stream, FrameDecoder};
pub use error::{Result, TransportError};
pub use ids::MessageId;
pub use transport::{ByteStream, ChatRequest, ChatResponse, ChatTransport, HttpTransport, Usage};
pub use turn::{stream_turn, TurnController, TurnEvent, TurnOutcome, TurnState};
