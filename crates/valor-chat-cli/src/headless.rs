//! Headless `ask`: one turn printed to plain writers instead of the TUI.

use std::io::Write;
use std::process::ExitCode;

use tokio::sync::mpsc;
use valor_chat_core::{
    stream_turn, ChatRequest, ChatTransport, ConversationState, HttpTransport, TurnController,
    TurnEvent, TurnOutcome, TurnState,
};

/// Stream one turn, writing each delta to `out` as it arrives.
///
/// Returns how the turn settled.
pub async fn stream_answer<T, W>(
    transport: &T,
    request: ChatRequest,
    turn: &mut TurnController,
    conversation: &mut ConversationState,
    out: &mut W,
) -> TurnOutcome
where
    T: ChatTransport + ?Sized,
    W: Write,
{
    let (tx, mut rx) = mpsc::channel::<TurnEvent>(128);
    let io = stream_turn(transport, request, tx);
    let drain = async {
        while let Some(event) = rx.recv().await {
            if let TurnEvent::Delta(ref delta) = event {
                if let Err(e) = write!(out, "{delta}").and_then(|()| out.flush()) {
                    tracing::debug!(error = %e, "failed to write delta");
                }
            }
            turn.apply(conversation, event);
        }
    };
    tokio::join!(io, drain);

    match turn.state() {
        TurnState::Settled(outcome) => outcome.clone(),
        state => TurnOutcome::Error(format!("turn ended while {state:?}")),
    }
}

/// Run one turn against the non-streaming endpoint.
///
/// The answer goes to `out`, token usage to `meta`.
pub async fn complete_answer<W, M>(
    transport: &HttpTransport,
    request: ChatRequest,
    out: &mut W,
    meta: &mut M,
) -> TurnOutcome
where
    W: Write,
    M: Write,
{
    match transport.complete(request).await {
        Ok(response) => {
            let _ = writeln!(out, "{}", response.answer);
            let _ = writeln!(
                meta,
                "({} prompt / {} completion tokens, {} ms)",
                response.usage.prompt_tokens,
                response.usage.completion_tokens,
                response.usage.latency_ms
            );
            TurnOutcome::Success
        }
        Err(e) => {
            tracing::warn!(status = ?e.status(), "completion failed");
            TurnOutcome::Error(e.to_string())
        }
    }
}

/// Print a failed outcome and map it to the process exit code.
pub fn finish<E: Write>(outcome: &TurnOutcome, err: &mut E) -> ExitCode {
    match outcome {
        TurnOutcome::Success => ExitCode::SUCCESS,
        TurnOutcome::Error(detail) => {
            let _ = writeln!(err, "Error: {detail}");
            ExitCode::FAILURE
        }
    }
}
