//! Turning pasted text into candidate files.
//!
//! Terminals deliver a file drag-and-drop as a bracketed paste of its path,
//! quoted or backslash-escaped when it contains spaces, sometimes as a
//! `file://` URI. A paste counts as a drop only when every token names an
//! existing file; anything else is ordinary text for the input line.

use std::path::{Path, PathBuf};

use valor_chat_core::CandidateFile;

/// Interpret pasted text as dropped files.
///
/// Returns `None` when the text is not a list of existing files.
pub fn dropped_paths(text: &str) -> Option<Vec<PathBuf>> {
    dropped_paths_with(text, Path::is_file)
}

fn dropped_paths_with(text: &str, exists: impl Fn(&Path) -> bool) -> Option<Vec<PathBuf>> {
    let tokens = shlex::split(text)?;
    if tokens.is_empty() {
        return None;
    }
    let paths: Vec<PathBuf> = tokens.iter().map(|t| token_to_path(t)).collect();
    paths.iter().all(|p| exists(p)).then_some(paths)
}

/// Candidate files for a list of paths.
pub fn candidates(paths: Vec<PathBuf>) -> Vec<CandidateFile> {
    paths.into_iter().map(CandidateFile::from_path).collect()
}

fn token_to_path(token: &str) -> PathBuf {
    match token.strip_prefix("file://") {
        Some(rest) => PathBuf::from(percent_decode(rest)),
        None => PathBuf::from(token),
    }
}

fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok();
            if let Some(value) = hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                out.push(value);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}
