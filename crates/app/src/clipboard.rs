//! Copying invite links to the system clipboard
//!
//! arboard covers X11 and most Wayland compositors; `wl-copy` is the fallback
//! for Wayland sessions where arboard cannot reach the clipboard.

use std::env;
use std::io::Write;
use std::process::{Command, Stdio};

/// How a copy succeeded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopiedWith {
    Arboard,
    WlCopy,
}

fn is_wayland() -> bool {
    env::var_os("WAYLAND_DISPLAY").is_some()
}

/// Copy text, returning how it was done or `None` if every method failed
pub fn copy(text: &str) -> Option<CopiedWith> {
    if let Ok(mut clipboard) = arboard::Clipboard::new() {
        if clipboard.set_text(text).is_ok() {
            tracing::debug!("Copied to clipboard via arboard");
            return Some(CopiedWith::Arboard);
        }
    }

    if is_wayland() && try_wl_copy(text) {
        tracing::debug!("Copied to clipboard via wl-copy");
        return Some(CopiedWith::WlCopy);
    }

    tracing::warn!("All clipboard methods failed");
    None
}

fn try_wl_copy(text: &str) -> bool {
    let mut child = match Command::new("wl-copy")
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
    {
        Ok(child) => child,
        Err(_) => return false,
    };

    if let Some(mut stdin) = child.stdin.take() {
        if stdin.write_all(text.as_bytes()).is_err() {
            return false;
        }
    }

    matches!(child.wait(), Ok(status) if status.success())
}
