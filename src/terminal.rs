//! Raw mode for the interactive terminal.

use nix::sys::termios::{self, SetArg, Termios};
use std::io::{self, IsTerminal};

/// Keeps stdin in raw mode (no echo, no line buffering, no signals) so every
/// key reaches command mode as typed. The previous settings come back on drop.
pub struct RawMode {
    saved: Termios,
}

impl RawMode {
    /// Switch stdin to raw mode. Returns `None` when stdin is not a terminal.
    pub fn enable() -> io::Result<Option<Self>> {
        let stdin = io::stdin();
        if !stdin.is_terminal() {
            return Ok(None);
        }

        let saved = termios::tcgetattr(&stdin)?;
        let mut raw = saved.clone();
        termios::cfmakeraw(&mut raw);
        termios::tcsetattr(&stdin, SetArg::TCSANOW, &raw)?;
        Ok(Some(Self { saved }))
    }
}

impl Drop for RawMode {
    fn drop(&mut self) {
        let _ = termios::tcsetattr(io::stdin(), SetArg::TCSANOW, &self.saved);
    }
}
