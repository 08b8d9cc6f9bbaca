//! The `Ctrl-A` command mode.
//!
//! Only bytes from the interactive source are fed through [`CommandMode`].
//! Everything else is forwarded without inspection.

/// The reserved byte that enters command mode (`Ctrl-A`).
pub const ESCAPE: u8 = 0x01;

const QUIT: u8 = b'q';
const OPEN_REPL: u8 = b':';
const BACKSPACE: u8 = 0x08;
const DELETE: u8 = 0x7f;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum State {
    #[default]
    Normal,
    /// An escape byte was seen; the next byte picks the command.
    Escaped,
    /// Collecting a snippet command line after `Ctrl-A :`.
    ReplEditing,
}

/// What the engine should do in response to one byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Nothing leaves the state machine.
    None,
    /// Send this byte to the serial port.
    Forward(u8),
    /// End the session.
    Quit,
    /// A completed command line, without its terminator.
    Submit(Vec<u8>),
}

#[derive(Debug, Default)]
pub struct CommandMode {
    state: State,
    line: Vec<u8>,
}

impl CommandMode {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// The command line collected so far.
    pub fn line(&self) -> &[u8] {
        &self.line
    }

    /// Advance the state machine by one keyboard byte.
    pub fn feed(&mut self, byte: u8) -> Action {
        match self.state {
            State::Normal if byte == ESCAPE => {
                self.state = State::Escaped;
                Action::None
            }
            State::Normal => Action::Forward(byte),
            State::Escaped => {
                self.state = State::Normal;
                match byte {
                    ESCAPE => Action::Forward(ESCAPE),
                    QUIT => Action::Quit,
                    OPEN_REPL => {
                        self.line.clear();
                        self.state = State::ReplEditing;
                        Action::None
                    }
                    _ => Action::None,
                }
            }
            State::ReplEditing => match byte {
                // Raw terminals send CR for Enter.
                b'\r' | b'\n' => {
                    self.state = State::Normal;
                    Action::Submit(std::mem::take(&mut self.line))
                }
                BACKSPACE | DELETE => {
                    self.line.pop();
                    Action::None
                }
                _ => {
                    self.line.push(byte);
                    Action::None
                }
            },
        }
    }
}
