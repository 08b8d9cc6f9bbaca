//! # Sertty
//!
//! A transparent serial terminal.
//!
//! Sertty relays bytes between a serial port and the local terminal without
//! touching them. It can also feed the port from files or FIFOs, copy what the
//! port sends into log files, and stream named "snippets" (small scripts or
//! canned files) into the port on demand.
//!
//! ## Keys
//!
//! | Keys | Effect |
//! |------|--------|
//! | `Ctrl-A q` | Quit |
//! | `Ctrl-A Ctrl-A` | Send one literal `Ctrl-A` |
//! | `Ctrl-A :` *line* `Enter` | Run snippet *line* (`name args...`) |
//! | `Ctrl-A` anything else | Nothing |
//!
//! ## Snippets
//!
//! A snippet name is looked up in the `--snippet` directories, then in
//! `$XDG_CONFIG_HOME/sertty/snippets`, then in `./snippets`. Executable files
//! are run with the typed arguments and their stdout is sent to the port. Any
//! other file is sent as-is.
//!
//! ## Embedding
//!
//! ```no_run
//! use sertty::source::{Origin, Sink, SourceKind};
//! use sertty::{Engine, SnippetRunner};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> anyhow::Result<()> {
//!     let port = sertty::serial::open("/dev/ttyUSB0".as_ref(), 115200)?;
//!     let reader = tokio::fs::File::from_std(port.try_clone()?);
//!
//!     let mut engine = Engine::new(Sink::new("ttyUSB0", port), SnippetRunner::new(vec![]));
//!     engine.add_output(Sink::stdout());
//!     engine.watch(SourceKind::Serial, "ttyUSB0", Origin::Reader(Box::new(reader)));
//!     engine.watch(SourceKind::Interactive, "stdin", Origin::Reader(Box::new(tokio::io::stdin())));
//!
//!     let exit = engine.run().await?;
//!     println!("{exit:?}");
//!     Ok(())
//! }
//! ```

pub mod command_mode;
pub mod config;
pub mod engine;
pub mod error;
pub mod logging;
pub mod parser;
pub mod serial;
pub mod snippet;
pub mod source;
pub mod terminal;

pub use command_mode::{CommandMode, ESCAPE};
pub use config::Config;
pub use engine::{Engine, Exit, Notice};
pub use error::{Error, Result, SnippetError};
pub use snippet::{Snippet, SnippetRunner};
