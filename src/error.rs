//! Error types for sertty.
//!
//! Only [`Error::Link`] and [`Error::LinkClosed`] end a session. Everything
//! else is reported and isolated to the source, sink or snippet that produced
//! it.

use std::io;
use std::path::PathBuf;

/// Result alias used across the library.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The serial device failed to read or write. The link is assumed lost.
    #[error("serial link lost: {0}")]
    Link(#[source] io::Error),

    /// The serial device reported end-of-stream.
    #[error("serial link closed")]
    LinkClosed,

    #[error(transparent)]
    Snippet(#[from] SnippetError),

    /// A non-serial sink failed to accept a write.
    #[error("write to {name} failed: {source}")]
    Sink {
        name: String,
        #[source]
        source: io::Error,
    },

    /// The serial device could not be opened or configured.
    #[error("cannot set up {}: {reason}", path.display())]
    Setup { path: PathBuf, reason: String },
}

impl Error {
    /// Whether this error terminates the multiplexing loop.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Link(_) | Error::LinkClosed)
    }
}

/// Failures while resolving or starting a snippet.
#[derive(Debug, thiserror::Error)]
pub enum SnippetError {
    #[error("snippet not found: {name}")]
    NotFound { name: String },

    #[error("failed to start snippet {}: {source}", path.display())]
    Spawn {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_link_errors_are_fatal() {
        assert!(Error::LinkClosed.is_fatal());
        assert!(Error::Link(io::Error::from(io::ErrorKind::BrokenPipe)).is_fatal());
        assert!(
            !Error::Snippet(SnippetError::NotFound {
                name: "foo".into()
            })
            .is_fatal()
        );
        assert!(
            !Error::Sink {
                name: "stdout".into(),
                source: io::Error::from(io::ErrorKind::BrokenPipe),
            }
            .is_fatal()
        );
    }

    #[test]
    fn test_not_found_message_names_the_snippet() {
        let err = SnippetError::NotFound {
            name: "reset".into(),
        };
        assert_eq!(err.to_string(), "snippet not found: reset");
    }
}
