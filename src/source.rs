//! Byte sources and sinks.
//!
//! A source is anything readable: the serial port, stdin, a `--read` file or
//! FIFO, or a snippet's stdout. Each watched source is driven by a pump task
//! that turns reads into [`SourceEvent`]s on the engine's channel, so the
//! engine only ever waits in one place.

use std::fmt;
use std::io::{self, Write};
use std::os::unix::fs::FileTypeExt;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc::Sender;
use tokio::task::JoinHandle;

/// Upper bound on a single read, and so on a single forwarded write.
pub const READ_CHUNK: usize = 4096;

pub type Reader = Box<dyn AsyncRead + Send + Unpin>;

/// Identifies a source within one engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceId(pub(crate) u64);

/// The role of a source, which decides where its bytes go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// Serial input; forwarded to stdout and `--write` sinks.
    Serial,
    /// Keyboard input; interpreted by command mode.
    Interactive,
    /// A `--read` file or FIFO; forwarded to the serial port.
    File,
    /// Output of a snippet; forwarded to the serial port.
    Snippet,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SourceKind::Serial => "serial",
            SourceKind::Interactive => "interactive",
            SourceKind::File => "file",
            SourceKind::Snippet => "snippet",
        };
        f.write_str(s)
    }
}

/// Where a pump gets its reader from.
pub enum Origin {
    /// An already open stream.
    Reader(Reader),
    /// A path opened by the pump itself. Opening a FIFO blocks until a
    /// writer attaches, and only this source should wait for that.
    Path(PathBuf),
}

impl Origin {
    /// Open a `--read` path. Regular files are opened here so a bad path
    /// fails at startup. A FIFO only has to exist; the pump opens it.
    pub fn open(path: &Path) -> io::Result<Self> {
        if std::fs::metadata(path)?.file_type().is_fifo() {
            return Ok(Origin::Path(path.to_path_buf()));
        }
        let file = std::fs::File::open(path)?;
        Ok(Origin::Reader(Box::new(tokio::fs::File::from_std(file))))
    }
}

impl From<Reader> for Origin {
    fn from(reader: Reader) -> Self {
        Origin::Reader(reader)
    }
}

#[derive(Debug)]
pub enum SourceEvent {
    Data(SourceId, Vec<u8>),
    Closed(SourceId),
    Failed(SourceId, io::Error),
}

impl SourceEvent {
    pub fn id(&self) -> SourceId {
        match self {
            SourceEvent::Data(id, _) | SourceEvent::Closed(id) | SourceEvent::Failed(id, _) => *id,
        }
    }
}

/// Spawn a task that reads `origin` until end-of-stream or error and reports
/// each chunk on `tx`.
///
/// The reader is dropped before the final `Closed`/`Failed` event is sent, so
/// by the time the engine sees it the handle is already released.
pub fn spawn_pump(id: SourceId, origin: Origin, tx: Sender<SourceEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut reader: Reader = match origin {
            Origin::Reader(reader) => reader,
            Origin::Path(path) => match tokio::fs::File::open(&path).await {
                Ok(file) => Box::new(file),
                Err(e) => {
                    let _ = tx.send(SourceEvent::Failed(id, e)).await;
                    return;
                }
            },
        };

        let mut buffer = vec![0u8; READ_CHUNK];
        let last = loop {
            match reader.read(&mut buffer).await {
                Ok(0) => break SourceEvent::Closed(id),
                Ok(n) => {
                    if tx.send(SourceEvent::Data(id, buffer[..n].to_vec())).await.is_err() {
                        return; // Engine gone
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => break SourceEvent::Failed(id, e),
            }
        };

        drop(reader);
        let _ = tx.send(last).await;
    })
}

/// A named writable endpoint.
pub struct Sink {
    name: String,
    writer: Box<dyn Write + Send>,
}

impl Sink {
    pub fn new(name: impl Into<String>, writer: impl Write + Send + 'static) -> Self {
        Self {
            name: name.into(),
            writer: Box::new(writer),
        }
    }

    pub fn stdout() -> Self {
        Self::new("stdout", io::stdout())
    }

    /// Create (or truncate) a file sink.
    pub fn create(path: &Path) -> io::Result<Self> {
        let file = std::fs::File::create(path)?;
        Ok(Self::new(path.display().to_string(), file))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Write one chunk in full and flush it.
    pub fn write(&mut self, data: &[u8]) -> io::Result<()> {
        self.writer.write_all(data)?;
        self.writer.flush()
    }
}

impl fmt::Debug for Sink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sink").field("name", &self.name).finish()
    }
}

/// In-memory sink shared with a test, so it can inspect what was written.
#[cfg(test)]
#[derive(Clone, Default)]
pub(crate) struct SharedBuffer(pub std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

#[cfg(test)]
impl SharedBuffer {
    pub fn contents(&self) -> Vec<u8> {
        self.0.lock().unwrap().clone()
    }
}

#[cfg(test)]
impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
