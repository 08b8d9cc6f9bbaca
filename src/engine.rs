//! The multiplexing loop.
//!
//! [`Engine`] owns every source and sink of a session. Sources are pumped
//! into one channel and the engine waits on that channel alone, routing each
//! chunk by the role of the source it came from:
//!
//! | Source | Destination |
//! |--------|-------------|
//! | serial | stdout and `--write` sinks |
//! | interactive | command mode, then the serial port |
//! | file, snippet | the serial port |

use crate::command_mode::{Action, CommandMode};
use crate::error::{Error, Result, SnippetError};
use crate::parser::{TokenizeError, split_words};
use crate::snippet::{Snippet, SnippetRunner};
use crate::source::{Origin, Sink, SourceEvent, SourceId, SourceKind, spawn_pump};
use std::collections::HashMap;
use std::fmt;
use std::io;
use std::process::ExitStatus;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Child;
use tokio::sync::mpsc::{self, Receiver, Sender};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Pending chunks allowed per engine before pumps wait.
const CHANNEL_DEPTH: usize = 64;

/// How often snippets that closed their output but are still running are
/// checked for exit.
const REAP_INTERVAL: Duration = Duration::from_millis(100);

type NoticeHandler = Arc<dyn Fn(&Notice) + Send + Sync>;

/// Why a session ended without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exit {
    /// `Ctrl-A q`.
    Quit,
    /// The interactive input reached end-of-stream.
    InteractiveClosed,
    /// Running without an interactive source, the last input closed.
    InputsExhausted,
}

/// Something the user should hear about that does not end the session.
#[derive(Debug)]
pub enum Notice {
    SourceClosed { name: String },
    SourceFailed { name: String, error: io::Error },
    SnippetStarted { name: String },
    SnippetExited { name: String, status: ExitStatus },
    SnippetFailed(SnippetError),
    BadCommandLine { line: String, error: TokenizeError },
    SinkFailed(Error),
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::SourceClosed { name } => write!(f, "Closed: {name}"),
            Notice::SourceFailed { name, error } => write!(f, "{name}: read failed: {error}"),
            Notice::SnippetStarted { name } => write!(f, "Running: {name}"),
            Notice::SnippetExited { name, status } => write!(f, "{name}: {status}"),
            Notice::SnippetFailed(e) => write!(f, "{e}"),
            Notice::BadCommandLine { line, error } => write!(f, "{line:?}: {error}"),
            Notice::SinkFailed(e) => write!(f, "{e}"),
        }
    }
}

/// The default notice handler: report through `tracing`.
pub fn log_notice(notice: &Notice) {
    match notice {
        Notice::SourceClosed { .. } | Notice::SnippetStarted { .. } => info!("{notice}"),
        Notice::SnippetExited { status, .. } if status.success() => debug!("{notice}"),
        _ => warn!("{notice}"),
    }
}

struct Watched {
    name: String,
    kind: SourceKind,
    pump: JoinHandle<()>,
    child: Option<Child>,
}

impl Drop for Watched {
    fn drop(&mut self) {
        self.pump.abort();
    }
}

/// A serial copy destination. `failing` keeps a sink that keeps erroring
/// from reporting every chunk.
struct Output {
    sink: Sink,
    failing: bool,
}

pub struct Engine {
    serial: Sink,
    outputs: Vec<Output>,
    runner: SnippetRunner,
    mode: CommandMode,
    watched: HashMap<SourceId, Watched>,
    /// Snippets whose output closed before the process exited.
    lingering: Vec<(String, Child)>,
    interactive: bool,
    next_id: u64,
    tx: Sender<SourceEvent>,
    rx: Receiver<SourceEvent>,
    notice: NoticeHandler,
}

impl Engine {
    /// Create an engine that writes to `serial` and resolves snippets with
    /// `runner`. Notices are logged through `tracing`.
    pub fn new(serial: Sink, runner: SnippetRunner) -> Self {
        Self::with_notice_handler(serial, runner, log_notice)
    }

    /// Like [`Engine::new`], with notices passed to `handler` instead.
    pub fn with_notice_handler<F>(serial: Sink, runner: SnippetRunner, handler: F) -> Self
    where
        F: Fn(&Notice) + Send + Sync + 'static,
    {
        let (tx, rx) = mpsc::channel(CHANNEL_DEPTH);
        Engine {
            serial,
            outputs: Vec::new(),
            runner,
            mode: CommandMode::new(),
            watched: HashMap::new(),
            lingering: Vec::new(),
            interactive: false,
            next_id: 0,
            tx,
            rx,
            notice: Arc::new(handler),
        }
    }

    /// Add a sink that receives everything read from the serial port.
    pub fn add_output(&mut self, sink: Sink) {
        self.outputs.push(Output {
            sink,
            failing: false,
        });
    }

    /// Start watching a source. Must be called from within a tokio runtime.
    pub fn watch(
        &mut self,
        kind: SourceKind,
        name: impl Into<String>,
        origin: impl Into<Origin>,
    ) -> SourceId {
        let id = SourceId(self.next_id);
        self.next_id += 1;
        let name = name.into();
        debug!(?id, %kind, %name, "watching source");

        if kind == SourceKind::Interactive {
            self.interactive = true;
        }
        let pump = spawn_pump(id, origin.into(), self.tx.clone());
        self.watched.insert(
            id,
            Watched {
                name,
                kind,
                pump,
                child: None,
            },
        );
        id
    }

    /// Number of sources currently watched, the serial port included.
    pub fn watched_count(&self) -> usize {
        self.watched.len()
    }

    /// Run the session until it ends, then release every source and stop any
    /// snippet still running.
    pub async fn run(mut self) -> Result<Exit> {
        let result = self.event_loop().await;
        match &result {
            Ok(exit) => debug!(?exit, "session ended"),
            Err(e) => debug!(error = %e, "session failed"),
        }
        self.shutdown().await;
        result
    }

    async fn event_loop(&mut self) -> Result<Exit> {
        loop {
            let event = if self.lingering.is_empty() {
                self.rx.recv().await
            } else {
                tokio::select! {
                    event = self.rx.recv() => event,
                    _ = tokio::time::sleep(REAP_INTERVAL) => {
                        self.reap_lingering();
                        continue;
                    }
                }
            };

            // The engine keeps a sender, so the channel never closes.
            let Some(event) = event else {
                return Ok(Exit::InputsExhausted);
            };
            if let Some(exit) = self.handle(event)? {
                return Ok(exit);
            }
            self.reap_lingering();
        }
    }

    fn handle(&mut self, event: SourceEvent) -> Result<Option<Exit>> {
        let id = event.id();
        let Some(kind) = self.watched.get(&id).map(|w| w.kind) else {
            debug!(?id, "event from unwatched source");
            return Ok(None);
        };

        match (kind, event) {
            (SourceKind::Serial, SourceEvent::Data(_, data)) => {
                self.write_outputs(&data);
                Ok(None)
            }
            (SourceKind::Serial, SourceEvent::Closed(_)) => Err(Error::LinkClosed),
            (SourceKind::Serial, SourceEvent::Failed(_, e)) => Err(Error::Link(e)),

            (SourceKind::Interactive, SourceEvent::Data(_, data)) => self.handle_keys(&data),
            (SourceKind::Interactive, SourceEvent::Closed(_)) => {
                self.watched.remove(&id);
                Ok(Some(Exit::InteractiveClosed))
            }
            (SourceKind::Interactive, SourceEvent::Failed(_, error)) => {
                if let Some(w) = self.watched.remove(&id) {
                    self.notify(Notice::SourceFailed {
                        name: w.name.clone(),
                        error,
                    });
                }
                Ok(Some(Exit::InteractiveClosed))
            }

            (SourceKind::File | SourceKind::Snippet, SourceEvent::Data(_, data)) => {
                self.write_serial(&data)?;
                Ok(None)
            }
            (SourceKind::File | SourceKind::Snippet, SourceEvent::Closed(_)) => {
                self.remove(id, None);
                Ok(self.exhausted())
            }
            (SourceKind::File | SourceKind::Snippet, SourceEvent::Failed(_, error)) => {
                self.remove(id, Some(error));
                Ok(self.exhausted())
            }
        }
    }

    /// Feed keyboard bytes through command mode. Forwarded bytes from one
    /// chunk are sent as a single write.
    fn handle_keys(&mut self, data: &[u8]) -> Result<Option<Exit>> {
        let mut pending = Vec::with_capacity(data.len());
        for &byte in data {
            match self.mode.feed(byte) {
                Action::None => {}
                Action::Forward(b) => pending.push(b),
                Action::Quit => {
                    self.write_serial(&pending)?;
                    return Ok(Some(Exit::Quit));
                }
                Action::Submit(line) => {
                    self.write_serial(&pending)?;
                    pending.clear();
                    self.run_command(&line);
                }
            }
        }
        self.write_serial(&pending)?;
        Ok(None)
    }

    fn run_command(&mut self, line: &[u8]) {
        let line = String::from_utf8_lossy(line);
        let words = match split_words(&line) {
            Ok(words) => words,
            Err(error) => {
                self.notify(Notice::BadCommandLine {
                    line: line.into_owned(),
                    error,
                });
                return;
            }
        };
        let Some((name, args)) = words.split_first() else {
            return;
        };

        match self.runner.invoke(name, args) {
            Ok(snippet) => self.watch_snippet(snippet),
            Err(e) => self.notify(Notice::SnippetFailed(e)),
        }
    }

    fn watch_snippet(&mut self, snippet: Snippet) {
        let Snippet {
            name,
            path,
            output,
            child,
        } = snippet;
        debug!(path = %path.display(), "snippet started");

        let id = self.watch(SourceKind::Snippet, name.clone(), output);
        if let Some(w) = self.watched.get_mut(&id) {
            w.child = child;
        }
        self.notify(Notice::SnippetStarted { name });
    }

    /// Drop a finished source. A snippet's pipe is already closed by its
    /// pump at this point, so its process can be reaped.
    fn remove(&mut self, id: SourceId, error: Option<io::Error>) {
        let Some(mut w) = self.watched.remove(&id) else {
            return;
        };
        let name = w.name.clone();
        match error {
            Some(error) => self.notify(Notice::SourceFailed {
                name: name.clone(),
                error,
            }),
            None => self.notify(Notice::SourceClosed { name: name.clone() }),
        }
        if let Some(child) = w.child.take() {
            self.lingering.push((name, child));
        }
    }

    fn reap_lingering(&mut self) {
        let mut exited = Vec::new();
        self.lingering.retain_mut(|(name, child)| match child.try_wait() {
            Ok(Some(status)) => {
                exited.push(Notice::SnippetExited {
                    name: name.clone(),
                    status,
                });
                false
            }
            Ok(None) => true,
            Err(e) => {
                warn!(snippet = %name, error = %e, "cannot reap snippet");
                false
            }
        });
        for notice in exited {
            self.notify(notice);
        }
    }

    /// With no interactive source there is nothing else to end the session,
    /// so it ends when the last input goes away.
    fn exhausted(&self) -> Option<Exit> {
        let inputs_left = self
            .watched
            .values()
            .any(|w| w.kind != SourceKind::Serial);
        (!self.interactive && !inputs_left).then_some(Exit::InputsExhausted)
    }

    fn write_serial(&mut self, data: &[u8]) -> Result<()> {
        if data.is_empty() {
            return Ok(());
        }
        self.serial.write(data).map_err(Error::Link)
    }

    /// Copy serial input to every output. A failed write is reported and the
    /// chunk is lost for that sink only. Repeated failures are reported once
    /// until the sink accepts a write again.
    fn write_outputs(&mut self, data: &[u8]) {
        for out in &mut self.outputs {
            match out.sink.write(data) {
                Ok(()) => {
                    if out.failing {
                        debug!(sink = out.sink.name(), "output recovered");
                    }
                    out.failing = false;
                }
                Err(source) => {
                    if !out.failing {
                        (self.notice)(&Notice::SinkFailed(Error::Sink {
                            name: out.sink.name().to_string(),
                            source,
                        }));
                    }
                    out.failing = true;
                }
            }
        }
    }

    fn notify(&self, notice: Notice) {
        (self.notice)(&notice);
    }

    async fn shutdown(&mut self) {
        let mut children = std::mem::take(&mut self.lingering);
        for (_, mut w) in self.watched.drain() {
            w.pump.abort();
            if let Some(child) = w.child.take() {
                children.push((w.name.clone(), child));
            }
        }

        for (name, mut child) in children {
            if let Ok(Some(_)) = child.try_wait() {
                continue;
            }
            debug!(snippet = %name, "stopping snippet");
            if let Err(e) = child.kill().await {
                warn!(snippet = %name, error = %e, "cannot stop snippet");
            }
        }
    }
}
