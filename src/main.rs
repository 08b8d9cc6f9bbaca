use anyhow::{Context, Result};
use clap::Parser;
use sertty::source::{Origin, Sink, SourceKind};
use sertty::terminal::RawMode;
use sertty::{Config, Engine, Exit, SnippetRunner, logging, serial};
use std::process::ExitCode;
use tracing::{debug, error, info};

fn main() -> ExitCode {
    let config = Config::parse();
    logging::init(config.verbose);

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to start runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    let result = runtime.block_on(run(config));
    // A blocking stdin read may still be parked on the runtime's thread pool.
    runtime.shutdown_background();

    match result {
        Ok(exit) => {
            debug!(?exit, "bye");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: Config) -> Result<Exit> {
    let mut outputs = Vec::new();
    for path in &config.writes {
        info!("> {}", path.display());
        outputs.push(
            Sink::create(path)
                .with_context(|| format!("Failed to create {}", path.display()))?,
        );
    }

    let mut inputs = Vec::new();
    for path in &config.reads {
        info!("< {}", path.display());
        let origin =
            Origin::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
        inputs.push((path.display().to_string(), origin));
    }

    let device = config.device.display().to_string();
    let port = serial::open(&config.device, config.baud)?;
    let reader = port
        .try_clone()
        .with_context(|| format!("Failed to duplicate handle for {device}"))?;
    info!("Opened {device}, {} baud.", config.baud);

    let runner = SnippetRunner::new(config.snippet_path());
    debug!(path = ?runner.search_path(), "snippet search path");
    let mut engine = Engine::new(Sink::new(device.clone(), port), runner);
    for sink in outputs {
        engine.add_output(sink);
    }
    engine.watch(
        SourceKind::Serial,
        device,
        Origin::Reader(Box::new(tokio::fs::File::from_std(reader))),
    );
    for (name, origin) in inputs {
        engine.watch(SourceKind::File, name, origin);
    }

    // Held until the session ends so the terminal is restored on every path.
    let _raw = if config.use_stdio() {
        engine.add_output(Sink::stdout());
        engine.watch(
            SourceKind::Interactive,
            "stdin",
            Origin::Reader(Box::new(tokio::io::stdin())),
        );
        let raw = RawMode::enable().context("Failed to put the terminal in raw mode")?;
        if raw.is_some() {
            info!("Hit 'Ctrl-A q' to exit.");
        }
        raw
    } else {
        None
    };

    Ok(engine.run().await?)
}
