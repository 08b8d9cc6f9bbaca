//! Command-line configuration.

use clap::Parser;
use std::path::PathBuf;

/// Directory name used under the per-user config directory and the project.
const SNIPPET_DIR: &str = "snippets";

#[derive(Parser, Debug, Clone)]
#[command(
    name = "sertty",
    about = "Relay bytes between a serial port and the terminal, files and snippets",
    version
)]
pub struct Config {
    /// Path to the serial port
    pub device: PathBuf,

    /// Baud rate
    #[arg(default_value_t = 9600)]
    pub baud: u32,

    /// Read the content of PATH and send it to the serial port
    #[arg(long = "read", value_name = "PATH")]
    pub reads: Vec<PathBuf>,

    /// Write anything received from the serial port to PATH
    #[arg(long = "write", value_name = "PATH")]
    pub writes: Vec<PathBuf>,

    /// Search DIR for snippets before the default directories
    #[arg(long = "snippet", value_name = "DIR")]
    pub snippet_dirs: Vec<PathBuf>,

    /// Don't use stdin/stdout
    #[arg(long, overrides_with = "stdio")]
    pub no_stdio: bool,

    /// Revert --no-stdio
    #[arg(long, overrides_with = "no_stdio")]
    pub stdio: bool,

    /// Log debug output to stderr
    #[arg(short, long)]
    pub verbose: bool,
}

impl Config {
    /// Whether stdin/stdout take part in the session.
    pub fn use_stdio(&self) -> bool {
        !self.no_stdio
    }

    /// Ordered snippet search path: explicit directories, then the per-user
    /// config directory, then `./snippets`.
    pub fn snippet_path(&self) -> Vec<PathBuf> {
        let mut path = self.snippet_dirs.clone();
        if let Some(config) = dirs::config_dir() {
            path.push(config.join(env!("CARGO_PKG_NAME")).join(SNIPPET_DIR));
        }
        path.push(PathBuf::from(SNIPPET_DIR));
        path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = Config::try_parse_from(["sertty", "/dev/ttyUSB0"]).unwrap();
        assert_eq!(cfg.device, PathBuf::from("/dev/ttyUSB0"));
        assert_eq!(cfg.baud, 9600);
        assert!(cfg.use_stdio());
        assert!(cfg.reads.is_empty());
        assert!(cfg.writes.is_empty());
    }

    #[test]
    fn test_repeatable_paths() {
        let cfg = Config::try_parse_from([
            "sertty", "/dev/ttyS0", "115200", "--read", "a.fifo", "--read", "b.txt", "--write",
            "log.bin",
        ])
        .unwrap();
        assert_eq!(cfg.baud, 115200);
        assert_eq!(
            cfg.reads,
            vec![PathBuf::from("a.fifo"), PathBuf::from("b.txt")]
        );
        assert_eq!(cfg.writes, vec![PathBuf::from("log.bin")]);
    }

    #[test]
    fn test_stdio_toggle_last_wins() {
        let cfg = Config::try_parse_from(["sertty", "/dev/ttyS0", "--no-stdio"]).unwrap();
        assert!(!cfg.use_stdio());

        let cfg =
            Config::try_parse_from(["sertty", "/dev/ttyS0", "--no-stdio", "--stdio"]).unwrap();
        assert!(cfg.use_stdio());
    }

    #[test]
    fn test_snippet_path_order() {
        let cfg = Config::try_parse_from([
            "sertty", "/dev/ttyS0", "--snippet", "first", "--snippet", "second",
        ])
        .unwrap();
        let path = cfg.snippet_path();
        assert_eq!(path[0], PathBuf::from("first"));
        assert_eq!(path[1], PathBuf::from("second"));
        assert_eq!(path.last(), Some(&PathBuf::from("snippets")));
    }

    #[test]
    fn test_invalid_baud() {
        assert!(Config::try_parse_from(["sertty", "/dev/ttyS0", "fast"]).is_err());
    }
}
