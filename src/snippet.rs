//! Snippet lookup and launch.
//!
//! A snippet is a file found by name on an ordered search path. Executable
//! snippets run as child processes whose stdout becomes a source; any other
//! file is streamed as-is.

use crate::error::SnippetError;
use crate::source::Reader;
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::{Child, Command};
use tracing::debug;

/// A started snippet.
///
/// `output` is handed to the engine as a source; `child` stays with the
/// engine so it can be reaped once the output closes.
pub struct Snippet {
    pub name: String,
    pub path: PathBuf,
    pub output: Reader,
    pub child: Option<Child>,
}

#[derive(Debug, Clone)]
pub struct SnippetRunner {
    search_path: Vec<PathBuf>,
}

impl SnippetRunner {
    pub fn new(search_path: Vec<PathBuf>) -> Self {
        Self { search_path }
    }

    pub fn search_path(&self) -> &[PathBuf] {
        &self.search_path
    }

    /// Find `name` in the search path. The first directory holding a regular
    /// file of that name wins.
    ///
    /// Names are plain file names; anything with a path separator is never
    /// found, so a snippet cannot reach outside its directories.
    pub fn resolve(&self, name: &str) -> Result<PathBuf, SnippetError> {
        let not_found = || SnippetError::NotFound {
            name: name.to_string(),
        };
        if name.is_empty() || name == "." || name == ".." || name.contains('/') {
            return Err(not_found());
        }

        self.search_path
            .iter()
            .map(|dir| dir.join(name))
            .find(|candidate| candidate.is_file())
            .ok_or_else(not_found)
    }

    /// Resolve and start `name` with `args`.
    ///
    /// The child's stdin is closed and its stderr goes straight to ours; only
    /// stdout is captured.
    pub fn invoke(&self, name: &str, args: &[String]) -> Result<Snippet, SnippetError> {
        let path = self.resolve(name)?;
        let spawn_err = |source: io::Error| SnippetError::Spawn {
            path: path.clone(),
            source,
        };

        if is_executable(&path) {
            debug!(snippet = %path.display(), ?args, "spawning snippet");
            let mut child = Command::new(&path)
                .args(args)
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::inherit())
                .kill_on_drop(true)
                .spawn()
                .map_err(spawn_err)?;
            let stdout = child
                .stdout
                .take()
                .ok_or_else(|| spawn_err(io::Error::other("stdout was not captured")))?;

            Ok(Snippet {
                name: name.to_string(),
                path: path.clone(),
                output: Box::new(stdout),
                child: Some(child),
            })
        } else {
            debug!(snippet = %path.display(), "streaming static snippet");
            let file = std::fs::File::open(&path).map_err(spawn_err)?;

            Ok(Snippet {
                name: name.to_string(),
                path: path.clone(),
                output: Box::new(tokio::fs::File::from_std(file)),
                child: None,
            })
        }
    }
}

fn is_executable(path: &Path) -> bool {
    path.metadata()
        .map(|meta| meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tokio::io::AsyncReadExt;

    fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, body).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[test]
    fn test_resolve_first_match_wins() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        fs::write(second.path().join("boot"), "second").unwrap();
        fs::write(first.path().join("boot"), "first").unwrap();
        fs::write(second.path().join("only"), "x").unwrap();

        let runner =
            SnippetRunner::new(vec![first.path().to_path_buf(), second.path().to_path_buf()]);
        assert_eq!(runner.resolve("boot").unwrap(), first.path().join("boot"));
        assert_eq!(runner.resolve("only").unwrap(), second.path().join("only"));
    }

    #[test]
    fn test_resolve_skips_missing_dirs_and_subdirs() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("boot")).unwrap();

        let runner = SnippetRunner::new(vec![
            PathBuf::from("/nonexistent/sertty"),
            dir.path().to_path_buf(),
        ]);
        assert!(matches!(
            runner.resolve("boot"),
            Err(SnippetError::NotFound { .. })
        ));
    }

    #[test]
    fn test_resolve_rejects_paths() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("sub").join("x"), "x").unwrap();

        let runner = SnippetRunner::new(vec![dir.path().to_path_buf()]);
        assert!(runner.resolve("sub/x").is_err());
        assert!(runner.resolve("").is_err());
        assert!(runner.resolve("..").is_err());
    }

    #[tokio::test]
    async fn test_invoke_executable_captures_stdout() {
        let dir = tempfile::tempdir().unwrap();
        write_script(dir.path(), "greet", "#!/bin/sh\necho \"hi $1\"\n");

        let runner = SnippetRunner::new(vec![dir.path().to_path_buf()]);
        let mut snippet = runner.invoke("greet", &["there".to_string()]).unwrap();
        assert!(snippet.child.is_some());

        let mut out = Vec::new();
        snippet.output.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"hi there\n");

        let status = snippet.child.unwrap().wait().await.unwrap();
        assert!(status.success());
    }

    #[tokio::test]
    async fn test_invoke_static_file_streams_content() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("banner"), "AT+RESET\r\n").unwrap();

        let runner = SnippetRunner::new(vec![dir.path().to_path_buf()]);
        let mut snippet = runner.invoke("banner", &[]).unwrap();
        assert!(snippet.child.is_none());

        let mut out = Vec::new();
        snippet.output.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"AT+RESET\r\n");
    }

    #[tokio::test]
    async fn test_invoke_unrunnable_executable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken");
        fs::write(&path, [0u8, 1, 2, 3]).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();

        let runner = SnippetRunner::new(vec![dir.path().to_path_buf()]);
        match runner.invoke("broken", &[]) {
            Err(SnippetError::Spawn { path: p, .. }) => assert_eq!(p, path),
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("binary garbage should not run"),
        }
    }

    #[tokio::test]
    async fn test_invoke_missing() {
        let runner = SnippetRunner::new(vec![]);
        assert!(matches!(
            runner.invoke("nope", &[]),
            Err(SnippetError::NotFound { name }) if name == "nope"
        ));
    }
}
