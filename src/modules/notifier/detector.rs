use std::io;
use std::path::PathBuf;

use tracing::debug;

use crate::error::ModuleError;

/// Detects one kind of event.
pub trait Detector: Send {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Polls once. `Some(message)` when the event happened.
    ///
    /// Keeps reporting the same event until it is acknowledged.
    fn detect(&mut self) -> io::Result<Option<String>>;

    /// Called after the detected event was delivered.
    fn acknowledge(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Never fires.
#[derive(Debug, Default)]
pub struct NullDetector;

impl Detector for NullDetector {
    fn name(&self) -> &str {
        "null"
    }

    fn detect(&mut self) -> io::Result<Option<String>> {
        Ok(None)
    }
}

/// Fires while a trigger file exists; the message is its content.
///
/// Acknowledging removes the file, so each delivered creation fires once.
#[derive(Debug)]
pub struct FileDetector {
    path: PathBuf,
}

impl FileDetector {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Detector for FileDetector {
    fn name(&self) -> &str {
        "file"
    }

    fn detect(&mut self) -> io::Result<Option<String>> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err),
        };
        Ok(Some(content.trim().to_string()))
    }

    fn acknowledge(&mut self) -> io::Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                debug!(path = %self.path.display(), "trigger file consumed");
                Ok(())
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err),
        }
    }
}

/// Resolves `null` or `file:<path>`.
pub fn detector_from_arg(arg: &str) -> Result<Box<dyn Detector>, ModuleError> {
    match arg {
        "null" => Ok(Box::new(NullDetector)),
        _ => match arg.strip_prefix("file:") {
            Some(path) if !path.is_empty() => Ok(Box::new(FileDetector::new(path))),
            _ => Err(ModuleError::rejected(format!("unknown detector: {arg}"))),
        },
    }
}
