//! Wrappers around the external `exiftool` binary.
//!
//! Two access patterns: one-shot invocations for reading a handful of
//! tags, and a persistent `-stay_open` session for batches of write
//! commands, which amortizes perl startup across the whole batch.

use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

use serde::Deserialize;

use crate::error::{StageError, StageResult};

/// Capture date tags as exiftool reports them.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct DateTags {
    #[serde(rename = "DateTimeOriginal")]
    pub date_time_original: Option<String>,
    #[serde(rename = "CreateDate")]
    pub create_date: Option<String>,
}

impl DateTags {
    /// The date used for audit comparison, preferring DateTimeOriginal.
    pub fn effective(&self) -> Option<&str> {
        self.date_time_original
            .as_deref()
            .or(self.create_date.as_deref())
    }
}

/// One-shot tag reads.
pub struct ExifTool {
    bin: String,
}

impl ExifTool {
    pub fn new(bin: &str) -> Self {
        Self {
            bin: bin.to_string(),
        }
    }

    /// Read the capture date tags of one file.
    ///
    /// Errors mean the tool failed to run or produced unparseable output;
    /// a file that simply has no date tags returns an empty `DateTags`.
    pub fn read_date_tags(&self, path: &Path) -> StageResult<DateTags> {
        let output = Command::new(&self.bin)
            .arg("-j")
            .arg("-DateTimeOriginal")
            .arg("-CreateDate")
            .arg(path)
            .output()
            .map_err(|e| StageError::Audit {
                path: path.to_path_buf(),
                message: format!("failed to run {}: {}", self.bin, e),
            })?;

        if !output.status.success() {
            return Err(StageError::Audit {
                path: path.to_path_buf(),
                message: format!(
                    "{} exited with {}: {}",
                    self.bin,
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }

        parse_date_json(&String::from_utf8_lossy(&output.stdout)).ok_or_else(|| {
            StageError::Audit {
                path: path.to_path_buf(),
                message: "unparseable exiftool output".to_string(),
            }
        })
    }
}

/// Parse `exiftool -j` output, a JSON array with one object per file.
fn parse_date_json(stdout: &str) -> Option<DateTags> {
    let mut entries: Vec<DateTags> = serde_json::from_str(stdout).ok()?;
    if entries.is_empty() {
        return None;
    }
    Some(entries.remove(0))
}

/// Build the stdin frame for one command in a `-stay_open` session.
///
/// Arguments go one per line, terminated by `-execute`; exiftool answers
/// on stdout with the command output followed by a `{ready}` line.
fn frame_command(args: &[&str]) -> String {
    let mut frame = String::new();
    for arg in args {
        frame.push_str(arg);
        frame.push('\n');
    }
    frame.push_str("-execute\n");
    frame
}

/// Scan a command response for exiftool error lines.
fn response_error(response: &str) -> Option<String> {
    response
        .lines()
        .find(|line| line.trim_start().starts_with("Error"))
        .map(|line| line.trim().to_string())
}

/// A persistent `exiftool -stay_open` session.
///
/// All writes in a propagation batch go through one session; if the
/// session dies mid-batch the whole batch fails and the caller falls
/// back to advising a re-run.
pub struct ExifToolSession {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

impl ExifToolSession {
    pub fn spawn(bin: &str) -> StageResult<Self> {
        let mut child = Command::new(bin)
            .arg("-stay_open")
            .arg("True")
            .arg("-@")
            .arg("-")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| StageError::Propagate {
                message: format!("failed to start {}: {}", bin, e),
            })?;

        let stdin = child.stdin.take().ok_or_else(|| StageError::Propagate {
            message: "exiftool stdin unavailable".to_string(),
        })?;
        let stdout = child.stdout.take().ok_or_else(|| StageError::Propagate {
            message: "exiftool stdout unavailable".to_string(),
        })?;

        Ok(Self {
            child,
            stdin,
            stdout: BufReader::new(stdout),
        })
    }

    /// Copy every tag from the source file onto the artifact, in place.
    pub fn copy_tags(&mut self, source: &Path, artifact: &Path) -> StageResult<()> {
        let source_str = source.to_string_lossy();
        let artifact_str = artifact.to_string_lossy();
        self.execute(
            artifact,
            &[
                "-TagsFromFile",
                &source_str,
                "-all:all",
                "-overwrite_original",
                &artifact_str,
            ],
        )
    }

    /// Clear the capture date tags of an artifact whose source has none.
    pub fn clear_date_tags(&mut self, artifact: &Path) -> StageResult<()> {
        let artifact_str = artifact.to_string_lossy();
        self.execute(
            artifact,
            &[
                "-DateTimeOriginal=",
                "-CreateDate=",
                "-ModifyDate=",
                "-overwrite_original",
                &artifact_str,
            ],
        )
    }

    fn execute(&mut self, subject: &Path, args: &[&str]) -> StageResult<()> {
        let frame = frame_command(args);
        self.stdin
            .write_all(frame.as_bytes())
            .and_then(|_| self.stdin.flush())
            .map_err(|e| StageError::Propagate {
                message: format!(
                    "session write failed for {}: {}",
                    subject.display(),
                    e
                ),
            })?;

        let response = self.read_response(subject)?;
        if let Some(error) = response_error(&response) {
            return Err(StageError::Propagate {
                message: format!("{} ({})", error, subject.display()),
            });
        }
        Ok(())
    }

    /// Read stdout up to (and consuming) the `{ready}` marker.
    fn read_response(&mut self, subject: &Path) -> StageResult<String> {
        let mut response = String::new();
        loop {
            let mut line = String::new();
            let n = self
                .stdout
                .read_line(&mut line)
                .map_err(|e| StageError::Propagate {
                    message: format!(
                        "session read failed for {}: {}",
                        subject.display(),
                        e
                    ),
                })?;
            if n == 0 {
                return Err(StageError::Propagate {
                    message: format!(
                        "session closed unexpectedly while processing {}",
                        subject.display()
                    ),
                });
            }
            if line.trim_end().starts_with("{ready") {
                return Ok(response);
            }
            response.push_str(&line);
        }
    }

    /// Ask the session to exit and reap the child.
    pub fn close(mut self) {
        let _ = self.stdin.write_all(b"-stay_open\nFalse\n");
        let _ = self.stdin.flush();
        let _ = self.child.wait();
    }
}

impl Drop for ExifToolSession {
    fn drop(&mut self) {
        let _ = self.stdin.write_all(b"-stay_open\nFalse\n");
        let _ = self.stdin.flush();
        let _ = self.child.wait();
    }
}
