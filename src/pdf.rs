//! PDF handling: temporary upload files and text extraction.
//!
//! Extraction shells out to poppler's `pdftotext` (must be on PATH) under a
//! deadline. An upload lives on disk only as long as its `UploadGuard`.

use std::{
  path::{Path, PathBuf},
  time::Duration,
};

use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::util::normalize_whitespace;

#[derive(Error, Debug)]
pub enum ExtractError {
  #[error("PDF file not found at {0}")]
  Missing(String),
  #[error("PDF file is empty")]
  EmptyFile,
  #[error("could not run pdftotext: {0}")]
  Spawn(String),
  #[error("pdftotext failed: {0}. The PDF may be corrupted or encrypted")]
  Failed(String),
  #[error("text extraction timed out after {0}s")]
  Timeout(u64),
  #[error("no text content found in PDF; this may be a scanned/image-based PDF")]
  NoText,
}

/// Uploaded file on disk. Removed when the guard drops, whatever the outcome.
#[derive(Debug)]
pub struct UploadGuard {
  path: PathBuf,
  removed: bool,
}

impl UploadGuard {
  pub async fn write(dir: &Path, bytes: &[u8]) -> std::io::Result<Self> {
    tokio::fs::create_dir_all(dir).await?;
    let path = dir.join(format!("pdf-{}.pdf", Uuid::new_v4()));
    tokio::fs::write(&path, bytes).await?;
    debug!(target: "generator", path = %path.display(), size = bytes.len(), "Upload stored");
    Ok(Self { path, removed: false })
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  /// Remove the file without blocking the runtime. `Drop` stays as the
  /// fallback for early returns and for a removal that failed here.
  pub async fn remove(mut self) {
    match tokio::fs::remove_file(&self.path).await {
      Ok(()) => {
        debug!(target: "generator", path = %self.path.display(), "Temporary upload removed");
        self.removed = true;
      }
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => self.removed = true,
      Err(e) => warn!(target: "generator", path = %self.path.display(), error = %e, "Failed to remove temporary upload"),
    }
  }
}

impl Drop for UploadGuard {
  fn drop(&mut self) {
    if self.removed {
      return;
    }
    match std::fs::remove_file(&self.path) {
      Ok(()) => debug!(target: "generator", path = %self.path.display(), "Temporary upload removed"),
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
      Err(e) => warn!(target: "generator", path = %self.path.display(), error = %e, "Failed to remove temporary upload"),
    }
  }
}

/// Normalize extracted text; fail if nothing readable is left.
pub fn usable_text(raw: &str) -> Result<String, ExtractError> {
  let text = normalize_whitespace(raw);
  if text.is_empty() {
    return Err(ExtractError::NoText);
  }
  Ok(text)
}

#[instrument(level = "info", skip(path), fields(path = %path.display()))]
pub async fn extract_text(path: &Path, deadline: Duration) -> Result<String, ExtractError> {
  let meta = tokio::fs::metadata(path)
    .await
    .map_err(|_| ExtractError::Missing(path.display().to_string()))?;
  if meta.len() == 0 {
    return Err(ExtractError::EmptyFile);
  }

  let run = Command::new("pdftotext")
    .arg("-enc")
    .arg("UTF-8")
    .arg(path)
    .arg("-")
    .kill_on_drop(true)
    .output();

  let output = tokio::time::timeout(deadline, run)
    .await
    .map_err(|_| ExtractError::Timeout(deadline.as_secs()))?
    .map_err(|e| ExtractError::Spawn(e.to_string()))?;

  if !output.status.success() {
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    return Err(ExtractError::Failed(stderr));
  }

  let text = usable_text(&String::from_utf8_lossy(&output.stdout))?;
  info!(target: "generator", file_size = meta.len(), text_len = text.len(), "Text extracted");
  Ok(text)
}

#[cfg(test)]
mod tests {
  use super::*;

  fn scratch_dir() -> PathBuf {
    std::env::temp_dir().join(format!("quizforge-test-{}", Uuid::new_v4()))
  }

  #[tokio::test]
  async fn guard_removes_file_on_drop() {
    let dir = scratch_dir();
    let guard = UploadGuard::write(&dir, b"%PDF-1.4 fake").await.unwrap();
    let path = guard.path().to_path_buf();
    assert!(path.exists());
    drop(guard);
    assert!(!path.exists());
    let _ = std::fs::remove_dir_all(dir);
  }

  #[tokio::test]
  async fn explicit_remove_deletes_file() {
    let dir = scratch_dir();
    let guard = UploadGuard::write(&dir, b"%PDF-1.4 fake").await.unwrap();
    let path = guard.path().to_path_buf();
    guard.remove().await;
    assert!(!path.exists());

    // Already gone on disk: removal is still clean.
    let guard = UploadGuard::write(&dir, b"%PDF-1.4 fake").await.unwrap();
    std::fs::remove_file(guard.path()).unwrap();
    guard.remove().await;
    let _ = std::fs::remove_dir_all(dir);
  }

  #[test]
  fn whitespace_only_text_is_rejected() {
    assert!(matches!(usable_text(" \n\x0c\t "), Err(ExtractError::NoText)));
    assert_eq!(usable_text("Cells\n\nare  small.").unwrap(), "Cells are small.");
  }

  #[tokio::test]
  async fn missing_and_empty_files_fail_before_running_pdftotext() {
    let dir = scratch_dir();
    let missing = dir.join("nope.pdf");
    assert!(matches!(
      extract_text(&missing, Duration::from_secs(5)).await,
      Err(ExtractError::Missing(_))
    ));

    let guard = UploadGuard::write(&dir, b"").await.unwrap();
    assert!(matches!(
      extract_text(guard.path(), Duration::from_secs(5)).await,
      Err(ExtractError::EmptyFile)
    ));
    drop(guard);
    let _ = std::fs::remove_dir_all(dir);
  }
}
