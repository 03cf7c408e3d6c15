//! Release publishing - resolve artifacts and upload them to a release host

use crate::execution::runner::JobEnvironment;
use async_trait::async_trait;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Error types for publishing
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("publishing requires a tag ref, got {0}")]
    NotATag(String),

    #[error("credential variable {0} is not set")]
    MissingCredential(String),

    #[error("invalid artifact pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },

    #[error("no artifacts match {0}")]
    NoArtifacts(String),

    #[error("upload failed: {0}")]
    Upload(String),
}

/// Files to attach to the release of a tag
#[derive(Clone)]
pub struct ReleaseUpload {
    pub tag: String,
    pub files: Vec<PathBuf>,
    pub token: String,
}

impl fmt::Debug for ReleaseUpload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReleaseUpload")
            .field("tag", &self.tag)
            .field("files", &self.files)
            .field("token", &"***")
            .finish()
    }
}

/// Trait for release hosts
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Upload the files to the release for `upload.tag`
    async fn publish(&self, upload: &ReleaseUpload, env: &JobEnvironment)
        -> Result<(), PublishError>;

    /// Whether a pattern matching no files is an error for this publisher
    fn needs_artifacts(&self) -> bool {
        true
    }

    /// Whether an unset token variable is an error for this publisher
    fn needs_credentials(&self) -> bool {
        true
    }
}

/// Expand `pattern` relative to `working_dir`, returning sorted file matches
pub fn resolve_artifacts(pattern: &str, working_dir: &Path) -> Result<Vec<PathBuf>, PublishError> {
    let full_pattern = if Path::new(pattern).is_absolute() {
        pattern.to_string()
    } else {
        working_dir.join(pattern).to_string_lossy().into_owned()
    };

    let mut files: Vec<PathBuf> = glob::glob(&full_pattern)
        .map_err(|e| PublishError::InvalidPattern {
            pattern: pattern.to_string(),
            message: e.to_string(),
        })?
        .filter_map(|entry| entry.ok())
        .filter(|p| p.is_file())
        .collect();

    if files.is_empty() {
        return Err(PublishError::NoArtifacts(pattern.to_string()));
    }

    files.sort();
    debug!("Resolved '{}' to {} file(s)", pattern, files.len());
    Ok(files)
}

/// Uploads through the GitHub CLI
#[derive(Debug, Clone)]
pub struct GhReleasePublisher {
    gh_path: String,
}

impl GhReleasePublisher {
    pub fn new(gh_path: impl Into<String>) -> Self {
        Self {
            gh_path: gh_path.into(),
        }
    }

    async fn gh(
        &self,
        args: &[String],
        upload: &ReleaseUpload,
        env: &JobEnvironment,
    ) -> Result<std::process::Output, PublishError> {
        Command::new(&self.gh_path)
            .args(args)
            .current_dir(&env.working_dir)
            .env("GH_TOKEN", &upload.token)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| PublishError::Upload(format!("failed to run {}: {}", self.gh_path, e)))
    }
}

impl Default for GhReleasePublisher {
    fn default() -> Self {
        Self::new("gh")
    }
}

#[async_trait]
impl Publisher for GhReleasePublisher {
    async fn publish(
        &self,
        upload: &ReleaseUpload,
        env: &JobEnvironment,
    ) -> Result<(), PublishError> {
        let tag = upload.tag.clone();

        let view = self
            .gh(&["release".into(), "view".into(), tag.clone()], upload, env)
            .await?;
        if !view.status.success() {
            info!("[{}] creating release {}", env.label, tag);
            let create = self
                .gh(
                    &[
                        "release".into(),
                        "create".into(),
                        tag.clone(),
                        "--title".into(),
                        tag.clone(),
                        "--notes".into(),
                        String::new(),
                    ],
                    upload,
                    env,
                )
                .await?;
            // Another instance may have created it concurrently; upload decides
            if !create.status.success() {
                warn!(
                    "[{}] gh release create {} failed: {}",
                    env.label,
                    tag,
                    String::from_utf8_lossy(&create.stderr).trim()
                );
            }
        }

        let mut args: Vec<String> = vec!["release".into(), "upload".into(), tag.clone()];
        args.extend(upload.files.iter().map(|f| f.to_string_lossy().into_owned()));
        args.push("--clobber".into());

        let output = self.gh(&args, upload, env).await?;
        if !output.status.success() {
            return Err(PublishError::Upload(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }

        info!("[{}] uploaded {} file(s) to {}", env.label, upload.files.len(), tag);
        Ok(())
    }
}

/// Records uploads instead of performing them
#[derive(Debug, Default)]
pub struct DryRunPublisher {
    uploads: Mutex<Vec<(String, String, Vec<PathBuf>)>>,
}

impl DryRunPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Uploads seen so far, as `(environment, tag, files)`
    pub fn uploads(&self) -> Vec<(String, String, Vec<PathBuf>)> {
        self.uploads
            .lock()
            .map(|u| u.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Publisher for DryRunPublisher {
    async fn publish(
        &self,
        upload: &ReleaseUpload,
        env: &JobEnvironment,
    ) -> Result<(), PublishError> {
        info!(
            "[{}] (dry run) would upload {} file(s) to {}",
            env.label,
            upload.files.len(),
            upload.tag
        );
        if let Ok(mut uploads) = self.uploads.lock() {
            uploads.push((env.label.clone(), upload.tag.clone(), upload.files.clone()));
        }
        Ok(())
    }

    // Nothing was built in a dry run
    fn needs_artifacts(&self) -> bool {
        false
    }

    fn needs_credentials(&self) -> bool {
        false
    }
}
