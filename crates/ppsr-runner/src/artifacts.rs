//! Per-run context and on-disk artifacts.
//!
//! Each run owns `<log_dir>/<request_id>/`, which receives numbered
//! screenshots (`01-initial.png`, `02-after_menu_nav.png`, ...) and the
//! trace archive `trace-<request_id>.json`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use ppsr_browser::Page;
use ppsr_types::{CorrelationId, ServiceConfig};

use crate::error::RunError;

/// Everything a run needs besides the request itself.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub request_id: CorrelationId,
    pub artifact_dir: PathBuf,
    /// Span every log line of the run is emitted under.
    pub span: tracing::Span,
    pub config: Arc<ServiceConfig>,
}

impl RunContext {
    /// Fresh context with a newly generated correlation id.
    pub fn new(config: Arc<ServiceConfig>) -> Self {
        Self::with_id(config, CorrelationId::generate())
    }

    pub fn with_id(config: Arc<ServiceConfig>, request_id: CorrelationId) -> Self {
        let artifact_dir = config.artifact_dir(request_id.as_str());
        let span = tracing::info_span!("lookup", request_id = %request_id);
        Self {
            request_id,
            artifact_dir,
            span,
            config,
        }
    }

    pub fn trace_path(&self) -> PathBuf {
        self.artifact_dir
            .join(format!("trace-{}.json", self.request_id))
    }
}

/// Writes screenshots and the trace archive into a run's directory.
#[derive(Debug)]
pub struct ArtifactWriter {
    dir: PathBuf,
    trace_path: PathBuf,
    seq: u32,
}

impl ArtifactWriter {
    /// Create the run directory.
    pub async fn create(ctx: &RunContext) -> Result<Self, RunError> {
        tokio::fs::create_dir_all(&ctx.artifact_dir)
            .await
            .map_err(|e| RunError::Artifacts {
                path: ctx.artifact_dir.display().to_string(),
                reason: e.to_string(),
            })?;
        Ok(Self {
            dir: ctx.artifact_dir.clone(),
            trace_path: ctx.trace_path(),
            seq: 0,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn trace_path(&self) -> &Path {
        &self.trace_path
    }

    /// Reserve the next numbered file name for a screenshot.
    pub fn next_screenshot_name(&mut self, name: &str) -> String {
        self.seq += 1;
        format!("{:02}-{name}.png", self.seq)
    }

    /// Capture the page and save it. Returns the file name on success.
    ///
    /// Failures are logged and swallowed; a missing screenshot never fails a run.
    pub async fn capture(&mut self, page: &mut dyn Page, name: &str) -> Option<String> {
        let png = match page.screenshot().await {
            Ok(png) => png,
            Err(e) => {
                tracing::warn!(screenshot = name, error = %e, "screenshot capture failed");
                return None;
            }
        };
        let file_name = self.next_screenshot_name(name);
        let path = self.dir.join(&file_name);
        match tokio::fs::write(&path, &png).await {
            Ok(()) => {
                tracing::debug!(path = %path.display(), "screenshot saved");
                Some(file_name)
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "screenshot write failed");
                None
            }
        }
    }

    /// Write the trace archive.
    pub async fn write_trace(&self, trace: &serde_json::Value) -> std::io::Result<()> {
        let body = serde_json::to_vec_pretty(trace)?;
        tokio::fs::write(&self.trace_path, body).await
    }
}
