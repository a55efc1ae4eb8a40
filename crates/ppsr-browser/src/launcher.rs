//! Launching a private Chrome instance for one lookup.
//!
//! Each launch gets its own throwaway profile directory and an ephemeral
//! remote-debugging port, so concurrent lookups never share browser state.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::process::{Child, Command};

use crate::driver::BrowserDriver;
use crate::error::BrowserError;
use crate::page::{CdpPage, Page};

/// Grace period for Chrome to exit after `Browser.close` before it is killed.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(3);

/// Settings for one browser session.
#[derive(Debug, Clone)]
pub struct LaunchOptions {
    pub headless: bool,
    pub binary_path: Option<PathBuf>,
    /// Delay before every input action.
    pub slow_mo: Duration,
    /// Emulated latency added to every request; zero disables emulation.
    pub network_latency: Duration,
    pub user_agent: Option<String>,
    pub viewport: (u32, u32),
    pub launch_timeout: Duration,
    pub extra_args: Vec<String>,
}

impl Default for LaunchOptions {
    fn default() -> Self {
        Self {
            headless: true,
            binary_path: None,
            slow_mo: Duration::ZERO,
            network_latency: Duration::ZERO,
            user_agent: None,
            viewport: (1280, 800),
            launch_timeout: Duration::from_secs(15),
            extra_args: Vec::new(),
        }
    }
}

/// Opens a fresh page for one lookup.
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self, options: &LaunchOptions) -> Result<Box<dyn Page>, BrowserError>;
}

/// A running Chrome process and the profile directory it owns.
///
/// The child is spawned with `kill_on_drop`, so dropping this without
/// calling [`BrowserProcess::shutdown`] still terminates Chrome.
pub struct BrowserProcess {
    child: Child,
    _profile: TempDir,
}

impl BrowserProcess {
    /// Wait briefly for Chrome to exit, then kill it. The profile is removed.
    pub async fn shutdown(mut self) {
        match tokio::time::timeout(SHUTDOWN_GRACE, self.child.wait()).await {
            Ok(Ok(status)) => tracing::debug!(%status, "browser exited"),
            Ok(Err(e)) => tracing::warn!(error = %e, "failed to wait for browser exit"),
            Err(_) => {
                if let Err(e) = self.child.kill().await {
                    tracing::warn!(error = %e, "failed to kill browser process");
                }
            }
        }
    }
}

/// Launches a local Chrome/Chromium binary.
#[derive(Debug, Default, Clone)]
pub struct ChromeLauncher;

#[async_trait]
impl BrowserLauncher for ChromeLauncher {
    async fn launch(&self, options: &LaunchOptions) -> Result<Box<dyn Page>, BrowserError> {
        let profile = tempfile::Builder::new()
            .prefix("ppsr-profile-")
            .tempdir()
            .map_err(|e| BrowserError::LaunchFailed {
                reason: format!("failed to create profile directory: {e}"),
            })?;
        let port = pick_ephemeral_port()?;
        let args = chrome_args(options, port, profile.path());

        let mut last_error = None;
        let mut child = None;
        for candidate in browser_binary_candidates(options.binary_path.as_deref()) {
            let spawned = Command::new(&candidate)
                .args(&args)
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .kill_on_drop(true)
                .spawn();
            match spawned {
                Ok(proc) => {
                    tracing::info!(binary = %candidate.display(), port, headless = options.headless, "browser launched");
                    child = Some(proc);
                    break;
                }
                Err(e) => last_error = Some(format!("{}: {e}", candidate.display())),
            }
        }
        let child = child.ok_or_else(|| BrowserError::LaunchFailed {
            reason: last_error.unwrap_or_else(|| "no candidates available".to_string()),
        })?;
        // From here on, dropping `process` kills Chrome.
        let process = BrowserProcess {
            child,
            _profile: profile,
        };

        let ws_url = wait_for_page_target(port, options.launch_timeout).await?;
        let driver = BrowserDriver::connect(&ws_url).await?;
        apply_emulation(&driver, options).await?;

        Ok(Box::new(CdpPage::new(driver, options.slow_mo, Some(process))))
    }
}

/// Command-line flags for a private, automation-friendly Chrome.
pub fn chrome_args(options: &LaunchOptions, port: u16, profile_dir: &Path) -> Vec<String> {
    let (width, height) = options.viewport;
    let mut args = vec![
        format!("--remote-debugging-port={port}"),
        "--remote-debugging-address=127.0.0.1".to_string(),
        format!("--user-data-dir={}", profile_dir.display()),
        "--disable-blink-features=AutomationControlled".to_string(),
        "--disable-dev-shm-usage".to_string(),
        "--no-first-run".to_string(),
        "--no-default-browser-check".to_string(),
        format!("--window-size={width},{height}"),
    ];
    if options.headless {
        args.push("--headless=new".to_string());
        args.push("--disable-gpu".to_string());
    }
    args.extend(
        options
            .extra_args
            .iter()
            .filter(|a| !a.trim().is_empty())
            .cloned(),
    );
    args.push("about:blank".to_string());
    args
}

/// Binaries to try, most specific first.
pub fn browser_binary_candidates(configured: Option<&Path>) -> Vec<PathBuf> {
    let mut candidates = Vec::new();
    if let Some(path) = configured.filter(|p| !p.as_os_str().is_empty()) {
        candidates.push(path.to_path_buf());
    }
    if let Ok(env_path) = std::env::var("PPSR_BROWSER_BIN") {
        if !env_path.trim().is_empty() {
            candidates.push(PathBuf::from(env_path));
        }
    }
    #[cfg(target_os = "macos")]
    candidates.extend(
        [
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
        ]
        .iter()
        .map(PathBuf::from),
    );
    candidates.extend(
        [
            "google-chrome",
            "google-chrome-stable",
            "chromium",
            "chromium-browser",
            "chrome",
        ]
        .iter()
        .map(PathBuf::from),
    );
    candidates
}

fn pick_ephemeral_port() -> Result<u16, BrowserError> {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").map_err(|e| BrowserError::LaunchFailed {
        reason: format!("port bind failed: {e}"),
    })?;
    listener
        .local_addr()
        .map(|addr| addr.port())
        .map_err(|e| BrowserError::LaunchFailed {
            reason: format!("port lookup failed: {e}"),
        })
}

/// Poll `/json/list` until Chrome reports a page target.
async fn wait_for_page_target(port: u16, timeout: Duration) -> Result<String, BrowserError> {
    let url = format!("http://127.0.0.1:{port}/json/list");
    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(1))
        .build()
        .map_err(|e| BrowserError::LaunchFailed {
            reason: format!("failed to build HTTP client: {e}"),
        })?;

    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if let Ok(resp) = http.get(&url).send().await {
            if let Ok(targets) = resp.json::<serde_json::Value>().await {
                if let Some(ws) = page_target_ws_url(&targets) {
                    return Ok(ws);
                }
            }
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    Err(BrowserError::LaunchFailed {
        reason: format!("timed out waiting for a page target on {url}"),
    })
}

/// Pick the first page target's WebSocket URL from a `/json/list` response.
pub fn page_target_ws_url(targets: &serde_json::Value) -> Option<String> {
    targets.as_array()?.iter().find_map(|t| {
        if t.get("type")?.as_str()? != "page" {
            return None;
        }
        t.get("webSocketDebuggerUrl")?.as_str().map(str::to_string)
    })
}

async fn apply_emulation(driver: &BrowserDriver, options: &LaunchOptions) -> Result<(), BrowserError> {
    let client = driver.client();
    if let Some(user_agent) = &options.user_agent {
        client
            .send_command(
                "Network.setUserAgentOverride",
                serde_json::json!({ "userAgent": user_agent }),
            )
            .await?;
    }
    let (width, height) = options.viewport;
    client
        .send_command(
            "Emulation.setDeviceMetricsOverride",
            serde_json::json!({
                "width": width,
                "height": height,
                "deviceScaleFactor": 1,
                "mobile": false,
            }),
        )
        .await?;
    if !options.network_latency.is_zero() {
        client
            .send_command(
                "Network.emulateNetworkConditions",
                serde_json::json!({
                    "offline": false,
                    "latency": options.network_latency.as_millis() as u64,
                    "downloadThroughput": -1,
                    "uploadThroughput": -1,
                }),
            )
            .await?;
    }
    Ok(())
}
