//! Chrome DevTools Protocol browser control for the PPSR runner.
//!
//! The crate is split into layers:
//!
//! - **`cdp`**: WebSocket client with JSON-RPC command/response correlation
//!   and broadcast event fan-out.
//! - **`driver`**: [`BrowserDriver`], navigation, locator-based waits and
//!   input, network-idle detection, screenshots and tracing.
//! - **`locator`**: [`Locator`], element addressing compiled to JavaScript.
//! - **`page`**: the [`Page`] trait the runner is written against, and
//!   [`CdpPage`], its Chrome implementation.
//! - **`launcher`**: [`ChromeLauncher`], spawning a private Chrome per lookup.
//!
//! # Example (conceptual)
//!
//! ```ignore
//! use ppsr_browser::{BrowserLauncher, ChromeLauncher, LaunchOptions, Locator, ClickMode};
//!
//! let mut page = ChromeLauncher.launch(&LaunchOptions::default()).await?;
//! page.goto("https://example.com", Duration::from_secs(10)).await?;
//! page.click(&Locator::css("#login-button"), ClickMode::Pointer).await?;
//! let png = page.screenshot().await?;
//! page.close().await?;
//! ```

pub mod cdp;
pub mod driver;
pub mod error;
pub mod launcher;
pub mod locator;
pub mod page;

pub use cdp::{CdpClient, CdpEvent, CdpHandle};
pub use driver::{BrowserDriver, Key, NetworkTracker, WaitState};
pub use error::BrowserError;
pub use launcher::{BrowserLauncher, BrowserProcess, ChromeLauncher, LaunchOptions};
pub use locator::Locator;
pub use page::{CdpPage, ClickMode, Page};
