//! Test support for the PPSR lookup crates.
//!
//! # Overview
//!
//! - [`ScriptedPage`]: in-memory [`Page`](ppsr_browser::Page) that records
//!   every action and resolves waits instantly
//! - [`ScriptedLauncher`]: launcher handing out a shared scripted page
//! - [`ppsr_site`]: scripted page laid out like the PPSR site
//! - [`MockPpsrSite`]: the same site as real HTML over HTTP, for Chrome runs
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use ppsr_harness::{ppsr_site, ScriptedLauncher};
//! use ppsr_runner::{NoDelay, Runner, SiteProfile};
//!
//! let profile = SiteProfile::default();
//! let launcher = ScriptedLauncher::new(ppsr_site(&profile, "ABC123"));
//! let runner = Runner::new(Arc::new(launcher.clone()), Arc::new(NoDelay), profile);
//! ```

pub mod fixtures;
pub mod mocks;

pub use fixtures::MockPpsrSite;
pub use mocks::{
    ppsr_site, MockElement, PageAction, ScriptedLauncher, ScriptedPage, FAKE_PNG,
    FIRST_SERIAL_ITEM,
};
