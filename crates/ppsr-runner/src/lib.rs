//! Scripted PPSR lookup.
//!
//! [`Runner`] drives one browser page through the PPSR transact site: log in,
//! open the serial-number search, submit a VIN and read the registration
//! plate. It is written against the [`ppsr_browser::Page`] trait, so the same
//! script runs over Chrome in production and over scripted pages in tests.
//!
//! Supporting modules:
//! - `profile`: selectors, timeouts and pause ranges for the site
//! - `pacing`: human-like delays, injectable for tests
//! - `fallback`: ordered candidate chains for steps with alternatives
//! - `artifacts`: run context, numbered screenshots and the trace archive
//! - `journal`: per-step outcome records

pub mod artifacts;
pub mod error;
pub mod fallback;
pub mod journal;
pub mod pacing;
pub mod profile;
pub mod runner;

pub use artifacts::{ArtifactWriter, RunContext};
pub use error::RunError;
pub use fallback::{first_match, Candidate, Probe};
pub use journal::{StepJournal, StepOutcome, StepRecord};
pub use pacing::{pause, DelayPolicy, HumanDelay, NoDelay, PauseRange};
pub use profile::{Pauses, SiteProfile, Timeouts};
pub use runner::{launch_options, LookupOutcome, Runner, STEPS};
