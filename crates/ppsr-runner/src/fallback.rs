//! Ordered fallback chains.
//!
//! A step that can be done several ways lists its options as [`Candidate`]s.
//! The first candidate whose [`Probe`] succeeds is chosen, and the step then
//! commits to it: a failing action does not fall through to the next one.

use std::time::Duration;

use ppsr_browser::{Locator, Page, WaitState};

/// Precondition that selects a candidate.
#[derive(Debug, Clone)]
pub enum Probe {
    /// Always matches. Put it last.
    Always,
    /// The element is in the DOM right now.
    Present(Locator),
    /// The element becomes visible within the timeout.
    Visible(Locator, Duration),
}

impl Probe {
    async fn matches(&self, page: &mut dyn Page) -> bool {
        match self {
            Probe::Always => true,
            Probe::Present(locator) => match page.exists(locator).await {
                Ok(found) => found,
                Err(e) => {
                    tracing::debug!(selector = %locator, error = %e, "presence probe failed");
                    false
                }
            },
            Probe::Visible(locator, timeout) => {
                match page.wait_for(locator, WaitState::Visible, *timeout).await {
                    Ok(()) => true,
                    Err(e) => {
                        tracing::debug!(selector = %locator, error = %e, "visibility probe failed");
                        false
                    }
                }
            }
        }
    }
}

/// One way of doing a step.
#[derive(Debug, Clone)]
pub struct Candidate<A> {
    pub label: &'static str,
    pub probe: Probe,
    pub action: A,
}

impl<A> Candidate<A> {
    pub fn new(label: &'static str, probe: Probe, action: A) -> Self {
        Self {
            label,
            probe,
            action,
        }
    }
}

/// Probe candidates in order and return the first that matches.
pub async fn first_match<'a, A>(
    page: &mut dyn Page,
    candidates: &'a [Candidate<A>],
) -> Option<&'a Candidate<A>> {
    for candidate in candidates {
        if candidate.probe.matches(page).await {
            tracing::debug!(candidate = candidate.label, "fallback candidate chosen");
            return Some(candidate);
        }
    }
    None
}
