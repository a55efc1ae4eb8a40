use ppsr_browser::BrowserError;

/// Errors from one lookup run.
///
/// Only the fatal subset ends a run early; the rest are recorded in the
/// step journal and the script moves on.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("failed to load page: {0}")]
    PageLoad(String),

    #[error("{field} not found: {reason}")]
    ElementNotFound { field: &'static str, reason: String },

    #[error("menu navigation failed: {0}")]
    Navigation(String),

    #[error("could not extract plate number: {0}")]
    Extraction(String),

    #[error("browser launch failed: {0}")]
    Launch(String),

    #[error("artifact directory {path} unavailable: {reason}")]
    Artifacts { path: String, reason: String },

    #[error(transparent)]
    Browser(#[from] BrowserError),
}

impl RunError {
    /// Whether this error aborts the run.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, RunError::Navigation(_) | RunError::Extraction(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_failures_are_not_fatal() {
        assert!(!RunError::Navigation("menu hidden".into()).is_fatal());
        assert!(!RunError::Extraction("no plate".into()).is_fatal());
        assert!(RunError::PageLoad("timeout".into()).is_fatal());
        assert!(RunError::ElementNotFound {
            field: "login form",
            reason: "timed out".into()
        }
        .is_fatal());
        assert!(RunError::Launch("no chrome".into()).is_fatal());
    }

    #[test]
    fn messages_name_the_field() {
        let err = RunError::ElementNotFound {
            field: "password field",
            reason: "no match".into(),
        };
        assert_eq!(err.to_string(), "password field not found: no match");
    }

    #[test]
    fn browser_errors_convert() {
        let err: RunError = BrowserError::PageLoadTimeout {
            duration: std::time::Duration::from_secs(10),
        }
        .into();
        assert!(matches!(err, RunError::Browser(_)));
        assert!(err.is_fatal());
    }
}
