//! Shared helpers for runner integration tests.
//!
//! Each integration test file compiles common/ as its own module, so not
//! every helper is used in every file.
#![allow(dead_code)]

use std::io;
use std::path::Path;
use std::sync::{Arc, Mutex};

use ppsr_harness::{ppsr_site, ScriptedLauncher, ScriptedPage};
use ppsr_runner::{NoDelay, RunContext, Runner, SiteProfile};
use ppsr_types::{CorrelationId, LookupRequest, ServiceConfig};
use tempfile::TempDir;

pub const PLATE: &str = "ABC123";
pub const VIN: &str = "1HGCM82633A123456";
pub const PASSWORD: &str = "s3cret-pass";

pub fn request() -> LookupRequest {
    LookupRequest {
        username: "test_user".into(),
        password: PASSWORD.into(),
        vin_number: VIN.into(),
        plate_number: None,
    }
}

/// Service config writing artifacts under `log_dir`.
pub fn config_in(log_dir: &Path) -> Arc<ServiceConfig> {
    Arc::new(ServiceConfig {
        log_dir: log_dir.to_path_buf(),
        ..ServiceConfig::default()
    })
}

pub fn context_in(log_dir: &Path, id: &str) -> RunContext {
    RunContext::with_id(config_in(log_dir), CorrelationId::new(id))
}

pub fn runner_for(launcher: &ScriptedLauncher) -> Runner {
    Runner::new(
        Arc::new(launcher.clone()),
        Arc::new(NoDelay),
        SiteProfile::default(),
    )
}

/// A scripted PPSR site with the default profile.
pub fn site() -> ScriptedPage {
    ppsr_site(&SiteProfile::default(), PLATE)
}

pub fn temp_logs() -> TempDir {
    tempfile::tempdir().expect("should create temp log dir")
}

/// Sorted file names in a directory.
pub fn files_in(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .expect("should read artifact dir")
        .map(|entry| {
            entry
                .expect("should read dir entry")
                .file_name()
                .to_string_lossy()
                .into_owned()
        })
        .collect();
    names.sort();
    names
}

/// In-memory log sink for `tracing_subscriber::fmt`.
#[derive(Clone, Default)]
pub struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl LogBuffer {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().expect("log buffer lock poisoned")).into_owned()
    }
}

impl io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0
            .lock()
            .expect("log buffer lock poisoned")
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for LogBuffer {
    type Writer = LogBuffer;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}
