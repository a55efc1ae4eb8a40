//! The lookup script: log in, open the serial-number search, submit the VIN
//! and read back the registration plate.
//!
//! Steps run strictly in order. Page load, the login form and the credential
//! fields are fatal; every later step logs its failure, takes a diagnostic
//! screenshot and lets the script continue. Whatever happens, the run ends
//! with a final screenshot, the trace archive and a closed browser.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use ppsr_browser::{
    BrowserError, BrowserLauncher, ClickMode, Key, LaunchOptions, Locator, Page, WaitState,
};
use ppsr_types::{mask_identifier, BrowserConfig, LookupRequest};
use tracing::Instrument;

use crate::artifacts::{ArtifactWriter, RunContext};
use crate::error::RunError;
use crate::fallback::{first_match, Candidate, Probe};
use crate::journal::{StepJournal, StepOutcome, StepRecord};
use crate::pacing::{pause, DelayPolicy, PauseRange};
use crate::profile::SiteProfile;

/// Script steps in execution order, as named in the journal.
pub const STEPS: [&str; 9] = [
    "open",
    "login_form",
    "credentials",
    "declaration",
    "login",
    "menu",
    "vin",
    "search",
    "extract",
];

/// What a finished run produced.
#[derive(Debug, Clone)]
pub struct LookupOutcome {
    /// `None` when extraction failed or the field was empty.
    pub plate_number: Option<String>,
    pub artifact_dir: PathBuf,
    pub trace_path: PathBuf,
    pub steps: Vec<StepRecord>,
}

/// Runs lookups, one fresh browser per call.
pub struct Runner {
    launcher: Arc<dyn BrowserLauncher>,
    delay: Arc<dyn DelayPolicy>,
    profile: SiteProfile,
}

impl Runner {
    pub fn new(
        launcher: Arc<dyn BrowserLauncher>,
        delay: Arc<dyn DelayPolicy>,
        profile: SiteProfile,
    ) -> Self {
        Self {
            launcher,
            delay,
            profile,
        }
    }

    /// Run one lookup under the context's span.
    ///
    /// Returns `Err` only for fatal failures. Artifacts written before the
    /// failure stay on disk.
    pub async fn run(
        &self,
        request: &LookupRequest,
        ctx: &RunContext,
    ) -> Result<LookupOutcome, RunError> {
        self.run_in_span(request, ctx)
            .instrument(ctx.span.clone())
            .await
    }

    async fn run_in_span(
        &self,
        request: &LookupRequest,
        ctx: &RunContext,
    ) -> Result<LookupOutcome, RunError> {
        tracing::info!(
            user = %request.username,
            vin = %mask_identifier(&request.vin_number),
            plate_hint = request.plate_number.as_deref().unwrap_or_default(),
            "start run"
        );
        let artifacts = ArtifactWriter::create(ctx).await?;
        tracing::info!(logs_dir = %artifacts.dir().display(), "artifact directory ready");

        let options = launch_options(&ctx.config.browser);
        tracing::info!(headless = options.headless, "launching browser");
        let page = self
            .launcher
            .launch(&options)
            .await
            .map_err(|e| RunError::Launch(e.to_string()))?;

        let mut session = Session {
            page,
            profile: &self.profile,
            delay: self.delay.as_ref(),
            artifacts,
            journal: StepJournal::new(),
        };
        if let Err(e) = session.page.start_tracing().await {
            tracing::warn!(error = %e, "tracing unavailable for this run");
        }

        let result = session.script(request).await;
        if result.is_ok() {
            pause(session.delay, self.profile.pauses.before_finish).await;
        } else {
            session.skip_remaining();
        }
        let (artifacts, journal) = session.finish(ctx.request_id.as_str()).await;

        match result {
            Ok(plate_number) => {
                tracing::info!(plate = plate_number.as_deref().unwrap_or_default(), "run completed");
                Ok(LookupOutcome {
                    plate_number,
                    artifact_dir: artifacts.dir().to_path_buf(),
                    trace_path: artifacts.trace_path().to_path_buf(),
                    steps: journal.into_records(),
                })
            }
            Err(e) => {
                tracing::error!(error = %e, "run failed");
                Err(e)
            }
        }
    }
}

/// Map service configuration onto launcher options.
pub fn launch_options(config: &BrowserConfig) -> LaunchOptions {
    LaunchOptions {
        headless: config.headless,
        binary_path: config.binary_path.clone(),
        slow_mo: Duration::from_millis(config.slow_mo_ms),
        network_latency: Duration::from_millis(config.network_latency_ms),
        user_agent: Some(config.user_agent.trim())
            .filter(|ua| !ua.is_empty())
            .map(str::to_string),
        viewport: (config.viewport_width, config.viewport_height),
        launch_timeout: Duration::from_secs(config.launch_timeout_secs),
        extra_args: config.extra_args.clone(),
    }
}

#[derive(Debug, Clone)]
enum LoginAction {
    Explicit(Locator),
    Generic(Locator),
    EnterKey,
}

/// Where the plate is waited for and where it is read from.
#[derive(Debug, Clone)]
struct PlateSource {
    wait: Locator,
    read: Locator,
}

/// State of one run while the page is open.
struct Session<'a> {
    page: Box<dyn Page>,
    profile: &'a SiteProfile,
    delay: &'a dyn DelayPolicy,
    artifacts: ArtifactWriter,
    journal: StepJournal,
}

impl Session<'_> {
    async fn script(&mut self, request: &LookupRequest) -> Result<Option<String>, RunError> {
        self.open().await?;
        self.wait_for_login_form().await?;
        self.enter_credentials(request).await?;
        self.tick_declaration().await;
        self.submit_login().await;
        self.navigate_menu().await;
        self.enter_vin(&request.vin_number).await;
        self.search().await;
        Ok(self.extract_plate().await)
    }

    /// Record a step, capturing the checkpoint or diagnostic screenshot.
    async fn conclude<E: fmt::Display>(
        &mut self,
        step: &'static str,
        started: Instant,
        result: &Result<(), E>,
        checkpoint: Option<&str>,
        failure_shot: Option<&str>,
    ) {
        let (outcome, detail, shot) = match result {
            Ok(()) => (StepOutcome::Ok, None, checkpoint),
            Err(e) => (StepOutcome::Failed, Some(e.to_string()), failure_shot),
        };
        let screenshot = match shot {
            Some(name) => self.artifacts.capture(self.page.as_mut(), name).await,
            None => None,
        };
        self.journal
            .record(step, outcome, detail, screenshot, started.elapsed());
    }

    fn skip_remaining(&mut self) {
        for step in STEPS {
            if self.journal.outcome_of(step).is_none() {
                self.journal
                    .record(step, StepOutcome::Skipped, None, None, Duration::ZERO);
            }
        }
    }

    async fn open(&mut self) -> Result<(), RunError> {
        let started = Instant::now();
        let p = self.profile;
        tracing::info!(url = %p.target_url, "opening target");
        let result = self
            .page
            .goto(&p.target_url, p.timeouts.page_load)
            .await
            .map_err(|e| RunError::PageLoad(e.to_string()));
        self.conclude("open", started, &result, Some("initial"), None)
            .await;
        if result.is_ok() {
            tracing::info!("page loaded");
            pause(self.delay, p.pauses.after_open).await;
        }
        result
    }

    async fn wait_for_login_form(&mut self) -> Result<(), RunError> {
        let started = Instant::now();
        let result = self
            .page
            .wait_for(
                &self.profile.login_form(),
                WaitState::Visible,
                self.profile.timeouts.login_form,
            )
            .await
            .map_err(|e| RunError::ElementNotFound {
                field: "login form",
                reason: e.to_string(),
            });
        self.conclude("login_form", started, &result, None, Some("form_not_found"))
            .await;
        if result.is_ok() {
            tracing::info!("login form detected");
        }
        result
    }

    async fn enter_credentials(&mut self, request: &LookupRequest) -> Result<(), RunError> {
        let started = Instant::now();
        let result = self.type_credentials(request).await;
        self.conclude("credentials", started, &result, None, Some("credentials_error"))
            .await;
        if result.is_ok() {
            tracing::info!(user = %request.username, "credentials entered");
        }
        result
    }

    async fn type_credentials(&mut self, request: &LookupRequest) -> Result<(), RunError> {
        let p = self.profile;
        let fields = [
            ("username field", p.username_input(), request.username.as_str()),
            ("password field", p.password_input(), request.password.as_str()),
        ];
        for (field, locator, value) in fields {
            if !self.page.exists(&locator).await? {
                return Err(RunError::ElementNotFound {
                    field,
                    reason: format!("nothing matches {locator}"),
                });
            }
            self.type_like_human(&locator, value, p.pauses.credential_keystroke)
                .await?;
            pause(self.delay, p.pauses.after_field).await;
        }
        Ok(())
    }

    /// Click, clear, then type one character at a time.
    async fn type_like_human(
        &mut self,
        locator: &Locator,
        text: &str,
        keystroke: PauseRange,
    ) -> Result<(), BrowserError> {
        self.page.click(locator, ClickMode::Pointer).await?;
        if let Err(e) = self.page.clear(locator).await {
            tracing::debug!(selector = %locator, error = %e, "clear failed, selecting and deleting");
            let cleared = match self.page.press_key(Key::SelectAll).await {
                Ok(()) => self.page.press_key(Key::Backspace).await,
                Err(e) => Err(e),
            };
            if let Err(e) = cleared {
                tracing::debug!(selector = %locator, error = %e, "field left uncleared");
            }
        }
        for ch in text.chars() {
            self.page.type_char(ch).await?;
            pause(self.delay, keystroke).await;
        }
        pause(self.delay, self.profile.pauses.after_typing).await;
        Ok(())
    }

    /// Wait for a checkbox and check it unless it already is.
    async fn ensure_checked(
        &mut self,
        checkbox: &Locator,
        timeout: Duration,
        label: &'static str,
    ) -> Result<(), BrowserError> {
        self.page
            .wait_for(checkbox, WaitState::Visible, timeout)
            .await?;
        if self.page.is_checked(checkbox).await? {
            tracing::info!(checkbox = label, "already checked");
        } else {
            self.page.check(checkbox).await?;
            tracing::info!(checkbox = label, "checked");
        }
        Ok(())
    }

    async fn tick_declaration(&mut self) {
        let started = Instant::now();
        let p = self.profile;
        let result = self
            .ensure_checked(&p.declaration_checkbox(), p.timeouts.declaration, "declaration")
            .await;
        if let Err(e) = &result {
            tracing::warn!(error = %e, "declaration checkbox not found or not clickable");
        }
        self.conclude("declaration", started, &result, None, Some("checkbox_error"))
            .await;
        pause(self.delay, p.pauses.after_declaration).await;
    }

    async fn submit_login(&mut self) {
        let started = Instant::now();
        let p = self.profile;
        let candidates = [
            Candidate::new(
                "explicit login button",
                Probe::Visible(p.login_button(), p.timeouts.login_button),
                LoginAction::Explicit(p.login_button()),
            ),
            Candidate::new(
                "generic submit",
                Probe::Present(p.generic_submit()),
                LoginAction::Generic(p.generic_submit()),
            ),
            Candidate::new("enter key", Probe::Always, LoginAction::EnterKey),
        ];
        let result = match first_match(self.page.as_mut(), &candidates).await {
            Some(candidate) => {
                tracing::info!(via = candidate.label, "submitting login");
                self.perform_login(&candidate.action).await
            }
            None => Ok(()),
        };
        if let Err(e) = &result {
            tracing::error!(error = %e, "login submission failed");
        }
        self.conclude("login", started, &result, None, Some("login_error"))
            .await;
        pause(self.delay, p.pauses.after_login).await;
    }

    async fn perform_login(&mut self, action: &LoginAction) -> Result<(), BrowserError> {
        match action {
            LoginAction::Explicit(button) => {
                self.page.scroll_into_view(button).await?;
                let settled = match self.page.click(button, ClickMode::Pointer).await {
                    Ok(()) => {
                        self.page
                            .wait_for_network_idle(self.profile.timeouts.login_idle)
                            .await
                    }
                    Err(e) => Err(e),
                };
                if let Err(e) = settled {
                    tracing::warn!(error = %e, "login click did not settle, forcing click");
                    self.page.click(button, ClickMode::Force).await?;
                    pause(self.delay, self.profile.pauses.login_fallback).await;
                }
                Ok(())
            }
            LoginAction::Generic(button) => self.page.click(button, ClickMode::Pointer).await,
            LoginAction::EnterKey => self.page.press_key(Key::Enter).await,
        }
    }

    async fn navigate_menu(&mut self) {
        let started = Instant::now();
        let result = self
            .traverse_menu()
            .await
            .map_err(|e| RunError::Navigation(e.to_string()));
        if let Err(e) = &result {
            tracing::error!(error = %e, "menu navigation failed");
        }
        self.conclude("menu", started, &result, Some("after_menu_nav"), Some("nav_error"))
            .await;
    }

    /// Hover "PPSR Search", then "Search by serial number", then click the
    /// first entry of the flyout.
    async fn traverse_menu(&mut self) -> Result<(), BrowserError> {
        let p = self.profile;
        self.page
            .wait_for(&p.main_menu(), WaitState::Visible, p.timeouts.menu)
            .await?;

        let search_link = p.search_menu_link();
        self.page.scroll_into_view(&search_link).await?;
        self.page.hover(&search_link).await?;
        tracing::info!(item = %p.search_menu_label, "hovered menu item");
        pause(self.delay, p.pauses.menu_hover).await;

        self.page
            .wait_for(&p.search_submenu(), WaitState::Visible, p.timeouts.menu)
            .await?;
        let serial_link = p.serial_menu_link();
        self.page.hover(&serial_link).await?;
        tracing::info!(item = %p.serial_menu_label, "hovered menu item");
        pause(self.delay, p.pauses.menu_hover).await;

        let flyouts = [
            Candidate::new("nested flyout", Probe::Present(p.serial_submenu()), p.serial_submenu()),
            Candidate::new(
                "flyout from menu root",
                Probe::Always,
                p.serial_submenu_from_root(),
            ),
        ];
        let flyout = first_match(self.page.as_mut(), &flyouts)
            .await
            .map(|c| c.action.clone())
            .unwrap_or_else(|| p.serial_submenu_from_root());
        self.page
            .wait_for(&flyout, WaitState::Visible, p.timeouts.menu)
            .await?;

        let item = SiteProfile::first_item_of(&flyout);
        let label = self.page.inner_text(&item).await?;
        self.page.click(&item, ClickMode::Pointer).await?;
        tracing::info!(item = label.trim(), "clicked first submenu item");

        self.page.wait_for_network_idle(p.timeouts.menu_idle).await?;
        pause(self.delay, p.pauses.after_menu).await;
        match self.page.url().await {
            Ok(url) => tracing::info!(%url, "landed"),
            Err(e) => tracing::debug!(error = %e, "could not read page url"),
        }
        Ok(())
    }

    async fn enter_vin(&mut self, vin: &str) {
        let started = Instant::now();
        let result = self.fill_vin_and_declare(vin).await;
        if let Err(e) = &result {
            tracing::error!(error = %e, "VIN/declaration step failed");
        }
        self.conclude("vin", started, &result, Some("after_vin_and_decl"), Some("vin_decl_error"))
            .await;
    }

    async fn fill_vin_and_declare(&mut self, vin: &str) -> Result<(), BrowserError> {
        let p = self.profile;
        let input = p.vin_input();
        self.page
            .wait_for(&input, WaitState::Visible, p.timeouts.vin_input)
            .await?;
        self.page.scroll_into_view(&input).await?;
        self.run_hook(&p.vin_focus_hook).await;
        self.type_like_human(&input, vin, p.pauses.vin_keystroke)
            .await?;
        self.run_hook(&p.vin_blur_hook).await;
        pause(self.delay, p.pauses.after_vin).await;
        tracing::info!(vin = %mask_identifier(vin), "entered VIN");

        self.ensure_checked(
            &p.search_declaration_checkbox(),
            p.timeouts.search_declaration,
            "search declaration",
        )
        .await?;
        pause(self.delay, p.pauses.after_search_declaration).await;
        Ok(())
    }

    /// Call a page-defined function; absent hooks are not an error.
    async fn run_hook(&mut self, script: &str) {
        if let Err(e) = self.page.evaluate(script).await {
            tracing::debug!(hook = script, error = %e, "page hook unavailable");
        }
    }

    async fn search(&mut self) {
        let started = Instant::now();
        let result = self.click_search().await;
        if let Err(e) = &result {
            tracing::error!(error = %e, "search button click failed");
        }
        self.conclude(
            "search",
            started,
            &result,
            Some("after_search_click"),
            Some("search_click_error"),
        )
        .await;
    }

    async fn click_search(&mut self) -> Result<(), BrowserError> {
        let p = self.profile;
        let button = p.search_button();
        self.page
            .wait_for(&button, WaitState::Visible, p.timeouts.search_button)
            .await?;
        self.page.scroll_into_view(&button).await?;
        let settled = match self.page.click(&button, ClickMode::Pointer).await {
            Ok(()) => self.page.wait_for_network_idle(p.timeouts.search_idle).await,
            Err(e) => Err(e),
        };
        if let Err(e) = settled {
            tracing::warn!(error = %e, "search click did not settle, clicking again");
            self.page.click(&button, ClickMode::Pointer).await?;
            pause(self.delay, p.pauses.search_fallback).await;
        }
        tracing::info!("clicked search");
        pause(self.delay, p.pauses.after_search).await;
        Ok(())
    }

    async fn extract_plate(&mut self) -> Option<String> {
        let started = Instant::now();
        pause(self.delay, self.profile.pauses.before_extract).await;
        let (result, plate) = match self.read_plate().await {
            Ok(plate) => (Ok(()), plate),
            Err(e) => (Err(RunError::Extraction(e.to_string())), None),
        };
        match (&result, &plate) {
            (Err(e), _) => tracing::error!(error = %e, "plate extraction failed"),
            (Ok(()), Some(plate)) => tracing::info!(%plate, "registration plate number"),
            (Ok(()), None) => tracing::warn!("registration plate number is empty"),
        }
        self.conclude(
            "extract",
            started,
            &result,
            Some("plate_extracted"),
            Some("plate_extract_error"),
        )
        .await;
        plate
    }

    async fn read_plate(&mut self) -> Result<Option<String>, BrowserError> {
        let p = self.profile;
        let sources = [
            Candidate::new(
                "plate value element",
                Probe::Present(p.plate_value()),
                PlateSource {
                    wait: p.plate_value(),
                    read: p.plate_value(),
                },
            ),
            Candidate::new(
                "plate label",
                Probe::Always,
                PlateSource {
                    wait: p.plate_label(),
                    read: p.plate_label_value(),
                },
            ),
        ];
        let Some(source) = first_match(self.page.as_mut(), &sources)
            .await
            .map(|c| c.action.clone())
        else {
            return Ok(None);
        };
        self.page
            .wait_for(&source.wait, WaitState::Visible, p.timeouts.plate)
            .await?;
        let text = self.page.inner_text(&source.read).await?;
        let plate = text.trim();
        Ok((!plate.is_empty()).then(|| plate.to_string()))
    }

    /// Final screenshot, trace archive, browser close. Never fails.
    async fn finish(mut self, request_id: &str) -> (ArtifactWriter, StepJournal) {
        let started = Instant::now();
        let screenshot = self.artifacts.capture(self.page.as_mut(), "final").await;
        self.journal
            .record("finish", StepOutcome::Ok, None, screenshot, started.elapsed());

        let events = match self.page.stop_tracing().await {
            Ok(events) => events,
            Err(e) => {
                tracing::warn!(error = %e, "could not collect browser trace");
                serde_json::Value::Array(Vec::new())
            }
        };
        let trace = self.journal.to_trace_json(request_id, events);
        match self.artifacts.write_trace(&trace).await {
            Ok(()) => {
                tracing::info!(path = %self.artifacts.trace_path().display(), "trace saved")
            }
            Err(e) => tracing::warn!(error = %e, "trace write failed"),
        }

        match self.page.close().await {
            Ok(()) => tracing::info!("browser closed"),
            Err(e) => tracing::warn!(error = %e, "browser close failed"),
        }
        (self.artifacts, self.journal)
    }
}
