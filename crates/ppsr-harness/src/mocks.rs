//! In-memory test doubles for the browser seam.
//!
//! Provides:
//! - [`ScriptedPage`]: a [`Page`] over a fixed set of elements, recording
//!   every action
//! - [`ScriptedLauncher`]: a [`BrowserLauncher`] handing out a shared
//!   [`ScriptedPage`]
//! - [`ppsr_site`]: a scripted page laid out like the PPSR site for a
//!   given [`SiteProfile`]
//!
//! All doubles use `Arc<Mutex<_>>` for interior state, so a test can keep a
//! clone of the page and inspect it after the runner has consumed its own.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use ppsr_browser::{
    BrowserError, BrowserLauncher, ClickMode, Key, LaunchOptions, Locator, Page, WaitState,
};
use ppsr_runner::SiteProfile;
use serde_json::Value;

/// Bytes returned by every scripted screenshot (a PNG signature).
pub const FAKE_PNG: &[u8] = b"\x89PNG\r\n\x1a\n";

// ---------------------------------------------------------------------------
// ScriptedPage
// ---------------------------------------------------------------------------

/// One element of a scripted page.
#[derive(Debug, Clone)]
pub struct MockElement {
    pub visible: bool,
    /// Text returned by `inner_text`.
    pub text: String,
    /// Current value of an input, built up by typing.
    pub value: String,
    pub checked: bool,
    /// Clicks on this element fail.
    pub click_fails: bool,
}

impl Default for MockElement {
    fn default() -> Self {
        Self {
            visible: true,
            text: String::new(),
            value: String::new(),
            checked: false,
            click_fails: false,
        }
    }
}

impl MockElement {
    pub fn visible() -> Self {
        Self::default()
    }

    pub fn hidden() -> Self {
        Self {
            visible: false,
            ..Self::default()
        }
    }

    pub fn with_text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    pub fn checked() -> Self {
        Self {
            checked: true,
            ..Self::default()
        }
    }

    pub fn unclickable() -> Self {
        Self {
            click_fails: true,
            ..Self::default()
        }
    }
}

/// An action performed on a [`ScriptedPage`], in call order.
#[derive(Debug, Clone, PartialEq)]
pub enum PageAction {
    Goto(String),
    Click(Locator, ClickMode),
    Hover(Locator),
    ScrollIntoView(Locator),
    Clear(Locator),
    Type(char),
    PressKey(Key),
    Check(Locator),
    Evaluate(String),
    WaitForNetworkIdle,
    Screenshot,
    StartTracing,
    StopTracing,
    Close,
}

/// Thread-safe inner state for [`ScriptedPage`].
#[derive(Debug, Default)]
struct PageState {
    elements: HashMap<Locator, MockElement>,
    /// All actions, in order.
    actions: Vec<PageAction>,
    /// Element that receives typed characters.
    focused: Option<Locator>,
    url: String,
    goto_error: Option<String>,
    network_idle_fails: bool,
    evaluate_fails: bool,
    closed: bool,
}

/// A [`Page`] whose DOM is a map from [`Locator`] to [`MockElement`].
///
/// Lookups are by exact locator equality, so the page must be keyed with
/// the same locators the script builds (see [`ppsr_site`]). Waits resolve
/// immediately: an element either satisfies the wait or the wait times out.
///
/// `check` fails on a box that is already checked, which lets tests prove
/// the script never re-checks one.
#[derive(Debug, Clone, Default)]
pub struct ScriptedPage {
    inner: Arc<Mutex<PageState>>,
}

impl ScriptedPage {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, PageState> {
        self.inner.lock().expect("scripted page lock poisoned")
    }

    pub fn with_element(self, locator: Locator, element: MockElement) -> Self {
        self.state().elements.insert(locator, element);
        self
    }

    pub fn without_element(self, locator: &Locator) -> Self {
        self.state().elements.remove(locator);
        self
    }

    /// Navigation fails with `PageLoadTimeout` carrying this reason in the log.
    pub fn failing_goto(self, reason: impl Into<String>) -> Self {
        self.state().goto_error = Some(reason.into());
        self
    }

    pub fn failing_network_idle(self) -> Self {
        self.state().network_idle_fails = true;
        self
    }

    pub fn failing_evaluate(self) -> Self {
        self.state().evaluate_fails = true;
        self
    }

    /// Replace an element after construction.
    pub fn set_element(&self, locator: Locator, element: MockElement) {
        self.state().elements.insert(locator, element);
    }

    pub fn actions(&self) -> Vec<PageAction> {
        self.state().actions.clone()
    }

    pub fn element(&self, locator: &Locator) -> Option<MockElement> {
        self.state().elements.get(locator).cloned()
    }

    /// Typed value of an input, empty when unknown.
    pub fn value_of(&self, locator: &Locator) -> String {
        self.element(locator).map(|e| e.value).unwrap_or_default()
    }

    pub fn is_closed(&self) -> bool {
        self.state().closed
    }

    pub fn clicked(&self, locator: &Locator) -> bool {
        self.actions()
            .iter()
            .any(|a| matches!(a, PageAction::Click(l, _) if l == locator))
    }

    pub fn checks_of(&self, locator: &Locator) -> usize {
        self.actions()
            .iter()
            .filter(|a| matches!(a, PageAction::Check(l) if l == locator))
            .count()
    }

    fn record(&self, action: PageAction) {
        self.state().actions.push(action);
    }

    fn require(&self, locator: &Locator) -> Result<MockElement, BrowserError> {
        self.element(locator)
            .ok_or_else(|| BrowserError::ElementNotFound {
                selector: locator.to_string(),
            })
    }
}

#[async_trait]
impl Page for ScriptedPage {
    async fn goto(&mut self, url: &str, timeout: Duration) -> Result<(), BrowserError> {
        self.record(PageAction::Goto(url.to_string()));
        let mut state = self.state();
        if let Some(reason) = &state.goto_error {
            tracing::debug!(%reason, "scripted navigation failure");
            return Err(BrowserError::PageLoadTimeout { duration: timeout });
        }
        state.url = url.to_string();
        Ok(())
    }

    async fn wait_for(
        &mut self,
        locator: &Locator,
        state: WaitState,
        timeout: Duration,
    ) -> Result<(), BrowserError> {
        let reached = match (self.element(locator), state) {
            (Some(_), WaitState::Attached) => true,
            (Some(el), WaitState::Visible) => el.visible,
            (None, _) => false,
        };
        if reached {
            Ok(())
        } else {
            Err(BrowserError::WaitTimeout {
                selector: locator.to_string(),
                state: state.as_str(),
                duration: timeout,
            })
        }
    }

    async fn exists(&mut self, locator: &Locator) -> Result<bool, BrowserError> {
        Ok(self.element(locator).is_some())
    }

    async fn scroll_into_view(&mut self, locator: &Locator) -> Result<(), BrowserError> {
        self.require(locator)?;
        self.record(PageAction::ScrollIntoView(locator.clone()));
        Ok(())
    }

    async fn click(&mut self, locator: &Locator, mode: ClickMode) -> Result<(), BrowserError> {
        let element = self.require(locator)?;
        self.record(PageAction::Click(locator.clone(), mode));
        if element.click_fails {
            return Err(BrowserError::ElementNotInteractable {
                reason: format!("{locator} is covered"),
            });
        }
        self.state().focused = Some(locator.clone());
        Ok(())
    }

    async fn hover(&mut self, locator: &Locator) -> Result<(), BrowserError> {
        self.require(locator)?;
        self.record(PageAction::Hover(locator.clone()));
        Ok(())
    }

    async fn clear(&mut self, locator: &Locator) -> Result<(), BrowserError> {
        self.require(locator)?;
        self.record(PageAction::Clear(locator.clone()));
        if let Some(el) = self.state().elements.get_mut(locator) {
            el.value.clear();
        }
        Ok(())
    }

    async fn type_char(&mut self, ch: char) -> Result<(), BrowserError> {
        self.record(PageAction::Type(ch));
        let mut state = self.state();
        let Some(focused) = state.focused.clone() else {
            return Ok(());
        };
        if let Some(el) = state.elements.get_mut(&focused) {
            el.value.push(ch);
        }
        Ok(())
    }

    async fn press_key(&mut self, key: Key) -> Result<(), BrowserError> {
        self.record(PageAction::PressKey(key));
        Ok(())
    }

    async fn is_checked(&mut self, locator: &Locator) -> Result<bool, BrowserError> {
        Ok(self.require(locator)?.checked)
    }

    async fn check(&mut self, locator: &Locator) -> Result<(), BrowserError> {
        let element = self.require(locator)?;
        self.record(PageAction::Check(locator.clone()));
        if element.checked {
            return Err(BrowserError::ElementNotInteractable {
                reason: format!("{locator} was already checked and got toggled off"),
            });
        }
        if let Some(el) = self.state().elements.get_mut(locator) {
            el.checked = true;
        }
        Ok(())
    }

    async fn inner_text(&mut self, locator: &Locator) -> Result<String, BrowserError> {
        Ok(self.require(locator)?.text)
    }

    async fn evaluate(&mut self, expression: &str) -> Result<Value, BrowserError> {
        self.record(PageAction::Evaluate(expression.to_string()));
        if self.state().evaluate_fails {
            return Err(BrowserError::JsException {
                message: format!("ReferenceError: {expression} is not defined"),
            });
        }
        Ok(Value::Null)
    }

    async fn wait_for_network_idle(&mut self, timeout: Duration) -> Result<(), BrowserError> {
        self.record(PageAction::WaitForNetworkIdle);
        if self.state().network_idle_fails {
            return Err(BrowserError::NetworkIdleTimeout { duration: timeout });
        }
        Ok(())
    }

    async fn url(&mut self) -> Result<String, BrowserError> {
        Ok(self.state().url.clone())
    }

    async fn screenshot(&mut self) -> Result<Vec<u8>, BrowserError> {
        self.record(PageAction::Screenshot);
        Ok(FAKE_PNG.to_vec())
    }

    async fn start_tracing(&mut self) -> Result<(), BrowserError> {
        self.record(PageAction::StartTracing);
        Ok(())
    }

    async fn stop_tracing(&mut self) -> Result<Value, BrowserError> {
        self.record(PageAction::StopTracing);
        Ok(serde_json::json!([{ "name": "ScriptedPage", "ph": "I" }]))
    }

    async fn close(&mut self) -> Result<(), BrowserError> {
        self.record(PageAction::Close);
        self.state().closed = true;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// ScriptedLauncher
// ---------------------------------------------------------------------------

/// Thread-safe inner state for [`ScriptedLauncher`].
#[derive(Debug, Default)]
struct LauncherState {
    /// Options of every launch, in order.
    launches: Vec<LaunchOptions>,
    failure: Option<String>,
}

/// Hands out clones of one [`ScriptedPage`].
#[derive(Debug, Clone)]
pub struct ScriptedLauncher {
    page: ScriptedPage,
    inner: Arc<Mutex<LauncherState>>,
}

impl ScriptedLauncher {
    pub fn new(page: ScriptedPage) -> Self {
        Self {
            page,
            inner: Arc::new(Mutex::new(LauncherState::default())),
        }
    }

    /// Every launch fails with `LaunchFailed`.
    pub fn failing(reason: impl Into<String>) -> Self {
        let launcher = Self::new(ScriptedPage::new());
        launcher
            .inner
            .lock()
            .expect("scripted launcher lock poisoned")
            .failure = Some(reason.into());
        launcher
    }

    pub fn page(&self) -> &ScriptedPage {
        &self.page
    }

    pub fn launches(&self) -> Vec<LaunchOptions> {
        self.inner
            .lock()
            .expect("scripted launcher lock poisoned")
            .launches
            .clone()
    }
}

#[async_trait]
impl BrowserLauncher for ScriptedLauncher {
    async fn launch(&self, options: &LaunchOptions) -> Result<Box<dyn Page>, BrowserError> {
        let mut inner = self.inner.lock().expect("scripted launcher lock poisoned");
        inner.launches.push(options.clone());
        if let Some(reason) = &inner.failure {
            return Err(BrowserError::LaunchFailed {
                reason: reason.clone(),
            });
        }
        Ok(Box::new(self.page.clone()))
    }
}

// ---------------------------------------------------------------------------
// PPSR layout
// ---------------------------------------------------------------------------

/// Label of the first serial-number search entry on the scripted site.
pub const FIRST_SERIAL_ITEM: &str = "Motor vehicle";

/// A scripted page with every element the lookup touches, keyed by the
/// locators `profile` produces. Checkboxes start unchecked; the plate is
/// shown through the plate value element.
pub fn ppsr_site(profile: &SiteProfile, plate: &str) -> ScriptedPage {
    let serial_flyout = profile.serial_submenu();
    ScriptedPage::new()
        .with_element(profile.login_form(), MockElement::visible())
        .with_element(profile.username_input(), MockElement::visible())
        .with_element(profile.password_input(), MockElement::visible())
        .with_element(profile.declaration_checkbox(), MockElement::visible())
        .with_element(profile.login_button(), MockElement::visible())
        .with_element(profile.main_menu(), MockElement::visible())
        .with_element(profile.search_menu_link(), MockElement::with_text("PPSR Search"))
        .with_element(profile.search_submenu(), MockElement::visible())
        .with_element(
            profile.serial_menu_link(),
            MockElement::with_text("Search by serial number"),
        )
        .with_element(
            SiteProfile::first_item_of(&serial_flyout),
            MockElement::with_text(FIRST_SERIAL_ITEM),
        )
        .with_element(serial_flyout, MockElement::visible())
        .with_element(profile.vin_input(), MockElement::visible())
        .with_element(profile.search_declaration_checkbox(), MockElement::visible())
        .with_element(profile.search_button(), MockElement::visible())
        .with_element(profile.plate_value(), MockElement::with_text(plate))
}
