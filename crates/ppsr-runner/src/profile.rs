//! Selectors, timeouts and pauses for the PPSR transact site.
//!
//! The site is an ASP.NET WebForms application, so most controls carry long
//! generated ids. Everything the script touches lives here; the defaults are
//! the production values.

use std::time::Duration;

use ppsr_browser::Locator;
use ppsr_types::DEFAULT_TARGET_URL;

use crate::pacing::PauseRange;

const SUBMENU: &str = ":scope > ul.childmenu";

/// Wait budgets per step.
#[derive(Debug, Clone)]
pub struct Timeouts {
    pub page_load: Duration,
    pub login_form: Duration,
    pub declaration: Duration,
    pub login_button: Duration,
    pub login_idle: Duration,
    pub menu: Duration,
    pub menu_idle: Duration,
    pub vin_input: Duration,
    pub search_declaration: Duration,
    pub search_button: Duration,
    pub search_idle: Duration,
    pub plate: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            page_load: Duration::from_secs(10),
            login_form: Duration::from_secs(10),
            declaration: Duration::from_secs(10),
            login_button: Duration::from_secs(10),
            login_idle: Duration::from_secs(30),
            menu: Duration::from_secs(10),
            menu_idle: Duration::from_secs(30),
            vin_input: Duration::from_secs(10),
            search_declaration: Duration::from_secs(5),
            search_button: Duration::from_secs(5),
            search_idle: Duration::from_secs(10),
            plate: Duration::from_secs(10),
        }
    }
}

/// Pause ranges, in script order.
#[derive(Debug, Clone)]
pub struct Pauses {
    pub after_open: PauseRange,
    pub credential_keystroke: PauseRange,
    pub vin_keystroke: PauseRange,
    pub after_typing: PauseRange,
    pub after_field: PauseRange,
    pub after_declaration: PauseRange,
    pub login_fallback: PauseRange,
    pub after_login: PauseRange,
    pub menu_hover: PauseRange,
    pub after_menu: PauseRange,
    pub after_vin: PauseRange,
    pub after_search_declaration: PauseRange,
    pub search_fallback: PauseRange,
    pub after_search: PauseRange,
    pub before_extract: PauseRange,
    pub before_finish: PauseRange,
}

impl Default for Pauses {
    fn default() -> Self {
        Self {
            after_open: PauseRange::new(1200, 2200),
            credential_keystroke: PauseRange::new(130, 210),
            vin_keystroke: PauseRange::new(140, 220),
            after_typing: PauseRange::new(450, 900),
            after_field: PauseRange::new(1200, 2400),
            after_declaration: PauseRange::new(1400, 2600),
            login_fallback: PauseRange::new(1600, 2600),
            after_login: PauseRange::new(1600, 2600),
            menu_hover: PauseRange::new(900, 1600),
            after_menu: PauseRange::new(1200, 2200),
            after_vin: PauseRange::new(900, 1500),
            after_search_declaration: PauseRange::new(1100, 1900),
            search_fallback: PauseRange::new(1600, 2600),
            after_search: PauseRange::new(1300, 2200),
            before_extract: PauseRange::new(1300, 2100),
            before_finish: PauseRange::new(1800, 3000),
        }
    }
}

/// Everything site-specific the lookup script needs.
#[derive(Debug, Clone)]
pub struct SiteProfile {
    pub target_url: String,
    pub login_form: String,
    pub username_input: String,
    pub password_input: String,
    pub declaration_checkbox: String,
    pub login_button: String,
    pub generic_submit: String,
    pub main_menu: String,
    pub search_menu_label: String,
    pub serial_menu_label: String,
    pub vin_input: String,
    /// Page hooks that toggle the VIN field's watermark text.
    pub vin_focus_hook: String,
    pub vin_blur_hook: String,
    pub search_declaration_checkbox: String,
    pub search_button: String,
    pub plate_value: String,
    pub plate_label: String,
    pub timeouts: Timeouts,
    pub pauses: Pauses,
}

impl Default for SiteProfile {
    fn default() -> Self {
        Self {
            target_url: DEFAULT_TARGET_URL.to_string(),
            login_form: "input[type='text'], input[type='password']".to_string(),
            username_input: "input[type='text']".to_string(),
            password_input: "input[type='password']".to_string(),
            declaration_checkbox: "#ctl00_ctl00_m_cpContent_cbDeclaration_cbDeclaration".to_string(),
            login_button: "#ctl00_ctl00_m_cpContent_btnLogin".to_string(),
            generic_submit: "input[type='submit'], button[type='submit']".to_string(),
            main_menu: "#mainMenu".to_string(),
            search_menu_label: "PPSR Search".to_string(),
            serial_menu_label: "Search by serial number".to_string(),
            vin_input: "#ctl00_ctl00_m_cpProgressWizard_ucPW_ucSN_ucSN_txtVIN".to_string(),
            vin_focus_hook: "OnWatermarkTextboxFocus('ctl00_ctl00_m_cpProgressWizard_ucPW_ucSN_ucSN_txtVIN')"
                .to_string(),
            vin_blur_hook: "OnWatermarkTextboxBlur('ctl00_ctl00_m_cpProgressWizard_ucPW_ucSN_ucSN_txtVIN')"
                .to_string(),
            search_declaration_checkbox:
                "#ctl00_ctl00_m_cpProgressWizard_ucPW_ucSN_ucDeclarationCheckboxAndContent_cbDeclaration"
                    .to_string(),
            search_button: "#ctl00_ctl00_m_cpProgressWizard_ucPW_btnNext".to_string(),
            plate_value: "#ctl00_ctl00_m_cpProgressWizard_ucPW_ucR_ucRM_ucNevdisInformationForMultiple_rptMotorVehicles_ctl00_lblPlateNumberValue"
                .to_string(),
            plate_label: "Registration plate number:".to_string(),
            timeouts: Timeouts::default(),
            pauses: Pauses::default(),
        }
    }
}

impl SiteProfile {
    /// Production profile pointed at another URL.
    pub fn with_target_url(url: impl Into<String>) -> Self {
        Self {
            target_url: url.into(),
            ..Self::default()
        }
    }

    pub fn login_form(&self) -> Locator {
        Locator::css(&self.login_form)
    }

    pub fn username_input(&self) -> Locator {
        Locator::css(&self.username_input)
    }

    pub fn password_input(&self) -> Locator {
        Locator::css(&self.password_input)
    }

    pub fn declaration_checkbox(&self) -> Locator {
        Locator::css(&self.declaration_checkbox)
    }

    pub fn login_button(&self) -> Locator {
        Locator::css(&self.login_button)
    }

    pub fn generic_submit(&self) -> Locator {
        Locator::css(&self.generic_submit)
    }

    pub fn main_menu(&self) -> Locator {
        Locator::css(&self.main_menu)
    }

    /// Top-level "PPSR Search" link.
    pub fn search_menu_link(&self) -> Locator {
        self.main_menu().text_within("a", &self.search_menu_label)
    }

    /// Dropdown opened by hovering the search link.
    pub fn search_submenu(&self) -> Locator {
        self.search_menu_link().parent().child(SUBMENU)
    }

    pub fn serial_menu_link(&self) -> Locator {
        self.search_submenu().text_within("a", &self.serial_menu_label)
    }

    /// Flyout opened by hovering the serial-number link.
    pub fn serial_submenu(&self) -> Locator {
        self.serial_menu_link().parent().child(SUBMENU)
    }

    /// Same flyout, resolved from the menu root instead of the first dropdown.
    pub fn serial_submenu_from_root(&self) -> Locator {
        self.main_menu()
            .text_within("a", &self.serial_menu_label)
            .parent()
            .child(SUBMENU)
    }

    pub fn first_item_of(menu: &Locator) -> Locator {
        menu.child("li a")
    }

    pub fn vin_input(&self) -> Locator {
        Locator::css(&self.vin_input)
    }

    pub fn search_declaration_checkbox(&self) -> Locator {
        Locator::css(&self.search_declaration_checkbox)
    }

    pub fn search_button(&self) -> Locator {
        Locator::css(&self.search_button)
    }

    pub fn plate_value(&self) -> Locator {
        Locator::css(&self.plate_value)
    }

    /// `dt` carrying the plate label.
    pub fn plate_label(&self) -> Locator {
        Locator::text("dt", &self.plate_label)
    }

    /// `dd` following the plate label.
    pub fn plate_label_value(&self) -> Locator {
        self.plate_label().next_sibling("dd")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_target_production() {
        let profile = SiteProfile::default();
        assert_eq!(profile.target_url, "https://transact.ppsr.gov.au/ppsr/Login");
        assert_eq!(profile.timeouts.login_idle, Duration::from_secs(30));
        assert_eq!(profile.timeouts.search_declaration, Duration::from_secs(5));
        assert_eq!(profile.pauses.vin_keystroke, PauseRange::new(140, 220));
    }

    #[test]
    fn override_keeps_selectors() {
        let profile = SiteProfile::with_target_url("http://127.0.0.1:9000/ppsr/Login");
        assert_eq!(profile.target_url, "http://127.0.0.1:9000/ppsr/Login");
        assert_eq!(profile.main_menu, "#mainMenu");
    }

    #[test]
    fn menu_path_is_scoped_to_main_menu() {
        let profile = SiteProfile::default();
        assert_eq!(
            profile.serial_submenu().to_string(),
            r#"#mainMenu >> a[text="PPSR Search"] >> .. >> :scope > ul.childmenu >> a[text="Search by serial number"] >> .. >> :scope > ul.childmenu"#
        );
        assert_ne!(profile.serial_submenu(), profile.serial_submenu_from_root());
        assert_eq!(
            SiteProfile::first_item_of(&profile.serial_submenu()).to_string(),
            format!("{} >> li a", profile.serial_submenu())
        );
    }

    #[test]
    fn plate_label_reads_following_dd() {
        let profile = SiteProfile::default();
        assert_eq!(
            profile.plate_label_value().to_string(),
            r#"dt[text="Registration plate number:"] ~ dd"#
        );
    }
}
