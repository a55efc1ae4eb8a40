//! Lookup script behaviour against the scripted PPSR site.

mod common;

use common::*;
use ppsr_browser::{ClickMode, Key};
use ppsr_harness::{MockElement, PageAction, ScriptedLauncher, FAKE_PNG};
use ppsr_runner::{RunError, SiteProfile, StepOutcome};

fn step_outcome(steps: &[ppsr_runner::StepRecord], step: &str) -> Option<StepOutcome> {
    steps.iter().find(|r| r.step == step).map(|r| r.outcome)
}

#[tokio::test]
async fn happy_path_extracts_plate_and_writes_artifacts() {
    let logs = temp_logs();
    let profile = SiteProfile::default();
    let launcher = ScriptedLauncher::new(site());
    let ctx = context_in(logs.path(), "a1b2c3d4");

    let outcome = runner_for(&launcher)
        .run(&request(), &ctx)
        .await
        .expect("run should succeed");

    assert_eq!(outcome.plate_number.as_deref(), Some(PLATE));
    assert_eq!(outcome.artifact_dir, logs.path().join("a1b2c3d4"));
    assert!(outcome
        .steps
        .iter()
        .all(|r| r.outcome == StepOutcome::Ok), "{:?}", outcome.steps);

    assert_eq!(
        files_in(&outcome.artifact_dir),
        vec![
            "01-initial.png",
            "02-after_menu_nav.png",
            "03-after_vin_and_decl.png",
            "04-after_search_click.png",
            "05-plate_extracted.png",
            "06-final.png",
            "trace-a1b2c3d4.json",
        ]
    );
    let png = std::fs::read(outcome.artifact_dir.join("01-initial.png")).unwrap();
    assert_eq!(png, FAKE_PNG);

    let page = launcher.page();
    assert_eq!(page.value_of(&profile.username_input()), "test_user");
    assert_eq!(page.value_of(&profile.password_input()), PASSWORD);
    assert_eq!(page.value_of(&profile.vin_input()), VIN);
    assert_eq!(page.checks_of(&profile.declaration_checkbox()), 1);
    assert_eq!(page.checks_of(&profile.search_declaration_checkbox()), 1);
    assert!(page.clicked(&profile.login_button()));
    assert!(page.clicked(&SiteProfile::first_item_of(&profile.serial_submenu())));
    assert!(page.clicked(&profile.search_button()));
    assert!(page.is_closed());
    assert_eq!(launcher.launches().len(), 1);
}

#[tokio::test]
async fn trace_archive_holds_journal_and_browser_events() {
    let logs = temp_logs();
    let launcher = ScriptedLauncher::new(site());
    let ctx = context_in(logs.path(), "0badf00d");

    let outcome = runner_for(&launcher).run(&request(), &ctx).await.unwrap();

    assert_eq!(outcome.trace_path, ctx.trace_path());
    let trace: serde_json::Value =
        serde_json::from_slice(&std::fs::read(&outcome.trace_path).unwrap()).unwrap();
    assert_eq!(trace["requestId"], "0badf00d");
    let steps = trace["steps"].as_array().unwrap();
    assert_eq!(steps[0]["step"], "open");
    assert_eq!(steps[0]["screenshot"], "01-initial.png");
    assert_eq!(steps.last().unwrap()["step"], "finish");
    assert_eq!(trace["traceEvents"][0]["name"], "ScriptedPage");

    let actions = launcher.page().actions();
    assert_eq!(actions.first(), Some(&PageAction::StartTracing));
    assert_eq!(actions.last(), Some(&PageAction::Close));
}

#[tokio::test]
async fn one_correlation_id_across_paths_and_logs() {
    let logs = temp_logs();
    let buffer = LogBuffer::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(buffer.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::INFO)
        .finish();
    let _guard = tracing::subscriber::set_default(subscriber);

    // The span is created with the context, so the subscriber must be set first.
    let ctx = context_in(logs.path(), "c0ffee11");
    let launcher = ScriptedLauncher::new(site());
    let outcome = runner_for(&launcher).run(&request(), &ctx).await.unwrap();

    assert!(outcome.artifact_dir.ends_with("c0ffee11"));
    assert!(outcome
        .trace_path
        .to_string_lossy()
        .ends_with("c0ffee11/trace-c0ffee11.json"));

    let output = buffer.contents();
    let lines: Vec<&str> = output.lines().filter(|l| !l.trim().is_empty()).collect();
    assert!(lines.iter().any(|l| l.contains("start run")));
    assert!(lines.iter().any(|l| l.contains("run completed")));
    for line in &lines {
        assert!(line.contains("request_id=c0ffee11"), "line without id: {line}");
        assert!(!line.contains(PASSWORD), "password leaked: {line}");
        assert!(!line.contains(VIN), "full VIN leaked: {line}");
    }
}

#[tokio::test]
async fn checked_boxes_are_left_alone() {
    let logs = temp_logs();
    let profile = SiteProfile::default();
    let page = site();
    page.set_element(profile.declaration_checkbox(), MockElement::checked());
    page.set_element(profile.search_declaration_checkbox(), MockElement::checked());
    let launcher = ScriptedLauncher::new(page);

    let outcome = runner_for(&launcher)
        .run(&request(), &context_in(logs.path(), "11111111"))
        .await
        .unwrap();

    assert_eq!(launcher.page().checks_of(&profile.declaration_checkbox()), 0);
    assert_eq!(
        launcher
            .page()
            .checks_of(&profile.search_declaration_checkbox()),
        0
    );
    assert_eq!(step_outcome(&outcome.steps, "declaration"), Some(StepOutcome::Ok));
    assert_eq!(step_outcome(&outcome.steps, "vin"), Some(StepOutcome::Ok));
}

#[tokio::test]
async fn page_load_failure_stops_the_run() {
    let logs = temp_logs();
    let launcher = ScriptedLauncher::new(site().failing_goto("net::ERR_CONNECTION_RESET"));
    let ctx = context_in(logs.path(), "22222222");

    let err = runner_for(&launcher)
        .run(&request(), &ctx)
        .await
        .expect_err("run should fail");

    assert!(matches!(err, RunError::PageLoad(_)), "{err}");
    assert!(err.is_fatal());

    let actions = launcher.page().actions();
    assert!(!actions
        .iter()
        .any(|a| matches!(a, PageAction::Click(..) | PageAction::Type(_) | PageAction::Hover(_))));
    assert!(launcher.page().is_closed());

    // Diagnostics still land on disk.
    let files = files_in(&ctx.artifact_dir);
    assert_eq!(files, vec!["01-final.png", "trace-22222222.json"]);
    let trace: serde_json::Value =
        serde_json::from_slice(&std::fs::read(ctx.trace_path()).unwrap()).unwrap();
    let steps = trace["steps"].as_array().unwrap();
    assert_eq!(steps[0]["outcome"], "failed");
    assert!(steps
        .iter()
        .filter(|s| s["step"] == "menu" || s["step"] == "extract")
        .all(|s| s["outcome"] == "skipped"));
}

#[tokio::test]
async fn missing_login_form_fails_with_screenshot() {
    let logs = temp_logs();
    let profile = SiteProfile::default();
    let launcher = ScriptedLauncher::new(site().without_element(&profile.login_form()));
    let ctx = context_in(logs.path(), "33333333");

    let err = runner_for(&launcher).run(&request(), &ctx).await.unwrap_err();

    assert!(
        matches!(err, RunError::ElementNotFound { field: "login form", .. }),
        "{err}"
    );
    let files = files_in(&ctx.artifact_dir);
    assert!(files.contains(&"02-form_not_found.png".to_string()), "{files:?}");
    assert!(launcher.page().is_closed());
}

#[tokio::test]
async fn missing_password_field_is_fatal() {
    let logs = temp_logs();
    let profile = SiteProfile::default();
    let launcher = ScriptedLauncher::new(site().without_element(&profile.password_input()));
    let ctx = context_in(logs.path(), "44444444");

    let err = runner_for(&launcher).run(&request(), &ctx).await.unwrap_err();

    assert!(
        matches!(err, RunError::ElementNotFound { field: "password field", .. }),
        "{err}"
    );
    // Username was typed before the password lookup failed.
    assert_eq!(launcher.page().value_of(&profile.username_input()), "test_user");
    assert!(!launcher.page().clicked(&profile.login_button()));
    assert_eq!(
        files_in(&ctx.artifact_dir),
        vec![
            "01-initial.png",
            "02-credentials_error.png",
            "03-final.png",
            "trace-44444444.json",
        ]
    );
}

#[tokio::test]
async fn failed_login_click_leaves_a_screenshot() {
    let logs = temp_logs();
    let profile = SiteProfile::default();
    let page = site().with_element(profile.login_button(), MockElement::unclickable());
    let launcher = ScriptedLauncher::new(page);
    let ctx = context_in(logs.path(), "4a4a4a4a");

    let outcome = runner_for(&launcher).run(&request(), &ctx).await.unwrap();

    let login = outcome
        .steps
        .iter()
        .find(|r| r.step == "login")
        .expect("login should be journaled");
    assert_eq!(login.outcome, StepOutcome::Failed);
    assert!(login.detail.as_deref().unwrap_or_default().contains("covered"));
    let shot = login.screenshot.as_deref().expect("failed login should have a screenshot");
    assert_eq!(shot, "02-login_error.png");
    assert!(ctx.artifact_dir.join(shot).is_file());

    // The script carries on to the plate.
    assert_eq!(outcome.plate_number.as_deref(), Some(PLATE));
}

#[tokio::test]
async fn menu_failure_still_attempts_vin_and_search() {
    let logs = temp_logs();
    let profile = SiteProfile::default();
    let page = site()
        .without_element(&profile.main_menu())
        .without_element(&profile.plate_value());
    let launcher = ScriptedLauncher::new(page);
    let ctx = context_in(logs.path(), "55555555");

    let outcome = runner_for(&launcher).run(&request(), &ctx).await.unwrap();

    assert_eq!(outcome.plate_number, None);
    assert_eq!(step_outcome(&outcome.steps, "menu"), Some(StepOutcome::Failed));
    assert_eq!(step_outcome(&outcome.steps, "vin"), Some(StepOutcome::Ok));
    assert_eq!(step_outcome(&outcome.steps, "search"), Some(StepOutcome::Ok));
    assert_eq!(step_outcome(&outcome.steps, "extract"), Some(StepOutcome::Failed));

    assert_eq!(launcher.page().value_of(&profile.vin_input()), VIN);
    assert!(launcher.page().clicked(&profile.search_button()));

    let files = files_in(&ctx.artifact_dir);
    assert!(files.contains(&"02-nav_error.png".to_string()), "{files:?}");
    assert!(files.contains(&"05-plate_extract_error.png".to_string()), "{files:?}");
}

#[tokio::test]
async fn declaration_failure_is_not_fatal() {
    let logs = temp_logs();
    let profile = SiteProfile::default();
    let page = site().without_element(&profile.declaration_checkbox());
    let launcher = ScriptedLauncher::new(page);
    let ctx = context_in(logs.path(), "66666666");

    let outcome = runner_for(&launcher).run(&request(), &ctx).await.unwrap();

    assert_eq!(outcome.plate_number.as_deref(), Some(PLATE));
    assert_eq!(step_outcome(&outcome.steps, "declaration"), Some(StepOutcome::Failed));
    assert!(files_in(&ctx.artifact_dir).contains(&"02-checkbox_error.png".to_string()));
}

#[tokio::test]
async fn login_without_buttons_presses_enter() {
    let logs = temp_logs();
    let profile = SiteProfile::default();
    let launcher = ScriptedLauncher::new(site().without_element(&profile.login_button()));

    runner_for(&launcher)
        .run(&request(), &context_in(logs.path(), "77777777"))
        .await
        .unwrap();

    assert!(launcher
        .page()
        .actions()
        .contains(&PageAction::PressKey(Key::Enter)));
}

#[tokio::test]
async fn login_falls_back_to_generic_submit() {
    let logs = temp_logs();
    let profile = SiteProfile::default();
    let page = site()
        .without_element(&profile.login_button())
        .with_element(profile.generic_submit(), MockElement::visible());
    let launcher = ScriptedLauncher::new(page);

    runner_for(&launcher)
        .run(&request(), &context_in(logs.path(), "88888888"))
        .await
        .unwrap();

    let actions = launcher.page().actions();
    assert!(actions.contains(&PageAction::Click(profile.generic_submit(), ClickMode::Pointer)));
    assert!(!actions.contains(&PageAction::PressKey(Key::Enter)));
}

#[tokio::test]
async fn unsettled_clicks_use_fallbacks() {
    let logs = temp_logs();
    let profile = SiteProfile::default();
    let launcher = ScriptedLauncher::new(site().failing_network_idle());

    let outcome = runner_for(&launcher)
        .run(&request(), &context_in(logs.path(), "99999999"))
        .await
        .unwrap();

    let actions = launcher.page().actions();
    assert!(actions.contains(&PageAction::Click(profile.login_button(), ClickMode::Force)));
    let search_clicks = actions
        .iter()
        .filter(|a| **a == PageAction::Click(profile.search_button(), ClickMode::Pointer))
        .count();
    assert_eq!(search_clicks, 2);
    assert_eq!(step_outcome(&outcome.steps, "login"), Some(StepOutcome::Ok));
    assert_eq!(step_outcome(&outcome.steps, "search"), Some(StepOutcome::Ok));
    // The menu waits for network idle without a fallback.
    assert_eq!(step_outcome(&outcome.steps, "menu"), Some(StepOutcome::Failed));
}

#[tokio::test]
async fn plate_falls_back_to_labelled_definition() {
    let logs = temp_logs();
    let profile = SiteProfile::default();
    let page = site()
        .without_element(&profile.plate_value())
        .with_element(profile.plate_label(), MockElement::with_text("Registration plate number:"))
        .with_element(profile.plate_label_value(), MockElement::with_text("  XYZ789 \n"));
    let launcher = ScriptedLauncher::new(page);

    let outcome = runner_for(&launcher)
        .run(&request(), &context_in(logs.path(), "aaaaaaaa"))
        .await
        .unwrap();

    assert_eq!(outcome.plate_number.as_deref(), Some("XYZ789"));
}

#[tokio::test]
async fn blank_plate_becomes_none() {
    let logs = temp_logs();
    let profile = SiteProfile::default();
    let page = site();
    page.set_element(profile.plate_value(), MockElement::with_text("   "));
    let launcher = ScriptedLauncher::new(page);

    let outcome = runner_for(&launcher)
        .run(&request(), &context_in(logs.path(), "bbbbbbbb"))
        .await
        .unwrap();

    assert_eq!(outcome.plate_number, None);
    assert_eq!(step_outcome(&outcome.steps, "extract"), Some(StepOutcome::Ok));
}

#[tokio::test]
async fn missing_watermark_hooks_are_ignored() {
    let logs = temp_logs();
    let profile = SiteProfile::default();
    let launcher = ScriptedLauncher::new(site().failing_evaluate());

    let outcome = runner_for(&launcher)
        .run(&request(), &context_in(logs.path(), "cccccccc"))
        .await
        .unwrap();

    assert_eq!(step_outcome(&outcome.steps, "vin"), Some(StepOutcome::Ok));
    let actions = launcher.page().actions();
    assert!(actions.contains(&PageAction::Evaluate(profile.vin_focus_hook.clone())));
    assert!(actions.contains(&PageAction::Evaluate(profile.vin_blur_hook.clone())));
}

#[tokio::test]
async fn launch_failure_is_fatal() {
    let logs = temp_logs();
    let launcher = ScriptedLauncher::failing("no chrome on PATH");
    let ctx = context_in(logs.path(), "dddddddd");

    let err = runner_for(&launcher).run(&request(), &ctx).await.unwrap_err();

    assert!(matches!(err, RunError::Launch(_)));
    assert!(err.to_string().contains("no chrome on PATH"));
    assert!(ctx.artifact_dir.is_dir());
}

#[tokio::test]
async fn menu_uses_root_flyout_when_nested_is_missing() {
    let logs = temp_logs();
    let profile = SiteProfile::default();
    let root_flyout = profile.serial_submenu_from_root();
    let page = site()
        .without_element(&profile.serial_submenu())
        .with_element(root_flyout.clone(), MockElement::visible())
        .with_element(
            SiteProfile::first_item_of(&root_flyout),
            MockElement::with_text("Motor vehicle"),
        );
    let launcher = ScriptedLauncher::new(page);

    let outcome = runner_for(&launcher)
        .run(&request(), &context_in(logs.path(), "eeeeeeee"))
        .await
        .unwrap();

    assert_eq!(step_outcome(&outcome.steps, "menu"), Some(StepOutcome::Ok));
    assert!(launcher
        .page()
        .clicked(&SiteProfile::first_item_of(&root_flyout)));
}
