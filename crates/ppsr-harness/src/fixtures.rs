//! A mock PPSR site served over HTTP.
//!
//! The pages reuse the production element ids and menu structure, so the
//! default [`SiteProfile`](ppsr_runner::SiteProfile) works against it
//! unchanged once the target URL points at [`MockPpsrSite::login_url`]. Used
//! by the Chrome-backed end-to-end tests.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::extract::{Query, State};
use axum::response::Html;
use axum::routing::get;
use axum::Router;

const MENU_STYLE: &str = r#"
<style>
  #mainMenu, #mainMenu ul { list-style: none; margin: 0; padding: 0; }
  #mainMenu li { position: relative; display: block; width: 220px; padding: 6px; }
  #mainMenu ul.childmenu { display: none; position: absolute; left: 0; top: 100%; background: #eef; }
  #mainMenu ul.childmenu ul.childmenu { left: 100%; top: 0; }
  #mainMenu li:hover > ul.childmenu { display: block; }
</style>
"#;

fn login_page() -> String {
    r#"<!doctype html>
<html><head><title>PPSR Login</title></head><body>
<form action="/ppsr/Home" method="get">
  <label>Username <input type="text" name="username"></label>
  <label>Password <input type="password" name="password"></label>
  <label><input type="checkbox" id="ctl00_ctl00_m_cpContent_cbDeclaration_cbDeclaration"> I agree</label>
  <input type="submit" id="ctl00_ctl00_m_cpContent_btnLogin" value="Log in">
</form>
</body></html>"#
        .to_string()
}

fn home_page() -> String {
    format!(
        r##"<!doctype html>
<html><head><title>PPSR Home</title>{MENU_STYLE}</head><body>
<ul id="mainMenu">
  <li><a href="/ppsr/Home">Home</a></li>
  <li><a href="#">PPSR Search</a>
    <ul class="childmenu">
      <li><a href="#">Search by serial number</a>
        <ul class="childmenu">
          <li><a href="/ppsr/SearchBySerialNumber">Motor vehicle</a></li>
          <li><a href="#">Aircraft</a></li>
        </ul>
      </li>
      <li><a href="#">Search by grantor</a></li>
    </ul>
  </li>
</ul>
</body></html>"##
    )
}

fn search_page() -> String {
    r#"<!doctype html>
<html><head><title>Search by serial number</title>
<script>
  function OnWatermarkTextboxFocus(id) { document.getElementById(id).classList.remove('watermark'); }
  function OnWatermarkTextboxBlur(id) { }
</script></head><body>
<form action="/ppsr/Results" method="get">
  <input type="text" class="watermark" name="vin" id="ctl00_ctl00_m_cpProgressWizard_ucPW_ucSN_ucSN_txtVIN">
  <label><input type="checkbox" id="ctl00_ctl00_m_cpProgressWizard_ucPW_ucSN_ucDeclarationCheckboxAndContent_cbDeclaration"> I declare</label>
  <input type="submit" id="ctl00_ctl00_m_cpProgressWizard_ucPW_btnNext" value="Search">
</form>
</body></html>"#
        .to_string()
}

fn results_page(plate: &str) -> String {
    format!(
        r#"<!doctype html>
<html><head><title>Search results</title></head><body>
<dl>
  <dt>Registration plate number:</dt>
  <dd><span id="ctl00_ctl00_m_cpProgressWizard_ucPW_ucR_ucRM_ucNevdisInformationForMultiple_rptMotorVehicles_ctl00_lblPlateNumberValue">{plate}</span></dd>
</dl>
</body></html>"#
    )
}

/// Shared state of a running mock site.
#[derive(Debug)]
struct SiteState {
    plate: String,
    /// VINs submitted to the results page, in order.
    searches: Mutex<Vec<String>>,
}

/// A running mock PPSR site on an ephemeral local port.
///
/// The server task is aborted when this value is dropped.
pub struct MockPpsrSite {
    addr: SocketAddr,
    state: Arc<SiteState>,
    task: tokio::task::JoinHandle<()>,
}

impl MockPpsrSite {
    /// Serve the site; the results page shows `plate`.
    pub async fn start(plate: impl Into<String>) -> std::io::Result<Self> {
        let state = Arc::new(SiteState {
            plate: plate.into(),
            searches: Mutex::new(Vec::new()),
        });
        let app = Router::new()
            .route("/ppsr/Login", get(|| async { Html(login_page()) }))
            .route("/ppsr/Home", get(|| async { Html(home_page()) }))
            .route(
                "/ppsr/SearchBySerialNumber",
                get(|| async { Html(search_page()) }),
            )
            .route("/ppsr/Results", get(results_handler))
            .with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let task = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                tracing::warn!(error = %e, "mock site stopped");
            }
        });
        Ok(Self { addr, state, task })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn login_url(&self) -> String {
        format!("http://{}/ppsr/Login", self.addr)
    }

    /// VINs received by the results page.
    pub fn searches(&self) -> Vec<String> {
        self.state
            .searches
            .lock()
            .expect("mock site lock poisoned")
            .clone()
    }
}

impl Drop for MockPpsrSite {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn results_handler(
    State(state): State<Arc<SiteState>>,
    Query(params): Query<HashMap<String, String>>,
) -> Html<String> {
    let vin = params.get("vin").cloned().unwrap_or_default();
    state
        .searches
        .lock()
        .expect("mock site lock poisoned")
        .push(vin);
    Html(results_page(&state.plate))
}
