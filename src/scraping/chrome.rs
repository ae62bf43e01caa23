// Headless Chrome backend for the page session traits
//
// One Chrome process per session: dropping the session kills the process,
// which gives every window a clean profile.

use anyhow::{Context, Result};
use headless_chrome::{Browser, LaunchOptions, Tab};
use std::ffi::OsStr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use super::session::{PageSession, SessionFactory, SessionIdentity};

/// Launches headless Chrome with a randomized identity
#[derive(Debug, Clone)]
pub struct ChromeSessionFactory {
    pub headless: bool,
    pub page_load_timeout: Duration,
    /// Chrome binary; auto-detected when unset
    pub chrome_path: Option<PathBuf>,
}

impl Default for ChromeSessionFactory {
    fn default() -> Self {
        Self {
            headless: true,
            page_load_timeout: Duration::from_secs(60),
            chrome_path: None,
        }
    }
}

impl SessionFactory for ChromeSessionFactory {
    fn launch(&self, identity: &SessionIdentity) -> Result<Box<dyn PageSession>> {
        info!("Launching headless Chrome browser");

        let user_agent_arg = format!("--user-agent={}", identity.user_agent);
        let window_arg = format!("--window-size={},{}", identity.viewport.0, identity.viewport.1);

        let options = LaunchOptions {
            headless: self.headless,
            sandbox: false,
            window_size: Some(identity.viewport),
            path: self.chrome_path.clone(),
            idle_browser_timeout: self.page_load_timeout * 10,
            args: vec![
                // Hide the automation flag navigator.webdriver is derived from
                OsStr::new("--disable-blink-features=AutomationControlled"),
                OsStr::new(&user_agent_arg),
                OsStr::new("--disable-dev-shm-usage"),
                OsStr::new("--disable-extensions"),
                OsStr::new("--disable-infobars"),
                OsStr::new("--no-first-run"),
                OsStr::new("--lang=en-US"),
                OsStr::new(&window_arg),
            ],
            ..Default::default()
        };

        let browser = Browser::new(options)
            .context("Failed to launch headless Chrome. Is Chrome/Chromium installed?")?;
        let tab = browser
            .new_tab()
            .context("Failed to create new browser tab")?;
        tab.set_default_timeout(self.page_load_timeout);

        if let Err(e) = tab.set_user_agent(&identity.user_agent, Some("en-US,en"), None) {
            debug!("Could not override user agent: {:#}", e);
        }
        if let Err(e) = tab.enable_stealth_mode() {
            debug!("Could not enable stealth mode: {:#}", e);
        }

        Ok(Box::new(ChromeSession {
            _browser: browser,
            tab,
        }))
    }
}

/// A Chrome process with the tab we drive
pub struct ChromeSession {
    // Keeps the process alive for as long as the tab is in use
    _browser: Browser,
    tab: Arc<Tab>,
}

impl PageSession for ChromeSession {
    fn navigate(&self, url: &str) -> Result<()> {
        self.tab
            .navigate_to(url)
            .with_context(|| format!("Failed to navigate to {}", url))?;
        self.tab
            .wait_until_navigated()
            .context("Timed out waiting for navigation")?;
        Ok(())
    }

    fn reload(&self) -> Result<()> {
        self.tab.reload(true, None).context("Failed to reload page")?;
        Ok(())
    }

    fn current_url(&self) -> Result<String> {
        let remote = self
            .tab
            .evaluate("window.location.href", false)
            .context("Failed to read current location")?;
        Ok(remote
            .value
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default())
    }

    fn title(&self) -> Result<String> {
        self.tab.get_title().context("Failed to read page title")
    }

    fn content(&self) -> Result<String> {
        self.tab.get_content().context("Failed to get page content")
    }

    fn evaluate_json(&self, script: &str) -> Result<Option<serde_json::Value>> {
        let remote = self
            .tab
            .evaluate(script, false)
            .context("Failed to evaluate script")?;
        let encoded = match remote.value {
            Some(serde_json::Value::String(s)) => s,
            Some(serde_json::Value::Null) | None => return Ok(None),
            // Already a JSON value (script did not stringify)
            Some(other) => return Ok(Some(other)),
        };
        let value: serde_json::Value =
            serde_json::from_str(&encoded).context("Script result is not valid JSON")?;
        Ok((!value.is_null()).then_some(value))
    }

    fn run_script(&self, script: &str) -> Result<()> {
        self.tab
            .evaluate(script, false)
            .context("Failed to run script")?;
        Ok(())
    }

    fn close(&self) -> Result<()> {
        self.tab.close(true).context("Failed to close tab")?;
        Ok(())
    }
}
