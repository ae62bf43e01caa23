//! Navigation Controller
//!
//! Loads a URL into a session, retrying with growing randomized delays and
//! waiting out the bot-verification interstitial the calendar site serves.

use anyhow::Result;
use rand::Rng;
use tracing::{debug, info, warn};

use super::pacing::Pacing;
use super::session::{PageSession, SessionHandle, SessionManager};
use crate::error::{is_invalid_session, ScrapeError};

/// Text fragments (lowercase) that identify the verification interstitial.
/// The target serves it in English or French depending on geolocation.
pub const VERIFICATION_PHRASES: &[&str] = &[
    "we are verifying you are human",
    "please wait while your request is being verified",
    "checking your browser",
    "security check",
    "verifying your connection",
    "human verification",
    "cloudflare",
    "ddos protection",
    "nous vérifions que vous êtes humain",
    "cette opération peut prendre quelques secondes",
    "doit vérifier la sécurité de votre connexion",
    "www.forexfactory.com doit vérifier",
];

/// How a navigation ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationOutcome {
    Loaded,
    /// The last attempt was stuck on the verification page
    VerificationExhausted,
    Failed,
}

impl NavigationOutcome {
    pub fn is_loaded(&self) -> bool {
        matches!(self, NavigationOutcome::Loaded)
    }
}

enum Attempt {
    Loaded,
    Verification,
    Retry(&'static str),
}

enum VerificationWait {
    Cleared,
    NotCleared,
    SessionReplaced,
}

pub struct NavigationController {
    retry_attempts: u32,
    pacing: Pacing,
}

impl NavigationController {
    pub fn new(retry_attempts: u32, pacing: Pacing) -> Self {
        Self {
            retry_attempts: retry_attempts.max(1),
            pacing,
        }
    }

    pub fn retry_attempts(&self) -> u32 {
        self.retry_attempts
    }

    /// Load `url` in the handle's session.
    ///
    /// The handle may be replaced by a fresh session along the way. Never
    /// returns an error: every failure ends up as a non-`Loaded` outcome.
    pub fn navigate(
        &self,
        sessions: &mut SessionManager,
        handle: &mut SessionHandle,
        url: &str,
    ) -> NavigationOutcome {
        let mut stuck_on_verification = false;

        for attempt in 0..self.retry_attempts {
            self.pacing.pause(self.pacing.before_attempt(attempt));
            info!(
                "Navigating to {} (attempt {}/{})",
                url,
                attempt + 1,
                self.retry_attempts
            );

            match self.attempt(sessions, handle, url) {
                Ok(Attempt::Loaded) => return NavigationOutcome::Loaded,
                Ok(Attempt::Verification) => {
                    warn!("Verification page did not clear for {}", url);
                    stuck_on_verification = true;
                }
                Ok(Attempt::Retry(reason)) => {
                    warn!("Retrying {}: {}", url, reason);
                    stuck_on_verification = false;
                }
                Err(e) => {
                    stuck_on_verification = false;
                    if let Some(ScrapeError::SessionSetup(_)) = e.downcast_ref::<ScrapeError>() {
                        warn!("Giving up on {}: {:#}", url, e);
                        return NavigationOutcome::Failed;
                    }
                    warn!("Navigation attempt {} failed for {}: {:#}", attempt + 1, url, e);
                    if is_invalid_session(&e) || !sessions.is_alive(handle) {
                        handle.mark_lost();
                    }
                }
            }
        }

        if stuck_on_verification {
            warn!("{}", ScrapeError::VerificationTimeout { url: url.to_string() });
            NavigationOutcome::VerificationExhausted
        } else {
            warn!(
                "{}",
                ScrapeError::NavigationFailed {
                    url: url.to_string(),
                    attempts: self.retry_attempts
                }
            );
            NavigationOutcome::Failed
        }
    }

    fn attempt(
        &self,
        sessions: &mut SessionManager,
        handle: &mut SessionHandle,
        url: &str,
    ) -> Result<Attempt> {
        if handle.is_released() || handle.session_lost() {
            sessions.recreate(handle)?;
        }

        {
            let page = handle.page()?;
            page.navigate(url)?;
            self.simulate_human(page);
        }
        self.pacing.pause(self.pacing.post_load_wait);

        if self.on_verification_page(handle.page()?)? {
            match self.wait_out_verification(sessions, handle, self.pacing.verification_max_wait)? {
                VerificationWait::Cleared => {}
                VerificationWait::NotCleared => return Ok(Attempt::Verification),
                VerificationWait::SessionReplaced => {
                    return Ok(Attempt::Retry("session replaced during verification"))
                }
            }
        }

        let page = handle.page()?;
        if page.title()?.contains("404") {
            return Ok(Attempt::Retry("page title reports 404"));
        }
        if page.content()?.contains("403") {
            return Ok(Attempt::Retry("page content reports 403"));
        }

        // The challenge sometimes appears only after the page settles
        self.pacing.pause(self.pacing.settle_wait);
        if self.on_verification_page(handle.page()?)? {
            info!("Late verification page on {}", url);
            let max_wait = self.pacing.delayed_verification_max_wait;
            match self.wait_out_verification(sessions, handle, max_wait)? {
                VerificationWait::Cleared => {}
                VerificationWait::NotCleared => return Ok(Attempt::Verification),
                VerificationWait::SessionReplaced => {
                    return Ok(Attempt::Retry("session replaced during verification"))
                }
            }
        }

        Ok(Attempt::Loaded)
    }

    /// True when the page text or title carries a known challenge phrase
    pub fn on_verification_page(&self, page: &dyn PageSession) -> Result<bool> {
        let title = page.title()?.to_lowercase();
        let content = page.content()?.to_lowercase();
        Ok(VERIFICATION_PHRASES
            .iter()
            .any(|phrase| title.contains(phrase) || content.contains(phrase)))
    }

    fn wait_out_verification(
        &self,
        sessions: &mut SessionManager,
        handle: &mut SessionHandle,
        max_wait: f64,
    ) -> Result<VerificationWait> {
        let polls = self.pacing.poll_count(max_wait);
        info!("Verification page detected, waiting up to {:.0}s", max_wait);

        for poll in 1..=polls {
            self.pacing.pause_secs(self.pacing.verification_poll);

            if !sessions.is_alive(handle) {
                warn!("Session died while waiting for verification");
                sessions.recreate(handle)?;
                return Ok(VerificationWait::SessionReplaced);
            }
            if !self.on_verification_page(handle.page()?)? {
                info!("Verification cleared after {} poll(s)", poll);
                return self.after_verification(sessions, handle);
            }
            debug!("Still verifying ({}/{})", poll, polls);
        }

        warn!("Verification still present, refreshing the page");
        handle.page()?.reload()?;
        self.pacing.pause_secs(self.pacing.refresh_wait);
        if self.on_verification_page(handle.page()?)? {
            return Ok(VerificationWait::NotCleared);
        }
        self.after_verification(sessions, handle)
    }

    fn after_verification(
        &self,
        sessions: &mut SessionManager,
        handle: &mut SessionHandle,
    ) -> Result<VerificationWait> {
        self.pacing.pause_secs(self.pacing.post_verification_wait);
        if sessions.is_alive(handle) {
            Ok(VerificationWait::Cleared)
        } else {
            // The site tends to drop the session right after the challenge
            sessions.recreate(handle)?;
            Ok(VerificationWait::SessionReplaced)
        }
    }

    /// Scroll and pointer movement; failures are ignored
    fn simulate_human(&self, page: &dyn PageSession) {
        let (scroll_y, dx, dy) = {
            let mut rng = rand::thread_rng();
            (
                rng.gen_range(100..=500),
                rng.gen_range(50..=200),
                rng.gen_range(50..=200),
            )
        };

        if let Err(e) = page.run_script(&format!("window.scrollTo(0, {});", scroll_y)) {
            debug!("Scroll simulation failed: {:#}", e);
        }
        self.pacing.pause(self.pacing.human_pause);

        let pointer = format!(
            "document.dispatchEvent(new MouseEvent('mousemove', \
             {{clientX: {}, clientY: {}, bubbles: true}}));",
            dx, dy
        );
        if let Err(e) = page.run_script(&pointer) {
            debug!("Pointer simulation failed: {:#}", e);
        }
        self.pacing.pause(self.pacing.human_pause);
    }
}
