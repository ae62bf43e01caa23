//! Page Session Manager
//!
//! Owns the lifecycle of one remote browser session at a time: create it with
//! a randomized identity, probe it for liveness, recreate it after the remote
//! side invalidates it, and tear it down between windows so the next window
//! starts with fresh cookies and a fresh fingerprint.

use anyhow::Result;
use rand::seq::SliceRandom;
use rand::Rng;
use tracing::{debug, info, warn};

use super::pacing::Pacing;
use crate::error::{is_invalid_session, ScrapeError};

/// User agents rotated across sessions
pub const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36",
];

/// Scripts run right after a session starts to hide automation markers
pub const STEALTH_DIRECTIVES: &[&str] = &[
    "Object.defineProperty(navigator, 'webdriver', {get: () => undefined})",
    "Object.defineProperty(navigator, 'plugins', {get: () => [1, 2, 3, 4, 5]})",
    "Object.defineProperty(navigator, 'languages', {get: () => ['en-US', 'en']})",
    "window.chrome = { runtime: {} }",
    "Object.defineProperty(navigator, 'permissions', {get: () => ({ query: () => Promise.resolve({ state: 'granted' }) })})",
];

/// Browser-visible identity of one session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionIdentity {
    pub user_agent: String,
    pub viewport: (u32, u32),
}

impl SessionIdentity {
    /// Random user agent from the pool and a random desktop viewport
    pub fn random() -> Self {
        let mut rng = rand::thread_rng();
        let user_agent = USER_AGENTS
            .choose(&mut rng)
            .copied()
            .unwrap_or(USER_AGENTS[0])
            .to_string();
        let viewport = (rng.gen_range(1200..=1920), rng.gen_range(800..=1080));
        Self {
            user_agent,
            viewport,
        }
    }
}

/// Operations the scrape core needs from a live browser page.
///
/// Implemented over headless Chrome in `chrome.rs`; tests plug in scripted
/// pages. Errors are reported as-is so callers can classify them with
/// `is_invalid_session`.
pub trait PageSession: Send {
    fn navigate(&self, url: &str) -> Result<()>;

    fn reload(&self) -> Result<()>;

    fn current_url(&self) -> Result<String>;

    fn title(&self) -> Result<String>;

    /// Rendered HTML of the current document
    fn content(&self) -> Result<String>;

    /// Evaluate a script that yields a JSON-encoded string. `None` when the
    /// script yields `null`/`undefined`.
    fn evaluate_json(&self, script: &str) -> Result<Option<serde_json::Value>>;

    /// Run a script for its side effects
    fn run_script(&self, script: &str) -> Result<()>;

    fn close(&self) -> Result<()>;
}

/// Starts browser sessions
pub trait SessionFactory: Send {
    fn launch(&self, identity: &SessionIdentity) -> Result<Box<dyn PageSession>>;
}

/// Exclusive owner of one live session
pub struct SessionHandle {
    id: u64,
    identity: SessionIdentity,
    page: Option<Box<dyn PageSession>>,
    session_lost: bool,
}

impl SessionHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn identity(&self) -> &SessionIdentity {
        &self.identity
    }

    /// Set once a liveness probe or a command saw an invalidated session
    pub fn session_lost(&self) -> bool {
        self.session_lost
    }

    pub fn mark_lost(&mut self) {
        self.session_lost = true;
    }

    pub fn is_released(&self) -> bool {
        self.page.is_none()
    }

    /// The live page, or `SessionInvalidated` once released
    pub fn page(&self) -> Result<&dyn PageSession> {
        match self.page.as_deref() {
            Some(page) => Ok(page),
            None => Err(ScrapeError::SessionInvalidated(format!(
                "session #{} already closed",
                self.id
            ))
            .into()),
        }
    }

    fn close_page(&mut self) {
        if let Some(page) = self.page.take() {
            match page.close() {
                Ok(()) => debug!("Closed browser session #{}", self.id),
                Err(e) => warn!("Error closing browser session #{}: {:#}", self.id, e),
            }
        }
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        self.close_page();
    }
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("id", &self.id)
            .field("identity", &self.identity)
            .field("released", &self.is_released())
            .field("session_lost", &self.session_lost)
            .finish()
    }
}

/// Creates, validates, recreates and releases sessions
pub struct SessionManager {
    factory: Box<dyn SessionFactory>,
    pacing: Pacing,
    next_id: u64,
    created: u64,
}

impl SessionManager {
    pub fn new(factory: Box<dyn SessionFactory>, pacing: Pacing) -> Self {
        Self {
            factory,
            pacing,
            next_id: 1,
            created: 0,
        }
    }

    /// How many sessions were successfully started so far
    pub fn sessions_created(&self) -> u64 {
        self.created
    }

    /// Start a session with a fresh random identity
    pub fn acquire(&mut self) -> std::result::Result<SessionHandle, ScrapeError> {
        let identity = SessionIdentity::random();
        let id = self.next_id;
        self.next_id += 1;

        info!(
            "Starting browser session #{} ({}x{})",
            id, identity.viewport.0, identity.viewport.1
        );
        let page = self
            .factory
            .launch(&identity)
            .map_err(|e| ScrapeError::SessionSetup(format!("{:#}", e)))?;

        for script in STEALTH_DIRECTIVES {
            if let Err(e) = page.run_script(script) {
                debug!("Could not apply stealth directive: {:#}", e);
            }
        }

        self.created += 1;
        Ok(SessionHandle {
            id,
            identity,
            page: Some(page),
            session_lost: false,
        })
    }

    /// Cheap liveness probe (reads the current location).
    ///
    /// Marks the handle lost when the failure says the session was invalidated.
    pub fn is_alive(&self, handle: &mut SessionHandle) -> bool {
        let reply = match handle.page() {
            Ok(page) => page.current_url(),
            Err(_) => return false,
        };
        match reply {
            Ok(_) => true,
            Err(e) if is_invalid_session(&e) => {
                warn!("Browser session #{} became invalid: {:#}", handle.id, e);
                handle.mark_lost();
                false
            }
            Err(e) => {
                debug!("Browser session #{} not responsive: {:#}", handle.id, e);
                false
            }
        }
    }

    /// Close `handle` (best effort), pause, and replace it with a new session.
    ///
    /// On failure the handle is left released.
    pub fn recreate(&mut self, handle: &mut SessionHandle) -> std::result::Result<(), ScrapeError> {
        warn!("Reinitializing browser session #{}", handle.id);
        self.release(handle);
        self.pacing.pause(self.pacing.recreate_pause);

        let fresh = self.acquire()?;
        info!(
            "Browser session #{} replaced by #{}",
            handle.id,
            fresh.id()
        );
        *handle = fresh;
        Ok(())
    }

    /// Close the session. Idempotent and never fails.
    pub fn release(&self, handle: &mut SessionHandle) {
        handle.close_page();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct StubPage {
        fail_probe_with: Option<&'static str>,
        closes: Arc<AtomicUsize>,
    }

    impl PageSession for StubPage {
        fn navigate(&self, _url: &str) -> Result<()> {
            Ok(())
        }
        fn reload(&self) -> Result<()> {
            Ok(())
        }
        fn current_url(&self) -> Result<String> {
            match self.fail_probe_with {
                Some(msg) => Err(anyhow::anyhow!(msg)),
                None => Ok("about:blank".to_string()),
            }
        }
        fn title(&self) -> Result<String> {
            Ok(String::new())
        }
        fn content(&self) -> Result<String> {
            Ok(String::new())
        }
        fn evaluate_json(&self, _script: &str) -> Result<Option<serde_json::Value>> {
            Ok(None)
        }
        fn run_script(&self, _script: &str) -> Result<()> {
            Err(anyhow::anyhow!("scripts disabled"))
        }
        fn close(&self) -> Result<()> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct StubFactory {
        fail: bool,
        fail_probe_with: Option<&'static str>,
        closes: Arc<AtomicUsize>,
    }

    impl SessionFactory for StubFactory {
        fn launch(&self, _identity: &SessionIdentity) -> Result<Box<dyn PageSession>> {
            if self.fail {
                anyhow::bail!("chrome binary not found");
            }
            Ok(Box::new(StubPage {
                fail_probe_with: self.fail_probe_with,
                closes: self.closes.clone(),
            }))
        }
    }

    fn manager(fail: bool, probe: Option<&'static str>) -> (SessionManager, Arc<AtomicUsize>) {
        let closes = Arc::new(AtomicUsize::new(0));
        let factory = StubFactory {
            fail,
            fail_probe_with: probe,
            closes: closes.clone(),
        };
        (
            SessionManager::new(Box::new(factory), Pacing::immediate()),
            closes,
        )
    }

    #[test]
    fn identity_uses_pool_and_viewport_bounds() {
        let identity = SessionIdentity::random();
        assert!(USER_AGENTS.contains(&identity.user_agent.as_str()));
        assert!((1200..=1920).contains(&identity.viewport.0));
        assert!((800..=1080).contains(&identity.viewport.1));
    }

    #[test]
    fn acquire_failure_is_setup_error() {
        let (mut sessions, _) = manager(true, None);
        let err = sessions.acquire().unwrap_err();
        assert!(matches!(err, ScrapeError::SessionSetup(_)));
        assert_eq!(sessions.sessions_created(), 0);
    }

    #[test]
    fn stealth_failures_do_not_block_acquire() {
        let (mut sessions, _) = manager(false, None);
        let handle = sessions.acquire().unwrap();
        assert!(!handle.is_released());
        assert_eq!(sessions.sessions_created(), 1);
    }

    #[test]
    fn invalid_session_probe_marks_handle() {
        let (mut sessions, _) = manager(false, Some("invalid session id"));
        let mut handle = sessions.acquire().unwrap();
        assert!(!sessions.is_alive(&mut handle));
        assert!(handle.session_lost());
    }

    #[test]
    fn other_probe_errors_are_not_flagged() {
        let (mut sessions, _) = manager(false, Some("timeout"));
        let mut handle = sessions.acquire().unwrap();
        assert!(!sessions.is_alive(&mut handle));
        assert!(!handle.session_lost());
    }

    #[test]
    fn release_is_idempotent() {
        let (mut sessions, closes) = manager(false, None);
        let mut handle = sessions.acquire().unwrap();
        sessions.release(&mut handle);
        sessions.release(&mut handle);
        drop(handle);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn recreate_swaps_identity() {
        let (mut sessions, closes) = manager(false, None);
        let mut handle = sessions.acquire().unwrap();
        let first = handle.id();
        sessions.recreate(&mut handle).unwrap();
        assert_ne!(handle.id(), first);
        assert!(!handle.is_released());
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }
}
