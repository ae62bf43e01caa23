// Calendar scraping core
//
// Drives one headless Chrome session at a time through the calendar site's
// bot checks and turns its pages into raw event records.

pub mod chrome;
pub mod extract;
pub mod markup;
pub mod navigation;
pub mod orchestrator;
pub mod pacing;
pub mod partition;
pub mod session;

pub use chrome::ChromeSessionFactory;
pub use extract::{CalendarExtractor, Extraction, ExtractionSource};
pub use navigation::{NavigationController, NavigationOutcome};
pub use orchestrator::{Orchestrator, RunStatus, RunSummary};
pub use pacing::{DelayRange, Pacing};
pub use session::{PageSession, SessionFactory, SessionHandle, SessionIdentity, SessionManager};
