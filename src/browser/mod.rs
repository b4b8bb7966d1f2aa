pub mod behavior;
pub mod gate;
pub mod interstitial;
pub mod page;
pub mod session;

// Re-export common types
pub use behavior::BehaviorSimulator;
pub use gate::{GateDecision, GateRules, ResourceGate, ResourceKind};
pub use interstitial::{InterstitialHandler, InterstitialState};
pub use page::{PageDriver, PageLauncher};
pub use session::{BrowserSession, WebDriverLauncher};
