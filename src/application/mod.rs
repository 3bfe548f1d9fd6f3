pub mod use_cases;

pub use use_cases::session_flow::{PreviewLimits, SessionFlow};
pub use use_cases::session_store::SessionStore;
