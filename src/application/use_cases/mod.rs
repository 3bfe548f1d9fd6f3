pub mod preview_selector;
pub mod session_flow;
pub mod session_store;
pub mod table_inspector;
