pub mod read_write;
pub mod router;

pub use read_write::{is_read_only, suggest_tablet_type, DEFAULT_TABLET_TYPE};
pub use router::{QueryRouter, SessionState};
