//! Central state machine tying every other crate together: seat lifecycle
//! from `ply-device`, theme lifecycle from `ply-theme`, the control socket
//! from `ply-boot-server`, and progress estimation from `ply-progress`
//! (spec §4.9).

mod orchestrator;
mod theme_select;

pub use orchestrator::{Orchestrator, State};
pub use theme_select::{build_theme, resolve_theme};
