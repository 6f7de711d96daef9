//! The four themes compiled directly into `plymouthd` rather than loaded
//! as `.so` plugins (spec §4.7's closing line): `fade-in`, `spinfinity`,
//! `text`, and `script`. `discovery.rs`'s built-in module name list is
//! what resolves a `.plymouth` file's `ModuleName=` to one of these.

pub mod fade;
pub mod script;
pub mod spinfinity;
pub mod text;

pub use fade::FadeTheme;
pub use script::ScriptTheme;
pub use spinfinity::SpinfinityTheme;
pub use text::TextTheme;
