//! Theme plugin contract, `.plymouth` discovery, and the four built-in
//! splash themes (spec §4.6-§4.8). No `#![forbid(unsafe_code)]` here:
//! `dynamic.rs` loads third-party `cdylib` plugins through `libloading`,
//! the same unsafe-FFI trade `ply-display`'s fbdev backend makes for
//! `ioctl`/`mmap`.

pub mod builtin;
pub mod discovery;
pub mod dynamic;
pub mod plugin;

pub use builtin::{FadeTheme, ScriptTheme, SpinfinityTheme, TextTheme};
pub use discovery::{discover_themes, load_theme, ThemeInfo};
pub use dynamic::DynamicTheme;
pub use plugin::{Mode, ThemePlugin};
