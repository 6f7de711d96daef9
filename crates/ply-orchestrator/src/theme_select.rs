//! Theme resolution (spec §4.9, §7): the settings load order used both to
//! pick which `.plymouth` file to load for a plain "show-splash" request
//! and to construct the right [`ThemePlugin`] once a [`ThemeInfo`] is in
//! hand.
//!
//! Grounded on `original_source/src/main.c`'s theme-path fallback chain;
//! the built-in/dynamic dispatch mirrors `ply-theme/src/discovery.rs`'s
//! `ThemeInfo::module_path` convention.

use std::path::{Path, PathBuf};

use ply_core::config::{DaemonSettings, IniDocument};
use ply_core::{Error, Result};
use ply_theme::{discovery, DynamicTheme, FadeTheme, ScriptTheme, SpinfinityTheme, TextTheme, ThemeInfo, ThemePlugin};

/// Hard-coded distribution fallback (spec.md §4.9): a single file path,
/// not a `<search>/<name>` pair, since it is meant to survive even when
/// the themes directory layout changes.
const HARD_CODED_FALLBACK: &str = "/usr/share/plymouth/themes/default.plymouth";

const THEMES_SEARCH_PATH: &str = "/usr/share/plymouth/themes";
const CONF_PATH: &str = "/etc/plymouth/plymouthd.conf";
const DEFAULTS_PATH: &str = "/usr/share/plymouth/plymouthd.defaults";

/// Resolve which theme to show, following spec.md §4.9's chain in order:
/// kernel cmdline override, `plymouthd.conf`, `plymouthd.defaults`, the
/// hard-coded distribution fallback, then the built-in `text` theme as
/// the last resort that can never fail to load.
pub fn resolve_theme(kernel_theme_override: Option<&str>) -> Result<ThemeInfo> {
    if let Some(name) = kernel_theme_override {
        if let Ok(info) = discovery::load_theme(Path::new(THEMES_SEARCH_PATH), name) {
            return Ok(info);
        }
    }

    if let Some(name) = daemon_setting_theme(Path::new(CONF_PATH)) {
        if let Ok(info) = discovery::load_theme(Path::new(THEMES_SEARCH_PATH), &name) {
            return Ok(info);
        }
    }

    if let Some(name) = daemon_setting_theme(Path::new(DEFAULTS_PATH)) {
        if let Ok(info) = discovery::load_theme(Path::new(THEMES_SEARCH_PATH), &name) {
            return Ok(info);
        }
    }

    if let Ok(info) = discovery::load_theme_file(Path::new(HARD_CODED_FALLBACK)) {
        return Ok(info);
    }

    Ok(ThemeInfo {
        name: "text".to_string(),
        description: Some("built-in fallback, no .plymouth file found".to_string()),
        module_name: "text".to_string(),
        directory: PathBuf::new(),
    })
}

fn daemon_setting_theme(path: &Path) -> Option<String> {
    let doc = IniDocument::load(path).ok()?;
    DaemonSettings::from_document(&doc).theme
}

/// Construct the theme named by `info.module_name`: one of the four
/// built-ins, or a dynamically loaded `.so` for anything else (spec §4.7's
/// closing line: "anything else is loaded from `<dir>/<module_name>.so`").
pub fn build_theme(info: &ThemeInfo, logo_path: Option<PathBuf>) -> Result<Box<dyn ThemePlugin>> {
    match info.module_name.as_str() {
        "fade-in" => Ok(Box::new(FadeTheme::load(&info.directory)?)),
        "spinfinity" => Ok(Box::new(SpinfinityTheme::load(&info.directory, "throbber-")?)),
        "text" => Ok(Box::new(TextTheme::new())),
        "script" => {
            let script_name = format!("{}.script", info.name);
            Ok(Box::new(ScriptTheme::load(&info.directory, &script_name, logo_path)?))
        }
        other => {
            let path = info.module_path();
            DynamicTheme::load(&path)
                .map(|t| Box::new(t) as Box<dyn ThemePlugin>)
                .map_err(|e| Error::theme(format!("{other}: {e}")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_theme(dir: &Path, name: &str, module: &str) {
        let theme_dir = dir.join(name);
        std::fs::create_dir_all(&theme_dir).unwrap();
        std::fs::write(
            theme_dir.join(format!("{name}.plymouth")),
            format!("[Plymouth Theme]\nName={name}\nModuleName={module}\n"),
        )
        .unwrap();
    }

    #[test]
    fn build_theme_constructs_the_asset_free_text_builtin() {
        let info = ThemeInfo {
            name: "text".to_string(),
            description: None,
            module_name: "text".to_string(),
            directory: PathBuf::new(),
        };
        assert!(build_theme(&info, None).is_ok());
    }

    #[test]
    fn build_theme_rejects_unresolvable_dynamic_module() {
        let info = ThemeInfo {
            name: "mystery".to_string(),
            description: None,
            module_name: "mystery".to_string(),
            directory: PathBuf::from("/nonexistent/theme/dir"),
        };
        assert!(build_theme(&info, None).is_err());
    }

    #[test]
    fn resolve_theme_falls_back_to_builtin_text_when_nothing_is_installed() {
        let info = resolve_theme(Some("does-not-exist-anywhere")).unwrap();
        assert_eq!(info.module_name, "text");
    }

    #[test]
    fn discover_themes_ignores_this_modules_own_fixture_dir_naming() {
        let dir = tempfile::tempdir().unwrap();
        write_theme(dir.path(), "spinner", "spinfinity");
        let info = discovery::load_theme(dir.path(), "spinner").unwrap();
        assert_eq!(info.module_name, "spinfinity");
    }
}
