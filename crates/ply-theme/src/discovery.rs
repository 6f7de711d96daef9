//! `.plymouth` theme discovery (spec §4.7, §6): each theme lives in its own
//! directory under the theme search path as `<name>/<name>.plymouth`, an
//! INI file with a `[Plymouth Theme]` section naming the theme and, for
//! dynamic themes, the shared object to load.
//!
//! Grounded on `original_source/src/main.c`'s `find_theme_path` / theme
//! directory scan and reusing `ply_core::config::IniDocument` for the
//! file grammar itself, the same type `plymouthd.conf` uses.

use std::path::{Path, PathBuf};

use ply_core::config::IniDocument;
use ply_core::{Error, Result};

const SECTION: &str = "Plymouth Theme";

/// The parsed contents of one `<name>.plymouth` file plus where it lives,
/// enough to either construct a built-in theme by name or load a dynamic
/// one via `ModuleName`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThemeInfo {
    pub name: String,
    pub description: Option<String>,
    /// `ModuleName=` without extension, e.g. `fade-in`; built-in names
    /// (`fade-in`, `spinfinity`, `text`, `script`) are handled without a
    /// `dlopen` at all (spec §4.7), anything else is loaded from
    /// `<dir>/<module_name>.so` via `dynamic::DynamicTheme::load`.
    pub module_name: String,
    pub directory: PathBuf,
}

impl ThemeInfo {
    fn parse(directory: PathBuf, text: &str) -> Result<Self> {
        let doc = IniDocument::parse(text)?;
        let name = doc
            .get(SECTION, "Name")
            .ok_or_else(|| Error::theme(format!("{}: missing Name=", directory.display())))?
            .to_string();
        let module_name = doc
            .get(SECTION, "ModuleName")
            .ok_or_else(|| Error::theme(format!("{}: missing ModuleName=", directory.display())))?
            .to_string();
        let description = doc.get(SECTION, "Description").map(str::to_string);
        Ok(Self {
            name,
            description,
            module_name,
            directory,
        })
    }

    /// Path the `ModuleName` entry resolves to for dynamic loading, e.g.
    /// `<directory>/<module_name>.so`.
    pub fn module_path(&self) -> PathBuf {
        self.directory.join(format!("{}.so", self.module_name))
    }
}

/// Load a single theme by directory name under `search_path`, following
/// `<search_path>/<theme_name>/<theme_name>.plymouth`.
pub fn load_theme(search_path: &Path, theme_name: &str) -> Result<ThemeInfo> {
    let directory = search_path.join(theme_name);
    let file = directory.join(format!("{theme_name}.plymouth"));
    let text = std::fs::read_to_string(&file)?;
    ThemeInfo::parse(directory, &text)
}

/// Load a `.plymouth` file given directly by path, rather than resolved
/// from `<search_path>/<name>/<name>.plymouth`. Used to resolve the
/// hard-coded distribution fallback path (spec.md §4.9's settings load
/// order), which names a single file rather than a theme directory name.
pub fn load_theme_file(path: &Path) -> Result<ThemeInfo> {
    let text = std::fs::read_to_string(path)?;
    let directory = path.parent().unwrap_or_else(|| Path::new(".")).to_path_buf();
    ThemeInfo::parse(directory, &text)
}

/// Enumerate every theme installed under `search_path`, skipping entries
/// that aren't directories or don't carry a matching `.plymouth` file
/// rather than failing the whole scan (a stray file in the themes
/// directory shouldn't take down discovery).
pub fn discover_themes(search_path: &Path) -> Result<Vec<ThemeInfo>> {
    let mut themes = Vec::new();
    let entries = match std::fs::read_dir(search_path) {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(themes),
        Err(err) => return Err(err.into()),
    };

    for entry in entries {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        match load_theme(search_path, name) {
            Ok(info) => themes.push(info),
            Err(_) => continue,
        }
    }

    themes.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(themes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_theme(dir: &Path, name: &str, module: &str) {
        let theme_dir = dir.join(name);
        std::fs::create_dir_all(&theme_dir).unwrap();
        std::fs::write(
            theme_dir.join(format!("{name}.plymouth")),
            format!(
                "[Plymouth Theme]\nName={name}\nDescription=a test theme\nModuleName={module}\n"
            ),
        )
        .unwrap();
    }

    #[test]
    fn loads_a_single_theme_by_name() {
        let dir = tempfile::tempdir().unwrap();
        write_theme(dir.path(), "spinner", "spinfinity");
        let info = load_theme(dir.path(), "spinner").unwrap();
        assert_eq!(info.name, "spinner");
        assert_eq!(info.module_name, "spinfinity");
        assert_eq!(info.description.as_deref(), Some("a test theme"));
    }

    #[test]
    fn discovers_every_theme_under_the_search_path() {
        let dir = tempfile::tempdir().unwrap();
        write_theme(dir.path(), "alpha", "text");
        write_theme(dir.path(), "beta", "fade-in");
        std::fs::write(dir.path().join("not-a-theme.txt"), "junk").unwrap();

        let themes = discover_themes(dir.path()).unwrap();
        let names: Vec<_> = themes.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["alpha", "beta"]);
    }

    #[test]
    fn missing_search_path_yields_an_empty_list_not_an_error() {
        let themes = discover_themes(Path::new("/nonexistent/themes/path")).unwrap();
        assert!(themes.is_empty());
    }

    #[test]
    fn rejects_a_file_missing_modulename() {
        let dir = tempfile::tempdir().unwrap();
        let theme_dir = dir.path().join("broken");
        std::fs::create_dir_all(&theme_dir).unwrap();
        std::fs::write(
            theme_dir.join("broken.plymouth"),
            "[Plymouth Theme]\nName=broken\n",
        )
        .unwrap();
        let err = load_theme(dir.path(), "broken").unwrap_err();
        assert!(matches!(err, Error::Theme(_)));
    }
}
