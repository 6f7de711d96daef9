//! Kernel command-line parsing (spec §6). Reads the bootloader-supplied
//! argument string (normally `/proc/cmdline`, overridable for tests via
//! `--kernel-command-line`) and extracts the `plymouth.*` flag set plus the
//! handful of kernel-native veto/allow signals (`splash`, `rhgb`, `single`,
//! `1`, `s`, `init=`).
//!
//! Both `plymouth.foo` and `plymouth:foo` spellings are accepted, matching
//! the two conventions seen in the wild on different distributions.

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DebugSink {
    /// `plymouth.debug` with no argument: debug to the default log file.
    Default,
    /// `plymouth.debug=file:<path>`.
    File(String),
    /// `plymouth.debug=stream:<path>`.
    Stream(String),
}

#[derive(Debug, Clone, Default)]
pub struct KernelCmdline {
    pub splash_theme: Option<String>,
    pub splash_delay: Option<f64>,
    pub debug: Option<DebugSink>,
    pub nolog: bool,
    pub ignore_serial_consoles: bool,
    pub ignore_udev: bool,
    pub ignore_show_splash: bool,
    pub force_splash: bool,
    /// Set by the kernel's own `splash`/`rhgb` flags (boot splash requested
    /// by the distribution's kernel command line, independent of any
    /// `plymouth.*` override).
    pub kernel_wants_splash: bool,
    /// `splash=verbose` — show the splash but do not suppress console
    /// messages underneath it.
    pub splash_verbose: bool,
    /// `splash=silent` — suppress console messages.
    pub splash_silent: bool,
    /// `single`, `1`, or `s` — booting to single-user mode; plymouth does
    /// not normally show a splash in this case.
    pub single_user: bool,
    /// The `init=` program path, if overridden.
    pub init: Option<String>,
}

impl KernelCmdline {
    pub fn parse(text: &str) -> Self {
        let mut out = KernelCmdline::default();

        for token in text.split_whitespace() {
            let (key, value) = match token.split_once('=') {
                Some((k, v)) => (k, Some(v)),
                None => (token, None),
            };

            if let Some(rest) = strip_plymouth_prefix(key) {
                out.apply_plymouth_flag(rest, value);
                continue;
            }

            match key {
                "splash" => {
                    out.kernel_wants_splash = true;
                    match value {
                        Some("verbose") => out.splash_verbose = true,
                        Some("silent") => out.splash_silent = true,
                        _ => {}
                    }
                }
                "rhgb" => out.kernel_wants_splash = true,
                "single" | "1" | "s" => out.single_user = true,
                "init" => out.init = value.map(str::to_string),
                _ => {}
            }
        }

        out
    }

    fn apply_plymouth_flag(&mut self, name: &str, value: Option<&str>) {
        match name {
            "splash" => self.splash_theme = value.map(str::to_string),
            "splash-delay" => self.splash_delay = value.and_then(|v| v.parse().ok()),
            "debug" => {
                self.debug = Some(match value {
                    None => DebugSink::Default,
                    Some(v) => {
                        if let Some(path) = v.strip_prefix("file:") {
                            DebugSink::File(path.to_string())
                        } else if let Some(path) = v.strip_prefix("stream:") {
                            DebugSink::Stream(path.to_string())
                        } else {
                            DebugSink::Default
                        }
                    }
                });
            }
            "nolog" => self.nolog = true,
            "ignore-serial-consoles" => self.ignore_serial_consoles = true,
            "ignore-udev" => self.ignore_udev = true,
            "ignore-show-splash" => self.ignore_show_splash = true,
            "force-splash" => self.force_splash = true,
            _ => {}
        }
    }

    /// Whether the splash should be skipped entirely, per the veto logic
    /// implied by spec §4.9's "show-splash" transition: single-user mode
    /// and `ignore-show-splash` both suppress the splash unless
    /// `force-splash` is also given.
    pub fn should_skip_splash(&self) -> bool {
        if self.force_splash {
            return false;
        }
        self.ignore_show_splash || self.single_user
    }
}

fn strip_plymouth_prefix(key: &str) -> Option<&str> {
    key.strip_prefix("plymouth.").or_else(|| key.strip_prefix("plymouth:"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_dotted_and_colon_spellings() {
        let a = KernelCmdline::parse("plymouth.splash=details");
        let b = KernelCmdline::parse("plymouth:splash=details");
        assert_eq!(a.splash_theme.as_deref(), Some("details"));
        assert_eq!(b.splash_theme.as_deref(), Some("details"));
    }

    #[test]
    fn parses_debug_variants() {
        assert_eq!(
            KernelCmdline::parse("plymouth.debug").debug,
            Some(DebugSink::Default)
        );
        assert_eq!(
            KernelCmdline::parse("plymouth.debug=file:/var/log/p.log").debug,
            Some(DebugSink::File("/var/log/p.log".to_string()))
        );
        assert_eq!(
            KernelCmdline::parse("plymouth.debug=stream:/dev/ttyS0").debug,
            Some(DebugSink::Stream("/dev/ttyS0".to_string()))
        );
    }

    #[test]
    fn parses_kernel_native_flags() {
        let c = KernelCmdline::parse("quiet splash rhgb");
        assert!(c.kernel_wants_splash);
        let c = KernelCmdline::parse("splash=verbose");
        assert!(c.splash_verbose);
        let c = KernelCmdline::parse("single");
        assert!(c.single_user);
        let c = KernelCmdline::parse("init=/bin/bash");
        assert_eq!(c.init.as_deref(), Some("/bin/bash"));
    }

    #[test]
    fn force_splash_overrides_single_user() {
        let c = KernelCmdline::parse("single plymouth.force-splash");
        assert!(!c.should_skip_splash());
    }

    #[test]
    fn ignore_show_splash_skips_by_default() {
        let c = KernelCmdline::parse("plymouth.ignore-show-splash");
        assert!(c.should_skip_splash());
    }

    #[test]
    fn unrelated_tokens_are_ignored() {
        let c = KernelCmdline::parse("BOOT_IMAGE=/vmlinuz root=/dev/sda1 ro quiet");
        assert!(!c.kernel_wants_splash);
        assert!(c.splash_theme.is_none());
    }
}
