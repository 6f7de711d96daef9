//! Boot/shutdown-duration cache files (spec §6): one `<fraction>:<status>`
//! record per line, where `<fraction>` is the time a status string first
//! appeared divided by the total duration of the boot (or shutdown) that
//! produced the file. Read on root-mount, written on quit.

use std::path::Path;

use ply_core::Result;

#[derive(Debug, Clone, PartialEq)]
pub struct CacheRecord {
    pub fraction: f64,
    pub status: String,
}

/// Parse cache-file text. Lines that don't match the `<fraction>:<status>`
/// grammar are skipped rather than treated as a hard error — a stale or
/// hand-edited cache file should degrade to "no prior data", not prevent
/// the daemon from starting.
pub fn parse(text: &str) -> Vec<CacheRecord> {
    text.lines()
        .filter_map(|line| {
            let (fraction, status) = line.split_once(':')?;
            let fraction: f64 = fraction.trim().parse().ok()?;
            Some(CacheRecord { fraction, status: status.to_string() })
        })
        .collect()
}

pub fn format(records: &[CacheRecord]) -> String {
    let mut out = String::new();
    for record in records {
        out.push_str(&format!("{:.3}:{}\n", record.fraction, record.status));
    }
    out
}

/// Load a cache file, returning an empty list (not an error) if it doesn't
/// exist yet — the common case on a machine's first boot.
pub fn load(path: &Path) -> Result<Vec<CacheRecord>> {
    match std::fs::read_to_string(path) {
        Ok(text) => Ok(parse(&text)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(e.into()),
    }
}

pub fn save(path: &Path, records: &[CacheRecord]) -> Result<()> {
    std::fs::write(path, format(records)).map_err(Into::into)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_fraction_status_lines() {
        let records = parse("0.100:Loading kernel modules\n0.500:Starting udev\n");
        assert_eq!(
            records,
            vec![
                CacheRecord { fraction: 0.100, status: "Loading kernel modules".to_string() },
                CacheRecord { fraction: 0.500, status: "Starting udev".to_string() },
            ]
        );
    }

    #[test]
    fn skips_malformed_lines() {
        let records = parse("not a record\n0.250:ok\n");
        assert_eq!(records, vec![CacheRecord { fraction: 0.250, status: "ok".to_string() }]);
    }

    #[test]
    fn format_round_trips_through_parse() {
        let records = vec![
            CacheRecord { fraction: 0.1, status: "a".to_string() },
            CacheRecord { fraction: 0.9, status: "b".to_string() },
        ];
        let text = format(&records);
        assert_eq!(parse(&text), records);
    }

    #[test]
    fn load_missing_file_returns_empty() {
        let path = Path::new("/nonexistent/plymouthd-test-cache-file-that-does-not-exist");
        assert_eq!(load(path).unwrap(), Vec::new());
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = std::env::temp_dir();
        let path = dir.join(format!("ply-progress-cache-test-{}", std::process::id()));
        let records = vec![CacheRecord { fraction: 0.42, status: "Mounting /home".to_string() }];
        save(&path, &records).unwrap();
        let loaded = load(&path).unwrap();
        let _ = std::fs::remove_file(&path);
        assert_eq!(loaded, records);
    }
}
