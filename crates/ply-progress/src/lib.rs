#![forbid(unsafe_code)]

//! Progress estimation (spec §3 Progress state): expected-time-remaining
//! computed from a running clock and a prior-boot time series keyed by
//! status strings, plus the boot/shutdown-duration cache file that time
//! series is loaded from and saved to.

pub mod cache;
pub mod clock;

use std::path::Path;

use ply_core::Result;

pub use clock::{Clock, DeterministicClock, SystemClock};

const DEFAULT_BOOT_DURATION_SECS: f64 = 60.0;

/// One status-update record. `time` is seconds elapsed since `Progress`
/// started for `current`, or the fraction loaded from the cache file for
/// `previous` — same shape, different unit, exactly as the cache file
/// makes them interchangeable once a boot completes and is saved.
#[derive(Debug, Clone)]
struct Message {
    time: f64,
    text: String,
    disabled: bool,
}

/// Tracks elapsed time against a scalar (inverse expected total duration)
/// derived from the previous boot's cached timings, to report a smoothly
/// advancing completion percentage.
pub struct Progress<C: Clock = SystemClock> {
    clock: C,
    start: std::time::Duration,
    pause_start: Option<std::time::Duration>,
    scalar: f64,
    last_percentage: f64,
    last_percentage_time: f64,
    current_messages: Vec<Message>,
    previous_messages: Vec<Message>,
}

impl Progress<SystemClock> {
    pub fn new() -> Self {
        Self::with_clock(SystemClock::new())
    }
}

impl Default for Progress<SystemClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> Progress<C> {
    pub fn with_clock(clock: C) -> Self {
        let start = clock.now_mono();
        Self {
            clock,
            start,
            pause_start: None,
            scalar: 1.0 / DEFAULT_BOOT_DURATION_SECS,
            last_percentage: 0.0,
            last_percentage_time: 0.0,
            current_messages: Vec::new(),
            previous_messages: Vec::new(),
        }
    }

    /// Mutable access to the underlying clock, so tests can `advance` a
    /// [`DeterministicClock`] between assertions.
    pub fn clock_mut(&mut self) -> &mut C {
        &mut self.clock
    }

    /// Seconds elapsed since this run started, frozen while paused.
    pub fn elapsed_seconds(&self) -> f64 {
        let now = self.pause_start.unwrap_or_else(|| self.clock.now_mono());
        now.saturating_sub(self.start).as_secs_f64()
    }

    pub fn is_paused(&self) -> bool {
        self.pause_start.is_some()
    }

    pub fn pause(&mut self) {
        if self.pause_start.is_none() {
            self.pause_start = Some(self.clock.now_mono());
        }
    }

    /// Resume after [`pause`](Self::pause), shifting `start` forward by
    /// the paused duration so the pause doesn't count against elapsed time.
    pub fn unpause(&mut self) {
        if let Some(pause) = self.pause_start.take() {
            let now = self.clock.now_mono();
            self.start += now.saturating_sub(pause);
        }
    }

    /// Expected-complete fraction in `[0, 1]`. Non-decreasing across calls
    /// within a single unpaused run; reaches 1.0 once `scalar * elapsed`
    /// reaches 1.0.
    pub fn percentage(&mut self) -> f64 {
        let cur_time = self.elapsed_seconds();
        let percentage = if self.last_percentage_time * self.scalar < 0.999 {
            self.last_percentage
                + (((cur_time - self.last_percentage_time) * self.scalar)
                    / (1.0 - self.last_percentage_time * self.scalar))
                    * (1.0 - self.last_percentage)
        } else {
            1.0
        };
        let percentage = percentage.clamp(0.0, 1.0);
        self.last_percentage_time = cur_time;
        self.last_percentage = percentage;
        percentage
    }

    /// Record that `status` was just reported. A repeat of a status
    /// already seen this run is marked disabled (so it doesn't appear
    /// twice in the saved cache) rather than recorded again. The first
    /// time a status is seen that also appeared in the previous boot's
    /// cache, the scalar is nudged towards the ratio the previous boot
    /// implies, averaged with the current estimate.
    pub fn status_update(&mut self, status: &str) {
        if let Some(message) = self.current_messages.iter_mut().find(|m| m.text == status) {
            message.disabled = true;
            return;
        }

        if let Some(previous) = self.previous_messages.iter().find(|m| m.text == status) {
            self.scalar += previous.time / self.elapsed_seconds();
            self.scalar /= 2.0;
        }

        self.current_messages.push(Message {
            time: self.elapsed_seconds(),
            text: status.to_string(),
            disabled: false,
        });
    }

    /// Load the previous boot's cached timings, keyed by status string.
    pub fn load_cache(&mut self, path: &Path) -> Result<()> {
        let records = cache::load(path)?;
        self.previous_messages = records
            .into_iter()
            .map(|r| Message { time: r.fraction, text: r.status, disabled: false })
            .collect();
        Ok(())
    }

    /// Save this run's timings as fractions of the total elapsed time, for
    /// the next boot's `load_cache` to read.
    pub fn save_cache(&self, path: &Path) -> Result<()> {
        let cur_time = self.elapsed_seconds();
        let records = self
            .current_messages
            .iter()
            .filter(|m| !m.disabled)
            .map(|m| cache::CacheRecord { fraction: m.time / cur_time, status: m.text.clone() })
            .collect::<Vec<_>>();
        cache::save(path, &records)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn elapsed_seconds_tracks_the_clock() {
        let mut progress = Progress::with_clock(DeterministicClock::new());
        assert_eq!(progress.elapsed_seconds(), 0.0);
        progress.clock_mut().advance(Duration::from_secs(5));
        assert_eq!(progress.elapsed_seconds(), 5.0);
    }

    #[test]
    fn pause_freezes_elapsed_time_and_unpause_excludes_the_gap() {
        let mut progress = Progress::with_clock(DeterministicClock::new());
        progress.clock_mut().advance(Duration::from_secs(2));
        progress.pause();
        progress.clock_mut().advance(Duration::from_secs(100));
        assert_eq!(progress.elapsed_seconds(), 2.0);
        progress.unpause();
        assert_eq!(progress.elapsed_seconds(), 2.0);
        progress.clock_mut().advance(Duration::from_secs(1));
        assert_eq!(progress.elapsed_seconds(), 3.0);
    }

    #[test]
    fn percentage_is_non_decreasing_and_clamped() {
        let mut progress = Progress::with_clock(DeterministicClock::new());
        progress.clock_mut().advance(Duration::from_secs(120));
        let mut last = 0.0;
        for _ in 0..5 {
            let pct = progress.percentage();
            assert!(pct >= last);
            assert!((0.0..=1.0).contains(&pct));
            last = pct;
            progress.clock_mut().advance(Duration::from_secs(10));
        }
    }

    #[test]
    fn percentage_reaches_one_once_scalar_times_elapsed_passes_one() {
        let mut progress = Progress::with_clock(DeterministicClock::new());
        // default scalar assumes a 60s boot; well past that should saturate.
        progress.clock_mut().advance(Duration::from_secs(600));
        assert_eq!(progress.percentage(), 1.0);
    }

    #[test]
    fn repeat_status_update_disables_the_earlier_entry_instead_of_duplicating() {
        let mut progress = Progress::with_clock(DeterministicClock::new());
        progress.status_update("Starting udev");
        progress.clock_mut().advance(Duration::from_secs(1));
        progress.status_update("Starting udev");
        assert_eq!(progress.current_messages.len(), 1);
        assert!(progress.current_messages[0].disabled);
    }

    #[test]
    fn save_cache_omits_disabled_messages() {
        let mut progress = Progress::with_clock(DeterministicClock::new());
        progress.status_update("a");
        progress.clock_mut().advance(Duration::from_secs(1));
        progress.status_update("a");
        progress.clock_mut().advance(Duration::from_secs(9));

        let dir = std::env::temp_dir();
        let path = dir.join(format!("ply-progress-save-test-{}-{}", std::process::id(), "a"));
        progress.save_cache(&path).unwrap();
        let records = cache::load(&path).unwrap();
        let _ = std::fs::remove_file(&path);
        assert!(records.is_empty());
    }

    #[test]
    fn status_seen_in_previous_boot_nudges_scalar_towards_its_recorded_fraction() {
        let mut progress = Progress::with_clock(DeterministicClock::new());
        progress.previous_messages.push(Message { time: 0.5, text: "Starting udev".to_string(), disabled: false });
        let scalar_before = progress.scalar;
        progress.clock_mut().advance(Duration::from_secs(30));
        progress.status_update("Starting udev");
        assert_ne!(progress.scalar, scalar_before);
    }
}
