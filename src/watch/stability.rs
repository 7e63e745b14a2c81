//! Write-completion detection by polling file size until it stops changing.

use std::fmt;
use std::io;
use std::path::Path;
use std::time::Duration;
use tokio::time::sleep;
use tracing::trace;

use crate::config::StabilityConfig;

/// One observation of a file.
#[derive(Debug)]
pub enum Sample {
    Size(u64),
    Missing,
    /// The file exists but its metadata could not be read.
    Unreadable(io::Error),
}

/// Source of size samples. The real implementation stats the filesystem;
/// tests script the sequence.
pub trait SizeProbe: Send + Sync {
    fn sample(&self, path: &Path) -> Sample;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FsProbe;

impl SizeProbe for FsProbe {
    fn sample(&self, path: &Path) -> Sample {
        match std::fs::metadata(path) {
            Ok(meta) => Sample::Size(meta.len()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Sample::Missing,
            Err(e) => Sample::Unreadable(e),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stability {
    Stable { size: u64, polls: u32 },
    Disappeared { polls: u32 },
    TimedOut { polls: u32 },
}

#[cfg(test)]
impl Stability {
    pub fn is_stable(&self) -> bool {
        matches!(self, Stability::Stable { .. })
    }
}

impl fmt::Display for Stability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stability::Stable { size, polls } => {
                write!(f, "stable at {} bytes after {} polls", size, polls)
            }
            Stability::Disappeared { polls } => write!(f, "disappeared after {} polls", polls),
            Stability::TimedOut { polls } => {
                write!(f, "size did not settle within {} polls", polls)
            }
        }
    }
}

pub struct StabilityDetector<P = FsProbe> {
    probe: P,
    interval: Duration,
    required: u32,
    max_polls: u32,
}

impl StabilityDetector<FsProbe> {
    pub fn new(config: &StabilityConfig) -> Self {
        Self::with_probe(config, FsProbe)
    }
}

impl<P: SizeProbe> StabilityDetector<P> {
    pub fn with_probe(config: &StabilityConfig, probe: P) -> Self {
        Self {
            probe,
            interval: config.poll_interval(),
            required: config.required_stable_polls.max(1),
            max_polls: config.max_polls().max(1),
        }
    }

    /// Blocks the calling task until `path` has held the same non-zero size
    /// for `required` consecutive polls, vanished, or exhausted the poll budget.
    pub async fn await_stable(&self, path: &Path) -> Stability {
        let mut previous: Option<u64> = None;
        let mut stable_count = 0u32;

        for poll in 1..=self.max_polls {
            let current = match self.probe.sample(path) {
                Sample::Missing => return Stability::Disappeared { polls: poll },
                Sample::Size(size) => Some(size),
                Sample::Unreadable(e) => {
                    trace!(path = %path.display(), poll, error = %e, "size unreadable");
                    None
                }
            };

            match current {
                Some(size) if size > 0 && previous == Some(size) => {
                    stable_count += 1;
                    trace!(path = %path.display(), poll, size, stable_count, "size unchanged");
                    if stable_count >= self.required {
                        return Stability::Stable { size, polls: poll };
                    }
                }
                _ => {
                    trace!(path = %path.display(), poll, size = ?current, "size changed");
                    stable_count = 0;
                }
            }

            previous = current;
            sleep(self.interval).await;
        }

        Stability::TimedOut {
            polls: self.max_polls,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;
    use tokio::time::Instant;

    /// Replays a fixed list of samples, repeating the last one forever.
    struct Scripted {
        samples: Mutex<VecDeque<Option<u64>>>,
        polls: AtomicU32,
    }

    impl Scripted {
        fn new(samples: &[Option<u64>]) -> Self {
            Self {
                samples: Mutex::new(samples.iter().copied().collect()),
                polls: AtomicU32::new(0),
            }
        }

        fn polls(&self) -> u32 {
            self.polls.load(Ordering::SeqCst)
        }
    }

    impl SizeProbe for &Scripted {
        fn sample(&self, _path: &Path) -> Sample {
            self.polls.fetch_add(1, Ordering::SeqCst);
            let mut samples = self.samples.lock().unwrap();
            let next = if samples.len() > 1 {
                samples.pop_front().unwrap()
            } else {
                *samples.front().unwrap()
            };
            match next {
                Some(size) => Sample::Size(size),
                None => Sample::Missing,
            }
        }
    }

    /// Grows by one byte on every poll.
    struct Growing(AtomicU32);

    impl SizeProbe for &Growing {
        fn sample(&self, _path: &Path) -> Sample {
            Sample::Size(self.0.fetch_add(1, Ordering::SeqCst) as u64 + 1)
        }
    }

    fn config(interval_secs: f64, required: u32) -> StabilityConfig {
        StabilityConfig {
            poll_interval_secs: interval_secs,
            required_stable_polls: required,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_ever_changing_file_times_out_after_bound() {
        let probe = Growing(AtomicU32::new(0));
        let detector = StabilityDetector::with_probe(&config(2.0, 5), &probe);

        let result = detector.await_stable(Path::new("growing.png")).await;

        assert_eq!(result, Stability::TimedOut { polls: 50 });
        assert_eq!(probe.0.load(Ordering::SeqCst), 50);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_byte_file_never_stable() {
        let probe = Scripted::new(&[Some(0)]);
        let detector = StabilityDetector::with_probe(&config(2.0, 5), &probe);
        let start = Instant::now();

        let result = detector.await_stable(Path::new("scan.tmp.png")).await;

        assert_eq!(result, Stability::TimedOut { polls: 50 });
        assert_eq!(probe.polls(), 50);
        assert_eq!(start.elapsed(), Duration::from_secs(100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stable_after_exactly_required_polls_from_first_hold() {
        // Size first reaches 300 on poll 3, then holds.
        let probe = Scripted::new(&[Some(100), Some(200), Some(300)]);
        let detector = StabilityDetector::with_probe(&config(2.0, 5), &probe);

        let result = detector.await_stable(Path::new("photo.png")).await;

        assert_eq!(result, Stability::Stable { size: 300, polls: 8 });
        assert_eq!(probe.polls(), 8);
    }

    #[tokio::test(start_paused = true)]
    async fn test_chunked_write_is_stable_ten_seconds_after_last_change() {
        // Three chunks, polled every 2s from t=0.
        let probe = Scripted::new(&[Some(4096), Some(8192), Some(12288)]);
        let detector = StabilityDetector::with_probe(&config(2.0, 5), &probe);
        let start = Instant::now();

        let result = detector.await_stable(Path::new("photo.png")).await;

        assert!(result.is_stable());
        // Last change observed at t=4s; stable at t=14s.
        assert_eq!(start.elapsed(), Duration::from_secs(14));
    }

    #[tokio::test(start_paused = true)]
    async fn test_size_change_resets_counter() {
        let probe = Scripted::new(&[Some(10), Some(10), Some(10), Some(11)]);
        let detector = StabilityDetector::with_probe(&config(1.0, 3), &probe);

        let result = detector.await_stable(Path::new("a.jpg")).await;

        // Poll 4 sees 11, polls 5..=7 hold it.
        assert_eq!(result, Stability::Stable { size: 11, polls: 7 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_disappearance_is_reported_immediately() {
        let probe = Scripted::new(&[Some(10), Some(20), None]);
        let detector = StabilityDetector::with_probe(&config(2.0, 5), &probe);

        let result = detector.await_stable(Path::new("gone.jpg")).await;

        assert_eq!(result, Stability::Disappeared { polls: 3 });
        assert_eq!(probe.polls(), 3);
    }

    #[tokio::test]
    async fn test_fs_probe_on_real_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("page.tif");
        std::fs::write(&path, b"II*\0data").unwrap();
        let detector = StabilityDetector::new(&config(0.01, 2));

        assert_eq!(
            detector.await_stable(&path).await,
            Stability::Stable { size: 8, polls: 3 }
        );

        std::fs::remove_file(&path).unwrap();
        assert_eq!(
            detector.await_stable(&path).await,
            Stability::Disappeared { polls: 1 }
        );
    }
}
