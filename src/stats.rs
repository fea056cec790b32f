//! Audio-level / throughput stats (C9): lock-free per-channel counters
//! updated from the bit-ingest hot path, plus a periodic reporter.
//!
//! The reporter is grounded on the teacher's `reporting_timer`/
//! `reset_reporting_timer` idiom (`src/remote.rs`): a single pinned
//! `tokio::time::Sleep` that is awaited, then reset to `now + interval`,
//! rather than a recreated `tokio::time::interval` each round.

use std::pin::Pin;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

/// Per-channel counters, safe to update concurrently from the channel's
/// own intake thread without any locking.
#[derive(Default)]
pub struct ChannelStats {
    frames_received: AtomicU64,
    frames_delivered: AtomicU64,
    audio_level: AtomicU32,
    samples_seen: AtomicU64,
}

impl ChannelStats {
    pub fn record_frame_received(&self) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_frame_delivered(&self) {
        self.frames_delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_audio_level(&self, level: u32) {
        self.audio_level.store(level, Ordering::Relaxed);
    }

    pub fn record_samples(&self, count: u64) {
        self.samples_seen.fetch_add(count, Ordering::Relaxed);
    }

    #[must_use]
    pub fn snapshot(&self) -> ChannelSnapshot {
        ChannelSnapshot {
            frames_received: self.frames_received.load(Ordering::Relaxed),
            frames_delivered: self.frames_delivered.load(Ordering::Relaxed),
            audio_level: self.audio_level.load(Ordering::Relaxed),
            samples_seen: self.samples_seen.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time read of one channel's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChannelSnapshot {
    pub frames_received: u64,
    pub frames_delivered: u64,
    pub audio_level: u32,
    pub samples_seen: u64,
}

/// Counters for every configured channel.
pub struct Stats {
    channels: Vec<ChannelStats>,
}

impl Stats {
    #[must_use]
    pub fn new(num_channels: usize) -> Self {
        Self {
            channels: (0..num_channels).map(|_| ChannelStats::default()).collect(),
        }
    }

    #[must_use]
    pub fn channel(&self, index: usize) -> &ChannelStats {
        &self.channels[index]
    }

    #[must_use]
    pub fn snapshot(&self) -> Vec<ChannelSnapshot> {
        self.channels.iter().map(ChannelStats::snapshot).collect()
    }
}

/// Drives the periodic `info`-level report on a fixed interval.
pub struct Reporter {
    interval: Duration,
    timer: Pin<Box<tokio::time::Sleep>>,
}

impl Reporter {
    #[must_use]
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            timer: Box::pin(tokio::time::sleep(Duration::ZERO)),
        }
    }

    fn rearm(&mut self) {
        if let Some(deadline) = tokio::time::Instant::now().checked_add(self.interval) {
            self.timer.as_mut().reset(deadline);
        }
    }

    /// Waits for the next deadline, logs one line per channel, and
    /// rearms the timer for the following interval.
    pub async fn tick(&mut self, stats: &Stats) {
        self.timer.as_mut().await;
        for (index, snapshot) in stats.snapshot().into_iter().enumerate() {
            log::info!(
                "channel {index}: {} frames received, {} delivered, audio level {}",
                snapshot.frames_received,
                snapshot.frames_delivered,
                snapshot.audio_level,
            );
        }
        self.rearm();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_stats_are_zeroed() {
        let stats = Stats::new(2);
        for snapshot in stats.snapshot() {
            assert_eq!(snapshot, ChannelSnapshot::default());
        }
    }

    #[test]
    fn recording_updates_the_right_channel_only() {
        let stats = Stats::new(2);
        stats.channel(0).record_frame_received();
        stats.channel(0).record_frame_delivered();
        stats.channel(0).record_audio_level(42);
        stats.channel(1).record_samples(1000);

        let snapshots = stats.snapshot();
        assert_eq!(snapshots[0].frames_received, 1);
        assert_eq!(snapshots[0].frames_delivered, 1);
        assert_eq!(snapshots[0].audio_level, 42);
        assert_eq!(snapshots[1].samples_seen, 1000);
        assert_eq!(snapshots[1].frames_received, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn reporter_fires_after_the_configured_interval() {
        let stats = Stats::new(1);
        let mut reporter = Reporter::new(Duration::from_secs(10));

        let tick = tokio::time::timeout(Duration::from_secs(20), reporter.tick(&stats));
        tick.await.expect("reporter should fire within twice its interval");
    }
}
