//! Per-channel orchestration: wires audio intake (C1) through the HDLC
//! framer (C3), deferred validator (C4), FX.25 decoder (C5), EAS
//! gatherer (C6), arbiter (C7), and delivery sink (C8) into one running
//! pipeline, plus the background worker that drains the deferred
//! `two_separated` recovery queue.
//!
//! Grounded on the concurrency shape of the teacher's `remote::Client`:
//! one task owns a blocking I/O loop (there, the websocket reader; here,
//! a device's blocking [`crate::intake::AudioSource::get`]) and hands
//! finished work off to the rest of the system through channels rather
//! than shared locked state. Since intake's `get()` genuinely blocks,
//! each channel gets its own `std::thread` instead of an async task.

use std::sync::Arc;
use std::thread;

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};

use crate::arbiter::{self, ChannelArbiter};
use crate::config::ChannelConfig;
use crate::demod::Demod;
use crate::eas::EasContext;
use crate::error::Result;
use crate::events::Event;
use crate::fx25::Fx25Context;
use crate::hdlc::{Framer, FramerEvent};
use crate::intake;
use crate::packet::Packet;
use crate::rrbb::{ChannelDecoder, Origin, Rrbb};
use crate::sink::Sink;
use crate::stats::Stats;
use crate::util;
use crate::validator::{self, Outcome};

/// A frame the hot path could not validate outright, handed to the
/// deferred `two_separated` worker along with everything it needs to
/// deliver a recovered frame on its own (§5: "a single background
/// worker drains a bounded queue").
pub struct TwoSeparatedJob {
    origin: Origin,
    rrbb: Rrbb,
    sink: Sink,
    stats: Arc<Stats>,
    hook: Option<String>,
}

/// Bounded, drop-oldest queue feeding the deferred `two_separated`
/// worker (§5). `crossbeam_channel` has no overflow policy of its own,
/// so a full queue is handled by evicting the head through a second,
/// `try_recv`-only handle on the same channel and retrying the send
/// once.
#[derive(Clone)]
pub struct DeferredQueue {
    tx: Sender<TwoSeparatedJob>,
    evict: Receiver<TwoSeparatedJob>,
}

impl DeferredQueue {
    /// Creates a queue of the given capacity and the worker-side
    /// [`Receiver`] that drains it.
    #[must_use]
    pub fn new(capacity: usize) -> (Self, Receiver<TwoSeparatedJob>) {
        let (tx, rx) = bounded(capacity);
        (
            Self {
                tx,
                evict: rx.clone(),
            },
            rx,
        )
    }

    fn push(&self, job: TwoSeparatedJob) {
        match self.tx.try_send(job) {
            Ok(()) => {}
            Err(TrySendError::Full(job)) => {
                // Evict the oldest queued job to make room, then retry
                // once. If another thread wins the race for the slot
                // this opens up, drop the new job rather than block.
                let _ = self.evict.try_recv();
                if self.tx.try_send(job).is_err() {
                    log::debug!("deferred recovery queue contested, dropping frame");
                }
            }
            Err(TrySendError::Disconnected(_)) => {
                log::debug!("deferred recovery queue closed, dropping frame");
            }
        }
    }
}

/// Spawns the deferred-recovery worker. One instance serves every
/// channel; `rx` is the [`Receiver`] paired with every [`Device`]'s
/// [`DeferredQueue`].
pub fn spawn_deferred_worker(rx: Receiver<TwoSeparatedJob>) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        for job in rx {
            if let Outcome::Emitted(packet) = validator::try_two_separated(&job.rrbb) {
                job.stats.channel(job.origin.channel).record_frame_delivered();
                job.sink.rec_frame(
                    job.origin.channel,
                    job.origin.subchannel,
                    job.origin.slicer,
                    packet,
                    job.rrbb.audio_level,
                    "2".to_owned(),
                );
                util::run_hook(
                    job.hook.as_deref(),
                    &Event::FrameDelivered {
                        channel: job.origin.channel,
                    },
                );
            }
        }
    })
}

/// One (subchannel, slicer) decode lane sharing a channel's audio.
struct Lane {
    origin: Origin,
    demod: Demod,
    framer: Framer,
    fx25: Option<(ChannelDecoder, Fx25Context)>,
    eas: Option<EasContext>,
}

/// Runs one physical channel's audio-in-to-packets-out pipeline on its
/// own thread.
pub struct Device {
    channel: usize,
    slicers: usize,
    lanes: Vec<Lane>,
    arbiter: ChannelArbiter,
    sink: Sink,
    stats: Arc<Stats>,
    hook: Option<String>,
    deferred: DeferredQueue,
    source: Box<dyn intake::AudioSource>,
}

impl Device {
    /// Opens the channel's audio device and builds every lane it needs,
    /// but does not start running yet; call [`Device::spawn`] for that.
    pub fn open(
        channel: usize,
        mut config: ChannelConfig,
        sink: Sink,
        stats: Arc<Stats>,
        hook: Option<String>,
        deferred: DeferredQueue,
        seed: u64,
    ) -> Result<Self> {
        let source = intake::open(&mut config)?;

        let mut lanes = Vec::with_capacity(config.subchannels * config.slicers);
        for subchannel in 0..config.subchannels {
            for slicer in 0..config.slicers {
                let origin = Origin {
                    channel,
                    subchannel,
                    slicer,
                };
                lanes.push(Lane {
                    origin,
                    demod: Demod::new(&config),
                    framer: Framer::new(origin, false, config.test_ber, seed),
                    fx25: config
                        .fx25_enabled
                        .then(|| (ChannelDecoder::new(false), Fx25Context::new(origin))),
                    eas: config.eas_enabled.then(|| EasContext::new(origin)),
                });
            }
        }

        let arbiter = ChannelArbiter::new(
            channel,
            config.subchannels,
            config.slicers,
            arbiter::process_age_samples(&config),
            crate::config::DEFAULT_RETRY_MAX,
            config.test_drop_rate,
            seed,
        );

        Ok(Self {
            channel,
            slicers: config.slicers,
            lanes,
            arbiter,
            sink,
            stats,
            hook,
            deferred,
            source,
        })
    }

    /// Moves this device onto its own thread and starts it running.
    /// Returns once the underlying audio source reports EOF or a fatal
    /// error.
    #[must_use]
    pub fn spawn(self) -> thread::JoinHandle<()> {
        thread::spawn(move || self.run())
    }

    fn run(mut self) {
        util::run_hook(self.hook.as_deref(), &Event::Started);
        loop {
            let byte = match self.source.get() {
                Ok(byte) => byte,
                Err(err) => {
                    log::warn!("channel {}: intake stopped: {err}", self.channel);
                    util::run_hook(
                        self.hook.as_deref(),
                        &Event::DeviceError {
                            device: format!("channel {}", self.channel),
                        },
                    );
                    break;
                }
            };
            self.stats.channel(self.channel).record_samples(1);
            self.process_byte(byte);
        }
        util::run_hook(self.hook.as_deref(), &Event::Stopped);
    }

    fn process_byte(&mut self, byte: u8) {
        let mut fx25_busy = false;

        for lane in &mut self.lanes {
            let Some(bit) = lane.demod.push_byte(byte) else {
                continue;
            };
            self.stats
                .channel(self.channel)
                .record_audio_level(lane.demod.audio_level().rec as u32);

            for event in lane.framer.rec_bit(bit) {
                match event {
                    FramerEvent::FrameReady(rrbb) => {
                        Self::handle_rrbb(
                            self.channel,
                            lane.origin,
                            rrbb,
                            &self.stats,
                            &self.sink,
                            &self.hook,
                            &self.deferred,
                            &mut self.arbiter,
                            lane.origin.subchannel * self.slicers + lane.origin.slicer,
                        );
                    }
                    FramerEvent::DcdChanged(active) => {
                        util::run_hook(
                            self.hook.as_deref(),
                            &Event::DcdChanged {
                                channel: self.channel,
                                active,
                            },
                        );
                    }
                }
            }

            if let Some((decoder, fx25)) = lane.fx25.as_mut() {
                let data_bit = decoder.step(bit);
                if let Some(packet) = fx25.rec_bit(data_bit) {
                    let n = lane.origin.subchannel * self.slicers + lane.origin.slicer;
                    Self::offer(
                        self.channel,
                        &self.stats,
                        &self.sink,
                        &self.hook,
                        &mut self.arbiter,
                        n,
                        packet,
                        lane.demod.audio_level().rec as u32,
                    );
                }
                fx25_busy |= fx25.busy();
            }

            if let Some(eas) = lane.eas.as_mut() {
                if let Some(text) = eas.rec_bit(bit) {
                    log::info!(
                        "channel {}: EAS burst: {}",
                        self.channel,
                        String::from_utf8_lossy(&text)
                    );
                }
            }
        }

        self.arbiter.tick();
        if self.arbiter.fast_path_eligible(fx25_busy) || self.arbiter.should_resolve(fx25_busy) {
            Self::resolve(
                &self.stats,
                &self.sink,
                &self.hook,
                &mut self.arbiter,
                self.channel,
                self.slicers,
            );
        }
    }

    #[expect(clippy::too_many_arguments)]
    fn handle_rrbb(
        channel: usize,
        origin: Origin,
        rrbb: Rrbb,
        stats: &Arc<Stats>,
        sink: &Sink,
        hook: &Option<String>,
        deferred: &DeferredQueue,
        arbiter: &mut ChannelArbiter,
        slot: usize,
    ) {
        stats.channel(origin.channel).record_frame_received();
        let audio_level = rrbb.audio_level;
        match validator::validate(&rrbb) {
            Outcome::Emitted(packet) => {
                Self::offer(channel, stats, sink, hook, arbiter, slot, packet, audio_level);
            }
            Outcome::Dropped => {
                let job = TwoSeparatedJob {
                    origin,
                    rrbb,
                    sink: sink.clone(),
                    stats: Arc::clone(stats),
                    hook: hook.clone(),
                };
                deferred.push(job);
            }
        }
    }

    #[expect(clippy::too_many_arguments)]
    fn offer(
        channel: usize,
        stats: &Arc<Stats>,
        sink: &Sink,
        hook: &Option<String>,
        arbiter: &mut ChannelArbiter,
        slot: usize,
        packet: Packet,
        audio_level: u32,
    ) {
        if arbiter.fast_path_eligible(false) {
            stats.channel(channel).record_frame_delivered();
            sink.rec_frame(channel, 0, 0, packet, audio_level, "|".to_owned());
            util::run_hook(hook.as_deref(), &Event::FrameDelivered { channel });
        } else {
            arbiter.offer(slot, packet, audio_level);
        }
    }

    fn resolve(
        stats: &Arc<Stats>,
        sink: &Sink,
        hook: &Option<String>,
        arbiter: &mut ChannelArbiter,
        channel: usize,
        slicers: usize,
    ) {
        let resolution = arbiter.resolve();
        if let Some((n, candidate)) = resolution.winner {
            let subchannel = n / slicers;
            let slicer = n % slicers;
            stats.channel(channel).record_frame_delivered();
            sink.rec_frame(
                channel,
                subchannel,
                slicer,
                candidate.packet,
                candidate.audio_level,
                resolution.spectrum,
            );
            util::run_hook(hook.as_deref(), &Event::FrameDelivered { channel });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DeviceSpec;

    fn test_config() -> ChannelConfig {
        ChannelConfig {
            device: DeviceSpec::Stdin,
            sample_rate: 9600,
            baud: 1200,
            fx25_enabled: false,
            eas_enabled: false,
            ..ChannelConfig::default()
        }
    }

    #[test]
    fn open_builds_one_lane_per_subchannel_slicer_pair() {
        let config = ChannelConfig {
            subchannels: 2,
            slicers: 3,
            ..test_config()
        };
        let (sink, _rx) = Sink::channel();
        let stats = Arc::new(Stats::new(1));
        let (deferred, _rx2) = DeferredQueue::new(8);

        let device = Device::open(0, config, sink, stats, None, deferred, 0)
            .expect("stdin source should always open");
        assert_eq!(device.lanes.len(), 6);
    }

    #[test]
    fn single_lane_device_opens_with_fast_path_arbiter() {
        let (sink, _rx) = Sink::channel();
        let stats = Arc::new(Stats::new(1));
        let (deferred, _rx2) = DeferredQueue::new(8);

        let device = Device::open(0, test_config(), sink, stats, None, deferred, 0)
            .expect("stdin source should always open");
        assert!(device.arbiter.fast_path_eligible(false));
    }

    #[test]
    fn deferred_queue_evicts_the_oldest_job_when_full() {
        let (sink, _rx) = Sink::channel();
        let stats = Arc::new(Stats::new(1));
        let (deferred, rx) = DeferredQueue::new(1);

        let origin_a = Origin {
            channel: 0,
            subchannel: 0,
            slicer: 0,
        };
        let origin_b = Origin {
            channel: 0,
            subchannel: 0,
            slicer: 1,
        };
        deferred.push(TwoSeparatedJob {
            origin: origin_a,
            rrbb: Rrbb::new(origin_a, false, crate::rrbb::Lfsr::default(), 0, 0),
            sink: sink.clone(),
            stats: Arc::clone(&stats),
            hook: None,
        });
        deferred.push(TwoSeparatedJob {
            origin: origin_b,
            rrbb: Rrbb::new(origin_b, false, crate::rrbb::Lfsr::default(), 0, 0),
            sink,
            stats,
            hook: None,
        });

        let survivor = rx.try_recv().expect("the newer job should survive");
        assert_eq!(survivor.origin, origin_b);
        assert!(rx.try_recv().is_err());
    }
}
