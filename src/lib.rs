//! Headless AX.25/FX.25 packet-radio soft-TNC receive daemon.
//!
//! **tncd** turns raw audio (from a sound card, a UDP stream, or
//! standard input) into decoded AX.25 packets. It provides:
//!
//! # Core Features
//!
//! * **Bit-level HDLC framing**: NRZI decode, flag/abort detection, and
//!   bit destuffing directly on demodulated bits.
//! * **Deferred bit-flip recovery**: frames with a bad FCS are retried
//!   through increasingly expensive single-bit, adjacent-bit, and
//!   non-adjacent-bit flip ladders before being dropped.
//! * **FX.25 forward error correction**: correlation-tag search and
//!   Reed-Solomon codeblock correction for frames sent with FX.25
//!   wrapping.
//! * **EAS-SAME decoding**: gathers and reports Emergency Alert System
//!   header bursts alongside ordinary packet traffic.
//! * **Multi-modem arbitration**: when a channel runs more than one
//!   demodulator variant, scores and reconciles their simultaneous
//!   candidates into a single delivered frame per window.
//!
//! # Architecture
//!
//! The library is organized into several key modules:
//!
//! * **Receive Pipeline**
//!   - [`intake`]: Audio device abstraction (sound card, UDP, stdin)
//!   - [`demod`]: Baseband bit slicer bridging PCM to bit-level ingest
//!   - [`rrbb`]: Raw-bit capture buffer and NRZI/scrambling primitives
//!   - [`hdlc`]: Bit-level HDLC framer and carrier detect
//!   - [`validator`]: Deferred bit-flip frame recovery
//!   - [`fx25`]: FX.25 correlation-tag search and Reed-Solomon FEC
//!   - [`eas`]: EAS-SAME header burst decoding
//!   - [`arbiter`]: Multi-modem candidate scoring and resolution
//!   - [`sink`]: Delivery queue for fully decoded frames
//!   - [`device`]: Wires the above into one running per-channel pipeline
//!
//! * **Configuration & Observability**
//!   - [`config`]: Application settings
//!   - [`stats`]: Per-channel audio-level and throughput counters
//!   - [`events`]: Event system for state changes
//!   - [`signal`]: Graceful shutdown and reload signal handling
//!
//! * **Utilities**
//!   - [`error`]: Error types and handling
//!   - [`crc`]: AX.25 frame-check-sequence computation
//!   - [`packet`]: Decoded packet type and recovery provenance
//!   - [`rand`]: Deterministic RNG for test-time fault injection
//!   - [`util`]: General helper functions
//!
//! # Example
//!
//! ```rust,no_run
//! use tncd::config::Config;
//! use tncd::device::Device;
//! use tncd::sink::Sink;
//! use tncd::stats::Stats;
//! use std::sync::Arc;
//!
//! fn example() -> tncd::error::Result<()> {
//!     let config = Config::default();
//!     let (sink, _rx) = Sink::channel();
//!     let stats = Arc::new(Stats::new(config.channels.len()));
//!     let (deferred, deferred_rx) = tncd::device::DeferredQueue::new(config.two_separated_queue_len);
//!     let _worker = tncd::device::spawn_deferred_worker(deferred_rx);
//!
//!     for (index, channel) in config.channels.into_iter().enumerate() {
//!         let device = Device::open(
//!             index,
//!             channel,
//!             sink.clone(),
//!             Arc::clone(&stats),
//!             config.hook.clone(),
//!             deferred.clone(),
//!             0,
//!         )?;
//!         let _handle = device.spawn();
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! # Error Handling
//!
//! Errors are handled through the types in the [`error`] module, with
//! most functions returning [`Result`](error::Result).
//!
//! # Concurrency
//!
//! Each channel's audio intake runs on its own `std::thread`, since
//! reading from a device genuinely blocks; the deferred recovery worker
//! and the stats reporter run alongside on a small `tokio` runtime.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![doc(test(attr(ignore)))]

#[macro_use]
extern crate log;

pub mod arbiter;
pub mod config;
pub mod crc;
pub mod demod;
pub mod device;
pub mod eas;
pub mod error;
pub mod events;
pub mod fx25;
pub mod hdlc;
pub mod intake;
pub mod packet;
pub mod rand;
pub mod rrbb;
pub mod signal;
pub mod sink;
pub mod stats;
pub mod util;
pub mod validator;
