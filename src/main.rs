//! Main application entry point and runtime management.
//!
//! This module handles:
//! * Command line argument parsing
//! * Logging configuration
//! * Configuration loading
//! * Application lifecycle
//!
//! # Runtime Behavior
//!
//! The application:
//! 1. Loads and validates configuration
//! 2. Opens each configured channel's audio device and starts its
//!    receive pipeline on its own thread
//! 3. Reports decoded frames and periodic audio-level statistics
//! 4. Handles graceful shutdown on Ctrl-C/SIGTERM
//!
//! # Error Handling
//!
//! Configuration and device-open errors terminate immediately; errors
//! encountered later by an individual channel's intake thread are
//! logged and stop that channel only, without bringing the rest of the
//! process down.

use std::{process, sync::Arc};

use clap::{command, Parser, ValueHint};
use log::{debug, error, info, LevelFilter};

use tncd::{
    config::{ChannelConfig, Config, DeviceSpec},
    device::{self, Device},
    error::Result,
    intake,
    signal::{self, ShutdownSignal},
    sink::Sink,
    stats::{Reporter, Stats},
};

/// Build profile indicator for logging.
///
/// Shows "debug" when built without optimizations.
#[cfg(debug_assertions)]
const BUILD_PROFILE: &str = "debug";

/// Build profile indicator for logging.
///
/// Shows "release" when built with optimizations.
#[cfg(not(debug_assertions))]
const BUILD_PROFILE: &str = "release";

/// Group name for mutually exclusive logging options.
///
/// Used by clap to ensure -q (quiet) and -v (verbose) flags
/// cannot be used together.
const ARGS_GROUP_LOGGING: &str = "logging";

/// Command line arguments as parsed by `clap`.
///
/// All options can be set via environment variables with the `TNCD_`
/// prefix.
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Audio source for a channel
    ///
    /// Format: `[<host>][|<device>][|<sample rate>][|<sample format>]`,
    /// or "stdin"/"-" for standard input, or "udp"/"udp:<port>" for a
    /// UDP listener. Use "?" to list available sound-card input
    /// devices and exit. Repeat to run more than one channel.
    #[arg(short, long, value_hint = ValueHint::Other, env = "TNCD_DEVICE")]
    device: Vec<String>,

    /// Line rate in bits per second
    #[arg(long, default_value_t = 1200, env = "TNCD_BAUD")]
    baud: u32,

    /// PSK bits packed per symbol (1 for AFSK/FSK, 2 for QPSK, 3 for 8PSK)
    #[arg(long, default_value_t = 1, env = "TNCD_BITS_PER_SYMBOL")]
    bits_per_symbol: u32,

    /// Number of parallel demodulator variants per channel
    #[arg(long, default_value_t = 1, env = "TNCD_SUBCHANNELS")]
    subchannels: usize,

    /// Number of data-slicers per demodulator
    #[arg(long, default_value_t = 1, env = "TNCD_SLICERS")]
    slicers: usize,

    /// Disable FX.25 correlation-tag search and Reed-Solomon FEC
    #[arg(long, default_value_t = false, env = "TNCD_NO_FX25")]
    no_fx25: bool,

    /// Enable EAS-SAME header burst decoding
    #[arg(long, default_value_t = false, env = "TNCD_EAS")]
    eas: bool,

    /// Test-only: probability in [0.0, 1.0] of inverting each raw bit
    /// before framing
    #[arg(long, default_value_t = 0.0, env = "TNCD_TEST_BER")]
    test_ber: f64,

    /// Test-only: probability in [0.0, 1.0] of discarding a frame the
    /// arbiter already chose, before it reaches the sink
    #[arg(long, default_value_t = 0.0, env = "TNCD_TEST_DROP_RATE")]
    test_drop_rate: f64,

    /// Path to an optional TOML configuration overlay
    #[arg(short, long, value_name = "FILE", value_hint = ValueHint::FilePath, env = "TNCD_CONFIG")]
    config: Option<String>,

    /// Script to execute when events occur
    #[arg(long, value_hint = ValueHint::ExecutablePath, env = "TNCD_HOOK")]
    hook: Option<String>,

    /// Interval between audio-level statistics reports, in seconds
    #[arg(long, default_value_t = tncd::config::DEFAULT_STATS_INTERVAL_SECS, env = "TNCD_STATS_INTERVAL")]
    stats_interval_secs: u64,

    /// Suppress all output except warnings and errors
    #[arg(short, long, default_value_t = false, group = ARGS_GROUP_LOGGING, env = "TNCD_QUIET")]
    quiet: bool,

    /// Enable verbose logging
    ///
    /// Use -v for debug logging
    /// Use -vv for trace logging
    #[arg(short, long, action = clap::ArgAction::Count, group = ARGS_GROUP_LOGGING, env = "TNCD_VERBOSE")]
    verbose: u8,
}

/// Initialize logging system.
///
/// Configures logging based on command line arguments and environment:
/// * `-q` sets Warning level
/// * `-v` sets Debug level
/// * `-vv` sets Trace level
/// * `RUST_LOG` environment variable provides defaults
/// * External crates are limited to Warning level
///
/// # Panics
///
/// Panics if logger is already initialized.
fn init_logger(config: &Args) {
    let mut logger = env_logger::Builder::from_env(
        env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, "info"),
    );

    let mut external_level = LevelFilter::Error;
    if config.quiet || config.verbose > 0 {
        let level = match config.verbose {
            0 => LevelFilter::Warn,
            1 => LevelFilter::Debug,
            _ => LevelFilter::max(),
        };

        logger.filter_module(module_path!(), level);

        if level == LevelFilter::Trace {
            external_level = LevelFilter::max();
        }
    };

    // cpal is the one external crate chatty enough to need its own cap.
    logger.filter_module("cpal", external_level);

    logger.init();
}

/// Builds one [`ChannelConfig`] per `--device` occurrence, applying the
/// shared topology/feature flags to all of them.
fn channel_configs(args: &Args) -> Result<Vec<ChannelConfig>> {
    let devices = if args.device.is_empty() {
        vec![DeviceSpec::default()]
    } else {
        args.device
            .iter()
            .map(|spec| spec.parse::<DeviceSpec>())
            .collect::<Result<Vec<_>>>()?
    };

    Ok(devices
        .into_iter()
        .map(|device| ChannelConfig {
            device,
            baud: args.baud,
            bits_per_symbol: args.bits_per_symbol,
            subchannels: args.subchannels,
            slicers: args.slicers,
            fx25_enabled: !args.no_fx25,
            eas_enabled: args.eas,
            test_ber: args.test_ber,
            test_drop_rate: args.test_drop_rate,
            ..ChannelConfig::default()
        })
        .collect())
}

/// Main application loop.
///
/// Opens every configured channel's audio device, starts its receive
/// pipeline, and runs until a shutdown signal arrives.
///
/// # Errors
///
/// Returns an error if configuration is invalid or a channel's audio
/// device cannot be opened.
async fn run(args: Args) -> Result<ShutdownSignal> {
    if args.device.iter().any(|d| d == "?") {
        let devices = intake::enumerate_input_devices();
        if devices.is_empty() {
            info!("no sound-card input devices found");
        } else {
            info!("available sound-card input devices:");
            for device in devices {
                info!("- {device}");
            }
        }
        return Ok(ShutdownSignal::Interrupt);
    }

    let mut config = Config {
        channels: channel_configs(&args)?,
        hook: args.hook,
        stats_interval_secs: args.stats_interval_secs,
        two_separated_queue_len: tncd::config::DEFAULT_TWO_SEPARATED_QUEUE_LEN,
    };
    if let Some(path) = &args.config {
        config = config.overlay_file(path)?;
    }

    let stats = Arc::new(Stats::new(config.channels.len()));
    let (sink, mut delivered) = Sink::channel();
    let (deferred, deferred_rx) = device::DeferredQueue::new(config.two_separated_queue_len);
    let _deferred_worker = device::spawn_deferred_worker(deferred_rx);

    for (index, channel) in config.channels.into_iter().enumerate() {
        let device = Device::open(
            index,
            channel,
            sink.clone(),
            Arc::clone(&stats),
            config.hook.clone(),
            deferred.clone(),
            fastrand::u64(..),
        )?;
        // Each channel runs its blocking intake loop for the life of the
        // process; there is nothing to join on clean shutdown.
        let _ = device.spawn();
    }
    drop(sink);

    tokio::spawn(async move {
        while let Some(frame) = delivered.recv().await {
            info!(
                "channel {}.{}.{}: {} bytes, {:?}, {} retries [{}]",
                frame.channel,
                frame.subchannel,
                frame.slicer,
                frame.packet.bytes.len(),
                frame.fec_type,
                frame.retries,
                frame.spectrum,
            );
        }
    });

    let mut reporter = Reporter::new(config.stats_interval());
    let reporter_stats = Arc::clone(&stats);
    tokio::spawn(async move {
        loop {
            reporter.tick(&reporter_stats).await;
        }
    });

    let mut signals = signal::Handler::new()?;
    loop {
        match signals.recv().await {
            ShutdownSignal::Interrupt | ShutdownSignal::Terminate => {
                info!("received shutdown signal, shutting down");
                break Ok(ShutdownSignal::Interrupt);
            }
            ShutdownSignal::Reload => {
                // Channel intake threads run a blocking loop with no
                // reconfiguration hook, so a true hot reload would leak
                // them. Treat SIGHUP as a clean shutdown instead; an
                // external supervisor restarts the process for a new
                // configuration to take effect.
                log::warn!("received SIGHUP; configuration reload requires a restart, shutting down");
                break Ok(ShutdownSignal::Interrupt);
            }
        }
    }
}

/// Application entry point.
///
/// Sets up the environment and manages the application lifecycle:
/// 1. Parses command line arguments
/// 2. Initializes logging
/// 3. Runs the receive pipeline until shutdown
///
/// Exits with status code:
/// - 0 for clean shutdown
/// - 1 if an error occurs
#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_logger(&args);

    debug!("Command {:#?}", args);

    let cmd = command!();
    let name = cmd.get_name().to_string();
    let mut version = cmd.get_version().unwrap_or("UNKNOWN").to_string();
    if let Some(hash) = option_env!("TNCD_COMMIT_HASH") {
        version.push_str(&format!(".{hash}"));
    }
    if let Some(date) = option_env!("TNCD_COMMIT_DATE") {
        version.push_str(&format!(" ({date})"));
    }

    info!("starting {name}/{version}; {BUILD_PROFILE}");

    match run(args).await {
        Ok(_) => {
            info!("shut down gracefully");
            process::exit(0);
        }
        Err(e) => {
            error!("{e}");
            process::exit(1);
        }
    }
}
