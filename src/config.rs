//! Configuration for tncd.
//!
//! This module handles:
//! * Audio device selection per channel
//! * Demodulator topology (subchannels, slicers, baud rate)
//! * FX.25 and EAS feature toggles
//! * Test-only fault injection knobs (bit-error rate, frame drop rate)
//! * Hook script and reporting interval
//!
//! Configuration is assembled from command-line arguments, optionally
//! overlaid with a TOML file, the same two-source pattern the original
//! application used for its secrets file.
//!
//! # Examples
//!
//! ```rust
//! use tncd::config::{ChannelConfig, Config};
//!
//! let config = Config {
//!     channels: vec![ChannelConfig::default()],
//!     hook: None,
//!     stats_interval_secs: 10,
//!     two_separated_queue_len: 256,
//! };
//! ```

use std::time::Duration;

use crate::error::{Error, Result};

/// Default reporting interval for audio-level statistics, in seconds.
///
/// Grounded on the teacher's watchdog/reporting-timer pattern in
/// `remote.rs`, which resets a fixed-interval deadline after every
/// report.
pub const DEFAULT_STATS_INTERVAL_SECS: u64 = 10;

/// Default bound on the deferred `two_separated` recovery queue.
///
/// The open question in the design notes ("no explicit upper size
/// stated") is resolved here: a fixed, configurable bound with
/// drop-oldest overflow (see [`crate::device::DeferredQueue`]), so a
/// burst of marginal frames doesn't starve recovery of whatever arrives
/// next.
pub const DEFAULT_TWO_SEPARATED_QUEUE_LEN: usize = 256;

/// Number of parallel bit-flip effort levels the validator will try
/// before giving up on a frame, not counting `two_separated`.
pub const DEFAULT_RETRY_MAX: u32 = 3;

/// How a channel's audio is sourced.
///
/// Mirrors the device-spec grammar described for the audio intake
/// layer: a sound-card identifier, a UDP listener, or standard input.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DeviceSpec {
    /// Read PCM samples from standard input until EOF.
    Stdin,
    /// Listen for PCM samples on a UDP port.
    Udp(u16),
    /// Open a named (or default, if empty) sound-card input device.
    SoundCard(String),
}

impl std::str::FromStr for DeviceSpec {
    type Err = Error;

    /// Parses a device spec string.
    ///
    /// * `"stdin"` or `"-"` -> [`DeviceSpec::Stdin`]
    /// * `"udp"` -> [`DeviceSpec::Udp`] on the default port
    /// * `"udp:<port>"` -> [`DeviceSpec::Udp`] on the given port
    /// * anything else -> [`DeviceSpec::SoundCard`] with that identifier
    fn from_str(s: &str) -> Result<Self> {
        /// Default UDP port for SDR-style raw PCM intake.
        const DEFAULT_UDP_PORT: u16 = 7355;

        if s == "stdin" || s == "-" {
            return Ok(Self::Stdin);
        }

        if let Some(rest) = s.strip_prefix("udp") {
            if rest.is_empty() {
                return Ok(Self::Udp(DEFAULT_UDP_PORT));
            }
            let port = rest
                .strip_prefix(':')
                .ok_or_else(|| Error::invalid(format!("malformed udp device spec: {s}")))?
                .parse::<u16>()?;
            return Ok(Self::Udp(port));
        }

        Ok(Self::SoundCard(s.to_owned()))
    }
}

impl Default for DeviceSpec {
    fn default() -> Self {
        Self::SoundCard(String::new())
    }
}

/// Bit depth of PCM samples taken from a device.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SampleDepth {
    /// 8-bit unsigned samples.
    Eight,
    /// 16-bit signed little-endian samples.
    Sixteen,
}

impl Default for SampleDepth {
    fn default() -> Self {
        Self::Sixteen
    }
}

/// Per-channel demodulator topology and decode feature set.
///
/// Channel 0's defaults (1200 baud AFSK, single sub-channel, single
/// slicer) match a typical single-TNC setup; multi-modem setups raise
/// `subchannels`/`slicers` and let the arbiter (§4.7) pick the winner.
#[derive(Clone, Debug, PartialEq)]
pub struct ChannelConfig {
    /// Audio source for this channel.
    pub device: DeviceSpec,

    /// Sample rate requested from the device, in Hz. The device may
    /// grant a different rate; [`Config`] is updated to the actual
    /// value after the device opens.
    pub sample_rate: u32,

    /// Number of input channels on the device (1 = mono, 2 = stereo).
    pub input_channels: u16,

    /// Bit depth of samples taken from the device.
    pub sample_depth: SampleDepth,

    /// Number of parallel demodulator variants feeding this channel.
    pub subchannels: usize,

    /// Number of data-slicers per demodulator.
    pub slicers: usize,

    /// Line rate in bits per second.
    pub baud: u32,

    /// PSK bits packed per symbol (1 for plain AFSK/FSK, 2 for QPSK, 3
    /// for 8PSK). Used in the `process_age` formula (§4.7).
    pub bits_per_symbol: u32,

    /// Whether FX.25 correlation-tag search runs alongside HDLC framing.
    pub fx25_enabled: bool,

    /// Whether EAS-SAME text gathering runs alongside HDLC framing.
    pub eas_enabled: bool,

    /// Test-only: probability in `[0.0, 1.0]` of inverting each
    /// incoming raw bit before framing. Zero disables injection.
    pub test_ber: f64,

    /// Test-only: probability in `[0.0, 1.0]` of discarding a frame the
    /// arbiter already chose, before it reaches the sink. Zero disables.
    pub test_drop_rate: f64,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            device: DeviceSpec::default(),
            sample_rate: 44_100,
            input_channels: 1,
            sample_depth: SampleDepth::default(),
            subchannels: 1,
            slicers: 1,
            baud: 1200,
            bits_per_symbol: 1,
            fx25_enabled: true,
            eas_enabled: false,
            test_ber: 0.0,
            test_drop_rate: 0.0,
        }
    }
}

impl ChannelConfig {
    /// Samples between successive baud-rate symbol boundaries.
    #[must_use]
    pub fn samples_per_symbol(&self) -> f64 {
        f64::from(self.sample_rate) / (f64::from(self.baud) / f64::from(self.bits_per_symbol))
    }
}

/// Complete configuration for tncd.
#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    /// Per-channel configuration, one entry per physical radio channel.
    pub channels: Vec<ChannelConfig>,

    /// Script to execute when an [`crate::events::Event`] occurs.
    pub hook: Option<String>,

    /// Interval between audio-level statistics reports.
    pub stats_interval_secs: u64,

    /// Bound on the deferred `two_separated` recovery queue (§5).
    pub two_separated_queue_len: usize,
}

impl Config {
    /// Returns the reporting interval as a [`Duration`].
    #[must_use]
    pub fn stats_interval(&self) -> Duration {
        Duration::from_secs(self.stats_interval_secs)
    }

    /// Parses a TOML configuration file and overlays it onto CLI-derived
    /// defaults.
    ///
    /// Only fields present in the file override `self`; all others keep
    /// their CLI/default value. This mirrors the original application's
    /// small, explicitly-validated secrets file, but for operator-facing
    /// settings instead of credentials.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not valid TOML
    /// matching [`FileOverlay`].
    pub fn overlay_file(mut self, path: impl AsRef<std::path::Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let overlay: FileOverlay = toml::from_str(&contents)?;

        if let Some(hook) = overlay.hook {
            self.hook = Some(hook);
        }
        if let Some(secs) = overlay.stats_interval_secs {
            self.stats_interval_secs = secs;
        }
        if let Some(len) = overlay.two_separated_queue_len {
            self.two_separated_queue_len = len;
        }

        Ok(self)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            channels: vec![ChannelConfig::default()],
            hook: None,
            stats_interval_secs: DEFAULT_STATS_INTERVAL_SECS,
            two_separated_queue_len: DEFAULT_TWO_SEPARATED_QUEUE_LEN,
        }
    }
}

/// Shape of the optional TOML overlay file.
///
/// Every field is optional so an operator can override just the one
/// setting they care about.
#[derive(Clone, Debug, Default, serde::Deserialize)]
struct FileOverlay {
    hook: Option<String>,
    stats_interval_secs: Option<u64>,
    two_separated_queue_len: Option<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_stdin_spec() {
        assert_eq!("stdin".parse::<DeviceSpec>().unwrap(), DeviceSpec::Stdin);
        assert_eq!("-".parse::<DeviceSpec>().unwrap(), DeviceSpec::Stdin);
    }

    #[test]
    fn parses_udp_spec_with_default_port() {
        assert_eq!("udp".parse::<DeviceSpec>().unwrap(), DeviceSpec::Udp(7355));
    }

    #[test]
    fn parses_udp_spec_with_explicit_port() {
        assert_eq!(
            "udp:9000".parse::<DeviceSpec>().unwrap(),
            DeviceSpec::Udp(9000)
        );
    }

    #[test]
    fn parses_sound_card_spec() {
        assert_eq!(
            "hw:1,0".parse::<DeviceSpec>().unwrap(),
            DeviceSpec::SoundCard("hw:1,0".to_owned())
        );
    }

    #[test]
    fn rejects_malformed_udp_port() {
        assert!("udp:notaport".parse::<DeviceSpec>().is_err());
    }

    #[test]
    fn samples_per_symbol_accounts_for_psk_packing() {
        let mut channel = ChannelConfig {
            sample_rate: 9600,
            baud: 1200,
            bits_per_symbol: 1,
            ..ChannelConfig::default()
        };
        assert!((channel.samples_per_symbol() - 8.0).abs() < f64::EPSILON);

        channel.bits_per_symbol = 2;
        assert!((channel.samples_per_symbol() - 16.0).abs() < f64::EPSILON);
    }

    #[test]
    fn overlay_only_changes_present_fields() {
        let dir = std::env::temp_dir().join(format!("tncd-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("overlay.toml");
        std::fs::write(&path, "hook = \"/bin/true\"\n").unwrap();

        let config = Config::default().overlay_file(&path).unwrap();
        assert_eq!(config.hook.as_deref(), Some("/bin/true"));
        assert_eq!(config.stats_interval_secs, DEFAULT_STATS_INTERVAL_SECS);

        std::fs::remove_file(&path).ok();
        std::fs::remove_dir(&dir).ok();
    }
}
