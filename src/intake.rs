//! Audio intake (C1): moves raw PCM bytes between a configured device
//! and the per-channel byte stream the demodulator consumes.
//!
//! Device opening and the `host|device|rate|format` spec grammar are
//! grounded on the teacher's `Player::get_device` (`src/player.rs`),
//! adapted from output to input devices: `default_input_device`/
//! `input_devices`/`default_input_config`/`supported_input_configs` in
//! place of their output counterparts, same error messages and
//! case-insensitive matching.

use std::collections::VecDeque;
use std::io::Read;
use std::net::UdpSocket;
use std::sync::mpsc;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

use crate::config::{ChannelConfig, DeviceSpec, SampleDepth};
use crate::error::{Error, Result};

/// Clamp bounds for negotiated ring sizing (§4.1).
const MIN_RING_BYTES: usize = 256;
const MAX_RING_BYTES: usize = 32_768;
const FALLBACK_RING_BYTES: usize = 2048;

const SOUND_CARD_MAX_RETRIES: u32 = 10;
const SOUND_CARD_BACKOFF: Duration = Duration::from_millis(250);

/// Computes a ring size in bytes for roughly 10 ms of audio at the
/// given format, rounded up to a 1 KiB multiple and clamped to
/// `[MIN_RING_BYTES, MAX_RING_BYTES]` (§4.1).
#[must_use]
pub fn ring_size(sample_rate: u32, channels: u16, bytes_per_sample: u16) -> usize {
    let per_ms = u64::from(sample_rate) * u64::from(channels) * u64::from(bytes_per_sample) / 1000;
    let raw = per_ms * 10;
    if raw == 0 {
        return FALLBACK_RING_BYTES;
    }
    let raw = raw as usize;
    raw.div_ceil(1024).saturating_mul(1024).clamp(MIN_RING_BYTES, MAX_RING_BYTES)
}

fn bytes_per_sample(depth: SampleDepth) -> u16 {
    match depth {
        SampleDepth::Eight => 1,
        SampleDepth::Sixteen => 2,
    }
}

/// Moves raw bytes between a device and the caller.
///
/// Callers handle sample-size and channel-count semantics themselves;
/// intake only moves bytes (§4.1).
pub trait AudioSource: Send {
    /// Reads one byte, blocking (with internal retry/backoff) until one
    /// is available. Returns `Err` on unrecoverable failure.
    fn get(&mut self) -> Result<u8>;

    /// Writes one byte. Input-only sources always return `Err`.
    fn put(&mut self, byte: u8) -> Result<()>;

    /// Flushes any buffered output.
    fn flush(&mut self) -> Result<()>;

    /// Blocks until buffered output has drained.
    fn wait(&mut self) -> Result<()>;

    /// Releases the underlying device/socket/handle.
    fn close(&mut self);
}

fn input_only(what: &str) -> Error {
    Error::internal(format!("{what} is input-only"))
}

/// Reads PCM bytes from standard input until EOF.
pub struct StdinSource {
    stdin: std::io::Stdin,
}

impl StdinSource {
    #[must_use]
    pub fn open() -> Self {
        Self { stdin: std::io::stdin() }
    }
}

impl AudioSource for StdinSource {
    fn get(&mut self) -> Result<u8> {
        let mut byte = [0u8; 1];
        match self.stdin.lock().read(&mut byte) {
            Ok(0) => Err(Error::eof("stdin closed")),
            Ok(_) => Ok(byte[0]),
            Err(e) => Err(Error::from(e)),
        }
    }

    fn put(&mut self, _byte: u8) -> Result<()> {
        Err(input_only("stdin source"))
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    fn wait(&mut self) -> Result<()> {
        Ok(())
    }

    fn close(&mut self) {}
}

/// Reads PCM bytes from UDP datagrams; packet boundaries are irrelevant
/// (§6), bytes are simply queued in arrival order.
pub struct UdpSource {
    socket: UdpSocket,
    ring: VecDeque<u8>,
    recv_buf: Vec<u8>,
}

impl UdpSource {
    pub fn open(port: u16, ring_capacity: usize) -> Result<Self> {
        let socket = UdpSocket::bind(("0.0.0.0", port)).map_err(Error::from)?;
        Ok(Self {
            socket,
            ring: VecDeque::with_capacity(ring_capacity),
            recv_buf: vec![0u8; ring_capacity.max(MIN_RING_BYTES)],
        })
    }
}

impl AudioSource for UdpSource {
    fn get(&mut self) -> Result<u8> {
        if self.ring.is_empty() {
            let n = self.socket.recv(&mut self.recv_buf).map_err(Error::from)?;
            self.ring.extend(&self.recv_buf[..n]);
        }
        Ok(self.ring.pop_front().unwrap_or(0))
    }

    fn put(&mut self, _byte: u8) -> Result<()> {
        Err(input_only("UDP source"))
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    fn wait(&mut self) -> Result<()> {
        Ok(())
    }

    fn close(&mut self) {}
}

/// Parses a `"[<host>][|<device>][|<sample rate>][|<sample format>]"`
/// spec and opens the matching cpal input device, the same grammar and
/// fallback order as the teacher's output-device selector.
fn open_sound_card_config(spec: &str) -> Result<(cpal::Device, cpal::SupportedStreamConfig)> {
    let mut components = spec.split('|');

    let host = match components.next() {
        Some("") | None => cpal::default_host(),
        Some(name) => cpal::available_hosts()
            .into_iter()
            .find_map(|id| {
                let host = cpal::host_from_id(id).ok()?;
                if host.id().name().eq_ignore_ascii_case(name) {
                    Some(host)
                } else {
                    None
                }
            })
            .ok_or_else(|| Error::fatal(format!("audio host {name} not found")))?,
    };

    let device = match components.next() {
        Some("") | None => host.default_input_device().ok_or_else(|| {
            Error::fatal(format!(
                "default audio input device not found on {}",
                host.id().name()
            ))
        })?,
        Some(name) => {
            let mut devices = host.input_devices().map_err(Error::from)?;
            devices
                .find(|device| device.name().is_ok_and(|n| n.eq_ignore_ascii_case(name)))
                .ok_or_else(|| {
                    Error::fatal(format!(
                        "audio input device {name} not found on {}",
                        host.id().name()
                    ))
                })?
        }
    };

    let config = match components.next() {
        Some("") | None => device.default_input_config().map_err(|e| {
            Error::fatal(format!("default input configuration unavailable: {e}"))
        })?,
        Some(rate) => {
            let rate: u32 = rate
                .parse()
                .map_err(|_| Error::invalid(format!("invalid sample rate {rate}")))?;
            let rate = cpal::SampleRate(rate);
            let format = match components.next() {
                Some("") | None => None,
                other => other,
            };

            device
                .supported_input_configs()
                .map_err(Error::from)?
                .find_map(|config| {
                    if format.is_none_or(|format| {
                        config.sample_format().to_string().eq_ignore_ascii_case(format)
                    }) {
                        config.try_with_sample_rate(rate)
                    } else {
                        None
                    }
                })
                .ok_or_else(|| {
                    Error::fatal(format!(
                        "audio input device {} does not support sample rate {} with {} sample format",
                        device.name().as_deref().unwrap_or("UNKNOWN"),
                        rate.0,
                        format.unwrap_or("default"),
                    ))
                })?
        }
    };

    log::info!(
        "audio input device: {} on {}",
        device.name().as_deref().unwrap_or("UNKNOWN"),
        host.id().name()
    );

    Ok((device, config))
}

fn build_input_stream(
    device: &cpal::Device,
    config: &cpal::SupportedStreamConfig,
    tx: mpsc::Sender<Vec<u8>>,
) -> Result<cpal::Stream> {
    let stream_config: cpal::StreamConfig = config.clone().into();
    let err_fn = |err| log::error!("sound card input stream error: {err}");

    let stream = match config.sample_format() {
        cpal::SampleFormat::I16 => device.build_input_stream(
            &stream_config,
            move |data: &[i16], _: &cpal::InputCallbackInfo| {
                let mut bytes = Vec::with_capacity(data.len() * 2);
                for sample in data {
                    bytes.extend_from_slice(&sample.to_le_bytes());
                }
                let _ = tx.send(bytes);
            },
            err_fn,
            None,
        ),
        cpal::SampleFormat::U8 => device.build_input_stream(
            &stream_config,
            move |data: &[u8], _: &cpal::InputCallbackInfo| {
                let _ = tx.send(data.to_vec());
            },
            err_fn,
            None,
        ),
        other => return Err(Error::fatal(format!("unsupported sample format {other:?}"))),
    };

    stream.map_err(Error::from)
}

/// Captures PCM bytes from a cpal input device, buffering the audio
/// callback's output in a channel so `get` can pull bytes one at a time
/// on whatever thread drives the demodulator.
pub struct SoundCardSource {
    _stream: cpal::Stream,
    rx: mpsc::Receiver<Vec<u8>>,
    ring: VecDeque<u8>,
    retries: u32,
}

impl SoundCardSource {
    pub fn open(spec: &str, config: &mut ChannelConfig) -> Result<Self> {
        let (device, stream_config) = open_sound_card_config(spec)?;

        // Accept whatever the device granted and update the caller's
        // configuration record to match (§4.1 "Parameter negotiation").
        config.sample_rate = stream_config.sample_rate().0;
        config.input_channels = stream_config.channels();

        let (tx, rx) = mpsc::channel();
        let stream = build_input_stream(&device, &stream_config, tx)?;
        stream.play().map_err(Error::from)?;

        let capacity = ring_size(
            config.sample_rate,
            config.input_channels,
            bytes_per_sample(config.sample_depth),
        );

        Ok(Self {
            _stream: stream,
            rx,
            ring: VecDeque::with_capacity(capacity),
            retries: 0,
        })
    }

    fn refill(&mut self) -> Result<()> {
        loop {
            match self.rx.recv_timeout(SOUND_CARD_BACKOFF) {
                Ok(chunk) => {
                    self.ring.extend(chunk);
                    self.retries = 0;
                    return Ok(());
                }
                Err(mpsc::RecvTimeoutError::Timeout) => {
                    self.retries += 1;
                    if self.retries > SOUND_CARD_MAX_RETRIES {
                        return Err(Error::transient("sound card input timed out repeatedly"));
                    }
                }
                Err(mpsc::RecvTimeoutError::Disconnected) => {
                    return Err(Error::fatal("sound card input stream closed"));
                }
            }
        }
    }
}

impl AudioSource for SoundCardSource {
    fn get(&mut self) -> Result<u8> {
        if self.ring.is_empty() {
            self.refill()?;
        }
        Ok(self.ring.pop_front().unwrap_or(0))
    }

    fn put(&mut self, _byte: u8) -> Result<()> {
        Err(input_only("sound card source"))
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    fn wait(&mut self) -> Result<()> {
        Ok(())
    }

    fn close(&mut self) {}
}

/// Lists available sound-card input device specs, in the same
/// `<host>|<device>|<sample rate>|<sample format>` format `open`
/// accepts, one entry per supported sample rate/format combination.
///
/// Grounded on the teacher's `Player::enumerate_devices`, adapted from
/// output to input devices and without the high-resolution sample-rate
/// table (§1 limits this crate to the rates a soft-TNC actually needs).
#[must_use]
pub fn enumerate_input_devices() -> Vec<String> {
    const SAMPLE_RATES: [u32; 2] = [44_100, 48_000];

    let default_host = cpal::default_host();
    let default_device = default_host.default_input_device();

    let mut result = std::collections::HashSet::new();
    for host in cpal::available_hosts().into_iter().filter_map(|id| cpal::host_from_id(id).ok()) {
        let Ok(devices) = host.input_devices() else {
            continue;
        };
        for device in devices {
            let Ok(configs) = device.supported_input_configs() else {
                continue;
            };
            let Ok(name) = device.name() else {
                continue;
            };
            for config in configs {
                for rate in SAMPLE_RATES {
                    if let Some(config) = config.clone().try_with_sample_rate(cpal::SampleRate(rate)) {
                        let mut line = format!(
                            "{}|{}|{}|{}",
                            host.id().name(),
                            name,
                            config.sample_rate().0,
                            config.sample_format(),
                        );
                        if default_host.id() == host.id()
                            && default_device.as_ref().is_some_and(|d| d.name().is_ok_and(|n| n == name))
                        {
                            line.push_str(" (default)");
                        }
                        result.insert(line);
                    }
                }
            }
        }
    }

    let mut result: Vec<_> = result.into_iter().collect();
    result.sort();
    result
}

/// Opens the backend named by `config.device`, updating `config` in
/// place with any negotiated parameters the backend could not honor
/// exactly.
pub fn open(config: &mut ChannelConfig) -> Result<Box<dyn AudioSource>> {
    match config.device.clone() {
        DeviceSpec::Stdin => Ok(Box::new(StdinSource::open())),
        DeviceSpec::Udp(port) => {
            let capacity = ring_size(
                config.sample_rate,
                config.input_channels,
                bytes_per_sample(config.sample_depth),
            );
            Ok(Box::new(UdpSource::open(port, capacity)?))
        }
        DeviceSpec::SoundCard(ref spec) => Ok(Box::new(SoundCardSource::open(spec, config)?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ring_size_rounds_up_to_a_kib_multiple() {
        let size = ring_size(44_100, 1, 2);
        assert_eq!(size % 1024, 0);
        assert!(size >= MIN_RING_BYTES);
    }

    #[test]
    fn ring_size_clamps_to_the_upper_bound() {
        let size = ring_size(192_000, 2, 2);
        assert_eq!(size, MAX_RING_BYTES);
    }

    #[test]
    fn ring_size_falls_back_when_the_format_is_degenerate() {
        assert_eq!(ring_size(0, 1, 2), FALLBACK_RING_BYTES);
    }

    #[test]
    fn udp_source_queues_datagram_bytes_in_order() {
        let mut source = UdpSource::open(0, 1024).expect("binding an ephemeral UDP port");
        let local_addr = source.socket.local_addr().expect("socket should be bound");
        let sender = UdpSocket::bind("127.0.0.1:0").expect("binding a sender socket");
        sender.send_to(&[1, 2, 3, 4], local_addr).expect("send should succeed");

        for expected in [1u8, 2, 3, 4] {
            assert_eq!(source.get().unwrap(), expected);
        }
    }

    #[test]
    fn stdin_source_rejects_writes() {
        let mut source = StdinSource::open();
        assert!(source.put(0).is_err());
        assert!(source.flush().is_ok());
    }
}
