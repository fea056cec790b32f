//! Bit-level HDLC framer (C3): NRZI, flag/abort detection, bit
//! destuffing, carrier detect, and raw-bit-buffer capture.
//!
//! One [`Framer`] exists per (channel, subchannel, slicer) triple. It
//! consumes demodulated bits one at a time via [`Framer::rec_bit`] and
//! emits a [`crate::rrbb::Rrbb`] every time a closing flag completes a
//! long-enough inter-flag window. Grounded on the bit-pattern shift
//! registers used by `rustradio`'s IL2P deframer (`pat_det`-style
//! detection) and the NRZI/bit-destuffing pass in its AX.25 1200 baud
//! receive example.

use crate::packet::{MAX_FRAME_LEN, MIN_FRAME_LEN};
use crate::rand::Rng;
use crate::rrbb::{ChannelDecoder, Origin, Rrbb};

/// HDLC flag octet: `01111110`.
const FLAG: u8 = 0x7e;

/// Abort pattern: seven consecutive one-bits clocked through `pat_det`.
const ABORT: u8 = 0xfe;

/// Mask/value pair matching a stuffed zero after five consecutive ones.
const STUFF_MASK: u8 = 0xfc;
const STUFF_VALUE: u8 = 0x7c;

/// Three flags in a row, as the top 24 bits of the 32-bit DCD window.
const DCD_THREE_FLAGS: u32 = 0x007e_7e7e;

/// A flag preceded by all zeros, as the top 24 bits of the DCD window.
const DCD_FLAG_AFTER_ZEROS: u32 = 0x007e_0000;

/// Events a single bit can trigger.
#[derive(Debug)]
pub enum FramerEvent {
    /// A closing flag completed a frame window long enough to validate;
    /// ownership of the buffer transfers to the caller.
    FrameReady(Rrbb),
    /// The composite data-carrier-detect state for this triple changed.
    DcdChanged(bool),
}

/// Bit accumulator that turns destuffed data bits into frame bytes,
/// enforcing the maximum frame length.
#[derive(Clone, Debug, Default)]
struct OctetAccumulator {
    /// `None` while disabled (after an abort, until the next flag).
    state: Option<(u8, u8)>,
    /// Number of complete bytes accumulated since the last flag.
    byte_count: usize,
}

impl OctetAccumulator {
    fn enable(&mut self) {
        self.state = Some((0, 0));
        self.byte_count = 0;
    }

    fn disable(&mut self) {
        self.state = None;
    }

    /// Shifts one destuffed data bit in LSB-first; returns a completed
    /// byte when one is ready, or `None` if still filling or disabled or
    /// already past the maximum frame length.
    fn push(&mut self, bit: bool) -> Option<u8> {
        let (acc, count) = self.state.as_mut()?;
        *acc |= u8::from(bit) << *count;
        *count += 1;
        if *count < 8 {
            return None;
        }
        *count = 0;
        let byte = *acc;
        *acc = 0;
        if self.byte_count >= MAX_FRAME_LEN {
            // Oversized: stop accumulating for the rest of this frame,
            // but stay "enabled" so we don't misreport an abort.
            return None;
        }
        self.byte_count += 1;
        Some(byte)
    }
}

/// Per-(channel, subchannel, slicer) HDLC bit-level state machine.
pub struct Framer {
    origin: Origin,
    is_scrambled: bool,
    decoder: ChannelDecoder,
    pat_det: u8,
    flag4_det: u32,
    octet: OctetAccumulator,
    rrbb: Rrbb,
    data_detect: bool,
    test_ber: f64,
    rng: Rng,
}

impl Framer {
    /// Creates a new framer for `origin`.
    ///
    /// `test_ber` is the probability (`[0.0, 1.0]`) of inverting each
    /// incoming bit before processing, seeded deterministically from
    /// `seed` so test runs reproduce bit-for-bit (§4.3, §9).
    #[must_use]
    pub fn new(origin: Origin, is_scrambled: bool, test_ber: f64, seed: u64) -> Self {
        let mut octet = OctetAccumulator::default();
        octet.enable();
        Self {
            origin,
            is_scrambled,
            decoder: ChannelDecoder::new(is_scrambled),
            pat_det: 0,
            flag4_det: 0,
            octet,
            rrbb: Rrbb::new(origin, is_scrambled, crate::rrbb::Lfsr::default(), 0, 0),
            data_detect: false,
            test_ber,
            rng: Rng::seeded(seed),
        }
    }

    /// Whether this triple currently asserts data-carrier-detect.
    #[must_use]
    pub fn data_detect(&self) -> bool {
        self.data_detect
    }

    /// Processes one demodulated raw bit, returning any events it
    /// triggered. A single bit can both close a frame and flip DCD, so
    /// callers should drain all returned events.
    pub fn rec_bit(&mut self, raw_bit: bool) -> Vec<FramerEvent> {
        let mut events = Vec::new();

        let raw_bit = if self.test_ber > 0.0 && self.rng.chance(self.test_ber) {
            !raw_bit
        } else {
            raw_bit
        };

        let data_bit = self.decoder.step(raw_bit);

        self.pat_det = (self.pat_det >> 1) | (u8::from(data_bit) << 7);
        self.flag4_det = (self.flag4_det >> 1) | (u32::from(data_bit) << 31);

        let top24 = self.flag4_det >> 8;
        let new_dcd = if top24 == DCD_THREE_FLAGS || top24 == DCD_FLAG_AFTER_ZEROS {
            true
        } else if self.pat_det == 0xff {
            false
        } else {
            self.data_detect
        };
        if new_dcd != self.data_detect {
            self.data_detect = new_dcd;
            events.push(FramerEvent::DcdChanged(new_dcd));
        }

        // The RRBB keeps the *raw* (pre-NRZI, pre-descramble) bit so the
        // validator can redo NRZI/descrambling from the same snapshot
        // while trying different bit-flip positions (§4.4).
        self.rrbb.push(raw_bit);

        if self.pat_det == FLAG {
            // The RRBB still holds the 8 bits of this closing flag: the
            // validator needs them to know exactly where the frame
            // ends, since a bit-flip it tries can shift where
            // destuffing lands relative to the original bit stream.
            let fresh = Rrbb::new(
                self.origin,
                self.is_scrambled,
                self.decoder.lfsr(),
                self.decoder.prev_raw(),
                self.decoder.prev_descrambled(),
            );
            if self.rrbb.len() >= MIN_FRAME_LEN * 8 + 8 {
                let ready = std::mem::replace(&mut self.rrbb, fresh);
                events.push(FramerEvent::FrameReady(ready));
            } else {
                self.rrbb = fresh;
            }
            self.octet.enable();
        } else if self.pat_det == ABORT {
            self.octet.disable();
            self.rrbb = Rrbb::new(
                self.origin,
                self.is_scrambled,
                self.decoder.lfsr(),
                self.decoder.prev_raw(),
                self.decoder.prev_descrambled(),
            );
        } else if (self.pat_det & STUFF_MASK) == STUFF_VALUE {
            // Destuffed zero: already captured in the RRBB, not accumulated.
        } else {
            let _ = self.octet.push(data_bit);
        }

        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bits_of(byte: u8) -> impl Iterator<Item = bool> {
        (0..8).map(move |i| (byte >> i) & 1 == 1)
    }

    /// Bit-stuffs a byte slice, inserting a 0 after every five
    /// consecutive 1 bits, LSB-first per byte.
    fn bit_stuff(data: &[u8]) -> Vec<bool> {
        let mut out = Vec::new();
        let mut ones = 0u32;
        for &byte in data {
            for bit in bits_of(byte) {
                out.push(bit);
                if bit {
                    ones += 1;
                    if ones == 5 {
                        out.push(false);
                        ones = 0;
                    }
                } else {
                    ones = 0;
                }
            }
        }
        out
    }

    fn nrzi_encode(bits: &[bool]) -> Vec<bool> {
        let mut level = true;
        bits.iter()
            .map(|&bit| {
                if !bit {
                    level = !level;
                }
                level
            })
            .collect()
    }

    fn flag_bits() -> Vec<bool> {
        bits_of(FLAG).collect()
    }

    #[test]
    fn clean_frame_is_captured_between_flags() {
        let data = vec![0xAAu8; MIN_FRAME_LEN];
        let stuffed = bit_stuff(&data);

        let mut line = Vec::new();
        line.extend(flag_bits());
        line.extend(stuffed);
        line.extend(flag_bits());
        let encoded = nrzi_encode(&line);

        let origin = Origin::default();
        let mut framer = Framer::new(origin, false, 0.0, 0);
        let mut captured = None;
        for bit in encoded {
            for event in framer.rec_bit(bit) {
                if let FramerEvent::FrameReady(rrbb) = event {
                    captured = Some(rrbb);
                }
            }
        }

        let rrbb = captured.expect("frame should have been captured");
        assert_eq!(rrbb.len(), MIN_FRAME_LEN * 8 + 8);
    }

    #[test]
    fn abort_discards_in_progress_frame() {
        let data = vec![0x55u8; MIN_FRAME_LEN];
        let stuffed = bit_stuff(&data);

        let mut line = Vec::new();
        line.extend(flag_bits());
        line.extend(stuffed);
        // Seven consecutive 1 bits: an abort, not bit-stuffed since it's
        // not real data.
        line.extend(std::iter::repeat(true).take(7));
        line.extend(flag_bits());
        let encoded = nrzi_encode(&line);

        let mut framer = Framer::new(Origin::default(), false, 0.0, 0);
        let mut frames = 0;
        for bit in encoded {
            for event in framer.rec_bit(bit) {
                if matches!(event, FramerEvent::FrameReady(_)) {
                    frames += 1;
                }
            }
        }
        assert_eq!(frames, 0);
    }

    #[test]
    fn short_window_is_discarded_not_delivered() {
        let data = vec![0xAAu8; 2];
        let stuffed = bit_stuff(&data);

        let mut line = Vec::new();
        line.extend(flag_bits());
        line.extend(stuffed);
        line.extend(flag_bits());
        let encoded = nrzi_encode(&line);

        let mut framer = Framer::new(Origin::default(), false, 0.0, 0);
        let mut frames = 0;
        for bit in encoded {
            for event in framer.rec_bit(bit) {
                if matches!(event, FramerEvent::FrameReady(_)) {
                    frames += 1;
                }
            }
        }
        assert_eq!(frames, 0);
    }
}
