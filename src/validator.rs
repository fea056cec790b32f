//! Deferred frame validator (C4): turns a captured [`Rrbb`] into a
//! verified [`Packet`], trying increasingly expensive bit-flip recovery
//! strategies when the frame-check sequence fails outright.
//!
//! Grounded on the HDLC deframing state machine in `rustradio`'s IL2P
//! block and its `fix_bits`-style recovery option exercised in the
//! AX.25 1200 baud receive example (`HdlcDeframer::new(..).set_fix_bits(..)`).

use crate::crc;
use crate::packet::{Effort, FecType, Packet, MIN_FRAME_LEN};
use crate::rrbb::{ChannelDecoder, Rrbb};

/// HDLC flag octet.
const FLAG: u8 = 0x7e;
/// Seven-ones abort pattern.
const ABORT: u8 = 0xfe;
const STUFF_MASK: u8 = 0xfc;
const STUFF_VALUE: u8 = 0x7c;

/// Outcome of validating one captured bit window.
#[derive(Debug)]
pub enum Outcome {
    /// The window decoded to a valid frame at the given effort level.
    Emitted(Packet),
    /// No recovery strategy (up to the caller's requested ceiling)
    /// produced a valid frame.
    Dropped,
}

/// Walks `rrbb`'s bits, replaying NRZI/destuffing from its snapshot,
/// with `flips` bit positions inverted. Returns the assembled frame
/// bytes (FCS included) if a flag closed the frame cleanly, or `None`
/// on abort / non-integral byte count / no closing flag.
fn try_decode(rrbb: &Rrbb, flips: &[usize]) -> Option<Vec<u8>> {
    let mut decoder = ChannelDecoder::from_snapshot(
        rrbb_is_scrambled(rrbb),
        rrbb_lfsr(rrbb),
        rrbb_prev_raw(rrbb),
        rrbb_prev_descrambled(rrbb),
    );
    let mut pat_det: u8 = 0;
    let mut acc: u8 = 0;
    let mut count: u8 = 0;
    let mut frame = Vec::new();

    for i in 0..rrbb.len() {
        let raw = rrbb.bit_with_flips(i, flips);
        let data_bit = decoder.step(raw);

        pat_det = (pat_det >> 1) | (u8::from(data_bit) << 7);

        if pat_det == FLAG {
            if count != 0 {
                return None;
            }
            if frame.len() >= MIN_FRAME_LEN {
                return Some(frame);
            }
            return None;
        }
        if pat_det == ABORT {
            return None;
        }
        if (pat_det & STUFF_MASK) == STUFF_VALUE {
            continue;
        }

        acc |= u8::from(data_bit) << count;
        count += 1;
        if count == 8 {
            frame.push(acc);
            acc = 0;
            count = 0;
        }
    }

    None
}

// Small accessors kept local to this module: `Rrbb` exposes its
// metadata as public fields, these just name the intent at call sites.
fn rrbb_is_scrambled(rrbb: &Rrbb) -> bool {
    rrbb.is_scrambled
}
fn rrbb_lfsr(rrbb: &Rrbb) -> crate::rrbb::Lfsr {
    rrbb.lfsr
}
fn rrbb_prev_raw(rrbb: &Rrbb) -> u8 {
    rrbb.prev_raw
}
fn rrbb_prev_descrambled(rrbb: &Rrbb) -> u8 {
    rrbb.prev_descrambled
}

/// Checks the sanity of a bit-flip-recovered frame (§4.4).
///
/// A CRC can coincidentally match corrupted data; this rejects frames
/// whose address field or payload bytes are implausible for AX.25.
fn sanity_check(frame: &[u8]) -> bool {
    // Address region ends at the first octet whose LSB is 1 (the
    // "last address" bit in the SSID octet).
    let Some(addr_end) = frame.iter().position(|b| b & 1 == 1).map(|i| i + 1) else {
        return false;
    };
    if addr_end % 7 != 0 {
        return false;
    }
    let num_addrs = addr_end / 7;
    if !(2..=10).contains(&num_addrs) {
        return false;
    }

    for chunk in frame[..addr_end].chunks(7) {
        for (pos, &byte) in chunk[..6].iter().enumerate() {
            let ch = byte >> 1;
            let ok = ch.is_ascii_uppercase() || ch.is_ascii_digit() || (pos > 0 && ch == b' ');
            if !ok {
                return false;
            }
        }
    }

    for &byte in &frame[addr_end.saturating_add(2)..] {
        let printable = (0x20..=0x7e).contains(&byte);
        let whitelisted = matches!(byte, 0x0d | 0x0a | 0x1c..=0x1f | 0x7f | 0x80 | 0x9f | 0xb0 | 0xf8);
        if !printable && !whitelisted {
            return false;
        }
    }

    true
}

/// Verifies a decoded frame's trailing FCS and, for bit-flip-recovered
/// frames, its sanity.
fn verify(frame: &[u8], flips_used: bool) -> Option<Vec<u8>> {
    if frame.len() < MIN_FRAME_LEN || !crc::verify(frame) {
        return None;
    }
    if flips_used && !sanity_check(frame) {
        return None;
    }
    let data = frame[..frame.len() - 2].to_vec();
    Some(data)
}

/// Tries effort levels `None` through `Triple` against `rrbb`, in order,
/// stopping at the first success. `two_separated` is not attempted here:
/// it is O(len²) and belongs on the deferred background queue (§5); see
/// [`try_two_separated`].
#[must_use]
pub fn validate(rrbb: &Rrbb) -> Outcome {
    let len = rrbb.len();

    if let Some(frame) = try_decode(rrbb, &[]) {
        if let Some(bytes) = verify(&frame, false) {
            return Outcome::Emitted(Packet::new(bytes, FecType::None, Effort::None, 0));
        }
    }

    for i in 0..len {
        if let Some(frame) = try_decode(rrbb, &[i]) {
            if let Some(bytes) = verify(&frame, true) {
                return Outcome::Emitted(Packet::new(bytes, FecType::None, Effort::Single, 0));
            }
        }
    }

    for i in 0..len.saturating_sub(1) {
        if let Some(frame) = try_decode(rrbb, &[i, i + 1]) {
            if let Some(bytes) = verify(&frame, true) {
                return Outcome::Emitted(Packet::new(bytes, FecType::None, Effort::Double, 0));
            }
        }
    }

    for i in 0..len.saturating_sub(2) {
        if let Some(frame) = try_decode(rrbb, &[i, i + 1, i + 2]) {
            if let Some(bytes) = verify(&frame, true) {
                return Outcome::Emitted(Packet::new(bytes, FecType::None, Effort::Triple, 0));
            }
        }
    }

    Outcome::Dropped
}

/// Tries the O(len²) `two_separated` recovery ladder: every pair of
/// bit positions at least two apart. Intended to run only on the
/// deferred background worker (§5), never on the bit-ingest hot path.
#[must_use]
pub fn try_two_separated(rrbb: &Rrbb) -> Outcome {
    let len = rrbb.len();
    for i in 0..len {
        for j in (i + 2)..len {
            if let Some(frame) = try_decode(rrbb, &[i, j]) {
                if let Some(bytes) = verify(&frame, true) {
                    return Outcome::Emitted(Packet::new(
                        bytes,
                        FecType::None,
                        Effort::TwoSeparated,
                        0,
                    ));
                }
            }
        }
    }
    Outcome::Dropped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rrbb::Origin;

    fn bits_of(byte: u8) -> impl Iterator<Item = bool> {
        (0..8).map(move |i| (byte >> i) & 1 == 1)
    }

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

    /// Builds a valid AX.25 frame: two 7-byte addresses ("N0CALL" dest,
    /// "APRS" src, both SSID 0, source marked as the last address),
    /// control 0x03, PID 0xf0, a short payload, and a correct FCS.
    fn sample_frame() -> Vec<u8> {
        fn addr(call: &str, ssid: u8, last: bool) -> Vec<u8> {
            let mut padded = call.as_bytes().to_vec();
            padded.resize(6, b' ');
            let mut out: Vec<u8> = padded.iter().map(|&c| c << 1).collect();
            let mut ssid_byte = 0x60 | (ssid << 1);
            if last {
                ssid_byte |= 0x01;
            }
            out.push(ssid_byte);
            out
        }

        let mut frame = Vec::new();
        frame.extend(addr("N0CALL", 0, false));
        frame.extend(addr("APRS", 0, true));
        frame.push(0x03);
        frame.push(0xf0);
        frame.extend_from_slice(b"test");

        let fcs = crc::fcs(&frame);
        frame.push((fcs & 0xff) as u8);
        frame.push((fcs >> 8) as u8);
        frame
    }

    /// Encodes a captured window the way the framer hands it to the
    /// validator: bit-stuffed body bits followed by the raw (unstuffed)
    /// bits of the terminating flag, NRZI-encoded continuously across
    /// the boundary.
    fn encode_window(data: &[u8]) -> Vec<bool> {
        let mut bits = bit_stuff(data);
        bits.extend(bits_of(FLAG));
        nrzi_encode(&bits)
    }

    /// Builds an `Rrbb` the way the framer would after a leading flag:
    /// `nrzi_encode` starts from an idle line level of `true`, so that's
    /// the raw-bit seed the decoder must resume from too.
    fn feed(bits: &[bool]) -> Rrbb {
        let mut rrbb = Rrbb::new(Origin::default(), false, crate::rrbb::Lfsr::default(), 1, 0);
        for &b in bits {
            rrbb.push(b);
        }
        rrbb
    }

    #[test]
    fn clean_frame_validates_with_no_flips() {
        let frame = sample_frame();
        let window = encode_window(&frame);
        let rrbb = feed(&window);

        match validate(&rrbb) {
            Outcome::Emitted(packet) => {
                assert_eq!(packet.effort, Effort::None);
                assert_eq!(packet.bytes, frame[..frame.len() - 2]);
            }
            Outcome::Dropped => panic!("expected a clean decode"),
        }
    }

    #[test]
    fn single_bit_flip_is_recovered() {
        let frame = sample_frame();
        let mut window = encode_window(&frame);
        // Flip a bit safely inside the payload region's encoded window.
        let flip_at = window.len() / 2;
        window[flip_at] = !window[flip_at];
        let rrbb = feed(&window);

        match validate(&rrbb) {
            Outcome::Emitted(packet) => {
                assert!(packet.effort <= Effort::Triple);
                assert_eq!(packet.bytes, frame[..frame.len() - 2]);
            }
            Outcome::Dropped => panic!("expected recovery within the effort ladder"),
        }
    }

    #[test]
    fn garbage_never_produces_a_false_positive() {
        let window: Vec<bool> = (0..300).map(|i| i % 3 == 0).collect();
        let rrbb = feed(&window);
        assert!(matches!(validate(&rrbb), Outcome::Dropped));
    }

    #[test]
    fn sanity_check_rejects_non_address_bytes() {
        let mut frame = sample_frame();
        // Corrupt an address byte into something not representable as
        // an uppercase/digit/space after removing the HDLC shift bit.
        frame[0] = 0x01;
        assert!(!sanity_check(&frame));
    }
}
