//! The decoded packet and its provenance metadata.
//!
//! A [`Packet`] is the unit of work handed from the validator or FX.25
//! decoder (C4/C5) to the arbiter (C7) and on to the delivery sink (C8).

/// Minimum valid AX.25 frame length in bytes: two 7-byte addresses, one
/// control byte, and a two-byte FCS.
pub const MIN_FRAME_LEN: usize = 2 * 7 + 1 + 2;

/// Maximum AX.25 frame length in bytes: up to 10 addresses, control,
/// PID, a 256-byte information field, and the FCS.
pub const MAX_FRAME_LEN: usize = 10 * 7 + 1 + 1 + 256 + 2;

/// How a packet was recovered, if at all.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum FecType {
    /// Verified directly, no forward error correction applied.
    None,
    /// Recovered via the FX.25 Reed-Solomon codeblock.
    Fx25,
}

/// Bit-flip effort level used to recover a frame with a bad FCS.
///
/// Ordered: each level is tried only after all lower levels fail.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Effort {
    /// No bits were flipped.
    None,
    /// One bit was flipped.
    Single,
    /// Two adjacent bits were flipped.
    Double,
    /// Three adjacent bits were flipped.
    Triple,
    /// Two non-adjacent bits were flipped (deferred, background queue).
    TwoSeparated,
}

impl Effort {
    /// Number of bits that were flipped to recover the frame.
    #[must_use]
    pub fn flips(self) -> u32 {
        match self {
            Self::None => 0,
            Self::Single => 1,
            Self::Double | Self::TwoSeparated => 2,
            Self::Triple => 3,
        }
    }

    /// The spectrum-display character for this effort level (§4.7),
    /// used when the packet was not FEC-corrected.
    #[must_use]
    pub fn spectrum_char(self) -> char {
        match self {
            Self::None => '|',
            Self::Single => ':',
            Self::Double | Self::Triple | Self::TwoSeparated => '.',
        }
    }
}

/// A decoded, FCS-verified AX.25 frame plus its recovery provenance.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Packet {
    /// Full frame bytes, addresses through payload, FCS excluded.
    pub bytes: Vec<u8>,

    /// How the frame was recovered.
    pub fec_type: FecType,

    /// Bit-flip effort level used (meaningless when `fec_type` is `Fx25`,
    /// where it instead reflects the corrected-byte count via
    /// [`Packet::correction_count`]).
    pub effort: Effort,

    /// For FX.25 packets, the number of bytes the Reed-Solomon decoder
    /// corrected. `0` for non-FEC packets.
    pub correction_count: u32,

    /// 16-bit content hash used by the arbiter to detect duplicate
    /// candidates across sub-channels/slicers.
    pub content_crc: u16,
}

impl Packet {
    /// Builds a packet from frame bytes, computing its content CRC.
    #[must_use]
    pub fn new(bytes: Vec<u8>, fec_type: FecType, effort: Effort, correction_count: u32) -> Self {
        let content_crc = crate::crc::content_crc(&bytes);
        Self {
            bytes,
            fec_type,
            effort,
            correction_count,
            content_crc,
        }
    }

    /// The spectrum-display character for this packet (§4.7).
    #[must_use]
    pub fn spectrum_char(&self) -> char {
        match self.fec_type {
            FecType::Fx25 => {
                if self.correction_count >= 10 {
                    '+'
                } else {
                    char::from_digit(self.correction_count, 10).unwrap_or('+')
                }
            }
            FecType::None => self.effort.spectrum_char(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spectrum_char_for_clean_frame() {
        let p = Packet::new(vec![1, 2, 3], FecType::None, Effort::None, 0);
        assert_eq!(p.spectrum_char(), '|');
    }

    #[test]
    fn spectrum_char_for_single_flip() {
        let p = Packet::new(vec![1, 2, 3], FecType::None, Effort::Single, 0);
        assert_eq!(p.spectrum_char(), ':');
    }

    #[test]
    fn spectrum_char_for_fx25_correction() {
        let p = Packet::new(vec![1, 2, 3], FecType::Fx25, Effort::None, 4);
        assert_eq!(p.spectrum_char(), '4');
    }

    #[test]
    fn spectrum_char_for_large_fx25_correction() {
        let p = Packet::new(vec![1, 2, 3], FecType::Fx25, Effort::None, 12);
        assert_eq!(p.spectrum_char(), '+');
    }
}
