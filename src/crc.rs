//! AX.25 frame-check-sequence computation.
//!
//! AX.25 uses the same CRC-16 as X.25: polynomial 0x1021, reflected,
//! initial value 0xFFFF, final XOR 0xFFFF. The `crc` crate ships this
//! exact parameterization as [`crc::CRC_16_IBM_SDLC`].

use crc::{Crc, CRC_16_IBM_SDLC};

/// Precomputed CRC-16/X.25 (AX.25 FCS) table-based algorithm.
static FCS: Crc<u16> = Crc::<u16>::new(&CRC_16_IBM_SDLC);

/// Computes the AX.25 FCS over `bytes`.
///
/// The result is appended to a frame little-endian: low byte first,
/// then high byte.
#[must_use]
pub fn fcs(bytes: &[u8]) -> u16 {
    FCS.checksum(bytes)
}

/// Verifies that `frame` ends with a correct little-endian FCS.
///
/// `frame` must include the trailing two FCS bytes. Returns `false` if
/// `frame` is shorter than 2 bytes.
#[must_use]
pub fn verify(frame: &[u8]) -> bool {
    let Some(split) = frame.len().checked_sub(2) else {
        return false;
    };
    let (data, trailer) = frame.split_at(split);
    let expected = fcs(data);
    trailer[0] == (expected & 0xff) as u8 && trailer[1] == (expected >> 8) as u8
}

/// Computes a 16-bit content hash for arbiter duplicate detection.
///
/// This is simply the FCS run over the whole frame (addresses through
/// payload, FCS bytes excluded by the caller); it does not need to be
/// cryptographically strong, only cheap and collision-unlikely for the
/// handful of candidates competing in one arbiter window.
#[must_use]
pub fn content_crc(frame: &[u8]) -> u16 {
    fcs(frame)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_vector_round_trips() {
        let data = b"123456789";
        let checksum = fcs(data);
        let mut frame = data.to_vec();
        frame.push((checksum & 0xff) as u8);
        frame.push((checksum >> 8) as u8);
        assert!(verify(&frame));
    }

    #[test]
    fn corrupted_byte_fails_verification() {
        let data = b"123456789";
        let checksum = fcs(data);
        let mut frame = data.to_vec();
        frame.push((checksum & 0xff) as u8);
        frame.push((checksum >> 8) as u8);
        frame[0] ^= 0x01;
        assert!(!verify(&frame));
    }

    #[test]
    fn too_short_frame_fails_verification() {
        assert!(!verify(&[0x00]));
    }
}
