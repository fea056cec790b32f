//! EAS-SAME decoder (C6): preamble/terminator text-burst gathering.
//!
//! Grounded on the same shift-register pattern-matching idiom as the
//! HDLC framer's `pat_det`/`flag4_det` (`src/hdlc.rs`), reapplied to a
//! wider window since the SAME preamble/terminator are 4-byte ASCII
//! sequences rather than single flag octets. EAS bypasses NRZI and bit
//! destuffing entirely (§4.3 "EAS mode") — it shares only the bit
//! ingest call site with the HDLC path, not its framing logic.

use crate::rrbb::Origin;

/// `ZCZC` packed as the last four bytes would sit in a right-shifting
/// 64-bit window, oldest byte at the high end.
const ZCZC: u32 = 0x5A43_5A43;
/// `NNNN`, the SAME terminator preamble.
const NNNN: u32 = 0x4E4E_4E4E;

/// Maximum gathered message length (§4.6), preamble included.
const MAX_TEXT_LEN: usize = 268;

/// Per-(channel, subchannel, slicer) EAS-SAME gathering state.
pub struct EasContext {
    origin: Origin,
    window: u64,
    gathering: bool,
    plus_seen: bool,
    dash_run: u32,
    text: Vec<u8>,
    cur_byte: u8,
    cur_bits: u8,
}

impl EasContext {
    #[must_use]
    pub fn new(origin: Origin) -> Self {
        Self {
            origin,
            window: 0,
            gathering: false,
            plus_seen: false,
            dash_run: 0,
            text: Vec::new(),
            cur_byte: 0,
            cur_bits: 0,
        }
    }

    #[must_use]
    pub fn channel(&self) -> usize {
        self.origin.channel
    }

    /// Whether a burst is currently being gathered.
    #[must_use]
    pub fn gathering(&self) -> bool {
        self.gathering
    }

    /// Feeds one raw bit. Returns the gathered message bytes once a
    /// burst closes, either on three dashes following a `+` field or on
    /// the `NNNN` terminator preamble.
    pub fn rec_bit(&mut self, bit: bool) -> Option<Vec<u8>> {
        self.window = (self.window >> 1) | (u64::from(bit) << 63);
        let last_four = (self.window >> 32) as u32;

        if last_four == NNNN {
            if self.gathering {
                self.gathering = false;
                return Some(std::mem::take(&mut self.text));
            }
            return None;
        }

        if !self.gathering {
            if last_four == ZCZC {
                self.gathering = true;
                self.plus_seen = false;
                self.dash_run = 0;
                self.text.clear();
                self.text.extend_from_slice(b"ZCZC");
                self.cur_byte = 0;
                self.cur_bits = 0;
            }
            return None;
        }

        self.cur_byte = (self.cur_byte >> 1) | (u8::from(bit) << 7);
        self.cur_bits += 1;
        if self.cur_bits < 8 {
            return None;
        }
        self.cur_bits = 0;
        let byte = self.cur_byte;
        self.cur_byte = 0;

        let printable = (0x20..=0x7e).contains(&byte);
        let whitelisted = matches!(byte, 0x0d | 0x0a);
        if !printable && !whitelisted {
            self.gathering = false;
            return None;
        }
        if self.text.len() >= MAX_TEXT_LEN {
            self.gathering = false;
            return None;
        }

        self.text.push(byte);

        if byte == b'+' {
            self.plus_seen = true;
            self.dash_run = 0;
        } else if self.plus_seen && byte == b'-' {
            self.dash_run += 1;
            if self.dash_run == 3 {
                self.gathering = false;
                return Some(std::mem::take(&mut self.text));
            }
        } else {
            self.dash_run = 0;
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bits_of(byte: u8) -> impl Iterator<Item = bool> {
        (0..8).map(move |i| (byte >> i) & 1 == 1)
    }

    fn feed_bytes(ctx: &mut EasContext, bytes: &[u8]) -> Option<Vec<u8>> {
        let mut result = None;
        for &byte in bytes {
            for bit in bits_of(byte) {
                if let Some(text) = ctx.rec_bit(bit) {
                    result = Some(text);
                }
            }
        }
        result
    }

    #[test]
    fn terminator_preamble_closes_a_burst() {
        let mut ctx = EasContext::new(Origin::default());
        let message = b"ZCZC-WXR-TOR-012345+0030-2051700-KTLX/NWS-NNNN";
        let result = feed_bytes(&mut ctx, message);
        assert_eq!(result.as_deref(), Some(&message[..message.len() - 4]));
        assert!(!ctx.gathering());
    }

    #[test]
    fn three_dashes_after_plus_closes_a_burst_early() {
        let mut ctx = EasContext::new(Origin::default());
        let message = b"ZCZC-WXR-TOR-012345+0030---";
        let result = feed_bytes(&mut ctx, message);
        assert_eq!(result.as_deref(), Some(&message[..]));
        assert!(!ctx.gathering());
    }

    #[test]
    fn non_printable_byte_abandons_the_burst() {
        let mut ctx = EasContext::new(Origin::default());
        assert!(feed_bytes(&mut ctx, b"ZCZC-WX").is_none());
        assert!(ctx.gathering());
        assert!(feed_bytes(&mut ctx, &[0x01]).is_none());
        assert!(!ctx.gathering());
        // A terminator after abandonment produces nothing: there is no
        // burst left to close.
        assert!(feed_bytes(&mut ctx, b"NNNN").is_none());
    }

    #[test]
    fn no_preamble_produces_no_bursts() {
        let mut ctx = EasContext::new(Origin::default());
        let noise: Vec<u8> = (0..64u8).collect();
        assert!(feed_bytes(&mut ctx, &noise).is_none());
        assert!(!ctx.gathering());
    }
}
