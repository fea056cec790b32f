//! Multi-modem arbiter (C7): picks the best of several simultaneous
//! decode candidates on one channel and reports a spectrum string for
//! operator feedback.
//!
//! Grounded on `rustradio`'s multi-block fan-out pattern, where several
//! demodulator variants race on the same samples and a downstream stage
//! must reconcile their outputs; the scoring/aging scheme here is this
//! crate's equivalent of that reconciliation step.

use crate::config::ChannelConfig;
use crate::packet::{Effort, FecType, Packet};
use crate::rand::Rng;

/// Number of bit periods a candidate may sit unresolved before the
/// arbiter forces a decision (§4.7).
const PROCESS_AFTER_BITS: u64 = 3;

/// Computes `process_age` in audio samples for a channel: how long a
/// candidate slot may go unresolved before `pick_best_candidate` is
/// forced, accounting for PSK bit-packing in the effective symbol rate.
///
/// Built directly on `ChannelConfig::samples_per_symbol` so this stays
/// in lockstep with the demodulator's own notion of symbol rate.
#[must_use]
pub fn process_age_samples(config: &ChannelConfig) -> u64 {
    (PROCESS_AFTER_BITS as f64 * config.samples_per_symbol().max(1.0)) as u64
}

/// A decode candidate occupying one (subchannel, slicer) slot.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub packet: Packet,
    pub audio_level: u32,
    pub age: u64,
}

/// Outcome of resolving one channel's candidate slots.
#[derive(Debug)]
pub struct Resolution {
    /// The winning `(slot index, candidate)`, if any survived scoring
    /// and test-drop injection.
    pub winner: Option<(usize, Candidate)>,
    /// Spectrum display string, one character per slot (§4.7).
    pub spectrum: String,
}

/// Per-channel arbiter state: one slot per (subchannel, slicer) pair.
pub struct ChannelArbiter {
    channel: usize,
    num_subchan: usize,
    num_slicers: usize,
    process_age: u64,
    retry_max: u32,
    test_drop_rate: f64,
    slots: Vec<Option<Candidate>>,
    rng: Rng,
}

impl ChannelArbiter {
    #[must_use]
    pub fn new(
        channel: usize,
        num_subchan: usize,
        num_slicers: usize,
        process_age: u64,
        retry_max: u32,
        test_drop_rate: f64,
        seed: u64,
    ) -> Self {
        Self {
            channel,
            num_subchan,
            num_slicers,
            process_age,
            retry_max,
            test_drop_rate,
            slots: vec![None; num_subchan * num_slicers],
            rng: Rng::seeded(seed),
        }
    }

    /// Whether this channel has only one demodulator variant, in which
    /// case the arbiter is bypassed entirely (§4.7 "Short-circuit").
    #[must_use]
    pub fn fast_path_eligible(&self, fx25_busy: bool) -> bool {
        self.num_subchan == 1 && self.num_slicers == 1 && !fx25_busy
    }

    /// Places a decoded packet into slot `n`, replacing anything
    /// currently there.
    pub fn offer(&mut self, n: usize, packet: Packet, audio_level: u32) {
        self.slots[n] = Some(Candidate {
            packet,
            audio_level,
            age: 0,
        });
    }

    /// Advances every filled slot's age by one sample tick.
    pub fn tick(&mut self) {
        for slot in self.slots.iter_mut().flatten() {
            slot.age += 1;
        }
    }

    /// Whether any filled slot has aged past `process_age` and FX.25 is
    /// not busy on this channel, meaning resolution should run now.
    #[must_use]
    pub fn should_resolve(&self, fx25_busy: bool) -> bool {
        !fx25_busy
            && self
                .slots
                .iter()
                .flatten()
                .any(|candidate| candidate.age > self.process_age)
    }

    fn raw_score(&self, packet: &Packet) -> i64 {
        match packet.fec_type {
            FecType::Fx25 => 9000 - 100 * i64::from(packet.correction_count),
            FecType::None => {
                i64::from(self.retry_max) * 1000 - i64::from(packet.effort as u32) * 1000 + 1
            }
        }
    }

    fn total_score(&self, n: usize) -> i64 {
        let num_bars = self.slots.len() as i64;
        let Some(candidate) = &self.slots[n] else {
            return i64::MIN;
        };
        let mut score = self.raw_score(&candidate.packet);
        for (m, other) in self.slots.iter().enumerate() {
            if m == n {
                continue;
            }
            if let Some(other) = other {
                if other.packet.content_crc == candidate.packet.content_crc {
                    score += num_bars + 1 - (m as i64 - n as i64).abs();
                }
            }
        }
        score
    }

    /// Builds the spectrum display string for the current slot contents.
    #[must_use]
    pub fn spectrum_string(&self) -> String {
        self.slots
            .iter()
            .map(|slot| slot.as_ref().map_or('_', |c| c.packet.spectrum_char()))
            .collect()
    }

    /// Resolves this channel's candidates: scores every filled slot,
    /// picks the highest (ties to the lowest index), applies test-drop
    /// injection, and clears all slots for the next round.
    pub fn resolve(&mut self) -> Resolution {
        let spectrum = self.spectrum_string();

        let scores: Vec<(usize, i64)> = (0..self.slots.len())
            .filter(|&n| self.slots[n].is_some())
            .map(|n| (n, self.total_score(n)))
            .collect();

        let winner = if scores.is_empty() {
            None
        } else if scores.iter().all(|&(_, score)| score == 0) {
            log::error!(
                "channel {}: all arbiter candidate scores are zero, dropping round",
                self.channel
            );
            None
        } else {
            scores
                .iter()
                .max_by(|a, b| a.1.cmp(&b.1).then_with(|| b.0.cmp(&a.0)))
                .map(|&(n, _)| n)
        };

        let mut winner = winner.and_then(|n| self.slots[n].take().map(|c| (n, c)));

        if winner.is_some() && self.test_drop_rate > 0.0 && self.rng.chance(self.test_drop_rate) {
            winner = None;
        }

        for slot in &mut self.slots {
            *slot = None;
        }

        Resolution { winner, spectrum }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::MIN_FRAME_LEN;

    fn packet(bytes: Vec<u8>, fec_type: FecType, effort: Effort, correction_count: u32) -> Packet {
        Packet::new(bytes, fec_type, effort, correction_count)
    }

    fn padded(tag: u8) -> Vec<u8> {
        vec![tag; MIN_FRAME_LEN]
    }

    #[test]
    fn fast_path_applies_only_to_single_demod_idle_fx25() {
        let single = ChannelArbiter::new(0, 1, 1, 10, 3, 0.0, 0);
        assert!(single.fast_path_eligible(false));
        assert!(!single.fast_path_eligible(true));

        let multi = ChannelArbiter::new(0, 2, 1, 10, 3, 0.0, 0);
        assert!(!multi.fast_path_eligible(false));
    }

    #[test]
    fn fec_corrected_candidate_beats_deep_bit_flip_recovery() {
        let mut arbiter = ChannelArbiter::new(0, 2, 1, 10, 3, 0.0, 0);
        arbiter.offer(0, packet(padded(0xAA), FecType::None, Effort::Triple, 0), 100);
        arbiter.offer(1, packet(padded(0xBB), FecType::Fx25, Effort::None, 2), 100);

        let resolution = arbiter.resolve();
        let (winner, _) = resolution.winner.expect("a winner should be chosen");
        assert_eq!(winner, 1);
    }

    #[test]
    fn ties_break_to_the_lowest_index() {
        let mut arbiter = ChannelArbiter::new(0, 2, 1, 10, 3, 0.0, 0);
        arbiter.offer(0, packet(padded(0xAA), FecType::None, Effort::None, 0), 50);
        arbiter.offer(1, packet(padded(0xCC), FecType::None, Effort::None, 0), 50);

        let resolution = arbiter.resolve();
        let (winner, _) = resolution.winner.expect("a winner should be chosen");
        assert_eq!(winner, 0);
    }

    #[test]
    fn duplicate_content_crc_breaks_an_otherwise_exact_tie() {
        let mut arbiter = ChannelArbiter::new(0, 3, 1, 10, 3, 0.0, 0);
        let shared = padded(0xAA);
        // All three slots carry the same effort level, so their raw
        // scores tie exactly; slots 0 and 1 additionally agree on
        // content and sit adjacent, earning a clustering bonus that
        // should decide the contest in their favor over solo slot 2.
        arbiter.offer(0, packet(shared.clone(), FecType::None, Effort::Single, 0), 50);
        arbiter.offer(1, packet(shared, FecType::None, Effort::Single, 0), 50);
        arbiter.offer(2, packet(padded(0xBB), FecType::None, Effort::Single, 0), 50);

        let resolution = arbiter.resolve();
        let (winner, _) = resolution.winner.expect("a winner should be chosen");
        assert!(winner == 0 || winner == 1);
    }

    #[test]
    fn spectrum_string_reflects_slot_contents() {
        let mut arbiter = ChannelArbiter::new(0, 3, 1, 10, 3, 0.0, 0);
        arbiter.offer(0, packet(padded(0xAA), FecType::None, Effort::None, 0), 50);
        arbiter.offer(2, packet(padded(0xBB), FecType::Fx25, Effort::None, 3), 50);

        let resolution = arbiter.resolve();
        assert_eq!(resolution.spectrum, "|_3");
    }

    #[test]
    fn resolution_clears_all_slots() {
        let mut arbiter = ChannelArbiter::new(0, 1, 1, 10, 3, 0.0, 0);
        arbiter.offer(0, packet(padded(0xAA), FecType::None, Effort::None, 0), 50);
        let _ = arbiter.resolve();
        let resolution = arbiter.resolve();
        assert!(resolution.winner.is_none());
        assert_eq!(resolution.spectrum, "_");
    }

    #[test]
    fn should_resolve_waits_for_process_age_and_fx25_idle() {
        let mut arbiter = ChannelArbiter::new(0, 2, 1, 2, 3, 0.0, 0);
        arbiter.offer(0, packet(padded(0xAA), FecType::None, Effort::None, 0), 50);
        assert!(!arbiter.should_resolve(false));
        arbiter.tick();
        arbiter.tick();
        arbiter.tick();
        assert!(arbiter.should_resolve(false));
        assert!(!arbiter.should_resolve(true));
    }
}
