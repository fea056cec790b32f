//! Delivery sink (C8): the terminal queue decoded packets land in once
//! the arbiter resolves a channel's candidates, or the single-demodulator
//! fast path bypasses arbitration entirely.
//!
//! Grounded on the teacher's `tokio::sync::mpsc` channel idiom
//! (`event_tx`/`event_rx` in `src/remote.rs`): an unbounded sender handed
//! to every producer, with a single receiver owned by whichever task
//! actually writes frames out.

use tokio::sync::mpsc;

use crate::packet::{FecType, Packet};

/// One delivered frame plus its full provenance (§4.8).
#[derive(Debug)]
pub struct DeliveredFrame {
    pub channel: usize,
    pub subchannel: usize,
    pub slicer: usize,
    pub packet: Packet,
    pub audio_level: u32,
    pub fec_type: FecType,
    pub retries: u32,
    pub spectrum: String,
}

/// Producer handle. Cheaply cloned: every (channel, subchannel, slicer)
/// producer and the arbiter's resolution path each hold one.
#[derive(Clone)]
pub struct Sink {
    tx: mpsc::UnboundedSender<DeliveredFrame>,
}

impl Sink {
    /// Creates a sink and its paired receiver.
    #[must_use]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<DeliveredFrame>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Delivers a frame. Ownership of `packet` transfers to whatever
    /// eventually reads it off the receiver; a closed receiver (shutdown
    /// in progress) silently drops the frame.
    pub fn rec_frame(
        &self,
        channel: usize,
        subchannel: usize,
        slicer: usize,
        packet: Packet,
        audio_level: u32,
        spectrum: String,
    ) {
        let fec_type = packet.fec_type;
        let retries = match fec_type {
            FecType::Fx25 => packet.correction_count,
            FecType::None => packet.effort as u32,
        };
        let frame = DeliveredFrame {
            channel,
            subchannel,
            slicer,
            packet,
            audio_level,
            fec_type,
            retries,
            spectrum,
        };
        if self.tx.send(frame).is_err() {
            log::debug!("channel {channel}: delivery sink closed, dropping frame");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::{Effort, MIN_FRAME_LEN};

    #[tokio::test]
    async fn delivered_frame_carries_provenance_through_the_channel() {
        let (sink, mut rx) = Sink::channel();
        let packet = Packet::new(vec![0xAA; MIN_FRAME_LEN], FecType::None, Effort::Double, 0);
        sink.rec_frame(0, 1, 2, packet, 77, "|:.".to_string());

        let delivered = rx.recv().await.expect("a frame should arrive");
        assert_eq!(delivered.channel, 0);
        assert_eq!(delivered.subchannel, 1);
        assert_eq!(delivered.slicer, 2);
        assert_eq!(delivered.audio_level, 77);
        assert_eq!(delivered.retries, Effort::Double as u32);
        assert_eq!(delivered.spectrum, "|:.");
    }

    #[tokio::test]
    async fn fx25_retries_report_the_correction_count() {
        let (sink, mut rx) = Sink::channel();
        let packet = Packet::new(vec![0xAA; MIN_FRAME_LEN], FecType::Fx25, Effort::None, 5);
        sink.rec_frame(0, 0, 0, packet, 50, "5".to_string());

        let delivered = rx.recv().await.expect("a frame should arrive");
        assert_eq!(delivered.retries, 5);
        assert_eq!(delivered.fec_type, FecType::Fx25);
    }

    #[tokio::test]
    async fn dropping_the_receiver_makes_rec_frame_a_silent_no_op() {
        let (sink, rx) = Sink::channel();
        drop(rx);
        let packet = Packet::new(vec![0xAA; MIN_FRAME_LEN], FecType::None, Effort::None, 0);
        sink.rec_frame(0, 0, 0, packet, 0, String::new());
    }
}
