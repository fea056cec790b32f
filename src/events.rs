//! Events emitted by the receive pipeline.
//!
//! These events represent externally observable state changes: a
//! carrier-detect transition, a delivered frame, a device error. They
//! are dispatched to an optional hook script the same way playback
//! events were dispatched in the teacher application, via
//! [`crate::util::run_hook`].
//!
//! # Example
//!
//! ```rust
//! use tncd::events::Event;
//!
//! fn handle_event(event: Event) {
//!     match event {
//!         Event::DcdChanged { channel, active } => {
//!             println!("channel {channel} dcd={active}");
//!         }
//!         Event::FrameDelivered { channel } => println!("frame on channel {channel}"),
//!         _ => {}
//!     }
//! }
//! ```

/// Events that can be emitted by the receive pipeline.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Event {
    /// The pipeline has started and is taking in audio.
    Started,

    /// The composite data-carrier-detect state for a channel changed.
    DcdChanged {
        /// Physical radio channel index.
        channel: usize,
        /// New composite DCD state.
        active: bool,
    },

    /// A frame was delivered to the sink.
    FrameDelivered {
        /// Physical radio channel index.
        channel: usize,
    },

    /// An audio device reported an error.
    DeviceError {
        /// Device identifier as given on the command line.
        device: String,
    },

    /// The pipeline is shutting down.
    Stopped,
}

impl Event {
    /// Returns the event name as used in the `TNCD_EVENT` hook variable.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Started => "started",
            Self::DcdChanged { .. } => "dcd_changed",
            Self::FrameDelivered { .. } => "frame_delivered",
            Self::DeviceError { .. } => "device_error",
            Self::Stopped => "stopped",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_names_are_stable() {
        assert_eq!(Event::Started.name(), "started");
        assert_eq!(
            Event::DcdChanged {
                channel: 0,
                active: true
            }
            .name(),
            "dcd_changed"
        );
        assert_eq!(Event::Stopped.name(), "stopped");
    }
}
