//! Utility functions.
//!
//! Hook script dispatch for [`crate::events::Event`]s.

use crate::events::Event;
use std::process::Command;

/// Runs the configured hook script for `event`, if any.
///
/// The event name is passed via the `TNCD_EVENT` environment variable;
/// event-specific context (channel index, DCD state) is passed via
/// additional `TNCD_*` variables. Spawn failures are logged and otherwise
/// ignored: a missing or broken hook script must never interrupt the
/// receive pipeline.
pub fn run_hook(hook: Option<&str>, event: &Event) {
    let Some(hook) = hook else {
        return;
    };

    let mut command = Command::new(hook);
    command.env("TNCD_EVENT", event.name());

    match event {
        Event::DcdChanged { channel, active } => {
            command
                .env("TNCD_CHANNEL", channel.to_string())
                .env("TNCD_DCD", active.to_string());
        }
        Event::FrameDelivered { channel } => {
            command.env("TNCD_CHANNEL", channel.to_string());
        }
        Event::DeviceError { device } => {
            command.env("TNCD_DEVICE", device);
        }
        Event::Started | Event::Stopped => {}
    }

    if let Err(e) = command.spawn() {
        error!("failed to spawn hook script: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_hook_is_a_no_op() {
        run_hook(None, &Event::Started);
    }

    #[test]
    fn broken_hook_path_does_not_panic() {
        run_hook(Some("/nonexistent/hook/script"), &Event::Stopped);
    }
}
