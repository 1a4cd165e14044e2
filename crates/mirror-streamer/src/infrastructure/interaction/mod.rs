//! Interaction simulators.
//!
//! Real window automation is platform-specific and out of scope for this
//! crate; [`LoggingSimulator`] records what would be done so the binary can
//! run anywhere.  Tests use [`mock::RecordingSimulator`].

pub mod mock;

use tracing::info;

use crate::application::handle_events::{Interaction, InteractionError, InteractionSimulator};

/// Simulator that logs each interaction instead of performing it.
#[derive(Debug, Default)]
pub struct LoggingSimulator;

impl LoggingSimulator {
    pub fn new() -> Self {
        Self
    }
}

impl InteractionSimulator for LoggingSimulator {
    fn perform(&self, interaction: &Interaction) -> Result<(), InteractionError> {
        match interaction {
            Interaction::Click { window_id, button, x, y } => {
                info!("window {window_id}: {button:?} click at ({x}, {y})")
            }
            Interaction::DoubleClick { window_id, button, x, y } => {
                info!("window {window_id}: {button:?} double click at ({x}, {y})")
            }
            Interaction::Scroll { window_id, amount, x, y } => {
                info!("window {window_id}: scroll {amount} at ({x}, {y})")
            }
            Interaction::KeyPress { window_id, key } => {
                info!("window {window_id}: key {key:?}")
            }
        }
        Ok(())
    }
}
