//! Recording interaction simulator for tests.

use std::sync::{Mutex, PoisonError};

use crate::application::handle_events::{Interaction, InteractionError, InteractionSimulator};

/// Records every interaction it is asked to perform.
///
/// Built with [`RecordingSimulator::failing`] it rejects every call, which
/// lets tests exercise the error path.
#[derive(Debug, Default)]
pub struct RecordingSimulator {
    performed: Mutex<Vec<Interaction>>,
    should_fail: bool,
}

impl RecordingSimulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            should_fail: true,
            ..Self::default()
        }
    }

    /// Interactions performed so far, oldest first.
    pub fn performed(&self) -> Vec<Interaction> {
        self.performed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl InteractionSimulator for RecordingSimulator {
    fn perform(&self, interaction: &Interaction) -> Result<(), InteractionError> {
        if self.should_fail {
            return Err(InteractionError::Simulation("mock failure".to_string()));
        }
        self.performed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(*interaction);
        Ok(())
    }
}
