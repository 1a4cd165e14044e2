//! HandleEventsUseCase: turns UI events from the viewer into interactions
//! with the mirrored window.
//!
//! Events arrive on an `mpsc` channel fed by the connection's read loop.
//! Each one is validated, translated into an [`Interaction`] and handed to an
//! [`InteractionSimulator`].  Invalid events are dropped with a warning; a
//! failed simulation is logged and does not stop the loop.

use mirror_core::protocol::messages::{EventAction, MouseButton};
use mirror_core::UiEvent;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Key codes with a special meaning; every other positive code is a
/// Unicode scalar value.
pub const KEY_ENTER: i32 = 13;
pub const KEY_LEFT: i32 = 255;
pub const KEY_RIGHT: i32 = 254;
pub const KEY_UP: i32 = 253;
pub const KEY_DOWN: i32 = 252;

/// Error type for event handling.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum InteractionError {
    #[error("event cannot be replayed: {0}")]
    Invalid(UiEvent),

    #[error("key code {0} does not map to a key")]
    UnknownKey(i32),

    #[error("simulation failed: {0}")]
    Simulation(String),
}

/// A key the simulator can press.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Enter,
    Left,
    Right,
    Up,
    Down,
    Char(char),
}

/// Maps a keystroke event's value to a [`Key`].
pub fn key_for_code(code: i32) -> Result<Key, InteractionError> {
    match code {
        KEY_ENTER => Ok(Key::Enter),
        KEY_LEFT => Ok(Key::Left),
        KEY_RIGHT => Ok(Key::Right),
        KEY_UP => Ok(Key::Up),
        KEY_DOWN => Ok(Key::Down),
        _ => u32::try_from(code)
            .ok()
            .and_then(char::from_u32)
            .map(Key::Char)
            .ok_or(InteractionError::UnknownKey(code)),
    }
}

/// What the simulator should do to the target window.
///
/// Coordinates are relative to the window's top-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interaction {
    Click {
        window_id: i32,
        button: MouseButton,
        x: i32,
        y: i32,
    },
    DoubleClick {
        window_id: i32,
        button: MouseButton,
        x: i32,
        y: i32,
    },
    Scroll {
        window_id: i32,
        amount: i32,
        x: i32,
        y: i32,
    },
    KeyPress {
        window_id: i32,
        key: Key,
    },
}

impl Interaction {
    /// Translates a UI event.
    ///
    /// # Errors
    ///
    /// Returns [`InteractionError::Invalid`] for events that fail
    /// [`UiEvent::is_valid`] and [`InteractionError::UnknownKey`] for
    /// keystrokes whose code is not a character.
    pub fn from_event(event: &UiEvent) -> Result<Self, InteractionError> {
        if !event.is_valid() {
            return Err(InteractionError::Invalid(*event));
        }
        let window_id = event.window_id;
        let (x, y) = (event.x, event.y);

        match (event.action(), event.button()) {
            (Some(EventAction::Click), Some(button)) => Ok(Interaction::Click {
                window_id,
                button,
                x,
                y,
            }),
            (Some(EventAction::DoubleClick), Some(button)) => Ok(Interaction::DoubleClick {
                window_id,
                button,
                x,
                y,
            }),
            (Some(EventAction::Scroll), _) => Ok(Interaction::Scroll {
                window_id,
                amount: event.value,
                x,
                y,
            }),
            (Some(EventAction::KeyPress), _) => Ok(Interaction::KeyPress {
                window_id,
                key: key_for_code(event.value)?,
            }),
            _ => Err(InteractionError::Invalid(*event)),
        }
    }
}

/// Performs interactions on real (or recorded) windows.
pub trait InteractionSimulator: Send + Sync {
    /// # Errors
    ///
    /// Returns [`InteractionError::Simulation`] if the platform call failed.
    fn perform(&self, interaction: &Interaction) -> Result<(), InteractionError>;
}

/// Validates events and forwards them to an [`InteractionSimulator`].
pub struct HandleEventsUseCase<S: InteractionSimulator> {
    simulator: S,
}

impl<S: InteractionSimulator> HandleEventsUseCase<S> {
    pub fn new(simulator: S) -> Self {
        Self { simulator }
    }

    pub fn simulator(&self) -> &S {
        &self.simulator
    }

    /// Handles one event.
    ///
    /// # Errors
    ///
    /// Returns the translation or simulation error; the caller decides
    /// whether to keep going.
    pub fn handle(&self, event: &UiEvent) -> Result<Interaction, InteractionError> {
        let interaction = Interaction::from_event(event)?;
        self.simulator.perform(&interaction)?;
        debug!("performed {interaction:?}");
        Ok(interaction)
    }

    /// Handles events until the channel closes and returns how many were
    /// performed.
    pub async fn run(&self, mut events: mpsc::Receiver<UiEvent>) -> usize {
        let mut performed = 0;
        while let Some(event) = events.recv().await {
            match self.handle(&event) {
                Ok(_) => performed += 1,
                Err(e) => warn!("skipping event ({event}): {e}"),
            }
        }
        performed
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::interaction::mock::RecordingSimulator;
    use mirror_core::UiEventType;

    #[test]
    fn test_special_key_codes_map_to_named_keys() {
        assert_eq!(key_for_code(13), Ok(Key::Enter));
        assert_eq!(key_for_code(255), Ok(Key::Left));
        assert_eq!(key_for_code(254), Ok(Key::Right));
        assert_eq!(key_for_code(253), Ok(Key::Up));
        assert_eq!(key_for_code(252), Ok(Key::Down));
    }

    #[test]
    fn test_other_key_codes_are_characters() {
        assert_eq!(key_for_code('a' as i32), Ok(Key::Char('a')));
        assert_eq!(key_for_code(0x263A), Ok(Key::Char('☺')));
        assert_eq!(key_for_code(-1), Err(InteractionError::UnknownKey(-1)));
        assert_eq!(key_for_code(0xD800), Err(InteractionError::UnknownKey(0xD800)));
    }

    #[test]
    fn test_click_event_translates_to_click_with_button() {
        // Arrange
        let event = UiEvent::new(UiEventType::RightButtonDown, 0, 120, 340, 7);

        // Act
        let interaction = Interaction::from_event(&event);

        // Assert
        assert_eq!(
            interaction,
            Ok(Interaction::Click {
                window_id: 7,
                button: MouseButton::Right,
                x: 120,
                y: 340
            })
        );
    }

    #[test]
    fn test_double_click_and_scroll_translate() {
        let dbl = UiEvent::new(UiEventType::MiddleDoubleClick, 0, 5, 6, 7);
        let scroll = UiEvent::new(UiEventType::Scroll, -120, 10, 20, 7);

        assert_eq!(
            Interaction::from_event(&dbl),
            Ok(Interaction::DoubleClick {
                window_id: 7,
                button: MouseButton::Middle,
                x: 5,
                y: 6
            })
        );
        assert_eq!(
            Interaction::from_event(&scroll),
            Ok(Interaction::Scroll {
                window_id: 7,
                amount: -120,
                x: 10,
                y: 20
            })
        );
    }

    #[test]
    fn test_invalid_events_are_rejected() {
        let no_position = UiEvent::new(UiEventType::LeftButtonDown, 0, 0, 0, 7);
        let uninitialized = UiEvent::new(UiEventType::Uninitialized, 0, 1, 1, 1);
        let empty_key = UiEvent::new(UiEventType::Keystroke, 0, 0, 0, 7);

        for event in [no_position, uninitialized, empty_key] {
            assert_eq!(
                Interaction::from_event(&event),
                Err(InteractionError::Invalid(event))
            );
        }
    }

    #[test]
    fn test_handle_forwards_valid_event_to_simulator() {
        // Arrange
        let use_case = HandleEventsUseCase::new(RecordingSimulator::new());
        let event = UiEvent::new(UiEventType::Keystroke, KEY_ENTER, 0, 0, 7);

        // Act
        let result = use_case.handle(&event);

        // Assert
        assert!(result.is_ok());
        assert_eq!(
            use_case.simulator().performed(),
            vec![Interaction::KeyPress {
                window_id: 7,
                key: Key::Enter
            }]
        );
    }

    #[test]
    fn test_handle_surfaces_simulator_failure() {
        let use_case = HandleEventsUseCase::new(RecordingSimulator::failing());
        let event = UiEvent::new(UiEventType::LeftButtonDown, 0, 1, 2, 3);

        assert!(matches!(
            use_case.handle(&event),
            Err(InteractionError::Simulation(_))
        ));
    }

    #[tokio::test]
    async fn test_run_skips_invalid_events_and_drains_channel() {
        // Arrange
        let use_case = HandleEventsUseCase::new(RecordingSimulator::new());
        let (tx, rx) = mpsc::channel(8);
        tx.send(UiEvent::new(UiEventType::LeftButtonDown, 0, 1, 2, 3))
            .await
            .unwrap();
        tx.send(UiEvent::new(UiEventType::LeftButtonDown, 0, 0, 0, 3))
            .await
            .unwrap();
        tx.send(UiEvent::new(UiEventType::Scroll, 120, 1, 2, 3))
            .await
            .unwrap();
        drop(tx);

        // Act
        let performed = use_case.run(rx).await;

        // Assert
        assert_eq!(performed, 2);
        assert_eq!(use_case.simulator().performed().len(), 2);
    }
}
