//! Window-mirror message types.
//!
//! Two record kinds travel over the single TCP connection between the
//! desktop streamer and the viewer:
//!
//! - **Frames** (streamer → viewer): a pipe-delimited UTF-8 header naming the
//!   window, the data type and the payload size, followed by the raw payload
//!   (usually an encoded JPEG).
//! - **UI events** (viewer → streamer): a fixed 20-byte record of five
//!   little-endian `i32` fields describing a click, scroll or keystroke that
//!   should be replayed on the mirrored window.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::protocol::codec::ProtocolError;

// ── Protocol constants ────────────────────────────────────────────────────────

/// Size of the little-endian `u32` length prefix that precedes every record.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Size of a serialized [`UiEvent`] body: five 4-byte fields.
pub const EVENT_RECORD_SIZE: usize = 20;

/// Size of a complete outbound event message (prefix + body).
pub const EVENT_MESSAGE_SIZE: usize = LENGTH_PREFIX_SIZE + EVENT_RECORD_SIZE;

/// Separator between the fields of a frame header.
pub const FIELD_SEPARATOR: char = '|';

/// Data type carried by image frames. Other data types are accepted on the
/// wire but have no consumer.
pub const DATA_TYPE_FRAME: &str = "frame";

// ── Inbound frames ────────────────────────────────────────────────────────────

/// Parsed metadata that precedes every inbound payload.
///
/// On the wire this is `"<window_id>|<data_type>|<payload_length>"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameHeader {
    /// Identifier of the source window (an HWND on Windows streamers).
    pub window_id: String,
    /// What the payload contains; `"frame"` for image data.
    pub data_type: String,
    /// Number of payload bytes that follow the header.
    pub payload_length: u32,
}

/// One complete inbound unit: header fields plus the payload bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frame {
    pub window_id: String,
    pub data_type: String,
    pub payload: Vec<u8>,
}

impl Frame {
    /// Assembles a frame from a decoded header and its payload.
    pub fn from_parts(header: FrameHeader, payload: Vec<u8>) -> Self {
        Self {
            window_id: header.window_id,
            data_type: header.data_type,
            payload,
        }
    }

    /// Returns `true` when the payload is image data for a mirrored window.
    pub fn is_image(&self) -> bool {
        self.data_type == DATA_TYPE_FRAME
    }
}

// ── Outbound UI events ────────────────────────────────────────────────────────

/// Event type codes. The values are part of the wire protocol.
///
/// The mouse codes match OpenCV's `cv2.EVENT_*` constants used by the
/// desktop side; keystrokes use a sentinel far outside that range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i32)]
pub enum UiEventType {
    Uninitialized = 0,
    LeftButtonDown = 1,
    RightButtonDown = 2,
    MiddleButtonDown = 3,
    LeftDoubleClick = 7,
    RightDoubleClick = 8,
    MiddleDoubleClick = 9,
    Scroll = 10,
    Keystroke = -500,
}

impl TryFrom<i32> for UiEventType {
    type Error = ();

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(UiEventType::Uninitialized),
            1 => Ok(UiEventType::LeftButtonDown),
            2 => Ok(UiEventType::RightButtonDown),
            3 => Ok(UiEventType::MiddleButtonDown),
            7 => Ok(UiEventType::LeftDoubleClick),
            8 => Ok(UiEventType::RightDoubleClick),
            9 => Ok(UiEventType::MiddleDoubleClick),
            10 => Ok(UiEventType::Scroll),
            -500 => Ok(UiEventType::Keystroke),
            _ => Err(()),
        }
    }
}

impl fmt::Display for UiEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            UiEventType::Uninitialized => "UNINITIALIZED",
            UiEventType::LeftButtonDown => "LEFT_BUTTON_DOWN",
            UiEventType::RightButtonDown => "RIGHT_BUTTON_DOWN",
            UiEventType::MiddleButtonDown => "MIDDLE_BUTTON_DOWN",
            UiEventType::LeftDoubleClick => "LEFT_DOUBLE_CLICK",
            UiEventType::RightDoubleClick => "RIGHT_DOUBLE_CLICK",
            UiEventType::MiddleDoubleClick => "MIDDLE_DOUBLE_CLICK",
            UiEventType::Scroll => "SCROLL",
            UiEventType::Keystroke => "KEYSTROKE",
        };
        f.write_str(name)
    }
}

/// Mouse button targeted by a click event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
}

/// Coarse classification of what the streamer has to simulate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventAction {
    Click,
    DoubleClick,
    Scroll,
    KeyPress,
}

/// A simulated input event addressed to one mirrored window.
///
/// Immutable once constructed.  `x`/`y` are pixel coordinates inside the
/// source window; `value` is the scroll amount or the key code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UiEvent {
    pub event_type: UiEventType,
    pub value: i32,
    pub x: i32,
    pub y: i32,
    pub window_id: i32,
}

impl Default for UiEvent {
    fn default() -> Self {
        Self::new(UiEventType::Uninitialized, 0, 0, 0, 0)
    }
}

impl UiEvent {
    /// Creates an event from already-numeric fields.
    pub fn new(event_type: UiEventType, value: i32, x: i32, y: i32, window_id: i32) -> Self {
        Self {
            event_type,
            value,
            x,
            y,
            window_id,
        }
    }

    /// Creates an event addressed to the window a frame came from.
    ///
    /// Frame headers carry the window identifier as text; events carry it as
    /// an integer.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::InvalidField`] if the identifier is not a
    /// base-10 `i32`.
    pub fn for_window(
        event_type: UiEventType,
        value: i32,
        x: i32,
        y: i32,
        window_id: &str,
    ) -> Result<Self, ProtocolError> {
        let window_id: i32 = window_id.parse().map_err(|_| {
            ProtocolError::InvalidField(format!("window id {window_id:?} is not an integer"))
        })?;
        Ok(Self::new(event_type, value, x, y, window_id))
    }

    /// Field values in wire order.
    pub fn fields(&self) -> [i32; 5] {
        [
            self.event_type as i32,
            self.value,
            self.x,
            self.y,
            self.window_id,
        ]
    }

    /// The mouse button a click event refers to, if any.
    pub fn button(&self) -> Option<MouseButton> {
        match self.event_type {
            UiEventType::LeftButtonDown | UiEventType::LeftDoubleClick => Some(MouseButton::Left),
            UiEventType::RightButtonDown | UiEventType::RightDoubleClick => {
                Some(MouseButton::Right)
            }
            UiEventType::MiddleButtonDown | UiEventType::MiddleDoubleClick => {
                Some(MouseButton::Middle)
            }
            _ => None,
        }
    }

    /// What kind of interaction has to be simulated for this event.
    pub fn action(&self) -> Option<EventAction> {
        match self.event_type {
            UiEventType::LeftButtonDown
            | UiEventType::RightButtonDown
            | UiEventType::MiddleButtonDown => Some(EventAction::Click),
            UiEventType::LeftDoubleClick
            | UiEventType::RightDoubleClick
            | UiEventType::MiddleDoubleClick => Some(EventAction::DoubleClick),
            UiEventType::Scroll => Some(EventAction::Scroll),
            UiEventType::Keystroke => Some(EventAction::KeyPress),
            UiEventType::Uninitialized => None,
        }
    }

    /// Whether the event carries enough information to be replayed.
    ///
    /// Keystrokes need a key code; scrolls need an amount, a position and a
    /// target window; clicks need a position and a target window.
    pub fn is_valid(&self) -> bool {
        match self.event_type {
            UiEventType::Keystroke => self.value != 0,
            UiEventType::Scroll => {
                self.value != 0 && self.x != 0 && self.y != 0 && self.window_id != 0
            }
            _ => self.x != 0 && self.y != 0 && self.window_id != 0,
        }
    }
}

impl fmt::Display for UiEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} window_id={}", self.event_type, self.window_id)?;
        match self.event_type {
            UiEventType::Keystroke => match u32::try_from(self.value).ok().and_then(char::from_u32) {
                Some(c) if !c.is_control() => write!(f, " value={c:?}"),
                _ => write!(f, " value={}", self.value),
            },
            UiEventType::Scroll => write!(f, " value={} x={} y={}", self.value, self.x, self.y),
            _ => write!(f, " x={} y={}", self.x, self.y),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
