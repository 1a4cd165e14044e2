//! Protocol module containing the wire record types and their codec.

pub mod codec;
pub mod messages;

pub use codec::{
    decode_event, decode_event_record, decode_header, decode_payload, encode_event, encode_frame,
    parse_header, ProtocolError,
};
pub use messages::*;
