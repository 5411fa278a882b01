//! Protocol module containing the length-prefixed frame codec.

pub mod codec;

pub use codec::{
    decode_frame, encode_inbound, encode_outbound, InboundFrame, ProtocolError,
    INBOUND_HEADER_SIZE, MAX_FRAME_LEN, OUTBOUND_HEADER_SIZE,
};
