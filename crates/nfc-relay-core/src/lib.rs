//! # nfc-relay-core
//!
//! Shared library for the NFC relay containing the wire codec, the session
//! identifier type, and the in-place field mutation pass applied to relayed
//! payloads.
//!
//! This crate has zero dependencies on sockets, async runtimes, or OS APIs.
//! Everything here operates on byte slices so it can be tested (and
//! benchmarked) without a network.
//!
//! # Architecture overview
//!
//! The relay lets several devices that captured near-field-communication
//! traffic join a numbered *session*.  Every frame one member sends is
//! forwarded to all the other members of that session, so a single physical
//! reader/card interaction can be mirrored to remote participants.
//!
//! - **`protocol`** – How frames travel over the wire.  Inbound frames carry a
//!   4-byte big-endian length plus a 1-byte session id; outbound frames carry
//!   only the length.
//!
//! - **`domain`** – The [`SessionId`] newtype and its reserved "none" value.
//!
//! - **`filter`** – The field mutation pass that rewrites the terminal and
//!   card transaction qualifier bits inside relayed EMV data.

pub mod domain;
pub mod filter;
pub mod protocol;

// Re-export the most-used types at the crate root so callers can write
// `nfc_relay_core::SessionId` instead of `nfc_relay_core::domain::session::SessionId`.
pub use domain::session::SessionId;
pub use filter::mutation::{FieldMutationFilter, MutationOutcome};
pub use protocol::codec::{
    decode_frame, encode_inbound, encode_outbound, InboundFrame, ProtocolError,
};
