//! Payload filters applied by the relay before a frame is broadcast.

pub mod mutation;

pub use mutation::{FieldMutationFilter, MutationOutcome};
