//! Domain types shared by every relay component.

pub mod session;

pub use session::SessionId;
