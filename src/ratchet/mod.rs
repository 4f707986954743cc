//! X3DH session bootstrap and Double Ratchet chain stepping (C6 internals).

pub mod double_ratchet;
pub mod x3dh;

pub use double_ratchet::RatchetState;
