//! Wire-protocol message types for the inbound boundary.

pub mod openai;
