//! # Ports
//!
//! The boundaries of the machine: the host capabilities it consumes
//! (outbound) and the stepping interface it exposes to drivers (inbound).

pub mod inbound;
pub mod outbound;
