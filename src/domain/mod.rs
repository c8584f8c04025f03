//! Domain types and ports of the FEL workflow.
//!
//! Everything here is free of I/O apart from the port traits, which the
//! `infrastructure` layer implements.

pub mod invoice;
pub mod money;
pub mod payment;
pub mod permission;
pub mod ports;
pub mod session;
pub mod status;
