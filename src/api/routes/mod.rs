//! API route modules.

pub mod session;
