//! Authentication: credential store, session guard, and the two-phase
//! recovery flow.

pub mod credentials;
pub mod recovery;
pub mod session;
