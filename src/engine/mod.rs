//! The election core: who is signing in, whether they may, and what they voted.
//!
//! Every operation takes the store as `&dyn Store` and, where time matters,
//! the current time as an argument.

pub mod identity;
pub mod ledger;
pub mod lifecycle;
pub mod linker;
pub mod otp;
pub mod results;
