//! Data models

mod customer;
mod rule;
mod segment;
mod session;

pub use customer::*;
pub use rule::*;
pub use segment::*;
pub use session::*;
