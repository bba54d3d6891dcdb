//! Types shared by the outpost crates: the outbound [`message::Mail`] model,
//! RFC 5322 address handling and logging setup.

pub mod address;
pub mod logging;
pub mod message;

pub use tracing;
