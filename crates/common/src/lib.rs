//! Wire types and errors shared by the WaaS envelope crates.

pub mod error;
pub mod protocol;

pub use error::SdkError;
pub use protocol::{ApiResponse, Envelope};
