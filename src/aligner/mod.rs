pub mod client;
pub mod command;
pub mod error;
pub mod types;

#[cfg(test)]
pub(crate) mod fake;

pub use client::AlignmentClient;
pub use command::CommandAligner;
pub use error::AlignmentError;
pub use types::{AlignOptions, Alignment, Resources};
