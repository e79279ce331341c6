//! Core SMTP types.

mod address;
mod extension;
mod reply;

pub use address::Address;
pub use extension::{AuthMechanism, parse_extension};
pub use reply::{Reply, ReplyCode};
