//! DNS MX resolution against a configured recursive resolver.
//!
//! The public entry point is [`lookup_mail_exchangers`], which queries the
//! resolver named in [`ProbeConfig`](crate::ProbeConfig) and returns the
//! mail-exchange hosts in DNS answer order.

mod error;
mod resolver;
mod types;

pub use error::MxError;
pub use resolver::{build_resolver, lookup_mail_exchangers};
pub use types::MxRecord;

pub(crate) use resolver::{LookupMx, resolve_with};

#[cfg(test)]
pub(crate) mod tests;
