use thiserror::Error;

/// Errors raised while constructing a [`StripeMap`](crate::StripeMap).
///
/// Point and aggregate operations never fail: a missing key is reported as
/// `None`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The stripe count must be at least one.
    #[error("invalid stripe count {stripe_count}: must be at least 1")]
    InvalidStripeCount {
        /// The rejected stripe count.
        stripe_count: usize,
    },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
