//! Domestic listing lookup port.

/// Answers whether a symbol trades on a domestic (KRW) exchange, which earns
/// it the listing bonus during weighting.
pub trait ListingPort {
    fn is_domestically_listed(&self, symbol: &str) -> bool;
}

/// Listing lookup that knows no listings; only override flags apply.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoListings;

impl ListingPort for NoListings {
    fn is_domestically_listed(&self, _symbol: &str) -> bool {
        false
    }
}
