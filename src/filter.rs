use crate::models::Listing;

/// Whether a listing belongs in the output. Closed (sold or withdrawn) lots
/// are dropped unless `include_sold` is set.
pub fn should_keep(listing: &Listing, include_sold: bool) -> bool {
    include_sold || !listing.status.is_closed()
}
