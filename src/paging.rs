//! Cursor pagination over the customer roster.

use crate::crm::CustomerView;

/// Cut one page out of an ordered customer list.
///
/// `page_size` absent or zero returns the whole list, which is what callers
/// that predate pagination expect. With an `anchor`, the window starts
/// immediately after the item whose `customer_id` matches; an anchor that is
/// no longer in the list restarts the window from the top rather than
/// failing. The window is clamped to the end of the list.
pub fn page(
    items: Vec<CustomerView>,
    anchor: Option<&str>,
    page_size: Option<usize>,
) -> Vec<CustomerView> {
    let Some(size) = page_size.filter(|s| *s > 0) else {
        return items;
    };

    let start = match anchor {
        Some(anchor) => items
            .iter()
            .position(|c| c.customer_id == anchor)
            .map_or(0, |i| i + 1),
        None => 0,
    };

    items.into_iter().skip(start).take(size).collect()
}
