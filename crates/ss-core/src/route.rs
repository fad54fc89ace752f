//! Route guard for the Shorts feed
//!
//! The host page is a single-page app, so feed detection and item identity
//! are both derived from the location path on every check.

use crate::types::ItemId;

/// Path prefix of the monitored feed.
pub const FEED_PREFIX: &str = "/shorts/";

/// Whether the path identifies the Shorts feed.
#[inline]
pub fn is_feed(path: &str) -> bool {
    path.starts_with(FEED_PREFIX)
}

/// Extract the item id following `/shorts/`.
///
/// The id is the longest run of `[A-Za-z0-9_-]` after the prefix; anything
/// else (a trailing slash, query, fragment) ends it.
pub fn item_id(path: &str) -> Option<ItemId> {
    let start = path.find(FEED_PREFIX)? + FEED_PREFIX.len();
    let rest = &path[start..];
    let end = rest
        .bytes()
        .position(|b| !is_id_byte(b))
        .unwrap_or(rest.len());

    if end == 0 {
        return None;
    }
    Some(ItemId::new(&rest[..end]))
}

/// The item id, but only while on the feed.
#[inline]
pub fn current_item(path: &str) -> Option<ItemId> {
    if is_feed(path) {
        item_id(path)
    } else {
        None
    }
}

#[inline]
fn is_id_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'-'
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_feed() {
        assert!(is_feed("/shorts/abc123"));
        assert!(is_feed("/shorts/"));
        assert!(!is_feed("/watch"));
        assert!(!is_feed("/"));
        assert!(!is_feed("/feed/shorts/abc"));
    }

    #[test]
    fn test_item_id() {
        assert_eq!(item_id("/shorts/abc_-123"), Some(ItemId::new("abc_-123")));
        assert_eq!(item_id("/shorts/xyz/"), Some(ItemId::new("xyz")));
        assert_eq!(item_id("/shorts/"), None);
        assert_eq!(item_id("/watch"), None);
    }

    #[test]
    fn test_current_item_requires_feed() {
        assert_eq!(current_item("/shorts/a1"), Some(ItemId::new("a1")));
        assert_eq!(current_item("/feed/shorts/a1"), None);
    }
}
