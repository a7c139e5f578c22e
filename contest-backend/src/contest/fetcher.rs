//! Windowed, cursor-paginated walk over a channel's item history

use std::collections::HashMap;

use super::period::Period;
use super::traits::{ItemStore, PageRequest};
use crate::models::CandidateItem;

/// Items per page request; the platform maximum
pub const PAGE_SIZE: u8 = 100;

/// Result of a history walk
#[derive(Debug, Default)]
pub struct FetchedWindow {
    /// In-window items by id
    pub items: HashMap<String, CandidateItem>,
    /// Page requests issued, including the one that failed or came back empty
    pub pages: usize,
    /// False when a page request failed and `items` may be partial
    pub complete: bool,
}

/// Walk backwards from the newest item collecting those created inside
/// `window`.
///
/// Stops on an empty page, a short page, a page reaching past the window's
/// start, a cursor that fails to advance, or a failed request. A failed
/// request ends the walk with what was collected so far.
pub async fn fetch_window(
    store: &dyn ItemStore,
    channel_id: &str,
    window: &Period,
    populate_cache: bool,
    tag: &str,
) -> FetchedWindow {
    let mut fetched = FetchedWindow {
        complete: true,
        ..Default::default()
    };
    let mut cursor: Option<String> = None;

    loop {
        let request = PageRequest {
            before: cursor.as_deref(),
            limit: PAGE_SIZE,
            populate_cache,
        };
        fetched.pages += 1;

        let page = match store.fetch_page(channel_id, request).await {
            Ok(page) => page,
            Err(e) => {
                log::debug!("{} Failed to fetch page {}: {}", tag, fetched.pages, e);
                fetched.complete = false;
                break;
            }
        };

        let Some(oldest) = page.last() else {
            break;
        };
        let reached_start = oldest.created_at < window.start;
        let next_cursor = oldest.id.clone();
        let short_page = page.len() < PAGE_SIZE as usize;

        for item in page {
            if window.contains(&item.created_at) {
                fetched.items.insert(item.id.clone(), item);
            }
        }

        if reached_start || short_page {
            break;
        }
        if cursor.as_deref() == Some(next_cursor.as_str()) {
            log::debug!("{} Cursor did not advance past {}, stopping", tag, next_cursor);
            break;
        }
        cursor = Some(next_cursor);
    }

    log::debug!(
        "{} Fetched {} items in {} pages (complete: {})",
        tag,
        fetched.items.len(),
        fetched.pages,
        fetched.complete
    );
    fetched
}
