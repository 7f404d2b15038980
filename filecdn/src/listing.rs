//! Listing aggregator: drains a cursor-paginated listing into one ordered sequence.

use tracing::{debug, instrument};

use crate::storage::{Result, StorageClient};

/// Collect every name the backend reports, in backend order.
///
/// Starts a fresh cursor chain on each call and follows it until the backend stops returning a
/// cursor. A backend that never ends its chain keeps this looping. If any page fails, the error
/// is returned and the names gathered so far are dropped.
#[instrument(skip(storage))]
pub async fn list_all(storage: &dyn StorageClient) -> Result<Vec<String>> {
    let mut names = Vec::new();
    let mut cursor: Option<String> = None;
    let mut pages = 0usize;

    loop {
        let page = storage.list(cursor.as_deref()).await?;
        pages += 1;
        names.extend(page.names);

        match page.next_cursor {
            Some(next) => cursor = Some(next),
            None => break,
        }
    }

    debug!(pages, total = names.len(), "Drained file listing");
    Ok(names)
}
