//! Cursor pagination over a group's message history.

use std::time::Duration;

use crate::tocaro::models::Message;
use crate::CoreError;

/// Throttling and safety settings for [`crate::TocaroClient::get_all_messages`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaginationOptions {
    /// Pause after every non-empty page.
    pub delay: Duration,
    /// Fail once this many non-empty pages have been fetched without reaching
    /// an empty one. `None` keeps paging until the server runs out.
    pub max_pages: Option<usize>,
}

impl PaginationOptions {
    /// Options with the given delay in seconds and no page bound.
    #[must_use]
    pub fn with_delay_secs(secs: f64) -> Self {
        Self {
            delay: Duration::try_from_secs_f64(secs).unwrap_or_default(),
            max_pages: None,
        }
    }
}

impl Default for PaginationOptions {
    fn default() -> Self {
        Self {
            delay: Duration::from_millis(300),
            max_pages: None,
        }
    }
}

/// Something that serves one page of messages per cursor.
pub(crate) trait PageSource {
    async fn fetch_page(
        &self,
        group_id: &str,
        cursor: Option<&str>,
    ) -> Result<Vec<Message>, CoreError>;
}

/// Fetch pages until one comes back empty.
///
/// The cursor for the next page is the ulid of the last message received.
/// Pages are concatenated in fetch order without deduplication.
pub(crate) async fn collect_all<S: PageSource>(
    source: &S,
    group_id: &str,
    options: PaginationOptions,
) -> Result<Vec<Message>, CoreError> {
    let mut accumulated = Vec::new();
    let mut cursor: Option<String> = None;
    let mut pages = 0_usize;

    loop {
        let page = source.fetch_page(group_id, cursor.as_deref()).await?;
        let Some(last) = page.last() else {
            break;
        };

        pages += 1;
        if let Some(max) = options.max_pages
            && pages > max
        {
            return Err(CoreError::PageLimitExceeded {
                group_id: group_id.to_string(),
                pages: max,
            });
        }

        cursor = Some(last.ulid().to_string());
        log::debug!(
            "group {group_id}: page {pages} with {} messages, next cursor {}",
            page.len(),
            last.ulid()
        );
        accumulated.extend(page);

        if !options.delay.is_zero() {
            tokio::time::sleep(options.delay).await;
        }
    }

    log::info!(
        "group {group_id}: fetched {} messages in {pages} pages",
        accumulated.len()
    );
    Ok(accumulated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::VecDeque;

    /// Serves scripted pages and records the cursor of every request.
    struct ScriptedPages {
        pages: RefCell<VecDeque<Vec<Message>>>,
        cursors: RefCell<Vec<Option<String>>>,
    }

    impl ScriptedPages {
        fn new(pages: &[&[&str]]) -> Self {
            let pages = pages
                .iter()
                .map(|ulids| ulids.iter().map(|u| Message::new(*u)).collect())
                .collect();
            Self {
                pages: RefCell::new(pages),
                cursors: RefCell::new(Vec::new()),
            }
        }

        fn cursors(&self) -> Vec<Option<String>> {
            self.cursors.borrow().clone()
        }
    }

    impl PageSource for ScriptedPages {
        async fn fetch_page(
            &self,
            _group_id: &str,
            cursor: Option<&str>,
        ) -> Result<Vec<Message>, CoreError> {
            self.cursors.borrow_mut().push(cursor.map(String::from));
            Ok(self.pages.borrow_mut().pop_front().unwrap_or_default())
        }
    }

    fn ulids(messages: &[Message]) -> Vec<&str> {
        messages.iter().map(Message::ulid).collect()
    }

    fn no_delay() -> PaginationOptions {
        PaginationOptions {
            delay: Duration::ZERO,
            max_pages: None,
        }
    }

    #[tokio::test]
    async fn concatenates_pages_until_empty() {
        let source = ScriptedPages::new(&[&["a", "b"], &["c"], &[]]);

        let messages = collect_all(&source, "g1", no_delay()).await.unwrap();

        assert_eq!(ulids(&messages), ["a", "b", "c"]);
        assert_eq!(
            source.cursors(),
            [None, Some("b".to_string()), Some("c".to_string())]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn sleeps_after_each_non_empty_page_only() {
        let source = ScriptedPages::new(&[&["a", "b"], &["c"], &[]]);
        let options = PaginationOptions {
            delay: Duration::from_millis(300),
            max_pages: None,
        };
        let started = tokio::time::Instant::now();

        let messages = collect_all(&source, "g1", options).await.unwrap();

        assert_eq!(ulids(&messages), ["a", "b", "c"]);
        assert_eq!(started.elapsed(), Duration::from_millis(600));
    }

    #[tokio::test(start_paused = true)]
    async fn empty_first_page_does_not_sleep() {
        let source = ScriptedPages::new(&[&[]]);
        let started = tokio::time::Instant::now();

        collect_all(&source, "g1", PaginationOptions::default())
            .await
            .unwrap();

        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test]
    async fn empty_first_page_returns_nothing() {
        let source = ScriptedPages::new(&[&[]]);

        let messages = collect_all(&source, "g1", no_delay()).await.unwrap();

        assert!(messages.is_empty());
        assert_eq!(source.cursors(), [None]);
    }

    #[tokio::test]
    async fn duplicates_are_kept() {
        let source = ScriptedPages::new(&[&["a", "b"], &["b", "c"], &[]]);

        let messages = collect_all(&source, "g1", no_delay()).await.unwrap();

        assert_eq!(ulids(&messages), ["a", "b", "b", "c"]);
    }

    #[tokio::test]
    async fn page_bound_allows_exactly_max_pages() {
        let source = ScriptedPages::new(&[&["a"], &["b"], &[]]);
        let options = PaginationOptions {
            max_pages: Some(2),
            ..no_delay()
        };

        let messages = collect_all(&source, "g1", options).await.unwrap();

        assert_eq!(ulids(&messages), ["a", "b"]);
    }

    #[tokio::test]
    async fn page_bound_stops_a_runaway_server() {
        let source = ScriptedPages::new(&[&["a"], &["a"], &["a"], &["a"]]);
        let options = PaginationOptions {
            max_pages: Some(2),
            ..no_delay()
        };

        let err = collect_all(&source, "g1", options).await.unwrap_err();

        assert!(matches!(
            err,
            CoreError::PageLimitExceeded { pages: 2, .. }
        ));
        assert_eq!(source.cursors().len(), 3);
    }

    #[test]
    fn delay_from_seconds() {
        assert_eq!(
            PaginationOptions::with_delay_secs(1.25).delay,
            Duration::from_millis(1250)
        );
        assert_eq!(
            PaginationOptions::with_delay_secs(-1.0).delay,
            Duration::ZERO
        );
    }
}
