//! Walk external collections of unknown size one page at a time
//!
//! Three styles are supported: offset/limit with a reported total (Jira),
//! opaque `next` links (Bitbucket repository listing) and numbered pages
//! where a short page marks the end (Bitbucket deployments).
//!
//! A [`Paginator`] is lazy and single-use: pages are requested only when
//! [`Paginator::next_page`] is awaited, and restarting means building a new one.

use serde::de::DeserializeOwned;
use std::marker::PhantomData;
use tracing::debug;

use crate::error::Result;
use crate::fetch::{fetch_json, FetchRequest, Fetcher};

/// Decoded body of a single page
pub trait Page: DeserializeOwned {
    type Item;

    /// Total collection size, for counted pagination
    fn total(&self) -> Option<u64> {
        None
    }

    /// Absolute URL of the following page, for cursor pagination
    fn next_link(&self) -> Option<String> {
        None
    }

    fn into_items(self) -> Vec<Self::Item>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pagination {
    Counted {
        start_param: &'static str,
        size_param: &'static str,
        page_size: u64,
    },
    Cursor,
    Heuristic {
        page_param: &'static str,
        size_param: &'static str,
        page_size: u64,
    },
}

pub struct Paginator<'a, P> {
    fetcher: &'a dyn Fetcher,
    request: FetchRequest,
    pagination: Pagination,
    position: u64,
    total: Option<u64>,
    next: Option<String>,
    pages_fetched: u32,
    finished: bool,
    _page: PhantomData<fn() -> P>,
}

impl<'a, P: Page> Paginator<'a, P> {
    /// Page sizes below 1 are raised to 1 so the walk always advances.
    pub fn new(fetcher: &'a dyn Fetcher, request: FetchRequest, pagination: Pagination) -> Self {
        let pagination = match pagination {
            Pagination::Counted {
                start_param,
                size_param,
                page_size,
            } => Pagination::Counted {
                start_param,
                size_param,
                page_size: page_size.max(1),
            },
            Pagination::Heuristic {
                page_param,
                size_param,
                page_size,
            } => Pagination::Heuristic {
                page_param,
                size_param,
                page_size: page_size.max(1),
            },
            Pagination::Cursor => Pagination::Cursor,
        };
        let position = match pagination {
            Pagination::Heuristic { .. } => 1,
            _ => 0,
        };

        Self {
            fetcher,
            request,
            pagination,
            position,
            total: None,
            next: None,
            pages_fetched: 0,
            finished: false,
            _page: PhantomData,
        }
    }

    pub fn pages_fetched(&self) -> u32 {
        self.pages_fetched
    }

    /// Fetch the next page, or `None` once the collection is exhausted.
    /// Any failed page aborts the walk with the fetch error.
    pub async fn next_page(&mut self) -> Result<Option<Vec<P::Item>>> {
        if self.finished {
            return Ok(None);
        }

        let mut request = self.request.clone();
        match &self.pagination {
            Pagination::Counted {
                start_param,
                size_param,
                page_size,
            } => {
                if self.total.is_some_and(|total| self.position >= total) {
                    self.finished = true;
                    return Ok(None);
                }
                request.set_query(start_param, self.position);
                request.set_query(size_param, page_size);
            }
            Pagination::Cursor => {
                if let Some(next) = self.next.take() {
                    request.url = next;
                    request.query.clear();
                } else if self.pages_fetched > 0 {
                    self.finished = true;
                    return Ok(None);
                }
            }
            Pagination::Heuristic {
                page_param,
                size_param,
                page_size,
            } => {
                request.set_query(page_param, self.position);
                request.set_query(size_param, page_size);
            }
        }

        let page: P = fetch_json(self.fetcher, &request).await?;
        self.pages_fetched += 1;

        match &self.pagination {
            Pagination::Counted { page_size, .. } => {
                // Sources may revise the total between pages
                self.total = Some(page.total().unwrap_or(0));
                self.position += page_size;
            }
            Pagination::Cursor => {
                self.next = page.next_link();
                self.finished = self.next.is_none();
            }
            Pagination::Heuristic { .. } => {}
        }

        let items = page.into_items();

        if let Pagination::Heuristic { page_size, .. } = &self.pagination {
            if (items.len() as u64) < *page_size {
                self.finished = true;
            } else {
                self.position += 1;
            }
        }

        debug!(
            source = %request.source,
            page = self.pages_fetched,
            items = items.len(),
            "fetched page"
        );

        Ok(Some(items))
    }

    /// Drain every remaining page into one vector
    pub async fn collect_all(mut self) -> Result<Vec<P::Item>> {
        let mut all = Vec::new();
        while let Some(items) = self.next_page().await? {
            all.extend(items);
        }
        Ok(all)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{MetricsError, Source};
    use crate::fetch::testing::RouteFetcher;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct CountedPage {
        total: u64,
        values: Vec<u32>,
    }

    impl Page for CountedPage {
        type Item = u32;

        fn total(&self) -> Option<u64> {
            Some(self.total)
        }

        fn into_items(self) -> Vec<u32> {
            self.values
        }
    }

    #[derive(Debug, Deserialize)]
    struct LinkedPage {
        next: Option<String>,
        values: Vec<u32>,
    }

    impl Page for LinkedPage {
        type Item = u32;

        fn next_link(&self) -> Option<String> {
            self.next.clone()
        }

        fn into_items(self) -> Vec<u32> {
            self.values
        }
    }

    #[derive(Debug, Deserialize)]
    struct PlainPage {
        values: Vec<u32>,
    }

    impl Page for PlainPage {
        type Item = u32;

        fn into_items(self) -> Vec<u32> {
            self.values
        }
    }

    fn counted() -> Pagination {
        Pagination::Counted {
            start_param: "startAt",
            size_param: "maxResults",
            page_size: 2,
        }
    }

    #[tokio::test]
    async fn test_counted_stops_at_total() {
        let fetcher = RouteFetcher::new()
            .route("startAt=0", 200, r#"{"total": 3, "values": [1, 2]}"#)
            .route("startAt=2", 200, r#"{"total": 3, "values": [3]}"#);

        let request = FetchRequest::get(Source::Jira, "https://jira.test/search");
        let items = Paginator::<CountedPage>::new(&fetcher, request, counted())
            .collect_all()
            .await
            .unwrap();

        assert_eq!(items, vec![1, 2, 3]);
        assert_eq!(fetcher.request_count(), 2);
    }

    #[tokio::test]
    async fn test_counted_rereads_revised_total() {
        let fetcher = RouteFetcher::new()
            .route("startAt=0", 200, r#"{"total": 10, "values": [1, 2]}"#)
            .route("startAt=2", 200, r#"{"total": 4, "values": [3, 4]}"#);

        let request = FetchRequest::get(Source::Jira, "https://jira.test/search");
        let items = Paginator::<CountedPage>::new(&fetcher, request, counted())
            .collect_all()
            .await
            .unwrap();

        assert_eq!(items, vec![1, 2, 3, 4]);
        assert_eq!(fetcher.request_count(), 2);
    }

    #[tokio::test]
    async fn test_cursor_follows_next_links() {
        let fetcher = RouteFetcher::new()
            .route(
                "repos?pagelen=100",
                200,
                r#"{"next": "https://bb.test/repos/page2", "values": [1]}"#,
            )
            .route("repos/page2", 200, r#"{"values": [2, 3]}"#);

        let request =
            FetchRequest::get(Source::Bitbucket, "https://bb.test/repos").query("pagelen", 100);
        let mut paginator = Paginator::<LinkedPage>::new(&fetcher, request, Pagination::Cursor);

        assert_eq!(paginator.next_page().await.unwrap(), Some(vec![1]));
        assert_eq!(paginator.next_page().await.unwrap(), Some(vec![2, 3]));
        assert_eq!(paginator.next_page().await.unwrap(), None);
        assert_eq!(paginator.pages_fetched(), 2);
    }

    #[tokio::test]
    async fn test_heuristic_stops_on_short_page() {
        let fetcher = RouteFetcher::new()
            .route("page=1", 200, r#"{"values": [1, 2]}"#)
            .route("page=2", 200, r#"{"values": [3]}"#);

        let request = FetchRequest::get(Source::Bitbucket, "https://bb.test/deployments");
        let pagination = Pagination::Heuristic {
            page_param: "page",
            size_param: "pagelen",
            page_size: 2,
        };
        let items = Paginator::<PlainPage>::new(&fetcher, request, pagination)
            .collect_all()
            .await
            .unwrap();

        assert_eq!(items, vec![1, 2, 3]);
        assert_eq!(fetcher.request_count(), 2);
    }

    #[tokio::test]
    async fn test_failed_page_aborts_walk() {
        let fetcher = RouteFetcher::new()
            .route("startAt=0", 200, r#"{"total": 4, "values": [1, 2]}"#)
            .route("startAt=2", 503, "Service Unavailable");

        let request = FetchRequest::get(Source::Jira, "https://jira.test/search");
        let result = Paginator::<CountedPage>::new(&fetcher, request, counted())
            .collect_all()
            .await;

        assert!(matches!(
            result,
            Err(MetricsError::SourceUnavailable {
                service: Source::Jira,
                ..
            })
        ));
    }
}
