//! Ranking and detail data contract, and loaders that apply only the latest response.
//!
//! The listing API is an external collaborator: this module defines what it
//! returns ([`RankedItem`], [`NftDetail`]), how results are shown
//! ([`ListingView`]), and the [`RankingSource`] / [`DetailSource`] interfaces
//! implemented over HTTP by `mooncl-http`.
//!
//! [`DetailLoader`] and [`RankingPager`] sit between a source and a view.
//! Requests may overlap; each result is applied only if no newer request was
//! issued in the meantime.

use std::fmt;
use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::sequence::{Latest, RequestSequence, RequestToken};

/// Default page size of the ranking.
pub const DEFAULT_PAGE_SIZE: u32 = 6;

/// Ranking order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortBy {
    /// Most expensive first.
    #[default]
    Price,
    /// Most recently minted first.
    Recent,
}

impl SortBy {
    /// Query-string value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Price => "price",
            Self::Recent => "recent",
        }
    }
}

impl fmt::Display for SortBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parameters of a ranking request. Unset fields are omitted from the query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankingQuery {
    /// Order.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort_by: Option<SortBy>,
    /// Page size.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    /// Items to skip.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<u32>,
}

impl RankingQuery {
    /// Query-string pairs for the fields that are set.
    #[must_use]
    pub fn to_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::with_capacity(3);
        if let Some(sort_by) = self.sort_by {
            pairs.push(("sort_by", sort_by.as_str().to_owned()));
        }
        if let Some(limit) = self.limit {
            pairs.push(("limit", limit.to_string()));
        }
        if let Some(offset) = self.offset {
            pairs.push(("offset", offset.to_string()));
        }
        pairs
    }
}

/// One entry of the ranking endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RankedItem {
    /// Token id, which is also the launchpad listing id.
    pub token_id: u64,
    /// Current owner.
    #[serde(default)]
    pub owner_address: String,
    /// Text content.
    #[serde(default)]
    pub content: String,
    /// Valuation at mint.
    #[serde(default)]
    pub evaluate_price: f64,
    /// Current listing price.
    #[serde(default)]
    pub current_price: f64,
    /// Creation timestamp, as sent by the server.
    #[serde(default)]
    pub created_at: String,
}

/// Response of the detail endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NftDetail {
    /// Token id, which is also the launchpad listing id.
    pub token_id: u64,
    /// Current owner.
    #[serde(default)]
    pub owner_address: String,
    /// Text content.
    #[serde(default)]
    pub content: String,
    /// Price a buyer pays.
    #[serde(default)]
    pub evaluate_price: f64,
    /// Current listing price.
    #[serde(default)]
    pub current_price: f64,
    /// Creation timestamp.
    #[serde(default)]
    pub created_at: String,
    /// Last update timestamp.
    #[serde(default)]
    pub updated_at: Option<String>,
}

/// Display form of a listing.
#[derive(Debug, Clone, PartialEq)]
pub struct ListingView {
    /// Token id as text.
    pub id: String,
    /// Content, or `Opinion #<id>` when empty.
    pub title: String,
    /// Price shown to the user.
    pub price: f64,
    /// Owner address, or `unknown` when empty.
    pub owner: String,
    /// Full content.
    pub content: String,
}

impl ListingView {
    fn new(token_id: u64, content: &str, price: f64, owner: &str) -> Self {
        let title = if content.is_empty() {
            format!("Opinion #{token_id}")
        } else {
            content.to_owned()
        };
        let owner = if owner.is_empty() { "unknown" } else { owner };
        Self {
            id: token_id.to_string(),
            title,
            price,
            owner: owner.to_owned(),
            content: content.to_owned(),
        }
    }
}

impl From<&RankedItem> for ListingView {
    fn from(item: &RankedItem) -> Self {
        Self::new(
            item.token_id,
            &item.content,
            item.current_price,
            &item.owner_address,
        )
    }
}

impl From<&NftDetail> for ListingView {
    fn from(detail: &NftDetail) -> Self {
        Self::new(
            detail.token_id,
            &detail.content,
            detail.evaluate_price,
            &detail.owner_address,
        )
    }
}

/// Source of ranking pages.
pub trait RankingSource: Send + Sync {
    /// Fetch failure.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Fetches one page of the ranking.
    fn ranking(
        &self,
        query: RankingQuery,
    ) -> impl Future<Output = Result<Vec<RankedItem>, Self::Error>> + Send;
}

/// Source of listing details.
pub trait DetailSource: Send + Sync {
    /// Fetch failure.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Fetches the detail of one token.
    fn detail(&self, token_id: u64) -> impl Future<Output = Result<NftDetail, Self::Error>> + Send;
}

/// What happened to a load.
#[derive(Debug, Clone, PartialEq)]
pub enum Loaded<T> {
    /// The result is the latest and was applied.
    Applied(T),
    /// A newer request was issued first; the result was dropped.
    Superseded,
    /// The loader was closed while the request was in flight.
    Cancelled,
}

impl<T> Loaded<T> {
    /// The applied value, if any.
    pub fn applied(self) -> Option<T> {
        match self {
            Self::Applied(value) => Some(value),
            Self::Superseded | Self::Cancelled => None,
        }
    }
}

/// Loads listing details for a view, keeping only the latest response.
///
/// Closing the loader cancels in-flight requests and clears the shown detail.
#[derive(Debug)]
pub struct DetailLoader<S> {
    source: S,
    current: Latest<NftDetail>,
    cancel: Mutex<CancellationToken>,
}

impl<S: DetailSource> DetailLoader<S> {
    /// Creates a loader over `source`.
    pub fn new(source: S) -> Self {
        Self {
            source,
            current: Latest::new(),
            cancel: Mutex::new(CancellationToken::new()),
        }
    }

    fn cancel_token(&self) -> MutexGuard<'_, CancellationToken> {
        self.cancel.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fetches the detail of `token_id`, superseding any earlier load.
    ///
    /// The request is ordered when this method is called, not when the
    /// returned future is first polled.
    ///
    /// # Errors
    ///
    /// Returns the source's error if this is still the latest request; the
    /// shown detail is cleared in that case. Errors of superseded requests
    /// are dropped.
    pub fn load(
        &self,
        token_id: u64,
    ) -> impl Future<Output = Result<Loaded<NftDetail>, S::Error>> + '_ {
        let token = self.current.begin();
        let cancel = self.cancel_token().clone();
        async move {
            if !self.current.is_current(token) {
                return Ok(Loaded::Superseded);
            }
            let result = tokio::select! {
                () = cancel.cancelled() => return Ok(Loaded::Cancelled),
                result = self.source.detail(token_id) => result,
            };
            match result {
                Ok(detail) => {
                    if self.current.apply(token, detail.clone()) {
                        Ok(Loaded::Applied(detail))
                    } else {
                        Ok(Loaded::Superseded)
                    }
                }
                Err(error) => {
                    if self.current.discard(token) {
                        #[cfg(feature = "telemetry")]
                        tracing::warn!(token_id, %error, "Failed to load listing detail");
                        Err(error)
                    } else {
                        Ok(Loaded::Superseded)
                    }
                }
            }
        }
    }

    /// The detail currently shown.
    #[must_use]
    pub fn current(&self) -> Option<NftDetail> {
        self.current.get()
    }

    /// Cancels in-flight loads and clears the shown detail.
    pub fn close(&self) {
        let previous = std::mem::take(&mut *self.cancel_token());
        previous.cancel();
        self.current.clear();
    }
}

#[derive(Debug, Default)]
struct PageState {
    sort_by: SortBy,
    offset: u32,
    items: Vec<ListingView>,
    has_next: bool,
    loading: bool,
}

/// Clears the loading flag of the latest page request when it ends or is dropped.
struct PageLoad<'a, S: RankingSource> {
    pager: &'a RankingPager<S>,
    token: RequestToken,
}

impl<S: RankingSource> Drop for PageLoad<'_, S> {
    fn drop(&mut self) {
        let mut state = self.pager.state();
        if self.pager.sequence.is_latest(self.token) {
            state.loading = false;
        }
    }
}

/// Offset/limit paging over a ranking source.
///
/// `has_next` is true while the last page came back full.
#[derive(Debug)]
pub struct RankingPager<S> {
    source: S,
    limit: u32,
    sequence: RequestSequence,
    state: Mutex<PageState>,
}

impl<S: RankingSource> RankingPager<S> {
    /// Creates a pager with the default page size.
    pub fn new(source: S, sort_by: SortBy) -> Self {
        Self {
            source,
            limit: DEFAULT_PAGE_SIZE,
            sequence: RequestSequence::new(),
            state: Mutex::new(PageState {
                sort_by,
                has_next: true,
                ..PageState::default()
            }),
        }
    }

    /// Sets the page size.
    #[must_use]
    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = limit.max(1);
        self
    }

    fn state(&self) -> MutexGuard<'_, PageState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Loads the first page.
    ///
    /// # Errors
    ///
    /// Returns the source's error if this is still the latest request.
    pub async fn open(&self) -> Result<Loaded<Vec<ListingView>>, S::Error> {
        let sort_by = self.state().sort_by;
        self.fetch(sort_by, 0).await
    }

    /// Switches the order and reloads from the first page.
    ///
    /// # Errors
    ///
    /// Returns the source's error if this is still the latest request.
    pub async fn sort_by(&self, sort_by: SortBy) -> Result<Loaded<Vec<ListingView>>, S::Error> {
        self.fetch(sort_by, 0).await
    }

    /// Loads the next page. Does nothing when there is none or a page is loading.
    ///
    /// # Errors
    ///
    /// Returns the source's error if this is still the latest request.
    pub async fn next_page(&self) -> Result<Loaded<Vec<ListingView>>, S::Error> {
        let (sort_by, offset) = {
            let state = self.state();
            if !state.has_next || state.loading {
                return Ok(Loaded::Superseded);
            }
            (state.sort_by, state.offset + self.limit)
        };
        self.fetch(sort_by, offset).await
    }

    /// Loads the previous page. Does nothing on the first page.
    ///
    /// # Errors
    ///
    /// Returns the source's error if this is still the latest request.
    pub async fn prev_page(&self) -> Result<Loaded<Vec<ListingView>>, S::Error> {
        let (sort_by, offset) = {
            let state = self.state();
            if state.offset == 0 {
                return Ok(Loaded::Superseded);
            }
            (state.sort_by, state.offset.saturating_sub(self.limit))
        };
        self.fetch(sort_by, offset).await
    }

    async fn fetch(
        &self,
        sort_by: SortBy,
        offset: u32,
    ) -> Result<Loaded<Vec<ListingView>>, S::Error> {
        let token = self.sequence.issue();
        self.state().loading = true;
        let in_flight = PageLoad {
            pager: self,
            token,
        };
        let query = RankingQuery {
            sort_by: Some(sort_by),
            limit: Some(self.limit),
            offset: Some(offset),
        };
        let result = self.source.ranking(query).await;
        drop(in_flight);

        if !self.sequence.is_latest(token) {
            return Ok(Loaded::Superseded);
        }
        let items = result?;
        let mut state = self.state();
        let views: Vec<ListingView> = items.iter().map(ListingView::from).collect();
        state.sort_by = sort_by;
        state.offset = offset;
        state.has_next = u32::try_from(items.len()).unwrap_or(u32::MAX) >= self.limit;
        state.items.clone_from(&views);
        Ok(Loaded::Applied(views))
    }

    /// Items of the current page.
    #[must_use]
    pub fn items(&self) -> Vec<ListingView> {
        self.state().items.clone()
    }

    /// Offset of the current page.
    #[must_use]
    pub fn offset(&self) -> u32 {
        self.state().offset
    }

    /// Whether another page may follow.
    #[must_use]
    pub fn has_next(&self) -> bool {
        self.state().has_next
    }

    /// Whether a page request is in flight.
    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.state().loading
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{HashMap, VecDeque};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::oneshot;

    #[derive(Debug, thiserror::Error)]
    #[error("not found")]
    struct NotFound;

    /// Detail source whose responses are released by the test.
    #[derive(Debug, Default)]
    struct GatedDetails {
        gates: Mutex<HashMap<u64, oneshot::Receiver<Result<NftDetail, NotFound>>>>,
    }

    impl GatedDetails {
        fn gate(&self, token_id: u64) -> oneshot::Sender<Result<NftDetail, NotFound>> {
            let (tx, rx) = oneshot::channel();
            self.gates.lock().unwrap().insert(token_id, rx);
            tx
        }
    }

    impl DetailSource for Arc<GatedDetails> {
        type Error = NotFound;

        async fn detail(&self, token_id: u64) -> Result<NftDetail, NotFound> {
            let rx = self.gates.lock().unwrap().remove(&token_id);
            match rx {
                Some(rx) => rx.await.unwrap_or(Err(NotFound)),
                None => Err(NotFound),
            }
        }
    }

    fn detail(token_id: u64) -> NftDetail {
        NftDetail {
            token_id,
            content: format!("opinion {token_id}"),
            evaluate_price: 0.5,
            ..NftDetail::default()
        }
    }

    #[test]
    fn test_view_fallbacks() {
        let item = RankedItem {
            token_id: 9,
            current_price: 1.25,
            ..RankedItem::default()
        };
        let view = ListingView::from(&item);
        assert_eq!(view.id, "9");
        assert_eq!(view.title, "Opinion #9");
        assert_eq!(view.owner, "unknown");
        assert!((view.price - 1.25).abs() < f64::EPSILON);
    }

    #[test]
    fn test_detail_view_uses_evaluate_price() {
        let view = ListingView::from(&NftDetail {
            token_id: 1,
            owner_address: "0xabc".into(),
            content: "hi".into(),
            evaluate_price: 2.0,
            current_price: 3.0,
            ..NftDetail::default()
        });
        assert_eq!(view.title, "hi");
        assert_eq!(view.owner, "0xabc");
        assert!((view.price - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_query_pairs_only_include_set_fields() {
        assert!(RankingQuery::default().to_pairs().is_empty());
        let query = RankingQuery {
            sort_by: Some(SortBy::Recent),
            limit: None,
            offset: Some(12),
        };
        assert_eq!(
            query.to_pairs(),
            vec![("sort_by", "recent".to_owned()), ("offset", "12".to_owned())]
        );
    }

    #[test]
    fn test_dto_deserializes_with_missing_fields() {
        let detail: NftDetail = serde_json::from_str(
            r#"{"token_id":3,"owner_address":"0x1","content":"c","evaluate_price":0.1,"current_price":0.2,"created_at":"2025-01-01T00:00:00Z","updated_at":null}"#,
        )
        .unwrap();
        assert_eq!(detail.token_id, 3);
        assert_eq!(detail.updated_at, None);

        let items: Vec<RankedItem> = serde_json::from_str(r#"[{"token_id":1}]"#).unwrap();
        assert_eq!(items[0].content, "");
    }

    #[tokio::test]
    async fn test_detail_later_request_resolving_first_wins() {
        let source = Arc::new(GatedDetails::default());
        let gate_a = source.gate(1);
        let gate_b = source.gate(2);
        let loader = DetailLoader::new(Arc::clone(&source));

        let load_a = loader.load(1);
        let load_b = loader.load(2);
        let (a, b) = tokio::join!(
            async {
                tokio::task::yield_now().await;
                tokio::task::yield_now().await;
                gate_a.send(Ok(detail(1))).unwrap();
                load_a.await
            },
            async {
                gate_b.send(Ok(detail(2))).unwrap();
                load_b.await
            }
        );
        assert_eq!(b.unwrap(), Loaded::Applied(detail(2)));
        assert_eq!(a.unwrap(), Loaded::Superseded);
        assert_eq!(loader.current(), Some(detail(2)));
    }

    #[tokio::test]
    async fn test_detail_superseded_before_poll_skips_request() {
        let source = Arc::new(GatedDetails::default());
        let _gate_a = source.gate(1);
        let gate_b = source.gate(2);
        gate_b.send(Ok(detail(2))).unwrap();
        let loader = DetailLoader::new(Arc::clone(&source));

        let load_a = loader.load(1);
        let load_b = loader.load(2);
        assert_eq!(load_a.await.unwrap(), Loaded::Superseded);
        assert!(source.gates.lock().unwrap().contains_key(&1));
        assert_eq!(load_b.await.unwrap(), Loaded::Applied(detail(2)));
    }

    #[tokio::test]
    async fn test_detail_close_cancels_in_flight_load() {
        let source = Arc::new(GatedDetails::default());
        let _gate = source.gate(1);
        let loader = DetailLoader::new(Arc::clone(&source));
        let (loaded, ()) = tokio::join!(loader.load(1), async {
            tokio::task::yield_now().await;
            loader.close();
        });
        assert_eq!(loaded.unwrap(), Loaded::Cancelled);
        assert_eq!(loader.current(), None);
    }

    #[tokio::test]
    async fn test_detail_error_clears_current() {
        let source = Arc::new(GatedDetails::default());
        let gate = source.gate(1);
        gate.send(Ok(detail(1))).unwrap();
        let loader = DetailLoader::new(Arc::clone(&source));
        loader.load(1).await.unwrap();
        assert!(loader.current().is_some());

        assert!(loader.load(5).await.is_err());
        assert_eq!(loader.current(), None);
    }

    /// Ranking source returning `total` items split into pages.
    #[derive(Debug)]
    struct FixedRanking {
        total: u64,
        queries: Mutex<Vec<RankingQuery>>,
    }

    impl RankingSource for FixedRanking {
        type Error = NotFound;

        async fn ranking(&self, query: RankingQuery) -> Result<Vec<RankedItem>, NotFound> {
            self.queries.lock().unwrap().push(query);
            let offset = u64::from(query.offset.unwrap_or(0));
            let limit = u64::from(query.limit.unwrap_or(DEFAULT_PAGE_SIZE));
            Ok((offset..self.total.min(offset + limit))
                .map(|token_id| RankedItem {
                    token_id,
                    ..RankedItem::default()
                })
                .collect())
        }
    }

    #[tokio::test]
    async fn test_pager_walks_pages_until_short_page() {
        let pager = RankingPager::new(
            FixedRanking {
                total: 8,
                queries: Mutex::default(),
            },
            SortBy::Price,
        );
        let first = pager.open().await.unwrap().applied().unwrap();
        assert_eq!(first.len(), 6);
        assert!(pager.has_next());

        let second = pager.next_page().await.unwrap().applied().unwrap();
        assert_eq!(second.len(), 2);
        assert_eq!(second[0].id, "6");
        assert_eq!(pager.offset(), 6);
        assert!(!pager.has_next());
        assert_eq!(pager.next_page().await.unwrap(), Loaded::Superseded);

        pager.prev_page().await.unwrap();
        assert_eq!(pager.offset(), 0);

        pager.next_page().await.unwrap();
        pager.open().await.unwrap();
        assert_eq!(pager.offset(), 0);
        let queries = pager.source.queries.lock().unwrap();
        assert_eq!(queries[0].sort_by, Some(SortBy::Price));
        assert_eq!(queries[0].limit, Some(6));
    }

    /// Ranking source answering requests, in call order, with pages released by the test.
    #[derive(Debug, Default)]
    struct GatedRanking {
        gates: Mutex<VecDeque<oneshot::Receiver<Vec<RankedItem>>>>,
        queries: Mutex<Vec<RankingQuery>>,
    }

    impl GatedRanking {
        fn gate(&self) -> oneshot::Sender<Vec<RankedItem>> {
            let (tx, rx) = oneshot::channel();
            self.gates.lock().unwrap().push_back(rx);
            tx
        }
    }

    impl RankingSource for GatedRanking {
        type Error = NotFound;

        async fn ranking(&self, query: RankingQuery) -> Result<Vec<RankedItem>, NotFound> {
            self.queries.lock().unwrap().push(query);
            let rx = self.gates.lock().unwrap().pop_front();
            match rx {
                Some(rx) => rx.await.map_err(|_| NotFound),
                None => Err(NotFound),
            }
        }
    }

    fn page(ids: std::ops::Range<u64>) -> Vec<RankedItem> {
        ids.map(|token_id| RankedItem {
            token_id,
            ..RankedItem::default()
        })
        .collect()
    }

    #[tokio::test]
    async fn test_pager_sort_change_resets_offset_and_drops_stale_page() {
        let source = GatedRanking::default();
        source.gate().send(page(0..6)).unwrap();
        let pager = RankingPager::new(source, SortBy::Price);
        pager.open().await.unwrap();

        let stale = pager.source.gate();
        let fresh = pager.source.gate();
        let (next, resorted, ()) = tokio::join!(
            pager.next_page(),
            pager.sort_by(SortBy::Recent),
            async {
                fresh.send(page(100..102)).unwrap();
                tokio::task::yield_now().await;
                stale.send(page(6..12)).unwrap();
            }
        );

        assert_eq!(next.unwrap(), Loaded::Superseded);
        let views = resorted.unwrap().applied().unwrap();
        assert_eq!(views.len(), 2);
        assert_eq!(pager.offset(), 0);
        assert_eq!(pager.items()[0].id, "100");
        assert!(!pager.has_next());
        assert!(!pager.is_loading());

        let queries = pager.source.queries.lock().unwrap();
        assert_eq!(queries[1].offset, Some(6));
        assert_eq!(queries[2].sort_by, Some(SortBy::Recent));
        assert_eq!(queries[2].offset, Some(0));
    }

    #[tokio::test]
    async fn test_pager_abandoned_request_clears_loading() {
        let source = GatedRanking::default();
        source.gate().send(page(0..6)).unwrap();
        let pager = RankingPager::new(source, SortBy::Price);
        pager.open().await.unwrap();

        let _held = pager.source.gate();
        let abandoned = tokio::time::timeout(Duration::ZERO, pager.next_page()).await;
        assert!(abandoned.is_err());
        assert!(!pager.is_loading());

        pager.source.gate().send(page(6..8)).unwrap();
        let second = pager.next_page().await.unwrap().applied().unwrap();
        assert_eq!(second[0].id, "6");
        assert_eq!(pager.offset(), 6);
    }

    #[tokio::test]
    async fn test_pager_exactly_full_last_page_still_offers_next() {
        let pager = RankingPager::new(
            FixedRanking {
                total: 6,
                queries: Mutex::default(),
            },
            SortBy::Recent,
        );
        pager.open().await.unwrap();
        assert!(pager.has_next());
        let empty = pager.next_page().await.unwrap().applied().unwrap();
        assert!(empty.is_empty());
        assert!(!pager.has_next());
    }
}
