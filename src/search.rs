use serde::Serialize;
use tracing::{error, info, warn};

use crate::{
    error::{Error, Result},
    normalize::{normalize, NormalizedResult, RawResult},
    state::{Epoch, ViewState},
    transport::{data_array, Transport},
};

pub const MIN_LIMIT: u32 = 1;
pub const MAX_LIMIT: u32 = 30;
pub const DEFAULT_LIMIT: u32 = 10;

const EMPTY_QUERY_MESSAGE: &str = "Please enter a search query";
const SEARCH_FAILED_MESSAGE: &str = "An error occurred during search";

/// Search results as the search page shows them.
pub type SearchView = ViewState<Vec<NormalizedResult>>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchMode {
    /// Single lookup with the literal query.
    #[default]
    Shallow,
    /// The backend expands the query into sub-queries and merges their hits.
    Deep,
}

impl SearchMode {
    pub fn endpoint(self) -> &'static str {
        match self {
            Self::Shallow => "/api/search",
            Self::Deep => "/api/deep_search",
        }
    }
}

/// Body of a search call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchRequest {
    query: String,
    limit: u32,
}

impl SearchRequest {
    /// Trims `query` and clamps `limit` into `MIN_LIMIT..=MAX_LIMIT`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] if the query is blank.
    pub fn new(query: &str, limit: i64) -> Result<Self> {
        let query = query.trim();
        if query.is_empty() {
            return Err(Error::Validation(EMPTY_QUERY_MESSAGE.to_string()));
        }
        let clamped = limit.clamp(i64::from(MIN_LIMIT), i64::from(MAX_LIMIT));
        if clamped != limit {
            warn!(requested = limit, used = clamped, "search limit out of range");
        }
        Ok(Self {
            query: query.to_string(),
            limit: u32::try_from(clamped).unwrap_or(DEFAULT_LIMIT),
        })
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }
}

/// A search that has been validated and registered with its view.
#[derive(Debug, Clone)]
pub struct PendingSearch {
    epoch: Epoch,
    request: SearchRequest,
    mode: SearchMode,
}

impl PendingSearch {
    pub fn epoch(&self) -> Epoch {
        self.epoch
    }
}

#[derive(Debug)]
pub struct SearchOutcome {
    epoch: Epoch,
    result: Result<Vec<NormalizedResult>>,
}

pub struct SearchDispatcher<T> {
    transport: T,
}

impl<T: Transport> SearchDispatcher<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    /// Runs one search and normalizes the hits, in backend order.
    pub async fn search(
        &self,
        request: &SearchRequest,
        mode: SearchMode,
    ) -> Result<Vec<NormalizedResult>> {
        let body = serde_json::to_value(request)?;
        let resp = self.transport.post_json(mode.endpoint(), &body).await?;
        let results = data_array(resp)?
            .into_iter()
            .map(|item| normalize(&RawResult::from_value(item)))
            .collect();
        Ok(results)
    }

    /// Validates the input and opens a new epoch on `view`.
    ///
    /// A blank query is reported on the view and yields `None`; nothing is
    /// sent in that case.
    pub fn start(
        &self,
        view: &mut SearchView,
        query: &str,
        limit: i64,
        mode: SearchMode,
    ) -> Option<PendingSearch> {
        match SearchRequest::new(query, limit) {
            Ok(request) => {
                let epoch = view.begin();
                Some(PendingSearch {
                    epoch,
                    request,
                    mode,
                })
            }
            Err(e) => {
                view.reject(e.user_message(EMPTY_QUERY_MESSAGE));
                None
            }
        }
    }

    pub async fn run(&self, pending: &PendingSearch) -> SearchOutcome {
        info!(
            query = pending.request.query(),
            limit = pending.request.limit(),
            mode = ?pending.mode,
            "searching"
        );
        SearchOutcome {
            epoch: pending.epoch,
            result: self.search(&pending.request, pending.mode).await,
        }
    }

    /// Applies `outcome` to `view` unless a newer search has started since.
    pub fn commit(view: &mut SearchView, outcome: SearchOutcome) -> bool {
        view.finish(outcome.epoch, |results| match outcome.result {
            Ok(hits) => {
                info!(count = hits.len(), "search completed");
                *results = hits;
                None
            }
            Err(e) => {
                error!("Search failed: {e}");
                results.clear();
                Some(e.user_message(SEARCH_FAILED_MESSAGE))
            }
        })
    }

    /// Validates, sends and commits a search in one go.
    pub async fn dispatch(
        &self,
        view: &mut SearchView,
        query: &str,
        limit: i64,
        mode: SearchMode,
    ) {
        if let Some(pending) = self.start(view, query, limit, mode) {
            let outcome = self.run(&pending).await;
            Self::commit(view, outcome);
        }
    }
}
