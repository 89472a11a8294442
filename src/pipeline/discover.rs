//! Bounded free-text discovery of new publisher ids.
//!
//! Discovery is a fold over (query, page) results. Reaching the yield cap or
//! hitting a quota/authorization failure short-circuits the fold, and the ids
//! gathered so far are always returned.

use std::collections::HashSet;
use std::ops::ControlFlow;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::clients::ContentPlatform;
use crate::model::CandidateId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryConfig {
    pub queries: Vec<String>,
    /// Upper bound on the number of ids returned by one discovery call.
    pub max_ids: usize,
    pub max_pages_per_query: usize,
    /// Politeness pause between consecutive calls.
    pub pause: Duration,
}

/// Ids gathered so far, in first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoveryAcc {
    ids: Vec<CandidateId>,
    seen: HashSet<CandidateId>,
}

impl DiscoveryAcc {
    #[must_use]
    pub fn ids(&self) -> &[CandidateId] {
        &self.ids
    }

    #[must_use]
    pub fn into_ids(self) -> Vec<CandidateId> {
        self.ids
    }
}

/// Result of one discovery call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoveryOutcome {
    pub ids: Vec<CandidateId>,
    /// Discovery was cut short by a quota or authorization failure.
    pub quota_stopped: bool,
    pub pages_fetched: usize,
    pub failed_queries: usize,
}

/// Folds one page of ids into the accumulator.
///
/// Breaks once the accumulator holds `cap` ids; ids past the cap are dropped.
#[must_use]
pub fn absorb_page(
    mut acc: DiscoveryAcc,
    page: Vec<CandidateId>,
    cap: usize,
) -> ControlFlow<DiscoveryAcc, DiscoveryAcc> {
    for id in page {
        if acc.ids.len() >= cap {
            return ControlFlow::Break(acc);
        }
        if acc.seen.insert(id.clone()) {
            acc.ids.push(id);
        }
    }
    if acc.ids.len() >= cap {
        ControlFlow::Break(acc)
    } else {
        ControlFlow::Continue(acc)
    }
}

enum QueryEnd {
    Exhausted(DiscoveryAcc),
    CapReached(DiscoveryAcc),
    Terminal(DiscoveryAcc),
}

pub struct DiscoveryEngine<'a> {
    platform: &'a dyn ContentPlatform,
    config: &'a DiscoveryConfig,
}

impl<'a> DiscoveryEngine<'a> {
    #[must_use]
    pub fn new(platform: &'a dyn ContentPlatform, config: &'a DiscoveryConfig) -> Self {
        Self { platform, config }
    }

    /// Runs every configured query in order until the cap, a terminal error
    /// or the end of the query list.
    pub async fn run(&self) -> DiscoveryOutcome {
        let mut outcome = DiscoveryOutcome::default();
        let mut acc = DiscoveryAcc::default();

        if self.config.max_ids == 0 {
            return outcome;
        }

        for (position, query) in self.config.queries.iter().enumerate() {
            if position > 0 {
                self.pause().await;
            }
            info!(query = %query, "discovering publishers");

            match self.run_query(query, acc, &mut outcome).await {
                QueryEnd::Exhausted(next) => acc = next,
                QueryEnd::CapReached(next) => {
                    info!(max_ids = self.config.max_ids, "discovery cap reached");
                    acc = next;
                    break;
                }
                QueryEnd::Terminal(next) => {
                    outcome.quota_stopped = true;
                    acc = next;
                    break;
                }
            }
        }

        outcome.ids = acc.into_ids();
        info!(
            discovered = outcome.ids.len(),
            pages = outcome.pages_fetched,
            failed_queries = outcome.failed_queries,
            quota_stopped = outcome.quota_stopped,
            "discovery finished"
        );
        outcome
    }

    async fn run_query(
        &self,
        query: &str,
        mut acc: DiscoveryAcc,
        outcome: &mut DiscoveryOutcome,
    ) -> QueryEnd {
        let mut page_token: Option<String> = None;

        for page_number in 0..self.config.max_pages_per_query {
            if page_number > 0 {
                self.pause().await;
            }

            let page = match self
                .platform
                .search_publishers(query, page_token.as_deref())
                .await
            {
                Ok(page) => page,
                Err(err) if err.is_terminal() => {
                    warn!(
                        query,
                        collected = acc.ids().len(),
                        error = %err,
                        "discovery stopped early, keeping collected ids"
                    );
                    return QueryEnd::Terminal(acc);
                }
                Err(err) => {
                    warn!(query, error = %err, "search failed, skipping query");
                    outcome.failed_queries += 1;
                    return QueryEnd::Exhausted(acc);
                }
            };

            outcome.pages_fetched += 1;
            debug!(query, page = page_number + 1, ids = page.ids.len(), "search page");

            acc = match absorb_page(acc, page.ids, self.config.max_ids) {
                ControlFlow::Continue(next) => next,
                ControlFlow::Break(done) => return QueryEnd::CapReached(done),
            };

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        QueryEnd::Exhausted(acc)
    }

    async fn pause(&self) {
        if !self.config.pause.is_zero() {
            tokio::time::sleep(self.config.pause).await;
        }
    }
}
