use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use tracing::{error, info, warn};

use crate::db::Store;
use crate::models::ScrapeResponse;
use crate::parser;
use crate::scraper;
use crate::session::ListingSession;

const GENERIC_FAILURE: &str = "Failed to run the scrape. Please try again later.";

/// The remote scrape function as seen by its caller. Behind this seam in
/// production sits the fetch-parse-upsert pipeline; tests substitute a fake.
#[async_trait(?Send)]
pub trait ScrapeFunction {
    async fn invoke(&self) -> Result<ScrapeResponse>;
}

/// What a scrape trigger reports back to the user.
#[derive(Debug, Clone, PartialEq)]
pub enum ScrapeOutcome {
    /// The pipeline ran and upserted listings; cached listing queries must
    /// be refreshed.
    Success { message: String },
    /// The remote responded but declined (`success: false`); its error
    /// message is shown verbatim.
    Rejected { message: String },
    /// The invocation itself failed. The raw error is logged only; the user
    /// sees a generic message.
    Failed { message: String },
}

impl ScrapeOutcome {
    pub fn message(&self) -> &str {
        match self {
            ScrapeOutcome::Success { message }
            | ScrapeOutcome::Rejected { message }
            | ScrapeOutcome::Failed { message } => message,
        }
    }
}

/// Serializes scrape triggers: at most one invocation in flight, so a
/// double-click cannot fire duplicate upsert runs against the same source.
pub struct Ingestor {
    in_flight: AtomicBool,
}

impl Ingestor {
    pub fn new() -> Self {
        Self {
            in_flight: AtomicBool::new(false),
        }
    }

    /// Invoke the remote scrape function and fold its reply into an outcome.
    /// Returns `None` without side effects when a scrape is already running.
    pub async fn trigger(&self, remote: &dyn ScrapeFunction) -> Option<ScrapeOutcome> {
        let Some(_flight) = Flight::acquire(&self.in_flight) else {
            warn!("scrape already in flight, trigger refused");
            return None;
        };

        let outcome = match remote.invoke().await {
            Ok(response) if response.success => ScrapeOutcome::Success {
                message: response
                    .message
                    .unwrap_or_else(|| format!("{} cars imported", response.count)),
            },
            Ok(response) => ScrapeOutcome::Rejected {
                message: response
                    .error
                    .or(response.message)
                    .unwrap_or_else(|| "Scrape was rejected by the server".to_string()),
            },
            Err(e) => {
                error!(error = %e, "scrape invocation failed");
                ScrapeOutcome::Failed {
                    message: GENERIC_FAILURE.to_string(),
                }
            }
        };
        Some(outcome)
    }
}

impl Default for Ingestor {
    fn default() -> Self {
        Self::new()
    }
}

/// Propagate a scrape outcome to the listing session: only a success
/// invalidates cached results.
pub fn apply_outcome(session: &mut ListingSession, outcome: &ScrapeOutcome) {
    if let ScrapeOutcome::Success { .. } = outcome {
        session.mark_stale();
    }
}

/// RAII handle on the in-flight flag; releases it on every exit path.
struct Flight<'a>(&'a AtomicBool);

impl<'a> Flight<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Flight(flag))
    }
}

impl Drop for Flight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// The live scrape function: fetch the listings page, extract cards, upsert
/// them into the store. All failures fold into a `success: false` response;
/// this body never errors out of the envelope.
pub struct LiveScrapeFunction<'a> {
    store: &'a Store,
    client: reqwest::Client,
    url: String,
}

impl<'a> LiveScrapeFunction<'a> {
    pub fn new(store: &'a Store) -> Result<Self> {
        Ok(Self {
            store,
            client: scraper::build_client()?,
            url: scraper::source_url(),
        })
    }

    async fn run(&self) -> ScrapeResponse {
        let html = match scraper::fetch_listing_page(&self.client, &self.url).await {
            Ok(html) => html,
            Err(e) => {
                error!(error = %e, "listing fetch failed");
                return ScrapeResponse::failed(format!("Failed to fetch listings page: {}", e));
            }
        };

        let parsed = parser::parse_listing_page(&html, Utc::now());
        if parsed.skipped > 0 {
            warn!(skipped = parsed.skipped, "cards missing title or url");
        }
        if parsed.cars.is_empty() {
            return ScrapeResponse::failed("No cars found on the listings page".to_string());
        }

        match self.store.upsert_cars(&parsed.cars) {
            Ok(count) => {
                info!(count, skipped = parsed.skipped, "listings upserted");
                ScrapeResponse::ok(
                    format!("{} cars imported", count),
                    count,
                    parsed.skipped,
                    parsed.envelopes,
                )
            }
            Err(e) => {
                error!(error = %e, "listing upsert failed");
                ScrapeResponse::failed(format!("Failed to store cars: {}", e))
            }
        }
    }
}

#[async_trait(?Send)]
impl ScrapeFunction for LiveScrapeFunction<'_> {
    async fn invoke(&self) -> Result<ScrapeResponse> {
        Ok(self.run().await)
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    enum FakeReply {
        Ok(ScrapeResponse),
        Err(String),
    }

    struct FakeRemote(FakeReply);

    #[async_trait(?Send)]
    impl ScrapeFunction for FakeRemote {
        async fn invoke(&self) -> Result<ScrapeResponse> {
            match &self.0 {
                FakeReply::Ok(r) => Ok(r.clone()),
                FakeReply::Err(e) => Err(anyhow!(e.clone())),
            }
        }
    }

    #[tokio::test]
    async fn success_invalidates_cached_listings() {
        let remote = FakeRemote(FakeReply::Ok(ScrapeResponse::ok(
            "12 cars imported".to_string(),
            12,
            0,
            Vec::new(),
        )));
        let ingestor = Ingestor::new();
        let outcome = ingestor.trigger(&remote).await.unwrap();
        assert_eq!(
            outcome,
            ScrapeOutcome::Success {
                message: "12 cars imported".to_string()
            }
        );

        let mut session = ListingSession::new(20);
        apply_outcome(&mut session, &outcome);
        assert!(session.is_stale());
    }

    #[tokio::test]
    async fn rejection_carries_server_error_and_keeps_cache() {
        let remote = FakeRemote(FakeReply::Ok(ScrapeResponse::failed(
            "rate limited".to_string(),
        )));
        let ingestor = Ingestor::new();
        let outcome = ingestor.trigger(&remote).await.unwrap();
        assert_eq!(
            outcome,
            ScrapeOutcome::Rejected {
                message: "rate limited".to_string()
            }
        );

        let mut session = ListingSession::new(20);
        apply_outcome(&mut session, &outcome);
        assert!(!session.is_stale());
    }

    #[tokio::test]
    async fn hard_failure_hides_raw_error() {
        let remote = FakeRemote(FakeReply::Err("connection reset by peer".to_string()));
        let ingestor = Ingestor::new();
        let outcome = ingestor.trigger(&remote).await.unwrap();
        match outcome {
            ScrapeOutcome::Failed { message } => {
                assert!(!message.contains("connection reset"));
            }
            other => panic!("expected Failed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn second_trigger_refused_while_in_flight() {
        let ingestor = Ingestor::new();
        let _held = Flight::acquire(&ingestor.in_flight).unwrap();

        let remote = FakeRemote(FakeReply::Ok(ScrapeResponse::ok(
            "ok".to_string(),
            1,
            0,
            Vec::new(),
        )));
        assert!(ingestor.trigger(&remote).await.is_none());
    }

    #[tokio::test]
    async fn flight_released_on_all_exit_paths() {
        let ingestor = Ingestor::new();

        let remote = FakeRemote(FakeReply::Err("boom".to_string()));
        assert!(ingestor.trigger(&remote).await.is_some());
        // Guard released even after a hard failure.
        assert!(ingestor.trigger(&remote).await.is_some());
    }
}
