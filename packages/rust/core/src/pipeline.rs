//! End-to-end run: catalog → filter → ledger check → transcript → summary → sink → ledger.
//!
//! Items are handled one at a time in catalog order. An item only enters the
//! ledger after its summary is stored, so a crash at any point leaves it
//! eligible for the next run, which overwrites the same key.

use std::fmt;
use std::time::{Duration, Instant};

use tracing::{error, info, instrument, warn};

use flashnotes_catalog::{CatalogSource, TitleFilter};
use flashnotes_shared::{CatalogItem, FlashnotesError, Result, RunId};
use flashnotes_storage::{Ledger, Sink};
use flashnotes_summarizer::Summarizer;
use flashnotes_transcript::{self as transcript, TranscriptSource};

// ---------------------------------------------------------------------------
// States and outcomes
// ---------------------------------------------------------------------------

/// Lifecycle of one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Init,
    Fetching,
    Processing,
    Done,
    Aborted,
}

/// Per-item step, reported when that step fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemStage {
    Extracting,
    Summarizing,
    Writing,
    Committing,
}

impl fmt::Display for ItemStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Extracting => "extracting",
            Self::Summarizing => "summarizing",
            Self::Writing => "writing",
            Self::Committing => "committing",
        };
        f.write_str(name)
    }
}

/// What happened to one catalog item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    SkippedTitleMismatch,
    SkippedAlreadyProcessed,
    /// Stored under `key` and committed to the ledger.
    Processed { key: String },
    Failed { stage: ItemStage, reason: String },
}

impl ItemOutcome {
    pub fn is_skipped(&self) -> bool {
        matches!(
            self,
            Self::SkippedTitleMismatch | Self::SkippedAlreadyProcessed
        )
    }
}

impl fmt::Display for ItemOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SkippedTitleMismatch => f.write_str("skipped (title mismatch)"),
            Self::SkippedAlreadyProcessed => f.write_str("skipped (already processed)"),
            Self::Processed { key } => write!(f, "stored as {key}"),
            Self::Failed { stage, reason } => write!(f, "failed while {stage}: {reason}"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ItemReport {
    pub item: CatalogItem,
    pub outcome: ItemOutcome,
}

/// Result of a completed run.
#[derive(Debug)]
pub struct RunReport {
    pub run_id: RunId,
    /// One report per catalog item, in catalog order.
    pub items: Vec<ItemReport>,
    pub elapsed: Duration,
}

impl RunReport {
    pub fn processed(&self) -> usize {
        self.count(|o| matches!(o, ItemOutcome::Processed { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(ItemOutcome::is_skipped)
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, ItemOutcome::Failed { .. }))
    }

    fn count(&self, pred: impl Fn(&ItemOutcome) -> bool) -> usize {
        self.items.iter().filter(|r| pred(&r.outcome)).count()
    }
}

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

/// Progress callback for reporting run status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called before an item is examined.
    fn item_started(&self, item: &CatalogItem, current: usize, total: usize);
    /// Called once an item has an outcome.
    fn item_finished(&self, item: &CatalogItem, outcome: &ItemOutcome);
    /// Called when the run completes.
    fn done(&self, report: &RunReport);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn item_started(&self, _item: &CatalogItem, _current: usize, _total: usize) {}
    fn item_finished(&self, _item: &CatalogItem, _outcome: &ItemOutcome) {}
    fn done(&self, _report: &RunReport) {}
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// The collaborators of a run, wired once and driven by [`Pipeline::run`].
pub struct Pipeline {
    catalog: Box<dyn CatalogSource>,
    transcripts: Box<dyn TranscriptSource>,
    summarizer: Box<dyn Summarizer>,
    sink: Sink,
    ledger: Ledger,
    filter: TitleFilter,
    state: RunState,
}

/// A failed item step, before it becomes an outcome or aborts the run.
struct StepError {
    stage: ItemStage,
    error: FlashnotesError,
}

impl Pipeline {
    pub fn new(
        catalog: Box<dyn CatalogSource>,
        transcripts: Box<dyn TranscriptSource>,
        summarizer: Box<dyn Summarizer>,
        sink: Sink,
        ledger: Ledger,
        filter: TitleFilter,
    ) -> Self {
        Self {
            catalog,
            transcripts,
            summarizer,
            sink,
            ledger,
            filter,
            state: RunState::Init,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    fn enter(&mut self, next: RunState) {
        tracing::debug!(from = ?self.state, to = ?next, "run state");
        self.state = next;
    }

    fn abort(&mut self, error: FlashnotesError) -> FlashnotesError {
        error!(error = %error, "run aborted");
        self.enter(RunState::Aborted);
        error
    }

    /// Run once over the current catalog.
    ///
    /// Per-item failures are recorded in the report and the loop moves on.
    /// Setup failures (unreachable sink, unreachable or unauthorized catalog)
    /// and a sink that becomes unreachable mid-run abort with an error.
    #[instrument(skip_all, fields(run_id = tracing::field::Empty))]
    pub async fn run(&mut self, progress: &dyn ProgressReporter) -> Result<RunReport> {
        let start = Instant::now();
        let run_id = RunId::new();
        tracing::Span::current().record("run_id", tracing::field::display(&run_id));
        self.state = RunState::Init;

        progress.phase("Connecting to document store");
        if let Err(e) = self.sink.connect().await {
            return Err(self.abort(e));
        }

        self.enter(RunState::Fetching);
        progress.phase("Listing catalog");
        let items = match self.catalog.list_recent().await {
            Ok(items) => items,
            Err(e) => return Err(self.abort(e)),
        };
        info!(
            %run_id,
            count = items.len(),
            marker = self.filter.marker(),
            already_processed = self.ledger.len(),
            "catalog fetched"
        );

        self.enter(RunState::Processing);
        progress.phase("Processing items");
        let total = items.len();
        let mut reports = Vec::with_capacity(total);

        for (i, item) in items.into_iter().enumerate() {
            progress.item_started(&item, i + 1, total);

            let outcome = if !self.filter.matches(&item.title) {
                ItemOutcome::SkippedTitleMismatch
            } else if self.ledger.contains(&item.id) {
                ItemOutcome::SkippedAlreadyProcessed
            } else {
                match self.process_item(&item).await {
                    Ok(key) => ItemOutcome::Processed { key },
                    Err(StepError { error, .. }) if error.is_fatal() => {
                        return Err(self.abort(error));
                    }
                    Err(StepError { stage, error }) => {
                        warn!(item_id = %item.id, %stage, error = %error, "item failed");
                        ItemOutcome::Failed {
                            stage,
                            reason: error.to_string(),
                        }
                    }
                }
            };

            progress.item_finished(&item, &outcome);
            reports.push(ItemReport { item, outcome });
        }

        self.enter(RunState::Done);
        let report = RunReport {
            run_id,
            items: reports,
            elapsed: start.elapsed(),
        };
        info!(
            processed = report.processed(),
            skipped = report.skipped(),
            failed = report.failed(),
            elapsed_ms = report.elapsed.as_millis() as u64,
            "run complete"
        );
        progress.done(&report);
        Ok(report)
    }

    #[instrument(skip_all, fields(item_id = %item.id))]
    async fn process_item(&mut self, item: &CatalogItem) -> std::result::Result<String, StepError> {
        let text = transcript::extract(self.transcripts.as_ref(), &item.id)
            .await
            .map_err(at(ItemStage::Extracting))?;

        let summary = self
            .summarizer
            .summarize(&text)
            .await
            .map_err(at(ItemStage::Summarizing))?;

        let key = self
            .sink
            .upsert(&item.title, &summary)
            .await
            .map_err(at(ItemStage::Writing))?;

        self.ledger
            .commit(&item.id)
            .await
            .map_err(at(ItemStage::Committing))?;

        info!(item_id = %item.id, key = %key, "item processed");
        Ok(key)
    }
}

fn at(stage: ItemStage) -> impl Fn(FlashnotesError) -> StepError {
    move |error| StepError { stage, error }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
