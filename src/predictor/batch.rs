//! Batch generation over upcoming fixtures.
//!
//! Provider reads all happen up front, so a provider failure aborts the batch
//! before any prediction exists. Fixtures are then fanned out to the engine on
//! a bounded pool of blocking tasks. New work stops being issued once the
//! cancel token fires or the deadline passes; work already issued finishes.
//! Successful predictions are written to the sink in one call, which also
//! drops the stored prediction of any fixture that now lacks data.

use futures_util::future::{self, join_all};
use futures_util::stream::{self, StreamExt};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{error, info, warn};

use super::engine::PredictionEngine;
use super::form::form_sample;
use crate::db::models::{ClubStanding, Fixture, FormSample, Prediction};
use crate::error::PredictionError;
use crate::providers::{FixtureProvider, FormProvider, PredictionSink, StandingsProvider};

#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Fixtures considered per batch, soonest first
    pub upcoming_limit: usize,
    /// Matches per form sample
    pub form_window: u32,
    /// Concurrent engine invocations
    pub workers: usize,
    /// No new fixtures are started after this much time
    pub timeout: Duration,
    /// Per provider read
    pub provider_timeout: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        BatchConfig {
            upcoming_limit: 10,
            form_window: super::form::DEFAULT_FORM_WINDOW,
            workers: 4,
            timeout: Duration::from_secs(30),
            provider_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchMode {
    /// Only fixtures without a prediction built from the current snapshot
    Missing,
    /// Every upcoming fixture
    All,
}

/// Cooperative stop signal shared between the caller and a running batch.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FixtureFailure {
    pub fixture_id: i64,
    pub kind: &'static str,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub mode: BatchMode,
    pub fixtures_considered: usize,
    pub generated: Vec<Prediction>,
    /// Fixtures whose stored prediction already matches the current snapshot
    pub skipped_current: Vec<i64>,
    pub failed: Vec<FixtureFailure>,
    /// Fixtures never started because of cancellation or timeout
    pub not_attempted: Vec<i64>,
    pub cancelled: bool,
    pub timed_out: bool,
}

struct WorkUnit {
    fixture: Fixture,
    home: Option<ClubStanding>,
    away: Option<ClubStanding>,
    home_form: Option<FormSample>,
    away_form: Option<FormSample>,
}

pub struct BatchRunner {
    engine: Arc<PredictionEngine>,
    standings: Arc<dyn StandingsProvider>,
    fixtures: Arc<dyn FixtureProvider>,
    form: Arc<dyn FormProvider>,
    sink: Arc<dyn PredictionSink>,
    config: BatchConfig,
}

impl BatchRunner {
    pub fn new(
        engine: Arc<PredictionEngine>,
        standings: Arc<dyn StandingsProvider>,
        fixtures: Arc<dyn FixtureProvider>,
        form: Arc<dyn FormProvider>,
        sink: Arc<dyn PredictionSink>,
        config: BatchConfig,
    ) -> Self {
        BatchRunner {
            engine,
            standings,
            fixtures,
            form,
            sink,
            config,
        }
    }

    /// Predict upcoming fixtures. Per-fixture problems land in the report;
    /// only provider or storage failures return `Err`, and then nothing has
    /// been written.
    pub async fn generate_batch(
        &self,
        mode: BatchMode,
        cancel: &CancelToken,
    ) -> Result<BatchReport, PredictionError> {
        let deadline = Instant::now() + self.config.timeout;
        info!("Prediction batch started (mode={:?})", mode);

        let fixtures = self
            .read(self.fixtures.name(), self.fixtures.upcoming_fixtures(self.config.upcoming_limit))
            .await?;
        let standings: HashMap<i64, ClubStanding> = self
            .read(self.standings.name(), self.standings.standings())
            .await?
            .into_iter()
            .map(|s| (s.club_id, s))
            .collect();
        let forms = self.load_forms(&fixtures).await?;

        let model_key = self.engine.model_key();
        let mut units = Vec::with_capacity(fixtures.len());
        let mut skipped_current = Vec::new();
        for fixture in &fixtures {
            let unit = WorkUnit {
                fixture: fixture.clone(),
                home: standings.get(&fixture.home_club_id).cloned(),
                away: standings.get(&fixture.away_club_id).cloned(),
                home_form: forms.get(&fixture.home_club_id).copied(),
                away_form: forms.get(&fixture.away_club_id).copied(),
            };
            if mode == BatchMode::Missing {
                let existing = self.sink.find_by_fixture(fixture.id).await?;
                if existing.is_some_and(|p| is_current(&p, &unit, &model_key)) {
                    skipped_current.push(fixture.id);
                    continue;
                }
            }
            units.push(unit);
        }

        let unit_ids: Vec<i64> = units.iter().map(|u| u.fixture.id).collect();
        let outcomes = self.run_units(units, cancel, deadline).await;

        let mut generated = Vec::new();
        let mut failed = Vec::new();
        let mut attempted = HashSet::new();
        for (fixture_id, outcome) in outcomes {
            attempted.insert(fixture_id);
            match outcome {
                Ok(Ok(prediction)) => generated.push(prediction),
                Ok(Err(e)) => {
                    warn!("Fixture {} not predicted: {}", fixture_id, e);
                    failed.push(FixtureFailure {
                        fixture_id,
                        kind: e.kind(),
                        message: e.to_string(),
                    });
                }
                Err(join_err) => {
                    error!("Prediction task for fixture {} failed: {}", fixture_id, join_err);
                    failed.push(FixtureFailure {
                        fixture_id,
                        kind: "internal",
                        message: join_err.to_string(),
                    });
                }
            }
        }
        generated.sort_by(|a, b| {
            (a.match_date, a.fixture_id).cmp(&(b.match_date, b.fixture_id))
        });
        failed.sort_by_key(|f| f.fixture_id);
        let not_attempted: Vec<i64> = unit_ids
            .into_iter()
            .filter(|id| !attempted.contains(id))
            .collect();

        // Fixtures that now lack data lose any stored prediction.
        let discard: Vec<i64> = failed
            .iter()
            .filter(|f| f.kind == "insufficient_data")
            .map(|f| f.fixture_id)
            .collect();
        if !generated.is_empty() || !discard.is_empty() {
            self.sink
                .replace_predictions(&generated, &discard)
                .await
                .map_err(PredictionError::Storage)?;
        }

        let cancelled = cancel.is_cancelled();
        let timed_out = !not_attempted.is_empty() && !cancelled;
        info!(
            "Prediction batch finished: {} generated, {} current, {} failed, {} not attempted",
            generated.len(),
            skipped_current.len(),
            failed.len(),
            not_attempted.len()
        );

        Ok(BatchReport {
            mode,
            fixtures_considered: fixtures.len(),
            generated,
            skipped_current,
            failed,
            not_attempted,
            cancelled,
            timed_out,
        })
    }

    /// Await a provider read, mapping failure and timeout to `ProviderUnavailable`.
    async fn read<T, F>(&self, provider: &str, fut: F) -> Result<T, PredictionError>
    where
        F: std::future::Future<Output = anyhow::Result<T>>,
    {
        let res = match tokio::time::timeout(self.config.provider_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(anyhow::anyhow!(
                "timed out after {:?}",
                self.config.provider_timeout
            )),
        };
        res.map_err(|e| {
            error!("Provider '{}' failed: {:#}", provider, e);
            PredictionError::unavailable(provider, &e)
        })
    }

    /// One form sample per distinct club; clubs without scored results are left out.
    async fn load_forms(
        &self,
        fixtures: &[Fixture],
    ) -> Result<HashMap<i64, FormSample>, PredictionError> {
        let window = self.config.form_window;
        let club_ids: BTreeSet<i64> = fixtures
            .iter()
            .flat_map(|f| [f.home_club_id, f.away_club_id])
            .collect();

        let reads = club_ids.into_iter().map(|club_id| async move {
            let res = self
                .read(
                    self.form.name(),
                    self.form.recent_results(club_id, window as usize),
                )
                .await;
            (club_id, res)
        });

        let mut forms = HashMap::new();
        for (club_id, res) in join_all(reads).await {
            let sample = form_sample(club_id, &res?, window);
            if sample.matches > 0 {
                forms.insert(club_id, sample);
            }
        }
        Ok(forms)
    }

    async fn run_units(
        &self,
        units: Vec<WorkUnit>,
        cancel: &CancelToken,
        deadline: Instant,
    ) -> Vec<(i64, Result<Result<Prediction, PredictionError>, tokio::task::JoinError>)> {
        let workers = self.config.workers.max(1);
        stream::iter(units)
            .take_while(|_| future::ready(!cancel.is_cancelled() && Instant::now() < deadline))
            .map(|unit| {
                let engine = Arc::clone(&self.engine);
                async move {
                    let fixture_id = unit.fixture.id;
                    let outcome = tokio::task::spawn_blocking(move || {
                        engine.generate(
                            &unit.fixture,
                            unit.home.as_ref(),
                            unit.away.as_ref(),
                            unit.home_form.as_ref(),
                            unit.away_form.as_ref(),
                        )
                    })
                    .await;
                    (fixture_id, outcome)
                }
            })
            .buffer_unordered(workers)
            .collect()
            .await
    }
}

/// A stored prediction is current when it was built by the same engine
/// parameters from the same table and form snapshot the batch would use now.
fn is_current(existing: &Prediction, unit: &WorkUnit, model_key: &str) -> bool {
    let (Some(home), Some(away), Some(home_form), Some(away_form)) =
        (&unit.home, &unit.away, &unit.home_form, &unit.away_form)
    else {
        return false;
    };
    let f = &existing.forecast;
    f.model_key == model_key
        && f.home_position == home.standing.position
        && f.away_position == away.standing.position
        && f.home_points == home.standing.points
        && f.away_points == away.standing.points
        && f.home_form_points == home_form.points
        && f.away_form_points == away_form.points
}
