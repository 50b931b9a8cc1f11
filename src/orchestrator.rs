use std::collections::HashSet;
use std::path::Path;
use std::rc::Rc;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::checkpoint::{CheckpointKey, CheckpointStatus, CheckpointStore, EntityScope};
use crate::column_spec::ColumnSet;
use crate::endpoints;
use crate::error::Exhaustion;
use crate::extract::extract;
use crate::fetch::{FanoutTargets, FetchedEndpoint, ResultSetFetcher, StatsSource};
use crate::record::{EntityKind, RosterEntry};
use crate::resolver::{self, ExecutionPlan};
use crate::season::{Season, SeasonType};
use crate::store::Store;

pub const EXIT_SUCCESS: i32 = 0;
/// Upstream exhausted; relaunch with a fresh session.
pub const EXIT_RESTART: i32 = 42;
/// Configuration or storage failure; relaunching will not help.
pub const EXIT_FATAL: i32 = 1;
pub const EXIT_INCOMPLETE: i32 = 2;

pub fn plan_units(
    spec: &ColumnSet,
    seasons: &[Season],
    season_types: &[SeasonType],
) -> Vec<CheckpointKey> {
    let mut units = Vec::new();
    for &season in seasons {
        for &season_type in season_types {
            let key = |endpoint: &str, scope: EntityScope| CheckpointKey {
                endpoint: endpoint.to_string(),
                season,
                season_type,
                scope,
            };
            units.push(key(endpoints::ROSTER, EntityScope::Roster));
            for kind in [EntityKind::Player, EntityKind::Team] {
                for id in spec.endpoints_for_tier(kind) {
                    let available = endpoints::lookup(id)
                        .is_some_and(|def| def.available_for(season, season_type));
                    if available {
                        units.push(key(id, kind.into()));
                    }
                }
            }
            if !spec.rollup_columns().is_empty() {
                units.push(key(endpoints::PLAYER_ROLLUP, EntityScope::Team));
            }
        }
    }
    units
}

pub fn ingest<S: StatsSource>(
    columns_file: &Path,
    seasons: &[Season],
    season_types: &[SeasonType],
    store: &mut Store,
    checkpoints: &mut CheckpointStore,
    fetcher: ResultSetFetcher<S>,
) -> Result<RunOutcome> {
    let spec = ColumnSet::load(columns_file)?;
    let units = plan_units(&spec, seasons, season_types);
    info!(units = units.len(), "ingest starting");
    Orchestrator::new(&spec, store, checkpoints, fetcher).run(&units)
}

pub fn exit_code(result: &Result<RunOutcome>) -> i32 {
    match result {
        Ok(outcome) => outcome.exit_code(),
        Err(_) => EXIT_FATAL,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running(CheckpointKey),
    Completed,
    PartialFailure,
    TransientFailure,
    FatalFailure,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub units_total: usize,
    pub units_skipped: usize,
    pub units_completed: usize,
    pub units_failed: usize,
    pub units_deferred: usize,
    pub values_written: usize,
    pub subtraction_violations: usize,
    pub upstream_calls: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Completed(RunSummary),
    /// The pass went through but some units fetched nothing; they stay
    /// unfinished for the next run.
    Incomplete {
        failed: Vec<CheckpointKey>,
        summary: RunSummary,
    },
    Exhausted {
        unit: CheckpointKey,
        exhaustion: Exhaustion,
        summary: RunSummary,
    },
}

impl RunOutcome {
    pub fn exit_code(&self) -> i32 {
        match self {
            RunOutcome::Completed(_) => EXIT_SUCCESS,
            RunOutcome::Incomplete { .. } => EXIT_INCOMPLETE,
            RunOutcome::Exhausted { .. } => EXIT_RESTART,
        }
    }

    pub fn summary(&self) -> &RunSummary {
        match self {
            RunOutcome::Completed(summary)
            | RunOutcome::Incomplete { summary, .. }
            | RunOutcome::Exhausted { summary, .. } => summary,
        }
    }
}

#[derive(Debug, Default)]
struct UnitStats {
    calls: usize,
    values: usize,
    violations: usize,
}

enum UnitResult {
    Done(UnitStats),
    Failed { calls: usize, error: String },
    Exhausted(Exhaustion),
}

impl UnitResult {
    fn failed(fetched: &FetchedEndpoint, calls: usize) -> Self {
        UnitResult::Failed {
            calls,
            error: fetched
                .last_error
                .clone()
                .unwrap_or_else(|| "no upstream data".to_string()),
        }
    }
}

pub struct Orchestrator<'a, S: StatsSource> {
    spec: &'a ColumnSet,
    store: &'a mut Store,
    checkpoints: &'a mut CheckpointStore,
    fetcher: ResultSetFetcher<S>,
    state: RunState,
    pass: Option<(Season, SeasonType)>,
}

impl<'a, S: StatsSource> Orchestrator<'a, S> {
    pub fn new(
        spec: &'a ColumnSet,
        store: &'a mut Store,
        checkpoints: &'a mut CheckpointStore,
        fetcher: ResultSetFetcher<S>,
    ) -> Self {
        Self {
            spec,
            store,
            checkpoints,
            fetcher,
            state: RunState::Idle,
            pass: None,
        }
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    pub fn fetcher(&self) -> &ResultSetFetcher<S> {
        &self.fetcher
    }

    pub fn run(&mut self, units: &[CheckpointKey]) -> Result<RunOutcome> {
        let outcome = self.run_units(units);
        self.state = match &outcome {
            Ok(RunOutcome::Completed(_)) => RunState::Completed,
            Ok(RunOutcome::Incomplete { .. }) => RunState::PartialFailure,
            Ok(RunOutcome::Exhausted { .. }) => RunState::TransientFailure,
            Err(_) => RunState::FatalFailure,
        };
        outcome
    }

    fn run_units(&mut self, units: &[CheckpointKey]) -> Result<RunOutcome> {
        let mut summary = RunSummary {
            units_total: units.len(),
            ..RunSummary::default()
        };
        let mut failed = Vec::new();
        let mut roster_failed = HashSet::new();
        let mut players_failed = HashSet::new();

        for key in units {
            if self.checkpoints.status(key)? == CheckpointStatus::Complete {
                debug!(unit = %key, "already complete");
                summary.units_skipped += 1;
                continue;
            }
            let pass = (key.season, key.season_type);
            let blocked = roster_failed.contains(&pass)
                || (key.endpoint == endpoints::PLAYER_ROLLUP && players_failed.contains(&pass));
            if blocked {
                debug!(unit = %key, "deferred, an earlier unit of this pass failed");
                summary.units_deferred += 1;
                continue;
            }

            self.state = RunState::Running(key.clone());
            if self.pass != Some(pass) {
                self.fetcher.begin_pass();
                self.pass = Some(pass);
            }

            self.checkpoints.mark_in_progress(key)?;
            info!(
                endpoint = %key.endpoint,
                season = %key.season,
                season_type = %key.season_type,
                scope = %key.scope,
                "unit started"
            );

            match self.process_unit(key)? {
                UnitResult::Done(stats) => {
                    // Values are already committed; only now advance the checkpoint.
                    self.checkpoints.mark_complete(key, stats.calls)?;
                    summary.units_completed += 1;
                    summary.values_written += stats.values;
                    summary.subtraction_violations += stats.violations;
                    info!(
                        unit = %key,
                        calls = stats.calls,
                        values = stats.values,
                        "unit complete"
                    );
                }
                UnitResult::Failed { calls, error } => {
                    self.checkpoints
                        .mark_transient_failure(key, calls, calls, &error)?;
                    warn!(unit = %key, error = %error, "no upstream data, unit left unfinished");
                    match key.scope {
                        EntityScope::Roster => roster_failed.insert(pass),
                        EntityScope::Player => players_failed.insert(pass),
                        EntityScope::Team => false,
                    };
                    summary.units_failed += 1;
                    failed.push(key.clone());
                }
                UnitResult::Exhausted(exhaustion) => {
                    self.checkpoints.mark_transient_failure(
                        key,
                        exhaustion.calls_done,
                        exhaustion.calls_total,
                        &exhaustion.to_string(),
                    )?;
                    summary.upstream_calls = self.fetcher.upstream_calls();
                    warn!(unit = %key, reason = %exhaustion.reason, "upstream exhausted, restart required");
                    return Ok(RunOutcome::Exhausted {
                        unit: key.clone(),
                        exhaustion,
                        summary,
                    });
                }
            }
        }

        summary.upstream_calls = self.fetcher.upstream_calls();
        if failed.is_empty() {
            Ok(RunOutcome::Completed(summary))
        } else {
            Ok(RunOutcome::Incomplete { failed, summary })
        }
    }

    fn process_unit(&mut self, key: &CheckpointKey) -> Result<UnitResult> {
        if key.scope == EntityScope::Roster {
            return self.roster_unit(key.season, key.season_type);
        }
        let Some(kind) = key.scope.entity_kind() else {
            return Ok(UnitResult::Done(UnitStats::default()));
        };
        if key.endpoint == endpoints::PLAYER_ROLLUP {
            return self
                .rollup_unit(key.season, key.season_type)
                .map(UnitResult::Done);
        }

        let plan = resolver::resolve_for_endpoint(
            self.spec,
            kind,
            &key.endpoint,
            key.season,
            key.season_type,
        );
        if !plan.unavailable.is_empty() {
            debug!(unit = %key, columns = ?plan.unavailable, "no upstream data for these columns");
        }
        self.stat_unit(&plan)
    }

    fn roster_unit(&mut self, season: Season, season_type: SeasonType) -> Result<UnitResult> {
        let mut stats = UnitStats::default();
        let mut entries = Vec::new();
        for kind in [EntityKind::Player, EntityKind::Team] {
            let request = resolver::roster_request(kind, season, season_type);
            let fetched = match self.fetcher.fetch(&request, &FanoutTargets::default()) {
                Ok(fetched) => fetched,
                Err(exhaustion) => return Ok(UnitResult::Exhausted(exhaustion)),
            };
            stats.calls += fetched.calls_ok + fetched.calls_failed;
            if fetched.is_failed() {
                return Ok(UnitResult::failed(&fetched, stats.calls));
            }
            entries.extend(roster_entries(kind, &fetched));
        }
        stats.values = self
            .store
            .upsert_roster(season, season_type, &entries)
            .context("store roster")?;
        Ok(UnitResult::Done(stats))
    }

    fn stat_unit(&mut self, plan: &ExecutionPlan) -> Result<UnitResult> {
        let mut stats = UnitStats::default();
        if plan.columns.is_empty() {
            return Ok(UnitResult::Done(stats));
        }
        let targets = FanoutTargets {
            players: self
                .store
                .roster_ids(EntityKind::Player, plan.season, plan.season_type)?,
            teams: self
                .store
                .roster_ids(EntityKind::Team, plan.season, plan.season_type)?,
        };

        let mut fetched: Vec<Rc<FetchedEndpoint>> = Vec::with_capacity(plan.requests.len());
        for request in &plan.requests {
            match self.fetcher.fetch(request, &targets) {
                Ok(result) => {
                    stats.calls += result.calls_ok + result.calls_failed;
                    if result.is_failed() {
                        // Writing now would overwrite stored values with NULLs.
                        return Ok(UnitResult::failed(&result, stats.calls));
                    }
                    fetched.push(result);
                }
                Err(exhaustion) => return Ok(UnitResult::Exhausted(exhaustion)),
            }
        }

        let entities = match plan.kind {
            EntityKind::Player => &targets.players,
            EntityKind::Team => &targets.teams,
        };
        let outcome = extract(plan, &fetched, entities);
        stats.violations = outcome.violations.len();
        stats.values = self
            .store
            .write_values(plan.kind, plan.season, plan.season_type, &outcome.values)
            .context("store extracted values")?;
        Ok(UnitResult::Done(stats))
    }

    fn rollup_unit(&mut self, season: Season, season_type: SeasonType) -> Result<UnitStats> {
        let plan = resolver::resolve_for_endpoint(
            self.spec,
            EntityKind::Team,
            endpoints::PLAYER_ROLLUP,
            season,
            season_type,
        );
        let values = self
            .store
            .rollup_team_values(season, season_type, &plan.rollups)?;
        let written = self
            .store
            .write_values(EntityKind::Team, season, season_type, &values)
            .context("store team rollups")?;
        Ok(UnitStats {
            values: written,
            ..UnitStats::default()
        })
    }
}

fn roster_entries(kind: EntityKind, fetched: &FetchedEndpoint) -> Vec<RosterEntry> {
    let def = endpoints::roster_endpoint(kind);
    let Some(set) = fetched.set(def.result_sets[0]) else {
        return Vec::new();
    };
    set.rows
        .iter()
        .filter_map(|(id, rows)| {
            let row = rows.first()?;
            let entry = match kind {
                EntityKind::Player => RosterEntry {
                    kind,
                    entity_id: *id,
                    name: row.text("PLAYER_NAME")?,
                    team_id: row.id("TEAM_ID"),
                    abbreviation: None,
                },
                EntityKind::Team => RosterEntry {
                    kind,
                    entity_id: *id,
                    name: row.text("TEAM_NAME")?,
                    team_id: Some(*id),
                    abbreviation: row.text("TEAM_ABBREVIATION"),
                },
            };
            Some(entry)
        })
        .collect()
}
