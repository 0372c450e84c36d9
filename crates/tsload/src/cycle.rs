// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! One extract / transform / load / commit cycle
//!
//! ```text
//! Idle --> AllocatingWindow --> Extracting --> Transforming   (each job)
//!      --> Loading --> Committing --> Idle                    (once)
//!   any step --error--> Failed
//! ```
//!
//! Every job is staged before anything is loaded. Points are then merged into
//! one batch per entity and pushed over a single destination connection.
//! Checkpoints move only after that load has completed, and only for jobs
//! that saw at least one row. A failed load leaves every checkpoint untouched
//! so the same windows are replayed on the next cycle.

use crate::checkpoint::{CheckpointStore, SqliteCheckpointStore};
use crate::config::{JobConfig, LoaderConfig};
use crate::error::{LoaderError, Result};
use crate::mapping::RowMapping;
use crate::source::{ObservationSource, RowExtractor, SqliteSource};
use crate::transform::{Outcome, RowTransformer};
use crate::window::{RangeAllocator, Window};
use std::collections::BTreeSet;
use std::fmt;
use tsload_sink::{MetricSink, Point, PushReport, WriteHandle};

/// One source table replicated into one destination entity.
pub struct Job {
    pub table: String,
    pub entity: String,
    pub id_column: String,
    pub increment_size: i64,
    pub mapping: RowMapping,
}

impl Job {
    /// Job with an explicit mapping, reading ids from column `id`.
    pub fn new(table: impl Into<String>, entity: impl Into<String>, mapping: RowMapping) -> Self {
        Self {
            table: table.into(),
            entity: entity.into(),
            id_column: "id".to_string(),
            increment_size: crate::window::DEFAULT_INCREMENT_SIZE,
            mapping,
        }
    }

    /// Job described by configuration.
    pub fn from_config(config: &JobConfig) -> Self {
        Self {
            table: config.table.clone(),
            entity: config.entity.clone(),
            id_column: config.id_column.clone(),
            increment_size: config.increment_size,
            mapping: RowMapping::from_job(config),
        }
    }

    /// Set the window width used when seeding.
    pub fn increment_size(mut self, size: i64) -> Self {
        self.increment_size = size;
        self
    }
}

/// Summary of one job's cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub table: String,
    pub entity: String,
    pub window: Window,
    /// Rows extracted.
    pub rows: usize,
    /// Points written.
    pub kept: usize,
    /// Rows discarded for missing values.
    pub discarded: usize,
    /// Partial errors reported by the destination for the entity's batch.
    /// Counted on the first job writing to the entity.
    pub partial_errors: usize,
    /// New watermark, if the checkpoint was committed.
    pub committed: Option<i64>,
}

impl CycleReport {
    /// True if the window held no rows.
    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CycleState {
    Idle,
    AllocatingWindow,
    Extracting,
    Transforming,
    Loading,
    Committing,
    Failed,
}

impl fmt::Display for CycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CycleState::Idle => "Idle",
            CycleState::AllocatingWindow => "AllocatingWindow",
            CycleState::Extracting => "Extracting",
            CycleState::Transforming => "Transforming",
            CycleState::Loading => "Loading",
            CycleState::Committing => "Committing",
            CycleState::Failed => "Failed",
        };
        f.write_str(s)
    }
}

struct Tracker<'a> {
    scope: &'a str,
    state: CycleState,
}

impl<'a> Tracker<'a> {
    fn new() -> Self {
        Self {
            scope: "cycle",
            state: CycleState::Idle,
        }
    }

    fn scope(&mut self, scope: &'a str) {
        self.scope = scope;
    }

    fn enter(&mut self, next: CycleState) {
        tracing::debug!("[{}] {} -> {}", self.scope, self.state, next);
        self.state = next;
    }

    fn check<T>(&mut self, result: Result<T>) -> Result<T> {
        if result.is_err() {
            self.enter(CycleState::Failed);
        }
        result
    }
}

/// A job's window, extracted and transformed, waiting to be loaded.
struct Staged<'a> {
    job: &'a Job,
    window: Window,
    rows: usize,
    points: Vec<Point>,
    discarded: usize,
    highest_id: Option<i64>,
}

/// Drives cycles over a source, a checkpoint store and a sink.
pub struct Loader<S, C> {
    source: S,
    checkpoints: C,
    sink: Box<dyn MetricSink>,
    jobs: Vec<Job>,
}

impl<S: ObservationSource, C: CheckpointStore> Loader<S, C> {
    pub fn new(source: S, checkpoints: C, sink: Box<dyn MetricSink>, jobs: Vec<Job>) -> Self {
        Self {
            source,
            checkpoints,
            sink,
            jobs,
        }
    }

    /// Run one cycle over every job. Returns one report per job, in order.
    ///
    /// A failure while staging or loading aborts the cycle without committing
    /// any checkpoint.
    pub fn run_cycle(&mut self) -> Result<Vec<CycleReport>> {
        let mut tracker = Tracker::new();

        let mut staged = Vec::with_capacity(self.jobs.len());
        for job in &self.jobs {
            tracker.scope(&job.table);
            staged.push(stage_job(job, &self.source, &self.checkpoints, &mut tracker)?);
        }

        tracker.scope("cycle");
        tracker.enter(CycleState::Loading);
        let pushes = tracker.check(load(self.sink.as_mut(), &staged))?;

        tracker.enter(CycleState::Committing);
        let mut attributed = BTreeSet::new();
        let mut reports = Vec::with_capacity(staged.len());
        for stage in staged {
            let committed = match stage.highest_id {
                Some(last_id) => {
                    tracker.check(
                        self.checkpoints
                            .advance(&stage.job.table, last_id)
                            .map_err(LoaderError::Checkpoint),
                    )?;
                    Some(last_id)
                }
                None => None,
            };

            let partial_errors = if attributed.insert(stage.job.entity.as_str()) {
                pushes
                    .iter()
                    .find(|p| p.entity == stage.job.entity)
                    .map_or(0, |p| p.errors.len())
            } else {
                0
            };

            reports.push(CycleReport {
                table: stage.job.table.clone(),
                entity: stage.job.entity.clone(),
                window: stage.window,
                rows: stage.rows,
                kept: stage.points.len(),
                discarded: stage.discarded,
                partial_errors,
                committed,
            });
        }
        tracker.enter(CycleState::Idle);

        for report in &reports {
            match report.committed {
                Some(last_id) => tracing::info!(
                    "{} {}: {} rows, {} points to {}, {} discarded, {} partial errors, checkpoint {}",
                    report.table,
                    report.window,
                    report.rows,
                    report.kept,
                    report.entity,
                    report.discarded,
                    report.partial_errors,
                    last_id
                ),
                None => tracing::debug!("{} {}: no rows", report.table, report.window),
            }
        }

        Ok(reports)
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn checkpoints(&self) -> &C {
        &self.checkpoints
    }

    pub fn sink(&self) -> &dyn MetricSink {
        self.sink.as_ref()
    }

    pub fn jobs(&self) -> &[Job] {
        &self.jobs
    }
}

impl Loader<SqliteSource, SqliteCheckpointStore> {
    /// Build a loader from configuration: SQLite source and checkpoint store,
    /// configured destination, one job per `[[jobs]]` entry.
    pub fn from_config(config: &LoaderConfig) -> Result<Self> {
        config.validate()?;

        let source = SqliteSource::open(&config.source.path).map_err(|source| {
            LoaderError::Extraction {
                table: config.source.path.display().to_string(),
                source,
            }
        })?;
        let checkpoints =
            SqliteCheckpointStore::open(config.checkpoint_path(), config.checkpoint.schema())
                .map_err(LoaderError::Checkpoint)?;
        let sink = config.destination.build_sink()?;
        let jobs = config.jobs.iter().map(Job::from_config).collect();

        Ok(Self::new(source, checkpoints, sink, jobs))
    }
}

fn stage_job<'a, S, C>(
    job: &'a Job,
    source: &S,
    checkpoints: &C,
    tracker: &mut Tracker<'_>,
) -> Result<Staged<'a>>
where
    S: ObservationSource + ?Sized,
    C: CheckpointStore + ?Sized,
{
    tracker.enter(CycleState::AllocatingWindow);
    let window = tracker.check(RangeAllocator::new(job.increment_size).next_window(
        &job.table,
        &job.id_column,
        source,
        checkpoints,
    ))?;

    tracker.enter(CycleState::Extracting);
    let rows = tracker.check(RowExtractor::new(source, &job.table, &job.id_column).fetch(&window))?;

    tracker.enter(CycleState::Transforming);
    let mut transformer = RowTransformer::new(&job.mapping);
    let points: Vec<Point> = rows
        .iter()
        .filter_map(|row| match transformer.transform(row) {
            Outcome::Kept(point) => Some(point),
            Outcome::Discarded { .. } => None,
        })
        .collect();

    Ok(Staged {
        job,
        window,
        rows: rows.len(),
        points,
        discarded: transformer.discarded(),
        highest_id: transformer.highest_id(),
    })
}

/// Write every staged point into one handle per entity and push them all
/// over a single connection.
fn load(sink: &mut dyn MetricSink, staged: &[Staged<'_>]) -> Result<Vec<PushReport>> {
    let mut handles: Vec<WriteHandle> = Vec::new();
    for stage in staged {
        let index = match handles.iter().position(|h| h.entity() == stage.job.entity) {
            Some(index) => index,
            None => {
                handles.push(sink.open(&stage.job.entity)?);
                handles.len() - 1
            }
        };
        for point in &stage.points {
            handles[index].write(point);
        }
    }
    Ok(sink.close_all(handles)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::Checkpoint;
    use crate::error::StoreError;
    use crate::mapping::{copy_tag, copy_value, join_columns, seconds_to_millis};
    use crate::source::SourceRow;
    use std::cell::RefCell;
    use std::rc::Rc;
    use tsload_sink::{
        Batch, Destination, DestinationClient, EntityDef, PushResponse, SinkError, TimeSeriesSink,
    };

    struct MemorySource(Vec<SourceRow>);

    impl ObservationSource for MemorySource {
        fn min_id(&self, _: &str, _: &str) -> std::result::Result<Option<i64>, StoreError> {
            Ok(self.0.iter().map(|r| r.id).min())
        }

        fn rows_in_range(
            &self,
            _: &str,
            _: &str,
            from: i64,
            to: i64,
            include_from: bool,
        ) -> std::result::Result<Vec<SourceRow>, StoreError> {
            let mut rows: Vec<SourceRow> = self
                .0
                .iter()
                .filter(|r| (r.id > from || (include_from && r.id == from)) && r.id < to)
                .cloned()
                .collect();
            rows.sort_by_key(|r| r.id);
            Ok(rows)
        }
    }

    #[derive(Default)]
    struct Pushes(Vec<Batch>);

    struct Recording {
        pushes: Rc<RefCell<Pushes>>,
        fail: bool,
    }

    struct RecordingClient {
        pushes: Rc<RefCell<Pushes>>,
        fail: bool,
    }

    impl DestinationClient for RecordingClient {
        fn push(&mut self, batch: &Batch) -> std::result::Result<PushResponse, SinkError> {
            if self.fail {
                return Err(SinkError::push("memory", "broken pipe"));
            }
            self.pushes.borrow_mut().0.push(batch.clone());
            Ok(PushResponse::ok())
        }

        fn shutdown(self) -> std::result::Result<(), SinkError> {
            Ok(())
        }
    }

    impl Destination for Recording {
        type Client = RecordingClient;

        fn describe(&self) -> String {
            "memory".into()
        }

        fn connect(&self) -> std::result::Result<RecordingClient, SinkError> {
            Ok(RecordingClient {
                pushes: Rc::clone(&self.pushes),
                fail: self.fail,
            })
        }
    }

    fn row(id: i64, value: Option<f64>) -> SourceRow {
        SourceRow::new(id)
            .with("device", "D1")
            .with("kind", "temp")
            .with("ts", 1_700_000_000_i64)
            .with("value", value)
    }

    fn job() -> Job {
        let mapping = RowMapping::new(
            join_columns(["device", "kind"], "."),
            seconds_to_millis("ts"),
            copy_value("value"),
            "value",
        )
        .with_tag("kind", copy_tag("kind"));
        Job::new("observation", "observations", mapping).increment_size(10)
    }

    fn loader(
        rows: Vec<SourceRow>,
        fail: bool,
    ) -> (Loader<MemorySource, SqliteCheckpointStore>, Rc<RefCell<Pushes>>) {
        let pushes = Rc::new(RefCell::new(Pushes::default()));
        let sink = TimeSeriesSink::new(
            Recording {
                pushes: Rc::clone(&pushes),
                fail,
            },
            [EntityDef::new("observations", ["kind"])],
        );
        let loader = Loader::new(
            MemorySource(rows),
            SqliteCheckpointStore::new_in_memory().unwrap(),
            Box::new(sink),
            vec![job()],
        );
        (loader, pushes)
    }

    #[test]
    fn test_bootstrap_includes_min_row() {
        let (mut loader, pushes) = loader(vec![row(100, Some(1.0)), row(105, Some(2.0))], false);

        let report = loader.run_cycle().unwrap().remove(0);

        assert_eq!((report.window.from, report.window.to), (100, 110));
        assert_eq!(report.rows, 2);
        assert_eq!(report.committed, Some(105));
        assert_eq!(pushes.borrow().0[0].len(), 2);
        assert_eq!(
            loader.checkpoints().load("observation").unwrap(),
            Some(Checkpoint::new("observation", 105, 10))
        );
    }

    #[test]
    fn test_empty_window_stalls() {
        let (mut loader, pushes) = loader(vec![row(100, Some(1.0)), row(150, Some(2.0))], false);

        loader.run_cycle().unwrap();
        let report = loader.run_cycle().unwrap().remove(0);

        assert!(report.is_empty());
        assert_eq!(report.committed, None);
        assert_eq!((report.window.from, report.window.to), (100, 110));
        assert_eq!(pushes.borrow().0.len(), 1);

        let again = loader.run_cycle().unwrap().remove(0);
        assert_eq!(again.window, report.window);
    }

    #[test]
    fn test_discarded_row_advances_checkpoint() {
        let (mut loader, pushes) = loader(vec![row(100, Some(1.0)), row(104, None)], false);

        let report = loader.run_cycle().unwrap().remove(0);

        assert_eq!(report.kept, 1);
        assert_eq!(report.discarded, 1);
        assert_eq!(report.committed, Some(104));
        assert_eq!(pushes.borrow().0[0].len(), 1);
    }

    #[test]
    fn test_all_discarded_still_commits_without_push() {
        let (mut loader, pushes) = loader(vec![row(100, None), row(101, None)], false);

        let report = loader.run_cycle().unwrap().remove(0);

        assert_eq!(report.kept, 0);
        assert_eq!(report.committed, Some(101));
        assert!(pushes.borrow().0.is_empty());
    }

    #[test]
    fn test_push_failure_leaves_checkpoint() {
        let (mut loader, _pushes) = loader(vec![row(100, Some(1.0)), row(101, Some(1.0))], true);

        let err = loader.run_cycle().unwrap_err();

        assert!(matches!(err, LoaderError::SinkPush(_)));
        assert_eq!(
            loader.checkpoints().load("observation").unwrap().unwrap().last_id,
            100
        );
    }

    #[test]
    fn test_empty_source_is_checkpoint_init_error() {
        let (mut loader, _pushes) = loader(Vec::new(), false);
        assert!(matches!(
            loader.run_cycle().unwrap_err(),
            LoaderError::CheckpointInit { .. }
        ));
    }

    #[test]
    fn test_unknown_entity_is_sink_error() {
        let (mut loader, _pushes) = loader(vec![row(1, Some(1.0))], false);
        loader.jobs[0].entity = "elsewhere".into();
        assert!(matches!(loader.run_cycle().unwrap_err(), LoaderError::Sink(_)));
    }
}
