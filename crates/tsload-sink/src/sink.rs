// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Sink adapter.
//!
//! Bridges transformed points into a destination's write protocol:
//!
//! ```text
//! open(entity) --> WriteHandle::write(point)* --> close_all(handles)
//!                                                  |
//!                connect --> push(batch)* --> shutdown   (always)
//! ```
//!
//! `write` never performs I/O. `close_all` merges handles by entity and
//! performs exactly one push per non-empty batch, all inside a single
//! connection-scoped transaction.

use crate::batch::Batch;
use crate::error::SinkError;
use crate::point::Point;
use std::collections::{BTreeMap, BTreeSet};

/// Destination response to a push.
///
/// Partial failures are reported here rather than raised.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PushResponse {
    /// Error messages reported by the destination.
    pub errors: Vec<String>,
}

impl PushResponse {
    /// A response without errors.
    pub fn ok() -> Self {
        Self::default()
    }

    /// A response carrying partial errors.
    pub fn with_errors(errors: Vec<String>) -> Self {
        Self { errors }
    }
}

/// An established connection to a destination.
pub trait DestinationClient {
    /// Push one batch. Only transport faults are returned as errors.
    fn push(&mut self, batch: &Batch) -> Result<PushResponse, SinkError>;

    /// Release the connection.
    fn shutdown(self) -> Result<(), SinkError>;
}

/// A destination kind that can open client connections.
pub trait Destination {
    /// Connection type.
    type Client: DestinationClient;

    /// Human-readable description used in logs and errors.
    fn describe(&self) -> String;

    /// Establish a connection.
    fn connect(&self) -> Result<Self::Client, SinkError>;
}

/// Entity declaration: a name and the tag names it accepts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityDef {
    /// Entity name.
    pub name: String,
    /// Declared tag names.
    pub tags: BTreeSet<String>,
}

impl EntityDef {
    /// Declare an entity with the given tag names. Blank names are ignored.
    pub fn new<I, S>(name: impl Into<String>, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            tags: tags
                .into_iter()
                .map(Into::into)
                .filter(|t: &String| !t.trim().is_empty())
                .collect(),
        }
    }
}

/// Accumulates points for one entity. Obtained from [`MetricSink::open`].
#[derive(Debug)]
pub struct WriteHandle {
    batch: Batch,
    tags: BTreeSet<String>,
}

impl WriteHandle {
    fn new(entity: &EntityDef) -> Self {
        Self {
            batch: Batch::new(entity.name.clone()),
            tags: entity.tags.clone(),
        }
    }

    /// Entity this handle writes to.
    pub fn entity(&self) -> &str {
        self.batch.entity()
    }

    /// Append a point to the in-memory batch.
    ///
    /// Only tags declared for the entity are kept; undeclared tags are
    /// dropped and declared-but-missing tags are simply absent.
    pub fn write(&mut self, point: &Point) {
        let tags: BTreeMap<String, String> = point
            .tags
            .iter()
            .filter(|(k, _)| self.tags.contains(k.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        self.batch.push(Point {
            name: point.name.clone(),
            timestamp_ms: point.timestamp_ms,
            value: point.value.clone(),
            tags,
        });
    }

    /// Number of points written so far.
    pub fn len(&self) -> usize {
        self.batch.len()
    }

    /// True if nothing has been written.
    pub fn is_empty(&self) -> bool {
        self.batch.is_empty()
    }

    fn into_batch(self) -> Batch {
        self.batch
    }
}

/// Outcome of closing a write handle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PushReport {
    /// Entity name.
    pub entity: String,
    /// Number of points handed to the destination.
    pub points: usize,
    /// Partial errors reported by the destination.
    pub errors: Vec<String>,
    /// Whether a network push happened (false for empty batches).
    pub pushed: bool,
}

/// Sink statistics.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SinkStats {
    /// Pushes performed.
    pub pushes: u64,
    /// Points handed to the destination.
    pub points_pushed: u64,
    /// Partial errors reported by the destination.
    pub partial_errors: u64,
}

/// Batched write interface shared by every destination kind.
pub trait MetricSink {
    /// Human-readable description.
    fn describe(&self) -> String;

    /// Declared entities.
    fn entities(&self) -> Vec<&EntityDef>;

    /// Begin accumulating points for `entity`.
    fn open(&self, entity: &str) -> Result<WriteHandle, SinkError>;

    /// Push every handle's batch over one connection and discard them.
    ///
    /// Handles for the same entity are merged into one batch, so the result
    /// holds one report per entity in order of first appearance. No
    /// connection is made when every batch is empty. Partial errors are
    /// logged and returned in the reports; connection and transport faults
    /// are returned as errors.
    fn close_all(&mut self, handles: Vec<WriteHandle>) -> Result<Vec<PushReport>, SinkError>;

    /// Push a single handle's batch. See [`MetricSink::close_all`].
    fn close(&mut self, handle: WriteHandle) -> Result<PushReport, SinkError> {
        let reports = self.close_all(vec![handle])?;
        Ok(reports.into_iter().next().unwrap_or_default())
    }

    /// Accumulated statistics.
    fn stats(&self) -> SinkStats;
}

/// [`MetricSink`] over any [`Destination`].
pub struct TimeSeriesSink<D: Destination> {
    destination: D,
    entities: BTreeMap<String, EntityDef>,
    stats: SinkStats,
}

impl<D: Destination> TimeSeriesSink<D> {
    /// Create a sink over `destination` accepting the given entities.
    pub fn new(destination: D, entities: impl IntoIterator<Item = EntityDef>) -> Self {
        Self {
            destination,
            entities: entities
                .into_iter()
                .map(|e| (e.name.clone(), e))
                .collect(),
            stats: SinkStats::default(),
        }
    }

    /// Underlying destination.
    pub fn destination(&self) -> &D {
        &self.destination
    }

    /// Run `op` with a freshly established client, releasing the client on
    /// every exit path.
    fn execute_in_transaction<T>(
        &self,
        op: impl FnOnce(&mut D::Client) -> Result<T, SinkError>,
    ) -> Result<T, SinkError> {
        let mut client = self.destination.connect()?;
        tracing::debug!("Connected to {}", self.destination.describe());

        let result = op(&mut client);

        if let Err(e) = client.shutdown() {
            tracing::error!(
                "Unexpected error shutting down connection to {}: {}",
                self.destination.describe(),
                e
            );
        } else {
            tracing::debug!("Disconnected from {}", self.destination.describe());
        }

        result
    }
}

impl<D: Destination> MetricSink for TimeSeriesSink<D> {
    fn describe(&self) -> String {
        self.destination.describe()
    }

    fn entities(&self) -> Vec<&EntityDef> {
        self.entities.values().collect()
    }

    fn open(&self, entity: &str) -> Result<WriteHandle, SinkError> {
        let def = self
            .entities
            .get(entity)
            .ok_or_else(|| SinkError::UnknownEntity(entity.to_string()))?;
        Ok(WriteHandle::new(def))
    }

    fn close_all(&mut self, handles: Vec<WriteHandle>) -> Result<Vec<PushReport>, SinkError> {
        let mut batches: Vec<Batch> = Vec::with_capacity(handles.len());
        for handle in handles {
            let batch = handle.into_batch();
            match batches.iter_mut().find(|b| b.entity() == batch.entity()) {
                Some(existing) => existing.append(batch),
                None => batches.push(batch),
            }
        }

        let mut reports: Vec<PushReport> = batches
            .iter()
            .map(|batch| PushReport {
                entity: batch.entity().to_string(),
                points: batch.len(),
                ..Default::default()
            })
            .collect();

        if batches.iter().all(Batch::is_empty) {
            tracing::debug!("Nothing to push to {}", self.destination.describe());
            return Ok(reports);
        }

        let responses = self.execute_in_transaction(|client| {
            batches
                .iter()
                .map(|batch| {
                    if batch.is_empty() {
                        Ok(None)
                    } else {
                        client.push(batch).map(Some)
                    }
                })
                .collect::<Result<Vec<_>, _>>()
        })?;

        for ((batch, report), response) in batches.iter().zip(reports.iter_mut()).zip(responses) {
            let Some(response) = response else {
                tracing::debug!("Nothing to push for entity {}", batch.entity());
                continue;
            };

            for error in &response.errors {
                tracing::warn!(
                    "Error pushing metrics to {} through {}: {}",
                    self.destination.describe(),
                    batch.entity(),
                    error
                );
            }

            self.stats.pushes += 1;
            self.stats.points_pushed += batch.len() as u64;
            self.stats.partial_errors += response.errors.len() as u64;

            report.pushed = true;
            report.errors = response.errors;
        }

        Ok(reports)
    }

    fn stats(&self) -> SinkStats {
        self.stats.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Default)]
    struct Log {
        connects: u32,
        shutdowns: u32,
        pushed: Vec<Batch>,
    }

    struct FakeDestination {
        log: Rc<RefCell<Log>>,
        refuse: bool,
        fail_push: bool,
        errors: Vec<String>,
    }

    struct FakeClient {
        log: Rc<RefCell<Log>>,
        fail_push: bool,
        errors: Vec<String>,
    }

    impl DestinationClient for FakeClient {
        fn push(&mut self, batch: &Batch) -> Result<PushResponse, SinkError> {
            if self.fail_push {
                return Err(SinkError::push("fake", "connection reset"));
            }
            self.log.borrow_mut().pushed.push(batch.clone());
            Ok(PushResponse::with_errors(self.errors.clone()))
        }

        fn shutdown(self) -> Result<(), SinkError> {
            self.log.borrow_mut().shutdowns += 1;
            Ok(())
        }
    }

    impl Destination for FakeDestination {
        type Client = FakeClient;

        fn describe(&self) -> String {
            "fake".to_string()
        }

        fn connect(&self) -> Result<FakeClient, SinkError> {
            if self.refuse {
                return Err(SinkError::connect("fake", "refused"));
            }
            self.log.borrow_mut().connects += 1;
            Ok(FakeClient {
                log: Rc::clone(&self.log),
                fail_push: self.fail_push,
                errors: self.errors.clone(),
            })
        }
    }

    fn sink(refuse: bool, fail_push: bool, errors: Vec<String>) -> (TimeSeriesSink<FakeDestination>, Rc<RefCell<Log>>) {
        let log = Rc::new(RefCell::new(Log::default()));
        let dest = FakeDestination {
            log: Rc::clone(&log),
            refuse,
            fail_push,
            errors,
        };
        let sink = TimeSeriesSink::new(
            dest,
            [
                EntityDef::new("observations", ["observationKind"]),
                EntityDef::new("alarms", Vec::<String>::new()),
            ],
        );
        (sink, log)
    }

    #[test]
    fn test_write_does_no_io_and_close_pushes_once() {
        let (mut sink, log) = sink(false, false, vec![]);

        let mut handle = sink.open("observations").expect("open");
        handle.write(&Point::new("a", 1, 1.0));
        handle.write(&Point::new("b", 2, 2.0));
        assert_eq!(log.borrow().connects, 0);

        let report = sink.close(handle).expect("close");
        assert!(report.pushed);
        assert_eq!(report.points, 2);
        assert!(report.errors.is_empty());

        let log = log.borrow();
        assert_eq!(log.connects, 1);
        assert_eq!(log.shutdowns, 1);
        assert_eq!(log.pushed.len(), 1);
        assert_eq!(log.pushed[0].len(), 2);
    }

    #[test]
    fn test_only_declared_tags_are_kept() {
        let (mut sink, log) = sink(false, false, vec![]);

        let mut handle = sink.open("observations").expect("open");
        handle.write(
            &Point::new("a", 1, 1.0)
                .with_tag("observationKind", "temp")
                .with_tag("unmapped", "x"),
        );
        handle.write(&Point::new("b", 2, 2.0));
        sink.close(handle).expect("close");

        let log = log.borrow();
        let points = log.pushed[0].points();
        assert_eq!(points[0].tags.len(), 1);
        assert_eq!(points[0].tags.get("observationKind").map(String::as_str), Some("temp"));
        assert!(points[1].tags.is_empty());
    }

    #[test]
    fn test_unknown_entity() {
        let (sink, _log) = sink(false, false, vec![]);
        match sink.open("nope") {
            Err(SinkError::UnknownEntity(name)) => assert_eq!(name, "nope"),
            other => panic!("expected UnknownEntity, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_batch_skips_network() {
        let (mut sink, log) = sink(false, false, vec![]);
        let handle = sink.open("observations").expect("open");
        let report = sink.close(handle).expect("close");

        assert!(!report.pushed);
        assert_eq!(log.borrow().connects, 0);
        assert_eq!(sink.stats().pushes, 0);
    }

    #[test]
    fn test_partial_errors_are_reported_not_raised() {
        let (mut sink, _log) = sink(false, false, vec!["bad datapoint".to_string()]);

        let mut handle = sink.open("observations").expect("open");
        handle.write(&Point::new("a", 1, 1.0));
        let report = sink.close(handle).expect("close");

        assert_eq!(report.errors, vec!["bad datapoint".to_string()]);
        assert_eq!(sink.stats().partial_errors, 1);
    }

    #[test]
    fn test_connect_failure_is_fatal() {
        let (mut sink, log) = sink(true, false, vec![]);

        let mut handle = sink.open("observations").expect("open");
        handle.write(&Point::new("a", 1, 1.0));
        let err = sink.close(handle).unwrap_err();

        assert!(err.is_connect());
        assert_eq!(log.borrow().shutdowns, 0);
    }

    #[test]
    fn test_close_all_uses_one_connection_and_merges_entities() {
        let (mut sink, log) = sink(false, false, vec![]);

        let mut first = sink.open("observations").expect("open");
        first.write(&Point::new("a", 1, 1.0));
        let mut alarms = sink.open("alarms").expect("open");
        alarms.write(&Point::new("x", 2, 1.0));
        let mut second = sink.open("observations").expect("open");
        second.write(&Point::new("b", 3, 2.0));

        let reports = sink.close_all(vec![first, alarms, second]).expect("close_all");

        let entities: Vec<_> = reports.iter().map(|r| r.entity.as_str()).collect();
        assert_eq!(entities, vec!["observations", "alarms"]);
        assert_eq!(reports[0].points, 2);
        assert!(reports.iter().all(|r| r.pushed));

        let log = log.borrow();
        assert_eq!(log.connects, 1);
        assert_eq!(log.shutdowns, 1);
        assert_eq!(log.pushed.len(), 2);
        let names: Vec<_> = log.pushed[0].points().iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(sink.stats().pushes, 2);
    }

    #[test]
    fn test_close_all_skips_empty_batches() {
        let (mut sink, log) = sink(false, false, vec![]);

        let empty = sink.open("alarms").expect("open");
        let mut full = sink.open("observations").expect("open");
        full.write(&Point::new("a", 1, 1.0));

        let reports = sink.close_all(vec![empty, full]).expect("close_all");
        assert!(!reports[0].pushed);
        assert!(reports[1].pushed);
        assert_eq!(log.borrow().connects, 1);
        assert_eq!(log.borrow().pushed.len(), 1);

        let idle = sink.open("alarms").expect("open");
        sink.close_all(vec![idle]).expect("close_all");
        assert_eq!(log.borrow().connects, 1);
    }

    #[test]
    fn test_push_failure_still_shuts_down() {
        let (mut sink, log) = sink(false, true, vec![]);

        let mut handle = sink.open("observations").expect("open");
        handle.write(&Point::new("a", 1, 1.0));
        let err = sink.close(handle).unwrap_err();

        assert!(err.is_push());
        assert_eq!(log.borrow().connects, 1);
        assert_eq!(log.borrow().shutdowns, 1);
        assert_eq!(sink.stats().pushes, 0);
    }
}
