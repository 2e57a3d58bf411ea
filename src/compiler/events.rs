//! Structured change log of a compilation.
//!
//! Every transformation the optimizer applies is recorded as an [`Event`] naming
//! the method, the node and the pass. The log backs the statistics reported with
//! a compiled method, and tests use it to assert that a specific rewrite fired.
//!
//! # Architecture
//!
//! - [`Event`] - A single recorded event
//! - [`EventLog`] - Append-only collection with query and summary helpers
//! - [`EventBuilder`] - Fluent API; the event is pushed when the builder drops
//!
//! # Example
//!
//! ```rust
//! use seaopt::compiler::{EventKind, EventLog, MethodId};
//! use seaopt::ir::NodeId;
//!
//! let log = EventLog::new();
//! log.record(EventKind::ConstantFolded)
//!     .at(MethodId::new(7), NodeId::new(12))
//!     .pass("igvn")
//!     .message("AddI(3, 4) -> 7");
//!
//! assert_eq!(log.count_kind(EventKind::ConstantFolded), 1);
//! assert!(log.summary().contains("constant folded"));
//! ```

use std::{
    collections::{HashMap, HashSet},
    fmt,
    time::Duration,
};

use crate::{compiler::context::MethodId, ir::NodeId};

/// Categories of events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// A node was replaced by a constant.
    ConstantFolded,
    /// An algebraic identity or canonicalization fired.
    AlgebraicSimplified,
    /// A node was found equal to an existing one and merged into it.
    NodeCommoned,
    /// A node or path was proven unreachable and replaced by Top.
    DeadPathRemoved,
    /// A region or loop header lost predecessors or collapsed.
    RegionSimplified,
    /// A phi collapsed to a single value.
    PhiSimplified,
    /// A load was answered from a store or bypassed a store.
    LoadForwarded,
    /// A store was removed as redundant or overwritten.
    StoreEliminated,
    /// A memory merge was simplified.
    MemoryMergeSimplified,
    /// A bottom memory phi was split for one alias class.
    MemoryPhiSplit,
    /// A narrow memory phi was merged into the bottom phi.
    MemoryPhiMerged,
    /// A signed compare of biased operands became an unsigned compare.
    CompareUnsigned,
    /// A range check was proven redundant.
    RangeCheckEliminated,
    /// A loop was duplicated over an invariant test.
    LoopUnswitched,
    /// The first iteration of a loop was peeled.
    LoopPeeled,
    /// A loop body was duplicated once.
    LoopUnrolled,
    /// A loop with a small constant trip count was unrolled completely.
    LoopFullyUnrolled,
    /// A loop was split into an outer and an inner loop.
    LoopStripMined,
    /// A branch on merged values was split through its merge point.
    IfSplit,

    /// A pass started.
    PassStarted,
    /// A pass completed.
    PassCompleted,
    /// A compilation unit gave up.
    Bailout,

    /// Informational message.
    Info,
    /// Warning (something unexpected but recoverable).
    Warning,
    /// Error (something failed).
    Error,
}

impl EventKind {
    /// Returns a human-readable description of this event kind.
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::ConstantFolded => "constant folded",
            Self::AlgebraicSimplified => "algebraic simplification",
            Self::NodeCommoned => "node commoned",
            Self::DeadPathRemoved => "dead path removed",
            Self::RegionSimplified => "region simplified",
            Self::PhiSimplified => "phi simplified",
            Self::LoadForwarded => "load forwarded",
            Self::StoreEliminated => "store eliminated",
            Self::MemoryMergeSimplified => "memory merge simplified",
            Self::MemoryPhiSplit => "memory phi split",
            Self::MemoryPhiMerged => "memory phi merged",
            Self::CompareUnsigned => "compare made unsigned",
            Self::RangeCheckEliminated => "range check eliminated",
            Self::LoopUnswitched => "loop unswitched",
            Self::LoopPeeled => "loop peeled",
            Self::LoopUnrolled => "loop unrolled",
            Self::LoopFullyUnrolled => "loop fully unrolled",
            Self::LoopStripMined => "loop strip mined",
            Self::IfSplit => "if split through merge",
            Self::PassStarted => "pass started",
            Self::PassCompleted => "pass completed",
            Self::Bailout => "bailout",
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }

    /// Returns true if this event represents a graph transformation.
    #[must_use]
    pub fn is_transformation(&self) -> bool {
        !matches!(
            self,
            Self::PassStarted
                | Self::PassCompleted
                | Self::Bailout
                | Self::Info
                | Self::Warning
                | Self::Error
        )
    }

    /// Returns true if this event is a loop transformation.
    #[must_use]
    pub fn is_loop_transformation(&self) -> bool {
        matches!(
            self,
            Self::RangeCheckEliminated
                | Self::LoopUnswitched
                | Self::LoopPeeled
                | Self::LoopUnrolled
                | Self::LoopFullyUnrolled
                | Self::LoopStripMined
                | Self::IfSplit
        )
    }

    /// Returns true if this is a diagnostic event (info/warning/error).
    #[must_use]
    pub fn is_diagnostic(&self) -> bool {
        matches!(self, Self::Info | Self::Warning | Self::Error)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// A single logged event.
#[derive(Debug, Clone)]
pub struct Event {
    /// The type of event.
    pub kind: EventKind,
    /// The compilation unit.
    pub method: Option<MethodId>,
    /// The node the event is about.
    pub node: Option<NodeId>,
    /// Human-readable description.
    pub message: String,
    /// The pass that produced the event.
    pub pass: Option<&'static str>,
}

impl Event {
    fn new(kind: EventKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            method: None,
            node: None,
            message: message.into(),
            pass: None,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.kind)?;
        if let Some(pass) = self.pass {
            write!(f, " {pass}")?;
        }
        if let Some(method) = self.method {
            write!(f, " {method}")?;
        }
        if let Some(node) = self.node {
            write!(f, " @{node}")?;
        }
        write!(f, ": {}", self.message)
    }
}

/// Fluent builder created by [`EventLog::record`]. The event is added to the log
/// when the builder is dropped.
pub struct EventBuilder<'a> {
    log: &'a EventLog,
    kind: EventKind,
    method: Option<MethodId>,
    node: Option<NodeId>,
    message: Option<String>,
    pass: Option<&'static str>,
}

impl<'a> EventBuilder<'a> {
    fn new(log: &'a EventLog, kind: EventKind) -> Self {
        Self {
            log,
            kind,
            method: None,
            node: None,
            message: None,
            pass: None,
        }
    }

    /// Sets the method and node where the event occurred.
    pub fn at(mut self, method: MethodId, node: NodeId) -> Self {
        self.method = Some(method);
        self.node = Some(node);
        self
    }

    /// Sets only the method.
    pub fn method(mut self, method: MethodId) -> Self {
        self.method = Some(method);
        self
    }

    /// Sets only the node.
    pub fn node(mut self, node: NodeId) -> Self {
        self.node = Some(node);
        self
    }

    /// Sets a custom message describing the event.
    pub fn message(mut self, msg: impl Into<String>) -> Self {
        self.message = Some(msg.into());
        self
    }

    /// Associates this event with a pass.
    pub fn pass(mut self, pass_name: &'static str) -> Self {
        self.pass = Some(pass_name);
        self
    }
}

impl Drop for EventBuilder<'_> {
    fn drop(&mut self) {
        let message = self
            .message
            .take()
            .unwrap_or_else(|| self.kind.description().to_string());

        self.log.events.push(Event {
            kind: self.kind,
            method: self.method.take(),
            node: self.node.take(),
            message,
            pass: self.pass.take(),
        });
    }
}

/// Append-only event collection.
///
/// Events can be appended through shared references, so a log can be handed to
/// code running on other threads.
#[derive(Debug, Default)]
pub struct EventLog {
    events: boxcar::Vec<Event>,
}

impl Clone for EventLog {
    fn clone(&self) -> Self {
        let new_log = Self::new();
        new_log.merge(self);
        new_log
    }
}

impl EventLog {
    /// Creates an empty event log.
    #[must_use]
    pub fn new() -> Self {
        Self {
            events: boxcar::Vec::new(),
        }
    }

    /// Returns true if no events have been logged.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.count() == 0
    }

    /// Returns the total number of events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.count()
    }

    /// Starts building a new event of the given kind.
    pub fn record(&self, kind: EventKind) -> EventBuilder<'_> {
        EventBuilder::new(self, kind)
    }

    /// Records an informational message.
    pub fn info(&self, message: impl Into<String>) {
        self.events.push(Event::new(EventKind::Info, message));
    }

    /// Records a warning message.
    pub fn warn(&self, message: impl Into<String>) {
        self.events.push(Event::new(EventKind::Warning, message));
    }

    /// Records an error message.
    pub fn error(&self, message: impl Into<String>) {
        self.events.push(Event::new(EventKind::Error, message));
    }

    /// Appends copies of all events of `other`.
    pub fn merge(&self, other: &EventLog) {
        for (_, event) in &other.events {
            self.events.push(event.clone());
        }
    }

    /// Returns true if any event of the given kind exists.
    #[must_use]
    pub fn has(&self, kind: EventKind) -> bool {
        self.events.iter().any(|(_, e)| e.kind == kind)
    }

    /// Counts events of the given kind.
    #[must_use]
    pub fn count_kind(&self, kind: EventKind) -> usize {
        self.events.iter().filter(|(_, e)| e.kind == kind).count()
    }

    /// Returns an iterator over all events.
    pub fn iter(&self) -> impl Iterator<Item = &Event> {
        self.events.iter().map(|(_, e)| e)
    }

    /// Returns an iterator over events of a specific kind.
    pub fn filter_kind(&self, kind: EventKind) -> impl Iterator<Item = &Event> + '_ {
        self.iter().filter(move |e| e.kind == kind)
    }

    /// Returns an iterator over events for a specific method.
    pub fn filter_method(&self, method: MethodId) -> impl Iterator<Item = &Event> + '_ {
        self.iter().filter(move |e| e.method == Some(method))
    }

    /// Returns an iterator over transformation events only.
    pub fn transformations(&self) -> impl Iterator<Item = &Event> + '_ {
        self.iter().filter(|e| e.kind.is_transformation())
    }

    /// Counts events grouped by kind.
    #[must_use]
    pub fn count_by_kind(&self) -> HashMap<EventKind, usize> {
        let mut counts = HashMap::new();
        for (_, event) in &self.events {
            *counts.entry(event.kind).or_insert(0) += 1;
        }
        counts
    }

    /// Returns the number of transformation events.
    #[must_use]
    pub fn transformation_count(&self) -> usize {
        self.transformations().count()
    }

    /// Returns the number of distinct methods with events.
    #[must_use]
    pub fn methods_affected(&self) -> usize {
        self.iter()
            .filter_map(|e| e.method)
            .collect::<HashSet<_>>()
            .len()
    }

    /// Generates a human-readable summary of the transformations.
    #[must_use]
    pub fn summary(&self) -> String {
        if self.is_empty() {
            return "no events".to_string();
        }

        let mut parts: Vec<String> = self
            .count_by_kind()
            .iter()
            .filter(|(k, _)| k.is_transformation())
            .map(|(kind, count)| format!("{} {}", count, kind.description()))
            .collect();

        if parts.is_empty() {
            return format!("{} events", self.len());
        }

        parts.sort();
        parts.join(", ")
    }
}

impl FromIterator<Event> for EventLog {
    fn from_iter<T: IntoIterator<Item = Event>>(iter: T) -> Self {
        let log = Self::new();
        for event in iter {
            log.events.push(event);
        }
        log
    }
}

/// Statistics derived from an [`EventLog`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DerivedStats {
    /// Methods with at least one transformation.
    pub methods_transformed: usize,
    /// Nodes folded to constants.
    pub constants_folded: usize,
    /// Algebraic rewrites.
    pub algebraic: usize,
    /// Nodes merged by value numbering.
    pub commoned: usize,
    /// Nodes and paths removed as unreachable.
    pub dead_paths: usize,
    /// Loads forwarded or bypassing stores.
    pub loads_forwarded: usize,
    /// Stores removed.
    pub stores_eliminated: usize,
    /// Memory phis split or merged.
    pub memory_phis: usize,
    /// Range checks removed.
    pub range_checks_eliminated: usize,
    /// Loop-phase transformations (unswitch, peel, unroll, strip mine, split-if).
    pub loop_transforms: usize,
    /// Bailouts.
    pub bailouts: usize,
    /// Processing time.
    pub total_time: Duration,
}

impl DerivedStats {
    /// Computes statistics from an event log.
    #[must_use]
    pub fn from_log(log: &EventLog) -> Self {
        let counts = log.count_by_kind();
        let get = |kind: EventKind| counts.get(&kind).copied().unwrap_or(0);

        Self {
            methods_transformed: log
                .transformations()
                .filter_map(|e| e.method)
                .collect::<HashSet<_>>()
                .len(),
            constants_folded: get(EventKind::ConstantFolded),
            algebraic: get(EventKind::AlgebraicSimplified) + get(EventKind::CompareUnsigned),
            commoned: get(EventKind::NodeCommoned),
            dead_paths: get(EventKind::DeadPathRemoved) + get(EventKind::RegionSimplified),
            loads_forwarded: get(EventKind::LoadForwarded),
            stores_eliminated: get(EventKind::StoreEliminated),
            memory_phis: get(EventKind::MemoryPhiSplit) + get(EventKind::MemoryPhiMerged),
            range_checks_eliminated: get(EventKind::RangeCheckEliminated),
            loop_transforms: get(EventKind::LoopUnswitched)
                + get(EventKind::LoopPeeled)
                + get(EventKind::LoopUnrolled)
                + get(EventKind::LoopFullyUnrolled)
                + get(EventKind::LoopStripMined)
                + get(EventKind::IfSplit),
            bailouts: get(EventKind::Bailout),
            total_time: Duration::ZERO,
        }
    }

    /// Sets the total processing time.
    #[must_use]
    pub fn with_time(mut self, time: Duration) -> Self {
        self.total_time = time;
        self
    }

    /// Generates a human-readable summary.
    #[must_use]
    pub fn summary(&self) -> String {
        let mut parts = Vec::new();
        let mut push = |count: usize, what: &str| {
            if count > 0 {
                parts.push(format!("{count} {what}"));
            }
        };
        push(self.methods_transformed, "methods");
        push(self.constants_folded, "constants folded");
        push(self.algebraic, "algebraic rewrites");
        push(self.commoned, "nodes commoned");
        push(self.dead_paths, "dead paths removed");
        push(self.loads_forwarded, "loads forwarded");
        push(self.stores_eliminated, "stores eliminated");
        push(self.memory_phis, "memory phis split or merged");
        push(self.range_checks_eliminated, "range checks eliminated");
        push(self.loop_transforms, "loop transformations");
        push(self.bailouts, "bailouts");

        if parts.is_empty() {
            return "no changes".to_string();
        }
        if !self.total_time.is_zero() {
            parts.push(format!("in {:?}", self.total_time));
        }
        parts.join(", ")
    }
}
