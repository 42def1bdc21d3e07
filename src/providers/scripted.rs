//! Scripted snapshot source for replays, demos and tests

use parking_lot::Mutex;
use std::collections::VecDeque;
use tracing::{debug, trace};

use crate::provider::SnapshotSource;
use crate::types::{GraphicsSnapshot, PhysicsSnapshot, SnapshotKind, StaticSnapshot};
use crate::{Result, StintError};

/// Queue of scripted values for one page
#[derive(Debug)]
struct Script<T> {
    /// Values not yet read
    queue: VecDeque<T>,

    /// Most recently read value, repeated once the queue drains
    last: Option<T>,

    /// Number of upcoming reads that fail
    failures: u32,

    /// Total reads served (including failures)
    reads: u64,
}

impl<T> Default for Script<T> {
    fn default() -> Self {
        Self { queue: VecDeque::new(), last: None, failures: 0, reads: 0 }
    }
}

impl<T: Clone> Script<T> {
    fn next(&mut self, kind: SnapshotKind) -> Result<T> {
        self.reads += 1;

        if self.failures > 0 {
            self.failures -= 1;
            trace!(page = kind.as_str(), remaining = self.failures, "Injected read failure");
            return Err(StintError::read_failed(kind.as_str(), "injected failure"));
        }

        if let Some(value) = self.queue.pop_front() {
            self.last = Some(value.clone());
            return Ok(value);
        }

        self.last.clone().ok_or_else(|| StintError::read_failed(kind.as_str(), "nothing scripted"))
    }
}

/// Snapshot source fed from in-memory scripts
///
/// Each read pops the next queued value for that page; once a page's queue is
/// drained the last value is repeated, like a simulator that stopped updating.
/// Reading a page that was never scripted fails with a transient
/// [`StintError::Read`].
#[derive(Debug, Default)]
pub struct ScriptedSource {
    physics: Mutex<Script<PhysicsSnapshot>>,
    graphics: Mutex<Script<GraphicsSnapshot>>,
    statics: Mutex<Script<StaticSnapshot>>,
}

impl ScriptedSource {
    /// Create an empty source
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a physics snapshot
    pub fn push_physics(&self, snapshot: PhysicsSnapshot) {
        self.physics.lock().queue.push_back(snapshot);
    }

    /// Queue a graphics snapshot
    pub fn push_graphics(&self, snapshot: GraphicsSnapshot) {
        self.graphics.lock().queue.push_back(snapshot);
    }

    /// Queue a static snapshot
    pub fn push_static(&self, snapshot: StaticSnapshot) {
        self.statics.lock().queue.push_back(snapshot);
    }

    /// Queue a sequence of graphics snapshots, e.g. a recorded lap
    pub fn extend_graphics(&self, snapshots: impl IntoIterator<Item = GraphicsSnapshot>) {
        let mut script = self.graphics.lock();
        script.queue.extend(snapshots);
        debug!(queued = script.queue.len(), "Scripted graphics snapshots");
    }

    /// Make the next `count` reads of `kind` fail
    pub fn fail_next(&self, kind: SnapshotKind, count: u32) {
        match kind {
            SnapshotKind::Physics => self.physics.lock().failures += count,
            SnapshotKind::Graphics => self.graphics.lock().failures += count,
            SnapshotKind::Static => self.statics.lock().failures += count,
        }
    }

    /// Number of queued values not yet read for `kind`
    pub fn pending(&self, kind: SnapshotKind) -> usize {
        match kind {
            SnapshotKind::Physics => self.physics.lock().queue.len(),
            SnapshotKind::Graphics => self.graphics.lock().queue.len(),
            SnapshotKind::Static => self.statics.lock().queue.len(),
        }
    }

    /// Number of reads served for `kind`, failed ones included
    pub fn reads(&self, kind: SnapshotKind) -> u64 {
        match kind {
            SnapshotKind::Physics => self.physics.lock().reads,
            SnapshotKind::Graphics => self.graphics.lock().reads,
            SnapshotKind::Static => self.statics.lock().reads,
        }
    }
}

impl SnapshotSource for ScriptedSource {
    fn read_physics(&self) -> Result<PhysicsSnapshot> {
        self.physics.lock().next(SnapshotKind::Physics)
    }

    fn read_graphics(&self) -> Result<GraphicsSnapshot> {
        self.graphics.lock().next(SnapshotKind::Graphics)
    }

    fn read_static(&self) -> Result<StaticSnapshot> {
        self.statics.lock().next(SnapshotKind::Static)
    }
}
