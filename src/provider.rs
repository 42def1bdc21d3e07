//! Source trait for simulator snapshots

use crate::Result;
use crate::types::{GraphicsSnapshot, PhysicsSnapshot, SnapshotKind, StaticSnapshot};

/// Trait for read-only snapshot sources
///
/// Sources abstract over where the simulator state comes from (live shared
/// memory, scripted replays). Each read returns a complete value captured at
/// the moment of the call; sources never hand out partially written data.
///
/// Reads are called from poll threads at a fixed cadence, so implementations
/// must not block for long:
/// - `Ok(snapshot)` - Fresh value
/// - `Err(e)` - Transient failure, the caller skips this tick
pub trait SnapshotSource: Send + Sync + 'static {
    /// Read the physics page
    fn read_physics(&self) -> Result<PhysicsSnapshot>;

    /// Read the graphics page
    fn read_graphics(&self) -> Result<GraphicsSnapshot>;

    /// Read the static page
    fn read_static(&self) -> Result<StaticSnapshot>;
}

/// A snapshot type that a [`Tracker`](crate::tracker::Tracker) can poll.
pub trait Snapshot: Clone + Default + Send + Sync + 'static {
    /// Page this snapshot is read from
    const KIND: SnapshotKind;

    /// Read one value of this type from the source
    fn read(source: &dyn SnapshotSource) -> Result<Self>;
}

impl Snapshot for PhysicsSnapshot {
    const KIND: SnapshotKind = SnapshotKind::Physics;

    fn read(source: &dyn SnapshotSource) -> Result<Self> {
        source.read_physics()
    }
}

impl Snapshot for GraphicsSnapshot {
    const KIND: SnapshotKind = SnapshotKind::Graphics;

    fn read(source: &dyn SnapshotSource) -> Result<Self> {
        source.read_graphics()
    }
}

impl Snapshot for StaticSnapshot {
    const KIND: SnapshotKind = SnapshotKind::Static;

    fn read(source: &dyn SnapshotSource) -> Result<Self> {
        source.read_static()
    }
}
