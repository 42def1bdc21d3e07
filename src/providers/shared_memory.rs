//! Live snapshot source over the simulator's shared memory (Windows)

use tracing::{info, warn};

use crate::Result;
use crate::provider::SnapshotSource;
use crate::types::{GraphicsSnapshot, PhysicsSnapshot, StaticSnapshot};
use crate::windows::{
    GRAPHICS_PAGE_NAME, GraphicsPage, PHYSICS_PAGE_NAME, PageMapping, PhysicsPage,
    STATIC_PAGE_NAME, StaticPage,
};

/// Simulator status value meaning "not running"
const STATUS_OFF: i32 = 0;

/// Source that copies the three live pages on every read
pub struct SharedMemorySource {
    physics: PageMapping<PhysicsPage>,
    graphics: PageMapping<GraphicsPage>,
    statics: PageMapping<StaticPage>,
}

impl SharedMemorySource {
    /// Map all three pages
    ///
    /// Fails with a Windows API error when the simulator has not created the
    /// pages yet; callers usually retry until it has.
    pub fn open() -> Result<Self> {
        let physics = PageMapping::open(PHYSICS_PAGE_NAME)?;
        let graphics = PageMapping::open(GRAPHICS_PAGE_NAME)?;
        let statics = PageMapping::open(STATIC_PAGE_NAME)?;

        let status = graphics.read().status;
        if status == STATUS_OFF {
            // Pages outlive the session, so stale data is expected here
            warn!("Shared memory mapped but simulator is not in a session");
        }

        let static_page = StaticSnapshot::from(&statics.read());
        info!(
            car = %static_page.car_model,
            track = %static_page.track,
            max_rpm = static_page.max_rpm,
            status,
            "Connected to simulator shared memory"
        );

        Ok(Self { physics, graphics, statics })
    }
}

impl SnapshotSource for SharedMemorySource {
    fn read_physics(&self) -> Result<PhysicsSnapshot> {
        Ok(PhysicsSnapshot::from(&self.physics.read()))
    }

    fn read_graphics(&self) -> Result<GraphicsSnapshot> {
        Ok(GraphicsSnapshot::from(&self.graphics.read()))
    }

    fn read_static(&self) -> Result<StaticSnapshot> {
        Ok(StaticSnapshot::from(&self.statics.read()))
    }
}
