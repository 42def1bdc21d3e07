//! Lateral and longitudinal g-force trace

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::trace;

use crate::job::PeriodicJob;
use crate::overlay::{ConfigField, ConfigSchema, Feeds, Overlay, OverlayContext, Size, TelemetryView};

pub const NAME: &str = "G-Force Trace";

/// Samples per chunk
pub const CHUNK_SIZE: usize = 128;

pub const SAMPLE_HZ: u32 = 40;

const MAX_CHUNKS_KEY: &str = "max_chunks";
const DEFAULT_MAX_CHUNKS: i64 = 10;

/// A run of consecutive samples
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GForceChunk {
    pub lateral: Vec<f32>,
    pub longitudinal: Vec<f32>,
}

impl GForceChunk {
    fn with_capacity() -> Self {
        Self { lateral: Vec::with_capacity(CHUNK_SIZE), longitudinal: Vec::with_capacity(CHUNK_SIZE) }
    }

    pub fn len(&self) -> usize {
        self.lateral.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lateral.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.len() >= CHUNK_SIZE
    }

    /// Largest absolute lateral and longitudinal g in the chunk
    pub fn peaks(&self) -> (f32, f32) {
        let peak = |samples: &[f32]| samples.iter().fold(0.0f32, |acc, g| acc.max(g.abs()));
        (peak(&self.lateral), peak(&self.longitudinal))
    }
}

/// Completed chunks in a bounded ring plus the chunk being filled
#[derive(Debug, Clone)]
pub struct TraceBuffer {
    active: GForceChunk,
    chunks: VecDeque<GForceChunk>,
    max_chunks: usize,
}

impl TraceBuffer {
    pub fn new(max_chunks: usize) -> Self {
        let max_chunks = max_chunks.max(1);
        Self { active: GForceChunk::with_capacity(), chunks: VecDeque::with_capacity(max_chunks), max_chunks }
    }

    /// Add one sample; returns whether it completed a chunk
    pub fn push(&mut self, lateral: f32, longitudinal: f32) -> bool {
        self.active.lateral.push(lateral);
        self.active.longitudinal.push(longitudinal);
        if !self.active.is_full() {
            return false;
        }

        let chunk = std::mem::replace(&mut self.active, GForceChunk::with_capacity());
        if self.chunks.len() >= self.max_chunks {
            self.chunks.pop_front();
        }
        self.chunks.push_back(chunk);
        true
    }

    pub fn chunks(&self) -> impl Iterator<Item = &GForceChunk> {
        self.chunks.iter()
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Samples in the chunk being filled
    pub fn active_len(&self) -> usize {
        self.active.len()
    }

    pub fn max_chunks(&self) -> usize {
        self.max_chunks
    }

    /// Number of samples the ring can hold
    pub fn capacity(&self) -> usize {
        self.max_chunks * CHUNK_SIZE
    }
}

/// Summary of the trace at the last render
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TraceStatus {
    pub chunks: usize,
    pub max_chunks: usize,
    pub active_samples: usize,
    pub peak_lateral: f32,
    pub peak_longitudinal: f32,
}

/// Graph of lateral and longitudinal forces over time
///
/// Sampling runs on its own job at [`SAMPLE_HZ`], independent of the redraw
/// cadence; renders only summarise what was collected.
pub struct GForceTraceOverlay {
    buffer: Arc<Mutex<TraceBuffer>>,
    sampler: Option<PeriodicJob>,
    sample_hz: u32,
    status: Option<TraceStatus>,
}

impl Default for GForceTraceOverlay {
    fn default() -> Self {
        Self::new()
    }
}

impl GForceTraceOverlay {
    pub fn new() -> Self {
        Self {
            buffer: Arc::new(Mutex::new(TraceBuffer::new(DEFAULT_MAX_CHUNKS as usize))),
            sampler: None,
            sample_hz: SAMPLE_HZ,
            status: None,
        }
    }

    pub fn with_sample_hz(mut self, hz: u32) -> Self {
        self.sample_hz = hz;
        self
    }

    pub fn status(&self) -> Option<TraceStatus> {
        self.status
    }

    pub fn buffer(&self) -> TraceBuffer {
        self.buffer.lock().clone()
    }
}

impl Overlay for GForceTraceOverlay {
    fn name(&self) -> &str {
        NAME
    }

    fn size(&self) -> Size {
        Size::new(500, 250)
    }

    fn refresh_rate_hz(&self) -> Option<u32> {
        Some(18)
    }

    fn config_schema(&self) -> ConfigSchema {
        ConfigSchema::new().field(ConfigField::int(MAX_CHUNKS_KEY, DEFAULT_MAX_CHUNKS, 1, 60, 1))
    }

    fn feeds(&self) -> Feeds {
        Feeds { physics: true, ..Feeds::NONE }
    }

    fn before_start(&mut self, ctx: &OverlayContext) -> anyhow::Result<()> {
        let max_chunks = ctx.config().int(MAX_CHUNKS_KEY).unwrap_or(DEFAULT_MAX_CHUNKS);
        *self.buffer.lock() = TraceBuffer::new(usize::try_from(max_chunks)?);

        let job = PeriodicJob::from_hz("gforce-sampler", self.sample_hz)?.with_join_timeout(ctx.join_timeout());
        let view = Arc::clone(ctx.view());
        let buffer = Arc::clone(&self.buffer);
        job.run(move || {
            let Some(physics) = view.physics() else {
                return;
            };
            let mut buffer = buffer.lock();
            if buffer.push(physics.lateral_g(), physics.longitudinal_g()) {
                trace!(chunks = buffer.chunk_count(), "G-force chunk completed");
            }
        })?;
        self.sampler = Some(job);
        Ok(())
    }

    fn before_stop(&mut self) -> anyhow::Result<()> {
        if let Some(job) = self.sampler.take() {
            job.cancel_join();
        }
        Ok(())
    }

    fn render(&mut self, _view: &TelemetryView) -> anyhow::Result<()> {
        let buffer = self.buffer.lock();
        let (peak_lateral, peak_longitudinal) = buffer
            .chunks()
            .map(GForceChunk::peaks)
            .fold((0.0f32, 0.0f32), |(lat, lon), (l, g)| (lat.max(l), lon.max(g)));
        self.status = Some(TraceStatus {
            chunks: buffer.chunk_count(),
            max_chunks: buffer.max_chunks(),
            active_samples: buffer.active_len(),
            peak_lateral,
            peak_longitudinal,
        });
        Ok(())
    }
}
