//! Scratch tickets.
//!
//! The canvas tracks which pixels of the foil have been cleared. Coverage is
//! fed to a one-shot latch so that the reveal fires on the first sample at or
//! above [SCRATCH_REVEAL_THRESHOLD], however large the jump between samples.

use crate::{client::GameApi, flow::TicketFlow, reveal::Phase, Result};
use sweeps_types::{GameRoundOutcome, SCRATCH_REVEAL_THRESHOLD};
use tracing::{debug, warn};

const COVERED: u8 = u8::MAX;
const CLEARED: u8 = 0;

/// Alpha mask over the scratchable region.
#[derive(Clone, Debug)]
pub struct ScratchCanvas {
    width: u32,
    height: u32,
    alpha: Vec<u8>,
}

impl ScratchCanvas {
    /// A fully covered canvas.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            alpha: vec![COVERED; width as usize * height as usize],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Clear every pixel within `radius` of (`x`, `y`). Points outside the
    /// canvas still clear the part of the brush that overlaps it.
    pub fn scratch(&mut self, x: f64, y: f64, radius: f64) {
        if radius <= 0.0 || self.alpha.is_empty() {
            return;
        }
        let min_x = (x - radius).floor().max(0.0) as u32;
        let min_y = (y - radius).floor().max(0.0) as u32;
        let max_x = ((x + radius).ceil().max(0.0) as u32).min(self.width - 1);
        let max_y = ((y + radius).ceil().max(0.0) as u32).min(self.height - 1);
        let radius_sq = radius * radius;
        for py in min_y..=max_y {
            for px in min_x..=max_x {
                // Pixel centers
                let dx = px as f64 + 0.5 - x;
                let dy = py as f64 + 0.5 - y;
                if dx * dx + dy * dy <= radius_sq {
                    self.alpha[(py * self.width + px) as usize] = CLEARED;
                }
            }
        }
    }

    /// Fraction of transparent pixels, in `0.0..=1.0`.
    pub fn coverage(&self) -> f64 {
        if self.alpha.is_empty() {
            return 0.0;
        }
        let cleared = self.alpha.iter().filter(|&&a| a == CLEARED).count();
        cleared as f64 / self.alpha.len() as f64
    }
}

/// Edge-triggered reveal latch.
#[derive(Clone, Copy, Debug)]
pub struct ScratchProgress {
    threshold: f64,
    covered: f64,
    triggered: bool,
}

impl Default for ScratchProgress {
    fn default() -> Self {
        Self::new(SCRATCH_REVEAL_THRESHOLD)
    }
}

impl ScratchProgress {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            covered: 0.0,
            triggered: false,
        }
    }

    /// Record a coverage sample. Returns `true` exactly once: on the first
    /// sample `>= threshold` since creation or the last [Self::reset].
    pub fn observe(&mut self, fraction: f64) -> bool {
        self.covered = fraction.clamp(0.0, 1.0);
        if self.triggered || self.covered < self.threshold {
            return false;
        }
        self.triggered = true;
        true
    }

    /// Re-arm after a reveal that did not complete.
    pub fn reset(&mut self) {
        self.triggered = false;
    }

    pub fn covered(&self) -> f64 {
        self.covered
    }

    pub fn is_triggered(&self) -> bool {
        self.triggered
    }
}

/// A purchased scratch ticket: canvas, latch and reveal flow together.
pub struct ScratchCard<'a, A: GameApi> {
    flow: TicketFlow<'a, A>,
    canvas: ScratchCanvas,
    progress: ScratchProgress,
}

impl<'a, A: GameApi> ScratchCard<'a, A> {
    pub fn new(flow: TicketFlow<'a, A>, canvas: ScratchCanvas) -> Self {
        Self::with_threshold(flow, canvas, SCRATCH_REVEAL_THRESHOLD)
    }

    pub fn with_threshold(flow: TicketFlow<'a, A>, canvas: ScratchCanvas, threshold: f64) -> Self {
        Self {
            flow,
            canvas,
            progress: ScratchProgress::new(threshold),
        }
    }

    pub fn flow(&self) -> &TicketFlow<'a, A> {
        &self.flow
    }

    pub fn canvas(&self) -> &ScratchCanvas {
        &self.canvas
    }

    pub fn progress(&self) -> &ScratchProgress {
        &self.progress
    }

    /// Apply one brush stroke and feed the resulting coverage to the latch.
    pub async fn scratch(
        &mut self,
        x: f64,
        y: f64,
        radius: f64,
    ) -> Result<Option<GameRoundOutcome>> {
        self.canvas.scratch(x, y, radius);
        let coverage = self.canvas.coverage();
        self.on_coverage(coverage).await
    }

    /// Sweep `brush`-sized strokes row by row across the canvas until the
    /// latch fires. `None` if the canvas clears without a reveal.
    pub async fn scratch_off(&mut self, brush: f64) -> Result<Option<GameRoundOutcome>> {
        let step = (brush.floor() as usize).max(1);
        for y in (0..self.canvas.height()).step_by(step) {
            for x in (0..self.canvas.width()).step_by(step) {
                let (cx, cy) = (x as f64 + 0.5, y as f64 + 0.5);
                if let Some(outcome) = self.scratch(cx, cy, brush).await? {
                    debug!(coverage = self.canvas.coverage(), "foil scratched");
                    return Ok(Some(outcome));
                }
            }
        }
        Ok(None)
    }

    /// Feed a coverage sample. Returns the outcome on the sample that
    /// triggers the reveal and `None` on every other sample.
    ///
    /// Samples are only latched while the ticket is purchased and unrevealed.
    pub async fn on_coverage(&mut self, fraction: f64) -> Result<Option<GameRoundOutcome>> {
        if self.flow.phase() != Phase::Purchased {
            debug!(fraction, phase = %self.flow.phase(), "coverage ignored");
            return Ok(None);
        }
        if !self.progress.observe(fraction) {
            return Ok(None);
        }
        debug!(fraction, "scratch threshold reached");
        match self.flow.reveal().await {
            Ok(outcome) => Ok(Some(outcome)),
            Err(err) => {
                // Outcome unknown; the next sample may try again
                warn!(?err, "scratch reveal failed");
                self.progress.reset();
                Err(err)
            }
        }
    }
}
