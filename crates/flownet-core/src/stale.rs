use crate::grid::{GridPosition, TileRect};
use std::collections::VecDeque;

/// Batches topology changes between ticks.
///
/// Every change to an entity carrying flow components enqueues the
/// entity's bounds grown by one tile (so neighbors get re-shaped too) and
/// requests a full network recompute. The engine drains both on its next
/// tick.
#[derive(Debug, Clone, Default)]
pub struct StaleAreaScheduler {
    areas: VecDeque<TileRect>,
    full_recompute: bool,
}

impl StaleAreaScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a change to an entity occupying `bounds`.
    pub fn mark_entity(&mut self, bounds: TileRect) {
        self.mark_area(bounds.expand(1));
        self.full_recompute = true;
    }

    /// Queue a rectangle for re-orientation only.
    pub fn mark_area(&mut self, rect: TileRect) {
        // Back-to-back signals for the same entity produce the same rect.
        if self.areas.back() != Some(&rect) {
            self.areas.push_back(rect);
        }
    }

    pub fn request_full_recompute(&mut self) {
        self.full_recompute = true;
    }

    pub fn needs_full_recompute(&self) -> bool {
        self.full_recompute
    }

    /// Clear the recompute flag, returning whether it was set.
    pub fn take_full_recompute(&mut self) -> bool {
        std::mem::take(&mut self.full_recompute)
    }

    /// Remove and return every queued rectangle in signal order.
    pub fn drain_areas(&mut self) -> Vec<TileRect> {
        self.areas.drain(..).collect()
    }

    pub fn pending_areas(&self) -> usize {
        self.areas.len()
    }

    /// Whether a queued rectangle covers `pos`.
    pub fn is_stale(&self, pos: GridPosition) -> bool {
        self.areas.iter().any(|rect| rect.contains(pos))
    }

    pub fn is_clean(&self) -> bool {
        !self.full_recompute && self.areas.is_empty()
    }

    pub fn clear(&mut self) {
        self.areas.clear();
        self.full_recompute = false;
    }
}
