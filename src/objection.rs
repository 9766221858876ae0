//! Objections: the "work still pending" signal read during READY_TO_END.

use dashmap::DashMap;

use crate::phase::PhaseNode;

/// Answers whether activity is still pending against a phase.
pub trait ObjectionQuery: Send + Sync {
    /// Returns `true` while any objection is raised against `phase`.
    fn objections_pending(&self, phase: &PhaseNode) -> bool;
}

/// Query that never reports pending objections.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoObjections;

impl ObjectionQuery for NoObjections {
    fn objections_pending(&self, _phase: &PhaseNode) -> bool {
        false
    }
}

impl<F> ObjectionQuery for F
where
    F: Fn(&PhaseNode) -> bool + Send + Sync,
{
    fn objections_pending(&self, phase: &PhaseNode) -> bool {
        self(phase)
    }
}

/// Concurrent objection counter keyed by phase name.
#[derive(Debug, Default)]
pub struct Objections {
    counts: DashMap<String, u64>,
}

impl Objections {
    /// Creates an empty counter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Raises `count` objections against `phase` and returns the new total.
    pub fn raise(&self, phase: &PhaseNode, count: u64) -> u64 {
        let mut total = self.counts.entry(phase.name().to_owned()).or_insert(0);
        *total = total.saturating_add(count);
        *total
    }

    /// Drops up to `count` objections against `phase` and returns the new
    /// total. Dropping more than were raised stops at zero.
    pub fn drop_objection(&self, phase: &PhaseNode, count: u64) -> u64 {
        self.counts.get_mut(phase.name()).map_or(0, |mut total| {
            *total = total.saturating_sub(count);
            *total
        })
    }

    /// Returns the number of objections raised against `phase`.
    #[must_use]
    pub fn count(&self, phase: &PhaseNode) -> u64 {
        self.counts.get(phase.name()).map_or(0, |total| *total)
    }
}

impl ObjectionQuery for Objections {
    fn objections_pending(&self, phase: &PhaseNode) -> bool {
        self.count(phase) > 0
    }
}
