//! Placement of missing replicas.

pub mod planner;

pub use planner::{DEFAULT_WEIGHT, deficit, plan, plan_with_rng};

use crate::peer::Peer;

/// Destinations chosen for one torrent in one cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct PlacementDecision {
    pub info_hash: String,
    pub destinations: Vec<Peer>,
}

impl PlacementDecision {
    pub fn is_empty(&self) -> bool {
        self.destinations.is_empty()
    }
}
