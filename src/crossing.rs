// src/crossing.rs
//
// Entry/exit crossing detection over the two edge zones.
//
// A full crossing is inferred from the temporal order in which the two edge
// zones transition, not from simultaneous occupancy: a person may dwell in
// the doorway as long as they eventually clear one edge before the other.
// Each half-crossing latches an "arm" flag; the complementary transition
// completes it and moves the count. An all-clear cycle disarms both flags so
// stale arming cannot turn later noise into a phantom count.

use crate::calibration::DoorwayEdges;
use crate::occupancy::{ZoneActivation, ZoneOccupancy};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

// ============================================================================
// TYPES
// ============================================================================

/// Direction of a completed crossing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Entry,
    Exit,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Entry => "ENTRY",
            Self::Exit => "EXIT",
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A completed crossing, emitted once per count change.
#[derive(Debug, Clone, Serialize)]
pub struct CrossingEvent {
    pub direction: Direction,
    /// Occupancy count after this crossing was applied.
    pub count_after: u32,
    pub frame_id: u64,
    pub timestamp_ms: f64,
}

// ============================================================================
// CROSSING DETECTOR
// ============================================================================

/// Two latched arm flags plus the running count.
///
/// Both flags start disarmed: calibration happens with the doorway
/// confirmed empty, so nobody is mid-crossing at startup.
pub struct CrossingDetector {
    edges: DoorwayEdges,
    entry_armed: bool,
    exit_armed: bool,
    count: u32,
}

impl CrossingDetector {
    pub fn new(edges: DoorwayEdges) -> Self {
        Self {
            edges,
            entry_armed: false,
            exit_armed: false,
            count: 0,
        }
    }

    /// Apply one cycle's zone occupancy. Returns an event when a crossing
    /// completed and the count moved.
    ///
    /// Pure state transformation, no failure path. The one
    /// fatal condition (too few available zones) is raised upstream at
    /// calibration time.
    pub fn update(
        &mut self,
        activation: &ZoneActivation,
        frame_id: u64,
        timestamp_ms: f64,
    ) -> Option<CrossingEvent> {
        let entry = activation.zone(self.edges.entry_zone);
        let exit = activation.zone(self.edges.exit_zone);

        let mut event = None;

        match (entry, exit) {
            (ZoneOccupancy::Clear, ZoneOccupancy::Triggered) => {
                if self.entry_armed {
                    // Second half of an entry: the person cleared the
                    // entry-side line and now occupies the exit-side line.
                    self.count += 1;
                    self.entry_armed = false;
                    self.exit_armed = true;
                    event = Some(self.emit(Direction::Entry, frame_id, timestamp_ms));
                } else {
                    // First half of an exit-side approach; arm for a
                    // completion on the entry side.
                    self.exit_armed = true;
                }
            }
            (ZoneOccupancy::Triggered, ZoneOccupancy::Clear) => {
                if self.exit_armed && self.count > 0 {
                    self.count -= 1;
                    self.exit_armed = false;
                    self.entry_armed = true;
                    event = Some(self.emit(Direction::Exit, frame_id, timestamp_ms));
                } else {
                    // Covers both the unarmed case and an armed exit with
                    // nobody counted: the decrement is suppressed at zero,
                    // but the entry side stays armed for a turn-around.
                    self.entry_armed = true;
                }
            }
            _ => {}
        }

        // Doorway empty: drop any half-observed crossing. Bounds how long a
        // stale arm can persist.
        if activation.is_idle() {
            if self.entry_armed || self.exit_armed {
                debug!("Doorway idle, disarming (frame {})", frame_id);
            }
            self.entry_armed = false;
            self.exit_armed = false;
        }

        event
    }

    fn emit(&self, direction: Direction, frame_id: u64, timestamp_ms: f64) -> CrossingEvent {
        info!(
            "🚪 {} at {:.2}s (frame {}) → occupancy {}",
            direction,
            timestamp_ms / 1000.0,
            frame_id,
            self.count
        );
        CrossingEvent {
            direction,
            count_after: self.count,
            frame_id,
            timestamp_ms,
        }
    }

    /// Current occupancy count. Never goes negative.
    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn entry_armed(&self) -> bool {
        self.entry_armed
    }

    pub fn exit_armed(&self) -> bool {
        self.exit_armed
    }

    #[cfg(test)]
    fn with_state(edges: DoorwayEdges, entry_armed: bool, exit_armed: bool, count: u32) -> Self {
        Self {
            edges,
            entry_armed,
            exit_armed,
            count,
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
