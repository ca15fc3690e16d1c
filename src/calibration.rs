// src/calibration.rs
//
// One-shot baseline calibration. A single frame captured while the doorway
// is known to be empty yields:
//   - a per-pixel occupancy threshold (live reading strictly below it = occupied)
//   - a per-zone availability flag (a fully near-blocked line is unusable)
//   - the two edge zones used for direction inference
//
// The result is immutable for the rest of the run. Recalibration means
// restarting the pipeline.

use crate::types::{PixelFrame, PIXELS_PER_ZONE, PIXEL_COUNT, ZONE_COUNT};
use anyhow::Result;
use tracing::{info, warn};

/// Live readings must come in at least this far below the baseline before a
/// pixel counts as occupied.
pub const NOISE_MARGIN_MM: i32 = 200;

/// Baselines at or below this are a fixed obstruction in the near field;
/// the pixel is disabled instead of thresholded.
pub const NEAR_FIELD_CUTOFF_MM: i32 = 200;

/// Threshold assigned to disabled pixels. No valid positive reading can
/// fall strictly below 1 mm, so the pixel never triggers.
pub const DISABLED_THRESHOLD_MM: i32 = 1;

/// Losing more zones than this leaves too few sensing lines to monitor the
/// doorway.
pub const MAX_UNAVAILABLE_ZONES: usize = 2;

/// The two available zones furthest apart, used as the entry-side and
/// exit-side sensing lines. They coincide when only one zone survived
/// calibration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DoorwayEdges {
    pub entry_zone: usize,
    pub exit_zone: usize,
}

/// Immutable output of baseline calibration.
#[derive(Debug, Clone)]
pub struct Calibration {
    thresholds: [i32; PIXEL_COUNT],
    available: [bool; ZONE_COUNT],
    edges: DoorwayEdges,
}

impl Calibration {
    /// Derive thresholds, zone availability and doorway edges from a
    /// baseline frame.
    ///
    /// Fails when more than `MAX_UNAVAILABLE_ZONES` zones are fully
    /// near-blocked: the doorway geometry cannot be monitored and the
    /// runtime loop must not be entered. That requires physical
    /// reconfiguration, not a retry.
    pub fn from_baseline(frame: &PixelFrame, trigger_distance_mm: i32) -> Result<Self> {
        let mut thresholds = [0; PIXEL_COUNT];
        for (zone, pixels) in frame.iter_zones() {
            for (slot, reading) in pixels.iter().enumerate() {
                thresholds[zone * PIXELS_PER_ZONE + slot] =
                    derive_threshold(reading.effective_distance_mm(), trigger_distance_mm);
            }
        }

        let mut available = [true; ZONE_COUNT];
        let mut unavailable_zones = 0;
        for zone in 0..ZONE_COUNT {
            let all_disabled = (0..PIXELS_PER_ZONE)
                .all(|slot| thresholds[zone * PIXELS_PER_ZONE + slot] == DISABLED_THRESHOLD_MM);
            if all_disabled {
                available[zone] = false;
                unavailable_zones += 1;
            }
        }

        if unavailable_zones > MAX_UNAVAILABLE_ZONES {
            anyhow::bail!(
                "only {} of {} zones available, not enough sensing lines to monitor the doorway",
                ZONE_COUNT - unavailable_zones,
                ZONE_COUNT
            );
        }

        let edges = find_edges(&available);
        if edges.entry_zone == edges.exit_zone {
            warn!(
                "⚠️  Single available zone ({}): entry/exit direction cannot be inferred",
                edges.entry_zone
            );
        }

        Ok(Self {
            thresholds,
            available,
            edges,
        })
    }

    /// Occupancy threshold for one pixel, in mm. Always in
    /// `[DISABLED_THRESHOLD_MM, trigger_distance_mm]`.
    pub fn threshold(&self, zone: usize, slot: usize) -> i32 {
        self.thresholds[zone * PIXELS_PER_ZONE + slot]
    }

    pub fn is_zone_available(&self, zone: usize) -> bool {
        self.available[zone]
    }

    pub fn available_zone_count(&self) -> usize {
        self.available.iter().filter(|a| **a).count()
    }

    pub fn edges(&self) -> DoorwayEdges {
        self.edges
    }

    /// Log the derived threshold grid and edge zones, one row per zone.
    pub fn log_summary(&self) {
        info!("Zone thresholds (mm):");
        for zone in 0..ZONE_COUNT {
            info!(
                "  zone {}: {:4} {:4} {:4} {:4}{}",
                zone,
                self.threshold(zone, 0),
                self.threshold(zone, 1),
                self.threshold(zone, 2),
                self.threshold(zone, 3),
                if self.available[zone] { "" } else { "  (unavailable)" }
            );
        }
        info!(
            "Entry zone: {}, exit zone: {}",
            self.edges.entry_zone, self.edges.exit_zone
        );
    }
}

/// Threshold rule for one baseline distance.
fn derive_threshold(baseline_mm: i32, trigger_distance_mm: i32) -> i32 {
    if baseline_mm > NEAR_FIELD_CUTOFF_MM && baseline_mm < trigger_distance_mm + 100 {
        // Occupancy must reduce the distance by the noise margin.
        baseline_mm - NOISE_MARGIN_MM
    } else if baseline_mm <= NEAR_FIELD_CUTOFF_MM {
        DISABLED_THRESHOLD_MM
    } else {
        trigger_distance_mm
    }
}

/// Entry = lowest available index, exit = highest. The geometric extremes
/// of the available set give the best temporal separation for direction
/// inference.
fn find_edges(available: &[bool; ZONE_COUNT]) -> DoorwayEdges {
    let mut entry_zone = ZONE_COUNT - 1;
    let mut exit_zone = 0;
    for (zone, ok) in available.iter().enumerate() {
        if *ok {
            if zone < entry_zone {
                entry_zone = zone;
            }
            if zone > exit_zone {
                exit_zone = zone;
            }
        }
    }
    DoorwayEdges {
        entry_zone,
        exit_zone,
    }
}
