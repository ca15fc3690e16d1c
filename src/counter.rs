// src/counter.rs

use crate::calibration::Calibration;
use crate::crossing::{CrossingDetector, CrossingEvent};
use crate::occupancy::{self, ZoneActivation};
use crate::types::PixelFrame;
use tracing::info;

/// Everything one measurement cycle produced.
pub struct CycleResult {
    pub activation: ZoneActivation,
    pub event: Option<CrossingEvent>,
    /// Set when the count changed since the last published value.
    /// Publication is edge-triggered, not per-cycle.
    pub publish: Option<u32>,
}

/// Owns the calibration output and the crossing state for one doorway.
///
/// Exactly one cycle runs at a time: the calibration fields are immutable
/// after construction and the detector is mutated only here.
pub struct PeopleCounter {
    calibration: Calibration,
    detector: CrossingDetector,
    last_published: Option<u32>,
}

impl PeopleCounter {
    pub fn new(calibration: Calibration) -> Self {
        let edges = calibration.edges();
        info!(
            "✓ Counter ready: {} zone(s) available, entry zone {}, exit zone {}",
            calibration.available_zone_count(),
            edges.entry_zone,
            edges.exit_zone
        );
        Self {
            calibration,
            detector: CrossingDetector::new(edges),
            last_published: None,
        }
    }

    /// Run one measurement cycle: evaluate zone occupancy, advance the
    /// crossing state machine, and decide whether the count needs
    /// publishing.
    ///
    /// The first cycle always publishes so downstream nodes learn the
    /// starting count.
    pub fn process_frame(&mut self, frame: &PixelFrame, frame_id: u64) -> CycleResult {
        let activation = occupancy::evaluate(frame, &self.calibration);
        let event = self
            .detector
            .update(&activation, frame_id, frame.timestamp_ms);

        let count = self.detector.count();
        let publish = if self.last_published != Some(count) {
            self.last_published = Some(count);
            Some(count)
        } else {
            None
        };

        CycleResult {
            activation,
            event,
            publish,
        }
    }

    pub fn count(&self) -> u32 {
        self.detector.count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crossing::Direction;
    use crate::types::{PIXELS_PER_ZONE, PIXEL_COUNT};

    const TRIGGER: i32 = 1500;
    const BASELINE_MM: i32 = 1000;
    const PERSON_MM: i32 = 500;

    fn counter() -> PeopleCounter {
        let baseline = PixelFrame::from_distances([BASELINE_MM; PIXEL_COUNT], 0.0);
        let calibration = Calibration::from_baseline(&baseline, TRIGGER).unwrap();
        PeopleCounter::new(calibration)
    }

    /// A live frame with a person over the given zones.
    fn frame_with_person(zones: &[usize], timestamp_ms: f64) -> PixelFrame {
        let mut distances = [BASELINE_MM; PIXEL_COUNT];
        for &zone in zones {
            // One occupied pixel is enough to trigger the whole line
            distances[zone * PIXELS_PER_ZONE + 1] = PERSON_MM;
        }
        PixelFrame::from_distances(distances, timestamp_ms)
    }

    #[test]
    fn test_first_cycle_publishes_starting_count() {
        let mut counter = counter();
        let result = counter.process_frame(&frame_with_person(&[], 33.0), 1);

        assert_eq!(result.publish, Some(0));
        assert!(result.event.is_none());
    }

    #[test]
    fn test_publication_is_edge_triggered() {
        let mut counter = counter();

        let first = counter.process_frame(&frame_with_person(&[], 33.0), 1);
        assert_eq!(first.publish, Some(0));

        // Count unchanged → nothing to publish
        let second = counter.process_frame(&frame_with_person(&[], 66.0), 2);
        assert!(second.publish.is_none());
    }

    #[test]
    fn test_end_to_end_entry() {
        let mut counter = counter();
        let walk: &[&[usize]] = &[
            &[],     // doorway empty
            &[0],    // person on the entry line
            &[0, 1], // moving inward
            &[1, 2],
            &[2, 3], // entry line clear, exit line occupied → entry completes
            &[3],
            &[], // gone
        ];

        let mut events = Vec::new();
        for (frame_id, zones) in walk.iter().enumerate() {
            let result = counter.process_frame(
                &frame_with_person(zones, frame_id as f64 * 33.0),
                frame_id as u64,
            );
            if let Some(event) = result.event {
                events.push(event);
            }
        }

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].direction, Direction::Entry);
        assert_eq!(events[0].count_after, 1);
        assert_eq!(counter.count(), 1);
    }

    #[test]
    fn test_end_to_end_entry_then_exit() {
        let mut counter = counter();
        let walk: &[&[usize]] = &[
            &[0],
            &[0, 3],
            &[3], // entry completes
            &[],
            &[3],
            &[0, 3],
            &[0], // exit completes
            &[],
        ];

        let mut directions = Vec::new();
        for (frame_id, zones) in walk.iter().enumerate() {
            let result = counter.process_frame(
                &frame_with_person(zones, frame_id as f64 * 33.0),
                frame_id as u64,
            );
            if let Some(event) = result.event {
                directions.push(event.direction);
            }
        }

        assert_eq!(directions, vec![Direction::Entry, Direction::Exit]);
        assert_eq!(counter.count(), 0);
    }

    #[test]
    fn test_count_change_publishes_once() {
        let mut counter = counter();

        counter.process_frame(&frame_with_person(&[], 0.0), 0);
        counter.process_frame(&frame_with_person(&[0], 33.0), 1);
        let completing = counter.process_frame(&frame_with_person(&[3], 66.0), 2);

        assert_eq!(completing.publish, Some(1));

        // Person still on the exit line next cycle: count unchanged
        let holding = counter.process_frame(&frame_with_person(&[3], 99.0), 3);
        assert!(holding.publish.is_none());
    }

    #[test]
    fn test_exit_with_empty_doorway_never_goes_negative() {
        let mut counter = counter();
        let walk: &[&[usize]] = &[&[3], &[0, 3], &[0], &[]];

        for (frame_id, zones) in walk.iter().enumerate() {
            let result = counter.process_frame(
                &frame_with_person(zones, frame_id as f64 * 33.0),
                frame_id as u64,
            );
            assert!(result.event.is_none());
        }
        assert_eq!(counter.count(), 0);
    }
}
