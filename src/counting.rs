// src/counting.rs

use serde::Serialize;
use std::collections::BTreeMap;

/// Emitted exactly once per track identity, the first frame it is observed.
/// Immutable once emitted.
#[derive(Debug, Clone, Serialize)]
pub struct FirstSeenEvent {
    pub vehicle_id: u32,
    pub lane: u32,
    pub frames_seen: u64,
    pub first_frame: u64,
    pub first_timestamp_seconds: f64,
}

/// Write-once lane assignment per track id plus per-lane running totals.
/// Once a track's lane is recorded it never changes, even if the centroid
/// later crosses into another region; the recorded lane is what downstream
/// consumers display.
pub struct CountingLedger {
    assigned: BTreeMap<u32, u32>,
    counts: BTreeMap<u32, u64>,
}

impl CountingLedger {
    pub fn new(lane_count: u32) -> Self {
        let counts = (1..=lane_count.max(3)).map(|lane| (lane, 0)).collect();
        Self {
            assigned: BTreeMap::new(),
            counts,
        }
    }

    /// Freeze `candidate_lane` for a track the first time it shows up and
    /// return its one-time event; later observations are no-ops.
    pub fn observe(
        &mut self,
        track_id: u32,
        candidate_lane: u32,
        frames_seen: u64,
        first_frame: u64,
        fps: f64,
    ) -> Option<FirstSeenEvent> {
        if self.assigned.contains_key(&track_id) {
            return None;
        }
        self.assigned.insert(track_id, candidate_lane);
        *self.counts.entry(candidate_lane).or_insert(0) += 1;
        Some(FirstSeenEvent {
            vehicle_id: track_id,
            lane: candidate_lane,
            frames_seen,
            first_frame,
            first_timestamp_seconds: first_frame as f64 / fps,
        })
    }

    /// The frozen lane for a track, if it has ever been observed.
    pub fn lane_of(&self, track_id: u32) -> Option<u32> {
        self.assigned.get(&track_id).copied()
    }

    pub fn counts(&self) -> &BTreeMap<u32, u64> {
        &self.counts
    }

    pub fn total_counted(&self) -> u64 {
        self.counts.values().sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::CentroidTracker;
    use crate::types::BoundingBox;

    #[test]
    fn test_first_observation_emits_event_and_counts() {
        let mut ledger = CountingLedger::new(3);
        let event = ledger.observe(1, 2, 1, 10, 25.0).unwrap();

        assert_eq!(event.vehicle_id, 1);
        assert_eq!(event.lane, 2);
        assert_eq!(event.frames_seen, 1);
        assert_eq!(event.first_frame, 10);
        assert!((event.first_timestamp_seconds - 0.4).abs() < 1e-9);
        assert_eq!(ledger.counts()[&2], 1);
        assert_eq!(ledger.lane_of(1), Some(2));
    }

    #[test]
    fn test_lane_is_frozen_on_first_sighting() {
        let mut ledger = CountingLedger::new(3);
        ledger.observe(7, 1, 1, 1, 30.0).unwrap();

        // Centroid drifted into lane 3: no event, no recount, lane stays 1.
        assert!(ledger.observe(7, 3, 2, 1, 30.0).is_none());
        assert_eq!(ledger.lane_of(7), Some(1));
        assert_eq!(ledger.counts()[&1], 1);
        assert_eq!(ledger.counts()[&3], 0);
        assert_eq!(ledger.total_counted(), 1);
    }

    #[test]
    fn test_counts_initialized_for_all_known_lanes() {
        let ledger = CountingLedger::new(5);
        assert_eq!(ledger.counts().len(), 5);
        assert!(ledger.counts().values().all(|&c| c == 0));

        // Never fewer than the three default bands.
        let ledger = CountingLedger::new(1);
        assert_eq!(ledger.counts().len(), 3);
    }

    #[test]
    fn test_conservation_over_a_run() {
        // Sum of lane counts must equal the number of distinct track ids the
        // tracker ever created, however tracks appear and die.
        let mut tracker = CentroidTracker::new(1, 50.0).unwrap();
        let mut ledger = CountingLedger::new(3);

        let frames: Vec<Vec<BoundingBox>> = vec![
            vec![[0.0, 0.0, 10.0, 10.0]],
            vec![[0.0, 0.0, 10.0, 10.0], [200.0, 0.0, 210.0, 10.0]],
            vec![],
            vec![],
            vec![[400.0, 0.0, 410.0, 10.0]],
            vec![],
        ];

        let mut events = 0u64;
        for (i, boxes) in frames.iter().enumerate() {
            let objects = tracker.update(boxes, i as u64 + 1);
            for (&id, &centroid) in &objects {
                let lane = if centroid.0 < 100.0 {
                    1
                } else if centroid.0 < 300.0 {
                    2
                } else {
                    3
                };
                let track = tracker.track(id).unwrap();
                if ledger
                    .observe(id, lane, track.frames_seen, track.first_frame, 25.0)
                    .is_some()
                {
                    events += 1;
                }
            }
        }

        assert_eq!(tracker.total_registered(), 3);
        assert_eq!(events, 3);
        assert_eq!(ledger.total_counted(), 3);
    }

    #[test]
    fn test_no_detections_no_events() {
        let mut tracker = CentroidTracker::new(2, 50.0).unwrap();
        let mut ledger = CountingLedger::new(3);
        for frame in 1..=20 {
            let objects = tracker.update(&[], frame);
            assert!(objects.is_empty());
        }
        assert_eq!(ledger.total_counted(), 0);
        assert_eq!(tracker.total_registered(), 0);
    }
}
