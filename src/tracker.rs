// src/tracker.rs

use crate::types::{centroid_of, BoundingBox, Centroid};
use anyhow::{bail, Result};
use std::collections::{BTreeMap, HashSet};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct Track {
    pub id: u32,
    pub centroid: Centroid,
    pub missed_frames: u32,
    pub first_frame: u64,
    pub frames_seen: u64,
}

/// Frame-sequential identity tracker: greedy nearest-neighbor matching of
/// detection centroids against live tracks. Track ids start at 1, increase
/// monotonically and are never reused; an object that disappears past
/// `max_disappeared` and comes back gets a fresh identity.
pub struct CentroidTracker {
    tracks: BTreeMap<u32, Track>,
    next_id: u32,
    max_disappeared: u32,
    max_distance: f32,
}

impl CentroidTracker {
    pub fn new(max_disappeared: i64, max_distance: f64) -> Result<Self> {
        if max_disappeared < 0 {
            bail!("max_disappeared must be >= 0, got {}", max_disappeared);
        }
        if !max_distance.is_finite() || max_distance <= 0.0 {
            bail!("max_distance must be a positive number, got {}", max_distance);
        }
        Ok(Self {
            tracks: BTreeMap::new(),
            next_id: 1,
            max_disappeared: max_disappeared as u32,
            max_distance: max_distance as f32,
        })
    }

    /// Reconcile the current frame's detections against live tracks and
    /// return the active (id, centroid) set. Callers must feed frames in
    /// order; the missed-frame accounting depends on it.
    pub fn update(
        &mut self,
        boxes: &[BoundingBox],
        frame_index: u64,
    ) -> BTreeMap<u32, Centroid> {
        let centroids: Vec<Centroid> = boxes.iter().map(centroid_of).collect();

        if self.tracks.is_empty() {
            for &centroid in &centroids {
                self.register(centroid, frame_index);
            }
            return self.active();
        }

        if centroids.is_empty() {
            self.age_unmatched(&HashSet::new());
            return self.active();
        }

        // Full pairwise distance matrix, sorted so the globally closest pair
        // comes first. Equal distances fall back to ascending track id, then
        // detection index, keeping the match order deterministic.
        let mut pairs: Vec<(f32, u32, usize)> =
            Vec::with_capacity(self.tracks.len() * centroids.len());
        for (&id, track) in &self.tracks {
            for (det_idx, &(cx, cy)) in centroids.iter().enumerate() {
                let dx = track.centroid.0 - cx;
                let dy = track.centroid.1 - cy;
                pairs.push(((dx * dx + dy * dy).sqrt(), id, det_idx));
            }
        }
        pairs.sort_by(|a, b| {
            a.0.total_cmp(&b.0)
                .then(a.1.cmp(&b.1))
                .then(a.2.cmp(&b.2))
        });

        let mut matched_tracks: HashSet<u32> = HashSet::new();
        let mut used_detections = vec![false; centroids.len()];

        for (distance, id, det_idx) in pairs {
            // Sorted order: once the smallest remaining distance is out of
            // range, every later pair is too.
            if distance > self.max_distance {
                break;
            }
            if matched_tracks.contains(&id) || used_detections[det_idx] {
                continue;
            }
            if let Some(track) = self.tracks.get_mut(&id) {
                track.centroid = centroids[det_idx];
                track.missed_frames = 0;
                track.frames_seen += 1;
            }
            matched_tracks.insert(id);
            used_detections[det_idx] = true;
        }

        self.age_unmatched(&matched_tracks);

        for (det_idx, &centroid) in centroids.iter().enumerate() {
            if !used_detections[det_idx] {
                self.register(centroid, frame_index);
            }
        }

        self.active()
    }

    pub fn track(&self, id: u32) -> Option<&Track> {
        self.tracks.get(&id)
    }

    pub fn active_count(&self) -> usize {
        self.tracks.len()
    }

    /// Number of distinct identities ever created.
    pub fn total_registered(&self) -> u64 {
        u64::from(self.next_id) - 1
    }

    fn register(&mut self, centroid: Centroid, frame_index: u64) {
        let id = self.next_id;
        self.next_id += 1;
        debug!("registering track {} at ({:.1}, {:.1})", id, centroid.0, centroid.1);
        self.tracks.insert(
            id,
            Track {
                id,
                centroid,
                missed_frames: 0,
                first_frame: frame_index,
                frames_seen: 1,
            },
        );
    }

    /// Bump the missed counter on every unmatched track and drop the ones
    /// past the threshold. Strict `>`: a track survives exactly
    /// `max_disappeared` consecutive missed frames.
    fn age_unmatched(&mut self, matched: &HashSet<u32>) {
        let max_disappeared = self.max_disappeared;
        self.tracks.retain(|id, track| {
            if matched.contains(id) {
                return true;
            }
            track.missed_frames += 1;
            let keep = track.missed_frames <= max_disappeared;
            if !keep {
                debug!(
                    "deregistering track {} after {} missed frames",
                    id, track.missed_frames
                );
            }
            keep
        });
    }

    fn active(&self) -> BTreeMap<u32, Centroid> {
        self.tracks
            .iter()
            .map(|(&id, track)| (id, track.centroid))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bbox_at(cx: f32, cy: f32) -> BoundingBox {
        [cx - 5.0, cy - 5.0, cx + 5.0, cy + 5.0]
    }

    #[test]
    fn test_rejects_bad_thresholds() {
        assert!(CentroidTracker::new(-1, 80.0).is_err());
        assert!(CentroidTracker::new(30, 0.0).is_err());
        assert!(CentroidTracker::new(30, -5.0).is_err());
        assert!(CentroidTracker::new(30, f64::NAN).is_err());
        assert!(CentroidTracker::new(0, 80.0).is_ok());
    }

    #[test]
    fn test_registers_detections_on_empty_tracker() {
        let mut tracker = CentroidTracker::new(2, 50.0).unwrap();
        let objects = tracker.update(&[bbox_at(10.0, 10.0), bbox_at(200.0, 40.0)], 1);

        assert_eq!(objects.len(), 2);
        assert_eq!(objects[&1], (10.0, 10.0));
        assert_eq!(objects[&2], (200.0, 40.0));
        assert_eq!(tracker.track(1).unwrap().first_frame, 1);
        assert_eq!(tracker.track(1).unwrap().frames_seen, 1);
    }

    #[test]
    fn test_matches_nearby_detection_to_existing_track() {
        let mut tracker = CentroidTracker::new(2, 50.0).unwrap();
        tracker.update(&[bbox_at(10.0, 10.0)], 1);
        let objects = tracker.update(&[bbox_at(20.0, 12.0)], 2);

        assert_eq!(objects.len(), 1);
        assert_eq!(objects[&1], (20.0, 12.0));
        assert_eq!(tracker.track(1).unwrap().frames_seen, 2);
        assert_eq!(tracker.track(1).unwrap().missed_frames, 0);
    }

    #[test]
    fn test_distant_detection_becomes_new_track() {
        let mut tracker = CentroidTracker::new(2, 50.0).unwrap();
        tracker.update(&[bbox_at(10.0, 10.0)], 1);
        let objects = tracker.update(&[bbox_at(500.0, 10.0)], 2);

        // Track 1 goes unmatched, the far detection gets a fresh id.
        assert_eq!(objects.len(), 2);
        assert_eq!(objects[&1], (10.0, 10.0));
        assert_eq!(objects[&2], (500.0, 10.0));
        assert_eq!(tracker.track(1).unwrap().missed_frames, 1);
    }

    #[test]
    fn test_disappearance_boundary_scenario() {
        // max_disappeared = 2: survives frames 2 and 3 without detections,
        // deregistered on frame 4, and a reappearance gets a new id.
        let mut tracker = CentroidTracker::new(2, 50.0).unwrap();
        tracker.update(&[bbox_at(10.0, 10.0)], 1);

        let objects = tracker.update(&[], 2);
        assert_eq!(objects.len(), 1);
        assert_eq!(tracker.track(1).unwrap().missed_frames, 1);

        let objects = tracker.update(&[], 3);
        assert_eq!(objects.len(), 1);
        assert_eq!(tracker.track(1).unwrap().missed_frames, 2);

        let objects = tracker.update(&[], 4);
        assert!(objects.is_empty());

        let objects = tracker.update(&[bbox_at(10.0, 10.0)], 5);
        assert_eq!(objects.len(), 1);
        assert!(objects.contains_key(&2));
        assert!(!objects.contains_key(&1));
        assert_eq!(tracker.track(2).unwrap().first_frame, 5);
    }

    #[test]
    fn test_ids_are_monotonic_and_never_reused() {
        let mut tracker = CentroidTracker::new(0, 50.0).unwrap();
        tracker.update(&[bbox_at(10.0, 10.0)], 1);
        tracker.update(&[], 2); // track 1 dropped (max_disappeared = 0)
        tracker.update(&[bbox_at(10.0, 10.0), bbox_at(300.0, 10.0)], 3);

        let ids: Vec<u32> = tracker.update(&[], 4).keys().copied().collect();
        assert!(ids.is_empty());
        assert_eq!(tracker.total_registered(), 3);
    }

    #[test]
    fn test_greedy_matching_prefers_globally_closest_pair() {
        let mut tracker = CentroidTracker::new(2, 100.0).unwrap();
        tracker.update(&[bbox_at(0.0, 0.0), bbox_at(50.0, 0.0)], 1);

        // Both candidate pairs sit at distance 10; track 1 binds the x=10
        // detection first, leaving the x=40 detection for track 2.
        let objects = tracker.update(&[bbox_at(40.0, 0.0), bbox_at(10.0, 0.0)], 2);
        assert_eq!(objects[&2], (40.0, 0.0));
        assert_eq!(objects[&1], (10.0, 0.0));
    }

    #[test]
    fn test_equal_distances_break_ties_by_track_id_then_detection_index() {
        let mut tracker = CentroidTracker::new(2, 100.0).unwrap();
        tracker.update(&[bbox_at(0.0, 0.0), bbox_at(20.0, 0.0)], 1);

        // One detection exactly between the two tracks: both pairs are at
        // distance 10, so track 1 wins and track 2 goes unmatched.
        let objects = tracker.update(&[bbox_at(10.0, 0.0)], 2);
        assert_eq!(objects[&1], (10.0, 0.0));
        assert_eq!(objects[&2], (20.0, 0.0));
        assert_eq!(tracker.track(2).unwrap().missed_frames, 1);
    }

    #[test]
    fn test_match_at_exactly_max_distance_is_bound() {
        let mut tracker = CentroidTracker::new(2, 50.0).unwrap();
        tracker.update(&[bbox_at(0.0, 0.0)], 1);
        let objects = tracker.update(&[bbox_at(50.0, 0.0)], 2);

        assert_eq!(objects.len(), 1);
        assert_eq!(objects[&1], (50.0, 0.0));
    }

    #[test]
    fn test_degenerate_boxes_do_not_panic() {
        let mut tracker = CentroidTracker::new(2, 50.0).unwrap();
        // Zero-area and inverted boxes still yield centroids.
        let objects = tracker.update(&[[5.0, 5.0, 5.0, 5.0], [10.0, 10.0, 2.0, 2.0]], 1);
        assert_eq!(objects.len(), 2);
        assert_eq!(objects[&1], (5.0, 5.0));
        assert_eq!(objects[&2], (6.0, 6.0));
    }

    #[test]
    fn test_no_detections_ever_means_no_tracks() {
        let mut tracker = CentroidTracker::new(2, 50.0).unwrap();
        for frame in 1..=10 {
            assert!(tracker.update(&[], frame).is_empty());
        }
        assert_eq!(tracker.total_registered(), 0);
    }
}
