//! Landmark lookup
//!
//! Landmarks are static reference data, so the index for a track is built once
//! and shared by every session on that track through an [`Arc`]. The
//! [`LandmarkCatalog`] caches one index per track id.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::Result;
use crate::model::{Landmark, LandmarkId, LandmarkKind, TrackId};
use crate::repository::Repository;

/// Ordered `segment` landmarks of one track.
#[derive(Debug, Clone, Default)]
pub struct LandmarkIndex {
    /// Non-wrapping ranges sorted by start distance
    ranges: Vec<Landmark>,
    /// Ranges crossing the finish line
    wrapping: Vec<Landmark>,
    /// Whether `ranges` are disjoint (apart from shared boundaries)
    disjoint: bool,
}

impl LandmarkIndex {
    /// Build from all landmarks of a track; non-segment kinds are skipped.
    pub fn new(landmarks: impl IntoIterator<Item = Landmark>) -> Self {
        let (mut wrapping, mut ranges): (Vec<_>, Vec<_>) = landmarks
            .into_iter()
            .filter(|l| l.kind == LandmarkKind::Segment)
            .filter(|l| l.start.is_finite() && l.end.is_finite())
            .partition(Landmark::wraps);

        ranges.sort_by(|a, b| a.start.total_cmp(&b.start).then(a.id.cmp(&b.id)));
        wrapping.sort_by(|a, b| a.start.total_cmp(&b.start).then(a.id.cmp(&b.id)));
        let disjoint = ranges.windows(2).all(|w| w[0].end <= w[1].start);

        Self { ranges, wrapping, disjoint }
    }

    /// Landmark containing `distance`.
    ///
    /// A boundary shared by two adjacent landmarks resolves to the earlier one.
    pub fn lookup(&self, distance: f64) -> Option<&Landmark> {
        if distance.is_nan() {
            return None;
        }

        let found = if self.disjoint {
            // first range whose end is not before the distance
            let idx = self.ranges.partition_point(|l| l.end < distance);
            self.ranges.get(idx).filter(|l| l.contains(distance))
        } else {
            self.ranges.iter().find(|l| l.contains(distance))
        };

        found.or_else(|| self.wrapping.iter().find(|l| l.contains(distance)))
    }

    /// The landmark a lap starts in: the one containing distance zero, or the
    /// earliest one.
    pub fn first(&self) -> Option<&Landmark> {
        self.lookup(0.0).or_else(|| self.ranges.first()).or_else(|| self.wrapping.first())
    }

    pub fn is_first(&self, landmark: LandmarkId) -> bool {
        self.first().is_some_and(|l| l.id == landmark)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Landmark> {
        self.ranges.iter().chain(self.wrapping.iter())
    }

    pub fn len(&self) -> usize {
        self.ranges.len() + self.wrapping.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Shared per-track cache of landmark indices.
#[derive(Debug, Default)]
pub struct LandmarkCatalog {
    indices: RwLock<HashMap<TrackId, Arc<LandmarkIndex>>>,
}

impl LandmarkCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index for `track`, loading it from the repository on first use.
    pub fn index(&self, track: TrackId, repository: &dyn Repository) -> Result<Arc<LandmarkIndex>> {
        if let Some(index) = self.indices.read().get(&track) {
            return Ok(Arc::clone(index));
        }

        // Loaded outside the lock; a concurrent loader for the same track
        // loses the race and gets the first stored index.
        let index = Arc::new(LandmarkIndex::new(repository.landmarks(track)?));
        debug!(track = %track, segments = index.len(), "Built landmark index");

        let mut indices = self.indices.write();
        Ok(Arc::clone(indices.entry(track).or_insert(index)))
    }

    /// Drop the cached index so the next lookup reloads it.
    pub fn invalidate(&self, track: TrackId) {
        self.indices.write().remove(&track);
    }

    pub fn len(&self) -> usize {
        self.indices.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
