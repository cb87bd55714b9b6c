//! Landmark-bound segment transitions

use chrono::{DateTime, Utc};
use tracing::{debug, trace};

use crate::Result;
use crate::analysis::SegmentAnalyzer;
use crate::config::AnalyzerConfig;
use crate::landmarks::LandmarkIndex;
use crate::model::{Landmark, LapId, Segment};
use crate::repository::Repository;
use crate::types::{Telemetry, channels};

#[derive(Debug, Clone)]
struct ActiveSegment {
    landmark: Landmark,
    segment: Segment,
    analyzer: SegmentAnalyzer,
}

/// Follows the car from landmark to landmark, keeping one analyzer for the
/// landmark it is currently in.
#[derive(Debug, Clone)]
pub struct SegmentTracker {
    config: AnalyzerConfig,
    active: Option<ActiveSegment>,
    /// Closed segments whose save failed
    pending: Vec<Segment>,
}

impl SegmentTracker {
    pub fn new(config: AnalyzerConfig) -> Self {
        Self { config, active: None, pending: Vec::new() }
    }

    /// Segment currently being analysed.
    pub fn active(&self) -> Option<&Segment> {
        self.active.as_ref().map(|a| &a.segment)
    }

    pub fn has_unsaved(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Route one tick of `lap`.
    ///
    /// A tick inside the active landmark feeds its analyzer. A tick in another
    /// landmark closes the active segment and opens the segment for the new
    /// landmark. A tick outside every landmark leaves the active segment as is.
    pub(crate) fn update(
        &mut self,
        telemetry: &Telemetry,
        now: DateTime<Utc>,
        lap: LapId,
        index: &LandmarkIndex,
        repository: &dyn Repository,
    ) -> Result<()> {
        let Some(distance) = telemetry.number(channels::DISTANCE_ROUND_TRACK) else {
            return Ok(());
        };

        if let Some(active) = self
            .active
            .as_mut()
            .filter(|a| a.segment.lap == lap && a.landmark.contains(distance))
        {
            active.analyzer.observe(telemetry, now);
            return Ok(());
        }

        let Some(landmark) = index.lookup(distance) else {
            return Ok(());
        };

        let closed = self.close(repository);

        let segment = repository.get_or_create_segment(lap, landmark.id)?.record;
        let mut analyzer = SegmentAnalyzer::new(self.config, index.is_first(landmark.id));
        analyzer.observe(telemetry, now);
        trace!(lap = %lap, landmark = %landmark.name, distance, "Entered segment");

        self.active = Some(ActiveSegment { landmark: landmark.clone(), segment, analyzer });
        closed
    }

    /// Finalize and save the active segment.
    pub(crate) fn close(&mut self, repository: &dyn Repository) -> Result<()> {
        let Some(ActiveSegment { landmark, mut segment, analyzer }) = self.active.take() else {
            return Ok(());
        };

        segment.apply(&analyzer.finalize());
        debug!(
            lap = %segment.lap,
            landmark = %landmark.name,
            samples = analyzer.samples(),
            coasting_time = ?segment.coasting_time,
            braking_point = ?segment.braking_point,
            apex = ?segment.apex,
            "Closed segment"
        );

        if !segment.is_dirty() {
            return Ok(());
        }
        match repository.save_segment(&segment) {
            Ok(()) => Ok(()),
            Err(e) => {
                self.pending.push(segment);
                Err(e)
            }
        }
    }

    /// Save what the active analyzer has seen so far, and retry failed saves.
    pub(crate) fn snapshot(&mut self, repository: &dyn Repository) -> Result<()> {
        let mut first_error = None;
        self.pending.retain(|segment| match repository.save_segment(segment) {
            Ok(()) => false,
            Err(e) => {
                first_error.get_or_insert(e);
                true
            }
        });

        if let Some(active) = self.active.as_mut() {
            active.segment.apply(&active.analyzer.finalize());
            if active.segment.is_dirty() {
                match repository.save_segment(&active.segment) {
                    Ok(()) => active.segment.mark_clean(),
                    Err(e) => {
                        first_error.get_or_insert(e);
                    }
                }
            }
        }

        first_error.map_or(Ok(()), Err)
    }
}
