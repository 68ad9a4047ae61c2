//! Interaction session
//!
//! Owns the annotation store, the calibration and the current interaction
//! mode, and routes sphere clicks to the matching operation.

use crate::annotation::{AnnotationStore, ImageIndex, OpeningId, OpeningType, Placement, PointId};
use crate::calibration::{Calibration, CalibrationState};
use crate::config::PlanConfig;
use crate::error::PlanResult;
use crate::geometry::Vec3;
use crate::opening::{DraftProgress, OpeningDraft};
use tracing::debug;

/// Interaction mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    #[default]
    View,
    Point,
    Calibrate,
    Opening(OpeningType),
}

/// What a click did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickOutcome {
    /// View mode; nothing changed
    Ignored,
    Placed(Placement),
    MarkerAdded { point_id: PointId, state: CalibrationState },
    /// Corner recorded; holds the number of corners so far
    OpeningCorner(usize),
    OpeningCreated(OpeningId),
}

#[derive(Debug, Clone, Default)]
pub struct Session {
    store: AnnotationStore,
    calibration: Calibration,
    config: PlanConfig,
    mode: Mode,
    opening_draft: Option<OpeningDraft>,
}

impl Session {
    pub fn new(config: PlanConfig) -> Self {
        Self { config, ..Default::default() }
    }

    /// Resume from previously loaded state
    pub fn from_parts(store: AnnotationStore, calibration: Calibration, config: PlanConfig) -> Self {
        Self { store, calibration, config, ..Default::default() }
    }

    pub fn store(&self) -> &AnnotationStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut AnnotationStore {
        &mut self.store
    }

    pub fn calibration(&self) -> &Calibration {
        &self.calibration
    }

    pub fn config(&self) -> &PlanConfig {
        &self.config
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn opening_draft(&self) -> Option<&OpeningDraft> {
        self.opening_draft.as_ref()
    }

    /// Switch mode, discarding any unfinished opening
    pub fn set_mode(&mut self, mode: Mode) {
        if let Some(draft) = self.opening_draft.take() {
            debug!(dropped = draft.corners().len(), "opening draft discarded");
        }
        if let Mode::Opening(kind) = mode {
            self.opening_draft = Some(OpeningDraft::new(kind));
        }
        debug!(from = ?self.mode, to = ?mode, "mode changed");
        self.mode = mode;
    }

    pub fn click(&mut self, image_index: ImageIndex, position: Vec3) -> PlanResult<ClickOutcome> {
        match self.mode {
            Mode::View => Ok(ClickOutcome::Ignored),
            Mode::Point => self.click_point(image_index, position),
            Mode::Calibrate => self.click_calibrate(image_index, position),
            Mode::Opening(kind) => self.click_opening(image_index, position, kind),
        }
    }

    fn click_point(&mut self, image_index: ImageIndex, position: Vec3) -> PlanResult<ClickOutcome> {
        let threshold = self.config.loop_close_threshold;
        let placement = self.store.set_mut(image_index).place_point(position, threshold)?;
        Ok(ClickOutcome::Placed(placement))
    }

    fn click_calibrate(&mut self, image_index: ImageIndex, position: Vec3) -> PlanResult<ClickOutcome> {
        let point_id = self.calibration.add_marker(self.store.set_mut(image_index), position)?;
        Ok(ClickOutcome::MarkerAdded { point_id, state: self.calibration.state() })
    }

    fn click_opening(
        &mut self,
        image_index: ImageIndex,
        position: Vec3,
        kind: OpeningType,
    ) -> PlanResult<ClickOutcome> {
        let draft = self.opening_draft.get_or_insert_with(|| OpeningDraft::new(kind));
        match draft.push(image_index, position) {
            DraftProgress::Collecting(count) => Ok(ClickOutcome::OpeningCorner(count)),
            DraftProgress::Complete(corners) => {
                let id = self.store.set_mut(image_index).create_opening(kind, &corners)?;
                Ok(ClickOutcome::OpeningCreated(id))
            }
        }
    }

    /// Fix the scale and return to point drawing
    pub fn finish_calibration(&mut self, physical_length: f64) -> PlanResult<f64> {
        if let Some(set) = self.calibration.marker_image().and_then(|image| self.store.set(image)) {
            self.calibration.reconcile(set);
        }
        let scale = self.calibration.finish(physical_length)?;
        self.set_mode(Mode::Point);
        Ok(scale)
    }

    /// Abort what the current mode has in progress.
    ///
    /// Calibrate drops the markers and falls back to View; Opening drops the
    /// collected corners. Committed annotations are never touched.
    pub fn cancel(&mut self) {
        match self.mode {
            Mode::Calibrate => {
                self.calibration.cancel(&mut self.store);
                self.set_mode(Mode::View);
            }
            Mode::Opening(_) => {
                if let Some(draft) = self.opening_draft.as_mut() {
                    draft.cancel();
                }
            }
            Mode::View | Mode::Point => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn square() -> [Vec3; 4] {
        [
            Vec3::new(-200.0, -150.0, -200.0),
            Vec3::new(200.0, -150.0, -200.0),
            Vec3::new(200.0, -150.0, 200.0),
            Vec3::new(-200.0, -150.0, 200.0),
        ]
    }

    #[test]
    fn test_view_mode_ignores_clicks() {
        let mut session = Session::new(PlanConfig::default());
        assert_eq!(session.click(0, Vec3::ZERO).unwrap(), ClickOutcome::Ignored);
        assert!(session.store().is_empty());
    }

    #[test]
    fn test_point_mode_draws_and_closes_loop() {
        let mut session = Session::new(PlanConfig::default());
        session.set_mode(Mode::Point);
        for corner in square() {
            session.click(0, corner).unwrap();
        }
        let outcome = session.click(0, Vec3::new(-190.0, -150.0, -195.0)).unwrap();
        assert!(matches!(outcome, ClickOutcome::Placed(Placement::LoopClosed { .. })));

        let set = session.store().set(0).unwrap();
        assert_eq!(set.points().len(), 4);
        assert_eq!(set.lines().len(), 4);
        assert_eq!(set.surfaces().len(), 1);
    }

    #[test]
    fn test_calibration_flow() {
        let mut session = Session::new(PlanConfig::default());
        session.set_mode(Mode::Calibrate);
        session.click(2, Vec3::new(0.0, 0.0, 0.0)).unwrap();
        let outcome = session.click(2, Vec3::new(100.0, 0.0, 0.0)).unwrap();
        assert!(matches!(outcome, ClickOutcome::MarkerAdded { state: CalibrationState::ReadyToFinish, .. }));

        let scale = session.finish_calibration(80.0).unwrap();
        assert_relative_eq!(scale, 0.8);
        assert_eq!(session.mode(), Mode::Point);
        assert!(session.calibration().is_calibrated());
    }

    #[test]
    fn test_cancel_calibration_keeps_drawing() {
        let mut session = Session::new(PlanConfig::default());
        session.set_mode(Mode::Point);
        session.click(0, Vec3::new(10.0, 0.0, 10.0)).unwrap();
        session.set_mode(Mode::Calibrate);
        session.click(0, Vec3::new(0.0, 0.0, 0.0)).unwrap();

        session.cancel();
        assert_eq!(session.mode(), Mode::View);
        assert_eq!(session.calibration().state(), CalibrationState::Uncalibrated);
        assert_eq!(session.store().set(0).unwrap().points().len(), 1);
    }

    #[test]
    fn test_opening_mode_commits_on_fourth_corner() {
        let mut session = Session::new(PlanConfig::default());
        session.set_mode(Mode::Opening(OpeningType::Window));
        let corners = square();
        for (i, corner) in corners.iter().take(3).enumerate() {
            assert_eq!(session.click(1, *corner).unwrap(), ClickOutcome::OpeningCorner(i + 1));
        }
        assert_eq!(session.click(1, corners[3]).unwrap(), ClickOutcome::OpeningCreated(0));

        let set = session.store().set(1).unwrap();
        assert_eq!(set.openings()[0].properties.name, "Window 1");
        assert!(session.opening_draft().unwrap().corners().is_empty());
    }

    #[test]
    fn test_opening_corners_stay_on_one_image() {
        let mut session = Session::new(PlanConfig::default());
        session.set_mode(Mode::Opening(OpeningType::Door));
        let corners = square();
        session.click(0, corners[0]).unwrap();
        session.click(0, corners[1]).unwrap();

        assert_eq!(session.click(1, corners[0]).unwrap(), ClickOutcome::OpeningCorner(1));
        for corner in &corners[1..3] {
            session.click(1, *corner).unwrap();
        }
        assert_eq!(session.click(1, corners[3]).unwrap(), ClickOutcome::OpeningCreated(0));

        assert_eq!(session.store().set(1).unwrap().openings()[0].points, corners);
        assert!(session.store().set(0).map_or(true, |set| set.openings().is_empty()));
    }

    #[test]
    fn test_finish_calibration_after_markers_cleared() {
        let mut session = Session::new(PlanConfig::default());
        session.set_mode(Mode::Calibrate);
        session.click(0, Vec3::ZERO).unwrap();
        session.click(0, Vec3::new(100.0, 0.0, 0.0)).unwrap();
        session.store_mut().set_mut(0).clear_all();

        let err = session.finish_calibration(80.0).unwrap_err();
        assert!(matches!(err, crate::error::PlanError::InvalidCalibrationValue(_)));
        assert_eq!(session.mode(), Mode::Calibrate);
        assert!(!session.calibration().is_calibrated());
    }

    #[test]
    fn test_mode_switch_discards_draft() {
        let mut session = Session::new(PlanConfig::default());
        session.set_mode(Mode::Opening(OpeningType::Door));
        session.click(0, Vec3::ZERO).unwrap();
        session.click(0, Vec3::new(1.0, 0.0, 0.0)).unwrap();

        session.set_mode(Mode::Point);
        assert!(session.opening_draft().is_none());
        assert!(session.store().set(0).map_or(true, |set| set.openings().is_empty()));
    }

    #[test]
    fn test_cancel_opening_clears_corners_only() {
        let mut session = Session::new(PlanConfig::default());
        session.set_mode(Mode::Opening(OpeningType::Door));
        for corner in square() {
            session.click(0, corner).unwrap();
        }
        session.click(0, Vec3::ZERO).unwrap();

        session.cancel();
        assert_eq!(session.mode(), Mode::Opening(OpeningType::Door));
        assert!(session.opening_draft().unwrap().corners().is_empty());
        assert_eq!(session.store().set(0).unwrap().openings().len(), 1);
    }
}
