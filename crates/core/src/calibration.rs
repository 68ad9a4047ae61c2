//! Two-marker calibration from world units to centimeters.
//!
//! The user places two markers on one panorama and enters the physical
//! length between them. The resulting scale is session-wide and applies to
//! every image.

use crate::annotation::{AnnotationStore, ImageAnnotationSet, ImageIndex, Point, PointId};
use crate::config::ViewerSettings;
use crate::error::{PlanError, PlanResult};
use crate::geometry::Vec3;
use tracing::{debug, info, warn};

/// Physical unit produced by a calibrated scale
pub const PHYSICAL_UNIT: &str = "cm";

/// Calibration progress
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationState {
    Uncalibrated,
    /// Fewer than two markers placed
    CollectingPoints(usize),
    ReadyToFinish,
    Calibrated,
}

/// Session-wide calibration
#[derive(Debug, Clone, PartialEq)]
pub struct Calibration {
    state: CalibrationState,
    marker_image: Option<ImageIndex>,
    markers: Vec<PointId>,
    reference_unit_distance: Option<f64>,
    reference_physical_length: Option<f64>,
    scale: f64,
}

impl Default for Calibration {
    fn default() -> Self {
        Self {
            state: CalibrationState::Uncalibrated,
            marker_image: None,
            markers: Vec::new(),
            reference_unit_distance: None,
            reference_physical_length: None,
            scale: 1.0,
        }
    }
}

impl Calibration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> CalibrationState {
        self.state
    }

    pub fn is_calibrated(&self) -> bool {
        self.state == CalibrationState::Calibrated
    }

    /// Physical units per world unit; 1.0 until calibrated
    pub fn scale(&self) -> f64 {
        self.scale
    }

    pub fn reference_unit_distance(&self) -> Option<f64> {
        self.reference_unit_distance
    }

    pub fn reference_physical_length(&self) -> Option<f64> {
        self.reference_physical_length
    }

    pub fn marker_image(&self) -> Option<ImageIndex> {
        self.marker_image
    }

    pub fn markers(&self) -> &[PointId] {
        &self.markers
    }

    /// Place a calibration marker on `set`.
    ///
    /// The second marker fixes the reference distance and adds the
    /// calibration line. A third marker is rejected until `cancel`.
    /// Markers deleted from the set since the last click are forgotten
    /// first, so the click may start over as marker 1.
    pub fn add_marker(&mut self, set: &mut ImageAnnotationSet, position: Vec3) -> PlanResult<PointId> {
        if self.state == CalibrationState::Calibrated {
            return Err(PlanError::TooManyMarkers);
        }
        if let Some(expected) = self.marker_image.filter(|_| !self.markers.is_empty()) {
            if expected != set.image_index() {
                return Err(PlanError::CalibrationImageMismatch { expected, found: set.image_index() });
            }
        }

        self.reconcile(set);
        if self.state == CalibrationState::ReadyToFinish {
            return Err(PlanError::TooManyMarkers);
        }

        let first = self.markers.first().and_then(|id| set.point(*id)).map(|p| (p.id, p.position));
        let id = set.add_calibration_marker(position);
        self.marker_image = Some(set.image_index());

        match first {
            None => {
                self.markers = vec![id];
                self.state = CalibrationState::CollectingPoints(1);
            }
            Some((first_id, first_position)) => {
                set.add_calibration_line(first_id, id)?;
                self.markers = vec![first_id, id];
                self.reference_unit_distance = Some(first_position.distance_to(&position));
                self.state = CalibrationState::ReadyToFinish;
            }
        }
        debug!(image = set.image_index(), marker = id, state = ?self.state, "calibration marker placed");
        Ok(id)
    }

    /// Drop tracked markers that no longer exist as markers in `set`.
    ///
    /// A cleared or cascade-deleted marker id can be handed out again to a
    /// drawing point, so a tracked id only counts while its point is still
    /// flagged. Progress falls back to match the survivors. A finished
    /// calibration is kept. Returns the number of markers dropped.
    pub fn reconcile(&mut self, set: &ImageAnnotationSet) -> usize {
        if self.is_calibrated() || self.marker_image != Some(set.image_index()) {
            return 0;
        }

        let (kept, lost): (Vec<PointId>, Vec<PointId>) = self
            .markers
            .iter()
            .copied()
            .partition(|id| set.point(*id).is_some_and(|p| p.is_calibration_marker));
        if lost.is_empty() {
            return 0;
        }
        for point_id in &lost {
            let error = PlanError::PointNotFound(*point_id);
            warn!(image = set.image_index(), %error, "calibration marker lost");
        }

        self.reference_unit_distance = None;
        self.state = match kept.len() {
            0 => CalibrationState::Uncalibrated,
            _ => CalibrationState::CollectingPoints(1),
        };
        if kept.is_empty() {
            self.marker_image = None;
        }
        self.markers = kept;
        lost.len()
    }

    /// Fix the scale from the physical length between the two markers
    pub fn finish(&mut self, physical_length: f64) -> PlanResult<f64> {
        if self.state != CalibrationState::ReadyToFinish {
            return Err(PlanError::InvalidCalibrationValue(format!(
                "exactly 2 calibration markers are required, found {}",
                self.markers.len()
            )));
        }
        if !physical_length.is_finite() || physical_length <= 0.0 {
            return Err(PlanError::InvalidCalibrationValue(format!(
                "reference length must be a positive number, got {physical_length}"
            )));
        }
        let distance = self.reference_unit_distance.unwrap_or(0.0);
        if distance <= 0.0 {
            return Err(PlanError::InvalidCalibrationValue(
                "calibration markers coincide".to_string(),
            ));
        }

        self.scale = physical_length / distance;
        self.reference_physical_length = Some(physical_length);
        self.state = CalibrationState::Calibrated;
        info!(scale = self.scale, physical_length, distance, "calibration finished");
        Ok(self.scale)
    }

    /// Drop markers and calibration lines and return to unit scale.
    ///
    /// Other annotations are untouched.
    pub fn cancel(&mut self, store: &mut AnnotationStore) {
        if let Some(image) = self.marker_image {
            let removed = store.set_mut(image).remove_calibration_entities();
            debug!(image, removed, "calibration cancelled");
        }
        *self = Calibration::default();
    }

    /// Convert a world distance; unchanged when uncalibrated
    pub fn to_physical_units(&self, raw_distance: f64) -> f64 {
        if self.is_calibrated() {
            raw_distance * self.scale
        } else {
            raw_distance
        }
    }

    /// Convert a world area; scaled by `scale²` when calibrated
    pub fn to_physical_area(&self, raw_area: f64) -> f64 {
        if self.is_calibrated() {
            raw_area * self.scale * self.scale
        } else {
            raw_area
        }
    }

    /// Unit label for converted values
    pub fn unit(&self) -> &'static str {
        if self.is_calibrated() {
            PHYSICAL_UNIT
        } else {
            "units"
        }
    }

    /// Label for a world distance: meters from 100 cm up, whole centimeters
    /// below, whole world units when uncalibrated
    pub fn format_distance(&self, raw_distance: f64) -> String {
        if !self.is_calibrated() {
            return format!("{raw_distance:.0}");
        }
        let cm = self.to_physical_units(raw_distance);
        if cm >= 100.0 {
            format!("{:.2}m", cm / 100.0)
        } else {
            format!("{cm:.0}cm")
        }
    }

    /// Write scale and calibration flag into persisted settings
    pub fn apply_to_settings(&self, settings: &mut ViewerSettings) {
        settings.scale = self.scale;
        settings.is_calibrated = self.is_calibrated();
        if let Some(length) = self.reference_physical_length {
            settings.calibration_value = length;
        }
    }

    /// Rebuild calibration from persisted settings and any markers in
    /// `store`
    pub fn restore(settings: &ViewerSettings, store: &AnnotationStore) -> Self {
        let mut calibration = Calibration::default();

        if let Some(set) = store.sets().find(|set| set.calibration_markers().next().is_some()) {
            calibration.marker_image = Some(set.image_index());
            let markers: Vec<&Point> = set.calibration_markers().take(2).collect();
            calibration.markers = markers.iter().map(|p| p.id).collect();
            if let [a, b] = markers.as_slice() {
                calibration.reference_unit_distance = Some(a.position.distance_to(&b.position));
            }
        }

        let usable_scale = settings.scale.is_finite() && settings.scale > 0.0;
        calibration.state = if settings.is_calibrated && usable_scale {
            calibration.scale = settings.scale;
            calibration.reference_physical_length = Some(settings.calibration_value);
            if calibration.reference_unit_distance.is_none() {
                calibration.reference_unit_distance = Some(settings.calibration_value / settings.scale);
            }
            CalibrationState::Calibrated
        } else {
            match calibration.markers.len() {
                0 => CalibrationState::Uncalibrated,
                1 => CalibrationState::CollectingPoints(1),
                _ => CalibrationState::ReadyToFinish,
            }
        };
        calibration
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn calibrated(store: &mut AnnotationStore, distance: f64, length: f64) -> Calibration {
        let mut calibration = Calibration::new();
        let set = store.set_mut(0);
        calibration.add_marker(set, Vec3::new(0.0, 0.0, 0.0)).unwrap();
        calibration.add_marker(set, Vec3::new(distance, 0.0, 0.0)).unwrap();
        calibration.finish(length).unwrap();
        calibration
    }

    #[test]
    fn test_state_transitions() {
        let mut store = AnnotationStore::new();
        let mut calibration = Calibration::new();
        assert_eq!(calibration.state(), CalibrationState::Uncalibrated);

        calibration.add_marker(store.set_mut(0), Vec3::ZERO).unwrap();
        assert_eq!(calibration.state(), CalibrationState::CollectingPoints(1));

        calibration.add_marker(store.set_mut(0), Vec3::new(250.0, 0.0, 0.0)).unwrap();
        assert_eq!(calibration.state(), CalibrationState::ReadyToFinish);
        assert_eq!(calibration.reference_unit_distance(), Some(250.0));
        assert_eq!(store.set(0).unwrap().lines().len(), 1);
        assert!(store.set(0).unwrap().lines()[0].is_calibration_line);

        calibration.finish(80.0).unwrap();
        assert_eq!(calibration.state(), CalibrationState::Calibrated);
    }

    #[test]
    fn test_scale_round_trip() {
        let mut store = AnnotationStore::new();
        let calibration = calibrated(&mut store, 250.0, 80.0);
        assert_relative_eq!(calibration.scale(), 0.32);
        assert_relative_eq!(calibration.to_physical_units(500.0), 160.0);
        assert_relative_eq!(calibration.to_physical_area(100.0), 10.24, epsilon = 1e-9);
    }

    #[test]
    fn test_third_marker_rejected() {
        let mut store = AnnotationStore::new();
        let mut calibration = Calibration::new();
        calibration.add_marker(store.set_mut(0), Vec3::ZERO).unwrap();
        calibration.add_marker(store.set_mut(0), Vec3::new(1.0, 0.0, 0.0)).unwrap();
        let err = calibration.add_marker(store.set_mut(0), Vec3::new(2.0, 0.0, 0.0)).unwrap_err();
        assert!(matches!(err, PlanError::TooManyMarkers));
        assert_eq!(store.set(0).unwrap().points().len(), 2);
    }

    #[test]
    fn test_calibrate_across_clear_all() {
        let mut store = AnnotationStore::new();
        let mut calibration = Calibration::new();
        calibration.add_marker(store.set_mut(0), Vec3::ZERO).unwrap();

        let set = store.set_mut(0);
        set.clear_all();
        let drawing = set.add_point(Vec3::new(1000.0, 0.0, 0.0));
        assert_eq!(drawing, 0);

        calibration.add_marker(store.set_mut(0), Vec3::new(250.0, 0.0, 0.0)).unwrap();
        assert_eq!(calibration.state(), CalibrationState::CollectingPoints(1));
        assert!(store.set(0).unwrap().lines().is_empty());
        assert!(store.set(0).unwrap().point(drawing).unwrap().connections.is_empty());

        calibration.add_marker(store.set_mut(0), Vec3::new(500.0, 0.0, 0.0)).unwrap();
        assert_eq!(calibration.reference_unit_distance(), Some(250.0));
        let set = store.set(0).unwrap();
        let line = &set.lines()[0];
        assert!(line.is_calibration_line);
        assert!(!line.references(drawing));
        assert_relative_eq!(calibration.finish(80.0).unwrap(), 0.32);
    }

    #[test]
    fn test_deleted_marker_restarts_without_strays() {
        let mut store = AnnotationStore::new();
        let mut calibration = Calibration::new();
        let first = calibration.add_marker(store.set_mut(0), Vec3::ZERO).unwrap();
        store.set_mut(0).remove_point_cascade(first).unwrap();

        let restarted = calibration.add_marker(store.set_mut(0), Vec3::new(10.0, 0.0, 0.0)).unwrap();
        assert_eq!(calibration.state(), CalibrationState::CollectingPoints(1));
        assert_eq!(calibration.markers(), &[restarted]);
        assert_eq!(store.set(0).unwrap().points().len(), 1);

        calibration.add_marker(store.set_mut(0), Vec3::new(110.0, 0.0, 0.0)).unwrap();
        assert_eq!(calibration.state(), CalibrationState::ReadyToFinish);
        assert_eq!(store.set(0).unwrap().points().len(), 2);
        assert_eq!(calibration.reference_unit_distance(), Some(100.0));
    }

    #[test]
    fn test_reconcile_after_markers_cleared() {
        let mut store = AnnotationStore::new();
        let mut calibration = Calibration::new();
        calibration.add_marker(store.set_mut(0), Vec3::ZERO).unwrap();
        calibration.add_marker(store.set_mut(0), Vec3::new(50.0, 0.0, 0.0)).unwrap();
        store.set_mut(0).clear_all();

        assert_eq!(calibration.reconcile(store.set(0).unwrap()), 2);
        assert_eq!(calibration.state(), CalibrationState::Uncalibrated);
        assert_eq!(calibration.reference_unit_distance(), None);
        assert!(matches!(calibration.finish(80.0), Err(PlanError::InvalidCalibrationValue(_))));
    }

    #[test]
    fn test_finish_rejects_invalid_values() {
        let mut store = AnnotationStore::new();
        let mut calibration = Calibration::new();
        assert!(matches!(calibration.finish(80.0), Err(PlanError::InvalidCalibrationValue(_))));

        calibration.add_marker(store.set_mut(0), Vec3::ZERO).unwrap();
        calibration.add_marker(store.set_mut(0), Vec3::new(10.0, 0.0, 0.0)).unwrap();
        for bad in [0.0, -5.0, f64::NAN] {
            assert!(matches!(calibration.finish(bad), Err(PlanError::InvalidCalibrationValue(_))));
        }
        assert_eq!(calibration.state(), CalibrationState::ReadyToFinish);
        assert_eq!(calibration.scale(), 1.0);
    }

    #[test]
    fn test_coincident_markers_rejected() {
        let mut store = AnnotationStore::new();
        let mut calibration = Calibration::new();
        calibration.add_marker(store.set_mut(0), Vec3::ZERO).unwrap();
        calibration.add_marker(store.set_mut(0), Vec3::ZERO).unwrap();
        assert!(calibration.finish(80.0).is_err());
    }

    #[test]
    fn test_markers_must_share_image() {
        let mut store = AnnotationStore::new();
        let mut calibration = Calibration::new();
        calibration.add_marker(store.set_mut(0), Vec3::ZERO).unwrap();
        let err = calibration.add_marker(store.set_mut(1), Vec3::new(1.0, 0.0, 0.0)).unwrap_err();
        assert!(matches!(err, PlanError::CalibrationImageMismatch { expected: 0, found: 1 }));
    }

    #[test]
    fn test_cancel_keeps_drawing_points() {
        let mut store = AnnotationStore::new();
        store.set_mut(0).add_point(Vec3::new(5.0, 5.0, 5.0));
        let mut calibration = calibrated(&mut store, 100.0, 50.0);

        calibration.cancel(&mut store);
        assert_eq!(calibration.state(), CalibrationState::Uncalibrated);
        assert_eq!(calibration.scale(), 1.0);
        let set = store.set(0).unwrap();
        assert_eq!(set.points().len(), 1);
        assert!(set.lines().is_empty());
        assert_relative_eq!(calibration.to_physical_units(42.0), 42.0);
    }

    #[test]
    fn test_format_distance() {
        let mut store = AnnotationStore::new();
        assert_eq!(Calibration::new().format_distance(123.4), "123");

        let calibration = calibrated(&mut store, 100.0, 50.0);
        assert_eq!(calibration.format_distance(100.0), "50cm");
        assert_eq!(calibration.format_distance(500.0), "2.50m");
    }

    #[test]
    fn test_restore_from_settings() {
        let mut store = AnnotationStore::new();
        let original = calibrated(&mut store, 250.0, 80.0);
        let mut settings = ViewerSettings::default();
        original.apply_to_settings(&mut settings);
        assert!(settings.is_calibrated);

        let restored = Calibration::restore(&settings, &store);
        assert!(restored.is_calibrated());
        assert_relative_eq!(restored.scale(), 0.32);
        assert_eq!(restored.markers().len(), 2);
        assert_eq!(restored.reference_unit_distance(), Some(250.0));

        let fresh = Calibration::restore(&ViewerSettings::default(), &AnnotationStore::new());
        assert_eq!(fresh.state(), CalibrationState::Uncalibrated);
    }
}
