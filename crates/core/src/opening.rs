//! Opening dimension calculator and the in-progress opening draft

use crate::annotation::{ImageIndex, OpeningType};
use crate::geometry::Vec3;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Derived size of a four-corner opening
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpeningDimensions {
    pub width: f64,
    pub height: f64,
    pub area: f64,
    pub perimeter: f64,
    pub side_lengths: [f64; 4],
}

impl OpeningDimensions {
    /// Same dimensions with lengths multiplied by `scale` and area by `scale²`
    pub fn scaled(&self, scale: f64) -> Self {
        Self {
            width: self.width * scale,
            height: self.height * scale,
            area: self.area * scale * scale,
            perimeter: self.perimeter * scale,
            side_lengths: self.side_lengths.map(|side| side * scale),
        }
    }
}

/// Size of an opening from its corners in click order.
///
/// Edges 0 and 2 are averaged into the width, edges 1 and 3 into the
/// height. Corners are never reordered, so an out-of-order click sequence
/// yields wrong but finite numbers.
pub fn opening_dimensions(corners: &[Vec3; 4]) -> OpeningDimensions {
    let side_lengths: [f64; 4] = std::array::from_fn(|i| corners[i].distance_to(&corners[(i + 1) % 4]));
    let width = (side_lengths[0] + side_lengths[2]) / 2.0;
    let height = (side_lengths[1] + side_lengths[3]) / 2.0;
    OpeningDimensions {
        width,
        height,
        area: width * height,
        perimeter: 2.0 * (width + height),
        side_lengths,
    }
}

/// Progress of an opening draft after a corner was added
#[derive(Debug, Clone, PartialEq)]
pub enum DraftProgress {
    /// Corners collected so far (1 to 3)
    Collecting(usize),
    /// Fourth corner placed; the corners are handed back for committing
    Complete([Vec3; 4]),
}

/// Corners collected during a multi-click opening session.
///
/// All corners of one opening come from the same image.
#[derive(Debug, Clone, PartialEq)]
pub struct OpeningDraft {
    kind: OpeningType,
    image_index: Option<ImageIndex>,
    corners: Vec<Vec3>,
}

impl OpeningDraft {
    pub fn new(kind: OpeningType) -> Self {
        Self { kind, image_index: None, corners: Vec::with_capacity(4) }
    }

    /// Image the collected corners belong to
    pub fn image_index(&self) -> Option<ImageIndex> {
        self.image_index.filter(|_| !self.corners.is_empty())
    }

    pub fn kind(&self) -> OpeningType {
        self.kind
    }

    pub fn corners(&self) -> &[Vec3] {
        &self.corners
    }

    /// Add a corner clicked on `image_index`.
    ///
    /// A corner from another image than the collected ones restarts the
    /// draft. The draft resets itself once four are collected.
    pub fn push(&mut self, image_index: ImageIndex, corner: Vec3) -> DraftProgress {
        if !self.corners.is_empty() && self.image_index != Some(image_index) {
            debug!(dropped = self.corners.len(), image = image_index, "opening draft restarted on new image");
            self.corners.clear();
        }
        self.image_index = Some(image_index);
        self.corners.push(corner);
        if self.corners.len() < 4 {
            return DraftProgress::Collecting(self.corners.len());
        }
        let corners = [self.corners[0], self.corners[1], self.corners[2], self.corners[3]];
        self.corners.clear();
        DraftProgress::Complete(corners)
    }

    /// Discard collected corners, returning how many were dropped
    pub fn cancel(&mut self) -> usize {
        let dropped = self.corners.len();
        self.corners.clear();
        dropped
    }
}
