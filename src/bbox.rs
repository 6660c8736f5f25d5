use nalgebra as na;
use serde_derive::{Deserialize, Serialize};

/// Left-top-right-bottom box in absolute pixel coordinates
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq)]
#[serde(transparent)]
pub struct BBox([f32; 4]);

impl From<[f32; 4]> for BBox {
    #[inline]
    fn from(v: [f32; 4]) -> Self {
        BBox(v)
    }
}

impl From<BBox> for [f32; 4] {
    #[inline]
    fn from(bbox: BBox) -> Self {
        bbox.0
    }
}

impl BBox {
    #[inline]
    pub fn ltrb(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        BBox([x1, y1, x2, y2])
    }

    #[inline]
    pub fn as_slice(&self) -> &[f32; 4] {
        &self.0
    }

    #[inline(always)]
    pub fn left(&self) -> f32 {
        self.0[0]
    }

    #[inline(always)]
    pub fn top(&self) -> f32 {
        self.0[1]
    }

    #[inline(always)]
    pub fn right(&self) -> f32 {
        self.0[2]
    }

    #[inline(always)]
    pub fn bottom(&self) -> f32 {
        self.0[3]
    }

    #[inline(always)]
    pub fn width(&self) -> f32 {
        self.0[2] - self.0[0]
    }

    #[inline(always)]
    pub fn height(&self) -> f32 {
        self.0[3] - self.0[1]
    }

    #[inline]
    pub fn center(&self) -> na::Point2<f32> {
        na::Point2::new(
            (self.0[0] + self.0[2]) / 2.0,
            (self.0[1] + self.0[3]) / 2.0,
        )
    }

    /// Bottom-center point, where a standing person touches the ground.
    #[inline]
    pub fn foot(&self) -> na::Point2<f32> {
        na::Point2::new((self.0[0] + self.0[2]) / 2.0, self.0[3])
    }

    #[inline]
    pub fn bottom_left(&self) -> na::Point2<f32> {
        na::Point2::new(self.0[0], self.0[3])
    }

    #[inline]
    pub fn bottom_right(&self) -> na::Point2<f32> {
        na::Point2::new(self.0[2], self.0[3])
    }

    /// Per-coordinate linear blend, `factor` 0 gives `self` and 1 gives `other`.
    pub fn lerp(&self, other: &BBox, factor: f32) -> BBox {
        let mut out = [0.0; 4];
        for (i, v) in out.iter_mut().enumerate() {
            *v = self.0[i] * (1.0 - factor) + other.0[i] * factor;
        }

        BBox(out)
    }
}
