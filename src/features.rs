use nalgebra as na;
use ndarray::prelude::*;

use crate::config::PixelRect;
use crate::image::GrayImage;

/// Shi-Tomasi corner detector ("good features to track").
#[derive(Debug, Clone)]
pub struct GoodFeatures {
    pub max_corners: usize,
    pub quality_level: f32,
    pub min_distance: f32,
    pub block_size: usize,
}

impl GoodFeatures {
    pub fn new(
        max_corners: usize,
        quality_level: f32,
        min_distance: f32,
        block_size: usize,
    ) -> Self {
        Self {
            max_corners,
            quality_level,
            min_distance,
            block_size,
        }
    }

    /// Strongest corners inside `regions`, strongest first.
    pub fn detect(&self, img: &GrayImage, regions: &[PixelRect]) -> Vec<na::Point2<f32>> {
        let (h, w) = img.dim();
        let half = self.block_size / 2;
        let border = half + 1;

        if h <= 2 * border || w <= 2 * border {
            return Vec::new();
        }

        let mask = build_mask(h, w, regions);
        let (gx, gy) = sobel(img);

        let mut response = Array2::<f32>::zeros((h, w));
        let mut max_response = 0.0f32;

        for y in border..h - border {
            for x in border..w - border {
                if !mask[[y, x]] {
                    continue;
                }

                let (mut a, mut b, mut c) = (0.0f32, 0.0f32, 0.0f32);
                for wy in y - half..=y + half {
                    for wx in x - half..=x + half {
                        let dx = gx[[wy, wx]];
                        let dy = gy[[wy, wx]];
                        a += dx * dx;
                        b += dx * dy;
                        c += dy * dy;
                    }
                }

                let eig = min_eigenvalue(a, b, c);
                response[[y, x]] = eig;
                max_response = max_response.max(eig);
            }
        }

        if max_response <= 0.0 {
            return Vec::new();
        }

        let threshold = max_response * self.quality_level;
        let mut candidates = Vec::new();

        for y in border..h - border {
            for x in border..w - border {
                let r = response[[y, x]];
                if r <= 0.0 || r < threshold {
                    continue;
                }

                let is_peak = (y - 1..=y + 1)
                    .all(|ny| (x - 1..=x + 1).all(|nx| response[[ny, nx]] <= r));

                if is_peak {
                    candidates.push((r, x, y));
                }
            }
        }

        // raster order breaks ties so the result does not depend on sort internals
        candidates.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.2.cmp(&b.2))
                .then(a.1.cmp(&b.1))
        });

        let min_dist2 = self.min_distance * self.min_distance;
        let mut corners: Vec<na::Point2<f32>> = Vec::with_capacity(self.max_corners);

        for (_, x, y) in candidates {
            let pt = na::Point2::new(x as f32, y as f32);
            if corners
                .iter()
                .all(|c| na::distance_squared(c, &pt) >= min_dist2)
            {
                corners.push(pt);
                if corners.len() >= self.max_corners {
                    break;
                }
            }
        }

        corners
    }
}

fn build_mask(h: usize, w: usize, regions: &[PixelRect]) -> Array2<bool> {
    let mut mask = Array2::from_elem((h, w), false);

    for r in regions {
        let x1 = (r.left as usize).min(w);
        let x2 = (r.right as usize).min(w);
        let y1 = (r.top as usize).min(h);
        let y2 = (r.bottom as usize).min(h);

        if x2 > x1 && y2 > y1 {
            mask.slice_mut(s![y1..y2, x1..x2]).fill(true);
        }
    }

    mask
}

fn sobel(img: &GrayImage) -> (GrayImage, GrayImage) {
    let (h, w) = img.dim();
    let mut gx = Array2::<f32>::zeros((h, w));
    let mut gy = Array2::<f32>::zeros((h, w));

    for y in 1..h.saturating_sub(1) {
        for x in 1..w.saturating_sub(1) {
            gx[[y, x]] = (img[[y - 1, x + 1]] + 2.0 * img[[y, x + 1]] + img[[y + 1, x + 1]])
                - (img[[y - 1, x - 1]] + 2.0 * img[[y, x - 1]] + img[[y + 1, x - 1]]);
            gy[[y, x]] = (img[[y + 1, x - 1]] + 2.0 * img[[y + 1, x]] + img[[y + 1, x + 1]])
                - (img[[y - 1, x - 1]] + 2.0 * img[[y - 1, x]] + img[[y - 1, x + 1]]);
        }
    }

    (gx, gy)
}

/// Smaller eigenvalue of the symmetric matrix `[[a, b], [b, c]]`.
#[inline]
pub fn min_eigenvalue(a: f32, b: f32, c: f32) -> f32 {
    let half_trace = (a + c) * 0.5;
    let half_diff = (a - c) * 0.5;

    half_trace - (half_diff * half_diff + b * b).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checkerboard(h: usize, w: usize, cell: usize) -> GrayImage {
        Array2::from_shape_fn((h, w), |(y, x)| {
            if (x / cell + y / cell) % 2 == 0 {
                200.0
            } else {
                40.0
            }
        })
    }

    #[test]
    fn flat_image_has_no_features() {
        let img = Array2::<f32>::from_elem((60, 80), 90.0);
        let det = GoodFeatures::new(100, 0.3, 3.0, 7);
        assert!(det.detect(&img, &[PixelRect::columns(0, 80)]).is_empty());
    }

    #[test]
    fn corners_stay_inside_mask_and_apart() {
        let img = checkerboard(80, 120, 10);
        let det = GoodFeatures::new(50, 0.3, 5.0, 7);
        let region = PixelRect {
            left: 60,
            top: 0,
            right: 120,
            bottom: 80,
        };

        let corners = det.detect(&img, &[region]);
        assert!(!corners.is_empty());
        assert!(corners.len() <= 50);

        for (i, a) in corners.iter().enumerate() {
            assert!(a.x >= 60.0);
            for b in &corners[i + 1..] {
                assert!(na::distance(a, b) >= 5.0);
            }
        }
    }

    #[test]
    fn respects_max_corners() {
        let img = checkerboard(80, 120, 8);
        let det = GoodFeatures::new(3, 0.01, 1.0, 5);
        assert_eq!(det.detect(&img, &[PixelRect::columns(0, 120)]).len(), 3);
    }

    #[test]
    fn min_eigenvalue_of_diagonal() {
        assert_eq!(min_eigenvalue(4.0, 0.0, 9.0), 4.0);
        assert_eq!(min_eigenvalue(9.0, 0.0, 4.0), 4.0);
    }
}
