use nalgebra as na;

use crate::image::{bilinear, GrayImage};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FlowStatus {
    Tracked,
    /// Patch had too little texture for the solver.
    Lost,
    OutOfBounds,
}

#[derive(Debug, Clone, Copy)]
pub struct FlowPoint {
    pub from: na::Point2<f32>,
    pub to: na::Point2<f32>,
    pub status: FlowStatus,
}

impl FlowPoint {
    #[inline]
    pub fn displacement(&self) -> na::Vector2<f32> {
        self.to - self.from
    }
}

enum LevelResult {
    Converged(na::Vector2<f32>),
    MaxIter(na::Vector2<f32>),
    Singular,
}

/// Pyramidal Lucas-Kanade with template gradients computed once per level.
#[derive(Debug, Clone)]
pub struct LucasKanade {
    /// Half of the (odd) window width.
    pub half_window: usize,
    pub max_iterations: usize,
    pub epsilon: f32,
    pub min_eigenvalue: f32,
}

impl LucasKanade {
    pub fn new(win_size: usize, max_iterations: usize, epsilon: f32) -> Self {
        Self {
            half_window: win_size / 2,
            max_iterations,
            epsilon,
            min_eigenvalue: 1e-4,
        }
    }

    /// Tracks `points` from `prev` to `next`; both pyramids must come from same-sized frames.
    pub fn track(
        &self,
        prev: &[GrayImage],
        next: &[GrayImage],
        points: &[na::Point2<f32>],
    ) -> Vec<FlowPoint> {
        let levels = prev.len().min(next.len());

        points
            .iter()
            .map(|&pt| self.track_point(prev, next, pt, levels))
            .collect()
    }

    fn track_point(
        &self,
        prev: &[GrayImage],
        next: &[GrayImage],
        pt: na::Point2<f32>,
        levels: usize,
    ) -> FlowPoint {
        let mut d = na::Vector2::zeros();

        for level in (0..levels).rev() {
            let scale = 1.0 / (1u32 << level) as f32;
            let at = pt * scale;

            match self.solve_level(&prev[level], &next[level], at, d) {
                LevelResult::Converged(v) | LevelResult::MaxIter(v) => d = v,
                LevelResult::Singular => {
                    return FlowPoint {
                        from: pt,
                        to: pt + d / scale,
                        status: FlowStatus::Lost,
                    };
                }
            }

            if level > 0 {
                d *= 2.0;
            }
        }

        let to = pt + d;
        let (h, w) = prev[0].dim();
        let status = if to.x >= 0.0 && to.y >= 0.0 && to.x < w as f32 && to.y < h as f32 {
            FlowStatus::Tracked
        } else {
            FlowStatus::OutOfBounds
        };

        FlowPoint {
            from: pt,
            to,
            status,
        }
    }

    fn solve_level(
        &self,
        prev: &GrayImage,
        next: &GrayImage,
        at: na::Point2<f32>,
        mut d: na::Vector2<f32>,
    ) -> LevelResult {
        let half = self.half_window as isize;
        let side = 2 * self.half_window + 1;
        let count = side * side;

        let mut template = Vec::with_capacity(count);
        let mut grads = Vec::with_capacity(count);
        let (mut h00, mut h01, mut h11) = (0.0f32, 0.0f32, 0.0f32);

        for py in -half..=half {
            for px in -half..=half {
                let tx = at.x + px as f32;
                let ty = at.y + py as f32;

                let gx = 0.5 * (bilinear(prev, tx + 1.0, ty) - bilinear(prev, tx - 1.0, ty));
                let gy = 0.5 * (bilinear(prev, tx, ty + 1.0) - bilinear(prev, tx, ty - 1.0));

                h00 += gx * gx;
                h01 += gx * gy;
                h11 += gy * gy;

                template.push(bilinear(prev, tx, ty));
                grads.push((gx, gy));
            }
        }

        let min_eig = crate::features::min_eigenvalue(h00, h01, h11) / count as f32;
        let det = h00 * h11 - h01 * h01;
        if min_eig < self.min_eigenvalue || det.abs() < f32::EPSILON {
            return LevelResult::Singular;
        }

        let inv_det = 1.0 / det;

        for _ in 0..self.max_iterations {
            let (mut b0, mut b1) = (0.0f32, 0.0f32);
            let mut idx = 0;

            for py in -half..=half {
                for px in -half..=half {
                    let wx = at.x + d.x + px as f32;
                    let wy = at.y + d.y + py as f32;
                    let e = template[idx] - bilinear(next, wx, wy);
                    let (gx, gy) = grads[idx];

                    b0 += gx * e;
                    b1 += gy * e;
                    idx += 1;
                }
            }

            let delta = na::Vector2::new(
                inv_det * (h11 * b0 - h01 * b1),
                inv_det * (h00 * b1 - h01 * b0),
            );

            d += delta;

            if delta.norm_squared() < self.epsilon * self.epsilon {
                return LevelResult::Converged(d);
            }
        }

        LevelResult::MaxIter(d)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::pyramid;
    use ndarray::Array2;

    fn scene(h: usize, w: usize, shift_x: f32, shift_y: f32) -> GrayImage {
        Array2::from_shape_fn((h, w), |(y, x)| {
            let x = x as f32 + shift_x;
            let y = y as f32 + shift_y;
            128.0
                + 50.0 * (x / 9.0).sin()
                + 50.0 * (y / 11.0).cos()
                + 20.0 * ((x + y) / 7.0).sin()
        })
    }

    #[test]
    fn identical_frames_give_zero_flow() {
        let img = scene(120, 160, 0.0, 0.0);
        let pyr = pyramid(&img, 2);
        let lk = LucasKanade::new(15, 10, 0.03);

        let points = [na::Point2::new(60.0, 50.0), na::Point2::new(100.0, 70.0)];
        let flows = lk.track(&pyr, &pyr, &points);
        for f in flows {
            assert_eq!(f.status, FlowStatus::Tracked);
            assert_eq!(f.displacement(), na::Vector2::zeros());
        }
    }

    #[test]
    fn recovers_translation() {
        // content moves left by 6 px and up by 2 px
        let prev = scene(160, 200, 0.0, 0.0);
        let next = scene(160, 200, 6.0, 2.0);
        let lk = LucasKanade::new(15, 20, 0.01);

        let flows = lk.track(
            &pyramid(&prev, 2),
            &pyramid(&next, 2),
            &[na::Point2::new(100.0, 80.0), na::Point2::new(60.0, 90.0)],
        );

        for f in flows {
            assert_eq!(f.status, FlowStatus::Tracked);
            let d = f.displacement();
            assert!((d.x + 6.0).abs() < 0.3, "dx = {}", d.x);
            assert!((d.y + 2.0).abs() < 0.3, "dy = {}", d.y);
        }
    }

    #[test]
    fn flat_patch_is_lost() {
        let img = Array2::<f32>::from_elem((60, 60), 128.0);
        let pyr = pyramid(&img, 2);
        let lk = LucasKanade::new(15, 10, 0.03);

        let flows = lk.track(&pyr, &pyr, &[na::Point2::new(30.0, 30.0)]);
        assert_eq!(flows[0].status, FlowStatus::Lost);
    }
}
