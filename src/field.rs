use nalgebra as na;
use tracing::info;

use crate::config::FieldCalibration;
use crate::error::Error;
use crate::track_store::TrackStore;

/// Even-odd containment test against a closed polygon.
pub fn in_bounds(p: na::Point2<f32>, poly: &[na::Point2<f32>]) -> bool {
    let n = poly.len();
    if n < 3 {
        return false;
    }

    let mut inside = false;
    let mut p1 = poly[0];
    let mut xints = 0.0;

    for i in 1..=n {
        let p2 = poly[i % n];

        if p.y > f32::min(p1.y, p2.y) && p.y <= f32::max(p1.y, p2.y) && p.x <= f32::max(p1.x, p2.x)
        {
            if (p1.y - p2.y).abs() > f32::EPSILON {
                xints = (p.y - p1.y) * (p2.x - p1.x) / (p2.y - p1.y) + p1.x;
            }

            if (p1.x - p2.x).abs() < f32::EPSILON || p.x <= xints {
                inside = !inside;
            }
        }

        p1 = p2;
    }

    inside
}

/// Solves the 3x3 homography mapping four `src` points onto four `dst` points.
pub fn homography_from_points(
    src: &[na::Point2<f64>; 4],
    dst: &[na::Point2<f64>; 4],
) -> Option<na::Matrix3<f64>> {
    let mut a = na::SMatrix::<f64, 8, 8>::zeros();
    let mut b = na::SVector::<f64, 8>::zeros();

    for (i, (s, d)) in src.iter().zip(dst.iter()).enumerate() {
        let r = 2 * i;
        let (x, y, u, v) = (s.x, s.y, d.x, d.y);

        a[(r, 0)] = x;
        a[(r, 1)] = y;
        a[(r, 2)] = 1.0;
        a[(r, 6)] = -u * x;
        a[(r, 7)] = -u * y;
        b[r] = u;

        a[(r + 1, 3)] = x;
        a[(r + 1, 4)] = y;
        a[(r + 1, 5)] = 1.0;
        a[(r + 1, 6)] = -v * x;
        a[(r + 1, 7)] = -v * y;
        b[r + 1] = v;
    }

    let h = a.lu().solve(&b)?;
    let m = na::Matrix3::new(h[0], h[1], h[2], h[3], h[4], h[5], h[6], h[7], 1.0);

    if !m.iter().all(|v| v.is_finite()) || m.determinant().abs() < 1e-12 {
        return None;
    }

    Some(m)
}

/// Maps camera-compensated pixel positions onto the field plane.
#[derive(Debug, Clone)]
pub struct FieldProjector {
    quad: Vec<na::Point2<f32>>,
    homography: na::Matrix3<f64>,
}

impl FieldProjector {
    pub fn new(calibration: &FieldCalibration) -> Result<Self, Error> {
        let to_f64 = |p: &[f32; 2]| na::Point2::new(p[0] as f64, p[1] as f64);

        let src = [
            to_f64(&calibration.pixel_vertices[0]),
            to_f64(&calibration.pixel_vertices[1]),
            to_f64(&calibration.pixel_vertices[2]),
            to_f64(&calibration.pixel_vertices[3]),
        ];
        let dst = [
            to_f64(&calibration.field_vertices[0]),
            to_f64(&calibration.field_vertices[1]),
            to_f64(&calibration.field_vertices[2]),
            to_f64(&calibration.field_vertices[3]),
        ];

        let homography = homography_from_points(&src, &dst).ok_or(Error::DegenerateCalibration)?;
        let quad = calibration
            .pixel_vertices
            .iter()
            .map(|p| na::Point2::new(p[0], p[1]))
            .collect();

        Ok(Self { quad, homography })
    }

    #[inline]
    pub fn homography(&self) -> &na::Matrix3<f64> {
        &self.homography
    }

    /// Field-plane point, or `None` outside the calibrated quadrilateral.
    pub fn project(&self, p: na::Point2<f32>) -> Option<na::Point2<f32>> {
        if !in_bounds(p, &self.quad) {
            return None;
        }

        let v = self.homography * na::Vector3::new(p.x as f64, p.y as f64, 1.0);
        if v.z.abs() < f64::EPSILON {
            return None;
        }

        Some(na::Point2::new((v.x / v.z) as f32, (v.y / v.z) as f32))
    }

    /// Writes `position_field` for every record with an adjusted position.
    pub fn annotate(&self, store: &mut TrackStore) {
        let mut projected = 0usize;
        let mut outside = 0usize;

        store.for_each_record_mut(|_, _, _, record| {
            if let Some(p) = record.position_adjusted {
                record.position_field = self.project(p);
                if record.position_field.is_some() {
                    projected += 1;
                } else {
                    outside += 1;
                }
            }
        });

        info!(projected, outside, "positions projected onto the field plane");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rect_calibration() -> FieldCalibration {
        FieldCalibration {
            pixel_vertices: [[0.0, 100.0], [0.0, 0.0], [200.0, 0.0], [200.0, 100.0]],
            field_vertices: [[0.0, 20.0], [0.0, 0.0], [40.0, 0.0], [40.0, 20.0]],
        }
    }

    #[test]
    fn scales_axis_aligned_rectangle() {
        let proj = FieldProjector::new(&rect_calibration()).unwrap();
        let p = proj.project(na::Point2::new(100.0, 50.0)).unwrap();
        assert!((p.x - 20.0).abs() < 1e-4);
        assert!((p.y - 10.0).abs() < 1e-4);
    }

    #[test]
    fn outside_quad_is_none() {
        let proj = FieldProjector::new(&rect_calibration()).unwrap();
        assert_eq!(proj.project(na::Point2::new(250.0, 50.0)), None);
        assert_eq!(proj.project(na::Point2::new(50.0, -5.0)), None);
    }

    #[test]
    fn default_calibration_maps_its_vertices() {
        let cal = FieldCalibration::default();
        let proj = FieldProjector::new(&cal).unwrap();
        let h = proj.homography();

        for (src, dst) in cal.pixel_vertices.iter().zip(cal.field_vertices.iter()) {
            let v = h * na::Vector3::new(src[0] as f64, src[1] as f64, 1.0);
            assert!((v.x / v.z - dst[0] as f64).abs() < 1e-6);
            assert!((v.y / v.z - dst[1] as f64).abs() < 1e-6);
        }

        // a point well inside the trapezoid lands inside the field rectangle
        let p = proj.project(na::Point2::new(900.0, 600.0)).unwrap();
        assert!(p.x > 0.0 && p.x < 23.32);
        assert!(p.y > 0.0 && p.y < 68.0);
    }

    #[test]
    fn collapsed_quad_is_rejected() {
        let cal = FieldCalibration {
            pixel_vertices: [[0.0, 0.0], [0.0, 0.0], [0.0, 0.0], [0.0, 0.0]],
            ..FieldCalibration::default()
        };
        assert!(matches!(
            FieldProjector::new(&cal),
            Err(Error::DegenerateCalibration)
        ));
    }

    #[test]
    fn polygon_containment() {
        let square = vec![
            na::Point2::new(0.0, 0.0),
            na::Point2::new(10.0, 0.0),
            na::Point2::new(10.0, 10.0),
            na::Point2::new(0.0, 10.0),
        ];
        assert!(in_bounds(na::Point2::new(5.0, 5.0), &square));
        assert!(!in_bounds(na::Point2::new(15.0, 5.0), &square));
        assert!(!in_bounds(na::Point2::new(5.0, -1.0), &square));
    }
}
