use ndarray::prelude::*;

use crate::bbox::BBox;

/// Decoded frame, `(rows, cols, 3)` in BGR channel order.
pub type Frame = Array3<u8>;

/// Single channel intensity image used by the feature detector and optical flow.
pub type GrayImage = Array2<f32>;

#[inline]
pub fn dims(frame: &Frame) -> (usize, usize) {
    let shape = frame.shape();
    (shape[1], shape[0])
}

pub fn to_gray(frame: ArrayView3<'_, u8>) -> GrayImage {
    let (h, w) = (frame.shape()[0], frame.shape()[1]);

    Array2::from_shape_fn((h, w), |(y, x)| {
        0.114 * frame[[y, x, 0]] as f32
            + 0.587 * frame[[y, x, 1]] as f32
            + 0.299 * frame[[y, x, 2]] as f32
    })
}

/// Samples `img` at a sub-pixel location, clamping to the border.
#[inline]
pub fn bilinear(img: &GrayImage, x: f32, y: f32) -> f32 {
    let (h, w) = img.dim();
    let max_x = (w - 1) as f32;
    let max_y = (h - 1) as f32;

    let x = x.clamp(0.0, max_x);
    let y = y.clamp(0.0, max_y);

    let x0 = x.floor() as usize;
    let y0 = y.floor() as usize;
    let x1 = (x0 + 1).min(w - 1);
    let y1 = (y0 + 1).min(h - 1);

    let ax = x - x0 as f32;
    let ay = y - y0 as f32;

    let top = img[[y0, x0]] * (1.0 - ax) + img[[y0, x1]] * ax;
    let bottom = img[[y1, x0]] * (1.0 - ax) + img[[y1, x1]] * ax;

    top * (1.0 - ay) + bottom * ay
}

const PYR_KERNEL: [f32; 5] = [1.0 / 16.0, 4.0 / 16.0, 6.0 / 16.0, 4.0 / 16.0, 1.0 / 16.0];

/// Gaussian blur followed by 2x decimation.
pub fn pyr_down(img: &GrayImage) -> GrayImage {
    let (h, w) = img.dim();
    let clamp = |v: isize, n: usize| v.clamp(0, n as isize - 1) as usize;

    let mut rows = Array2::<f32>::zeros((h, (w + 1) / 2));
    for y in 0..h {
        for (ox, x) in (0..w).step_by(2).enumerate() {
            let mut acc = 0.0;
            for (k, weight) in PYR_KERNEL.iter().enumerate() {
                acc += weight * img[[y, clamp(x as isize + k as isize - 2, w)]];
            }
            rows[[y, ox]] = acc;
        }
    }

    let mut out = Array2::<f32>::zeros(((h + 1) / 2, (w + 1) / 2));
    for (oy, y) in (0..h).step_by(2).enumerate() {
        for ox in 0..out.ncols() {
            let mut acc = 0.0;
            for (k, weight) in PYR_KERNEL.iter().enumerate() {
                acc += weight * rows[[clamp(y as isize + k as isize - 2, h), ox]];
            }
            out[[oy, ox]] = acc;
        }
    }

    out
}

/// Levels `0..=max_level`, level 0 being the input itself.
pub fn pyramid(img: &GrayImage, max_level: usize) -> Vec<GrayImage> {
    let mut levels = Vec::with_capacity(max_level + 1);
    levels.push(img.clone());

    for _ in 0..max_level {
        let last = &levels[levels.len() - 1];
        if last.nrows() < 8 || last.ncols() < 8 {
            break;
        }

        let next = pyr_down(last);
        levels.push(next);
    }

    levels
}

/// Pixel region covered by `bbox`, truncated to integers and clipped to the frame.
pub fn crop<'a>(frame: &'a Frame, bbox: &BBox) -> Option<ArrayView3<'a, u8>> {
    let (w, h) = dims(frame);
    let x1 = (bbox.left().max(0.0) as usize).min(w);
    let y1 = (bbox.top().max(0.0) as usize).min(h);
    let x2 = (bbox.right().max(0.0) as usize).min(w);
    let y2 = (bbox.bottom().max(0.0) as usize).min(h);

    if x2 <= x1 || y2 <= y1 {
        return None;
    }

    Some(frame.slice(s![y1..y2, x1..x2, ..]))
}
