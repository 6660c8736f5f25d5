use std::path::Path;

use ndarray::prelude::*;
use opencv::{core, prelude::*, videoio};
use tracing::info;

use crate::error::Error;
use crate::image::Frame;
use crate::pipeline::Video;

/// Decodes every frame of `path` into BGR arrays.
pub fn read_video<P: AsRef<Path>>(path: P) -> Result<Video, Error> {
    let identity = path.as_ref().to_string_lossy().to_string();

    let mut cam = videoio::VideoCapture::from_file(&identity, videoio::CAP_ANY)?;
    if !videoio::VideoCapture::is_opened(&cam)? {
        return Err(Error::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("unable to open video {}", identity),
        )));
    }

    let mut frames = Vec::new();
    let mut mat = core::Mat::default();

    while cam.read(&mut mat)? {
        if mat.rows() == 0 || mat.cols() == 0 {
            break;
        }

        frames.push(mat_to_frame(&mat)?);
    }

    info!(video = %identity, frames = frames.len(), "video decoded");

    Ok(Video { identity, frames })
}

fn mat_to_frame(mat: &core::Mat) -> Result<Frame, Error> {
    let (rows, cols) = (mat.rows() as usize, mat.cols() as usize);
    let mut frame = Array3::<u8>::zeros((rows, cols, 3));

    for (r, mut row) in frame.outer_iter_mut().enumerate() {
        let pixels = mat.at_row::<core::Vec3b>(r as i32)?;

        for (c, px) in pixels.iter().enumerate().take(cols) {
            for ch in 0..3 {
                row[[c, ch]] = px[ch];
            }
        }
    }

    Ok(frame)
}
