//! Conversion of a received frame set into the driver's output images.

use tracing::{debug, error};

use super::format::map_format;
use super::image::{DepthImage, FlexImage, Stamp};
use crate::backend::{FrameSet, StreamKind};
use crate::error::{DriverError, Result};
use crate::geometry::Intrinsics;

/// Copies the color frame of `frames` into a new image and stamps it.
///
/// The expected buffer size comes from the cached color intrinsics rather
/// than from the frame, so a frame that no longer matches the calibration is
/// rejected. `stamp` is only advanced on success.
pub fn color_image(frames: &FrameSet, color: &Intrinsics, stamp: &mut Stamp) -> Result<(FlexImage, Stamp)> {
    let frame = frames
        .color_frame()
        .ok_or(DriverError::MissingSubFrame(StreamKind::Color))?;

    let format = frame.profile.format;
    let (pixel_code, bpp) = map_format(format);
    if !pixel_code.is_valid() {
        error!("Pixel format {:?} not recognized", format);
        return Err(DriverError::UnsupportedPixelFormat(format));
    }

    let expected = color.width as usize * color.height as usize * bpp;
    if frame.data.len() != expected {
        error!(
            expected,
            actual = frame.data.len(),
            "Device and local copy data size doesn't match"
        );
        return Err(DriverError::SizeMismatch {
            expected,
            actual: frame.data.len(),
        });
    }

    let image = FlexImage::new(pixel_code, color.width, color.height, frame.data.to_vec());
    stamp.update();
    debug!(frame = frame.frame_number, seq = stamp.sequence, "Color image ready");
    Ok((image, *stamp))
}

/// Converts the depth frame of `frames` to meters and stamps it.
pub fn depth_image(frames: &FrameSet, stamp: &mut Stamp) -> Result<(DepthImage, Stamp)> {
    let depth = frames
        .depth_frame()
        .ok_or(DriverError::MissingSubFrame(StreamKind::Depth))?;

    let format = depth.frame.profile.format;
    let (pixel_code, bpp) = map_format(format);
    if !pixel_code.is_valid() {
        error!("Pixel format {:?} not recognized", format);
        return Err(DriverError::UnsupportedPixelFormat(format));
    }

    let (w, h) = (depth.frame.width, depth.frame.height);
    let needed = if h == 0 {
        0
    } else {
        depth.frame.stride as usize * (h as usize - 1) + w as usize * bpp
    };
    if depth.frame.data.len() < needed {
        return Err(DriverError::SizeMismatch {
            expected: needed,
            actual: depth.frame.data.len(),
        });
    }

    let mut image = DepthImage::new(w, h);
    for y in 0..h {
        for x in 0..w {
            image.set_pixel(x, y, depth.distance(x, y));
        }
    }

    stamp.update();
    debug!(frame = depth.frame.frame_number, seq = stamp.sequence, "Depth image ready");
    Ok((image, *stamp))
}
