use bytes::Bytes;

use super::{StreamKind, StreamProfile};

/// A single stream frame as delivered by the device
#[derive(Debug, Clone)]
pub struct VideoFrame {
    /// Profile of the stream this frame belongs to
    pub profile: StreamProfile,
    pub width: u32,
    pub height: u32,
    /// Bytes per row
    pub stride: u32,
    /// Device timestamp in milliseconds
    pub timestamp_ms: f64,
    /// Running counter per stream
    pub frame_number: u64,
    /// Immutable pixel data, shared without copying
    pub data: Bytes,
}

/// How raw 16-bit depth samples translate to meters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DepthUnits {
    /// meters = raw * scale
    Linear { scale: f32 },
    /// meters = baseline_focal / raw, for disparity streams
    Disparity { baseline_focal: f32 },
}

impl DepthUnits {
    pub fn to_meters(&self, raw: u16) -> f32 {
        if raw == 0 {
            return 0.0;
        }
        match *self {
            DepthUnits::Linear { scale } => raw as f32 * scale,
            DepthUnits::Disparity { baseline_focal } => baseline_focal / raw as f32,
        }
    }
}

/// Depth frame with the device's own distance conversion.
#[derive(Debug, Clone)]
pub struct DepthFrame {
    pub frame: VideoFrame,
    pub units: DepthUnits,
}

impl DepthFrame {
    /// Raw sample at (x, y), or `None` outside the image.
    pub fn raw(&self, x: u32, y: u32) -> Option<u16> {
        if x >= self.frame.width || y >= self.frame.height {
            return None;
        }
        let offset = (y as usize) * (self.frame.stride as usize) + (x as usize) * 2;
        let bytes = self.frame.data.get(offset..offset + 2)?;
        Some(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    /// Distance in meters at (x, y); 0 where there is no measurement.
    pub fn distance(&self, x: u32, y: u32) -> f32 {
        self.raw(x, y).map(|raw| self.units.to_meters(raw)).unwrap_or(0.0)
    }

    /// All samples in row order, ignoring stride padding.
    pub fn samples(&self) -> Vec<u16> {
        let mut out = Vec::with_capacity((self.frame.width * self.frame.height) as usize);
        for y in 0..self.frame.height {
            for x in 0..self.frame.width {
                out.push(self.raw(x, y).unwrap_or(0));
            }
        }
        out
    }
}

/// Synchronized bundle of frames captured at about the same instant.
#[derive(Debug, Clone, Default)]
pub struct FrameSet {
    pub color: Option<VideoFrame>,
    pub depth: Option<DepthFrame>,
}

impl FrameSet {
    pub fn color_frame(&self) -> Option<&VideoFrame> {
        self.color.as_ref()
    }

    pub fn depth_frame(&self) -> Option<&DepthFrame> {
        self.depth.as_ref()
    }

    pub fn has(&self, kind: StreamKind) -> bool {
        match kind {
            StreamKind::Color => self.color.is_some(),
            StreamKind::Depth => self.depth.is_some(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::format::NativeFormat;

    fn depth_frame(samples: &[u16], width: u32, units: DepthUnits) -> DepthFrame {
        let data: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        let height = samples.len() as u32 / width;
        DepthFrame {
            frame: VideoFrame {
                profile: StreamProfile {
                    kind: StreamKind::Depth,
                    format: NativeFormat::Z16,
                    width,
                    height,
                    fps: 30,
                    unique_id: 1,
                },
                width,
                height,
                stride: width * 2,
                timestamp_ms: 0.0,
                frame_number: 0,
                data: Bytes::from(data),
            },
            units,
        }
    }

    #[test]
    fn test_linear_distance() {
        let frame = depth_frame(&[0, 1000, 2500, 40], 2, DepthUnits::Linear { scale: 0.001 });
        assert_eq!(frame.distance(0, 0), 0.0);
        assert!((frame.distance(1, 0) - 1.0).abs() < 1e-6);
        assert!((frame.distance(0, 1) - 2.5).abs() < 1e-6);
        assert_eq!(frame.distance(2, 0), 0.0);
    }

    #[test]
    fn test_disparity_distance() {
        let frame = depth_frame(&[0, 50], 2, DepthUnits::Disparity { baseline_focal: 25.0 });
        assert_eq!(frame.distance(0, 0), 0.0);
        assert!((frame.distance(1, 0) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_samples_skip_padding() {
        let mut frame = depth_frame(&[1, 2, 0, 3, 4, 0], 3, DepthUnits::Linear { scale: 1.0 });
        frame.frame.width = 2;
        frame.frame.stride = 6;
        assert_eq!(frame.samples(), vec![1, 2, 3, 4]);
    }
}
