use std::time::{SystemTime, UNIX_EPOCH};

use super::format::PixelCode;

/// Color image with a runtime pixel type.
#[derive(Debug, Clone, PartialEq)]
pub struct FlexImage {
    pub pixel_code: PixelCode,
    pub width: u32,
    pub height: u32,
    data: Vec<u8>,
}

impl FlexImage {
    pub fn new(pixel_code: PixelCode, width: u32, height: u32, data: Vec<u8>) -> Self {
        Self {
            pixel_code,
            width,
            height,
            data,
        }
    }

    pub fn raw_image(&self) -> &[u8] {
        &self.data
    }

    pub fn raw_image_size(&self) -> usize {
        self.data.len()
    }

    /// RGB copy of the image for export; `None` for non-color pixel types.
    pub fn to_rgb_image(&self) -> Option<image::RgbImage> {
        let rgb: Vec<u8> = match self.pixel_code {
            PixelCode::Rgb => self.data.clone(),
            PixelCode::Bgr => self.data.chunks_exact(3).flat_map(|p| [p[2], p[1], p[0]]).collect(),
            PixelCode::Rgba => self.data.chunks_exact(4).flat_map(|p| [p[0], p[1], p[2]]).collect(),
            PixelCode::Bgra => self.data.chunks_exact(4).flat_map(|p| [p[2], p[1], p[0]]).collect(),
            PixelCode::Mono => self.data.iter().flat_map(|&v| [v, v, v]).collect(),
            PixelCode::Mono16 | PixelCode::Invalid => return None,
        };
        image::RgbImage::from_raw(self.width, self.height, rgb)
    }
}

/// Depth image, one distance in meters per pixel.
#[derive(Debug, Clone, PartialEq)]
pub struct DepthImage {
    pub width: u32,
    pub height: u32,
    data: Vec<f32>,
}

impl DepthImage {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0.0; (width * height) as usize],
        }
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<f32> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.data.get((y * self.width + x) as usize).copied()
    }

    pub fn set_pixel(&mut self, x: u32, y: u32, meters: f32) {
        if x < self.width && y < self.height {
            self.data[(y * self.width + x) as usize] = meters;
        }
    }

    /// 16-bit grayscale rendering in millimeters, saturating at 65.535 m.
    pub fn to_luma16_mm(&self) -> Option<image::ImageBuffer<image::Luma<u16>, Vec<u16>>> {
        let mm = self
            .data
            .iter()
            .map(|m| (m * 1000.0).round().clamp(0.0, u16::MAX as f32) as u16)
            .collect();
        image::ImageBuffer::from_raw(self.width, self.height, mm)
    }
}

/// Sequence number and wall-clock time of an acquisition.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Stamp {
    pub sequence: u32,
    /// Seconds since the Unix epoch
    pub time: f64,
}

impl Stamp {
    /// Advances the sequence and takes the current time.
    pub fn update(&mut self) {
        self.sequence = self.sequence.wrapping_add(1);
        self.time = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or_default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stamp_update() {
        let mut stamp = Stamp::default();
        stamp.update();
        let first = stamp;
        stamp.update();
        assert_eq!(stamp.sequence, first.sequence + 1);
        assert!(stamp.time >= first.time);
        assert!(first.time > 0.0);
    }

    #[test]
    fn test_bgr_export_swaps_channels() {
        let img = FlexImage::new(PixelCode::Bgr, 1, 1, vec![1, 2, 3]);
        let rgb = img.to_rgb_image().unwrap();
        assert_eq!(rgb.get_pixel(0, 0).0, [3, 2, 1]);
        assert!(FlexImage::new(PixelCode::Mono16, 1, 1, vec![0, 0]).to_rgb_image().is_none());
    }

    #[test]
    fn test_depth_pixels() {
        let mut depth = DepthImage::new(4, 2);
        depth.set_pixel(3, 1, 1.25);
        assert_eq!(depth.pixel(3, 1), Some(1.25));
        assert_eq!(depth.pixel(4, 1), None);
        let mm = depth.to_luma16_mm().unwrap();
        assert_eq!(mm.get_pixel(3, 1).0, [1250]);
    }
}
