//! Mapping between the device's native pixel encodings and the abstract
//! pixel codes exposed by the RGB-D sensor contract.

use serde::{Deserialize, Serialize};

/// Pixel encodings a device backend can deliver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NativeFormat {
    Any,
    Z16,
    Disparity16,
    Xyz32f,
    Yuyv,
    Uyvy,
    Rgb8,
    Bgr8,
    Rgba8,
    Bgra8,
    Y8,
    Y16,
    Raw8,
    Raw10,
    Raw16,
    Mjpeg,
    MotionXyz32f,
}

/// Abstract pixel codes, packed the same way as four-character vocabs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PixelCode {
    Invalid,
    Mono,
    Mono16,
    Rgb,
    Bgr,
    Rgba,
    Bgra,
}

const fn vocab(tag: &[u8]) -> i32 {
    let mut code = 0i32;
    let mut i = 0;
    while i < tag.len() && i < 4 {
        code |= (tag[i] as i32) << (8 * i);
        i += 1;
    }
    code
}

impl PixelCode {
    /// Integer code of this pixel type; `Invalid` is 0.
    pub const fn code(self) -> i32 {
        match self {
            PixelCode::Invalid => 0,
            PixelCode::Mono => vocab(b"mono"),
            PixelCode::Mono16 => vocab(b"mo16"),
            PixelCode::Rgb => vocab(b"rgb"),
            PixelCode::Bgr => vocab(b"bgr"),
            PixelCode::Rgba => vocab(b"rgba"),
            PixelCode::Bgra => vocab(b"bgra"),
        }
    }

    pub fn is_valid(self) -> bool {
        self != PixelCode::Invalid
    }
}

/// Maps a native format to its pixel code and size in bytes.
///
/// Unknown formats yield `(PixelCode::Invalid, 0)`.
pub fn map_format(format: NativeFormat) -> (PixelCode, usize) {
    (pixel_code(format), bytes_per_pixel(format))
}

pub fn pixel_code(format: NativeFormat) -> PixelCode {
    match format {
        NativeFormat::Rgb8 => PixelCode::Rgb,
        NativeFormat::Bgr8 => PixelCode::Bgr,
        NativeFormat::Rgba8 => PixelCode::Rgba,
        NativeFormat::Bgra8 => PixelCode::Bgra,
        NativeFormat::Z16
        | NativeFormat::Disparity16
        | NativeFormat::Y16
        | NativeFormat::Raw16 => PixelCode::Mono16,
        NativeFormat::Y8 | NativeFormat::Raw8 => PixelCode::Mono,
        _ => PixelCode::Invalid,
    }
}

pub fn bytes_per_pixel(format: NativeFormat) -> usize {
    match format {
        NativeFormat::Raw8 | NativeFormat::Y8 => 1,
        NativeFormat::Z16 | NativeFormat::Disparity16 | NativeFormat::Y16 | NativeFormat::Raw16 => 2,
        NativeFormat::Rgb8 | NativeFormat::Bgr8 => 3,
        NativeFormat::Rgba8 | NativeFormat::Bgra8 => 4,
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [NativeFormat; 17] = [
        NativeFormat::Any,
        NativeFormat::Z16,
        NativeFormat::Disparity16,
        NativeFormat::Xyz32f,
        NativeFormat::Yuyv,
        NativeFormat::Uyvy,
        NativeFormat::Rgb8,
        NativeFormat::Bgr8,
        NativeFormat::Rgba8,
        NativeFormat::Bgra8,
        NativeFormat::Y8,
        NativeFormat::Y16,
        NativeFormat::Raw8,
        NativeFormat::Raw10,
        NativeFormat::Raw16,
        NativeFormat::Mjpeg,
        NativeFormat::MotionXyz32f,
    ];

    #[test]
    fn test_mapped_formats_have_size() {
        for format in ALL {
            let (code, bpp) = map_format(format);
            if code.is_valid() {
                assert!(bpp > 0, "{:?} mapped without a size", format);
            } else {
                assert_eq!(bpp, 0, "{:?} has a size but no code", format);
            }
        }
    }

    #[test]
    fn test_known_mappings() {
        assert_eq!(map_format(NativeFormat::Rgb8), (PixelCode::Rgb, 3));
        assert_eq!(map_format(NativeFormat::Bgra8), (PixelCode::Bgra, 4));
        assert_eq!(map_format(NativeFormat::Z16), (PixelCode::Mono16, 2));
        assert_eq!(map_format(NativeFormat::Raw8), (PixelCode::Mono, 1));
    }

    #[test]
    fn test_unmapped_formats_are_invalid() {
        for format in [NativeFormat::Yuyv, NativeFormat::Mjpeg, NativeFormat::Raw10, NativeFormat::Any] {
            assert_eq!(map_format(format), (PixelCode::Invalid, 0));
        }
    }

    #[test]
    fn test_vocab_codes() {
        assert_eq!(PixelCode::Rgb.code(), 0x0062_6772);
        assert_eq!(PixelCode::Invalid.code(), 0);
        assert_ne!(PixelCode::Mono.code(), PixelCode::Mono16.code());
    }
}
