//! Camera geometry: stream intrinsics, rigid extrinsics and the projection
//! helpers used by alignment and field-of-view queries.

pub mod align;

use serde::{Deserialize, Serialize};

/// Lens distortion model reported for a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DistortionModel {
    None,
    /// Distortion applied to points when projecting them to pixels.
    BrownConrady,
    /// Like `BrownConrady`, with the radial term applied before tangential.
    ModifiedBrownConrady,
    /// Distortion removed from pixels when deprojecting them to rays.
    InverseBrownConrady,
}

/// Per-stream pinhole geometry.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Intrinsics {
    pub width: u32,
    pub height: u32,
    /// Focal length along x, in pixels
    pub fx: f32,
    /// Focal length along y, in pixels
    pub fy: f32,
    /// Principal point x, in pixels from the left edge
    pub ppx: f32,
    /// Principal point y, in pixels from the top edge
    pub ppy: f32,
    pub model: DistortionModel,
    /// k1, k2, p1, p2, k3
    pub coeffs: [f32; 5],
}

impl Intrinsics {
    /// Horizontal and vertical field of view in degrees.
    pub fn fov(&self) -> (f32, f32) {
        let w = self.width as f32;
        let h = self.height as f32;
        let hfov = ((self.ppx + 0.5).atan2(self.fx) + (w - (self.ppx + 0.5)).atan2(self.fx)).to_degrees();
        let vfov = ((self.ppy + 0.5).atan2(self.fy) + (h - (self.ppy + 0.5)).atan2(self.fy)).to_degrees();
        (hfov, vfov)
    }

    /// Projects a 3D point in this stream's frame (meters) to a pixel.
    pub fn project(&self, point: [f32; 3]) -> [f32; 2] {
        let mut x = point[0] / point[2];
        let mut y = point[1] / point[2];
        let c = &self.coeffs;

        match self.model {
            DistortionModel::ModifiedBrownConrady => {
                let r2 = x * x + y * y;
                let f = 1.0 + c[0] * r2 + c[1] * r2 * r2 + c[4] * r2 * r2 * r2;
                x *= f;
                y *= f;
                let dx = x + 2.0 * c[2] * x * y + c[3] * (r2 + 2.0 * x * x);
                let dy = y + 2.0 * c[3] * x * y + c[2] * (r2 + 2.0 * y * y);
                x = dx;
                y = dy;
            }
            DistortionModel::BrownConrady => {
                let r2 = x * x + y * y;
                let f = 1.0 + c[0] * r2 + c[1] * r2 * r2 + c[4] * r2 * r2 * r2;
                let dx = x * f + 2.0 * c[2] * x * y + c[3] * (r2 + 2.0 * x * x);
                let dy = y * f + 2.0 * c[3] * x * y + c[2] * (r2 + 2.0 * y * y);
                x = dx;
                y = dy;
            }
            DistortionModel::None | DistortionModel::InverseBrownConrady => {}
        }

        [x * self.fx + self.ppx, y * self.fy + self.ppy]
    }

    /// Turns a pixel and its depth (meters) into a 3D point in this stream's frame.
    pub fn deproject(&self, pixel: [f32; 2], depth: f32) -> [f32; 3] {
        let mut x = (pixel[0] - self.ppx) / self.fx;
        let mut y = (pixel[1] - self.ppy) / self.fy;
        let c = &self.coeffs;

        match self.model {
            DistortionModel::InverseBrownConrady => {
                let r2 = x * x + y * y;
                let f = 1.0 + c[0] * r2 + c[1] * r2 * r2 + c[4] * r2 * r2 * r2;
                let ux = x * f + 2.0 * c[2] * x * y + c[3] * (r2 + 2.0 * x * x);
                let uy = y * f + 2.0 * c[3] * x * y + c[2] * (r2 + 2.0 * y * y);
                x = ux;
                y = uy;
            }
            DistortionModel::BrownConrady => {
                // No closed form; a few fixed-point iterations converge for realistic lenses
                let (xo, yo) = (x, y);
                for _ in 0..10 {
                    let r2 = x * x + y * y;
                    let icdist = 1.0 / (1.0 + ((c[4] * r2 + c[1]) * r2 + c[0]) * r2);
                    let delta_x = 2.0 * c[2] * x * y + c[3] * (r2 + 2.0 * x * x);
                    let delta_y = 2.0 * c[3] * x * y + c[2] * (r2 + 2.0 * y * y);
                    x = (xo - delta_x) * icdist;
                    y = (yo - delta_y) * icdist;
                }
            }
            DistortionModel::None | DistortionModel::ModifiedBrownConrady => {}
        }

        [depth * x, depth * y, depth]
    }
}

/// Rigid transform between two stream coordinate frames.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Extrinsics {
    /// Column-major 3x3 rotation
    pub rotation: [f32; 9],
    /// Translation in meters
    pub translation: [f32; 3],
}

impl Extrinsics {
    pub const IDENTITY: Extrinsics = Extrinsics {
        rotation: [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0],
        translation: [0.0; 3],
    };

    pub fn transform(&self, p: [f32; 3]) -> [f32; 3] {
        let r = &self.rotation;
        let t = &self.translation;
        [
            r[0] * p[0] + r[3] * p[1] + r[6] * p[2] + t[0],
            r[1] * p[0] + r[4] * p[1] + r[7] * p[2] + t[1],
            r[2] * p[0] + r[5] * p[1] + r[8] * p[2] + t[2],
        ]
    }

    /// The transform going the other way.
    pub fn inverse(&self) -> Extrinsics {
        let r = &self.rotation;
        // Transposing a column-major rotation
        let rotation = [r[0], r[3], r[6], r[1], r[4], r[7], r[2], r[5], r[8]];
        let t = &self.translation;
        let translation = [
            -(rotation[0] * t[0] + rotation[3] * t[1] + rotation[6] * t[2]),
            -(rotation[1] * t[0] + rotation[4] * t[1] + rotation[7] * t[2]),
            -(rotation[2] * t[0] + rotation[5] * t[1] + rotation[8] * t[2]),
        ];
        Extrinsics { rotation, translation }
    }

    /// Row-major homogeneous 4x4 matrix.
    pub fn to_matrix(&self) -> [[f64; 4]; 4] {
        let r = &self.rotation;
        let t = &self.translation;
        [
            [r[0] as f64, r[3] as f64, r[6] as f64, t[0] as f64],
            [r[1] as f64, r[4] as f64, r[7] as f64, t[1] as f64],
            [r[2] as f64, r[5] as f64, r[8] as f64, t[2] as f64],
            [0.0, 0.0, 0.0, 1.0],
        ]
    }

    /// Builds the transform from a row-major homogeneous matrix.
    pub fn from_matrix(m: &[[f64; 4]; 4]) -> Extrinsics {
        Extrinsics {
            rotation: [
                m[0][0] as f32,
                m[1][0] as f32,
                m[2][0] as f32,
                m[0][1] as f32,
                m[1][1] as f32,
                m[2][1] as f32,
                m[0][2] as f32,
                m[1][2] as f32,
                m[2][2] as f32,
            ],
            translation: [m[0][3] as f32, m[1][3] as f32, m[2][3] as f32],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pinhole(width: u32, height: u32, model: DistortionModel) -> Intrinsics {
        Intrinsics {
            width,
            height,
            fx: 600.0,
            fy: 600.0,
            ppx: width as f32 / 2.0,
            ppy: height as f32 / 2.0,
            model,
            coeffs: [0.0; 5],
        }
    }

    #[test]
    fn test_fov_is_symmetric_for_centered_principal_point() {
        let intrin = pinhole(640, 480, DistortionModel::None);
        let (h, v) = intrin.fov();
        let expected_h = 2.0 * (320.0f32 / 600.0).atan().to_degrees();
        assert!((h - expected_h).abs() < 0.2);
        assert!(v < h);
    }

    #[test]
    fn test_project_deproject() {
        let mut intrin = pinhole(640, 480, DistortionModel::BrownConrady);
        intrin.coeffs = [0.05, -0.01, 0.001, 0.0005, 0.0];
        let point = intrin.deproject([100.0, 400.0], 2.0);
        let pixel = intrin.project(point);
        assert!((pixel[0] - 100.0).abs() < 0.05);
        assert!((pixel[1] - 400.0).abs() < 0.05);
    }

    #[test]
    fn test_inverse_extrinsics() {
        let ext = Extrinsics {
            // 90 degrees about z
            rotation: [0.0, 1.0, 0.0, -1.0, 0.0, 0.0, 0.0, 0.0, 1.0],
            translation: [0.1, -0.2, 0.3],
        };
        let p = [1.0, 2.0, 3.0];
        let back = ext.inverse().transform(ext.transform(p));
        for i in 0..3 {
            assert!((back[i] - p[i]).abs() < 1e-5);
        }
    }

    #[test]
    fn test_matrix_conversion() {
        let ext = Extrinsics {
            rotation: [0.0, 1.0, 0.0, -1.0, 0.0, 0.0, 0.0, 0.0, 1.0],
            translation: [0.015, 0.0, 0.0],
        };
        let m = ext.to_matrix();
        assert_eq!(m[3], [0.0, 0.0, 0.0, 1.0]);
        assert!((m[0][3] - 0.015).abs() < 1e-6);
        assert_eq!(Extrinsics::from_matrix(&m), ext);
    }
}
