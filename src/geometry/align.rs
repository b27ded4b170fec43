//! Reprojection of a depth image onto another stream's pixel grid.

use super::{Extrinsics, Intrinsics};

/// Reprojects raw depth samples onto the `to` stream's pixel grid.
///
/// Every non-zero depth pixel is deprojected at both of its corners, moved
/// into the target frame and projected again; the covered target pixels
/// receive the raw sample. Where several samples land on the same target
/// pixel the nearest one wins. Target pixels nothing lands on stay 0.
pub fn align_depth(
    depth: &[u16],
    from: &Intrinsics,
    extrinsics: &Extrinsics,
    to: &Intrinsics,
    to_meters: impl Fn(u16) -> f32,
) -> Vec<u16> {
    let out_w = to.width as usize;
    let out_h = to.height as usize;
    let mut aligned = vec![0u16; out_w * out_h];

    let in_w = from.width as usize;
    let in_h = from.height as usize;

    for y in 0..in_h {
        for x in 0..in_w {
            let raw = match depth.get(y * in_w + x) {
                Some(&raw) if raw != 0 => raw,
                _ => continue,
            };
            let meters = to_meters(raw);
            if meters <= 0.0 {
                continue;
            }

            let (x0, y0) = corner(from, extrinsics, to, [x as f32 - 0.5, y as f32 - 0.5], meters);
            let (x1, y1) = corner(from, extrinsics, to, [x as f32 + 0.5, y as f32 + 0.5], meters);

            // Corners may come out swapped, e.g. under a rolled extrinsic
            let (left, right) = (x0.min(x1), x0.max(x1));
            let (top, bottom) = (y0.min(y1), y0.max(y1));
            if left < 0 || top < 0 || right >= out_w as i64 || bottom >= out_h as i64 {
                continue;
            }

            for ty in top as usize..=bottom as usize {
                for tx in left as usize..=right as usize {
                    let slot = &mut aligned[ty * out_w + tx];
                    *slot = if *slot == 0 { raw } else { (*slot).min(raw) };
                }
            }
        }
    }

    aligned
}

fn corner(from: &Intrinsics, extrinsics: &Extrinsics, to: &Intrinsics, pixel: [f32; 2], meters: f32) -> (i64, i64) {
    let point = extrinsics.transform(from.deproject(pixel, meters));
    let target = to.project(point);
    ((target[0] + 0.5).floor() as i64, (target[1] + 0.5).floor() as i64)
}
