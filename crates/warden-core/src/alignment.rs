//! Face alignment via 4-DOF similarity transform.
//!
//! Maps five detected landmarks onto the InsightFace reference positions with a
//! least-squares fit and warps the face into a fixed square crop.

/// ArcFace reference landmarks for a 112×112 output.
pub const REFERENCE_LANDMARKS_112: [(f32, f32); 5] = [
    (38.2946, 51.6963), // left eye
    (73.5318, 51.5014), // right eye
    (56.0252, 71.7366), // nose
    (41.5493, 92.3655), // left mouth
    (70.7299, 92.2041), // right mouth
];

pub const ALIGNED_SIZE: usize = 112;

/// Below this scale the landmarks are collapsed onto (nearly) one point.
const MIN_DETERMINANT: f32 = 1e-12;

/// Landmarks closer together than this (squared pixels) cannot be aligned.
const MIN_SPREAD: f32 = 1.0;

/// Similarity transform `dst = [[a, -b], [b, a]] * src + [tx, ty]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Similarity {
    pub a: f32,
    pub b: f32,
    pub tx: f32,
    pub ty: f32,
}

impl Similarity {
    /// Least-squares estimate from `src` landmarks to `dst` landmarks.
    ///
    /// Each point pair contributes two rows to the overdetermined system
    /// `[sx, -sy, 1, 0]·p = dx` and `[sy, sx, 0, 1]·p = dy`, solved through
    /// the normal equations. Returns `None` for degenerate input.
    pub fn estimate(src: &[(f32, f32); 5], dst: &[(f32, f32); 5]) -> Option<Self> {
        if spread(src) < MIN_SPREAD {
            return None;
        }

        let mut ata = [[0.0f32; 4]; 4];
        let mut atb = [0.0f32; 4];

        for (&(sx, sy), &(dx, dy)) in src.iter().zip(dst.iter()) {
            let r1 = [sx, -sy, 1.0, 0.0];
            let r2 = [sy, sx, 0.0, 1.0];
            for j in 0..4 {
                for k in 0..4 {
                    ata[j][k] += r1[j] * r1[k] + r2[j] * r2[k];
                }
                atb[j] += r1[j] * dx + r2[j] * dy;
            }
        }

        let [a, b, tx, ty] = solve_4x4(ata, atb)?;
        let t = Self { a, b, tx, ty };
        (t.determinant() > MIN_DETERMINANT).then_some(t)
    }

    fn determinant(&self) -> f32 {
        self.a * self.a + self.b * self.b
    }

    /// Map a destination pixel back into source space.
    fn invert_point(&self, x: f32, y: f32) -> (f32, f32) {
        let inv = 1.0 / self.determinant();
        let (ia, ib) = (self.a * inv, self.b * inv);
        let (dx, dy) = (x - self.tx, y - self.ty);
        (ia * dx + ib * dy, -ib * dx + ia * dy)
    }
}

/// Mean squared distance of the points from their centroid.
fn spread(points: &[(f32, f32); 5]) -> f32 {
    let n = points.len() as f32;
    let cx = points.iter().map(|p| p.0).sum::<f32>() / n;
    let cy = points.iter().map(|p| p.1).sum::<f32>() / n;
    points
        .iter()
        .map(|&(x, y)| (x - cx).powi(2) + (y - cy).powi(2))
        .sum::<f32>()
        / n
}

/// Gaussian elimination with partial pivoting.
#[allow(clippy::needless_range_loop)]
fn solve_4x4(a: [[f32; 4]; 4], b: [f32; 4]) -> Option<[f32; 4]> {
    let mut m = [[0.0f32; 5]; 4];
    for i in 0..4 {
        m[i][..4].copy_from_slice(&a[i]);
        m[i][4] = b[i];
    }

    for col in 0..4 {
        let pivot_row = (col..4)
            .max_by(|&r1, &r2| m[r1][col].abs().total_cmp(&m[r2][col].abs()))
            .unwrap_or(col);
        m.swap(col, pivot_row);

        let pivot = m[col][col];
        if pivot.abs() < MIN_DETERMINANT {
            return None;
        }
        for row in (col + 1)..4 {
            let factor = m[row][col] / pivot;
            for j in col..5 {
                m[row][j] -= factor * m[col][j];
            }
        }
    }

    let mut x = [0.0f32; 4];
    for i in (0..4).rev() {
        let tail: f32 = ((i + 1)..4).map(|j| m[i][j] * x[j]).sum();
        x[i] = (m[i][4] - tail) / m[i][i];
    }
    Some(x)
}

/// Warp a luma frame through `transform` into an `out_size`² crop.
///
/// Bilinear sampling; pixels mapping outside the frame read as 0.
fn warp(frame: &[u8], width: usize, height: usize, transform: &Similarity, out_size: usize) -> Vec<u8> {
    let sample = |x: i32, y: i32| -> f32 {
        if x >= 0 && y >= 0 && (x as usize) < width && (y as usize) < height {
            frame[y as usize * width + x as usize] as f32
        } else {
            0.0
        }
    };

    let mut out = vec![0u8; out_size * out_size];
    for oy in 0..out_size {
        for ox in 0..out_size {
            let (sx, sy) = transform.invert_point(ox as f32, oy as f32);
            let (x0, y0) = (sx.floor() as i32, sy.floor() as i32);
            let (fx, fy) = (sx - x0 as f32, sy - y0 as f32);

            let val = sample(x0, y0) * (1.0 - fx) * (1.0 - fy)
                + sample(x0 + 1, y0) * fx * (1.0 - fy)
                + sample(x0, y0 + 1) * (1.0 - fx) * fy
                + sample(x0 + 1, y0 + 1) * fx * fy;

            out[oy * out_size + ox] = val.round().clamp(0.0, 255.0) as u8;
        }
    }
    out
}

/// Align a detected face to a canonical 112×112 crop.
///
/// Returns `None` when the landmarks do not define a usable transform.
pub fn align_face(
    frame: &[u8],
    width: u32,
    height: u32,
    landmarks: &[(f32, f32); 5],
) -> Option<Vec<u8>> {
    let transform = Similarity::estimate(landmarks, &REFERENCE_LANDMARKS_112)?;
    Some(warp(frame, width as usize, height as usize, &transform, ALIGNED_SIZE))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_transform() {
        let t = Similarity::estimate(&REFERENCE_LANDMARKS_112, &REFERENCE_LANDMARKS_112).unwrap();
        assert!((t.a - 1.0).abs() < 1e-4, "a = {}", t.a);
        assert!(t.b.abs() < 1e-4, "b = {}", t.b);
        assert!(t.tx.abs() < 1e-3, "tx = {}", t.tx);
        assert!(t.ty.abs() < 1e-3, "ty = {}", t.ty);
    }

    #[test]
    fn test_scaled_transform() {
        let src = REFERENCE_LANDMARKS_112.map(|(x, y)| (x * 2.0, y * 2.0));
        let t = Similarity::estimate(&src, &REFERENCE_LANDMARKS_112).unwrap();
        assert!((t.a - 0.5).abs() < 0.05, "a = {}, expected ~0.5", t.a);
    }

    #[test]
    fn test_degenerate_landmarks_rejected() {
        let collapsed = [(50.0, 50.0); 5];
        assert!(Similarity::estimate(&collapsed, &REFERENCE_LANDMARKS_112).is_none());
        let frame = vec![128u8; 100 * 100];
        assert!(align_face(&frame, 100, 100, &collapsed).is_none());
    }

    #[test]
    fn test_align_face_output_size() {
        let frame = vec![128u8; 640 * 480];
        let aligned = align_face(&frame, 640, 480, &REFERENCE_LANDMARKS_112).unwrap();
        assert_eq!(aligned.len(), ALIGNED_SIZE * ALIGNED_SIZE);
    }

    #[test]
    fn test_landmark_lands_on_reference() {
        let (w, h) = (200usize, 200usize);
        let mut frame = vec![0u8; w * h];
        let src: [(f32, f32); 5] = [
            (80.0, 60.0),
            (120.0, 60.0),
            (100.0, 85.0),
            (85.0, 110.0),
            (115.0, 110.0),
        ];

        // 5x5 bright patch on the left eye survives bilinear sampling
        let (lx, ly) = (src[0].0 as usize, src[0].1 as usize);
        for py in ly - 2..=ly + 2 {
            for px in lx - 2..=lx + 2 {
                frame[py * w + px] = 255;
            }
        }

        let aligned = align_face(&frame, w as u32, h as u32, &src).unwrap();
        let rx = REFERENCE_LANDMARKS_112[0].0.round() as usize;
        let ry = REFERENCE_LANDMARKS_112[0].1.round() as usize;

        let max_val = (ry - 1..=ry + 1)
            .flat_map(|y| (rx - 1..=rx + 1).map(move |x| (x, y)))
            .map(|(x, y)| aligned[y * ALIGNED_SIZE + x])
            .max()
            .unwrap_or(0);
        assert!(max_val > 100, "expected bright patch near ({rx}, {ry}), max={max_val}");
    }
}
