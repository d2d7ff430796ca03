use core::f32::consts::PI;
use std::fmt;

use super::Vec2;

/// Determinants with a smaller magnitude are treated as singular.
const SINGULAR_EPSILON: f32 = 1e-10;

/// Relative tolerance for treating the two skew angles as one rotation.
///
/// Heuristic: matrices produced by a pure rotation agree far below this bound,
/// while real skews usually differ by more. Inputs near the bound may be
/// classified either way.
const ROTATION_TOLERANCE: f32 = 1e-5;

/// Returned when inverting (or inverse-applying) a matrix with a zero determinant.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct SingularMatrixError;

impl fmt::Display for SingularMatrixError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("matrix is singular and cannot be inverted")
    }
}

impl std::error::Error for SingularMatrixError {}

/// 2D affine transform.
///
/// ```text
/// | a  c  tx |
/// | b  d  ty |
/// | 0  0  1  |
/// ```
///
/// `x' = a*x + c*y + tx`, `y' = b*x + d*y + ty`.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Matrix {
    pub a: f32,
    pub b: f32,
    pub c: f32,
    pub d: f32,
    pub tx: f32,
    pub ty: f32,
}

/// Result of [`Matrix::decompose`].
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Decomposed {
    pub position: Vec2,
    pub scale: Vec2,
    /// Radians in (-PI, PI]; zero when the matrix carries a skew.
    pub rotation: f32,
    /// Zero when the matrix is a pure rotation.
    pub skew: Vec2,
}

impl Default for Matrix {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Matrix {
    pub const IDENTITY: Matrix = Matrix::new(1.0, 0.0, 0.0, 1.0, 0.0, 0.0);

    #[inline]
    pub const fn new(a: f32, b: f32, c: f32, d: f32, tx: f32, ty: f32) -> Self {
        Self { a, b, c, d, tx, ty }
    }

    /// Reads the top two rows of a row-major 3x3 array (the layout of
    /// `to_array(false)`).
    pub fn from_array(array: &[f32; 9]) -> Self {
        Self::new(array[0], array[3], array[1], array[4], array[2], array[5])
    }

    pub fn set(&mut self, a: f32, b: f32, c: f32, d: f32, tx: f32, ty: f32) -> &mut Self {
        *self = Self::new(a, b, c, d, tx, ty);
        self
    }

    /// Resets to the identity transform.
    pub fn identity(&mut self) -> &mut Self {
        *self = Self::IDENTITY;
        self
    }

    #[inline]
    pub fn is_identity(&self) -> bool {
        *self == Self::IDENTITY
    }

    #[inline]
    pub fn determinant(&self) -> f32 {
        self.a * self.d - self.b * self.c
    }

    // ── world-space operations (applied after the current transform) ─────

    pub fn translate(&mut self, x: f32, y: f32) -> &mut Self {
        self.tx += x;
        self.ty += y;
        self
    }

    pub fn scale(&mut self, x: f32, y: f32) -> &mut Self {
        self.a *= x;
        self.d *= y;
        self.c *= x;
        self.b *= y;
        self.tx *= x;
        self.ty *= y;
        self
    }

    pub fn rotate(&mut self, angle: f32) -> &mut Self {
        let (sin, cos) = angle.sin_cos();
        let Matrix { a, b, c, d, tx, ty } = *self;

        self.a = a * cos - b * sin;
        self.b = a * sin + b * cos;
        self.c = c * cos - d * sin;
        self.d = c * sin + d * cos;
        self.tx = tx * cos - ty * sin;
        self.ty = tx * sin + ty * cos;
        self
    }

    // ── composition ──────────────────────────────────────────────────────

    /// `self = self * other`: `other` is applied first, in the local space of `self`.
    pub fn append(&mut self, other: &Matrix) -> &mut Self {
        let Matrix { a, b, c, d, tx, ty } = *self;

        self.a = other.a * a + other.b * c;
        self.b = other.a * b + other.b * d;
        self.c = other.c * a + other.d * c;
        self.d = other.c * b + other.d * d;
        self.tx = other.tx * a + other.ty * c + tx;
        self.ty = other.tx * b + other.ty * d + ty;
        self
    }

    /// `self = other * self`: `other` is applied after `self`.
    pub fn prepend(&mut self, other: &Matrix) -> &mut Self {
        let Matrix { a, b, c, d, tx, ty } = *self;

        self.a = a * other.a + b * other.c;
        self.b = a * other.b + b * other.d;
        self.c = c * other.a + d * other.c;
        self.d = c * other.b + d * other.d;
        self.tx = tx * other.a + ty * other.c + other.tx;
        self.ty = tx * other.b + ty * other.d + other.ty;
        self
    }

    /// Composes position, pivot, scale, rotation and skew into this matrix.
    ///
    /// This is the inverse of [`decompose`](Self::decompose) for pivot-free
    /// transforms with positive scale.
    #[allow(clippy::too_many_arguments)]
    pub fn set_transform(
        &mut self,
        x: f32,
        y: f32,
        pivot_x: f32,
        pivot_y: f32,
        scale_x: f32,
        scale_y: f32,
        rotation: f32,
        skew_x: f32,
        skew_y: f32,
    ) -> &mut Self {
        let (sin_y, cos_y) = (rotation + skew_y).sin_cos();
        let (sin_x, cos_x) = (rotation - skew_x).sin_cos();

        self.a = cos_y * scale_x;
        self.b = sin_y * scale_x;
        self.c = -sin_x * scale_y;
        self.d = cos_x * scale_y;
        self.tx = x - (pivot_x * self.a + pivot_y * self.c);
        self.ty = y - (pivot_x * self.b + pivot_y * self.d);
        self
    }

    // ── application ──────────────────────────────────────────────────────

    #[inline]
    pub fn apply(&self, p: Vec2) -> Vec2 {
        Vec2::new(
            self.a * p.x + self.c * p.y + self.tx,
            self.b * p.x + self.d * p.y + self.ty,
        )
    }

    pub fn apply_inverse(&self, p: Vec2) -> Result<Vec2, SingularMatrixError> {
        let det = self.checked_determinant()?;
        let id = 1.0 / det;

        Ok(Vec2::new(
            self.d * id * p.x - self.c * id * p.y + (self.ty * self.c - self.tx * self.d) * id,
            self.a * id * p.y - self.b * id * p.x + (self.tx * self.b - self.ty * self.a) * id,
        ))
    }

    // ── inversion ────────────────────────────────────────────────────────

    /// Inverts in place. On error `self` is left untouched.
    pub fn invert(&mut self) -> Result<&mut Self, SingularMatrixError> {
        let n = self.checked_determinant()?;
        let Matrix { a, b, c, d, tx, ty } = *self;

        self.a = d / n;
        self.b = -b / n;
        self.c = -c / n;
        self.d = a / n;
        self.tx = (c * ty - d * tx) / n;
        self.ty = -(a * ty - b * tx) / n;
        Ok(self)
    }

    pub fn inverse(&self) -> Result<Matrix, SingularMatrixError> {
        let mut m = *self;
        m.invert()?;
        Ok(m)
    }

    fn checked_determinant(&self) -> Result<f32, SingularMatrixError> {
        let det = self.determinant();
        if !det.is_finite() || det.abs() < SINGULAR_EPSILON {
            return Err(SingularMatrixError);
        }
        Ok(det)
    }

    // ── decomposition / serialization ────────────────────────────────────

    /// Splits the matrix into position, scale, rotation and skew.
    ///
    /// A matrix whose two skew angles agree within a relative `1e-5` is
    /// reported as a pure rotation. Otherwise rotation is zero and the angles
    /// are reported as skew, in the convention used by
    /// [`set_transform`](Self::set_transform).
    pub fn decompose(&self) -> Decomposed {
        let Matrix { a, b, c, d, tx, ty } = *self;

        let skew_x = (-c).atan2(d);
        let skew_y = b.atan2(a);

        let is_rotation = (skew_x == 0.0 && skew_y == 0.0)
            || (skew_y != 0.0 && (1.0 - skew_x / skew_y).abs() < ROTATION_TOLERANCE);

        let (rotation, skew) = if is_rotation {
            let mut rotation = skew_y;
            if a < 0.0 && d >= 0.0 {
                rotation += if rotation <= 0.0 { PI } else { -PI };
            }
            (normalize_angle(rotation), Vec2::zero())
        } else {
            (0.0, Vec2::new(-skew_x, skew_y))
        };

        Decomposed {
            position: Vec2::new(tx, ty),
            scale: Vec2::new((a * a + b * b).sqrt(), (c * c + d * d).sqrt()),
            rotation,
            skew,
        }
    }

    /// Flattens to a 3x3 array.
    ///
    /// - `transpose == false`: row-major `[a, c, tx, b, d, ty, 0, 0, 1]`
    /// - `transpose == true`: column-major `[a, b, 0, c, d, 0, tx, ty, 1]`,
    ///   the layout shaders expect for a `mat3` uniform.
    pub fn to_array(&self, transpose: bool) -> [f32; 9] {
        let Matrix { a, b, c, d, tx, ty } = *self;
        if transpose {
            [a, b, 0.0, c, d, 0.0, tx, ty, 1.0]
        } else {
            [a, c, tx, b, d, ty, 0.0, 0.0, 1.0]
        }
    }
}

/// Maps an angle into (-PI, PI].
fn normalize_angle(mut angle: f32) -> f32 {
    while angle <= -PI {
        angle += 2.0 * PI;
    }
    while angle > PI {
        angle -= 2.0 * PI;
    }
    angle
}
