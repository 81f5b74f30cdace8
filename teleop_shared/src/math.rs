//! Math types.
//!
//! Thin layer over `nalgebra` for the transforms exchanged with the pose
//! server. Conventions:
//! - Points are column vectors, so `a * b` applies `b` first.
//! - Translation lives in column 3; the bottom row is `[0, 0, 0, 1]` for any
//!   affine transform and is ignored by [`Transform::decompose`].
//! - `nalgebra` stores matrices column-major; helpers below name the layout
//!   of flat arrays explicitly.

use nalgebra::{Matrix3, Matrix4, Rotation3, UnitQuaternion, Vector3};

pub type Mat4 = Matrix4<f32>;
pub type Vec3 = Vector3<f32>;
pub type Quat = UnitQuaternion<f32>;

/// Affine transform split into translation, rotation and scale.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            translation: Vec3::zeros(),
            rotation: Quat::identity(),
            scale: Vec3::new(1.0, 1.0, 1.0),
        }
    }
}

impl Transform {
    /// Splits an affine matrix into translation, rotation and (non-uniform) scale.
    ///
    /// Shear is not representable. Singular input is not rejected: a zero
    /// column produces non-finite rotation components.
    pub fn decompose(m: &Mat4) -> Self {
        let basis: Matrix3<f32> = m.fixed_view::<3, 3>(0, 0).into_owned();

        let mut sx = basis.column(0).norm();
        let sy = basis.column(1).norm();
        let sz = basis.column(2).norm();

        // A mirrored basis is folded into the x scale.
        if basis.determinant() < 0.0 {
            sx = -sx;
        }

        let unscaled = Matrix3::from_columns(&[
            basis.column(0) / sx,
            basis.column(1) / sy,
            basis.column(2) / sz,
        ]);
        let rotation = Quat::from_rotation_matrix(&Rotation3::from_matrix_unchecked(unscaled));

        Self {
            translation: m.fixed_view::<3, 1>(0, 3).into_owned(),
            rotation,
            scale: Vec3::new(sx, sy, sz),
        }
    }

    /// Recomposes `T * R * S`.
    pub fn to_matrix(&self) -> Mat4 {
        Mat4::new_translation(&self.translation)
            * self.rotation.to_homogeneous()
            * Mat4::new_nonuniform_scaling(&self.scale)
    }

    /// Returns a copy moved by `offset`.
    pub fn shifted(mut self, offset: &Vec3) -> Self {
        self.translation += offset;
        self
    }
}

/// Reads 16 values laid out row after row.
pub fn mat4_from_rows_flat(values: &[f32; 16]) -> Mat4 {
    Mat4::from_row_slice(values)
}

/// Reads 16 values laid out column after column.
pub fn mat4_from_columns_flat(values: &[f32; 16]) -> Mat4 {
    Mat4::from_column_slice(values)
}

/// Writes a matrix column after column.
pub fn mat4_to_columns_flat(m: &Mat4) -> [f32; 16] {
    let mut out = [0.0; 16];
    out.copy_from_slice(m.as_slice());
    out
}

/// Writes a matrix as nested rows.
pub fn mat4_to_rows(m: &Mat4) -> [[f32; 4]; 4] {
    std::array::from_fn(|r| std::array::from_fn(|c| m[(r, c)]))
}

/// Fixed change of basis between the XR device frame and the canonical frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoordinateConversion {
    matrix: Mat4,
}

impl CoordinateConversion {
    /// XR (y up, -z forward) to canonical (z up): x' = z, y' = x, z' = y.
    pub const WEBXR_TO_CANONICAL_ROWS: [[f32; 4]; 4] = [
        [0.0, 0.0, 1.0, 0.0],
        [1.0, 0.0, 0.0, 0.0],
        [0.0, 1.0, 0.0, 0.0],
        [0.0, 0.0, 0.0, 1.0],
    ];

    pub fn from_rows(rows: [[f32; 4]; 4]) -> Self {
        Self {
            matrix: Mat4::from_fn(|r, c| rows[r][c]),
        }
    }

    pub fn webxr_to_canonical() -> Self {
        Self::from_rows(Self::WEBXR_TO_CANONICAL_ROWS)
    }

    pub fn matrix(&self) -> &Mat4 {
        &self.matrix
    }

    /// Pre-multiplies a scene-frame pose by the change of basis.
    pub fn to_canonical(&self, pose: &Mat4) -> Mat4 {
        self.matrix * pose
    }
}

impl Default for CoordinateConversion {
    fn default() -> Self {
        Self::webxr_to_canonical()
    }
}

/// Relative motion between two poses of the same rigid body.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoseDelta {
    /// `R_to * R_from^T`.
    pub rotation: Quat,
    /// `t_to - t_from`, in the parent frame.
    pub translation: Vec3,
    /// Orientation of the source pose, `R_from`.
    pub source_rotation: Matrix3<f32>,
}

impl PoseDelta {
    pub fn between(from: &Mat4, to: &Mat4) -> Self {
        let r_from: Matrix3<f32> = from.fixed_view::<3, 3>(0, 0).into_owned();
        let r_to: Matrix3<f32> = to.fixed_view::<3, 3>(0, 0).into_owned();
        Self {
            rotation: Quat::from_matrix(&(r_to * r_from.transpose())),
            translation: to.fixed_view::<3, 1>(0, 3) - from.fixed_view::<3, 1>(0, 3),
            source_rotation: r_from,
        }
    }

    /// Axis-angle of the rotation in radians, expressed in the source frame
    /// (`R_from^T * axis * angle`).
    pub fn rotation_vector(&self) -> Vec3 {
        self.source_rotation.transpose() * self.rotation.scaled_axis()
    }

    /// Applies the delta to `pose`: rotation about the pose's own origin,
    /// then translation.
    pub fn apply_to(&self, pose: &Mat4) -> Mat4 {
        let r: Matrix3<f32> = self.rotation.to_rotation_matrix().into_inner()
            * pose.fixed_view::<3, 3>(0, 0);
        let mut out = *pose;
        out.fixed_view_mut::<3, 3>(0, 0).copy_from(&r);
        let t = pose.fixed_view::<3, 1>(0, 3) + self.translation;
        out.fixed_view_mut::<3, 1>(0, 3).copy_from(&t);
        out
    }
}
