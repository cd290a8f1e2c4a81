//! Axis and unit conversion from FBX file space into the engine's space.

use glam::{DMat3, DMat4, DQuat, DVec3};
use log::warn;

use crate::config::AxisSystem;
use crate::math::Transform;

/// Maps file space into target space: `x' = s * A * x` where `A` is a signed axis permutation
/// and `s` the unit factor.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TransformConverter {
    axes: DMat3,
    unit_scale: f64,
}

fn basis(axes: &AxisSystem) -> DMat3 {
    DMat3::from_cols(
        axes.right.to_vector(),
        axes.up.to_vector(),
        axes.front.to_vector(),
    )
}

impl TransformConverter {
    pub const IDENTITY: TransformConverter = TransformConverter {
        axes: DMat3::IDENTITY,
        unit_scale: 1.0,
    };

    pub fn new(
        source_axes: &AxisSystem,
        source_unit_meters: f64,
        target_axes: &AxisSystem,
        target_unit_meters: f64,
    ) -> TransformConverter {
        let axes = if source_axes.is_valid() && target_axes.is_valid() {
            basis(target_axes) * basis(source_axes).transpose()
        } else {
            warn!(
                "degenerate axis system ({:?} -> {:?}), axes left unchanged",
                source_axes, target_axes
            );
            DMat3::IDENTITY
        };
        let unit_scale = if source_unit_meters > 0.0 && target_unit_meters > 0.0 {
            source_unit_meters / target_unit_meters
        } else {
            warn!(
                "invalid unit scale ({} -> {}), units left unchanged",
                source_unit_meters, target_unit_meters
            );
            1.0
        };
        TransformConverter { axes, unit_scale }
    }

    pub fn unit_scale(&self) -> f64 {
        self.unit_scale
    }

    pub fn is_identity(&self) -> bool {
        self.axes == DMat3::IDENTITY && self.unit_scale == 1.0
    }

    /// True when the axis remap changes handedness, which reverses triangle winding.
    pub fn is_mirroring(&self) -> bool {
        self.axes.determinant() < 0.0
    }

    pub fn convert_position(&self, p: DVec3) -> DVec3 {
        self.axes * p * self.unit_scale
    }

    /// Unit length direction, e.g. a normal.
    pub fn convert_direction(&self, d: DVec3) -> DVec3 {
        (self.axes * d).normalize_or_zero()
    }

    /// Offset such as a morph delta: scaled, never translated.
    pub fn convert_delta(&self, d: DVec3) -> DVec3 {
        self.axes * d * self.unit_scale
    }

    pub fn convert_matrix(&self, m: &DMat4) -> DMat4 {
        if self.is_identity() {
            return *m;
        }
        let c = DMat4::from_mat3(self.axes * self.unit_scale);
        let c_inv = DMat4::from_mat3(self.axes.transpose() * (1.0 / self.unit_scale));
        c * *m * c_inv
    }

    pub fn convert_transform(&self, t: &Transform) -> Transform {
        if self.is_identity() {
            return *t;
        }
        let rotation = DQuat::from_mat3(&(self.axes * DMat3::from_quat(t.rotation) * self.axes.transpose()));
        let abs_axes = DMat3::from_cols(
            self.axes.x_axis.abs(),
            self.axes.y_axis.abs(),
            self.axes.z_axis.abs(),
        );
        Transform {
            translation: self.convert_position(t.translation),
            rotation: rotation.normalize(),
            scale: abs_axes * t.scale,
        }
    }
}

impl Default for TransformConverter {
    fn default() -> Self {
        TransformConverter::IDENTITY
    }
}
