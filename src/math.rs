use glam::{DMat3, DMat4, DQuat, DVec3, Quat, Vec3};

/// Translation, rotation and scale, composed as `T * R * S`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transform {
    pub translation: DVec3,
    pub rotation: DQuat,
    pub scale: DVec3,
}

impl Transform {
    pub const IDENTITY: Transform = Transform {
        translation: DVec3::ZERO,
        rotation: DQuat::IDENTITY,
        scale: DVec3::ONE,
    };

    pub fn new(translation: DVec3, rotation: DQuat, scale: DVec3) -> Transform {
        Transform {
            translation,
            rotation,
            scale,
        }
    }

    pub fn from_translation(translation: DVec3) -> Transform {
        Transform {
            translation,
            ..Transform::IDENTITY
        }
    }

    pub fn from_matrix(m: &DMat4) -> Transform {
        let (scale, rotation, translation) = m.to_scale_rotation_translation();
        Transform {
            translation,
            rotation: rotation.normalize(),
            scale,
        }
    }

    pub fn to_matrix(&self) -> DMat4 {
        DMat4::from_scale_rotation_translation(self.scale, self.rotation, self.translation)
    }

    pub fn is_identity(&self) -> bool {
        self.translation == DVec3::ZERO && self.rotation == DQuat::IDENTITY && self.scale == DVec3::ONE
    }

    pub fn translation_f32(&self) -> Vec3 {
        self.translation.as_vec3()
    }

    pub fn rotation_f32(&self) -> Quat {
        let q = self.rotation;
        Quat::from_xyzw(q.x as f32, q.y as f32, q.z as f32, q.w as f32)
    }

    pub fn scale_f32(&self) -> Vec3 {
        self.scale.as_vec3()
    }
}

impl Default for Transform {
    fn default() -> Self {
        Transform::IDENTITY
    }
}

/// Euler rotation order of an FBX node. `Xyz` applies X first.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RotationOrder {
    #[default]
    Xyz,
    Xzy,
    Yzx,
    Yxz,
    Zxy,
    Zyx,
    SphericXyz,
}

impl RotationOrder {
    pub fn from_fbx(value: i64) -> RotationOrder {
        match value {
            1 => RotationOrder::Xzy,
            2 => RotationOrder::Yzx,
            3 => RotationOrder::Yxz,
            4 => RotationOrder::Zxy,
            5 => RotationOrder::Zyx,
            6 => RotationOrder::SphericXyz,
            _ => RotationOrder::Xyz,
        }
    }
}

/// Quaternion from Euler angles in degrees.
pub fn euler_to_quat(degrees: DVec3, order: RotationOrder) -> DQuat {
    let x = DQuat::from_rotation_x(degrees.x.to_radians());
    let y = DQuat::from_rotation_y(degrees.y.to_radians());
    let z = DQuat::from_rotation_z(degrees.z.to_radians());
    // The first axis listed is applied first, so it sits rightmost.
    let q = match order {
        RotationOrder::Xyz | RotationOrder::SphericXyz => z * y * x,
        RotationOrder::Xzy => y * z * x,
        RotationOrder::Yzx => x * z * y,
        RotationOrder::Yxz => z * x * y,
        RotationOrder::Zxy => y * x * z,
        RotationOrder::Zyx => x * y * z,
    };
    q.normalize()
}

/// Inverse transpose of the upper 3x3, used to carry normals through `m`.
pub fn normal_matrix(m: &DMat4) -> DMat3 {
    let linear = DMat3::from_mat4(*m);
    if linear.determinant().abs() <= f64::EPSILON {
        return linear;
    }
    linear.inverse().transpose()
}
