//! Import configuration.
//!
//! Every struct here implements `Default` and deserializes with `#[serde(default)]`, so an engine
//! config file only needs to name the fields it overrides.

use glam::DVec3;
use serde::{Deserialize, Serialize};

/// One signed coordinate axis.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoordinateAxis {
    PositiveX,
    NegativeX,
    PositiveY,
    NegativeY,
    PositiveZ,
    NegativeZ,
}

impl CoordinateAxis {
    /// Axis from an FBX axis index (0 = X, 1 = Y, 2 = Z) and sign.
    pub fn from_fbx(axis: i64, sign: i64) -> Option<CoordinateAxis> {
        let positive = sign >= 0;
        match (axis, positive) {
            (0, true) => Some(CoordinateAxis::PositiveX),
            (0, false) => Some(CoordinateAxis::NegativeX),
            (1, true) => Some(CoordinateAxis::PositiveY),
            (1, false) => Some(CoordinateAxis::NegativeY),
            (2, true) => Some(CoordinateAxis::PositiveZ),
            (2, false) => Some(CoordinateAxis::NegativeZ),
            _ => None,
        }
    }

    pub fn to_vector(self) -> DVec3 {
        match self {
            CoordinateAxis::PositiveX => DVec3::X,
            CoordinateAxis::NegativeX => DVec3::NEG_X,
            CoordinateAxis::PositiveY => DVec3::Y,
            CoordinateAxis::NegativeY => DVec3::NEG_Y,
            CoordinateAxis::PositiveZ => DVec3::Z,
            CoordinateAxis::NegativeZ => DVec3::NEG_Z,
        }
    }
}

/// Right, up and front directions of a coordinate system.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AxisSystem {
    pub right: CoordinateAxis,
    pub up: CoordinateAxis,
    pub front: CoordinateAxis,
}

impl AxisSystem {
    /// Right handed, Y up: the FBX default.
    pub const Y_UP: AxisSystem = AxisSystem {
        right: CoordinateAxis::PositiveX,
        up: CoordinateAxis::PositiveY,
        front: CoordinateAxis::PositiveZ,
    };

    /// True when the three axes span all three dimensions.
    pub fn is_valid(&self) -> bool {
        let r = self.right.to_vector().abs();
        let u = self.up.to_vector().abs();
        let f = self.front.to_vector().abs();
        (r + u + f) == DVec3::ONE
    }
}

impl Default for AxisSystem {
    fn default() -> Self {
        AxisSystem::Y_UP
    }
}

/// Where the axis/unit conversion is applied.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpaceConversion {
    /// Keep document data in file space and convert every query result.
    #[default]
    TransformRoot,
    /// Convert node transforms, geometry and bind matrices once, while building the document.
    ModifyGeometry,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LightConfig {
    /// Multiplier applied to the light intensity to derive its attenuation radius.
    pub attenuation_multiplier: f64,
    /// Scene scale applied on top of the multiplier.
    pub scene_scale: f64,
}

impl Default for LightConfig {
    fn default() -> Self {
        LightConfig {
            attenuation_multiplier: 1.0,
            scene_scale: 1.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportConfig {
    pub target_axes: AxisSystem,
    /// Size of one target unit in meters.
    pub target_unit_meters: f64,
    pub space_conversion: SpaceConversion,
    pub generate_missing_normals: bool,
    /// Emit `1 - v` texture coordinates.
    pub flip_uv_v: bool,
    pub light: LightConfig,
}

impl Default for ImportConfig {
    fn default() -> Self {
        ImportConfig {
            target_axes: AxisSystem::Y_UP,
            target_unit_meters: 1.0,
            space_conversion: SpaceConversion::TransformRoot,
            generate_missing_normals: true,
            flip_uv_v: true,
            light: LightConfig::default(),
        }
    }
}

/// Material options passed along with a mesh conversion.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaterialsConfig {
    /// Decode embedded textures through the engine's decoder.
    pub load_textures: bool,
    /// Generate mip levels when decoding.
    pub generate_mips: bool,
}

impl Default for MaterialsConfig {
    fn default() -> Self {
        MaterialsConfig {
            load_textures: true,
            generate_mips: true,
        }
    }
}
