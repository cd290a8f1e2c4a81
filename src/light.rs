use glam::Vec3;

use crate::config::LightConfig;
use crate::scene::{LightType, NodeIndex, SceneDocument};

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum LightKind {
    Point {
        attenuation_radius: f32,
    },
    Directional,
    Spot {
        attenuation_radius: f32,
        inner_cone_degrees: f32,
        outer_cone_degrees: f32,
    },
}

/// Engine neutral description of a light node.
#[derive(Clone, Debug, PartialEq)]
pub struct LightDescriptor {
    pub name: String,
    pub color: Vec3,
    pub intensity: f32,
    pub kind: LightKind,
}

/// Describes the light attached to `node`. `None` for nodes without a light and for area and
/// volume lights.
pub fn extract(doc: &SceneDocument, node: NodeIndex, config: &LightConfig) -> Option<LightDescriptor> {
    let light = doc.light(doc.get_node(node)?.light?);
    let radius = (light.intensity * config.attenuation_multiplier * config.scene_scale) as f32;
    let kind = match light.light_type {
        LightType::Point => LightKind::Point {
            attenuation_radius: radius,
        },
        LightType::Directional => LightKind::Directional,
        LightType::Spot => LightKind::Spot {
            attenuation_radius: radius,
            inner_cone_degrees: light.inner_angle.to_degrees() as f32,
            outer_cone_degrees: light.outer_angle.to_degrees() as f32,
        },
        LightType::Area | LightType::Volume => return None,
    };
    Some(LightDescriptor {
        name: light.name.clone(),
        color: light.color.as_vec3(),
        intensity: light.intensity as f32,
        kind,
    })
}
