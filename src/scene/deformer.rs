use glam::{DMat4, DVec3};

use super::{BlendIndex, NodeIndex};

/// One bone's binding within a skin deformer.
#[derive(Clone, Debug, PartialEq)]
pub struct Cluster {
    pub name: String,
    pub bone_node: NodeIndex,
    pub vertices: Vec<u32>,
    pub weights: Vec<f64>,
    /// Bone to world at bind time (`TransformLink`).
    pub bind_to_world: DMat4,
}

impl Cluster {
    pub fn new(bone_node: NodeIndex, bind_to_world: DMat4) -> Cluster {
        Cluster {
            name: String::new(),
            bone_node,
            vertices: Vec::new(),
            weights: Vec::new(),
            bind_to_world,
        }
    }

    pub fn with_weights(mut self, pairs: &[(u32, f64)]) -> Cluster {
        for &(vertex, weight) in pairs {
            self.vertices.push(vertex);
            self.weights.push(weight);
        }
        self
    }

    /// `(vertex, weight)` pairs in file order.
    pub fn influences(&self) -> impl Iterator<Item = (u32, f64)> + '_ {
        self.vertices.iter().copied().zip(self.weights.iter().copied())
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct SkinDeformer {
    pub name: String,
    pub clusters: Vec<Cluster>,
}

impl SkinDeformer {
    /// Cluster binding `node`, if any.
    pub fn cluster_for(&self, node: NodeIndex) -> Option<&Cluster> {
        self.clusters.iter().find(|c| c.bone_node == node)
    }
}

/// One target shape: sparse per-vertex offsets.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BlendShape {
    pub name: String,
    pub offsets: Vec<(u32, DVec3)>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct BlendChannel {
    pub name: String,
    /// Static weight, 0..1.
    pub weight: f64,
    /// In-between shapes in ascending weight order; the last is the full target.
    pub shapes: Vec<BlendShape>,
}

impl BlendChannel {
    pub fn target_shape(&self) -> Option<&BlendShape> {
        self.shapes.last()
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct BlendDeformer {
    pub name: String,
    pub channels: Vec<BlendChannel>,
}

/// Addresses one channel of one blend deformer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BlendChannelRef {
    pub deformer: BlendIndex,
    pub channel: usize,
}
