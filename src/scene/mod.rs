//! In-memory scene document.
//!
//! A [`SceneDocument`] is an arena: nodes, meshes, deformers, materials, lights and animation
//! stacks live in flat vectors and refer to each other through typed indices. Node 0 is always
//! the synthetic scene root. Documents are immutable once built and are shared as
//! `Arc<SceneDocument>`.

use std::collections::{HashMap, HashSet};

use glam::{DMat4, DQuat, DVec3, DVec4};
use log::debug;

use crate::anim::AnimationStack;
use crate::config::{AxisSystem, ImportConfig, SpaceConversion};
use crate::convert::TransformConverter;
use crate::math::{euler_to_quat, RotationOrder, Transform};

pub mod deformer;
pub mod import;
pub mod mesh;

pub use self::deformer::{BlendChannel, BlendChannelRef, BlendDeformer, BlendShape, Cluster, SkinDeformer};
pub use self::mesh::{Face, Mesh, VertexAttribute};

macro_rules! index_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub usize);

        impl $name {
            pub fn index(self) -> usize {
                self.0
            }
        }
    };
}

index_type!(
    /// Position of a node in the document arena.
    NodeIndex
);
index_type!(MeshIndex);
index_type!(SkinIndex);
index_type!(BlendIndex);
index_type!(MaterialIndex);
index_type!(TextureIndex);
index_type!(LightIndex);
index_type!(StackIndex);

/// Raw FBX transform properties of a node, in file space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NodeProperties {
    pub translation: DVec3,
    /// Euler angles in degrees.
    pub rotation: DVec3,
    pub scaling: DVec3,
    pub pre_rotation: DVec3,
    pub post_rotation: DVec3,
    pub rotation_offset: DVec3,
    pub rotation_pivot: DVec3,
    pub scaling_offset: DVec3,
    pub scaling_pivot: DVec3,
    pub rotation_order: RotationOrder,
    pub geometric_translation: DVec3,
    pub geometric_rotation: DVec3,
    pub geometric_scaling: DVec3,
}

impl Default for NodeProperties {
    fn default() -> Self {
        NodeProperties {
            translation: DVec3::ZERO,
            rotation: DVec3::ZERO,
            scaling: DVec3::ONE,
            pre_rotation: DVec3::ZERO,
            post_rotation: DVec3::ZERO,
            rotation_offset: DVec3::ZERO,
            rotation_pivot: DVec3::ZERO,
            scaling_offset: DVec3::ZERO,
            scaling_pivot: DVec3::ZERO,
            rotation_order: RotationOrder::Xyz,
            geometric_translation: DVec3::ZERO,
            geometric_rotation: DVec3::ZERO,
            geometric_scaling: DVec3::ONE,
        }
    }
}

impl NodeProperties {
    pub fn from_trs(translation: DVec3, rotation_degrees: DVec3, scaling: DVec3) -> NodeProperties {
        NodeProperties {
            translation,
            rotation: rotation_degrees,
            scaling,
            ..NodeProperties::default()
        }
    }

    fn has_pivots(&self) -> bool {
        self.rotation_offset != DVec3::ZERO
            || self.rotation_pivot != DVec3::ZERO
            || self.scaling_offset != DVec3::ZERO
            || self.scaling_pivot != DVec3::ZERO
    }

    /// Local transform with the given animated channels substituted for the static ones.
    pub fn compose(&self, translation: DVec3, rotation: DVec3, scaling: DVec3) -> Transform {
        let pre = euler_to_quat(self.pre_rotation, RotationOrder::Xyz);
        let post = euler_to_quat(self.post_rotation, RotationOrder::Xyz);
        let rotation = pre * euler_to_quat(rotation, self.rotation_order) * post.inverse();
        if !self.has_pivots() {
            return Transform::new(translation, rotation.normalize(), scaling);
        }
        let m = DMat4::from_translation(translation + self.rotation_offset + self.rotation_pivot)
            * DMat4::from_quat(rotation)
            * DMat4::from_translation(self.scaling_offset + self.scaling_pivot - self.rotation_pivot)
            * DMat4::from_scale(scaling)
            * DMat4::from_translation(-self.scaling_pivot);
        Transform::from_matrix(&m)
    }

    pub fn local_transform(&self) -> Transform {
        self.compose(self.translation, self.rotation, self.scaling)
    }

    /// Geometry offset, `None` when it is the identity.
    pub fn geometry_transform(&self) -> Option<Transform> {
        let t = Transform::new(
            self.geometric_translation,
            euler_to_quat(self.geometric_rotation, RotationOrder::Xyz),
            self.geometric_scaling,
        );
        if t.translation == DVec3::ZERO
            && t.rotation.abs_diff_eq(DQuat::IDENTITY, 1e-12)
            && t.scale == DVec3::ONE
        {
            None
        } else {
            Some(t)
        }
    }
}

#[derive(Clone, Debug)]
pub struct Node {
    pub id: i64,
    pub name: String,
    pub parent: Option<NodeIndex>,
    pub children: Vec<NodeIndex>,
    pub properties: NodeProperties,
    /// Local transform in document space.
    pub local_transform: Transform,
    pub geometry_transform: Option<Transform>,
    pub mesh: Option<MeshIndex>,
    pub light: Option<LightIndex>,
}

impl Node {
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Material {
    pub name: String,
    pub base_color: DVec4,
    pub base_color_texture: Option<TextureIndex>,
    pub normal_texture: Option<TextureIndex>,
}

impl Material {
    pub fn new(name: &str) -> Material {
        Material {
            name: name.to_string(),
            base_color: DVec4::ONE,
            base_color_texture: None,
            normal_texture: None,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Texture {
    pub name: String,
    pub filename: String,
    /// Embedded file content, if the FBX carries it.
    pub content: Option<Vec<u8>>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LightType {
    Point,
    Directional,
    Spot,
    Area,
    Volume,
}

impl LightType {
    pub fn from_fbx(value: i64) -> Option<LightType> {
        match value {
            0 => Some(LightType::Point),
            1 => Some(LightType::Directional),
            2 => Some(LightType::Spot),
            3 => Some(LightType::Area),
            4 => Some(LightType::Volume),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Light {
    pub name: String,
    pub light_type: LightType,
    pub color: DVec3,
    /// Intensity factor, 1.0 for an FBX intensity of 100.
    pub intensity: f64,
    /// Radians.
    pub inner_angle: f64,
    /// Radians.
    pub outer_angle: f64,
}

#[derive(Debug)]
pub struct SceneDocument {
    nodes: Vec<Node>,
    meshes: Vec<Mesh>,
    skins: Vec<SkinDeformer>,
    blends: Vec<BlendDeformer>,
    materials: Vec<Material>,
    textures: Vec<Texture>,
    lights: Vec<Light>,
    stacks: Vec<AnimationStack>,
    node_ids: HashMap<i64, NodeIndex>,
    node_names: HashMap<String, NodeIndex>,
    bone_nodes: HashSet<NodeIndex>,
    source_axes: AxisSystem,
    source_unit_meters: f64,
    space_conversion: SpaceConversion,
    converter: TransformConverter,
    active_stack: Option<StackIndex>,
}

impl SceneDocument {
    pub fn root(&self) -> NodeIndex {
        NodeIndex(0)
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn node(&self, index: NodeIndex) -> &Node {
        &self.nodes[index.0]
    }

    pub fn get_node(&self, index: NodeIndex) -> Option<&Node> {
        self.nodes.get(index.0)
    }

    pub fn node_indices(&self) -> impl Iterator<Item = NodeIndex> {
        (0..self.nodes.len()).map(NodeIndex)
    }

    pub fn node_by_id(&self, id: i64) -> Option<NodeIndex> {
        self.node_ids.get(&id).copied()
    }

    /// First node carrying `name`.
    pub fn node_by_name(&self, name: &str) -> Option<NodeIndex> {
        self.node_names.get(name).copied()
    }

    pub fn meshes(&self) -> &[Mesh] {
        &self.meshes
    }

    pub fn mesh(&self, index: MeshIndex) -> &Mesh {
        &self.meshes[index.0]
    }

    pub fn skin(&self, index: SkinIndex) -> &SkinDeformer {
        &self.skins[index.0]
    }

    pub fn blend(&self, index: BlendIndex) -> &BlendDeformer {
        &self.blends[index.0]
    }

    pub fn blend_channel(&self, channel: BlendChannelRef) -> &BlendChannel {
        &self.blends[channel.deformer.0].channels[channel.channel]
    }

    pub fn material(&self, index: MaterialIndex) -> &Material {
        &self.materials[index.0]
    }

    pub fn texture(&self, index: TextureIndex) -> &Texture {
        &self.textures[index.0]
    }

    pub fn light(&self, index: LightIndex) -> &Light {
        &self.lights[index.0]
    }

    pub fn stacks(&self) -> &[AnimationStack] {
        &self.stacks
    }

    pub fn stack(&self, index: StackIndex) -> &AnimationStack {
        &self.stacks[index.0]
    }

    pub fn stack_by_id(&self, id: i64) -> Option<StackIndex> {
        self.stacks.iter().position(|s| s.id == id).map(StackIndex)
    }

    /// Active animation stack of the file, or the first one.
    pub fn default_stack(&self) -> Option<StackIndex> {
        self.active_stack
            .or_else(|| if self.stacks.is_empty() { None } else { Some(StackIndex(0)) })
    }

    /// True when some skin cluster binds this node.
    pub fn is_bone(&self, index: NodeIndex) -> bool {
        self.bone_nodes.contains(&index)
    }

    pub fn source_axes(&self) -> &AxisSystem {
        &self.source_axes
    }

    pub fn source_unit_meters(&self) -> f64 {
        self.source_unit_meters
    }

    pub fn space_conversion(&self) -> SpaceConversion {
        self.space_conversion
    }

    /// File space to target space.
    pub fn converter(&self) -> &TransformConverter {
        &self.converter
    }

    /// True when the conversion was applied while building.
    pub fn is_baked(&self) -> bool {
        self.space_conversion == SpaceConversion::ModifyGeometry
    }

    /// Conversion still owed by query results: identity once baked.
    pub fn query_converter(&self) -> TransformConverter {
        if self.is_baked() {
            TransformConverter::IDENTITY
        } else {
            self.converter
        }
    }

    /// Node to world matrix in document space.
    pub fn node_to_world(&self, index: NodeIndex) -> DMat4 {
        let mut m = DMat4::IDENTITY;
        let mut current = Some(index);
        while let Some(i) = current {
            let node = &self.nodes[i.0];
            m = node.local_transform.to_matrix() * m;
            current = node.parent;
        }
        m
    }

    /// Mesh nodes in arena order.
    pub fn mesh_nodes(&self) -> impl Iterator<Item = NodeIndex> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.mesh.is_some())
            .map(|(i, _)| NodeIndex(i))
    }
}

/// Assembles a [`SceneDocument`]. Used by the FBX importer and by engines generating scenes.
#[derive(Debug)]
pub struct SceneBuilder {
    nodes: Vec<Node>,
    meshes: Vec<Mesh>,
    skins: Vec<SkinDeformer>,
    blends: Vec<BlendDeformer>,
    materials: Vec<Material>,
    textures: Vec<Texture>,
    lights: Vec<Light>,
    stacks: Vec<AnimationStack>,
    source_axes: AxisSystem,
    source_unit_meters: f64,
    active_stack_name: Option<String>,
}

impl Default for SceneBuilder {
    fn default() -> Self {
        SceneBuilder::new()
    }
}

impl SceneBuilder {
    pub fn new() -> SceneBuilder {
        let root = Node {
            id: 0,
            name: String::new(),
            parent: None,
            children: Vec::new(),
            properties: NodeProperties::default(),
            local_transform: Transform::IDENTITY,
            geometry_transform: None,
            mesh: None,
            light: None,
        };
        SceneBuilder {
            nodes: vec![root],
            meshes: Vec::new(),
            skins: Vec::new(),
            blends: Vec::new(),
            materials: Vec::new(),
            textures: Vec::new(),
            lights: Vec::new(),
            stacks: Vec::new(),
            source_axes: AxisSystem::Y_UP,
            source_unit_meters: 1.0,
            active_stack_name: None,
        }
    }

    pub fn root(&self) -> NodeIndex {
        NodeIndex(0)
    }

    pub fn set_axes(&mut self, axes: AxisSystem) {
        self.source_axes = axes;
    }

    pub fn set_unit_meters(&mut self, meters: f64) {
        self.source_unit_meters = meters;
    }

    pub fn set_active_stack(&mut self, name: &str) {
        self.active_stack_name = Some(name.to_string());
    }

    /// Adds a node under the root.
    pub fn add_node(&mut self, id: i64, name: &str, properties: NodeProperties) -> NodeIndex {
        let index = NodeIndex(self.nodes.len());
        self.nodes.push(Node {
            id,
            name: name.to_string(),
            parent: Some(NodeIndex(0)),
            children: Vec::new(),
            properties,
            local_transform: Transform::IDENTITY,
            geometry_transform: None,
            mesh: None,
            light: None,
        });
        self.nodes[0].children.push(index);
        index
    }

    /// Adds a node under `parent`.
    pub fn add_child(&mut self, parent: NodeIndex, id: i64, name: &str, properties: NodeProperties) -> NodeIndex {
        let index = self.add_node(id, name, properties);
        self.set_parent(index, parent);
        index
    }

    /// Moves `child` to the end of `parent`'s children. Refuses moves that would create a cycle.
    pub fn set_parent(&mut self, child: NodeIndex, parent: NodeIndex) -> bool {
        if child.0 == 0 || child.0 >= self.nodes.len() || parent.0 >= self.nodes.len() {
            return false;
        }
        let mut current = Some(parent);
        while let Some(i) = current {
            if i == child {
                return false;
            }
            current = self.nodes[i.0].parent;
        }
        if let Some(old) = self.nodes[child.0].parent {
            self.nodes[old.0].children.retain(|&c| c != child);
        }
        self.nodes[child.0].parent = Some(parent);
        self.nodes[parent.0].children.push(child);
        true
    }

    pub fn node_mut(&mut self, index: NodeIndex) -> &mut Node {
        &mut self.nodes[index.0]
    }

    pub fn node_properties(&self, index: NodeIndex) -> NodeProperties {
        self.nodes[index.0].properties
    }

    pub fn add_mesh(&mut self, node: NodeIndex, mesh: Mesh) -> MeshIndex {
        let index = MeshIndex(self.meshes.len());
        self.meshes.push(mesh);
        self.nodes[node.0].mesh = Some(index);
        index
    }

    /// Shares an existing mesh with another node.
    pub fn attach_mesh(&mut self, node: NodeIndex, mesh: MeshIndex) {
        self.nodes[node.0].mesh = Some(mesh);
    }

    pub fn mesh_mut(&mut self, index: MeshIndex) -> &mut Mesh {
        &mut self.meshes[index.0]
    }

    pub fn add_skin(&mut self, mesh: MeshIndex, skin: SkinDeformer) -> SkinIndex {
        let index = SkinIndex(self.skins.len());
        self.skins.push(skin);
        self.meshes[mesh.0].skin_deformers.push(index);
        index
    }

    pub fn add_blend(&mut self, mesh: MeshIndex, blend: BlendDeformer) -> BlendIndex {
        let index = BlendIndex(self.blends.len());
        self.blends.push(blend);
        self.meshes[mesh.0].blend_deformers.push(index);
        index
    }

    pub fn add_material(&mut self, material: Material) -> MaterialIndex {
        let index = MaterialIndex(self.materials.len());
        self.materials.push(material);
        index
    }

    pub fn material_mut(&mut self, index: MaterialIndex) -> &mut Material {
        &mut self.materials[index.0]
    }

    pub fn add_texture(&mut self, texture: Texture) -> TextureIndex {
        let index = TextureIndex(self.textures.len());
        self.textures.push(texture);
        index
    }

    pub fn add_light(&mut self, node: NodeIndex, light: Light) -> LightIndex {
        let index = LightIndex(self.lights.len());
        self.lights.push(light);
        self.nodes[node.0].light = Some(index);
        index
    }

    pub fn add_stack(&mut self, stack: AnimationStack) -> StackIndex {
        let index = StackIndex(self.stacks.len());
        self.stacks.push(stack);
        index
    }

    pub fn build(self, config: &ImportConfig) -> SceneDocument {
        let SceneBuilder {
            mut nodes,
            mut meshes,
            mut skins,
            mut blends,
            materials,
            textures,
            lights,
            stacks,
            source_axes,
            source_unit_meters,
            active_stack_name,
        } = self;

        let converter = TransformConverter::new(
            &source_axes,
            source_unit_meters,
            &config.target_axes,
            config.target_unit_meters,
        );

        for node in nodes.iter_mut().skip(1) {
            node.local_transform = node.properties.local_transform();
            node.geometry_transform = node.properties.geometry_transform();
        }

        if config.space_conversion == SpaceConversion::ModifyGeometry && !converter.is_identity() {
            for node in nodes.iter_mut().skip(1) {
                node.local_transform = converter.convert_transform(&node.local_transform);
                node.geometry_transform = node.geometry_transform.map(|t| converter.convert_transform(&t));
            }
            for mesh in meshes.iter_mut() {
                mesh.convert(&converter);
            }
            for skin in skins.iter_mut() {
                for cluster in skin.clusters.iter_mut() {
                    cluster.bind_to_world = converter.convert_matrix(&cluster.bind_to_world);
                }
            }
            for blend in blends.iter_mut() {
                for shape in blend.channels.iter_mut().flat_map(|c| c.shapes.iter_mut()) {
                    for (_, offset) in shape.offsets.iter_mut() {
                        *offset = converter.convert_delta(*offset);
                    }
                }
            }
        }

        let mut node_ids = HashMap::with_capacity(nodes.len());
        let mut node_names = HashMap::with_capacity(nodes.len());
        for (i, node) in nodes.iter().enumerate() {
            node_ids.entry(node.id).or_insert(NodeIndex(i));
            if !node.name.is_empty() {
                node_names.entry(node.name.clone()).or_insert(NodeIndex(i));
            }
        }

        let bone_nodes = skins
            .iter()
            .flat_map(|s| s.clusters.iter().map(|c| c.bone_node))
            .collect();

        let active_stack = active_stack_name
            .as_deref()
            .and_then(|name| stacks.iter().position(|s| s.name == name))
            .map(StackIndex);

        debug!(
            "built scene: {} nodes, {} meshes, {} skins, {} blend deformers, {} lights, {} animation stacks",
            nodes.len(),
            meshes.len(),
            skins.len(),
            blends.len(),
            lights.len(),
            stacks.len()
        );

        SceneDocument {
            nodes,
            meshes,
            skins,
            blends,
            materials,
            textures,
            lights,
            stacks,
            node_ids,
            node_names,
            bone_nodes,
            source_axes,
            source_unit_meters,
            space_conversion: config.space_conversion,
            converter,
            active_stack,
        }
    }
}
