//! Builds a [`SceneDocument`] from decoded FBX records.
//!
//! FBX stores every entity as a flat object under `Objects` and wires them together through
//! `Connections` (`OO` object-object links and `OP` object-property links). The importer indexes
//! both, then walks the link graph per entity kind.

use std::collections::HashMap;

use glam::{DMat4, DVec2, DVec3, DVec4};
use log::{debug, warn};

use super::{
    BlendChannel, BlendChannelRef, BlendDeformer, BlendShape, Cluster, Light, LightType, Material,
    MaterialIndex, Mesh, NodeIndex, NodeProperties, SceneBuilder, SceneDocument, SkinDeformer,
    Texture, TextureIndex, VertexAttribute,
};
use crate::anim::{
    ktime_to_seconds, AnimCurve, AnimValue, AnimationLayer, AnimationStack, Interpolation, Keyframe,
    NodeChannels,
};
use crate::config::{AxisSystem, CoordinateAxis, ImportConfig};
use crate::error::{Error, Result};
use crate::math::RotationOrder;
use crate::types::{Node as Record, Record as Value};

/// Typed view over a `Properties70` block.
struct Properties<'a> {
    entries: HashMap<&'a str, &'a Record>,
}

impl<'a> Properties<'a> {
    fn of(object: &'a Record) -> Properties<'a> {
        let mut entries = HashMap::new();
        if let Some(block) = object.child("Properties70") {
            for p in block.children_named("P") {
                if let Some(name) = p.property(0).and_then(Value::as_str) {
                    entries.insert(name, p);
                }
            }
        }
        Properties { entries }
    }

    fn value(&self, name: &str, component: usize) -> Option<&'a Value> {
        self.entries.get(name).and_then(|p| p.property(4 + component))
    }

    fn number(&self, name: &str) -> Option<f64> {
        let v = self.value(name, 0)?;
        v.as_f64().or_else(|| v.as_i64().map(|i| i as f64))
    }

    fn int(&self, name: &str) -> Option<i64> {
        let v = self.value(name, 0)?;
        v.as_i64().or_else(|| v.as_f64().map(|f| f as i64))
    }

    fn vec3(&self, name: &str) -> Option<DVec3> {
        Some(DVec3::new(
            self.value(name, 0)?.as_f64()?,
            self.value(name, 1)?.as_f64()?,
            self.value(name, 2)?.as_f64()?,
        ))
    }

    fn string(&self, name: &str) -> Option<&'a str> {
        self.value(name, 0)?.as_str()
    }
}

struct Object<'a> {
    class: &'a str,
    name: String,
    sub_class: &'a str,
    record: &'a Record,
}

struct Link<'a> {
    id: i64,
    property: Option<&'a str>,
}

/// Object name without the binary `\0\x01Class` suffix.
fn object_name(raw: &str) -> String {
    match raw.find("\u{0}\u{1}") {
        Some(end) => raw[..end].to_string(),
        None => raw.to_string(),
    }
}

fn f64_array(record: &Record, name: &str) -> Vec<f64> {
    record
        .child_property(name)
        .and_then(Value::as_f64_array)
        .map(|v| v.into_owned())
        .unwrap_or_default()
}

fn i32_array(record: &Record, name: &str) -> Vec<i32> {
    record
        .child_property(name)
        .and_then(Value::as_i32_array)
        .map(|v| v.into_owned())
        .unwrap_or_default()
}

fn matrix(record: &Record, name: &str) -> Option<DMat4> {
    let values = f64_array(record, name);
    let array: [f64; 16] = values.get(..16)?.try_into().ok()?;
    Some(DMat4::from_cols_array(&array))
}

fn read_axes(settings: &Properties) -> AxisSystem {
    let axis = |axis: &str, sign: &str, default: i64| {
        CoordinateAxis::from_fbx(
            settings.int(axis).unwrap_or(default),
            settings.int(sign).unwrap_or(1),
        )
    };
    match (
        axis("CoordAxis", "CoordAxisSign", 0),
        axis("UpAxis", "UpAxisSign", 1),
        axis("FrontAxis", "FrontAxisSign", 2),
    ) {
        (Some(right), Some(up), Some(front)) => AxisSystem { right, up, front },
        _ => {
            warn!("invalid axis settings, assuming Y up");
            AxisSystem::Y_UP
        }
    }
}

fn read_node_properties(props: &Properties) -> NodeProperties {
    let d = NodeProperties::default();
    NodeProperties {
        translation: props.vec3("Lcl Translation").unwrap_or(d.translation),
        rotation: props.vec3("Lcl Rotation").unwrap_or(d.rotation),
        scaling: props.vec3("Lcl Scaling").unwrap_or(d.scaling),
        pre_rotation: props.vec3("PreRotation").unwrap_or(d.pre_rotation),
        post_rotation: props.vec3("PostRotation").unwrap_or(d.post_rotation),
        rotation_offset: props.vec3("RotationOffset").unwrap_or(d.rotation_offset),
        rotation_pivot: props.vec3("RotationPivot").unwrap_or(d.rotation_pivot),
        scaling_offset: props.vec3("ScalingOffset").unwrap_or(d.scaling_offset),
        scaling_pivot: props.vec3("ScalingPivot").unwrap_or(d.scaling_pivot),
        rotation_order: RotationOrder::from_fbx(props.int("RotationOrder").unwrap_or(0)),
        geometric_translation: props.vec3("GeometricTranslation").unwrap_or(d.geometric_translation),
        geometric_rotation: props.vec3("GeometricRotation").unwrap_or(d.geometric_rotation),
        geometric_scaling: props.vec3("GeometricScaling").unwrap_or(d.geometric_scaling),
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mapping {
    ByPolygonVertex,
    ByVertex,
    ByPolygon,
    AllSame,
}

impl Mapping {
    fn parse(name: &str) -> Option<Mapping> {
        match name {
            "ByPolygonVertex" => Some(Mapping::ByPolygonVertex),
            "ByVertex" | "ByVertice" | "ByControlPoint" => Some(Mapping::ByVertex),
            "ByPolygon" => Some(Mapping::ByPolygon),
            "AllSame" => Some(Mapping::AllSame),
            _ => None,
        }
    }
}

/// Resolves a `LayerElement*` block into a per-corner attribute.
fn layer_attribute<T: Copy>(
    mesh: &Mesh,
    corner_faces: &[u32],
    layer: &Record,
    data_name: &str,
    index_name: &str,
    components: usize,
    make: impl Fn(&[f64]) -> T,
) -> Option<VertexAttribute<T>> {
    let mapping_name = layer.child_property("MappingInformationType").and_then(Value::as_str)?;
    let mapping = match Mapping::parse(mapping_name) {
        Some(m) => m,
        None => {
            warn!("unsupported mapping {} for {}", mapping_name, data_name);
            return None;
        }
    };
    let indexed = layer
        .child_property("ReferenceInformationType")
        .and_then(Value::as_str)
        .map_or(false, |r| r == "IndexToDirect" || r == "Index");

    let data = f64_array(layer, data_name);
    let values: Vec<T> = data.chunks_exact(components).map(make).collect();
    if values.is_empty() {
        return None;
    }
    let index_array = if indexed { i32_array(layer, index_name) } else { Vec::new() };

    let mut out_of_range = 0usize;
    let indices = (0..mesh.num_corners())
        .map(|corner| {
            let key = match mapping {
                Mapping::ByPolygonVertex => corner,
                Mapping::ByVertex => mesh.vertex_index(corner) as usize,
                Mapping::ByPolygon => corner_faces[corner] as usize,
                Mapping::AllSame => 0,
            };
            let index = if indexed {
                index_array.get(key).copied().unwrap_or(-1)
            } else {
                key as i32
            };
            if index < 0 || index as usize >= values.len() {
                out_of_range += 1;
                0
            } else {
                index as u32
            }
        })
        .collect();
    if out_of_range > 0 {
        warn!("{}: {} corners reference missing values", data_name, out_of_range);
    }
    Some(VertexAttribute::new(values, indices))
}

struct Importer<'a> {
    config: &'a ImportConfig,
    objects: HashMap<i64, Object<'a>>,
    order: Vec<i64>,
    children: HashMap<i64, Vec<Link<'a>>>,
    parents: HashMap<i64, Vec<Link<'a>>>,
    builder: SceneBuilder,
    nodes: HashMap<i64, NodeIndex>,
    materials: HashMap<i64, MaterialIndex>,
    textures: HashMap<i64, TextureIndex>,
    blend_channels: HashMap<i64, BlendChannelRef>,
}

impl<'a> Importer<'a> {
    fn new(config: &'a ImportConfig, objects_record: &'a Record, connections: Option<&'a Record>) -> Importer<'a> {
        let mut objects = HashMap::new();
        let mut order = Vec::new();
        for record in &objects_record.children {
            let id = match record.property(0).and_then(Value::as_i64) {
                Some(id) => id,
                None => continue,
            };
            let name = record
                .property(1)
                .and_then(Value::as_str)
                .map(object_name)
                .unwrap_or_default();
            let sub_class = record.property(2).and_then(Value::as_str).unwrap_or("");
            order.push(id);
            objects.insert(
                id,
                Object {
                    class: &record.name,
                    name,
                    sub_class,
                    record,
                },
            );
        }

        let mut children: HashMap<i64, Vec<Link>> = HashMap::new();
        let mut parents: HashMap<i64, Vec<Link>> = HashMap::new();
        for c in connections.iter().flat_map(|c| c.children_named("C")) {
            let kind = c.property(0).and_then(Value::as_str).unwrap_or("");
            let (child, parent) = match (
                c.property(1).and_then(Value::as_i64),
                c.property(2).and_then(Value::as_i64),
            ) {
                (Some(child), Some(parent)) => (child, parent),
                _ => continue,
            };
            let property = if kind == "OP" {
                c.property(3).and_then(Value::as_str)
            } else {
                None
            };
            children.entry(parent).or_default().push(Link { id: child, property });
            parents.entry(child).or_default().push(Link { id: parent, property });
        }

        Importer {
            config,
            objects,
            order,
            children,
            parents,
            builder: SceneBuilder::new(),
            nodes: HashMap::new(),
            materials: HashMap::new(),
            textures: HashMap::new(),
            blend_channels: HashMap::new(),
        }
    }

    fn objects_of(&self, class: &'a str) -> Vec<i64> {
        self.order
            .iter()
            .copied()
            .filter(|id| self.objects.get(id).map_or(false, |o| o.class == class))
            .collect()
    }

    fn linked(&self, map: &HashMap<i64, Vec<Link<'a>>>, id: i64, class: &str, sub_class: Option<&str>) -> Vec<(i64, Option<&'a str>)> {
        map.get(&id)
            .into_iter()
            .flatten()
            .filter(|l| {
                self.objects.get(&l.id).map_or(false, |o| {
                    o.class == class && sub_class.map_or(true, |s| o.sub_class == s)
                })
            })
            .map(|l| (l.id, l.property))
            .collect()
    }

    fn children_of(&self, id: i64, class: &str, sub_class: Option<&str>) -> Vec<(i64, Option<&'a str>)> {
        self.linked(&self.children, id, class, sub_class)
    }

    fn parents_of(&self, id: i64, class: &str, sub_class: Option<&str>) -> Vec<(i64, Option<&'a str>)> {
        self.linked(&self.parents, id, class, sub_class)
    }

    fn object(&self, id: i64) -> &Object<'a> {
        &self.objects[&id]
    }

    fn import_models(&mut self) {
        for id in self.objects_of("Model") {
            let object = self.object(id);
            let props = read_node_properties(&Properties::of(object.record));
            let name = object.name.clone();
            let index = self.builder.add_node(id, &name, props);
            self.nodes.insert(id, index);
        }
        for id in self.objects_of("Model") {
            let parent = self
                .parents_of(id, "Model", None)
                .into_iter()
                .find(|(_, property)| property.is_none())
                .and_then(|(parent, _)| self.nodes.get(&parent).copied());
            if let Some(parent) = parent {
                let child = self.nodes[&id];
                if !self.builder.set_parent(child, parent) {
                    warn!("ignoring cyclic parent link of model {}", id);
                }
            }
        }
    }

    fn import_textures(&mut self) {
        for id in self.objects_of("Texture") {
            let object = self.object(id);
            let filename = object
                .record
                .child_property("FileName")
                .or_else(|| object.record.child_property("RelativeFilename"))
                .and_then(Value::as_str)
                .unwrap_or("")
                .to_string();
            let content = self
                .children_of(id, "Video", None)
                .into_iter()
                .find_map(|(video, _)| {
                    self.object(video)
                        .record
                        .child_property("Content")
                        .and_then(Value::as_bytes)
                        .filter(|b| !b.is_empty())
                        .map(|b| b.to_vec())
                });
            let texture = Texture {
                name: object.name.clone(),
                filename,
                content,
            };
            let index = self.builder.add_texture(texture);
            self.textures.insert(id, index);
        }
    }

    fn import_materials(&mut self) {
        for id in self.objects_of("Material") {
            let object = self.object(id);
            let props = Properties::of(object.record);
            let color = props
                .vec3("DiffuseColor")
                .or_else(|| props.vec3("Diffuse"))
                .unwrap_or(DVec3::ONE);
            let factor = props.number("DiffuseFactor").unwrap_or(1.0);
            let alpha = props
                .number("Opacity")
                .or_else(|| props.number("TransparencyFactor").map(|t| 1.0 - t))
                .unwrap_or(1.0);
            let mut material = Material::new(&object.name);
            material.base_color = (color * factor).extend(alpha);
            for (texture, property) in self.children_of(id, "Texture", None) {
                let texture = match self.textures.get(&texture) {
                    Some(&t) => t,
                    None => continue,
                };
                match property {
                    Some("DiffuseColor") | Some("Diffuse") | Some("Maya|baseColor") => {
                        material.base_color_texture.get_or_insert(texture);
                    }
                    Some("NormalMap") | Some("Bump") | Some("Maya|normalCamera") => {
                        material.normal_texture.get_or_insert(texture);
                    }
                    _ => {}
                }
            }
            let index = self.builder.add_material(material);
            self.materials.insert(id, index);
        }
    }

    fn build_mesh(&self, id: i64) -> Mesh {
        let object = self.object(id);
        let record = object.record;
        let control_points: Vec<DVec3> = f64_array(record, "Vertices")
            .chunks_exact(3)
            .map(|c| DVec3::new(c[0], c[1], c[2]))
            .collect();

        let mut polygons = Vec::new();
        let mut current = Vec::new();
        for index in i32_array(record, "PolygonVertexIndex") {
            if index < 0 {
                current.push(!index as u32);
                polygons.push(std::mem::take(&mut current));
            } else {
                current.push(index as u32);
            }
        }
        if !current.is_empty() {
            polygons.push(current);
        }
        let num_control_points = control_points.len() as u32;
        let invalid = polygons.iter().flatten().filter(|&&v| v >= num_control_points).count();
        if invalid > 0 {
            warn!("mesh {}: {} corners reference missing control points", object.name, invalid);
            polygons.retain(|p| p.iter().all(|&v| v < num_control_points));
        }

        let mut mesh = Mesh::from_polygons(&object.name, control_points, &polygons);
        let mut corner_faces = vec![0u32; mesh.num_corners()];
        for (i, face) in mesh.faces.iter().enumerate() {
            for corner in face.index_begin..face.index_begin + face.num_indices {
                corner_faces[corner as usize] = i as u32;
            }
        }

        if let Some(layer) = record.child("LayerElementNormal") {
            mesh.normals = layer_attribute(&mesh, &corner_faces, layer, "Normals", "NormalsIndex", 3, |c| {
                DVec3::new(c[0], c[1], c[2]).normalize_or_zero()
            });
        }
        if let Some(layer) = record.child("LayerElementUV") {
            mesh.uvs = layer_attribute(&mesh, &corner_faces, layer, "UV", "UVIndex", 2, |c| {
                DVec2::new(c[0], c[1])
            });
        }
        if let Some(layer) = record.child("LayerElementColor") {
            mesh.colors = layer_attribute(&mesh, &corner_faces, layer, "Colors", "ColorIndex", 4, |c| {
                DVec4::new(c[0], c[1], c[2], c[3])
            });
        }
        if let Some(layer) = record.child("LayerElementMaterial") {
            let slots = i32_array(layer, "Materials");
            let all_same = layer
                .child_property("MappingInformationType")
                .and_then(Value::as_str)
                .map_or(false, |m| m == "AllSame");
            for (i, slot) in mesh.face_materials.iter_mut().enumerate() {
                let value = if all_same { slots.first() } else { slots.get(i) };
                *slot = value.copied().unwrap_or(0).max(0) as u32;
            }
        }
        if mesh.normals.is_none() && self.config.generate_missing_normals {
            mesh.generate_normals();
        }
        mesh
    }

    fn build_skin(&self, id: i64) -> SkinDeformer {
        let mut skin = SkinDeformer {
            name: self.object(id).name.clone(),
            clusters: Vec::new(),
        };
        for (cluster_id, _) in self.children_of(id, "Deformer", Some("Cluster")) {
            let object = self.object(cluster_id);
            let bone = self
                .children_of(cluster_id, "Model", None)
                .into_iter()
                .find_map(|(model, _)| self.nodes.get(&model).copied());
            let bone = match bone {
                Some(bone) => bone,
                None => {
                    warn!("cluster {} has no bone, skipped", object.name);
                    continue;
                }
            };
            let bind_to_world = matrix(object.record, "TransformLink").unwrap_or_else(|| {
                warn!("cluster {} has no TransformLink, using identity", object.name);
                DMat4::IDENTITY
            });
            let vertices = i32_array(object.record, "Indexes");
            let weights = f64_array(object.record, "Weights");
            let mut cluster = Cluster::new(bone, bind_to_world);
            cluster.name = object.name.clone();
            for (&vertex, &weight) in vertices.iter().zip(weights.iter()) {
                if vertex >= 0 {
                    cluster.vertices.push(vertex as u32);
                    cluster.weights.push(weight);
                }
            }
            skin.clusters.push(cluster);
        }
        skin
    }

    fn build_blend(&self, id: i64) -> (BlendDeformer, Vec<i64>) {
        let mut blend = BlendDeformer {
            name: self.object(id).name.clone(),
            channels: Vec::new(),
        };
        let mut channel_ids = Vec::new();
        for (channel_id, _) in self.children_of(id, "Deformer", Some("BlendShapeChannel")) {
            let object = self.object(channel_id);
            let percent = object
                .record
                .child_property("DeformPercent")
                .and_then(Value::as_f64)
                .or_else(|| Properties::of(object.record).number("DeformPercent"))
                .unwrap_or(0.0);
            let shapes = self
                .children_of(channel_id, "Geometry", Some("Shape"))
                .into_iter()
                .map(|(shape_id, _)| {
                    let shape = self.object(shape_id);
                    let indices = i32_array(shape.record, "Indexes");
                    let offsets = f64_array(shape.record, "Vertices");
                    BlendShape {
                        name: shape.name.clone(),
                        offsets: indices
                            .iter()
                            .zip(offsets.chunks_exact(3))
                            .filter(|(&i, _)| i >= 0)
                            .map(|(&i, c)| (i as u32, DVec3::new(c[0], c[1], c[2])))
                            .collect(),
                    }
                })
                .collect();
            blend.channels.push(BlendChannel {
                name: object.name.clone(),
                weight: percent / 100.0,
                shapes,
            });
            channel_ids.push(channel_id);
        }
        (blend, channel_ids)
    }

    fn import_geometry(&mut self) {
        for id in self.objects_of("Geometry") {
            if self.object(id).sub_class != "Mesh" {
                continue;
            }
            let owners: Vec<NodeIndex> = self
                .parents_of(id, "Model", None)
                .into_iter()
                .filter_map(|(model, _)| self.nodes.get(&model).copied())
                .collect();
            let first_model = self
                .parents_of(id, "Model", None)
                .into_iter()
                .map(|(model, _)| model)
                .find(|model| self.nodes.contains_key(model));
            let (first, first_model) = match (owners.first(), first_model) {
                (Some(&first), Some(model)) => (first, model),
                _ => {
                    debug!("geometry {} is not instanced, skipped", self.object(id).name);
                    continue;
                }
            };

            let mut mesh = self.build_mesh(id);
            mesh.materials = self
                .children_of(first_model, "Material", None)
                .into_iter()
                .filter_map(|(m, _)| self.materials.get(&m).copied())
                .collect();
            let skins: Vec<SkinDeformer> = self
                .children_of(id, "Deformer", Some("Skin"))
                .into_iter()
                .map(|(skin, _)| self.build_skin(skin))
                .collect();
            let blends: Vec<(BlendDeformer, Vec<i64>)> = self
                .children_of(id, "Deformer", Some("BlendShape"))
                .into_iter()
                .map(|(blend, _)| self.build_blend(blend))
                .collect();

            let mesh_index = self.builder.add_mesh(first, mesh);
            for &owner in &owners[1..] {
                self.builder.attach_mesh(owner, mesh_index);
            }
            for skin in skins {
                self.builder.add_skin(mesh_index, skin);
            }
            for (blend, channel_ids) in blends {
                let deformer = self.builder.add_blend(mesh_index, blend);
                for (channel, channel_id) in channel_ids.into_iter().enumerate() {
                    self.blend_channels
                        .insert(channel_id, BlendChannelRef { deformer, channel });
                }
            }
        }
    }

    fn import_lights(&mut self) {
        for id in self.objects_of("NodeAttribute") {
            let object = self.object(id);
            if object.sub_class != "Light" {
                continue;
            }
            let props = Properties::of(object.record);
            let raw_type = props.int("LightType").unwrap_or(0);
            let light_type = match LightType::from_fbx(raw_type) {
                Some(t) => t,
                None => {
                    warn!("light {} has unknown type {}", object.name, raw_type);
                    continue;
                }
            };
            let light = Light {
                name: object.name.clone(),
                light_type,
                color: props.vec3("Color").unwrap_or(DVec3::ONE),
                intensity: props.number("Intensity").unwrap_or(100.0) / 100.0,
                inner_angle: props.number("InnerAngle").unwrap_or(0.0).to_radians(),
                outer_angle: props.number("OuterAngle").unwrap_or(45.0).to_radians(),
            };
            let owner = self
                .parents_of(id, "Model", None)
                .into_iter()
                .find_map(|(model, _)| self.nodes.get(&model).copied());
            if let Some(owner) = owner {
                self.builder.add_light(owner, light);
            }
        }
    }

    fn build_curve(&self, id: i64) -> AnimCurve {
        let record = self.object(id).record;
        let times = record
            .child_property("KeyTime")
            .and_then(Value::as_i64_array)
            .map(|v| v.into_owned())
            .unwrap_or_default();
        let values = f64_array(record, "KeyValueFloat");
        let flags = i32_array(record, "KeyAttrFlags");
        let ref_counts = i32_array(record, "KeyAttrRefCount");

        let mut interpolations = Vec::with_capacity(times.len());
        for (flag, count) in flags.iter().zip(ref_counts.iter()) {
            let interpolation = if flag & 0x02 != 0 {
                Interpolation::Constant
            } else if flag & 0x08 != 0 {
                Interpolation::Cubic
            } else {
                Interpolation::Linear
            };
            for _ in 0..(*count).max(0) {
                interpolations.push(interpolation);
            }
        }

        AnimCurve {
            keys: times
                .iter()
                .zip(values.iter())
                .enumerate()
                .map(|(i, (&time, &value))| Keyframe {
                    time: ktime_to_seconds(time),
                    value,
                    interpolation: interpolations.get(i).copied().unwrap_or_default(),
                })
                .collect(),
        }
    }

    fn build_value(&self, curve_node: i64, default: DVec3, components: &[&str]) -> AnimValue {
        let props = Properties::of(self.object(curve_node).record);
        let mut value = AnimValue::new(default);
        for (i, component) in components.iter().enumerate() {
            if let Some(d) = props.number(component) {
                value.default[i] = d;
            }
        }
        for (curve, property) in self.children_of(curve_node, "AnimationCurve", None) {
            if let Some(i) = components.iter().position(|c| Some(*c) == property) {
                value.curves[i] = Some(self.build_curve(curve));
            }
        }
        value
    }

    fn build_layer(&self, id: i64) -> AnimationLayer {
        let mut layer = AnimationLayer {
            name: self.object(id).name.clone(),
            ..AnimationLayer::default()
        };
        for (curve_node, _) in self.children_of(id, "AnimationCurveNode", None) {
            for link in self.parents.get(&curve_node).into_iter().flatten() {
                let property = match link.property {
                    Some(p) => p,
                    None => continue,
                };
                if let Some(&node) = self.nodes.get(&link.id) {
                    let props = self.builder.node_properties(node);
                    let channels = layer.nodes.entry(node).or_insert_with(NodeChannels::default);
                    let xyz = ["d|X", "d|Y", "d|Z"];
                    match property {
                        "Lcl Translation" => {
                            channels.translation = Some(self.build_value(curve_node, props.translation, &xyz))
                        }
                        "Lcl Rotation" => {
                            channels.rotation = Some(self.build_value(curve_node, props.rotation, &xyz))
                        }
                        "Lcl Scaling" => {
                            channels.scaling = Some(self.build_value(curve_node, props.scaling, &xyz))
                        }
                        _ => {}
                    }
                } else if let Some(&channel) = self.blend_channels.get(&link.id) {
                    if property == "DeformPercent" {
                        let value = self.build_value(curve_node, DVec3::ZERO, &["d|DeformPercent"]);
                        layer.blend_channels.insert(channel, value);
                    }
                }
            }
        }
        layer.nodes.retain(|_, c| c.translation.is_some() || c.rotation.is_some() || c.scaling.is_some());
        layer
    }

    fn import_animation(&mut self) {
        for id in self.objects_of("AnimationStack") {
            let layers: Vec<AnimationLayer> = self
                .children_of(id, "AnimationLayer", None)
                .into_iter()
                .map(|(layer, _)| self.build_layer(layer))
                .collect();
            let object = self.object(id);
            let props = Properties::of(object.record);
            let mut stack = AnimationStack {
                id,
                name: object.name.clone(),
                time_begin: 0.0,
                time_end: 0.0,
                layers,
            };
            let start = props.int("LocalStart").or_else(|| props.int("ReferenceStart"));
            let stop = props.int("LocalStop").or_else(|| props.int("ReferenceStop"));
            match (start, stop) {
                (Some(start), Some(stop)) if stop > start => {
                    stack.time_begin = ktime_to_seconds(start);
                    stack.time_end = ktime_to_seconds(stop);
                }
                _ => {
                    if let Some((begin, end)) = stack.key_range() {
                        stack.time_begin = begin;
                        stack.time_end = end;
                    }
                }
            }
            self.builder.add_stack(stack);
        }
    }
}

/// Interprets a decoded record tree as a scene.
pub fn import_document(records: &[Record], config: &ImportConfig) -> Result<SceneDocument> {
    let objects = records
        .iter()
        .find(|r| r.name == "Objects")
        .ok_or_else(|| Error::Malformed("missing Objects section".to_string()))?;
    let connections = records.iter().find(|r| r.name == "Connections");

    let mut importer = Importer::new(config, objects, connections);

    if let Some(settings) = records.iter().find(|r| r.name == "GlobalSettings") {
        let props = Properties::of(settings);
        importer.builder.set_axes(read_axes(&props));
        let unit_scale_factor = props.number("UnitScaleFactor").unwrap_or(1.0);
        importer.builder.set_unit_meters(unit_scale_factor * 0.01);
    } else {
        importer.builder.set_unit_meters(0.01);
    }

    let active_stack = records
        .iter()
        .find(|r| r.name == "Documents")
        .and_then(|d| d.child("Document"))
        .and_then(|d| Properties::of(d).string("ActiveAnimStackName").map(str::to_string));
    if let Some(name) = active_stack.filter(|n| !n.is_empty()) {
        importer.builder.set_active_stack(&name);
    }

    importer.import_models();
    importer.import_textures();
    importer.import_materials();
    importer.import_geometry();
    importer.import_lights();
    importer.import_animation();

    Ok(importer.builder.build(config))
}
