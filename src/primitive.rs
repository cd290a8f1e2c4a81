//! Mesh to runtime primitive conversion.
//!
//! Faces are partitioned by material slot and triangulated one at a time. Every emitted triangle
//! corner becomes its own output vertex; nothing is welded.

use std::collections::HashMap;
use std::sync::Arc;

use glam::{DMat4, DVec3, Vec2, Vec3, Vec4};
use log::{debug, trace, warn};

use crate::cache::{DecodedTexture, TextureCache};
use crate::config::{ImportConfig, MaterialsConfig};
use crate::math::normal_matrix;
use crate::scene::{MaterialIndex, NodeIndex, SceneDocument};

#[derive(Clone, Debug, PartialEq)]
pub struct PrimitiveMaterial {
    pub name: String,
    pub base_color: Vec4,
    pub base_color_texture: Option<Arc<DecodedTexture>>,
    pub normal_texture: Option<Arc<DecodedTexture>>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct MorphTarget {
    pub name: String,
    /// Position delta per primitive vertex.
    pub positions: Vec<Vec3>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Primitive {
    /// Material slot, offset by the primitive base when primitives of several meshes are merged.
    pub material_slot: usize,
    /// `None` for the synthetic slot of a mesh without materials.
    pub material: Option<PrimitiveMaterial>,
    pub positions: Vec<Vec3>,
    pub normals: Vec<Vec3>,
    pub uvs: Vec<Vec2>,
    pub colors: Vec<Vec4>,
    /// One stream per 4-wide group: `joints[group][vertex]`.
    pub joints: Vec<Vec<[u16; 4]>>,
    pub weights: Vec<Vec<[f32; 4]>>,
    pub indices: Vec<u32>,
    pub morph_targets: Vec<MorphTarget>,
}

impl Primitive {
    pub fn num_vertices(&self) -> usize {
        self.positions.len()
    }

    pub fn num_triangles(&self) -> usize {
        self.indices.len() / 3
    }

    pub fn is_skinned(&self) -> bool {
        !self.joints.is_empty()
    }
}

/// Appends `source` to `target`, shifting material slots by `primitive_base`.
pub fn merge_primitives(target: &mut Vec<Primitive>, source: Vec<Primitive>, primitive_base: usize) {
    target.extend(source.into_iter().map(|mut p| {
        p.material_slot += primitive_base;
        p
    }));
}

pub struct PrimitiveAssembler<'a> {
    doc: &'a SceneDocument,
    config: &'a ImportConfig,
    textures: Option<&'a TextureCache>,
}

impl<'a> PrimitiveAssembler<'a> {
    pub fn new(doc: &'a SceneDocument, config: &'a ImportConfig) -> PrimitiveAssembler<'a> {
        PrimitiveAssembler {
            doc,
            config,
            textures: None,
        }
    }

    pub fn with_textures(mut self, textures: &'a TextureCache) -> PrimitiveAssembler<'a> {
        self.textures = Some(textures);
        self
    }

    /// Number of material slots of the node's mesh, at least one.
    pub fn slot_count(&self, node: NodeIndex) -> usize {
        self.doc
            .node(node)
            .mesh
            .map_or(0, |m| self.doc.mesh(m).materials.len().max(1))
    }

    fn material(&self, index: MaterialIndex, materials_config: &MaterialsConfig) -> PrimitiveMaterial {
        let material = self.doc.material(index);
        let decode = |texture, srgb| match self.textures {
            Some(cache) if materials_config.load_textures => {
                cache.get_or_decode(self.doc, texture, srgb, materials_config)
            }
            _ => None,
        };
        PrimitiveMaterial {
            name: material.name.clone(),
            base_color: material.base_color.as_vec4(),
            base_color_texture: material.base_color_texture.and_then(|t| decode(t, true)),
            normal_texture: material.normal_texture.and_then(|t| decode(t, false)),
        }
    }

    /// Converts the mesh of `node` into one primitive per non-empty material slot.
    ///
    /// `joints_weights` makes the result skeletal: each vertex gets `weight_group_count` joint and
    /// weight groups filled in accumulation order, and geometry is moved into the node's parent
    /// space. Static geometry only receives the node's geometry offset.
    pub fn assemble(
        &self,
        node: NodeIndex,
        joints_weights: Option<&HashMap<u32, Vec<(usize, f64)>>>,
        weight_group_count: usize,
        materials_config: &MaterialsConfig,
    ) -> Vec<Primitive> {
        let n = self.doc.node(node);
        let mesh = match n.mesh {
            Some(m) => self.doc.mesh(m),
            None => return Vec::new(),
        };
        let converter = self.doc.query_converter();

        let geometry = n.geometry_transform.map_or(DMat4::IDENTITY, |t| t.to_matrix());
        let matrix = if joints_weights.is_some() {
            n.local_transform.to_matrix() * geometry
        } else {
            geometry
        };
        let normals_matrix = normal_matrix(&matrix);
        let flip_winding = (matrix.determinant() < 0.0) != self.doc.converter().is_mirroring();

        let slot_count = mesh.materials.len().max(1);
        let mut slot_faces: Vec<Vec<usize>> = vec![Vec::new(); slot_count];
        for face in 0..mesh.faces.len() {
            let slot = mesh.face_material(face) as usize;
            let slot = if slot < slot_count { slot } else { 0 };
            slot_faces[slot].push(face);
        }

        let channels: Vec<(&str, HashMap<u32, DVec3>)> = mesh
            .blend_deformers
            .iter()
            .flat_map(|&b| self.doc.blend(b).channels.iter())
            .map(|channel| {
                let offsets = channel
                    .target_shape()
                    .map(|s| s.offsets.iter().copied().collect())
                    .unwrap_or_default();
                (channel.name.as_str(), offsets)
            })
            .collect();

        let mut scratch = vec![0u32; mesh.max_face_triangles * 3];
        let mut primitives = Vec::with_capacity(slot_count);
        for (slot, faces) in slot_faces.iter().enumerate() {
            let mut primitive = Primitive {
                material_slot: slot,
                material: mesh.materials.get(slot).map(|&m| self.material(m, materials_config)),
                morph_targets: channels
                    .iter()
                    .map(|(name, _)| MorphTarget {
                        name: name.to_string(),
                        positions: Vec::new(),
                    })
                    .collect(),
                ..Primitive::default()
            };
            if joints_weights.is_some() {
                primitive.joints = vec![Vec::new(); weight_group_count];
                primitive.weights = vec![Vec::new(); weight_group_count];
            }

            for &face in faces {
                let num_triangles = mesh.triangulate_face(&mut scratch, &mesh.faces[face]);
                for triangle in scratch[..num_triangles * 3].chunks_exact(3) {
                    let corners = if flip_winding {
                        [triangle[0], triangle[2], triangle[1]]
                    } else {
                        [triangle[0], triangle[1], triangle[2]]
                    };
                    for corner in corners {
                        let corner = corner as usize;
                        let position = mesh.positions.get(corner).unwrap_or(DVec3::ZERO);
                        primitive
                            .positions
                            .push(converter.convert_position(matrix.transform_point3(position)).as_vec3());

                        if let Some(normals) = &mesh.normals {
                            let normal = normals.get(corner).unwrap_or(DVec3::ZERO);
                            primitive
                                .normals
                                .push(converter.convert_direction(normals_matrix * normal).as_vec3());
                        }
                        if let Some(uvs) = &mesh.uvs {
                            let uv = uvs.get(corner).unwrap_or_default().as_vec2();
                            let uv = if self.config.flip_uv_v { Vec2::new(uv.x, 1.0 - uv.y) } else { uv };
                            primitive.uvs.push(uv);
                        }
                        if let Some(colors) = &mesh.colors {
                            primitive.colors.push(colors.get(corner).unwrap_or_default().as_vec4());
                        }

                        let vertex = mesh.vertex_index(corner);
                        if let Some(joints_weights) = joints_weights {
                            for group in 0..weight_group_count {
                                primitive.joints[group].push([0; 4]);
                                primitive.weights[group].push([0.0; 4]);
                            }
                            match joints_weights.get(&vertex) {
                                Some(influences) => {
                                    for (i, &(bone, weight)) in influences.iter().enumerate() {
                                        let group = i / 4;
                                        if group >= weight_group_count {
                                            break;
                                        }
                                        let joint = match u16::try_from(bone) {
                                            Ok(joint) => joint,
                                            Err(_) => {
                                                warn!("bone {} of {} does not fit a joint index", bone, mesh.name);
                                                continue;
                                            }
                                        };
                                        if let (Some(joints), Some(weights)) =
                                            (primitive.joints[group].last_mut(), primitive.weights[group].last_mut())
                                        {
                                            joints[i % 4] = joint;
                                            weights[i % 4] = weight as f32;
                                        }
                                    }
                                }
                                None => trace!("vertex {} of {} has no skin weights", vertex, mesh.name),
                            }
                        }

                        for (target, (_, offsets)) in primitive.morph_targets.iter_mut().zip(channels.iter()) {
                            let delta = offsets.get(&vertex).copied().unwrap_or(DVec3::ZERO);
                            target
                                .positions
                                .push(converter.convert_delta(matrix.transform_vector3(delta)).as_vec3());
                        }

                        primitive.indices.push(primitive.positions.len() as u32 - 1);
                    }
                }
            }

            if primitive.indices.is_empty() {
                continue;
            }
            primitives.push(primitive);
        }

        debug!(
            "assembled {} primitives from {} ({} faces)",
            primitives.len(),
            mesh.name,
            mesh.faces.len()
        );
        primitives
    }
}
