//! Engine facing entry point.
//!
//! [`FbxAsset`] wraps the [`SceneCache`] of one asset and exposes node enumeration, animation
//! lookup, mesh conversion, animation sampling and light extraction. Nodes are addressed by their
//! FBX element id. Every query loads the document on first use and returns an empty result when
//! the asset failed to load.

use std::sync::Arc;

use log::warn;
use serde::{Deserialize, Serialize};

use crate::cache::{AssetSource, SceneCache, TextureDecoder};
use crate::config::{ImportConfig, MaterialsConfig};
use crate::light::{self, LightDescriptor};
use crate::math::Transform;
use crate::primitive::{merge_primitives, Primitive, PrimitiveAssembler};
use crate::sampler::{AnimationSampler, RestPoseFixup, SampledAnimation};
use crate::scene::{NodeIndex, SceneDocument};
use crate::skeleton::{skeletons_match, skeletons_match_prefix, Bone, Skeleton, SkeletonBuilder};

#[derive(Clone, Debug, PartialEq)]
pub struct NodeInfo {
    pub id: i64,
    pub name: String,
    pub has_mesh: bool,
    pub is_light: bool,
    /// Local transform in target space.
    pub transform: Transform,
}

#[derive(Clone, Debug, PartialEq)]
pub struct AnimationInfo {
    pub id: i64,
    pub name: String,
    /// Seconds.
    pub duration: f64,
}

/// Which animation to play when the caller does not name one.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefaultAnimation {
    /// The file's active stack, or the first one.
    #[default]
    Default,
    First,
    Last,
    Shortest,
    Longest,
}

/// Skeleton compatibility rule for merging skinned meshes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergePolicy {
    /// Skeletons must match the first skinned node's skeleton exactly.
    #[default]
    Strict,
    /// The largest skeleton is the reference; others must match its prefix.
    Biggest,
}

/// Converted mesh: primitives plus the skeleton when the mesh is skinned.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MeshLod {
    pub primitives: Vec<Primitive>,
    pub skeleton: Vec<Bone>,
}

impl MeshLod {
    pub fn is_skeletal(&self) -> bool {
        !self.skeleton.is_empty()
    }
}

pub struct FbxAsset {
    cache: SceneCache,
}

impl FbxAsset {
    pub fn new<S: AssetSource + 'static>(source: S, config: ImportConfig) -> FbxAsset {
        FbxAsset {
            cache: SceneCache::new(source, config),
        }
    }

    pub fn from_cache(cache: SceneCache) -> FbxAsset {
        FbxAsset { cache }
    }

    pub fn with_texture_decoder<D: TextureDecoder + 'static>(self, decoder: D) -> FbxAsset {
        FbxAsset {
            cache: self.cache.with_texture_decoder(decoder),
        }
    }

    pub fn cache(&self) -> &SceneCache {
        &self.cache
    }

    pub fn document(&self) -> Option<Arc<SceneDocument>> {
        self.cache.get_or_load()
    }

    /// Forgets the parsed document, e.g. after the engine reloaded the asset.
    pub fn invalidate(&self) {
        self.cache.invalidate();
    }

    fn node_info(doc: &SceneDocument, index: NodeIndex) -> NodeInfo {
        let node = doc.node(index);
        NodeInfo {
            id: node.id,
            name: node.name.clone(),
            has_mesh: node.mesh.is_some(),
            is_light: node.light.is_some(),
            transform: doc.query_converter().convert_transform(&node.local_transform),
        }
    }

    fn with_node<T>(&self, id: i64, f: impl FnOnce(&SceneDocument, NodeIndex) -> Option<T>) -> Option<T> {
        let doc = self.document()?;
        let index = doc.node_by_id(id)?;
        f(&*doc, index)
    }

    pub fn node_names(&self) -> Vec<String> {
        self.document()
            .map(|doc| doc.nodes().iter().map(|n| n.name.clone()).collect())
            .unwrap_or_default()
    }

    pub fn node_ids(&self) -> Vec<i64> {
        self.document()
            .map(|doc| doc.nodes().iter().map(|n| n.id).collect())
            .unwrap_or_default()
    }

    pub fn nodes(&self) -> Vec<NodeInfo> {
        self.document()
            .map(|doc| doc.node_indices().map(|i| Self::node_info(&doc, i)).collect())
            .unwrap_or_default()
    }

    pub fn root_node(&self) -> Option<NodeInfo> {
        let doc = self.document()?;
        Some(Self::node_info(&doc, doc.root()))
    }

    pub fn node(&self, id: i64) -> Option<NodeInfo> {
        self.with_node(id, |doc, index| Some(Self::node_info(doc, index)))
    }

    pub fn node_children(&self, id: i64) -> Vec<NodeInfo> {
        self.with_node(id, |doc, index| {
            Some(
                doc.node(index)
                    .children
                    .iter()
                    .map(|&c| Self::node_info(doc, c))
                    .collect(),
            )
        })
        .unwrap_or_default()
    }

    pub fn node_parent(&self, id: i64) -> Option<NodeInfo> {
        self.with_node(id, |doc, index| {
            doc.node(index).parent.map(|p| Self::node_info(doc, p))
        })
    }

    pub fn node_by_name(&self, name: &str) -> Option<NodeInfo> {
        let doc = self.document()?;
        let index = doc.node_by_name(name)?;
        Some(Self::node_info(&doc, index))
    }

    /// True when some skin cluster binds the node.
    pub fn is_bone(&self, id: i64) -> bool {
        self.with_node(id, |doc, index| Some(doc.is_bone(index)))
            .unwrap_or(false)
    }

    pub fn animations(&self) -> Vec<AnimationInfo> {
        self.document()
            .map(|doc| {
                doc.stacks()
                    .iter()
                    .map(|s| AnimationInfo {
                        id: s.id,
                        name: s.name.clone(),
                        duration: s.duration(),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn default_animation(&self) -> Option<AnimationInfo> {
        self.pick_animation(DefaultAnimation::Default)
    }

    pub fn pick_animation(&self, policy: DefaultAnimation) -> Option<AnimationInfo> {
        let mut animations = self.animations();
        match policy {
            DefaultAnimation::Default => {
                let doc = self.document()?;
                let stack = doc.stack(doc.default_stack()?);
                animations.into_iter().find(|a| a.id == stack.id)
            }
            DefaultAnimation::First => animations.into_iter().next(),
            DefaultAnimation::Last => animations.pop(),
            DefaultAnimation::Shortest => animations
                .into_iter()
                .min_by(|a, b| a.duration.total_cmp(&b.duration)),
            DefaultAnimation::Longest => animations
                .into_iter()
                .max_by(|a, b| a.duration.total_cmp(&b.duration)),
        }
    }

    fn assembler<'a>(&'a self, doc: &'a SceneDocument) -> PrimitiveAssembler<'a> {
        PrimitiveAssembler::new(doc, self.cache.config()).with_textures(self.cache.textures())
    }

    fn skeleton_of(doc: &SceneDocument, index: NodeIndex) -> Option<Skeleton> {
        let mesh = doc.mesh(doc.node(index).mesh?);
        let skeleton = SkeletonBuilder::new(doc).build_for_mesh(mesh);
        if skeleton.is_empty() {
            None
        } else {
            Some(skeleton)
        }
    }

    /// Converts the mesh of a node. Skinned meshes come with their skeleton.
    pub fn load_mesh(&self, id: i64, materials: &MaterialsConfig) -> Option<MeshLod> {
        self.with_node(id, |doc, index| {
            doc.node(index).mesh?;
            let assembler = self.assembler(doc);
            let lod = match Self::skeleton_of(doc, index) {
                Some(skeleton) => MeshLod {
                    primitives: assembler.assemble(
                        index,
                        Some(&skeleton.joints_weights),
                        skeleton.weight_group_count(),
                        materials,
                    ),
                    skeleton: skeleton.bones,
                },
                None => MeshLod {
                    primitives: assembler.assemble(index, None, 0, materials),
                    skeleton: Vec::new(),
                },
            };
            Some(lod)
        })
    }

    fn merge_group(
        &self,
        doc: &SceneDocument,
        members: &[(NodeIndex, Skeleton)],
        reference: &[Bone],
        policy: MergePolicy,
        materials: &MaterialsConfig,
    ) -> MeshLod {
        let compatible = |bones: &[Bone]| match policy {
            MergePolicy::Strict => skeletons_match(reference, bones),
            MergePolicy::Biggest => skeletons_match_prefix(reference, bones),
        };
        let accepted: Vec<&(NodeIndex, Skeleton)> = members
            .iter()
            .filter(|(index, skeleton)| {
                let ok = compatible(&skeleton.bones);
                if !ok {
                    warn!("{} has an incompatible skeleton, excluded from merge", doc.node(*index).name);
                }
                ok
            })
            .collect();
        let groups = accepted
            .iter()
            .map(|(_, s)| s.weight_group_count())
            .max()
            .unwrap_or(0);

        let assembler = self.assembler(doc);
        let mut lod = MeshLod {
            primitives: Vec::new(),
            skeleton: reference.to_vec(),
        };
        let mut primitive_base = 0;
        for (index, skeleton) in accepted {
            let primitives = assembler.assemble(*index, Some(&skeleton.joints_weights), groups, materials);
            merge_primitives(&mut lod.primitives, primitives, primitive_base);
            primitive_base += assembler.slot_count(*index);
        }
        lod
    }

    fn skinned_members(doc: &SceneDocument, indices: impl Iterator<Item = NodeIndex>) -> Vec<(NodeIndex, Skeleton)> {
        indices
            .filter_map(|index| {
                let skeleton = Self::skeleton_of(doc, index);
                if skeleton.is_none() {
                    warn!("{} is not a skinned mesh, excluded from merge", doc.node(index).name);
                }
                skeleton.map(|s| (index, s))
            })
            .collect()
    }

    /// Merges the skinned meshes of `ids` that share a compatible skeleton into one mesh.
    pub fn load_merged_skinned_meshes(
        &self,
        ids: &[i64],
        policy: MergePolicy,
        materials: &MaterialsConfig,
    ) -> Option<MeshLod> {
        let doc = self.document()?;
        let indices = ids.iter().filter_map(|&id| {
            let index = doc.node_by_id(id);
            if index.is_none() {
                warn!("no node with id {}", id);
            }
            index
        });
        let members = Self::skinned_members(&doc, indices);
        let reference = match policy {
            MergePolicy::Strict => members.first(),
            MergePolicy::Biggest => members
                .iter()
                .reduce(|best, m| if m.1.len() > best.1.len() { m } else { best }),
        }?;
        let reference = reference.1.bones.clone();
        Some(self.merge_group(&doc, &members, &reference, policy, materials))
    }

    /// Partitions every skinned mesh of the scene into groups with identical skeletons and merges
    /// each group.
    pub fn load_skinned_mesh_groups(&self, materials: &MaterialsConfig) -> Vec<MeshLod> {
        let doc = match self.document() {
            Some(doc) => doc,
            None => return Vec::new(),
        };
        let skinned = doc.mesh_nodes().filter(|&i| {
            doc.node(i)
                .mesh
                .map_or(false, |m| !doc.mesh(m).skin_deformers.is_empty())
        });
        let members = Self::skinned_members(&doc, skinned);
        let mut groups: Vec<Vec<(NodeIndex, Skeleton)>> = Vec::new();
        for member in members {
            match groups
                .iter_mut()
                .find(|g| skeletons_match(&g[0].1.bones, &member.1.bones))
            {
                Some(group) => group.push(member),
                None => groups.push(vec![member]),
            }
        }
        groups
            .iter()
            .map(|group| {
                let reference = group[0].1.bones.clone();
                self.merge_group(&doc, group, &reference, MergePolicy::Strict, materials)
            })
            .collect()
    }

    /// Samples the bones of the node's own skeleton and its blend channels.
    pub fn load_skinned_animation(&self, id: i64, stack_id: i64, frame_rate: f64) -> Option<SampledAnimation> {
        self.with_node(id, |doc, index| {
            let mesh = doc.mesh(doc.node(index).mesh?);
            let skeleton = SkeletonBuilder::new(doc).build_for_mesh(mesh);
            AnimationSampler::new(doc).sample_skinned(stack_id, index, &skeleton, frame_rate)
        })
    }

    /// Samples the bones of an external skeleton, matched by name.
    pub fn load_animation_with_skeleton(
        &self,
        id: i64,
        stack_id: i64,
        skeleton: &[Bone],
        frame_rate: f64,
    ) -> Option<SampledAnimation> {
        self.with_node(id, |doc, index| {
            AnimationSampler::new(doc).sample_with_skeleton(stack_id, index, skeleton, frame_rate)
        })
    }

    /// Samples every named node of the document.
    pub fn load_raw_animation(
        &self,
        stack_id: i64,
        frame_rate: f64,
        fixup: Option<&dyn RestPoseFixup>,
    ) -> Option<SampledAnimation> {
        let doc = self.document()?;
        AnimationSampler::new(&doc).sample_raw(stack_id, frame_rate, fixup)
    }

    pub fn load_light(&self, id: i64) -> Option<LightDescriptor> {
        self.with_node(id, |doc, index| light::extract(doc, index, &self.cache.config().light))
    }
}
