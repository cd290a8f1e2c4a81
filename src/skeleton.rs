//! Skeleton reconstruction from skin deformers.
//!
//! The bone hierarchy is rebuilt from the scene graph rather than from the clusters alone: the
//! subtree containing the first cluster's bone is walked depth first, bound nodes take their
//! parent relative bind pose from the cluster matrices and unbound intermediate nodes keep their
//! local transform.

use std::collections::HashMap;

use glam::DMat4;
use log::{debug, warn};

use crate::math::Transform;
use crate::scene::{Mesh, NodeIndex, SceneDocument, SkinDeformer};

#[derive(Clone, Debug, PartialEq)]
pub struct Bone {
    pub name: String,
    /// Always smaller than the bone's own index. `None` for the root.
    pub parent_index: Option<usize>,
    /// Bind pose relative to the parent bone, in target space.
    pub transform: Transform,
    pub node: NodeIndex,
}

/// Bones plus the per-vertex `(bone, weight)` lists accumulated from the clusters.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Skeleton {
    pub bones: Vec<Bone>,
    /// Control point → influences in cluster order.
    pub joints_weights: HashMap<u32, Vec<(usize, f64)>>,
}

impl Skeleton {
    pub fn is_empty(&self) -> bool {
        self.bones.is_empty()
    }

    pub fn len(&self) -> usize {
        self.bones.len()
    }

    pub fn bone_index(&self, name: &str) -> Option<usize> {
        self.bones.iter().position(|b| b.name == name)
    }

    pub fn max_influences(&self) -> usize {
        self.joints_weights.values().map(Vec::len).max().unwrap_or(0)
    }

    /// Number of 4-wide joint/weight groups needed per vertex.
    pub fn weight_group_count(&self) -> usize {
        weight_group_count(self.max_influences())
    }
}

pub fn weight_group_count(max_influences: usize) -> usize {
    (max_influences + 3) / 4
}

/// True when both skeletons have the same `(parent, name)` sequence.
pub fn skeletons_match(a: &[Bone], b: &[Bone]) -> bool {
    a.len() == b.len() && skeletons_match_prefix(a, b)
}

/// True when the skeletons agree over their common length.
pub fn skeletons_match_prefix(a: &[Bone], b: &[Bone]) -> bool {
    a.iter()
        .zip(b.iter())
        .all(|(x, y)| x.parent_index == y.parent_index && x.name == y.name)
}

pub struct SkeletonBuilder<'a> {
    doc: &'a SceneDocument,
}

impl<'a> SkeletonBuilder<'a> {
    pub fn new(doc: &'a SceneDocument) -> SkeletonBuilder<'a> {
        SkeletonBuilder { doc }
    }

    /// Top of the chain holding `node`: the ancestor right below the scene root.
    fn chain_root(&self, node: NodeIndex) -> NodeIndex {
        let mut current = node;
        while let Some(parent) = self.doc.node(current).parent {
            if self.doc.node(parent).is_root() {
                break;
            }
            current = parent;
        }
        current
    }

    fn bind_pose(&self, skin: &SkinDeformer, node: NodeIndex, bind_to_world: &DMat4) -> Transform {
        let parent = self.doc.node(node).parent;
        let parent_to_world = match parent {
            Some(p) => match skin.cluster_for(p) {
                Some(parent_cluster) => parent_cluster.bind_to_world,
                None => self.doc.node_to_world(p),
            },
            None => DMat4::IDENTITY,
        };
        let local = parent_to_world.inverse() * *bind_to_world;
        Transform::from_matrix(&self.doc.query_converter().convert_matrix(&local))
    }

    /// Builds the skeleton of one skin deformer.
    ///
    /// Only the first cluster decides which subtree is walked. Unbound nodes met before the first
    /// bound one are skipped; their bound descendants attach to the nearest accepted ancestor.
    pub fn build(&self, skin: &SkinDeformer) -> Skeleton {
        let first = match skin.clusters.first() {
            Some(c) => c,
            None => return Skeleton::default(),
        };
        let root = self.chain_root(first.bone_node);
        let converter = self.doc.query_converter();

        let mut skeleton = Skeleton::default();
        let mut bone_of_node: HashMap<NodeIndex, usize> = HashMap::new();
        let mut found_bound = false;
        let mut stack = vec![(root, None::<usize>)];
        while let Some((node, parent_bone)) = stack.pop() {
            let n = self.doc.node(node);
            let transform = match skin.cluster_for(node) {
                Some(cluster) => {
                    found_bound = true;
                    Some(self.bind_pose(skin, node, &cluster.bind_to_world))
                }
                None if found_bound => Some(converter.convert_transform(&n.local_transform)),
                None => None,
            };
            let next_parent = match transform {
                Some(transform) => {
                    let index = skeleton.bones.len();
                    skeleton.bones.push(Bone {
                        name: n.name.clone(),
                        parent_index: parent_bone,
                        transform,
                        node,
                    });
                    bone_of_node.insert(node, index);
                    Some(index)
                }
                None => parent_bone,
            };
            for &child in n.children.iter().rev() {
                stack.push((child, next_parent));
            }
        }

        for cluster in &skin.clusters {
            let bone = match bone_of_node.get(&cluster.bone_node) {
                Some(&bone) => bone,
                None => {
                    warn!(
                        "cluster {} binds {} outside the skeleton of {}",
                        cluster.name,
                        self.doc.node(cluster.bone_node).name,
                        self.doc.node(root).name
                    );
                    continue;
                }
            };
            for (vertex, weight) in cluster.influences() {
                skeleton.joints_weights.entry(vertex).or_default().push((bone, weight));
            }
        }

        debug!(
            "skeleton {}: {} bones, {} weighted vertices",
            skin.name,
            skeleton.bones.len(),
            skeleton.joints_weights.len()
        );
        skeleton
    }

    /// Builds one skeleton from every skin deformer of `mesh`, merging bones by name.
    pub fn build_for_mesh(&self, mesh: &Mesh) -> Skeleton {
        let mut skins = mesh.skin_deformers.iter().map(|&s| self.doc.skin(s));
        let mut merged = match skins.next() {
            Some(skin) => self.build(skin),
            None => return Skeleton::default(),
        };
        for skin in skins {
            let other = self.build(skin);
            merge_skeleton(&mut merged, other);
        }
        merged
    }
}

/// Appends the bones of `other` missing from `into` and moves its weights over.
///
/// Weights are appended as is: a vertex bound to the same bone by two skins keeps both entries.
fn merge_skeleton(into: &mut Skeleton, other: Skeleton) {
    let mut by_name: HashMap<String, usize> = into
        .bones
        .iter()
        .enumerate()
        .map(|(i, b)| (b.name.clone(), i))
        .collect();
    let mut remap = Vec::with_capacity(other.bones.len());
    for bone in other.bones {
        let index = match by_name.get(&bone.name) {
            Some(&existing) => existing,
            None => {
                let index = into.bones.len();
                by_name.insert(bone.name.clone(), index);
                into.bones.push(Bone {
                    parent_index: bone.parent_index.map(|p| remap[p]),
                    ..bone
                });
                index
            }
        };
        remap.push(index);
    }
    for (vertex, influences) in other.joints_weights {
        into.joints_weights
            .entry(vertex)
            .or_default()
            .extend(influences.into_iter().map(|(bone, weight)| (remap[bone], weight)));
    }
}
