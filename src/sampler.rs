//! Fixed rate animation resampling.

use glam::{Quat, Vec3};
use log::{debug, warn};

use crate::math::Transform;
use crate::scene::{BlendChannelRef, BlendIndex, NodeIndex, SceneDocument, StackIndex};
use crate::skeleton::{Bone, Skeleton};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TransformKey {
    /// Seconds from the start of the animation.
    pub time: f32,
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct BoneTrack {
    pub bone: String,
    pub keys: Vec<TransformKey>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct MorphCurve {
    pub name: String,
    /// `(time, weight)` pairs, weight in 0..1.
    pub keys: Vec<(f32, f32)>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct SampledAnimation {
    pub name: String,
    /// Seconds.
    pub duration: f32,
    pub tracks: Vec<BoneTrack>,
    pub morph_curves: Vec<MorphCurve>,
    /// Rest transforms of the sampled bones, filled by the raw variant only.
    pub rest_pose: Vec<(String, Transform)>,
}

impl SampledAnimation {
    pub fn track(&self, bone: &str) -> Option<&BoneTrack> {
        self.tracks.iter().find(|t| t.bone == bone)
    }
}

/// Engine hook reconciling raw sampled tracks with the rest pose of the runtime skeleton.
pub trait RestPoseFixup {
    fn fixup(&self, animation: &mut SampledAnimation);
}

/// Most samples taken per track. Longer animations are sampled more coarsely.
pub const MAX_FRAME_COUNT: usize = 1 << 20;

/// Number of samples and the time between them for `duration` seconds at `frame_rate`.
///
/// Degenerate inputs (non positive or non finite rate, non positive or non finite duration, or
/// a count that rounds to zero) yield a single sample. The count is capped at
/// [`MAX_FRAME_COUNT`].
pub fn frame_times(duration: f64, frame_rate: f64) -> (usize, f64) {
    if !frame_rate.is_finite() || frame_rate <= 0.0 || !(duration > 0.0) || !duration.is_finite() {
        return (1, 0.0);
    }
    let count = (frame_rate * duration).round();
    if count < 1.0 {
        return (1, 0.0);
    }
    let count = if count > MAX_FRAME_COUNT as f64 {
        warn!(
            "{} frames requested for {}s at {} fps, capped to {}",
            count, duration, frame_rate, MAX_FRAME_COUNT
        );
        MAX_FRAME_COUNT
    } else {
        count as usize
    };
    (count, duration / count as f64)
}

pub struct AnimationSampler<'a> {
    doc: &'a SceneDocument,
}

impl<'a> AnimationSampler<'a> {
    pub fn new(doc: &'a SceneDocument) -> AnimationSampler<'a> {
        AnimationSampler { doc }
    }

    fn stack_index(&self, stack_id: i64) -> Option<StackIndex> {
        let index = self.doc.stack_by_id(stack_id);
        if index.is_none() {
            warn!("no animation stack with id {}", stack_id);
        }
        index
    }

    fn blend_channels(&self, deformers: &[BlendIndex]) -> Vec<BlendChannelRef> {
        deformers
            .iter()
            .flat_map(|&deformer| {
                (0..self.doc.blend(deformer).channels.len())
                    .map(move |channel| BlendChannelRef { deformer, channel })
            })
            .collect()
    }

    /// Samples `bones` and `channels` of `stack` at `frame_rate`.
    pub fn sample(
        &self,
        stack: StackIndex,
        bones: &[NodeIndex],
        channels: &[BlendChannelRef],
        frame_rate: f64,
    ) -> SampledAnimation {
        let stack = self.doc.stack(stack);
        let duration = stack.duration().max(0.0);
        let (frame_count, delta) = frame_times(duration, frame_rate);
        let converter = self.doc.query_converter();

        let tracks = bones
            .iter()
            .map(|&node| BoneTrack {
                bone: self.doc.node(node).name.clone(),
                keys: (0..frame_count)
                    .map(|k| {
                        let offset = k as f64 * delta;
                        let local = stack.evaluate_transform(self.doc, node, stack.time_begin + offset);
                        let t = converter.convert_transform(&local);
                        TransformKey {
                            time: offset as f32,
                            translation: t.translation_f32(),
                            rotation: t.rotation_f32(),
                            scale: t.scale_f32(),
                        }
                    })
                    .collect(),
            })
            .collect();

        let morph_curves = channels
            .iter()
            .map(|&channel| MorphCurve {
                name: self.doc.blend_channel(channel).name.clone(),
                keys: (0..frame_count)
                    .map(|k| {
                        let offset = k as f64 * delta;
                        let weight = stack.evaluate_blend_weight(self.doc, channel, stack.time_begin + offset);
                        (offset as f32, weight as f32)
                    })
                    .collect(),
            })
            .collect();

        debug!(
            "sampled {}: {} frames, {} tracks, {} morph curves",
            stack.name,
            frame_count,
            bones.len(),
            channels.len()
        );

        SampledAnimation {
            name: stack.name.clone(),
            duration: duration as f32,
            tracks,
            morph_curves,
            rest_pose: Vec::new(),
        }
    }

    /// Samples the clusters of `node`'s skin deformers whose bones belong to `skeleton`, plus the
    /// node's blend channels.
    pub fn sample_skinned(
        &self,
        stack_id: i64,
        node: NodeIndex,
        skeleton: &Skeleton,
        frame_rate: f64,
    ) -> Option<SampledAnimation> {
        let stack = self.stack_index(stack_id)?;
        let mesh = self.doc.mesh(self.doc.node(node).mesh?);
        if mesh.skin_deformers.is_empty() && mesh.blend_deformers.is_empty() {
            return None;
        }

        let mut bones: Vec<NodeIndex> = Vec::new();
        for &skin in &mesh.skin_deformers {
            for cluster in &self.doc.skin(skin).clusters {
                let name = &self.doc.node(cluster.bone_node).name;
                if skeleton.bone_index(name).is_some() && !bones.contains(&cluster.bone_node) {
                    bones.push(cluster.bone_node);
                }
            }
        }
        let channels = self.blend_channels(&mesh.blend_deformers);
        Some(self.sample(stack, &bones, &channels, frame_rate))
    }

    /// Samples every bone of an external skeleton found by name in the document.
    pub fn sample_with_skeleton(
        &self,
        stack_id: i64,
        node: NodeIndex,
        skeleton: &[Bone],
        frame_rate: f64,
    ) -> Option<SampledAnimation> {
        let stack = self.stack_index(stack_id)?;
        let mesh = self.doc.mesh(self.doc.node(node).mesh?);
        if mesh.skin_deformers.is_empty() && mesh.blend_deformers.is_empty() {
            return None;
        }
        let bones: Vec<NodeIndex> = skeleton
            .iter()
            .filter_map(|bone| self.doc.node_by_name(&bone.name))
            .collect();
        let channels = self.blend_channels(&mesh.blend_deformers);
        Some(self.sample(stack, &bones, &channels, frame_rate))
    }

    /// Samples every named node and every blend channel of the document, records the rest pose
    /// and hands the result to `fixup`.
    pub fn sample_raw(
        &self,
        stack_id: i64,
        frame_rate: f64,
        fixup: Option<&dyn RestPoseFixup>,
    ) -> Option<SampledAnimation> {
        let stack = self.stack_index(stack_id)?;
        let converter = self.doc.query_converter();

        let bones: Vec<NodeIndex> = self
            .doc
            .node_indices()
            .filter(|&i| !self.doc.node(i).is_root() && !self.doc.node(i).name.is_empty())
            .collect();
        let all_blends: Vec<BlendIndex> = self
            .doc
            .meshes()
            .iter()
            .flat_map(|m| m.blend_deformers.iter().copied())
            .collect();
        let channels = self.blend_channels(&all_blends);

        let mut animation = self.sample(stack, &bones, &channels, frame_rate);
        animation.rest_pose = bones
            .iter()
            .map(|&i| {
                let node = self.doc.node(i);
                (node.name.clone(), converter.convert_transform(&node.local_transform))
            })
            .collect();
        if let Some(fixup) = fixup {
            fixup.fixup(&mut animation);
        }
        Some(animation)
    }
}
