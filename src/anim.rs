//! Animation stacks and their evaluation.
//!
//! A stack holds layers; a layer maps node channels (translation, rotation, scaling) and blend
//! channels to animated values. Each animated value has up to three curves, one per component.

use std::collections::HashMap;

use glam::DVec3;

use crate::math::Transform;
use crate::scene::{BlendChannelRef, NodeIndex, SceneDocument};

/// FBX time units per second.
pub const KTIME_PER_SECOND: f64 = 46_186_158_000.0;

pub fn ktime_to_seconds(ktime: i64) -> f64 {
    ktime as f64 / KTIME_PER_SECOND
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Interpolation {
    Constant,
    #[default]
    Linear,
    Cubic,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Keyframe {
    /// Seconds.
    pub time: f64,
    pub value: f64,
    /// Interpolation towards the next key.
    pub interpolation: Interpolation,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct AnimCurve {
    pub keys: Vec<Keyframe>,
}

impl AnimCurve {
    pub fn linear(keys: &[(f64, f64)]) -> AnimCurve {
        AnimCurve {
            keys: keys
                .iter()
                .map(|&(time, value)| Keyframe {
                    time,
                    value,
                    interpolation: Interpolation::Linear,
                })
                .collect(),
        }
    }

    pub fn time_range(&self) -> Option<(f64, f64)> {
        Some((self.keys.first()?.time, self.keys.last()?.time))
    }

    fn tangent(&self, i: usize) -> f64 {
        let keys = &self.keys;
        let prev = keys[i.saturating_sub(1)];
        let next = keys[(i + 1).min(keys.len() - 1)];
        let dt = next.time - prev.time;
        if dt <= 0.0 {
            0.0
        } else {
            (next.value - prev.value) / dt
        }
    }

    pub fn evaluate(&self, time: f64, default: f64) -> f64 {
        let (first, last) = match (self.keys.first(), self.keys.last()) {
            (Some(f), Some(l)) => (f, l),
            _ => return default,
        };
        if time <= first.time {
            return first.value;
        }
        if time >= last.time {
            return last.value;
        }
        let next = self.keys.partition_point(|k| k.time <= time);
        let i = next - 1;
        let (a, b) = (self.keys[i], self.keys[next]);
        let dt = b.time - a.time;
        if dt <= 0.0 {
            return b.value;
        }
        let s = (time - a.time) / dt;
        match a.interpolation {
            Interpolation::Constant => a.value,
            Interpolation::Linear => a.value + (b.value - a.value) * s,
            Interpolation::Cubic => {
                let (m0, m1) = (self.tangent(i) * dt, self.tangent(next) * dt);
                let s2 = s * s;
                let s3 = s2 * s;
                (2.0 * s3 - 3.0 * s2 + 1.0) * a.value
                    + (s3 - 2.0 * s2 + s) * m0
                    + (-2.0 * s3 + 3.0 * s2) * b.value
                    + (s3 - s2) * m1
            }
        }
    }
}

/// An animated property: per-component curves over a default value.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AnimValue {
    pub default: DVec3,
    pub curves: [Option<AnimCurve>; 3],
}

impl AnimValue {
    pub fn new(default: DVec3) -> AnimValue {
        AnimValue {
            default,
            curves: [None, None, None],
        }
    }

    pub fn with_curve(mut self, component: usize, curve: AnimCurve) -> AnimValue {
        if component < 3 {
            self.curves[component] = Some(curve);
        }
        self
    }

    /// Static value of a single-component property.
    pub fn scalar(default: f64) -> AnimValue {
        AnimValue::new(DVec3::new(default, 0.0, 0.0))
    }

    pub fn evaluate(&self, time: f64) -> DVec3 {
        let mut out = self.default;
        for (i, curve) in self.curves.iter().enumerate() {
            if let Some(curve) = curve {
                out[i] = curve.evaluate(time, self.default[i]);
            }
        }
        out
    }

    pub fn time_range(&self) -> Option<(f64, f64)> {
        self.curves
            .iter()
            .flatten()
            .filter_map(AnimCurve::time_range)
            .reduce(|a, b| (a.0.min(b.0), a.1.max(b.1)))
    }
}

/// Animated transform channels of one node, all in file space.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NodeChannels {
    pub translation: Option<AnimValue>,
    /// Euler degrees.
    pub rotation: Option<AnimValue>,
    pub scaling: Option<AnimValue>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct AnimationLayer {
    pub name: String,
    pub nodes: HashMap<NodeIndex, NodeChannels>,
    /// `DeformPercent` values, 0..100.
    pub blend_channels: HashMap<BlendChannelRef, AnimValue>,
}

impl AnimationLayer {
    fn time_range(&self) -> Option<(f64, f64)> {
        let node_values = self
            .nodes
            .values()
            .flat_map(|c| [&c.translation, &c.rotation, &c.scaling])
            .flatten();
        node_values
            .chain(self.blend_channels.values())
            .filter_map(AnimValue::time_range)
            .reduce(|a, b| (a.0.min(b.0), a.1.max(b.1)))
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct AnimationStack {
    pub id: i64,
    pub name: String,
    /// Seconds.
    pub time_begin: f64,
    /// Seconds.
    pub time_end: f64,
    pub layers: Vec<AnimationLayer>,
}

impl AnimationStack {
    pub fn duration(&self) -> f64 {
        self.time_end - self.time_begin
    }

    /// Extent of all curve keys in the stack.
    pub fn key_range(&self) -> Option<(f64, f64)> {
        self.layers
            .iter()
            .filter_map(AnimationLayer::time_range)
            .reduce(|a, b| (a.0.min(b.0), a.1.max(b.1)))
    }

    fn animates(&self, node: NodeIndex) -> bool {
        self.layers.iter().any(|l| l.nodes.contains_key(&node))
    }

    /// Local transform of `node` at `time`, in document space.
    pub fn evaluate_transform(&self, doc: &SceneDocument, node: NodeIndex, time: f64) -> Transform {
        let n = doc.node(node);
        if !self.animates(node) {
            return n.local_transform;
        }
        let props = &n.properties;
        let (mut t, mut r, mut s) = (props.translation, props.rotation, props.scaling);
        for channels in self.layers.iter().filter_map(|l| l.nodes.get(&node)) {
            if let Some(v) = &channels.translation {
                t = v.evaluate(time);
            }
            if let Some(v) = &channels.rotation {
                r = v.evaluate(time);
            }
            if let Some(v) = &channels.scaling {
                s = v.evaluate(time);
            }
        }
        let local = props.compose(t, r, s);
        if doc.is_baked() {
            doc.converter().convert_transform(&local)
        } else {
            local
        }
    }

    /// Weight of a blend channel at `time`, 0..1.
    pub fn evaluate_blend_weight(&self, doc: &SceneDocument, channel: BlendChannelRef, time: f64) -> f64 {
        let mut weight = doc.blend_channel(channel).weight;
        for value in self.layers.iter().filter_map(|l| l.blend_channels.get(&channel)) {
            weight = value.evaluate(time).x / 100.0;
        }
        weight
    }
}
