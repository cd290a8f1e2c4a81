//! The `fbx3d-runtime` crate converts binary FBX files into runtime assets: triangulated,
//! material partitioned primitives, re-rooted skeletons with skin weights, morph targets,
//! fixed rate sampled animations and light descriptors.
//!
//! The entry point for engines is [`FbxAsset`](asset/struct.FbxAsset.html). Lower layers are
//! public as well: [`decode_fbx`] gives the raw node record tree, [`scene`] the imported object
//! graph, and the component modules work on a [`SceneDocument`](scene/struct.SceneDocument.html).

use std::io::{Read, Seek};

use bytepack::LEUnpacker;

pub mod anim;
pub mod asset;
pub mod cache;
pub mod config;
pub mod convert;
pub mod error;
pub mod light;
pub mod math;
pub mod primitive;
pub mod sampler;
pub mod scene;
pub mod skeleton;
pub mod types;

pub use asset::{AnimationInfo, DefaultAnimation, FbxAsset, MergePolicy, MeshLod, NodeInfo};
pub use cache::{AssetSource, DecodedTexture, SceneCache, TextureDecoder, TextureMip};
pub use config::{AxisSystem, CoordinateAxis, ImportConfig, LightConfig, MaterialsConfig, SpaceConversion};
pub use convert::TransformConverter;
pub use error::{Error, Result};
pub use light::{LightDescriptor, LightKind};
pub use math::Transform;
pub use primitive::{MorphTarget, Primitive, PrimitiveAssembler, PrimitiveMaterial};
pub use sampler::{AnimationSampler, BoneTrack, MorphCurve, RestPoseFixup, SampledAnimation, TransformKey};
pub use scene::SceneDocument;
pub use skeleton::{Bone, Skeleton, SkeletonBuilder};

use types::{decode_node_list, Node};

const BINARY_MAGIC: &[u8; 23] = b"Kaydara FBX Binary  \x00\x1a\x00";

/// Oldest version whose object graph the importer understands.
const MIN_VERSION: u32 = 7000;
/// First version with 64-bit record headers.
const WIDE_HEADER_VERSION: u32 = 7500;

/// Decode a binary FBX file to a [`Node`](types/struct.Node.html) hierarchy.
pub fn decode_fbx<R: Read + Seek>(r: &mut R) -> Result<Vec<Node>> {
    let mut header = [0u8; 23];
    r.read_exact(&mut header[..])?;
    if &header != BINARY_MAGIC {
        let ascii = header.starts_with(b"; FBX") || header.starts_with(b"FBXHeaderExtension");
        return Err(if ascii { Error::UnsupportedFormat } else { Error::InvalidMagic });
    }
    let version = r.unpack::<u32>()?;
    if version < MIN_VERSION {
        return Err(Error::UnsupportedVersion(version));
    }
    decode_node_list(r, u64::MAX, version >= WIDE_HEADER_VERSION)
}

#[cfg(test)]
mod tests;
