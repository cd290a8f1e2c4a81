//! Per-asset parse cache.
//!
//! A [`SceneCache`] owns the document parsed from one asset. The first caller of
//! [`SceneCache::get_or_load`] pays for decoding; everyone else shares the `Arc`. Failures are
//! cached too, so a broken asset is reported once and not re-parsed until [`SceneCache::invalidate`].

use std::collections::HashMap;
use std::io::{Cursor, Read};
use std::sync::Arc;

use log::{debug, error, warn};
use parking_lot::Mutex;

use crate::config::{ImportConfig, MaterialsConfig};
use crate::decode_fbx;
use crate::error::{Error, Result};
use crate::scene::import::import_document;
use crate::scene::{SceneDocument, TextureIndex};

const ZIP_MAGIC: &[u8] = b"PK\x03\x04";

/// Engine side provider of an asset's bytes.
pub trait AssetSource: Send + Sync {
    /// The asset's backing blob, `None` when there is none.
    fn blob(&self) -> Option<Vec<u8>>;
}

impl AssetSource for Vec<u8> {
    fn blob(&self) -> Option<Vec<u8>> {
        Some(self.clone())
    }
}

impl AssetSource for Arc<[u8]> {
    fn blob(&self) -> Option<Vec<u8>> {
        Some(self.to_vec())
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct TextureMip {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct DecodedTexture {
    pub mips: Vec<TextureMip>,
}

/// Engine side image decoder.
pub trait TextureDecoder: Send + Sync {
    fn decode(&self, data: &[u8], srgb: bool, config: &MaterialsConfig) -> Option<DecodedTexture>;
}

/// Returns the FBX payload of `bytes`, unpacking the first `.fbx` member of a zip archive.
pub fn extract_fbx(bytes: &[u8]) -> Result<Vec<u8>> {
    if !bytes.starts_with(ZIP_MAGIC) {
        return Ok(bytes.to_vec());
    }
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))?;
    let index = (0..archive.len())
        .find(|&i| {
            archive
                .by_index(i)
                .map(|f| !f.is_dir() && f.name().to_ascii_lowercase().ends_with(".fbx"))
                .unwrap_or(false)
        })
        .ok_or(Error::MissingArchiveEntry)?;
    let mut file = archive.by_index(index)?;
    debug!("using archive member {}", file.name());
    let mut content = Vec::new();
    file.read_to_end(&mut content)?;
    Ok(content)
}

/// Decodes and imports an FBX blob, or a zip archive containing one.
pub fn load_document(bytes: &[u8], config: &ImportConfig) -> Result<SceneDocument> {
    let content = extract_fbx(bytes)?;
    let records = decode_fbx(&mut Cursor::new(&content[..]))?;
    import_document(&records, config)
}

enum LoadState {
    Unloaded,
    Loaded(Arc<SceneDocument>),
    Failed,
}

pub struct SceneCache {
    source: Box<dyn AssetSource>,
    config: ImportConfig,
    state: Mutex<LoadState>,
    textures: TextureCache,
}

impl SceneCache {
    pub fn new<S: AssetSource + 'static>(source: S, config: ImportConfig) -> SceneCache {
        SceneCache {
            source: Box::new(source),
            config,
            state: Mutex::new(LoadState::Unloaded),
            textures: TextureCache::new(None),
        }
    }

    pub fn with_texture_decoder<D: TextureDecoder + 'static>(mut self, decoder: D) -> SceneCache {
        self.textures = TextureCache::new(Some(Box::new(decoder)));
        self
    }

    pub fn config(&self) -> &ImportConfig {
        &self.config
    }

    pub fn textures(&self) -> &TextureCache {
        &self.textures
    }

    /// The parsed document, loading it on first use. `None` when the asset failed to load.
    pub fn get_or_load(&self) -> Option<Arc<SceneDocument>> {
        let mut state = self.state.lock();
        match &*state {
            LoadState::Loaded(doc) => return Some(doc.clone()),
            LoadState::Failed => return None,
            LoadState::Unloaded => {}
        }
        match self.load() {
            Ok(doc) => {
                let doc = Arc::new(doc);
                *state = LoadState::Loaded(doc.clone());
                Some(doc)
            }
            Err(e) => {
                error!("failed to load FBX asset: {}", e);
                *state = LoadState::Failed;
                None
            }
        }
    }

    /// Drops the cached document and decoded textures; the next query parses the asset again.
    pub fn invalidate(&self) {
        *self.state.lock() = LoadState::Unloaded;
        self.textures.clear();
    }

    fn load(&self) -> Result<SceneDocument> {
        let blob = self.source.blob().ok_or(Error::MissingBlob)?;
        load_document(&blob, &self.config)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
struct TextureKey {
    texture: TextureIndex,
    srgb: bool,
    generate_mips: bool,
}

/// Decoded textures keyed by texture, color space and mip generation. Entries live until the
/// cache is cleared.
pub struct TextureCache {
    decoder: Option<Box<dyn TextureDecoder>>,
    entries: Mutex<HashMap<TextureKey, Option<Arc<DecodedTexture>>>>,
}

impl TextureCache {
    fn new(decoder: Option<Box<dyn TextureDecoder>>) -> TextureCache {
        TextureCache {
            decoder,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn has_decoder(&self) -> bool {
        self.decoder.is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn clear(&self) {
        self.entries.lock().clear();
    }

    /// Decodes the embedded content of `texture` once per color space and mip setting.
    pub fn get_or_decode(
        &self,
        doc: &SceneDocument,
        texture: TextureIndex,
        srgb: bool,
        config: &MaterialsConfig,
    ) -> Option<Arc<DecodedTexture>> {
        let decoder = self.decoder.as_ref()?;
        let key = TextureKey {
            texture,
            srgb,
            generate_mips: config.generate_mips,
        };
        let mut entries = self.entries.lock();
        if let Some(entry) = entries.get(&key) {
            return entry.clone();
        }
        let source = doc.texture(texture);
        let decoded = match source.content.as_deref() {
            Some(content) => decoder.decode(content, srgb, config).map(Arc::new),
            None => {
                warn!("texture {} ({}) has no embedded content", source.name, source.filename);
                None
            }
        };
        entries.insert(key, decoded.clone());
        decoded
    }
}
