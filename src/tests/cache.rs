use std::io::{Cursor, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use zip::write::FileOptions;
use zip::ZipWriter;

use super::fixtures::{panel_ids, panel_scene, sample_scene, PANEL_TEXTURE};
use super::writer::{write_fbx, Rec};
use crate::cache::{extract_fbx, load_document, AssetSource, DecodedTexture, SceneCache, TextureDecoder, TextureMip};
use crate::config::{ImportConfig, MaterialsConfig};
use crate::error::Error;
use crate::scene::{SceneDocument, TextureIndex};

struct CountingSource {
    bytes: Option<Vec<u8>>,
    loads: Arc<AtomicUsize>,
}

impl AssetSource for CountingSource {
    fn blob(&self) -> Option<Vec<u8>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        self.bytes.clone()
    }
}

fn counting_cache(bytes: Option<Vec<u8>>) -> (SceneCache, Arc<AtomicUsize>) {
    let loads = Arc::new(AtomicUsize::new(0));
    let source = CountingSource {
        bytes,
        loads: loads.clone(),
    };
    (SceneCache::new(source, ImportConfig::default()), loads)
}

#[test]
fn parses_once_and_shares_the_document() {
    let (cache, loads) = counting_cache(Some(sample_scene(100.0)));
    let a = cache.get_or_load().unwrap();
    let b = cache.get_or_load().unwrap();
    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(loads.load(Ordering::SeqCst), 1);
}

#[test]
fn failures_are_cached_until_invalidated() {
    let (cache, loads) = counting_cache(Some(b"not an fbx file at all, just text".to_vec()));
    assert!(cache.get_or_load().is_none());
    assert!(cache.get_or_load().is_none());
    assert_eq!(loads.load(Ordering::SeqCst), 1);

    cache.invalidate();
    assert!(cache.get_or_load().is_none());
    assert_eq!(loads.load(Ordering::SeqCst), 2);
}

#[test]
fn missing_blobs_fail_to_load() {
    let (cache, loads) = counting_cache(None);
    assert!(cache.get_or_load().is_none());
    assert!(cache.get_or_load().is_none());
    assert_eq!(loads.load(Ordering::SeqCst), 1);
}

#[test]
fn malformed_records_fail_to_load() {
    let mut bytes = write_fbx(7400, &[Rec::new("A")]);
    // The record's end offset points back at its own start.
    bytes[27..31].copy_from_slice(&27u32.to_le_bytes());
    let (cache, loads) = counting_cache(Some(bytes));
    assert!(cache.get_or_load().is_none());
    assert!(cache.get_or_load().is_none());
    assert_eq!(loads.load(Ordering::SeqCst), 1);
}

#[test]
fn invalidate_forces_a_reparse() {
    let (cache, loads) = counting_cache(Some(sample_scene(100.0)));
    let first = cache.get_or_load().unwrap();
    cache.invalidate();
    let second = cache.get_or_load().unwrap();
    assert!(!Arc::ptr_eq(&first, &second));
    assert_eq!(loads.load(Ordering::SeqCst), 2);
    assert_eq!(first.nodes().len(), second.nodes().len());
}

#[test]
fn concurrent_callers_share_one_parse() {
    let (cache, loads) = counting_cache(Some(sample_scene(100.0)));
    let docs: Vec<Arc<SceneDocument>> = thread::scope(|scope| {
        let handles: Vec<_> = (0..8).map(|_| scope.spawn(|| cache.get_or_load().unwrap())).collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });
    assert_eq!(loads.load(Ordering::SeqCst), 1);
    assert!(docs.iter().all(|d| Arc::ptr_eq(d, &docs[0])));
}

fn zip_archive(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, content) in entries {
        writer.start_file(*name, FileOptions::default()).unwrap();
        writer.write_all(content).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

#[test]
fn unpacks_zipped_fbx() {
    let scene = sample_scene(100.0);
    let archive = zip_archive(&[("readme.txt", &b"hello"[..]), ("models/Scene.FBX", scene.as_slice())]);
    assert_eq!(extract_fbx(&archive).unwrap(), scene);

    let doc = load_document(&archive, &ImportConfig::default()).unwrap();
    assert_eq!(doc.nodes().len(), 5);
}

#[test]
fn plain_blobs_pass_through() {
    let scene = sample_scene(100.0);
    assert_eq!(extract_fbx(&scene).unwrap(), scene);
}

#[test]
fn archives_without_fbx_are_rejected() {
    let archive = zip_archive(&[("readme.txt", &b"hello"[..])]);
    let err = extract_fbx(&archive).unwrap_err();
    assert!(matches!(err, Error::MissingArchiveEntry), "{:?}", err);
}

struct CountingDecoder {
    calls: Arc<AtomicUsize>,
}

impl TextureDecoder for CountingDecoder {
    fn decode(&self, data: &[u8], srgb: bool, config: &MaterialsConfig) -> Option<DecodedTexture> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !srgb && !config.generate_mips {
            return None;
        }
        Some(DecodedTexture {
            mips: vec![TextureMip {
                width: data.len() as u32,
                height: 1,
                pixels: data.to_vec(),
            }],
        })
    }
}

fn panel_texture(doc: &SceneDocument) -> TextureIndex {
    let panel = doc.node_by_id(panel_ids::PANEL).unwrap();
    let mesh = doc.mesh(doc.node(panel).mesh.unwrap());
    doc.material(mesh.materials[0]).base_color_texture.unwrap()
}

#[test]
fn decodes_each_texture_once_per_color_space() {
    let calls = Arc::new(AtomicUsize::new(0));
    let cache = SceneCache::new(panel_scene(), ImportConfig::default())
        .with_texture_decoder(CountingDecoder { calls: calls.clone() });
    assert!(cache.textures().has_decoder());
    let doc = cache.get_or_load().unwrap();
    let texture = panel_texture(&doc);
    let config = MaterialsConfig::default();

    let a = cache.textures().get_or_decode(&doc, texture, true, &config).unwrap();
    let b = cache.textures().get_or_decode(&doc, texture, true, &config).unwrap();
    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(a.mips[0].pixels, PANEL_TEXTURE);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    cache.textures().get_or_decode(&doc, texture, false, &config).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(cache.textures().len(), 2);

    cache.invalidate();
    assert!(cache.textures().is_empty());
}

#[test]
fn failed_decodes_are_remembered() {
    let calls = Arc::new(AtomicUsize::new(0));
    let cache = SceneCache::new(panel_scene(), ImportConfig::default())
        .with_texture_decoder(CountingDecoder { calls: calls.clone() });
    let doc = cache.get_or_load().unwrap();
    let texture = panel_texture(&doc);
    let config = MaterialsConfig {
        generate_mips: false,
        ..MaterialsConfig::default()
    };

    assert!(cache.textures().get_or_decode(&doc, texture, false, &config).is_none());
    assert!(cache.textures().get_or_decode(&doc, texture, false, &config).is_none());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(cache.textures().len(), 1);
}

#[test]
fn mip_settings_are_cached_separately() {
    let calls = Arc::new(AtomicUsize::new(0));
    let cache = SceneCache::new(panel_scene(), ImportConfig::default())
        .with_texture_decoder(CountingDecoder { calls: calls.clone() });
    let doc = cache.get_or_load().unwrap();
    let texture = panel_texture(&doc);
    let with_mips = MaterialsConfig::default();
    let without_mips = MaterialsConfig {
        generate_mips: false,
        ..MaterialsConfig::default()
    };

    let a = cache.textures().get_or_decode(&doc, texture, true, &with_mips).unwrap();
    let b = cache.textures().get_or_decode(&doc, texture, true, &without_mips).unwrap();
    assert!(!Arc::ptr_eq(&a, &b));
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    let c = cache.textures().get_or_decode(&doc, texture, true, &without_mips).unwrap();
    assert!(Arc::ptr_eq(&b, &c));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(cache.textures().len(), 2);
}

#[test]
fn no_decoder_no_textures() {
    let cache = SceneCache::new(panel_scene(), ImportConfig::default());
    assert!(!cache.textures().has_decoder());
    let doc = cache.get_or_load().unwrap();
    let texture = panel_texture(&doc);
    assert!(cache
        .textures()
        .get_or_decode(&doc, texture, true, &MaterialsConfig::default())
        .is_none());
    assert!(cache.textures().is_empty());
}
