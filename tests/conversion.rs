//! Cross-format conversion through the registry.
//!
//! Covers extension dispatch, external tileset handling under each policy and
//! the export-only Godot format.

use std::path::{Path, PathBuf};

use tilemap_io::config::{ReadOptions, TilesetPolicy, WriteOptions};
use tilemap_io::error::{ErrorKind, MapIoError};
use tilemap_io::ir::{Extent, Layer, Map, Metadata, TileMatrix, Tileset, TilesetRef, TilesetSource};
use tilemap_io::FormatRegistry;

const TILESET: &str = "version: 1
name: terrain
tile-width: 16
tile-height: 16
tile-count: 16
column-count: 4
image-path: terrain.png
image-width: 64
image-height: 64
";

const MAP: &str = "version: 1
row-count: 2
column-count: 3
tile-width: 16
tile-height: 16
next-layer-id: 2
next-object-id: 1
tilesets:
  - first-global-id: 1
    path: terrain.yaml
layers:
  - name: ground
    id: 1
    type: tile-layer
    data: |-
      1 2 3
      0 16 4
";

fn fixture(dir: &Path) -> PathBuf {
    std::fs::write(dir.join("terrain.yaml"), TILESET).unwrap();
    let path = dir.join("level.yaml");
    std::fs::write(&path, MAP).unwrap();
    path
}

fn small_map() -> Map {
    let mut map = Map::new(Extent::new(2, 2), 16, 16);
    map.tilesets.push(TilesetRef::embedded(
        1,
        Tileset {
            meta: Metadata::named("terrain"),
            image_path: PathBuf::from("terrain.png"),
            image_width: 32,
            image_height: 32,
            tile_width: 16,
            tile_height: 16,
            tile_count: 4,
            column_count: 2,
            ..Default::default()
        },
    ));
    let tiles = TileMatrix::from_rows(&[[1, 2], [3, 4]]).unwrap();
    map.layers.push(Layer::tile(1, "ground", tiles));
    map.next_layer_id = 2;
    map
}

/// Test an external native tileset is rewritten as a `.tsx` file
#[test]
fn test_external_tileset_to_tmx() {
    let dir = tempfile::tempdir().unwrap();
    let registry = FormatRegistry::with_defaults();
    let source = registry
        .load_map(&fixture(dir.path()), &ReadOptions::default())
        .unwrap();

    let target = dir.path().join("level.tmx");
    registry
        .save_map(&source, &target, &WriteOptions::default())
        .unwrap();
    assert!(dir.path().join("terrain.tsx").is_file());

    let converted = registry.load_map(&target, &ReadOptions::default()).unwrap();
    assert_eq!(
        converted.tilesets[0].source,
        TilesetSource::External(PathBuf::from("terrain.tsx"))
    );
    assert_eq!(converted.tilesets[0].tileset, source.tilesets[0].tileset);
    assert_eq!(converted.layers, source.layers);
}

/// Test the embed policy inlines external tilesets
#[test]
fn test_embed_policy() {
    let dir = tempfile::tempdir().unwrap();
    let registry = FormatRegistry::with_defaults();
    let source = registry
        .load_map(&fixture(dir.path()), &ReadOptions::default())
        .unwrap();

    let options = WriteOptions {
        tilesets: TilesetPolicy::Embed,
        ..WriteOptions::default()
    };
    let target = dir.path().join("level.json");
    registry.save_map(&source, &target, &options).unwrap();
    assert!(!dir.path().join("terrain.json").exists());

    let converted = registry.load_map(&target, &ReadOptions::default()).unwrap();
    assert_eq!(converted.tilesets[0].source, TilesetSource::Embedded);
    assert_eq!(converted.tilesets[0].tileset, source.tilesets[0].tileset);
}

/// Test the externalize policy writes embedded tilesets next to the map
#[test]
fn test_externalize_policy() {
    let dir = tempfile::tempdir().unwrap();
    let registry = FormatRegistry::with_defaults();
    let map = small_map();

    let options = WriteOptions {
        tilesets: TilesetPolicy::Externalize,
        ..WriteOptions::default()
    };
    let target = dir.path().join("level.yaml");
    registry.save_map(&map, &target, &options).unwrap();
    assert!(dir.path().join("terrain.yaml").is_file());

    let reloaded = registry.load_map(&target, &ReadOptions::default()).unwrap();
    assert_eq!(reloaded.tilesets[0].tileset, map.tilesets[0].tileset);
}

/// Test unresolved tilesets are kept as references
#[test]
fn test_unresolved_tilesets() {
    let dir = tempfile::tempdir().unwrap();
    let registry = FormatRegistry::with_defaults();
    let options = ReadOptions {
        resolve_tilesets: false,
        ..ReadOptions::default()
    };

    let map = registry.load_map(&fixture(dir.path()), &options).unwrap();
    assert!(map.tilesets[0].tileset.is_none());
    assert_eq!(
        map.tilesets[0].source,
        TilesetSource::External(PathBuf::from("terrain.yaml"))
    );
}

/// Test dispatch by extension
#[test]
fn test_registry_dispatch() {
    let dir = tempfile::tempdir().unwrap();
    let registry = FormatRegistry::with_defaults();

    assert_eq!(registry.format_for(Path::new("a.TMX")).unwrap().name(), "XML");
    assert_eq!(registry.format_for(Path::new("a.yml")).unwrap().name(), "YAML");
    assert_eq!(registry.format_for(Path::new("a.tmj")).unwrap().name(), "JSON");

    let err = registry
        .load_map(&dir.path().join("image.png"), &ReadOptions::default())
        .unwrap_err();
    assert!(matches!(err, MapIoError::UnsupportedFormat(ref ext) if ext == "png"));
    assert_eq!(err.kind(), ErrorKind::Unsupported);

    let path = dir.path().join("VIEW.YAML");
    registry
        .save_view(&small_map(), &path, &WriteOptions::default())
        .unwrap();
    assert_eq!(
        registry.load_map(&path, &ReadOptions::default()).unwrap(),
        small_map()
    );
}

/// Test standalone tilesets load through their tileset-only extensions
#[test]
fn test_standalone_tileset() {
    let dir = tempfile::tempdir().unwrap();
    let registry = FormatRegistry::with_defaults();
    let tileset = small_map().tilesets[0].tileset.clone().unwrap();

    for file in ["terrain.tsx", "terrain.tsj", "terrain.yaml"] {
        let path = dir.path().join(file);
        registry
            .save_tileset(&tileset, &path, &WriteOptions::default())
            .unwrap();
        let loaded = registry.load_tileset(&path, &ReadOptions::default()).unwrap();
        assert_eq!(loaded, tileset, "{file}");
    }
}

/// Test Godot export writes a scene and refuses to load one
#[test]
fn test_godot_export() {
    let dir = tempfile::tempdir().unwrap();
    let registry = FormatRegistry::with_defaults();
    let target = dir.path().join("level.tscn");

    registry
        .save_map(&small_map(), &target, &WriteOptions::default())
        .unwrap();
    let scene = std::fs::read_to_string(&target).unwrap();
    assert!(scene.starts_with("[gd_scene"), "{scene}");
    assert!(scene.contains("type=\"TileMap\""), "{scene}");
    assert!(dir.path().join("level.tres").is_file());

    let err = registry
        .load_map(&target, &ReadOptions::default())
        .unwrap_err();
    assert!(matches!(err, MapIoError::UnsupportedOperation { .. }), "{err}");
}

/// Test a tileset that cannot be written leaves the existing map untouched
#[test]
fn test_failed_tileset_write_keeps_map() {
    let dir = tempfile::tempdir().unwrap();
    let registry = FormatRegistry::with_defaults();
    let path = fixture(dir.path());
    let mut map = registry.load_map(&path, &ReadOptions::default()).unwrap();
    map.tilesets[0].source = TilesetSource::External(PathBuf::from("missing/terrain.yaml"));
    map.layers.clear();

    let err = registry
        .save_map(&map, &path, &WriteOptions::default())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Io);
    assert_eq!(std::fs::read_to_string(&path).unwrap(), MAP);
    assert!(!dir.path().join("missing").exists());
}
