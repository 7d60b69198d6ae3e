//! End-to-end scenarios over hand-written native documents.
//!
//! These tests write YAML text to a temporary directory, load it through the
//! registry and check the resulting tree, the way a user-authored file would
//! be read.

use std::path::Path;

use tilemap_io::codec::{TileCompression, TileEncoding, TileFormat};
use tilemap_io::config::{ReadOptions, WriteOptions};
use tilemap_io::error::{ErrorKind, MapIoError};
use tilemap_io::fill::flood_fill;
use tilemap_io::ir::{Extent, LayerKind, TileMatrix, TilePos};
use tilemap_io::FormatRegistry;

fn grid() -> TileMatrix {
    TileMatrix::from_rows(&[[1, 0, 0, 2], [0, 0, 0, 0], [3, 3, 0, 0], [0, 0, 0, 4]]).unwrap()
}

fn native_map(data: &str) -> String {
    format!(
        "version: 1
row-count: 4
column-count: 4
tile-width: 32
tile-height: 32
next-layer-id: 2
next-object-id: 1
tile-format:
  encoding: base64
  compression: zlib
layers:
  - name: ground
    id: 1
    type: tile-layer
    data: {data}
"
    )
}

fn inline_tileset(first_id: i32, name: &str) -> String {
    format!(
        "  - first-global-id: {first_id}
    tileset:
      name: {name}
      tile-width: 32
      tile-height: 32
      tile-count: 16
      column-count: 4
      image-path: {name}.png
      image-width: 128
      image-height: 128
"
    )
}

fn map_with_tilesets(tilesets: &[(i32, &str)]) -> String {
    let mut text = String::from(
        "version: 1
row-count: 1
column-count: 1
tile-width: 32
tile-height: 32
next-layer-id: 2
next-object-id: 1
tilesets:
",
    );
    for (first_id, name) in tilesets {
        text.push_str(&inline_tileset(*first_id, name));
    }
    text.push_str(
        "layers:
  - name: ground
    id: 1
    type: tile-layer
    data: '0'
",
    );
    text
}

fn write(dir: &Path, name: &str, text: &str) -> std::path::PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, text).unwrap();
    path
}

/// Test base64 zlib tile data decodes into the expected grid and is
/// re-emitted unchanged
#[test]
fn test_compressed_tile_data() {
    let dir = tempfile::tempdir().unwrap();
    let registry = FormatRegistry::with_defaults();
    let format = TileFormat::base64(TileCompression::Zlib);
    let encoded = format.encode(&grid()).unwrap();

    let path = write(dir.path(), "level.yaml", &native_map(&encoded));
    let map = registry.load_map(&path, &ReadOptions::default()).unwrap();

    assert_eq!(map.extent, Extent::new(4, 4));
    assert_eq!(map.tile_format.encoding, TileEncoding::Base64);
    assert_eq!(map.tile_format.compression, TileCompression::Zlib);
    match &map.layers[0].kind {
        LayerKind::Tile(tiles) => assert_eq!(tiles, &grid()),
        other => panic!("expected a tile layer, got {other:?}"),
    }

    registry.save_map(&map, &path, &WriteOptions::default()).unwrap();
    let saved = std::fs::read_to_string(&path).unwrap();
    assert!(saved.contains(&encoded), "{saved}");
}

/// Test corrupt compressed data is reported as a codec error
#[test]
fn test_corrupt_tile_data() {
    let dir = tempfile::tempdir().unwrap();
    let registry = FormatRegistry::with_defaults();

    let path = write(dir.path(), "bad.yaml", &native_map("AAAAAAAAAAA="));
    let err = registry.load_map(&path, &ReadOptions::default()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Codec);
}

/// Test adjacent tilesets load and overlapping ones are rejected
#[test]
fn test_tileset_ranges() {
    let dir = tempfile::tempdir().unwrap();
    let registry = FormatRegistry::with_defaults();

    let adjacent = write(
        dir.path(),
        "adjacent.yaml",
        &map_with_tilesets(&[(1, "grass"), (17, "water")]),
    );
    let map = registry.load_map(&adjacent, &ReadOptions::default()).unwrap();
    assert_eq!(map.tilesets.len(), 2);
    assert_eq!(map.tilesets[1].first_id, 17);

    let overlapping = write(
        dir.path(),
        "overlapping.yaml",
        &map_with_tilesets(&[(1, "grass"), (10, "water")]),
    );
    let err = registry
        .load_map(&overlapping, &ReadOptions::default())
        .unwrap_err();
    assert!(matches!(err, MapIoError::DuplicateTileId(10)), "{err}");
}

/// Test a missing file is reported as an I/O error
#[test]
fn test_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let registry = FormatRegistry::with_defaults();

    let err = registry
        .load_map(&dir.path().join("absent.yaml"), &ReadOptions::default())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Io);
}

/// Test a filled region survives a save and reload
#[test]
fn test_fill_then_save() {
    let dir = tempfile::tempdir().unwrap();
    let registry = FormatRegistry::with_defaults();
    let encoded = TileFormat::base64(TileCompression::Zlib)
        .encode(&grid())
        .unwrap();
    let path = write(dir.path(), "fill.yaml", &native_map(&encoded));

    let mut map = registry.load_map(&path, &ReadOptions::default()).unwrap();
    let LayerKind::Tile(tiles) = &mut map.layers[0].kind else {
        panic!("expected a tile layer");
    };
    let changed = flood_fill(tiles, TilePos::new(1, 1), 9).unwrap();
    assert_eq!(changed.len(), 11);

    registry.save_map(&map, &path, &WriteOptions::default()).unwrap();
    let reloaded = registry.load_map(&path, &ReadOptions::default()).unwrap();
    let expected =
        TileMatrix::from_rows(&[[1, 9, 9, 2], [9, 9, 9, 9], [3, 3, 9, 9], [9, 9, 9, 4]])
            .unwrap();
    assert_eq!(reloaded.layers[0].kind, LayerKind::Tile(expected));
}
