//! Save-then-load round trips through every loadable format.
//!
//! Each test builds a map in memory, saves it through the registry, loads it
//! back and compares the trees. Tiled formats are checked against a map that
//! avoids their documented lossy projections.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tilemap_io::codec::{TileCompression, TileFormat};
use tilemap_io::config::{ReadOptions, WriteOptions};
use tilemap_io::ir::{
    AnimationFrame, Attribute, Color, Extent, Layer, LayerKind, Map, Metadata, Object, ObjectKind,
    ObjectRef, Orientation, TileData, TileMatrix, Tileset, TilesetRef,
};
use tilemap_io::FormatRegistry;

fn terrain() -> Tileset {
    let mut tiles = BTreeMap::new();
    tiles.insert(
        2,
        TileData {
            frames: vec![
                AnimationFrame {
                    tile: 2,
                    duration_ms: 150,
                },
                AnimationFrame {
                    tile: 3,
                    duration_ms: 250,
                },
            ],
            objects: vec![Object::new(1, ObjectKind::Rect).with_bounds([0.0, 8.0], [16.0, 8.0])],
            meta: Metadata::default().with_property("solid", Attribute::Bool(true)),
        },
    );

    Tileset {
        meta: Metadata::named("terrain").with_property("biome", Attribute::String("forest".into())),
        image_path: PathBuf::from("images/terrain.png"),
        image_width: 64,
        image_height: 64,
        tile_width: 16,
        tile_height: 16,
        margin: 0,
        spacing: 0,
        tile_count: 16,
        column_count: 4,
        tiles,
    }
}

/// A map using only features every loadable format represents.
fn portable_map() -> Map {
    let mut map = Map::new(Extent::new(3, 4), 16, 16);
    map.orientation = Orientation::Orthogonal;
    map.tile_format = TileFormat::base64(TileCompression::Zstd);
    map.tilesets.push(TilesetRef::embedded(1, terrain()));
    map.meta = Metadata::default()
        .with_property("title", Attribute::String("Forest <1> & \"friends\"".into()))
        .with_property("gravity", Attribute::Float(9.5))
        .with_property("lives", Attribute::Int(3))
        .with_property("night", Attribute::Bool(false))
        .with_property("tint", Attribute::Color(Color::rgba(10, 20, 30, 255)))
        .with_property("music", Attribute::Path(PathBuf::from("audio/theme.ogg")))
        .with_property("boss", Attribute::Object(ObjectRef(4)));

    let ground = TileMatrix::from_rows(&[[1, 2, 3, 4], [0, 0, 5, 6], [7, 0, 0, 16]]).unwrap();
    map.layers.push(Layer::tile(1, "ground", ground));

    let mut enemy = Object::new(2, ObjectKind::Ellipse)
        .with_bounds([32.0, 16.5], [16.0, 8.0])
        .with_name("slime");
    enemy.tag = "enemy".to_string();
    enemy.meta = enemy.meta.with_property("hp", Attribute::Int(12));

    let mut chest = Object::new(3, ObjectKind::Rect)
        .with_bounds([0.0, 0.0], [16.0, 16.0])
        .with_name("chest");
    chest.tile = Some(5);
    chest.visible = false;

    let objects = vec![
        Object::new(1, ObjectKind::Point).with_bounds([8.0, 8.0], [0.0, 0.0]).with_name("spawn"),
        enemy,
        chest,
        Object::new(4, ObjectKind::Polygon(vec![[0.0, 0.0], [16.0, 0.0], [8.0, 12.25]]))
            .with_bounds([40.0, 8.0], [0.0, 0.0]),
    ];

    let mut decor = Layer::tile(4, "decor", TileMatrix::new(Extent::new(3, 4)));
    decor.opacity = 0.5;
    let mut group = Layer::group(3, "overlay", vec![decor]);
    group.visible = false;

    map.layers.push(Layer::object(2, "things", objects));
    map.layers.push(group);
    map.next_layer_id = 5;
    map.next_object_id = 5;
    map
}

fn round_trip(map: &Map, file: &str, options: &WriteOptions) -> Map {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(file);
    let registry = FormatRegistry::with_defaults();

    registry.save_map(map, &path, options).unwrap();
    registry.load_map(&path, &ReadOptions::default()).unwrap()
}

/// Test the native format preserves a map exactly, components included
#[test]
fn test_yaml_round_trip() {
    let mut map = portable_map();
    map.meta.name = "Forest".to_string();

    let template: BTreeMap<String, Attribute> = [
        ("speed".to_string(), Attribute::Float(1.0)),
        ("offset".to_string(), Attribute::Int2([0, 0])),
    ]
    .into_iter()
    .collect();
    map.component_definitions
        .insert("Movement".to_string(), template.clone());

    if let LayerKind::Object(objects) = &mut map.layers[1].kind {
        objects[1].meta.attach_component("Movement", &template);
        objects[1]
            .meta
            .components
            .get_mut("Movement")
            .unwrap()
            .insert("offset".to_string(), Attribute::Int2([2, -3]));
    }
    map.meta = map
        .meta
        .with_property("spawn", Attribute::Float2([1.5, 2.0]))
        .with_property("area", Attribute::Int4([0, 0, 8, 8]));

    let loaded = round_trip(&map, "forest.yaml", &WriteOptions::default());
    assert_eq!(loaded, map);
}

/// Test the Tiled JSON format preserves a portable map
#[test]
fn test_json_round_trip() {
    let map = portable_map();
    let loaded = round_trip(&map, "forest.tmj", &WriteOptions::default());
    assert_eq!(loaded, map);
}

/// Test the Tiled XML format preserves a portable map
#[test]
fn test_xml_round_trip() {
    let map = portable_map();
    let loaded = round_trip(&map, "forest.tmx", &WriteOptions::default());
    assert_eq!(loaded, map);
}

/// Test every encoding and compression pair survives each format
#[test]
fn test_tile_formats_across_formats() {
    let formats = [
        TileFormat::plain(),
        TileFormat::base64(TileCompression::None),
        TileFormat::base64(TileCompression::Zlib),
        TileFormat::base64(TileCompression::Zlib).with_zlib_level(9),
        TileFormat::base64(TileCompression::Zstd),
    ];

    for file in ["map.yaml", "map.json", "map.tmx"] {
        for format in formats {
            let mut map = portable_map();
            map.tile_format = format;
            let loaded = round_trip(&map, file, &WriteOptions::default());
            assert_eq!(loaded.tile_format, format, "{file} with {format:?}");
            assert_eq!(loaded.layers, map.layers, "{file} with {format:?}");
        }
    }
}

/// Test repeated saves of an unmodified map are byte-identical
#[test]
fn test_deterministic_output() {
    let dir = tempfile::tempdir().unwrap();
    let registry = FormatRegistry::with_defaults();
    let map = portable_map();

    for file in ["a.yaml", "a.json", "a.tmx", "a.tscn"] {
        let path = dir.path().join(file);
        registry.save_map(&map, &path, &WriteOptions::default()).unwrap();
        let first = read(&path);
        registry.save_map(&map, &path, &WriteOptions::default()).unwrap();
        assert_eq!(first, read(&path), "{file}");
    }
}

/// Test Tiled formats degrade vector properties and drop components
#[test]
fn test_tiled_lossy_projection() {
    let mut map = portable_map();
    map.meta = map
        .meta
        .with_property("spawn", Attribute::Int2([3, 4]));
    map.component_definitions
        .insert("Tag".to_string(), BTreeMap::new());
    map.layers[0].meta.attach_component("Tag", &BTreeMap::new());

    for file in ["lossy.json", "lossy.tmx"] {
        let loaded = round_trip(&map, file, &WriteOptions::default());
        assert_eq!(
            loaded.meta.properties["spawn"],
            Attribute::String("3;4".to_string()),
            "{file}"
        );
        assert!(loaded.component_definitions.is_empty(), "{file}");
        assert!(loaded.layers[0].meta.components.is_empty(), "{file}");
    }
}

fn read(path: &Path) -> String {
    std::fs::read_to_string(path).unwrap()
}
