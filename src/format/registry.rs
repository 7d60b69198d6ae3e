//! Extension based format dispatch.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use super::{GodotFormat, JsonFormat, MapFormat, XmlFormat, YamlFormat};
use crate::config::{ReadOptions, WriteOptions};
use crate::error::{MapIoError, Result};
use crate::ir::{Map, MapView, Tileset};

/// Maps lower-case file extensions to formats.
///
/// Built once, then read-only. Formats are shared behind [`Arc`] so one
/// format can claim several extensions.
#[derive(Default, Clone)]
pub struct FormatRegistry {
    formats: Vec<Arc<dyn MapFormat>>,
    by_extension: BTreeMap<String, Arc<dyn MapFormat>>,
}

impl std::fmt::Debug for FormatRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FormatRegistry")
            .field("extensions", &self.by_extension.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl FormatRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the native, Tiled JSON, Tiled XML and Godot formats
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(YamlFormat);
        registry.register(JsonFormat);
        registry.register(XmlFormat);
        registry.register(GodotFormat);
        registry
    }

    /// Register a format under all of its extensions.
    ///
    /// # Panics
    ///
    /// Panics if another format already claims one of the extensions.
    pub fn register(&mut self, format: impl MapFormat + 'static) {
        let format: Arc<dyn MapFormat> = Arc::new(format);
        for extension in format.extensions() {
            let key = extension.to_ascii_lowercase();
            if let Some(existing) = self.by_extension.get(&key) {
                panic!(
                    "extension '{key}' claimed by both {} and {}",
                    existing.name(),
                    format.name()
                );
            }
            self.by_extension.insert(key, Arc::clone(&format));
        }
        self.formats.push(format);
    }

    /// Registered formats in registration order
    pub fn formats(&self) -> impl Iterator<Item = &dyn MapFormat> {
        self.formats.iter().map(|f| f.as_ref())
    }

    /// Format claiming the extension of `path`
    pub fn format_for(&self, path: &Path) -> Result<&dyn MapFormat> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();

        self.by_extension
            .get(&extension)
            .map(|f| f.as_ref())
            .ok_or(MapIoError::UnsupportedFormat(extension))
    }

    /// Load a map with the format registered for its extension
    pub fn load_map(&self, path: &Path, options: &ReadOptions) -> Result<Map> {
        let format = self.format_for(path)?;
        tracing::debug!(path = %path.display(), format = format.name(), "loading map");
        format.load_map(path, options)
    }

    /// Save a map with the format registered for its extension
    pub fn save_map(&self, map: &Map, path: &Path, options: &WriteOptions) -> Result<()> {
        let format = self.format_for(path)?;
        tracing::debug!(path = %path.display(), format = format.name(), "saving map");
        format.save_map(map, path, options)
    }

    /// Snapshot a view and save it
    pub fn save_view(
        &self,
        view: &dyn MapView,
        path: &Path,
        options: &WriteOptions,
    ) -> Result<()> {
        self.save_map(&view.snapshot(), path, options)
    }

    /// Load a standalone tileset.
    ///
    /// Tileset-only extensions (`tsx`, `tsj`) are accepted in addition to the
    /// map extensions.
    pub fn load_tileset(&self, path: &Path, options: &ReadOptions) -> Result<Tileset> {
        let format = self.tileset_format_for(path)?;
        tracing::debug!(path = %path.display(), format = format.name(), "loading tileset");
        format.load_tileset(path, options)
    }

    /// Save a standalone tileset
    pub fn save_tileset(
        &self,
        tileset: &Tileset,
        path: &Path,
        options: &WriteOptions,
    ) -> Result<()> {
        self.tileset_format_for(path)?
            .save_tileset(tileset, path, options)
    }

    fn tileset_format_for(&self, path: &Path) -> Result<&dyn MapFormat> {
        self.format_for(path).or_else(|err| {
            let extension = path
                .extension()
                .and_then(|e| e.to_str())
                .map(str::to_ascii_lowercase)
                .unwrap_or_default();
            self.formats()
                .find(|f| f.claims_tileset_extension(&extension))
                .ok_or(err)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting {
        name: &'static str,
        extensions: &'static [&'static str],
        loads: Arc<AtomicUsize>,
    }

    impl MapFormat for Counting {
        fn name(&self) -> &'static str {
            self.name
        }

        fn extensions(&self) -> &'static [&'static str] {
            self.extensions
        }

        fn tileset_extension(&self) -> &'static str {
            "cts"
        }

        fn load_map(&self, _path: &Path, _options: &ReadOptions) -> Result<Map> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            Ok(Map::new(crate::ir::Extent::new(1, 1), 1, 1))
        }

        fn save_map(&self, _map: &Map, _path: &Path, _options: &WriteOptions) -> Result<()> {
            Ok(())
        }

        fn load_tileset(&self, _path: &Path, _options: &ReadOptions) -> Result<Tileset> {
            Ok(Tileset::default())
        }

        fn render_tileset(&self, _: &Tileset, _: &WriteOptions) -> Result<String> {
            Ok(String::new())
        }
    }

    fn counting(
        name: &'static str,
        extensions: &'static [&'static str],
    ) -> (Counting, Arc<AtomicUsize>) {
        let loads = Arc::new(AtomicUsize::new(0));
        (
            Counting {
                name,
                extensions,
                loads: Arc::clone(&loads),
            },
            loads,
        )
    }

    #[test]
    fn test_dispatch_by_extension() {
        let (a, a_loads) = counting("a", &["aaa", "a2"]);
        let (b, b_loads) = counting("b", &["bbb"]);
        let mut registry = FormatRegistry::new();
        registry.register(a);
        registry.register(b);

        registry
            .load_map(Path::new("map.A2"), &ReadOptions::default())
            .unwrap();
        assert_eq!(a_loads.load(Ordering::SeqCst), 1);
        assert_eq!(b_loads.load(Ordering::SeqCst), 0);

        let err = registry
            .load_map(Path::new("map.ccc"), &ReadOptions::default())
            .unwrap_err();
        assert!(matches!(err, MapIoError::UnsupportedFormat(ref ext) if ext == "ccc"));
        assert_eq!(a_loads.load(Ordering::SeqCst), 1);
        assert_eq!(b_loads.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_no_extension() {
        let registry = FormatRegistry::with_defaults();
        assert!(matches!(
            registry.format_for(Path::new("Makefile")),
            Err(MapIoError::UnsupportedFormat(_))
        ));
    }

    #[test]
    #[should_panic(expected = "claimed by both")]
    fn test_duplicate_extension_panics() {
        let (a, _) = counting("a", &["dup"]);
        let (b, _) = counting("b", &["DUP"]);
        let mut registry = FormatRegistry::new();
        registry.register(a);
        registry.register(b);
    }

    #[test]
    fn test_default_extensions() {
        let registry = FormatRegistry::with_defaults();
        for (file, name) in [
            ("a.yaml", "YAML"),
            ("a.YML", "YAML"),
            ("a.json", "JSON"),
            ("a.tmj", "JSON"),
            ("a.tmx", "XML"),
            ("a.xml", "XML"),
            ("a.tscn", "Godot"),
        ] {
            assert_eq!(registry.format_for(Path::new(file)).unwrap().name(), name);
        }
        assert_eq!(registry.tileset_format_for(Path::new("a.tsx")).unwrap().name(), "XML");
        assert_eq!(registry.tileset_format_for(Path::new("a.tsj")).unwrap().name(), "JSON");
        assert_eq!(registry.formats().count(), 4);
    }
}
