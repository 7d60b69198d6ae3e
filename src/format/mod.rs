//! File format parsers and emitters.
//!
//! | Format          | Type            | Map extensions  | Tileset extension | Load | Save |
//! |-----------------|-----------------|-----------------|-------------------|------|------|
//! | Native          | [`YamlFormat`]  | `yaml`, `yml`   | `yaml`            | yes  | yes  |
//! | Tiled JSON      | [`JsonFormat`]  | `json`, `tmj`   | `json`            | yes  | yes  |
//! | Tiled XML       | [`XmlFormat`]   | `tmx`, `xml`    | `tsx`             | yes  | yes  |
//! | Godot scene     | [`GodotFormat`] | `tscn`          | `tres`            | no   | yes  |
//!
//! Every format implements [`MapFormat`] and is dispatched by extension
//! through a [`FormatRegistry`].

pub mod godot;
pub mod json;
pub mod registry;
pub mod tiled;
pub mod xml;
pub mod yaml;

use std::borrow::Cow;
use std::io::Write;
use std::path::{Path, PathBuf};

pub use godot::GodotFormat;
pub use json::JsonFormat;
pub use registry::FormatRegistry;
pub use xml::XmlFormat;
pub use yaml::YamlFormat;

use crate::codec::{TileCompression, TileEncoding, TileFormat};
use crate::config::{ReadOptions, TilesetPolicy, WriteOptions};
use crate::error::{MapIoError, Result};
use crate::ir::{path_to_text, Map, Tileset, TilesetRef, TilesetSource};

/// A parser and emitter pair for one file format.
pub trait MapFormat: Send + Sync {
    /// Human readable format name
    fn name(&self) -> &'static str;

    /// Lower-case map file extensions claimed by this format
    fn extensions(&self) -> &'static [&'static str];

    /// Extension used for external tileset files
    fn tileset_extension(&self) -> &'static str;

    /// True if standalone tileset files with this lower-case extension
    /// belong to this format
    fn claims_tileset_extension(&self, extension: &str) -> bool {
        extension == self.tileset_extension()
    }

    /// Parse a map document
    fn load_map(&self, path: &Path, options: &ReadOptions) -> Result<Map>;

    /// Write a map document, plus any external tileset files it references
    fn save_map(&self, map: &Map, path: &Path, options: &WriteOptions) -> Result<()>;

    /// Parse a standalone tileset document
    fn load_tileset(&self, path: &Path, options: &ReadOptions) -> Result<Tileset>;

    /// Render a standalone tileset document
    fn render_tileset(&self, tileset: &Tileset, options: &WriteOptions) -> Result<String>;

    /// Write a standalone tileset document
    fn save_tileset(&self, tileset: &Tileset, path: &Path, options: &WriteOptions) -> Result<()> {
        write_atomic(path, &self.render_tileset(tileset, options)?)
    }

    /// True if this format can parse documents
    fn can_load(&self) -> bool {
        true
    }
}

/// Read a whole document, reporting a missing file distinctly.
pub fn read_document(path: &Path) -> Result<String> {
    if !path.is_file() {
        return Err(MapIoError::FileNotFound(path.to_path_buf()));
    }
    Ok(std::fs::read_to_string(path)?)
}

/// Write a document atomically.
///
/// The contents go to a temporary file in the destination directory which
/// then replaces the target, so a failed save never leaves a truncated file.
pub fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let mut staged = StagedFiles::default();
    staged.stage(path, contents)?;
    staged.commit()
}

/// Documents of one save, written to temporary files first.
///
/// Nothing is replaced until [`StagedFiles::commit`], so a save that fails
/// while rendering or writing any of its files leaves every target as it
/// was. Dropping uncommitted files removes the temporaries.
#[derive(Debug, Default)]
pub struct StagedFiles {
    files: Vec<(tempfile::NamedTempFile, PathBuf)>,
}

impl StagedFiles {
    /// Write `contents` to a temporary file next to `path`
    pub fn stage(&mut self, path: &Path, contents: &str) -> Result<()> {
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        let mut file = tempfile::NamedTempFile::new_in(dir)?;
        file.write_all(contents.as_bytes())?;
        file.flush()?;
        self.files.push((file, path.to_path_buf()));
        Ok(())
    }

    /// Move every staged file over its target, in staging order
    pub fn commit(self) -> Result<()> {
        for (file, path) in self.files {
            file.persist(&path).map_err(|e| MapIoError::Io(e.error))?;
            tracing::debug!(path = %path.display(), "wrote document");
        }
        Ok(())
    }
}

/// Resolve a path stored in a document relative to that document.
pub fn resolve_relative(document: &Path, stored: &Path) -> PathBuf {
    match document.parent() {
        Some(dir) if stored.is_relative() => dir.join(stored),
        _ => stored.to_path_buf(),
    }
}

/// Tile format after applying the write overrides.
///
/// Requesting compression without an encoding implies base64. Plain data is
/// never compressed.
pub fn effective_tile_format(map: &Map, options: &WriteOptions) -> TileFormat {
    let mut format = map.tile_format;
    if let Some(compression) = options.compression {
        format.compression = compression;
        if compression != TileCompression::None && options.encoding.is_none() {
            format.encoding = TileEncoding::Base64;
        }
    }
    if let Some(encoding) = options.encoding {
        format.encoding = encoding;
    }
    if format.encoding == TileEncoding::Plain {
        format.compression = TileCompression::None;
        format.zlib_level = None;
    }
    format
}

/// Where an emitter puts one tileset reference
#[derive(Debug, Clone, PartialEq)]
pub enum TilesetPlacement<'a> {
    /// Inline the tileset
    Embed(Cow<'a, Tileset>),
    /// Reference a file, relative to the map
    External {
        /// Path written into the map document
        path: PathBuf,
        /// Tileset to write to that file, `None` if it was never resolved
        tileset: Option<&'a Tileset>,
    },
}

impl TilesetPlacement<'_> {
    /// Reference path as written into a document
    pub fn source_text(&self) -> Option<String> {
        match self {
            TilesetPlacement::Embed(_) => None,
            TilesetPlacement::External { path, .. } => Some(path_to_text(path)),
        }
    }
}

/// Decide where a tileset reference goes under a write policy.
///
/// External paths take the format's tileset extension, so converting a map
/// never overwrites the tileset files of the source format.
pub fn place_tileset<'a>(
    reference: &'a TilesetRef,
    policy: TilesetPolicy,
    extension: &str,
) -> TilesetPlacement<'a> {
    let Some(tileset) = reference.tileset.as_ref() else {
        let path = match &reference.source {
            TilesetSource::External(path) => path.clone(),
            TilesetSource::Embedded => PathBuf::from(format!("tileset_{}", reference.first_id)),
        };
        tracing::warn!(
            first_id = reference.first_id,
            path = %path.display(),
            "tileset was not resolved, keeping reference as is"
        );
        return TilesetPlacement::External {
            path,
            tileset: None,
        };
    };

    let external_path = || match &reference.source {
        TilesetSource::External(path) => path.with_extension(extension),
        TilesetSource::Embedded => {
            PathBuf::from(format!("{}.{extension}", tileset_file_stem(reference, tileset)))
        },
    };

    match (policy, &reference.source) {
        (TilesetPolicy::Preserve | TilesetPolicy::Embed, TilesetSource::Embedded) => {
            TilesetPlacement::Embed(Cow::Borrowed(tileset))
        },
        (TilesetPolicy::Embed, TilesetSource::External(path)) => {
            TilesetPlacement::Embed(rebase_image(tileset, path))
        },
        (TilesetPolicy::Externalize, _) | (TilesetPolicy::Preserve, TilesetSource::External(_)) => {
            TilesetPlacement::External {
                path: external_path(),
                tileset: Some(tileset),
            }
        },
    }
}

/// Image paths are relative to the tileset document, so inlining a tileset
/// stored in another directory moves its image path into the map's frame.
fn rebase_image<'a>(tileset: &'a Tileset, tileset_path: &Path) -> Cow<'a, Tileset> {
    match tileset_path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() && tileset.image_path.is_relative() => {
            let mut rebased = tileset.clone();
            rebased.image_path = dir.join(&tileset.image_path);
            Cow::Owned(rebased)
        },
        _ => Cow::Borrowed(tileset),
    }
}

fn tileset_file_stem(reference: &TilesetRef, tileset: &Tileset) -> String {
    let stem: String = tileset
        .meta
        .name
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    if stem.is_empty() {
        format!("tileset_{}", reference.first_id)
    } else {
        stem
    }
}

/// Save a rendered map document together with its external tileset files.
///
/// Tilesets are rendered and staged first and the map is staged last. A
/// failure while rendering or staging replaces no file, and the map is only
/// replaced after all of its tilesets.
pub fn save_with_tilesets(
    format: &dyn MapFormat,
    map: &Map,
    map_path: &Path,
    document: &str,
    options: &WriteOptions,
) -> Result<()> {
    let mut staged = StagedFiles::default();
    for reference in &map.tilesets {
        if let TilesetPlacement::External {
            path,
            tileset: Some(tileset),
        } = place_tileset(reference, options.tilesets, format.tileset_extension())
        {
            let target = resolve_relative(map_path, &path);
            tracing::debug!(path = %target.display(), "writing external tileset");
            staged.stage(&target, &format.render_tileset(tileset, options)?)?;
        }
    }
    staged.stage(map_path, document)?;
    staged.commit()
}
