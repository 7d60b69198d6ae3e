//! Configuration management.
//!
//! Supports configuration from:
//! - TOML config files (`[read]` and `[write]` sections)
//! - Environment variables (`TILEMAP_IO_*`)
//! - CLI arguments (for `tmio`)
//!
//! ```toml
//! [read]
//! strict_properties = false
//!
//! [write]
//! encoding = "base64"
//! compression = "zstd"
//! tilesets = "embed"
//!
//! [write.godot]
//! version = 4
//! ellipse_vertices = 24
//! ```

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::codec::{TileCompression, TileEncoding};
use crate::error::{MapIoError, Result};

/// Default number of polygon vertices used to approximate ellipses
pub const DEFAULT_ELLIPSE_VERTICES: usize = 32;

/// Main configuration struct
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Parser behavior
    #[serde(default)]
    pub read: ReadOptions,

    /// Emitter behavior
    #[serde(default)]
    pub write: WriteOptions,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let content = std::fs::read_to_string(&path)
            .map_err(|e| MapIoError::Config(format!("Failed to read config file: {e}")))?;

        toml::from_str(&content)
            .map_err(|e| MapIoError::Config(format!("Failed to parse config: {e}")))
    }

    /// Default config file location, `<config dir>/tilemap-io/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("tilemap-io").join("config.toml"))
    }

    /// Load the default config file if it exists, then apply the environment
    pub fn load() -> Result<Self> {
        let base = match Self::default_path() {
            Some(path) if path.is_file() => {
                tracing::debug!(path = %path.display(), "loading config");
                Self::from_file(path)?
            },
            _ => Self::default(),
        };
        Ok(base.merge(Self::from_env()))
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        // Write settings
        if let Ok(val) = std::env::var("TILEMAP_IO_COMPRESSION") {
            match val.parse() {
                Ok(compression) => config.write.compression = Some(compression),
                Err(e) => tracing::warn!("ignoring TILEMAP_IO_COMPRESSION: {e}"),
            }
        }
        if let Ok(val) = std::env::var("TILEMAP_IO_ENCODING") {
            match val.parse() {
                Ok(encoding) => config.write.encoding = Some(encoding),
                Err(e) => tracing::warn!("ignoring TILEMAP_IO_ENCODING: {e}"),
            }
        }
        if let Ok(val) = std::env::var("TILEMAP_IO_EMBED_TILESETS") {
            if let Some(embed) = parse_flag(&val) {
                config.write.tilesets = if embed {
                    TilesetPolicy::Embed
                } else {
                    TilesetPolicy::Externalize
                };
            }
        }
        if let Ok(val) = std::env::var("TILEMAP_IO_INDENT") {
            if let Ok(indent) = val.parse() {
                config.write.indent = indent;
            }
        }

        // Read settings
        if let Ok(val) = std::env::var("TILEMAP_IO_STRICT") {
            if let Some(strict) = parse_flag(&val) {
                config.read.strict_properties = strict;
            }
        }

        config
    }

    /// Merge with another config (other takes precedence)
    pub fn merge(self, other: Self) -> Self {
        let read_defaults = ReadOptions::default();
        let write_defaults = WriteOptions::default();
        let godot_defaults = GodotOptions::default();

        Self {
            read: ReadOptions {
                strict_properties: if other.read.strict_properties
                    != read_defaults.strict_properties
                {
                    other.read.strict_properties
                } else {
                    self.read.strict_properties
                },
                resolve_tilesets: if other.read.resolve_tilesets != read_defaults.resolve_tilesets
                {
                    other.read.resolve_tilesets
                } else {
                    self.read.resolve_tilesets
                },
            },
            write: WriteOptions {
                encoding: other.write.encoding.or(self.write.encoding),
                compression: other.write.compression.or(self.write.compression),
                tilesets: if other.write.tilesets != write_defaults.tilesets {
                    other.write.tilesets
                } else {
                    self.write.tilesets
                },
                indent: if other.write.indent != write_defaults.indent {
                    other.write.indent
                } else {
                    self.write.indent
                },
                fold_tile_data: if other.write.fold_tile_data != write_defaults.fold_tile_data {
                    other.write.fold_tile_data
                } else {
                    self.write.fold_tile_data
                },
                godot: GodotOptions {
                    version: if other.write.godot.version != godot_defaults.version {
                        other.write.godot.version
                    } else {
                        self.write.godot.version
                    },
                    ellipse_vertices: if other.write.godot.ellipse_vertices
                        != godot_defaults.ellipse_vertices
                    {
                        other.write.godot.ellipse_vertices
                    } else {
                        self.write.godot.ellipse_vertices
                    },
                },
            },
        }
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parser options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadOptions {
    /// Reject unknown property types and corrupt property values instead of
    /// recovering them as strings
    pub strict_properties: bool,

    /// Load external tileset files while parsing a map
    pub resolve_tilesets: bool,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            strict_properties: true,
            resolve_tilesets: true,
        }
    }
}

impl ReadOptions {
    /// Lenient property parsing
    pub fn lenient() -> Self {
        Self {
            strict_properties: false,
            ..Self::default()
        }
    }
}

/// How emitters store tilesets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TilesetPolicy {
    /// Keep each reference's embedded or external source
    #[default]
    Preserve,
    /// Inline every tileset into the map document
    Embed,
    /// Write every tileset to its own file next to the map
    Externalize,
}

/// Godot export options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GodotOptions {
    /// Target engine major version, 3 or 4
    pub version: u8,

    /// Vertices of the polygon approximating an ellipse
    pub ellipse_vertices: usize,
}

impl Default for GodotOptions {
    fn default() -> Self {
        Self {
            version: 3,
            ellipse_vertices: DEFAULT_ELLIPSE_VERTICES,
        }
    }
}

/// Emitter options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WriteOptions {
    /// Override the map's tile encoding
    pub encoding: Option<TileEncoding>,

    /// Override the map's tile compression
    pub compression: Option<TileCompression>,

    /// Tileset storage policy
    pub tilesets: TilesetPolicy,

    /// Indentation width of nested output
    pub indent: usize,

    /// Write plain tile data one row per line (native format)
    pub fold_tile_data: bool,

    /// Godot export options
    pub godot: GodotOptions,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            encoding: None,
            compression: None,
            tilesets: TilesetPolicy::Preserve,
            indent: 2,
            fold_tile_data: true,
            godot: GodotOptions::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.read.strict_properties);
        assert!(config.read.resolve_tilesets);
        assert_eq!(config.write.tilesets, TilesetPolicy::Preserve);
        assert_eq!(config.write.indent, 2);
        assert_eq!(config.write.godot.version, 3);
    }

    #[test]
    fn test_config_from_toml() {
        let toml = r#"
            [read]
            strict_properties = false

            [write]
            encoding = "base64"
            compression = "zstd"
            tilesets = "embed"

            [write.godot]
            version = 4
        "#;

        let config: Config = toml::from_str(toml).unwrap();
        assert!(!config.read.strict_properties);
        assert!(config.read.resolve_tilesets);
        assert_eq!(config.write.encoding, Some(TileEncoding::Base64));
        assert_eq!(config.write.compression, Some(TileCompression::Zstd));
        assert_eq!(config.write.tilesets, TilesetPolicy::Embed);
        assert_eq!(config.write.godot.version, 4);
        assert_eq!(config.write.godot.ellipse_vertices, DEFAULT_ELLIPSE_VERTICES);
    }

    #[test]
    fn test_config_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[write]\nindent = 4\n").unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.write.indent, 4);

        std::fs::write(&path, "[write\n").unwrap();
        assert!(matches!(Config::from_file(&path), Err(MapIoError::Config(_))));
    }

    #[test]
    fn test_merge_prefers_other() {
        let mut base = Config::default();
        base.write.compression = Some(TileCompression::Zlib);
        base.write.indent = 4;

        let mut other = Config::default();
        other.write.encoding = Some(TileEncoding::Base64);
        other.read.strict_properties = false;

        let merged = base.merge(other);
        assert_eq!(merged.write.compression, Some(TileCompression::Zlib));
        assert_eq!(merged.write.encoding, Some(TileEncoding::Base64));
        assert_eq!(merged.write.indent, 4);
        assert!(!merged.read.strict_properties);
    }

    #[test]
    fn test_parse_flag() {
        assert_eq!(parse_flag("TRUE"), Some(true));
        assert_eq!(parse_flag("0"), Some(false));
        assert_eq!(parse_flag("maybe"), None);
    }
}
