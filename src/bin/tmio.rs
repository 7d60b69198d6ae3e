//! tilemap-io CLI binary.
//!
//! Converts and inspects tile map documents.
//!
//! # Commands
//!
//! - `convert` - Load a map and save it in the format of the output extension
//! - `info` - Print a summary of a map
//! - `formats` - List the registered formats

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use tilemap_io::{
    codec::{TileCompression, TileEncoding},
    config::{Config, TilesetPolicy},
    ir::{Layer, LayerKind},
    FormatRegistry, VERSION,
};

#[derive(Parser)]
#[command(name = "tmio")]
#[command(version = VERSION)]
#[command(about = "Tile map serialization - YAML, Tiled JSON/XML and Godot", long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file (default: user config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert a map between formats
    Convert {
        /// Input map file
        input: PathBuf,

        /// Output map file, format chosen by extension
        output: PathBuf,

        /// Tile data encoding (plain, base64)
        #[arg(short, long)]
        encoding: Option<String>,

        /// Tile data compression (none, zlib, zstd)
        #[arg(long)]
        compression: Option<String>,

        /// Inline every tileset into the output map
        #[arg(long, conflicts_with = "externalize")]
        embed: bool,

        /// Write every tileset to its own file
        #[arg(long)]
        externalize: bool,

        /// Godot major version for .tscn output (3 or 4)
        #[arg(long)]
        godot_version: Option<u8>,
    },

    /// Print a summary of a map
    Info {
        /// Map file
        input: PathBuf,
    },

    /// List supported formats
    Formats,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = load_config(cli.config.as_deref())?;
    let registry = FormatRegistry::with_defaults();

    match cli.command {
        Commands::Convert {
            input,
            output,
            encoding,
            compression,
            embed,
            externalize,
            godot_version,
        } => cmd_convert(
            &registry,
            config,
            &input,
            &output,
            encoding,
            compression,
            embed,
            externalize,
            godot_version,
        ),

        Commands::Info { input } => cmd_info(&registry, &config, &input),

        Commands::Formats => {
            cmd_formats(&registry);
            Ok(())
        },
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    match path {
        Some(path) => {
            let file = Config::from_file(path)
                .with_context(|| format!("Failed to load config {}", path.display()))?;
            Ok(file.merge(Config::from_env()))
        },
        None => Ok(Config::load()?),
    }
}

#[allow(clippy::too_many_arguments, clippy::fn_params_excessive_bools)]
fn cmd_convert(
    registry: &FormatRegistry,
    mut config: Config,
    input: &Path,
    output: &Path,
    encoding: Option<String>,
    compression: Option<String>,
    embed: bool,
    externalize: bool,
    godot_version: Option<u8>,
) -> anyhow::Result<()> {
    if let Some(encoding) = encoding {
        config.write.encoding = Some(encoding.parse::<TileEncoding>()?);
    }
    if let Some(compression) = compression {
        config.write.compression = Some(compression.parse::<TileCompression>()?);
    }
    if embed {
        config.write.tilesets = TilesetPolicy::Embed;
    } else if externalize {
        config.write.tilesets = TilesetPolicy::Externalize;
    }
    if let Some(version) = godot_version {
        config.write.godot.version = version;
    }

    let map = registry
        .load_map(input, &config.read)
        .with_context(|| format!("Failed to load {}", input.display()))?;
    registry
        .save_map(&map, output, &config.write)
        .with_context(|| format!("Failed to save {}", output.display()))?;

    eprintln!("Converted {} -> {}", input.display(), output.display());
    Ok(())
}

fn cmd_info(registry: &FormatRegistry, config: &Config, input: &Path) -> anyhow::Result<()> {
    let format = registry.format_for(input)?;
    let map = format
        .load_map(input, &config.read)
        .with_context(|| format!("Failed to load {}", input.display()))?;

    println!("File:         {}", input.display());
    println!("Format:       {}", format.name());
    println!("Orientation:  {}", map.orientation);
    println!("Size:         {} x {} tiles", map.extent.cols, map.extent.rows);
    println!("Tile size:    {} x {} px", map.tile_width, map.tile_height);
    println!(
        "Tile data:    {} / {}",
        map.tile_format.encoding, map.tile_format.compression
    );
    println!("Properties:   {}", map.meta.properties.len());
    println!("Components:   {}", map.component_definitions.len());

    println!();
    println!("Tilesets ({}):", map.tilesets.len());
    for reference in &map.tilesets {
        let name = reference
            .tileset
            .as_ref()
            .map_or("<unresolved>", |t| t.meta.name.as_str());
        let count = reference.tileset.as_ref().map_or(0, |t| t.tile_count);
        println!("  [{:>5}] {name} ({count} tiles)", reference.first_id);
    }

    println!();
    println!("Layers:");
    for layer in &map.layers {
        print_layer(layer, 1);
    }

    Ok(())
}

fn print_layer(layer: &Layer, depth: usize) {
    let indent = "  ".repeat(depth);
    let detail = match &layer.kind {
        LayerKind::Tile(tiles) => {
            let used = tiles.as_slice().iter().filter(|&&id| id != 0).count();
            format!("{used} non-empty tiles")
        },
        LayerKind::Object(objects) => format!("{} objects", objects.len()),
        LayerKind::Group(children) => format!("{} children", children.len()),
    };
    println!(
        "{indent}#{:<3} {:<12} {:?} ({detail})",
        layer.id,
        layer.kind.as_str(),
        layer.name()
    );

    if let LayerKind::Group(children) = &layer.kind {
        for child in children {
            print_layer(child, depth + 1);
        }
    }
}

fn cmd_formats(registry: &FormatRegistry) {
    println!("{:<8} {:<6} {:<16} TILESET", "FORMAT", "LOAD", "EXTENSIONS");
    for format in registry.formats() {
        println!(
            "{:<8} {:<6} {:<16} {}",
            format.name(),
            if format.can_load() { "yes" } else { "no" },
            format.extensions().join(", "),
            format.tileset_extension()
        );
    }
}
