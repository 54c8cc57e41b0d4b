//! Quadkey conversion commands.

use clap::Subcommand;
use serde_json::{json, Value};

use quadfetch::coord::TilingScheme;
use quadfetch::tile::TileAddress;

use crate::error::CliError;

/// Quadkey subcommands.
#[derive(Debug, Subcommand)]
pub enum QuadkeyAction {
    /// Print the quadkey of a tile
    Encode {
        /// Quadtree level (0-31)
        level: u8,
        /// Row at that level
        row: u32,
        /// Column at that level
        column: u32,
    },
    /// Print the tile and bounds of a quadkey
    Decode {
        /// Decimal quadkey
        key: u64,
        /// Tiling scheme used for the bounds
        #[arg(long, default_value = "geographic", value_parser = parse_scheme)]
        scheme: TilingScheme,
    },
}

fn parse_scheme(s: &str) -> Result<TilingScheme, String> {
    TilingScheme::from_name(s).ok_or_else(|| format!("unknown scheme '{s}', expected 'geographic' or 'web_mercator'"))
}

/// Run a quadkey subcommand.
pub fn run(action: QuadkeyAction, json: bool) -> Result<(), CliError> {
    let (value, text) = match action {
        QuadkeyAction::Encode { level, row, column } => {
            let tile = TileAddress::new(level, row, column)?;
            (tile_json(&tile, None), tile.to_key_string())
        }
        QuadkeyAction::Decode { key, scheme } => {
            let tile = TileAddress::from_quadkey(key)?;
            let bounds = scheme.tile_bounds(&tile);
            (tile_json(&tile, Some(scheme)), format!("{}  {}", tile, bounds))
        }
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        println!("{}", text);
    }
    Ok(())
}

fn tile_json(tile: &TileAddress, scheme: Option<TilingScheme>) -> Value {
    let mut value = json!({
        "level": tile.level(),
        "row": tile.row(),
        "column": tile.column(),
        "quadkey": tile.quadkey(),
    });
    if let Some(scheme) = scheme {
        let bounds = scheme.tile_bounds(tile);
        value["scheme"] = json!(scheme.name());
        value["bounds"] = json!({
            "west": bounds.west,
            "south": bounds.south,
            "east": bounds.east,
            "north": bounds.north,
        });
    }
    value
}
