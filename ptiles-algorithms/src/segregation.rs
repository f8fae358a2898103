use log::debug;
use ptiles_core::{
    grid::OffsetPass,
    meta::{FileTiles, TileId},
    tile::Tile,
};

/// Returns true if `tile` holds at least one point whose label is not `background`
pub fn is_retained(tile: &Tile, background: u8) -> bool {
    !tile.is_background_only(background)
}

/// The tiles of one source file and pass that survived segregation, together with their ids
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SegregatedTiles {
    pub retained: Vec<(TileId, Tile)>,
    /// Number of background-only tiles that were dropped
    pub dropped: usize,
}

impl SegregatedTiles {
    /// Number of tiles that were looked at, retained or not
    pub fn seen(&self) -> usize {
        self.retained.len() + self.dropped
    }

    /// Returns the retained tiles, or `None` if every tile was dropped
    pub fn into_retained(self) -> Option<Vec<(TileId, Tile)>> {
        if self.retained.is_empty() {
            None
        } else {
            Some(self.retained)
        }
    }

    /// Adds the ids and block centers of all retained tiles to `file_tiles`
    pub fn index_into(&self, file_tiles: &mut FileTiles) {
        for (id, tile) in &self.retained {
            file_tiles.push(*id, &tile.block_center);
        }
    }
}

/// Drops every tile that holds only `background` labels. Tiles are numbered by their position in `tiles`,
/// starting at `first_number` and counting dropped tiles as well, so a tile keeps its id no matter which
/// other tiles are retained. Tiles of one pass can be segregated in chunks by passing the number of tiles
/// seen so far as `first_number`
pub fn segregate_tiles<I: IntoIterator<Item = Tile>>(
    tiles: I,
    pass: OffsetPass,
    background: u8,
    first_number: u32,
) -> SegregatedTiles {
    let mut segregated = SegregatedTiles::default();
    for (offset, tile) in tiles.into_iter().enumerate() {
        let id = TileId::new(pass, first_number + offset as u32);
        if is_retained(&tile, background) {
            segregated.retained.push((id, tile));
        } else {
            debug!("Dropping background-only tile {}", id);
            segregated.dropped += 1;
        }
    }
    segregated
}
