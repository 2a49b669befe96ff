//! Tile binning: duplicate every visible splat once per tile it touches,
//! sort the copies by (tile, depth) and find each tile's slice of the list.
//!
//! Keys pack the tile id in the high 32 bits and the bit pattern of the
//! (strictly positive) depth in the low 32 bits, so one integer sort orders
//! by tile, then front to back. Pairs are sorted together with their
//! primitive index, so equal depths within a tile resolve by index.

use rayon::prelude::*;

use crate::core::RasterError;
use crate::render::buffers::{BinningBuffer, ProjectedGaussian, TileGrid};

#[inline]
pub fn sort_key(tile_id: u32, depth: f32) -> u64 {
    ((tile_id as u64) << 32) | depth.to_bits() as u64
}

#[inline]
pub fn key_tile(key: u64) -> u32 {
    (key >> 32) as u32
}

/// Inclusive prefix sum of the per-primitive tile counts.
pub fn point_offsets(primitives: &[ProjectedGaussian]) -> Vec<usize> {
    primitives
        .iter()
        .scan(0usize, |acc, g| {
            *acc += g.tiles_touched as usize;
            Some(*acc)
        })
        .collect()
}

/// Emit and sort the (tile, depth) keys of all visible primitives.
pub fn bin_primitives(
    primitives: &[ProjectedGaussian],
    num_rendered: usize,
    grid: &TileGrid,
) -> Result<BinningBuffer, RasterError> {
    let _span = tracing::debug_span!("binning", num_rendered).entered();

    if num_rendered > u32::MAX as usize {
        return Err(RasterError::OutOfMemory {
            what: "binning list",
            requested: num_rendered,
        });
    }

    let mut pairs: Vec<(u64, u32)> = Vec::new();
    pairs
        .try_reserve_exact(num_rendered)
        .map_err(|_| RasterError::OutOfMemory {
            what: "binning list",
            requested: num_rendered,
        })?;

    pairs.par_extend(
        primitives
            .par_iter()
            .enumerate()
            .filter(|(_, g)| g.is_visible())
            .flat_map_iter(|(idx, g)| {
                let depth = g.depth;
                grid.tiles_hit(g.mean2d, g.radius as f32)
                    .map(move |tile| (sort_key(tile, depth), idx as u32))
            }),
    );

    if pairs.len() != num_rendered {
        return Err(RasterError::BufferMismatch(format!(
            "emitted {} tile entries, expected {}",
            pairs.len(),
            num_rendered
        )));
    }

    pairs.par_sort_unstable();

    let (keys, point_list) = pairs.into_iter().unzip();
    Ok(BinningBuffer { keys, point_list })
}

/// `[start, end)` of every tile in the sorted key list. Tiles without
/// entries get an empty range.
pub fn identify_tile_ranges(keys: &[u64], num_tiles: usize) -> Vec<(u32, u32)> {
    let mut ranges = vec![(0u32, 0u32); num_tiles];
    let Some(&first) = keys.first() else {
        return ranges;
    };

    let mut current = key_tile(first) as usize;
    let mut start = 0u32;
    for (i, &key) in keys.iter().enumerate().skip(1) {
        let tile = key_tile(key) as usize;
        if tile != current {
            ranges[current] = (start, i as u32);
            current = tile;
            start = i as u32;
        }
    }
    ranges[current] = (start, keys.len() as u32);
    ranges
}
