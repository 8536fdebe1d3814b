//! Screen-space tile grid and per-tile light masks.

use crate::bounds::ItemBounds;
use candela_light::LightingConfig;

/// The screen-space tile grid the per-tile light masks are computed over.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TileGrid {
    tile_width: u32,
    tiles_x: u32,
    tiles_y: u32,
}

/// An inclusive range of tile columns covered by one item on one tile row.
/// `start > end` encodes an empty range.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TileColumnRange {
    pub start: u16,
    pub end: u16,
}

impl TileColumnRange {
    /// The empty range.
    pub const EMPTY: Self = Self { start: 1, end: 0 };

    /// Whether the range covers no columns.
    pub fn is_empty(&self) -> bool {
        self.start > self.end
    }
}

impl TileGrid {
    /// Finds the coarsest-necessary tile grid for the given viewport: starts
    /// from the configured minimum tile width and doubles it until the total
    /// number of mask words fits the tile word budget. Trades spatial
    /// resolution for memory by geometric search rather than exact
    /// optimization.
    ///
    /// # Panics
    /// If the viewport is empty.
    pub fn fit(
        viewport: (u32, u32),
        words_per_entry: usize,
        view_count: usize,
        config: &LightingConfig,
    ) -> Self {
        let (viewport_width, viewport_height) = viewport;
        assert!(viewport_width > 0 && viewport_height > 0);

        let mut tile_width = config.min_tile_width;
        loop {
            let tiles_x = viewport_width.div_ceil(tile_width);
            let tiles_y = viewport_height.div_ceil(tile_width);
            let total_words = tiles_x as usize * tiles_y as usize * words_per_entry * view_count;

            // A single tile covering the whole viewport is the coarsest
            // possible grid, so the search stops there regardless.
            if total_words <= config.tile_word_budget || (tiles_x == 1 && tiles_y == 1) {
                return Self {
                    tile_width,
                    tiles_x,
                    tiles_y,
                };
            }
            tile_width *= 2;
        }
    }

    /// Returns the tile width and height in pixels.
    pub fn tile_width(&self) -> u32 {
        self.tile_width
    }

    /// Returns the number of tile columns.
    pub fn tiles_x(&self) -> u32 {
        self.tiles_x
    }

    /// Returns the number of tile rows.
    pub fn tiles_y(&self) -> u32 {
        self.tiles_y
    }

    /// Returns the total number of tiles per view.
    pub fn tile_count(&self) -> usize {
        self.tiles_x as usize * self.tiles_y as usize
    }
}

/// Computes the inclusive tile-column range the given item covers on every
/// tile row, writing one [`TileColumnRange`] per row into `row_ranges`
/// (which has one slot per tile row).
///
/// The item's footprint is treated as the circle inscribed around its
/// conservative screen rectangle, so rows near the top and bottom of the
/// footprint cover fewer columns than rows through its center.
pub fn compute_row_ranges(
    row_ranges: &mut [TileColumnRange],
    bounds: &ItemBounds,
    viewport: (u32, u32),
    grid: &TileGrid,
) {
    row_ranges.fill(TileColumnRange::EMPTY);

    if bounds.is_empty() || bounds.ndc_x_min > bounds.ndc_x_max {
        return;
    }

    let (viewport_width, viewport_height) = (viewport.0 as f32, viewport.1 as f32);
    let tile_width = grid.tile_width() as f32;

    // Pixel-space rectangle, with the y-axis flipped so row zero is the top
    // of the screen.
    let x_min = (0.5 * bounds.ndc_x_min + 0.5) * viewport_width;
    let x_max = (0.5 * bounds.ndc_x_max + 0.5) * viewport_width;
    let y_min = (0.5 - 0.5 * bounds.ndc_y_max) * viewport_height;
    let y_max = (0.5 - 0.5 * bounds.ndc_y_min) * viewport_height;

    let center_x = 0.5 * (x_min + x_max);
    let center_y = 0.5 * (y_min + y_max);
    let radius = (0.5 * (x_max - x_min)).max(0.5 * (y_max - y_min));

    let first_row = ((y_min / tile_width) as i64).clamp(0, i64::from(grid.tiles_y()) - 1) as u32;
    let last_row = ((y_max / tile_width) as i64).clamp(0, i64::from(grid.tiles_y()) - 1) as u32;

    for row in first_row..=last_row {
        let band_top = row as f32 * tile_width;
        let band_bottom = band_top + tile_width;

        // Distance from the footprint center to the nearest point of the
        // row band; zero when the band contains the center.
        let distance = (band_top - center_y).max(center_y - band_bottom).max(0.0);
        let half_chord_squared = radius * radius - distance * distance;
        if half_chord_squared <= 0.0 {
            continue;
        }
        let half_chord = half_chord_squared.sqrt();

        let chord_min = (center_x - half_chord).max(x_min);
        let chord_max = (center_x + half_chord).min(x_max);

        let start = ((chord_min / tile_width) as i64).clamp(0, i64::from(grid.tiles_x()) - 1);
        let end = ((chord_max / tile_width) as i64).clamp(0, i64::from(grid.tiles_x()) - 1);

        row_ranges[row as usize] = TileColumnRange {
            start: start as u16,
            end: end as u16,
        };
    }
}

/// Expands the per-row column ranges of all items into the mask words of a
/// single tile row. `row_words` holds `tiles_x * words_per_entry` words and
/// `item_row_ranges` yields each item's range on this row.
pub fn expand_row<'a>(
    row_words: &mut [u32],
    words_per_entry: usize,
    item_row_ranges: impl Iterator<Item = &'a TileColumnRange>,
) {
    for (item_index, range) in item_row_ranges.enumerate() {
        if range.is_empty() {
            continue;
        }
        let word_offset = item_index / 32;
        let bit = 1u32 << (item_index % 32);
        for column in range.start..=range.end {
            row_words[column as usize * words_per_entry + word_offset] |= bit;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_screen_bounds(depth: f32) -> ItemBounds {
        ItemBounds {
            min_depth: depth,
            max_depth: depth + 1.0,
            ndc_x_min: -1.0,
            ndc_x_max: 1.0,
            ndc_y_min: -1.0,
            ndc_y_max: 1.0,
        }
    }

    #[test]
    fn tile_grid_respects_the_word_budget() {
        let config = LightingConfig::default();
        let grid = TileGrid::fit((1920, 1080), 8, 1, &config);

        assert!(grid.tile_count() * 8 <= config.tile_word_budget);
        assert!(grid.tile_width() >= config.min_tile_width);
        assert!(grid.tile_width().is_power_of_two());
    }

    #[test]
    fn tile_grid_coarsens_under_a_tight_budget() {
        let config = LightingConfig {
            tile_word_budget: 64,
            ..Default::default()
        };
        let coarse = TileGrid::fit((1920, 1080), 4, 1, &config);
        let generous = TileGrid::fit((1920, 1080), 4, 1, &LightingConfig::default());

        assert!(coarse.tile_width() > generous.tile_width());
        assert!(coarse.tile_count() * 4 <= 64);
    }

    #[test]
    fn tile_grid_search_terminates_on_a_single_tile() {
        let config = LightingConfig {
            tile_word_budget: 1,
            ..Default::default()
        };
        let grid = TileGrid::fit((640, 480), 4, 2, &config);

        assert_eq!((grid.tiles_x(), grid.tiles_y()), (1, 1));
    }

    #[test]
    fn full_screen_item_covers_every_row() {
        let config = LightingConfig::default();
        let viewport = (256, 256);
        let grid = TileGrid::fit(viewport, 1, 1, &config);
        let bounds = full_screen_bounds(5.0);

        let mut ranges = vec![TileColumnRange::EMPTY; grid.tiles_y() as usize];
        compute_row_ranges(&mut ranges, &bounds, viewport, &grid);

        // The center row must span all columns.
        let center = &ranges[grid.tiles_y() as usize / 2];
        assert_eq!(center.start, 0);
        assert_eq!(center.end, (grid.tiles_x() - 1) as u16);
        assert!(ranges.iter().any(|range| !range.is_empty()));
    }

    #[test]
    fn small_centered_item_covers_only_central_tiles() {
        let config = LightingConfig::default();
        let viewport = (256, 256);
        let grid = TileGrid::fit(viewport, 1, 1, &config);
        let bounds = ItemBounds {
            min_depth: 5.0,
            max_depth: 6.0,
            ndc_x_min: -0.05,
            ndc_x_max: 0.05,
            ndc_y_min: -0.05,
            ndc_y_max: 0.05,
        };

        let mut ranges = vec![TileColumnRange::EMPTY; grid.tiles_y() as usize];
        compute_row_ranges(&mut ranges, &bounds, viewport, &grid);

        let covered_rows: Vec<_> = ranges
            .iter()
            .enumerate()
            .filter(|(_, range)| !range.is_empty())
            .collect();
        assert!(!covered_rows.is_empty());
        assert!(covered_rows.len() < grid.tiles_y() as usize);
        for (_, range) in &covered_rows {
            assert!(range.start > 0);
            assert!(u32::from(range.end) < grid.tiles_x() - 1);
        }
    }

    #[test]
    fn empty_bounds_cover_no_rows() {
        let config = LightingConfig::default();
        let viewport = (256, 256);
        let grid = TileGrid::fit(viewport, 1, 1, &config);

        let mut ranges = vec![TileColumnRange::EMPTY; grid.tiles_y() as usize];
        compute_row_ranges(&mut ranges, &ItemBounds::empty(), viewport, &grid);

        assert!(ranges.iter().all(TileColumnRange::is_empty));
    }

    #[test]
    fn expanding_a_row_sets_bits_in_the_covered_columns_only() {
        let ranges = [
            TileColumnRange { start: 1, end: 2 },
            TileColumnRange::EMPTY,
            TileColumnRange { start: 2, end: 3 },
        ];

        let mut row_words = vec![0u32; 4];
        expand_row(&mut row_words, 1, ranges.iter());

        assert_eq!(row_words[0], 0);
        assert_eq!(row_words[1], 0b001);
        assert_eq!(row_words[2], 0b101);
        assert_eq!(row_words[3], 0b100);
    }
}
