//! Tile ownership grid and the neighbour-based edge classifier that decides
//! how a conquered tile is drawn.
//!
//! Only green tiles get edge variants. Gray tiles, and green tiles with no
//! gray neighbour, resolve to one of [`BASE_VARIANT_COUNT`] base variants
//! picked by a position hash, so classification never depends on call order.

use serde::Serialize;

use crate::constants::TILE_SIZE;
use crate::error::ProtocolError;
use crate::types::{TileMapView, TileType, TileView};

pub const BASE_VARIANT_COUNT: u8 = 4;
/// Upper bound on a tile map accepted from the wire.
pub const MAX_TILE_MAP_CELLS: usize = 1 << 16;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Top,
    Right,
    Bottom,
    Left,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Corner {
    TopLeft,
    TopRight,
    BottomRight,
    BottomLeft,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Diagonal {
    /// Top-left and bottom-right.
    Falling,
    /// Top-right and bottom-left.
    Rising,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TileVariant {
    Base { index: u8 },
    /// Three contiguous sides plus both diagonals touching the middle one.
    Wrapped { side: Side },
    OppositeCorners { diagonal: Diagonal },
    EdgeWithCorner { side: Side, corner: Corner },
    InnerCorner { corner: Corner },
    OuterCorner { corner: Corner },
    Edge { side: Side },
}

const SIDES: [Side; 4] = [Side::Top, Side::Right, Side::Bottom, Side::Left];
const CORNERS: [Corner; 4] = [
    Corner::TopLeft,
    Corner::TopRight,
    Corner::BottomRight,
    Corner::BottomLeft,
];

impl Side {
    /// Position in [`SIDES`].
    fn index(self) -> usize {
        match self {
            Self::Top => 0,
            Self::Right => 1,
            Self::Bottom => 2,
            Self::Left => 3,
        }
    }

    fn offset(self) -> (i32, i32) {
        match self {
            Self::Top => (0, -1),
            Self::Right => (1, 0),
            Self::Bottom => (0, 1),
            Self::Left => (-1, 0),
        }
    }

    fn clockwise(self) -> Self {
        match self {
            Self::Top => Self::Right,
            Self::Right => Self::Bottom,
            Self::Bottom => Self::Left,
            Self::Left => Self::Top,
        }
    }

    fn counter_clockwise(self) -> Self {
        match self {
            Self::Top => Self::Left,
            Self::Right => Self::Top,
            Self::Bottom => Self::Right,
            Self::Left => Self::Bottom,
        }
    }

    fn corners(self) -> [Corner; 2] {
        match self {
            Self::Top => [Corner::TopLeft, Corner::TopRight],
            Self::Right => [Corner::TopRight, Corner::BottomRight],
            Self::Bottom => [Corner::BottomRight, Corner::BottomLeft],
            Self::Left => [Corner::BottomLeft, Corner::TopLeft],
        }
    }
}

impl Corner {
    /// Position in [`CORNERS`].
    fn index(self) -> usize {
        match self {
            Self::TopLeft => 0,
            Self::TopRight => 1,
            Self::BottomRight => 2,
            Self::BottomLeft => 3,
        }
    }

    fn offset(self) -> (i32, i32) {
        match self {
            Self::TopLeft => (-1, -1),
            Self::TopRight => (1, -1),
            Self::BottomRight => (1, 1),
            Self::BottomLeft => (-1, 1),
        }
    }

    fn touches(self, side: Side) -> bool {
        side.corners().contains(&self)
    }

    fn between(a: Side, b: Side) -> Option<Self> {
        CORNERS
            .into_iter()
            .find(|corner| corner.touches(a) && corner.touches(b))
    }
}

/// Which of the eight neighbours belong to the opposing territory.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Neighbourhood {
    sides: [bool; 4],
    corners: [bool; 4],
}

impl Neighbourhood {
    pub fn read(grid: &TileGrid, x: i32, y: i32, own: TileType) -> Self {
        let opposing = |dx: i32, dy: i32| {
            grid.get(x + dx, y + dy)
                .map(|tile| tile != own)
                .unwrap_or(false)
        };
        let mut hood = Self::default();
        for side in SIDES {
            let (dx, dy) = side.offset();
            hood.sides[side.index()] = opposing(dx, dy);
        }
        for corner in CORNERS {
            let (dx, dy) = corner.offset();
            hood.corners[corner.index()] = opposing(dx, dy);
        }
        hood
    }

    pub fn side(&self, side: Side) -> bool {
        self.sides[side.index()]
    }

    pub fn corner(&self, corner: Corner) -> bool {
        self.corners[corner.index()]
    }

    fn opposing_sides(&self) -> Vec<Side> {
        SIDES.into_iter().filter(|side| self.side(*side)).collect()
    }

    fn opposing_corners(&self) -> Vec<Corner> {
        CORNERS
            .into_iter()
            .filter(|corner| self.corner(*corner))
            .collect()
    }

    #[cfg(test)]
    fn with(sides: &[Side], corners: &[Corner]) -> Self {
        let mut hood = Self::default();
        for side in sides {
            hood.sides[side.index()] = true;
        }
        for corner in corners {
            hood.corners[corner.index()] = true;
        }
        hood
    }
}

/// Ordered decision table over the eight neighbours. `None` means no rule
/// matched and the caller falls back to a base variant.
pub fn match_edge_pattern(hood: &Neighbourhood) -> Option<TileVariant> {
    let sides = hood.opposing_sides();
    let corners = hood.opposing_corners();
    if sides.is_empty() && corners.is_empty() {
        return None;
    }

    for middle in SIDES {
        let [c1, c2] = middle.corners();
        if hood.side(middle)
            && hood.side(middle.clockwise())
            && hood.side(middle.counter_clockwise())
            && hood.corner(c1)
            && hood.corner(c2)
        {
            return Some(TileVariant::Wrapped { side: middle });
        }
    }

    if sides.is_empty() {
        if hood.corner(Corner::TopLeft) && hood.corner(Corner::BottomRight) {
            return Some(TileVariant::OppositeCorners {
                diagonal: Diagonal::Falling,
            });
        }
        if hood.corner(Corner::TopRight) && hood.corner(Corner::BottomLeft) {
            return Some(TileVariant::OppositeCorners {
                diagonal: Diagonal::Rising,
            });
        }
    }

    if let [side] = sides.as_slice() {
        let far: Vec<Corner> = corners
            .iter()
            .copied()
            .filter(|corner| !corner.touches(*side))
            .collect();
        if let [corner] = far.as_slice() {
            return Some(TileVariant::EdgeWithCorner {
                side: *side,
                corner: *corner,
            });
        }
    }

    if let [a, b] = sides.as_slice() {
        if let Some(corner) = Corner::between(*a, *b) {
            return Some(TileVariant::InnerCorner { corner });
        }
    }

    if sides.is_empty() {
        return corners
            .first()
            .map(|corner| TileVariant::OuterCorner { corner: *corner });
    }

    sides.first().map(|side| TileVariant::Edge { side: *side })
}

pub fn base_variant(x: i32, y: i32) -> TileVariant {
    let mut h = (x as u32).wrapping_mul(0x9e37_79b1) ^ (y as u32).wrapping_mul(0x85eb_ca77);
    h ^= h >> 15;
    h = h.wrapping_mul(0x2c1b_3c6d);
    h ^= h >> 12;
    TileVariant::Base {
        index: (h % BASE_VARIANT_COUNT as u32) as u8,
    }
}

/// Rendering variant of the tile at `(x, y)` whose type is `tile_type`.
pub fn classify(x: i32, y: i32, tile_type: TileType, grid: &TileGrid) -> TileVariant {
    if tile_type != TileType::Green {
        return base_variant(x, y);
    }
    let hood = Neighbourhood::read(grid, x, y, tile_type);
    match_edge_pattern(&hood).unwrap_or_else(|| base_variant(x, y))
}

#[derive(Clone, Debug, PartialEq)]
pub struct TileGrid {
    width: i32,
    height: i32,
    cells: Vec<TileType>,
}

impl TileGrid {
    pub fn new(width: i32, height: i32, fill: impl Fn(i32, i32) -> TileType) -> Self {
        let width = width.max(0);
        let height = height.max(0);
        let mut cells = Vec::with_capacity(width as usize * height as usize);
        for y in 0..height {
            for x in 0..width {
                cells.push(fill(x, y));
            }
        }
        Self {
            width,
            height,
            cells,
        }
    }

    /// Left half gray, right half green.
    pub fn split(width: i32, height: i32) -> Self {
        Self::new(width, height, |x, _| {
            if x < width / 2 {
                TileType::Gray
            } else {
                TileType::Green
            }
        })
    }

    /// Rebuilds a grid from its wire form. The header must agree with the
    /// rows actually sent and stay under [`MAX_TILE_MAP_CELLS`].
    pub fn from_view(view: &TileMapView) -> Result<Self, ProtocolError> {
        let dimensions = usize::try_from(view.width)
            .ok()
            .zip(usize::try_from(view.height).ok())
            .filter(|(width, height)| {
                width
                    .checked_mul(*height)
                    .is_some_and(|cells| cells <= MAX_TILE_MAP_CELLS)
            });
        let Some((width, height)) = dimensions else {
            return Err(ProtocolError::TileMapDimensions {
                width: view.width,
                height: view.height,
            });
        };
        if view.tiles.len() != height || view.tiles.iter().any(|row| row.len() != width) {
            return Err(ProtocolError::TileMapShape {
                width: view.width,
                height: view.height,
                rows: view.tiles.len(),
            });
        }
        Ok(Self {
            width: view.width,
            height: view.height,
            cells: view.tiles.iter().flatten().map(|tile| tile.tile_type).collect(),
        })
    }

    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn height(&self) -> i32 {
        self.height
    }

    fn index(&self, x: i32, y: i32) -> Option<usize> {
        if x < 0 || y < 0 || x >= self.width || y >= self.height {
            return None;
        }
        Some((y * self.width + x) as usize)
    }

    pub fn get(&self, x: i32, y: i32) -> Option<TileType> {
        self.index(x, y).map(|idx| self.cells[idx])
    }

    /// Returns `true` when the stored type actually changed.
    pub fn set(&mut self, x: i32, y: i32, tile_type: TileType) -> bool {
        let Some(idx) = self.index(x, y) else {
            return false;
        };
        let changed = self.cells[idx] != tile_type;
        self.cells[idx] = tile_type;
        changed
    }

    pub fn count(&self, tile_type: TileType) -> usize {
        self.cells.iter().filter(|cell| **cell == tile_type).count()
    }

    pub fn tile_at_world(&self, world_x: f32, world_y: f32) -> Option<(i32, i32)> {
        if !world_x.is_finite() || !world_y.is_finite() || world_x < 0.0 || world_y < 0.0 {
            return None;
        }
        let x = (world_x / TILE_SIZE as f32).floor() as i32;
        let y = (world_y / TILE_SIZE as f32).floor() as i32;
        self.index(x, y).map(|_| (x, y))
    }

    pub fn to_view(&self) -> TileMapView {
        let tiles = (0..self.height)
            .map(|y| {
                (0..self.width)
                    .map(|x| TileView {
                        tile_type: self.cells[(y * self.width + x) as usize],
                        world_x: x * TILE_SIZE,
                        world_y: y * TILE_SIZE,
                    })
                    .collect()
            })
            .collect();
        TileMapView {
            width: self.width,
            height: self.height,
            tiles,
        }
    }
}

/// Tile grid plus the cached variant of every tile.
#[derive(Clone, Debug)]
pub struct ClassifiedMap {
    grid: TileGrid,
    variants: Vec<TileVariant>,
}

impl ClassifiedMap {
    pub fn new(grid: TileGrid) -> Self {
        let mut map = Self {
            variants: Vec::with_capacity(grid.cells.len()),
            grid,
        };
        for y in 0..map.grid.height {
            for x in 0..map.grid.width {
                let tile_type = map.grid.cells[(y * map.grid.width + x) as usize];
                map.variants.push(classify(x, y, tile_type, &map.grid));
            }
        }
        map
    }

    pub fn grid(&self) -> &TileGrid {
        &self.grid
    }

    pub fn variant(&self, x: i32, y: i32) -> Option<TileVariant> {
        self.grid.index(x, y).map(|idx| self.variants[idx])
    }

    /// Changes one tile and reclassifies it and its eight neighbours.
    /// Returns the number of tiles whose variant changed.
    pub fn set_tile(&mut self, x: i32, y: i32, tile_type: TileType) -> usize {
        if self.grid.index(x, y).is_none() {
            return 0;
        }
        self.grid.set(x, y, tile_type);
        let mut changed = 0;
        for dy in -1..=1 {
            for dx in -1..=1 {
                if self.reclassify(x + dx, y + dy) {
                    changed += 1;
                }
            }
        }
        changed
    }

    fn reclassify(&mut self, x: i32, y: i32) -> bool {
        let Some(idx) = self.grid.index(x, y) else {
            return false;
        };
        let next = classify(x, y, self.grid.cells[idx], &self.grid);
        let changed = self.variants[idx] != next;
        self.variants[idx] = next;
        changed
    }
}
