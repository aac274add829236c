//! World grid: O(1) insert/move/erase by id, O(k) range queries (§4.A).
//!
//! A dense 2D array of cells covering `[-DIM, DIM]` at `CELL_SIZE`
//! resolution, one flat `Vec` indexed by `y * side + x` rather than the
//! rebuild-every-frame `HashMap<GridCell, _>` broadphase grids common in
//! other engines (see e.g. gunship's collider grid in other_examples/): §4.A
//! asks for persistent O(1) membership updates as objects move tick to
//! tick, not a structure rebuilt from scratch each frame.

use glam::Vec3;

use crate::geom::{Bounds, CELL_SIZE, DIM};
use crate::ids::{FragId, ObjectId, StructId};

/// Cells per axis covering `[-DIM, DIM]`. `DIM = 2048`, `CELL_SIZE = 8`, so
/// this is `512`; written as a literal rather than derived from the float
/// constants to keep the grid's allocation size free of float-to-int const
/// casts.
pub const SIDE: usize = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellCoord {
    pub x: i32,
    pub y: i32,
}

impl CellCoord {
    fn clamp_to_grid(self) -> Self {
        let max = SIDE as i32 - 1;
        Self {
            x: self.x.clamp(0, max),
            y: self.y.clamp(0, max),
        }
    }

    fn index(self) -> usize {
        self.y as usize * SIDE + self.x as usize
    }
}

/// Inclusive span of cells, as returned by [`Grid::span`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellSpan {
    pub min: CellCoord,
    pub max: CellCoord,
}

impl CellSpan {
    pub fn iter(self) -> impl Iterator<Item = CellCoord> {
        let (min, max) = (self.min, self.max);
        (min.y..=max.y).flat_map(move |y| (min.x..=max.x).map(move |x| CellCoord { x, y }))
    }
}

#[derive(Debug, Clone, Default)]
struct Cell {
    structs: Vec<StructId>,
    objects: Vec<ObjectId>,
    frags: Vec<FragId>,
}

/// World-space x/y point to its grid cell, clamped to the grid's bounds.
fn world_to_cell(point: Vec3) -> CellCoord {
    CellCoord {
        x: ((point.x + DIM) / CELL_SIZE).floor() as i32,
        y: ((point.y + DIM) / CELL_SIZE).floor() as i32,
    }
    .clamp_to_grid()
}

pub struct Grid {
    cells: Vec<Cell>,
}

impl Grid {
    pub fn new() -> Self {
        Self {
            cells: vec![Cell::default(); SIDE * SIDE],
        }
    }

    /// The inclusive cell range whose union covers `bounds` expanded by
    /// `margin` (`getInters`).
    pub fn span(&self, bounds: Bounds, margin: f32) -> CellSpan {
        let expanded = bounds.expanded(margin);
        CellSpan {
            min: world_to_cell(expanded.mins),
            max: world_to_cell(expanded.maxs),
        }
    }

    pub fn insert_struct(&mut self, id: StructId, bounds: Bounds) {
        for coord in self.span(bounds, 0.0).iter() {
            self.cells[coord.index()].structs.push(id);
        }
    }

    pub fn erase_struct(&mut self, id: StructId, bounds: Bounds) {
        for coord in self.span(bounds, 0.0).iter() {
            self.cells[coord.index()].structs.retain(|&s| s != id);
        }
    }

    pub fn insert_object(&mut self, id: ObjectId, position: Vec3) {
        let cell = world_to_cell(position).index();
        self.cells[cell].objects.push(id);
    }

    pub fn erase_object(&mut self, id: ObjectId, position: Vec3) {
        let cell = world_to_cell(position).index();
        self.cells[cell].objects.retain(|&o| o != id);
    }

    /// Move an object, updating cell membership only if its cell changed.
    pub fn move_object(&mut self, id: ObjectId, from: Vec3, to: Vec3) {
        let from_cell = world_to_cell(from);
        let to_cell = world_to_cell(to);
        if from_cell == to_cell {
            return;
        }
        self.cells[from_cell.index()].objects.retain(|&o| o != id);
        self.cells[to_cell.index()].objects.push(id);
    }

    pub fn insert_frag(&mut self, id: FragId, position: Vec3) {
        let cell = world_to_cell(position).index();
        self.cells[cell].frags.push(id);
    }

    pub fn erase_frag(&mut self, id: FragId, position: Vec3) {
        let cell = world_to_cell(position).index();
        self.cells[cell].frags.retain(|&f| f != id);
    }

    /// Every struct id whose AABB touches any cell in `bounds` expanded by
    /// `margin`, deduplicated.
    pub fn structs_near(&self, bounds: Bounds, margin: f32) -> Vec<StructId> {
        let mut found = Vec::new();
        for coord in self.span(bounds, margin).iter() {
            for &id in &self.cells[coord.index()].structs {
                if !found.contains(&id) {
                    found.push(id);
                }
            }
        }
        found
    }

    /// Every object id in any cell touched by `bounds` expanded by `margin`.
    pub fn objects_near(&self, bounds: Bounds, margin: f32) -> Vec<ObjectId> {
        let mut found = Vec::new();
        for coord in self.span(bounds, margin).iter() {
            for &id in &self.cells[coord.index()].objects {
                if !found.contains(&id) {
                    found.push(id);
                }
            }
        }
        found
    }
}

impl Default for Grid {
    fn default() -> Self {
        Self::new()
    }
}
