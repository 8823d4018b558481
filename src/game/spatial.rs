//! Uniform-cell broad phase for ship and projectile proximity queries.
//!
//! The grid is rebuilt from scratch every tick, so there is no removal or
//! move operation. Queries return the 3x3 block of cells around a point,
//! which covers every possible contact as long as entity radii stay small
//! relative to the cell size.

use std::collections::HashMap;

use uuid::Uuid;

use super::vector::Vector2;

/// Smallest allowed cell size
pub const MIN_CELL_SIZE: f32 = 8.0;

#[derive(Debug, Default)]
struct Cell {
    ships: Vec<Uuid>,
    projectiles: Vec<Uuid>,
}

/// Spatial hash grid keyed by integer cell coordinates
#[derive(Debug)]
pub struct SpatialHashGrid {
    cell_size: f32,
    cells: HashMap<(i32, i32), Cell>,
}

impl SpatialHashGrid {
    pub fn new(cell_size: f32) -> Self {
        Self {
            cell_size: cell_size.max(MIN_CELL_SIZE),
            cells: HashMap::new(),
        }
    }

    pub fn cell_size(&self) -> f32 {
        self.cell_size
    }

    /// Convert world coordinates to cell coordinates
    #[inline]
    pub fn world_to_cell(&self, position: Vector2) -> (i32, i32) {
        (
            (position.x / self.cell_size).floor() as i32,
            (position.y / self.cell_size).floor() as i32,
        )
    }

    /// Drop every bucket (call once per tick before rebuilding)
    pub fn clear(&mut self) {
        self.cells.clear();
    }

    pub fn insert_ship(&mut self, id: Uuid, position: Vector2) {
        let cell = self.world_to_cell(position);
        self.cells.entry(cell).or_default().ships.push(id);
    }

    pub fn insert_projectile(&mut self, id: Uuid, position: Vector2) {
        let cell = self.world_to_cell(position);
        self.cells.entry(cell).or_default().projectiles.push(id);
    }

    /// Ships in the 3x3 neighbourhood of `position`
    pub fn ships_around(&self, position: Vector2) -> impl Iterator<Item = Uuid> + '_ {
        self.neighbourhood(position)
            .flat_map(|cell| cell.ships.iter().copied())
    }

    /// Projectiles in the 3x3 neighbourhood of `position`
    pub fn projectiles_around(&self, position: Vector2) -> impl Iterator<Item = Uuid> + '_ {
        self.neighbourhood(position)
            .flat_map(|cell| cell.projectiles.iter().copied())
    }

    fn neighbourhood(&self, position: Vector2) -> impl Iterator<Item = &Cell> + '_ {
        let (cx, cy) = self.world_to_cell(position);
        (-1..=1)
            .flat_map(move |dy| (-1..=1).map(move |dx| (cx + dx, cy + dy)))
            .filter_map(move |key| self.cells.get(&key))
    }
}

impl Default for SpatialHashGrid {
    fn default() -> Self {
        Self::new(64.0)
    }
}
