//! Bounded, non-wrapping, multi-occupancy grid.

use crate::model::AgentId;
use anyhow::{Result, bail};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Cell coordinates, `0 <= x < width` and `0 <= y < height`.
///
/// Ordered lexicographically by `(x, y)`; distance ties between candidate moves
/// are broken with this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "(usize, usize)", into = "(usize, usize)")]
pub struct Position {
    pub x: usize,
    pub y: usize,
}

impl Position {
    pub fn new(x: usize, y: usize) -> Self {
        Self { x, y }
    }
}

impl From<(usize, usize)> for Position {
    fn from((x, y): (usize, usize)) -> Self {
        Self { x, y }
    }
}

impl From<Position> for (usize, usize) {
    fn from(pos: Position) -> Self {
        (pos.x, pos.y)
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Sum of absolute coordinate differences.
///
/// Used by offender and victim decisions.
pub fn manhattan_distance(a: Position, b: Position) -> usize {
    a.x.abs_diff(b.x) + a.y.abs_diff(b.y)
}

/// Euclidean norm rounded to the nearest integer.
///
/// Used only for the reputation falloff of hotspot cells.
pub fn rounded_euclidean_distance(a: Position, b: Position) -> usize {
    let dx = a.x.abs_diff(b.x) as f64;
    let dy = a.y.abs_diff(b.y) as f64;
    dx.hypot(dy).round() as usize
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Grid {
    width: usize,
    height: usize,
    cells: Vec<Vec<AgentId>>,
}

impl Grid {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            cells: vec![Vec::new(); width * height],
        }
    }

    pub fn contains(&self, pos: Position) -> bool {
        pos.x < self.width && pos.y < self.height
    }

    fn index(&self, pos: Position) -> Result<usize> {
        if !self.contains(pos) {
            bail!(
                "position {pos} is outside the {}x{} grid",
                self.width,
                self.height
            );
        }
        Ok(pos.y * self.width + pos.x)
    }

    /// Moore neighborhood of `pos` at `radius`, clipped to the grid bounds.
    ///
    /// Positions are yielded row by row (`y` outer, `x` inner).
    pub fn neighborhood(&self, pos: Position, radius: usize, include_center: bool) -> Vec<Position> {
        let x_min = pos.x.saturating_sub(radius);
        let y_min = pos.y.saturating_sub(radius);
        let x_max = pos.x.saturating_add(radius).min(self.width.saturating_sub(1));
        let y_max = pos.y.saturating_add(radius).min(self.height.saturating_sub(1));
        if x_min > x_max || y_min > y_max {
            return Vec::new();
        }

        let mut poss = Vec::with_capacity((x_max - x_min + 1) * (y_max - y_min + 1));
        for y in y_min..=y_max {
            for x in x_min..=x_max {
                let n_pos = Position::new(x, y);
                if n_pos == pos && !include_center {
                    continue;
                }
                poss.push(n_pos);
            }
        }
        poss
    }

    /// Agents occupying `positions`, in position order then arrival order.
    pub fn cell_contents(&self, positions: &[Position]) -> Vec<AgentId> {
        positions
            .iter()
            .filter_map(|&pos| self.index(pos).ok())
            .flat_map(|idx| self.cells[idx].iter().copied())
            .collect()
    }

    pub fn place(&mut self, id: AgentId, pos: Position) -> Result<()> {
        let idx = self.index(pos)?;
        self.cells[idx].push(id);
        Ok(())
    }

    pub fn remove(&mut self, id: AgentId, pos: Position) -> Result<()> {
        let idx = self.index(pos)?;
        let cell = &mut self.cells[idx];
        let Some(i_agt) = cell.iter().position(|&other| other == id) else {
            bail!("agent {id} is not at {pos}");
        };
        cell.remove(i_agt);
        Ok(())
    }

    pub fn move_agent(&mut self, id: AgentId, from: Position, to: Position) -> Result<()> {
        // Validate the target before touching the source cell.
        self.index(to)?;
        self.remove(id, from)?;
        self.place(id, to)
    }

    pub fn random_position<R: Rng + ?Sized>(&self, rng: &mut R) -> Position {
        Position::new(
            rng.random_range(0..self.width),
            rng.random_range(0..self.height),
        )
    }
}
