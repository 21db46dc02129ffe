//! Crime hotspots.
//!
//! A hotspot covers the Moore neighborhood of its centroid and is materialised
//! as one [`HotspotCell`] agent per covered cell. The reputation of a cell
//! falls off with the rounded Euclidean distance to the centroid.
//!
//! Static hotspots (crime areas) keep their cells forever. Dynamic hotspots
//! (crime attractors) are spawned where crimes happen: their cells lose a
//! fixed share of their initial reputation every tick and overlapping
//! attractors are merged into one.

use crate::grid::{Position, rounded_euclidean_distance};
use crate::model::{Agent, AgentId, AgentKind};
use crate::utils::{draw_rounded, round3};
use crate::world::World;
use anyhow::{Context, Result};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Share of its initial reputation an attractor cell loses per tick.
pub const ATTRACTOR_DECAY: f64 = 0.15;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct HotspotId(pub u64);

impl fmt::Display for HotspotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "H{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HotspotKind {
    /// Crime area: fixed reputation, never merges.
    Static,
    /// Crime attractor: decaying reputation, merges on overlap.
    Dynamic,
}

impl HotspotKind {
    fn decay_per_tick(self, reputation: f64) -> f64 {
        match self {
            HotspotKind::Static => 0.0,
            HotspotKind::Dynamic => reputation * ATTRACTOR_DECAY,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hotspot {
    pub kind: HotspotKind,
    pub centroid: Position,
    pub radius: usize,
    /// Reputation at the centroid.
    pub reputation: f64,
    /// Cell agents owned by this hotspot.
    pub cells: Vec<AgentId>,
}

impl Hotspot {
    fn new(kind: HotspotKind, centroid: Position, radius: usize, reputation: f64) -> Self {
        Self {
            kind,
            centroid,
            radius,
            reputation,
            cells: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellFate {
    Active,
    Expired,
}

/// A single grid cell covered by a hotspot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HotspotCell {
    pub hotspot: HotspotId,
    pub kind: HotspotKind,
    pub reputation: f64,
    /// Reputation lost per tick.
    pub decay: f64,
}

impl HotspotCell {
    pub fn new(
        hotspot: HotspotId,
        kind: HotspotKind,
        centroid_reputation: f64,
        centroid: Position,
        pos: Position,
    ) -> Self {
        let reputation = cell_reputation(centroid_reputation, centroid, pos);
        Self {
            hotspot,
            kind,
            reputation,
            decay: kind.decay_per_tick(reputation),
        }
    }

    /// Apply one tick of the reputation policy of this cell's kind.
    pub fn age(&mut self) -> CellFate {
        if self.kind == HotspotKind::Static {
            return CellFate::Active;
        }
        self.reputation -= self.decay;
        if self.reputation <= 0.0 {
            CellFate::Expired
        } else {
            CellFate::Active
        }
    }
}

/// Reputation of `pos` in a hotspot centred on `centroid`.
pub fn cell_reputation(centroid_reputation: f64, centroid: Position, pos: Position) -> f64 {
    let dist = rounded_euclidean_distance(centroid, pos);
    round3(centroid_reputation / (dist + 1) as f64)
}

/// Draw the reputation of a new hotspot centroid.
pub fn draw_reputation<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    draw_rounded(rng, 0.5, 1.0)
}

impl World {
    /// Create a crime area and register its cells permanently.
    pub fn spawn_crime_area<R: Rng + ?Sized>(
        &mut self,
        centroid: Position,
        radius: usize,
        rng: &mut R,
    ) -> Result<HotspotId> {
        let reputation = draw_reputation(rng);
        let hotspot = Hotspot::new(HotspotKind::Static, centroid, radius, reputation);
        self.lay_hotspot(hotspot)
    }

    /// Create a crime attractor, merging it with every attractor it overlaps.
    pub fn spawn_attractor<R: Rng + ?Sized>(
        &mut self,
        centroid: Position,
        radius: usize,
        rng: &mut R,
    ) -> Result<HotspotId> {
        let reputation = draw_reputation(rng);
        let mut hotspot = Hotspot::new(HotspotKind::Dynamic, centroid, radius, reputation);

        // Merging moves the centroid and grows the radius, which can reach
        // further attractors, so repeat until nothing overlaps. Each round
        // removes at least one attractor.
        loop {
            let overlapping = self.overlapping_attractors(&hotspot);
            if overlapping.is_empty() {
                break;
            }
            self.absorb(&mut hotspot, &overlapping)
                .context("failed to merge attractors")?;
        }

        self.lay_hotspot(hotspot)
    }

    fn overlapping_attractors(&self, hotspot: &Hotspot) -> BTreeSet<HotspotId> {
        let poss = self
            .grid
            .neighborhood(hotspot.centroid, hotspot.radius.saturating_add(1), true);
        self.agents_at(&poss)
            .into_iter()
            .filter_map(|(_, agent)| agent.hotspot_cell())
            .filter(|cell| cell.kind == HotspotKind::Dynamic)
            .map(|cell| cell.hotspot)
            .collect()
    }

    fn absorb(&mut self, hotspot: &mut Hotspot, absorbed: &BTreeSet<HotspotId>) -> Result<()> {
        let mut sum_x = hotspot.centroid.x;
        let mut sum_y = hotspot.centroid.y;
        let mut n = 1;

        for &other_id in absorbed {
            let other = self
                .hotspots
                .remove(&other_id)
                .with_context(|| format!("unknown attractor {other_id}"))?;

            sum_x += other.centroid.x;
            sum_y += other.centroid.y;
            n += 1;
            hotspot.radius = hotspot.radius.saturating_add(other.radius);
            hotspot.reputation = hotspot.reputation.max(other.reputation);

            for cell_id in other.cells {
                self.remove_agent(cell_id)?;
            }
        }

        hotspot.centroid = Position::new(sum_x / n, sum_y / n);
        log::debug!(
            "merged {} attractors into centroid {} with radius {}",
            absorbed.len() + 1,
            hotspot.centroid,
            hotspot.radius
        );
        Ok(())
    }

    fn lay_hotspot(&mut self, mut hotspot: Hotspot) -> Result<HotspotId> {
        let id = HotspotId(self.next_hotspot_id);
        self.next_hotspot_id += 1;

        let poss = self
            .grid
            .neighborhood(hotspot.centroid, hotspot.radius, true);
        for pos in poss {
            let cell = HotspotCell::new(id, hotspot.kind, hotspot.reputation, hotspot.centroid, pos);
            let cell_id = self.spawn(Agent::new(pos, AgentKind::HotspotCell(cell)))?;
            hotspot.cells.push(cell_id);
        }

        self.hotspots.insert(id, hotspot);
        Ok(id)
    }

    /// Advance one hotspot cell by one tick, dropping it once expired.
    pub fn step_hotspot_cell(&mut self, id: AgentId, mut cell: HotspotCell) -> Result<()> {
        match cell.age() {
            CellFate::Active => {
                if let Some(agent) = self.schedule.get_mut(id) {
                    agent.kind = AgentKind::HotspotCell(cell);
                }
            }
            CellFate::Expired => {
                self.remove_agent(id)?;
                if let Some(owner) = self.hotspots.get_mut(&cell.hotspot) {
                    owner.cells.retain(|&cell_id| cell_id != id);
                    if owner.cells.is_empty() {
                        self.hotspots.remove(&cell.hotspot);
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha12Rng;

    fn cells_of(world: &World, id: HotspotId) -> Vec<HotspotCell> {
        world.hotspots[&id]
            .cells
            .iter()
            .filter_map(|&cell_id| world.agent(cell_id))
            .filter_map(|agent| agent.hotspot_cell().cloned())
            .collect()
    }

    fn age_all_cells(world: &mut World) {
        let cells: Vec<_> = world
            .schedule
            .iter()
            .filter_map(|(id, agent)| agent.hotspot_cell().map(|cell| (id, cell.clone())))
            .collect();
        for (id, cell) in cells {
            world.step_hotspot_cell(id, cell).unwrap();
        }
    }

    #[test]
    fn reputation_falls_off_with_distance() {
        let centroid = Position::new(5, 5);
        assert_eq!(cell_reputation(0.9, centroid, centroid), 0.9);
        assert_eq!(cell_reputation(0.9, centroid, Position::new(6, 6)), 0.45);
        assert_eq!(cell_reputation(0.9, centroid, Position::new(7, 5)), 0.3);
        assert_eq!(cell_reputation(1.0, centroid, Position::new(7, 7)), 0.25);
    }

    #[test]
    fn crime_area_covers_clipped_neighborhood() {
        let mut rng = ChaCha12Rng::seed_from_u64(1);
        let mut world = World::new(10, 10);
        let id = world
            .spawn_crime_area(Position::new(0, 0), 2, &mut rng)
            .unwrap();
        let hotspot = &world.hotspots[&id];
        assert_eq!(hotspot.cells.len(), 9);
        assert!((0.5..=1.0).contains(&hotspot.reputation));
        assert!(
            cells_of(&world, id)
                .iter()
                .all(|cell| cell.kind == HotspotKind::Static && cell.decay == 0.0)
        );
    }

    #[test]
    fn crime_areas_never_merge_or_decay() {
        let mut rng = ChaCha12Rng::seed_from_u64(2);
        let mut world = World::new(20, 20);
        world
            .spawn_crime_area(Position::new(5, 5), 3, &mut rng)
            .unwrap();
        world
            .spawn_crime_area(Position::new(6, 5), 3, &mut rng)
            .unwrap();
        for _ in 0..20 {
            age_all_cells(&mut world);
        }
        assert_eq!(world.hotspots.len(), 2);
        assert_eq!(world.schedule.len(), 2 * 49);
    }

    #[test]
    fn attractor_cells_decay_until_removed_at_first_non_positive_value() {
        let mut rng = ChaCha12Rng::seed_from_u64(3);
        let mut world = World::new(10, 10);
        let id = world
            .spawn_attractor(Position::new(4, 4), 1, &mut rng)
            .unwrap();
        let mut prev: Vec<_> = cells_of(&world, id).iter().map(|c| c.reputation).collect();
        assert_eq!(prev.len(), 9);

        // 1 - 6 * 0.15 > 0 but 1 - 7 * 0.15 <= 0.
        for _ in 0..6 {
            age_all_cells(&mut world);
            let reps: Vec<_> = cells_of(&world, id).iter().map(|c| c.reputation).collect();
            assert_eq!(reps.len(), 9);
            assert!(reps.iter().zip(&prev).all(|(now, before)| now <= before));
            assert!(reps.iter().all(|&rep| rep > 0.0));
            prev = reps;
        }

        age_all_cells(&mut world);
        assert!(world.hotspots.is_empty());
        assert_eq!(world.schedule.len(), 0);
    }

    #[test]
    fn overlapping_attractors_merge_into_one_region() {
        let mut rng = ChaCha12Rng::seed_from_u64(4);
        let mut world = World::new(30, 30);
        let a = world
            .spawn_attractor(Position::new(10, 10), 3, &mut rng)
            .unwrap();
        let rep_a = world.hotspots[&a].reputation;
        let b = world
            .spawn_attractor(Position::new(11, 10), 3, &mut rng)
            .unwrap();

        assert_eq!(world.hotspots.len(), 1);
        let merged = &world.hotspots[&b];
        assert_eq!(merged.kind, HotspotKind::Dynamic);
        assert_eq!(merged.centroid, Position::new(10, 10));
        assert_eq!(merged.radius, 6);
        assert!(merged.reputation >= rep_a);
        assert_eq!(merged.cells.len(), 13 * 13);
        assert_eq!(world.schedule.len(), 13 * 13);

        // The merged region covers both attractors.
        let covered: BTreeSet<_> = merged
            .cells
            .iter()
            .map(|&id| world.position(id).unwrap())
            .collect();
        for centroid in [Position::new(10, 10), Position::new(11, 10)] {
            for pos in world.grid.neighborhood(centroid, 3, true) {
                assert!(covered.contains(&pos));
            }
        }
    }

    #[test]
    fn merge_with_a_single_centroid_keeps_it() {
        let mut rng = ChaCha12Rng::seed_from_u64(5);
        let mut world = World::new(30, 30);
        let id = world
            .spawn_attractor(Position::new(3, 7), 1, &mut rng)
            .unwrap();
        assert_eq!(world.hotspots[&id].centroid, Position::new(3, 7));
        assert_eq!(world.hotspots[&id].radius, 1);
    }

    #[test]
    fn no_residual_overlap_after_merging() {
        let mut rng = ChaCha12Rng::seed_from_u64(6);
        let mut world = World::new(40, 40);
        for _ in 0..40 {
            let centroid = world.grid.random_position(&mut rng);
            world.spawn_attractor(centroid, 1, &mut rng).unwrap();
        }

        for (&id, hotspot) in &world.hotspots {
            let poss = world
                .grid
                .neighborhood(hotspot.centroid, hotspot.radius.saturating_add(1), true);
            for (_, agent) in world.agents_at(&poss) {
                if let Some(cell) = agent.hotspot_cell() {
                    assert_eq!(cell.hotspot, id);
                }
            }
        }
    }

    #[test]
    fn attractors_ignore_crime_areas_when_merging() {
        let mut rng = ChaCha12Rng::seed_from_u64(7);
        let mut world = World::new(20, 20);
        world
            .spawn_crime_area(Position::new(5, 5), 2, &mut rng)
            .unwrap();
        let id = world
            .spawn_attractor(Position::new(5, 5), 1, &mut rng)
            .unwrap();
        assert_eq!(world.hotspots.len(), 2);
        assert_eq!(world.hotspots[&id].radius, 1);
    }
}
