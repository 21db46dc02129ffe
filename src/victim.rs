//! Victim agents.
//!
//! A victim walks home to its safe location. Hotspot cells within sight raise
//! its fear unless it already knows the area around home; a frightened victim
//! trades off several cues to pick a move away from danger.

use crate::grid::{Grid, Position, manhattan_distance};
use crate::light::LightField;
use crate::model::{AgentId, AgentKind};
use crate::utils::{draw_between, draw_rounded, round3};
use crate::world::World;
use anyhow::Result;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

pub const VICTIM_VISIBILITY: usize = 4;
pub const SAFE_AREA_PERIMETER: usize = 4;

/// Largest fear share lost per tick in a familiar area.
const FAMILIAR_FEAR_DECREASE: f64 = 0.1;
/// Largest fear share lost per move.
const MOVE_FEAR_DECREASE: f64 = 0.6;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Victim {
    /// Safe location agent owned by this victim.
    pub safe_location: AgentId,
    pub goal: Position,
    pub perception: f64,
    pub fear_susceptibility: f64,
    pub environmental_influence: f64,
    pub light_preference: f64,
    /// Not floored at zero.
    pub fear: f64,
    pub visibility: usize,
    pub safe_area_perimeter: usize,
}

/// Hotspot cell sensed by a victim.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Danger {
    pub reputation: f64,
    pub pos: Position,
}

impl Victim {
    pub fn new(
        safe_location: AgentId,
        goal: Position,
        perception: f64,
        fear_susceptibility: f64,
        light_preference: f64,
    ) -> Self {
        Self {
            safe_location,
            goal,
            perception,
            fear_susceptibility,
            environmental_influence: (fear_susceptibility + perception) / 2.0,
            light_preference,
            fear: 0.0,
            visibility: VICTIM_VISIBILITY,
            safe_area_perimeter: SAFE_AREA_PERIMETER,
        }
    }

    pub fn draw<R: Rng + ?Sized>(safe_location: AgentId, goal: Position, rng: &mut R) -> Self {
        let perception = draw_rounded(rng, 0.0, 1.0);
        let fear_susceptibility = draw_rounded(rng, 0.0, 1.0);
        let light_preference = draw_rounded(rng, 0.0, 1.0);
        Self::new(
            safe_location,
            goal,
            perception,
            fear_susceptibility,
            light_preference,
        )
    }

    /// Whether the area in sight overlaps the known perimeter around home.
    pub fn is_familiar(&self, pos: Position, grid: &Grid) -> bool {
        let known = grid.neighborhood(self.goal, self.safe_area_perimeter, false);
        let visible = grid.neighborhood(pos, self.visibility, false);
        known.iter().any(|p| visible.contains(p))
    }

    /// Hotspot cells in sight, not counting the victim's own cell.
    pub fn surrounding_danger(&self, pos: Position, world: &World) -> Vec<Danger> {
        world
            .hotspot_cells_near(pos, self.visibility, false)
            .into_iter()
            .map(|(pos, reputation)| Danger { reputation, pos })
            .collect()
    }

    /// Update fear from the danger in sight and return it.
    ///
    /// Fear rises in unfamiliar surroundings and fades in familiar ones.
    fn sense_danger<R: Rng + ?Sized>(&mut self, pos: Position, world: &World, rng: &mut R) -> Vec<Danger> {
        let danger = self.surrounding_danger(pos, world);
        if !danger.is_empty() {
            let mean_rep = mean_reputation(&danger);
            if !self.is_familiar(pos, &world.grid) {
                self.fear += mean_rep * self.environmental_influence;
            } else {
                self.fear -= self.fear * draw_between(rng, 0.0, FAMILIAR_FEAR_DECREASE);
            }
        }
        danger
    }

    pub fn step<R: Rng + ?Sized>(&mut self, id: AgentId, world: &mut World, rng: &mut R) -> Result<()> {
        let pos = world.position(id)?;

        if pos == self.goal {
            world.remove_victim(id)?;
            log::debug!("victim {id} reached its safe location at {pos}");
            return Ok(());
        }

        let danger = self.sense_danger(pos, world, rng);

        let roll = draw_between(rng, 0.0, 1.0);
        if !danger.is_empty() && self.fear > roll {
            self.flee(id, pos, &danger, world, rng)?;
        } else {
            self.move_towards(id, pos, self.goal, world, rng)?;
        }

        if let Some(agent) = world.schedule.get_mut(id) {
            agent.kind = AgentKind::Victim(self.clone());
        }
        Ok(())
    }

    /// Move to the neighbor closest to `target`.
    ///
    /// The first neighbor is the fallback when none is closer than the current
    /// position.
    fn move_towards<R: Rng + ?Sized>(
        &mut self,
        id: AgentId,
        pos: Position,
        target: Position,
        world: &mut World,
        rng: &mut R,
    ) -> Result<()> {
        let moves = world.grid.neighborhood(pos, 1, false);
        let Some(&first) = moves.first() else {
            return Ok(());
        };

        let mut best_dist = manhattan_distance(pos, target);
        let mut next = first;
        for &n_pos in &moves {
            let dist = manhattan_distance(target, n_pos);
            if dist < best_dist {
                best_dist = dist;
                next = n_pos;
            }
        }

        self.fear -= self.fear * draw_between(rng, 0.0, MOVE_FEAR_DECREASE);
        world.move_agent(id, next)
    }

    fn flee<R: Rng + ?Sized>(
        &mut self,
        id: AgentId,
        pos: Position,
        danger: &[Danger],
        world: &mut World,
        rng: &mut R,
    ) -> Result<()> {
        let moves = world.grid.neighborhood(pos, 1, false);
        let Some(next) = rank_flight(&moves, self.goal, danger, &world.light) else {
            return Ok(());
        };

        self.fear -= self.fear * draw_between(rng, 0.0, MOVE_FEAR_DECREASE);
        world.move_agent(id, next)
    }
}

/// Mean reputation of sensed danger. Callers only pass non-empty slices.
pub fn mean_reputation(danger: &[Danger]) -> f64 {
    let sum: f64 = danger.iter().map(|d| d.reputation).sum();
    round3(sum / danger.len() as f64)
}

fn by_value_then_pos(a: &(f64, Position), b: &(f64, Position)) -> Ordering {
    a.0.total_cmp(&b.0).then(a.1.cmp(&b.1))
}

fn rank_of<T>(ranking: &[(T, Position)], pos: Position) -> Option<usize> {
    ranking.iter().position(|(_, p)| *p == pos).map(|idx| idx + 1)
}

/// Pick a move away from danger by summing four rankings of the candidates.
///
/// Candidates are ranked by ascending distance to `goal`, descending distance
/// to the nearest danger cell, ascending reputation of the candidate cell and
/// ascending illuminance. Candidates without a light reading are left out of
/// the light ranking and add nothing for it. The smallest rank sum wins; ties
/// go to the candidate listed first in the goal ranking.
pub fn rank_flight(
    moves: &[Position],
    goal: Position,
    danger: &[Danger],
    light: &LightField,
) -> Option<Position> {
    let mut by_goal: Vec<(usize, Position)> = moves
        .iter()
        .map(|&m| (manhattan_distance(m, goal), m))
        .collect();
    by_goal.sort();

    let mut by_danger_dist: Vec<(usize, Position)> = moves
        .iter()
        .map(|&m| {
            let min_dist = danger
                .iter()
                .map(|d| manhattan_distance(m, d.pos))
                .min()
                .unwrap_or(usize::MAX);
            (min_dist, m)
        })
        .collect();
    by_danger_dist.sort_by(|a, b| b.cmp(a));

    let mut by_reputation: Vec<(f64, Position)> = moves
        .iter()
        .map(|&m| {
            let rep = danger
                .iter()
                .find(|d| d.pos == m)
                .map_or(0.0, |d| d.reputation);
            (rep, m)
        })
        .collect();
    by_reputation.sort_by(by_value_then_pos);

    let mut by_light: Vec<(f64, Position)> = moves
        .iter()
        .filter_map(|&m| light.illuminance(m).map(|lum| (lum, m)))
        .collect();
    by_light.sort_by(by_value_then_pos);

    let mut best: Option<(usize, Position)> = None;
    for (goal_idx, &(_, m)) in by_goal.iter().enumerate() {
        let rank_sum = goal_idx
            + 1
            + rank_of(&by_danger_dist, m).unwrap_or(0)
            + rank_of(&by_reputation, m).unwrap_or(0)
            + rank_of(&by_light, m).unwrap_or(0);
        if best.is_none_or(|(best_sum, _)| rank_sum < best_sum) {
            best = Some((rank_sum, m));
        }
    }
    best.map(|(_, m)| m)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Agent;
    use rand::SeedableRng;
    use rand_chacha::ChaCha12Rng;

    fn place_victim(world: &mut World, pos: Position, goal: Position) -> (AgentId, Victim) {
        let safe = world
            .spawn(Agent::new(goal, AgentKind::SafeLocation))
            .unwrap();
        let victim = Victim::new(safe, goal, 0.5, 0.5, 0.5);
        let id = world
            .spawn(Agent::new(pos, AgentKind::Victim(victim.clone())))
            .unwrap();
        (id, victim)
    }

    fn danger_at(x: usize, y: usize, reputation: f64) -> Danger {
        Danger {
            reputation,
            pos: Position::new(x, y),
        }
    }

    #[test]
    fn environmental_influence_is_trait_mean() {
        let victim = Victim::new(AgentId(0), Position::new(0, 0), 0.2, 0.6, 0.1);
        assert!((victim.environmental_influence - 0.4).abs() < 1e-12);
        assert_eq!(victim.fear, 0.0);
    }

    #[test]
    fn familiarity_needs_overlapping_perimeters() {
        let grid = Grid::new(20, 20);
        let victim = Victim::new(AgentId(0), Position::new(0, 0), 0.5, 0.5, 0.5);
        assert!(!victim.is_familiar(Position::new(9, 9), &grid));
        assert!(victim.is_familiar(Position::new(8, 8), &grid));
    }

    #[test]
    fn mean_reputation_is_rounded() {
        let danger = [danger_at(0, 0, 0.5), danger_at(1, 0, 0.25), danger_at(2, 0, 0.3333)];
        assert_eq!(mean_reputation(&danger), 0.361);
    }

    #[test]
    fn flight_trades_off_all_four_rankings() {
        let grid = Grid::new(10, 10);
        let light = LightField::new(10, 10);
        let moves = grid.neighborhood(Position::new(5, 5), 1, false);
        let danger = [danger_at(6, 5, 0.5)];

        // Heading straight home would step onto the danger cell.
        let next = rank_flight(&moves, Position::new(9, 5), &danger, &light);
        assert_eq!(next, Some(Position::new(4, 4)));
    }

    #[test]
    fn flight_skips_missing_light_and_breaks_ties_by_goal_order() {
        let grid = Grid::new(10, 10);
        let light = LightField::new(5, 5);
        let moves = grid.neighborhood(Position::new(5, 5), 1, false);
        let danger = [danger_at(6, 5, 0.5)];

        // (4,5) and (4,4) tie on rank sum; (4,5) is closer to home.
        let next = rank_flight(&moves, Position::new(9, 5), &danger, &light);
        assert_eq!(next, Some(Position::new(4, 5)));
    }

    #[test]
    fn moves_towards_target_or_falls_back_to_first_neighbor() {
        let mut rng = ChaCha12Rng::seed_from_u64(21);
        let mut world = World::new(10, 10);
        let (id, mut victim) = place_victim(&mut world, Position::new(5, 5), Position::new(9, 9));

        victim
            .move_towards(id, Position::new(5, 5), Position::new(9, 9), &mut world, &mut rng)
            .unwrap();
        assert_eq!(world.position(id).unwrap(), Position::new(6, 6));

        // Already on the target: no neighbor is closer.
        victim
            .move_towards(id, Position::new(6, 6), Position::new(6, 6), &mut world, &mut rng)
            .unwrap();
        assert_eq!(world.position(id).unwrap(), Position::new(5, 5));
    }

    #[test]
    fn victim_walks_home_monotonically_and_leaves() {
        let mut rng = ChaCha12Rng::seed_from_u64(22);
        let mut world = World::new(10, 10);
        let goal = Position::new(9, 9);
        let (id, mut victim) = place_victim(&mut world, Position::new(0, 0), goal);

        let mut dist = manhattan_distance(Position::new(0, 0), goal);
        let mut ticks = 0;
        while world.agent(id).is_some() {
            ticks += 1;
            assert!(ticks <= 18, "victim did not reach home in time");
            victim.step(id, &mut world, &mut rng).unwrap();
            if let Some(agent) = world.agent(id) {
                let now = manhattan_distance(agent.pos, goal);
                assert!(now < dist);
                dist = now;
            }
        }
        assert_eq!(ticks, 10);
        assert_eq!(world.schedule.len(), 0);
    }

    #[test]
    fn unfamiliar_danger_raises_fear() {
        let mut rng = ChaCha12Rng::seed_from_u64(23);
        let mut world = World::new(20, 20);
        let area = world
            .spawn_crime_area(Position::new(10, 10), 0, &mut rng)
            .unwrap();
        let rep = world.hotspots[&area].reputation;
        let (id, mut victim) = place_victim(&mut world, Position::new(11, 11), Position::new(0, 19));

        victim.step(id, &mut world, &mut rng).unwrap();

        // Raised by rep * 0.5, then lowered by at most 60% on the move.
        assert!(victim.fear <= rep * 0.5 + 1e-12);
        assert!(victim.fear >= rep * 0.5 * 0.4 - 1e-12);
        assert_ne!(world.position(id).unwrap(), Position::new(11, 11));
    }

    #[test]
    fn familiar_danger_lowers_fear() {
        let mut rng = ChaCha12Rng::seed_from_u64(25);
        let mut world = World::new(20, 20);
        world
            .spawn_crime_area(Position::new(10, 10), 0, &mut rng)
            .unwrap();
        let pos = Position::new(11, 11);
        let (_, mut victim) = place_victim(&mut world, pos, Position::new(14, 14));
        assert!(victim.is_familiar(pos, &world.grid));

        victim.fear = 0.5;
        let danger = victim.sense_danger(pos, &world, &mut rng);
        assert_eq!(danger.len(), 1);
        assert!(victim.fear <= 0.5);
        assert!(victim.fear >= 0.5 * (1.0 - FAMILIAR_FEAR_DECREASE) - 1e-12);
    }

    #[test]
    fn victim_ignores_danger_on_its_own_cell() {
        let mut rng = ChaCha12Rng::seed_from_u64(24);
        let mut world = World::new(20, 20);
        world
            .spawn_crime_area(Position::new(10, 10), 0, &mut rng)
            .unwrap();
        let (_, victim) = place_victim(&mut world, Position::new(10, 10), Position::new(0, 19));
        assert!(victim.surrounding_danger(Position::new(10, 10), &world).is_empty());
        assert_eq!(
            victim.surrounding_danger(Position::new(11, 10), &world),
            vec![Danger {
                reputation: world.hotspots.values().next().unwrap().reputation,
                pos: Position::new(10, 10),
            }]
        );
    }
}
