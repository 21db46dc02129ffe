//! Offender agents.
//!
//! Every tick an offender weighs its criminal motive against two random rolls.
//! A motivated offender chases the nearest visible victim and commits a crime
//! when it reaches the victim's cell; otherwise it drifts towards crime
//! hotspots or roams at random.

use crate::engine::CrimeCounter;
use crate::grid::{Grid, Position, manhattan_distance};
use crate::model::{AgentId, AgentKind};
use crate::utils::{draw_between, draw_rounded};
use crate::world::World;
use anyhow::{Context, Result};
use rand::{Rng, seq::IndexedRandom};
use serde::{Deserialize, Serialize};

pub const OFFENDER_VISIBILITY: usize = 5;

/// Largest fulfillment share lost per tick while chasing.
const CHASE_DECREASE: f64 = 0.01;
/// Largest fulfillment lost per tick when roaming while motivated.
const MOTIVATED_ROAM_DECREASE: f64 = 0.01;
/// Largest fulfillment lost per tick when roaming without motive.
const IDLE_ROAM_DECREASE: f64 = 0.02;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Offender {
    /// Level of criminal fulfillment this offender is satisfied with.
    pub criminal_preference: f64,
    pub fulfillment: f64,
    /// Attraction towards crime hotspots.
    pub area_preference: f64,
    pub visibility: usize,
}

impl Offender {
    pub fn new(criminal_preference: f64, fulfillment: f64, area_preference: f64) -> Self {
        Self {
            criminal_preference,
            fulfillment,
            area_preference,
            visibility: OFFENDER_VISIBILITY,
        }
    }

    pub fn draw<R: Rng + ?Sized>(max_criminal_preference: f64, rng: &mut R) -> Self {
        let criminal_preference = draw_rounded(rng, 0.0, max_criminal_preference);
        let fulfillment = draw_rounded(rng, 0.0, 1.0);
        let area_preference = draw_rounded(rng, 0.0, 1.0);
        Self::new(criminal_preference, fulfillment, area_preference)
    }

    /// Propensity to commit a crime, damped by the area preference.
    ///
    /// Without visible crime the damping is the full area preference; with
    /// visible crime it shrinks as the nearest crime cell gets closer.
    pub fn motive_intensity(&self, nearest_crime_dist: Option<usize>) -> f64 {
        let motive = self.criminal_preference - self.fulfillment;
        match nearest_crime_dist {
            None => motive - motive * self.area_preference,
            Some(dist) => {
                let dist_factor = dist as f64 / (2 * self.visibility + 1) as f64;
                motive - motive * (dist_factor * self.area_preference)
            }
        }
    }

    /// Nearest visible victim, first found on distance ties.
    fn find_target(&self, pos: Position, world: &World) -> Option<(AgentId, Position)> {
        let poss = world.grid.neighborhood(pos, self.visibility, true);
        world
            .agents_at(&poss)
            .into_iter()
            .filter(|(_, agent)| agent.is_victim())
            .map(|(id, agent)| (id, agent.pos))
            .min_by_key(|&(_, victim_pos)| manhattan_distance(pos, victim_pos))
    }

    pub fn step<R: Rng + ?Sized>(
        &mut self,
        id: AgentId,
        world: &mut World,
        crimes: &mut CrimeCounter,
        hotspot_radius: usize,
        rng: &mut R,
    ) -> Result<()> {
        let pos = world.position(id)?;

        let nearest_crime = world
            .hotspot_cells_near(pos, self.visibility, true)
            .into_iter()
            .map(|(crime_pos, _)| (manhattan_distance(pos, crime_pos), crime_pos))
            .min();
        let motive = self.motive_intensity(nearest_crime.map(|(dist, _)| dist));

        let motivation_roll = draw_rounded(rng, 0.0, 1.0);
        let opportunity_roll = draw_rounded(rng, 0.0, 1.0);
        let target = self.find_target(pos, world);

        if motive > motivation_roll || (target.is_some() && motive > opportunity_roll) {
            match target {
                Some(target) => self
                    .chase(id, pos, target, world, crimes, hotspot_radius, rng)
                    .context("failed to chase victim")?,
                None => self.roam(id, pos, world, MOTIVATED_ROAM_DECREASE, rng)?,
            }
        } else {
            let roll = draw_rounded(rng, 0.0, 1.0);
            match nearest_crime {
                Some((_, crime_pos)) if self.area_preference > roll => {
                    let next = closest_move(&world.grid, pos, crime_pos);
                    world.move_agent(id, next)?;
                }
                _ => self.roam(id, pos, world, IDLE_ROAM_DECREASE, rng)?,
            }
        }

        if let Some(agent) = world.schedule.get_mut(id) {
            agent.kind = AgentKind::Offender(self.clone());
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn chase<R: Rng + ?Sized>(
        &mut self,
        id: AgentId,
        pos: Position,
        (victim_id, victim_pos): (AgentId, Position),
        world: &mut World,
        crimes: &mut CrimeCounter,
        hotspot_radius: usize,
        rng: &mut R,
    ) -> Result<()> {
        self.fulfillment -= self.fulfillment * draw_between(rng, 0.0, CHASE_DECREASE);

        let next = closest_move(&world.grid, pos, victim_pos);
        world.move_agent(id, next)?;
        if next != victim_pos {
            return Ok(());
        }

        world
            .remove_victim(victim_id)
            .context("failed to remove victim")?;
        self.fulfillment += draw_between(rng, 0.4, 1.0);
        crimes.record();
        world
            .spawn_attractor(next, hotspot_radius, rng)
            .context("failed to spawn crime attractor")?;
        log::debug!("offender {id} committed a crime against {victim_id} at {next}");

        Ok(())
    }

    fn roam<R: Rng + ?Sized>(
        &mut self,
        id: AgentId,
        pos: Position,
        world: &mut World,
        max_decrease: f64,
        rng: &mut R,
    ) -> Result<()> {
        self.fulfillment -= draw_between(rng, 0.0, max_decrease);

        let poss = world.grid.neighborhood(pos, 1, true);
        let &next = poss.choose(rng).context("empty neighborhood")?;
        world.move_agent(id, next)
    }
}

/// Cell of the 3x3 block around `from` closest to `to`, smallest position on ties.
fn closest_move(grid: &Grid, from: Position, to: Position) -> Position {
    grid.neighborhood(from, 1, true)
        .into_iter()
        .min_by_key(|&next| (manhattan_distance(next, to), next))
        .unwrap_or(from)
}
