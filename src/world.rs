use crate::grid::{Grid, Position};
use crate::hotspot::{Hotspot, HotspotId};
use crate::light::LightField;
use crate::model::{Agent, AgentId, AgentKind, AgentView};
use crate::schedule::Scheduler;
use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Shared simulation state mutated by the agent behaviors.
///
/// Every registered agent lives both in the scheduler and in the grid cell of
/// its position; the methods here keep the two in sync.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct World {
    pub grid: Grid,
    pub light: LightField,
    pub schedule: Scheduler,
    pub hotspots: BTreeMap<HotspotId, Hotspot>,
    pub(crate) next_hotspot_id: u64,
}

impl World {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            grid: Grid::new(width, height),
            light: LightField::new(width, height),
            schedule: Scheduler::new(),
            hotspots: BTreeMap::new(),
            next_hotspot_id: 0,
        }
    }

    pub fn spawn(&mut self, agent: Agent) -> Result<AgentId> {
        let pos = agent.pos;
        if !self.grid.contains(pos) {
            bail!("cannot spawn agent outside the grid at {pos}");
        }
        let id = self.schedule.add(agent);
        self.grid.place(id, pos)?;
        Ok(id)
    }

    pub fn agent(&self, id: AgentId) -> Option<&Agent> {
        self.schedule.get(id)
    }

    pub fn position(&self, id: AgentId) -> Result<Position> {
        let agent = self
            .schedule
            .get(id)
            .with_context(|| format!("agent {id} is not registered"))?;
        Ok(agent.pos)
    }

    pub fn move_agent(&mut self, id: AgentId, to: Position) -> Result<()> {
        let agent = self
            .schedule
            .get_mut(id)
            .with_context(|| format!("agent {id} is not registered"))?;
        self.grid.move_agent(id, agent.pos, to)?;
        agent.pos = to;
        Ok(())
    }

    pub fn remove_agent(&mut self, id: AgentId) -> Result<Agent> {
        let agent = self
            .schedule
            .remove(id)
            .with_context(|| format!("agent {id} is not registered"))?;
        self.grid.remove(id, agent.pos)?;
        Ok(agent)
    }

    /// Remove a victim together with the safe location it owns.
    pub fn remove_victim(&mut self, id: AgentId) -> Result<()> {
        let agent = self.remove_agent(id)?;
        let AgentKind::Victim(victim) = agent.kind else {
            bail!("agent {id} is not a victim");
        };
        self.remove_agent(victim.safe_location)
            .context("failed to remove safe location")?;
        Ok(())
    }

    /// Agents occupying `positions` together with their ids.
    pub fn agents_at(&self, positions: &[Position]) -> Vec<(AgentId, &Agent)> {
        self.grid
            .cell_contents(positions)
            .into_iter()
            .filter_map(|id| self.schedule.get(id).map(|agent| (id, agent)))
            .collect()
    }

    /// Positions and reputations of hotspot cells in a neighborhood.
    pub fn hotspot_cells_near(
        &self,
        pos: Position,
        radius: usize,
        include_center: bool,
    ) -> Vec<(Position, f64)> {
        let poss = self.grid.neighborhood(pos, radius, include_center);
        self.agents_at(&poss)
            .into_iter()
            .filter_map(|(_, agent)| agent.hotspot_cell().map(|cell| (agent.pos, cell.reputation)))
            .collect()
    }

    pub fn count_victims(&self) -> usize {
        self.schedule.iter().filter(|(_, a)| a.is_victim()).count()
    }

    pub fn count_offenders(&self) -> usize {
        self.schedule.iter().filter(|(_, a)| a.is_offender()).count()
    }

    pub fn views(&self) -> impl Iterator<Item = AgentView> + '_ {
        self.schedule.iter().map(|(id, agent)| AgentView::new(id, agent))
    }
}
