//! Agent records shared by the scheduler, the grid and the behaviors.

use crate::grid::Position;
use crate::hotspot::{HotspotCell, HotspotKind};
use crate::offender::Offender;
use crate::victim::Victim;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique agent identifier.
///
/// Identifiers are handed out in increasing order, so sorting by id
/// reproduces registration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AgentId(pub u64);

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AgentKind {
    Offender(Offender),
    Victim(Victim),
    /// Marker holding the destination of exactly one victim.
    SafeLocation,
    HotspotCell(HotspotCell),
}

/// Agent registered in the simulation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    pub pos: Position,
    pub kind: AgentKind,
}

impl Agent {
    pub fn new(pos: Position, kind: AgentKind) -> Self {
        Self { pos, kind }
    }

    pub fn is_victim(&self) -> bool {
        matches!(self.kind, AgentKind::Victim(_))
    }

    pub fn is_offender(&self) -> bool {
        matches!(self.kind, AgentKind::Offender(_))
    }

    pub fn hotspot_cell(&self) -> Option<&HotspotCell> {
        match &self.kind {
            AgentKind::HotspotCell(cell) => Some(cell),
            _ => None,
        }
    }
}

/// Display label of an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AgentLabel {
    Offender,
    Victim,
    SafeLocation,
    CrimeArea,
    CrimeAttractor,
}

/// Read-only view of a live agent for rendering and snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentView {
    pub id: AgentId,
    pub label: AgentLabel,
    pub pos: Position,
    /// Fear of a victim or reputation of a hotspot cell.
    pub value: Option<f64>,
}

impl AgentView {
    pub fn new(id: AgentId, agent: &Agent) -> Self {
        let (label, value) = match &agent.kind {
            AgentKind::Offender(_) => (AgentLabel::Offender, None),
            AgentKind::Victim(victim) => (AgentLabel::Victim, Some(victim.fear)),
            AgentKind::SafeLocation => (AgentLabel::SafeLocation, None),
            AgentKind::HotspotCell(cell) => match cell.kind {
                HotspotKind::Static => (AgentLabel::CrimeArea, Some(cell.reputation)),
                HotspotKind::Dynamic => (AgentLabel::CrimeAttractor, Some(cell.reputation)),
            },
        };
        Self {
            id,
            label,
            pos: agent.pos,
            value,
        }
    }
}
