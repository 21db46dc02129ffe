use crate::model::{Agent, AgentId};
use rand::{Rng, seq::SliceRandom};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Registry of live agents with random-order activation.
///
/// Each tick the caller takes a shuffled snapshot of the registered ids and
/// activates them one at a time. Ids removed before their turn are skipped by
/// looking them up again, and agents registered mid-tick are not part of the
/// snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Scheduler {
    agents: BTreeMap<AgentId, Agent>,
    next_id: u64,
    steps: u64,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, agent: Agent) -> AgentId {
        let id = AgentId(self.next_id);
        self.next_id += 1;
        self.agents.insert(id, agent);
        id
    }

    pub fn remove(&mut self, id: AgentId) -> Option<Agent> {
        self.agents.remove(&id)
    }

    pub fn get(&self, id: AgentId) -> Option<&Agent> {
        self.agents.get(&id)
    }

    pub fn get_mut(&mut self, id: AgentId) -> Option<&mut Agent> {
        self.agents.get_mut(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (AgentId, &Agent)> {
        self.agents.iter().map(|(&id, agent)| (id, agent))
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    /// Completed ticks.
    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Registered ids in a random order drawn from `rng`.
    pub fn shuffled_snapshot<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<AgentId> {
        let mut ids: Vec<_> = self.agents.keys().copied().collect();
        ids.shuffle(rng);
        ids
    }

    pub fn advance(&mut self) {
        self.steps += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::Position;
    use crate::model::AgentKind;
    use rand::SeedableRng;
    use rand_chacha::ChaCha12Rng;

    fn marker() -> Agent {
        Agent::new(Position::new(0, 0), AgentKind::SafeLocation)
    }

    #[test]
    fn ids_follow_registration_order() {
        let mut sched = Scheduler::new();
        let a = sched.add(marker());
        let b = sched.add(marker());
        assert!(a < b);
        sched.remove(a);
        let c = sched.add(marker());
        assert!(b < c);
        assert_eq!(sched.len(), 2);
    }

    #[test]
    fn snapshot_is_a_permutation_fixed_by_seed() {
        let mut sched = Scheduler::new();
        for _ in 0..20 {
            sched.add(marker());
        }
        let order_a = sched.shuffled_snapshot(&mut ChaCha12Rng::seed_from_u64(3));
        let order_b = sched.shuffled_snapshot(&mut ChaCha12Rng::seed_from_u64(3));
        assert_eq!(order_a, order_b);

        let mut sorted = order_a.clone();
        sorted.sort();
        let ids: Vec<_> = sched.iter().map(|(id, _)| id).collect();
        assert_eq!(sorted, ids);
    }

    #[test]
    fn snapshot_excludes_later_registrations() {
        let mut sched = Scheduler::new();
        sched.add(marker());
        let order = sched.shuffled_snapshot(&mut ChaCha12Rng::seed_from_u64(0));
        let late = sched.add(marker());
        assert!(!order.contains(&late));
    }
}
