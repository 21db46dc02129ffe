use crate::config::{Config, CrimeAreas};
use crate::model::{Agent, AgentId, AgentKind, AgentView};
use crate::offender::Offender;
use crate::victim::Victim;
use crate::world::World;
use anyhow::{Context, Result};
use rand::prelude::*;
use rand_chacha::ChaCha12Rng;
use rmp_serde::{decode, encode};
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, BufWriter, Write},
    path::Path,
};

/// Crimes committed during the current tick and since the start of the run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CrimeCounter {
    this_tick: usize,
    total: usize,
}

impl CrimeCounter {
    pub fn record(&mut self) {
        self.this_tick += 1;
        self.total += 1;
    }

    pub fn this_tick(&self) -> usize {
        self.this_tick
    }

    pub fn total(&self) -> usize {
        self.total
    }

    fn end_tick(&mut self) {
        self.this_tick = 0;
    }
}

/// Observables collected after every tick.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    /// Mean of `1 - fear` over live victims, `None` without victims.
    pub average_perception_of_safety: Option<f64>,
    /// Crimes of the last tick per 10 initial agents.
    pub crime_rate_per_tick: f64,
    /// Crimes since the start per 1000 people of the reference population.
    pub population_crime_rate: f64,
}

/// Record of the simulation at a single tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub tick: u64,
    pub metrics: Metrics,
    /// Crimes committed during this tick.
    pub n_crimes: usize,
    pub n_victims: usize,
    pub n_offenders: usize,
    pub n_hotspots: usize,
    /// Victims remain after this tick.
    pub running: bool,
    /// Live agents (optional).
    pub snapshot: Option<Vec<AgentView>>,
}

/// Simulation engine.
///
/// Owns the configuration, the world, the crime counter and the random number
/// generator, and provides methods to initialize, step, run, save and load
/// simulations.
#[derive(Serialize, Deserialize)]
pub struct Engine {
    cfg: Config,
    world: World,
    crimes: CrimeCounter,
    metrics: Metrics,
    running: bool,
    rng: ChaCha12Rng,
}

impl Engine {
    /// Create a new `Engine` with the given configuration and a random initial state.
    ///
    /// The generator is seeded from the configuration if a seed is given and
    /// from the OS otherwise.
    pub fn generate_initial_condition(cfg: Config) -> Result<Self> {
        let rng = match cfg.init.seed {
            Some(seed) => ChaCha12Rng::seed_from_u64(seed),
            None => ChaCha12Rng::try_from_os_rng()?,
        };
        Self::new(cfg, rng)
    }

    /// Build the world in order: light field, victims with their safe
    /// locations, offenders and crime areas.
    pub fn new(cfg: Config, mut rng: ChaCha12Rng) -> Result<Self> {
        cfg.validate().context("invalid configuration")?;
        let par = &cfg.model;

        let mut world = World::new(par.width, par.height);

        for _ in 0..par.n_victims {
            let goal = world.grid.random_position(&mut rng);
            let safe_location = world.spawn(Agent::new(goal, AgentKind::SafeLocation))?;

            let victim = Victim::draw(safe_location, goal, &mut rng);
            let pos = world.grid.random_position(&mut rng);
            world.spawn(Agent::new(pos, AgentKind::Victim(victim)))?;
        }

        for _ in 0..par.n_offenders {
            let offender = Offender::draw(par.max_criminal_preference, &mut rng);
            let pos = world.grid.random_position(&mut rng);
            world.spawn(Agent::new(pos, AgentKind::Offender(offender)))?;
        }

        let centroids = match &par.crime_areas {
            CrimeAreas::Count(n) => (0..*n)
                .map(|_| world.grid.random_position(&mut rng))
                .collect(),
            CrimeAreas::Centroids(centroids) => centroids.clone(),
        };
        for centroid in centroids {
            world
                .spawn_crime_area(centroid, par.crime_area_radius, &mut rng)
                .context("failed to add crime area")?;
        }

        let mut engine = Self {
            cfg,
            world,
            crimes: CrimeCounter::default(),
            metrics: Metrics {
                average_perception_of_safety: None,
                crime_rate_per_tick: 0.0,
                population_crime_rate: 0.0,
            },
            running: true,
            rng,
        };
        engine.metrics = engine.collect_metrics();

        Ok(engine)
    }

    pub fn cfg(&self) -> &Config {
        &self.cfg
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    /// Metrics of the last completed tick.
    pub fn metrics(&self) -> Metrics {
        self.metrics
    }

    /// Whether victims remained after the last tick.
    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn tick(&self) -> u64 {
        self.world.schedule.steps()
    }

    pub fn crimes(&self) -> &CrimeCounter {
        &self.crimes
    }

    pub fn agents(&self) -> impl Iterator<Item = AgentView> + '_ {
        self.world.views()
    }

    /// Run the simulation and save the resulting records to a binary file.
    ///
    /// Stops early once no victims remain.
    pub fn perform_simulation<P: AsRef<Path>>(&mut self, file: P) -> Result<()> {
        let file = file.as_ref();
        let file = File::create(file).with_context(|| format!("failed to create {file:?}"))?;
        let mut writer = BufWriter::new(file);

        let steps_per_file = self.cfg.output.steps_per_file;
        let steps_per_save = self.cfg.output.steps_per_save;

        for i_step in 0..steps_per_file {
            if !self.running {
                log::info!("no victims left, stopping at tick {}", self.tick());
                break;
            }

            let mut record = self.step().context("failed to perform step")?;

            if (i_step + 1) % steps_per_save == 0 {
                record.snapshot = Some(self.agents().collect());

                let progress = 100.0 * (i_step + 1) as f64 / steps_per_file as f64;
                log::info!("completed {progress:06.2}%");
            }

            encode::write(&mut writer, &record).context("failed to serialize record")?;
        }

        writer.flush().context("failed to flush writer stream")?;

        Ok(())
    }

    /// Save a checkpoint of the entire engine state.
    ///
    /// Can be used to resume the simulation later.
    pub fn save_checkpoint<P: AsRef<Path>>(&self, file: P) -> Result<()> {
        let file = file.as_ref();
        let file = File::create(file).with_context(|| format!("failed to create {file:?}"))?;
        let mut writer = BufWriter::new(file);
        encode::write(&mut writer, &self).context("failed to serialize engine")?;
        writer.flush().context("failed to flush writer stream")?;
        Ok(())
    }

    /// Load a previously saved engine checkpoint.
    pub fn load_checkpoint<P: AsRef<Path>>(file: P) -> Result<Self> {
        let file = file.as_ref();
        let file = File::open(file).with_context(|| format!("failed to open {file:?}"))?;
        let mut reader = BufReader::new(file);
        let engine = decode::from_read(&mut reader).context("failed to deserialize engine")?;
        Ok(engine)
    }

    /// Advance the simulation by one tick.
    pub fn step(&mut self) -> Result<Record> {
        // Activate every agent once, in random order.
        let order = self.world.schedule.shuffled_snapshot(&mut self.rng);
        for id in order {
            self.activate(id)
                .with_context(|| format!("failed to activate agent {id}"))?;
        }
        self.world.schedule.advance();

        self.metrics = self.collect_metrics();

        let n_victims = self.world.count_victims();
        if n_victims == 0 && self.running {
            self.running = false;
            log::info!("all victims left at tick {}", self.tick());
        }

        let record = Record {
            tick: self.tick(),
            metrics: self.metrics,
            n_crimes: self.crimes.this_tick(),
            n_victims,
            n_offenders: self.world.count_offenders(),
            n_hotspots: self.world.hotspots.len(),
            running: self.running,
            snapshot: None,
        };

        // The per-tick counter only covers the tick just finished.
        self.crimes.end_tick();

        Ok(record)
    }

    fn activate(&mut self, id: AgentId) -> Result<()> {
        // Agents removed earlier in this tick are skipped.
        let Some(agent) = self.world.agent(id).cloned() else {
            return Ok(());
        };

        match agent.kind {
            AgentKind::Offender(mut offender) => offender.step(
                id,
                &mut self.world,
                &mut self.crimes,
                self.cfg.model.hotspot_radius,
                &mut self.rng,
            ),
            AgentKind::Victim(mut victim) => victim.step(id, &mut self.world, &mut self.rng),
            AgentKind::SafeLocation => Ok(()),
            AgentKind::HotspotCell(cell) => self.world.step_hotspot_cell(id, cell),
        }
    }

    fn collect_metrics(&self) -> Metrics {
        let safety: Vec<f64> = self
            .world
            .schedule
            .iter()
            .filter_map(|(_, agent)| match &agent.kind {
                AgentKind::Victim(victim) => Some(1.0 - victim.fear),
                _ => None,
            })
            .collect();
        let average_perception_of_safety = if safety.is_empty() {
            None
        } else {
            Some(safety.iter().sum::<f64>() / safety.len() as f64)
        };

        let n_agt_init = self.cfg.model.n_offenders + self.cfg.model.n_victims;
        let crime_rate_per_tick = if n_agt_init == 0 {
            0.0
        } else {
            self.crimes.this_tick() as f64 / n_agt_init as f64 * 10.0
        };

        let population_crime_rate =
            self.crimes.total() as f64 / self.cfg.model.pop_count as f64 * 1000.0;

        Metrics {
            average_perception_of_safety,
            crime_rate_per_tick,
            population_crime_rate,
        }
    }
}
