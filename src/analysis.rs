use crate::engine::Record;
use crate::stats::{RunningStats, StatsReport};
use anyhow::{Context, Result};
use rmp_serde::{decode, encode};
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fs::File,
    io::{BufRead, BufReader, BufWriter, Write},
    path::Path,
};

/// Observable accumulated over the records of a run.
pub trait Obs {
    fn name(&self) -> &'static str;
    fn update(&mut self, record: &Record);
    fn report(&self) -> StatsReport;
}

pub struct CrimeRate {
    stats: RunningStats,
}

impl Obs for CrimeRate {
    fn name(&self) -> &'static str {
        "crime_rate_per_tick"
    }

    fn update(&mut self, record: &Record) {
        self.stats.add(record.metrics.crime_rate_per_tick);
    }

    fn report(&self) -> StatsReport {
        self.stats.report()
    }
}

/// Ticks without victims carry no safety value and are skipped.
pub struct PerceivedSafety {
    stats: RunningStats,
}

impl Obs for PerceivedSafety {
    fn name(&self) -> &'static str {
        "average_perception_of_safety"
    }

    fn update(&mut self, record: &Record) {
        if let Some(safety) = record.metrics.average_perception_of_safety {
            self.stats.add(safety);
        }
    }

    fn report(&self) -> StatsReport {
        self.stats.report()
    }
}

pub struct CrimesPerTick {
    stats: RunningStats,
}

impl Obs for CrimesPerTick {
    fn name(&self) -> &'static str {
        "n_crimes"
    }

    fn update(&mut self, record: &Record) {
        self.stats.add(record.n_crimes as f64);
    }

    fn report(&self) -> StatsReport {
        self.stats.report()
    }
}

/// Summary of a single run.
#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct RunResults {
    pub n_ticks: usize,
    pub n_crimes: usize,
    /// Population crime rate at the last recorded tick.
    pub population_crime_rate: f64,
    /// Tick at which the last victim left, if it did.
    pub termination_tick: Option<u64>,
    pub observables: BTreeMap<String, StatsReport>,
}

pub struct Analyzer {
    n_ticks: usize,
    n_crimes: usize,
    population_crime_rate: f64,
    termination_tick: Option<u64>,
    obs_ptr_vec: Vec<Box<dyn Obs>>,
}

impl Analyzer {
    pub fn new() -> Self {
        let obs_ptr_vec: Vec<Box<dyn Obs>> = vec![
            Box::new(CrimeRate {
                stats: RunningStats::new(),
            }),
            Box::new(PerceivedSafety {
                stats: RunningStats::new(),
            }),
            Box::new(CrimesPerTick {
                stats: RunningStats::new(),
            }),
        ];
        Self {
            n_ticks: 0,
            n_crimes: 0,
            population_crime_rate: 0.0,
            termination_tick: None,
            obs_ptr_vec,
        }
    }

    pub fn add_record(&mut self, record: &Record) {
        self.n_ticks += 1;
        self.n_crimes += record.n_crimes;
        self.population_crime_rate = record.metrics.population_crime_rate;
        if !record.running && self.termination_tick.is_none() {
            self.termination_tick = Some(record.tick);
        }
        for obs in &mut self.obs_ptr_vec {
            obs.update(record);
        }
    }

    /// Read every record of a trajectory file.
    pub fn add_file<P: AsRef<Path>>(&mut self, file: P) -> Result<()> {
        let file = file.as_ref();
        let file = File::open(file).with_context(|| format!("failed to open {file:?}"))?;
        let mut reader = BufReader::new(file);

        while !reader
            .fill_buf()
            .context("failed to read trajectory")?
            .is_empty()
        {
            let record: Record =
                decode::from_read(&mut reader).context("failed to deserialize record")?;
            self.add_record(&record);
        }
        Ok(())
    }

    pub fn results(&self) -> RunResults {
        RunResults {
            n_ticks: self.n_ticks,
            n_crimes: self.n_crimes,
            population_crime_rate: self.population_crime_rate,
            termination_tick: self.termination_tick,
            observables: self
                .obs_ptr_vec
                .iter()
                .map(|obs| (obs.name().to_string(), obs.report()))
                .collect(),
        }
    }

    pub fn save_results<P: AsRef<Path>>(&self, file: P) -> Result<()> {
        let file = file.as_ref();
        let file = File::create(file).with_context(|| format!("failed to create {file:?}"))?;
        let mut writer = BufWriter::new(file);

        let results = self.results();
        log::info!("{results:#?}");
        encode::write(&mut writer, &results).context("failed to serialize results")?;
        writer.flush().context("failed to flush writer stream")?;
        Ok(())
    }
}
