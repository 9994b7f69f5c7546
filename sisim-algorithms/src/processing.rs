//! Event driver that digitizes and reconstructs every sensor of an event.

use log::{debug, info};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use sisim_core::{
    Digitizer, Error, HitMaker, RawHit, ReconstructedHit, Result, Sensor, SensorId, TruthHit,
};
use std::collections::BTreeMap;
use std::sync::Arc;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Named hit collections produced for one event.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct EventRecord {
    /// Event number.
    pub event: u64,
    /// Raw hit collections by name.
    pub raw_hits: BTreeMap<String, Vec<RawHit>>,
    /// Reconstructed hit collections by name.
    pub hits: BTreeMap<String, Vec<ReconstructedHit>>,
}

impl EventRecord {
    pub fn new(event: u64) -> Self {
        Self {
            event,
            ..Self::default()
        }
    }

    /// Total number of raw hits over all collections.
    pub fn n_raw_hits(&self) -> usize {
        self.raw_hits.values().map(Vec::len).sum()
    }

    /// Total number of reconstructed hits over all collections.
    pub fn n_hits(&self) -> usize {
        self.hits.values().map(Vec::len).sum()
    }

    pub fn raw_hit_collection(&self, name: &str) -> &[RawHit] {
        self.raw_hits.get(name).map_or(&[][..], Vec::as_slice)
    }

    pub fn hit_collection(&self, name: &str) -> &[ReconstructedHit] {
        self.hits.get(name).map_or(&[][..], Vec::as_slice)
    }
}

/// Output of one sensor, merged into the event record in sensor order.
struct SensorOutput {
    raw_name: String,
    raw_hits: Vec<RawHit>,
    hits: Vec<(String, Vec<ReconstructedHit>)>,
}

/// Digitizer and hit makers bound to one sensor.
pub struct SensorPipeline {
    sensor: Arc<Sensor>,
    digitizer: Box<dyn Digitizer>,
    hit_makers: Vec<Box<dyn HitMaker>>,
}

impl SensorPipeline {
    pub fn new(sensor: Arc<Sensor>, digitizer: Box<dyn Digitizer>) -> Self {
        Self {
            sensor,
            digitizer,
            hit_makers: Vec::new(),
        }
    }

    /// Adds a hit maker; makers run in the order they were added.
    #[must_use]
    pub fn with_hit_maker(mut self, hit_maker: Box<dyn HitMaker>) -> Self {
        self.hit_makers.push(hit_maker);
        self
    }

    pub fn sensor(&self) -> &Arc<Sensor> {
        &self.sensor
    }

    fn run(&mut self, truth_hits: &[TruthHit], rng: &mut ChaCha8Rng) -> Result<SensorOutput> {
        let raw_hits = self.digitizer.make_hits(&self.sensor, truth_hits, rng)?;
        let mut hits = Vec::with_capacity(self.hit_makers.len());
        for maker in &mut self.hit_makers {
            let made = maker.make_hits(&self.sensor, &raw_hits)?;
            hits.push((maker.collection_name(), made));
        }
        Ok(SensorOutput {
            raw_name: self.digitizer.collection_name(),
            raw_hits,
            hits,
        })
    }
}

/// Runs digitization and hit making for every registered sensor.
///
/// Each sensor draws from its own `ChaCha8Rng`, seeded with
/// `seed + event` and using the sensor id as the stream number, so the
/// output does not depend on scheduling.
pub struct TrackerHitDriver {
    seed: u64,
    parallel: bool,
    pipelines: Vec<SensorPipeline>,
}

impl TrackerHitDriver {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            parallel: true,
            pipelines: Vec::new(),
        }
    }

    /// Set whether sensors are processed in parallel.
    #[must_use]
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Registers a sensor pipeline. Sensor ids must be unique.
    pub fn add_sensor(&mut self, pipeline: SensorPipeline) -> Result<()> {
        let id = pipeline.sensor.id();
        if self.pipelines.iter().any(|p| p.sensor.id() == id) {
            return Err(Error::Config(format!("sensor {id} registered twice")));
        }
        self.pipelines.push(pipeline);
        Ok(())
    }

    pub fn sensors(&self) -> impl Iterator<Item = &Arc<Sensor>> {
        self.pipelines.iter().map(SensorPipeline::sensor)
    }

    /// Processes one event. Truth hits are grouped by sensor; sensors
    /// without truth hits are still read out for noise.
    pub fn process(
        &mut self,
        event: u64,
        truth_hits: &BTreeMap<SensorId, Vec<TruthHit>>,
    ) -> Result<EventRecord> {
        let event_seed = self.seed.wrapping_add(event);
        let run = |pipeline: &mut SensorPipeline| {
            let hits = truth_hits
                .get(&pipeline.sensor.id())
                .map_or(&[][..], Vec::as_slice);
            let mut rng = ChaCha8Rng::seed_from_u64(event_seed);
            rng.set_stream(u64::from(pipeline.sensor.id().0));
            pipeline.run(hits, &mut rng)
        };
        let outputs: Vec<SensorOutput> = if self.parallel {
            self.pipelines.par_iter_mut().map(run).collect::<Result<_>>()?
        } else {
            self.pipelines.iter_mut().map(run).collect::<Result<_>>()?
        };

        let mut record = EventRecord::new(event);
        for output in outputs {
            record
                .raw_hits
                .entry(output.raw_name)
                .or_default()
                .extend(output.raw_hits);
            for (name, hits) in output.hits {
                record.hits.entry(name).or_default().extend(hits);
            }
        }
        for (name, hits) in &record.hits {
            debug!("event {event}: {name} has {} hits", hits.len());
        }
        info!(
            "event {event}: {} sensors, {} raw hits, {} reconstructed hits",
            self.pipelines.len(),
            record.n_raw_hits(),
            record.n_hits()
        );
        Ok(record)
    }
}
