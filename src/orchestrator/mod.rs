//! Pattern-generator orchestration.
//!
//! Works out which network outputs a compiled graph needs, picks (or lazily
//! creates) the network for each frequency, and evaluates the outputs over a
//! sample range with either backend. Inputs depend only on the global sample
//! index, so evaluating a sub-range gives exactly the matching slice of a
//! whole-buffer evaluation.

pub mod antialias;
pub mod health;
pub mod kernel;

use std::collections::{BTreeMap, BTreeSet};
use std::f64::consts::PI;
use std::ops::Range;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::bridge::AudioGraph;
use crate::config::{Backend, OrchestratorConfig, RenderRequest};
use crate::cppn::{OffspringDriver, PatternNetwork};
use crate::error::EvaluationError;

pub use health::{ensure_indices_connected, ensure_outputs_connected};
pub use kernel::Kernel;

// ── Keys ────────────────────────────────────────────────────

/// A frequency rounded to millihertz.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FrequencyKey(pub i64);

impl FrequencyKey {
    pub fn from_hz(hz: f64) -> Self {
        FrequencyKey((hz * 1000.0).round() as i64)
    }

    pub fn hz(self) -> f64 {
        self.0 as f64 / 1000.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OutputRequest {
    pub index: usize,
    pub frequency: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OutputKey {
    pub index: usize,
    pub frequency: FrequencyKey,
}

impl OutputKey {
    pub fn new(index: usize, frequency: f64) -> Self {
        OutputKey {
            index,
            frequency: FrequencyKey::from_hz(frequency),
        }
    }
}

pub type EvaluatedOutputs = BTreeMap<OutputKey, Vec<f64>>;

// ── Pattern source ──────────────────────────────────────────

/// The network(s) behind a genome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PatternSource<N> {
    /// One network for every frequency.
    Shared(N),
    /// One network per evaluated frequency.
    PerFrequency(BTreeMap<FrequencyKey, N>),
}

impl<N: PatternNetwork> PatternSource<N> {
    pub fn network(&self, key: FrequencyKey) -> Option<&N> {
        match self {
            PatternSource::Shared(n) => Some(n),
            PatternSource::PerFrequency(map) => map.get(&key),
        }
    }

    /// The stored key closest to `key`. Ties go to the lower frequency.
    pub fn nearest(&self, key: FrequencyKey) -> Option<FrequencyKey> {
        match self {
            PatternSource::Shared(_) => Some(key),
            PatternSource::PerFrequency(map) => map
                .keys()
                .copied()
                .min_by_key(|k| ((k.0 - key.0).unsigned_abs(), k.0)),
        }
    }

    pub fn networks(&self) -> Vec<&N> {
        match self {
            PatternSource::Shared(n) => vec![n],
            PatternSource::PerFrequency(map) => map.values().collect(),
        }
    }

    pub fn networks_mut(&mut self) -> Vec<&mut N> {
        match self {
            PatternSource::Shared(n) => vec![n],
            PatternSource::PerFrequency(map) => map.values_mut().collect(),
        }
    }

    /// Offspring of this source: each network is replaced by a driver
    /// offspring of itself and, when given, of `other`'s network at the
    /// same key.
    pub fn offspring<D, R>(&self, other: Option<&PatternSource<N>>, driver: &mut D, rng: &mut R) -> Self
    where
        D: OffspringDriver<Network = N>,
        R: rand::Rng + ?Sized,
    {
        match self {
            PatternSource::Shared(n) => {
                let mate = other.and_then(|o| o.networks().into_iter().next());
                PatternSource::Shared(breed(driver, n, mate, rng))
            }
            PatternSource::PerFrequency(map) => PatternSource::PerFrequency(
                map.iter()
                    .map(|(key, n)| {
                        let mate = other.and_then(|o| o.network(*key));
                        (*key, breed(driver, n, mate, rng))
                    })
                    .collect(),
            ),
        }
    }
}

fn breed<D, R>(driver: &mut D, n: &D::Network, mate: Option<&D::Network>, rng: &mut R) -> D::Network
where
    D: OffspringDriver,
    R: rand::Rng + ?Sized,
{
    match mate {
        Some(m) => driver.offspring(&[n, m], rng),
        None => driver.offspring(&[n], rng),
    }
}

// ── Inputs ──────────────────────────────────────────────────

/// Signal input at (possibly fractional) sample position `pos` of a buffer
/// of `total` samples.
pub fn signal_input(frequency: f64, duration: f64, total: usize, pos: f64) -> f64 {
    let ramp = if total > 1 {
        -1.0 + 2.0 * pos / (total - 1) as f64
    } else {
        0.0
    };
    if frequency == 0.0 {
        ramp
    } else {
        (PI * frequency * duration * ramp).sin()
    }
}

// ── Orchestrator ────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct Orchestrator {
    pub config: OrchestratorConfig,
}

struct Job<'a, N> {
    frequency: FrequencyKey,
    network: &'a N,
    indices: Vec<usize>,
}

impl Orchestrator {
    pub fn new(config: OrchestratorConfig) -> Self {
        Orchestrator { config }
    }

    /// Network outputs a compiled graph reads. Noise generators are skipped.
    pub fn required_outputs(graph: &AudioGraph) -> Vec<OutputRequest> {
        let keys: BTreeSet<OutputKey> = graph
            .network_outputs
            .iter()
            .filter_map(|o| o.source.output_index().map(|i| OutputKey::new(i, o.frequency)))
            .collect();
        keys.into_iter()
            .map(|k| OutputRequest {
                index: k.index,
                frequency: k.frequency.hz(),
            })
            .collect()
    }

    pub fn evaluate_graph<D, R>(
        &self,
        pattern: &mut PatternSource<D::Network>,
        graph: &AudioGraph,
        request: &RenderRequest,
        driver: &mut D,
        rng: &mut R,
    ) -> Result<EvaluatedOutputs, EvaluationError>
    where
        D: OffspringDriver,
        R: rand::Rng + ?Sized,
    {
        let outputs = Self::required_outputs(graph);
        self.evaluate(pattern, &outputs, request, driver, rng)
    }

    /// Evaluate `outputs` over the whole buffer.
    pub fn evaluate<D, R>(
        &self,
        pattern: &mut PatternSource<D::Network>,
        outputs: &[OutputRequest],
        request: &RenderRequest,
        driver: &mut D,
        rng: &mut R,
    ) -> Result<EvaluatedOutputs, EvaluationError>
    where
        D: OffspringDriver,
        R: rand::Rng + ?Sized,
    {
        let total = request.num_samples();
        self.evaluate_range(pattern, outputs, request, 0..total, driver, rng)
    }

    /// Evaluate `outputs` for samples `range` of the full buffer.
    pub fn evaluate_range<D, R>(
        &self,
        pattern: &mut PatternSource<D::Network>,
        outputs: &[OutputRequest],
        request: &RenderRequest,
        range: Range<usize>,
        driver: &mut D,
        rng: &mut R,
    ) -> Result<EvaluatedOutputs, EvaluationError>
    where
        D: OffspringDriver,
        R: rand::Rng + ?Sized,
    {
        let total = request.num_samples();
        if range.start > range.end || range.end > total {
            return Err(EvaluationError::RangeOutOfBounds {
                offset: range.start,
                end: range.end,
                total,
            });
        }

        let mut groups: BTreeMap<FrequencyKey, BTreeSet<usize>> = BTreeMap::new();
        for out in outputs {
            groups
                .entry(FrequencyKey::from_hz(out.frequency))
                .or_default()
                .insert(out.index);
        }

        // Resolve every group to the key of the network that will serve it.
        let mut resolved = Vec::with_capacity(groups.len());
        for (&key, indices) in &groups {
            let source = self.resolve(pattern, key, indices, driver, rng)?;
            resolved.push((key, source, indices));
        }

        let mut jobs = Vec::with_capacity(resolved.len());
        for (frequency, source, indices) in resolved {
            let network = pattern
                .network(source)
                .ok_or(EvaluationError::MissingFrequencyNetwork {
                    frequency: frequency.hz(),
                })?;
            let available = network.output_count();
            if let Some(&bad) = indices.iter().find(|&&i| i >= available) {
                return Err(EvaluationError::OutputOutOfRange {
                    index: bad,
                    available,
                });
            }
            jobs.push(Job {
                frequency,
                network,
                indices: indices.iter().copied().collect(),
            });
        }

        let results: Vec<Vec<(OutputKey, Vec<f64>)>> = jobs
            .par_iter()
            .map(|job| self.evaluate_job(job, request, range.clone()))
            .collect();

        Ok(results.into_iter().flatten().collect())
    }

    /// Key of the network that serves `key`, creating it when allowed. A
    /// created network has every one of `indices` driven before it is stored.
    fn resolve<D, R>(
        &self,
        pattern: &mut PatternSource<D::Network>,
        key: FrequencyKey,
        indices: &BTreeSet<usize>,
        driver: &mut D,
        rng: &mut R,
    ) -> Result<FrequencyKey, EvaluationError>
    where
        D: OffspringDriver,
        R: rand::Rng + ?Sized,
    {
        if pattern.network(key).is_some() {
            return Ok(key);
        }
        let nearest = pattern.nearest(key);
        let PatternSource::PerFrequency(map) = pattern else {
            return Ok(key);
        };
        if self.config.lazy_create {
            let mut child = match nearest.and_then(|k| map.get(&k)) {
                Some(parent) => driver.offspring(&[parent], rng),
                None => driver.offspring(&[], rng),
            };
            let repaired = ensure_indices_connected(indices.iter().copied(), &mut child, rng);
            debug!(frequency = key.hz(), repaired, "created per-frequency network");
            map.insert(key, child);
            return Ok(key);
        }
        match nearest {
            Some(found) if self.config.nearest_fallback => {
                warn!(
                    frequency = key.hz(),
                    nearest = found.hz(),
                    "no network for frequency, using nearest"
                );
                Ok(found)
            }
            _ => Err(EvaluationError::MissingFrequencyNetwork { frequency: key.hz() }),
        }
    }

    fn evaluate_job<N: PatternNetwork>(
        &self,
        job: &Job<'_, N>,
        request: &RenderRequest,
        range: Range<usize>,
    ) -> Vec<(OutputKey, Vec<f64>)> {
        let total = request.num_samples();
        // Reversed output i is forward sample total - 1 - i.
        let forward = if request.reverse {
            total - range.end..total - range.start
        } else {
            range.clone()
        };
        let frequency = job.frequency.hz();
        let input = |pos: f64| signal_input(frequency, request.duration, total, pos);

        let mut columns = if request.anti_alias && self.config.oversample > 1 {
            let factor = self.config.oversample;
            let half = self.config.fir_half_width;
            let taps = antialias::lowpass_taps(factor, half);
            let last = total.saturating_sub(1) as f64;
            let count = forward.len();
            let first = (forward.start * factor) as i64 - half as i64;
            let span = if count == 0 { 0 } else { (count - 1) * factor + taps.len() };
            let signals: Vec<f64> = (0..span as i64)
                .map(|j| {
                    let pos = (first + j) as f64 / factor as f64;
                    input(pos.clamp(0.0, last))
                })
                .collect();
            self.run(job, &signals)
                .into_iter()
                .map(|column| antialias::decimate(&column, &taps, factor, count))
                .collect()
        } else {
            let signals: Vec<f64> = forward.map(|i| input(i as f64)).collect();
            self.run(job, &signals)
        };

        for column in &mut columns {
            if request.reverse {
                column.reverse();
            }
            if request.velocity != 1.0 {
                for v in column.iter_mut() {
                    *v *= request.velocity;
                }
            }
        }

        job.indices
            .iter()
            .zip(columns)
            .map(|(&index, column)| {
                (
                    OutputKey {
                        index,
                        frequency: job.frequency,
                    },
                    column,
                )
            })
            .collect()
    }

    /// One column per job index.
    fn run<N: PatternNetwork>(&self, job: &Job<'_, N>, signals: &[f64]) -> Vec<Vec<f64>> {
        if self.config.backend == Backend::Batched {
            match Kernel::build(job.network, &job.indices) {
                Ok(kernel) => {
                    let chunk = self.config.chunk_size.max(1);
                    let parts: Vec<Vec<Vec<f64>>> =
                        signals.par_chunks(chunk).map(|c| kernel.run(c)).collect();
                    let mut columns = vec![Vec::with_capacity(signals.len()); job.indices.len()];
                    for part in parts {
                        for (column, piece) in columns.iter_mut().zip(part) {
                            column.extend(piece);
                        }
                    }
                    return columns;
                }
                Err(e) => warn!(error = %e, "kernel build failed, evaluating sequentially"),
            }
        }

        let mut columns = vec![Vec::with_capacity(signals.len()); job.indices.len()];
        for &s in signals {
            let out = job.network.evaluate([1.0, s]);
            for (column, &index) in columns.iter_mut().zip(&job.indices) {
                column.push(out[index]);
            }
        }
        columns
    }
}
