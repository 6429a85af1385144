//! Render Engine — executes a [`RenderGraph`] offline, sample by sample.
//!
//! Nodes run in topological order. Delay lines are read at the start of each
//! sample and written at the end, so any cycle that passes through a delay
//! is legal. Everything reaching the sink is mixed, peak-normalized and
//! faded at both ends.

use std::collections::{BTreeMap, HashMap, VecDeque};

use tracing::debug;

use super::compressor::{Compressor, Dynamics};
use super::convolver::Convolver;
use super::delay::Delay;
use super::envelope::FadeEnvelope;
use super::filter::{BiquadFilter, FilterType};
use super::mixer::Mixer;
use super::oscillator::{Oscillator, Waveform};
use super::shaper::WaveShaper;
use crate::config::RenderRequest;
use crate::error::RenderError;

/// Longest delay a delay node can hold, in seconds.
pub const MAX_DELAY_SECONDS: f64 = 1.0;

// ── Graph ───────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum RenderKind {
    Oscillator {
        waveform: Waveform,
        frequency: f64,
        /// Cents.
        detune: f64,
    },
    Filter {
        filter_type: FilterType,
        frequency: f64,
        q: f64,
        gain: f64,
    },
    Delay {
        delay_time: f64,
    },
    Compressor {
        threshold: f64,
        knee: f64,
        ratio: f64,
        attack: f64,
        release: f64,
    },
    Convolver {
        impulse: Vec<f64>,
        normalize: bool,
    },
    WaveShaper {
        /// Sampled transfer curve; the tanh curve of `amount` when absent.
        curve: Option<Vec<f64>>,
        amount: f64,
    },
    Gain {
        gain: f64,
    },
    /// Plays a precomputed buffer, silent once it runs out.
    Playback {
        buffer: Vec<f64>,
        playback_rate: f64,
    },
    /// Sums its inputs.
    Merge,
    Output,
}

impl RenderKind {
    /// Automatable parameters and their static values, in processing order.
    pub fn params(&self) -> Vec<(&'static str, f64)> {
        match self {
            RenderKind::Oscillator {
                frequency, detune, ..
            } => vec![("frequency", *frequency), ("detune", *detune)],
            RenderKind::Filter {
                frequency, q, gain, ..
            } => vec![("frequency", *frequency), ("q", *q), ("gain", *gain)],
            RenderKind::Delay { delay_time } => vec![("delayTime", *delay_time)],
            RenderKind::Compressor {
                threshold,
                knee,
                ratio,
                attack,
                release,
            } => vec![
                ("threshold", *threshold),
                ("knee", *knee),
                ("ratio", *ratio),
                ("attack", *attack),
                ("release", *release),
            ],
            RenderKind::Gain { gain } => vec![("gain", *gain)],
            RenderKind::Playback { playback_rate, .. } => vec![("playbackRate", *playback_rate)],
            RenderKind::Convolver { .. }
            | RenderKind::WaveShaper { .. }
            | RenderKind::Merge
            | RenderKind::Output => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderNode {
    pub kind: RenderKind,
    /// Keys whose output is summed into this node's signal input.
    pub inputs: Vec<String>,
    /// Per-sample values replacing a parameter's static value.
    pub automation: BTreeMap<String, Vec<f64>>,
    /// `(source key, parameter)`: the source's output is added to the
    /// parameter every sample.
    pub modulators: Vec<(String, String)>,
}

impl RenderNode {
    pub fn new(kind: RenderKind) -> Self {
        RenderNode {
            kind,
            inputs: Vec::new(),
            automation: BTreeMap::new(),
            modulators: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderGraph {
    pub nodes: BTreeMap<String, RenderNode>,
    pub sink: String,
}

impl RenderGraph {
    /// A graph holding only the sink, under `sink`.
    pub fn new(sink: impl Into<String>) -> Self {
        let sink = sink.into();
        let mut nodes = BTreeMap::new();
        nodes.insert(sink.clone(), RenderNode::new(RenderKind::Output));
        RenderGraph { nodes, sink }
    }

    pub fn insert(&mut self, key: impl Into<String>, node: RenderNode) {
        self.nodes.insert(key.into(), node);
    }

    /// Route `from` into `to`'s signal input, or onto one of its parameters.
    pub fn connect(&mut self, from: &str, to: &str, param: Option<&str>) -> Result<(), RenderError> {
        let target = self
            .nodes
            .get_mut(to)
            .ok_or_else(|| RenderError::UnknownNode(to.to_string()))?;
        match param {
            None => target.inputs.push(from.to_string()),
            Some(p) => target.modulators.push((from.to_string(), p.to_string())),
        }
        Ok(())
    }
}

// ── Execution plan ──────────────────────────────────────────

struct Param<'a> {
    base: f64,
    automation: Option<&'a [f64]>,
    modulators: Vec<usize>,
}

impl Param<'_> {
    #[inline]
    fn at(&self, t: usize, values: &[f64]) -> f64 {
        let base = self
            .automation
            .and_then(|a| a.get(t).copied())
            .unwrap_or(self.base);
        base + self.modulators.iter().map(|&m| values[m]).sum::<f64>()
    }
}

enum State<'a> {
    Oscillator(Oscillator),
    Filter(BiquadFilter),
    Delay(Delay),
    Compressor(Compressor),
    Convolver(Convolver),
    Shaper(WaveShaper),
    Gain,
    Playback { buffer: &'a [f64], pos: f64 },
    Sum,
}

struct Slot<'a> {
    state: State<'a>,
    inputs: Vec<usize>,
    params: Vec<Param<'a>>,
}

struct Plan<'a> {
    slots: Vec<Slot<'a>>,
    order: Vec<usize>,
    delays: Vec<usize>,
    values: Vec<f64>,
    sink: usize,
    nyquist: f64,
}

impl<'a> Plan<'a> {
    fn build(graph: &'a RenderGraph, sample_rate: f64, max_impulse: usize) -> Result<Self, RenderError> {
        let keys: Vec<&String> = graph.nodes.keys().collect();
        let index: HashMap<&str, usize> =
            keys.iter().enumerate().map(|(i, k)| (k.as_str(), i)).collect();
        let lookup = |key: &str| {
            index
                .get(key)
                .copied()
                .ok_or_else(|| RenderError::UnknownNode(key.to_string()))
        };
        let sink = lookup(graph.sink.as_str())?;

        let mut slots = Vec::with_capacity(keys.len());
        let mut delays = Vec::new();
        let mut deps: Vec<Vec<usize>> = Vec::with_capacity(keys.len());
        for (i, node) in graph.nodes.values().enumerate() {
            let inputs = node
                .inputs
                .iter()
                .map(|k| lookup(k.as_str()))
                .collect::<Result<Vec<_>, _>>()?;
            let mut params: Vec<Param<'a>> = node
                .kind
                .params()
                .into_iter()
                .map(|(name, base)| Param {
                    base,
                    automation: node.automation.get(name).map(Vec::as_slice),
                    modulators: Vec::new(),
                })
                .collect();
            let names = node.kind.params();
            let mut sources = inputs.clone();
            for (source, param) in &node.modulators {
                let s = lookup(source.as_str())?;
                sources.push(s);
                match names.iter().position(|(n, _)| n == param) {
                    Some(p) => params[p].modulators.push(s),
                    None => debug!(node = %keys[i], param = %param, "ignoring modulator of unknown parameter"),
                }
            }
            if matches!(node.kind, RenderKind::Delay { .. }) {
                delays.push(i);
            }
            deps.push(sources);
            slots.push(Slot {
                state: State::new(&node.kind, sample_rate, max_impulse),
                inputs,
                params,
            });
        }

        // Kahn's algorithm over edges that do not leave a delay.
        let is_delay = |i: usize| matches!(slots[i].state, State::Delay(_));
        let mut indegree = vec![0usize; slots.len()];
        let mut dependents = vec![Vec::new(); slots.len()];
        for (i, sources) in deps.iter().enumerate() {
            if is_delay(i) {
                continue;
            }
            for &s in sources.iter().filter(|&&s| !is_delay(s)) {
                indegree[i] += 1;
                dependents[s].push(i);
            }
        }
        let mut queue: VecDeque<usize> = (0..slots.len())
            .filter(|&i| !is_delay(i) && indegree[i] == 0)
            .collect();
        let mut order = Vec::with_capacity(slots.len());
        while let Some(i) = queue.pop_front() {
            order.push(i);
            for &d in &dependents[i] {
                indegree[d] -= 1;
                if indegree[d] == 0 {
                    queue.push_back(d);
                }
            }
        }
        if order.len() + delays.len() < slots.len() {
            let stuck = (0..slots.len())
                .find(|&i| !is_delay(i) && indegree[i] > 0)
                .unwrap_or(sink);
            return Err(RenderError::Cycle(keys[stuck].clone()));
        }

        Ok(Plan {
            values: vec![0.0; slots.len()],
            slots,
            order,
            delays,
            sink,
            nyquist: sample_rate / 2.0,
        })
    }

    fn step(&mut self, t: usize) -> f64 {
        let Plan {
            slots,
            order,
            delays,
            values,
            sink,
            nyquist,
        } = self;

        for &d in delays.iter() {
            let slot = &mut slots[d];
            if let State::Delay(delay) = &mut slot.state {
                let time = slot.params[0].at(t, values);
                delay.delay_time = time.clamp(0.0, MAX_DELAY_SECONDS);
                values[d] = delay.read();
            }
        }

        for &i in order.iter() {
            let slot = &mut slots[i];
            let input: f64 = slot.inputs.iter().map(|&s| values[s]).sum();
            let p = |n: usize| slot.params[n].at(t, values);
            let out = match &mut slot.state {
                State::Oscillator(osc) => osc.tick(p(0).clamp(0.0, *nyquist), p(1)),
                State::Filter(filter) => {
                    filter.set_params(p(0).clamp(10.0, *nyquist * 0.99), p(1).max(1e-4), p(2));
                    filter.process(input)
                }
                State::Compressor(c) => {
                    let dynamics = Dynamics {
                        threshold: p(0).clamp(-100.0, 0.0),
                        knee: p(1).clamp(0.0, 40.0),
                        ratio: p(2).max(1.0),
                        attack: p(3),
                        release: p(4),
                    };
                    c.process(input, &dynamics)
                }
                State::Convolver(conv) => conv.process(input),
                State::Shaper(shaper) => shaper.process(input),
                State::Gain => input * p(0),
                State::Playback { buffer, pos } => {
                    let rate = p(0).max(0.0);
                    let out = read_linear(buffer, *pos);
                    *pos += rate;
                    out
                }
                State::Sum => input,
                State::Delay(_) => values[i],
            };
            values[i] = if out.is_finite() { out } else { 0.0 };
        }

        for &d in delays.iter() {
            let input: f64 = slots[d].inputs.iter().map(|&s| values[s]).sum();
            if let State::Delay(delay) = &mut slots[d].state {
                delay.write(if input.is_finite() { input } else { 0.0 });
            }
        }

        values[*sink]
    }
}

impl<'a> State<'a> {
    fn new(kind: &'a RenderKind, sample_rate: f64, max_impulse: usize) -> Self {
        match kind {
            RenderKind::Oscillator { waveform, .. } => {
                State::Oscillator(Oscillator::new(*waveform, sample_rate))
            }
            RenderKind::Filter { filter_type, .. } => {
                State::Filter(BiquadFilter::new(*filter_type, sample_rate))
            }
            RenderKind::Delay { delay_time } => State::Delay(Delay::with_time(
                sample_rate,
                MAX_DELAY_SECONDS,
                *delay_time,
            )),
            RenderKind::Compressor { .. } => State::Compressor(Compressor::new(sample_rate)),
            RenderKind::Convolver { impulse, normalize } => {
                State::Convolver(Convolver::new(impulse, max_impulse, *normalize))
            }
            RenderKind::WaveShaper { curve, amount } => State::Shaper(match curve {
                Some(c) => WaveShaper::with_curve(c.clone()),
                None => WaveShaper::tanh(*amount),
            }),
            RenderKind::Gain { .. } => State::Gain,
            RenderKind::Playback { buffer, .. } => State::Playback { buffer, pos: 0.0 },
            RenderKind::Merge | RenderKind::Output => State::Sum,
        }
    }
}

/// Linearly interpolated read; zero past the end.
fn read_linear(buffer: &[f64], pos: f64) -> f64 {
    let i = pos as usize;
    let frac = pos - i as f64;
    match (buffer.get(i), buffer.get(i + 1)) {
        (Some(a), Some(b)) => a + (b - a) * frac,
        (Some(a), None) => a * (1.0 - frac),
        _ => 0.0,
    }
}

// ── Render ──────────────────────────────────────────────────

/// Render `graph` for `request`: `request.num_samples()` samples, finite,
/// peak at most 1, faded in and out over `request.fade_samples`.
pub fn render(graph: &RenderGraph, request: &RenderRequest) -> Result<Vec<f64>, RenderError> {
    request.validate()?;
    let len = request.num_samples();
    let mut plan = Plan::build(graph, request.sample_rate, request.max_impulse)?;
    let mut mixer = Mixer::new(len);
    for t in 0..len {
        mixer.add(t, plan.step(t));
    }
    let mut out = mixer.output();
    FadeEnvelope::new(request.fade_samples).apply(&mut out);
    Ok(out)
}
