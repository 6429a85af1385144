//! Node kinds — the closed registry of DSP node types a patch may contain.
//!
//! Each kind carries its own parameter record and declares two schemas as
//! constant data: which parameters may be mutated and which may be driven
//! by an incoming connection.

use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

use super::schema::{self, Connectable, ParamSpec};
use crate::dsp::filter::FilterType;
use crate::dsp::oscillator::Waveform;
use crate::dsp::pitch::midi_to_frequency;
use crate::mutation::parameter::random_value;

// ── Identity ────────────────────────────────────────────────

/// Stable node identity. Survives cloning, crossover and serialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub u64);

impl NodeId {
    /// The reserved id of the single output sink.
    pub const OUTPUT: NodeId = NodeId(0);
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A node in the patch graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    #[serde(flatten)]
    pub kind: NodeKind,
}

impl Node {
    pub fn new(id: NodeId, kind: NodeKind) -> Self {
        Node { id, kind }
    }

    pub fn node_type(&self) -> NodeType {
        self.kind.node_type()
    }
}

// ── Generator sources ───────────────────────────────────────

/// Built-in noise colours a generator may declare instead of a network
/// output index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum NoiseKind {
    #[serde(rename = "noiseWhite")]
    White,
    #[serde(rename = "noisePink")]
    Pink,
    #[serde(rename = "noiseBrown")]
    Brown,
}

/// Where a generator-style node gets its signal: a pattern-network output
/// index, or synthesized noise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GeneratorSource {
    Output(usize),
    Noise(NoiseKind),
}

impl GeneratorSource {
    pub fn output_index(&self) -> Option<usize> {
        match self {
            GeneratorSource::Output(i) => Some(*i),
            GeneratorSource::Noise(_) => None,
        }
    }
}

/// Whether a plain generator produces audio-rate content or a slow control
/// signal. Decides its frequency range and which inputs it may drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rate {
    Audio,
    Control,
}

// ── Parameter records ───────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OscillatorParams {
    pub waveform: Waveform,
    pub frequency: f64,
    /// Detune in cents.
    pub detune: f64,
}

/// An oscillator quantized to equal-tempered notes; always follows the
/// rendered note.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteOscillatorParams {
    pub waveform: Waveform,
    /// MIDI note number.
    pub note: f64,
    pub detune: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratorParams {
    pub source: GeneratorSource,
    pub rate: Rate,
    pub frequency: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteGeneratorParams {
    pub source: GeneratorSource,
    /// MIDI note number; the generator is evaluated at its frequency.
    pub note: f64,
}

/// Harmonic content for one partial of an additive node. Its frequency is the
/// additive node's fundamental times `partial`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartialParams {
    pub source: GeneratorSource,
    pub partial: u32,
}

/// Gain envelope for one partial of an additive node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartialEnvelopeParams {
    pub source: GeneratorSource,
    pub partial: u32,
    pub frequency: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterParams {
    #[serde(rename = "filterType")]
    pub filter_type: FilterType,
    pub frequency: f64,
    pub q: f64,
    pub gain: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DelayParams {
    pub delay_time: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackDelayParams {
    pub delay_time: f64,
    pub feedback: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompressorParams {
    pub threshold: f64,
    pub knee: f64,
    pub ratio: f64,
    pub attack: f64,
    pub release: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvolverParams {
    pub normalize: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaveShaperParams {
    /// Drive of the built-in tanh curve, used when no curve is connected.
    pub amount: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GainParams {
    pub gain: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BufferSourceParams {
    pub playback_rate: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WavetableParams {}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdditiveParams {
    /// MIDI note of the fundamental.
    pub note: f64,
    /// Static partial weight is `partial^-power`.
    pub partial_gain_weight_power: f64,
}

// ── Node kinds ──────────────────────────────────────────────

/// Every node type a patch can contain, with its parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum NodeKind {
    Oscillator(OscillatorParams),
    NoteOscillator(NoteOscillatorParams),
    Generator(GeneratorParams),
    NoteGenerator(NoteGeneratorParams),
    PartialOutput(PartialParams),
    PartialEnvelope(PartialEnvelopeParams),
    Filter(FilterParams),
    Delay(DelayParams),
    FeedbackDelay(FeedbackDelayParams),
    Compressor(CompressorParams),
    Convolver(ConvolverParams),
    WaveShaper(WaveShaperParams),
    Gain(GainParams),
    BufferSource(BufferSourceParams),
    Wavetable(WavetableParams),
    Additive(AdditiveParams),
    Output,
}

/// Parameterless discriminant of [`NodeKind`], used by the legality table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NodeType {
    Oscillator,
    NoteOscillator,
    Generator,
    NoteGenerator,
    PartialOutput,
    PartialEnvelope,
    Filter,
    Delay,
    FeedbackDelay,
    Compressor,
    Convolver,
    WaveShaper,
    Gain,
    BufferSource,
    Wavetable,
    Additive,
    Output,
}

impl NodeType {
    /// Kinds that may be inserted into an existing connection by a split.
    pub const INSERTABLE: &'static [NodeType] = &[
        NodeType::Filter,
        NodeType::Delay,
        NodeType::FeedbackDelay,
        NodeType::Compressor,
        NodeType::Convolver,
        NodeType::WaveShaper,
        NodeType::Gain,
        NodeType::BufferSource,
        NodeType::Wavetable,
    ];

    /// Nodes whose signal comes from the pattern network (or noise).
    pub fn is_generator(self) -> bool {
        matches!(
            self,
            NodeType::Generator
                | NodeType::NoteGenerator
                | NodeType::PartialOutput
                | NodeType::PartialEnvelope
        )
    }

    pub fn is_partial(self) -> bool {
        matches!(self, NodeType::PartialOutput | NodeType::PartialEnvelope)
    }

    /// Nodes that play back whole-buffer content supplied by generators.
    pub fn is_buffer_style(self) -> bool {
        matches!(
            self,
            NodeType::BufferSource | NodeType::Wavetable | NodeType::Additive
        )
    }

    pub fn is_oscillator(self) -> bool {
        matches!(self, NodeType::Oscillator | NodeType::NoteOscillator)
    }

    /// Nodes that process an audio signal arriving on their primary input.
    pub fn accepts_audio_input(self) -> bool {
        matches!(
            self,
            NodeType::Filter
                | NodeType::Delay
                | NodeType::FeedbackDelay
                | NodeType::Compressor
                | NodeType::Convolver
                | NodeType::WaveShaper
                | NodeType::Gain
                | NodeType::Output
        )
    }
}

impl NodeKind {
    pub fn node_type(&self) -> NodeType {
        match self {
            NodeKind::Oscillator(_) => NodeType::Oscillator,
            NodeKind::NoteOscillator(_) => NodeType::NoteOscillator,
            NodeKind::Generator(_) => NodeType::Generator,
            NodeKind::NoteGenerator(_) => NodeType::NoteGenerator,
            NodeKind::PartialOutput(_) => NodeType::PartialOutput,
            NodeKind::PartialEnvelope(_) => NodeType::PartialEnvelope,
            NodeKind::Filter(_) => NodeType::Filter,
            NodeKind::Delay(_) => NodeType::Delay,
            NodeKind::FeedbackDelay(_) => NodeType::FeedbackDelay,
            NodeKind::Compressor(_) => NodeType::Compressor,
            NodeKind::Convolver(_) => NodeType::Convolver,
            NodeKind::WaveShaper(_) => NodeType::WaveShaper,
            NodeKind::Gain(_) => NodeType::Gain,
            NodeKind::BufferSource(_) => NodeType::BufferSource,
            NodeKind::Wavetable(_) => NodeType::Wavetable,
            NodeKind::Additive(_) => NodeType::Additive,
            NodeKind::Output => NodeType::Output,
        }
    }

    /// Default parameters for a node type. Generator-style kinds default to
    /// network output 0.
    pub fn default_for(node_type: NodeType) -> NodeKind {
        let source = GeneratorSource::Output(0);
        match node_type {
            NodeType::Oscillator => NodeKind::Oscillator(OscillatorParams {
                waveform: Waveform::Sine,
                frequency: 440.0,
                detune: 0.0,
            }),
            NodeType::NoteOscillator => NodeKind::NoteOscillator(NoteOscillatorParams {
                waveform: Waveform::Sine,
                note: 69.0,
                detune: 0.0,
            }),
            NodeType::Generator => NodeKind::Generator(GeneratorParams {
                source,
                rate: Rate::Audio,
                frequency: 440.0,
            }),
            NodeType::NoteGenerator => {
                NodeKind::NoteGenerator(NoteGeneratorParams { source, note: 69.0 })
            }
            NodeType::PartialOutput => {
                NodeKind::PartialOutput(PartialParams { source, partial: 1 })
            }
            NodeType::PartialEnvelope => NodeKind::PartialEnvelope(PartialEnvelopeParams {
                source,
                partial: 1,
                frequency: 1.0,
            }),
            NodeType::Filter => NodeKind::Filter(FilterParams {
                filter_type: FilterType::Lowpass,
                frequency: 1000.0,
                q: 0.707,
                gain: 0.0,
            }),
            NodeType::Delay => NodeKind::Delay(DelayParams { delay_time: 0.25 }),
            NodeType::FeedbackDelay => NodeKind::FeedbackDelay(FeedbackDelayParams {
                delay_time: 0.25,
                feedback: 0.3,
            }),
            NodeType::Compressor => NodeKind::Compressor(CompressorParams {
                threshold: -24.0,
                knee: 30.0,
                ratio: 12.0,
                attack: 0.003,
                release: 0.25,
            }),
            NodeType::Convolver => NodeKind::Convolver(ConvolverParams { normalize: true }),
            NodeType::WaveShaper => NodeKind::WaveShaper(WaveShaperParams { amount: 1.0 }),
            NodeType::Gain => NodeKind::Gain(GainParams { gain: 1.0 }),
            NodeType::BufferSource => NodeKind::BufferSource(BufferSourceParams {
                playback_rate: 1.0,
            }),
            NodeType::Wavetable => NodeKind::Wavetable(WavetableParams::default()),
            NodeType::Additive => NodeKind::Additive(AdditiveParams {
                note: 69.0,
                partial_gain_weight_power: 1.0,
            }),
            NodeType::Output => NodeKind::Output,
        }
    }

    /// Default parameters with every mutatable parameter drawn fresh from its
    /// random range.
    pub fn random<R: Rng + ?Sized>(node_type: NodeType, rng: &mut R) -> NodeKind {
        let mut kind = NodeKind::default_for(node_type);
        kind.randomize(rng);
        kind
    }

    /// Redraw every mutatable parameter from its random range.
    pub fn randomize<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        for spec in self.mutatable() {
            let value = random_value(&spec.schema, rng);
            self.set_param(spec.name, value);
        }
    }

    /// Parameters that the mutation engine may perturb.
    pub fn mutatable(&self) -> &'static [ParamSpec] {
        match self {
            NodeKind::Oscillator(_) => schema::OSCILLATOR,
            NodeKind::NoteOscillator(_) => schema::NOTE_OSCILLATOR,
            NodeKind::Generator(p) => match p.rate {
                Rate::Audio => schema::AUDIO_GENERATOR,
                Rate::Control => schema::CONTROL_GENERATOR,
            },
            NodeKind::NoteGenerator(_) => schema::NOTE_GENERATOR,
            NodeKind::PartialOutput(_) => schema::NONE,
            NodeKind::PartialEnvelope(_) => schema::PARTIAL_ENVELOPE,
            NodeKind::Filter(_) => schema::FILTER,
            NodeKind::Delay(_) => schema::DELAY,
            NodeKind::FeedbackDelay(_) => schema::FEEDBACK_DELAY,
            NodeKind::Compressor(_) => schema::COMPRESSOR,
            NodeKind::Convolver(_) => schema::NONE,
            NodeKind::WaveShaper(_) => schema::WAVE_SHAPER,
            NodeKind::Gain(_) => schema::GAIN,
            NodeKind::BufferSource(_) => schema::BUFFER_SOURCE,
            NodeKind::Wavetable(_) => schema::NONE,
            NodeKind::Additive(_) => schema::ADDITIVE,
            NodeKind::Output => schema::NONE,
        }
    }

    /// Parameters that may be driven by an incoming connection.
    pub fn connectable(&self) -> &'static [Connectable] {
        match self {
            NodeKind::Oscillator(_) => schema::OSCILLATOR_INPUTS,
            NodeKind::NoteOscillator(_) => schema::NOTE_OSCILLATOR_INPUTS,
            NodeKind::Filter(_) => schema::FILTER_INPUTS,
            NodeKind::Delay(_) => schema::DELAY_INPUTS,
            NodeKind::FeedbackDelay(_) => schema::FEEDBACK_DELAY_INPUTS,
            NodeKind::Compressor(_) => schema::COMPRESSOR_INPUTS,
            NodeKind::Convolver(_) => schema::CONVOLVER_INPUTS,
            NodeKind::WaveShaper(_) => schema::WAVE_SHAPER_INPUTS,
            NodeKind::Gain(_) => schema::GAIN_INPUTS,
            NodeKind::BufferSource(_) => schema::BUFFER_SOURCE_INPUTS,
            NodeKind::Wavetable(_) => schema::WAVETABLE_INPUTS,
            NodeKind::Additive(_) => schema::ADDITIVE_INPUTS,
            NodeKind::Generator(_)
            | NodeKind::NoteGenerator(_)
            | NodeKind::PartialOutput(_)
            | NodeKind::PartialEnvelope(_)
            | NodeKind::Output => schema::NO_INPUTS,
        }
    }

    pub fn connectable_param(&self, name: &str) -> Option<&'static Connectable> {
        self.connectable().iter().find(|c| c.name == name)
    }

    pub fn mutatable_param(&self, name: &str) -> Option<&'static ParamSpec> {
        self.mutatable().iter().find(|p| p.name == name)
    }

    /// The signal source of a generator-style node.
    pub fn generator_source(&self) -> Option<GeneratorSource> {
        match self {
            NodeKind::Generator(p) => Some(p.source),
            NodeKind::NoteGenerator(p) => Some(p.source),
            NodeKind::PartialOutput(p) => Some(p.source),
            NodeKind::PartialEnvelope(p) => Some(p.source),
            _ => None,
        }
    }

    pub fn set_generator_source(&mut self, source: GeneratorSource) {
        match self {
            NodeKind::Generator(p) => p.source = source,
            NodeKind::NoteGenerator(p) => p.source = source,
            NodeKind::PartialOutput(p) => p.source = source,
            NodeKind::PartialEnvelope(p) => p.source = source,
            _ => {}
        }
    }

    /// Partial index of partial-output and partial-envelope nodes.
    pub fn partial(&self) -> Option<u32> {
        match self {
            NodeKind::PartialOutput(p) => Some(p.partial),
            NodeKind::PartialEnvelope(p) => Some(p.partial),
            _ => None,
        }
    }

    /// Base frequency in Hz for kinds that have one, before any note
    /// transposition.
    pub fn base_frequency(&self) -> Option<f64> {
        match self {
            NodeKind::Oscillator(p) => Some(p.frequency),
            NodeKind::NoteOscillator(p) => Some(midi_to_frequency(p.note)),
            NodeKind::Generator(p) => Some(p.frequency),
            NodeKind::NoteGenerator(p) => Some(midi_to_frequency(p.note)),
            NodeKind::PartialEnvelope(p) => Some(p.frequency),
            NodeKind::Additive(p) => Some(midi_to_frequency(p.note)),
            _ => None,
        }
    }

    /// Read a numeric parameter by name. Enumerations read as their index.
    pub fn get_param(&self, name: &str) -> Option<f64> {
        match (self, name) {
            (NodeKind::Oscillator(p), "waveform") => Some(p.waveform.index() as f64),
            (NodeKind::Oscillator(p), "frequency") => Some(p.frequency),
            (NodeKind::Oscillator(p), "detune") => Some(p.detune),
            (NodeKind::NoteOscillator(p), "waveform") => Some(p.waveform.index() as f64),
            (NodeKind::NoteOscillator(p), "note") => Some(p.note),
            (NodeKind::NoteOscillator(p), "detune") => Some(p.detune),
            (NodeKind::Generator(p), "frequency") => Some(p.frequency),
            (NodeKind::NoteGenerator(p), "note") => Some(p.note),
            (NodeKind::PartialEnvelope(p), "frequency") => Some(p.frequency),
            (NodeKind::Filter(p), "type") => Some(p.filter_type.index() as f64),
            (NodeKind::Filter(p), "frequency") => Some(p.frequency),
            (NodeKind::Filter(p), "q") => Some(p.q),
            (NodeKind::Filter(p), "gain") => Some(p.gain),
            (NodeKind::Delay(p), "delayTime") => Some(p.delay_time),
            (NodeKind::FeedbackDelay(p), "delayTime") => Some(p.delay_time),
            (NodeKind::FeedbackDelay(p), "feedback") => Some(p.feedback),
            (NodeKind::Compressor(p), "threshold") => Some(p.threshold),
            (NodeKind::Compressor(p), "knee") => Some(p.knee),
            (NodeKind::Compressor(p), "ratio") => Some(p.ratio),
            (NodeKind::Compressor(p), "attack") => Some(p.attack),
            (NodeKind::Compressor(p), "release") => Some(p.release),
            (NodeKind::WaveShaper(p), "amount") => Some(p.amount),
            (NodeKind::Gain(p), "gain") => Some(p.gain),
            (NodeKind::BufferSource(p), "playbackRate") => Some(p.playback_rate),
            (NodeKind::Additive(p), "note") => Some(p.note),
            (NodeKind::Additive(p), "partialGainWeightPower") => Some(p.partial_gain_weight_power),
            _ => None,
        }
    }

    /// Write a numeric parameter by name. Returns false for unknown names.
    pub fn set_param(&mut self, name: &str, value: f64) -> bool {
        match (self, name) {
            (NodeKind::Oscillator(p), "waveform") => p.waveform = Waveform::from_index(value as usize),
            (NodeKind::Oscillator(p), "frequency") => p.frequency = value,
            (NodeKind::Oscillator(p), "detune") => p.detune = value,
            (NodeKind::NoteOscillator(p), "waveform") => {
                p.waveform = Waveform::from_index(value as usize)
            }
            (NodeKind::NoteOscillator(p), "note") => p.note = value,
            (NodeKind::NoteOscillator(p), "detune") => p.detune = value,
            (NodeKind::Generator(p), "frequency") => p.frequency = value,
            (NodeKind::NoteGenerator(p), "note") => p.note = value,
            (NodeKind::PartialEnvelope(p), "frequency") => p.frequency = value,
            (NodeKind::Filter(p), "type") => p.filter_type = FilterType::from_index(value as usize),
            (NodeKind::Filter(p), "frequency") => p.frequency = value,
            (NodeKind::Filter(p), "q") => p.q = value,
            (NodeKind::Filter(p), "gain") => p.gain = value,
            (NodeKind::Delay(p), "delayTime") => p.delay_time = value,
            (NodeKind::FeedbackDelay(p), "delayTime") => p.delay_time = value,
            (NodeKind::FeedbackDelay(p), "feedback") => p.feedback = value,
            (NodeKind::Compressor(p), "threshold") => p.threshold = value,
            (NodeKind::Compressor(p), "knee") => p.knee = value,
            (NodeKind::Compressor(p), "ratio") => p.ratio = value,
            (NodeKind::Compressor(p), "attack") => p.attack = value,
            (NodeKind::Compressor(p), "release") => p.release = value,
            (NodeKind::WaveShaper(p), "amount") => p.amount = value,
            (NodeKind::Gain(p), "gain") => p.gain = value,
            (NodeKind::BufferSource(p), "playbackRate") => p.playback_rate = value,
            (NodeKind::Additive(p), "note") => p.note = value,
            (NodeKind::Additive(p), "partialGainWeightPower") => p.partial_gain_weight_power = value,
            _ => return false,
        }
        true
    }
}
