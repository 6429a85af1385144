//! Parameter schemas — which fields of a node may be mutated, and how, and
//! which may be driven by an incoming signal instead.
//!
//! Schemas are constant data attached to each node kind. A connection that
//! targets a parameter copies the target's schema when it is created, so
//! later changes to a node's schema never retroactively alter existing
//! connections.

use serde::{Deserialize, Serialize};

// ── Mutation Schema ─────────────────────────────────────────

/// How a delta bound moves between its two endpoints as the mutation
/// distance goes from 0 to 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Interpolation {
    Linear,
    Exponential,
}

/// Delta magnitude bounds. Each bound is a pair of endpoints: the value at
/// distance 0 and the value at distance 1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DeltaRange {
    pub min: [f64; 2],
    pub max: [f64; 2],
}

/// Everything the parametric mutation engine needs to perturb one number.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MutationSchema {
    pub delta: DeltaRange,
    pub law: Interpolation,
    /// Result is clamped into this range when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clamp: Option<[f64; 2]>,
    /// Range for fresh random replacement values.
    pub random: [f64; 2],
    #[serde(default)]
    pub discrete: bool,
    #[serde(default)]
    pub delta_inverse: bool,
    #[serde(default)]
    pub random_inverse: bool,
    /// Probability of a delta step rather than a random replacement.
    pub delta_chance: f64,
}

impl MutationSchema {
    /// A continuous schema: delta of `[lo0..lo1, hi0..hi1]`, sign may flip,
    /// clamped and randomised within `range`.
    pub const fn continuous(delta: DeltaRange, range: [f64; 2]) -> Self {
        MutationSchema {
            delta,
            law: Interpolation::Linear,
            clamp: Some(range),
            random: range,
            discrete: false,
            delta_inverse: true,
            random_inverse: false,
            delta_chance: 0.8,
        }
    }

    /// A continuous schema whose delta grows exponentially with distance.
    pub const fn exponential(delta: DeltaRange, range: [f64; 2]) -> Self {
        MutationSchema {
            law: Interpolation::Exponential,
            ..MutationSchema::continuous(delta, range)
        }
    }

    /// An integer-valued schema (enumerations, note numbers, indices).
    /// Random draws cover `[lo, hi + 1)` so truncation reaches `hi` as often
    /// as any other value.
    pub const fn discrete(delta: DeltaRange, range: [f64; 2]) -> Self {
        MutationSchema {
            random: [range[0], range[1] + 1.0],
            discrete: true,
            delta_chance: 0.5,
            ..MutationSchema::continuous(delta, range)
        }
    }

    /// Schema for plain (non-parameter) connection weights.
    pub const WEIGHT: MutationSchema = MutationSchema::continuous(
        DeltaRange {
            min: [0.01, 0.1],
            max: [0.1, 0.5],
        },
        [0.0, 1.0],
    );
}

/// A named, mutatable parameter of a node kind.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamSpec {
    pub name: &'static str,
    pub schema: MutationSchema,
}

// ── Connectable Parameters ──────────────────────────────────

/// What kind of signal a connectable parameter consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalKind {
    /// A scalar value that may be modulated at audio or control rate.
    Value,
    /// Whole-buffer content (audio buffer, impulse response, shaping curve).
    /// Only generator-style sources may drive these.
    Buffer,
}

/// A parameter that may be driven by an incoming connection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Connectable {
    pub name: &'static str,
    /// Legal range a [-1, 1] generator signal is remapped into.
    pub range: Option<[f64; 2]>,
    pub signal: SignalKind,
}

impl Connectable {
    pub const fn value(name: &'static str, lo: f64, hi: f64) -> Self {
        Connectable {
            name,
            range: Some([lo, hi]),
            signal: SignalKind::Value,
        }
    }

    pub const fn buffer(name: &'static str) -> Self {
        Connectable {
            name,
            range: None,
            signal: SignalKind::Buffer,
        }
    }

    pub fn is_buffer(&self) -> bool {
        self.signal == SignalKind::Buffer
    }
}

// ── Shared parameter names ──────────────────────────────────

pub const BUFFER: &str = "buffer";
pub const MIX: &str = "mix";
pub const CURVE: &str = "curve";
pub const PARTIAL_BUFFER: &str = "partialBuffer";
pub const PARTIAL_GAIN_ENVELOPE: &str = "partialGainEnvelope";

// ── Per-kind schema tables ──────────────────────────────────

const FREQUENCY_DELTA: DeltaRange = DeltaRange {
    min: [1.0, 50.0],
    max: [10.0, 500.0],
};

const NOTE_DELTA: DeltaRange = DeltaRange {
    min: [1.0, 1.0],
    max: [1.0, 12.0],
};

const UNIT_DELTA: DeltaRange = DeltaRange {
    min: [0.01, 0.05],
    max: [0.05, 0.5],
};

const DETUNE_DELTA: DeltaRange = DeltaRange {
    min: [1.0, 10.0],
    max: [10.0, 300.0],
};

const WAVEFORM: ParamSpec = ParamSpec {
    name: "waveform",
    schema: MutationSchema {
        delta_chance: 0.0,
        ..MutationSchema::discrete(NOTE_DELTA, [0.0, 3.0])
    },
};

const DETUNE: ParamSpec = ParamSpec {
    name: "detune",
    schema: MutationSchema::continuous(DETUNE_DELTA, [-1200.0, 1200.0]),
};

pub const OSCILLATOR: &[ParamSpec] = &[
    WAVEFORM,
    ParamSpec {
        name: "frequency",
        schema: MutationSchema::exponential(FREQUENCY_DELTA, [20.0, 2000.0]),
    },
    DETUNE,
];

pub const NOTE_OSCILLATOR: &[ParamSpec] = &[
    WAVEFORM,
    ParamSpec {
        name: "note",
        schema: MutationSchema::discrete(NOTE_DELTA, [24.0, 96.0]),
    },
    DETUNE,
];

pub const AUDIO_GENERATOR: &[ParamSpec] = &[ParamSpec {
    name: "frequency",
    schema: MutationSchema::exponential(FREQUENCY_DELTA, [20.0, 2000.0]),
}];

pub const CONTROL_GENERATOR: &[ParamSpec] = &[ParamSpec {
    name: "frequency",
    schema: MutationSchema::exponential(
        DeltaRange {
            min: [0.01, 0.1],
            max: [0.1, 5.0],
        },
        [0.1, 20.0],
    ),
}];

pub const NOTE_GENERATOR: &[ParamSpec] = &[ParamSpec {
    name: "note",
    schema: MutationSchema::discrete(NOTE_DELTA, [24.0, 96.0]),
}];

pub const PARTIAL_ENVELOPE: &[ParamSpec] = CONTROL_GENERATOR;

pub const FILTER: &[ParamSpec] = &[
    ParamSpec {
        name: "type",
        schema: MutationSchema {
            delta_chance: 0.0,
            ..MutationSchema::discrete(NOTE_DELTA, [0.0, 4.0])
        },
    },
    ParamSpec {
        name: "frequency",
        schema: MutationSchema::exponential(FREQUENCY_DELTA, [20.0, 10000.0]),
    },
    ParamSpec {
        name: "q",
        schema: MutationSchema::continuous(
            DeltaRange {
                min: [0.01, 0.5],
                max: [0.1, 5.0],
            },
            [0.1, 20.0],
        ),
    },
    ParamSpec {
        name: "gain",
        schema: MutationSchema::continuous(
            DeltaRange {
                min: [0.1, 1.0],
                max: [1.0, 10.0],
            },
            [-20.0, 20.0],
        ),
    },
];

const DELAY_TIME: ParamSpec = ParamSpec {
    name: "delayTime",
    schema: MutationSchema::continuous(UNIT_DELTA, [0.0, 1.0]),
};

pub const DELAY: &[ParamSpec] = &[DELAY_TIME];

pub const FEEDBACK_DELAY: &[ParamSpec] = &[
    DELAY_TIME,
    ParamSpec {
        name: "feedback",
        schema: MutationSchema::continuous(UNIT_DELTA, [0.0, 0.9]),
    },
];

pub const COMPRESSOR: &[ParamSpec] = &[
    ParamSpec {
        name: "threshold",
        schema: MutationSchema::continuous(
            DeltaRange {
                min: [0.5, 2.0],
                max: [2.0, 20.0],
            },
            [-60.0, 0.0],
        ),
    },
    ParamSpec {
        name: "knee",
        schema: MutationSchema::continuous(
            DeltaRange {
                min: [0.5, 2.0],
                max: [2.0, 10.0],
            },
            [0.0, 40.0],
        ),
    },
    ParamSpec {
        name: "ratio",
        schema: MutationSchema::continuous(
            DeltaRange {
                min: [0.1, 1.0],
                max: [1.0, 5.0],
            },
            [1.0, 20.0],
        ),
    },
    ParamSpec {
        name: "attack",
        schema: MutationSchema::continuous(UNIT_DELTA, [0.0, 1.0]),
    },
    ParamSpec {
        name: "release",
        schema: MutationSchema::continuous(UNIT_DELTA, [0.0, 1.0]),
    },
];

pub const WAVE_SHAPER: &[ParamSpec] = &[ParamSpec {
    name: "amount",
    schema: MutationSchema::continuous(
        DeltaRange {
            min: [0.05, 0.5],
            max: [0.5, 5.0],
        },
        [0.0, 50.0],
    ),
}];

pub const GAIN: &[ParamSpec] = &[ParamSpec {
    name: "gain",
    schema: MutationSchema::continuous(UNIT_DELTA, [0.0, 1.0]),
}];

pub const BUFFER_SOURCE: &[ParamSpec] = &[ParamSpec {
    name: "playbackRate",
    schema: MutationSchema::continuous(UNIT_DELTA, [0.25, 4.0]),
}];

pub const ADDITIVE: &[ParamSpec] = &[
    ParamSpec {
        name: "note",
        schema: MutationSchema::discrete(NOTE_DELTA, [24.0, 96.0]),
    },
    ParamSpec {
        name: "partialGainWeightPower",
        schema: MutationSchema::continuous(UNIT_DELTA, [0.0, 3.0]),
    },
];

pub const NONE: &[ParamSpec] = &[];

// ── Connectable tables ──────────────────────────────────────

pub const OSCILLATOR_INPUTS: &[Connectable] = &[
    Connectable::value("frequency", 20.0, 2000.0),
    Connectable::value("detune", -1200.0, 1200.0),
];

pub const NOTE_OSCILLATOR_INPUTS: &[Connectable] = &[Connectable::value("detune", -1200.0, 1200.0)];

pub const FILTER_INPUTS: &[Connectable] = &[
    Connectable::value("frequency", 20.0, 10000.0),
    Connectable::value("q", 0.1, 20.0),
    Connectable::value("gain", -20.0, 20.0),
];

pub const DELAY_INPUTS: &[Connectable] = &[Connectable::value("delayTime", 0.0, 1.0)];

pub const FEEDBACK_DELAY_INPUTS: &[Connectable] = &[
    Connectable::value("delayTime", 0.0, 1.0),
    Connectable::value("feedback", 0.0, 0.9),
];

pub const COMPRESSOR_INPUTS: &[Connectable] = &[
    Connectable::value("threshold", -60.0, 0.0),
    Connectable::value("knee", 0.0, 40.0),
    Connectable::value("ratio", 1.0, 20.0),
    Connectable::value("attack", 0.0, 1.0),
    Connectable::value("release", 0.0, 1.0),
];

pub const CONVOLVER_INPUTS: &[Connectable] = &[Connectable::buffer(BUFFER)];

pub const WAVE_SHAPER_INPUTS: &[Connectable] = &[Connectable::buffer(CURVE)];

pub const GAIN_INPUTS: &[Connectable] = &[Connectable::value("gain", 0.0, 1.0)];

pub const BUFFER_SOURCE_INPUTS: &[Connectable] = &[
    Connectable::buffer(BUFFER),
    Connectable::value("playbackRate", 0.25, 4.0),
];

pub const WAVETABLE_INPUTS: &[Connectable] = &[
    Connectable::buffer(BUFFER),
    Connectable::value(MIX, -1.0, 1.0),
];

pub const ADDITIVE_INPUTS: &[Connectable] = &[
    Connectable::buffer(PARTIAL_BUFFER),
    Connectable {
        name: PARTIAL_GAIN_ENVELOPE,
        range: Some([0.0, 1.0]),
        signal: SignalKind::Buffer,
    },
];

pub const NO_INPUTS: &[Connectable] = &[];
