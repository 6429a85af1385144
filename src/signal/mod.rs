//! Signal compiler — binds evaluated network outputs into a compiled graph
//! and produces the [`RenderGraph`] the engine executes.
//!
//! Value parameters driven by generators are automated with the output
//! remapped into the parameter's range. Buffer parameters receive the raw
//! signal: convolver impulses, wave-shaper curves, buffer-source and
//! wavetable playback, additive partials. Generators wired to a primary
//! input become playback nodes.

pub mod additive;
pub mod noise;
pub mod wavetable;

use std::collections::BTreeMap;

use tracing::debug;

use crate::bridge::{AudioGraph, GraphNodeKind, NetworkOutput, node_key};
use crate::config::RenderRequest;
use crate::dsp::engine::{RenderGraph, RenderKind, RenderNode};
use crate::dsp::envelope::FadeEnvelope;
use crate::dsp::pitch::{midi_to_frequency, transpose_semitones};
use crate::error::RenderError;
use crate::orchestrator::{EvaluatedOutputs, OutputKey};
use crate::patch::schema::{BUFFER, CURVE, MIX, PARTIAL_BUFFER, PARTIAL_GAIN_ENVELOPE};
use crate::patch::{GeneratorSource, NodeId, NodeKind};

use additive::Partial;

struct Binding<'a> {
    output: &'a NetworkOutput,
    buffer: Vec<f64>,
}

type Bindings<'a> = BTreeMap<(&'a str, Option<&'a str>), Vec<Binding<'a>>>;

/// Map a network value in [-1, 1] into `range`; passthrough without one.
pub fn remap(value: f64, range: Option<[f64; 2]>) -> f64 {
    match range {
        Some([lo, hi]) => lo + (value + 1.0) * 0.5 * (hi - lo),
        None => value,
    }
}

/// Element-wise mean.
fn average(buffers: &[Vec<f64>], len: usize) -> Vec<f64> {
    if buffers.is_empty() {
        return vec![0.0; len];
    }
    let n = buffers.len() as f64;
    (0..len)
        .map(|t| buffers.iter().map(|b| b.get(t).copied().unwrap_or(0.0)).sum::<f64>() / n)
        .collect()
}

fn feedback_key(key: &str) -> String {
    format!("{key}:fb")
}

fn playback_key(output: &NetworkOutput) -> String {
    format!("p{}", output.connection.id)
}

fn is_feedback_delay(graph: &AudioGraph, key: &str) -> bool {
    matches!(
        graph.node(key).map(|n| &n.kind),
        Some(GraphNodeKind::Node(NodeKind::FeedbackDelay(_)))
    )
}

/// Render key and parameter that realize `(key, param)` of the compiled
/// graph. A feedback delay's `feedback` lives on its loop gain.
fn route<'a>(graph: &AudioGraph, key: &str, param: Option<&'a str>) -> (String, Option<&'a str>) {
    if param == Some("feedback") && is_feedback_delay(graph, key) {
        (feedback_key(key), Some("gain"))
    } else {
        (key.to_string(), param)
    }
}

/// Whether `key`'s output reaches a signal input, looking through weight
/// gains.
fn feeds_audio(graph: &AudioGraph, key: &str) -> bool {
    graph.node(key).is_some_and(|n| {
        n.outputs.iter().any(|t| {
            t.param.is_none()
                && match graph.node(&t.key).map(|n| &n.kind) {
                    Some(GraphNodeKind::WeightGain(_)) => feeds_audio(graph, &t.key),
                    _ => true,
                }
        })
    })
}

fn connectable_range(graph: &AudioGraph, key: &str, param: &str) -> Option<[f64; 2]> {
    match graph.node(key).map(|n| &n.kind) {
        Some(GraphNodeKind::Node(kind)) => kind.connectable_param(param).and_then(|c| c.range),
        _ => None,
    }
}

fn source_buffer(
    output: &NetworkOutput,
    outputs: &EvaluatedOutputs,
    request: &RenderRequest,
) -> Result<Vec<f64>, RenderError> {
    let len = request.num_samples();
    match output.source {
        GeneratorSource::Noise(kind) => {
            let mut buffer = noise::generate(kind, len, output.generator.0);
            for v in &mut buffer {
                *v *= request.velocity;
            }
            Ok(buffer)
        }
        GeneratorSource::Output(index) => {
            let mut buffer = outputs
                .get(&OutputKey::new(index, output.frequency))
                .ok_or(RenderError::MissingOutput(output.generator))?
                .clone();
            buffer.resize(len, 0.0);
            Ok(buffer)
        }
    }
}

/// Remapped, averaged value signal of the bindings on one parameter.
fn value_signal(graph: &AudioGraph, key: &str, param: &str, list: &[Binding<'_>], len: usize) -> Vec<f64> {
    let fallback = connectable_range(graph, key, param);
    let remapped: Vec<Vec<f64>> = list
        .iter()
        .map(|b| {
            let range = b.output.range.or(fallback);
            b.buffer.iter().map(|&v| remap(v, range)).collect()
        })
        .collect();
    average(&remapped, len)
}

fn raw_buffers(list: Option<Vec<Binding<'_>>>) -> Vec<Vec<f64>> {
    list.unwrap_or_default().into_iter().map(|b| b.buffer).collect()
}

/// Compile `graph` with its evaluated `outputs` into an executable graph.
pub fn compile(
    graph: &AudioGraph,
    outputs: &EvaluatedOutputs,
    request: &RenderRequest,
) -> Result<RenderGraph, RenderError> {
    request.validate()?;
    let len = request.num_samples();
    let fade = FadeEnvelope::new(request.fade_samples);

    let mut bindings: Bindings<'_> = BTreeMap::new();
    for output in &graph.network_outputs {
        if graph.node(&output.target).is_none() {
            return Err(RenderError::UnknownNode(output.target.clone()));
        }
        let mut buffer = source_buffer(output, outputs, request)?;
        if output.audio_rate {
            fade.apply(&mut buffer);
        }
        bindings
            .entry((output.target.as_str(), output.param.as_deref()))
            .or_default()
            .push(Binding { output, buffer });
    }
    if !graph.fan_in.is_empty() {
        debug!(groups = graph.fan_in.len(), "averaging generator fan-in");
    }

    let mut render = RenderGraph::new(node_key(NodeId::OUTPUT));
    for (key, node) in &graph.nodes {
        match &node.kind {
            GraphNodeKind::WeightGain(conn) => {
                render.insert(key.clone(), RenderNode::new(RenderKind::Gain { gain: conn.weight }))
            }
            GraphNodeKind::Node(kind) => {
                bind_node(&mut render, graph, key, kind, &mut bindings, request)
            }
        }
    }

    for (key, node) in &graph.nodes {
        for target in &node.outputs {
            let (to, param) = route(graph, &target.key, target.param.as_deref());
            render.connect(key, &to, param)?;
        }
    }

    // Whatever the node builders did not consume: primary-input playback and
    // value automation.
    for ((key, param), list) in bindings {
        match param {
            None => {
                for b in list {
                    let pkey = playback_key(b.output);
                    let weight = b.output.connection.weight;
                    let buffer = b.buffer.into_iter().map(|v| v * weight).collect();
                    render.insert(
                        pkey.clone(),
                        RenderNode::new(RenderKind::Playback {
                            buffer,
                            playback_rate: 1.0,
                        }),
                    );
                    render.connect(&pkey, key, None)?;
                }
            }
            Some(param) => {
                let signal = value_signal(graph, key, param, &list, len);
                let (to, param) = route(graph, key, Some(param));
                if let (Some(node), Some(param)) = (render.nodes.get_mut(&to), param) {
                    node.automation.insert(param.to_string(), signal);
                }
            }
        }
    }

    Ok(render)
}

/// Insert the render node(s) for one patch node, consuming the buffer-style
/// bindings it owns.
fn bind_node<'a>(
    render: &mut RenderGraph,
    graph: &AudioGraph,
    key: &'a str,
    kind: &NodeKind,
    bindings: &mut Bindings<'a>,
    request: &RenderRequest,
) {
    let len = request.num_samples();
    let mut take = |param: &'a str| bindings.remove(&(key, Some(param)));

    let render_kind = match kind {
        NodeKind::Output => return,
        NodeKind::Oscillator(p) => {
            let frequency = if feeds_audio(graph, key) {
                transpose_semitones(p.frequency, graph.note_delta)
            } else {
                p.frequency
            };
            RenderKind::Oscillator {
                waveform: p.waveform,
                frequency,
                detune: p.detune,
            }
        }
        NodeKind::NoteOscillator(p) => RenderKind::Oscillator {
            waveform: p.waveform,
            frequency: transpose_semitones(midi_to_frequency(p.note), graph.note_delta),
            detune: p.detune,
        },
        NodeKind::Filter(p) => RenderKind::Filter {
            filter_type: p.filter_type,
            frequency: p.frequency,
            q: p.q,
            gain: p.gain,
        },
        NodeKind::Delay(p) => RenderKind::Delay {
            delay_time: p.delay_time,
        },
        NodeKind::FeedbackDelay(p) => {
            let fb = feedback_key(key);
            let mut delay = RenderNode::new(RenderKind::Delay {
                delay_time: p.delay_time,
            });
            delay.inputs.push(fb.clone());
            let mut gain = RenderNode::new(RenderKind::Gain { gain: p.feedback });
            gain.inputs.push(key.to_string());
            render.insert(key, delay);
            render.insert(fb, gain);
            return;
        }
        NodeKind::Compressor(p) => RenderKind::Compressor {
            threshold: p.threshold,
            knee: p.knee,
            ratio: p.ratio,
            attack: p.attack,
            release: p.release,
        },
        NodeKind::Convolver(p) => {
            let buffers = raw_buffers(take(BUFFER));
            let impulse = if buffers.is_empty() {
                vec![1.0]
            } else {
                average(&buffers, len)
            };
            RenderKind::Convolver {
                impulse,
                normalize: p.normalize,
            }
        }
        NodeKind::WaveShaper(p) => {
            let buffers = raw_buffers(take(CURVE));
            RenderKind::WaveShaper {
                curve: (!buffers.is_empty()).then(|| average(&buffers, len)),
                amount: p.amount,
            }
        }
        NodeKind::Gain(p) => RenderKind::Gain { gain: p.gain },
        NodeKind::BufferSource(p) => RenderKind::Playback {
            buffer: average(&raw_buffers(take(BUFFER)), len),
            playback_rate: p.playback_rate,
        },
        NodeKind::Wavetable(_) => {
            let sources = raw_buffers(take(BUFFER));
            let control = take(MIX).map(|list| value_signal(graph, key, MIX, &list, len));
            RenderKind::Playback {
                buffer: wavetable::blend(&sources, control.as_deref(), len),
                playback_rate: 1.0,
            }
        }
        NodeKind::Additive(p) => {
            let mut partials: BTreeMap<u32, (Vec<Vec<f64>>, Vec<Vec<f64>>)> = BTreeMap::new();
            for b in take(PARTIAL_BUFFER).unwrap_or_default() {
                let n = b.output.partial.unwrap_or(1);
                partials.entry(n).or_default().0.push(b.buffer);
            }
            if let Some(list) = take(PARTIAL_GAIN_ENVELOPE) {
                let fallback = connectable_range(graph, key, PARTIAL_GAIN_ENVELOPE);
                for b in list {
                    let n = b.output.partial.unwrap_or(1);
                    let range = b.output.range.or(fallback);
                    let env = b.buffer.iter().map(|&v| remap(v, range)).collect();
                    partials.entry(n).or_default().1.push(env);
                }
            }
            let partials: BTreeMap<u32, Partial> = partials
                .into_iter()
                .map(|(n, (buffers, envelopes))| {
                    let partial = Partial {
                        buffer: (!buffers.is_empty()).then(|| average(&buffers, len)),
                        envelope: (!envelopes.is_empty()).then(|| average(&envelopes, len)),
                    };
                    (n, partial)
                })
                .collect();
            RenderKind::Playback {
                buffer: additive::synthesize(&partials, p.partial_gain_weight_power, len),
                playback_rate: 1.0,
            }
        }
        NodeKind::Generator(_)
        | NodeKind::NoteGenerator(_)
        | NodeKind::PartialOutput(_)
        | NodeKind::PartialEnvelope(_) => return,
    };
    render.insert(key, RenderNode::new(render_kind));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::compile as compile_graph;
    use crate::config::OperatorWeights;
    use crate::dsp::engine::render as render_graph;
    use crate::dsp::mixer::peak;
    use crate::dsp::oscillator::Waveform;
    use crate::patch::node::{GeneratorParams, OscillatorParams};
    use crate::patch::{NoiseKind, NodeType, Patch, Rate};
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn request() -> RenderRequest {
        RenderRequest {
            duration: 0.05,
            sample_rate: 8000.0,
            fade_samples: 16,
            ..RenderRequest::default()
        }
    }

    fn constant_outputs(graph: &AudioGraph, value: f64, len: usize) -> EvaluatedOutputs {
        graph
            .network_outputs
            .iter()
            .filter_map(|o| o.source.output_index().map(|i| (OutputKey::new(i, o.frequency), vec![value; len])))
            .collect()
    }

    #[test]
    fn remap_into_ranges() {
        assert_eq!(remap(-1.0, Some([20.0, 2000.0])), 20.0);
        assert_eq!(remap(1.0, Some([20.0, 2000.0])), 2000.0);
        assert_eq!(remap(0.0, Some([0.0, 1.0])), 0.5);
        assert_eq!(remap(0.3, None), 0.3);
    }

    #[test]
    fn seeded_patch_plays_its_generator() {
        let mut rng = StdRng::seed_from_u64(61);
        let patch = Patch::seeded(OperatorWeights::default(), &mut rng);
        let graph = compile_graph(&patch, 0);
        let req = request();
        let outputs = constant_outputs(&graph, 0.5, req.num_samples());
        let render = compile(&graph, &outputs, &req).unwrap();
        let playback = render.nodes.keys().find(|k| k.starts_with('p')).expect("playback node");
        match &render.nodes[playback].kind {
            RenderKind::Playback { buffer, .. } => {
                // Audio-rate generators are faded.
                assert_eq!(buffer[0], 0.0);
                assert_eq!(buffer[200], 0.5);
            }
            other => panic!("unexpected {other:?}"),
        }
        let samples = render_graph(&render, &req).unwrap();
        assert_eq!(samples.len(), req.num_samples());
        assert!(peak(&samples) > 0.0 && peak(&samples) <= 1.0);
    }

    #[test]
    fn missing_outputs_are_errors() {
        let mut rng = StdRng::seed_from_u64(62);
        let patch = Patch::seeded(OperatorWeights::default(), &mut rng);
        let graph = compile_graph(&patch, 0);
        let err = compile(&graph, &EvaluatedOutputs::new(), &request()).unwrap_err();
        assert!(matches!(err, RenderError::MissingOutput(_)));
    }

    #[test]
    fn parameters_are_automated_and_averaged() {
        let mut rng = StdRng::seed_from_u64(63);
        let mut patch = Patch::new();
        let osc = patch.add_node(NodeKind::default_for(NodeType::Oscillator), &mut rng);
        let filter = patch.add_node(NodeKind::default_for(NodeType::Filter), &mut rng);
        patch.connect(osc, filter, None, 1.0, &mut rng);
        patch.connect(filter, NodeId::OUTPUT, None, 1.0, &mut rng);
        for index in [0, 1] {
            let g = patch.add_node(
                NodeKind::Generator(GeneratorParams {
                    source: GeneratorSource::Output(index),
                    rate: Rate::Control,
                    frequency: 2.0,
                }),
                &mut rng,
            );
            patch.connect(g, filter, Some("q"), 1.0, &mut rng);
        }
        let graph = compile_graph(&patch, 0);
        let req = request();
        let len = req.num_samples();
        let mut outputs = EvaluatedOutputs::new();
        outputs.insert(OutputKey::new(0, 2.0), vec![-1.0; len]);
        outputs.insert(OutputKey::new(1, 2.0), vec![1.0; len]);
        let render = compile(&graph, &outputs, &req).unwrap();
        let q = &render.nodes[&node_key(filter)].automation["q"];
        let range = patch
            .connections
            .iter()
            .find(|c| c.param() == Some("q"))
            .and_then(|c| c.range)
            .unwrap();
        assert!((q[10] - (range[0] + range[1]) / 2.0).abs() < 1e-9);
    }

    #[test]
    fn audible_oscillators_follow_the_note() {
        let mut rng = StdRng::seed_from_u64(64);
        let mut patch = Patch::new();
        let audible = patch.add_node(
            NodeKind::Oscillator(OscillatorParams {
                waveform: Waveform::Sine,
                frequency: 220.0,
                detune: 0.0,
            }),
            &mut rng,
        );
        let lfo = patch.add_node(
            NodeKind::Oscillator(OscillatorParams {
                waveform: Waveform::Sine,
                frequency: 220.0,
                detune: 0.0,
            }),
            &mut rng,
        );
        let gain = patch.add_node(NodeKind::default_for(NodeType::Gain), &mut rng);
        patch.connect(audible, gain, None, 1.0, &mut rng);
        patch.connect(lfo, gain, Some("gain"), 0.5, &mut rng);
        patch.connect(gain, NodeId::OUTPUT, None, 1.0, &mut rng);

        let render = compile(&compile_graph(&patch, 12), &EvaluatedOutputs::new(), &request()).unwrap();
        let freq = |id| match &render.nodes[&node_key(id)].kind {
            RenderKind::Oscillator { frequency, .. } => *frequency,
            other => panic!("unexpected {other:?}"),
        };
        assert!((freq(audible) - 440.0).abs() < 1e-9);
        assert!((freq(lfo) - 220.0).abs() < 1e-9);
    }

    #[test]
    fn feedback_delay_expands_into_a_loop() {
        let mut rng = StdRng::seed_from_u64(65);
        let mut patch = Patch::new();
        let osc = patch.add_node(NodeKind::default_for(NodeType::Oscillator), &mut rng);
        let delay = patch.add_node(NodeKind::default_for(NodeType::FeedbackDelay), &mut rng);
        patch.connect(osc, delay, None, 1.0, &mut rng);
        patch.connect(delay, NodeId::OUTPUT, None, 1.0, &mut rng);
        let render = compile(&compile_graph(&patch, 0), &EvaluatedOutputs::new(), &request()).unwrap();
        let key = node_key(delay);
        let fb = format!("{key}:fb");
        assert!(render.nodes[&key].inputs.contains(&fb));
        assert_eq!(render.nodes[&fb].inputs, vec![key.clone()]);
        let samples = render_graph(&render, &request()).unwrap();
        assert!(samples.iter().all(|s| s.is_finite()));
    }

    #[test]
    fn noise_generators_need_no_network() {
        let mut rng = StdRng::seed_from_u64(66);
        let mut patch = Patch::new();
        let source = patch.add_node(NodeKind::default_for(NodeType::BufferSource), &mut rng);
        patch.connect(source, NodeId::OUTPUT, None, 1.0, &mut rng);
        let noise = patch.add_node(
            NodeKind::Generator(GeneratorParams {
                source: GeneratorSource::Noise(NoiseKind::Pink),
                rate: Rate::Audio,
                frequency: 440.0,
            }),
            &mut rng,
        );
        patch.connect(noise, source, Some(BUFFER), 1.0, &mut rng);
        let render = compile(&compile_graph(&patch, 0), &EvaluatedOutputs::new(), &request()).unwrap();
        match &render.nodes[&node_key(source)].kind {
            RenderKind::Playback { buffer, .. } => assert!(peak(buffer) > 0.0),
            other => panic!("unexpected {other:?}"),
        }
    }
}
