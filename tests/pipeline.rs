//! End-to-end properties of the genome pipeline.

use std::collections::BTreeSet;

use rand::SeedableRng;
use rand::rngs::StdRng;

use synthgenome::bridge;
use synthgenome::config::{Backend, EvolutionConfig, OperatorWeights, OrchestratorConfig, RenderRequest};
use synthgenome::cppn::{Cppn, CppnDriver, OffspringDriver};
use synthgenome::crossover::crossover;
use synthgenome::dsp::envelope::FadeEnvelope;
use synthgenome::dsp::mixer::peak;
use synthgenome::error::{EvolveError, GenomeError};
use synthgenome::evolve::produce_offspring;
use synthgenome::genome::Genome;
use synthgenome::mutation::legality::check_kinds;
use synthgenome::mutation::mutate;
use synthgenome::mutation::structural::add_connection;
use synthgenome::orchestrator::{Orchestrator, PatternSource};
use synthgenome::patch::{Changed, NodeId, NodeKind, NodeType, Patch};
use synthgenome::signal::wavetable::blend;

fn grown_patch(seed: u64, rounds: usize) -> Patch {
    let mut rng = StdRng::seed_from_u64(seed);
    let config = EvolutionConfig::default();
    let mut patch = Patch::seeded(OperatorWeights::default(), &mut rng);
    for _ in 0..rounds {
        mutate(&mut patch, &config, &mut rng);
    }
    patch
}

fn evolved_network(seed: u64, generations: usize) -> Cppn {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut driver = CppnDriver::default();
    let mut net = driver.offspring(&[], &mut rng);
    for _ in 0..generations {
        net = driver.offspring(&[&net], &mut rng);
    }
    net
}

#[test]
fn one_second_note_at_48k() {
    let mut rng = StdRng::seed_from_u64(2024);
    let mut driver = CppnDriver::default();
    let mut genome: Genome<Cppn> = Genome::seeded(7, OperatorWeights::default(), &mut driver, &mut rng);
    let request = RenderRequest::default();
    let samples = genome
        .render(&request, &OrchestratorConfig::default(), &mut driver, &mut rng)
        .unwrap();

    assert_eq!(samples.len(), 48_000);
    assert!(samples.iter().all(|s| s.is_finite()));
    assert!(peak(&samples) <= 1.0);

    let fade = FadeEnvelope::new(128);
    let len = samples.len();
    for i in 0..128 {
        let bound = fade.gain_at(i, len) + 1e-12;
        assert!(samples[i].abs() <= bound, "head sample {i}");
        assert!(samples[len - 1 - i].abs() <= bound, "tail sample {i}");
    }
}

#[test]
fn fade_shapes_the_rendered_edges() {
    let mut rng = StdRng::seed_from_u64(2025);
    let mut driver = CppnDriver::default();
    let mut patch = Patch::new();
    let osc = patch.add_node(NodeKind::default_for(NodeType::Oscillator), &mut rng);
    patch.connect(osc, NodeId::OUTPUT, None, 1.0, &mut rng);
    let network = driver.offspring(&[], &mut rng);
    let mut genome = Genome::new(3, patch, PatternSource::Shared(network));

    let faded_request = RenderRequest {
        duration: 0.1,
        fade_samples: 256,
        ..RenderRequest::default()
    };
    let raw_request = RenderRequest {
        fade_samples: 0,
        ..faded_request.clone()
    };
    let orchestrator = OrchestratorConfig::default();
    let faded = genome
        .render(&faded_request, &orchestrator, &mut driver, &mut rng)
        .unwrap();
    let raw = genome
        .render(&raw_request, &orchestrator, &mut driver, &mut rng)
        .unwrap();
    assert_eq!(faded.len(), raw.len());

    let fade = FadeEnvelope::new(256);
    let len = faded.len();
    assert_eq!(faded[0], 0.0);
    assert_eq!(faded[len - 1], 0.0);
    let mut last_head = 0.0;
    let mut last_tail = 0.0;
    for i in 0..256 {
        for at in [i, len - 1 - i] {
            let expected = fade.gain_at(at, len) * raw[at];
            assert!((faded[at] - expected).abs() < 1e-12, "sample {at}");
            assert!(faded[at].abs() <= raw[at].abs() + 1e-12, "sample {at}");
        }
        // Where the raw signal is audible, the applied gain only grows
        // towards the middle of the buffer.
        if raw[i].abs() > 1e-3 {
            let gain = faded[i] / raw[i];
            assert!(gain >= last_head - 1e-9, "head sample {i}");
            last_head = gain;
        }
        let t = len - 1 - i;
        if raw[t].abs() > 1e-3 {
            let gain = faded[t] / raw[t];
            assert!(gain >= last_tail - 1e-9, "tail sample {t}");
            last_tail = gain;
        }
    }
    assert_eq!(faded[256..len - 256], raw[256..len - 256]);
}

#[test]
fn chunk_size_is_invisible() {
    let patch = grown_patch(11, 12);
    let graph = bridge::compile(&patch, 0);
    let mut rng = StdRng::seed_from_u64(12);
    let mut driver = CppnDriver::default();
    let mut pattern = PatternSource::Shared(evolved_network(13, 10));

    for anti_alias in [false, true] {
        let request = RenderRequest {
            duration: 0.1,
            sample_rate: 8000.0,
            anti_alias,
            ..RenderRequest::default()
        };
        let whole = Orchestrator::new(OrchestratorConfig {
            chunk_size: 1 << 20,
            ..OrchestratorConfig::default()
        })
        .evaluate_graph(&mut pattern, &graph, &request, &mut driver, &mut rng)
        .unwrap();
        let chunked = Orchestrator::new(OrchestratorConfig {
            chunk_size: 61,
            ..OrchestratorConfig::default()
        })
        .evaluate_graph(&mut pattern, &graph, &request, &mut driver, &mut rng)
        .unwrap();
        assert_eq!(whole.len(), chunked.len());
        for (key, column) in &whole {
            for (a, b) in column.iter().zip(&chunked[key]) {
                assert!((a - b).abs() <= 1e-12, "{key:?} anti_alias={anti_alias}");
            }
        }
    }
}

#[test]
fn batched_and_sequential_backends_agree() {
    let patch = grown_patch(21, 12);
    let graph = bridge::compile(&patch, 0);
    let mut rng = StdRng::seed_from_u64(22);
    let mut driver = CppnDriver::default();
    let mut pattern = PatternSource::Shared(evolved_network(23, 30));
    let request = RenderRequest {
        duration: 0.1,
        sample_rate: 8000.0,
        ..RenderRequest::default()
    };

    let batched = Orchestrator::new(OrchestratorConfig {
        chunk_size: 100,
        ..OrchestratorConfig::default()
    })
    .evaluate_graph(&mut pattern, &graph, &request, &mut driver, &mut rng)
    .unwrap();
    let sequential = Orchestrator::new(OrchestratorConfig {
        backend: Backend::Sequential,
        ..OrchestratorConfig::default()
    })
    .evaluate_graph(&mut pattern, &graph, &request, &mut driver, &mut rng)
    .unwrap();

    assert_eq!(batched.keys().collect::<Vec<_>>(), sequential.keys().collect::<Vec<_>>());
    for (key, column) in &batched {
        for (a, b) in column.iter().zip(&sequential[key]) {
            assert!((a - b).abs() <= 1e-9, "{key:?}");
        }
    }
}

#[test]
fn added_connections_are_always_legal() {
    let mut rng = StdRng::seed_from_u64(31);
    let config = EvolutionConfig::default();
    let mut patch = Patch::seeded(OperatorWeights::default(), &mut rng);

    for trial in 0..10_000 {
        if trial % 10 == 0 {
            patch = Patch::seeded(OperatorWeights::default(), &mut rng);
        }
        mutate(&mut patch, &config, &mut rng);
        let outcome = add_connection(&mut patch, &config, trial % 2 == 0, &mut rng);
        let Some(Changed::Connection(id)) = outcome.changed.first().copied() else {
            continue;
        };
        let conn = patch.connection(id).unwrap().clone();
        let source = &patch.node(conn.source).unwrap().kind;
        let target = &patch.node(conn.target).unwrap().kind;
        assert!(
            check_kinds(source, target, conn.param()).is_ok(),
            "trial {trial}: {}",
            outcome.description
        );
        assert!(!patch.reaches(conn.target, conn.source), "trial {trial}: cycle");
        patch.validate().unwrap();
    }
}

#[test]
fn mutation_keeps_one_sink_and_valid_endpoints() {
    let patch = grown_patch(41, 200);
    let sinks = patch.nodes.iter().filter(|n| matches!(n.kind, NodeKind::Output)).count();
    assert_eq!(sinks, 1);
    assert!(patch.node(NodeId::OUTPUT).is_some());
    for conn in &patch.connections {
        assert!(patch.node(conn.source).is_some());
        assert!(patch.node(conn.target).is_some());
    }
}

#[test]
fn crossover_merges_by_identity() {
    let mut rng = StdRng::seed_from_u64(51);
    let config = EvolutionConfig::default();
    let a = grown_patch(52, 6);
    let mut b = a.clone();
    for _ in 0..6 {
        mutate(&mut b, &config, &mut rng);
    }

    let child = crossover(&a, &b, &mut rng);
    let node_ids: BTreeSet<_> = a.nodes.iter().chain(&b.nodes).map(|n| n.id).collect();
    let conn_ids: BTreeSet<_> = a.connections.iter().chain(&b.connections).map(|c| c.id).collect();
    assert_eq!(child.nodes.len(), node_ids.len());
    assert_eq!(child.connections.len(), conn_ids.len());
    child.validate().unwrap();

    let mut stranger = grown_patch(53, 6);
    stranger.nodes.retain(|n| n.id != NodeId::OUTPUT);
    stranger
        .connections
        .retain(|c| c.source != NodeId::OUTPUT && c.target != NodeId::OUTPUT);
    let child = crossover(&a, &stranger, &mut rng);
    assert_eq!(child.nodes.len(), a.nodes.len() + stranger.nodes.len());
    assert_eq!(child.connections.len(), a.connections.len() + stranger.connections.len());
}

#[test]
fn wavetable_blend_stays_within_sources() {
    let sources: Vec<Vec<f64>> = (1..=5)
        .map(|k| (0..512).map(|t| (t as f64 * 0.01 * k as f64).sin() * 0.9).collect())
        .collect();
    let control: Vec<f64> = (0..512).map(|t| (t as f64 * 0.003).sin()).collect();
    let out = blend(&sources, Some(&control), 512);
    assert!(out.iter().all(|v| v.abs() <= 0.9 + 1e-12));
}

#[test]
fn serialization_is_idempotent() {
    let patch = grown_patch(61, 40);
    let json = patch.to_json().unwrap();
    let back = Patch::from_json(&json).unwrap();
    assert_eq!(back.nodes, patch.nodes);
    assert_eq!(back.connections, patch.connections);
    assert!(matches!(back.node(NodeId::OUTPUT).map(|n| &n.kind), Some(NodeKind::Output)));
    assert_eq!(back.to_json().unwrap(), json);

    let genome = Genome::new(5, patch, PatternSource::Shared(evolved_network(63, 8)));
    let json = genome.to_json().unwrap();
    assert_eq!(Genome::<Cppn>::from_json(&json).unwrap().to_json().unwrap(), json);
}

#[test]
fn offspring_loop_gives_up() {
    let mut rng = StdRng::seed_from_u64(71);
    let mut driver = CppnDriver::default();
    let config = EvolutionConfig {
        max_attempts: 3,
        render: RenderRequest {
            duration: 0.02,
            sample_rate: 8000.0,
            ..RenderRequest::default()
        },
        ..EvolutionConfig::default()
    };
    let parent: Genome<Cppn> = Genome::seeded(1, OperatorWeights::default(), &mut driver, &mut rng);
    let mut reject = |_: &[f64]| false;
    let err = produce_offspring(&[&parent], &config, &mut driver, &mut reject, &mut rng).unwrap_err();
    assert!(matches!(err, GenomeError::Evolve(EvolveError::Rejected { attempts: 3 })));
}
