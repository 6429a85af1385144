pub mod bridge;
pub mod config;
pub mod cppn;
pub mod crossover;
pub mod dsp;
pub mod error;
pub mod evolve;
pub mod genome;
pub mod mutation;
pub mod orchestrator;
pub mod patch;
pub mod signal;

use rand::SeedableRng;
use rand::rngs::StdRng;
use wasm_bindgen::prelude::*;

use crate::config::{EvolutionConfig, RenderRequest};
use crate::cppn::{Cppn, CppnDriver};
use crate::evolve::{AcceptAll, produce_offspring};
use crate::genome::Genome;

pub use crate::error::GenomeError;

/// The crate version, read from Cargo.toml at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// WASM-exposed: return the synthgenome version string.
#[wasm_bindgen]
pub fn core_version() -> String {
    VERSION.to_string()
}

/// WASM-exposed: the default evolution configuration as a JS object.
#[wasm_bindgen]
pub fn default_config() -> Result<JsValue, JsValue> {
    serde_wasm_bindgen::to_value(&EvolutionConfig::default())
        .map_err(|e| JsValue::from_str(&format!("{e}")))
}

/// WASM-exposed: render a serialized genome to mono f32 samples.
/// Lazily created networks are seeded from the genome id, so the same
/// record always renders the same way.
#[wasm_bindgen]
pub fn render_genome_samples(
    json: &str,
    duration: f64,
    sample_rate: f64,
    note_delta: i32,
    velocity: f64,
) -> Result<Vec<f32>, JsValue> {
    let mut genome = Genome::<Cppn>::from_json(json).map_err(|e| JsValue::from_str(&format!("{e}")))?;
    let request = RenderRequest {
        duration,
        sample_rate,
        note_delta,
        velocity,
        ..RenderRequest::default()
    };
    let config = EvolutionConfig::default();
    let mut driver = CppnDriver::new(config.cppn.clone());
    let mut rng = StdRng::seed_from_u64(genome.id);
    let samples = genome
        .render(&request, &config.orchestrator, &mut driver, &mut rng)
        .map_err(|e| JsValue::from_str(&format!("{e}")))?;
    Ok(samples.iter().map(|&s| s as f32).collect())
}

/// WASM-exposed: mutate a serialized genome into a serialized child.
/// An empty `config_json` uses the default configuration.
#[wasm_bindgen]
pub fn mutate_genome(json: &str, config_json: &str, seed: u64) -> Result<String, JsValue> {
    let parent = Genome::<Cppn>::from_json(json).map_err(|e| JsValue::from_str(&format!("{e}")))?;
    let config = if config_json.trim().is_empty() {
        EvolutionConfig::default()
    } else {
        EvolutionConfig::from_json(config_json).map_err(|e| JsValue::from_str(&format!("{e}")))?
    };
    let mut driver = CppnDriver::new(config.cppn.clone());
    let mut rng = StdRng::seed_from_u64(seed);
    let child = produce_offspring(&[&parent], &config, &mut driver, &mut AcceptAll, &mut rng)
        .map_err(|e| JsValue::from_str(&format!("{e}")))?;
    child
        .genome
        .to_json()
        .map_err(|e| JsValue::from_str(&format!("{e}")))
}
