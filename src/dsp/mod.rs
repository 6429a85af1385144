//! DSP — pure Rust reference engine and the primitives it runs.
//!
//! Render graphs produced by the signal compiler execute here, one sample
//! at a time, with the same results on native and WASM targets.

pub mod compressor;
pub mod convolver;
pub mod delay;
pub mod engine;
pub mod envelope;
pub mod filter;
pub mod mixer;
pub mod oscillator;
pub mod pitch;
pub mod shaper;
