//! Pitch helpers — note numbers, frequencies and transposition.

/// Convert a (possibly fractional) MIDI note number to frequency at
/// A4 = 440 Hz. Formula: `440 * 2^((midi - 69) / 12)`.
pub fn midi_to_frequency(midi: f64) -> f64 {
    440.0 * (2.0_f64).powf((midi - 69.0) / 12.0)
}

/// Transpose a frequency by `cents`: `frequency × 2^(cents/1200)`.
pub fn transpose_cents(frequency: f64, cents: f64) -> f64 {
    frequency * (2.0_f64).powf(cents / 1200.0)
}

/// Transpose a frequency by whole semitones.
pub fn transpose_semitones(frequency: f64, semitones: i32) -> f64 {
    transpose_cents(frequency, semitones as f64 * 100.0)
}
