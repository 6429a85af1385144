//! Delay line — mono delay with a split read/write cycle so it can sit
//! inside feedback loops.

/// A mono delay line.
///
/// Each sample is processed in two halves: [`Delay::read`] yields the
/// delayed output before the rest of the graph runs, and [`Delay::write`]
/// stores the input once it is known. The delay is therefore always at
/// least one sample, which is what lets a render graph route a delay's
/// output back into its own input.
#[derive(Debug, Clone)]
pub struct Delay {
    buffer: Vec<f64>,
    write_pos: usize,
    sample_rate: f64,

    /// Delay time in seconds.
    pub delay_time: f64,
}

impl Delay {
    /// Create a new delay line.
    ///
    /// # Arguments
    /// - `sample_rate`: Audio sample rate in Hz.
    /// - `max_delay_seconds`: Maximum supported delay time.
    pub fn new(sample_rate: f64, max_delay_seconds: f64) -> Self {
        let buffer_size = (sample_rate * max_delay_seconds) as usize + 2;
        Self {
            buffer: vec![0.0; buffer_size],
            write_pos: 0,
            sample_rate,
            delay_time: 0.5,
        }
    }

    /// Create a delay with a specific delay time.
    pub fn with_time(sample_rate: f64, max_delay_seconds: f64, delay_time: f64) -> Self {
        let mut d = Self::new(sample_rate, max_delay_seconds);
        d.delay_time = delay_time.clamp(0.0, max_delay_seconds);
        d
    }

    fn delay_samples(&self) -> usize {
        let samples = (self.delay_time.max(0.0) * self.sample_rate) as usize;
        samples.clamp(1, self.buffer.len() - 1)
    }

    /// The delayed sample for the current time step.
    #[inline]
    pub fn read(&self) -> f64 {
        let len = self.buffer.len();
        let delay = self.delay_samples();
        let read_pos = (self.write_pos + len - delay) % len;
        self.buffer[read_pos]
    }

    /// Store the current input and advance one sample.
    #[inline]
    pub fn write(&mut self, input: f64) {
        self.buffer[self.write_pos] = input;
        self.write_pos = (self.write_pos + 1) % self.buffer.len();
    }

    /// Read then write in one call, for delays outside feedback loops.
    #[inline]
    pub fn process(&mut self, input: f64) -> f64 {
        let out = self.read();
        self.write(input);
        out
    }
}
