/// Sample rate used on the wire in both directions.
pub const SAMPLE_RATE: u32 = 24000;

/// The realtime protocol carries mono audio only.
pub const CHANNELS: u16 = 1;

/// A bounded slice of 16-bit signed PCM samples (mono, [`SAMPLE_RATE`]).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AudioChunk {
    pub samples: Vec<i16>,
}

impl AudioChunk {
    pub fn new(samples: Vec<i16>) -> Self {
        Self { samples }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

impl From<Vec<i16>> for AudioChunk {
    fn from(samples: Vec<i16>) -> Self {
        Self::new(samples)
    }
}
