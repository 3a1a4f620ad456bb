//! Raw PCM chunks passed from the decoding session to the output stage.


/// Sample rate the output device is opened at.
pub const OUTPUT_SAMPLE_RATE: u32 = 44_100;

/// Channel count the output device is opened at.
pub const OUTPUT_CHANNELS: u16 = 2;

/// Frames written to the device per blocking write.
pub const FRAMES_PER_WRITE: usize = 2048;

/// Bytes per sample in the delivered stream (signed 16-bit little endian).
pub const BYTES_PER_SAMPLE: usize = 2;

/// Exact byte length of a chunk the output stage accepts.
pub const CHUNK_BYTES: usize = FRAMES_PER_WRITE * OUTPUT_CHANNELS as usize * BYTES_PER_SAMPLE;


/// Format of a block of raw audio.
#[derive( Debug, Clone, Copy, PartialEq, Eq )]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
}


impl AudioFormat {
    /// The fixed format the output device runs at.
    pub const OUTPUT: AudioFormat = AudioFormat {
        sample_rate: OUTPUT_SAMPLE_RATE,
        channels: OUTPUT_CHANNELS,
        bits_per_sample: ( BYTES_PER_SAMPLE * 8 ) as u16,
    };


    /// Bytes per interleaved frame (one sample per channel).
    pub fn bytes_per_frame( &self ) -> usize {
        self.channels as usize * ( self.bits_per_sample as usize / 8 )
    }
}


/// One unit of decoded audio, immutable once produced.
#[derive( Debug, Clone, PartialEq, Eq )]
pub struct AudioChunk {
    format: AudioFormat,
    samples: Vec<u8>,
}


impl AudioChunk {
    /// Wraps raw interleaved sample bytes.
    pub fn new( format: AudioFormat, samples: Vec<u8> ) -> Self {
        Self { format, samples }
    }


    pub fn format( &self ) -> AudioFormat {
        self.format
    }


    /// Raw interleaved sample bytes.
    pub fn samples( &self ) -> &[u8] {
        &self.samples
    }


    pub fn len( &self ) -> usize {
        self.samples.len()
    }


    pub fn is_empty( &self ) -> bool {
        self.samples.is_empty()
    }
}


/// Receiver of decoded audio, called from a thread owned by the session.
///
/// Implementations must never block. The return value is the number of
/// bytes consumed; 0 means the data was not taken and the session may
/// deliver it again later.
pub trait AudioConsumer: Send + Sync {
    fn write_audio( &self, format: AudioFormat, frames: &[u8] ) -> usize;
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_chunk_bytes_matches_output_format() {
        assert_eq!( CHUNK_BYTES, 8192 );
        assert_eq!( AudioFormat::OUTPUT.bytes_per_frame() * FRAMES_PER_WRITE, CHUNK_BYTES );
    }
}
