//! Audio output via cpal
//!
//! The output driver pops chunks off the frame queue, rebuilds 16-bit
//! samples and performs a blocking, hardware-paced write per frame.

use cpal::traits::{ DeviceTrait, HostTrait, StreamTrait };
use thiserror::Error;
use tokio::sync::mpsc;

use crate::audio::{ BYTES_PER_SAMPLE, FRAMES_PER_WRITE, OUTPUT_CHANNELS, OUTPUT_SAMPLE_RATE };
use crate::queue::FrameConsumer;


/// Errors that can occur with audio output.
#[derive( Debug, Error )]
pub enum OutputError {
    #[error( "No output device available" )]
    NoDevice,

    #[error( "Failed to query stream configs: {0}" )]
    StreamConfig( String ),

    #[error( "Output device does not support {rate} Hz with {channels} channels" )]
    UnsupportedConfig { rate: u32, channels: u16 },

    #[error( "Failed to build output stream: {0}" )]
    BuildStream( String ),

    #[error( "Failed to play stream: {0}" )]
    PlayStream( String ),

    #[error( "Output stream closed" )]
    Closed,
}


/// Destination of fixed-size interleaved frames.
///
/// `write` blocks until the device is ready to take the frame.
pub trait FrameSink {
    fn write( &mut self, frame: &[i16] ) -> Result<(), OutputError>;
}


/// Pulls chunks off the frame queue and writes them to a sink.
pub struct OutputDriver {
    frame: Vec<i16>,
    expected_bytes: usize,
    written: u64,
    skipped: u64,
}


impl OutputDriver {
    /// Creates a driver for the fixed output format.
    pub fn new() -> Self {
        Self::with_frame_len( FRAMES_PER_WRITE, OUTPUT_CHANNELS )
    }


    /// Creates a driver writing `frames` frames of `channels` samples at a time.
    pub fn with_frame_len( frames: usize, channels: u16 ) -> Self {
        let samples = frames * channels as usize;
        Self {
            frame: vec![ 0; samples ],
            expected_bytes: samples * BYTES_PER_SAMPLE,
            written: 0,
            skipped: 0,
        }
    }


    /// Rebuilds little-endian 16-bit samples from `bytes` into the frame.
    ///
    /// Returns false, leaving the frame untouched, when `bytes` is not
    /// exactly one frame long.
    pub fn fill_frame( &mut self, bytes: &[u8] ) -> bool {
        if bytes.len() != self.expected_bytes {
            return false;
        }

        for ( sample, pair ) in self.frame.iter_mut().zip( bytes.chunks_exact( 2 ) ) {
            *sample = i16::from_le_bytes([ pair[ 0 ], pair[ 1 ] ]);
        }
        true
    }


    /// Current contents of the output frame.
    pub fn frame( &self ) -> &[i16] {
        &self.frame
    }


    /// Runs the write loop until every producer of `frames` is gone.
    ///
    /// Chunks of the wrong size are skipped for that cycle.
    pub fn run<S: FrameSink>( &mut self, frames: &mut FrameConsumer, sink: &mut S ) -> Result<(), OutputError> {
        while let Some( chunk ) = frames.pop() {
            if !self.fill_frame( chunk.samples() ) {
                self.skipped += 1;
                tracing::trace!( "Skipping {} byte chunk", chunk.len() );
                continue;
            }

            sink.write( &self.frame )?;
            self.written += 1;
        }

        tracing::debug!(
            "Output loop finished: {} frames written, {} chunks skipped",
            self.written,
            self.skipped
        );
        Ok(())
    }


    pub fn frames_written( &self ) -> u64 {
        self.written
    }


    pub fn chunks_skipped( &self ) -> u64 {
        self.skipped
    }
}


impl Default for OutputDriver {
    fn default() -> Self {
        Self::new()
    }
}


/// Output device stream fed one frame at a time.
///
/// Note: This struct is NOT Send due to cpal::Stream.
/// Keep it on the thread where it was created.
pub struct CpalSink {
    stream: cpal::Stream,
    frames: mpsc::Sender<Vec<i16>>,
}


impl CpalSink {
    /// Opens the default output device at the fixed output format and starts it.
    pub fn open() -> Result<Self, OutputError> {
        let host = cpal::default_host();

        let device = host
            .default_output_device()
            .ok_or( OutputError::NoDevice )?;

        tracing::info!( "Using output device: {:?}", device.name() );

        let supported_configs: Vec<_> = device
            .supported_output_configs()
            .map_err( |e| OutputError::StreamConfig( e.to_string() ) )?
            .filter( |c| {
                c.channels() == OUTPUT_CHANNELS
                    && c.min_sample_rate().0 <= OUTPUT_SAMPLE_RATE
                    && c.max_sample_rate().0 >= OUTPUT_SAMPLE_RATE
            })
            .collect();

        // Prefer a native f32 stream, the callback converts from i16
        let supported_config = supported_configs
            .iter()
            .find( |c| c.sample_format() == cpal::SampleFormat::F32 )
            .or_else( || supported_configs.first() )
            .ok_or( OutputError::UnsupportedConfig {
                rate: OUTPUT_SAMPLE_RATE,
                channels: OUTPUT_CHANNELS,
            })?;

        let config = supported_config
            .clone()
            .with_sample_rate( cpal::SampleRate( OUTPUT_SAMPLE_RATE ) )
            .config();

        tracing::info!(
            "Audio output config: {} Hz, {} channels",
            config.sample_rate.0,
            config.channels
        );

        // One frame in flight besides the one being played
        let ( tx, mut rx ) = mpsc::channel::<Vec<i16>>( 1 );
        let mut current: Vec<i16> = Vec::new();
        let mut pos = 0;

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    for out in data.iter_mut() {
                        if pos >= current.len() {
                            match rx.try_recv() {
                                Ok( next ) => {
                                    current = next;
                                    pos = 0;
                                }
                                Err( _ ) => {
                                    *out = 0.0;
                                    continue;
                                }
                            }
                        }
                        *out = current[ pos ] as f32 / 32768.0;
                        pos += 1;
                    }
                },
                |err| {
                    tracing::error!( "Audio output error: {}", err );
                },
                None,
            )
            .map_err( |e| OutputError::BuildStream( e.to_string() ) )?;

        stream
            .play()
            .map_err( |e| OutputError::PlayStream( e.to_string() ) )?;

        Ok( Self { stream, frames: tx } )
    }
}


impl FrameSink for CpalSink {
    fn write( &mut self, frame: &[i16] ) -> Result<(), OutputError> {
        self.frames
            .blocking_send( frame.to_vec() )
            .map_err( |_| OutputError::Closed )
    }
}


impl Drop for CpalSink {
    fn drop( &mut self ) {
        if let Err( e ) = self.stream.pause() {
            tracing::debug!( "Failed to stop output stream: {}", e );
        }
    }
}


#[cfg( test )]
mod tests {
    use super::*;

    use crate::audio::{ AudioChunk, AudioFormat, CHUNK_BYTES };
    use crate::queue::frame_queue;


    #[derive( Default )]
    struct RecordingSink {
        frames: Vec<Vec<i16>>,
    }


    impl FrameSink for RecordingSink {
        fn write( &mut self, frame: &[i16] ) -> Result<(), OutputError> {
            self.frames.push( frame.to_vec() );
            Ok(())
        }
    }


    #[test]
    fn test_fill_frame_combines_low_and_high_bytes() {
        let mut driver = OutputDriver::with_frame_len( 2, 2 );
        let bytes = [ 0x01, 0x00, 0xff, 0xff, 0x00, 0x80, 0x34, 0x12 ];
        assert!( driver.fill_frame( &bytes ) );
        assert_eq!( driver.frame(), &[ 1, -1, i16::MIN, 0x1234 ] );
    }


    #[test]
    fn test_fill_frame_rejects_every_other_length() {
        let mut driver = OutputDriver::new();
        for len in [ 0, 1, 2, CHUNK_BYTES / 2, CHUNK_BYTES - 1, CHUNK_BYTES + 1, CHUNK_BYTES * 2 ] {
            let bytes = vec![ 0x11; len ];
            assert!( !driver.fill_frame( &bytes ), "length {} accepted", len );
        }
        assert!( driver.frame().iter().all( |s| *s == 0 ) );
    }


    #[test]
    fn test_run_skips_wrong_sized_chunks() {
        let ( producer, mut consumer ) = frame_queue( 8 );
        producer.push( AudioChunk::new( AudioFormat::OUTPUT, vec![ 1; CHUNK_BYTES ] ) );
        producer.push( AudioChunk::new( AudioFormat::OUTPUT, vec![ 2; 100 ] ) );
        producer.push( AudioChunk::new( AudioFormat::OUTPUT, vec![ 3; CHUNK_BYTES + 2 ] ) );
        producer.push( AudioChunk::new( AudioFormat::OUTPUT, vec![ 4; CHUNK_BYTES ] ) );
        drop( producer );

        let mut driver = OutputDriver::new();
        let mut sink = RecordingSink::default();
        driver.run( &mut consumer, &mut sink ).unwrap();

        assert_eq!( sink.frames.len(), 2 );
        assert_eq!( sink.frames[ 0 ][ 0 ], 0x0101 );
        assert_eq!( sink.frames[ 1 ][ 0 ], 0x0404 );
        assert_eq!( driver.frames_written(), 2 );
        assert_eq!( driver.chunks_skipped(), 2 );
    }


    #[test]
    fn test_run_stops_on_closed_sink() {
        struct ClosedSink;

        impl FrameSink for ClosedSink {
            fn write( &mut self, _frame: &[i16] ) -> Result<(), OutputError> {
                Err( OutputError::Closed )
            }
        }

        let ( producer, mut consumer ) = frame_queue( 2 );
        producer.push( AudioChunk::new( AudioFormat::OUTPUT, vec![ 0; CHUNK_BYTES ] ) );

        let mut driver = OutputDriver::new();
        let result = driver.run( &mut consumer, &mut ClosedSink );
        assert!( matches!( result, Err( OutputError::Closed ) ) );
    }
}
