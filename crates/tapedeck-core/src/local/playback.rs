//! Decode thread of the local session.
//!
//! Decodes one file, maps it to stereo, resamples to the output rate and
//! delivers fixed-size 16-bit chunks through the audio consumer. A chunk
//! the consumer does not take is offered again after a short pause; the
//! consumer itself never waits.

use std::sync::Arc;
use std::sync::atomic::{ AtomicBool, Ordering };
use std::thread;
use std::time::Duration;

use rubato::{ FastFixedOut, PolynomialDegree, Resampler };
use tokio::sync::mpsc::UnboundedSender;

use crate::audio::{ AudioConsumer, AudioFormat, CHUNK_BYTES, OUTPUT_CHANNELS, OUTPUT_SAMPLE_RATE };
use crate::decoder::Decoder;
use crate::session::SessionEvent;
use crate::track::TrackId;


const REDELIVER_DELAY: Duration = Duration::from_millis( 5 );

const RESAMPLER_CHUNK_FRAMES: usize = 1024;


/// Converts planar samples back to interleaved format.
/// [[L0, L1, ...], [R0, R1, ...]] → [L0, R0, L1, R1, ...]
fn interleave( channels: &[Vec<f32>] ) -> Vec<f32> {
    if channels.is_empty() || channels[ 0 ].is_empty() {
        return Vec::new();
    }
    let frames = channels[ 0 ].len();
    let mut out = Vec::with_capacity( frames * channels.len() );
    for f in 0..frames {
        for ch in channels {
            out.push( ch[ f ] );
        }
    }
    out
}


/// Maps interleaved samples with `channels` channels onto stereo.
///
/// Mono is duplicated; anything wider keeps its first two channels.
pub( crate ) fn to_stereo( samples: &[f32], channels: usize ) -> Vec<f32> {
    match channels {
        0 => Vec::new(),
        1 => samples.iter().flat_map( |s| [ *s, *s ] ).collect(),
        2 => samples.to_vec(),
        n => samples
            .chunks_exact( n )
            .flat_map( |frame| [ frame[ 0 ], frame[ 1 ] ] )
            .collect(),
    }
}


/// Appends `samples` as signed 16-bit little-endian bytes.
pub( crate ) fn encode_s16le( samples: &[f32], out: &mut Vec<u8> ) {
    out.reserve( samples.len() * 2 );
    for sample in samples {
        let value = ( sample.clamp( -1.0, 1.0 ) * i16::MAX as f32 ).round() as i16;
        out.extend_from_slice( &value.to_le_bytes() );
    }
}


/// Stereo f32 at the source rate in, output-format bytes out.
struct PcmEncoder {
    resampler: Option<FastFixedOut<f32>>,
    planar: Vec<Vec<f32>>,
    pending: Vec<u8>,
}


impl PcmEncoder {
    fn new( source_rate: u32 ) -> Result<Self, String> {
        let channels = OUTPUT_CHANNELS as usize;
        let resampler = if source_rate != OUTPUT_SAMPLE_RATE {
            tracing::info!( "Resampling: {} Hz → {} Hz", source_rate, OUTPUT_SAMPLE_RATE );
            let resampler = FastFixedOut::<f32>::new(
                OUTPUT_SAMPLE_RATE as f64 / source_rate as f64,
                2.0,
                PolynomialDegree::Cubic,
                RESAMPLER_CHUNK_FRAMES,
                channels,
            ).map_err( |e| format!( "Failed to create resampler: {}", e ) )?;
            Some( resampler )
        } else {
            None
        };

        Ok( Self {
            resampler,
            planar: ( 0..channels ).map( |_| Vec::new() ).collect(),
            pending: Vec::with_capacity( CHUNK_BYTES * 2 ),
        })
    }


    /// Feeds interleaved stereo samples.
    fn push( &mut self, stereo: &[f32] ) {
        let Some( resampler ) = self.resampler.as_mut() else {
            encode_s16le( stereo, &mut self.pending );
            return;
        };

        for frame in stereo.chunks_exact( 2 ) {
            self.planar[ 0 ].push( frame[ 0 ] );
            self.planar[ 1 ].push( frame[ 1 ] );
        }

        while self.planar[ 0 ].len() >= resampler.input_frames_next() {
            let needed = resampler.input_frames_next();
            let input: Vec<Vec<f32>> = self.planar
                .iter_mut()
                .map( |ch| ch.drain( ..needed ).collect() )
                .collect();

            match resampler.process( &input, None ) {
                Ok( resampled ) => encode_s16le( &interleave( &resampled ), &mut self.pending ),
                Err( e ) => {
                    tracing::error!( "Resample error: {}", e );
                    break;
                }
            }
        }
    }


    /// Flushes whatever the resampler still holds.
    fn finish( &mut self ) {
        let Some( resampler ) = self.resampler.as_mut() else {
            return;
        };
        if self.planar[ 0 ].is_empty() {
            return;
        }

        match resampler.process_partial( Some( self.planar.as_slice() ), None ) {
            Ok( resampled ) => encode_s16le( &interleave( &resampled ), &mut self.pending ),
            Err( e ) => tracing::error!( "Final resample error: {}", e ),
        }
        for ch in self.planar.iter_mut() {
            ch.clear();
        }
    }


    /// Removes the next full chunk, if one is buffered.
    fn next_chunk( &mut self ) -> Option<Vec<u8>> {
        if self.pending.len() < CHUNK_BYTES {
            return None;
        }
        let rest = self.pending.split_off( CHUNK_BYTES );
        Some( std::mem::replace( &mut self.pending, rest ) )
    }


    /// Removes the trailing partial chunk.
    fn take_remainder( &mut self ) -> Vec<u8> {
        std::mem::take( &mut self.pending )
    }
}


/// A running decode thread.
pub( crate ) struct PlaybackThread {
    stop_flag: Arc<AtomicBool>,
    thread: Option<thread::JoinHandle<()>>,
}


impl PlaybackThread {
    /// Starts decoding `decoder` on a new thread.
    pub( crate ) fn spawn(
        decoder: Decoder,
        track: TrackId,
        consumer: Arc<dyn AudioConsumer>,
        events: UnboundedSender<SessionEvent>,
    ) -> Result<Self, String> {
        let encoder = PcmEncoder::new( decoder.sample_rate() )?;
        let stop_flag = Arc::new( AtomicBool::new( false ) );
        let stop_flag_clone = Arc::clone( &stop_flag );

        let thread = thread::Builder::new()
            .name( "tapedeck-decode".into() )
            .spawn( move || {
                decode_loop( decoder, encoder, track, consumer, events, stop_flag_clone );
            })
            .map_err( |e| format!( "Failed to spawn decode thread: {}", e ) )?;

        Ok( Self {
            stop_flag,
            thread: Some( thread ),
        })
    }


    /// Signals the thread to stop and waits for it.
    ///
    /// No end-of-track notification is sent after this returns.
    pub( crate ) fn stop( &mut self ) {
        self.stop_flag.store( true, Ordering::Relaxed );
        if let Some( thread ) = self.thread.take() {
            let _ = thread.join();
        }
    }
}


impl Drop for PlaybackThread {
    fn drop( &mut self ) {
        self.stop();
    }
}


fn decode_loop(
    mut decoder: Decoder,
    mut encoder: PcmEncoder,
    track: TrackId,
    consumer: Arc<dyn AudioConsumer>,
    events: UnboundedSender<SessionEvent>,
    stop_flag: Arc<AtomicBool>,
) {
    let channels = decoder.channels();

    loop {
        if stop_flag.load( Ordering::Relaxed ) {
            tracing::debug!( "Decode loop: stop signal received" );
            return;
        }

        match decoder.decode_next() {
            Ok( Some( samples ) ) => {
                encoder.push( &to_stereo( &samples, channels ) );
                while let Some( chunk ) = encoder.next_chunk() {
                    if !deliver( &*consumer, &chunk, &stop_flag ) {
                        return;
                    }
                }
            }
            Ok( None ) => break,
            Err( e ) => {
                // Treated as the end of the track so playback moves on
                tracing::error!( "Decode error in {}: {}", track, e );
                break;
            }
        }
    }

    encoder.finish();
    while let Some( chunk ) = encoder.next_chunk() {
        if !deliver( &*consumer, &chunk, &stop_flag ) {
            return;
        }
    }

    // Short tail; the output stage decides what to do with it
    let tail = encoder.take_remainder();
    if !tail.is_empty() && !deliver( &*consumer, &tail, &stop_flag ) {
        return;
    }

    if stop_flag.load( Ordering::Relaxed ) {
        return;
    }
    tracing::info!( "Decode loop: reached end of {}", track );
    let _ = events.send( SessionEvent::EndOfTrack( track ) );
}


/// Offers `chunk` until the consumer takes it. Returns false if stopped first.
fn deliver( consumer: &dyn AudioConsumer, chunk: &[u8], stop_flag: &AtomicBool ) -> bool {
    loop {
        if stop_flag.load( Ordering::Relaxed ) {
            return false;
        }
        if consumer.write_audio( AudioFormat::OUTPUT, chunk ) > 0 {
            return true;
        }
        thread::sleep( REDELIVER_DELAY );
    }
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_to_stereo() {
        assert_eq!( to_stereo( &[ 0.1, 0.2 ], 1 ), vec![ 0.1, 0.1, 0.2, 0.2 ] );
        assert_eq!( to_stereo( &[ 0.1, 0.2, 0.3, 0.4, 0.5, 0.6 ], 3 ), vec![ 0.1, 0.2, 0.4, 0.5 ] );
        assert_eq!( to_stereo( &[ 0.1, 0.2 ], 2 ), vec![ 0.1, 0.2 ] );
    }


    #[test]
    fn test_encode_s16le_clamps() {
        let mut out = Vec::new();
        encode_s16le( &[ 0.0, 1.0, -2.0 ], &mut out );
        assert_eq!( out, vec![ 0x00, 0x00, 0xff, 0x7f, 0x01, 0x80 ] );
    }


    #[test]
    fn test_encoder_splits_into_fixed_chunks() {
        let mut encoder = PcmEncoder::new( OUTPUT_SAMPLE_RATE ).unwrap();
        let frames = 5000;
        encoder.push( &vec![ 0.25; frames * 2 ] );

        assert_eq!( encoder.next_chunk().map( |c| c.len() ), Some( CHUNK_BYTES ) );
        assert_eq!( encoder.next_chunk().map( |c| c.len() ), Some( CHUNK_BYTES ) );
        assert!( encoder.next_chunk().is_none() );
        assert_eq!( encoder.take_remainder().len(), frames * 4 - 2 * CHUNK_BYTES );
    }


    #[test]
    fn test_encoder_resamples_to_output_rate() {
        let mut encoder = PcmEncoder::new( 22050 ).unwrap();
        encoder.push( &vec![ 0.0; 22050 * 2 ] );
        encoder.finish();

        let mut bytes = 0;
        while let Some( chunk ) = encoder.next_chunk() {
            bytes += chunk.len();
        }
        bytes += encoder.take_remainder().len();

        // About one second of output audio
        let frames = bytes / 4;
        assert!( frames > 40_000 && frames < 48_000, "got {} frames", frames );
    }
}
