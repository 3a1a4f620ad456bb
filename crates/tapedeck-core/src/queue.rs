//! Bounded hand-off between the decoding session and the output writer.
//!
//! The producer side runs on a thread the session owns and must never
//! stall, so a full queue drops the incoming chunk instead of waiting.
//! The consumer side is the single output task and blocks until a chunk
//! arrives or every producer is gone.

use tokio::sync::mpsc::{ self, error::TrySendError };

use crate::audio::{ AudioChunk, AudioConsumer, AudioFormat };


/// Default number of chunk slots (~370ms of audio at the output format).
pub const DEFAULT_QUEUE_CAPACITY: usize = 8;


/// Creates a bounded audio frame queue with the given number of slots.
pub fn frame_queue( capacity: usize ) -> ( FrameProducer, FrameConsumer ) {
    let ( tx, rx ) = mpsc::channel( capacity.max( 1 ) );
    ( FrameProducer { tx }, FrameConsumer { rx } )
}


/// Sending half of the frame queue. Cheap to clone.
#[derive( Debug, Clone )]
pub struct FrameProducer {
    tx: mpsc::Sender<AudioChunk>,
}


impl FrameProducer {
    /// Offers a chunk to the queue without blocking.
    ///
    /// Returns false when the queue is full or closed; the chunk is dropped.
    pub fn push( &self, chunk: AudioChunk ) -> bool {
        match self.tx.try_send( chunk ) {
            Ok(()) => true,
            Err( TrySendError::Full( _ ) ) => {
                tracing::trace!( "Frame queue full, dropping chunk" );
                false
            }
            Err( TrySendError::Closed( _ ) ) => false,
        }
    }
}


impl AudioConsumer for FrameProducer {
    fn write_audio( &self, format: AudioFormat, frames: &[u8] ) -> usize {
        if frames.is_empty() {
            return 0;
        }

        if self.push( AudioChunk::new( format, frames.to_vec() ) ) {
            frames.len()
        } else {
            0
        }
    }
}


/// Receiving half of the frame queue, owned by the output writer.
#[derive( Debug )]
pub struct FrameConsumer {
    rx: mpsc::Receiver<AudioChunk>,
}


impl FrameConsumer {
    /// Blocks until a chunk is available.
    ///
    /// Returns None once every producer has been dropped and the queue is
    /// drained. Must not be called from inside an async task.
    pub fn pop( &mut self ) -> Option<AudioChunk> {
        self.rx.blocking_recv()
    }
}


#[cfg( test )]
mod tests {
    use super::*;

    use std::time::{ Duration, Instant };

    use crate::audio::CHUNK_BYTES;


    fn chunk( fill: u8 ) -> AudioChunk {
        AudioChunk::new( AudioFormat::OUTPUT, vec![ fill; 16 ] )
    }


    #[test]
    fn test_push_on_full_queue_is_rejected_without_blocking() {
        for capacity in [ 1, 2, 8, 32 ] {
            let ( producer, _consumer ) = frame_queue( capacity );
            for i in 0..capacity {
                assert!( producer.push( chunk( i as u8 ) ) );
            }

            let started = Instant::now();
            for _ in 0..100 {
                assert!( !producer.push( chunk( 0xff ) ) );
            }
            assert!( started.elapsed() < Duration::from_secs( 1 ) );
        }
    }


    #[test]
    fn test_pop_preserves_order() {
        let ( producer, mut consumer ) = frame_queue( 4 );
        producer.push( chunk( 1 ) );
        producer.push( chunk( 2 ) );
        producer.push( chunk( 3 ) );
        drop( producer );

        let fills: Vec<u8> = std::iter::from_fn( || consumer.pop() )
            .map( |c| c.samples()[ 0 ] )
            .collect();
        assert_eq!( fills, vec![ 1, 2, 3 ] );
    }


    #[test]
    fn test_pop_waits_for_producer_thread() {
        let ( producer, mut consumer ) = frame_queue( DEFAULT_QUEUE_CAPACITY );
        let handle = std::thread::spawn( move || {
            std::thread::sleep( Duration::from_millis( 20 ) );
            producer.push( chunk( 7 ) );
        });

        let popped = consumer.pop().unwrap();
        assert_eq!( popped.samples()[ 0 ], 7 );
        handle.join().unwrap();
        assert!( consumer.pop().is_none() );
    }


    #[test]
    fn test_write_audio_ignores_empty_delivery() {
        let ( producer, mut consumer ) = frame_queue( 2 );
        assert_eq!( producer.write_audio( AudioFormat::OUTPUT, &[] ), 0 );
        drop( producer );
        assert!( consumer.pop().is_none() );
    }


    #[test]
    fn test_write_audio_reports_dropped_chunk_as_unconsumed() {
        let ( producer, _consumer ) = frame_queue( 1 );
        let bytes = vec![ 0u8; CHUNK_BYTES ];
        assert_eq!( producer.write_audio( AudioFormat::OUTPUT, &bytes ), CHUNK_BYTES );
        assert_eq!( producer.write_audio( AudioFormat::OUTPUT, &bytes ), 0 );
    }
}
