//! Audio decoding via Symphonia
//!
//! Turns local audio files into interleaved f32 PCM for the local session.

use std::fs::File;
use std::path::Path;
use std::time::Duration;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{ Decoder as SymphoniaDecoder, DecoderOptions, CODEC_TYPE_NULL };
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{ FormatOptions, FormatReader };
use symphonia::core::io::{ MediaSourceStream, MediaSourceStreamOptions };
use symphonia::core::meta::{ MetadataOptions, StandardTagKey, Tag };
use symphonia::core::probe::{ Hint, ProbedMetadata };
use thiserror::Error;


/// Tags read from a file, used for status lines.
#[derive( Debug, Clone, Default, PartialEq, Eq )]
pub struct TrackTags {
    pub title: Option<String>,
    pub artist: Option<String>,
}


/// Errors that can occur during decoding.
#[derive( Debug, Error )]
pub enum DecoderError {
    #[error( "Failed to open file: {0}" )]
    FileOpen( #[from] std::io::Error ),

    #[error( "Unsupported format" )]
    UnsupportedFormat,

    #[error( "No audio tracks found" )]
    NoAudioTrack,

    #[error( "Decoder creation failed: {0}" )]
    DecoderCreation( String ),

    #[error( "Decode error: {0}" )]
    Decode( String ),
}


/// Audio decoder wrapper around Symphonia.
pub struct Decoder {
    format_reader: Box<dyn FormatReader>,
    decoder: Box<dyn SymphoniaDecoder>,
    track_id: u32,
    sample_rate: u32,
    channels: usize,
    sample_buf: Option<SampleBuffer<f32>>,
    duration: Option<Duration>,
    probe_metadata: ProbedMetadata,
}


impl Decoder {
    /// Opens an audio file for decoding.
    pub fn open( path: &Path ) -> Result<Self, DecoderError> {
        let file = File::open( path )?;
        let mss = MediaSourceStream::new( Box::new( file ), MediaSourceStreamOptions::default() );

        let mut hint = Hint::new();
        if let Some( ext ) = path.extension().and_then( |e| e.to_str() ) {
            hint.with_extension( ext );
        }

        let probed = symphonia::default::get_probe()
            .format( &hint, mss, &FormatOptions::default(), &MetadataOptions::default() )
            .map_err( |_| DecoderError::UnsupportedFormat )?;

        let probe_metadata = probed.metadata;
        let format_reader = probed.format;

        let track = format_reader
            .tracks()
            .iter()
            .find( |t| t.codec_params.codec != CODEC_TYPE_NULL )
            .ok_or( DecoderError::NoAudioTrack )?;

        let track_id = track.id;
        let codec_params = &track.codec_params;

        let sample_rate = codec_params.sample_rate.unwrap_or( 44100 );
        let channels = codec_params.channels.map( |c| c.count() ).unwrap_or( 2 );
        let duration = codec_params.n_frames.map( |frames| {
            Duration::from_secs_f64( frames as f64 / sample_rate as f64 )
        });

        tracing::debug!(
            "Opened {:?}: {} Hz, {} channels, duration {:?}",
            path,
            sample_rate,
            channels,
            duration
        );

        let decoder = symphonia::default::get_codecs()
            .make( codec_params, &DecoderOptions::default() )
            .map_err( |e| DecoderError::DecoderCreation( e.to_string() ) )?;

        Ok( Self {
            format_reader,
            decoder,
            track_id,
            sample_rate,
            channels,
            sample_buf: None,
            duration,
            probe_metadata,
        })
    }


    pub fn sample_rate( &self ) -> u32 {
        self.sample_rate
    }


    pub fn channels( &self ) -> usize {
        self.channels
    }


    /// Returns the duration, if the container reports a frame count.
    pub fn duration( &self ) -> Option<Duration> {
        self.duration
    }


    /// Reads title and artist, preferring probe metadata (ID3 etc.) over
    /// container tags.
    pub fn tags( &mut self ) -> TrackTags {
        let mut tags = TrackTags::default();

        if let Some( metadata_log ) = self.probe_metadata.get() {
            if let Some( revision ) = metadata_log.current() {
                apply_tags( &mut tags, revision.tags() );
            }
        }

        if let Some( revision ) = self.format_reader.metadata().current() {
            apply_tags( &mut tags, revision.tags() );
        }

        tags
    }


    /// Decodes the next packet and returns interleaved f32 samples.
    ///
    /// Returns None when EOF is reached.
    pub fn decode_next( &mut self ) -> Result<Option<Vec<f32>>, DecoderError> {
        loop {
            let packet = match self.format_reader.next_packet() {
                Ok( packet ) => packet,
                Err( SymphoniaError::IoError( ref e ) )
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    return Ok( None );
                }
                Err( e ) => return Err( DecoderError::Decode( e.to_string() ) ),
            };

            if packet.track_id() != self.track_id {
                continue;
            }

            let decoded = match self.decoder.decode( &packet ) {
                Ok( decoded ) => decoded,
                // Corrupt packet, skip it
                Err( SymphoniaError::DecodeError( _ ) ) => continue,
                Err( e ) => return Err( DecoderError::Decode( e.to_string() ) ),
            };

            let spec = *decoded.spec();
            let num_frames = decoded.frames();

            let sample_buf = match self.sample_buf.take() {
                Some( buf ) if buf.capacity() >= num_frames => buf,
                _ => SampleBuffer::new( num_frames as u64, spec ),
            };
            let sample_buf = self.sample_buf.insert( sample_buf );
            sample_buf.copy_interleaved_ref( decoded );

            return Ok( Some( sample_buf.samples().to_vec() ) );
        }
    }
}


fn apply_tags( tags: &mut TrackTags, source: &[Tag] ) {
    for tag in source {
        match tag.std_key {
            Some( StandardTagKey::TrackTitle ) if tags.title.is_none() => {
                tags.title = Some( tag.value.to_string() );
            }
            Some( StandardTagKey::Artist ) if tags.artist.is_none() => {
                tags.artist = Some( tag.value.to_string() );
            }
            _ => {}
        }
    }
}
