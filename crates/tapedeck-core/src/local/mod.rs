//! Session backed by a directory of M3U playlists.
//!
//! Logging in only checks that credentials are present; connectivity is
//! reported through the same event stream a networked service would use.

mod library;
mod playback;

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::mpsc::{ self, UnboundedSender };

use crate::audio::AudioConsumer;
use crate::decoder::Decoder;
use crate::session::{ ConnectionState, Credentials, Session, SessionError, SessionEvent, SessionEvents };
use crate::track::{ Playlist, Track };

pub use library::{ load_playlists, probe_track };

use playback::PlaybackThread;


/// Settings for a [`LocalSession`].
#[derive( Debug, Clone )]
pub struct LocalSessionConfig {
    /// Contents of the application key file.
    pub app_key: Vec<u8>,
    /// Directory holding the `.m3u` playlists.
    pub library_dir: PathBuf,
    pub cache_location: PathBuf,
    pub settings_location: PathBuf,
}


/// Session over local audio files.
pub struct LocalSession {
    config: LocalSessionConfig,
    consumer: Arc<dyn AudioConsumer>,
    events: UnboundedSender<SessionEvent>,
    logged_in: bool,
    loaded: Option<( Track, Decoder )>,
    playback: Option<PlaybackThread>,
}


impl LocalSession {
    /// Creates the session and the event stream it reports on.
    ///
    /// Decoded audio is handed to `consumer` from the session's own thread.
    pub fn new(
        config: LocalSessionConfig,
        consumer: Arc<dyn AudioConsumer>,
    ) -> Result<( Self, SessionEvents ), SessionError> {
        if config.app_key.is_empty() {
            return Err( SessionError::InvalidAppKey );
        }

        fs::create_dir_all( &config.cache_location )?;
        fs::create_dir_all( &config.settings_location )?;

        let ( events, rx ) = mpsc::unbounded_channel();
        tracing::info!( "Local session over {:?}", config.library_dir );

        Ok((
            Self {
                config,
                consumer,
                events,
                logged_in: false,
                loaded: None,
                playback: None,
            },
            rx,
        ))
    }


    fn notify( &self, event: SessionEvent ) {
        // The receiver going away just means nobody is listening anymore
        let _ = self.events.send( event );
    }
}


impl Session for LocalSession {
    fn login( &mut self, credentials: &Credentials ) -> Result<(), SessionError> {
        if credentials.username.trim().is_empty() || credentials.password.is_empty() {
            self.notify( SessionEvent::ConnectionState( ConnectionState::LoggedOut ) );
            return Err( SessionError::Login( "empty user name or password".into() ) );
        }

        tracing::info!( "Logging in as {}", credentials.username );
        self.logged_in = true;
        self.notify( SessionEvent::ConnectionState( ConnectionState::LoggedIn ) );
        Ok(())
    }


    fn playlists( &mut self ) -> Result<Vec<Playlist>, SessionError> {
        if !self.logged_in {
            return Err( SessionError::NotLoggedIn );
        }

        load_playlists( &self.config.library_dir )
            .map_err( |e| SessionError::Playlists( format!( "{:?}: {}", self.config.library_dir, e ) ) )
    }


    fn load( &mut self, track: &Track ) -> Result<(), SessionError> {
        self.stop();

        let decoder = Decoder::open( &PathBuf::from( &track.id.0 ) )
            .map_err( |e| SessionError::Load {
                track: track.id.clone(),
                reason: e.to_string(),
            })?;

        tracing::debug!( "Loaded {}", track.id );
        self.loaded = Some(( track.clone(), decoder ));
        Ok(())
    }


    fn play( &mut self ) {
        let Some(( track, decoder )) = self.loaded.take() else {
            tracing::warn!( "Play requested with no track loaded" );
            return;
        };

        match PlaybackThread::spawn( decoder, track.id.clone(), Arc::clone( &self.consumer ), self.events.clone() ) {
            Ok( thread ) => self.playback = Some( thread ),
            Err( e ) => {
                // Nothing will be delivered, so report the track as finished
                tracing::error!( "Failed to start playback of {}: {}", track.id, e );
                self.notify( SessionEvent::EndOfTrack( track.id ) );
            }
        }
    }


    fn stop( &mut self ) {
        self.loaded = None;
        if let Some( mut playback ) = self.playback.take() {
            playback.stop();
            tracing::debug!( "Stopped" );
        }
    }
}


impl Drop for LocalSession {
    fn drop( &mut self ) {
        self.stop();
    }
}


#[cfg( test )]
pub( crate ) mod tests {
    use super::*;

    use std::path::Path;
    use std::sync::Mutex;
    use std::time::Duration;

    use crate::audio::{ AudioFormat, CHUNK_BYTES };


    /// Writes a 16-bit PCM WAV file filled with a sawtooth ramp.
    pub( crate ) fn write_wav( path: &Path, sample_rate: u32, channels: u16, frames: u32 ) {
        let block_align = channels as u32 * 2;
        let data_len = frames * block_align;

        let mut bytes = Vec::with_capacity( 44 + data_len as usize );
        bytes.extend_from_slice( b"RIFF" );
        bytes.extend_from_slice( &( 36 + data_len ).to_le_bytes() );
        bytes.extend_from_slice( b"WAVE" );
        bytes.extend_from_slice( b"fmt " );
        bytes.extend_from_slice( &16u32.to_le_bytes() );
        bytes.extend_from_slice( &1u16.to_le_bytes() );
        bytes.extend_from_slice( &channels.to_le_bytes() );
        bytes.extend_from_slice( &sample_rate.to_le_bytes() );
        bytes.extend_from_slice( &( sample_rate * block_align ).to_le_bytes() );
        bytes.extend_from_slice( &( block_align as u16 ).to_le_bytes() );
        bytes.extend_from_slice( &16u16.to_le_bytes() );
        bytes.extend_from_slice( b"data" );
        bytes.extend_from_slice( &data_len.to_le_bytes() );
        for i in 0..( frames * channels as u32 ) {
            bytes.extend_from_slice( &( ( i % 1000 ) as i16 ).to_le_bytes() );
        }

        fs::write( path, bytes ).unwrap();
    }


    #[derive( Default )]
    struct CollectingConsumer {
        chunks: Mutex<Vec<usize>>,
    }


    impl AudioConsumer for CollectingConsumer {
        fn write_audio( &self, format: AudioFormat, frames: &[u8] ) -> usize {
            assert_eq!( format, AudioFormat::OUTPUT );
            self.chunks.lock().unwrap().push( frames.len() );
            frames.len()
        }
    }


    fn config( dir: &Path ) -> LocalSessionConfig {
        LocalSessionConfig {
            app_key: b"key".to_vec(),
            library_dir: dir.to_path_buf(),
            cache_location: dir.join( "tmp" ),
            settings_location: dir.join( "tmp" ),
        }
    }


    fn credentials( username: &str, password: &str ) -> Credentials {
        Credentials { username: username.into(), password: password.into() }
    }


    #[test]
    fn test_new_rejects_empty_app_key() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config( dir.path() );
        config.app_key.clear();

        let result = LocalSession::new( config, Arc::new( CollectingConsumer::default() ) );
        assert!( matches!( result, Err( SessionError::InvalidAppKey ) ) );
    }


    #[test]
    fn test_login_reports_connection_state() {
        let dir = tempfile::tempdir().unwrap();
        let ( mut session, mut events ) =
            LocalSession::new( config( dir.path() ), Arc::new( CollectingConsumer::default() ) ).unwrap();

        assert!( matches!( session.playlists(), Err( SessionError::NotLoggedIn ) ) );
        assert!( session.login( &credentials( "", "secret" ) ).is_err() );
        session.login( &credentials( "listener", "secret" ) ).unwrap();

        assert_eq!(
            events.try_recv().unwrap(),
            SessionEvent::ConnectionState( ConnectionState::LoggedOut )
        );
        assert_eq!(
            events.try_recv().unwrap(),
            SessionEvent::ConnectionState( ConnectionState::LoggedIn )
        );
    }


    #[test]
    fn test_play_delivers_chunks_then_end_of_track() {
        let dir = tempfile::tempdir().unwrap();
        write_wav( &dir.path().join( "song.wav" ), 44100, 2, 5000 );
        fs::write( dir.path().join( "Mix.m3u" ), "song.wav\n" ).unwrap();

        let consumer = Arc::new( CollectingConsumer::default() );
        let ( mut session, mut events ) =
            LocalSession::new( config( dir.path() ), consumer.clone() ).unwrap();
        session.login( &credentials( "listener", "secret" ) ).unwrap();
        let _ = events.try_recv();

        let playlists = session.playlists().unwrap();
        let track = playlists[ 0 ].tracks[ 0 ].clone();
        session.load( &track ).unwrap();
        session.play();

        let event = events.blocking_recv().unwrap();
        assert_eq!( event, SessionEvent::EndOfTrack( track.id.clone() ) );

        let chunks = consumer.chunks.lock().unwrap().clone();
        assert_eq!( chunks.iter().sum::<usize>(), 5000 * 4 );
        assert_eq!( &chunks[ ..2 ], &[ CHUNK_BYTES, CHUNK_BYTES ] );
        assert_eq!( chunks[ 2 ], 5000 * 4 - 2 * CHUNK_BYTES );
    }


    #[test]
    fn test_load_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let ( mut session, _events ) =
            LocalSession::new( config( dir.path() ), Arc::new( CollectingConsumer::default() ) ).unwrap();

        let track = probe_track( &dir.path().join( "gone.flac" ) );
        assert!( matches!( session.load( &track ), Err( SessionError::Load { .. } ) ) );
    }


    #[test]
    fn test_stop_suppresses_end_of_track() {
        struct RefusingConsumer;

        impl AudioConsumer for RefusingConsumer {
            fn write_audio( &self, _format: AudioFormat, _frames: &[u8] ) -> usize {
                0
            }
        }

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join( "long.wav" );
        write_wav( &path, 44100, 2, 44100 );

        let ( mut session, mut events ) =
            LocalSession::new( config( dir.path() ), Arc::new( RefusingConsumer ) ).unwrap();
        session.load( &probe_track( &path ) ).unwrap();
        session.play();
        std::thread::sleep( Duration::from_millis( 30 ) );
        session.stop();

        assert!( events.try_recv().is_err() );
    }
}
