//! Playback state machine and the task that drives it.
//!
//! The controller owns the session. The player task feeds it track
//! requests from the sequencer and end-of-track notifications from the
//! session, and answers each request with one status line.

use thiserror::Error;

use crate::events::{ PlayerEvent, PlayerPorts };
use crate::session::{ Session, SessionError, SessionEvent, SessionEvents };
use crate::track::{ format_duration, Track, TrackId };


/// Status reported for a track that cannot be streamed.
pub const NOT_AVAILABLE: &str = "Not available";


/// Errors that end playback for good.
#[derive( Debug, Error )]
pub enum PlaybackError {
    #[error( "Failed to load track: {0}" )]
    Load( #[source] SessionError ),
}


/// State of the single playback session.
#[derive( Debug, Clone, Copy, PartialEq, Eq, Default )]
pub enum PlaybackState {
    #[default]
    Idle,
    Loading,
    Playing,
    Ended,
    Failed,
}


/// Loads and starts tracks on a session, one at a time.
pub struct PlaybackController<S> {
    session: S,
    state: PlaybackState,
    current: Option<Track>,
}


impl<S: Session> PlaybackController<S> {
    pub fn new( session: S ) -> Self {
        Self {
            session,
            state: PlaybackState::Idle,
            current: None,
        }
    }


    /// Starts `track` and returns the status line to show.
    ///
    /// An unavailable track leaves the state and the session untouched.
    /// A load failure leaves the controller `Failed` and is not recoverable.
    pub fn play( &mut self, track: &Track ) -> Result<String, PlaybackError> {
        if !track.is_available() {
            tracing::info!( "Skipping unavailable track {}", track.id );
            return Ok( NOT_AVAILABLE.to_string() );
        }

        self.current = None;
        self.state = PlaybackState::Loading;
        if let Err( e ) = self.session.load( track ) {
            tracing::error!( "Load failed for {}: {}", track.id, e );
            self.state = PlaybackState::Failed;
            return Err( PlaybackError::Load( e ) );
        }

        self.session.play();
        self.state = PlaybackState::Playing;
        self.current = Some( track.clone() );

        Ok( now_playing( track ) )
    }


    /// Handles the session's end-of-track notification.
    ///
    /// Returns true when it refers to the track currently playing, in
    /// which case the controller moves to `Ended`.
    pub fn end_of_track( &mut self, id: &TrackId ) -> bool {
        let is_current = self.current.as_ref().map( |t| &t.id == id ).unwrap_or( false );
        if self.state != PlaybackState::Playing || !is_current {
            tracing::debug!( "Ignoring stale end of track for {}", id );
            return false;
        }

        self.state = PlaybackState::Ended;
        true
    }


    /// Stops the session.
    pub fn stop( &mut self ) {
        self.session.stop();
        self.state = PlaybackState::Idle;
        self.current = None;
    }


    pub fn state( &self ) -> PlaybackState {
        self.state
    }


    pub fn current( &self ) -> Option<&Track> {
        self.current.as_ref()
    }
}


/// Status line for a track that started playing.
pub fn now_playing( track: &Track ) -> String {
    format!( "Playing: {} - {} [{}]", track.artist, track.name, format_duration( track.duration ) )
}


/// Serves track requests until the sequencer hangs up.
///
/// End-of-track notifications for the current track are forwarded as
/// [`PlayerEvent::TrackEnded`]. The session is stopped on return.
pub async fn run_player<S: Session>(
    mut controller: PlaybackController<S>,
    mut ports: PlayerPorts,
    mut session_events: SessionEvents,
) -> Result<(), PlaybackError> {
    let result = loop {
        tokio::select! {
            request = ports.requests.recv() => {
                let Some( track ) = request else {
                    break Ok(());
                };
                let status = match controller.play( &track ) {
                    Ok( status ) => status,
                    Err( e ) => break Err( e ),
                };
                if ports.status.send( status ).await.is_err() {
                    break Ok(());
                }
            }
            Some( event ) = session_events.recv() => match event {
                SessionEvent::EndOfTrack( id ) => {
                    if controller.end_of_track( &id ) && ports.events.send( PlayerEvent::TrackEnded ).await.is_err() {
                        break Ok(());
                    }
                }
                SessionEvent::ConnectionState( state ) => {
                    tracing::info!( "Connection state changed: {:?}", state );
                }
            },
        }
    };

    controller.stop();
    tracing::debug!( "Player task finished" );
    result
}


#[cfg( test )]
pub( crate ) mod tests {
    use super::*;

    use std::sync::{ Arc, Mutex };
    use std::time::Duration;

    use tokio::sync::mpsc;

    use crate::events::event_bus;
    use crate::track::{ Availability, Playlist };


    /// Session double that records the calls made on it.
    #[derive( Default, Clone )]
    pub( crate ) struct FakeSession {
        pub calls: Arc<Mutex<Vec<String>>>,
        pub fail_load: bool,
    }


    impl Session for FakeSession {
        fn login( &mut self, _credentials: &crate::session::Credentials ) -> Result<(), SessionError> {
            Ok(())
        }


        fn playlists( &mut self ) -> Result<Vec<Playlist>, SessionError> {
            Ok( Vec::new() )
        }


        fn load( &mut self, track: &Track ) -> Result<(), SessionError> {
            self.calls.lock().unwrap().push( format!( "load {}", track.id ) );
            if self.fail_load {
                return Err( SessionError::Load { track: track.id.clone(), reason: "corrupt".into() } );
            }
            Ok(())
        }


        fn play( &mut self ) {
            self.calls.lock().unwrap().push( "play".into() );
        }


        fn stop( &mut self ) {
            self.calls.lock().unwrap().push( "stop".into() );
        }
    }


    pub( crate ) fn track( id: &str, availability: Availability ) -> Track {
        Track {
            id: TrackId( id.into() ),
            availability,
            duration: Duration::from_secs( 185 ),
            artist: "Artist".into(),
            name: format!( "Song {}", id ),
        }
    }


    #[test]
    fn test_play_unavailable_track_does_not_touch_session() {
        let session = FakeSession::default();
        let calls = session.calls.clone();
        let mut controller = PlaybackController::new( session );

        let status = controller.play( &track( "t1", Availability::Unavailable ) ).unwrap();

        assert_eq!( status, NOT_AVAILABLE );
        assert_eq!( controller.state(), PlaybackState::Idle );
        assert!( calls.lock().unwrap().is_empty() );
    }


    #[test]
    fn test_play_loads_then_plays() {
        let session = FakeSession::default();
        let calls = session.calls.clone();
        let mut controller = PlaybackController::new( session );

        let status = controller.play( &track( "t1", Availability::Available ) ).unwrap();

        assert_eq!( status, "Playing: Artist - Song t1 [3:05]" );
        assert_eq!( controller.state(), PlaybackState::Playing );
        assert_eq!( *calls.lock().unwrap(), vec![ "load t1".to_string(), "play".to_string() ] );
    }


    #[test]
    fn test_load_failure_is_fatal() {
        let session = FakeSession { fail_load: true, ..Default::default() };
        let calls = session.calls.clone();
        let mut controller = PlaybackController::new( session );

        let result = controller.play( &track( "t1", Availability::Available ) );

        assert!( matches!( result, Err( PlaybackError::Load( _ ) ) ) );
        assert_eq!( controller.state(), PlaybackState::Failed );
        assert_eq!( *calls.lock().unwrap(), vec![ "load t1".to_string() ] );
    }


    #[test]
    fn test_end_of_track_only_for_current() {
        let mut controller = PlaybackController::new( FakeSession::default() );
        controller.play( &track( "t1", Availability::Available ) ).unwrap();
        controller.play( &track( "t2", Availability::Available ) ).unwrap();

        assert!( !controller.end_of_track( &TrackId( "t1".into() ) ) );
        assert_eq!( controller.state(), PlaybackState::Playing );

        assert!( controller.end_of_track( &TrackId( "t2".into() ) ) );
        assert_eq!( controller.state(), PlaybackState::Ended );
        assert!( !controller.end_of_track( &TrackId( "t2".into() ) ) );
    }


    #[tokio::test]
    async fn test_player_answers_requests_and_forwards_track_end() {
        let ( mut sequencer, player ) = event_bus();
        let ( session_tx, session_rx ) = mpsc::unbounded_channel();
        let session = FakeSession::default();
        let calls = session.calls.clone();

        let handle = tokio::spawn( run_player( PlaybackController::new( session ), player, session_rx ) );

        sequencer.to_play.send( track( "t1", Availability::Available ) ).await.unwrap();
        assert_eq!( sequencer.status.recv().await.unwrap(), "Playing: Artist - Song t1 [3:05]" );

        session_tx.send( SessionEvent::EndOfTrack( TrackId( "t1".into() ) ) ).unwrap();
        assert_eq!( sequencer.events.recv().await.unwrap(), PlayerEvent::TrackEnded );

        drop( sequencer );
        handle.await.unwrap().unwrap();
        assert_eq!( calls.lock().unwrap().last().map( String::as_str ), Some( "stop" ) );
    }


    #[tokio::test]
    async fn test_player_stops_on_load_failure() {
        let ( mut sequencer, player ) = event_bus();
        let ( _session_tx, session_rx ) = mpsc::unbounded_channel();
        let session = FakeSession { fail_load: true, ..Default::default() };

        let handle = tokio::spawn( run_player( PlaybackController::new( session ), player, session_rx ) );

        sequencer.to_play.send( track( "t1", Availability::Available ) ).await.unwrap();
        assert!( sequencer.status.recv().await.is_none() );
        assert!( matches!( handle.await.unwrap(), Err( PlaybackError::Load( _ ) ) ) );
    }
}
