//! Streaming session abstraction.
//!
//! A session authenticates, lists playlists, loads and plays tracks. Decoded
//! audio leaves the session through an [`AudioConsumer`] on a thread the
//! session owns; state changes and end-of-track notifications arrive on a
//! [`SessionEvents`] channel.
//!
//! [`AudioConsumer`]: crate::audio::AudioConsumer

use std::env;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;

use crate::track::{ Playlist, Track, TrackId };


/// Environment variable holding the account user name.
pub const USERNAME_VAR: &str = "TAPEDECK_USERNAME";

/// Environment variable holding the account password.
pub const PASSWORD_VAR: &str = "TAPEDECK_PASSWORD";

/// How long login waits for the session to report it is logged in.
pub const LOGIN_TIMEOUT: Duration = Duration::from_secs( 3 );


/// Errors raised by a session.
#[derive( Debug, Error )]
pub enum SessionError {
    #[error( "Invalid application key" )]
    InvalidAppKey,

    #[error( "Missing credentials: {0} is not set" )]
    MissingCredentials( &'static str ),

    #[error( "Login failed: {0}" )]
    Login( String ),

    #[error( "Could not login: no connection within {0:?}" )]
    LoginTimeout( Duration ),

    #[error( "Not logged in" )]
    NotLoggedIn,

    #[error( "Failed to load playlists: {0}" )]
    Playlists( String ),

    #[error( "Failed to load track {track}: {reason}" )]
    Load { track: TrackId, reason: String },

    #[error( "IO error: {0}" )]
    Io( #[from] std::io::Error ),
}


/// Connectivity of the session.
#[derive( Debug, Clone, Copy, PartialEq, Eq )]
pub enum ConnectionState {
    LoggedOut,
    LoggedIn,
    Disconnected,
    Offline,
}


/// Notifications emitted by a session.
#[derive( Debug, Clone, PartialEq, Eq )]
pub enum SessionEvent {
    ConnectionState( ConnectionState ),
    EndOfTrack( TrackId ),
}


/// Event stream handed out by a session at construction.
pub type SessionEvents = mpsc::UnboundedReceiver<SessionEvent>;


/// Account credentials.
#[derive( Clone )]
pub struct Credentials {
    pub username: String,
    pub password: String,
}


impl Credentials {
    /// Reads credentials from `TAPEDECK_USERNAME` and `TAPEDECK_PASSWORD`.
    pub fn from_env() -> Result<Self, SessionError> {
        let username = env::var( USERNAME_VAR )
            .map_err( |_| SessionError::MissingCredentials( USERNAME_VAR ) )?;
        let password = env::var( PASSWORD_VAR )
            .map_err( |_| SessionError::MissingCredentials( PASSWORD_VAR ) )?;
        Ok( Self { username, password } )
    }
}


impl std::fmt::Debug for Credentials {
    fn fmt( &self, f: &mut std::fmt::Formatter<'_> ) -> std::fmt::Result {
        f.debug_struct( "Credentials" )
            .field( "username", &self.username )
            .field( "password", &"<redacted>" )
            .finish()
    }
}


/// A logged-in connection to a music source.
///
/// `load` replaces whatever was loaded before; at most one track is ever
/// being decoded.
pub trait Session: Send {
    /// Starts logging in. Success is reported later as a
    /// [`ConnectionState::LoggedIn`] event.
    fn login( &mut self, credentials: &Credentials ) -> Result<(), SessionError>;

    /// Lists the user's playlists, folders excluded.
    fn playlists( &mut self ) -> Result<Vec<Playlist>, SessionError>;

    /// Prepares `track` for decoding, stopping any current playback.
    fn load( &mut self, track: &Track ) -> Result<(), SessionError>;

    /// Starts delivering audio for the loaded track.
    fn play( &mut self );

    /// Stops delivering audio and unloads the current track.
    fn stop( &mut self );
}


/// Waits for the session to report [`ConnectionState::LoggedIn`].
///
/// Events other than the logged-in state are consumed and ignored. Fails if
/// `timeout` elapses first or the event stream closes.
pub async fn wait_for_login( events: &mut SessionEvents, timeout: Duration ) -> Result<(), SessionError> {
    let logged_in = async {
        while let Some( event ) = events.recv().await {
            match event {
                SessionEvent::ConnectionState( ConnectionState::LoggedIn ) => return true,
                other => tracing::debug!( "Ignoring {:?} while logging in", other ),
            }
        }
        false
    };

    match tokio::time::timeout( timeout, logged_in ).await {
        Ok( true ) => {
            tracing::info!( "Logged in" );
            Ok(())
        }
        Ok( false ) => Err( SessionError::Login( "session closed before login completed".into() ) ),
        Err( _ ) => Err( SessionError::LoginTimeout( timeout ) ),
    }
}


#[cfg( test )]
mod tests {
    use super::*;


    #[tokio::test]
    async fn test_wait_for_login_succeeds_on_logged_in() {
        let ( tx, mut rx ) = mpsc::unbounded_channel();
        tx.send( SessionEvent::ConnectionState( ConnectionState::Offline ) ).unwrap();
        tx.send( SessionEvent::ConnectionState( ConnectionState::LoggedIn ) ).unwrap();

        assert!( wait_for_login( &mut rx, Duration::from_secs( 1 ) ).await.is_ok() );
    }


    #[tokio::test]
    async fn test_wait_for_login_times_out_without_connection() {
        let ( tx, mut rx ) = mpsc::unbounded_channel();
        tx.send( SessionEvent::ConnectionState( ConnectionState::Disconnected ) ).unwrap();

        let result = wait_for_login( &mut rx, Duration::from_millis( 50 ) ).await;
        assert!( matches!( result, Err( SessionError::LoginTimeout( _ ) ) ) );
        drop( tx );
    }


    #[tokio::test]
    async fn test_wait_for_login_fails_when_stream_closes() {
        let ( tx, mut rx ) = mpsc::unbounded_channel::<SessionEvent>();
        drop( tx );

        let result = wait_for_login( &mut rx, Duration::from_secs( 1 ) ).await;
        assert!( matches!( result, Err( SessionError::Login( _ ) ) ) );
    }
}
