//! Keyboard listener.
//!
//! Puts the terminal in raw mode so single keystrokes arrive without
//! Enter, and turns them into player events.

use std::io;
use std::thread;

use crossterm::event::{ self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers };
use crossterm::terminal::{ disable_raw_mode, enable_raw_mode };
use tokio::sync::mpsc;

use tapedeck_core::PlayerEvent;


/// Key that skips to the next track.
pub const SKIP_KEY: char = '>';


/// Maps a key press to the event it triggers, if any.
pub fn key_to_event( key: &KeyEvent ) -> Option<PlayerEvent> {
    if key.kind != KeyEventKind::Press {
        return None;
    }

    match key.code {
        KeyCode::Char( SKIP_KEY ) => Some( PlayerEvent::ManualSkip ),
        // Raw mode swallows SIGINT, so Ctrl+C shows up as a key
        KeyCode::Char( 'c' ) if key.modifiers.contains( KeyModifiers::CONTROL ) => Some( PlayerEvent::Shutdown ),
        _ => None,
    }
}


/// Keeps the terminal in raw mode while alive.
pub struct RawModeGuard;


impl RawModeGuard {
    pub fn enable() -> io::Result<Self> {
        enable_raw_mode()?;
        Ok( Self )
    }
}


impl Drop for RawModeGuard {
    fn drop( &mut self ) {
        if let Err( e ) = disable_raw_mode() {
            tracing::warn!( "Failed to restore terminal: {}", e );
        }
    }
}


/// Reads keys on a dedicated thread and forwards the mapped events.
///
/// The thread ends when the event channel closes or the terminal read fails.
pub fn spawn_keyboard_listener( events: mpsc::Sender<PlayerEvent> ) -> io::Result<thread::JoinHandle<()>> {
    thread::Builder::new()
        .name( "tapedeck-keys".into() )
        .spawn( move || loop {
            let key = match event::read() {
                Ok( Event::Key( key ) ) => key,
                Ok( _ ) => continue,
                Err( e ) => {
                    tracing::error!( "Keyboard read failed: {}", e );
                    return;
                }
            };

            if let Some( player_event ) = key_to_event( &key ) {
                tracing::debug!( "Key {:?} -> {:?}", key.code, player_event );
                if events.blocking_send( player_event ).is_err() {
                    return;
                }
            }
        })
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_skip_key() {
        let key = KeyEvent::new( KeyCode::Char( '>' ), KeyModifiers::SHIFT );
        assert_eq!( key_to_event( &key ), Some( PlayerEvent::ManualSkip ) );
    }


    #[test]
    fn test_ctrl_c_requests_shutdown() {
        let key = KeyEvent::new( KeyCode::Char( 'c' ), KeyModifiers::CONTROL );
        assert_eq!( key_to_event( &key ), Some( PlayerEvent::Shutdown ) );
    }


    #[test]
    fn test_other_keys_are_ignored() {
        for code in [ KeyCode::Char( 'c' ), KeyCode::Char( '<' ), KeyCode::Enter, KeyCode::Right ] {
            assert_eq!( key_to_event( &KeyEvent::new( code, KeyModifiers::NONE ) ), None );
        }
    }


    #[test]
    fn test_key_release_is_ignored() {
        let mut key = KeyEvent::new( KeyCode::Char( '>' ), KeyModifiers::NONE );
        key.kind = KeyEventKind::Release;
        assert_eq!( key_to_event( &key ), None );
    }
}
