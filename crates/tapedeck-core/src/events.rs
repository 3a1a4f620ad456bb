//! Channels connecting the sequencer, the player task and the listeners.
//!
//! `ToPlay` and `Status` are single-purpose and hold one message each, so
//! the sequencer and player move in lock step. Every source of "move on"
//! (keyboard, end of track, interrupt) feeds one tagged event channel.

use tokio::sync::mpsc;

use crate::track::Track;


const EVENT_CAPACITY: usize = 16;


/// Signals consumed by the sequencer.
#[derive( Debug, Clone, Copy, PartialEq, Eq )]
pub enum PlayerEvent {
    /// The user asked for the next track.
    ManualSkip,
    /// The current track finished playing.
    TrackEnded,
    /// The process is shutting down.
    Shutdown,
}


impl PlayerEvent {
    /// True for events that move the play queue forward.
    pub fn is_advance( &self ) -> bool {
        matches!( self, PlayerEvent::ManualSkip | PlayerEvent::TrackEnded )
    }
}


/// The sequencer's end of the bus.
#[derive( Debug )]
pub struct SequencerPorts {
    pub to_play: mpsc::Sender<Track>,
    pub status: mpsc::Receiver<String>,
    pub events: mpsc::Receiver<PlayerEvent>,
}


/// The player task's end of the bus.
#[derive( Debug )]
pub struct PlayerPorts {
    pub requests: mpsc::Receiver<Track>,
    pub status: mpsc::Sender<String>,
    pub events: mpsc::Sender<PlayerEvent>,
}


/// Creates the bus. Listeners get their own sender via `PlayerPorts::events.clone()`.
pub fn event_bus() -> ( SequencerPorts, PlayerPorts ) {
    let ( to_play_tx, to_play_rx ) = mpsc::channel( 1 );
    let ( status_tx, status_rx ) = mpsc::channel( 1 );
    let ( events_tx, events_rx ) = mpsc::channel( EVENT_CAPACITY );

    (
        SequencerPorts {
            to_play: to_play_tx,
            status: status_rx,
            events: events_rx,
        },
        PlayerPorts {
            requests: to_play_rx,
            status: status_tx,
            events: events_tx,
        },
    )
}
