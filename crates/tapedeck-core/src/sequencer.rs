//! Track selection and the play/advance loop.
//!
//! The play queue is shuffled once when it is built and then walked in a
//! circle for the rest of the session.

use std::time::{ SystemTime, UNIX_EPOCH };

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use thiserror::Error;

use crate::events::{ PlayerEvent, SequencerPorts };
use crate::track::{ Playlist, Track };


/// Errors from building or running the sequencer.
#[derive( Debug, Error )]
pub enum SequencerError {
    #[error( "No tracks selected" )]
    NoTracksSelected,

    #[error( "Player stopped" )]
    PlayerStopped,
}


/// Allow-list of playlist names. Empty allows everything.
#[derive( Debug, Clone, Default, PartialEq, Eq )]
pub struct PlaylistFilter {
    names: Vec<String>,
}


impl PlaylistFilter {
    /// Parses a comma-separated list of playlist names.
    pub fn parse( filter: &str ) -> Self {
        if filter.is_empty() {
            return Self::default();
        }

        Self {
            names: filter.split( ',' ).map( |name| name.trim().to_string() ).collect(),
        }
    }


    pub fn allows( &self, playlist: &str ) -> bool {
        self.names.is_empty() || self.names.iter().any( |name| name == playlist )
    }


    pub fn names( &self ) -> &[String] {
        &self.names
    }
}


/// Seed derived from the wall clock.
pub fn seed_from_clock() -> u64 {
    SystemTime::now()
        .duration_since( UNIX_EPOCH )
        .map( |d| d.as_nanos() as u64 )
        .unwrap_or_default()
}


/// A uniformly random permutation of `0..n`.
pub fn random_permutation( n: usize, seed: u64 ) -> Vec<usize> {
    let mut perm: Vec<usize> = ( 0..n ).collect();
    perm.shuffle( &mut StdRng::seed_from_u64( seed ) );
    perm
}


/// Circular queue of the tracks selected for this session.
#[derive( Debug, Clone )]
pub struct PlayQueue {
    tracks: Vec<Track>,
    cursor: usize,
}


impl PlayQueue {
    /// Collects the tracks of every playlist passing `filter`, shuffled
    /// with a permutation drawn from `seed`.
    pub fn build( playlists: &[Playlist], filter: &PlaylistFilter, seed: u64 ) -> Result<Self, SequencerError> {
        let selected: Vec<&Track> = playlists
            .iter()
            .filter( |playlist| filter.allows( &playlist.name ) )
            .flat_map( |playlist| playlist.tracks.iter() )
            .collect();

        if selected.is_empty() {
            return Err( SequencerError::NoTracksSelected );
        }

        let perm = random_permutation( selected.len(), seed );
        let mut slots: Vec<Option<Track>> = vec![ None; selected.len() ];
        for ( track, &slot ) in selected.into_iter().zip( perm.iter() ) {
            slots[ slot ] = Some( track.clone() );
        }

        let tracks: Vec<Track> = slots.into_iter().flatten().collect();
        tracing::info!( "Selected {} tracks", tracks.len() );

        Ok( Self { tracks, cursor: 0 } )
    }


    pub fn current( &self ) -> &Track {
        &self.tracks[ self.cursor ]
    }


    /// Moves to the next track, wrapping to the start past the end.
    pub fn advance( &mut self ) -> &Track {
        self.cursor = ( self.cursor + 1 ) % self.tracks.len();
        self.current()
    }


    pub fn cursor( &self ) -> usize {
        self.cursor
    }


    pub fn tracks( &self ) -> &[Track] {
        &self.tracks
    }


    pub fn len( &self ) -> usize {
        self.tracks.len()
    }


    /// Always false; an empty queue cannot be built.
    pub fn is_empty( &self ) -> bool {
        self.tracks.is_empty()
    }
}


/// Drives playback through the play queue.
pub struct TrackSequencer {
    queue: PlayQueue,
    silent: bool,
}


impl TrackSequencer {
    pub fn new( queue: PlayQueue, silent: bool ) -> Self {
        Self { queue, silent }
    }


    pub fn queue( &self ) -> &PlayQueue {
        &self.queue
    }


    /// Plays tracks until a shutdown event arrives.
    ///
    /// Each track is sent to the player, its status line is passed to
    /// `display` unless silent, and the queue advances once per skip or
    /// track end. Advances that arrive while a track is still loading are
    /// applied after its status comes back.
    pub async fn run<F>( &mut self, ports: &mut SequencerPorts, mut display: F ) -> Result<(), SequencerError>
    where
        F: FnMut( &str ),
    {
        let mut pending_advances = 0usize;

        loop {
            let track = self.queue.current().clone();
            tracing::debug!( "Requesting {} ({}/{})", track.id, self.queue.cursor() + 1, self.queue.len() );
            if ports.to_play.send( track ).await.is_err() {
                return Err( SequencerError::PlayerStopped );
            }

            let status = loop {
                tokio::select! {
                    biased;

                    status = ports.status.recv() => match status {
                        Some( status ) => break status,
                        None => return Err( SequencerError::PlayerStopped ),
                    },
                    event = ports.events.recv() => match event {
                        Some( event ) if event.is_advance() => pending_advances += 1,
                        _ => return Ok(()),
                    },
                }
            };

            if !self.silent {
                display( &status );
            }

            if pending_advances > 0 {
                pending_advances -= 1;
            } else {
                match ports.events.recv().await {
                    Some( event ) if event.is_advance() => {}
                    _ => return Ok(()),
                }
            }

            self.queue.advance();
        }
    }
}


#[cfg( test )]
mod tests {
    use super::*;

    use std::collections::HashSet;
    use std::sync::{ Arc, Mutex };
    use std::time::Duration;

    use crate::events::event_bus;
    use crate::track::{ Availability, TrackId };


    fn track( id: &str ) -> Track {
        Track {
            id: TrackId( id.into() ),
            availability: Availability::Available,
            duration: Duration::from_secs( 60 ),
            artist: "Artist".into(),
            name: id.into(),
        }
    }


    fn ids( queue: &PlayQueue ) -> Vec<String> {
        queue.tracks().iter().map( |t| t.id.0.clone() ).collect()
    }


    #[test]
    fn test_filter_parse_trims_names() {
        let filter = PlaylistFilter::parse( " Road ,Chill,  Late Night " );
        assert_eq!( filter.names(), &[ "Road", "Chill", "Late Night" ] );
        assert!( filter.allows( "Late Night" ) );
        assert!( !filter.allows( "road" ) );
    }


    #[test]
    fn test_empty_filter_allows_all() {
        let filter = PlaylistFilter::parse( "" );
        assert!( filter.allows( "anything" ) );
    }


    #[test]
    fn test_permutation_is_bijection() {
        for n in [ 0, 1, 2, 7, 100, 1000 ] {
            for seed in [ 0, 1, 42, seed_from_clock() ] {
                let perm = random_permutation( n, seed );
                assert_eq!( perm.len(), n );
                let seen: HashSet<usize> = perm.iter().copied().collect();
                assert_eq!( seen.len(), n );
                assert!( perm.iter().all( |&i| i < n ) );
            }
        }
    }


    #[test]
    fn test_build_without_filter_selects_everything() {
        let playlists = vec![ Playlist::new( "A", vec![ track( "t1" ), track( "t2" ) ] ) ];
        let queue = PlayQueue::build( &playlists, &PlaylistFilter::parse( "" ), 7 ).unwrap();

        assert_eq!( queue.len(), 2 );
        let mut selected = ids( &queue );
        selected.sort();
        assert_eq!( selected, vec![ "t1", "t2" ] );
    }


    #[test]
    fn test_build_applies_filter() {
        let playlists = vec![
            Playlist::new( "A", vec![ track( "t1" ) ] ),
            Playlist::new( "B", vec![ track( "t2" ) ] ),
        ];

        let queue = PlayQueue::build( &playlists, &PlaylistFilter::parse( "A" ), 1 ).unwrap();
        assert_eq!( ids( &queue ), vec![ "t1" ] );

        let result = PlayQueue::build( &playlists, &PlaylistFilter::parse( "C" ), 1 );
        let err = result.unwrap_err();
        assert!( matches!( err, SequencerError::NoTracksSelected ) );
        assert_eq!( err.to_string(), "No tracks selected" );
    }


    #[test]
    fn test_build_with_only_empty_playlists_fails() {
        let playlists = vec![ Playlist::new( "A", Vec::new() ) ];
        let result = PlayQueue::build( &playlists, &PlaylistFilter::default(), 1 );
        assert!( matches!( result, Err( SequencerError::NoTracksSelected ) ) );
    }


    #[test]
    fn test_build_is_fixed_for_a_seed() {
        let tracks: Vec<Track> = ( 0..20 ).map( |i| track( &format!( "t{}", i ) ) ).collect();
        let playlists = vec![ Playlist::new( "A", tracks ) ];

        let first = PlayQueue::build( &playlists, &PlaylistFilter::default(), 99 ).unwrap();
        let second = PlayQueue::build( &playlists, &PlaylistFilter::default(), 99 ).unwrap();
        assert_eq!( ids( &first ), ids( &second ) );
    }


    #[test]
    fn test_advance_wraps_around() {
        let playlists = vec![ Playlist::new( "A", vec![ track( "t1" ), track( "t2" ), track( "t3" ) ] ) ];
        let mut queue = PlayQueue::build( &playlists, &PlaylistFilter::default(), 3 ).unwrap();
        let order = ids( &queue );

        let mut visited = vec![ queue.current().id.0.clone() ];
        for _ in 0..6 {
            visited.push( queue.advance().id.0.clone() );
        }

        assert_eq!( visited[ ..3 ], order[ .. ] );
        assert_eq!( visited[ 3..6 ], order[ .. ] );
        assert_eq!( visited[ 6 ], order[ 0 ] );
        assert_eq!( queue.cursor(), 0 );
    }


    #[tokio::test]
    async fn test_run_advances_once_per_signal() {
        let playlists = vec![ Playlist::new( "A", vec![ track( "t1" ), track( "t2" ), track( "t3" ) ] ) ];
        let queue = PlayQueue::build( &playlists, &PlaylistFilter::default(), 5 ).unwrap();
        let order = ids( &queue );

        let ( mut ports, mut player ) = event_bus();
        let shown = Arc::new( Mutex::new( Vec::new() ) );
        let shown_clone = shown.clone();

        let handle = tokio::spawn( async move {
            let mut sequencer = TrackSequencer::new( queue, false );
            sequencer
                .run( &mut ports, move |status| shown_clone.lock().unwrap().push( status.to_string() ) )
                .await
        });

        let mut requested = Vec::new();
        for ( i, event ) in [ PlayerEvent::ManualSkip, PlayerEvent::TrackEnded, PlayerEvent::ManualSkip ].into_iter().enumerate() {
            requested.push( player.requests.recv().await.unwrap().id.0 );
            player.status.send( format!( "status {}", i ) ).await.unwrap();
            player.events.send( event ).await.unwrap();
        }
        requested.push( player.requests.recv().await.unwrap().id.0 );

        assert_eq!( requested, vec![ order[ 0 ].clone(), order[ 1 ].clone(), order[ 2 ].clone(), order[ 0 ].clone() ] );

        player.events.send( PlayerEvent::Shutdown ).await.unwrap();
        handle.await.unwrap().unwrap();
        assert_eq!( *shown.lock().unwrap(), vec![ "status 0", "status 1", "status 2" ] );
    }


    #[tokio::test]
    async fn test_skips_during_load_are_not_lost() {
        let playlists = vec![ Playlist::new( "A", vec![ track( "t1" ), track( "t2" ), track( "t3" ) ] ) ];
        let queue = PlayQueue::build( &playlists, &PlaylistFilter::default(), 11 ).unwrap();
        let order = ids( &queue );

        let ( mut ports, mut player ) = event_bus();
        let handle = tokio::spawn( async move {
            TrackSequencer::new( queue, true ).run( &mut ports, |_| panic!( "silent" ) ).await
        });

        assert_eq!( player.requests.recv().await.unwrap().id.0, order[ 0 ] );
        player.events.send( PlayerEvent::ManualSkip ).await.unwrap();
        player.events.send( PlayerEvent::ManualSkip ).await.unwrap();
        player.status.send( "first".into() ).await.unwrap();

        assert_eq!( player.requests.recv().await.unwrap().id.0, order[ 1 ] );
        player.status.send( "second".into() ).await.unwrap();

        assert_eq!( player.requests.recv().await.unwrap().id.0, order[ 2 ] );
        player.events.send( PlayerEvent::Shutdown ).await.unwrap();
        handle.await.unwrap().unwrap();
    }
}
