//! Track and playlist metadata as handed out by a session.

use std::fmt;
use std::time::Duration;


/// Opaque identifier of a track within its session.
#[derive( Debug, Clone, PartialEq, Eq, Hash )]
pub struct TrackId( pub String );


impl fmt::Display for TrackId {
    fn fmt( &self, f: &mut fmt::Formatter<'_> ) -> fmt::Result {
        f.write_str( &self.0 )
    }
}


/// Whether a track can be streamed right now.
#[derive( Debug, Clone, Copy, PartialEq, Eq )]
pub enum Availability {
    Available,
    Unavailable,
}


/// A playable track.
#[derive( Debug, Clone, PartialEq, Eq )]
pub struct Track {
    pub id: TrackId,
    pub availability: Availability,
    pub duration: Duration,
    pub artist: String,
    pub name: String,
}


impl Track {
    pub fn is_available( &self ) -> bool {
        self.availability == Availability::Available
    }
}


/// A named, ordered list of tracks.
#[derive( Debug, Clone, PartialEq, Eq )]
pub struct Playlist {
    pub name: String,
    pub tracks: Vec<Track>,
}


impl Playlist {
    pub fn new( name: impl Into<String>, tracks: Vec<Track> ) -> Self {
        Self { name: name.into(), tracks }
    }
}


/// Formats a duration as `m:ss`, or `h:mm:ss` past the hour.
pub fn format_duration( duration: Duration ) -> String {
    let total = duration.as_secs();
    let ( hours, minutes, seconds ) = ( total / 3600, ( total % 3600 ) / 60, total % 60 );
    if hours > 0 {
        format!( "{}:{:02}:{:02}", hours, minutes, seconds )
    } else {
        format!( "{}:{:02}", minutes, seconds )
    }
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_format_duration() {
        assert_eq!( format_duration( Duration::ZERO ), "0:00" );
        assert_eq!( format_duration( Duration::from_millis( 225_900 ) ), "3:45" );
        assert_eq!( format_duration( Duration::from_secs( 3723 ) ), "1:02:03" );
    }
}
