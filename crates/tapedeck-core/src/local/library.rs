//! M3U playlists on disk.

use std::fs::{ self, File };
use std::io::{ BufRead, BufReader };
use std::path::{ Path, PathBuf };
use std::time::Duration;

use crate::decoder::Decoder;
use crate::track::{ Availability, Playlist, Track, TrackId };


const PLAYLIST_EXTENSIONS: &[&str] = &[ "m3u", "m3u8" ];

const UNKNOWN_ARTIST: &str = "Unknown artist";


/// Loads every playlist file directly inside `dir`, sorted by name.
///
/// Subdirectories are treated as folders and skipped.
pub fn load_playlists( dir: &Path ) -> std::io::Result<Vec<Playlist>> {
    let mut files: Vec<PathBuf> = fs::read_dir( dir )?
        .filter_map( |entry| entry.ok() )
        .map( |entry| entry.path() )
        .filter( |path| path.is_file() && is_playlist_file( path ) )
        .collect();
    files.sort();

    let mut playlists = Vec::with_capacity( files.len() );
    for path in files {
        let name = path
            .file_stem()
            .map( |s| s.to_string_lossy().into_owned() )
            .unwrap_or_default();
        let entries = read_m3u( &path )?;
        let tracks = entries.iter().map( |entry| probe_track( entry ) ).collect();
        tracing::debug!( "Loaded playlist {:?} with {} entries", name, entries.len() );
        playlists.push( Playlist::new( name, tracks ) );
    }

    Ok( playlists )
}


fn is_playlist_file( path: &Path ) -> bool {
    path.extension()
        .and_then( |e| e.to_str() )
        .map( |e| PLAYLIST_EXTENSIONS.contains( &e.to_lowercase().as_str() ) )
        .unwrap_or( false )
}


/// Reads track paths from an M3U file. Relative entries resolve against
/// the playlist's own directory.
fn read_m3u( path: &Path ) -> std::io::Result<Vec<PathBuf>> {
    let base = path.parent().unwrap_or( Path::new( "." ) );
    let reader = BufReader::new( File::open( path )? );

    let mut entries = Vec::new();
    for line in reader.lines() {
        let line = line?;
        let trimmed = line.trim();

        // Skip empty lines and #EXT directives
        if trimmed.is_empty() || trimmed.starts_with( '#' ) {
            continue;
        }

        let entry = PathBuf::from( trimmed );
        entries.push( if entry.is_absolute() { entry } else { base.join( entry ) } );
    }

    Ok( entries )
}


/// Builds track metadata for a file, marking it unavailable when it is
/// missing or cannot be decoded.
pub fn probe_track( path: &Path ) -> Track {
    let fallback_name = path
        .file_stem()
        .map( |s| s.to_string_lossy().into_owned() )
        .unwrap_or_else( || path.display().to_string() );

    let mut track = Track {
        id: TrackId( path.display().to_string() ),
        availability: Availability::Unavailable,
        duration: Duration::ZERO,
        artist: UNKNOWN_ARTIST.to_string(),
        name: fallback_name,
    };

    match Decoder::open( path ) {
        Ok( mut decoder ) => {
            let tags = decoder.tags();
            track.availability = Availability::Available;
            track.duration = decoder.duration().unwrap_or_default();
            if let Some( artist ) = tags.artist {
                track.artist = artist;
            }
            if let Some( title ) = tags.title {
                track.name = title;
            }
        }
        Err( e ) => {
            tracing::warn!( "Track {:?} unavailable: {}", path, e );
        }
    }

    track
}


#[cfg( test )]
mod tests {
    use super::*;

    use crate::local::tests::write_wav;


    #[test]
    fn test_load_playlists_reads_m3u_files_only() {
        let dir = tempfile::tempdir().unwrap();
        write_wav( &dir.path().join( "one.wav" ), 44100, 2, 4410 );
        fs::write( dir.path().join( "Road.m3u" ), "#EXTM3U\none.wav\n\nmissing.wav\n" ).unwrap();
        fs::write( dir.path().join( "notes.txt" ), "one.wav\n" ).unwrap();
        fs::create_dir( dir.path().join( "Folder.m3u" ) ).unwrap();

        let playlists = load_playlists( dir.path() ).unwrap();
        assert_eq!( playlists.len(), 1 );

        let road = &playlists[ 0 ];
        assert_eq!( road.name, "Road" );
        assert_eq!( road.tracks.len(), 2 );

        assert_eq!( road.tracks[ 0 ].availability, Availability::Available );
        assert_eq!( road.tracks[ 0 ].name, "one" );
        assert_eq!( road.tracks[ 0 ].artist, UNKNOWN_ARTIST );
        assert_eq!( road.tracks[ 0 ].duration, Duration::from_millis( 100 ) );

        assert_eq!( road.tracks[ 1 ].availability, Availability::Unavailable );
        assert_eq!( road.tracks[ 1 ].name, "missing" );
    }


    #[test]
    fn test_absolute_entries_are_kept() {
        let dir = tempfile::tempdir().unwrap();
        let audio = dir.path().join( "abs.wav" );
        write_wav( &audio, 44100, 1, 100 );
        fs::write( dir.path().join( "list.m3u8" ), format!( "{}\n", audio.display() ) ).unwrap();

        let playlists = load_playlists( dir.path() ).unwrap();
        assert_eq!( playlists[ 0 ].tracks[ 0 ].id, TrackId( audio.display().to_string() ) );
    }
}
