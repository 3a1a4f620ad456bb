//! Command-line argument parsing for tapedeck.

use std::path::PathBuf;

use clap::Parser;


/// tapedeck - shuffle-play your playlists from the terminal.
///
/// Press `>` to skip to the next track, Ctrl+C to quit.
#[derive( Parser, Debug, Default )]
#[command( name = "tapedeck" )]
#[command( version, about, long_about = None )]
pub struct Args {
    /// Do not print status lines.
    #[arg( short, long )]
    pub silent: bool,

    /// Comma-separated playlist names to play; all playlists when omitted.
    #[arg( short, long, value_name = "NAMES" )]
    pub playlists: Option<String>,

    /// Directory containing the .m3u playlists.
    #[arg( short, long, value_name = "DIR", env = "TAPEDECK_LIBRARY" )]
    pub library: Option<PathBuf>,

    /// Application key file.
    #[arg( long, value_name = "FILE", env = "TAPEDECK_APP_KEY" )]
    pub app_key: Option<PathBuf>,
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_parse_flags() {
        let args = Args::try_parse_from([ "tapedeck", "-s", "-p", "Road, Chill", "--app-key", "key.bin" ]).unwrap();
        assert!( args.silent );
        assert_eq!( args.playlists.as_deref(), Some( "Road, Chill" ) );
        assert_eq!( args.app_key, Some( PathBuf::from( "key.bin" ) ) );
    }
}
