//! Application settings management
//!
//! Defaults are read from a JSON settings file and then overridden by
//! command-line flags.

use std::fs;
use std::path::{ Path, PathBuf };

use anyhow::{ anyhow, Result };
use serde::{ Deserialize, Serialize };

use crate::cli::Args;


/// Default location of the application key file.
pub const DEFAULT_APP_KEY: &str = "tapedeck_appkey.key";


/// Application settings.
#[derive( Debug, Clone, PartialEq, Serialize, Deserialize )]
#[serde( default )]
pub struct Settings {
    /// Directory holding the .m3u playlists
    pub library_dir: Option<PathBuf>,

    /// Comma-separated playlist allow-list, empty for all
    pub playlists: String,

    /// Suppress status lines
    pub silent: bool,

    /// Path to the application key file
    pub app_key: PathBuf,
}


impl Default for Settings {
    fn default() -> Self {
        Self {
            library_dir: None,
            playlists: String::new(),
            silent: false,
            app_key: PathBuf::from( DEFAULT_APP_KEY ),
        }
    }
}


impl Settings {
    /// Returns the path to the settings file.
    fn settings_path() -> Option<PathBuf> {
        dirs::config_dir().map( |p| p.join( "tapedeck" ).join( "settings.json" ) )
    }


    /// Loads settings from disk, or returns defaults if not found.
    pub fn load() -> Self {
        match Self::settings_path() {
            Some( path ) => Self::load_from( &path ),
            None => Self::default(),
        }
    }


    /// Loads settings from `path`, falling back to defaults.
    pub fn load_from( path: &Path ) -> Self {
        if !path.exists() {
            return Self::default();
        }

        match fs::read_to_string( path ) {
            Ok( contents ) => serde_json::from_str( &contents ).unwrap_or_else( |e| {
                tracing::warn!( "Ignoring malformed settings {:?}: {}", path, e );
                Self::default()
            }),
            Err( e ) => {
                tracing::warn!( "Failed to read settings: {}", e );
                Self::default()
            }
        }
    }


    /// Overrides settings with whatever was given on the command line.
    pub fn apply_args( &mut self, args: &Args ) {
        if args.silent {
            self.silent = true;
        }
        if let Some( playlists ) = &args.playlists {
            self.playlists = playlists.clone();
        }
        if let Some( library ) = &args.library {
            self.library_dir = Some( library.clone() );
        }
        if let Some( app_key ) = &args.app_key {
            self.app_key = app_key.clone();
        }
    }


    /// Playlist directory, defaulting to the user's audio directory.
    pub fn library_dir( &self ) -> Result<PathBuf> {
        self.library_dir
            .clone()
            .or_else( dirs::audio_dir )
            .ok_or_else( || anyhow!( "No library directory given and no audio directory found" ) )
    }
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!( Settings::load_from( &dir.path().join( "settings.json" ) ), Settings::default() );
    }


    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join( "settings.json" );
        fs::write( &path, r#"{ "playlists": "Road", "silent": true }"# ).unwrap();

        let settings = Settings::load_from( &path );
        assert_eq!( settings.playlists, "Road" );
        assert!( settings.silent );
        assert_eq!( settings.app_key, PathBuf::from( DEFAULT_APP_KEY ) );
        assert_eq!( settings.library_dir, None );
    }


    #[test]
    fn test_malformed_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join( "settings.json" );
        fs::write( &path, "{ not json" ).unwrap();

        assert_eq!( Settings::load_from( &path ), Settings::default() );
    }


    #[test]
    fn test_args_override_settings() {
        let mut settings = Settings {
            playlists: "Road".into(),
            library_dir: Some( PathBuf::from( "/music" ) ),
            ..Default::default()
        };
        let args = Args {
            playlists: Some( "Chill".into() ),
            silent: true,
            ..Default::default()
        };

        settings.apply_args( &args );
        assert_eq!( settings.playlists, "Chill" );
        assert!( settings.silent );
        assert_eq!( settings.library_dir, Some( PathBuf::from( "/music" ) ) );
        assert_eq!( settings.library_dir().unwrap(), PathBuf::from( "/music" ) );
    }
}
