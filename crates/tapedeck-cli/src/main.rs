//! Tapedeck CLI - shuffle player for the terminal

mod cli;
mod console;
mod input;
mod settings;

use std::fs::{ self, File };
use std::io::{ self, IsTerminal };
use std::path::Path;
use std::sync::{ Arc, Mutex };
use std::thread;

use anyhow::{ bail, Context, Result };
use clap::Parser;
use tokio::sync::{ mpsc, oneshot };
use tracing_subscriber::EnvFilter;

use cli::Args;
use console::StatusPrinter;
use input::RawModeGuard;
use settings::Settings;

use tapedeck_core::{
    event_bus, frame_queue, run_player, wait_for_login,
    session::LOGIN_TIMEOUT,
    sequencer::seed_from_clock,
    CpalSink, Credentials, FrameConsumer, LocalSession, LocalSessionConfig, OutputDriver,
    PlayQueue, PlaybackController, PlayerEvent, PlaylistFilter, Session, TrackSequencer,
    DEFAULT_QUEUE_CAPACITY,
};


/// Working directory for the session cache, session settings and the log.
const WORK_DIR: &str = "tmp";


/// Sends log output to a file so stdout only carries status lines.
fn init_logging( dir: &Path ) -> Result<()> {
    fs::create_dir_all( dir ).with_context( || format!( "Failed to create {:?}", dir ) )?;
    let path = dir.join( "tapedeck.log" );
    let file = File::create( &path ).with_context( || format!( "Failed to create {:?}", path ) )?;

    tracing_subscriber::fmt()
        .with_env_filter( EnvFilter::try_from_default_env().unwrap_or_else( |_| EnvFilter::new( "info" ) ) )
        .with_writer( Mutex::new( file ) )
        .with_ansi( false )
        .init();

    Ok(())
}


/// Opens the output device on its own thread and runs the write loop there.
///
/// Returns once the device is open; the thread keeps draining `frames`
/// until every producer is gone.
async fn spawn_output( mut frames: FrameConsumer ) -> Result<()> {
    let ( ready_tx, ready_rx ) = oneshot::channel();

    thread::Builder::new()
        .name( "tapedeck-output".into() )
        .spawn( move || {
            let mut sink = match CpalSink::open() {
                Ok( sink ) => sink,
                Err( e ) => {
                    let _ = ready_tx.send( Err( e ) );
                    return;
                }
            };
            let _ = ready_tx.send( Ok(()) );

            let mut driver = OutputDriver::new();
            if let Err( e ) = driver.run( &mut frames, &mut sink ) {
                tracing::error!( "Output stopped: {}", e );
            }
        })
        .context( "Failed to spawn output thread" )?;

    ready_rx
        .await
        .context( "Output thread exited before opening the device" )?
        .context( "Failed to open audio output" )
}


/// Emits `Shutdown` when the process is interrupted.
fn spawn_termination_listener( events: mpsc::Sender<PlayerEvent> ) {
    tokio::spawn( async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!( "Interrupted" );
                let _ = events.send( PlayerEvent::Shutdown ).await;
            }
            Err( e ) => tracing::warn!( "Failed to listen for interrupt: {}", e ),
        }
    });
}


#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let mut settings = Settings::load();
    settings.apply_args( &args );

    let work_dir = Path::new( WORK_DIR );
    init_logging( work_dir )?;
    tracing::info!( "Starting tapedeck {}", env!( "CARGO_PKG_VERSION" ) );

    let app_key = fs::read( &settings.app_key )
        .with_context( || format!( "Failed to read application key {:?}", settings.app_key ) )?;
    if app_key.is_empty() {
        bail!( "Application key {:?} is empty", settings.app_key );
    }
    let credentials = Credentials::from_env()?;
    let library_dir = settings.library_dir()?;

    let ( producer, consumer ) = frame_queue( DEFAULT_QUEUE_CAPACITY );
    spawn_output( consumer ).await?;

    let config = LocalSessionConfig {
        app_key,
        library_dir,
        cache_location: work_dir.to_path_buf(),
        settings_location: work_dir.to_path_buf(),
    };
    let ( mut session, mut session_events ) = LocalSession::new( config, Arc::new( producer ) )?;

    session.login( &credentials )?;
    wait_for_login( &mut session_events, LOGIN_TIMEOUT ).await?;

    let playlists = session.playlists()?;
    let filter = PlaylistFilter::parse( &settings.playlists );
    let queue = PlayQueue::build( &playlists, &filter, seed_from_clock() )?;

    let ( mut seq_ports, player_ports ) = event_bus();
    spawn_termination_listener( player_ports.events.clone() );

    let raw_mode = if io::stdin().is_terminal() {
        let guard = RawModeGuard::enable().context( "Failed to enable raw terminal mode" )?;
        input::spawn_keyboard_listener( player_ports.events.clone() )
            .context( "Failed to spawn keyboard listener" )?;
        Some( guard )
    } else {
        tracing::info!( "stdin is not a terminal, keyboard skipping disabled" );
        None
    };

    let player = tokio::spawn( run_player( PlaybackController::new( session ), player_ports, session_events ) );

    let mut printer = StatusPrinter::stdout( raw_mode.is_some() );
    let mut sequencer = TrackSequencer::new( queue, settings.silent );
    let outcome = sequencer.run( &mut seq_ports, |status| printer.print( status ) ).await;

    // Closing the bus tells the player to stop; awaiting it is the acknowledgement
    drop( seq_ports );
    let played = player.await.context( "Player task panicked" )?;
    drop( raw_mode );

    played?;
    outcome?;

    tracing::info!( "Shut down" );
    Ok(())
}
