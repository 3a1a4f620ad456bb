//! Tapedeck Core - audio pipeline and playback sequencing
//!
//! This crate provides the producer/consumer audio pipeline between a
//! decoding session and the output device, the playback controller, the
//! shuffled track sequencer and the event bus connecting them.

pub mod audio;
pub mod controller;
pub mod decoder;
pub mod events;
pub mod local;
pub mod output;
pub mod queue;
pub mod sequencer;
pub mod session;
pub mod track;

pub use audio::{ AudioChunk, AudioConsumer, AudioFormat };
pub use controller::{ run_player, PlaybackController, PlaybackError, PlaybackState };
pub use events::{ event_bus, PlayerEvent, PlayerPorts, SequencerPorts };
pub use local::{ LocalSession, LocalSessionConfig };
pub use output::{ CpalSink, FrameSink, OutputDriver, OutputError };
pub use queue::{ frame_queue, FrameConsumer, FrameProducer, DEFAULT_QUEUE_CAPACITY };
pub use sequencer::{ PlayQueue, PlaylistFilter, SequencerError, TrackSequencer };
pub use session::{ wait_for_login, Credentials, Session, SessionError, SessionEvent, SessionEvents };
pub use track::{ Availability, Playlist, Track, TrackId };
