pub mod checkpoint;
pub mod config;
pub mod coordinator;
pub mod events;
pub mod health;
pub mod keygen;
pub mod metrics;
pub mod params;
pub mod pattern;
pub mod persist;
pub mod probability;
pub mod progress;
pub mod selftest;
pub mod tracker;
pub mod worker;

pub use config::{MatchMode, SearchConfig, VanityWidth};
pub use coordinator::{CancelHandle, SearchCoordinator, SearchOutcome, SearchReport};
pub use events::{Event, EventLog, EventSink, LogSink};
pub use keygen::{
    meshcore_factory, CandidateKey, GeneratorFactory, Keypair, KeypairGenerator,
    MeshcoreGenerator,
};
pub use pattern::WatchlistPattern;
pub use persist::{FileKeySink, KeyFormat, KeySink};
pub use worker::{BatchResult, StopReason, WorkerState};
