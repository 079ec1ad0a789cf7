//! Seqrec Orchestrator
//!
//! Drives batch capture: for every batch item it synthesizes a wrapper
//! graph (one control clip replaying the source sequence plus one capture
//! clip per enabled capture), steps playback and capture backends in
//! lock-step, and records the outcome in a session record that survives the
//! runtime restart triggered by entering capture mode.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                    Orchestrator                       │
//! │  ┌────────────────────────────────────────────────┐  │
//! │  │                 SessionMachine                  │  │
//! │  │   Idle → Preparing ─restart─▶ Executing(i) ─▶   │  │
//! │  │          Completed | Cancelled | FailedFatal    │  │
//! │  └──────┬──────────────┬───────────────┬──────────┘  │
//! │         ▼              ▼               ▼             │
//! │   Synthesizer     SessionStore    RuntimeHost        │
//! │         │          (key-value)    (mode switch)      │
//! │         ▼                                            │
//! │   WrapperGraph ──▶ PlaybackDriver + CaptureBackends  │
//! └──────────────────────────────────────────────────────┘
//! ```

pub mod assets;
pub mod backend;
pub mod facade;
pub mod graph;
pub mod host;
pub mod machine;
pub mod playback;
pub mod store;
pub mod synth;
pub mod testing;

pub use assets::*;
pub use backend::*;
pub use facade::*;
pub use graph::*;
pub use host::*;
pub use machine::*;
pub use playback::*;
pub use store::*;
pub use synth::*;
