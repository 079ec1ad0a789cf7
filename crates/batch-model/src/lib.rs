//! Seqrec Batch Model
//!
//! Defines the core data contracts for batch capture:
//! - **Sequences:** Source sequence handles and durable scene-object references
//! - **Captures:** Per-kind capture configurations, defaults, validation, repair
//! - **Batches:** Batch items, per-item status, and the persisted session record
//! - **Templates:** Output-path placeholder resolution
//!
//! Nothing here touches a capture backend. The orchestrator crate drives
//! playback and capture from these types.

pub mod batch;
pub mod capture;
pub mod factory;
pub mod repair;
pub mod scene;
pub mod sequence;
pub mod template;
pub mod validate;

pub use batch::*;
pub use capture::*;
pub use factory::*;
pub use repair::*;
pub use scene::*;
pub use sequence::*;
pub use template::*;
pub use validate::*;
