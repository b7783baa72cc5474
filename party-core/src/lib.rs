//! Core of the party finder.
//!
//! This crate is pure: it holds the data model, the typed failures and the
//! transition functions for the draft builder, the party lifecycle and the
//! application workflow. The design separates:
//! - **Records**: what is stored (`Party`, `Application`, `PartyDraft`)
//! - **Effects**: what should happen afterwards (`Effect`)
//! - **Transitions**: `(record, request) -> Result<(record', Vec<Effect>), PartyError>`
//!
//! Storage, sessions and delivery live in `party-server`, which runs a
//! transition against the latest stored record and commits the result before
//! dispatching effects.

pub mod draft;
pub mod effect;
pub mod error;
pub mod model;
pub mod transition;
pub mod validation;

pub use draft::PartyDraft;
pub use effect::{Effect, LogLevel, Notice};
pub use error::{Entity, PartyError};
pub use model::*;
pub use transition::*;
