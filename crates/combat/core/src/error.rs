//! Error types for the decision engine.
//!
//! Policy violations (casting too early, caster busy) are not errors: they
//! surface as [`CastOutcome`](crate::ability::CastOutcome) variants. The
//! enums here cover genuine failures such as a broken dispatch seam or an
//! unknown key.

use thiserror::Error;

use crate::ability::AbilityKey;
use crate::caster::CasterId;

pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("unknown caster {0}")]
    UnknownCaster(CasterId),

    #[error("unknown ability {0}")]
    UnknownAbility(AbilityKey),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

/// Failure reported by the external action-dispatch seam.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("dispatch channel to client {client} is down")]
    ClientUnavailable { client: String },

    #[error("dispatch rejected: {reason}")]
    Rejected { reason: String },
}
