//! Error kinds shared by every fallible operation in the engine, plus the
//! cooperative cancellation token threaded through reproduction and speciation.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use thiserror::Error;

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("malformed genome {id}: {reason}")]
    MalformedGenome { id: usize, reason: String },

    #[error("unsupported encoding: {0}")]
    UnsupportedEncoding(String),

    #[error("unknown activation: {0}")]
    UnknownActivation(String),

    #[error("species {0} expects offspring but has no organisms")]
    EmptySpeciesReproduce(usize),

    #[error("best species {0} went extinct without reproducing")]
    BestSpeciesLost(usize),

    #[error("reproduction yielded {got} babies, population size is {want}")]
    ProgenyCountMismatch { got: usize, want: usize },

    #[error("crossover between genomes carrying {0} and {1} traits")]
    TraitLengthMismatch(usize, usize),

    #[error("genome {0} has no genes to build a network from")]
    GenesisNoGenes(usize),

    #[error("genome {0} has no output nodes")]
    GenesisNoOutputs(usize),

    #[error("canceled by caller")]
    Canceled,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Serde(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn malformed(id: usize, reason: impl Into<String>) -> Self {
        Self::MalformedGenome {
            id,
            reason: reason.into(),
        }
    }
}

/// Shared flag for aborting long-running operations. Cloning hands out another
/// handle onto the same flag, so a driver can keep one and pass the other down
/// into an epoch.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_canceled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }

    /// Err(Canceled) once [cancel](CancelToken::cancel) has been called.
    pub fn check(&self) -> Result<()> {
        if self.is_canceled() {
            Err(Error::Canceled)
        } else {
            Ok(())
        }
    }
}
