//! NEAT engine: evolves neural network topology and connection weights
//! together. Genomes carry traits, nodes and innovation-stamped connection
//! genes; organisms bind genomes to phenotypes; species group compatible
//! organisms; the population turns over one epoch at a time, sequentially or
//! with one reproduction worker per species.
//!
//! Fitness evaluation lives outside this crate: a driver scores each
//! organism's phenotype, writes the score into [Organism::fitness], and hands
//! the population to an [EpochExecutor].

pub mod activation;
pub mod config;
pub mod epoch;
pub mod error;
pub mod genome;
pub mod innovation;
pub mod macros;
pub mod network;
pub mod organism;
pub mod population;
pub mod random;
pub mod serialize;
pub mod species;

pub use activation::Activation;
pub use config::{EpochExecutorKind, GenCompatMethod, Options};
pub use epoch::EpochExecutor;
pub use error::{CancelToken, Error, Result};
pub use genome::{Gene, Genome, MimoControlGene, Node, NodeRole, Trait};
pub use innovation::{Innovation, InnovationStore};
pub use network::Network;
pub use organism::Organism;
pub use population::Population;
pub use species::Species;
