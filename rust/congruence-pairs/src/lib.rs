//! Search for pairs of elliptic curves over Q whose mod-p Galois
//! representations are isomorphic.
//!
//! Candidates are grouped by a Frobenius trace fingerprint, split by whether
//! the representation is irreducible, and then proven (or disproven) with the
//! Kraus-Oesterlé bound. Reducible groups are refined further through the
//! fields cut out by the p-isogeny kernel and its "star" counterpart.

pub mod backend;
pub mod checkpoint;
pub mod config;
pub mod database;
pub mod error;
pub mod hasher;
pub mod irreducible;
pub mod kraus;
pub mod pipeline;
pub mod reducible;
pub mod report;
pub mod representation;

#[cfg(test)]
mod testing;

pub use backend::{AlgebraBackend, Isogeny, SubprocessBackend, SubprocessConfig};
pub use checkpoint::CheckpointStore;
pub use config::PipelineConfig;
pub use database::{CurveDatabase, IsogenyClass, MemoryDatabase};
pub use error::{BackendError, CongruenceError, Result};
pub use hasher::{build_hash_table, frobenius_hash, CongruenceGroup, HashTable};
pub use kraus::{test_congruence, CongruenceTest, Justification, Obstruction, Verdict};
pub use pipeline::{Pipeline, PipelineOutput, ReducibleOutcome};
pub use report::{emit_pairs, format_pairs, parse_pairs, CongruentPair};
pub use representation::{representation_type, RepresentationType, SplitGroups};
