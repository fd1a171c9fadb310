//! End-to-end run: hash, split, classify both cases, write the pair lists.
//!
//! Each stage result is checkpointed under `mod{p}_<stage>` so a long run can
//! be resumed. The hash table is checked against the sample primes and
//! conductor range; every later stage is stamped with its input and reused
//! only when that input is unchanged. The irreducible list is written as soon
//! as that case is verified; a fatal error in the reducible case leaves it in
//! place.

use std::fmt;
use std::path::PathBuf;

use crate::backend::AlgebraBackend;
use crate::checkpoint::CheckpointStore;
use crate::config::PipelineConfig;
use crate::database::CurveDatabase;
use crate::error::Result;
use crate::hasher::{build_hash_table, sample_primes, CongruenceGroup, HashTable};
use crate::irreducible::{classify_irreducible, IrreducibleOutcome};
use crate::reducible::{
    filter_star_zero, partition_by_kernel_field, reducible_pairs, saturate, FieldCache,
    KernelPartition, StarFilter,
};
use crate::report::{emit_pairs, CongruentPair};
use crate::representation::{split_by_representation, SplitGroups};

/// Intermediate and final results of the reducible case.
#[derive(Debug, Clone, Default)]
pub struct ReducibleOutcome {
    pub saturated: Vec<CongruenceGroup>,
    pub star_filters: Vec<StarFilter>,
    pub partitions: Vec<KernelPartition>,
    pub pairs: Vec<CongruentPair>,
}

impl ReducibleOutcome {
    /// Curves whose star could not be decided.
    pub fn unresolved_star(&self) -> impl Iterator<Item = &congruence_core::CurveLabel> {
        self.star_filters.iter().flat_map(|f| f.unresolved.iter())
    }
}

#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub p: u64,
    pub candidate_groups: usize,
    pub split: SplitGroups,
    pub irreducible: IrreducibleOutcome,
    pub reducible: ReducibleOutcome,
    pub irreducible_path: PathBuf,
    pub reducible_path: PathBuf,
}

impl fmt::Display for PipelineOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "mod {} congruences", self.p)?;
        writeln!(f, "  candidate groups:      {}", self.candidate_groups)?;
        writeln!(
            f,
            "  irreducible / reducible groups: {} / {}",
            self.split.irreducible.len(),
            self.split.reducible.len()
        )?;
        writeln!(
            f,
            "  irreducible pairs:     {} ({})",
            self.irreducible.pairs.len(),
            self.irreducible_path.display()
        )?;
        if !self.irreducible.unresolved.is_empty() {
            writeln!(
                f,
                "  undecided irreducible tests: {}",
                self.irreducible.unresolved.len()
            )?;
        }
        let confirmed_zero: usize = self
            .reducible
            .star_filters
            .iter()
            .map(|s| s.confirmed_zero.len())
            .sum();
        writeln!(f, "  curves with star zero: {}", confirmed_zero)?;
        let unresolved = self.reducible.unresolved_star().count();
        if unresolved > 0 {
            writeln!(f, "  curves with undecided star: {}", unresolved)?;
        }
        write!(
            f,
            "  reducible pairs:       {} ({})",
            self.reducible.pairs.len(),
            self.reducible_path.display()
        )
    }
}

pub struct Pipeline<'a> {
    config: &'a PipelineConfig,
    db: &'a dyn CurveDatabase,
    backend: &'a dyn AlgebraBackend,
    checkpoints: CheckpointStore,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        config: &'a PipelineConfig,
        db: &'a dyn CurveDatabase,
        backend: &'a dyn AlgebraBackend,
    ) -> Self {
        Pipeline {
            config,
            db,
            backend,
            checkpoints: CheckpointStore::from_option(config.checkpoint_dir.as_deref()),
        }
    }

    fn key(&self, stage: &str) -> String {
        self.config.checkpoint_key(stage)
    }

    /// The fingerprint table, reusing a saved one built with the same
    /// sample primes and conductor range.
    pub fn hash_table(&self) -> Result<HashTable> {
        let config = self.config;
        let primes = sample_primes(config.hash.start_after, config.hash.prime_count);
        let range = config.min_conductor..=config.max_conductor;
        let key = self.key("hashtable");

        if let Some(table) = self.checkpoints.load::<HashTable>(&key) {
            if table.matches(config.p, &primes, &range) {
                return Ok(table);
            }
            log::warn!(
                "Saved {} was built with different sample primes or conductor range, recomputing",
                key
            );
        }
        let table = build_hash_table(config.p, self.db, range, &primes).without_singletons();
        self.checkpoints.save(&key, &table)?;
        Ok(table)
    }

    pub fn split(&self, groups: &[CongruenceGroup]) -> Result<SplitGroups> {
        let irred_key = self.key("isom_sets_irred");
        let red_key = self.key("isom_sets_red");
        let input = groups.to_vec();
        let saved = (
            self.checkpoints.load_for(&irred_key, &input),
            self.checkpoints.load_for(&red_key, &input),
        );
        if let (Some(irreducible), Some(reducible)) = saved {
            return Ok(SplitGroups {
                irreducible,
                reducible,
            });
        }
        let split = split_by_representation(self.config.p, groups, self.db, self.backend)?;
        self.checkpoints.save_for(&irred_key, &input, &split.irreducible)?;
        self.checkpoints.save_for(&red_key, &input, &split.reducible)?;
        Ok(split)
    }

    pub fn irreducible(&self, groups: &[CongruenceGroup]) -> Result<IrreducibleOutcome> {
        log::info!("Verifying {} irreducible groups", groups.len());
        classify_irreducible(groups, self.db, self.backend, self.config)
    }

    pub fn reducible(&self, groups: &[CongruenceGroup]) -> Result<ReducibleOutcome> {
        let p = self.config.p;
        let (db, backend) = (self.db, self.backend);

        let saturated: Vec<CongruenceGroup> = self.checkpoints.load_or_compute_for(
            &self.key("isom_sets_red_sat"),
            &groups.to_vec(),
            || saturate(groups, db),
        )?;
        log::info!("Saturated {} reducible groups", saturated.len());

        let star_zero = &self.config.star_zero;
        let star_input = (saturated.clone(), star_zero.clone());
        let star_filters: Vec<StarFilter> =
            self.checkpoints
                .load_or_compute_for(&self.key("star_filter"), &star_input, || {
                    filter_star_zero(&saturated, p, db, backend, star_zero)
                })?;
        for label in star_filters.iter().flat_map(|f| f.unresolved.iter()) {
            log::warn!("Star of {} undecided, excluded from the reducible pairs", label);
        }

        let optimize = self.config.optimize_kernel_fields;
        let survivors: Vec<CongruenceGroup> =
            star_filters.iter().map(|f| f.survivors.clone()).collect();
        let kernel_input = (survivors, optimize);
        let partitions: Vec<KernelPartition> =
            self.checkpoints
                .load_or_compute_for(&self.key("kernel_flds"), &kernel_input, || {
                    let mut cache = FieldCache::new();
                    kernel_input
                        .0
                        .iter()
                        .map(|group| {
                            partition_by_kernel_field(group, p, optimize, db, backend, &mut cache)
                        })
                        .collect::<Result<Vec<_>>>()
                })?;

        let pairs = reducible_pairs(
            &partitions,
            p,
            self.config.optimize_star_fields,
            db,
            backend,
        )?;

        Ok(ReducibleOutcome {
            saturated,
            star_filters,
            partitions,
            pairs,
        })
    }

    pub fn run(&self) -> Result<PipelineOutput> {
        self.config.validate()?;
        let table = self.hash_table()?;
        let groups = table.congruence_groups();
        log::info!("{} candidate groups", groups.len());

        let split = self.split(&groups)?;

        let irreducible = self.irreducible(&split.irreducible)?;
        let irreducible_path = self.config.irreducible_output();
        emit_pairs(&irreducible.pairs, &irreducible_path)?;

        let reducible = self.reducible(&split.reducible)?;
        let reducible_path = self.config.reducible_output();
        emit_pairs(&reducible.pairs, &reducible_path)?;

        Ok(PipelineOutput {
            p: self.config.p,
            candidate_groups: groups.len(),
            split,
            irreducible,
            reducible,
            irreducible_path,
            reducible_path,
        })
    }
}
