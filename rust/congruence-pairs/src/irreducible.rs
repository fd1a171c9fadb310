//! Verification of groups with irreducible mod-p image.
//!
//! For irreducible representations isomorphic semisimplifications already
//! mean isomorphic representations, so every member is checked against the
//! first curve with the semisimplification test only. A member that fails
//! means the group should never have been formed; the run stops.

use crate::backend::AlgebraBackend;
use crate::config::PipelineConfig;
use crate::database::CurveDatabase;
use crate::error::{CongruenceError, Result};
use crate::hasher::CongruenceGroup;
use crate::kraus::{test_congruence, CongruenceTest, TestOptions, Verdict};
use crate::report::CongruentPair;

#[derive(Debug, Clone, Default)]
pub struct IrreducibleOutcome {
    /// (first, member) for every later member of every group.
    pub pairs: Vec<CongruentPair>,
    /// Tests that neither proved nor disproved the congruence.
    pub unresolved: Vec<CongruenceTest>,
}

pub fn classify_irreducible(
    groups: &[CongruenceGroup],
    db: &dyn CurveDatabase,
    backend: &dyn AlgebraBackend,
    config: &PipelineConfig,
) -> Result<IrreducibleOutcome> {
    let p = config.p;
    let options = TestOptions::for_irreducible(&config.kraus);
    let mut outcome = IrreducibleOutcome::default();
    let mut bad_pairs = Vec::new();

    for group in groups {
        let Some((first_label, rest)) = group.split_first() else {
            continue;
        };
        let first = db.curve(first_label)?;
        for member_label in rest {
            let member = db.curve(member_label)?;
            let test = test_congruence(p, first, member, backend, &options)?;
            match test.verdict {
                Verdict::Congruent(justification) => {
                    log::debug!("{}", test);
                    outcome.pairs.push(CongruentPair::new(
                        first_label.clone(),
                        member_label.clone(),
                        justification.tag(),
                    ));
                }
                Verdict::NotCongruent(_) => {
                    log::warn!("{}", test);
                    bad_pairs.push((first_label.clone(), member_label.clone()));
                }
                Verdict::Indeterminate => {
                    log::warn!("{}", test);
                    outcome.unresolved.push(test);
                }
            }
        }
    }

    log::info!("Found {} bad pairs", bad_pairs.len());
    if !bad_pairs.is_empty() {
        for (a, b) in &bad_pairs {
            log::error!("Bad pair in irreducible mod {} set: {} and {}", p, a, b);
        }
        return Err(CongruenceError::ConsistencyViolation {
            p,
            pairs: bad_pairs,
        });
    }
    Ok(outcome)
}
