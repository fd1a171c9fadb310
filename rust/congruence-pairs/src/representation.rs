//! Split congruence groups by whether the mod-p representation is irreducible.
//!
//! The representation of E is reducible iff E has a rational p-isogeny, iff
//! F_p(t) - t*j(E) has a rational root. All members of a group share the
//! semisimplification, so the first curve decides for the group.

use congruence_core::{fricke_j_polynomial, Curve};
use serde::{Deserialize, Serialize};

use crate::backend::AlgebraBackend;
use crate::database::CurveDatabase;
use crate::error::{CongruenceError, Result};
use crate::hasher::CongruenceGroup;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RepresentationType {
    Irreducible,
    Reducible,
}

pub fn representation_type(
    p: u64,
    curve: &Curve,
    backend: &dyn AlgebraBackend,
) -> Result<RepresentationType> {
    let poly = fricke_j_polynomial(p, &curve.j_invariant())
        .ok_or(CongruenceError::UnsupportedPrime(p))?;
    let factors = backend.factor(&poly)?;
    let has_root = factors.iter().any(|(f, _)| f.degree() == Some(1));
    Ok(if has_root {
        RepresentationType::Reducible
    } else {
        RepresentationType::Irreducible
    })
}

/// Congruence groups separated by representation type, order preserved.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitGroups {
    pub irreducible: Vec<CongruenceGroup>,
    pub reducible: Vec<CongruenceGroup>,
}

pub fn split_by_representation(
    p: u64,
    groups: &[CongruenceGroup],
    db: &dyn CurveDatabase,
    backend: &dyn AlgebraBackend,
) -> Result<SplitGroups> {
    let mut split = SplitGroups::default();
    for group in groups {
        let Some(first) = group.first() else {
            continue;
        };
        match representation_type(p, db.curve(first)?, backend)? {
            RepresentationType::Irreducible => split.irreducible.push(group.clone()),
            RepresentationType::Reducible => split.reducible.push(group.clone()),
        }
    }
    log::info!(
        "{} irreducible sets, {} reducible sets",
        split.irreducible.len(),
        split.reducible.len()
    );
    Ok(split)
}
