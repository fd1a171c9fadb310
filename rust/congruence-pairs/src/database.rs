//! Read-only access to a database of elliptic curves grouped by isogeny class.

use std::collections::HashMap;
use std::ops::RangeInclusive;
use std::path::Path;

use congruence_core::curve::parse_ainvs;
use congruence_core::{Curve, CurveLabel, LocalData};
use serde::{Deserialize, Serialize};

use crate::error::{CongruenceError, Result};

/// An isogeny class: its curves (the optimal curve first) and the matrix of
/// minimal isogeny degrees between them.
#[derive(Debug, Clone)]
pub struct IsogenyClass {
    pub label: String,
    pub curves: Vec<Curve>,
    pub isogeny_matrix: Vec<Vec<u64>>,
}

impl IsogenyClass {
    /// Build a class, checking the isogeny matrix is square of the right size.
    pub fn new(
        label: impl Into<String>,
        curves: Vec<Curve>,
        isogeny_matrix: Vec<Vec<u64>>,
    ) -> Result<Self> {
        let label = label.into();
        let n = curves.len();
        if n == 0 {
            return Err(CongruenceError::Config(format!(
                "isogeny class {} has no curves",
                label
            )));
        }
        if isogeny_matrix.len() != n || isogeny_matrix.iter().any(|row| row.len() != n) {
            return Err(CongruenceError::Config(format!(
                "isogeny class {} has {} curves but a malformed isogeny matrix",
                label, n
            )));
        }
        Ok(IsogenyClass {
            label,
            curves,
            isogeny_matrix,
        })
    }

    pub fn optimal(&self) -> &Curve {
        &self.curves[0]
    }

    pub fn conductor(&self) -> u64 {
        self.optimal().conductor
    }

    pub fn labels(&self) -> impl Iterator<Item = &CurveLabel> {
        self.curves.iter().map(|c| &c.label)
    }

    fn position(&self, label: &CurveLabel) -> Option<usize> {
        self.curves.iter().position(|c| &c.label == label)
    }

    /// Degree of the minimal isogeny between two members.
    pub fn degree_between(&self, a: &CurveLabel, b: &CurveLabel) -> Option<u64> {
        let i = self.position(a)?;
        let j = self.position(b)?;
        Some(self.isogeny_matrix[i][j])
    }
}

/// The queries the pipeline makes of a curve database.
pub trait CurveDatabase: Send + Sync {
    /// Isogeny classes with conductor in `conductors`, in database order.
    fn isogeny_classes(&self, conductors: RangeInclusive<u64>) -> Vec<&IsogenyClass>;

    fn curve(&self, label: &CurveLabel) -> Result<&Curve>;

    /// The isogeny class containing `label`.
    fn isogeny_class(&self, label: &CurveLabel) -> Result<&IsogenyClass>;

    /// Minimal isogeny degree between two curves, `None` if not isogenous.
    fn isogeny_degree(&self, a: &CurveLabel, b: &CurveLabel) -> Result<Option<u64>> {
        let class = self.isogeny_class(a)?;
        // b must exist even when it lies in another class
        self.curve(b)?;
        Ok(class.degree_between(a, b))
    }
}

// ---------------------------------------------------------------------------
// In-memory database
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
struct DatabaseFile {
    classes: Vec<ClassRecord>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ClassRecord {
    label: String,
    curves: Vec<CurveRecord>,
    isogeny_matrix: Vec<Vec<u64>>,
}

#[derive(Debug, Serialize, Deserialize)]
struct CurveRecord {
    label: String,
    ainvs: String,
    local_data: Vec<LocalData>,
}

/// A database held in memory, sorted by conductor.
#[derive(Debug, Default)]
pub struct MemoryDatabase {
    classes: Vec<IsogenyClass>,
    /// label -> (class index, curve index)
    by_label: HashMap<CurveLabel, (usize, usize)>,
}

impl MemoryDatabase {
    pub fn from_classes(mut classes: Vec<IsogenyClass>) -> Result<Self> {
        classes.sort_by_key(|c| c.conductor());
        let mut by_label = HashMap::new();
        for (i, class) in classes.iter().enumerate() {
            for (j, curve) in class.curves.iter().enumerate() {
                if by_label.insert(curve.label.clone(), (i, j)).is_some() {
                    return Err(CongruenceError::Config(format!(
                        "duplicate curve label {}",
                        curve.label
                    )));
                }
            }
        }
        Ok(MemoryDatabase { classes, by_label })
    }

    /// Load a JSON database file.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self> {
        let data = std::fs::read_to_string(path.as_ref())?;
        let file: DatabaseFile = serde_json::from_str(&data)?;
        let classes = file
            .classes
            .into_iter()
            .map(|record| {
                let curves = record
                    .curves
                    .into_iter()
                    .map(|c| {
                        Curve::new(
                            CurveLabel::cremona(c.label),
                            parse_ainvs(&c.ainvs)?,
                            c.local_data,
                        )
                        .map_err(CongruenceError::from)
                    })
                    .collect::<Result<Vec<_>>>()?;
                IsogenyClass::new(record.label, curves, record.isogeny_matrix)
            })
            .collect::<Result<Vec<_>>>()?;
        let db = MemoryDatabase::from_classes(classes)?;
        log::info!(
            "Loaded {} isogeny classes ({} curves) from {}",
            db.classes.len(),
            db.by_label.len(),
            path.as_ref().display()
        );
        Ok(db)
    }

    pub fn len(&self) -> usize {
        self.by_label.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_label.is_empty()
    }

    fn locate(&self, label: &CurveLabel) -> Result<(usize, usize)> {
        self.by_label
            .get(label)
            .copied()
            .ok_or_else(|| CongruenceError::UnknownCurve(label.clone()))
    }
}

impl CurveDatabase for MemoryDatabase {
    fn isogeny_classes(&self, conductors: RangeInclusive<u64>) -> Vec<&IsogenyClass> {
        self.classes
            .iter()
            .filter(|c| conductors.contains(&c.conductor()))
            .collect()
    }

    fn curve(&self, label: &CurveLabel) -> Result<&Curve> {
        let (i, j) = self.locate(label)?;
        Ok(&self.classes[i].curves[j])
    }

    fn isogeny_class(&self, label: &CurveLabel) -> Result<&IsogenyClass> {
        let (i, _) = self.locate(label)?;
        Ok(&self.classes[i])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{fixture_database, label};
    use std::io::Write;

    const SAMPLE: &str = r#"{"classes": [
        {"label": "37a",
         "curves": [{"label": "37a1", "ainvs": "[0,0,1,-1,0]",
                     "local_data": [{"prime": 37, "exponent": 1, "reduction": "nonsplit"}]}],
         "isogeny_matrix": [[1]]},
        {"label": "11a",
         "curves": [{"label": "11a1", "ainvs": "[0,-1,1,-10,-20]",
                     "local_data": [{"prime": 11, "exponent": 1, "reduction": "split"}]},
                    {"label": "11a3", "ainvs": "[0,-1,1,0,0]",
                     "local_data": [{"prime": 11, "exponent": 1, "reduction": "split"}]}],
         "isogeny_matrix": [[1, 5], [5, 1]]}
    ]}"#;

    #[test]
    fn test_load_json_sorts_by_conductor() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let db = MemoryDatabase::load_json(file.path()).unwrap();
        assert_eq!(db.len(), 3);
        let classes = db.isogeny_classes(1..=100);
        assert_eq!(classes[0].label, "11a");
        assert_eq!(classes[1].label, "37a");
        assert_eq!(db.isogeny_classes(12..=36).len(), 0);
        assert_eq!(db.curve(&label("37a1")).unwrap().conductor, 37);
    }

    #[test]
    fn test_malformed_matrix_rejected() {
        let bad = SAMPLE.replace("[[1, 5], [5, 1]]", "[[1, 5]]");
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(bad.as_bytes()).unwrap();
        assert!(matches!(
            MemoryDatabase::load_json(file.path()),
            Err(CongruenceError::Config(_))
        ));
    }

    #[test]
    fn test_isogeny_queries() {
        let db = fixture_database();
        let class = db.isogeny_class(&label("11a2")).unwrap();
        assert_eq!(class.optimal().label, label("11a1"));
        assert_eq!(db.isogeny_degree(&label("11a2"), &label("11a3")).unwrap(), Some(25));
        assert_eq!(db.isogeny_degree(&label("11a1"), &label("37a1")).unwrap(), None);
        assert!(matches!(
            db.isogeny_degree(&label("11a1"), &label("99z9")),
            Err(CongruenceError::UnknownCurve(_))
        ));
    }
}
