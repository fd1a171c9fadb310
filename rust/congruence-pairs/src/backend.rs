//! Computational algebra backend.
//!
//! The pipeline needs a handful of primitives that live in a computer algebra
//! system: factorisation over Q, quadratic twists, rational isogenies and
//! their kernel fields, p-torsion fields, image types, integral Frobenius
//! matrices and number field isomorphism. [`AlgebraBackend`] is the seam;
//! [`SubprocessBackend`] drives long-lived Sage and Magma sessions.
//!
//! Calls are synchronous and never retried. Any error aborts the run.

use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::sync::Mutex;

use congruence_core::curve::conductor_from_local_data;
use congruence_core::{BigInt, Curve, CurveLabel, LocalData, NumberField, Polynomial};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tempfile::TempDir;

use crate::error::BackendError;

/// A rational isogeny, identified by its degree and kernel polynomial.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Isogeny {
    pub degree: u64,
    pub kernel_polynomial: Polynomial,
}

/// Algebra primitives the classification stages rely on.
pub trait AlgebraBackend: Send + Sync {
    /// Irreducible factors over Q with multiplicities.
    fn factor(&self, poly: &Polynomial) -> Result<Vec<(Polynomial, u32)>, BackendError>;

    /// The quadratic twist of `curve` of minimal conductor, and the twisting
    /// discriminant (1 when the curve is already minimal).
    fn minimal_quadratic_twist(&self, curve: &Curve) -> Result<(Curve, i64), BackendError>;

    fn quadratic_twist(&self, curve: &Curve, d: i64) -> Result<Curve, BackendError>;

    /// Rational isogenies of prime degree p from `curve`.
    fn prime_isogenies(&self, curve: &Curve, p: u64) -> Result<Vec<Isogeny>, BackendError>;

    /// Field generated by the coordinates of a kernel generator.
    fn isogeny_kernel_field(
        &self,
        curve: &Curve,
        isogeny: &Isogeny,
    ) -> Result<NumberField, BackendError>;

    /// An isomorphic field with a smaller defining polynomial.
    fn optimized_field(&self, field: &NumberField) -> Result<NumberField, BackendError>;

    /// Image type label of the mod-p representation.
    fn image_type(&self, curve: &Curve, p: u64) -> Result<String, BackendError>;

    /// Degree over Q of the splitting field of the p-division polynomial.
    fn torsion_field_degree(&self, curve: &Curve, p: u64) -> Result<u64, BackendError>;

    /// Integral Frobenius matrices (row major) at each prime of good reduction.
    fn integral_frobenius(
        &self,
        curve: &Curve,
        primes: &[u64],
    ) -> Result<Vec<[i64; 4]>, BackendError>;

    fn fields_isomorphic(&self, a: &NumberField, b: &NumberField) -> Result<bool, BackendError>;
}

// ---------------------------------------------------------------------------
// Wire format shared with the Sage driver
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
struct WireCurve {
    ainvs: Vec<String>,
    #[serde(default)]
    label: Option<String>,
    #[serde(default)]
    local_data: Vec<LocalData>,
}

impl WireCurve {
    fn from_curve(curve: &Curve) -> Self {
        WireCurve {
            ainvs: curve.ainvs.iter().map(|a| a.to_string()).collect(),
            label: curve
                .label
                .has_primary_label()
                .then(|| curve.label.to_string()),
            local_data: curve.local_data.clone(),
        }
    }

    fn into_curve(self) -> Result<Curve, BackendError> {
        let values = self
            .ainvs
            .iter()
            .map(|a| a.parse::<BigInt>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| BackendError::Parse(format!("a-invariant: {}", e)))?;
        let ainvs: [BigInt; 5] = values
            .try_into()
            .map_err(|_| BackendError::Parse("expected five a-invariants".to_string()))?;
        let conductor = conductor_from_local_data(&self.local_data)
            .ok_or_else(|| BackendError::Parse("conductor does not fit in 64 bits".to_string()))?;
        let label = match self.label {
            Some(label) => CurveLabel::cremona(label),
            None => CurveLabel::Unlabelled {
                conductor,
                ainvs: ainvs.clone(),
            },
        };
        Curve::new(label, ainvs, self.local_data)
            .map_err(|e| BackendError::Parse(e.to_string()))
    }
}

#[derive(Debug, Deserialize)]
struct WireIsogeny {
    degree: u64,
    kernel_polynomial: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct WireTwist {
    curve: WireCurve,
    d: i64,
}

fn polynomial_from_wire(coeffs: &[String]) -> Result<Polynomial, BackendError> {
    Polynomial::from_coefficient_strings(coeffs)
        .ok_or_else(|| BackendError::Parse(format!("polynomial coefficients {:?}", coeffs)))
}

/// Decode one response line of the Sage driver: `{"ok": ...}` or `{"error": "..."}`.
pub(crate) fn parse_driver_response<T: DeserializeOwned>(line: &str) -> Result<T, BackendError> {
    let value: Value = serde_json::from_str(line.trim())
        .map_err(|e| BackendError::Parse(format!("driver response '{}': {}", line.trim(), e)))?;
    if let Some(message) = value.get("error") {
        return Err(BackendError::ExecutionFailed(
            message.as_str().unwrap_or("unknown error").to_string(),
        ));
    }
    let ok = value
        .get("ok")
        .cloned()
        .ok_or_else(|| BackendError::Parse(format!("driver response without result: {}", line)))?;
    serde_json::from_value(ok).map_err(|e| BackendError::Parse(e.to_string()))
}

/// Parse a Magma boolean printout.
pub(crate) fn parse_magma_bool(output: &str) -> Result<bool, BackendError> {
    match output.trim() {
        "true" => Ok(true),
        "false" => Ok(false),
        other => Err(BackendError::Parse(format!("expected boolean, got '{}'", other))),
    }
}

/// Parse a Magma printout of a sequence of sequences of integers, e.g.
/// `[ [ 1, 2, 3, 4 ], [ -1, 0, 0, 1 ] ]`.
pub(crate) fn parse_magma_matrices(output: &str) -> Result<Vec<[i64; 4]>, BackendError> {
    let flat: String = output.chars().filter(|c| !c.is_whitespace()).collect();
    let inner = flat
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .ok_or_else(|| BackendError::Parse(format!("expected a sequence, got '{}'", output)))?;
    if inner.is_empty() {
        return Ok(Vec::new());
    }
    let body = inner
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .ok_or_else(|| BackendError::Parse(format!("expected nested sequences, got '{}'", output)))?;
    body.split("],[")
        .map(|entry| {
            let values = entry
                .split(',')
                .map(|v| v.parse::<i64>())
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| BackendError::Parse(format!("matrix entry in '{}': {}", entry, e)))?;
            <[i64; 4]>::try_from(values)
                .map_err(|_| BackendError::Parse(format!("expected 4 entries in '{}'", entry)))
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Interpreter sessions
// ---------------------------------------------------------------------------

const SAGE_DRIVER: &str = include_str!("../scripts/sage_driver.py");

/// Printed after every Magma request so the reader knows where output ends.
const MAGMA_SENTINEL: &str = "__END_OF_REQUEST__";

struct Session {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

impl Session {
    fn spawn(program: &str, args: &[&str]) -> Result<Self, BackendError> {
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => BackendError::NotFound(program.to_string()),
                _ => BackendError::Io(e),
            })?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| BackendError::ExecutionFailed(format!("{}: no stdin", program)))?;
        let stdout = child
            .stdout
            .take()
            .map(BufReader::new)
            .ok_or_else(|| BackendError::ExecutionFailed(format!("{}: no stdout", program)))?;
        Ok(Session {
            child,
            stdin,
            stdout,
        })
    }

    fn send(&mut self, text: &str) -> Result<(), BackendError> {
        self.stdin.write_all(text.as_bytes())?;
        self.stdin.write_all(b"\n")?;
        self.stdin.flush()?;
        Ok(())
    }

    fn read_line(&mut self) -> Result<String, BackendError> {
        let mut line = String::new();
        if self.stdout.read_line(&mut line)? == 0 {
            return Err(BackendError::ExecutionFailed(
                "interpreter closed its output".to_string(),
            ));
        }
        Ok(line)
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// Locations of the external interpreters.
#[derive(Debug, Clone)]
pub struct SubprocessConfig {
    /// Sage executable; the driver runs under `sage -python`.
    pub sage: String,
    /// Magma executable; `None` disables Frobenius matrices and isomorphism tests.
    pub magma: Option<String>,
    /// Magma source defining `IntegralFrobenius`.
    pub frobenius_script: Option<PathBuf>,
}

impl Default for SubprocessConfig {
    fn default() -> Self {
        SubprocessConfig {
            sage: "sage".to_string(),
            magma: Some("magma".to_string()),
            frobenius_script: Some(PathBuf::from("IntFrobFunctions.m")),
        }
    }
}

/// Backend driving a Sage session (JSON lines) and a Magma session.
pub struct SubprocessBackend {
    sage: Mutex<Session>,
    magma: Option<Mutex<Session>>,
    /// Holds the driver script for the lifetime of the Sage session.
    _driver_dir: TempDir,
}

impl SubprocessBackend {
    pub fn start(config: &SubprocessConfig) -> Result<Self, BackendError> {
        let driver_dir = TempDir::new()?;
        let driver_path = driver_dir.path().join("sage_driver.py");
        std::fs::write(&driver_path, SAGE_DRIVER)?;

        let driver = driver_path.to_string_lossy().to_string();
        let sage = Session::spawn(&config.sage, &["-python", &driver])?;
        log::info!("Started Sage driver ({})", config.sage);

        let magma = match &config.magma {
            Some(program) => {
                let mut session = Session::spawn(program, &["-b"])?;
                if let Some(script) = &config.frobenius_script {
                    load_magma_script(&mut session, script)?;
                }
                log::info!("Started Magma session ({})", program);
                Some(Mutex::new(session))
            }
            None => {
                log::warn!("No Magma executable configured; Frobenius matrices and field isomorphism are unavailable");
                None
            }
        };

        Ok(SubprocessBackend {
            sage: Mutex::new(sage),
            magma,
            _driver_dir: driver_dir,
        })
    }

    fn sage_request<T: DeserializeOwned>(&self, request: Value) -> Result<T, BackendError> {
        let mut session = self
            .sage
            .lock()
            .map_err(|_| BackendError::ExecutionFailed("Sage session poisoned".to_string()))?;
        session.send(&request.to_string())?;
        let line = session.read_line()?;
        parse_driver_response(&line)
    }

    /// Evaluate Magma statements and return everything printed before the sentinel.
    fn magma_eval(&self, code: &str) -> Result<String, BackendError> {
        let magma = self
            .magma
            .as_ref()
            .ok_or_else(|| BackendError::NotFound("magma".to_string()))?;
        let mut session = magma
            .lock()
            .map_err(|_| BackendError::ExecutionFailed("Magma session poisoned".to_string()))?;
        magma_exchange(&mut session, code)
    }
}

fn magma_exchange(session: &mut Session, code: &str) -> Result<String, BackendError> {
    session.send(code)?;
    session.send(&format!("print \"{}\";", MAGMA_SENTINEL))?;
    let mut output = String::new();
    loop {
        let line = session.read_line()?;
        if line.trim() == MAGMA_SENTINEL {
            break;
        }
        output.push_str(&line);
    }
    if output.contains("Runtime error") || output.contains("User error") {
        return Err(BackendError::ExecutionFailed(output.trim().to_string()));
    }
    Ok(output)
}

fn load_magma_script(session: &mut Session, script: &Path) -> Result<(), BackendError> {
    if !script.exists() {
        return Err(BackendError::ScriptNotFound(script.to_path_buf()));
    }
    magma_exchange(session, &format!("load \"{}\";", script.display()))?;
    Ok(())
}

fn magma_curve(curve: &Curve) -> String {
    let ainvs: Vec<String> = curve.ainvs.iter().map(|a| a.to_string()).collect();
    format!("EllipticCurve([{}])", ainvs.join(", "))
}

impl AlgebraBackend for SubprocessBackend {
    fn factor(&self, poly: &Polynomial) -> Result<Vec<(Polynomial, u32)>, BackendError> {
        let factors: Vec<(Vec<String>, u32)> = self.sage_request(json!({
            "op": "factor",
            "poly": poly.coefficient_strings(),
        }))?;
        factors
            .iter()
            .map(|(coeffs, e)| Ok((polynomial_from_wire(coeffs)?, *e)))
            .collect()
    }

    fn minimal_quadratic_twist(&self, curve: &Curve) -> Result<(Curve, i64), BackendError> {
        let twist: WireTwist = self.sage_request(json!({
            "op": "minimal_quadratic_twist",
            "curve": WireCurve::from_curve(curve),
        }))?;
        Ok((twist.curve.into_curve()?, twist.d))
    }

    fn quadratic_twist(&self, curve: &Curve, d: i64) -> Result<Curve, BackendError> {
        let twisted: WireCurve = self.sage_request(json!({
            "op": "quadratic_twist",
            "curve": WireCurve::from_curve(curve),
            "d": d,
        }))?;
        twisted.into_curve()
    }

    fn prime_isogenies(&self, curve: &Curve, p: u64) -> Result<Vec<Isogeny>, BackendError> {
        let isogenies: Vec<WireIsogeny> = self.sage_request(json!({
            "op": "prime_isogenies",
            "curve": WireCurve::from_curve(curve),
            "p": p,
        }))?;
        isogenies
            .into_iter()
            .map(|phi| {
                Ok(Isogeny {
                    degree: phi.degree,
                    kernel_polynomial: polynomial_from_wire(&phi.kernel_polynomial)?,
                })
            })
            .collect()
    }

    fn isogeny_kernel_field(
        &self,
        curve: &Curve,
        isogeny: &Isogeny,
    ) -> Result<NumberField, BackendError> {
        let coeffs: Vec<String> = self.sage_request(json!({
            "op": "isogeny_kernel_field",
            "curve": WireCurve::from_curve(curve),
            "kernel_polynomial": isogeny.kernel_polynomial.coefficient_strings(),
        }))?;
        Ok(NumberField::new(polynomial_from_wire(&coeffs)?))
    }

    fn optimized_field(&self, field: &NumberField) -> Result<NumberField, BackendError> {
        let coeffs: Vec<String> = self.sage_request(json!({
            "op": "optimized_field",
            "poly": field.polynomial.coefficient_strings(),
        }))?;
        Ok(NumberField::new(polynomial_from_wire(&coeffs)?))
    }

    fn image_type(&self, curve: &Curve, p: u64) -> Result<String, BackendError> {
        self.sage_request(json!({
            "op": "image_type",
            "curve": WireCurve::from_curve(curve),
            "p": p,
        }))
    }

    fn torsion_field_degree(&self, curve: &Curve, p: u64) -> Result<u64, BackendError> {
        self.sage_request(json!({
            "op": "torsion_field_degree",
            "curve": WireCurve::from_curve(curve),
            "p": p,
        }))
    }

    fn integral_frobenius(
        &self,
        curve: &Curve,
        primes: &[u64],
    ) -> Result<Vec<[i64; 4]>, BackendError> {
        if primes.is_empty() {
            return Ok(Vec::new());
        }
        let list: Vec<String> = primes.iter().map(|q| q.to_string()).collect();
        let output = self.magma_eval(&format!(
            "E := {}; print [Eltseq(IntegralFrobenius(ChangeRing(E, GF(q)))) : q in [{}]];",
            magma_curve(curve),
            list.join(", ")
        ))?;
        let matrices = parse_magma_matrices(&output)?;
        if matrices.len() != primes.len() {
            return Err(BackendError::Parse(format!(
                "expected {} Frobenius matrices, got {}",
                primes.len(),
                matrices.len()
            )));
        }
        Ok(matrices)
    }

    fn fields_isomorphic(&self, a: &NumberField, b: &NumberField) -> Result<bool, BackendError> {
        let output = self.magma_eval(&format!(
            "P<x> := PolynomialRing(Rationals()); print IsIsomorphic(NumberField({}), NumberField({}));",
            a.polynomial, b.polynomial
        ))?;
        parse_magma_bool(&output)
    }
}
