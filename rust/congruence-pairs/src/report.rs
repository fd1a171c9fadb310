//! Pair lists in Magma source format.
//!
//! ```text
//! pairs := [\
//! ["11a1", "11a2"],\
//! ["11a1", "11a3"]\
//! ];
//! ```

use std::path::Path;

use congruence_core::CurveLabel;
use serde::{Deserialize, Serialize};

use crate::error::{CongruenceError, Result};

/// Two curves asserted congruent mod p, with the reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CongruentPair {
    pub first: CurveLabel,
    pub second: CurveLabel,
    pub justification: String,
}

impl CongruentPair {
    pub fn new(first: CurveLabel, second: CurveLabel, justification: impl Into<String>) -> Self {
        CongruentPair {
            first,
            second,
            justification: justification.into(),
        }
    }
}

/// Format pairs in input order. An empty list gives `pairs := [\` `];`.
pub fn format_pairs(pairs: &[CongruentPair]) -> String {
    let mut out = String::from("pairs := [\\\n");
    for (i, pair) in pairs.iter().enumerate() {
        out.push_str(&format!("[\"{}\", \"{}\"]", pair.first, pair.second));
        if i + 1 < pairs.len() {
            out.push(',');
        }
        out.push_str("\\\n");
    }
    out.push_str("];\n");
    out
}

/// Write a pair list, creating parent directories.
pub fn emit_pairs(pairs: &[CongruentPair], path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(path, format_pairs(pairs))?;
    log::info!("Saved {} pairs to {}", pairs.len(), path.display());
    Ok(())
}

/// Read back a pair list written by [`format_pairs`].
pub fn parse_pairs(text: &str) -> Result<Vec<(CurveLabel, CurveLabel)>> {
    let malformed = |what: &str| CongruenceError::Report(what.to_string());

    let body = text
        .trim()
        .strip_prefix("pairs")
        .map(str::trim_start)
        .and_then(|s| s.strip_prefix(":="))
        .map(str::trim)
        .and_then(|s| s.strip_suffix(';'))
        .map(str::trim_end)
        .ok_or_else(|| malformed("expected `pairs := [...];`"))?;
    let inner = body
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .ok_or_else(|| malformed("unbalanced outer brackets"))?;

    let mut pairs: Vec<(CurveLabel, CurveLabel)> = Vec::new();
    let mut entry: Option<Vec<String>> = None;
    let mut expect_separator = false;
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        match c {
            '[' => {
                if entry.is_some() || expect_separator {
                    return Err(malformed("unexpected '['"));
                }
                entry = Some(Vec::new());
            }
            ']' => {
                let labels = entry.take().ok_or_else(|| malformed("unexpected ']'"))?;
                let [first, second]: [String; 2] = labels
                    .try_into()
                    .map_err(|_| malformed("each entry must hold two labels"))?;
                pairs.push((first.parse()?, second.parse()?));
                expect_separator = true;
            }
            '"' => {
                let labels = entry
                    .as_mut()
                    .ok_or_else(|| malformed("label outside an entry"))?;
                let label: String = chars.by_ref().take_while(|&c| c != '"').collect();
                labels.push(label);
            }
            ',' => {
                if entry.is_none() {
                    if !expect_separator {
                        return Err(malformed("dangling comma"));
                    }
                    expect_separator = false;
                }
            }
            '\\' => {}
            c if c.is_whitespace() => {}
            other => return Err(malformed(&format!("unexpected character '{}'", other))),
        }
    }
    if entry.is_some() {
        return Err(malformed("unterminated entry"));
    }
    if !pairs.is_empty() && !expect_separator {
        return Err(malformed("dangling comma"));
    }
    Ok(pairs)
}
