//! Best-effort conversion of monetary cell values into fixed-scale decimals.

use rust_decimal::{Decimal, RoundingStrategy};
use thiserror::Error;
use tracing::warn;

use crate::CellValue;

/// Fractional digits kept for every stored cost.
pub const COST_SCALE: u32 = 5;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NormalizeError {
    #[error("could not convert spreadsheet error {raw:?}")]
    ErrorCell { raw: String },
    #[error("no numeric content left in {raw:?}")]
    Empty { raw: String },
    #[error("could not convert {raw:?} (cleaned {cleaned:?}) to decimal: {reason}")]
    Malformed {
        raw: String,
        cleaned: String,
        reason: String,
    },
}

pub fn zero() -> Decimal {
    Decimal::new(0, COST_SCALE)
}

/// Keep only digits, decimal points and minus signs.
pub fn strip_non_numeric(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect()
}

/// Cut an all-digit fractional part to one digit past [`COST_SCALE`].
/// Half-up rounding only looks at that digit, and the parser would otherwise
/// round anything past 28 places on its own before [`quantize`] runs.
fn truncate_fraction(cleaned: &str) -> &str {
    let keep = COST_SCALE as usize + 1;
    match cleaned.split_once('.') {
        Some((int, frac)) if frac.len() > keep && frac.bytes().all(|b| b.is_ascii_digit()) => {
            &cleaned[..int.len() + 1 + keep]
        }
        _ => cleaned,
    }
}

/// Round half away from zero to [`COST_SCALE`] places and pin the scale.
pub fn quantize(value: Decimal) -> Decimal {
    let mut rounded = value.round_dp_with_strategy(COST_SCALE, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(COST_SCALE);
    rounded
}

/// Strict variant: blank cells are zero, anything unparseable is an error.
pub fn parse_decimal(cell: &CellValue) -> Result<Decimal, NormalizeError> {
    if let CellValue::Error(raw) = cell {
        return Err(NormalizeError::ErrorCell { raw: raw.clone() });
    }
    if cell.is_blank() {
        return Ok(zero());
    }

    let raw = cell.as_text();
    let raw = raw.trim();
    let cleaned = strip_non_numeric(raw);
    if cleaned.is_empty() {
        return Err(NormalizeError::Empty {
            raw: raw.to_string(),
        });
    }

    truncate_fraction(&cleaned)
        .parse::<Decimal>()
        .map(quantize)
        .map_err(|err| NormalizeError::Malformed {
            raw: raw.to_string(),
            cleaned: cleaned.clone(),
            reason: err.to_string(),
        })
}

/// Lossy variant used by the ingest pipeline: never fails, falls back to zero.
pub fn normalize_decimal(cell: &CellValue) -> Decimal {
    match parse_decimal(cell) {
        Ok(value) => value,
        Err(err) => {
            warn!(error = %err, "cost value normalized to zero");
            zero()
        }
    }
}
