//! Exact parsing of Kubernetes resource quantities.
//!
//! Values are held as a signed count of nano-units so that `"1000m"`, `"1"`
//! and `"1e0"` compare equal and ordering is numeric rather than textual.

use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

const NANOS_PER_UNIT: i128 = 1_000_000_000;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QuantityError {
    #[error("empty quantity")]
    Empty,
    #[error("invalid quantity '{0}'")]
    Invalid(String),
    #[error("quantity '{0}' is out of range")]
    OutOfRange(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ParsedQuantity {
    nanos: i128,
}

impl ParsedQuantity {
    pub fn nanos(&self) -> i128 {
        self.nanos
    }

    pub fn is_zero(&self) -> bool {
        self.nanos == 0
    }
}

impl PartialOrd for ParsedQuantity {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ParsedQuantity {
    fn cmp(&self, other: &Self) -> Ordering {
        self.nanos.cmp(&other.nanos)
    }
}

impl fmt::Display for ParsedQuantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}n", self.nanos)
    }
}

/// Multiplier expressed as a fraction so sub-unit suffixes stay exact.
struct Scale {
    num: i128,
    den: i128,
}

fn pow(base: i128, exp: u32, raw: &str) -> Result<i128, QuantityError> {
    base.checked_pow(exp)
        .ok_or_else(|| QuantityError::OutOfRange(raw.to_string()))
}

fn suffix_scale(suffix: &str, raw: &str) -> Result<Scale, QuantityError> {
    let decimal = |exp: i32| -> Result<Scale, QuantityError> {
        if exp >= 0 {
            Ok(Scale { num: pow(10, exp as u32, raw)?, den: 1 })
        } else {
            Ok(Scale { num: 1, den: pow(10, exp.unsigned_abs(), raw)? })
        }
    };
    let binary = |exp: u32| -> Result<Scale, QuantityError> {
        Ok(Scale { num: pow(2, exp, raw)?, den: 1 })
    };
    match suffix {
        "" => decimal(0),
        "n" => decimal(-9),
        "u" => decimal(-6),
        "m" => decimal(-3),
        "k" => decimal(3),
        "M" => decimal(6),
        "G" => decimal(9),
        "T" => decimal(12),
        "P" => decimal(15),
        "E" => decimal(18),
        "Ki" => binary(10),
        "Mi" => binary(20),
        "Gi" => binary(30),
        "Ti" => binary(40),
        "Pi" => binary(50),
        "Ei" => binary(60),
        s if s.starts_with(['e', 'E']) => {
            let exp: i32 = s[1..]
                .parse()
                .map_err(|_| QuantityError::Invalid(raw.to_string()))?;
            decimal(exp)
        }
        _ => Err(QuantityError::Invalid(raw.to_string())),
    }
}

impl FromStr for ParsedQuantity {
    type Err = QuantityError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let s = raw.trim();
        if s.is_empty() {
            return Err(QuantityError::Empty);
        }
        let invalid = || QuantityError::Invalid(raw.to_string());
        let overflow = || QuantityError::OutOfRange(raw.to_string());

        let (negative, unsigned) = match s.as_bytes()[0] {
            b'-' => (true, &s[1..]),
            b'+' => (false, &s[1..]),
            _ => (false, s),
        };
        let number_len = unsigned
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(unsigned.len());
        let (number, suffix) = unsigned.split_at(number_len);

        let (whole, frac) = match number.split_once('.') {
            Some((w, f)) => (w, f),
            None => (number, ""),
        };
        if whole.is_empty() && frac.is_empty() {
            return Err(invalid());
        }
        if frac.contains('.') {
            return Err(invalid());
        }

        let mut mantissa: i128 = 0;
        for c in whole.chars().chain(frac.chars()) {
            let digit = c.to_digit(10).ok_or_else(invalid)? as i128;
            mantissa = mantissa
                .checked_mul(10)
                .and_then(|m| m.checked_add(digit))
                .ok_or_else(overflow)?;
        }

        let scale = suffix_scale(suffix, raw)?;
        let numerator = mantissa
            .checked_mul(NANOS_PER_UNIT)
            .and_then(|m| m.checked_mul(scale.num))
            .ok_or_else(overflow)?;
        let denominator = pow(10, frac.len() as u32, raw)?
            .checked_mul(scale.den)
            .ok_or_else(overflow)?;

        // sub-nano remainders round away from zero
        let mut nanos = numerator / denominator;
        if numerator % denominator != 0 {
            nanos += 1;
        }
        if negative {
            nanos = -nanos;
        }
        Ok(Self { nanos })
    }
}

impl TryFrom<&Quantity> for ParsedQuantity {
    type Error = QuantityError;

    fn try_from(q: &Quantity) -> Result<Self, Self::Error> {
        q.0.parse()
    }
}

/// True when the quantity is absent, empty or numerically zero. Unparseable
/// values are not unset: they are left for validation to report.
pub fn is_unset(q: Option<&Quantity>) -> bool {
    match q {
        None => true,
        Some(q) if q.0.trim().is_empty() => true,
        Some(q) => matches!(ParsedQuantity::try_from(q), Ok(p) if p.is_zero()),
    }
}

pub fn parse(q: &Quantity) -> Result<ParsedQuantity, QuantityError> {
    ParsedQuantity::try_from(q)
}
