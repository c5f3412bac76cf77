use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::CoreError;

/// Largest fractional scale a parsed value may carry. 10^38 still fits in
/// an i128, so the alignment power table itself never overflows for
/// in-range scales.
pub const MAX_SCALE: u32 = 38;

/// Opaque exact-precision value. Deliberately neither `Clone` nor `Copy`:
/// every value originates from an [`ExactEngine`] call and is returned to
/// the engine through [`ExactEngine::cleanup`], so release-exactly-once is
/// enforced by ownership rather than by discipline.
#[derive(Debug)]
pub struct ExactValue {
    mantissa: i128,
    scale: u32,
}

impl ExactValue {
    fn normalized(mut mantissa: i128, mut scale: u32) -> Self {
        while scale > 0 && mantissa % 10 == 0 {
            mantissa /= 10;
            scale -= 1;
        }
        Self { mantissa, scale }
    }

    /// Renders the value as a plain decimal string, the caller-facing form
    /// used in event payloads and physics results.
    pub fn to_decimal_string(&self) -> String {
        if self.scale == 0 {
            return self.mantissa.to_string();
        }
        let negative = self.mantissa < 0;
        let digits = self.mantissa.unsigned_abs().to_string();
        let scale = self.scale as usize;
        let (int_part, frac_part) = if digits.len() > scale {
            let split = digits.len() - scale;
            (digits[..split].to_string(), digits[split..].to_string())
        } else {
            ("0".to_string(), format!("{:0>width$}", digits, width = scale))
        };
        let sign = if negative { "-" } else { "" };
        format!("{sign}{int_part}.{frac_part}")
    }
}

impl PartialEq for ExactValue {
    fn eq(&self, other: &Self) -> bool {
        // every engine path normalizes away trailing fraction zeros, so
        // representation equality is value equality
        self.mantissa == other.mantissa && self.scale == other.scale
    }
}

impl Eq for ExactValue {}

impl fmt::Display for ExactValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_decimal_string())
    }
}

fn pow10(exp: u32) -> Option<i128> {
    10i128.checked_pow(exp)
}

fn align(a: &ExactValue, b: &ExactValue) -> Option<(i128, i128, u32)> {
    let scale = a.scale.max(b.scale);
    let am = a.mantissa.checked_mul(pow10(scale - a.scale)?)?;
    let bm = b.mantissa.checked_mul(pow10(scale - b.scale)?)?;
    Some((am, bm, scale))
}

fn overflow() -> CoreError {
    CoreError::failed("exact result exceeds the representable range")
}

/// Adapter contract for the external exact-arithmetic library. All
/// arithmetic is exact; nothing here rounds. A result that leaves the
/// representable range is reported as `OperationFailed`, never wrapped or
/// truncated. Injected into the core so tests can audit allocation balance
/// through [`ExactEngine::live_values`].
pub trait ExactEngine: Send + Sync {
    /// Allocates a fresh zero value.
    fn init(&self) -> ExactValue;

    /// Parses a decimal string such as `"9.80665"` or `"-0.25"`. Inputs
    /// past the representable mantissa or scale are `InvalidParameter`.
    fn from_str(&self, text: &str) -> Result<ExactValue, CoreError>;

    fn copy(&self, src: &ExactValue) -> ExactValue;

    fn add(&self, a: &ExactValue, b: &ExactValue) -> Result<ExactValue, CoreError>;

    fn subtract(&self, a: &ExactValue, b: &ExactValue) -> Result<ExactValue, CoreError>;

    fn multiply(&self, a: &ExactValue, b: &ExactValue) -> Result<ExactValue, CoreError>;

    fn abs(&self, a: &ExactValue) -> Result<ExactValue, CoreError>;

    /// Consumes a value, returning its allocation to the engine.
    fn cleanup(&self, value: ExactValue);

    /// Number of values handed out and not yet cleaned up.
    fn live_values(&self) -> usize;
}

/// Default engine: scaled-decimal arithmetic on an i128 mantissa. Exact for
/// every in-range decimal input; anything wider is rejected at the parse or
/// arithmetic boundary rather than rounded.
#[derive(Debug, Default)]
pub struct DecimalExactEngine {
    live: AtomicUsize,
}

impl DecimalExactEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn track(&self, value: ExactValue) -> ExactValue {
        self.live.fetch_add(1, Ordering::Relaxed);
        value
    }
}

impl ExactEngine for DecimalExactEngine {
    fn init(&self) -> ExactValue {
        self.track(ExactValue {
            mantissa: 0,
            scale: 0,
        })
    }

    fn from_str(&self, text: &str) -> Result<ExactValue, CoreError> {
        let trimmed = text.trim();
        let (negative, digits) = match trimmed.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, trimmed.strip_prefix('+').unwrap_or(trimmed)),
        };
        if digits.is_empty() {
            return Err(CoreError::invalid(format!("empty exact number '{text}'")));
        }

        let (int_part, frac_part) = match digits.split_once('.') {
            Some((int_part, frac_part)) => (int_part, frac_part),
            None => (digits, ""),
        };
        if int_part.is_empty() && frac_part.is_empty() {
            return Err(CoreError::invalid(format!("malformed exact number '{text}'")));
        }
        if !int_part.chars().all(|c| c.is_ascii_digit())
            || !frac_part.chars().all(|c| c.is_ascii_digit())
        {
            return Err(CoreError::invalid(format!("malformed exact number '{text}'")));
        }

        let out_of_range = || {
            CoreError::invalid(format!(
                "exact number '{text}' exceeds representable precision"
            ))
        };
        let mut mantissa: i128 = 0;
        for c in int_part.chars().chain(frac_part.chars()) {
            mantissa = mantissa
                .checked_mul(10)
                .and_then(|m| m.checked_add(i128::from(c as u8 - b'0')))
                .ok_or_else(out_of_range)?;
        }
        if negative {
            mantissa = -mantissa;
        }

        let value = ExactValue::normalized(mantissa, frac_part.len() as u32);
        if value.scale > MAX_SCALE {
            return Err(out_of_range());
        }
        Ok(self.track(value))
    }

    fn copy(&self, src: &ExactValue) -> ExactValue {
        self.track(ExactValue {
            mantissa: src.mantissa,
            scale: src.scale,
        })
    }

    fn add(&self, a: &ExactValue, b: &ExactValue) -> Result<ExactValue, CoreError> {
        let (am, bm, scale) = align(a, b).ok_or_else(overflow)?;
        let sum = am.checked_add(bm).ok_or_else(overflow)?;
        Ok(self.track(ExactValue::normalized(sum, scale)))
    }

    fn subtract(&self, a: &ExactValue, b: &ExactValue) -> Result<ExactValue, CoreError> {
        let (am, bm, scale) = align(a, b).ok_or_else(overflow)?;
        let difference = am.checked_sub(bm).ok_or_else(overflow)?;
        Ok(self.track(ExactValue::normalized(difference, scale)))
    }

    fn multiply(&self, a: &ExactValue, b: &ExactValue) -> Result<ExactValue, CoreError> {
        let mantissa = a.mantissa.checked_mul(b.mantissa).ok_or_else(overflow)?;
        let scale = a.scale.checked_add(b.scale).ok_or_else(overflow)?;
        Ok(self.track(ExactValue::normalized(mantissa, scale)))
    }

    fn abs(&self, a: &ExactValue) -> Result<ExactValue, CoreError> {
        let mantissa = a.mantissa.checked_abs().ok_or_else(overflow)?;
        Ok(self.track(ExactValue {
            mantissa,
            scale: a.scale,
        }))
    }

    fn cleanup(&self, value: ExactValue) {
        drop(value);
        self.live.fetch_sub(1, Ordering::Relaxed);
    }

    fn live_values(&self) -> usize {
        self.live.load(Ordering::Relaxed)
    }
}
