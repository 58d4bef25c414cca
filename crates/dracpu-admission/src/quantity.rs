//! CPU quantity normalization
//!
//! Kubernetes quantities (`500m`, `2`, `1.5`, `1e3`, `1Ki`) are parsed into an
//! exact decimal so that whole-core checks never go through floating point.
//! CPU requests are then normalized to whole cores, rounding up.

use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use thiserror::Error;
use tracing::warn;

/// Errors produced while parsing a quantity string
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QuantityError {
    /// The quantity string was empty
    #[error("empty quantity")]
    Empty,

    /// The quantity string does not follow the Kubernetes quantity grammar
    #[error("invalid quantity '{0}'")]
    Invalid(String),

    /// The quantity cannot be represented exactly
    #[error("quantity '{0}' is out of range")]
    OutOfRange(String),
}

/// An exact decimal value: `coefficient * 10^-scale`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedQuantity {
    coefficient: i128,
    scale: u32,
}

impl ParsedQuantity {
    /// Parse a quantity string following the Kubernetes quantity grammar
    pub fn parse(input: &str) -> Result<Self, QuantityError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(QuantityError::Empty);
        }
        let invalid = || QuantityError::Invalid(input.to_string());
        let out_of_range = || QuantityError::OutOfRange(input.to_string());

        let (negative, unsigned) = match trimmed.as_bytes()[0] {
            b'-' => (true, &trimmed[1..]),
            b'+' => (false, &trimmed[1..]),
            _ => (false, trimmed),
        };

        let number_end = unsigned
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(unsigned.len());
        let (number, suffix) = unsigned.split_at(number_end);
        let (whole, fraction) = number.split_once('.').unwrap_or((number, ""));
        if (whole.is_empty() && fraction.is_empty()) || fraction.contains('.') {
            return Err(invalid());
        }
        let fraction = fraction.trim_end_matches('0');

        let mut coefficient: i128 = 0;
        for digit in whole.bytes().chain(fraction.bytes()) {
            coefficient = coefficient
                .checked_mul(10)
                .and_then(|c| c.checked_add(i128::from(digit - b'0')))
                .ok_or_else(out_of_range)?;
        }

        let mut scale = i64::try_from(fraction.len()).map_err(|_| out_of_range())?;
        let mut binary_power = 0u32;
        match suffix {
            "" => {}
            "n" => scale += 9,
            "u" => scale += 6,
            "m" => scale += 3,
            "k" => scale -= 3,
            "M" => scale -= 6,
            "G" => scale -= 9,
            "T" => scale -= 12,
            "P" => scale -= 15,
            "E" => scale -= 18,
            "Ki" => binary_power = 1,
            "Mi" => binary_power = 2,
            "Gi" => binary_power = 3,
            "Ti" => binary_power = 4,
            "Pi" => binary_power = 5,
            "Ei" => binary_power = 6,
            exponent if exponent.starts_with(['e', 'E']) => {
                let exponent: i64 = exponent[1..].parse().map_err(|_| invalid())?;
                scale = scale.checked_sub(exponent).ok_or_else(out_of_range)?;
            }
            _ => return Err(invalid()),
        }

        if binary_power > 0 {
            let multiplier = 1024i128.pow(binary_power);
            coefficient = coefficient
                .checked_mul(multiplier)
                .ok_or_else(out_of_range)?;
        }

        // Fold a negative scale into the coefficient so scale is never negative
        if scale < 0 {
            let shift = u32::try_from(-scale).map_err(|_| out_of_range())?;
            coefficient = pow10(shift)
                .and_then(|p| coefficient.checked_mul(p))
                .ok_or_else(out_of_range)?;
            scale = 0;
        }
        let scale = u32::try_from(scale).map_err(|_| out_of_range())?;

        Ok(Self {
            coefficient: if negative { -coefficient } else { coefficient },
            scale,
        })
    }

    /// Value in thousandths, rounded up when more precise than 1/1000
    pub fn milli_value(&self) -> i64 {
        saturate(self.ceil_scaled(3))
    }

    /// Integer value, rounded up when fractional
    pub fn ceil_value(&self) -> i64 {
        saturate(self.ceil_scaled(0))
    }

    /// The integer value if the quantity is exactly an integer that fits in i64
    pub fn exact_i64(&self) -> Option<i64> {
        if self.scale == 0 {
            return i64::try_from(self.coefficient).ok();
        }
        match pow10(self.scale) {
            Some(divisor) if self.coefficient % divisor == 0 => {
                i64::try_from(self.coefficient / divisor).ok()
            }
            Some(_) => None,
            // Divisor beyond i128 range: only zero is an integer
            None => (self.coefficient == 0).then_some(0),
        }
    }

    /// `value * 10^digits`, rounded toward positive infinity
    fn ceil_scaled(&self, digits: u32) -> i128 {
        if self.scale <= digits {
            return match pow10(digits - self.scale) {
                Some(p) => self.coefficient.saturating_mul(p),
                None => match self.coefficient.signum() {
                    1 => i128::MAX,
                    -1 => i128::MIN,
                    _ => 0,
                },
            };
        }
        match pow10(self.scale - digits) {
            // Integer division truncates toward zero, which is already the
            // ceiling for negative values
            Some(divisor) => {
                let quotient = self.coefficient / divisor;
                if self.coefficient % divisor > 0 {
                    quotient + 1
                } else {
                    quotient
                }
            }
            None => i128::from(self.coefficient > 0),
        }
    }
}

fn pow10(exp: u32) -> Option<i128> {
    10i128.checked_pow(exp)
}

fn saturate(value: i128) -> i64 {
    i64::try_from(value).unwrap_or(if value > 0 { i64::MAX } else { i64::MIN })
}

/// Whole-core count for a container CPU request.
///
/// Quantities <= 0 count as 0, whole cores are kept as-is and fractional
/// requests round up (400m -> 1, 500m -> 1, 1500m -> 2). A quantity that does
/// not parse counts as 0.
pub fn cpu_request_count(quantity: &Quantity) -> i64 {
    let millis = match ParsedQuantity::parse(&quantity.0) {
        Ok(parsed) => parsed.milli_value(),
        Err(e) => {
            warn!(quantity = %quantity.0, error = %e, "Ignoring unparsable CPU request");
            return 0;
        }
    };
    if millis <= 0 {
        return 0;
    }
    millis / 1000 + i64::from(millis % 1000 != 0)
}

/// The quantity as an exact integer, or `None` if it is fractional or does not parse
pub fn exact_integer(quantity: &Quantity) -> Option<i64> {
    ParsedQuantity::parse(&quantity.0)
        .ok()
        .and_then(|parsed| parsed.exact_i64())
}

/// The quantity rounded up to an integer, or `None` if it does not parse
pub fn ceil_value(quantity: &Quantity) -> Option<i64> {
    ParsedQuantity::parse(&quantity.0)
        .ok()
        .map(|parsed| parsed.ceil_value())
}
