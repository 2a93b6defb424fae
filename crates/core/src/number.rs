//! Exact numbers
//!
//! Every Knot number is an arbitrary-precision rational. The three
//! projections used by the boundary are derived from it:
//! - `to_i64`: only when the value is an integer that fits
//! - `to_f64`: always, correctly rounded
//! - `numerator` / `denominator`: always, exact, base 10
//!
//! Nothing here round-trips through `f64`.

use num_bigint::BigInt;
use num_rational::BigRational;
use num_traits::{Signed, ToPrimitive, Zero};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Number(BigRational);

/// A literal that is not a valid decimal number
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NumberLiteralError(pub String);

impl fmt::Display for NumberLiteralError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid number literal `{}`", self.0)
    }
}

impl std::error::Error for NumberLiteralError {}

impl Number {
    pub fn from_i64(n: i64) -> Self {
        Number(BigRational::from_integer(BigInt::from(n)))
    }

    pub fn zero() -> Self {
        Number(BigRational::zero())
    }

    /// Parse a decimal literal (`12`, `0.25`, `1e3`, `2.5E-3`) exactly
    pub fn parse_literal(text: &str) -> Result<Number, NumberLiteralError> {
        let invalid = || NumberLiteralError(text.to_string());

        let (mantissa, exponent) = match text.find(['e', 'E']) {
            Some(i) => (&text[..i], Some(&text[i + 1..])),
            None => (text, None),
        };
        let (int_part, frac_part) = match mantissa.split_once('.') {
            Some((i, f)) => (i, f),
            None => (mantissa, ""),
        };
        if int_part.is_empty() || !int_part.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        if !frac_part.bytes().all(|b| b.is_ascii_digit())
            || (mantissa.contains('.') && frac_part.is_empty())
        {
            return Err(invalid());
        }

        let digits = format!("{}{}", int_part, frac_part);
        let numer: BigInt = digits.parse().map_err(|_| invalid())?;
        let mut scale: i64 = -(frac_part.len() as i64);
        if let Some(exp) = exponent {
            let exp: i64 = exp.parse().map_err(|_| invalid())?;
            scale = scale.checked_add(exp).ok_or_else(invalid)?;
        }
        // Bound the power so a hostile literal can't allocate without limit.
        if scale.unsigned_abs() > 10_000 {
            return Err(invalid());
        }

        let ten = BigInt::from(10);
        let power = num_traits::pow(ten, scale.unsigned_abs() as usize);
        let value = if scale >= 0 {
            BigRational::from_integer(numer * power)
        } else {
            BigRational::new(numer, power)
        };
        Ok(Number(value))
    }

    pub fn is_integer(&self) -> bool {
        self.0.is_integer()
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Exact integer projection, when the value is an integer in range
    pub fn to_i64(&self) -> Option<i64> {
        if self.0.is_integer() {
            self.0.numer().to_i64()
        } else {
            None
        }
    }

    /// Correctly rounded float projection
    pub fn to_f64(&self) -> f64 {
        match self.0.to_f64() {
            Some(f) => f,
            None if self.0.is_negative() => f64::NEG_INFINITY,
            None => f64::INFINITY,
        }
    }

    /// Numerator in lowest terms, carrying the sign
    pub fn numerator(&self) -> String {
        self.0.numer().to_string()
    }

    /// Denominator in lowest terms, always positive
    pub fn denominator(&self) -> String {
        self.0.denom().to_string()
    }

    pub fn as_ratio(&self) -> &BigRational {
        &self.0
    }

    pub fn checked_div(&self, rhs: &Number) -> Option<Number> {
        if rhs.0.is_zero() {
            None
        } else {
            Some(Number(&self.0 / &rhs.0))
        }
    }

    /// Remainder with the sign of the dividend
    pub fn checked_rem(&self, rhs: &Number) -> Option<Number> {
        if rhs.0.is_zero() {
            None
        } else {
            Some(Number(&self.0 % &rhs.0))
        }
    }

    pub fn negated(&self) -> Number {
        Number(-&self.0)
    }

    /// Exact decimal expansion when the denominator is of the form 2^a * 5^b
    fn terminating_decimal(&self) -> Option<String> {
        let mut denom = self.0.denom().clone();
        let two = BigInt::from(2);
        let five = BigInt::from(5);
        let mut twos = 0usize;
        let mut fives = 0usize;
        while (&denom % &two).is_zero() {
            denom /= &two;
            twos += 1;
        }
        while (&denom % &five).is_zero() {
            denom /= &five;
            fives += 1;
        }
        if denom != BigInt::from(1) {
            return None;
        }

        let places = twos.max(fives);
        let scale = BigRational::from_integer(num_traits::pow(BigInt::from(10), places));
        let scaled = self.0.abs() * scale;
        let digits = scaled.to_integer().to_string();
        let digits = format!("{:0>width$}", digits, width = places + 1);
        let (int_part, frac_part) = digits.split_at(digits.len() - places);
        let sign = if self.0.is_negative() { "-" } else { "" };
        Some(format!("{}{}.{}", sign, int_part, frac_part))
    }
}

impl std::ops::Add for &Number {
    type Output = Number;

    fn add(self, rhs: Self) -> Number {
        Number(&self.0 + &rhs.0)
    }
}

impl std::ops::Sub for &Number {
    type Output = Number;

    fn sub(self, rhs: Self) -> Number {
        Number(&self.0 - &rhs.0)
    }
}

impl std::ops::Mul for &Number {
    type Output = Number;

    fn mul(self, rhs: Self) -> Number {
        Number(&self.0 * &rhs.0)
    }
}

impl From<i64> for Number {
    fn from(n: i64) -> Self {
        Number::from_i64(n)
    }
}

impl From<BigRational> for Number {
    fn from(r: BigRational) -> Self {
        Number(r)
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_integer() {
            return write!(f, "{}", self.0.numer());
        }
        match self.terminating_decimal() {
            Some(decimal) => f.write_str(&decimal),
            None => write!(f, "{}/{}", self.0.numer(), self.0.denom()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn third() -> Number {
        Number::from_i64(1)
            .checked_div(&Number::from_i64(3))
            .unwrap()
    }

    #[test]
    fn test_parse_integer() {
        let n = Number::parse_literal("42").unwrap();
        assert_eq!(n.to_i64(), Some(42));
        assert!(n.is_integer());
    }

    #[test]
    fn test_parse_decimal_is_exact() {
        let n = Number::parse_literal("0.1").unwrap();
        assert_eq!(n.numerator(), "1");
        assert_eq!(n.denominator(), "10");
        assert_eq!(n.to_i64(), None);
    }

    #[test]
    fn test_parse_exponent() {
        assert_eq!(Number::parse_literal("1e3").unwrap().to_i64(), Some(1000));
        let n = Number::parse_literal("2.5E-3").unwrap();
        assert_eq!(n.numerator(), "1");
        assert_eq!(n.denominator(), "400");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(Number::parse_literal("1.").is_err());
        assert!(Number::parse_literal(".5").is_err());
        assert!(Number::parse_literal("1e").is_err());
        assert!(Number::parse_literal("1e99999").is_err());
    }

    #[test]
    fn test_one_third_projections() {
        let n = third();
        assert_eq!(n.numerator(), "1");
        assert_eq!(n.denominator(), "3");
        assert_eq!(n.to_f64(), 1.0 / 3.0);
        assert_eq!(n.to_i64(), None);
        assert!(!n.is_integer());
    }

    #[test]
    fn test_negative_rational_sign_on_numerator() {
        let n = third().negated();
        assert_eq!(n.numerator(), "-1");
        assert_eq!(n.denominator(), "3");
    }

    #[test]
    fn test_i64_out_of_range() {
        let big = Number::parse_literal("9223372036854775808").unwrap();
        assert!(big.is_integer());
        assert_eq!(big.to_i64(), None);
        assert_eq!(big.to_f64(), 9223372036854775808.0);
        let max = Number::parse_literal("9223372036854775807").unwrap();
        assert_eq!(max.to_i64(), Some(i64::MAX));
    }

    #[test]
    fn test_rem_sign_follows_dividend() {
        let a = Number::from_i64(-7);
        let b = Number::from_i64(3);
        assert_eq!(a.checked_rem(&b).unwrap().to_i64(), Some(-1));
        assert!(a.checked_rem(&Number::zero()).is_none());
    }

    #[test]
    fn test_display() {
        assert_eq!(Number::from_i64(-3).to_string(), "-3");
        assert_eq!(Number::parse_literal("0.25").unwrap().to_string(), "0.25");
        assert_eq!(Number::parse_literal("-1.5").unwrap_err().0, "-1.5");
        let half = Number::from_i64(-3)
            .checked_div(&Number::from_i64(2))
            .unwrap();
        assert_eq!(half.to_string(), "-1.5");
        assert_eq!(third().to_string(), "1/3");
    }
}
