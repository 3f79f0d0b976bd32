// 💰 Rational Amount - exact money as numerator / denominator
//
// GnuCash stores every value as two integer columns (value_num, value_denom).
// Amounts never pass through f64: decimals are parsed with rust_decimal and
// scaled to the commodity's fraction, failing loudly if precision would be lost.

use crate::error::{LedgerError, LedgerResult};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use std::cmp::Ordering;
use std::fmt;

#[derive(Debug, Clone, Copy, Serialize)]
pub struct RationalAmount {
    numerator: i64,
    denominator: i64,
}

impl RationalAmount {
    pub fn new(numerator: i64, denominator: i64) -> LedgerResult<Self> {
        if denominator <= 0 {
            return Err(LedgerError::InvalidDenominator(denominator));
        }
        // i64::MIN has no negation; keeping it out makes negate() total
        if numerator == i64::MIN {
            return Err(LedgerError::AmountOverflow(format!(
                "{}/{}",
                numerator, denominator
            )));
        }
        Ok(RationalAmount {
            numerator,
            denominator,
        })
    }

    pub fn zero(denominator: i64) -> LedgerResult<Self> {
        Self::new(0, denominator)
    }

    /// Exact numerator for `value` in units of 1/`denominator`
    ///
    /// Example: 10.50 with denominator 100 → 1050/100
    pub fn from_decimal(value: Decimal, denominator: i64) -> LedgerResult<Self> {
        if denominator <= 0 {
            return Err(LedgerError::InvalidDenominator(denominator));
        }

        let scaled = value
            .checked_mul(Decimal::from(denominator))
            .ok_or_else(|| LedgerError::precision(value, denominator))?;

        if !scaled.fract().is_zero() {
            return Err(LedgerError::precision(value, denominator));
        }

        let numerator = scaled
            .trunc()
            .to_i64()
            .filter(|n| *n != i64::MIN)
            .ok_or_else(|| LedgerError::precision(value, denominator))?;

        Ok(RationalAmount {
            numerator,
            denominator,
        })
    }

    pub fn numerator(&self) -> i64 {
        self.numerator
    }

    pub fn denominator(&self) -> i64 {
        self.denominator
    }

    pub fn negate(&self) -> Self {
        RationalAmount {
            numerator: -self.numerator,
            denominator: self.denominator,
        }
    }

    /// Exact sum; both sides must already share a denominator
    pub fn add(&self, other: &RationalAmount) -> LedgerResult<Self> {
        if self.denominator != other.denominator {
            return Err(LedgerError::DenominatorMismatch {
                left: self.denominator,
                right: other.denominator,
            });
        }

        let numerator = self
            .numerator
            .checked_add(other.numerator)
            .filter(|n| *n != i64::MIN)
            .ok_or_else(|| LedgerError::AmountOverflow(format!("{} + {}", self, other)))?;

        Ok(RationalAmount {
            numerator,
            denominator: self.denominator,
        })
    }

    pub fn is_zero(&self) -> bool {
        self.numerator == 0
    }

    pub fn is_negative(&self) -> bool {
        self.numerator < 0
    }

    /// Re-express this amount over `denominator` without rounding
    pub fn convert_to(&self, denominator: i64) -> LedgerResult<Self> {
        if denominator <= 0 {
            return Err(LedgerError::InvalidDenominator(denominator));
        }
        if denominator == self.denominator {
            return Ok(*self);
        }

        let scaled = self.numerator as i128 * denominator as i128;
        if scaled % self.denominator as i128 != 0 {
            return Err(LedgerError::precision(self, denominator));
        }

        let numerator = i64::try_from(scaled / self.denominator as i128)
            .map_err(|_| LedgerError::AmountOverflow(format!("{} as /{}", self, denominator)))?;

        Self::new(numerator, denominator)
    }

    /// Sum of `amounts`, each normalized to `denominator` first
    pub fn sum<'a, I>(amounts: I, denominator: i64) -> LedgerResult<Self>
    where
        I: IntoIterator<Item = &'a RationalAmount>,
    {
        amounts
            .into_iter()
            .try_fold(Self::zero(denominator)?, |total, amount| {
                total.add(&amount.convert_to(denominator)?)
            })
    }

    fn cross(&self, other: &RationalAmount) -> (i128, i128) {
        (
            self.numerator as i128 * other.denominator as i128,
            other.numerator as i128 * self.denominator as i128,
        )
    }
}

impl PartialEq for RationalAmount {
    fn eq(&self, other: &Self) -> bool {
        let (left, right) = self.cross(other);
        left == right
    }
}

impl Eq for RationalAmount {}

impl PartialOrd for RationalAmount {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for RationalAmount {
    fn cmp(&self, other: &Self) -> Ordering {
        let (left, right) = self.cross(other);
        left.cmp(&right)
    }
}

impl fmt::Display for RationalAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.numerator, self.denominator)
    }
}
