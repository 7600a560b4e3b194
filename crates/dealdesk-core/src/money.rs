//! # Money Module
//!
//! Decimal money helpers and the `TaxRate` type.
//!
//! ## Why Decimal Money?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  THE FLOATING POINT PROBLEM                                             │
//! │                                                                         │
//! │  In binary floating point:                                              │
//! │    0.1 + 0.2 = 0.30000000000000004  ❌ WRONG!                           │
//! │                                                                         │
//! │  A $38,000 deal at a 6.225% combined rate computed in f64 can be        │
//! │  a penny off - and a penny off on a legal document is a defect.         │
//! │                                                                         │
//! │  OUR SOLUTION: rust_decimal::Decimal everywhere                         │
//! │    • Rates carry 4+ fraction digits exactly (0.0625, 0.010125)          │
//! │    • Intermediate sums keep full precision                              │
//! │    • Rounding happens ONCE per line item, at finalization               │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Rounding Policy
//! Line items round to 2 decimal places with round-half-up
//! (`MidpointAwayFromZero`). Intermediate sums are NEVER rounded; the
//! total is the exact sum of already-finalized lines, so the itemized
//! breakdown always reconciles.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::Add;

// =============================================================================
// Rounding
// =============================================================================

/// Decimal places a finalized line item carries.
pub const LINE_SCALE: u32 = 2;

/// Decimal places the effective-rate metadata carries (display only).
pub const RATE_SCALE: u32 = 6;

/// Rounds a monetary amount at line-item finalization.
///
/// ## Rules
/// - 2 decimal places
/// - Round half up (`MidpointAwayFromZero`)
/// - Called exactly once per line; never on intermediate sums
///
/// ## Example
/// ```rust
/// use dealdesk_core::money::round_line;
/// use rust_decimal::Decimal;
/// use std::str::FromStr;
///
/// let raw = Decimal::from_str("0.825").unwrap();
/// assert_eq!(round_line(raw), Decimal::from_str("0.83").unwrap());
/// ```
#[inline]
pub fn round_line(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(LINE_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

// =============================================================================
// Tax Rate
// =============================================================================

/// A tax rate as an exact decimal fraction.
///
/// ## Why a Fraction, Not Basis Points?
/// Combined vehicle rates routinely carry four or more fraction digits
/// (e.g. Travis County MTA at 1.0125% = `0.010125`). Basis points would
/// truncate them; `Decimal` carries them exactly.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct TaxRate(Decimal);

impl TaxRate {
    /// Creates a rate from a decimal fraction (`0.0625` = 6.25%).
    #[inline]
    pub const fn from_fraction(fraction: Decimal) -> Self {
        TaxRate(fraction)
    }

    /// Creates a rate from a percentage (`6.25` = 6.25%).
    #[inline]
    pub fn from_percent(percent: Decimal) -> Self {
        TaxRate(percent / Decimal::ONE_HUNDRED)
    }

    /// Returns the rate as a decimal fraction.
    #[inline]
    pub const fn fraction(&self) -> Decimal {
        self.0
    }

    /// Returns the rate as a percentage (for display only).
    #[inline]
    pub fn percent(&self) -> Decimal {
        self.0 * Decimal::ONE_HUNDRED
    }

    /// Zero rate.
    #[inline]
    pub const fn zero() -> Self {
        TaxRate(Decimal::ZERO)
    }

    /// Checks if the rate is zero.
    #[inline]
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Applies the rate to a base amount.
    ///
    /// Returns the UNROUNDED product. The caller decides when the line
    /// is final and calls [`round_line`] exactly once.
    #[inline]
    pub fn apply(&self, base: Decimal) -> Decimal {
        base * self.0
    }

    /// Returns the smaller of two rates (drive-out caps at the
    /// destination state's rate).
    #[inline]
    pub fn min(self, other: TaxRate) -> TaxRate {
        if self.0 <= other.0 {
            self
        } else {
            other
        }
    }
}

/// Rates combine additively: overlapping jurisdictions each contribute
/// their own rate to the combined rate.
impl Add for TaxRate {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        TaxRate(self.0 + other.0)
    }
}

impl Sum for TaxRate {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(TaxRate::zero(), Add::add)
    }
}

/// Display as a percentage for logs and breakdown lines.
impl fmt::Display for TaxRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.percent().normalize())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
