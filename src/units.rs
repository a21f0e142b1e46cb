// SPDX-License-Identifier: CC0-1.0
//
//! Exact fixed-point units for transaction sizing and fee rates.
//!
//! Virtual sizes and fee rates arrive as decimal strings ("68", "1.5",
//! "2.25").  Both are stored as integer counts of a millionth of their
//! unit, so the vbyte ceiling and the fee ceiling can be applied exactly,
//! without ever touching binary floating point.

use std::fmt;
use std::str::FromStr;

use bitcoin::Amount;
use thiserror::Error;

/// Micro-units per whole unit.
const MICRO: u64 = 1_000_000;

/// Fractional decimal digits a unit string may carry.
const MICRO_DIGITS: usize = 6;

/// An error while parsing a decimal unit string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseUnitsError {
    /// The string held no digits.
    #[error("empty decimal string")]
    Empty,
    /// A character other than an ASCII digit or a single point was found.
    #[error("invalid character in decimal string")]
    InvalidCharacter,
    /// More than six significant fractional digits were supplied.
    #[error("decimal carries more than {MICRO_DIGITS} fractional digits")]
    ExcessPrecision,
    /// The value does not fit the fixed-point range.
    #[error("decimal exceeds the fixed-point range")]
    Overflow,
}

/// Virtual transaction size, stored as micro-vbytes (10⁻⁶ vB).
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Vbytes(u64);

impl Vbytes {
    /// Zero virtual bytes.
    pub const ZERO: Vbytes = Vbytes(0);

    /// Constructs from a whole number of vbytes.
    pub fn from_vb(vb: u64) -> Option<Vbytes> {
        vb.checked_mul(MICRO).map(Vbytes)
    }

    /// Constructs from an exact count of micro-vbytes.
    pub const fn from_micro_vb(micro_vb: u64) -> Vbytes {
        Vbytes(micro_vb)
    }

    /// The exact count of micro-vbytes.
    pub const fn to_micro_vb(self) -> u64 {
        self.0
    }

    /// Rounds up to the next whole vbyte.
    pub const fn ceil_to_vb(self) -> u64 {
        self.0 / MICRO + (self.0 % MICRO != 0) as u64
    }

    /// Checked addition.
    pub fn checked_add(self, rhs: Vbytes) -> Option<Vbytes> {
        self.0.checked_add(rhs.0).map(Vbytes)
    }

    /// Sums an iterator, returning `None` on overflow.
    pub fn checked_sum<I: IntoIterator<Item = Vbytes>>(iter: I) -> Option<Vbytes> {
        iter.into_iter().try_fold(Vbytes::ZERO, Vbytes::checked_add)
    }
}

impl FromStr for Vbytes {
    type Err = ParseUnitsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_micro(s).map(Vbytes)
    }
}

impl fmt::Display for Vbytes {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt_micro(self.0, f)
    }
}

/// A fee rate, stored as micro-satoshis per vbyte.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct FeeRate(u64);

impl FeeRate {
    /// Zero sats per vbyte.
    pub const ZERO: FeeRate = FeeRate(0);

    /// Constructs from a whole number of satoshis per vbyte.
    pub fn from_sat_per_vb(sat_per_vb: u64) -> Option<FeeRate> {
        sat_per_vb.checked_mul(MICRO).map(FeeRate)
    }

    /// Constructs from an exact count of micro-satoshis per vbyte.
    pub const fn from_micro_sat_per_vb(micro: u64) -> FeeRate {
        FeeRate(micro)
    }

    /// The exact count of micro-satoshis per vbyte.
    pub const fn to_micro_sat_per_vb(self) -> u64 {
        self.0
    }

    /// The fee owed for a transaction of `tx_vbytes` whole vbytes,
    /// rounded up to the next satoshi.
    ///
    /// Returns `None` if the product does not fit an [`Amount`].
    pub fn fee_for_vbytes(self, tx_vbytes: u64) -> Option<Amount> {
        let micro_sats = self.0 as u128 * tx_vbytes as u128;
        let sats = micro_sats / MICRO as u128 + (micro_sats % MICRO as u128 != 0) as u128;
        if sats > u64::MAX as u128 {
            return None;
        }
        Some(Amount::from_sat(sats as u64))
    }
}

impl FromStr for FeeRate {
    type Err = ParseUnitsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_micro(s).map(FeeRate)
    }
}

impl fmt::Display for FeeRate {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt_micro(self.0, f)
    }
}

// Parses a non-negative decimal string into micro-units.  The parse is
// exact: digits past the sixth fractional place are rejected unless zero.
fn parse_micro(s: &str) -> Result<u64, ParseUnitsError> {
    let (int_part, frac_part) = match s.split_once('.') {
        Some((int_part, frac_part)) => (int_part, Some(frac_part)),
        None => (s, None),
    };

    if int_part.is_empty() && frac_part.map_or(true, str::is_empty) {
        return Err(ParseUnitsError::Empty);
    }
    if !int_part.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ParseUnitsError::InvalidCharacter);
    }

    let int_micro = if int_part.is_empty() {
        0
    } else {
        int_part
            .parse::<u64>()
            .map_err(|_| ParseUnitsError::Overflow)?
            .checked_mul(MICRO)
            .ok_or(ParseUnitsError::Overflow)?
    };

    let frac_micro = match frac_part {
        None => 0,
        Some("") => return Err(ParseUnitsError::InvalidCharacter),
        Some(frac) => {
            if !frac.bytes().all(|b| b.is_ascii_digit()) {
                return Err(ParseUnitsError::InvalidCharacter);
            }
            let (kept, dropped) = frac.split_at(frac.len().min(MICRO_DIGITS));
            if dropped.bytes().any(|b| b != b'0') {
                return Err(ParseUnitsError::ExcessPrecision);
            }
            let mut micro = 0u64;
            for b in kept.bytes() {
                micro = micro * 10 + (b - b'0') as u64;
            }
            micro * 10u64.pow((MICRO_DIGITS - kept.len()) as u32)
        }
    };

    int_micro
        .checked_add(frac_micro)
        .ok_or(ParseUnitsError::Overflow)
}

fn fmt_micro(micro: u64, f: &mut fmt::Formatter) -> fmt::Result {
    let int = micro / MICRO;
    let frac = micro % MICRO;
    if frac == 0 {
        write!(f, "{}", int)
    } else {
        let frac = format!("{:06}", frac);
        write!(f, "{}.{}", int, frac.trim_end_matches('0'))
    }
}
