// SPDX-License-Identifier: CC0-1.0
//
//! # bitcoin-utxo-milp
//!
//! Solves Bitcoin coin selection as an exact mixed-integer program:
//! given a pool of candidate UTXOs, a spend target, a fee rate, a dust
//! threshold and a fixed transaction template, [`MilpSolver`] returns
//! the subset that funds the target plus fees with a valid change
//! output at provably minimal fee, or reports that no such subset
//! exists.
//!
//! Fees are charged on whole vbytes and whole satoshis, so the model
//! applies two sequential ceilings: the raw template-plus-input vbytes
//! round up to an integer size first, and the fee rounds up on that
//! integer size second.  All arithmetic is exact fixed point; see
//! [`Vbytes`] and [`FeeRate`].
//!
//! ```
//! use bitcoin::Amount;
//! use bitcoin_utxo_milp::{CoinSelectionModel, MilpSolver, SelectionParams, TxSizing, Utxo};
//!
//! let utxos = vec![Utxo::new("a".repeat(64), 0, Amount::from_sat(1_000), "68".parse()?)];
//! let params = SelectionParams {
//!     target: Amount::from_sat(300),
//!     fee_rate: "1".parse()?,
//!     min_change: Amount::from_sat(1),
//!     sizing: TxSizing {
//!         base_overhead_vbytes: "10".parse()?,
//!         recipient_output_vbytes: "31".parse()?,
//!         change_output_vbytes: "31".parse()?,
//!     },
//! };
//!
//! let model = CoinSelectionModel::new(utxos, params)?;
//! let result = MilpSolver::new().solve(&model)?;
//!
//! assert_eq!(result.tx_vbytes(), 140); // 10 + 31 + 31 + 68
//! assert_eq!(result.fee(), Amount::from_sat(140));
//! assert_eq!(result.change(), Amount::from_sat(560));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod branch_and_bound;
mod exhaustive;
mod model;
mod solver;
mod types;
mod units;

pub use crate::model::{CoinSelectionModel, MAX_COMPONENT_VBYTES, MAX_FEE_RATE};
pub use crate::solver::MilpSolver;
pub use crate::types::{SelectionParams, SelectionResult, TxSizing, Utxo};
pub use crate::units::{FeeRate, ParseUnitsError, Vbytes};

use std::time::Duration;

use thiserror::Error;

/// A coin-selection failure.
///
/// All three kinds are fatal to the current solve and surfaced
/// verbatim; nothing is retried internally.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectionError {
    /// A precondition on the candidate set or parameters was violated.
    #[error("invalid input: {0}")]
    InvalidInput(#[from] InvalidInput),
    /// The search completed and proved that no subset of the candidates
    /// funds the target plus fee while leaving the minimum change.
    #[error("no subset of the candidates funds the target plus fee and minimum change")]
    Infeasible,
    /// The wall-clock budget expired before any feasible selection was
    /// found.  Distinct from [`SelectionError::Infeasible`]: the search
    /// was incomplete.
    #[error("time limit of {limit:?} expired before a feasible selection was found")]
    Timeout {
        /// The budget that expired.
        limit: Duration,
    },
}

/// A violated precondition, reported through
/// [`SelectionError::InvalidInput`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidInput {
    /// The candidate set held no UTXOs.
    #[error("candidate set is empty")]
    EmptyCandidateSet,
    /// An empty subset was handed to fee evaluation.
    #[error("cannot evaluate an empty subset")]
    EmptySubset,
    /// The spend target was zero.
    #[error("target must be strictly positive")]
    ZeroTarget,
    /// The fee rate was zero.
    #[error("fee rate must be strictly positive")]
    ZeroFeeRate,
    /// The sizing template summed to zero vbytes.  Every transaction
    /// occupies at least one vbyte and pays at least one satoshi.
    #[error("transaction template vbytes must be strictly positive")]
    ZeroSizing,
    /// Two candidates shared an outpoint.
    #[error("duplicate candidate outpoint {txid}:{vout}")]
    DuplicateOutpoint {
        /// Transaction id of the repeated outpoint.
        txid: String,
        /// Output index of the repeated outpoint.
        vout: u32,
    },
    /// A value, target or minimum change exceeded the total bitcoin
    /// supply.
    #[error("an amount exceeds the total bitcoin supply")]
    AmountAboveMaxMoney,
    /// The candidate values summed past the total bitcoin supply.
    #[error("total candidate value exceeds the total bitcoin supply")]
    TotalAboveMaxMoney,
    /// A candidate's input vbytes exceeded [`MAX_COMPONENT_VBYTES`].
    #[error("input vbytes exceed the per-component cap")]
    InputVbytesAboveCap,
    /// A sizing component exceeded [`MAX_COMPONENT_VBYTES`].
    #[error("sizing vbytes exceed the per-component cap")]
    SizingVbytesAboveCap,
    /// The fee rate exceeded [`MAX_FEE_RATE`].
    #[error("fee rate exceeds the supported cap")]
    FeeRateAboveCap,
    /// Sizing the candidate set overflowed the fixed-point range.
    #[error("arithmetic overflow while sizing the selection")]
    ArithmeticOverflow,
}
