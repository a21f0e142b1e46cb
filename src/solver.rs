// SPDX-License-Identifier: CC0-1.0
//
//! The MILP solver: wall-clock budget, engine dispatch and result
//! reconstruction.

use std::time::{Duration, Instant};

use bitcoin::amount::CheckedSum;
use bitcoin::Amount;
use log::debug;

use crate::model::CoinSelectionModel;
use crate::types::SelectionResult;
use crate::{branch_and_bound, exhaustive, InvalidInput, SelectionError};

// Both engines report the same two terminal outcomes.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum SearchFailure {
    Infeasible,
    Timeout,
}

/// Exact solver for an encoded [`CoinSelectionModel`].
///
/// The solver is a cheap, stateless value: nothing is cached between
/// calls and independent solves never interfere, so one solver may be
/// shared (or copied) freely across threads.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct MilpSolver {
    time_limit: Duration,
}

impl MilpSolver {
    /// Wall-clock budget used by [`MilpSolver::new`].
    pub const DEFAULT_TIME_LIMIT: Duration = Duration::from_secs(5);

    /// A solver with the default time limit.
    pub fn new() -> MilpSolver {
        MilpSolver { time_limit: MilpSolver::DEFAULT_TIME_LIMIT }
    }

    /// A solver that stops searching once `time_limit` has elapsed,
    /// returning the best selection found so far if there is one.
    pub fn with_time_limit(time_limit: Duration) -> MilpSolver {
        MilpSolver { time_limit }
    }

    /// The configured wall-clock budget.
    pub fn time_limit(&self) -> Duration {
        self.time_limit
    }

    /// Finds the feasible selection with the smallest fee, preferring
    /// the smaller transaction when several selections tie.
    ///
    /// The deadline is captured on entry and checked at every search
    /// step.  If it expires after a feasible selection was found, that
    /// selection is returned; expiry before the first feasible
    /// selection is [`SelectionError::Timeout`].  A completed search
    /// with no feasible subset is [`SelectionError::Infeasible`].
    pub fn solve(&self, model: &CoinSelectionModel) -> Result<SelectionResult, SelectionError> {
        let start = Instant::now();
        let deadline = start
            .checked_add(self.time_limit)
            .unwrap_or_else(|| start + Duration::from_secs(86_400));

        let candidates = model.utxos().len();
        let outcome = if candidates <= exhaustive::MAX_CANDIDATES {
            exhaustive::search(model.encoding(), deadline)
        } else {
            branch_and_bound::search(model.encoding(), deadline)
        };
        debug!(
            "solved {} candidates in {:?} ({})",
            candidates,
            start.elapsed(),
            if candidates <= exhaustive::MAX_CANDIDATES { "enumeration" } else { "branch and bound" },
        );

        let indices = outcome.map_err(|failure| match failure {
            SearchFailure::Infeasible => SelectionError::Infeasible,
            SearchFailure::Timeout => SelectionError::Timeout { limit: self.time_limit },
        })?;
        build_result(model, indices)
    }
}

impl Default for MilpSolver {
    fn default() -> MilpSolver {
        MilpSolver::new()
    }
}

// Reconstructs the result from the winning subset.  The model's fee
// evaluation is the source of truth here, not the search's internal
// figures; a selection that fails the conservation identity or the
// dust floor means a solver bug, which must not reach the caller as a
// plausible-looking result.
fn build_result(
    model: &CoinSelectionModel,
    mut indices: Vec<usize>,
) -> Result<SelectionResult, SelectionError> {
    indices.sort_unstable();
    let selected: Vec<_> = indices.iter().map(|&i| model.utxos()[i].clone()).collect();

    let (fee, tx_vbytes) = model.evaluate_fee_and_vbytes(selected.iter())?;
    let total_input = selected
        .iter()
        .map(|u| u.value)
        .checked_sum()
        .ok_or(InvalidInput::ArithmeticOverflow)?;

    let params = model.params();
    let total_in = total_input.to_sat() as u128;
    let spend = params.target.to_sat() as u128 + fee.to_sat() as u128;
    assert!(
        total_in >= spend + params.min_change.to_sat() as u128,
        "solver returned a selection below target plus fee plus minimum change",
    );
    let change = Amount::from_sat((total_in - spend) as u64);
    assert_eq!(
        total_in,
        params.target.to_sat() as u128 + fee.to_sat() as u128 + change.to_sat() as u128,
        "conservation identity violated",
    );
    assert!(
        tx_vbytes >= 1 && fee >= Amount::from_sat(1),
        "reconstructed selection has a zero size or fee",
    );

    Ok(SelectionResult::new(selected, change, fee, tx_vbytes, total_input))
}
