// SPDX-License-Identifier: CC0-1.0
//
//! Dense subset enumeration.
//!
//! For small candidate sets every subset can be priced directly; the
//! enumeration visits masks in increasing numeric order, which fixes
//! the winner whenever several subsets tie on both fee and size.

use std::time::Instant;

use log::trace;

use crate::model::{fee_ceil_sat, MilpEncoding};
use crate::solver::SearchFailure;
use crate::units::Vbytes;

// Beyond this the mask walk loses to the relaxation-guided search.
pub(crate) const MAX_CANDIDATES: usize = 16;

// How many masks are priced between deadline checks.
const DEADLINE_STRIDE: u32 = 1024;

pub(crate) fn search(enc: &MilpEncoding, deadline: Instant) -> Result<Vec<usize>, SearchFailure> {
    let n = enc.value_sat.len();
    debug_assert!(n <= MAX_CANDIDATES);

    let mut best: Option<(u64, u64, u32)> = None; // (fee, tx_vbytes, mask)

    if Instant::now() >= deadline {
        return finish(best, SearchFailure::Timeout);
    }

    for mask in 1u32..(1u32 << n) {
        if mask % DEADLINE_STRIDE == 0 && Instant::now() >= deadline {
            return finish(best, SearchFailure::Timeout);
        }

        // Plain sums: the model checked the full pool for overflow.
        let mut total_sat: u64 = 0;
        let mut raw_vb_micro: u64 = enc.fixed_vb_micro;
        for i in 0..n {
            if mask & (1 << i) != 0 {
                total_sat += enc.value_sat[i];
                raw_vb_micro += enc.vb_micro[i];
            }
        }

        let tx_vbytes = Vbytes::from_micro_vb(raw_vb_micro).ceil_to_vb();
        let fee = fee_ceil_sat(enc.rate_micro, tx_vbytes);

        let needed = enc.target_sat as u128 + fee as u128 + enc.min_change_sat as u128;
        if (total_sat as u128) < needed {
            continue;
        }

        // A new subset wins only on strictly smaller fee, or equal fee
        // and strictly smaller size.
        let improves = match best {
            None => true,
            Some((best_fee, best_vb, _)) => {
                fee < best_fee || (fee == best_fee && tx_vbytes < best_vb)
            }
        };
        if improves {
            trace!("incumbent: mask {:#b}, fee {} sats, {} vB", mask, fee, tx_vbytes);
            best = Some((fee, tx_vbytes, mask));
        }
    }

    finish(best, SearchFailure::Infeasible)
}

fn finish(
    best: Option<(u64, u64, u32)>,
    failure: SearchFailure,
) -> Result<Vec<usize>, SearchFailure> {
    match best {
        Some((_, _, mask)) => Ok((0..u32::BITS as usize)
            .filter(|&i| mask & (1 << i) != 0)
            .collect()),
        None => Err(failure),
    }
}
