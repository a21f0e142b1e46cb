// SPDX-License-Identifier: CC0-1.0
//
//! Relaxation-guided branch and bound.
//!
//! This module introduces the exact search used for candidate sets too
//! large to enumerate.

use std::cmp::Ordering;
use std::time::Instant;

use log::{debug, trace};

use crate::model::{fee_ceil_sat, MilpEncoding, SCALE_S2};
use crate::solver::SearchFailure;
use crate::units::Vbytes;

// The search walks a binary tree over the candidate binaries x_i.  Each
// node fixes a prefix of decisions (In / Out) and relaxes the rest to
// x_i in [0, 1].  The relaxed program
//
//     minimise  fee_rate * (fixed_vb + sum x_i * vb_i)
//     such that sum x_i * (value_i - fee_rate * vb_i)
//                   >= target + min_change + fee_rate * fixed_vb
//
// is a fractional covering knapsack: filling candidates in order of
// funding contributed per unit of fee cost is optimal and leaves at
// most one fractional x_i.  That candidate is the branch variable; the
// inclusion branch is explored first.
//
// Bounding uses the relaxation's vbyte total pushed through the two
// integer ceilings.  Any integer-feasible completion of the node sizes
// at least as large as the relaxed optimum, so
//
//     fee >= ceil(fee_rate * ceil(relaxed_vb))
//
// holds throughout the subtree.  A node is cut when its bound cannot
// beat the incumbent fee, or, at equal fee, cannot shrink the incumbent
// size (the size is the only secondary objective).
//
// When the relaxed optimum lands integral its subset is priced through
// the exact ceilings.  The exact fee can sit above the bound, and a
// cheaper completion may even spend a coin whose effective value is
// negative (a whole-vbyte ceiling can absorb the extra size), so the
// node keeps branching on the remaining free candidates until the
// bound closes the gap.

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Assign {
    Free,
    In,
    Out,
}

// One decision on the depth-first path.  `included` tells which side of
// the branch is currently being explored.
struct Frame {
    var: usize,
    included: bool,
}

struct Best {
    indices: Vec<usize>,
    fee: u64,
    tx_vbytes: u64,
}

enum Lp {
    Infeasible,
    Solved {
        fee_lb: u64,
        vb_lb: u64,
        /// The one fractional candidate, if any.
        frac: Option<usize>,
        /// Free candidates the greedy fill takes whole.
        taken: Vec<usize>,
    },
}

pub(crate) fn search(enc: &MilpEncoding, deadline: Instant) -> Result<Vec<usize>, SearchFailure> {
    let n = enc.value_sat.len();
    let mut assign = vec![Assign::Free; n];
    let mut stack: Vec<Frame> = Vec::new();
    let mut in_value_sat: u64 = 0;
    let mut in_vb_micro: u64 = 0;
    let mut incumbent: Option<Best> = None;
    let mut nodes: u64 = 0;

    'search: loop {
        if Instant::now() >= deadline {
            debug!("branch and bound timed out after {} nodes", nodes);
            return match incumbent {
                Some(best) => Ok(best.indices),
                None => Err(SearchFailure::Timeout),
            };
        }
        nodes += 1;

        match process_node(enc, &assign, in_value_sat, in_vb_micro, &mut incumbent) {
            // Branch: explore the inclusion side first.
            Some(var) => {
                assign[var] = Assign::In;
                in_value_sat += enc.value_sat[var];
                in_vb_micro += enc.vb_micro[var];
                stack.push(Frame { var, included: true });
            }
            // Prune: backtrack to the deepest unexplored exclusion side.
            None => loop {
                match stack.pop() {
                    None => break 'search,
                    Some(Frame { var, included: true }) => {
                        in_value_sat -= enc.value_sat[var];
                        in_vb_micro -= enc.vb_micro[var];
                        assign[var] = Assign::Out;
                        stack.push(Frame { var, included: false });
                        continue 'search;
                    }
                    Some(Frame { var, included: false }) => assign[var] = Assign::Free,
                }
            },
        }
    }

    debug!("branch and bound exhausted the tree after {} nodes", nodes);
    match incumbent {
        Some(best) => Ok(best.indices),
        None => Err(SearchFailure::Infeasible),
    }
}

// Prices one node.  Returns the candidate to branch on, or `None` to
// prune the subtree.  Feasible integral relaxations update the
// incumbent as a side effect.
fn process_node(
    enc: &MilpEncoding,
    assign: &[Assign],
    in_value_sat: u64,
    in_vb_micro: u64,
    incumbent: &mut Option<Best>,
) -> Option<usize> {
    let (fee_lb, vb_lb, frac, taken) = match relax(enc, assign, in_value_sat, in_vb_micro) {
        Lp::Infeasible => return None,
        Lp::Solved { fee_lb, vb_lb, frac, taken } => (fee_lb, vb_lb, frac, taken),
    };

    if !improves(fee_lb, vb_lb, incumbent.as_ref()) {
        return None;
    }
    if let Some(var) = frac {
        return Some(var);
    }

    // The relaxation is integral: price its subset exactly.
    let mut indices: Vec<usize> = (0..assign.len())
        .filter(|&i| assign[i] == Assign::In)
        .collect();
    indices.extend(taken);
    indices.sort_unstable();

    let (fee, tx_vbytes, total_sat) = price_subset(enc, &indices);
    let needed = enc.target_sat as u128 + fee as u128 + enc.min_change_sat as u128;
    if !indices.is_empty()
        && total_sat as u128 >= needed
        && improves(fee, tx_vbytes, incumbent.as_ref())
    {
        trace!("incumbent: {} inputs, fee {} sats, {} vB", indices.len(), fee, tx_vbytes);
        *incumbent = Some(Best { indices, fee, tx_vbytes });
    }

    // The exact ceilings may sit above the bound, so the subtree stays
    // open while the bound can still beat the incumbent.
    if !improves(fee_lb, vb_lb, incumbent.as_ref()) {
        return None;
    }
    branch_candidate(enc, assign)
}

// Greedy optimum of the node's LP relaxation.
fn relax(enc: &MilpEncoding, assign: &[Assign], in_value_sat: u64, in_vb_micro: u64) -> Lp {
    let in_cost_s2 = enc.rate_micro as i128 * in_vb_micro as i128;
    let mut need_s2 = enc.required_root_s2 + in_cost_s2 - in_value_sat as i128 * SCALE_S2;
    let mut vb_micro = enc.fixed_vb_micro + in_vb_micro;
    let mut taken = Vec::new();
    let mut frac = None;

    let mut covered = need_s2 <= 0;
    if !covered {
        for &i in &enc.density_order {
            if assign[i] != Assign::Free {
                continue;
            }
            let eff = enc.eff_s2[i];
            match eff.cmp(&need_s2) {
                Ordering::Less => {
                    need_s2 -= eff;
                    vb_micro += enc.vb_micro[i];
                    taken.push(i);
                }
                Ordering::Equal => {
                    vb_micro += enc.vb_micro[i];
                    taken.push(i);
                    covered = true;
                    break;
                }
                Ordering::Greater => {
                    // Partial take.  Its size is left out of the bound,
                    // which only weakens the bound, never breaks it.
                    frac = Some(i);
                    covered = true;
                    break;
                }
            }
        }
    }
    if !covered {
        return Lp::Infeasible;
    }

    let vb_lb = Vbytes::from_micro_vb(vb_micro).ceil_to_vb();
    let fee_lb = fee_ceil_sat(enc.rate_micro, vb_lb);
    Lp::Solved { fee_lb, vb_lb, frac, taken }
}

// Exact price of a fully decided subset.  Plain sums: the model checked
// the full pool for overflow.
fn price_subset(enc: &MilpEncoding, indices: &[usize]) -> (u64, u64, u64) {
    let mut total_sat: u64 = 0;
    let mut raw_vb_micro: u64 = enc.fixed_vb_micro;
    for &i in indices {
        total_sat += enc.value_sat[i];
        raw_vb_micro += enc.vb_micro[i];
    }
    let tx_vbytes = Vbytes::from_micro_vb(raw_vb_micro).ceil_to_vb();
    let fee = fee_ceil_sat(enc.rate_micro, tx_vbytes);
    (fee, tx_vbytes, total_sat)
}

// Strictly smaller fee wins; at equal fee only a strictly smaller size
// wins.
fn improves(fee: u64, tx_vbytes: u64, best: Option<&Best>) -> bool {
    match best {
        None => true,
        Some(best) => fee < best.fee || (fee == best.fee && tx_vbytes < best.tx_vbytes),
    }
}

// Branch variable when the relaxation is integral: every free candidate
// sits at a bound, so fall back to the value/index ordering used for
// fractional ties.
fn branch_candidate(enc: &MilpEncoding, assign: &[Assign]) -> Option<usize> {
    let mut pick: Option<usize> = None;
    for i in 0..assign.len() {
        if assign[i] != Assign::Free {
            continue;
        }
        match pick {
            Some(p) if enc.value_sat[i] <= enc.value_sat[p] => {}
            _ => pick = Some(i),
        }
    }
    pick
}
