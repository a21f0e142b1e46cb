// SPDX-License-Identifier: CC0-1.0
//
//! Coin-selection model.
//!
//! Validates a candidate set against the run parameters, computes the
//! exact fee and virtual size of any subset, and carries the
//! mixed-integer encoding the solver engines work on: per-candidate
//! effective values on a common integer scale plus the funding
//! requirement of the LP relaxation.

use std::cmp::Ordering;
use std::collections::HashSet;

use bitcoin::amount::CheckedSum;
use bitcoin::Amount;

use crate::types::{SelectionParams, Utxo};
use crate::units::{FeeRate, Vbytes};
use crate::{InvalidInput, SelectionError};

/// Largest admissible vbyte figure for a single input or sizing
/// component: 100 000 vB.
pub const MAX_COMPONENT_VBYTES: Vbytes = Vbytes::from_micro_vb(100_000_000_000);

/// Largest admissible fee rate: 100 000 sat/vB.
pub const MAX_FEE_RATE: FeeRate = FeeRate::from_micro_sat_per_vb(100_000_000_000);

// Satoshi values scaled to micro-sat x micro-vb resolution.  Every
// solver-side quantity lives on this scale so effective values,
// funding requirements and fee costs compare exactly.
pub(crate) const SCALE_S2: i128 = 1_000_000_000_000;

const MICRO: u128 = 1_000_000;

/// A selection instance: an ordered candidate set plus the run
/// parameters, validated and encoded for the solver.
#[derive(Debug, Clone)]
pub struct CoinSelectionModel {
    utxos: Vec<Utxo>,
    params: SelectionParams,
    encoding: MilpEncoding,
}

// The encoded program.  Built once per model; engines read it only.
#[derive(Debug, Clone)]
pub(crate) struct MilpEncoding {
    /// Candidate values in satoshis, candidate order.
    pub value_sat: Vec<u64>,
    /// Candidate input sizes in micro-vbytes, candidate order.
    pub vb_micro: Vec<u64>,
    /// value - fee_rate * input_vbytes, on the S2 scale.  Negative for
    /// candidates that cost more to spend than they contribute.
    pub eff_s2: Vec<i128>,
    /// Candidates with positive effective value, best
    /// funding-per-fee-cost first.  This is the fill order of the LP
    /// relaxation's greedy optimum.
    pub density_order: Vec<usize>,
    /// Template vbytes paid regardless of the chosen inputs.
    pub fixed_vb_micro: u64,
    /// Fee rate in micro-sats per vbyte.
    pub rate_micro: u64,
    pub target_sat: u64,
    pub min_change_sat: u64,
    /// Funding the LP must cover before any candidate contributes:
    /// (target + min_change) + fee_rate * fixed vbytes, on S2.
    pub required_root_s2: i128,
}

impl CoinSelectionModel {
    /// Validates the candidate set and parameters and encodes the
    /// selection instance.
    ///
    /// The candidates keep their order; results report selections in
    /// this order.
    pub fn new(utxos: Vec<Utxo>, params: SelectionParams) -> Result<Self, SelectionError> {
        validate(&utxos, &params)?;
        let encoding = encode(&utxos, &params)?;
        Ok(CoinSelectionModel { utxos, params, encoding })
    }

    /// The candidate set, in input order.
    pub fn utxos(&self) -> &[Utxo] {
        &self.utxos
    }

    /// The run parameters.
    pub fn params(&self) -> &SelectionParams {
        &self.params
    }

    pub(crate) fn encoding(&self) -> &MilpEncoding {
        &self.encoding
    }

    /// The exact fee and whole-vbyte size of a transaction spending
    /// `selected`.
    ///
    /// The raw vbytes (template plus inputs) round up to a whole vbyte
    /// count first; the fee then rounds up to a whole satoshi on that
    /// count.  The subset must be non-empty.
    pub fn evaluate_fee_and_vbytes<'a, I>(&self, selected: I) -> Result<(Amount, u64), SelectionError>
    where
        I: IntoIterator<Item = &'a Utxo>,
    {
        let mut raw = self
            .params
            .sizing
            .fixed_vbytes()
            .ok_or(InvalidInput::ArithmeticOverflow)?;
        let mut any = false;
        for utxo in selected {
            any = true;
            raw = raw
                .checked_add(utxo.input_vbytes)
                .ok_or(InvalidInput::ArithmeticOverflow)?;
        }
        if !any {
            return Err(InvalidInput::EmptySubset.into());
        }

        let tx_vbytes = raw.ceil_to_vb();
        let fee = self
            .params
            .fee_rate
            .fee_for_vbytes(tx_vbytes)
            .ok_or(InvalidInput::ArithmeticOverflow)?;
        Ok((fee, tx_vbytes))
    }
}

fn validate(utxos: &[Utxo], params: &SelectionParams) -> Result<(), InvalidInput> {
    if utxos.is_empty() {
        return Err(InvalidInput::EmptyCandidateSet);
    }
    if params.target == Amount::ZERO {
        return Err(InvalidInput::ZeroTarget);
    }
    if params.fee_rate == FeeRate::ZERO {
        return Err(InvalidInput::ZeroFeeRate);
    }
    if params.fee_rate > MAX_FEE_RATE {
        return Err(InvalidInput::FeeRateAboveCap);
    }
    if params.target > Amount::MAX_MONEY || params.min_change > Amount::MAX_MONEY {
        return Err(InvalidInput::AmountAboveMaxMoney);
    }

    let sizing = &params.sizing;
    for component in [
        sizing.base_overhead_vbytes,
        sizing.recipient_output_vbytes,
        sizing.change_output_vbytes,
    ] {
        if component > MAX_COMPONENT_VBYTES {
            return Err(InvalidInput::SizingVbytesAboveCap);
        }
    }
    // A positive template keeps every solve at tx_vbytes >= 1 and
    // fee >= 1, whatever the chosen inputs weigh.
    if sizing.fixed_vbytes().ok_or(InvalidInput::ArithmeticOverflow)? == Vbytes::ZERO {
        return Err(InvalidInput::ZeroSizing);
    }

    let mut seen = HashSet::with_capacity(utxos.len());
    for utxo in utxos {
        if utxo.value > Amount::MAX_MONEY {
            return Err(InvalidInput::AmountAboveMaxMoney);
        }
        if utxo.input_vbytes > MAX_COMPONENT_VBYTES {
            return Err(InvalidInput::InputVbytesAboveCap);
        }
        if !seen.insert(utxo.outpoint()) {
            return Err(InvalidInput::DuplicateOutpoint {
                txid: utxo.txid.clone(),
                vout: utxo.vout,
            });
        }
    }

    let total = utxos
        .iter()
        .map(|u| u.value)
        .checked_sum()
        .ok_or(InvalidInput::TotalAboveMaxMoney)?;
    if total > Amount::MAX_MONEY {
        return Err(InvalidInput::TotalAboveMaxMoney);
    }

    Ok(())
}

fn encode(utxos: &[Utxo], params: &SelectionParams) -> Result<MilpEncoding, InvalidInput> {
    let fixed = params
        .sizing
        .fixed_vbytes()
        .ok_or(InvalidInput::ArithmeticOverflow)?;

    // Sum all vbytes once; engines may then add subset sizes unchecked.
    Vbytes::checked_sum(utxos.iter().map(|u| u.input_vbytes))
        .and_then(|total| total.checked_add(fixed))
        .ok_or(InvalidInput::ArithmeticOverflow)?;

    let rate_micro = params.fee_rate.to_micro_sat_per_vb();
    let value_sat: Vec<u64> = utxos.iter().map(|u| u.value.to_sat()).collect();
    let vb_micro: Vec<u64> = utxos.iter().map(|u| u.input_vbytes.to_micro_vb()).collect();

    // Cost of spending candidate i, on S2: fee_rate * input_vbytes.
    // The validation caps keep every product inside i128.
    let cost_s2: Vec<i128> = vb_micro
        .iter()
        .map(|&vb| rate_micro as i128 * vb as i128)
        .collect();
    let eff_s2: Vec<i128> = value_sat
        .iter()
        .zip(&cost_s2)
        .map(|(&v, &c)| v as i128 * SCALE_S2 - c)
        .collect();

    let mut density_order: Vec<usize> = (0..utxos.len()).filter(|&i| eff_s2[i] > 0).collect();
    density_order.sort_by(|&a, &b| {
        denser_first(value_sat[a], cost_s2[a], value_sat[b], cost_s2[b])
            .then_with(|| value_sat[b].cmp(&value_sat[a]))
            .then_with(|| a.cmp(&b))
    });

    let target_sat = params.target.to_sat();
    let min_change_sat = params.min_change.to_sat();
    let required_root_s2 = (target_sat as i128 + min_change_sat as i128) * SCALE_S2
        + rate_micro as i128 * fixed.to_micro_vb() as i128;

    Ok(MilpEncoding {
        value_sat,
        vb_micro,
        eff_s2,
        density_order,
        fixed_vb_micro: fixed.to_micro_vb(),
        rate_micro,
        target_sat,
        min_change_sat,
        required_root_s2,
    })
}

// Orders candidate a before b when a funds more per unit of fee cost:
// v_a / c_a > v_b / c_b, compared by cross-multiplication.  A zero-cost
// candidate funds for free and sorts first.
fn denser_first(value_a: u64, cost_a: i128, value_b: u64, cost_b: i128) -> Ordering {
    let lhs = value_a as u128 * cost_b as u128;
    let rhs = value_b as u128 * cost_a as u128;
    rhs.cmp(&lhs)
}

// Fee ceiling on the raw micro-sat scale, used by the engines.  The
// encode-time overflow check bounds every subset's product.
pub(crate) fn fee_ceil_sat(rate_micro: u64, tx_vbytes: u64) -> u64 {
    let micro_sats = rate_micro as u128 * tx_vbytes as u128;
    (micro_sats / MICRO + (micro_sats % MICRO != 0) as u128) as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TxSizing;

    fn default_sizing() -> TxSizing {
        TxSizing {
            base_overhead_vbytes: "10".parse().unwrap(),
            recipient_output_vbytes: "31".parse().unwrap(),
            change_output_vbytes: "31".parse().unwrap(),
        }
    }

    fn params(target: u64, fee_rate: &str, min_change: u64) -> SelectionParams {
        SelectionParams {
            target: Amount::from_sat(target),
            fee_rate: fee_rate.parse().unwrap(),
            min_change: Amount::from_sat(min_change),
            sizing: default_sizing(),
        }
    }

    fn utxo(txid: &str, vout: u32, value: u64, vbytes: &str) -> Utxo {
        Utxo::new(txid, vout, Amount::from_sat(value), vbytes.parse().unwrap())
    }

    #[test]
    fn evaluate_fee_and_vbytes_known_case() {
        let candidates = vec![utxo("a", 0, 1_000, "68")];
        let model = CoinSelectionModel::new(candidates.clone(), params(300, "1", 1)).unwrap();

        let (fee, tx_vbytes) = model.evaluate_fee_and_vbytes(candidates.iter()).unwrap();
        assert_eq!(tx_vbytes, 140); // 10 + 31 + 31 + 68
        assert_eq!(fee, Amount::from_sat(140)); // 1 sat/vB
    }

    #[test]
    fn evaluate_ceils_vbytes_before_fee() {
        // 72 + 67.4 + 0.7 = 140.1 vB, so size is 141 and the fee is
        // charged on 141, not on ceil(140.1 * rate).
        let candidates = vec![utxo("a", 0, 1_000, "67.4"), utxo("b", 0, 1_000, "0.7")];
        let model = CoinSelectionModel::new(candidates.clone(), params(300, "1", 1)).unwrap();

        let (fee, tx_vbytes) = model.evaluate_fee_and_vbytes(candidates.iter()).unwrap();
        assert_eq!(tx_vbytes, 141);
        assert_eq!(fee, Amount::from_sat(141));
    }

    #[test]
    fn evaluate_ceils_fee_on_whole_vbytes() {
        let candidates = vec![utxo("a", 0, 100_000, "68")];
        let model = CoinSelectionModel::new(candidates.clone(), params(300, "1.507", 1)).unwrap();

        // 140 vB * 1.507 = 210.98 sats
        let (fee, tx_vbytes) = model.evaluate_fee_and_vbytes(candidates.iter()).unwrap();
        assert_eq!(tx_vbytes, 140);
        assert_eq!(fee, Amount::from_sat(211));
    }

    #[test]
    fn evaluate_rejects_empty_subset() {
        let model = CoinSelectionModel::new(vec![utxo("a", 0, 1_000, "68")], params(300, "1", 1))
            .unwrap();
        assert_eq!(
            model.evaluate_fee_and_vbytes(std::iter::empty()),
            Err(InvalidInput::EmptySubset.into())
        );
    }

    #[test]
    fn rejects_empty_candidate_set() {
        assert_eq!(
            CoinSelectionModel::new(vec![], params(300, "1", 1)).err(),
            Some(InvalidInput::EmptyCandidateSet.into())
        );
    }

    #[test]
    fn rejects_zero_target() {
        assert_eq!(
            CoinSelectionModel::new(vec![utxo("a", 0, 1_000, "68")], params(0, "1", 1)).err(),
            Some(InvalidInput::ZeroTarget.into())
        );
    }

    #[test]
    fn rejects_zero_fee_rate() {
        assert_eq!(
            CoinSelectionModel::new(vec![utxo("a", 0, 1_000, "68")], params(300, "0", 1)).err(),
            Some(InvalidInput::ZeroFeeRate.into())
        );
    }

    #[test]
    fn rejects_zero_vbyte_sizing() {
        // A zero-vbyte template would price every selection at a zero
        // fee, breaking the tx_vbytes >= 1 and fee >= 1 guarantees.
        let params = SelectionParams {
            target: Amount::from_sat(300),
            fee_rate: "1".parse().unwrap(),
            min_change: Amount::from_sat(1),
            sizing: TxSizing {
                base_overhead_vbytes: Vbytes::ZERO,
                recipient_output_vbytes: Vbytes::ZERO,
                change_output_vbytes: Vbytes::ZERO,
            },
        };
        assert_eq!(
            CoinSelectionModel::new(vec![utxo("a", 0, 1_000, "0")], params).err(),
            Some(InvalidInput::ZeroSizing.into())
        );
    }

    #[test]
    fn rejects_duplicate_outpoint() {
        let candidates = vec![utxo("a", 0, 1_000, "68"), utxo("a", 0, 2_000, "68")];
        assert_eq!(
            CoinSelectionModel::new(candidates, params(300, "1", 1)).err(),
            Some(InvalidInput::DuplicateOutpoint { txid: "a".into(), vout: 0 }.into())
        );
    }

    #[test]
    fn allows_same_txid_distinct_vouts() {
        let candidates = vec![utxo("a", 0, 1_000, "68"), utxo("a", 1, 2_000, "68")];
        assert!(CoinSelectionModel::new(candidates, params(300, "1", 1)).is_ok());
    }

    #[test]
    fn rejects_value_above_max_money() {
        let too_rich = Utxo::new(
            "a",
            0,
            Amount::MAX_MONEY + Amount::from_sat(1),
            "68".parse().unwrap(),
        );
        assert_eq!(
            CoinSelectionModel::new(vec![too_rich], params(300, "1", 1)).err(),
            Some(InvalidInput::AmountAboveMaxMoney.into())
        );
    }

    #[test]
    fn rejects_pool_total_above_max_money() {
        let candidates = vec![
            Utxo::new("a", 0, Amount::MAX_MONEY, "68".parse().unwrap()),
            utxo("b", 0, 1, "68"),
        ];
        assert_eq!(
            CoinSelectionModel::new(candidates, params(300, "1", 1)).err(),
            Some(InvalidInput::TotalAboveMaxMoney.into())
        );
    }

    #[test]
    fn rejects_oversized_input_vbytes() {
        let candidates = vec![utxo("a", 0, 1_000, "100001")];
        assert_eq!(
            CoinSelectionModel::new(candidates, params(300, "1", 1)).err(),
            Some(InvalidInput::InputVbytesAboveCap.into())
        );
    }

    #[test]
    fn rejects_oversized_fee_rate() {
        assert_eq!(
            CoinSelectionModel::new(vec![utxo("a", 0, 1_000, "68")], params(300, "100001", 1))
                .err(),
            Some(InvalidInput::FeeRateAboveCap.into())
        );
    }

    #[test]
    fn density_order_prefers_cheaper_inputs_at_equal_value() {
        let candidates = vec![utxo("a", 0, 50_000, "148"), utxo("b", 0, 50_000, "68")];
        let model = CoinSelectionModel::new(candidates, params(1_000, "2", 1)).unwrap();
        assert_eq!(model.encoding().density_order, vec![1, 0]);
    }

    #[test]
    fn density_order_skips_uneconomic_candidates() {
        // 1 sat coin costing 68 vB at 2 sat/vB never pays for itself.
        let candidates = vec![utxo("a", 0, 1, "68"), utxo("b", 0, 50_000, "68")];
        let model = CoinSelectionModel::new(candidates, params(1_000, "2", 1)).unwrap();
        assert_eq!(model.encoding().density_order, vec![1]);
    }

    #[test]
    fn fee_ceil_matches_unit_fee() {
        assert_eq!(fee_ceil_sat(1_000_000, 140), 140);
        assert_eq!(fee_ceil_sat(2_500_000, 141), 353);
        assert_eq!(fee_ceil_sat(1_000_001, 140), 141);
    }
}
