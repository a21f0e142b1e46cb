// SPDX-License-Identifier: CC0-1.0
//
//! Replays the saved fixture corpus and checks the universal
//! invariants on every feasible case.

use bitcoin::Amount;
use bitcoin_utxo_milp::{
    CoinSelectionModel, MilpSolver, SelectionError, SelectionParams, TxSizing, Utxo, Vbytes,
};
use serde::Deserialize;

#[derive(Deserialize)]
struct CasesPayload {
    version: u32,
    cases: Vec<Case>,
}

#[derive(Deserialize)]
struct Case {
    expect: String,
    target_sats: u64,
    fee_rate_sat_per_vb: String,
    min_change_sats: u64,
    base_overhead_vbytes: String,
    recipient_output_vbytes: String,
    change_output_vbytes: String,
    utxos: Vec<CaseUtxo>,
}

#[derive(Deserialize)]
struct CaseUtxo {
    value_sats: u64,
    input_vbytes: String,
}

fn load_cases() -> Vec<Case> {
    let payload: CasesPayload =
        serde_json::from_str(include_str!("fixtures/cases_v1.json")).unwrap();
    assert_eq!(payload.version, 1);
    payload.cases
}

// Fixtures carry no outpoints; synthesise them from the case position,
// the way the original corpus loader does.
fn case_model(case: &Case) -> CoinSelectionModel {
    let utxos: Vec<Utxo> = case
        .utxos
        .iter()
        .enumerate()
        .map(|(i, u)| {
            Utxo::new(
                format!("{:064x}", i),
                i as u32,
                Amount::from_sat(u.value_sats),
                u.input_vbytes.parse().unwrap(),
            )
        })
        .collect();
    let params = SelectionParams {
        target: Amount::from_sat(case.target_sats),
        fee_rate: case.fee_rate_sat_per_vb.parse().unwrap(),
        min_change: Amount::from_sat(case.min_change_sats),
        sizing: TxSizing {
            base_overhead_vbytes: case.base_overhead_vbytes.parse().unwrap(),
            recipient_output_vbytes: case.recipient_output_vbytes.parse().unwrap(),
            change_output_vbytes: case.change_output_vbytes.parse().unwrap(),
        },
    };
    CoinSelectionModel::new(utxos, params).unwrap()
}

#[test]
fn saved_cases_uphold_invariants() {
    let cases = load_cases();
    assert!(!cases.is_empty());

    let solver = MilpSolver::new();
    for (index, case) in cases.iter().enumerate() {
        let model = case_model(case);

        if case.expect == "infeasible" {
            assert_eq!(
                solver.solve(&model),
                Err(SelectionError::Infeasible),
                "case {} should be infeasible",
                index,
            );
            continue;
        }

        let result = solver
            .solve(&model)
            .unwrap_or_else(|e| panic!("case {} failed: {}", index, e));

        // conservation, exact
        assert_eq!(
            result.total_input().to_sat(),
            case.target_sats + result.fee().to_sat() + result.change().to_sat(),
            "case {} violates conservation",
            index,
        );
        assert!(result.change().to_sat() >= case.min_change_sats);
        assert!(result.tx_vbytes() >= 1);
        assert!(result.fee().to_sat() >= 1);

        // the selection is a duplicate-free subset, in candidate order
        let candidates = model.utxos();
        let mut cursor = 0;
        for chosen in result.selected() {
            let position = candidates[cursor..]
                .iter()
                .position(|u| u.outpoint() == chosen.outpoint())
                .unwrap_or_else(|| panic!("case {} selected a stranger", index));
            cursor += position + 1;
        }

        // both ceilings, recomputed from the raw figures
        let raw = Vbytes::checked_sum(result.selected().iter().map(|u| u.input_vbytes))
            .and_then(|inputs| inputs.checked_add(model.params().sizing.fixed_vbytes().unwrap()))
            .unwrap();
        assert_eq!(result.tx_vbytes(), raw.ceil_to_vb());
        assert_eq!(
            Some(result.fee()),
            model.params().fee_rate.fee_for_vbytes(result.tx_vbytes()),
        );
    }
}
