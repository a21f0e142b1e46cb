// SPDX-License-Identifier: CC0-1.0
//
//! Value types for a single coin-selection run.

use bitcoin::Amount;

use crate::units::{FeeRate, Vbytes};

/// A spendable transaction output with a known value and an estimate of
/// the virtual size its spend adds to a transaction.
///
/// The identity of a candidate is its `(txid, vout)` outpoint; a
/// candidate set must not hold two UTXOs with the same outpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Utxo {
    /// Identifier of the funding transaction.  Treated as opaque.
    pub txid: String,
    /// Output index within the funding transaction.
    pub vout: u32,
    /// Amount held by this output.
    pub value: Amount,
    /// Virtual bytes this input adds to a transaction when spent.
    pub input_vbytes: Vbytes,
}

impl Utxo {
    /// Creates a candidate UTXO.
    pub fn new(txid: impl Into<String>, vout: u32, value: Amount, input_vbytes: Vbytes) -> Utxo {
        Utxo { txid: txid.into(), vout, value, input_vbytes }
    }

    /// The outpoint identifying this candidate.
    pub fn outpoint(&self) -> (&str, u32) {
        (&self.txid, self.vout)
    }
}

/// Sizing constants of the fixed transaction template: overhead, one
/// recipient segment and exactly one change output.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TxSizing {
    /// Vbytes of version, locktime, input/output counts and the rest of
    /// the fixed transaction skeleton.
    pub base_overhead_vbytes: Vbytes,
    /// Vbytes of the recipient output(s), total.
    pub recipient_output_vbytes: Vbytes,
    /// Vbytes of the change output.
    pub change_output_vbytes: Vbytes,
}

impl TxSizing {
    /// The template vbytes paid regardless of which inputs are chosen.
    pub fn fixed_vbytes(&self) -> Option<Vbytes> {
        self.base_overhead_vbytes
            .checked_add(self.recipient_output_vbytes)?
            .checked_add(self.change_output_vbytes)
    }
}

/// Fixed inputs for one coin-selection run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionParams {
    /// Amount the recipient must receive.
    pub target: Amount,
    /// Fee rate the transaction must pay.
    pub fee_rate: FeeRate,
    /// Dust floor: the change output must carry at least this much.
    pub min_change: Amount,
    /// Transaction template sizing.
    pub sizing: TxSizing,
}

/// A selection proven optimal by the solver.
///
/// The conservation identity holds exactly:
/// `total_input() == target + fee() + change()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionResult {
    selected: Vec<Utxo>,
    change: Amount,
    fee: Amount,
    tx_vbytes: u64,
    total_input: Amount,
}

impl SelectionResult {
    pub(crate) fn new(
        selected: Vec<Utxo>,
        change: Amount,
        fee: Amount,
        tx_vbytes: u64,
        total_input: Amount,
    ) -> SelectionResult {
        SelectionResult { selected, change, fee, tx_vbytes, total_input }
    }

    /// The chosen inputs, in candidate order.
    pub fn selected(&self) -> &[Utxo] {
        &self.selected
    }

    /// Value of the change output.
    pub fn change(&self) -> Amount {
        self.change
    }

    /// Fee paid by the transaction.
    pub fn fee(&self) -> Amount {
        self.fee
    }

    /// Whole-vbyte size of the transaction.
    pub fn tx_vbytes(&self) -> u64 {
        self.tx_vbytes
    }

    /// Sum of the chosen input values.
    pub fn total_input(&self) -> Amount {
        self.total_input
    }

    /// Recipient plus change value, fee excluded.
    pub fn total_output(&self) -> Amount {
        self.total_input - self.fee
    }
}
