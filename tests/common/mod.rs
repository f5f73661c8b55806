#![allow(dead_code)]

use async_trait::async_trait;
use cjScanner::explorer::client::ExplorerApi;
use cjScanner::explorer::model::{AddressPage, Prevout, Transaction, Vin, Vout};
use cjScanner::types::ExplorerError;
use std::collections::HashMap;

/// Scripted explorer: a fixed transaction graph served from memory.
#[derive(Default)]
pub struct MockExplorer {
    pub txs: HashMap<String, Transaction>,
    pub spends: HashMap<(String, u32), String>,
    pub address_txs: HashMap<String, Vec<String>>,
    pub mempool: Vec<String>,
}

impl MockExplorer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_tx(&mut self, tx: Transaction) -> &mut Self {
        self.txs.insert(tx.txid.clone(), tx);
        self
    }

    /// Declares `child` as the spender of `parent`'s output `vout_index`.
    pub fn spend(&mut self, parent: &str, vout_index: u32, child: &str) -> &mut Self {
        self.spends
            .insert((parent.to_string(), vout_index), child.to_string());
        self
    }

    pub fn address_history(&mut self, address: &str, txids: &[&str]) -> &mut Self {
        self.address_txs.insert(
            address.to_string(),
            txids.iter().map(|t| t.to_string()).collect(),
        );
        self
    }
}

#[async_trait]
impl ExplorerApi for MockExplorer {
    async fn get_mempool_txids(&self) -> Result<Vec<String>, ExplorerError> {
        Ok(self.mempool.clone())
    }

    async fn get_tx(&self, txid: &str) -> Result<Transaction, ExplorerError> {
        self.txs.get(txid).cloned().ok_or(ExplorerError::NotFound)
    }

    async fn get_address_txs(
        &self,
        address: &str,
        _cursor: Option<&str>,
    ) -> Result<AddressPage, ExplorerError> {
        let txids = self
            .address_txs
            .get(address)
            .cloned()
            .ok_or(ExplorerError::NotFound)?;
        Ok(AddressPage {
            next_cursor: txids.last().cloned(),
            txids,
        })
    }

    async fn get_spending_tx(
        &self,
        prev_txid: &str,
        vout_index: u32,
    ) -> Result<Option<String>, ExplorerError> {
        Ok(self
            .spends
            .get(&(prev_txid.to_string(), vout_index))
            .cloned())
    }
}

pub fn tx_with(txid: &str, vins: Vec<(&str, u64)>, vouts: Vec<(&str, u64)>) -> Transaction {
    Transaction {
        txid: txid.to_string(),
        vin: vins
            .into_iter()
            .enumerate()
            .map(|(i, (addr, value))| Vin {
                txid: format!("{}-prev{}", txid, i),
                vout: 0,
                prevout: Some(Prevout {
                    value,
                    scriptpubkey_address: Some(addr.to_string()),
                }),
            })
            .collect(),
        vout: vouts
            .into_iter()
            .map(|(addr, value)| Vout {
                value,
                scriptpubkey_address: Some(addr.to_string()),
            })
            .collect(),
        fee: 1_200,
        size: 900,
    }
}

/// 8-in 8-out with uniform outputs: heuristic-positive, but away from the
/// Wasabi and Whirlpool denominations.
pub fn coinjoin_tx(txid: &str) -> Transaction {
    let vins: Vec<(String, u64)> = (0..8).map(|i| (format!("{}-in{}", txid, i), 7_800_000)).collect();
    let vouts: Vec<(String, u64)> = (0..8).map(|i| (format!("{}-out{}", txid, i), 7_700_000)).collect();
    tx_with(
        txid,
        vins.iter().map(|(a, v)| (a.as_str(), *v)).collect(),
        vouts.iter().map(|(a, v)| (a.as_str(), *v)).collect(),
    )
}

/// 1-in 2-out unequal spend: heuristic-negative.
pub fn plain_tx(txid: &str, input_addr: &str) -> Transaction {
    let pay = format!("{}-pay", txid);
    let chg = format!("{}-chg", txid);
    tx_with(
        txid,
        vec![(input_addr, 7_700_000)],
        vec![(pay.as_str(), 5_000_000), (chg.as_str(), 2_600_000)],
    )
}
