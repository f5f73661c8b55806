/**
* filename : model
* author : HAMA
* date: 2025. 5. 12.
* description:
**/

use serde::Deserialize;
use std::collections::HashSet;

/// Esplora-style transaction body. Values are in satoshi.
#[derive(Debug, Clone, Deserialize)]
pub struct Transaction {
  pub txid: String,
  pub vin: Vec<Vin>,
  pub vout: Vec<Vout>,
  #[serde(default)]
  pub fee: u64,
  #[serde(default)]
  pub size: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Vin {
  pub txid: String,
  pub vout: u32,
  #[serde(default)]
  pub prevout: Option<Prevout>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Prevout {
  pub value: u64,
  #[serde(default)]
  pub scriptpubkey_address: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Vout {
  pub value: u64,
  #[serde(default)]
  pub scriptpubkey_address: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Outspend {
  pub spent: bool,
  #[serde(default)]
  pub txid: Option<String>,
}

/// One page of an address's confirmed history.
#[derive(Debug, Clone)]
pub struct AddressPage {
  pub txids: Vec<String>,
  pub next_cursor: Option<String>,
}

impl Transaction {
  pub fn input_addresses(&self) -> Vec<&str> {
    self
      .vin
      .iter()
      .filter_map(|i| i.prevout.as_ref())
      .filter_map(|p| p.scriptpubkey_address.as_deref())
      .collect()
  }

  pub fn output_addresses(&self) -> Vec<&str> {
    self
      .vout
      .iter()
      .filter_map(|o| o.scriptpubkey_address.as_deref())
      .collect()
  }

  /// Output values in vout order, zero-value outputs included.
  pub fn output_values(&self) -> Vec<u64> {
    self.vout.iter().map(|o| o.value).collect()
  }

  pub fn unique_input_addresses(&self) -> usize {
    self.input_addresses().into_iter().collect::<HashSet<_>>().len()
  }

  pub fn unique_output_addresses(&self) -> usize {
    self.output_addresses().into_iter().collect::<HashSet<_>>().len()
  }

  pub fn unique_output_values(&self) -> usize {
    self.output_values().into_iter().collect::<HashSet<_>>().len()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_esplora_transaction() {
    let body = r#"{
      "txid": "aa11",
      "version": 2,
      "locktime": 0,
      "vin": [
        {"txid": "bb22", "vout": 1, "prevout": {"value": 5000, "scriptpubkey_address": "bc1qinput"}},
        {"txid": "cc33", "vout": 0, "prevout": null}
      ],
      "vout": [
        {"value": 4000, "scriptpubkey_address": "bc1qout"},
        {"value": 0, "scriptpubkey": "6a24aa21", "scriptpubkey_address": null}
      ],
      "fee": 100,
      "size": 222,
      "status": {"confirmed": false}
    }"#;

    let tx: Transaction = serde_json::from_str(body).expect("valid body");
    assert_eq!(tx.txid, "aa11");
    assert_eq!(tx.vin.len(), 2);
    assert_eq!(tx.input_addresses(), vec!["bc1qinput"]);
    assert_eq!(tx.output_addresses(), vec!["bc1qout"]);
    // the zero-value OP_RETURN output still counts
    assert_eq!(tx.output_values(), vec![4000, 0]);
    assert_eq!(tx.unique_output_values(), 2);
    assert_eq!(tx.fee, 100);
  }

  #[test]
  fn parses_outspend() {
    let spent: Outspend = serde_json::from_str(r#"{"spent": true, "txid": "dd44", "vin": 0}"#)
      .expect("valid outspend");
    assert!(spent.spent);
    assert_eq!(spent.txid.as_deref(), Some("dd44"));

    let unspent: Outspend = serde_json::from_str(r#"{"spent": false}"#).expect("valid outspend");
    assert!(!unspent.spent);
    assert!(unspent.txid.is_none());
  }
}
