//! Scripted in-process provider for tests
//!
//! Answers `eth_call` from canned ABI-encoded replies keyed by
//! `(to, calldata)`, keeps a fake account list and block clock, and mines
//! transactions instantly according to a configurable outcome.

use crate::chain::abi::{encode, Function, Token};
use crate::chain::provider::{ProviderError, WalletProvider};
use crate::chain::types::{parse_hex_data, Address};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{broadcast, Notify};

/// What `eth_call` should answer
#[derive(Debug, Clone)]
pub enum CallReply {
    Data(Vec<u8>),
    Revert(String),
}

/// What happens to a submitted transaction
#[derive(Debug, Clone)]
pub enum TxOutcome {
    /// Mined with status 1; logs emitted from these addresses
    Success(Vec<Address>),
    /// Mined with status 0
    Reverted,
    /// User declined in the wallet
    Rejected,
    /// Never mined
    Pending,
}

/// Blocks the first `eth_call` to an address until released
pub struct CallGate {
    target: Address,
    /// Signalled once the gated call is parked
    pub reached: Arc<Notify>,
    /// Notify to let the gated call continue
    pub release: Arc<Notify>,
}

#[derive(Default)]
struct MockState {
    accounts: Vec<Address>,
    calls: HashMap<(Address, Vec<u8>), CallReply>,
    timestamp: u64,
    block_number: u64,
    tx_outcome: Option<TxOutcome>,
    receipts: HashMap<String, Value>,
    sent: Vec<Value>,
    log: Vec<(String, Value)>,
    tx_counter: u64,
    deny_access: bool,
    /// Requests per method that fail with a timeout before answering
    timeouts: HashMap<String, usize>,
}

pub struct MockProvider {
    state: Mutex<MockState>,
    gate: Mutex<Option<CallGate>>,
    events: broadcast::Sender<Vec<Address>>,
    push_events: bool,
}

impl MockProvider {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            state: Mutex::new(MockState {
                timestamp: 1_700_000_000,
                block_number: 100,
                tx_outcome: Some(TxOutcome::Success(vec![])),
                ..MockState::default()
            }),
            gate: Mutex::new(None),
            events,
            push_events: true,
        }
    }

    /// A provider that cannot push `accountsChanged` (forces polling)
    pub fn without_events() -> Self {
        Self {
            push_events: false,
            ..Self::new()
        }
    }

    pub fn with_accounts(self, accounts: Vec<Address>) -> Self {
        self.state.lock().unwrap().accounts = accounts;
        self
    }

    /// Replace the account list and emit `accountsChanged`
    pub fn change_accounts(&self, accounts: Vec<Address>) {
        self.state.lock().unwrap().accounts = accounts.clone();
        let _ = self.events.send(accounts);
    }

    pub fn deny_access(&self) {
        self.state.lock().unwrap().deny_access = true;
    }

    pub fn set_timestamp(&self, timestamp: u64) {
        self.state.lock().unwrap().timestamp = timestamp;
    }

    pub fn set_tx_outcome(&self, outcome: TxOutcome) {
        self.state.lock().unwrap().tx_outcome = Some(outcome);
    }

    /// Answer `function(args)` on `to` with `outputs`
    pub fn on_call(&self, to: Address, function: &Function, args: &[Token], outputs: &[Token]) {
        let data = function.encode_call(args).unwrap();
        self.state
            .lock()
            .unwrap()
            .calls
            .insert((to, data), CallReply::Data(encode(outputs)));
    }

    /// Make `function(args)` on `to` revert
    pub fn on_call_revert(&self, to: Address, function: &Function, args: &[Token], reason: &str) {
        let data = function.encode_call(args).unwrap();
        self.state
            .lock()
            .unwrap()
            .calls
            .insert((to, data), CallReply::Revert(reason.to_string()));
    }

    pub fn gate_next_call_to(&self, target: Address) -> (Arc<Notify>, Arc<Notify>) {
        let reached = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        *self.gate.lock().unwrap() = Some(CallGate {
            target,
            reached: reached.clone(),
            release: release.clone(),
        });
        (reached, release)
    }

    /// Number of requests for `method`
    pub fn count(&self, method: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .log
            .iter()
            .filter(|(m, _)| m == method)
            .count()
    }

    /// Fail the next `times` requests for `method` with `ProviderError::Timeout`
    pub fn time_out_next(&self, method: &str, times: usize) {
        self.state
            .lock()
            .unwrap()
            .timeouts
            .insert(method.to_string(), times);
    }

    /// Advance the chain head without mining anything
    pub fn mine_blocks(&self, count: u64) {
        self.state.lock().unwrap().block_number += count;
    }

    /// Number of `eth_call`s sent to `to`
    pub fn calls_to(&self, to: Address) -> usize {
        let target = to.to_string();
        self.state
            .lock()
            .unwrap()
            .log
            .iter()
            .filter(|(m, p)| m == "eth_call" && p[0]["to"] == target.as_str())
            .count()
    }

    /// Transaction objects passed to `eth_sendTransaction`
    pub fn sent_transactions(&self) -> Vec<Value> {
        self.state.lock().unwrap().sent.clone()
    }

    fn take_gate(&self, to: Address) -> Option<CallGate> {
        let mut gate = self.gate.lock().unwrap();
        match gate.as_ref() {
            Some(g) if g.target == to => gate.take(),
            _ => None,
        }
    }

    fn answer_call(&self, params: &Value) -> Result<Value, ProviderError> {
        let to: Address = params[0]["to"]
            .as_str()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| ProviderError::InvalidResponse("bad call target".into()))?;
        let data = params[0]["data"]
            .as_str()
            .and_then(|s| parse_hex_data(s).ok())
            .ok_or_else(|| ProviderError::InvalidResponse("bad call data".into()))?;

        let state = self.state.lock().unwrap();
        match state.calls.get(&(to, data)) {
            Some(CallReply::Data(bytes)) => Ok(json!(format!("0x{}", hex::encode(bytes)))),
            Some(CallReply::Revert(reason)) => Err(ProviderError::Rpc {
                code: 3,
                message: format!("execution reverted: {}", reason),
            }),
            None => Err(ProviderError::Rpc {
                code: -32000,
                message: "execution reverted".to_string(),
            }),
        }
    }

    fn mine(&self, tx: &Value) -> Result<Value, ProviderError> {
        let mut state = self.state.lock().unwrap();
        state.sent.push(tx.clone());

        let outcome = state.tx_outcome.clone().unwrap_or(TxOutcome::Pending);
        if let TxOutcome::Rejected = outcome {
            return Err(ProviderError::Rpc {
                code: 4001,
                message: "User denied transaction signature.".to_string(),
            });
        }

        state.tx_counter += 1;
        state.block_number += 1;
        let hash = format!("0x{:064x}", state.tx_counter);

        let (status, logs) = match outcome {
            TxOutcome::Success(emitters) => (
                "0x1",
                emitters
                    .iter()
                    .map(|a| json!({ "address": a.to_string(), "topics": [], "data": "0x" }))
                    .collect::<Vec<_>>(),
            ),
            TxOutcome::Reverted => ("0x0", vec![]),
            TxOutcome::Pending | TxOutcome::Rejected => return Ok(json!(hash)),
        };

        let receipt = json!({
            "transactionHash": hash,
            "blockNumber": format!("{:#x}", state.block_number),
            "from": tx["from"],
            "to": tx["to"],
            "contractAddress": null,
            "status": status,
            "gasUsed": "0x5208",
            "logs": logs,
        });
        state.receipts.insert(hash.clone(), receipt);
        Ok(json!(hash))
    }
}

#[async_trait]
impl WalletProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn request(&self, method: &str, params: Value) -> Result<Value, ProviderError> {
        {
            let mut state = self.state.lock().unwrap();
            state.log.push((method.to_string(), params.clone()));
            if let Some(remaining) = state.timeouts.get_mut(method) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(ProviderError::Timeout);
                }
            }
        }

        match method {
            "eth_requestAccounts" => {
                let state = self.state.lock().unwrap();
                if state.deny_access {
                    return Err(ProviderError::Rpc {
                        code: 4001,
                        message: "User rejected the request.".to_string(),
                    });
                }
                Ok(json!(state.accounts))
            }
            "eth_accounts" => {
                let accounts = self.state.lock().unwrap().accounts.clone();
                Ok(json!(accounts))
            }
            "eth_blockNumber" => {
                let number = self.state.lock().unwrap().block_number;
                Ok(json!(format!("{:#x}", number)))
            }
            "eth_getBlockByNumber" => {
                let state = self.state.lock().unwrap();
                Ok(json!({
                    "number": format!("{:#x}", state.block_number),
                    "timestamp": format!("{:#x}", state.timestamp),
                }))
            }
            "eth_call" => {
                // Resolve the reply before parking so a gated call returns
                // the chain state it observed when it was issued.
                let target: Option<Address> =
                    params[0]["to"].as_str().and_then(|s| s.parse().ok());
                let reply = self.answer_call(&params);
                if let Some(gate) = target.and_then(|to| self.take_gate(to)) {
                    gate.reached.notify_one();
                    gate.release.notified().await;
                }
                reply
            }
            "eth_sendTransaction" => self.mine(&params[0]),
            "eth_getTransactionReceipt" => {
                let hash = params[0].as_str().unwrap_or_default();
                let receipt = self.state.lock().unwrap().receipts.get(hash).cloned();
                Ok(receipt.unwrap_or(Value::Null))
            }
            _ => Err(ProviderError::Rpc {
                code: -32601,
                message: format!("method not found: {}", method),
            }),
        }
    }

    fn account_events(&self) -> Option<broadcast::Receiver<Vec<Address>>> {
        self.push_events.then(|| self.events.subscribe())
    }
}
