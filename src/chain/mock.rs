use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::Result;
use async_trait::async_trait;

use crate::traits::{ChainStateReader, ContractCaller};
use crate::types::{ContractData, Hash32, SimulatedCall, Submission};

/// A contract call observed by `MockChain`.
#[derive(Debug, Clone, PartialEq)]
pub enum ContractCall {
    Plant { amount: i128 },
    Work { hash: Hash32, nonce: u64, at: Instant },
    SignAuth { envelope: String },
    Send { envelope: String },
}

#[derive(Default)]
struct MockState {
    data: ContractData,
    failing_reads: u32,
    plant_replies: VecDeque<SimulatedCall>,
    work_replies: VecDeque<SimulatedCall>,
    calls: Vec<ContractCall>,
}

/// Scripted chain for testing.
///
/// Serves whatever `ContractData` was last set, answers plant/work with
/// queued replies (successful simulation once the queue is empty) and
/// records every contract call for verification.
#[derive(Clone, Default)]
pub struct MockChain {
    state: Arc<Mutex<MockState>>,
    call_delay: Duration,
}

impl MockChain {
    pub fn new(data: ContractData) -> Self {
        let chain = Self::default();
        chain.set_data(data);
        chain
    }

    /// Delay every plant/work simulation, to hold calls in flight.
    pub fn with_call_delay(mut self, delay: Duration) -> Self {
        self.call_delay = delay;
        self
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set_data(&self, data: ContractData) {
        self.lock().data = data;
    }

    /// Fail the next `count` reads.
    pub fn fail_reads(&self, count: u32) {
        self.lock().failing_reads = count;
    }

    pub fn push_plant_reply(&self, reply: SimulatedCall) {
        self.lock().plant_replies.push_back(reply);
    }

    pub fn push_work_reply(&self, reply: SimulatedCall) {
        self.lock().work_replies.push_back(reply);
    }

    pub fn calls(&self) -> Vec<ContractCall> {
        self.lock().calls.clone()
    }

    pub fn plant_amounts(&self) -> Vec<i128> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                ContractCall::Plant { amount } => Some(amount),
                _ => None,
            })
            .collect()
    }

    pub fn work_calls(&self) -> Vec<(Hash32, u64, Instant)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                ContractCall::Work { hash, nonce, at } => Some((hash, nonce, at)),
                _ => None,
            })
            .collect()
    }

    pub fn sent(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                ContractCall::Send { envelope } => Some(envelope),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl ChainStateReader for MockChain {
    fn name(&self) -> &'static str {
        "mock-chain"
    }

    async fn contract_data(&self, _farmer: &str) -> Result<ContractData> {
        let mut state = self.lock();
        if state.failing_reads > 0 {
            state.failing_reads -= 1;
            anyhow::bail!("mock chain read failure");
        }
        Ok(state.data.clone())
    }
}

#[async_trait]
impl ContractCaller for MockChain {
    fn name(&self) -> &'static str {
        "mock-chain"
    }

    async fn plant(&self, _farmer: &str, amount: i128) -> Result<SimulatedCall> {
        let reply = {
            let mut state = self.lock();
            state.calls.push(ContractCall::Plant { amount });
            state
                .plant_replies
                .pop_front()
                .unwrap_or_else(|| SimulatedCall::ok(format!("plant:{}", amount)))
        };
        if !self.call_delay.is_zero() {
            tokio::time::sleep(self.call_delay).await;
        }
        Ok(reply)
    }

    async fn work(&self, _farmer: &str, hash: &Hash32, nonce: u64) -> Result<SimulatedCall> {
        let reply = {
            let mut state = self.lock();
            state.calls.push(ContractCall::Work {
                hash: *hash,
                nonce,
                at: Instant::now(),
            });
            state
                .work_replies
                .pop_front()
                .unwrap_or_else(|| SimulatedCall::ok(format!("work:{}", nonce)))
        };
        if !self.call_delay.is_zero() {
            tokio::time::sleep(self.call_delay).await;
        }
        Ok(reply)
    }

    async fn sign_auth_entries(&self, _farmer: &str, call: SimulatedCall) -> Result<SimulatedCall> {
        self.lock().calls.push(ContractCall::SignAuth {
            envelope: call.envelope.clone(),
        });
        Ok(call)
    }

    async fn send(&self, call: &SimulatedCall) -> Result<Submission> {
        self.lock().calls.push(ContractCall::Send {
            envelope: call.envelope.clone(),
        });
        Ok(Submission::accepted(format!("tx:{}", call.envelope)))
    }
}
