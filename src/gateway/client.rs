//! Chain Gateway
//!
//! Read-only queries against the factory and campaign contracts, and the
//! six state-changing calls. Reads go through the gateway's own provider;
//! writes go through the provider of the [`Signer`] they are given.

use crate::chain::abi::{Function, Token};
use crate::chain::contracts::{
    self, campaign, factory, RawCampaignInfo, RawDonor, RawMilestone,
};
use crate::chain::provider::{ProviderExt, WalletProvider};
use crate::chain::types::{Address, TransactionRequest, TxReceipt};
use crate::gateway::error::{GatewayError, GatewayResult, TxError, TxErrorKind, TxResult};
use crate::wallet::Signer;
use primitive_types::U256;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Gas ceiling per call type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GasLimits {
    pub create_campaign: u64,
    pub create_milestone: u64,
    pub donate: u64,
    pub vote: u64,
    pub withdraw_milestone: u64,
    pub withdraw_funds: u64,
}

impl Default for GasLimits {
    fn default() -> Self {
        Self {
            create_campaign: 500_000,
            create_milestone: 500_000,
            donate: 300_000,
            vote: 200_000,
            withdraw_milestone: 500_000,
            withdraw_funds: 500_000,
        }
    }
}

/// Configuration for the chain gateway
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Deployed factory contract
    pub factory_address: Address,
    pub gas: GasLimits,
    /// Blocks to wait for, counting the inclusion block
    pub confirmations: u64,
    /// Receipt poll interval in milliseconds
    pub receipt_poll_interval_ms: u64,
    /// Give up waiting for confirmation after this many milliseconds
    pub receipt_timeout_ms: u64,
    /// Slots probed when the campaign does not report a milestone count
    pub milestone_probe_slots: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            factory_address: Address::ZERO,
            gas: GasLimits::default(),
            confirmations: 1,
            receipt_poll_interval_ms: 1000,
            receipt_timeout_ms: 120_000,
            milestone_probe_slots: 3,
        }
    }
}

/// Gateway to the crowdfunding contracts
pub struct ChainGateway {
    provider: Arc<dyn WalletProvider>,
    config: GatewayConfig,
}

impl ChainGateway {
    pub fn new(provider: Arc<dyn WalletProvider>, config: GatewayConfig) -> Self {
        Self { provider, config }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn factory_address(&self) -> Address {
        self.config.factory_address
    }

    // ============================================
    // Reads
    // ============================================

    async fn call(
        &self,
        target: Address,
        function: &Function,
        args: &[Token],
    ) -> GatewayResult<Vec<Token>> {
        let data = function
            .encode_call(args)
            .map_err(|source| GatewayError::Encode {
                call: function.name,
                source,
            })?;

        let output = self
            .provider
            .eth_call(target, &data)
            .await
            .map_err(|source| GatewayError::ReadFailure {
                call: function.name,
                target,
                source,
            })?;

        function
            .decode_output(&output)
            .map_err(|source| GatewayError::Decode {
                call: function.name,
                source,
            })
    }

    /// Campaign addresses the factory has deployed
    pub async fn get_deployed_contracts(&self) -> GatewayResult<Vec<Address>> {
        let function = factory::deployed_contracts();
        let tokens = self.call(self.config.factory_address, &function, &[]).await?;
        contracts::address_list(tokens).map_err(|source| GatewayError::Decode {
            call: function.name,
            source,
        })
    }

    /// `getCampaignInfo()` for one campaign
    pub async fn get_campaign_details(&self, campaign: Address) -> GatewayResult<RawCampaignInfo> {
        let function = campaign::get_campaign_info();
        let tokens = self.call(campaign, &function, &[]).await?;
        RawCampaignInfo::from_tokens(tokens).map_err(|source| GatewayError::Decode {
            call: function.name,
            source,
        })
    }

    /// Number of milestones the campaign reports
    ///
    /// `None` when the contract does not expose a usable counter.
    pub async fn get_milestone_count(&self, campaign: Address) -> GatewayResult<Option<u64>> {
        let function = campaign::milestone_counter();
        let tokens = match self.call(campaign, &function, &[]).await {
            Ok(tokens) => tokens,
            Err(e) if e.is_revert() || matches!(e, GatewayError::Decode { .. }) => {
                tracing::debug!(campaign = %campaign, error = %e, "No milestone counter");
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        match contracts::single_uint(tokens) {
            Ok(count) if count.bits() <= 64 => Ok(Some(count.low_u64())),
            _ => Ok(None),
        }
    }

    /// One milestone slot, 0-based
    pub async fn get_milestone(&self, campaign: Address, index: u64) -> GatewayResult<RawMilestone> {
        let function = campaign::get_milestones();
        let tokens = self
            .call(campaign, &function, &[Token::Uint(U256::from(index))])
            .await?;
        RawMilestone::from_tokens(tokens).map_err(|source| GatewayError::Decode {
            call: function.name,
            source,
        })
    }

    /// All milestones of a campaign
    ///
    /// Reads exactly `milestoneCounter()` slots when the campaign reports a
    /// count. Otherwise probes the configured number of slots and stops at
    /// the first one that reverts.
    pub async fn get_milestones(&self, campaign: Address) -> GatewayResult<Vec<RawMilestone>> {
        if let Some(count) = self.get_milestone_count(campaign).await? {
            let mut milestones = Vec::with_capacity(count.min(64) as usize);
            for index in 0..count {
                milestones.push(self.get_milestone(campaign, index).await?);
            }
            return Ok(milestones);
        }

        let mut milestones = Vec::new();
        for index in 0..self.config.milestone_probe_slots {
            match self.get_milestone(campaign, index).await {
                Ok(milestone) => milestones.push(milestone),
                Err(e) if e.is_revert() => {
                    tracing::debug!(campaign = %campaign, index, "Milestone probe ended");
                    break;
                }
                Err(e) => return Err(e),
            }
        }
        Ok(milestones)
    }

    /// Donation totals for the given donor addresses
    pub async fn get_campaign_donors(
        &self,
        campaign: Address,
        donors: &[Address],
    ) -> GatewayResult<Vec<RawDonor>> {
        let function = campaign::donors();
        let mut result = Vec::with_capacity(donors.len());

        for &address in donors {
            let tokens = self
                .call(campaign, &function, &[Token::Address(address)])
                .await?;
            let amount = contracts::single_uint(tokens).map_err(|source| GatewayError::Decode {
                call: function.name,
                source,
            })?;
            result.push(RawDonor { address, amount });
        }

        Ok(result)
    }

    /// Ether held by the factory, wei
    pub async fn get_factory_balance(&self) -> GatewayResult<U256> {
        let function = factory::ether_balance();
        let tokens = self.call(self.config.factory_address, &function, &[]).await?;
        contracts::single_uint(tokens).map_err(|source| GatewayError::Decode {
            call: function.name,
            source,
        })
    }

    // ============================================
    // Writes
    // ============================================

    /// Deploy a new campaign through the factory
    pub async fn create_crowd_funding_contract(
        &self,
        signer: &Signer,
        funding_cid: &str,
        amount_to_raise: U256,
        duration: U256,
        value: U256,
    ) -> TxResult<TxReceipt> {
        let data = factory::create_crowd_funding_contract().encode_call(&[
            Token::String(funding_cid.to_string()),
            Token::Uint(amount_to_raise),
            Token::Uint(duration),
        ])?;
        self.transact(
            signer,
            "createCrowdFundingContract",
            self.config.factory_address,
            data,
            value,
            self.config.gas.create_campaign,
        )
        .await
    }

    pub async fn create_new_milestone(
        &self,
        signer: &Signer,
        campaign: Address,
        milestone_cid: &str,
        voting_period: U256,
        milestone_counter: U256,
    ) -> TxResult<TxReceipt> {
        let data = campaign::create_new_milestone().encode_call(&[
            Token::String(milestone_cid.to_string()),
            Token::Uint(voting_period),
            Token::Uint(milestone_counter),
        ])?;
        self.transact(
            signer,
            "createNewMilestone",
            campaign,
            data,
            U256::zero(),
            self.config.gas.create_milestone,
        )
        .await
    }

    /// Donate `amount` wei to a campaign
    pub async fn make_donation(
        &self,
        signer: &Signer,
        campaign: Address,
        amount: U256,
    ) -> TxResult<TxReceipt> {
        let data = campaign::make_donation().encode_call(&[])?;
        self.transact(
            signer,
            "makeDonation",
            campaign,
            data,
            amount,
            self.config.gas.donate,
        )
        .await
    }

    pub async fn vote_on_milestone(
        &self,
        signer: &Signer,
        campaign: Address,
        vote: bool,
        milestone_counter: U256,
    ) -> TxResult<TxReceipt> {
        let data = campaign::vote_on_milestone()
            .encode_call(&[Token::Bool(vote), Token::Uint(milestone_counter)])?;
        self.transact(
            signer,
            "voteOnMilestone",
            campaign,
            data,
            U256::zero(),
            self.config.gas.vote,
        )
        .await
    }

    pub async fn withdraw_milestone(
        &self,
        signer: &Signer,
        campaign: Address,
        milestone_counter: U256,
    ) -> TxResult<TxReceipt> {
        let data = campaign::withdraw_milestone().encode_call(&[Token::Uint(milestone_counter)])?;
        self.transact(
            signer,
            "withdrawMilestone",
            campaign,
            data,
            U256::zero(),
            self.config.gas.withdraw_milestone,
        )
        .await
    }

    /// Withdraw the factory's accumulated funds
    pub async fn withdraw_funds(&self, signer: &Signer) -> TxResult<TxReceipt> {
        let data = factory::withdraw_funds().encode_call(&[])?;
        self.transact(
            signer,
            "withdrawFunds",
            self.config.factory_address,
            data,
            U256::zero(),
            self.config.gas.withdraw_funds,
        )
        .await
    }

    async fn transact(
        &self,
        signer: &Signer,
        call: &'static str,
        to: Address,
        data: Vec<u8>,
        value: U256,
        gas: u64,
    ) -> TxResult<TxReceipt> {
        let request = TransactionRequest {
            from: signer.address(),
            to,
            data,
            value,
            gas,
        };

        let hash = signer
            .provider()
            .send_transaction(&request)
            .await
            .map_err(|e| {
                let err = TxError::from_provider(&e);
                tracing::error!(call, to = %to, kind = %err.kind, error = %e, "Transaction submission failed");
                err
            })?;

        tracing::info!(call, to = %to, hash = %hash, "Transaction submitted");

        let receipt = self.wait_for_confirmation(signer, &hash).await.map_err(|e| {
            tracing::error!(call, hash = %hash, error = %e, "Transaction failed");
            e
        })?;

        tracing::info!(
            call,
            hash = %hash,
            block = receipt.block_number,
            gas_used = receipt.gas_used,
            "Transaction confirmed"
        );
        Ok(receipt)
    }

    /// Poll for the receipt until the configured confirmations are observed
    async fn wait_for_confirmation(&self, signer: &Signer, hash: &str) -> TxResult<TxReceipt> {
        let provider = signer.provider();
        let interval = Duration::from_millis(self.config.receipt_poll_interval_ms.max(1));
        let deadline = Instant::now() + Duration::from_millis(self.config.receipt_timeout_ms);
        let confirmations = self.config.confirmations.max(1);

        loop {
            // The transaction is already out; a flaky poll only means "not yet"
            match provider.transaction_receipt(hash).await {
                Ok(Some(receipt)) => {
                    if !receipt.succeeded() {
                        return Err(TxError::new(
                            TxErrorKind::Reverted,
                            format!("transaction {} reverted in block {}", hash, receipt.block_number),
                        ));
                    }

                    match provider.block_number().await {
                        Ok(head) if head + 1 >= receipt.block_number + confirmations => {
                            return Ok(receipt);
                        }
                        Ok(_) => {}
                        Err(e) if e.is_transient() => {
                            tracing::debug!(hash, error = %e, "Block number poll failed, retrying");
                        }
                        Err(e) => return Err(e.into()),
                    }
                }
                Ok(None) => {}
                Err(e) if e.is_transient() => {
                    tracing::debug!(hash, error = %e, "Receipt poll failed, retrying");
                }
                Err(e) => return Err(e.into()),
            }

            if Instant::now() >= deadline {
                return Err(TxError::new(
                    TxErrorKind::Timeout,
                    format!(
                        "no confirmation for {} after {}ms",
                        hash, self.config.receipt_timeout_ms
                    ),
                ));
            }

            tokio::time::sleep(interval).await;
        }
    }
}
