//! Campaign Actions
//!
//! User-facing writes. Each validates its input, submits through the
//! gateway with the caller's signer, and refreshes the campaign list once
//! the transaction is confirmed. A refresh failure is reported next to the
//! receipt and never replaces it.

use crate::campaign::refresh::{CampaignRefresher, RefreshError, RefreshReport};
use crate::campaign::types::CampaignView;
use crate::chain::types::{Address, TxReceipt};
use crate::chain::units::{self, UnitError};
use crate::gateway::{ChainGateway, TxError};
use crate::store::{MirrorStore, StoreError};
use crate::wallet::Signer;
use primitive_types::U256;
use std::sync::Arc;
use thiserror::Error;

/// Content identifier used when none is given
pub const DEFAULT_CID: &str = "QmVRyzazgw98tG54hPYaJsC8ssBguUjrK4cmKLqQ8fKmHw";

/// Errors from campaign actions
#[derive(Error, Debug)]
pub enum ActionError {
    #[error("Invalid amount: {0}")]
    InvalidAmount(#[from] UnitError),

    #[error("Amount must be greater than zero")]
    ZeroAmount,

    #[error("Select approve or reject before voting")]
    VoteNotSelected,

    #[error("Content identifier must not be empty")]
    EmptyCid,

    #[error(transparent)]
    Transaction(#[from] TxError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Parameters for a new campaign, amounts in ether
#[derive(Debug, Clone, PartialEq)]
pub struct CreateCampaignRequest {
    pub funding_cid: String,
    /// Funding target, ether
    pub amount_to_raise: String,
    /// Value sent with the creation call, ether
    pub value: String,
    /// Campaign length, seconds
    pub duration: u64,
}

impl Default for CreateCampaignRequest {
    fn default() -> Self {
        Self {
            funding_cid: DEFAULT_CID.to_string(),
            amount_to_raise: "1".to_string(),
            value: "0.001".to_string(),
            duration: 600,
        }
    }
}

/// A confirmed write and the refresh that followed it
#[derive(Debug)]
pub struct ActionOutcome {
    pub receipt: TxReceipt,
    /// New campaign address, for campaign creation
    pub campaign_address: Option<Address>,
    pub refresh: Result<RefreshReport, RefreshError>,
}

/// Write-then-refresh operations on campaigns
pub struct CampaignActions {
    gateway: Arc<ChainGateway>,
    refresher: Arc<CampaignRefresher>,
    store: Arc<MirrorStore>,
}

fn require_cid(cid: &str) -> Result<(), ActionError> {
    if cid.trim().is_empty() {
        return Err(ActionError::EmptyCid);
    }
    Ok(())
}

fn positive_ether(amount: &str) -> Result<U256, ActionError> {
    let wei = units::parse_ether(amount)?;
    if wei.is_zero() {
        return Err(ActionError::ZeroAmount);
    }
    Ok(wei)
}

impl CampaignActions {
    pub fn new(
        gateway: Arc<ChainGateway>,
        refresher: Arc<CampaignRefresher>,
        store: Arc<MirrorStore>,
    ) -> Self {
        Self {
            gateway,
            refresher,
            store,
        }
    }

    async fn finish(&self, receipt: TxReceipt, campaign_address: Option<Address>) -> ActionOutcome {
        let refresh = self.refresher.refresh().await;
        if let Err(e) = &refresh {
            tracing::warn!(
                hash = %receipt.transaction_hash,
                error = %e,
                "Refresh after transaction failed"
            );
        }
        ActionOutcome {
            receipt,
            campaign_address,
            refresh,
        }
    }

    /// Deploy a campaign through the factory
    pub async fn create_campaign(
        &self,
        signer: &Signer,
        request: &CreateCampaignRequest,
    ) -> Result<ActionOutcome, ActionError> {
        require_cid(&request.funding_cid)?;
        let amount_to_raise = positive_ether(&request.amount_to_raise)?;
        let value = units::parse_ether(&request.value)?;

        let receipt = self
            .gateway
            .create_crowd_funding_contract(
                signer,
                &request.funding_cid,
                amount_to_raise,
                U256::from(request.duration),
                value,
            )
            .await?;

        let campaign_address = receipt.first_log_address();
        match campaign_address {
            Some(address) => tracing::info!(campaign = %address, "Created a new campaign"),
            None => tracing::warn!(
                hash = %receipt.transaction_hash,
                "Campaign created but the receipt has no logs"
            ),
        }

        Ok(self.finish(receipt, campaign_address).await)
    }

    /// Donate `amount` ether
    pub async fn donate(
        &self,
        signer: &Signer,
        campaign: Address,
        amount: &str,
    ) -> Result<ActionOutcome, ActionError> {
        let wei = positive_ether(amount)?;
        let receipt = self.gateway.make_donation(signer, campaign, wei).await?;
        Ok(self.finish(receipt, None).await)
    }

    pub async fn create_milestone(
        &self,
        signer: &Signer,
        campaign: Address,
        milestone_cid: &str,
        voting_period: u64,
        milestone_counter: u64,
    ) -> Result<ActionOutcome, ActionError> {
        require_cid(milestone_cid)?;
        let receipt = self
            .gateway
            .create_new_milestone(
                signer,
                campaign,
                milestone_cid,
                U256::from(voting_period),
                U256::from(milestone_counter),
            )
            .await?;
        Ok(self.finish(receipt, None).await)
    }

    /// Vote on a milestone; `None` means no choice was made
    pub async fn vote(
        &self,
        signer: &Signer,
        campaign: Address,
        vote: Option<bool>,
        milestone_counter: u64,
    ) -> Result<ActionOutcome, ActionError> {
        let vote = vote.ok_or(ActionError::VoteNotSelected)?;
        let receipt = self
            .gateway
            .vote_on_milestone(signer, campaign, vote, U256::from(milestone_counter))
            .await?;
        Ok(self.finish(receipt, None).await)
    }

    pub async fn withdraw_milestone(
        &self,
        signer: &Signer,
        campaign: Address,
        milestone_counter: u64,
    ) -> Result<ActionOutcome, ActionError> {
        let receipt = self
            .gateway
            .withdraw_milestone(signer, campaign, U256::from(milestone_counter))
            .await?;
        Ok(self.finish(receipt, None).await)
    }

    pub async fn withdraw_funds(&self, signer: &Signer) -> Result<ActionOutcome, ActionError> {
        let receipt = self.gateway.withdraw_funds(signer).await?;
        Ok(self.finish(receipt, None).await)
    }

    /// One campaign as last mirrored
    pub fn view_campaign_details(&self, address: Address) -> Result<Option<CampaignView>, ActionError> {
        Ok(self.store.get_object(address)?)
    }
}
