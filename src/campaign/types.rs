//! Campaign view models
//!
//! Human-unit, named-field renditions of the raw contract tuples. These are
//! what the in-memory list holds, what the mirror store persists and what
//! the CLI renders.

use crate::chain::types::Address;
use primitive_types::U256;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One campaign as displayed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignView {
    /// Stable identity across refreshes
    pub campaign_address: Address,
    pub campaign_owner: Address,
    /// Campaign deadline, unix seconds
    pub campaign_duration: u64,
    /// Seconds until the deadline at build time
    pub remaining_duration: u64,
    pub campaign_target_amount: String,
    #[serde(rename = "fundingCID")]
    pub funding_cid: String,
    pub no_of_donors: u64,
    pub received_donation: String,
    /// Completed milestones as reported by the contract
    pub current_milestone: u64,
    pub has_campaign_ended: bool,
    pub balance: String,
    /// Percentage of planned milestones completed, one decimal
    pub progress_value: f64,
    pub donors: Vec<Address>,
    pub milestones: Vec<MilestoneView>,
    pub donors_list: Vec<DonorEntry>,
}

impl CampaignView {
    /// Whether `account` has donated to this campaign
    pub fn is_donor(&self, account: Address) -> bool {
        self.donors.contains(&account)
    }

    /// Whether `account` owns this campaign
    pub fn is_owner(&self, account: Address) -> bool {
        self.campaign_owner == account
    }
}

/// Derived milestone state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MilestoneStatus {
    Approved,
    Declined,
    Pending,
    #[serde(rename = "--")]
    Unknown,
}

impl MilestoneStatus {
    /// Status from the voting deadline and the contract's status code
    ///
    /// Rules are checked in order; the first match wins.
    pub fn derive(voting_period: U256, raw_status: U256) -> Self {
        if !voting_period.is_zero() && raw_status.is_zero() {
            MilestoneStatus::Approved
        } else if raw_status == U256::one() {
            MilestoneStatus::Declined
        } else if raw_status == U256::from(2u8) {
            MilestoneStatus::Pending
        } else {
            MilestoneStatus::Unknown
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            MilestoneStatus::Approved => "Approved",
            MilestoneStatus::Declined => "Declined",
            MilestoneStatus::Pending => "Pending",
            MilestoneStatus::Unknown => "--",
        }
    }
}

impl fmt::Display for MilestoneStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A donor's vote on a milestone
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MilestoneVote {
    pub donor: Address,
    pub vote: bool,
}

/// One milestone as displayed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MilestoneView {
    /// "Milestone N", N from 1
    pub label: String,
    #[serde(rename = "milestoneCID")]
    pub milestone_cid: String,
    pub approved: bool,
    /// Voting deadline, unix seconds
    pub voting_period: u64,
    pub remaining_voting_time: u64,
    pub status: MilestoneStatus,
    pub votes: Vec<MilestoneVote>,
}

/// A donor and their total donation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DonorEntry {
    pub address: Address,
    /// Human units, e.g. "0.5 ETH"
    pub amount: String,
}
