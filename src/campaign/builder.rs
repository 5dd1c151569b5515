//! View Model Builder
//!
//! Turns raw contract reads into [`CampaignView`]s. Durations are measured
//! against the latest block timestamp, fetched fresh for every deadline.

use crate::campaign::types::{CampaignView, DonorEntry, MilestoneStatus, MilestoneView, MilestoneVote};
use crate::chain::contracts::{RawCampaignInfo, RawDonor, RawMilestone};
use crate::chain::types::Address;
use crate::chain::units::{eth_label, saturating_u64};
use crate::wallet::{ChainClock, WalletError};
use std::sync::Arc;

/// Milestones a campaign is expected to complete
pub const DEFAULT_PLANNED_MILESTONES: u64 = 3;

/// Seconds left until `deadline`, never negative
pub fn remaining_time(deadline: u64, now: u64) -> u64 {
    deadline.saturating_sub(now)
}

/// Percentage of planned milestones completed, rounded to one decimal
pub fn progress_value(completed: u64, planned: u64) -> f64 {
    if planned == 0 {
        return 0.0;
    }
    let percent = completed as f64 / planned as f64 * 100.0;
    (percent * 10.0).round() / 10.0
}

/// Builds campaign view models
pub struct ViewModelBuilder {
    clock: Arc<dyn ChainClock>,
    planned_milestones: u64,
}

impl ViewModelBuilder {
    pub fn new(clock: Arc<dyn ChainClock>, planned_milestones: u64) -> Self {
        Self {
            clock,
            planned_milestones,
        }
    }

    pub fn planned_milestones(&self) -> u64 {
        self.planned_milestones
    }

    /// Seconds left until `deadline` by the chain's clock
    pub async fn remaining(&self, deadline: u64) -> Result<u64, WalletError> {
        let now = self.clock.now().await?;
        Ok(remaining_time(deadline, now))
    }

    /// Milestone views labelled "Milestone 1", "Milestone 2", ...
    pub async fn build_milestones(
        &self,
        milestones: Vec<RawMilestone>,
    ) -> Result<Vec<MilestoneView>, WalletError> {
        let mut views = Vec::with_capacity(milestones.len());

        for (i, milestone) in milestones.into_iter().enumerate() {
            let voting_period = saturating_u64(milestone.voting_period);
            views.push(MilestoneView {
                label: format!("Milestone {}", i + 1),
                status: MilestoneStatus::derive(milestone.voting_period, milestone.status),
                remaining_voting_time: self.remaining(voting_period).await?,
                milestone_cid: milestone.milestone_cid,
                approved: milestone.approved,
                voting_period,
                votes: milestone
                    .votes
                    .into_iter()
                    .map(|v| MilestoneVote {
                        donor: v.donor,
                        vote: v.approve,
                    })
                    .collect(),
            });
        }

        Ok(views)
    }

    pub fn build_donors(&self, donors: Vec<RawDonor>) -> Vec<DonorEntry> {
        donors
            .into_iter()
            .map(|d| DonorEntry {
                address: d.address,
                amount: eth_label(d.amount),
            })
            .collect()
    }

    /// Assemble the full view model for one campaign
    pub async fn build(
        &self,
        address: Address,
        info: RawCampaignInfo,
        milestones: Vec<RawMilestone>,
        donors: Vec<RawDonor>,
    ) -> Result<CampaignView, WalletError> {
        let deadline = saturating_u64(info.duration);
        let completed = saturating_u64(info.completed_milestones);

        Ok(CampaignView {
            campaign_address: address,
            campaign_owner: info.owner,
            campaign_duration: deadline,
            remaining_duration: self.remaining(deadline).await?,
            campaign_target_amount: eth_label(info.target_amount),
            funding_cid: info.funding_cid,
            no_of_donors: saturating_u64(info.no_of_donors),
            received_donation: eth_label(info.received_donation),
            current_milestone: completed,
            has_campaign_ended: info.has_campaign_ended,
            balance: eth_label(info.balance),
            progress_value: progress_value(completed, self.planned_milestones),
            donors: info.donors,
            milestones: self.build_milestones(milestones).await?,
            donors_list: self.build_donors(donors),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::contracts::RawVote;
    use async_trait::async_trait;
    use primitive_types::U256;
    use std::sync::atomic::{AtomicU64, Ordering};

    /// Clock that advances one second per read
    struct TickingClock(AtomicU64);

    #[async_trait]
    impl ChainClock for TickingClock {
        async fn now(&self) -> Result<u64, WalletError> {
            Ok(self.0.fetch_add(1, Ordering::SeqCst))
        }
    }

    struct NoClock;

    #[async_trait]
    impl ChainClock for NoClock {
        async fn now(&self) -> Result<u64, WalletError> {
            Err(WalletError::ProviderUnavailable)
        }
    }

    fn info() -> RawCampaignInfo {
        RawCampaignInfo {
            owner: Address([0x01; 20]),
            duration: U256::from(1_000u64),
            target_amount: U256::exp10(18),
            funding_cid: "QmCid".to_string(),
            no_of_donors: U256::one(),
            received_donation: U256::from(5u64) * U256::exp10(17),
            has_campaign_ended: false,
            completed_milestones: U256::from(2u64),
            balance: U256::zero(),
            donors: vec![Address([0x02; 20])],
        }
    }

    #[test]
    fn test_remaining_time() {
        assert_eq!(remaining_time(100, 40), 60);
        assert_eq!(remaining_time(100, 100), 0);
        assert_eq!(remaining_time(100, 400), 0);
    }

    #[test]
    fn test_progress_value() {
        assert_eq!(progress_value(0, 3), 0.0);
        assert_eq!(progress_value(1, 3), 33.3);
        assert_eq!(progress_value(2, 3), 66.7);
        assert_eq!(progress_value(3, 3), 100.0);
        assert_eq!(progress_value(2, 0), 0.0);
    }

    #[tokio::test]
    async fn test_build_reads_clock_per_deadline() {
        let builder = ViewModelBuilder::new(Arc::new(TickingClock(AtomicU64::new(900))), 3);
        let milestones = vec![
            RawMilestone {
                milestone_cid: "QmOne".to_string(),
                approved: true,
                voting_period: U256::from(950u64),
                status: U256::zero(),
                votes: vec![RawVote {
                    donor: Address([0x02; 20]),
                    approve: false,
                }],
            },
            RawMilestone {
                milestone_cid: "QmTwo".to_string(),
                approved: false,
                voting_period: U256::zero(),
                status: U256::from(2u64),
                votes: vec![],
            },
        ];
        let donors = vec![RawDonor {
            address: Address([0x02; 20]),
            amount: U256::from(5u64) * U256::exp10(17),
        }];

        let view = builder
            .build(Address([0xaa; 20]), info(), milestones, donors)
            .await
            .unwrap();

        assert_eq!(view.remaining_duration, 100);
        assert_eq!(view.campaign_target_amount, "1.0 ETH");
        assert_eq!(view.received_donation, "0.5 ETH");
        assert_eq!(view.progress_value, 66.7);
        assert_eq!(view.current_milestone, 2);

        assert_eq!(view.milestones[0].label, "Milestone 1");
        assert_eq!(view.milestones[0].status, MilestoneStatus::Approved);
        // Second read of the clock
        assert_eq!(view.milestones[0].remaining_voting_time, 49);
        assert!(!view.milestones[0].votes[0].vote);

        assert_eq!(view.milestones[1].label, "Milestone 2");
        assert_eq!(view.milestones[1].status, MilestoneStatus::Pending);
        assert_eq!(view.milestones[1].remaining_voting_time, 0);

        assert_eq!(view.donors_list[0].amount, "0.5 ETH");
    }

    #[tokio::test]
    async fn test_build_fails_without_clock() {
        let builder = ViewModelBuilder::new(Arc::new(NoClock), DEFAULT_PLANNED_MILESTONES);
        let err = builder
            .build(Address([0xaa; 20]), info(), vec![], vec![])
            .await
            .unwrap_err();
        assert!(matches!(err, WalletError::ProviderUnavailable));
    }
}
