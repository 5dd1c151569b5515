//! Campaigns
//!
//! Everything above the gateway:
//!
//! - **types**: campaign, milestone and donor view models
//! - **builder**: raw contract reads → view models
//! - **refresh**: the refresh state machine over the in-memory list and the store
//! - **actions**: validated writes followed by a refresh

pub mod actions;
pub mod builder;
pub mod refresh;
pub mod types;

pub use actions::{ActionError, ActionOutcome, CampaignActions, CreateCampaignRequest, DEFAULT_CID};
pub use builder::{progress_value, remaining_time, ViewModelBuilder, DEFAULT_PLANNED_MILESTONES};
pub use refresh::{CampaignFailure, CampaignRefresher, RefreshError, RefreshPhase, RefreshReport};
pub use types::{CampaignView, DonorEntry, MilestoneStatus, MilestoneView, MilestoneVote};
