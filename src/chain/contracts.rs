//! Crowdfunding contract interfaces
//!
//! Function definitions for the factory contract and the per-campaign
//! contract, plus the raw (positional, base-unit) return types.

use crate::chain::abi::{AbiError, AbiResult, Function, ParamType, Token};
use crate::chain::types::Address;
use primitive_types::U256;

fn uint() -> ParamType {
    ParamType::Uint(256)
}

fn address_array() -> ParamType {
    ParamType::Array(Box::new(ParamType::Address))
}

/// Factory contract: deploys campaigns and tracks them
pub mod factory {
    use super::*;

    pub fn deployed_contracts() -> Function {
        Function::new("deployedContracts", vec![], vec![address_array()])
    }

    /// `createCrowdFundingContract(fundingCID, amountToRaise, duration) payable`
    pub fn create_crowd_funding_contract() -> Function {
        Function::new(
            "createCrowdFundingContract",
            vec![ParamType::String, uint(), uint()],
            vec![],
        )
    }

    pub fn withdraw_funds() -> Function {
        Function::new("withdrawFunds", vec![], vec![])
    }

    pub fn ether_balance() -> Function {
        Function::new("etherBalance", vec![], vec![uint()])
    }
}

/// Per-campaign contract
pub mod campaign {
    use super::*;

    pub fn get_campaign_info() -> Function {
        Function::new(
            "getCampaignInfo",
            vec![],
            vec![
                ParamType::Address,
                uint(),
                uint(),
                ParamType::String,
                uint(),
                uint(),
                ParamType::Bool,
                uint(),
                uint(),
                address_array(),
            ],
        )
    }

    /// `createNewMilestone(milestoneCID, votingPeriod, milestoneCounter)`
    pub fn create_new_milestone() -> Function {
        Function::new(
            "createNewMilestone",
            vec![ParamType::String, uint(), uint()],
            vec![],
        )
    }

    pub fn make_donation() -> Function {
        Function::new("makeDonation", vec![], vec![])
    }

    /// `voteOnMilestone(vote, milestoneCounter)`
    pub fn vote_on_milestone() -> Function {
        Function::new("voteOnMilestone", vec![ParamType::Bool, uint()], vec![])
    }

    pub fn withdraw_milestone() -> Function {
        Function::new("withdrawMilestone", vec![uint()], vec![])
    }

    pub fn milestone_type() -> ParamType {
        let vote = ParamType::Tuple(vec![ParamType::Address, ParamType::Bool]);
        ParamType::Tuple(vec![
            ParamType::String,
            ParamType::Bool,
            uint(),
            ParamType::Uint(8),
            ParamType::Array(Box::new(vote)),
        ])
    }

    /// `getMilestones(index)` returns one milestone struct
    pub fn get_milestones() -> Function {
        Function::new("getMilestones", vec![uint()], vec![milestone_type()])
    }

    pub fn milestone_counter() -> Function {
        Function::new("milestoneCounter", vec![], vec![uint()])
    }

    /// Donation total for one donor address
    pub fn donors() -> Function {
        Function::new("donors", vec![ParamType::Address], vec![uint()])
    }
}

fn shape(what: &str) -> AbiError {
    AbiError::Shape(what.to_string())
}

fn next<I: Iterator<Item = Token>>(tokens: &mut I, what: &str) -> AbiResult<Token> {
    tokens.next().ok_or_else(|| shape(what))
}

fn next_uint<I: Iterator<Item = Token>>(tokens: &mut I, what: &str) -> AbiResult<U256> {
    next(tokens, what)?.into_uint().ok_or_else(|| shape(what))
}

fn next_address<I: Iterator<Item = Token>>(tokens: &mut I, what: &str) -> AbiResult<Address> {
    next(tokens, what)?.into_address().ok_or_else(|| shape(what))
}

fn next_bool<I: Iterator<Item = Token>>(tokens: &mut I, what: &str) -> AbiResult<bool> {
    next(tokens, what)?.into_bool().ok_or_else(|| shape(what))
}

fn next_string<I: Iterator<Item = Token>>(tokens: &mut I, what: &str) -> AbiResult<String> {
    next(tokens, what)?.into_string().ok_or_else(|| shape(what))
}

fn next_array<I: Iterator<Item = Token>>(tokens: &mut I, what: &str) -> AbiResult<Vec<Token>> {
    next(tokens, what)?.into_array().ok_or_else(|| shape(what))
}

/// Single `uint256` return value
pub fn single_uint(tokens: Vec<Token>) -> AbiResult<U256> {
    next_uint(&mut tokens.into_iter(), "uint256")
}

/// Single `address[]` return value
pub fn address_list(tokens: Vec<Token>) -> AbiResult<Vec<Address>> {
    next_array(&mut tokens.into_iter(), "address[]")?
        .into_iter()
        .map(|t| t.into_address().ok_or_else(|| shape("address[] element")))
        .collect()
}

/// `getCampaignInfo()` as returned by the contract
#[derive(Debug, Clone, PartialEq)]
pub struct RawCampaignInfo {
    pub owner: Address,
    /// Campaign deadline, unix seconds
    pub duration: U256,
    pub target_amount: U256,
    pub funding_cid: String,
    pub no_of_donors: U256,
    pub received_donation: U256,
    pub has_campaign_ended: bool,
    pub completed_milestones: U256,
    pub balance: U256,
    pub donors: Vec<Address>,
}

impl RawCampaignInfo {
    pub fn from_tokens(tokens: Vec<Token>) -> AbiResult<Self> {
        let mut it = tokens.into_iter();
        Ok(Self {
            owner: next_address(&mut it, "owner")?,
            duration: next_uint(&mut it, "duration")?,
            target_amount: next_uint(&mut it, "targetAmount")?,
            funding_cid: next_string(&mut it, "fundingCID")?,
            no_of_donors: next_uint(&mut it, "noOfDonors")?,
            received_donation: next_uint(&mut it, "receivedDonation")?,
            has_campaign_ended: next_bool(&mut it, "hasCampaignEnded")?,
            completed_milestones: next_uint(&mut it, "completedMilestones")?,
            balance: next_uint(&mut it, "balance")?,
            donors: address_list(vec![next(&mut it, "donors")?])?,
        })
    }

    pub fn to_tokens(&self) -> Vec<Token> {
        vec![
            Token::Address(self.owner),
            Token::Uint(self.duration),
            Token::Uint(self.target_amount),
            Token::String(self.funding_cid.clone()),
            Token::Uint(self.no_of_donors),
            Token::Uint(self.received_donation),
            Token::Bool(self.has_campaign_ended),
            Token::Uint(self.completed_milestones),
            Token::Uint(self.balance),
            Token::Array(self.donors.iter().copied().map(Token::Address).collect()),
        ]
    }
}

/// One donor's vote on a milestone
#[derive(Debug, Clone, PartialEq)]
pub struct RawVote {
    pub donor: Address,
    pub approve: bool,
}

/// `getMilestones(index)` as returned by the contract
#[derive(Debug, Clone, PartialEq)]
pub struct RawMilestone {
    pub milestone_cid: String,
    pub approved: bool,
    /// Voting deadline, unix seconds
    pub voting_period: U256,
    pub status: U256,
    pub votes: Vec<RawVote>,
}

impl RawMilestone {
    pub fn from_tokens(tokens: Vec<Token>) -> AbiResult<Self> {
        let fields = next(&mut tokens.into_iter(), "milestone")?
            .into_tuple()
            .ok_or_else(|| shape("milestone tuple"))?;

        let mut it = fields.into_iter();
        let milestone_cid = next_string(&mut it, "milestoneCID")?;
        let approved = next_bool(&mut it, "approved")?;
        let voting_period = next_uint(&mut it, "votingPeriod")?;
        let status = next_uint(&mut it, "status")?;
        let votes = next_array(&mut it, "votes")?
            .into_iter()
            .map(|vote| {
                let mut pair = vote.into_tuple().ok_or_else(|| shape("vote"))?.into_iter();
                Ok(RawVote {
                    donor: next_address(&mut pair, "vote.donor")?,
                    approve: next_bool(&mut pair, "vote.vote")?,
                })
            })
            .collect::<AbiResult<Vec<_>>>()?;

        Ok(Self {
            milestone_cid,
            approved,
            voting_period,
            status,
            votes,
        })
    }

    pub fn to_tokens(&self) -> Vec<Token> {
        let votes = self
            .votes
            .iter()
            .map(|v| Token::Tuple(vec![Token::Address(v.donor), Token::Bool(v.approve)]))
            .collect();

        vec![Token::Tuple(vec![
            Token::String(self.milestone_cid.clone()),
            Token::Bool(self.approved),
            Token::Uint(self.voting_period),
            Token::Uint(self.status),
            Token::Array(votes),
        ])]
    }
}

/// A donor and the total they have given, base units
#[derive(Debug, Clone, PartialEq)]
pub struct RawDonor {
    pub address: Address,
    pub amount: U256,
}
