use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};

use chainpolicy_core::domain::intent::Blockchain;
use chainpolicy_core::domain::policy::{Policy, TimeWindows};

/// Exchange ticker the PDP uses to name a blockchain.
pub fn ticker(blockchain: Blockchain) -> &'static str {
    match blockchain {
        Blockchain::Bitcoin => "BTC",
        Blockchain::Ethereum => "ETH",
        Blockchain::Eos => "EOS",
        Blockchain::Iota => "MIOTA",
        Blockchain::Hyperledger => "HYP",
        Blockchain::Multichain => "MLC",
        Blockchain::Stellar => "XLM",
    }
}

fn flag(value: bool) -> String {
    if value { "true" } else { "false" }.to_owned()
}

/// JSON body accepted by `POST /api/policies`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PolicyPayload {
    #[serde(rename = "preferredBC")]
    pub preferred_bc: Vec<String>,
    pub currency: String,
    #[serde(rename = "bcTuringComplete")]
    pub bc_turing_complete: String,
    pub split: String,
    #[serde(rename = "timeFrameStart")]
    pub time_frame_start: String,
    #[serde(rename = "timeFrameEnd")]
    pub time_frame_end: String,
    #[serde(rename = "costProfile")]
    pub cost_profile: String,
    #[serde(rename = "_id")]
    pub id: String,
    pub username: String,
    pub cost: f64,
    #[serde(rename = "bcType")]
    pub bc_type: String,
    pub interval: String,
    #[serde(rename = "bcTps")]
    pub bc_tps: u32,
    #[serde(rename = "bcBlockTime")]
    pub bc_block_time: u32,
    #[serde(rename = "bcDataSize")]
    pub bc_data_size: u32,
}

impl PolicyPayload {
    /// `external_id` is empty when the policy is new to the PDP.
    pub fn from_policy(policy: &Policy, external_id: &str, windows: &TimeWindows) -> Self {
        Self {
            preferred_bc: policy
                .blockchain_pool
                .iter()
                .map(|blockchain| ticker(*blockchain).to_owned())
                .collect(),
            currency: policy.currency.code().to_owned(),
            bc_turing_complete: flag(policy.turing_complete),
            split: flag(policy.split_txs),
            time_frame_start: windows.clock(policy.timeframe_start),
            time_frame_end: windows.clock(policy.timeframe_end),
            cost_profile: policy.cost_profile.as_str().to_owned(),
            id: external_id.to_owned(),
            username: policy.user.clone(),
            cost: policy.threshold.to_f64().unwrap_or_default(),
            bc_type: policy.blockchain_type.as_str().to_owned(),
            interval: policy.interval.as_str().to_owned(),
            bc_tps: policy.min_tx_rate,
            bc_block_time: policy.max_block_time,
            bc_data_size: policy.min_data_size,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct SavedPolicyResponse {
    pub policy: SavedPolicy,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SavedPolicy {
    #[serde(rename = "_id")]
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ErrorResponse {
    pub message: Option<String>,
}
