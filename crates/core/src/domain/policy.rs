use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::intent::{Blockchain, Currency, IntentId, Interval, Profile};

/// All thresholds are stored in this currency.
pub const CANONICAL_CURRENCY: Currency = Currency::Usd;

pub const DEFAULT_MIN_TX_RATE: u32 = 4;
pub const DEFAULT_MAX_BLOCK_TIME: u32 = 600;
pub const DEFAULT_MIN_DATA_SIZE: u32 = 20;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PolicyRecordId(pub String);

impl PolicyRecordId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl fmt::Display for PolicyRecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier handed out by the enforcement collaborator. Empty when enforcement is disabled.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExternalPolicyId(pub String);

impl ExternalPolicyId {
    pub fn is_assigned(&self) -> bool {
        !self.0.trim().is_empty()
    }
}

impl fmt::Display for ExternalPolicyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CostProfile {
    #[default]
    Economic,
    Performance,
}

impl CostProfile {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Economic => "economic",
            Self::Performance => "performance",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "economic" => Some(Self::Economic),
            "performance" => Some(Self::Performance),
            _ => None,
        }
    }
}

impl From<Profile> for CostProfile {
    fn from(profile: Profile) -> Self {
        match profile {
            Profile::Cheapest => Self::Economic,
            Profile::Fastest => Self::Performance,
        }
    }
}

/// Named points in the day that bound a policy's timeframe.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeMarker {
    #[default]
    Default,
    DayStart,
    AfternoonStart,
    NightStart,
}

impl TimeMarker {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::DayStart => "day_start",
            Self::AfternoonStart => "afternoon_start",
            Self::NightStart => "night_start",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "default" => Some(Self::Default),
            "day_start" => Some(Self::DayStart),
            "afternoon_start" => Some(Self::AfternoonStart),
            "night_start" => Some(Self::NightStart),
            _ => None,
        }
    }
}

/// Clock times behind the time markers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimeWindows {
    pub day_start: NaiveTime,
    pub afternoon_start: NaiveTime,
    pub night_start: NaiveTime,
}

impl Default for TimeWindows {
    fn default() -> Self {
        Self {
            day_start: NaiveTime::from_hms_opt(6, 0, 0).unwrap_or(NaiveTime::MIN),
            afternoon_start: NaiveTime::from_hms_opt(12, 0, 0).unwrap_or(NaiveTime::MIN),
            night_start: NaiveTime::from_hms_opt(18, 0, 0).unwrap_or(NaiveTime::MIN),
        }
    }
}

impl TimeWindows {
    pub fn resolve(&self, marker: TimeMarker) -> NaiveTime {
        match marker {
            TimeMarker::Default => NaiveTime::MIN,
            TimeMarker::DayStart => self.day_start,
            TimeMarker::AfternoonStart => self.afternoon_start,
            TimeMarker::NightStart => self.night_start,
        }
    }

    /// `HH:MM` rendering used on the enforcement wire format.
    pub fn clock(&self, marker: TimeMarker) -> String {
        self.resolve(marker).format("%H:%M").to_string()
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyInterval {
    #[default]
    Default,
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl PolicyInterval {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
            Self::Yearly => "yearly",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "default" => Some(Self::Default),
            "daily" => Some(Self::Daily),
            "weekly" => Some(Self::Weekly),
            "monthly" => Some(Self::Monthly),
            "yearly" => Some(Self::Yearly),
            _ => None,
        }
    }
}

impl From<Interval> for PolicyInterval {
    fn from(interval: Interval) -> Self {
        match interval {
            Interval::Daily => Self::Daily,
            Interval::Weekly => Self::Weekly,
            Interval::Monthly => Self::Monthly,
            Interval::Yearly => Self::Yearly,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockchainType {
    #[default]
    Indifferent,
    Private,
    Public,
}

impl BlockchainType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Indifferent => "indifferent",
            Self::Private => "private",
            Self::Public => "public",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "indifferent" => Some(Self::Indifferent),
            "private" => Some(Self::Private),
            "public" => Some(Self::Public),
            _ => None,
        }
    }
}

/// Low-level, per-user selection criteria.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Policy {
    pub user: String,
    pub cost_profile: CostProfile,
    pub timeframe_start: TimeMarker,
    pub timeframe_end: TimeMarker,
    pub interval: PolicyInterval,
    pub currency: Currency,
    pub threshold: Decimal,
    pub split_txs: bool,
    /// Empty means any blockchain may be selected.
    pub blockchain_pool: BTreeSet<Blockchain>,
    pub blockchain_type: BlockchainType,
    pub min_tx_rate: u32,
    pub max_block_time: u32,
    pub min_data_size: u32,
    pub max_tx_cost: Decimal,
    pub min_popularity: f64,
    pub min_stability: f64,
    pub turing_complete: bool,
    pub encryption: bool,
    pub redundancy: bool,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            user: String::new(),
            cost_profile: CostProfile::Economic,
            timeframe_start: TimeMarker::Default,
            timeframe_end: TimeMarker::Default,
            interval: PolicyInterval::Default,
            currency: CANONICAL_CURRENCY,
            threshold: Decimal::ZERO,
            split_txs: false,
            blockchain_pool: BTreeSet::new(),
            blockchain_type: BlockchainType::Indifferent,
            min_tx_rate: DEFAULT_MIN_TX_RATE,
            max_block_time: DEFAULT_MAX_BLOCK_TIME,
            min_data_size: DEFAULT_MIN_DATA_SIZE,
            max_tx_cost: Decimal::ZERO,
            min_popularity: 0.0,
            min_stability: 0.0,
            turing_complete: false,
            encryption: false,
            redundancy: false,
        }
    }
}

impl Policy {
    pub fn is_default_policy(&self) -> bool {
        self.interval == PolicyInterval::Default
    }

    /// Baseline policy the enforcement side expects to exist for every user
    /// before any cost-bounded policy is stored for them.
    pub fn baseline_for(user: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            cost_profile: CostProfile::Performance,
            ..Self::default()
        }
    }
}

/// A translated policy as stored for one intent.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PolicyRecord {
    pub id: PolicyRecordId,
    pub intent_id: IntentId,
    pub external_id: ExternalPolicyId,
    pub policy: Policy,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PolicyRecord {
    pub fn new(
        intent_id: IntentId,
        external_id: ExternalPolicyId,
        policy: Policy,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: PolicyRecordId::generate(),
            intent_id,
            external_id,
            policy,
            created_at: now,
            updated_at: now,
        }
    }
}
