use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IntentId(pub String);

impl IntentId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl fmt::Display for IntentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Timeframe {
    Afternoon,
    Day,
    Morning,
    Night,
}

impl Timeframe {
    pub const ALL: [Timeframe; 4] = [Self::Afternoon, Self::Day, Self::Morning, Self::Night];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Afternoon => "afternoon",
            Self::Day => "day",
            Self::Morning => "morning",
            Self::Night => "night",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|timeframe| timeframe.as_str() == value)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Blockchain {
    Bitcoin,
    Eos,
    Ethereum,
    Hyperledger,
    Iota,
    Multichain,
    Stellar,
}

impl Blockchain {
    pub const ALL: [Blockchain; 7] = [
        Self::Bitcoin,
        Self::Eos,
        Self::Ethereum,
        Self::Hyperledger,
        Self::Iota,
        Self::Multichain,
        Self::Stellar,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bitcoin => "bitcoin",
            Self::Eos => "eos",
            Self::Ethereum => "ethereum",
            Self::Hyperledger => "hyperledger",
            Self::Iota => "iota",
            Self::Multichain => "multichain",
            Self::Stellar => "stellar",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|blockchain| blockchain.as_str() == value)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Profile {
    Cheapest,
    Fastest,
}

impl Profile {
    pub const ALL: [Profile; 2] = [Self::Cheapest, Self::Fastest];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cheapest => "cheapest",
            Self::Fastest => "fastest",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|profile| profile.as_str() == value)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Filter {
    Cheap,
    Fast,
    Popular,
    Private,
    Public,
    Stable,
}

impl Filter {
    pub const ALL: [Filter; 6] =
        [Self::Cheap, Self::Fast, Self::Popular, Self::Private, Self::Public, Self::Stable];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cheap => "cheap",
            Self::Fast => "fast",
            Self::Popular => "popular",
            Self::Private => "private",
            Self::Public => "public",
            Self::Stable => "stable",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|filter| filter.as_str() == value)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Modifier {
    Encryption,
    Redundancy,
    Splitting,
}

impl Modifier {
    pub const ALL: [Modifier; 3] = [Self::Encryption, Self::Redundancy, Self::Splitting];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Encryption => "encryption",
            Self::Redundancy => "redundancy",
            Self::Splitting => "splitting",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|modifier| modifier.as_str() == value)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Interval {
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl Interval {
    pub const ALL: [Interval; 4] = [Self::Daily, Self::Weekly, Self::Monthly, Self::Yearly];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
            Self::Yearly => "yearly",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|interval| interval.as_str() == value)
    }
}

/// Currencies accepted in a cost clause. Tokens are lower-case, codes upper-case.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    Chf,
    Eur,
    Usd,
}

impl Currency {
    pub const ALL: [Currency; 3] = [Self::Chf, Self::Eur, Self::Usd];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Chf => "chf",
            Self::Eur => "eur",
            Self::Usd => "usd",
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Chf => "CHF",
            Self::Eur => "EUR",
            Self::Usd => "USD",
        }
    }

    /// Accepts either the lower-case token or the upper-case code.
    pub fn parse(value: &str) -> Option<Self> {
        let normalized = value.trim().to_ascii_lowercase();
        Self::ALL.into_iter().find(|currency| currency.as_str() == normalized)
    }
}

macro_rules! display_as_str {
    ($($name:ty),+ $(,)?) => {
        $(
            impl fmt::Display for $name {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    f.write_str(self.as_str())
                }
            }
        )+
    };
}

display_as_str!(Timeframe, Blockchain, Profile, Filter, Modifier, Interval);

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// High-level selection intent accumulated while a sentence is parsed.
///
/// Users keep their encounter order so that translated policies come out in the
/// same order they were named, but two intents naming the same users in a
/// different order are equal.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Intent {
    pub users: Vec<String>,
    pub timeframe: Option<Timeframe>,
    pub blockchain: Option<Blockchain>,
    pub profile: Option<Profile>,
    pub filters: BTreeSet<Filter>,
    pub whitelist: BTreeSet<Blockchain>,
    pub blacklist: BTreeSet<Blockchain>,
    pub modifiers: BTreeSet<Modifier>,
    pub interval: Option<Interval>,
    pub currency: Option<Currency>,
    pub threshold: Option<Decimal>,
}

impl Intent {
    pub fn add_user(&mut self, user: impl Into<String>) {
        let user = user.into();
        if !self.users.contains(&user) {
            self.users.push(user);
        }
    }

    pub fn user_set(&self) -> BTreeSet<&str> {
        self.users.iter().map(String::as_str).collect()
    }

    pub fn is_default_policy(&self) -> bool {
        self.interval.is_none()
    }

    /// Renders the canonical sentence for this intent.
    ///
    /// Parsing the rendered text of a parsed intent yields an equal intent.
    pub fn render(&self) -> String {
        let mut parts = Vec::new();

        if !self.users.is_empty() {
            parts.push(format!("for {}", join_words(self.users.iter().map(String::as_str))));
        }
        if let Some(timeframe) = self.timeframe {
            parts.push(format!("in the {timeframe}"));
        }

        if let Some(blockchain) = self.blockchain {
            parts.push(format!("select {blockchain}"));
        } else if let Some(profile) = self.profile {
            let mut select = format!("select the {profile}");
            if !self.filters.is_empty() {
                select.push(' ');
                select.push_str(&join_words(self.filters.iter().map(Filter::as_str)));
            }
            select.push_str(" blockchain");
            parts.push(select);
        }

        if !self.whitelist.is_empty() {
            parts.push(format!("from {}", join_words(self.whitelist.iter().map(Blockchain::as_str))));
        } else if !self.blacklist.is_empty() {
            parts.push(format!(
                "except {}",
                join_words(self.blacklist.iter().map(Blockchain::as_str))
            ));
        }

        if !self.modifiers.is_empty() {
            parts.push(format!("with {}", join_words(self.modifiers.iter().map(Modifier::as_str))));
        }

        match self.interval {
            Some(interval) => {
                let mut cost = format!("until the {interval} costs reach");
                if let Some(currency) = self.currency {
                    cost.push(' ');
                    cost.push_str(currency.code());
                }
                let threshold = self.threshold.unwrap_or(Decimal::ZERO).normalize();
                cost.push_str(&format!(" {threshold}"));
                parts.push(cost);
            }
            None => parts.push("as default".to_string()),
        }

        parts.join(" ")
    }
}

impl PartialEq for Intent {
    fn eq(&self, other: &Self) -> bool {
        self.user_set() == other.user_set()
            && self.timeframe == other.timeframe
            && self.blockchain == other.blockchain
            && self.profile == other.profile
            && self.filters == other.filters
            && self.whitelist == other.whitelist
            && self.blacklist == other.blacklist
            && self.modifiers == other.modifiers
            && self.interval == other.interval
            && self.currency == other.currency
            && self.threshold == other.threshold
    }
}

/// Joins words as `a`, `a and b`, or `a, b and c`.
pub fn join_words<'a>(words: impl IntoIterator<Item = &'a str>) -> String {
    let words: Vec<&str> = words.into_iter().collect();
    match words.split_last() {
        None => String::new(),
        Some((last, [])) => (*last).to_string(),
        Some((last, rest)) => format!("{} and {last}", rest.join(", ")),
    }
}

/// An intent as persisted: the sentence the owner entered plus bookkeeping.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentRecord {
    pub id: IntentId,
    pub owner: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
