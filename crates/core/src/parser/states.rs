use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use ParserState as S;

/// One position in the intent grammar.
///
/// Keyword positions carry a static transition table. `User` and `Threshold`
/// take any token and leave acceptance to their validation hook. `Error` is the
/// absorbing sink entered after the first failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParserState {
    Start,
    User,
    AfterUser,
    TimeframeArticle,
    Timeframe,
    Select,
    Selection,
    AfterBlockchain,
    Profile,
    ProfileFilters,
    Filter,
    AfterFilter,
    AfterProfile,
    Whitelist,
    AfterWhitelist,
    Blacklist,
    AfterBlacklist,
    Modifier,
    AfterModifier,
    IntervalArticle,
    Interval,
    Costs,
    Reach,
    Currency,
    Threshold,
    CostBounded,
    DefaultKeyword,
    DefaultPolicy,
    Error,
}

pub type Transitions = &'static [(&'static str, ParserState)];

const START: Transitions = &[("for", S::User)];
const AFTER_USER: Transitions =
    &[("and", S::User), (",", S::User), ("in", S::TimeframeArticle), ("select", S::Selection)];
const TIMEFRAME_ARTICLE: Transitions = &[("the", S::Timeframe)];
const TIMEFRAME: Transitions = &[
    ("afternoon", S::Select),
    ("day", S::Select),
    ("morning", S::Select),
    ("night", S::Select),
];
const SELECT: Transitions = &[("select", S::Selection)];
const SELECTION: Transitions = &[
    ("bitcoin", S::AfterBlockchain),
    ("eos", S::AfterBlockchain),
    ("ethereum", S::AfterBlockchain),
    ("hyperledger", S::AfterBlockchain),
    ("iota", S::AfterBlockchain),
    ("multichain", S::AfterBlockchain),
    ("stellar", S::AfterBlockchain),
    ("the", S::Profile),
];
const PROFILE: Transitions = &[("cheapest", S::ProfileFilters), ("fastest", S::ProfileFilters)];
const PROFILE_FILTERS: Transitions = &[
    ("cheap", S::AfterFilter),
    ("fast", S::AfterFilter),
    ("popular", S::AfterFilter),
    ("private", S::AfterFilter),
    ("public", S::AfterFilter),
    ("stable", S::AfterFilter),
    ("blockchain", S::AfterProfile),
];
const FILTER: Transitions = &[
    ("cheap", S::AfterFilter),
    ("fast", S::AfterFilter),
    ("popular", S::AfterFilter),
    ("private", S::AfterFilter),
    ("public", S::AfterFilter),
    ("stable", S::AfterFilter),
];
const AFTER_FILTER: Transitions =
    &[("and", S::Filter), (",", S::Filter), ("blockchain", S::AfterProfile)];
// `with` is only offered before any modifier has been given.
const AFTER_BLOCKCHAIN: Transitions =
    &[("with", S::Modifier), ("until", S::IntervalArticle), ("as", S::DefaultKeyword)];
const AFTER_PROFILE: Transitions = &[
    ("from", S::Whitelist),
    ("except", S::Blacklist),
    ("with", S::Modifier),
    ("until", S::IntervalArticle),
    ("as", S::DefaultKeyword),
];
const WHITELIST: Transitions = &[
    ("bitcoin", S::AfterWhitelist),
    ("eos", S::AfterWhitelist),
    ("ethereum", S::AfterWhitelist),
    ("hyperledger", S::AfterWhitelist),
    ("iota", S::AfterWhitelist),
    ("multichain", S::AfterWhitelist),
    ("stellar", S::AfterWhitelist),
];
const AFTER_WHITELIST: Transitions = &[
    ("and", S::Whitelist),
    (",", S::Whitelist),
    ("with", S::Modifier),
    ("until", S::IntervalArticle),
    ("as", S::DefaultKeyword),
];
const BLACKLIST: Transitions = &[
    ("bitcoin", S::AfterBlacklist),
    ("eos", S::AfterBlacklist),
    ("ethereum", S::AfterBlacklist),
    ("hyperledger", S::AfterBlacklist),
    ("iota", S::AfterBlacklist),
    ("multichain", S::AfterBlacklist),
    ("stellar", S::AfterBlacklist),
];
const AFTER_BLACKLIST: Transitions = &[
    ("and", S::Blacklist),
    (",", S::Blacklist),
    ("with", S::Modifier),
    ("until", S::IntervalArticle),
    ("as", S::DefaultKeyword),
];
const MODIFIER: Transitions = &[
    ("encryption", S::AfterModifier),
    ("redundancy", S::AfterModifier),
    ("splitting", S::AfterModifier),
];
const AFTER_MODIFIER: Transitions = &[
    ("and", S::Modifier),
    (",", S::Modifier),
    ("until", S::IntervalArticle),
    ("as", S::DefaultKeyword),
];
const INTERVAL_ARTICLE: Transitions = &[("the", S::Interval)];
const INTERVAL: Transitions =
    &[("daily", S::Costs), ("weekly", S::Costs), ("monthly", S::Costs), ("yearly", S::Costs)];
const COSTS: Transitions = &[("costs", S::Reach)];
const REACH: Transitions = &[("reach", S::Currency)];
const CURRENCY: Transitions = &[("chf", S::Threshold), ("eur", S::Threshold), ("usd", S::Threshold)];
const DEFAULT_KEYWORD: Transitions = &[("default", S::DefaultPolicy)];

impl ParserState {
    pub fn initial() -> Self {
        Self::Start
    }

    pub fn is_accepting(&self) -> bool {
        matches!(self, Self::CostBounded | Self::DefaultPolicy)
    }

    /// Positions whose next token is free-form rather than drawn from a table.
    pub fn accepts_any_token(&self) -> bool {
        matches!(self, Self::User | Self::Threshold | Self::Error)
    }

    pub fn transitions(&self) -> Transitions {
        match self {
            S::Start => START,
            S::AfterUser => AFTER_USER,
            S::TimeframeArticle => TIMEFRAME_ARTICLE,
            S::Timeframe => TIMEFRAME,
            S::Select => SELECT,
            S::Selection => SELECTION,
            S::AfterBlockchain => AFTER_BLOCKCHAIN,
            S::Profile => PROFILE,
            S::ProfileFilters => PROFILE_FILTERS,
            S::Filter => FILTER,
            S::AfterFilter => AFTER_FILTER,
            S::AfterProfile => AFTER_PROFILE,
            S::Whitelist => WHITELIST,
            S::AfterWhitelist => AFTER_WHITELIST,
            S::Blacklist => BLACKLIST,
            S::AfterBlacklist => AFTER_BLACKLIST,
            S::Modifier => MODIFIER,
            S::AfterModifier => AFTER_MODIFIER,
            S::IntervalArticle => INTERVAL_ARTICLE,
            S::Interval => INTERVAL,
            S::Costs => COSTS,
            S::Reach => REACH,
            S::Currency => CURRENCY,
            S::DefaultKeyword => DEFAULT_KEYWORD,
            S::User | S::Threshold | S::CostBounded | S::DefaultPolicy | S::Error => &[],
        }
    }

    /// Looks up the table-driven successor for `token`.
    pub fn next(&self, token: &str) -> Option<ParserState> {
        self.transitions()
            .iter()
            .find_map(|(keyword, next)| (*keyword == token).then_some(*next))
    }

    /// Tokens that would be legal next input, for error reporting and autocompletion.
    pub fn expected(&self) -> BTreeSet<String> {
        self.transitions().iter().map(|(keyword, _)| keyword.to_string()).collect()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::User => "user",
            Self::AfterUser => "after_user",
            Self::TimeframeArticle => "timeframe_article",
            Self::Timeframe => "timeframe",
            Self::Select => "select",
            Self::Selection => "selection",
            Self::AfterBlockchain => "after_blockchain",
            Self::Profile => "profile",
            Self::ProfileFilters => "profile_filters",
            Self::Filter => "filter",
            Self::AfterFilter => "after_filter",
            Self::AfterProfile => "after_profile",
            Self::Whitelist => "whitelist",
            Self::AfterWhitelist => "after_whitelist",
            Self::Blacklist => "blacklist",
            Self::AfterBlacklist => "after_blacklist",
            Self::Modifier => "modifier",
            Self::AfterModifier => "after_modifier",
            Self::IntervalArticle => "interval_article",
            Self::Interval => "interval",
            Self::Costs => "costs",
            Self::Reach => "reach",
            Self::Currency => "currency",
            Self::Threshold => "threshold",
            Self::CostBounded => "cost_bounded",
            Self::DefaultKeyword => "default_keyword",
            Self::DefaultPolicy => "default_policy",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for ParserState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
