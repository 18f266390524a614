use std::collections::{BTreeMap, BTreeSet};

use rust_decimal::Decimal;
use thiserror::Error;
use tracing::debug;

use crate::domain::intent::{Blockchain, Currency, Filter, Intent, Modifier, Timeframe};
use crate::domain::policy::{
    BlockchainType, CostProfile, Policy, PolicyInterval, TimeMarker, CANONICAL_CURRENCY,
};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RateLookupError {
    #[error("no conversion rate known for currency {0}")]
    UnknownCurrency(Currency),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TranslateError {
    #[error("{0}")]
    Validation(String),
    #[error(transparent)]
    RateLookup(#[from] RateLookupError),
    #[error("threshold {amount} {currency} overflows when converted to the canonical currency")]
    ThresholdOverflow { amount: Decimal, currency: Currency },
}

/// Source of conversion rates into the canonical currency.
pub trait RateLookup {
    fn rate_for(&self, currency: Currency) -> Result<Decimal, RateLookupError>;
}

/// Fixed set of conversion rates, typically loaded once from the rate store.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RateTable {
    rates: BTreeMap<Currency, Decimal>,
}

impl RateTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rate(mut self, currency: Currency, rate: Decimal) -> Self {
        self.insert(currency, rate);
        self
    }

    pub fn insert(&mut self, currency: Currency, rate: Decimal) {
        self.rates.insert(currency, rate);
    }

    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Currency, Decimal)> + '_ {
        self.rates.iter().map(|(currency, rate)| (*currency, *rate))
    }
}

impl FromIterator<(Currency, Decimal)> for RateTable {
    fn from_iter<T: IntoIterator<Item = (Currency, Decimal)>>(iter: T) -> Self {
        Self { rates: iter.into_iter().collect() }
    }
}

impl RateLookup for RateTable {
    fn rate_for(&self, currency: Currency) -> Result<Decimal, RateLookupError> {
        if currency == CANONICAL_CURRENCY {
            return Ok(Decimal::ONE);
        }
        self.rates.get(&currency).copied().ok_or(RateLookupError::UnknownCurrency(currency))
    }
}

/// Values a filter tightens its criterion to.
#[derive(Clone, Debug, PartialEq)]
pub struct SelectionBaselines {
    pub min_tx_rate: u32,
    pub max_tx_cost: Decimal,
    pub min_popularity: f64,
    pub min_stability: f64,
}

impl Default for SelectionBaselines {
    fn default() -> Self {
        Self {
            min_tx_rate: 4,
            max_tx_cost: Decimal::ONE,
            min_popularity: 0.5,
            min_stability: 0.5,
        }
    }
}

pub struct Translator<R> {
    rates: R,
    baselines: SelectionBaselines,
}

impl<R> Translator<R>
where
    R: RateLookup,
{
    pub fn new(rates: R, baselines: SelectionBaselines) -> Self {
        Self { rates, baselines }
    }

    pub fn baselines(&self) -> &SelectionBaselines {
        &self.baselines
    }

    /// Lowers an accepted intent into one policy per distinct user, in the
    /// order the users were named.
    pub fn translate(&self, intent: &Intent) -> Result<Vec<Policy>, TranslateError> {
        ensure_complete(intent)?;
        let template = self.template(intent)?;

        let mut seen = BTreeSet::new();
        let policies: Vec<Policy> = intent
            .users
            .iter()
            .filter(|user| seen.insert(user.as_str()))
            .map(|user| Policy { user: user.clone(), ..template.clone() })
            .collect();

        debug!(
            event_name = "translator.intent_translated",
            policies = policies.len(),
            cost_profile = template.cost_profile.as_str(),
            interval = template.interval.as_str(),
            "translated intent"
        );

        Ok(policies)
    }

    fn template(&self, intent: &Intent) -> Result<Policy, TranslateError> {
        let mut policy = Policy::default();

        if let Some(profile) = intent.profile {
            policy.cost_profile = CostProfile::from(profile);
        }
        if let Some(timeframe) = intent.timeframe {
            let (start, end) = timeframe_markers(timeframe);
            policy.timeframe_start = start;
            policy.timeframe_end = end;
        }
        if let Some(interval) = intent.interval {
            policy.interval = PolicyInterval::from(interval);
        }
        if let Some(threshold) = intent.threshold {
            policy.threshold = self.to_canonical(threshold, intent.currency)?;
        }

        policy.blockchain_pool = blockchain_pool(intent)?;
        self.apply_filters(&mut policy, &intent.filters);
        apply_modifiers(&mut policy, &intent.modifiers);

        Ok(policy)
    }

    fn to_canonical(
        &self,
        amount: Decimal,
        currency: Option<Currency>,
    ) -> Result<Decimal, TranslateError> {
        match currency {
            Some(currency) if currency != CANONICAL_CURRENCY => {
                let rate = self.rates.rate_for(currency)?;
                amount
                    .checked_mul(rate)
                    .map(|converted| converted.normalize())
                    .ok_or(TranslateError::ThresholdOverflow { amount, currency })
            }
            _ => Ok(amount.normalize()),
        }
    }

    fn apply_filters(&self, policy: &mut Policy, filters: &BTreeSet<Filter>) {
        for filter in filters {
            match filter {
                Filter::Private => policy.blockchain_type = BlockchainType::Private,
                Filter::Public => policy.blockchain_type = BlockchainType::Public,
                Filter::Fast => policy.min_tx_rate = self.baselines.min_tx_rate,
                Filter::Cheap => policy.max_tx_cost = self.baselines.max_tx_cost,
                Filter::Stable => policy.min_stability = self.baselines.min_stability,
                Filter::Popular => policy.min_popularity = self.baselines.min_popularity,
            }
        }
    }
}

/// Rejects intents no accepting parse could have produced.
fn ensure_complete(intent: &Intent) -> Result<(), TranslateError> {
    if intent.users.is_empty() {
        return Err(TranslateError::Validation("intent names no user".to_string()));
    }
    if intent.blockchain.is_none() && intent.profile.is_none() {
        return Err(TranslateError::Validation(
            "intent selects neither a blockchain nor a profile".to_string(),
        ));
    }
    if intent.threshold.is_some() && intent.interval.is_none() {
        return Err(TranslateError::Validation("threshold requires an interval".to_string()));
    }
    Ok(())
}

fn timeframe_markers(timeframe: Timeframe) -> (TimeMarker, TimeMarker) {
    match timeframe {
        Timeframe::Day => (TimeMarker::DayStart, TimeMarker::NightStart),
        Timeframe::Night => (TimeMarker::NightStart, TimeMarker::DayStart),
        Timeframe::Morning => (TimeMarker::DayStart, TimeMarker::AfternoonStart),
        Timeframe::Afternoon => (TimeMarker::AfternoonStart, TimeMarker::NightStart),
    }
}

fn blockchain_pool(intent: &Intent) -> Result<BTreeSet<Blockchain>, TranslateError> {
    if let Some(blockchain) = intent.blockchain {
        return Ok(BTreeSet::from([blockchain]));
    }
    if !intent.whitelist.is_empty() {
        return Ok(intent.whitelist.clone());
    }
    if !intent.blacklist.is_empty() {
        let pool: BTreeSet<Blockchain> = Blockchain::ALL
            .into_iter()
            .filter(|blockchain| !intent.blacklist.contains(blockchain))
            .collect();
        if pool.is_empty() {
            return Err(TranslateError::Validation("blockchain pool cannot be empty".to_string()));
        }
        return Ok(pool);
    }

    Ok(BTreeSet::new())
}

fn apply_modifiers(policy: &mut Policy, modifiers: &BTreeSet<Modifier>) {
    for modifier in modifiers {
        match modifier {
            Modifier::Splitting => policy.split_txs = true,
            Modifier::Encryption => policy.encryption = true,
            Modifier::Redundancy => policy.redundancy = true,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use rust_decimal::Decimal;

    use super::{RateLookupError, RateTable, SelectionBaselines, TranslateError, Translator};
    use crate::domain::intent::{Blockchain, Currency, Filter, Intent, Interval, Profile, Timeframe};
    use crate::domain::policy::{
        BlockchainType, CostProfile, Policy, PolicyInterval, TimeMarker, DEFAULT_MIN_TX_RATE,
    };
    use crate::parser::parse;

    fn translator() -> Translator<RateTable> {
        let rates = RateTable::new()
            .with_rate(Currency::Chf, Decimal::new(109, 2))
            .with_rate(Currency::Eur, Decimal::new(118, 2));
        Translator::new(rates, SelectionBaselines::default())
    }

    fn translate(text: &str) -> Vec<Policy> {
        let intent = parse(text).expect("valid intent");
        translator().translate(&intent).expect("translation succeeds")
    }

    #[test]
    fn converts_threshold_into_canonical_currency() {
        let policies =
            translate("for client1 select the fastest blockchain until the daily costs reach chf 20");

        assert_eq!(policies.len(), 1);
        let policy = &policies[0];
        assert_eq!(policy.user, "client1");
        assert_eq!(policy.cost_profile, CostProfile::Performance);
        assert_eq!(policy.interval, PolicyInterval::Daily);
        assert_eq!(policy.currency, Currency::Usd);
        assert_eq!(policy.threshold, Decimal::new(218, 1));
    }

    #[test]
    fn usd_and_bare_amounts_are_not_converted() {
        let usd = translate("for a select eos until the weekly costs reach usd 7.5");
        let bare = translate("for a select eos until the weekly costs reach 7.5");

        assert_eq!(usd[0].threshold, Decimal::new(75, 1));
        assert_eq!(bare, usd);
    }

    #[test]
    fn blacklist_becomes_the_complement_pool() {
        let policies = translate(
            "for client2 select the cheapest blockchain except eos with redundancy and splitting \
             until the daily costs reach chf 20",
        );

        let policy = &policies[0];
        let expected: BTreeSet<Blockchain> =
            Blockchain::ALL.into_iter().filter(|blockchain| *blockchain != Blockchain::Eos).collect();
        assert_eq!(policy.blockchain_pool, expected);
        assert!(policy.redundancy);
        assert!(policy.split_txs);
        assert!(!policy.encryption);
        assert_eq!(policy.cost_profile, CostProfile::Economic);
    }

    #[test]
    fn blacklisting_everything_is_rejected() {
        let intent = Intent {
            users: vec!["a".to_string()],
            profile: Some(Profile::Cheapest),
            blacklist: Blockchain::ALL.into_iter().collect(),
            ..Intent::default()
        };

        assert_eq!(
            translator().translate(&intent),
            Err(TranslateError::Validation("blockchain pool cannot be empty".to_string()))
        );
    }

    #[test]
    fn fans_out_one_identical_policy_per_user() {
        let policies = translate(
            "for c, a and b in the night select the fastest popular and public blockchain \
             from bitcoin and stellar as default",
        );

        let users: Vec<&str> = policies.iter().map(|policy| policy.user.as_str()).collect();
        assert_eq!(users, vec!["c", "a", "b"]);
        for policy in &policies {
            assert_eq!(Policy { user: "c".to_string(), ..policy.clone() }, policies[0]);
        }

        let policy = &policies[0];
        assert_eq!(policy.timeframe_start, TimeMarker::Default);
        assert_eq!(policy.blockchain_type, BlockchainType::Public);
        assert_eq!(policy.min_popularity, 0.5);
        assert_eq!(policy.min_stability, 0.0);
        assert_eq!(policy.blockchain_pool, BTreeSet::from([Blockchain::Bitcoin, Blockchain::Stellar]));
        assert!(policy.is_default_policy());
    }

    #[test]
    fn timeframes_map_onto_markers() {
        let cases = [
            (Timeframe::Day, TimeMarker::DayStart, TimeMarker::NightStart),
            (Timeframe::Night, TimeMarker::NightStart, TimeMarker::DayStart),
            (Timeframe::Morning, TimeMarker::DayStart, TimeMarker::AfternoonStart),
            (Timeframe::Afternoon, TimeMarker::AfternoonStart, TimeMarker::NightStart),
        ];

        for (timeframe, start, end) in cases {
            let intent = Intent {
                users: vec!["a".to_string()],
                timeframe: Some(timeframe),
                blockchain: Some(Blockchain::Iota),
                interval: Some(Interval::Monthly),
                threshold: Some(Decimal::from(3)),
                ..Intent::default()
            };
            let policies = translator().translate(&intent).expect("translation succeeds");
            assert_eq!((policies[0].timeframe_start, policies[0].timeframe_end), (start, end));
        }
    }

    #[test]
    fn filters_tighten_to_configured_baselines() {
        let baselines = SelectionBaselines {
            min_tx_rate: 9,
            max_tx_cost: Decimal::new(25, 2),
            min_popularity: 0.8,
            min_stability: 0.9,
        };
        let translator = Translator::new(RateTable::new(), baselines);
        let intent = Intent {
            users: vec!["a".to_string()],
            profile: Some(Profile::Cheapest),
            filters: BTreeSet::from([Filter::Fast, Filter::Stable, Filter::Private]),
            ..Intent::default()
        };

        let policy = &translator.translate(&intent).expect("translation succeeds")[0];
        assert_eq!(policy.min_tx_rate, 9);
        assert_eq!(policy.min_stability, 0.9);
        assert_eq!(policy.max_tx_cost, Decimal::ZERO);
        assert_eq!(policy.blockchain_type, BlockchainType::Private);

        let unfiltered = Intent { filters: BTreeSet::new(), ..intent };
        let policy = &translator.translate(&unfiltered).expect("translation succeeds")[0];
        assert_eq!(policy.min_tx_rate, DEFAULT_MIN_TX_RATE);
    }

    #[test]
    fn unknown_currency_fails_the_lookup() {
        let translator = Translator::new(RateTable::new(), SelectionBaselines::default());
        let intent = parse("for a select eos until the daily costs reach eur 1").expect("valid");

        assert_eq!(
            translator.translate(&intent),
            Err(TranslateError::RateLookup(RateLookupError::UnknownCurrency(Currency::Eur)))
        );
    }

    #[test]
    fn overflowing_conversion_is_an_error() {
        let intent = parse(
            "for a select eos until the daily costs reach chf 79228162514264337593543950335",
        )
        .expect("maximum decimal is a valid threshold");

        assert_eq!(
            translator().translate(&intent),
            Err(TranslateError::ThresholdOverflow { amount: Decimal::MAX, currency: Currency::Chf })
        );
    }

    #[test]
    fn incomplete_intents_are_rejected() {
        let cases = [
            Intent::default(),
            Intent { profile: Some(Profile::Fastest), ..Intent::default() },
            Intent { users: vec!["a".to_string()], ..Intent::default() },
            Intent {
                users: vec!["a".to_string()],
                blockchain: Some(Blockchain::Eos),
                threshold: Some(Decimal::ONE),
                ..Intent::default()
            },
        ];

        for intent in cases {
            assert!(
                matches!(translator().translate(&intent), Err(TranslateError::Validation(_))),
                "{intent:?} should not translate"
            );
        }
    }
}
