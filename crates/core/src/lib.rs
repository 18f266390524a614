pub mod audit;
pub mod config;
pub mod domain;
pub mod errors;
pub mod parser;
pub mod reconcile;
pub mod refiner;
pub mod translator;

pub use domain::intent::{
    Blockchain, Currency, Filter, Intent, IntentId, IntentRecord, Interval, Modifier, Profile,
    Timeframe,
};
pub use domain::policy::{
    BlockchainType, CostProfile, ExternalPolicyId, Policy, PolicyInterval, PolicyRecord,
    PolicyRecordId, TimeMarker, TimeWindows, CANONICAL_CURRENCY,
};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use parser::{parse, IntentParser, ParseError, ParserState};
pub use reconcile::{
    plan_reconciliation, AppliedStep, EnforcementClient, EnforcementError, PolicyReconciler,
    ReconcileError, ReconcileOutcome, ReconcilePlan, ReconcileStep,
};
pub use refiner::{suggest, RefineError, Refiner, Suggestion};
pub use translator::{
    RateLookup, RateLookupError, RateTable, SelectionBaselines, TranslateError, Translator,
};
