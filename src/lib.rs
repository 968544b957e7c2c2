//! Transaction accounting engine.
//!
//! Folds a stream of classified chain events into taxable and non-taxable
//! ledger postings. Events are matched against a rule table built per run
//! from defaults merged under module-specific overrides; rules with a swap
//! treatment pull their companion legs from the same shared cursor before
//! emitting postings into the caller-owned pot.

pub mod accountant;
pub mod events;
pub mod explorer;
pub mod pot;
pub mod rules;
pub mod settings;
pub mod warnings;

pub use accountant::{EventCursor, EventsAccountant, SameKindEvents};
pub use events::{EventSource, EventSubtype, EventType, HistoryEvent, SourceCategory, TxHash};
pub use explorer::{DeserializationError, EvmTransaction, ExplorerApi, RemoteError};
pub use pot::{
    ChangeFlags, ExtraData, FeeInfo, MemoryPot, Posting, PostingEvent, PostingKind, PostingPot,
    PriceSource, SpendFlags, SpendOutcome, StaticPrices, SwapPriceQuery, SwapPrices,
};
pub use rules::{
    EventRule, ModuleCallback, ModuleSettingsSource, NoModules, PostingMethod, RuleKey, RuleTable,
    SwapTreatment, CPT_GAS,
};
pub use settings::{AccountingSettings, LedgerActionKind};
pub use warnings::MessageLog;
