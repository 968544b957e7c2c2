use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::accountant::SameKindEvents;
use crate::events::{EventSubtype, EventType, HistoryEvent, SourceCategory};
use crate::pot::PostingPot;
use crate::settings::AccountingSettings;

/// Counterparty tag the decoders attach to gas fee events
pub const CPT_GAS: &str = "gas";

/// Composite lookup key for the rule table.
///
/// Counterparty-specific keys take precedence; the counterparty-absent key
/// is the fallback for chain events whose counterparty has no dedicated rule.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RuleKey {
    pub event_type: EventType,
    pub event_subtype: EventSubtype,
    pub counterparty: Option<String>,
}

impl RuleKey {
    pub fn new(event_type: EventType, event_subtype: EventSubtype) -> Self {
        RuleKey {
            event_type,
            event_subtype,
            counterparty: None,
        }
    }

    pub fn with_counterparty(
        event_type: EventType,
        event_subtype: EventSubtype,
        counterparty: &str,
    ) -> Self {
        RuleKey {
            event_type,
            event_subtype,
            counterparty: Some(counterparty.to_string()),
        }
    }

    /// Primary key for an event, including its counterparty when present
    pub fn for_event(event: &HistoryEvent) -> Self {
        RuleKey {
            event_type: event.event_type,
            event_subtype: event.event_subtype,
            counterparty: event.counterparty().map(str::to_string),
        }
    }

    /// Fallback key with the counterparty dropped
    pub fn fallback(event: &HistoryEvent) -> Self {
        RuleKey::new(event.event_type, event.event_subtype)
    }
}

/// Whether a posting reduces or grows the held balance of an asset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostingMethod {
    Spend,
    Acquisition,
}

/// Special accounting treatment requiring companion events from the stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapTreatment {
    /// Spend leg followed by an acquisition leg
    Swap,
    /// Fee leg, then spend leg is the primary, then an acquisition leg
    SwapWithFee,
}

/// Module-specific accounting hook, invoked before the regular processing of
/// a matched event. The drain argument is the only sanctioned way for the
/// hook to consume further events from the shared stream.
pub type ModuleCallback =
    Arc<dyn Fn(&mut dyn PostingPot, &HistoryEvent, &mut SameKindEvents<'_, '_>) + Send + Sync>;

/// How a matched event is folded into the ledger
#[derive(Clone)]
pub struct EventRule {
    pub taxable: bool,
    pub count_entire_amount_spend: bool,
    pub count_cost_basis_pnl: bool,
    pub method: PostingMethod,
    pub treatment: Option<SwapTreatment>,
    pub callback: Option<ModuleCallback>,
}

impl EventRule {
    pub fn new(
        taxable: bool,
        count_entire_amount_spend: bool,
        count_cost_basis_pnl: bool,
        method: PostingMethod,
    ) -> Self {
        EventRule {
            taxable,
            count_entire_amount_spend,
            count_cost_basis_pnl,
            method,
            treatment: None,
            callback: None,
        }
    }

    pub fn with_treatment(mut self, treatment: SwapTreatment) -> Self {
        self.treatment = Some(treatment);
        self
    }

    pub fn with_callback(mut self, callback: ModuleCallback) -> Self {
        self.callback = Some(callback);
        self
    }
}

impl fmt::Debug for EventRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventRule")
            .field("taxable", &self.taxable)
            .field("count_entire_amount_spend", &self.count_entire_amount_spend)
            .field("count_cost_basis_pnl", &self.count_cost_basis_pnl)
            .field("method", &self.method)
            .field("treatment", &self.treatment)
            .field("callback", &self.callback.as_ref().map(|_| "<fn>"))
            .finish()
    }
}

/// Source of protocol/module specific accounting rules.
///
/// Module state may be scoped to a single run, so `reset` is called once
/// before each rule table build.
pub trait ModuleSettingsSource {
    fn reset(&mut self);
    fn settings(&self, settings: &AccountingSettings) -> HashMap<RuleKey, EventRule>;
}

/// Module source for runs with no protocol-specific accounting
#[derive(Debug, Default)]
pub struct NoModules;

impl ModuleSettingsSource for NoModules {
    fn reset(&mut self) {}

    fn settings(&self, _settings: &AccountingSettings) -> HashMap<RuleKey, EventRule> {
        HashMap::new()
    }
}

/// Mapping from rule key to event rule, built fresh per accounting run and
/// read-only thereafter
#[derive(Debug, Default)]
pub struct RuleTable {
    rules: HashMap<RuleKey, EventRule>,
}

impl RuleTable {
    /// Build the table by merging default rules under the module rules.
    /// Module entries always win when both define the same key.
    pub fn build(settings: &AccountingSettings, modules: &mut dyn ModuleSettingsSource) -> Self {
        modules.reset();
        let mut rules = modules.settings(settings);
        for (key, rule) in default_rules(settings) {
            rules.entry(key).or_insert(rule);
        }
        RuleTable { rules }
    }

    pub fn get(&self, key: &RuleKey) -> Option<&EventRule> {
        self.rules.get(key)
    }

    /// Resolve the rule for an event: primary key first, then, for chain
    /// events only, the counterparty-free fallback.
    pub fn lookup(&self, event: &HistoryEvent) -> Option<&EventRule> {
        if let Some(rule) = self.rules.get(&RuleKey::for_event(event)) {
            return Some(rule);
        }
        if event.source_category() != SourceCategory::Chain {
            return None;
        }
        self.rules.get(&RuleKey::fallback(event))
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Rules for events that can come from any decoder and carry no particular
/// protocol. Evaluated after the module rules so they never shadow them.
fn default_rules(settings: &AccountingSettings) -> Vec<(RuleKey, EventRule)> {
    vec![
        (
            RuleKey::with_counterparty(EventType::Spend, EventSubtype::Fee, CPT_GAS),
            EventRule::new(
                settings.include_gas_costs,
                settings.include_gas_costs,
                settings.include_crypto2crypto,
                PostingMethod::Spend,
            ),
        ),
        (
            RuleKey::new(EventType::Spend, EventSubtype::None),
            EventRule::new(true, true, true, PostingMethod::Spend),
        ),
        (
            RuleKey::new(EventType::Receive, EventSubtype::None),
            EventRule::new(true, true, true, PostingMethod::Acquisition),
        ),
        (
            RuleKey::new(EventType::Deposit, EventSubtype::None),
            EventRule::new(false, false, false, PostingMethod::Spend),
        ),
        (
            RuleKey::new(EventType::Withdrawal, EventSubtype::None),
            EventRule::new(false, false, false, PostingMethod::Acquisition),
        ),
        (
            RuleKey::new(EventType::Spend, EventSubtype::Fee),
            EventRule::new(true, true, true, PostingMethod::Spend),
        ),
        (
            RuleKey::new(EventType::Renew, EventSubtype::None),
            EventRule::new(true, true, true, PostingMethod::Spend),
        ),
        (
            RuleKey::new(EventType::Trade, EventSubtype::Spend),
            EventRule::new(true, false, true, PostingMethod::Spend)
                .with_treatment(SwapTreatment::Swap),
        ),
        (
            // The spend flags don't matter for acquisitions
            RuleKey::new(EventType::Receive, EventSubtype::Airdrop),
            EventRule::new(
                settings.airdrops_are_taxable(),
                false,
                false,
                PostingMethod::Acquisition,
            ),
        ),
        (
            RuleKey::new(EventType::Receive, EventSubtype::Reward),
            EventRule::new(true, false, false, PostingMethod::Acquisition),
        ),
    ]
}
