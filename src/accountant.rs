use rust_decimal::Decimal;

use crate::events::{HistoryEvent, SourceCategory};
use crate::pot::{
    ChangeFlags, ExtraData, FeeInfo, PostingEvent, PostingKind, PostingPot, SpendFlags,
    SwapPriceQuery,
};
use crate::rules::{EventRule, ModuleSettingsSource, RuleTable, SwapTreatment};
use crate::settings::AccountingSettings;

/// Explicit position over an ordered slice of history events.
///
/// The accounting core and module callbacks all advance the same cursor, so
/// consumption is observable: the caller can always tell how far processing
/// has moved by comparing positions.
#[derive(Debug)]
pub struct EventCursor<'a> {
    events: &'a [HistoryEvent],
    pos: usize,
}

impl<'a> EventCursor<'a> {
    pub fn new(events: &'a [HistoryEvent]) -> Self {
        EventCursor { events, pos: 0 }
    }

    /// Pull the next event, advancing the cursor
    pub fn next(&mut self) -> Option<&'a HistoryEvent> {
        let event = self.events.get(self.pos)?;
        self.pos += 1;
        Some(event)
    }

    /// Index of the next event to be pulled
    pub fn position(&self) -> usize {
        self.pos
    }
}

/// Pulls companion events of the same source family as a reference event.
///
/// This is the only sanctioned way to advance the shared cursor beyond the
/// primary event. A pulled event of the wrong family is a data-integrity
/// violation: it is logged, reported as absent and stays consumed, so the
/// malformed group is skipped rather than retried. Once exhausted or
/// violated the consumer stays terminated: later calls return `None`
/// without touching the cursor.
pub struct SameKindEvents<'c, 'a> {
    cursor: &'c mut EventCursor<'a>,
    reference: &'a HistoryEvent,
    done: bool,
}

impl<'c, 'a> SameKindEvents<'c, 'a> {
    pub fn new(cursor: &'c mut EventCursor<'a>, reference: &'a HistoryEvent) -> Self {
        SameKindEvents {
            cursor,
            reference,
            done: false,
        }
    }

    /// Pull the next event if it belongs to the reference event's source
    /// family. Returns `None` on exhaustion or family mismatch.
    pub fn next(&mut self) -> Option<&'a HistoryEvent> {
        if self.done {
            return None;
        }
        let Some(event) = self.cursor.next() else {
            self.done = true;
            return None;
        };
        if event.source_category() != self.reference.source_category() {
            log::error!(
                "at accounting for event '{}' with group identifier {} expected to take \
                 an additional {} event but found a {} event",
                self.reference.notes,
                self.reference.group_identifier,
                self.reference.source_category(),
                event.source_category(),
            );
            self.done = true;
            return None;
        }
        Some(event)
    }
}

/// Applies the accounting rules to history events.
///
/// Holds the rule table for the current run, rebuilt by [`reset`] from the
/// module source merged over the defaults, and folds each matched event into
/// postings submitted to the pot.
///
/// [`reset`]: EventsAccountant::reset
pub struct EventsAccountant {
    rules: RuleTable,
    modules: Box<dyn ModuleSettingsSource>,
}

impl EventsAccountant {
    pub fn new(modules: Box<dyn ModuleSettingsSource>) -> Self {
        EventsAccountant {
            rules: RuleTable::default(),
            modules,
        }
    }

    /// Rebuild the rule table for a new accounting run
    pub fn reset(&mut self, settings: &AccountingSettings) {
        self.rules = RuleTable::build(settings, self.modules.as_mut());
    }

    pub fn rules(&self) -> &RuleTable {
        &self.rules
    }

    /// Process every event in order, returning the total number consumed
    pub fn process_all(&self, pot: &mut dyn PostingPot, events: &[HistoryEvent]) -> usize {
        let mut cursor = EventCursor::new(events);
        let mut consumed = 0;
        while let Some(event) = cursor.next() {
            consumed += self.process(pot, event, &mut cursor);
        }
        consumed
    }

    /// Process one history event, consuming companion events from the cursor
    /// as its rule requires. Returns the number of events consumed, the
    /// primary event included; the count always reflects the cursor's actual
    /// movement, so callers advancing by it stay aligned with the stream.
    pub fn process<'a>(
        &self,
        pot: &mut dyn PostingPot,
        event: &'a HistoryEvent,
        events: &mut EventCursor<'a>,
    ) -> usize {
        let start = events.position();
        let consumed = |events: &EventCursor<'_>| 1 + events.position() - start;

        let Some(rule) = self.rules.lookup(event) else {
            // Only chain events get the fallback lookup, so only a chain
            // miss is worth surfacing
            if event.source_category() == SourceCategory::Chain {
                log::debug!(
                    "during transaction accounting found history event '{}' in group {} \
                     with no mapped rule, skipping",
                    event.notes,
                    event.group_identifier,
                );
            }
            return consumed(events);
        };

        // Module specific accounting runs first and may drain further
        // events; whatever it takes shows up in the cursor position.
        if let Some(callback) = &rule.callback {
            let mut drain = SameKindEvents::new(events, event);
            callback(&mut *pot, event, &mut drain);
        }

        let mut extra = ExtraData::new();
        if let Some(tx_hash) = event.tx_hash() {
            extra.insert("tx_hash".to_string(), tx_hash.to_string());
        }

        if let Some(treatment) = rule.treatment {
            self.process_swap(pot, event, rule, treatment, events, extra);
            return consumed(events);
        }

        pot.add_asset_change(
            rule.method,
            PostingEvent {
                kind: PostingKind::TransactionEvent,
                notes: event.notes.clone(),
                location: event.location.clone(),
                timestamp: event.timestamp,
                asset: event.asset.clone(),
                amount: event.amount,
                extra,
            },
            ChangeFlags {
                taxable: rule.taxable,
                count_entire_amount_spend: rule.count_entire_amount_spend,
                count_cost_basis_pnl: rule.count_cost_basis_pnl,
            },
        );
        consumed(events)
    }

    /// Handle a paired spend/acquisition (+ optional fee) group.
    ///
    /// `out_event` is the spend leg already pulled by the caller; the fee leg
    /// (for [`SwapTreatment::SwapWithFee`]) and the acquisition leg are pulled
    /// here. Any abort leaves whatever was pulled consumed.
    fn process_swap<'a>(
        &self,
        pot: &mut dyn PostingPot,
        out_event: &'a HistoryEvent,
        rule: &EventRule,
        treatment: SwapTreatment,
        events: &mut EventCursor<'a>,
        general_extra: ExtraData,
    ) {
        let mut legs = SameKindEvents::new(events, out_event);

        let fee_event = if treatment == SwapTreatment::SwapWithFee {
            let Some(fee_event) = legs.next() else {
                log::error!(
                    "tried to process accounting swap but could not find the fee event \
                     for '{}' in group {}",
                    out_event.notes,
                    out_event.group_identifier,
                );
                return;
            };
            Some(fee_event)
        } else {
            None
        };

        let Some(in_event) = legs.next() else {
            log::error!(
                "tried to process accounting swap but could not find the in event \
                 for '{}' in group {}",
                out_event.notes,
                out_event.group_identifier,
            );
            return;
        };

        let Some(prices) = pot.get_prices_for_swap(&SwapPriceQuery {
            timestamp: out_event.timestamp,
            amount_in: in_event.amount,
            asset_in: in_event.asset.clone(),
            amount_out: out_event.amount,
            asset_out: out_event.asset.clone(),
            fee: fee_event.map(|fee| FeeInfo {
                amount: fee.amount,
                asset: fee.asset.clone(),
            }),
        }) else {
            log::debug!(
                "skipping swap '{}' in group {} at accounting due to inability to find a price",
                out_event.notes,
                out_event.group_identifier,
            );
            return;
        };

        // Unique within the transaction: two swaps in the same group always
        // differ in at least one leg's sequence index.
        let group_id = format!(
            "{}{}{}",
            out_event.group_identifier, out_event.sequence_index, in_event.sequence_index,
        );
        let mut extra = general_extra;
        extra.insert("group_id".to_string(), group_id);

        let outcome = pot.add_spend(
            PostingEvent {
                kind: PostingKind::TransactionEvent,
                notes: out_event.notes.clone(),
                location: out_event.location.clone(),
                timestamp: out_event.timestamp,
                asset: out_event.asset.clone(),
                amount: out_event.amount,
                extra: extra.clone(),
            },
            SpendFlags {
                taxable: rule.taxable,
                given_price: Some(prices.out_price),
                taxable_amount_ratio: Decimal::ONE,
                // Only the cost-basis-relevant portion of the out leg applies
                count_entire_amount_spend: false,
                count_cost_basis_pnl: true,
            },
        );

        if let Some(fee_event) = fee_event {
            let fee_price = if fee_event.asset == pot.settings().profit_currency {
                Some(Decimal::ONE)
            } else if fee_event.asset == in_event.asset {
                Some(prices.in_price)
            } else if fee_event.asset == out_event.asset {
                Some(prices.out_price)
            } else {
                None
            };

            let (fee_taxable, fee_taxable_amount_ratio) =
                if pot.settings().include_fees_in_cost_basis {
                    // Fee only reduces the amount of fee asset owned
                    (false, Decimal::ONE)
                } else {
                    // Otherwise a normal spend, taxable in the same
                    // proportion as the underlying trade
                    let ratio = outcome
                        .taxable_amount
                        .checked_div(out_event.amount)
                        .unwrap_or(Decimal::ONE);
                    (true, ratio)
                };

            pot.add_spend(
                PostingEvent {
                    kind: PostingKind::Fee,
                    notes: fee_event.notes.clone(),
                    location: fee_event.location.clone(),
                    timestamp: out_event.timestamp,
                    asset: fee_event.asset.clone(),
                    amount: fee_event.amount,
                    extra: extra.clone(),
                },
                SpendFlags {
                    taxable: fee_taxable,
                    given_price: fee_price,
                    taxable_amount_ratio: fee_taxable_amount_ratio,
                    count_entire_amount_spend: true,
                    count_cost_basis_pnl: true,
                },
            );
        }

        pot.add_acquisition(
            PostingEvent {
                kind: PostingKind::TransactionEvent,
                notes: in_event.notes.clone(),
                location: in_event.location.clone(),
                timestamp: out_event.timestamp,
                asset: in_event.asset.clone(),
                amount: in_event.amount,
                extra,
            },
            Some(prices.in_price),
            // acquisitions in swaps are never taxable
            false,
        );
    }
}
