use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;

use crate::rules::PostingMethod;
use crate::settings::AccountingSettings;

/// What kind of ledger line a posting represents
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostingKind {
    TransactionEvent,
    Fee,
}

/// Arbitrary metadata attached to a posting (e.g. `tx_hash`, `group_id`)
pub type ExtraData = HashMap<String, String>;

/// Common fields shared by every posting submitted to the pot.
#[derive(Debug, Clone)]
pub struct PostingEvent {
    pub kind: PostingKind,
    pub notes: String,
    pub location: String,
    pub timestamp: DateTime<Utc>,
    pub asset: String,
    pub amount: Decimal,
    pub extra: ExtraData,
}

/// Flags for a plain asset change posting
#[derive(Debug, Clone, Copy)]
pub struct ChangeFlags {
    pub taxable: bool,
    pub count_entire_amount_spend: bool,
    pub count_cost_basis_pnl: bool,
}

/// Flags for a spend posting
#[derive(Debug, Clone, Copy)]
pub struct SpendFlags {
    pub taxable: bool,
    pub given_price: Option<Decimal>,
    /// Fraction of the amount counting towards taxable PNL
    pub taxable_amount_ratio: Decimal,
    pub count_entire_amount_spend: bool,
    pub count_cost_basis_pnl: bool,
}

/// What the pot booked for a spend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpendOutcome {
    pub price: Option<Decimal>,
    pub taxable_amount: Decimal,
}

/// Fee leg of a swap, if any
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeeInfo {
    pub amount: Decimal,
    pub asset: String,
}

/// Price request for the two legs of a swap
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapPriceQuery {
    pub timestamp: DateTime<Utc>,
    pub amount_in: Decimal,
    pub asset_in: String,
    pub amount_out: Decimal,
    pub asset_out: String,
    pub fee: Option<FeeInfo>,
}

/// Resolved prices for both swap legs, in the profit currency
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapPrices {
    pub out_price: Decimal,
    pub in_price: Decimal,
}

/// The posting accumulator ("pot").
///
/// Owns the ledger state the accounting core writes into. The core only
/// calls it; price resolution and posting bookkeeping are the pot's concern.
pub trait PostingPot {
    fn settings(&self) -> &AccountingSettings;

    /// Book a single posting using the event's own fields
    fn add_asset_change(&mut self, method: PostingMethod, event: PostingEvent, flags: ChangeFlags);

    /// Book a spend, returning the price it was valued at and the amount
    /// that counted towards taxable PNL
    fn add_spend(&mut self, event: PostingEvent, flags: SpendFlags) -> SpendOutcome;

    /// Book an acquisition
    fn add_acquisition(&mut self, event: PostingEvent, given_price: Option<Decimal>, taxable: bool);

    /// Resolve prices for both legs of a swap, or `None` if neither leg
    /// can be priced
    fn get_prices_for_swap(&self, query: &SwapPriceQuery) -> Option<SwapPrices>;
}

/// Historical price lookup: one unit of `asset` in the profit currency
pub trait PriceSource {
    fn price(&self, asset: &str, timestamp: DateTime<Utc>) -> Option<Decimal>;
}

/// Fixed price table, ignoring timestamps. Handy for tests and replays.
#[derive(Debug, Clone, Default)]
pub struct StaticPrices {
    prices: HashMap<String, Decimal>,
}

impl StaticPrices {
    pub fn new(prices: HashMap<String, Decimal>) -> Self {
        StaticPrices { prices }
    }

    pub fn insert(&mut self, asset: &str, price: Decimal) {
        self.prices.insert(asset.to_string(), price);
    }
}

impl PriceSource for StaticPrices {
    fn price(&self, asset: &str, _timestamp: DateTime<Utc>) -> Option<Decimal> {
        self.prices.get(asset).copied()
    }
}

/// A fully formed ledger line held by the in-memory pot
#[derive(Debug, Clone)]
pub struct Posting {
    pub method: PostingMethod,
    pub kind: PostingKind,
    pub notes: String,
    pub location: String,
    pub timestamp: DateTime<Utc>,
    pub asset: String,
    pub amount: Decimal,
    pub taxable: bool,
    pub price: Option<Decimal>,
    pub taxable_amount_ratio: Decimal,
    pub count_entire_amount_spend: bool,
    pub count_cost_basis_pnl: bool,
    pub extra: ExtraData,
}

/// In-memory [`PostingPot`] backed by a [`PriceSource`].
///
/// Accumulates postings in submission order; the accounting core drives it
/// but never owns its state.
#[derive(Debug)]
pub struct MemoryPot<P> {
    settings: AccountingSettings,
    prices: P,
    postings: Vec<Posting>,
}

impl<P: PriceSource> MemoryPot<P> {
    pub fn new(settings: AccountingSettings, prices: P) -> Self {
        MemoryPot {
            settings,
            prices,
            postings: Vec::new(),
        }
    }

    pub fn postings(&self) -> &[Posting] {
        &self.postings
    }

    pub fn take_postings(&mut self) -> Vec<Posting> {
        std::mem::take(&mut self.postings)
    }

    /// Price of an asset in the profit currency. The profit currency itself
    /// always resolves to one.
    fn resolve_price(&self, asset: &str, timestamp: DateTime<Utc>) -> Option<Decimal> {
        if asset == self.settings.profit_currency {
            return Some(Decimal::ONE);
        }
        self.prices.price(asset, timestamp)
    }
}

impl<P: PriceSource> PostingPot for MemoryPot<P> {
    fn settings(&self) -> &AccountingSettings {
        &self.settings
    }

    fn add_asset_change(&mut self, method: PostingMethod, event: PostingEvent, flags: ChangeFlags) {
        let price = self.resolve_price(&event.asset, event.timestamp);
        self.postings.push(Posting {
            method,
            kind: event.kind,
            notes: event.notes,
            location: event.location,
            timestamp: event.timestamp,
            asset: event.asset,
            amount: event.amount,
            taxable: flags.taxable,
            price,
            taxable_amount_ratio: Decimal::ONE,
            count_entire_amount_spend: flags.count_entire_amount_spend,
            count_cost_basis_pnl: flags.count_cost_basis_pnl,
            extra: event.extra,
        });
    }

    fn add_spend(&mut self, event: PostingEvent, flags: SpendFlags) -> SpendOutcome {
        let price = flags
            .given_price
            .or_else(|| self.resolve_price(&event.asset, event.timestamp));
        let taxable_amount = if flags.taxable {
            event.amount * flags.taxable_amount_ratio
        } else {
            Decimal::ZERO
        };
        self.postings.push(Posting {
            method: PostingMethod::Spend,
            kind: event.kind,
            notes: event.notes,
            location: event.location,
            timestamp: event.timestamp,
            asset: event.asset,
            amount: event.amount,
            taxable: flags.taxable,
            price,
            taxable_amount_ratio: flags.taxable_amount_ratio,
            count_entire_amount_spend: flags.count_entire_amount_spend,
            count_cost_basis_pnl: flags.count_cost_basis_pnl,
            extra: event.extra,
        });
        SpendOutcome {
            price,
            taxable_amount,
        }
    }

    fn add_acquisition(
        &mut self,
        event: PostingEvent,
        given_price: Option<Decimal>,
        taxable: bool,
    ) {
        let price = given_price.or_else(|| self.resolve_price(&event.asset, event.timestamp));
        self.postings.push(Posting {
            method: PostingMethod::Acquisition,
            kind: event.kind,
            notes: event.notes,
            location: event.location,
            timestamp: event.timestamp,
            asset: event.asset,
            amount: event.amount,
            taxable,
            price,
            taxable_amount_ratio: Decimal::ONE,
            count_entire_amount_spend: false,
            count_cost_basis_pnl: false,
            extra: event.extra,
        });
    }

    fn get_prices_for_swap(&self, query: &SwapPriceQuery) -> Option<SwapPrices> {
        let out_price = self.resolve_price(&query.asset_out, query.timestamp);
        let in_price = self.resolve_price(&query.asset_in, query.timestamp);
        match (out_price, in_price) {
            (Some(out_price), Some(in_price)) => Some(SwapPrices {
                out_price,
                in_price,
            }),
            // One missing leg is derived from the other via the amount ratio
            (Some(out_price), None) if !query.amount_in.is_zero() => Some(SwapPrices {
                out_price,
                in_price: out_price * query.amount_out / query.amount_in,
            }),
            (None, Some(in_price)) if !query.amount_out.is_zero() => Some(SwapPrices {
                out_price: in_price * query.amount_in / query.amount_out,
                in_price,
            }),
            _ => None,
        }
    }
}
