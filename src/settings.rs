use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::io::Read;

/// Categories of ledger actions the user may mark as taxable income
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LedgerActionKind {
    Airdrop,
    Gift,
    Donation,
    Income,
}

/// User configuration governing one accounting run.
///
/// Loaded from JSON or built in code; every field has a default so partial
/// configuration files are accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccountingSettings {
    /// Currency all profit and loss is expressed in
    pub profit_currency: String,
    /// Whether gas fees count as taxable spends
    pub include_gas_costs: bool,
    /// Whether crypto-to-crypto disposals realise cost-basis PNL
    pub include_crypto2crypto: bool,
    /// Whether swap fees are folded into the acquisition cost basis
    /// instead of being booked as taxable spends
    pub include_fees_in_cost_basis: bool,
    /// Ledger action categories treated as taxable on receipt
    pub taxable_ledger_actions: HashSet<LedgerActionKind>,
}

impl Default for AccountingSettings {
    fn default() -> Self {
        AccountingSettings {
            profit_currency: "EUR".to_string(),
            include_gas_costs: true,
            include_crypto2crypto: true,
            include_fees_in_cost_basis: true,
            taxable_ledger_actions: HashSet::from([
                LedgerActionKind::Airdrop,
                LedgerActionKind::Income,
            ]),
        }
    }
}

impl AccountingSettings {
    /// Read settings from JSON
    pub fn from_reader<R: Read>(reader: R) -> anyhow::Result<AccountingSettings> {
        let settings = serde_json::from_reader(reader)?;
        Ok(settings)
    }

    pub fn airdrops_are_taxable(&self) -> bool {
        self.taxable_ledger_actions
            .contains(&LedgerActionKind::Airdrop)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let settings = AccountingSettings::default();
        assert_eq!(settings.profit_currency, "EUR");
        assert!(settings.include_gas_costs);
        assert!(settings.include_crypto2crypto);
        assert!(settings.include_fees_in_cost_basis);
        assert!(settings.airdrops_are_taxable());
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let json = r#"{
            "profit_currency": "USD",
            "include_gas_costs": false
        }"#;
        let settings = AccountingSettings::from_reader(json.as_bytes()).unwrap();
        assert_eq!(settings.profit_currency, "USD");
        assert!(!settings.include_gas_costs);
        // untouched fields keep their defaults
        assert!(settings.include_crypto2crypto);
        assert!(settings.airdrops_are_taxable());
    }

    #[test]
    fn taxable_actions_from_json() {
        let json = r#"{ "taxable_ledger_actions": ["Gift"] }"#;
        let settings = AccountingSettings::from_reader(json.as_bytes()).unwrap();
        assert!(!settings.airdrops_are_taxable());
        assert!(settings
            .taxable_ledger_actions
            .contains(&LedgerActionKind::Gift));
    }
}
