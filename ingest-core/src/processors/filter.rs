//! Whitelist transaction filter
//!
//! Filtering narrows which transactions reach the transaction processors;
//! change processors always see every entry change, so state tables stay
//! complete regardless of filter settings.

use crate::config::FilterConfig;
use crate::readers::LedgerTransaction;
use ledger_meta::{Asset, Operation};
use std::collections::HashSet;

/// Account/asset whitelist applied to transaction-level ingestion
#[derive(Debug, Clone)]
pub struct TransactionFilter {
    enabled: bool,
    accounts: HashSet<String>,
    assets: HashSet<String>,
}

impl TransactionFilter {
    /// Build from configuration
    pub fn from_config(config: &FilterConfig) -> Self {
        Self {
            enabled: config.enabled,
            accounts: config.whitelist_accounts.iter().cloned().collect(),
            assets: config.whitelist_assets.iter().cloned().collect(),
        }
    }

    /// A disabled filter that includes everything
    pub fn pass_all() -> Self {
        Self {
            enabled: false,
            accounts: HashSet::new(),
            assets: HashSet::new(),
        }
    }

    /// Whether a transaction passes the whitelist
    ///
    /// A transaction is included when its source account, any account an
    /// operation touches, or any asset an operation moves is whitelisted.
    pub fn include(&self, tx: &LedgerTransaction) -> bool {
        if !self.enabled {
            return true;
        }
        if self.accounts.contains(&tx.envelope.source_account) {
            return true;
        }
        tx.envelope.operations.iter().any(|op| self.matches(op))
    }

    fn matches(&self, op: &Operation) -> bool {
        match op {
            Operation::CreateAccount { destination, .. } => self.accounts.contains(destination),
            Operation::Payment {
                destination, asset, ..
            } => self.accounts.contains(destination) || self.matches_asset(asset),
            Operation::ChangeTrust { asset, .. } => self.matches_asset(asset),
            Operation::ManageOffer {
                selling, buying, ..
            } => self.matches_asset(selling) || self.matches_asset(buying),
            Operation::CreateClaimableBalance {
                asset, claimants, ..
            } => {
                self.matches_asset(asset) || claimants.iter().any(|c| self.accounts.contains(c))
            }
            Operation::ClaimClaimableBalance { .. } => false,
        }
    }

    fn matches_asset(&self, asset: &Asset) -> bool {
        self.assets.contains(&asset.canonical())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledger_meta::{TransactionEnvelope, TransactionResult};

    fn tx(source: &str, operations: Vec<Operation>) -> LedgerTransaction {
        LedgerTransaction {
            index: 1,
            hash: "ab".repeat(32),
            envelope: TransactionEnvelope {
                source_account: source.to_string(),
                fee: 100,
                seq_num: 1,
                operations,
                memo: None,
            },
            result: TransactionResult {
                successful: true,
                fee_charged: 100,
            },
            fee_changes: vec![],
            operations: vec![],
        }
    }

    fn filter(accounts: &[&str], assets: &[&str]) -> TransactionFilter {
        TransactionFilter::from_config(&FilterConfig {
            enabled: true,
            whitelist_accounts: accounts.iter().map(|s| s.to_string()).collect(),
            whitelist_assets: assets.iter().map(|s| s.to_string()).collect(),
        })
    }

    #[test]
    fn test_disabled_filter_includes_everything() {
        let filter = TransactionFilter::pass_all();
        assert!(filter.include(&tx("GANY", vec![])));
    }

    #[test]
    fn test_source_account_match() {
        let filter = filter(&["GAAA"], &[]);
        assert!(filter.include(&tx("GAAA", vec![])));
        assert!(!filter.include(&tx("GBBB", vec![])));
    }

    #[test]
    fn test_operation_destination_match() {
        let filter = filter(&["GDST"], &[]);
        let included = tx(
            "GSRC",
            vec![Operation::Payment {
                destination: "GDST".to_string(),
                asset: Asset::Native,
                amount: 5,
            }],
        );
        assert!(filter.include(&included));
    }

    #[test]
    fn test_asset_match_uses_canonical_form() {
        let filter = filter(&[], &["USD:GISSUER"]);
        let included = tx(
            "GSRC",
            vec![Operation::ChangeTrust {
                asset: Asset::Credit {
                    code: "USD".to_string(),
                    issuer: "GISSUER".to_string(),
                },
                limit: 100,
            }],
        );
        let excluded = tx(
            "GSRC",
            vec![Operation::ChangeTrust {
                asset: Asset::Native,
                limit: 100,
            }],
        );
        assert!(filter.include(&included));
        assert!(!filter.include(&excluded));
    }
}
