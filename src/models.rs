use std::collections::BTreeMap;

use chrono::NaiveDate;
use strum_macros::{Display, EnumIter, EnumString};

/// Closed set of asset categories every holding maps into.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display, EnumString, EnumIter,
)]
pub enum Category {
    #[strum(serialize = "US_EQUITY")]
    UsEquity,
    #[strum(serialize = "DOMESTIC_EQUITY")]
    DomesticEquity,
    #[strum(serialize = "FIXED_INCOME")]
    FixedIncome,
    #[strum(serialize = "GOLD")]
    Gold,
    #[strum(serialize = "SILVER")]
    Silver,
    #[strum(serialize = "BITCOIN_PROXY")]
    BitcoinProxy,
    #[strum(serialize = "ETHER_PROXY")]
    EtherProxy,
    #[strum(serialize = "BRAZIL_EQUITY")]
    BrazilEquity,
    #[strum(serialize = "COMMODITIES")]
    Commodities,
    #[strum(serialize = "CASH_EQUIVALENT")]
    CashEquivalent,
    #[strum(serialize = "UNCLASSIFIED")]
    Unclassified,
}

impl Category {
    /// Human-readable name for tables and reports.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::UsEquity => "USA/Tech",
            Self::DomesticEquity => "Argentina (MERV)",
            Self::FixedIncome => "Fixed Income",
            Self::Gold => "Gold",
            Self::Silver => "Silver",
            Self::BitcoinProxy => "Crypto - Bitcoin",
            Self::EtherProxy => "Crypto - Ethereum",
            Self::BrazilEquity => "Brazil",
            Self::Commodities => "Commodities/Miners",
            Self::CashEquivalent => "Cash",
            Self::Unclassified => "Unclassified",
        }
    }
}

/// One position parsed from a broker export row, before aggregation.
#[derive(Debug, Clone)]
pub struct Holding {
    pub ticker: String,
    pub description: String,
    pub quantity: f64,
    pub market_value: f64,
}

/// Metadata extracted from a broker export filename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMetadata {
    pub account_id: String,
    pub holder_name: String,
    pub as_of_date: NaiveDate,
}

/// Point-in-time aggregation of one account's holdings. Immutable once built.
#[derive(Debug, Clone)]
pub struct PortfolioSnapshot {
    pub account_id: String,
    pub holder_name: String,
    pub as_of_date: NaiveDate,
    pub category_totals: BTreeMap<Category, f64>,
    pub total_value: f64,
}

impl PortfolioSnapshot {
    /// Percentage of total per category. Empty map when the total is zero.
    pub fn allocation_pct(&self) -> BTreeMap<Category, f64> {
        if self.total_value == 0.0 {
            return BTreeMap::new();
        }
        self.category_totals
            .iter()
            .map(|(cat, value)| (*cat, value / self.total_value * 100.0))
            .collect()
    }
}

/// One history-store detail row: one category of one snapshot.
#[derive(Debug, Clone)]
pub struct DetailRow {
    pub date: NaiveDate,
    pub account_id: String,
    pub holder_name: String,
    pub category: Category,
    pub value: f64,
    pub pct: f64,
    pub total_value: f64,
}

/// One history-store summary row: one snapshot.
#[derive(Debug, Clone)]
pub struct SummaryRow {
    pub date: NaiveDate,
    pub account_id: String,
    pub holder_name: String,
    pub total_value: f64,
    pub pct_change: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum DeviationStatus {
    #[strum(serialize = "OK")]
    WithinTolerance,
    #[strum(serialize = "OVER")]
    Over,
    #[strum(serialize = "UNDER")]
    Under,
}

/// One category's line in a deviation report.
#[derive(Debug, Clone)]
pub struct DeviationRow {
    pub category: Category,
    pub target_pct: f64,
    pub actual_pct: f64,
    pub deviation: f64,
    pub status: DeviationStatus,
    /// Signed amount: positive means reduce this category, negative increase.
    pub suggested_adjustment: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum RebalanceAction {
    #[strum(serialize = "REDUCE")]
    Reduce,
    #[strum(serialize = "INCREASE")]
    Increase,
}

/// Rebalancing suggestion for one out-of-tolerance category.
#[derive(Debug, Clone)]
pub struct Suggestion {
    pub action: RebalanceAction,
    pub category: Category,
    pub amount: f64,
    pub deviation_pct: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use strum::IntoEnumIterator;

    #[test]
    fn test_category_string_roundtrip() {
        for cat in Category::iter() {
            let s = cat.to_string();
            assert_eq!(Category::from_str(&s).unwrap(), cat);
        }
    }

    #[test]
    fn test_category_set_is_closed_at_eleven() {
        assert_eq!(Category::iter().count(), 11);
    }

    #[test]
    fn test_allocation_pct_sums_to_100() {
        let mut totals = BTreeMap::new();
        totals.insert(Category::UsEquity, 350_000.0);
        totals.insert(Category::DomesticEquity, 200_000.0);
        totals.insert(Category::CashEquivalent, 330_000.0);
        let snap = PortfolioSnapshot {
            account_id: "34491".to_string(),
            holder_name: "LOPEZ_JUAN ANTONIO".to_string(),
            as_of_date: NaiveDate::from_ymd_opt(2026, 1, 10).unwrap(),
            category_totals: totals,
            total_value: 880_000.0,
        };
        let pcts = snap.allocation_pct();
        let sum: f64 = pcts.values().sum();
        assert!((sum - 100.0).abs() < 0.01);
        assert!((pcts[&Category::UsEquity] - 39.7727).abs() < 0.001);
    }

    #[test]
    fn test_allocation_pct_empty_when_zero_total() {
        let snap = PortfolioSnapshot {
            account_id: "1".to_string(),
            holder_name: String::new(),
            as_of_date: NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
            category_totals: BTreeMap::new(),
            total_value: 0.0,
        };
        assert!(snap.allocation_pct().is_empty());
    }
}
