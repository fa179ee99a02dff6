// src/normalize/filter.rs
use serde::{Deserialize, Serialize};

use super::NormalizedRecord;

/// Inclusion lists for currency codes and impact colors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllowLists {
    pub currencies: Vec<String>,
    pub impacts: Vec<String>,
}

impl Default for AllowLists {
    fn default() -> Self {
        Self {
            currencies: ["AUD", "CAD", "CHF", "CNY", "EUR", "GBP", "JPY", "NZD", "USD"]
                .into_iter()
                .map(String::from)
                .collect(),
            impacts: ["red", "orange", "yellow"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

fn is_listed(value: &str, list: &[String]) -> bool {
    list.iter().any(|w| w.eq_ignore_ascii_case(value))
}

/// Keeps only records whose currency and impact are both allow-listed.
#[derive(Debug, Clone)]
pub struct RecordFilter {
    lists: AllowLists,
}

impl RecordFilter {
    pub fn new(lists: AllowLists) -> Self {
        Self { lists }
    }

    pub fn accept(&self, record: &NormalizedRecord) -> bool {
        if !is_listed(&record.currency, &self.lists.currencies) {
            return false;
        }
        is_listed(&record.impact.to_lowercase(), &self.lists.impacts)
    }

    pub fn allow_lists(&self) -> &AllowLists {
        &self.lists
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(currency: &str, impact: &str) -> NormalizedRecord {
        NormalizedRecord {
            currency: currency.into(),
            impact: impact.into(),
            event: "CPI m/m".into(),
            ..Default::default()
        }
    }

    fn usd_red_only() -> RecordFilter {
        RecordFilter::new(AllowLists {
            currencies: vec!["USD".into()],
            impacts: vec!["red".into()],
        })
    }

    #[test]
    fn accepts_listed_pair_regardless_of_impact_case() {
        let f = usd_red_only();
        assert!(f.accept(&record("USD", "red")));
        assert!(f.accept(&record("USD", "Red")));
    }

    #[test]
    fn rejects_unlisted_currency_or_impact() {
        let f = usd_red_only();
        assert!(!f.accept(&record("EUR", "red")));
        assert!(!f.accept(&record("USD", "yellow")));
        assert!(!f.accept(&record("", "")));
    }

    #[test]
    fn empty_lists_reject_everything() {
        let f = RecordFilter::new(AllowLists {
            currencies: vec![],
            impacts: vec![],
        });
        assert!(!f.accept(&record("USD", "red")));
    }
}
