//! Currency-to-Instrument Mapper
//!
//! Attaches the forex pairs an event's currency moves. Overrides win over the
//! auto table; currencies with no entry are annotated `N/A`.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::models::{AffectedPairs, AnnotatedEvent, EventRecord};

type PairTable = BTreeMap<String, Vec<String>>;

static DEFAULT_AUTO_MAPPING: Lazy<PairTable> = Lazy::new(|| {
    let table: &[(&str, &[&str])] = &[
        ("USD", &["EURUSD", "GBPUSD", "USDJPY", "USDCHF", "AUDUSD", "NZDUSD", "USDCAD"]),
        ("EUR", &["EURUSD", "EURGBP", "EURJPY", "EURCHF", "EURAUD"]),
        ("GBP", &["GBPUSD", "EURGBP", "GBPJPY", "GBPCHF", "GBPAUD"]),
        ("JPY", &["USDJPY", "EURJPY", "GBPJPY", "AUDJPY", "NZDJPY"]),
        ("CHF", &["USDCHF", "EURCHF", "GBPCHF", "CHFJPY"]),
        ("AUD", &["AUDUSD", "EURAUD", "GBPAUD", "AUDJPY", "AUDNZD"]),
        ("NZD", &["NZDUSD", "NZDJPY", "AUDNZD"]),
        ("CAD", &["USDCAD", "CADJPY"]),
    ];
    table
        .iter()
        .map(|(currency, pairs)| {
            (
                currency.to_string(),
                pairs.iter().map(|p| p.to_string()).collect(),
            )
        })
        .collect()
});

/// `[symbol_mapping]` config section
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SymbolMappingConfig {
    /// Replaces the built-in table when non-empty
    pub auto_mapping: PairTable,
    pub custom_overrides: PairTable,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SymbolMapper {
    auto: PairTable,
    overrides: PairTable,
}

impl Default for SymbolMapper {
    fn default() -> Self {
        Self {
            auto: DEFAULT_AUTO_MAPPING.clone(),
            overrides: PairTable::new(),
        }
    }
}

fn normalize_table(table: &PairTable) -> PairTable {
    table
        .iter()
        .map(|(currency, pairs)| {
            (
                currency.trim().to_uppercase(),
                pairs.iter().map(|p| p.trim().to_uppercase()).collect(),
            )
        })
        .collect()
}

impl SymbolMapper {
    pub fn from_config(config: &SymbolMappingConfig) -> Self {
        let auto = if config.auto_mapping.is_empty() {
            DEFAULT_AUTO_MAPPING.clone()
        } else {
            normalize_table(&config.auto_mapping)
        };
        Self {
            auto,
            overrides: normalize_table(&config.custom_overrides),
        }
    }

    /// Pairs affected by `currency`
    pub fn pairs_for(&self, currency: &str) -> AffectedPairs {
        let key = currency.trim().to_uppercase();
        match self.overrides.get(&key).or_else(|| self.auto.get(&key)) {
            Some(pairs) if !pairs.is_empty() => AffectedPairs::Pairs(pairs.clone()),
            _ => AffectedPairs::Unmapped,
        }
    }

    pub fn annotate(&self, records: &[EventRecord]) -> Vec<AnnotatedEvent> {
        records
            .iter()
            .map(|event| AnnotatedEvent {
                affected_pairs: self.pairs_for(&event.currency),
                event: event.clone(),
            })
            .collect()
    }

    pub fn add_override(&mut self, currency: &str, pairs: Vec<String>) {
        self.overrides.insert(
            currency.trim().to_uppercase(),
            pairs.into_iter().map(|p| p.trim().to_uppercase()).collect(),
        );
    }

    /// Returns whether an override existed
    pub fn remove_override(&mut self, currency: &str) -> bool {
        self.overrides
            .remove(&currency.trim().to_uppercase())
            .is_some()
    }

    /// Every currency with a mapping, sorted
    pub fn currencies(&self) -> Vec<String> {
        self.auto
            .keys()
            .chain(self.overrides.keys())
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Effective table: auto entries with overrides applied
    pub fn all_mappings(&self) -> PairTable {
        let mut merged = self.auto.clone();
        merged.extend(self.overrides.clone());
        merged
    }

    pub fn is_override(&self, currency: &str) -> bool {
        self.overrides.contains_key(&currency.trim().to_uppercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Impact, NOT_AVAILABLE};
    use chrono::NaiveDate;

    fn record(currency: &str) -> EventRecord {
        EventRecord {
            timestamp: NaiveDate::from_ymd_opt(2025, 3, 5)
                .unwrap()
                .and_hms_opt(10, 0, 0)
                .unwrap(),
            title: "CPI y/y".to_string(),
            country: "Unknown".to_string(),
            currency: currency.to_string(),
            impact: Impact::High,
            actual: NOT_AVAILABLE.to_string(),
            forecast: NOT_AVAILABLE.to_string(),
            previous: NOT_AVAILABLE.to_string(),
            notice: None,
        }
    }

    #[test]
    fn default_table_and_sentinel() {
        let mapper = SymbolMapper::default();
        assert_eq!(
            mapper.pairs_for("cad").to_string(),
            "USDCAD, CADJPY"
        );
        assert_eq!(mapper.pairs_for("CNY"), AffectedPairs::Unmapped);
        assert_eq!(mapper.pairs_for("").to_string(), "N/A");
    }

    #[test]
    fn overrides_take_precedence() {
        let config = SymbolMappingConfig {
            auto_mapping: PairTable::new(),
            custom_overrides: BTreeMap::from([(
                "usd".to_string(),
                vec!["xauusd".to_string()],
            )]),
        };
        let mut mapper = SymbolMapper::from_config(&config);
        assert_eq!(mapper.pairs_for("USD").to_string(), "XAUUSD");
        assert!(mapper.is_override("USD"));

        assert!(mapper.remove_override("USD"));
        assert!(!mapper.remove_override("USD"));
        assert!(mapper.pairs_for("USD").to_string().starts_with("EURUSD"));
    }

    #[test]
    fn config_table_replaces_defaults() {
        let config = SymbolMappingConfig {
            auto_mapping: BTreeMap::from([("USD".to_string(), vec!["EURUSD".to_string()])]),
            custom_overrides: PairTable::new(),
        };
        let mapper = SymbolMapper::from_config(&config);
        assert_eq!(mapper.currencies(), vec!["USD".to_string()]);
        assert_eq!(mapper.pairs_for("EUR"), AffectedPairs::Unmapped);
    }

    #[test]
    fn annotate_and_merged_view() {
        let mut mapper = SymbolMapper::default();
        mapper.add_override("CNY", vec!["USDCNH".to_string()]);

        let annotated = mapper.annotate(&[record("CNY"), record("BRL")]);
        assert_eq!(annotated[0].affected_pairs.to_string(), "USDCNH");
        assert_eq!(annotated[1].affected_pairs, AffectedPairs::Unmapped);

        let all = mapper.all_mappings();
        assert_eq!(all.len(), 9);
        assert!(mapper.currencies().contains(&"CNY".to_string()));
    }
}
