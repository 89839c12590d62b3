use crate::schema::{
    CategoryAggregate, PeriodData, PeriodSummary, SubscriptionCandidate, SubscriptionSummary,
    Transaction,
};
use log::{debug, warn};
use rust_decimal::prelude::*;
use serde_json::Value;
use std::collections::HashMap;

/// Fields the model is not trusted to compute. They never survive into the
/// passthrough map of a summary.
const COMPUTED_FIELDS: &[&str] = &[
    "totalSpend",
    "formattedTotal",
    "categoryBreakdown",
    "subscriptions",
    "possibleSubscriptions",
];

/// Recomputes every derived figure of a period from its raw transactions.
///
/// Stateless: the same input always yields the same summary, and the input is
/// never modified.
pub struct MetricsRecalculator;

impl MetricsRecalculator {
    /// Returns `None` when the period has no transaction sequence, or when
    /// its totals overflow `f64`.
    pub fn compute(data: &PeriodData) -> Option<PeriodSummary> {
        let transactions = data.transactions.as_ref()?;

        let spend: Vec<&Transaction> = transactions.iter().filter(|t| t.is_spend()).collect();
        let total_spend: f64 = spend.iter().map(|t| t.amount.abs()).sum();
        let subscription_total: f64 = data
            .possible_subscriptions
            .iter()
            .map(|s| s.amount.abs())
            .sum();

        if !total_spend.is_finite() || !subscription_total.is_finite() {
            warn!(
                "Totals for period '{}' overflow, discarding it",
                data.period.as_deref().unwrap_or_default()
            );
            return None;
        }

        let undated = transactions
            .iter()
            .filter(|t| t.parsed_date().is_none())
            .count();
        if undated > 0 {
            warn!(
                "{} of {} transactions in period '{}' have no recognisable date",
                undated,
                transactions.len(),
                data.period.as_deref().unwrap_or_default()
            );
        }

        let category_breakdown = Self::category_breakdown(&spend, total_spend);
        let subscriptions =
            Self::summarize_subscriptions(&data.possible_subscriptions, subscription_total);

        let mut extra = data.extra.clone();
        extra.retain(|key, _| !COMPUTED_FIELDS.contains(&key.as_str()));

        let total_spend = round2(total_spend);

        debug!(
            "Recalculated period '{}': {} transactions, {} spend, {} categories, total {}",
            data.period.as_deref().unwrap_or_default(),
            transactions.len(),
            spend.len(),
            category_breakdown.len(),
            total_spend
        );

        Some(PeriodSummary {
            period: data.period.clone().unwrap_or_default(),
            total_spend,
            formatted_total: format_currency(&data.currency, total_spend),
            currency: data.currency.clone(),
            transactions: transactions.clone(),
            category_breakdown,
            subscriptions,
            extra,
        })
    }

    /// Deserializes a raw period object and recomputes it.
    ///
    /// Anything that is not a JSON object, or whose `transactions` is not an
    /// array, yields `None`.
    pub fn compute_value(value: &Value) -> Option<PeriodSummary> {
        if !value.is_object() {
            return None;
        }

        match serde_json::from_value::<PeriodData>(value.clone()) {
            Ok(data) => Self::compute(&data),
            Err(e) => {
                warn!("Discarding malformed period: {}", e);
                None
            }
        }
    }

    fn category_breakdown(spend: &[&Transaction], total_spend: f64) -> Vec<CategoryAggregate> {
        // (name, raw amount, emoji) in first-seen order
        let mut groups: Vec<(&str, f64, &str)> = Vec::new();
        let mut index: HashMap<&str, usize> = HashMap::new();

        for tx in spend {
            match index.get(tx.category.as_str()) {
                Some(&i) => groups[i].1 += tx.amount.abs(),
                None => {
                    index.insert(tx.category.as_str(), groups.len());
                    groups.push((tx.category.as_str(), tx.amount.abs(), tx.emoji.as_str()));
                }
            }
        }

        let mut breakdown: Vec<CategoryAggregate> = groups
            .into_iter()
            .map(|(name, raw, emoji)| CategoryAggregate {
                name: name.to_string(),
                amount: round2(raw),
                percentage: if total_spend > 0.0 {
                    round2(raw / total_spend * 100.0)
                } else {
                    0.0
                },
                emoji: emoji.to_string(),
            })
            .collect();

        // ordered by the reported amount; sort_by is stable so ties keep first-seen order
        breakdown.sort_by(|a, b| b.amount.total_cmp(&a.amount));
        breakdown
    }

    fn summarize_subscriptions(
        candidates: &[SubscriptionCandidate],
        total: f64,
    ) -> SubscriptionSummary {
        SubscriptionSummary {
            count: candidates.len(),
            total: round2(total),
            list: candidates.to_vec(),
        }
    }
}

pub fn compute(data: &PeriodData) -> Option<PeriodSummary> {
    MetricsRecalculator::compute(data)
}

pub fn compute_value(value: &Value) -> Option<PeriodSummary> {
    MetricsRecalculator::compute_value(value)
}

/// Rounds half away from zero to two decimal places.
///
/// Goes through `Decimal` so `1.005` rounds to `1.01` rather than following
/// its binary expansion down. Values outside `Decimal`'s range carry no
/// fractional digits and are returned unchanged.
pub fn round2(value: f64) -> f64 {
    Decimal::from_f64(value)
        .map(|d| d.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero))
        .and_then(|d| d.to_string().parse().ok())
        .unwrap_or(value)
}

pub fn format_currency(currency: &str, amount: f64) -> String {
    format!("{}{:.2}", currency, round2(amount))
}
