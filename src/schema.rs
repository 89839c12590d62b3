use chrono::NaiveDate;
use log::warn;
use schemars::gen::SchemaSettings;
use schemars::JsonSchema;
use serde::de::Deserializer;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Keys the Gemini `responseSchema` object understands. Everything else that
/// schemars emits (`$schema`, `format`, `default`, `title`, ...) is stripped.
const GEMINI_SCHEMA_KEYS: &[&str] = &[
    "type",
    "description",
    "nullable",
    "enum",
    "properties",
    "required",
    "items",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d %b %Y", "%b %d, %Y", "%d/%m/%Y"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Period {
    Weekly,
    Monthly,
    Yearly,
}

impl Period {
    pub const ALL: [Period; 3] = [Period::Weekly, Period::Monthly, Period::Yearly];

    pub fn as_str(&self) -> &'static str {
        match self {
            Period::Weekly => "weekly",
            Period::Monthly => "monthly",
            Period::Yearly => "yearly",
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Transaction {
    #[serde(default, deserialize_with = "string_or_default")]
    #[schemars(description = "Booking date of the transaction in YYYY-MM-DD format.")]
    pub date: String,

    #[serde(default, deserialize_with = "string_or_default")]
    #[schemars(
        description = "Merchant or counterparty as printed on the statement, cleaned of reference numbers."
    )]
    pub description: String,

    #[serde(default, deserialize_with = "lenient_amount")]
    #[schemars(
        with = "f64",
        description = "Signed amount. Money leaving the account (purchases, fees, transfers out) is NEGATIVE. Money entering the account (salary, refunds, transfers in) is POSITIVE."
    )]
    pub amount: f64,

    #[serde(default = "default_category", deserialize_with = "category_or_default")]
    #[schemars(
        description = "Spending category, e.g. Groceries, Dining, Transport, Shopping, Bills, Entertainment, Health, Income, Transfers, Other."
    )]
    pub category: String,

    #[serde(default, deserialize_with = "string_or_default")]
    #[schemars(description = "A single emoji representing the category, e.g. 🛒 for Groceries.")]
    pub emoji: String,
}

impl Transaction {
    pub fn is_spend(&self) -> bool {
        self.amount < 0.0
    }

    /// The booking date, if the model produced one in a recognisable layout.
    pub fn parsed_date(&self) -> Option<NaiveDate> {
        let raw = self.date.trim();
        DATE_FORMATS
            .iter()
            .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SubscriptionCandidate {
    #[serde(default, deserialize_with = "string_or_default")]
    #[schemars(description = "Name of the recurring service, e.g. Netflix, Spotify, Gym membership.")]
    pub name: String,

    #[serde(default, deserialize_with = "lenient_amount")]
    #[schemars(
        with = "f64",
        description = "Amount charged per occurrence, signed like transactions (negative for charges)."
    )]
    pub amount: f64,

    #[serde(default, deserialize_with = "string_or_default")]
    #[schemars(description = "A single emoji representing the service.")]
    pub emoji: String,
}

/// One analysis window as the model is asked to return it.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedPeriod {
    #[schemars(
        description = "Human readable label of the window covered, e.g. 'Week of 2024-03-04' or 'March 2024' or '2024'."
    )]
    pub period: String,

    #[schemars(description = "Currency symbol used on the statement, e.g. $, €, £.")]
    pub currency: String,

    #[schemars(description = "Every transaction that falls inside this window, in statement order.")]
    pub transactions: Vec<Transaction>,

    #[schemars(
        description = "Charges that look like recurring subscriptions (same merchant, similar amount, regular interval)."
    )]
    pub possible_subscriptions: Vec<SubscriptionCandidate>,
}

/// Top-level shape requested from the model.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct StatementAnalysis {
    #[schemars(description = "The most recent 7 days covered by the statements.")]
    pub weekly: ExtractedPeriod,

    #[schemars(description = "The most recent calendar month covered by the statements.")]
    pub monthly: ExtractedPeriod,

    #[schemars(description = "The full period covered by the statements, up to one year.")]
    pub yearly: ExtractedPeriod,
}

impl StatementAnalysis {
    pub fn generate_json_schema() -> schemars::schema::RootSchema {
        SchemaSettings::openapi3()
            .with(|s| {
                s.inline_subschemas = true;
                s.meta_schema = None;
            })
            .into_generator()
            .into_root_schema_for::<StatementAnalysis>()
    }

    /// Schema in the OpenAPI subset accepted by Gemini's `responseSchema`.
    pub fn response_schema() -> Result<Value, serde_json::Error> {
        let mut value = serde_json::to_value(Self::generate_json_schema())?;
        sanitize_schema(&mut value);
        Ok(value)
    }

    pub fn schema_as_json() -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&Self::response_schema()?)
    }
}

fn sanitize_schema(value: &mut Value) {
    let Value::Object(map) = value else {
        return;
    };

    // schemars wraps described subschemas in a single-element allOf
    if let Some(Value::Array(mut all_of)) = map.remove("allOf") {
        if all_of.len() == 1 {
            if let Value::Object(inner) = all_of.remove(0) {
                for (key, val) in inner {
                    map.entry(key).or_insert(val);
                }
            }
        }
    }

    map.retain(|key, _| GEMINI_SCHEMA_KEYS.contains(&key.as_str()));

    if let Some(Value::Object(props)) = map.get_mut("properties") {
        for prop in props.values_mut() {
            sanitize_schema(prop);
        }
    }
    if let Some(items) = map.get_mut("items") {
        sanitize_schema(items);
    }
}

/// Recalculator input: one period of untrusted model output.
///
/// `transactions` is `None` when the field is missing, `null`, or not an
/// array. Fields this crate does not know about are kept in `extra` and
/// passed through to the summary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodData {
    #[serde(default, deserialize_with = "optional_string")]
    pub period: Option<String>,

    #[serde(default, deserialize_with = "string_or_default")]
    pub currency: String,

    #[serde(default, deserialize_with = "sequence_or_none")]
    pub transactions: Option<Vec<Transaction>>,

    #[serde(default, deserialize_with = "sequence_or_empty")]
    pub possible_subscriptions: Vec<SubscriptionCandidate>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryAggregate {
    pub name: String,
    pub amount: f64,
    pub percentage: f64,
    pub emoji: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionSummary {
    pub count: usize,
    pub total: f64,
    pub list: Vec<SubscriptionCandidate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodSummary {
    pub period: String,
    pub total_spend: f64,
    pub formatted_total: String,
    pub currency: String,
    pub transactions: Vec<Transaction>,
    pub category_breakdown: Vec<CategoryAggregate>,
    pub subscriptions: SubscriptionSummary,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl PeriodSummary {
    /// Placeholder used when the model returned an unusable period.
    pub fn empty(period: impl Into<String>, currency: impl Into<String>) -> Self {
        let currency = currency.into();
        Self {
            period: period.into(),
            total_spend: 0.0,
            formatted_total: crate::metrics::format_currency(&currency, 0.0),
            currency,
            transactions: Vec::new(),
            category_breakdown: Vec::new(),
            subscriptions: SubscriptionSummary::default(),
            extra: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpendingReport {
    pub weekly: PeriodSummary,
    pub monthly: PeriodSummary,
    pub yearly: PeriodSummary,
}

impl SpendingReport {
    pub fn get(&self, period: Period) -> &PeriodSummary {
        match period {
            Period::Weekly => &self.weekly,
            Period::Monthly => &self.monthly,
            Period::Yearly => &self.yearly,
        }
    }
}

fn default_category() -> String {
    "Other".to_string()
}

fn string_or_default<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(value_to_string(Value::deserialize(deserializer)?).unwrap_or_default())
}

fn optional_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(value_to_string(Value::deserialize(deserializer)?))
}

fn category_or_default<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(value_to_string(Value::deserialize(deserializer)?)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(default_category))
}

fn value_to_string(value: Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn lenient_amount<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match &value {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => parse_amount(s).unwrap_or_else(|| {
            warn!("Unparseable amount '{}', treating as 0", s);
            0.0
        }),
        _ => 0.0,
    })
}

/// Parses statement-style amounts such as `"-1,234.50"`, `"$12.00"` or `"(45.10)"`.
pub fn parse_amount(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    let (negated, body) = match trimmed
        .strip_prefix('(')
        .and_then(|s| s.strip_suffix(')'))
    {
        Some(inner) => (true, inner),
        None => (false, trimmed),
    };

    let cleaned: String = body
        .chars()
        .filter(|c| c.is_ascii_digit() || matches!(c, '.' | '-' | '+'))
        .collect();
    let value: f64 = cleaned.parse().ok()?;

    if !value.is_finite() {
        return None;
    }
    Some(if negated { -value.abs() } else { value })
}

fn sequence_or_none<'de, D, T>(deserializer: D) -> Result<Option<Vec<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: serde::de::DeserializeOwned,
{
    match Value::deserialize(deserializer)? {
        Value::Array(items) => Ok(Some(collect_valid(items))),
        _ => Ok(None),
    }
}

fn sequence_or_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: serde::de::DeserializeOwned,
{
    Ok(sequence_or_none(deserializer)?.unwrap_or_default())
}

fn collect_valid<T: serde::de::DeserializeOwned>(items: Vec<Value>) -> Vec<T> {
    let total = items.len();
    let parsed: Vec<T> = items
        .into_iter()
        .filter_map(|item| serde_json::from_value(item).ok())
        .collect();

    if parsed.len() < total {
        warn!(
            "Dropped {} of {} malformed entries from model output",
            total - parsed.len(),
            total
        );
    }
    parsed
}
