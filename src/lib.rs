//! # Statement Insights
//!
//! Turns bank-statement PDFs into weekly, monthly and yearly spending
//! summaries. A Gemini model extracts the raw transactions; every figure shown
//! to the user is then recomputed locally so totals stay consistent no matter
//! what the model returned.
//!
//! ## Core Concepts
//!
//! - **Period**: one of the weekly / monthly / yearly analysis windows
//! - **Spend transaction**: a transaction with a negative signed amount
//! - **Category breakdown**: spend grouped by category, with percentages of the total
//! - **Subscription candidate**: a recurring charge flagged by the model, passed through as-is
//!
//! ## Example
//!
//! ```rust
//! use statement_insights::*;
//! use serde_json::json;
//!
//! let period = json!({
//!     "period": "March 2024",
//!     "currency": "$",
//!     "transactions": [
//!         { "date": "2024-03-01", "description": "Cafe", "amount": -10.0, "category": "Food", "emoji": "🍔" },
//!         { "date": "2024-03-02", "description": "Deli", "amount": -5.0, "category": "Food", "emoji": "🍔" },
//!         { "date": "2024-03-03", "description": "Payroll", "amount": 20.0, "category": "Salary", "emoji": "💰" }
//!     ],
//!     "possibleSubscriptions": []
//! });
//!
//! let summary = compute_value(&period).unwrap();
//! assert_eq!(summary.formatted_total, "$15.00");
//! assert_eq!(summary.category_breakdown[0].percentage, 100.0);
//! ```

pub mod error;
pub mod metrics;
pub mod schema;

#[cfg(feature = "gemini")]
pub mod config;
#[cfg(feature = "gemini")]
pub mod llm;
#[cfg(feature = "server")]
pub mod server;

pub use error::{InsightsError, Result};
pub use metrics::{compute, compute_value, format_currency, round2, MetricsRecalculator};
pub use schema::*;
