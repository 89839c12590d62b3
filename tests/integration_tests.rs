use serde_json::{json, Value};
use statement_insights::*;

fn realistic_month() -> Value {
    json!({
        "period": "March 2024",
        "currency": "$",
        "transactions": [
            { "date": "2024-03-01", "description": "Payroll ACME", "amount": 3200.00, "category": "Income", "emoji": "💰" },
            { "date": "2024-03-02", "description": "Whole Foods", "amount": -84.17, "category": "Groceries", "emoji": "🛒" },
            { "date": "2024-03-03", "description": "Shell", "amount": -45.02, "category": "Transport", "emoji": "⛽" },
            { "date": "2024-03-05", "description": "Netflix", "amount": -15.49, "category": "Entertainment", "emoji": "🎬" },
            { "date": "2024-03-07", "description": "Trader Joe's", "amount": -62.33, "category": "Groceries", "emoji": "🥦" },
            { "date": "2024-03-09", "description": "Chipotle", "amount": -13.85, "category": "Dining", "emoji": "🍽️" },
            { "date": "2024-03-12", "description": "Rent", "amount": -1450.00, "category": "Bills", "emoji": "🏠" },
            { "date": "2024-03-15", "description": "Spotify", "amount": -10.99, "category": "Entertainment", "emoji": "🎵" },
            { "date": "2024-03-18", "description": "Refund Amazon", "amount": 23.99, "category": "Shopping", "emoji": "🛍️" },
            { "date": "2024-03-20", "description": "Uber", "amount": -18.40, "category": "Transport", "emoji": "🚕" },
            { "date": "2024-03-22", "description": "Blue Bottle", "amount": -5.75, "category": "Dining", "emoji": "☕" },
            { "date": "2024-03-28", "description": "Comcast", "amount": -79.99, "category": "Bills", "emoji": "🌐" }
        ],
        "possibleSubscriptions": [
            { "name": "Netflix", "amount": -15.49, "emoji": "🎬" },
            { "name": "Spotify", "amount": -10.99, "emoji": "🎵" },
            { "name": "Comcast", "amount": -79.99, "emoji": "🌐" }
        ]
    })
}

fn spend_of(value: &Value) -> f64 {
    value["transactions"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["amount"].as_f64().unwrap())
        .filter(|a| *a < 0.0)
        .map(f64::abs)
        .sum()
}

#[test]
fn test_realistic_month() {
    let input = realistic_month();
    let summary = compute_value(&input).unwrap();

    let expected_total = round2(spend_of(&input));
    assert_eq!(summary.total_spend, expected_total);
    assert_eq!(summary.formatted_total, format!("${:.2}", expected_total));
    assert_eq!(summary.transactions.len(), 12);

    let names: Vec<&str> = summary
        .category_breakdown
        .iter()
        .map(|c| c.name.as_str())
        .collect();
    assert_eq!(
        names,
        vec!["Bills", "Groceries", "Transport", "Entertainment", "Dining"]
    );

    // income and refunds never form categories
    assert!(!names.contains(&"Income"));
    assert!(!names.contains(&"Shopping"));

    let groceries = &summary.category_breakdown[1];
    assert_eq!(groceries.amount, 146.5);
    assert_eq!(groceries.emoji, "🛒");

    assert_eq!(summary.subscriptions.count, 3);
    assert_eq!(summary.subscriptions.total, 106.47);
}

#[test]
fn test_breakdown_totals_are_consistent() {
    let summary = compute_value(&realistic_month()).unwrap();

    let category_sum: f64 = summary.category_breakdown.iter().map(|c| c.amount).sum();
    let tolerance = 0.01 * summary.category_breakdown.len() as f64;
    assert!(
        (category_sum - summary.total_spend).abs() <= tolerance,
        "categories sum to {}, total is {}",
        category_sum,
        summary.total_spend
    );

    let percentage_sum: f64 = summary
        .category_breakdown
        .iter()
        .map(|c| c.percentage)
        .sum();
    assert!(
        (percentage_sum - 100.0).abs() <= tolerance,
        "percentages sum to {}",
        percentage_sum
    );

    for pair in summary.category_breakdown.windows(2) {
        assert!(pair[0].amount >= pair[1].amount);
    }
    for category in &summary.category_breakdown {
        assert!(category.amount >= 0.0);
        assert!((0.0..=100.0).contains(&category.percentage));
    }
}

#[test]
fn test_subscription_total_matches_list() {
    let summary = compute_value(&realistic_month()).unwrap();

    let list_sum: f64 = summary
        .subscriptions
        .list
        .iter()
        .map(|s| s.amount.abs())
        .sum();
    assert_eq!(summary.subscriptions.total, round2(list_sum));
    assert_eq!(summary.subscriptions.list[0].name, "Netflix");
    assert_eq!(summary.subscriptions.list[0].amount, -15.49);
}

#[test]
fn test_ties_keep_first_seen_order() {
    let input = json!({
        "currency": "€",
        "transactions": [
            { "amount": -7.5, "category": "Books" },
            { "amount": -15.0, "category": "Health" },
            { "amount": -7.5, "category": "Pets" },
            { "amount": -7.5, "category": "Gifts" }
        ]
    });

    let summary = compute_value(&input).unwrap();
    let names: Vec<&str> = summary
        .category_breakdown
        .iter()
        .map(|c| c.name.as_str())
        .collect();

    assert_eq!(names, vec!["Health", "Books", "Pets", "Gifts"]);
    assert_eq!(summary.category_breakdown[1].percentage, 20.0);
}

#[test]
fn test_invalid_shapes_return_none() {
    let cases = vec![
        json!({ "currency": "$" }),
        json!({ "currency": "$", "transactions": null }),
        json!({ "currency": "$", "transactions": 42 }),
        json!({ "currency": "$", "transactions": "[]" }),
        json!([]),
        Value::Null,
    ];

    for case in cases {
        assert!(compute_value(&case).is_none(), "expected None for {}", case);
    }
}

#[test]
fn test_empty_period_is_zero_not_nan() {
    let summary = compute_value(&json!({ "currency": "£", "transactions": [] })).unwrap();

    assert_eq!(summary.total_spend, 0.0);
    assert_eq!(summary.formatted_total, "£0.00");
    assert!(summary.category_breakdown.is_empty());
    assert_eq!(summary.subscriptions.count, 0);
    assert_eq!(summary.subscriptions.total, 0.0);

    let out = serde_json::to_string(&summary).unwrap();
    assert!(!out.contains("NaN"));
    assert!(!out.contains("null"));
}

#[test]
fn test_output_shape_for_front_end() {
    let input = realistic_month();
    let summary = compute_value(&input).unwrap();
    let out = serde_json::to_value(&summary).unwrap();

    for key in [
        "period",
        "totalSpend",
        "formattedTotal",
        "currency",
        "transactions",
        "categoryBreakdown",
        "subscriptions",
    ] {
        assert!(out.get(key).is_some(), "missing {}", key);
    }
    assert!(out.get("possibleSubscriptions").is_none());
    assert_eq!(out["subscriptions"]["count"], json!(3));
    assert_eq!(out["categoryBreakdown"][0]["name"], json!("Bills"));

    // the caller's value is untouched and still carries the raw candidates
    assert_eq!(input, realistic_month());
    assert_eq!(input["possibleSubscriptions"].as_array().unwrap().len(), 3);
}

#[test]
fn test_compute_is_idempotent() {
    let input = realistic_month();
    let data: PeriodData = serde_json::from_value(input.clone()).unwrap();

    let first = compute(&data).unwrap();
    let second = compute(&data).unwrap();
    let from_value = compute_value(&input).unwrap();

    assert_eq!(first, second);
    assert_eq!(first, from_value);
}

#[test]
fn test_string_amounts_from_model_are_recovered() {
    let input = json!({
        "currency": "$",
        "transactions": [
            { "date": "2024-03-01", "amount": "-1,200.00", "category": "Bills" },
            { "date": "2024-03-02", "amount": "(30.50)", "category": "Dining" },
            { "date": "2024-03-03", "amount": "unknown", "category": "Dining" }
        ]
    });

    let summary = compute_value(&input).unwrap();

    assert_eq!(summary.total_spend, 1230.5);
    assert_eq!(summary.formatted_total, "$1230.50");
    assert_eq!(summary.transactions.len(), 3);
}
