use crate::db::{format_date, format_timestamp};
use crate::loops::{DashboardStats, Loop};

pub const LOOP_HEADERS: [&str; 15] = [
    "ID",
    "Type",
    "Property Address",
    "Client Name",
    "Client Email",
    "Client Phone",
    "Sale Amount",
    "Status",
    "Start Date",
    "End Date",
    "Creator",
    "Created At",
    "Updated At",
    "Tags",
    "Notes",
];

/// Body returned instead of a header-only file.
pub const EMPTY_EXPORT: &str = "No data available";

/// Quotes a value containing a comma, newline or double quote, doubling
/// embedded quotes.
pub fn escape_csv(value: &str) -> String {
    if value.contains(',') || value.contains('\n') || value.contains('"') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn opt(value: Option<&str>) -> String {
    value.map(escape_csv).unwrap_or_default()
}

pub fn loops_to_csv(loops: &[Loop]) -> String {
    if loops.is_empty() {
        return EMPTY_EXPORT.to_string();
    }

    let mut rows = Vec::with_capacity(loops.len() + 1);
    rows.push(LOOP_HEADERS.join(","));

    for l in loops {
        let row = [
            l.id.to_string(),
            escape_csv(&l.loop_type),
            escape_csv(&l.property_address),
            opt(l.client_name.as_deref()),
            opt(l.client_email.as_deref()),
            opt(l.client_phone.as_deref()),
            l.sale.map(|s| s.to_string()).unwrap_or_default(),
            l.status.as_str().to_string(),
            l.start_date.map(format_date).unwrap_or_default(),
            l.end_date.map(format_date).unwrap_or_default(),
            opt(l.creator_name.as_deref()),
            format_timestamp(l.created_at),
            format_timestamp(l.updated_at),
            opt(l.tags.as_deref()),
            opt(l.notes.as_deref()),
        ];
        rows.push(row.join(","));
    }

    rows.join("\n")
}

pub fn stats_to_csv(stats: &DashboardStats) -> String {
    let metrics = [
        ("Total Loops", stats.stats.total.to_string()),
        ("Active Loops", stats.stats.active.to_string()),
        ("Closing Loops", stats.stats.closing.to_string()),
        ("Closed Loops", stats.stats.closed.to_string()),
        ("Total Sales Amount", stats.stats.total_sales.to_string()),
        ("Loops Closing Soon", stats.closing_soon.to_string()),
    ];

    let mut rows = vec!["Metric,Value".to_string()];
    rows.extend(
        metrics
            .iter()
            .map(|(metric, value)| format!("\"{}\",\"{}\"", metric, value)),
    );
    rows.join("\n")
}
