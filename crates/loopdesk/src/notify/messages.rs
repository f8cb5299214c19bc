//! Notification message bodies.

use super::OutgoingEmail;
use crate::generator::format::format_currency;
use crate::loops::Loop;

const FOOTER_TEXT: &str =
    "---\nReal Estate Transaction Management System\nThis is an automated notification.";

/// Minimal escaping for values interpolated into HTML bodies.
pub fn escape_html(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn sale_text(record: &Loop) -> String {
    match record.sale {
        Some(sale) if sale != 0.0 => format_currency(Some(sale)),
        _ => "N/A".to_string(),
    }
}

fn end_date_text(record: &Loop) -> String {
    record
        .end_date
        .map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| "Not set".to_string())
}

fn html_page(title: &str, heading: &str, accent: &str, rows: &[(&str, String)], extra: &str) -> String {
    let details: String = rows
        .iter()
        .map(|(label, value)| {
            format!(
                "<div class=\"detail-row\"><span class=\"label\">{}:</span> <span class=\"value\">{}</span></div>\n",
                label,
                escape_html(value)
            )
        })
        .collect();

    format!(
        r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>{title}</title>
<style>
body {{ font-family: Arial, sans-serif; line-height: 1.6; color: #333; }}
.container {{ max-width: 600px; margin: 0 auto; padding: 20px; }}
.header {{ background-color: {accent}; color: white; padding: 20px; text-align: center; }}
.content {{ background-color: #f9fafb; padding: 20px; }}
.detail-row {{ margin-bottom: 10px; }}
.label {{ font-weight: bold; color: #374151; }}
.value {{ color: #6b7280; }}
.changes {{ background-color: #fef3c7; padding: 15px; margin: 15px 0; border-radius: 5px; }}
.footer {{ text-align: center; padding: 20px; color: #6b7280; font-size: 12px; }}
</style>
</head>
<body>
<div class="container">
<div class="header"><h1>{heading}</h1></div>
<div class="content">
{details}{extra}</div>
<div class="footer">
<p>Real Estate Transaction Management System</p>
<p>This is an automated notification. Please do not reply to this email.</p>
</div>
</div>
</body>
</html>
"#
    )
}

pub fn new_loop(to: &str, record: &Loop, creator_name: &str) -> OutgoingEmail {
    let subject = format!("New Loop Created: {} - {}", record.loop_type, record.property_address);

    let mut rows = vec![
        ("Loop ID", format!("#{}", record.id)),
        ("Type", record.loop_type.clone()),
        ("Property Address", record.property_address.clone()),
        ("Client", record.client_name.clone().unwrap_or_default()),
        ("Sale Amount", sale_text(record)),
        ("Status", record.status.to_string()),
        ("Created By", creator_name.to_string()),
        ("Target Close Date", end_date_text(record)),
    ];
    if let Some(notes) = record.notes.as_deref().filter(|n| !n.is_empty()) {
        rows.push(("Notes", notes.to_string()));
    }

    let mut text = String::from(
        "NEW TRANSACTION LOOP CREATED\n\nA new transaction loop has been created in the system.\n\nLoop Details:\n",
    );
    for (label, value) in &rows {
        text.push_str(&format!("- {}: {}\n", label, value));
    }
    text.push('\n');
    text.push_str(FOOTER_TEXT);

    let html = html_page(
        "New Loop Created",
        "New Transaction Loop Created",
        "#3b82f6",
        &rows,
        "",
    );

    OutgoingEmail {
        to: to.to_string(),
        subject,
        text,
        html,
    }
}

pub fn updated_loop(to: &str, record: &Loop, updater_name: &str, changed: &[&str]) -> OutgoingEmail {
    let subject = format!("Loop Updated: {} - {}", record.loop_type, record.property_address);

    let rows = vec![
        ("Loop ID", format!("#{}", record.id)),
        ("Type", record.loop_type.clone()),
        ("Property Address", record.property_address.clone()),
        ("Updated By", updater_name.to_string()),
    ];

    let changes = if changed.is_empty() {
        "The loop was updated with new information. Please check the system for the latest details."
            .to_string()
    } else {
        format!("Updated fields: {}.", changed.join(", "))
    };

    let mut text = String::from(
        "TRANSACTION LOOP UPDATED\n\nA transaction loop has been updated in the system.\n\nLoop Details:\n",
    );
    for (label, value) in &rows {
        text.push_str(&format!("- {}: {}\n", label, value));
    }
    text.push_str(&format!("\nChanges Made:\n{}\n\n", changes));
    text.push_str(FOOTER_TEXT);

    let extra = format!(
        "<div class=\"changes\"><h3>Changes Made:</h3><p>{}</p></div>\n",
        escape_html(&changes)
    );
    let html = html_page("Loop Updated", "Transaction Loop Updated", "#f59e0b", &rows, &extra);

    OutgoingEmail {
        to: to.to_string(),
        subject,
        text,
        html,
    }
}
