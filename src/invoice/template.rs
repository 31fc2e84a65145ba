//! Deterministic invoice layout, used whenever generated HTML is unavailable.

use super::InvoiceData;
use crate::utils::escape_html;

const STYLE: &str = "body{font-family:Helvetica,Arial,sans-serif;color:#1d1d1f;margin:0}\
.invoice{max-width:720px;margin:0 auto;padding:40px}\
.header{display:flex;justify-content:space-between;border-bottom:2px solid #1f4e79;padding-bottom:16px}\
.header h1{margin:0;font-size:28px;color:#1f4e79}\
.meta{text-align:right;font-size:13px;line-height:1.6}\
.parties{display:flex;justify-content:space-between;margin:32px 0;font-size:14px;line-height:1.5}\
.label{text-transform:uppercase;font-size:11px;color:#6e6e73;letter-spacing:.05em}\
table{width:100%;border-collapse:collapse;font-size:14px}\
th{text-align:left;border-bottom:1px solid #d2d2d7;padding:8px 0}\
td{padding:12px 0;border-bottom:1px solid #f0f0f2;vertical-align:top}\
.amount{text-align:right;white-space:nowrap}\
.total td{font-weight:bold;font-size:16px;border-bottom:none}\
.footer{margin-top:48px;font-size:12px;color:#6e6e73}";

fn paragraph_lines(lines: &[String]) -> String {
    lines
        .iter()
        .map(|line| escape_html(line))
        .collect::<Vec<_>>()
        .join("<br>")
}

pub fn render_html(data: &InvoiceData) -> String {
    let total = data.formatted_total();
    let due = data
        .due_date
        .map(|d| format!("<div>Due {}</div>", d.format("%B %-d, %Y")))
        .unwrap_or_default();
    let description = data
        .description
        .as_deref()
        .filter(|d| !d.trim().is_empty())
        .map(|d| format!("<div style=\"color:#6e6e73;margin-top:4px\">{}</div>", escape_html(d)))
        .unwrap_or_default();

    let mut client_lines = vec![data.client_name.clone()];
    if let Some(email) = &data.client_email {
        client_lines.push(email.clone());
    }

    format!(
        "<!DOCTYPE html>\n<html lang=\"en\"><head><meta charset=\"utf-8\">\
<title>Invoice {number}</title><style>{style}</style></head><body>\
<div class=\"invoice\">\
<div class=\"header\"><h1>Invoice</h1><div class=\"meta\">\
<div><strong>{number}</strong></div><div>Issued {issued}</div>{due}</div></div>\
<div class=\"parties\">\
<div><div class=\"label\">From</div>{from}</div>\
<div style=\"text-align:right\"><div class=\"label\">Bill to</div>{to}</div></div>\
<table><thead><tr><th>Description</th><th class=\"amount\">Amount</th></tr></thead><tbody>\
<tr><td>{title}{description}</td><td class=\"amount\">{total}</td></tr>\
<tr class=\"total\"><td>Total due</td><td class=\"amount\">{total}</td></tr>\
</tbody></table>\
<div class=\"footer\">Thank you for your business.</div>\
</div></body></html>\n",
        number = escape_html(&data.invoice_number),
        style = STYLE,
        issued = data.issue_date.format("%B %-d, %Y"),
        due = due,
        from = paragraph_lines(&data.company_lines()),
        to = paragraph_lines(&client_lines),
        title = escape_html(&data.title),
        description = description,
        total = escape_html(&total),
    )
}

pub fn render_text(data: &InvoiceData) -> String {
    let mut out = String::new();
    out.push_str(&format!("INVOICE {}\n", data.invoice_number));
    out.push_str(&format!("Issued: {}\n", data.issue_date.format("%Y-%m-%d")));
    if let Some(due) = data.due_date {
        out.push_str(&format!("Due: {}\n", due.format("%Y-%m-%d")));
    }

    out.push_str("\nFrom:\n");
    for line in data.company_lines() {
        out.push_str(&format!("  {}\n", line));
    }
    out.push_str("\nBill to:\n");
    out.push_str(&format!("  {}\n", data.client_name));
    if let Some(email) = &data.client_email {
        out.push_str(&format!("  {}\n", email));
    }

    out.push_str(&format!("\n{}\n", data.title));
    if let Some(description) = data.description.as_deref().filter(|d| !d.trim().is_empty()) {
        out.push_str(&format!("{}\n", description));
    }
    out.push_str(&format!("\nTotal due: {}\n", data.formatted_total()));
    out
}
