//! Invoice documents.
//!
//! [`InvoiceGenerator`] asks a chat-completions model for a styled HTML
//! invoice and checks the answer before using it. Anything it cannot use
//! (no endpoint, HTTP failure, timeout, malformed output) falls back to the
//! deterministic layout in [`template`].

mod chat;
pub mod template;

pub use chat::{ChatClient, ChatMessage, InferenceConfig, OpenAiChat};

use chrono::NaiveDate;
use serde::Serialize;
use std::sync::Arc;

use crate::models::{Company, Contract};
use crate::utils::format_money;

/// `INV-YYYYMMDD-<first 8 characters of the contract id>`.
pub fn invoice_number(contract_id: &str, issued: NaiveDate) -> String {
    let short: String = contract_id.chars().take(8).collect();
    format!("INV-{}-{}", issued.format("%Y%m%d"), short)
}

/// Everything printed on an invoice.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvoiceData {
    pub invoice_number: String,
    pub issue_date: NaiveDate,
    pub due_date: Option<NaiveDate>,
    pub company_name: String,
    pub company_address: Vec<String>,
    pub company_ein: Option<String>,
    pub client_name: String,
    pub client_email: Option<String>,
    pub title: String,
    pub description: Option<String>,
    pub amount_cents: i64,
    pub currency: String,
}

impl InvoiceData {
    pub fn new(contract: &Contract, company: &Company, issue_date: NaiveDate) -> Self {
        let company_address = company
            .address
            .as_ref()
            .map(|a| {
                let mut lines = vec![a.line1.clone()];
                if let Some(line2) = a.line2.as_ref().filter(|l| !l.trim().is_empty()) {
                    lines.push(line2.clone());
                }
                lines.push(format!("{}, {} {}", a.city, a.state, a.postal_code));
                if a.country != "US" {
                    lines.push(a.country.clone());
                }
                lines
            })
            .unwrap_or_default();

        Self {
            invoice_number: invoice_number(&contract.id, issue_date),
            issue_date,
            due_date: contract.due_date,
            company_name: company.name.clone(),
            company_address,
            company_ein: company.ein.clone(),
            client_name: contract.client_name.clone(),
            client_email: contract.client_email.clone(),
            title: contract.title.clone(),
            description: contract.description.clone(),
            amount_cents: contract.amount_cents,
            currency: contract.currency.clone(),
        }
    }

    pub fn formatted_total(&self) -> String {
        format_money(self.amount_cents, &self.currency)
    }

    /// Name, address and EIN of the issuing company, one entry per line.
    pub fn company_lines(&self) -> Vec<String> {
        let mut lines = vec![self.company_name.clone()];
        lines.extend(self.company_address.iter().cloned());
        if let Some(ein) = &self.company_ein {
            lines.push(format!("EIN {}", ein));
        }
        lines
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InvoiceSource {
    Llm,
    Template,
}

impl InvoiceSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceSource::Llm => "llm",
            InvoiceSource::Template => "template",
        }
    }
}

#[derive(Debug, Clone)]
pub struct GeneratedInvoice {
    pub html: String,
    /// Always the deterministic plain-text rendering.
    pub text: String,
    pub source: InvoiceSource,
}

const SYSTEM_PROMPT: &str = "You write invoices as complete, self-contained HTML documents \
for printing to PDF. Reply with the HTML document only: start with <!DOCTYPE html>, inline \
all CSS, load no external resources and use no scripts. Reproduce the invoice number, \
parties, line item and total exactly as given.";

/// Remove a surrounding Markdown code fence, if any.
pub fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string (```html).
    let body = match rest.find('\n') {
        Some(pos) => &rest[pos + 1..],
        None => rest,
    };
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

/// Markup that loads, embeds or runs something. Matched against the
/// lower-cased document with whitespace removed.
const FORBIDDEN_MARKUP: [&str; 20] = [
    "<script",
    "<iframe",
    "<frame",
    "<object",
    "<embed",
    "<link",
    "<base",
    "<svg",
    "<math",
    "<form",
    "http-equiv",
    "src=",
    "srcset=",
    "href=",
    "action=",
    "data=",
    "url(",
    "@import",
    "javascript:",
    "file:/",
];

/// First forbidden construct found in `html`, if any.
///
/// Inline `on*=` event handlers are caught separately since the attribute
/// name varies.
pub fn forbidden_markup(html: &str) -> Option<&'static str> {
    let compact: String = html
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| c.to_ascii_lowercase())
        .collect();
    if let Some(found) = FORBIDDEN_MARKUP.iter().copied().find(|m| compact.contains(m)) {
        return Some(found);
    }

    let lower = html.to_ascii_lowercase();
    let bytes = lower.as_bytes();
    let has_handler = lower.match_indices("on").any(|(pos, _)| {
        let preceded = pos > 0
            && (bytes[pos - 1].is_ascii_whitespace()
                || matches!(bytes[pos - 1], b'/' | b'"' | b'\''));
        let name_end = bytes[pos + 2..]
            .iter()
            .position(|b| !b.is_ascii_alphabetic())
            .map(|n| pos + 2 + n)
            .unwrap_or(bytes.len());
        let rest = lower[name_end..].trim_start();
        preceded && name_end > pos + 2 && rest.starts_with('=')
    });
    has_handler.then_some("on*= event handler")
}

/// Accept generated HTML only if it is a whole, inert document carrying
/// the invoice number and the exact total.
pub fn accept_generated(raw: &str, data: &InvoiceData) -> Option<String> {
    let html = strip_code_fences(raw);
    let lower = html.to_ascii_lowercase();
    let is_document = (lower.starts_with("<!doctype html") || lower.starts_with("<html"))
        && lower.contains("</html>");

    if !is_document {
        return None;
    }
    if let Some(construct) = forbidden_markup(html) {
        tracing::warn!(
            invoice_number = %data.invoice_number,
            construct,
            "Generated invoice HTML contains active or external content"
        );
        return None;
    }
    if !html.contains(&data.invoice_number) || !html.contains(&data.formatted_total()) {
        return None;
    }
    Some(html.to_string())
}

#[derive(Clone, Default)]
pub struct InvoiceGenerator {
    chat: Option<Arc<dyn ChatClient>>,
}

impl InvoiceGenerator {
    pub fn new(chat: Option<Arc<dyn ChatClient>>) -> Self {
        Self { chat }
    }

    /// Deterministic output only.
    pub fn template_only() -> Self {
        Self { chat: None }
    }

    pub fn is_llm_enabled(&self) -> bool {
        self.chat.is_some()
    }

    pub async fn generate(&self, data: &InvoiceData) -> GeneratedInvoice {
        let text = template::render_text(data);

        if let Some(chat) = &self.chat {
            match self.generate_with_model(chat.as_ref(), data).await {
                Some(html) => {
                    tracing::info!(
                        invoice_number = %data.invoice_number,
                        model = chat.model(),
                        "Invoice HTML generated"
                    );
                    return GeneratedInvoice {
                        html,
                        text,
                        source: InvoiceSource::Llm,
                    };
                }
                None => {
                    tracing::info!(
                        invoice_number = %data.invoice_number,
                        "Using invoice template"
                    );
                }
            }
        }

        GeneratedInvoice {
            html: template::render_html(data),
            text,
            source: InvoiceSource::Template,
        }
    }

    async fn generate_with_model(&self, chat: &dyn ChatClient, data: &InvoiceData) -> Option<String> {
        let details = match serde_json::to_string_pretty(&InvoicePrompt::from(data)) {
            Ok(details) => details,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to serialize invoice prompt");
                return None;
            }
        };
        let messages = [
            ChatMessage::system(SYSTEM_PROMPT),
            ChatMessage::user(format!("Create the invoice for:\n{}", details)),
        ];

        let raw = match chat.complete(&messages).await {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(error = %e, invoice_number = %data.invoice_number, "Invoice generation failed");
                return None;
            }
        };

        let accepted = accept_generated(&raw, data);
        if accepted.is_none() {
            tracing::warn!(
                invoice_number = %data.invoice_number,
                length = raw.len(),
                "Generated invoice HTML rejected"
            );
        }
        accepted
    }
}

impl std::fmt::Debug for InvoiceGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InvoiceGenerator")
            .field("llm_enabled", &self.is_llm_enabled())
            .finish()
    }
}

/// Invoice fields as shown to the model, amounts pre-formatted.
#[derive(Serialize)]
struct InvoicePrompt<'a> {
    invoice_number: &'a str,
    issue_date: String,
    due_date: Option<String>,
    from: Vec<String>,
    bill_to: Vec<&'a str>,
    line_item: &'a str,
    description: Option<&'a str>,
    total: String,
}

impl<'a> From<&'a InvoiceData> for InvoicePrompt<'a> {
    fn from(data: &'a InvoiceData) -> Self {
        let mut bill_to = vec![data.client_name.as_str()];
        if let Some(email) = &data.client_email {
            bill_to.push(email);
        }
        Self {
            invoice_number: &data.invoice_number,
            issue_date: data.issue_date.format("%B %-d, %Y").to_string(),
            due_date: data.due_date.map(|d| d.format("%B %-d, %Y").to_string()),
            from: data.company_lines(),
            bill_to,
            line_item: &data.title,
            description: data.description.as_deref(),
            total: data.formatted_total(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Address, EntityType};
    use crate::testing::ScriptedChat;

    fn sample() -> InvoiceData {
        let mut company = Company::new("u1", "Acme & Co", EntityType::Llc);
        company.address = Some(Address {
            line1: "1 Main St".into(),
            line2: None,
            city: "Austin".into(),
            state: "TX".into(),
            postal_code: "78701".into(),
            country: "US".into(),
        });
        let mut contract = Contract::new(&company.id, "u1", "Website build", "Globex", 1_250_00);
        contract.id = "3f2a9c1e-0000-4000-8000-000000000000".into();
        contract.client_email = Some("ap@globex.test".into());
        InvoiceData::new(&contract, &company, NaiveDate::from_ymd_opt(2025, 3, 9).unwrap())
    }

    #[test]
    fn test_invoice_number() {
        let date = NaiveDate::from_ymd_opt(2025, 3, 9).unwrap();
        assert_eq!(invoice_number("3f2a9c1e-aaaa", date), "INV-20250309-3f2a9c1e");
        assert_eq!(invoice_number("abc", date), "INV-20250309-abc");
    }

    #[test]
    fn test_template_is_deterministic_and_escaped() {
        let data = sample();
        let html = template::render_html(&data);
        assert_eq!(html, template::render_html(&data));
        assert!(html.contains("INV-20250309-3f2a9c1e"));
        assert!(html.contains("USD 1,250.00"));
        assert!(html.contains("Acme &amp; Co"));
        assert!(html.contains("Austin, TX 78701"));
        assert!(accept_generated(&html, &data).is_some());

        let text = template::render_text(&data);
        assert!(text.contains("Total due: USD 1,250.00"));
        assert!(text.contains("  ap@globex.test"));
    }

    #[test]
    fn test_strip_code_fences() {
        assert_eq!(strip_code_fences("```html\n<html></html>\n```"), "<html></html>");
        assert_eq!(strip_code_fences("```\n<html></html>```"), "<html></html>");
        assert_eq!(strip_code_fences("  <html></html>  "), "<html></html>");
    }

    #[test]
    fn test_accept_requires_number_and_total() {
        let data = sample();
        let good = "<!DOCTYPE html><html><body>INV-20250309-3f2a9c1e USD 1,250.00</body></html>";
        assert!(accept_generated(good, &data).is_some());

        let wrong_total = "<html><body>INV-20250309-3f2a9c1e USD 1,200.00</body></html>";
        assert!(accept_generated(wrong_total, &data).is_none());

        let fragment = "<div>INV-20250309-3f2a9c1e USD 1,250.00</div>";
        assert!(accept_generated(fragment, &data).is_none());

        let chatty = "Here is your invoice: <html>INV-20250309-3f2a9c1e USD 1,250.00</html>";
        assert!(accept_generated(chatty, &data).is_none());
    }

    #[test]
    fn test_accept_rejects_active_and_external_content() {
        let data = sample();
        let wrap = |extra: &str| {
            format!(
                "<!DOCTYPE html><html><body>INV-20250309-3f2a9c1e USD 1,250.00{}</body></html>",
                extra
            )
        };

        for extra in [
            "<iframe src=\"file:///etc/passwd\"></iframe>",
            "<IFRAME SRC = 'file:///etc/passwd'>",
            "<script>fetch('http://169.254.169.254/')</script>",
            "<img src=\"http://internal.example/pixel\">",
            "<link rel=\"stylesheet\" href=\"file:///etc/hosts\">",
            "<div style=\"background: url( 'http://x.example/a.png' )\"></div>",
            "<style>@import 'http://x.example/a.css';</style>",
            "<object data=\"file:///etc/passwd\"></object>",
            "<meta http-equiv=\"refresh\" content=\"0;url=file:///etc/passwd\">",
            "<body onload=\"print()\">",
            "<div\nonclick = \"x()\">",
            "<a href=\"javascript:alert(1)\">pay</a>",
        ] {
            let html = wrap(extra);
            assert!(forbidden_markup(&html).is_some(), "{}", extra);
            assert!(accept_generated(&html, &data).is_none(), "{}", extra);
        }

        let plain = wrap(
            "<p class=\"note\">Payment due on receipt. Company profile: consulting.</p>\
             <table><tr><td>Done</td></tr></table><style>td{padding:4px}</style>",
        );
        assert_eq!(forbidden_markup(&plain), None);
        assert!(accept_generated(&plain, &data).is_some());
    }

    #[tokio::test]
    async fn test_generator_uses_model_output() {
        let data = sample();
        let reply = "```html\n<!DOCTYPE html><html><body>INV-20250309-3f2a9c1e \
                     USD 1,250.00</body></html>\n```";
        let chat = Arc::new(ScriptedChat::replying(reply));
        let generator = InvoiceGenerator::new(Some(chat.clone()));

        let invoice = generator.generate(&data).await;
        assert_eq!(invoice.source, InvoiceSource::Llm);
        assert!(invoice.html.starts_with("<!DOCTYPE html>"));
        assert_eq!(chat.requests().len(), 1);
        assert!(chat.requests()[0][1].content.contains("USD 1,250.00"));
    }

    #[tokio::test]
    async fn test_generator_falls_back() {
        let data = sample();

        let rejected = InvoiceGenerator::new(Some(Arc::new(ScriptedChat::replying("no"))));
        let invoice = rejected.generate(&data).await;
        assert_eq!(invoice.source, InvoiceSource::Template);
        assert_eq!(invoice.html, template::render_html(&data));

        let failing = InvoiceGenerator::new(Some(Arc::new(ScriptedChat::failing())));
        assert_eq!(failing.generate(&data).await.source, InvoiceSource::Template);

        let offline = InvoiceGenerator::template_only();
        assert_eq!(offline.generate(&data).await.source, InvoiceSource::Template);
    }
}
