//! Transactional email bodies. Every template has an HTML and a plain-text form.

use super::Email;
use crate::billing::Plan;
use crate::utils::escape_html;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    pub subject: String,
    pub text: String,
    pub html: String,
}

impl Template {
    pub fn into_email(self, from: impl Into<String>, to: impl Into<String>) -> Email {
        Email::new(from, to, self.subject).text(self.text).html(self.html)
    }
}

fn layout(heading: &str, paragraphs: &[String], action: Option<(&str, &str)>) -> String {
    let mut body = String::new();
    for paragraph in paragraphs {
        body.push_str(&format!(
            "<p style=\"margin:0 0 16px;line-height:1.5\">{}</p>",
            escape_html(paragraph)
        ));
    }
    if let Some((label, url)) = action {
        body.push_str(&format!(
            "<p style=\"margin:24px 0\"><a href=\"{}\" style=\"background:#1f4e79;color:#fff;\
             padding:12px 20px;border-radius:4px;text-decoration:none\">{}</a></p>",
            escape_html(url),
            escape_html(label)
        ));
    }

    format!(
        "<!DOCTYPE html><html><head><meta charset=\"utf-8\"><title>{heading}</title></head>\
         <body style=\"font-family:Helvetica,Arial,sans-serif;color:#222;background:#f6f7f9;padding:24px\">\
         <div style=\"max-width:560px;margin:0 auto;background:#fff;padding:32px;border-radius:6px\">\
         <h1 style=\"font-size:20px;margin:0 0 24px\">{heading}</h1>{body}\
         <p style=\"color:#888;font-size:12px;margin-top:32px\">Corpdesk</p></div></body></html>",
        heading = escape_html(heading),
        body = body
    )
}

fn text_body(paragraphs: &[String], action: Option<(&str, &str)>) -> String {
    let mut text = paragraphs.join("\n\n");
    if let Some((label, url)) = action {
        text.push_str(&format!("\n\n{}: {}", label, url));
    }
    text.push_str("\n\n-- \nCorpdesk\n");
    text
}

fn template(subject: String, heading: &str, paragraphs: Vec<String>, action: Option<(&str, &str)>) -> Template {
    Template {
        subject,
        text: text_body(&paragraphs, action),
        html: layout(heading, &paragraphs, action),
    }
}

fn greeting(name: &str) -> String {
    if name.trim().is_empty() {
        "Hi,".to_string()
    } else {
        format!("Hi {},", name.trim())
    }
}

pub fn verification(name: &str, link: &str) -> Template {
    template(
        "Verify your Corpdesk email address".to_string(),
        "Confirm your email",
        vec![
            greeting(name),
            "Confirm your email address to finish setting up your Corpdesk account. \
             The link expires in 48 hours."
                .to_string(),
        ],
        Some(("Verify email", link)),
    )
}

pub fn welcome(name: &str, plan: Plan, dashboard_link: &str) -> Template {
    template(
        "Welcome to Corpdesk".to_string(),
        "Welcome to Corpdesk",
        vec![
            greeting(name),
            format!(
                "Your email is verified and you are on the {} plan. {}",
                plan.display_name(),
                plan.description()
            ),
        ],
        Some(("Open your dashboard", dashboard_link)),
    )
}

pub fn invoice_ready(
    client_name: &str,
    company_name: &str,
    invoice_number: &str,
    total: &str,
    url: &str,
) -> Template {
    template(
        format!("Invoice {} from {}", invoice_number, company_name),
        &format!("Invoice {}", invoice_number),
        vec![
            greeting(client_name),
            format!(
                "{} has issued invoice {} for {}.",
                company_name, invoice_number, total
            ),
        ],
        Some(("Download invoice", url)),
    )
}

pub fn portal_invitation(
    client_name: &str,
    company_name: &str,
    contract_title: &str,
    amount: &str,
    link: &str,
) -> Template {
    template(
        format!("{} shared \"{}\" with you", company_name, contract_title),
        contract_title,
        vec![
            greeting(client_name),
            format!(
                "{} shared the contract \"{}\" ({}) with you. You can review it and pay online.",
                company_name, contract_title, amount
            ),
        ],
        Some(("View contract", link)),
    )
}

pub fn incorporation_submitted(name: &str, legal_name: &str) -> Template {
    template(
        format!("We received the incorporation request for {}", legal_name),
        "Incorporation submitted",
        vec![
            greeting(name),
            format!(
                "Your incorporation request for {} has been submitted. \
                 We will email you once it has been reviewed.",
                legal_name
            ),
        ],
        None,
    )
}

pub fn incorporation_reviewed(
    name: &str,
    legal_name: &str,
    approved: bool,
    note: Option<&str>,
) -> Template {
    let (subject, heading, outcome) = if approved {
        (
            format!("{} has been approved", legal_name),
            "Incorporation approved",
            format!(
                "Your incorporation request for {} was approved and the company is now in your dashboard.",
                legal_name
            ),
        )
    } else {
        (
            format!("Update on the incorporation request for {}", legal_name),
            "Incorporation needs changes",
            format!(
                "Your incorporation request for {} was not approved.",
                legal_name
            ),
        )
    };

    let mut paragraphs = vec![greeting(name), outcome];
    if let Some(note) = note.filter(|n| !n.trim().is_empty()) {
        paragraphs.push(format!("Reviewer note: {}", note.trim()));
    }
    template(subject, heading, paragraphs, None)
}
