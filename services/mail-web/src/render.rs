//! HTML pages
//!
//! Two small pages, built with `format!`. Everything taken from Graph goes
//! through `escape_html`.

use std::fmt::Write;

use graph_mail::{Message, User};

/// Escape text for use in element content and quoted attribute values.
pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
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

fn layout(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n\
         <html lang=\"en\">\n\
         <head><meta charset=\"utf-8\"><title>{title}</title></head>\n\
         <body>\n\
         <nav><a href=\"/\">Home</a> | <a href=\"/list-inbox\">Inbox</a> | <a href=\"/login\">Sign in</a></nav>\n\
         {body}\n\
         </body>\n\
         </html>\n",
        title = escape_html(title),
    )
}

/// Profile page for `GET /`.
pub fn index_page(user: &User) -> String {
    let name = escape_html(user.display_name.as_deref().unwrap_or_default());
    let email = escape_html(user.email().unwrap_or_default());
    layout(
        "Graph mail",
        &format!("<h1>Hello, {name}</h1>\n<p>Email: {email}</p>"),
    )
}

/// Inbox table for `GET /list-inbox`.
pub fn inbox_page(messages: &[Message]) -> String {
    let mut rows = String::new();
    for message in messages {
        let _ = writeln!(
            rows,
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
            escape_html(message.subject.as_deref().unwrap_or_default()),
            escape_html(message.sender_name().unwrap_or("NONE")),
            if message.is_read.unwrap_or(false) {
                "Read"
            } else {
                "Unread"
            },
            escape_html(message.received_date_time.as_deref().unwrap_or_default()),
        );
    }

    let body = if messages.is_empty() {
        "<h1>Inbox</h1>\n<p>No messages.</p>".to_string()
    } else {
        format!(
            "<h1>Inbox</h1>\n<table>\n\
             <tr><th>Subject</th><th>From</th><th>Status</th><th>Received</th></tr>\n\
             {rows}</table>"
        )
    };
    layout("Inbox", &body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use graph_mail::{EmailAddress, Recipient};

    fn message(subject: &str, sender: Option<&str>, is_read: bool) -> Message {
        Message {
            subject: Some(subject.into()),
            from: sender.map(|name| Recipient {
                email_address: Some(EmailAddress {
                    name: Some(name.into()),
                    address: None,
                }),
            }),
            is_read: Some(is_read),
            received_date_time: Some("2024-05-01T09:30:00Z".into()),
        }
    }

    #[test]
    fn escape_html_handles_markup_characters() {
        assert_eq!(
            escape_html(r#"<script>alert("x & 'y'")</script>"#),
            "&lt;script&gt;alert(&quot;x &amp; &#39;y&#39;&quot;)&lt;/script&gt;"
        );
        assert_eq!(escape_html("plain"), "plain");
    }

    #[test]
    fn index_page_shows_name_and_principal_fallback() {
        let user = User {
            display_name: Some("Adele <Vance>".into()),
            mail: None,
            user_principal_name: Some("adelev@contoso.com".into()),
        };
        let html = index_page(&user);
        assert!(html.contains("Hello, Adele &lt;Vance&gt;"));
        assert!(html.contains("Email: adelev@contoso.com"));
    }

    #[test]
    fn inbox_page_renders_rows() {
        let html = inbox_page(&[
            message("Quarterly review", Some("Megan Bowen"), false),
            message("Lunch?", None, true),
        ]);
        assert!(html.contains(
            "<tr><td>Quarterly review</td><td>Megan Bowen</td><td>Unread</td><td>2024-05-01T09:30:00Z</td></tr>"
        ));
        assert!(html.contains("<td>Lunch?</td><td>NONE</td><td>Read</td>"));
    }

    #[test]
    fn inbox_page_escapes_subjects() {
        let html = inbox_page(&[message("<b>hi</b>", Some("Eve"), true)]);
        assert!(html.contains("&lt;b&gt;hi&lt;/b&gt;"));
        assert!(!html.contains("<b>hi</b>"));
    }

    #[test]
    fn empty_inbox_has_no_table() {
        let html = inbox_page(&[]);
        assert!(html.contains("No messages."));
        assert!(!html.contains("<table>"));
    }
}
