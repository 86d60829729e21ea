use serde::Serialize;

use crate::tickets::types::{Ticket, TicketComment, TicketStatus};

#[derive(Debug, Clone)]
pub enum TicketEvent {
    CommentAdded {
        comment: TicketComment,
        author_name: String,
    },
    StatusChanged {
        from: TicketStatus,
        to: TicketStatus,
        actor_name: Option<String>,
    },
}

impl TicketEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::CommentAdded { .. } => "comment_added",
            Self::StatusChanged { .. } => "status_changed",
        }
    }
}

/// Body POSTed to the mail-sending endpoint.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct OutboundEmail {
    pub to: Vec<String>,
    pub subject: String,
    pub text: String,
    pub html: String,
}

/// Requester, creator and assignees, minus the actor, deduplicated without
/// regard to case. First occurrence order is kept.
pub fn resolve_recipients(
    requester: Option<&str>,
    creator: Option<&str>,
    assignees: &[String],
    actor: Option<&str>,
) -> Vec<String> {
    let actor = actor.map(|a| a.trim().to_lowercase());
    let mut out: Vec<String> = Vec::new();

    let candidates = requester
        .into_iter()
        .chain(creator)
        .chain(assignees.iter().map(String::as_str));

    for candidate in candidates {
        let email = candidate.trim().to_lowercase();
        if email.is_empty() || !email.contains('@') {
            continue;
        }
        if actor.as_deref() == Some(email.as_str()) {
            continue;
        }
        if !out.contains(&email) {
            out.push(email);
        }
    }
    out
}

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

fn status_label(status: TicketStatus) -> &'static str {
    match status {
        TicketStatus::Open => "Open",
        TicketStatus::InProgress => "In progress",
        TicketStatus::OnHold => "On hold",
        TicketStatus::Completed => "Completed",
        TicketStatus::Archived => "Archived",
    }
}

pub fn ticket_subject(ticket: &Ticket) -> String {
    format!("[Ticket #{}] {}", ticket.short_id(), ticket.title)
}

/// Builds the message for `event` on `ticket`. `link` points at the ticket
/// in the web app when a base URL is configured.
pub fn compose_message(
    ticket: &Ticket,
    event: &TicketEvent,
    to: Vec<String>,
    link: Option<&str>,
) -> OutboundEmail {
    let subject_line = ticket_subject(ticket);

    let (prefix, headline, body) = match event {
        TicketEvent::CommentAdded {
            comment,
            author_name,
        } => (
            "New comment",
            format!("{author_name} commented on {subject_line}"),
            comment.body.clone(),
        ),
        TicketEvent::StatusChanged {
            from,
            to,
            actor_name,
        } => {
            let who = actor_name.as_deref().unwrap_or("Someone");
            (
                "Status changed",
                format!("{who} changed the status of {subject_line}"),
                format!("{} -> {}", status_label(*from), status_label(*to)),
            )
        }
    };

    let mut text = format!("{headline}\n\n{body}\n");
    let mut html = format!(
        "<p>{}</p>\n<blockquote style=\"white-space: pre-wrap\">{}</blockquote>\n",
        escape_html(&headline),
        escape_html(&body)
    );
    if let Some(link) = link {
        text.push_str(&format!("\nView the ticket: {link}\n"));
        html.push_str(&format!(
            "<p><a href=\"{0}\">{0}</a></p>\n",
            escape_html(link)
        ));
    }

    OutboundEmail {
        to,
        subject: format!("{prefix}: {subject_line}"),
        text,
        html,
    }
}

pub fn ticket_link(base_url: Option<&str>, ticket: &Ticket) -> Option<String> {
    base_url
        .map(|b| b.trim_end_matches('/'))
        .filter(|b| !b.is_empty())
        .map(|b| format!("{b}/tickets/{}", ticket.id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn ticket() -> Ticket {
        let now = Utc::now();
        Ticket {
            id: Uuid::parse_str("a1b2c3d4-0000-4000-8000-000000000000").unwrap(),
            title: "VPN <down>".into(),
            description: None,
            status: "open".into(),
            priority: "high".into(),
            created_by: None,
            assigned_to: None,
            due_date: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
            business: None,
            source: "email".into(),
            requester_email: Some("req@example.com".into()),
            requester_name: None,
            message_id: None,
        }
    }

    #[test]
    fn test_recipients_exclude_actor_and_dedupe() {
        let assignees = vec!["Tech@Example.com".to_string(), "boss@example.com".to_string()];
        let to = resolve_recipients(
            Some("req@example.com"),
            Some("REQ@example.com"),
            &assignees,
            Some("boss@EXAMPLE.com"),
        );
        assert_eq!(to, vec!["req@example.com", "tech@example.com"]);
    }

    #[test]
    fn test_recipients_empty_when_only_actor() {
        let to = resolve_recipients(Some("me@example.com"), None, &[], Some("me@example.com"));
        assert!(to.is_empty());
    }

    #[test]
    fn test_recipients_skip_blank_and_invalid() {
        let assignees = vec!["  ".to_string(), "not-an-address".to_string()];
        let to = resolve_recipients(None, Some("c@example.com"), &assignees, None);
        assert_eq!(to, vec!["c@example.com"]);
    }

    #[test]
    fn test_comment_message() {
        let t = ticket();
        let comment = TicketComment {
            id: Uuid::new_v4(),
            ticket_id: t.id,
            author_id: Uuid::new_v4(),
            body: "Try <b>rebooting</b> & retry".into(),
            created_at: Utc::now(),
        };
        let event = TicketEvent::CommentAdded {
            comment,
            author_name: "Ana".into(),
        };
        let email = compose_message(
            &t,
            &event,
            vec!["req@example.com".into()],
            Some("https://desk.example.com/tickets/1"),
        );

        assert_eq!(email.subject, "New comment: [Ticket #a1b2c3d4] VPN <down>");
        assert!(email.text.contains("Try <b>rebooting</b> & retry"));
        assert!(email
            .html
            .contains("Try &lt;b&gt;rebooting&lt;/b&gt; &amp; retry"));
        assert!(email.html.contains("VPN &lt;down&gt;"));
        assert!(email.text.contains("https://desk.example.com/tickets/1"));
    }

    #[test]
    fn test_status_message() {
        let t = ticket();
        let event = TicketEvent::StatusChanged {
            from: TicketStatus::InProgress,
            to: TicketStatus::Completed,
            actor_name: None,
        };
        let email = compose_message(&t, &event, vec![], None);
        assert!(email.subject.starts_with("Status changed: [Ticket #a1b2c3d4]"));
        assert!(email.text.contains("In progress -> Completed"));
        assert!(email.html.contains("In progress -&gt; Completed"));
    }

    #[test]
    fn test_ticket_link() {
        let t = ticket();
        assert_eq!(
            ticket_link(Some("https://desk.example.com/"), &t),
            Some(format!("https://desk.example.com/tickets/{}", t.id))
        );
        assert_eq!(ticket_link(Some(""), &t), None);
        assert_eq!(ticket_link(None, &t), None);
    }
}
