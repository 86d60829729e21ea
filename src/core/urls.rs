#[derive(Debug)]
pub struct ApiUrls;

impl ApiUrls {
    // Health
    pub const HEALTH: &'static str = "/health";
    pub const API_HEALTH: &'static str = "/api/health";

    // Profiles
    pub const ME: &'static str = "/api/me";
    pub const ADMIN_USERS: &'static str = "/api/admin/users";
    pub const ADMIN_USER_BY_ID: &'static str = "/api/admin/users/{id}";
    pub const ADMIN_USER_DISABLE: &'static str = "/api/admin/users/{id}/disable";
    pub const ADMIN_USER_ENABLE: &'static str = "/api/admin/users/{id}/enable";

    // Tickets
    pub const TICKETS: &'static str = "/api/tickets";
    pub const TICKET_STATS: &'static str = "/api/tickets/stats";
    pub const TICKET_BY_ID: &'static str = "/api/tickets/{id}";
    pub const TICKET_START: &'static str = "/api/tickets/{id}/start";
    pub const TICKET_HOLD: &'static str = "/api/tickets/{id}/hold";
    pub const TICKET_COMPLETE: &'static str = "/api/tickets/{id}/complete";
    pub const TICKET_REACTIVATE: &'static str = "/api/tickets/{id}/reactivate";
    pub const TICKET_ARCHIVE: &'static str = "/api/tickets/{id}/archive";
    pub const TICKET_TAKE: &'static str = "/api/tickets/{id}/take";
    pub const TICKET_ASSIGNEES: &'static str = "/api/tickets/{id}/assignees";
    pub const TICKET_COMMENTS: &'static str = "/api/tickets/{id}/comments";
    pub const COMMENT_BY_ID: &'static str = "/api/comments/{id}";
    pub const TICKET_ATTACHMENTS: &'static str = "/api/tickets/{id}/attachments";
    pub const ATTACHMENT_BY_ID: &'static str = "/api/attachments/{id}";
    pub const REPORT_TECHNICIANS: &'static str = "/api/reports/technicians";

    // Knowledge base
    pub const KB_ARTICLES: &'static str = "/api/kb/articles";
    /// Slug for reads, id for updates and deletes.
    pub const KB_ARTICLE: &'static str = "/api/kb/articles/{key}";

    // Daily tasks
    pub const TASKS: &'static str = "/api/tasks";
    pub const TASK_BY_ID: &'static str = "/api/tasks/{id}";
    pub const TASKS_TODAY: &'static str = "/api/tasks/today";
    pub const TASK_CHECK: &'static str = "/api/tasks/{id}/check";
    pub const TASKS_COMPLIANCE: &'static str = "/api/tasks/compliance";
    pub const TASKS_CUTOFF: &'static str = "/api/tasks/cutoff";

    // Email intake
    pub const INTAKE_EMAIL: &'static str = "/api/intake/email";
    pub const INTAKE_EMAIL_RAW: &'static str = "/api/intake/email/raw";

    // Database webhooks
    pub const HOOK_COMMENTS: &'static str = "/api/hooks/comments";
    pub const HOOK_TICKETS: &'static str = "/api/hooks/tickets";
}

/// Replaces the `{id}` placeholder of a route.
pub fn with_id(route: &str, id: impl std::fmt::Display) -> String {
    route.replace("{id}", &id.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_id() {
        assert_eq!(
            with_id(ApiUrls::TICKET_START, "abc"),
            "/api/tickets/abc/start"
        );
    }
}
