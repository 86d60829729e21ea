//! Role-based authorization rules.
//!
//! Every check is a pure function of the caller and the few resource fields
//! it needs, so handlers load those fields and ask here before writing.

use uuid::Uuid;

use crate::security::{AuthenticatedUser, Role};

/// The parts of a ticket that decide who may touch it.
#[derive(Debug, Clone, Copy)]
pub struct TicketAccess<'a> {
    pub created_by: Option<Uuid>,
    pub assigned_to: Option<Uuid>,
    pub assignees: &'a [Uuid],
    pub requester_email: Option<&'a str>,
}

impl TicketAccess<'_> {
    /// Creator, primary assignee or listed assignee.
    pub fn is_associated(&self, user_id: Uuid) -> bool {
        self.created_by == Some(user_id)
            || self.assigned_to == Some(user_id)
            || self.assignees.contains(&user_id)
    }

    pub fn is_requester(&self, user: &AuthenticatedUser) -> bool {
        self.created_by == Some(user.user_id)
            || self
                .requester_email
                .is_some_and(|email| email.eq_ignore_ascii_case(&user.email))
    }

    pub fn is_unassigned(&self) -> bool {
        self.assigned_to.is_none() && self.assignees.is_empty()
    }
}

pub fn can_create_ticket(user: &AuthenticatedUser) -> bool {
    user.is_staff() || user.can_create_ticket
}

pub fn can_view_ticket(user: &AuthenticatedUser, ticket: &TicketAccess<'_>) -> bool {
    match user.role {
        Role::Manager | Role::TechnicianIt => true,
        Role::UserClient => ticket.is_requester(user),
    }
}

/// Field edits, status actions and attachment management.
pub fn can_modify_ticket(user: &AuthenticatedUser, ticket: &TicketAccess<'_>) -> bool {
    match user.role {
        Role::Manager => true,
        Role::TechnicianIt => ticket.is_associated(user.user_id),
        Role::UserClient => false,
    }
}

pub fn can_take_ticket(user: &AuthenticatedUser, ticket: &TicketAccess<'_>) -> bool {
    user.is_staff() && ticket.is_unassigned()
}

pub fn can_manage_assignees(user: &AuthenticatedUser) -> bool {
    user.is_manager()
}

pub fn can_comment(user: &AuthenticatedUser, ticket: &TicketAccess<'_>) -> bool {
    can_view_ticket(user, ticket)
}

/// Authors may always remove their own comment. Managers may also remove
/// technicians' comments; nobody removes an end user's comment but its author.
pub fn can_delete_comment(
    user: &AuthenticatedUser,
    author_id: Uuid,
    author_role: Option<Role>,
) -> bool {
    if author_id == user.user_id {
        return true;
    }
    user.is_manager() && author_role == Some(Role::TechnicianIt)
}

pub fn can_delete_attachment(user: &AuthenticatedUser, uploaded_by: Uuid) -> bool {
    user.is_manager() || uploaded_by == user.user_id
}

pub fn can_manage_users(user: &AuthenticatedUser) -> bool {
    user.is_manager()
}

pub fn can_view_reports(user: &AuthenticatedUser) -> bool {
    user.is_manager()
}

pub fn can_read_article(user: &AuthenticatedUser, published: bool) -> bool {
    published || user.is_staff()
}

pub fn can_write_articles(user: &AuthenticatedUser) -> bool {
    user.is_staff()
}

pub fn can_delete_article(user: &AuthenticatedUser, created_by: Uuid) -> bool {
    user.is_manager() || (user.is_staff() && created_by == user.user_id)
}

pub fn can_manage_tasks(user: &AuthenticatedUser) -> bool {
    user.is_manager()
}

/// Checklists and compliance of `owner`.
pub fn can_view_user_tasks(user: &AuthenticatedUser, owner: Uuid) -> bool {
    user.is_manager() || user.user_id == owner
}

/// Only the assignee records their own check-ins.
pub fn can_check_task(user: &AuthenticatedUser, assignee_id: Uuid) -> bool {
    user.user_id == assignee_id
}
