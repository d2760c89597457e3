//! Sample request bodies for write tasks.
//!
//! Every body embeds the virtual user number and a per-call suffix so that
//! concurrent users do not trip over uniqueness constraints on the server.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// Which sample body a task sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadKind {
    /// No body.
    #[default]
    None,
    /// New user with name and e-mail.
    User,
    /// Full user update including role.
    UserUpdate,
    /// Initial password for a user.
    Password,
    /// Replacement password for a user.
    NewPassword,
    /// New team.
    Team,
    /// New team with initial members.
    TeamWithMembers,
    /// Team rename.
    TeamUpdate,
    /// New staff member.
    Staff,
    /// New staff member with an explicit position.
    StaffWithPosition,
    /// Staff details update.
    StaffUpdate,
    /// Staff position change.
    StaffPosition,
    /// New group.
    Group,
    /// New group with members.
    GroupWithMembers,
    /// Group details update.
    GroupUpdate,
    /// Group membership replacement.
    GroupMembers,
    /// New integration.
    Integration,
    /// New webhook integration.
    WebhookIntegration,
    /// Integration details update.
    IntegrationUpdate,
    /// Integration enable/disable.
    IntegrationStatus,
}

/// Per-call inputs for body generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadContext {
    /// 1-based number of the virtual user sending the request
    pub user_number: u64,
    /// Short suffix unique to this call
    pub unique: String,
}

impl PayloadContext {
    /// Creates a context for the given user and suffix.
    #[must_use]
    pub fn new(user_number: u64, unique: impl Into<String>) -> Self {
        Self {
            user_number,
            unique: unique.into(),
        }
    }
}

/// Builds the body for `kind`, or `None` for body-less tasks.
#[must_use]
pub fn build(kind: PayloadKind, ctx: &PayloadContext) -> Option<Value> {
    let n = ctx.user_number;
    let u = &ctx.unique;

    let body = match kind {
        PayloadKind::None => return None,
        PayloadKind::User => json!({
            "first_name": format!("Test{n}"),
            "last_name": format!("User{n}"),
            "email_address": format!("test{n}.{u}@example.com"),
        }),
        PayloadKind::UserUpdate => json!({
            "first_name": format!("Updated{n}"),
            "last_name": format!("User{n}"),
            "email_address": format!("updated{n}.{u}@example.com"),
            "role": "employee",
        }),
        PayloadKind::Password => json!({ "password": format!("TestPass{n}{u}") }),
        PayloadKind::NewPassword => json!({ "password": format!("NewPass{n}{u}") }),
        PayloadKind::Team => json!({
            "name": format!("Test Team {n}-{u}"),
            "description": "Test team description",
        }),
        PayloadKind::TeamWithMembers => json!({
            "name": format!("Team with Members {n}-{u}"),
            "description": "Team created with initial members",
            "member_ids": [1, 2, 3],
        }),
        PayloadKind::TeamUpdate => json!({
            "name": format!("Updated Team {n}-{u}"),
            "description": "Updated team description",
        }),
        PayloadKind::Staff => json!({
            "name": format!("Test Staff {n}"),
            "email": format!("staff{n}.{u}@example.com"),
        }),
        PayloadKind::StaffWithPosition => json!({
            "name": format!("Test Staff {n}"),
            "email": format!("staff{n}.{u}@example.com"),
            "position": "Developer",
        }),
        PayloadKind::StaffUpdate => json!({
            "name": format!("Updated Staff {n}"),
            "email": format!("updated.staff{n}.{u}@example.com"),
        }),
        PayloadKind::StaffPosition => json!({ "position": "Team Lead" }),
        PayloadKind::Group => json!({
            "name": format!("Test Group {n}-{u}"),
            "description": "Test group description",
        }),
        PayloadKind::GroupWithMembers => json!({
            "name": format!("Group with Members {n}-{u}"),
            "description": "Group created with initial members",
            "member_ids": [1, 2, 3],
        }),
        PayloadKind::GroupUpdate => json!({
            "name": format!("Updated Group {n}-{u}"),
            "description": "Updated group description",
        }),
        PayloadKind::GroupMembers => json!({ "member_ids": [1, 2] }),
        PayloadKind::Integration => json!({
            "name": format!("Test Integration {n}-{u}"),
            "type": "api",
        }),
        PayloadKind::WebhookIntegration => json!({
            "name": format!("Test Webhook {n}-{u}"),
            "type": "webhook",
            "url": "https://example.com/webhook",
        }),
        PayloadKind::IntegrationUpdate => json!({
            "name": format!("Updated Integration {n}-{u}"),
            "url": "https://example.com/webhook",
        }),
        PayloadKind::IntegrationStatus => json!({ "enabled": false }),
    };

    Some(body)
}
