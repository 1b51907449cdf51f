//! Roles, capabilities and per-request session context.
//!
//! Every route asks one question, [`AccessPolicy::authorize`], instead of
//! checking roles itself. Roles carry their capability sets; designated
//! administrators come from configuration.
//!
//! Impersonation is an explicit field of [`SessionContext`]. It is only
//! granted to callers holding [`Capability::Impersonate`] and every request
//! made while impersonating is written to the `boxoffice::audit` log target.

use crate::config::{AccessConfig, ApiTokenConfig};
use crate::error::InventoryError;
use crate::types::{HoldType, SessionId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

/// Something a caller may be allowed to do.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Capability {
    /// Read inventory, availability and hold timers
    ViewInventory,
    /// Create and manage the caller's own holds
    HoldTickets,
    /// Buy tickets
    PurchaseTickets,
    /// Release or change holds owned by other sessions
    ReleaseAnyHold,
    /// Create admin-reserve holds
    AdminReserve,
    /// Register ticket types and change totals
    AdjustInventory,
    /// Refund sold tickets
    ProcessRefunds,
    /// Read the ledger and alerts
    ViewTransactions,
    /// Run bulk operations and on-demand sweeps
    RunBulkOperations,
    /// Act on behalf of another user
    Impersonate,
}

const ALL: &[Capability] = &[
    Capability::ViewInventory,
    Capability::HoldTickets,
    Capability::PurchaseTickets,
    Capability::ReleaseAnyHold,
    Capability::AdminReserve,
    Capability::AdjustInventory,
    Capability::ProcessRefunds,
    Capability::ViewTransactions,
    Capability::RunBulkOperations,
    Capability::Impersonate,
];

const ORGANIZER: &[Capability] = &[
    Capability::ViewInventory,
    Capability::HoldTickets,
    Capability::PurchaseTickets,
    Capability::ReleaseAnyHold,
    Capability::AdminReserve,
    Capability::AdjustInventory,
    Capability::ProcessRefunds,
    Capability::ViewTransactions,
    Capability::RunBulkOperations,
];

const EVENT_STAFF: &[Capability] = &[
    Capability::ViewInventory,
    Capability::HoldTickets,
    Capability::PurchaseTickets,
    Capability::ReleaseAnyHold,
];

const SALES_AGENT: &[Capability] = &[
    Capability::ViewInventory,
    Capability::HoldTickets,
    Capability::PurchaseTickets,
];

const MARKETING_ASSISTANT: &[Capability] = &[Capability::ViewInventory, Capability::ViewTransactions];

const BUYER: &[Capability] = &[
    Capability::ViewInventory,
    Capability::HoldTickets,
    Capability::PurchaseTickets,
];

/// Platform role. Each role carries its own capability set.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    /// Platform administrator
    Admin,
    /// Event organizer
    Organizer,
    /// Sells tickets for organizers, including cash sales
    SalesAgent,
    /// Door and box-office staff
    EventStaff,
    /// Promotes events, reads sales data
    MarketingAssistant,
    /// Follows organizers; buys like a customer
    Follower,
    /// Ticket buyer
    Customer,
}

impl Role {
    /// Capabilities granted by this role
    #[must_use]
    pub const fn capabilities(self) -> &'static [Capability] {
        match self {
            Self::Admin => ALL,
            Self::Organizer => ORGANIZER,
            Self::SalesAgent => SALES_AGENT,
            Self::EventStaff => EVENT_STAFF,
            Self::MarketingAssistant => MARKETING_ASSISTANT,
            Self::Follower | Self::Customer => BUYER,
        }
    }

    /// Whether this role grants `capability`
    #[must_use]
    pub fn grants(self, capability: Capability) -> bool {
        self.capabilities().contains(&capability)
    }

    /// Wire name of the role
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Organizer => "organizer",
            Self::SalesAgent => "sales-agent",
            Self::EventStaff => "event-staff",
            Self::MarketingAssistant => "marketing-assistant",
            Self::Follower => "follower",
            Self::Customer => "customer",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "admin" => Ok(Self::Admin),
            "organizer" => Ok(Self::Organizer),
            "sales-agent" => Ok(Self::SalesAgent),
            "event-staff" => Ok(Self::EventStaff),
            "marketing-assistant" => Ok(Self::MarketingAssistant),
            "follower" => Ok(Self::Follower),
            "customer" | "user" => Ok(Self::Customer),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// An authenticated user.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Stable user id
    pub user_id: String,
    /// Email address
    pub email: String,
    /// Assigned roles
    pub roles: Vec<Role>,
}

impl Identity {
    /// Build an identity
    #[must_use]
    pub fn new(user_id: impl Into<String>, email: impl Into<String>, roles: Vec<Role>) -> Self {
        Self {
            user_id: user_id.into(),
            email: email.into(),
            roles,
        }
    }
}

/// Who is making a request and on whose behalf.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionContext {
    /// The authenticated caller
    pub identity: Identity,
    /// User being impersonated, if any
    pub acting_as: Option<Identity>,
    /// Checkout session the caller's holds belong to
    pub session_id: Option<SessionId>,
}

impl SessionContext {
    /// Context for a caller acting as themselves
    #[must_use]
    pub const fn new(identity: Identity, session_id: Option<SessionId>) -> Self {
        Self {
            identity,
            acting_as: None,
            session_id,
        }
    }

    /// Identity whose permissions apply to this request
    #[must_use]
    pub fn effective(&self) -> &Identity {
        self.acting_as.as_ref().unwrap_or(&self.identity)
    }

    /// Whether the caller is impersonating someone
    #[must_use]
    pub const fn is_impersonating(&self) -> bool {
        self.acting_as.is_some()
    }

    /// Actor recorded in the ledger, naming both users when impersonating
    #[must_use]
    pub fn actor_label(&self) -> String {
        match &self.acting_as {
            Some(target) => format!("{} (as {})", self.identity.email, target.email),
            None => self.identity.email.clone(),
        }
    }
}

/// Resolves bearer tokens to identities.
#[async_trait]
pub trait SessionResolver: Send + Sync {
    /// Identity for a bearer token, `None` when the token is unknown
    async fn resolve_token(&self, token: &str) -> Option<Identity>;

    /// Identity for an email, used as an impersonation target
    async fn resolve_email(&self, email: &str) -> Option<Identity>;
}

/// Resolver over a fixed token table from configuration.
#[derive(Debug, Clone, Default)]
pub struct StaticTokenResolver {
    tokens: HashMap<String, Identity>,
}

impl StaticTokenResolver {
    /// Build the token table
    #[must_use]
    pub fn new(tokens: &[ApiTokenConfig]) -> Self {
        Self {
            tokens: tokens
                .iter()
                .map(|entry| {
                    (
                        entry.token.clone(),
                        Identity::new(entry.email.clone(), entry.email.clone(), entry.roles.clone()),
                    )
                })
                .collect(),
        }
    }
}

#[async_trait]
impl SessionResolver for StaticTokenResolver {
    async fn resolve_token(&self, token: &str) -> Option<Identity> {
        self.tokens.get(token).cloned()
    }

    async fn resolve_email(&self, email: &str) -> Option<Identity> {
        self.tokens
            .values()
            .find(|identity| identity.email.eq_ignore_ascii_case(email))
            .cloned()
    }
}

/// The single capability check used by every route.
#[derive(Debug, Clone, Default)]
pub struct AccessPolicy {
    admin_emails: HashSet<String>,
}

impl AccessPolicy {
    /// Policy with the configured administrator emails
    #[must_use]
    pub fn new(config: &AccessConfig) -> Self {
        Self {
            admin_emails: config
                .admin_emails
                .iter()
                .map(|email| email.to_ascii_lowercase())
                .collect(),
        }
    }

    /// Whether `identity` is a designated or role-based administrator
    #[must_use]
    pub fn is_admin(&self, identity: &Identity) -> bool {
        identity.roles.contains(&Role::Admin)
            || self
                .admin_emails
                .contains(&identity.email.to_ascii_lowercase())
    }

    /// Whether `identity` holds `capability`
    #[must_use]
    pub fn allows(&self, identity: &Identity, capability: Capability) -> bool {
        self.is_admin(identity) || identity.roles.iter().any(|role| role.grants(capability))
    }

    /// Check a capability for the effective identity of a request.
    ///
    /// # Errors
    ///
    /// [`InventoryError::Forbidden`] when the capability is missing.
    pub fn authorize(
        &self,
        context: &SessionContext,
        capability: Capability,
    ) -> Result<(), InventoryError> {
        let effective = context.effective();
        let allowed = self.allows(effective, capability);

        if let Some(target) = &context.acting_as {
            tracing::info!(
                target: "boxoffice::audit",
                actor = %context.identity.email,
                acting_as = %target.email,
                capability = ?capability,
                allowed,
                "Impersonated request"
            );
        }

        if allowed {
            Ok(())
        } else {
            Err(InventoryError::Forbidden(format!(
                "{} lacks {capability:?}",
                effective.email
            )))
        }
    }

    /// Capability needed to create a hold of `hold_type`.
    #[must_use]
    pub const fn hold_capability(hold_type: HoldType) -> Capability {
        match hold_type {
            HoldType::AdminReserve => Capability::AdminReserve,
            HoldType::Checkout | HoldType::CashPayment => Capability::HoldTickets,
        }
    }

    /// Start impersonating `target`.
    ///
    /// # Errors
    ///
    /// [`InventoryError::Forbidden`] unless the caller holds
    /// [`Capability::Impersonate`].
    pub fn impersonate(
        &self,
        context: SessionContext,
        target: Identity,
    ) -> Result<SessionContext, InventoryError> {
        if !self.allows(&context.identity, Capability::Impersonate) {
            tracing::warn!(
                target: "boxoffice::audit",
                actor = %context.identity.email,
                acting_as = %target.email,
                "Impersonation denied"
            );
            return Err(InventoryError::Forbidden(format!(
                "{} may not impersonate other users",
                context.identity.email
            )));
        }

        tracing::info!(
            target: "boxoffice::audit",
            actor = %context.identity.email,
            acting_as = %target.email,
            "Impersonation started"
        );

        Ok(SessionContext {
            acting_as: Some(target),
            ..context
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn context(email: &str, roles: Vec<Role>) -> SessionContext {
        SessionContext::new(Identity::new(email, email, roles), None)
    }

    #[test]
    fn role_capabilities() {
        assert!(Role::Admin.grants(Capability::Impersonate));
        assert!(Role::Organizer.grants(Capability::AdjustInventory));
        assert!(!Role::Organizer.grants(Capability::Impersonate));
        assert!(Role::EventStaff.grants(Capability::ReleaseAnyHold));
        assert!(!Role::SalesAgent.grants(Capability::ReleaseAnyHold));
        assert!(!Role::MarketingAssistant.grants(Capability::HoldTickets));
        assert!(Role::Follower.grants(Capability::PurchaseTickets));
        assert!(!Role::Customer.grants(Capability::AdminReserve));
    }

    #[test]
    fn roles_parse_from_config_names() {
        assert_eq!("sales_agent".parse::<Role>().unwrap(), Role::SalesAgent);
        assert_eq!("Event-Staff".parse::<Role>().unwrap(), Role::EventStaff);
        assert_eq!("user".parse::<Role>().unwrap(), Role::Customer);
        assert!("superuser".parse::<Role>().is_err());
    }

    #[test]
    fn configured_admin_email_gets_every_capability() {
        let policy = AccessPolicy::new(&AccessConfig {
            admin_emails: vec!["Owner@Example.com".to_string()],
            api_tokens: vec![],
        });
        let ctx = context("owner@example.com", vec![]);

        assert!(policy.authorize(&ctx, Capability::AdjustInventory).is_ok());
        assert!(policy.authorize(&ctx, Capability::Impersonate).is_ok());
    }

    #[test]
    fn missing_capability_is_forbidden() {
        let policy = AccessPolicy::default();
        let ctx = context("buyer@example.com", vec![Role::Customer]);

        let err = policy.authorize(&ctx, Capability::ProcessRefunds).unwrap_err();
        assert!(matches!(err, InventoryError::Forbidden(_)));
    }

    #[test]
    fn impersonation_uses_target_permissions() {
        let policy = AccessPolicy::default();
        let admin = context("admin@example.com", vec![Role::Admin]);
        let target = Identity::new("u1", "buyer@example.com", vec![Role::Customer]);

        let ctx = policy.impersonate(admin, target).unwrap();

        assert!(ctx.is_impersonating());
        assert_eq!(ctx.actor_label(), "admin@example.com (as buyer@example.com)");
        assert!(policy.authorize(&ctx, Capability::HoldTickets).is_ok());
        assert!(policy.authorize(&ctx, Capability::AdjustInventory).is_err());
    }

    #[test]
    fn impersonation_requires_capability() {
        let policy = AccessPolicy::default();
        let organizer = context("org@example.com", vec![Role::Organizer]);
        let target = Identity::new("u1", "buyer@example.com", vec![Role::Customer]);

        assert!(policy.impersonate(organizer, target).is_err());
    }

    #[tokio::test]
    async fn static_resolver_looks_up_tokens_and_emails() {
        let resolver = StaticTokenResolver::new(&[ApiTokenConfig {
            token: "staff-token".to_string(),
            email: "door@example.com".to_string(),
            roles: vec![Role::EventStaff],
        }]);

        let identity = resolver.resolve_token("staff-token").await.unwrap();
        assert_eq!(identity.roles, vec![Role::EventStaff]);
        assert!(resolver.resolve_token("nope").await.is_none());
        assert!(resolver.resolve_email("DOOR@example.com").await.is_some());
    }
}
