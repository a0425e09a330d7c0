//! crates/neurocom_core/src/access.rs
//!
//! Plan-tier gating and monthly quotas.
//!
//! An [`AccessChain`] is an ordered list of [`Guard`]s declared per endpoint.
//! [`AccessControl::enforce`] resolves the caller's user record once, stores it
//! on the [`RequestContext`], and runs the guards against it in order. The
//! first failing guard ends the request with a structured refusal.

use std::sync::Arc;

use tracing::warn;
use uuid::Uuid;

use crate::domain::{ContentKind, ContentLevel, Resource, Tier, User};
use crate::error::{CoreError, CoreResult};
use crate::ports::{LearningRepository, UserRepository};

//=========================================================================================
// Quotas
//=========================================================================================

/// A monthly allowance. `Unlimited` is a sentinel, never a large number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaLimit {
    Limited(u32),
    Unlimited,
}

impl QuotaLimit {
    pub fn allows(self, used: u32) -> bool {
        match self {
            QuotaLimit::Limited(limit) => used < limit,
            QuotaLimit::Unlimited => true,
        }
    }

    /// The finite limit, if any.
    pub fn value(self) -> Option<u32> {
        match self {
            QuotaLimit::Limited(limit) => Some(limit),
            QuotaLimit::Unlimited => None,
        }
    }
}

/// Per-tier limits for one resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaTable {
    pub free: QuotaLimit,
    pub intermediate: QuotaLimit,
    pub full: QuotaLimit,
}

impl QuotaTable {
    /// Free gets nothing, full is unlimited, intermediate gets `limit`.
    pub fn intermediate_only(limit: u32) -> Self {
        Self {
            free: QuotaLimit::Limited(0),
            intermediate: QuotaLimit::Limited(limit),
            full: QuotaLimit::Unlimited,
        }
    }

    pub fn for_tier(&self, tier: Tier) -> QuotaLimit {
        match tier {
            Tier::Free => self.free,
            Tier::Intermediate => self.intermediate,
            Tier::Full => self.full,
        }
    }
}

/// Where a user stands against one resource's monthly allowance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaStatus {
    pub limit: QuotaLimit,
    pub used: u32,
}

impl QuotaStatus {
    pub fn of(user: &User, resource: Resource, limits: &QuotaTable) -> Self {
        Self {
            limit: limits.for_tier(user.tier),
            used: user.usage(resource),
        }
    }

    pub fn can_use(&self) -> bool {
        self.limit.allows(self.used)
    }
}

//=========================================================================================
// Rules
//=========================================================================================

/// Access is granted iff the tier ranks at or above the content level.
pub fn content_accessible(tier: Tier, level: ContentLevel) -> bool {
    tier.rank() >= level.rank()
}

fn check_minimum_tier(tier: Tier, allowed: &[Tier]) -> CoreResult<()> {
    if allowed.contains(&tier) {
        Ok(())
    } else {
        Err(CoreError::InsufficientTier {
            current: tier,
            allowed: allowed.to_vec(),
        })
    }
}

fn check_quota(user: &User, resource: Resource, limits: &QuotaTable) -> CoreResult<()> {
    let status = QuotaStatus::of(user, resource, limits);
    if status.can_use() {
        return Ok(());
    }
    Err(CoreError::QuotaExceeded {
        resource,
        // `can_use` only fails for finite limits.
        limit: status.limit.value().unwrap_or(u32::MAX),
        used: status.used,
        current: user.tier,
    })
}

//=========================================================================================
// Guards and the Request Context
//=========================================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum Guard {
    /// Passes only for the listed tiers.
    MinimumTier(Vec<Tier>),
    /// Passes while the caller's monthly counter is below the tier's limit.
    MonthlyQuota {
        resource: Resource,
        limits: QuotaTable,
    },
    /// Compares the caller's tier with the level of the addressed content item.
    ContentLevel(ContentKind),
}

/// An endpoint's declared guard sequence.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AccessChain {
    guards: Vec<Guard>,
}

impl AccessChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn require_tier(mut self, allowed: impl IntoIterator<Item = Tier>) -> Self {
        self.guards
            .push(Guard::MinimumTier(allowed.into_iter().collect()));
        self
    }

    pub fn monthly_quota(mut self, resource: Resource, limits: QuotaTable) -> Self {
        self.guards.push(Guard::MonthlyQuota { resource, limits });
        self
    }

    pub fn content_level(mut self, kind: ContentKind) -> Self {
        self.guards.push(Guard::ContentLevel(kind));
        self
    }

    pub fn guards(&self) -> &[Guard] {
        &self.guards
    }
}

/// The authenticated caller, threaded through the guards and into handlers.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestContext {
    pub user_id: Uuid,
    user: Option<User>,
}

impl RequestContext {
    pub fn authenticated(user_id: Uuid) -> Self {
        Self {
            user_id,
            user: None,
        }
    }

    /// The resolved user record, once the tier resolution guard has run.
    pub fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    pub fn with_user(self, user: User) -> Self {
        Self {
            user_id: self.user_id,
            user: Some(user),
        }
    }
}

//=========================================================================================
// Enforcement
//=========================================================================================

#[derive(Clone)]
pub struct AccessControl {
    users: Arc<dyn UserRepository>,
    learning: Arc<dyn LearningRepository>,
}

impl AccessControl {
    pub fn new(users: Arc<dyn UserRepository>, learning: Arc<dyn LearningRepository>) -> Self {
        Self { users, learning }
    }

    /// Tier resolution: loads the caller's record unless the context already has it.
    pub async fn resolve(&self, ctx: RequestContext) -> CoreResult<RequestContext> {
        if ctx.user.is_some() {
            return Ok(ctx);
        }
        let user = self
            .users
            .find_user(ctx.user_id)
            .await?
            .ok_or(CoreError::UserNotFound(ctx.user_id))?;
        Ok(ctx.with_user(user))
    }

    /// Runs `chain` for the caller. `content_id` is the slug or id of the
    /// addressed content item, for chains with a content-level guard.
    pub async fn enforce(
        &self,
        chain: &AccessChain,
        ctx: RequestContext,
        content_id: Option<&str>,
    ) -> CoreResult<RequestContext> {
        let ctx = self.resolve(ctx).await?;
        let user = ctx.user.as_ref().ok_or(CoreError::UserNotFound(ctx.user_id))?;

        for guard in &chain.guards {
            match guard {
                Guard::MinimumTier(allowed) => check_minimum_tier(user.tier, allowed)?,
                Guard::MonthlyQuota { resource, limits } => check_quota(user, *resource, limits)?,
                Guard::ContentLevel(kind) => {
                    self.check_content(*kind, content_id, user.tier).await?
                }
            }
        }
        Ok(ctx)
    }

    /// Unresolvable content passes so the handler can answer with its own 404.
    async fn check_content(
        &self,
        kind: ContentKind,
        content_id: Option<&str>,
        tier: Tier,
    ) -> CoreResult<()> {
        let Some(content_id) = content_id else {
            return Ok(());
        };
        let level = match self.learning.content_level(kind, content_id).await {
            Ok(Some(level)) => level,
            Ok(None) => return Ok(()),
            Err(e) => {
                warn!("Could not resolve level of {:?} '{}': {}", kind, content_id, e);
                return Ok(());
            }
        };
        if content_accessible(tier, level) {
            Ok(())
        } else {
            Err(CoreError::InsufficientTier {
                current: tier,
                allowed: level.and_above(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn user(tier: Tier, messages: u32) -> User {
        User {
            id: Uuid::new_v4(),
            name: None,
            email: "u@example.com".to_string(),
            tier,
            messages_sent_this_month: messages,
            consultations_booked_this_month: 0,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn content_access_follows_rank_for_every_pair() {
        for tier in Tier::ALL {
            for level in Tier::ALL {
                assert_eq!(
                    content_accessible(tier, level),
                    tier.rank() >= level.rank(),
                    "tier {} level {}",
                    tier,
                    level
                );
            }
        }
        assert!(!content_accessible(Tier::Free, Tier::Intermediate));
        assert!(content_accessible(Tier::Intermediate, Tier::Free));
    }

    #[test]
    fn quota_blocks_at_limit_and_never_for_unlimited() {
        let limits = QuotaTable::intermediate_only(5);
        assert!(check_quota(&user(Tier::Intermediate, 4), Resource::Messages, &limits).is_ok());
        assert!(matches!(
            check_quota(&user(Tier::Intermediate, 5), Resource::Messages, &limits),
            Err(CoreError::QuotaExceeded { limit: 5, used: 5, .. })
        ));
        assert!(check_quota(&user(Tier::Free, 0), Resource::Messages, &limits).is_err());
        assert!(check_quota(&user(Tier::Full, u32::MAX), Resource::Messages, &limits).is_ok());
    }

    #[test]
    fn minimum_tier_reports_allowed_set() {
        let err = check_minimum_tier(Tier::Free, &[Tier::Intermediate, Tier::Full]).unwrap_err();
        match err {
            CoreError::InsufficientTier { current, allowed } => {
                assert_eq!(current, Tier::Free);
                assert_eq!(allowed, vec![Tier::Intermediate, Tier::Full]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
