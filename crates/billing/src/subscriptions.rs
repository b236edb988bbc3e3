//! Subscription mutation
//!
//! Pure functions that decide how a paid plan changes a user's roles and
//! subscription expiry. Nothing here touches storage; the reconciler applies
//! the result inside its order transaction.

use time::{Date, Duration, Month, OffsetDateTime};

use crate::plan::Plan;
use crate::user::{Role, RoleSet};

/// Outcome of applying a plan to a user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionGrant {
    pub roles: RoleSet,
    pub roles_granted: Vec<Role>,
    pub roles_removed: Vec<Role>,
    /// `None` means lifetime access
    pub expires_at: Option<OffsetDateTime>,
}

/// Roles after a recovery grant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleChange {
    pub roles: RoleSet,
    pub granted: Vec<Role>,
    pub removed: Vec<Role>,
}

/// Role a plan grants. Unknown plans fall back to `Trader`.
pub fn role_for_plan(plan: Option<Plan>) -> Role {
    match plan {
        Some(Plan::Creator) => Role::Creator,
        _ => Role::Trader,
    }
}

/// A user with a paid role and no expiry already has lifetime access
pub fn has_lifetime_access(roles: &RoleSet, expires_at: Option<OffsetDateTime>) -> bool {
    expires_at.is_none() && roles.has_paid_role()
}

pub struct SubscriptionMutator;

impl SubscriptionMutator {
    /// Apply a first-time PAID transition for `plan`.
    ///
    /// Time-boxed plans extend from `max(current_expiry, now)` by whole
    /// calendar months. Lifetime plans clear the expiry, and a user who
    /// already has lifetime access keeps it when buying a time-boxed plan.
    pub fn apply(
        roles: &RoleSet,
        current_expiry: Option<OffsetDateTime>,
        plan: Option<Plan>,
        now: OffsetDateTime,
    ) -> SubscriptionGrant {
        let already_lifetime = has_lifetime_access(roles, current_expiry);

        let base = base_instant(current_expiry, now);
        let expires_at = match plan {
            Some(p) if p.is_lifetime() => None,
            _ if already_lifetime => None,
            Some(p) => Some(add_months(base, p.months().unwrap_or(1))),
            // unknown or missing plan extends by one month
            None => Some(add_months(base, 1)),
        };

        let (roles, roles_granted, roles_removed) = Self::grant_role(roles, plan);

        SubscriptionGrant {
            roles,
            roles_granted,
            roles_removed,
            expires_at,
        }
    }

    /// Role-only grant used when an order is already PAID but the user lost
    /// the role. Expiry is left untouched.
    pub fn recover(roles: &RoleSet, plan: Option<Plan>) -> RoleChange {
        let (roles, granted, removed) = Self::grant_role(roles, plan);
        RoleChange {
            roles,
            granted,
            removed,
        }
    }

    fn grant_role(roles: &RoleSet, plan: Option<Plan>) -> (RoleSet, Vec<Role>, Vec<Role>) {
        let mut next = roles.clone();
        let role = role_for_plan(plan);

        let mut granted = Vec::new();
        if !next.contains(role) {
            next.insert(role);
            granted.push(role);
        }

        let mut removed = Vec::new();
        if next.contains(Role::Whitelist) {
            next.remove(Role::Whitelist);
            removed.push(Role::Whitelist);
        }

        (next, granted, removed)
    }
}

fn base_instant(current_expiry: Option<OffsetDateTime>, now: OffsetDateTime) -> OffsetDateTime {
    match current_expiry {
        Some(expiry) if expiry > now => expiry,
        _ => now,
    }
}

/// Add calendar months, clamping the day to the end of the target month
/// (Jan 31 + 1 month = Feb 28/29).
pub fn add_months(at: OffsetDateTime, months: u32) -> OffsetDateTime {
    let zero_based = u8::from(at.month()) as i64 - 1 + months as i64;
    let year = at.year() as i64 + zero_based.div_euclid(12);
    let month_number = (zero_based.rem_euclid(12) + 1) as u8;

    let shifted = i32::try_from(year)
        .ok()
        .zip(Month::try_from(month_number).ok())
        .and_then(|(year, month)| {
            let day = at.day().min(time::util::days_in_year_month(year, month));
            Date::from_calendar_date(year, month, day).ok()
        })
        .map(|date| at.replace_date(date));

    match shifted {
        Some(dt) => dt,
        None => {
            tracing::error!(at = %at, months, "Calendar month arithmetic out of range, using 30-day months");
            at.saturating_add(Duration::days(30 * months as i64))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    const NOW: OffsetDateTime = datetime!(2025-01-31 10:00 UTC);

    #[test]
    fn test_add_months_clamps_to_month_end() {
        assert_eq!(add_months(NOW, 1), datetime!(2025-02-28 10:00 UTC));
        assert_eq!(
            add_months(datetime!(2024-01-31 00:00 UTC), 1),
            datetime!(2024-02-29 00:00 UTC)
        );
        assert_eq!(add_months(NOW, 12), datetime!(2026-01-31 10:00 UTC));
        assert_eq!(
            add_months(datetime!(2025-11-15 00:00 UTC), 3),
            datetime!(2026-02-15 00:00 UTC)
        );
    }

    #[test]
    fn test_monthly_from_no_expiry() {
        let grant = SubscriptionMutator::apply(&RoleSet::default(), None, Some(Plan::Monthly), NOW);
        assert_eq!(grant.expires_at, Some(add_months(NOW, 1)));
        assert!(grant.roles.contains(Role::Trader));
        assert_eq!(grant.roles_granted, vec![Role::Trader]);
    }

    #[test]
    fn test_extension_stacks_on_future_expiry() {
        let roles = RoleSet::new([Role::Trader]);
        let current = datetime!(2025-03-10 00:00 UTC);
        let grant = SubscriptionMutator::apply(&roles, Some(current), Some(Plan::Quarterly), NOW);
        assert_eq!(grant.expires_at, Some(datetime!(2025-06-10 00:00 UTC)));
        assert!(grant.roles_granted.is_empty());
    }

    #[test]
    fn test_past_expiry_extends_from_now() {
        let past = datetime!(2024-06-01 00:00 UTC);
        let grant = SubscriptionMutator::apply(&RoleSet::default(), Some(past), Some(Plan::SixMonths), NOW);
        assert_eq!(grant.expires_at, Some(add_months(NOW, 6)));
    }

    #[test]
    fn test_creator_is_lifetime() {
        let future = add_months(NOW, 2);
        let grant = SubscriptionMutator::apply(&RoleSet::default(), Some(future), Some(Plan::Creator), NOW);
        assert_eq!(grant.expires_at, None);
        assert!(grant.roles.contains(Role::Creator));
        assert!(!grant.roles.contains(Role::Trader));
    }

    #[test]
    fn test_pro_grants_trader_lifetime() {
        let grant = SubscriptionMutator::apply(&RoleSet::default(), None, Some(Plan::Pro), NOW);
        assert_eq!(grant.expires_at, None);
        assert!(grant.roles.contains(Role::Trader));
    }

    #[test]
    fn test_unknown_plan_defaults_to_monthly_trader() {
        let grant = SubscriptionMutator::apply(&RoleSet::default(), None, None, NOW);
        assert_eq!(grant.expires_at, Some(add_months(NOW, 1)));
        assert!(grant.roles.contains(Role::Trader));
    }

    #[test]
    fn test_whitelist_removed_and_developer_kept() {
        let roles = RoleSet::new([Role::Whitelist, Role::Developer]);
        let grant = SubscriptionMutator::apply(&roles, None, Some(Plan::Yearly), NOW);
        assert!(!grant.roles.contains(Role::Whitelist));
        assert!(grant.roles.contains(Role::Developer));
        assert!(grant.roles.contains(Role::User));
        assert_eq!(grant.roles_removed, vec![Role::Whitelist]);
    }

    #[test]
    fn test_lifetime_user_keeps_lifetime_on_timeboxed_purchase() {
        let roles = RoleSet::new([Role::Trader]);
        let grant = SubscriptionMutator::apply(&roles, None, Some(Plan::Monthly), NOW);
        assert_eq!(grant.expires_at, None);
    }

    #[test]
    fn test_recover_grants_role_only() {
        let roles = RoleSet::new([Role::Whitelist]);
        let grant = SubscriptionMutator::recover(&roles, Some(Plan::Creator));
        assert!(grant.roles.contains(Role::Creator));
        assert!(!grant.roles.contains(Role::Whitelist));
    }
}
