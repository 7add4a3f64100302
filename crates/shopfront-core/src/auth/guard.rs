use super::session::Session;

/// Who may see a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// Shop browsing, product pages
    Public,
    /// Login and registration; signed-in users are sent home
    GuestOnly,
    /// Cart checkout, order history, reviews
    Authenticated,
    /// Admin console
    Staff,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteDecision {
    /// Persisted state not loaded yet; make no navigation decision
    Pending,
    Allow,
    RedirectToLogin,
    RedirectToHome,
}

impl RouteDecision {
    pub fn is_redirect(&self) -> bool {
        matches!(self, RouteDecision::RedirectToLogin | RouteDecision::RedirectToHome)
    }
}

/// Decide what to do with a navigation to a page with the given access level.
///
/// Before hydration every auth-dependent page yields `Pending`, even if the
/// in-memory state currently looks logged out.
pub fn route_decision(session: &Session, access: Access) -> RouteDecision {
    if access == Access::Public {
        return RouteDecision::Allow;
    }
    if !session.has_hydrated() {
        return RouteDecision::Pending;
    }

    let user = session.user().filter(|_| session.is_authenticated());
    match (access, user) {
        (Access::GuestOnly, None) => RouteDecision::Allow,
        (Access::GuestOnly, Some(_)) => RouteDecision::RedirectToHome,
        (Access::Authenticated | Access::Staff, None) => RouteDecision::RedirectToLogin,
        (Access::Authenticated, Some(_)) => RouteDecision::Allow,
        (Access::Staff, Some(user)) if user.role.is_staff() => RouteDecision::Allow,
        (Access::Staff, Some(_)) => RouteDecision::RedirectToHome,
        (Access::Public, _) => RouteDecision::Allow,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{MemoryStore, SessionStore, User};
    use secrecy::SecretString;
    use std::sync::Arc;

    fn user_with_role(role: &str) -> User {
        serde_json::from_value(serde_json::json!({
            "id": "u_9",
            "email": "staff@example.com",
            "name": "Staff",
            "role": role,
            "isActive": true,
            "emailVerified": true,
            "createdAt": "2024-01-01T00:00:00Z",
            "updatedAt": "2024-01-01T00:00:00Z"
        }))
        .expect("Failed to build test user")
    }

    fn signed_in(role: &str) -> Session {
        let store = SessionStore::in_memory();
        store.hydrate();
        store.set_auth(user_with_role(role), SecretString::from("a"), SecretString::from("r"));
        store.snapshot()
    }

    #[test]
    fn test_pending_before_hydration_even_when_logged_out() {
        // Storage says logged out, but it has not been read yet
        let store = SessionStore::new(Arc::new(MemoryStore::new()));
        let session = store.snapshot();

        for access in [Access::GuestOnly, Access::Authenticated, Access::Staff] {
            let decision = route_decision(&session, access);
            assert_eq!(decision, RouteDecision::Pending);
            assert!(!decision.is_redirect());
        }
        assert_eq!(route_decision(&session, Access::Public), RouteDecision::Allow);
    }

    #[test]
    fn test_logged_out_after_hydration() {
        let store = SessionStore::in_memory();
        store.hydrate();
        let session = store.snapshot();

        assert_eq!(route_decision(&session, Access::Authenticated), RouteDecision::RedirectToLogin);
        assert_eq!(route_decision(&session, Access::Staff), RouteDecision::RedirectToLogin);
        assert_eq!(route_decision(&session, Access::GuestOnly), RouteDecision::Allow);
    }

    #[test]
    fn test_customer_routes() {
        let session = signed_in("CUSTOMER");
        assert_eq!(route_decision(&session, Access::Authenticated), RouteDecision::Allow);
        assert_eq!(route_decision(&session, Access::Staff), RouteDecision::RedirectToHome);
        assert_eq!(route_decision(&session, Access::GuestOnly), RouteDecision::RedirectToHome);
    }

    #[test]
    fn test_staff_routes() {
        assert_eq!(route_decision(&signed_in("ADMIN"), Access::Staff), RouteDecision::Allow);
        assert_eq!(route_decision(&signed_in("SUPER_ADMIN"), Access::Staff), RouteDecision::Allow);
    }

    #[test]
    fn test_tokens_without_user_are_not_signed_in() {
        let store = SessionStore::in_memory();
        store.hydrate();
        store.set_tokens(SecretString::from("a"), SecretString::from("r"));

        assert_eq!(
            route_decision(&store.snapshot(), Access::Authenticated),
            RouteDecision::RedirectToLogin
        );
    }
}
