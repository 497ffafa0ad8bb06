use crate::navigation::routes;
use crate::session::{AuthState, SessionManager};

/// What an authenticated user sees when opening the login view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthenticatedLoginPolicy {
    /// Send them to the home view.
    #[default]
    RedirectHome,
    /// Let the login view render.
    Stay,
}

/// Outcome of a navigation check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardDecision {
    Allow,
    /// Session restore has not finished; decide later.
    Wait,
    Redirect(&'static str),
}

/// Per-navigation access check for protected views.
#[derive(Debug, Clone, Default)]
pub struct RouteGuard {
    login_policy: AuthenticatedLoginPolicy,
}

impl RouteGuard {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_login_policy(mut self, policy: AuthenticatedLoginPolicy) -> Self {
        self.login_policy = policy;
        self
    }

    /// Decide what to do with a navigation to `path` in `state`.
    #[must_use]
    pub fn check(&self, state: &AuthState, path: &str) -> GuardDecision {
        let path = normalize(path);
        let public = path == routes::LOGIN || path == routes::REGISTER;

        match state {
            AuthState::Unknown | AuthState::Checking => GuardDecision::Wait,
            AuthState::Anonymous if public => GuardDecision::Allow,
            AuthState::Anonymous => GuardDecision::Redirect(routes::LOGIN),
            AuthState::Authenticated(_)
                if path == routes::LOGIN
                    && self.login_policy == AuthenticatedLoginPolicy::RedirectHome =>
            {
                GuardDecision::Redirect(routes::HOME)
            }
            AuthState::Authenticated(_) => GuardDecision::Allow,
        }
    }

    /// Check a navigation against the live session and perform any redirect.
    pub fn on_navigation(&self, session: &SessionManager, path: &str) -> GuardDecision {
        let decision = self.check(&session.state(), path);
        if let GuardDecision::Redirect(target) = decision {
            tracing::debug!(from = path, to = target, "Route guard redirect");
            session.client().navigator().navigate(target);
        }
        decision
    }
}

// Drops query, fragment and trailing slash so `/login?next=/x` counts as `/login`.
fn normalize(path: &str) -> &str {
    let path = path.split(['?', '#']).next().unwrap_or(path);
    match path.trim_end_matches('/') {
        "" => routes::HOME,
        trimmed => trimmed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Role, User, UserId};

    fn signed_in() -> AuthState {
        AuthState::Authenticated(User {
            id: UserId::from("u-1"),
            name: "Ada".into(),
            email: "ada@example.com".into(),
            role: Role::Agent,
        })
    }

    #[test]
    fn waits_until_restored() {
        let guard = RouteGuard::new();
        assert_eq!(guard.check(&AuthState::Unknown, "/tickets"), GuardDecision::Wait);
        assert_eq!(guard.check(&AuthState::Checking, "/login"), GuardDecision::Wait);
    }

    #[test]
    fn anonymous_is_sent_to_login() {
        let guard = RouteGuard::new();
        assert_eq!(
            guard.check(&AuthState::Anonymous, "/tickets/42"),
            GuardDecision::Redirect("/login")
        );
        assert_eq!(
            guard.check(&AuthState::Anonymous, "/"),
            GuardDecision::Redirect("/login")
        );
    }

    #[test]
    fn login_and_register_are_public() {
        let guard = RouteGuard::new();
        assert_eq!(guard.check(&AuthState::Anonymous, "/login"), GuardDecision::Allow);
        assert_eq!(guard.check(&AuthState::Anonymous, "/register/"), GuardDecision::Allow);
        assert_eq!(
            guard.check(&AuthState::Anonymous, "/login?next=%2Fsla"),
            GuardDecision::Allow
        );
    }

    #[test]
    fn authenticated_login_policy() {
        let state = signed_in();
        assert_eq!(
            RouteGuard::new().check(&state, "/login"),
            GuardDecision::Redirect("/")
        );
        let stay = RouteGuard::new().with_login_policy(AuthenticatedLoginPolicy::Stay);
        assert_eq!(stay.check(&state, "/login"), GuardDecision::Allow);
        assert_eq!(RouteGuard::new().check(&state, "/register"), GuardDecision::Allow);
        assert_eq!(RouteGuard::new().check(&state, "/macros"), GuardDecision::Allow);
    }

    #[test]
    fn normalize_strips_suffixes() {
        assert_eq!(normalize("/login/"), "/login");
        assert_eq!(normalize("/login#top"), "/login");
        assert_eq!(normalize(""), "/");
        assert_eq!(normalize("/"), "/");
    }
}
