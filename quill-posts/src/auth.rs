use quill_core::Actor;

/// Decides whether an actor may mutate posts.
///
/// The session layer has already authenticated the actor; this only answers
/// the yes/no question for create, update and delete.
pub trait AuthorizationGate: Send + Sync {
    fn is_authorized(&self, actor: &Actor) -> bool;
}

/// Authorizes actors holding one role.
#[derive(Debug, Clone)]
pub struct RoleGate {
    role: String,
}

pub const DEFAULT_ADMIN_ROLE: &str = "ADMIN";

impl RoleGate {
    pub fn new<S: Into<String>>(role: S) -> Self {
        Self { role: role.into() }
    }

    pub fn role(&self) -> &str {
        &self.role
    }
}

impl Default for RoleGate {
    fn default() -> Self {
        Self::new(DEFAULT_ADMIN_ROLE)
    }
}

impl AuthorizationGate for RoleGate {
    fn is_authorized(&self, actor: &Actor) -> bool {
        actor.has_role(&self.role)
    }
}

impl<F> AuthorizationGate for F
where
    F: Fn(&Actor) -> bool + Send + Sync,
{
    fn is_authorized(&self, actor: &Actor) -> bool {
        self(actor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_gate_matches_exact_role() {
        let gate = RoleGate::default();
        assert!(gate.is_authorized(&Actor::new("u1", "ADMIN")));
        assert!(!gate.is_authorized(&Actor::new("u2", "USER")));
        assert!(!gate.is_authorized(&Actor::new("u3", "admin")));
    }

    #[test]
    fn closures_are_gates() {
        let gate = |actor: &Actor| actor.id.as_str() == "owner";
        assert!(gate.is_authorized(&Actor::new("owner", "USER")));
        assert!(!gate.is_authorized(&Actor::new("other", "ADMIN")));
    }
}
