use std::collections::HashSet;

use dashmap::DashMap;

/// Live transport connections per (project, user).
///
/// Keeps connection identifiers out of the persisted session: the session only
/// knows who participates, this registry knows who is currently connected.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: DashMap<(String, String), HashSet<String>>,
}

impl ConnectionRegistry {
    /// Create an empty instance.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a live connection for `user_id` in `project_id`.
    pub fn register(&self, project_id: &str, user_id: &str, connection_id: &str) {
        self.connections
            .entry((project_id.to_owned(), user_id.to_owned()))
            .or_default()
            .insert(connection_id.to_owned());
    }

    /// Forget a connection, returning how many connections the user still holds.
    pub fn unregister(&self, project_id: &str, user_id: &str, connection_id: &str) -> usize {
        let key = (project_id.to_owned(), user_id.to_owned());
        let remaining = match self.connections.get_mut(&key) {
            Some(mut entry) => {
                entry.remove(connection_id);
                entry.len()
            }
            None => return 0,
        };

        if remaining == 0 {
            self.connections.remove_if(&key, |_, ids| ids.is_empty());
        }
        remaining
    }

    /// Whether `user_id` holds at least one live connection.
    pub fn is_connected(&self, project_id: &str, user_id: &str) -> bool {
        self.connections
            .get(&(project_id.to_owned(), user_id.to_owned()))
            .is_some_and(|ids| !ids.is_empty())
    }

    /// User that registered `connection_id` in `project_id`, if any.
    pub fn owner(&self, project_id: &str, connection_id: &str) -> Option<String> {
        self.connections.iter().find_map(|entry| {
            let (project, user) = entry.key();
            (project == project_id && entry.value().contains(connection_id)).then(|| user.clone())
        })
    }

    /// Drop every connection recorded for a deleted session.
    pub fn forget_project(&self, project_id: &str) {
        self.connections
            .retain(|(project, _), _| project != project_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_stays_connected_until_last_connection_closes() {
        let registry = ConnectionRegistry::new();
        registry.register("p1", "u1", "tab-a");
        registry.register("p1", "u1", "tab-b");

        assert_eq!(registry.unregister("p1", "u1", "tab-a"), 1);
        assert!(registry.is_connected("p1", "u1"));
        assert_eq!(registry.unregister("p1", "u1", "tab-b"), 0);
        assert!(!registry.is_connected("p1", "u1"));
    }

    #[test]
    fn unknown_connections_report_nothing_left() {
        let registry = ConnectionRegistry::new();
        assert_eq!(registry.unregister("p1", "u1", "tab-a"), 0);
    }

    #[test]
    fn owner_is_scoped_to_the_project() {
        let registry = ConnectionRegistry::new();
        registry.register("p1", "u1", "tab-a");
        registry.register("p2", "u2", "tab-b");

        assert_eq!(registry.owner("p1", "tab-a").as_deref(), Some("u1"));
        assert!(registry.owner("p1", "tab-b").is_none());
    }

    #[test]
    fn forgetting_a_project_keeps_others() {
        let registry = ConnectionRegistry::new();
        registry.register("p1", "u1", "a");
        registry.register("p2", "u1", "b");
        registry.forget_project("p1");
        assert!(!registry.is_connected("p1", "u1"));
        assert!(registry.is_connected("p2", "u1"));
    }
}
