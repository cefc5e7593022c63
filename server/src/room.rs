use std::collections::HashMap;
use std::time::{Duration, Instant};

use system::{ConnectionId, Stroke, UserIdentity};

/// A single collaboration session: append-only stroke history, membership in
/// join order, and the activity clock feeding idle eviction. Rooms hold only
/// connection ids, never sockets.
pub struct Room {
    members: Vec<ConnectionId>,
    users: HashMap<ConnectionId, UserIdentity>,
    strokes: Vec<Stroke>,
    last_seen: HashMap<ConnectionId, Instant>,
    emptied_at: Option<Instant>,
}

impl Room {
    pub fn new(now: Instant) -> Self {
        Self {
            members: Vec::new(),
            users: HashMap::new(),
            strokes: Vec::new(),
            last_seen: HashMap::new(),
            emptied_at: Some(now),
        }
    }

    /// Idempotent: a repeated join rebinds the identity without duplicating
    /// membership.
    pub fn join(&mut self, connection_id: ConnectionId, user: UserIdentity, now: Instant) {
        if !self.members.contains(&connection_id) {
            self.members.push(connection_id);
        }
        self.users.insert(connection_id, user);
        self.last_seen.insert(connection_id, now);
        self.emptied_at = None;
    }

    /// No-op for non-members.
    pub fn leave(&mut self, connection_id: ConnectionId, now: Instant) {
        self.members.retain(|m| *m != connection_id);
        self.users.remove(&connection_id);
        self.last_seen.remove(&connection_id);
        if self.members.is_empty() {
            self.emptied_at = Some(now);
        }
    }

    pub fn touch(&mut self, connection_id: ConnectionId, now: Instant) {
        if let Some(seen) = self.last_seen.get_mut(&connection_id) {
            *seen = now;
        }
    }

    pub fn append_stroke(&mut self, stroke: Stroke) {
        self.strokes.push(stroke);
    }

    /// Truncates history; strokes drawn before a clear are gone for every
    /// later joiner.
    pub fn clear(&mut self) {
        self.strokes.clear();
    }

    pub fn history_snapshot(&self) -> Vec<Stroke> {
        self.strokes.clone()
    }

    pub fn members(&self) -> &[ConnectionId] {
        &self.members
    }

    /// Identities in join order.
    pub fn presence(&self) -> Vec<UserIdentity> {
        self.members
            .iter()
            .filter_map(|id| self.users.get(id).cloned())
            .collect()
    }

    pub fn idle_members(&self, now: Instant, timeout: Duration) -> Vec<ConnectionId> {
        self.members
            .iter()
            .filter(|id| {
                self.last_seen
                    .get(id)
                    .map_or(true, |seen| now.duration_since(*seen) > timeout)
            })
            .cloned()
            .collect()
    }

    pub fn reclaimable(&self, now: Instant, ttl: Duration) -> bool {
        self.emptied_at
            .map_or(false, |at| now.duration_since(at) > ttl)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: &str) -> UserIdentity {
        UserIdentity {
            id: id.into(),
            name: id.into(),
            color: "#123".into(),
        }
    }

    fn stroke(x0: f32) -> Stroke {
        Stroke {
            x0,
            y0: 0.0,
            x1: 1.0,
            y1: 1.0,
            color: "#000".into(),
            size: 2.0,
        }
    }

    #[test]
    fn it_keeps_history_in_arrival_order() {
        let now = Instant::now();
        let mut room = Room::new(now);
        room.append_stroke(stroke(1.0));
        room.append_stroke(stroke(2.0));
        room.append_stroke(stroke(3.0));
        let xs: Vec<f32> = room.history_snapshot().iter().map(|s| s.x0).collect();
        assert_eq!(xs, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn it_empties_history_on_clear() {
        let now = Instant::now();
        let mut room = Room::new(now);
        room.append_stroke(stroke(1.0));
        room.clear();
        assert!(room.history_snapshot().is_empty());
    }

    #[test]
    fn it_joins_idempotently_and_rebinds_identity() {
        let now = Instant::now();
        let mut room = Room::new(now);
        room.join(1, user("u1"), now);
        room.join(1, user("u1b"), now);
        assert_eq!(room.members().len(), 1);
        assert_eq!(room.presence()[0].id, "u1b");
    }

    #[test]
    fn it_reports_presence_in_join_order() {
        let now = Instant::now();
        let mut room = Room::new(now);
        room.join(2, user("u2"), now);
        room.join(1, user("u1"), now);
        room.join(3, user("u3"), now);
        let presence = room.presence();
        let ids: Vec<&str> = presence.iter().map(|u| u.id.as_str()).collect();
        assert_eq!(ids, vec!["u2", "u1", "u3"]);
    }

    #[test]
    fn it_ignores_leave_of_non_member() {
        let now = Instant::now();
        let mut room = Room::new(now);
        room.join(1, user("u1"), now);
        room.leave(42, now);
        assert_eq!(room.members(), &[1]);
    }

    #[test]
    fn it_finds_idle_members_unless_touched() {
        let now = Instant::now();
        let mut room = Room::new(now);
        room.join(1, user("u1"), now);
        room.join(2, user("u2"), now);

        let later = now + Duration::from_secs(31);
        room.touch(2, later);
        assert_eq!(room.idle_members(later, Duration::from_secs(30)), vec![1]);
    }

    #[test]
    fn it_becomes_reclaimable_after_sitting_empty() {
        let now = Instant::now();
        let ttl = Duration::from_secs(300);
        let mut room = Room::new(now);
        room.join(1, user("u1"), now);
        assert!(!room.reclaimable(now + Duration::from_secs(301), ttl));

        room.leave(1, now);
        assert!(!room.reclaimable(now + Duration::from_secs(10), ttl));
        assert!(room.reclaimable(now + Duration::from_secs(301), ttl));
    }
}
