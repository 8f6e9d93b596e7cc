//! Admission control: pure decisions over plan-tier limits.
//!
//! Nothing here mutates state. The tier consulted for joins is the room
//! creator's plan as snapshotted at creation time — capacity is a property
//! of the room, not of the visitor.

use crate::config::PlanFeatures;

/// Whether a room with `active_count` present members can accept one more.
pub fn can_join(active_count: usize, features: PlanFeatures) -> bool {
    active_count < features.max_participants
}

/// Whether an account with `active_rooms` open rooms can open another.
pub fn can_create_room(active_rooms: usize, features: PlanFeatures) -> bool {
    active_rooms < features.max_active_rooms
}

#[cfg(test)]
mod tests {
    use super::*;

    const FREE: PlanFeatures = PlanFeatures {
        max_participants: 5,
        max_active_rooms: 1,
    };

    #[test]
    fn join_is_rejected_exactly_at_the_limit() {
        assert!(can_join(0, FREE));
        assert!(can_join(4, FREE));
        assert!(!can_join(5, FREE));
        assert!(!can_join(6, FREE));
    }

    #[test]
    fn room_creation_is_rejected_exactly_at_the_limit() {
        assert!(can_create_room(0, FREE));
        assert!(!can_create_room(1, FREE));
    }
}
