use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum AssignmentStatus {
    Waiting,
    Accepted,
    Rejected,
    Expired,
}

impl AssignmentStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, AssignmentStatus::Waiting)
    }

    pub fn excludes_courier(self) -> bool {
        matches!(self, AssignmentStatus::Rejected | AssignmentStatus::Expired)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AssignmentStatus::Waiting => "waiting",
            AssignmentStatus::Accepted => "accepted",
            AssignmentStatus::Rejected => "rejected",
            AssignmentStatus::Expired => "expired",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assignment {
    pub id: Uuid,
    pub order_id: Uuid,
    pub courier_id: Uuid,
    pub assigned_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub status: AssignmentStatus,
}

impl Assignment {
    pub fn new(order_id: Uuid, courier_id: Uuid, timeout: chrono::Duration) -> Self {
        let assigned_at = Utc::now();
        Self {
            id: Uuid::new_v4(),
            order_id,
            courier_id,
            assigned_at,
            expires_at: assigned_at + timeout,
            status: AssignmentStatus::Waiting,
        }
    }

    pub fn is_past_due(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_waiting_is_non_terminal() {
        assert!(!AssignmentStatus::Waiting.is_terminal());
        assert!(AssignmentStatus::Accepted.is_terminal());
        assert!(AssignmentStatus::Rejected.is_terminal());
        assert!(AssignmentStatus::Expired.is_terminal());
    }

    #[test]
    fn accepted_does_not_exclude_courier() {
        assert!(!AssignmentStatus::Accepted.excludes_courier());
        assert!(!AssignmentStatus::Waiting.excludes_courier());
        assert!(AssignmentStatus::Rejected.excludes_courier());
        assert!(AssignmentStatus::Expired.excludes_courier());
    }

    #[test]
    fn new_assignment_expires_after_timeout() {
        let assignment = Assignment::new(Uuid::new_v4(), Uuid::new_v4(), chrono::Duration::seconds(60));
        assert_eq!(assignment.status, AssignmentStatus::Waiting);
        assert_eq!(assignment.expires_at - assignment.assigned_at, chrono::Duration::seconds(60));
        assert!(!assignment.is_past_due(assignment.assigned_at));
        assert!(assignment.is_past_due(assignment.expires_at));
    }
}
