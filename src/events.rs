//! Domain events and the in-process bus they are published on.
//!
//! Publication is fire-and-forget: events are sent after the change they
//! describe has been committed, and are dropped when nobody is subscribed.
use chrono::{DateTime, Utc};
use tokio::sync::broadcast;

use crate::money::Money;
use crate::types::{CourseId, Role, TimesheetId, UserId};
use crate::workflow::{ApprovalAction, ApprovalStatus};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomainEvent {
    TimesheetCreated {
        timesheet_id: TimesheetId,
        tutor_id: UserId,
        course_id: CourseId,
        created_by: UserId,
        amount: Money,
    },
    TimesheetUpdated {
        timesheet_id: TimesheetId,
        updated_by: UserId,
        amount: Money,
        recalculated: bool,
    },
    TimesheetDeleted {
        timesheet_id: TimesheetId,
        deleted_by: UserId,
    },
    ApprovalProcessed {
        timesheet_id: TimesheetId,
        actor_id: UserId,
        action: ApprovalAction,
        previous_status: ApprovalStatus,
        new_status: ApprovalStatus,
        comment: Option<String>,
    },
    CourseCreated {
        course_id: CourseId,
        code: String,
        lecturer_id: UserId,
    },
    UserRegistered {
        user_id: UserId,
        role: Role,
    },
}

impl DomainEvent {
    /// Dot separated name, used for logging and routing.
    pub fn name(&self) -> &'static str {
        match self {
            DomainEvent::TimesheetCreated { .. } => "timesheet.created",
            DomainEvent::TimesheetUpdated { .. } => "timesheet.updated",
            DomainEvent::TimesheetDeleted { .. } => "timesheet.deleted",
            DomainEvent::ApprovalProcessed { .. } => "timesheet.approval_processed",
            DomainEvent::CourseCreated { .. } => "course.created",
            DomainEvent::UserRegistered { .. } => "user.registered",
        }
    }
}

#[derive(Debug, Clone)]
pub struct EventEnvelope {
    pub occurred_at: DateTime<Utc>,
    pub event: DomainEvent,
}

/// Fan-out bus over a `tokio::sync::broadcast` channel.
///
/// When the buffer is full the oldest unread events are dropped and slow
/// receivers observe `Lagged`.
pub struct EventBus {
    sender: broadcast::Sender<EventEnvelope>,
}

impl EventBus {
    /// `capacity` is raised to 1 when zero, which the channel refuses.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn publish(&self, event: DomainEvent) {
        tracing::debug!(event = event.name(), "publishing domain event");
        // a send error only means there are no receivers
        let _ = self.sender.send(EventEnvelope {
            occurred_at: Utc::now(),
            event,
        });
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscribers_receive_published_events() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();

        bus.publish(DomainEvent::TimesheetDeleted {
            timesheet_id: TimesheetId::from("tsht_a"),
            deleted_by: UserId::from("user_a"),
        });

        let received = rx.try_recv().unwrap();
        assert_eq!(received.event.name(), "timesheet.deleted");
    }

    #[test]
    fn publish_with_no_subscribers_does_not_panic() {
        let bus = EventBus::new(4);
        bus.publish(DomainEvent::UserRegistered {
            user_id: UserId::from("user_a"),
            role: Role::Tutor,
        });
    }

    #[test]
    fn zero_capacity_still_delivers() {
        let bus = EventBus::new(0);
        let mut rx = bus.subscribe();
        bus.publish(DomainEvent::UserRegistered {
            user_id: UserId::from("user_a"),
            role: Role::Hr,
        });
        assert_eq!(rx.try_recv().unwrap().event.name(), "user.registered");
    }
}
