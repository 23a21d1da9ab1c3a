use std::time::{Duration, Instant};

use uuid::Uuid;

use crate::UserId;

/// Identity and deadline of the caller on whose behalf an operation runs.
///
/// Every orchestration call takes a `CallerContext` explicitly. The caller's
/// user ID travels with it to downstream services, and every outbound call
/// must finish before `deadline`.
#[derive(Debug, Clone)]
pub struct CallerContext {
    user_id: UserId,
    request_id: Uuid,
    deadline: Instant,
}

impl CallerContext {
    /// Creates a context for `user_id` that expires `timeout` from now.
    pub fn new(user_id: UserId, timeout: Duration) -> Self {
        Self {
            user_id,
            request_id: Uuid::new_v4(),
            deadline: Instant::now() + timeout,
        }
    }

    /// Creates a context with an explicit absolute deadline.
    pub fn with_deadline(user_id: UserId, deadline: Instant) -> Self {
        Self {
            user_id,
            request_id: Uuid::new_v4(),
            deadline,
        }
    }

    /// Replaces the generated request ID, e.g. with one taken from an inbound header.
    pub fn with_request_id(mut self, request_id: Uuid) -> Self {
        self.request_id = request_id;
        self
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Returns the time left before the deadline, zero if it already passed.
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    /// Returns the deadline for a single outbound call: the earlier of the
    /// context deadline and `now + per_call`.
    pub fn call_deadline(&self, per_call: Duration) -> Instant {
        self.deadline.min(Instant::now() + per_call)
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.deadline
    }
}
