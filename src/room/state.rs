use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::timer::DestroyTimer;
use crate::error::{Result, SfuError};
use crate::user::{User, UserSnapshot};

/// Everything guarded by a room's membership lock: the ordered member set and
/// the destroy timer whose arming depends on it.
#[derive(Debug, Default)]
pub struct Membership {
    users: Vec<Arc<User>>,
    pub(crate) timer: DestroyTimer,
}

impl Membership {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_user(&mut self, user: Arc<User>) -> Result<()> {
        if self.contains(user.id()) {
            return Err(SfuError::AlreadyMember);
        }
        self.users.push(user);
        Ok(())
    }

    pub fn remove_user(&mut self, user_id: &str) -> Result<Arc<User>> {
        let index = self
            .users
            .iter()
            .position(|member| member.id() == user_id)
            .ok_or(SfuError::NotMember)?;
        Ok(self.users.remove(index))
    }

    pub fn contains(&self, user_id: &str) -> bool {
        self.users.iter().any(|member| member.id() == user_id)
    }

    pub fn users(&self) -> &[Arc<User>] {
        &self.users
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

/// Room as sent to clients in `room_joined` / `room_leaved`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomSnapshot {
    pub id: String,
    pub users: Vec<UserSnapshot>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn user() -> Arc<User> {
        let (tx, _rx) = mpsc::channel(8);
        User::new(tx)
    }

    #[test]
    fn test_membership_keeps_insertion_order() {
        let (a, b, c) = (user(), user(), user());
        let mut membership = Membership::new();

        membership.add_user(Arc::clone(&a)).unwrap();
        membership.add_user(Arc::clone(&b)).unwrap();
        membership.add_user(Arc::clone(&c)).unwrap();
        membership.remove_user(b.id()).unwrap();

        let ids: Vec<&str> = membership.users().iter().map(|u| u.id()).collect();
        assert_eq!(ids, vec![a.id(), c.id()]);
    }

    #[test]
    fn test_duplicate_add_is_rejected() {
        let a = user();
        let mut membership = Membership::new();

        membership.add_user(Arc::clone(&a)).unwrap();
        let err = membership.add_user(Arc::clone(&a)).unwrap_err();

        assert!(matches!(err, SfuError::AlreadyMember));
        assert_eq!(membership.len(), 1);
    }

    #[test]
    fn test_absent_remove_is_rejected() {
        let (a, b) = (user(), user());
        let mut membership = Membership::new();
        membership.add_user(Arc::clone(&a)).unwrap();

        let err = membership.remove_user(b.id()).unwrap_err();

        assert!(matches!(err, SfuError::NotMember));
        assert!(membership.contains(a.id()));
        assert_eq!(membership.len(), 1);
    }
}
