//! The broker administration contract the engine drives, and an in-memory broker for tests and
//! embedding.
//!
//! Implementations must make `delete_user` succeed for a user that does not exist, so revocation
//! can be retried after a partial failure.

use std::{
    collections::{BTreeMap, HashMap, HashSet},
    sync::Mutex,
};

use crate::errors::RvError;

pub trait BrokerAdmin: Send + Sync {
    fn create_user(&self, username: &str, password: &str, tags: &str) -> Result<(), RvError>;
    fn delete_user(&self, username: &str) -> Result<(), RvError>;
    fn set_permissions(
        &self,
        username: &str,
        vhost: &str,
        configure: &str,
        write: &str,
        read: &str,
    ) -> Result<(), RvError>;
    fn set_topic_permissions(
        &self,
        username: &str,
        vhost: &str,
        exchange: &str,
        write: &str,
        read: &str,
    ) -> Result<(), RvError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BrokerCall {
    CreateUser,
    DeleteUser,
    SetPermissions,
    SetTopicPermissions,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MockUser {
    pub password: String,
    pub tags: String,
    /// vhost -> (configure, write, read)
    pub permissions: BTreeMap<String, (String, String, String)>,
    /// (vhost, exchange) -> (write, read)
    pub topic_permissions: BTreeMap<(String, String), (String, String)>,
}

#[derive(Debug, Default)]
struct MockState {
    users: BTreeMap<String, MockUser>,
    calls: HashMap<BrokerCall, usize>,
    deleted: Vec<String>,
    failing_calls: HashSet<BrokerCall>,
    failing_users: HashSet<String>,
    unavailable: bool,
}

/// An in-memory broker with failure injection.
#[derive(Debug, Default)]
pub struct MockBroker {
    state: Mutex<MockState>,
}

impl MockBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call fails with `ErrBrokerUnavailable` while set.
    pub fn set_unavailable(&self, unavailable: bool) -> Result<(), RvError> {
        self.state.lock()?.unavailable = unavailable;
        Ok(())
    }

    pub fn fail_call(&self, call: BrokerCall, fail: bool) -> Result<(), RvError> {
        let mut state = self.state.lock()?;
        if fail {
            state.failing_calls.insert(call);
        } else {
            state.failing_calls.remove(&call);
        }
        Ok(())
    }

    /// Every call touching `username` fails while set.
    pub fn fail_user(&self, username: &str, fail: bool) -> Result<(), RvError> {
        let mut state = self.state.lock()?;
        if fail {
            state.failing_users.insert(username.to_string());
        } else {
            state.failing_users.remove(username);
        }
        Ok(())
    }

    pub fn user(&self, username: &str) -> Result<Option<MockUser>, RvError> {
        Ok(self.state.lock()?.users.get(username).cloned())
    }

    pub fn usernames(&self) -> Result<Vec<String>, RvError> {
        Ok(self.state.lock()?.users.keys().cloned().collect())
    }

    pub fn call_count(&self, call: BrokerCall) -> Result<usize, RvError> {
        Ok(self.state.lock()?.calls.get(&call).copied().unwrap_or(0))
    }

    /// Users actually removed by `delete_user`, in order.
    pub fn deleted_users(&self) -> Result<Vec<String>, RvError> {
        Ok(self.state.lock()?.deleted.clone())
    }

    fn call<T>(
        &self,
        call: BrokerCall,
        username: &str,
        f: impl FnOnce(&mut MockState) -> Result<T, RvError>,
    ) -> Result<T, RvError> {
        let mut state = self.state.lock()?;
        *state.calls.entry(call).or_insert(0) += 1;

        if state.unavailable || state.failing_calls.contains(&call) || state.failing_users.contains(username) {
            return Err(RvError::ErrBrokerUnavailable(format!("injected failure on {call:?} for {username}")));
        }

        f(&mut state)
    }
}

impl BrokerAdmin for MockBroker {
    fn create_user(&self, username: &str, password: &str, tags: &str) -> Result<(), RvError> {
        self.call(BrokerCall::CreateUser, username, |state| {
            let user = state.users.entry(username.to_string()).or_default();
            user.password = password.to_string();
            user.tags = tags.to_string();
            Ok(())
        })
    }

    fn delete_user(&self, username: &str) -> Result<(), RvError> {
        self.call(BrokerCall::DeleteUser, username, |state| {
            if state.users.remove(username).is_some() {
                state.deleted.push(username.to_string());
            }
            Ok(())
        })
    }

    fn set_permissions(
        &self,
        username: &str,
        vhost: &str,
        configure: &str,
        write: &str,
        read: &str,
    ) -> Result<(), RvError> {
        self.call(BrokerCall::SetPermissions, username, |state| {
            let user = state
                .users
                .get_mut(username)
                .ok_or_else(|| RvError::ErrBrokerRejected { status: 404, message: format!("no such user {username}") })?;
            user.permissions.insert(vhost.to_string(), (configure.to_string(), write.to_string(), read.to_string()));
            Ok(())
        })
    }

    fn set_topic_permissions(
        &self,
        username: &str,
        vhost: &str,
        exchange: &str,
        write: &str,
        read: &str,
    ) -> Result<(), RvError> {
        self.call(BrokerCall::SetTopicPermissions, username, |state| {
            let user = state
                .users
                .get_mut(username)
                .ok_or_else(|| RvError::ErrBrokerRejected { status: 404, message: format!("no such user {username}") })?;
            user.topic_permissions
                .insert((vhost.to_string(), exchange.to_string()), (write.to_string(), read.to_string()));
            Ok(())
        })
    }
}
