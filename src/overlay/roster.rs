use crate::overlay::model::UserId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    pub id: UserId,
    pub is_gm: bool,
    pub active: bool,
    /// Host capability to create drawings; gates player edits.
    #[serde(default)]
    pub can_create_drawing: bool,
}

impl UserInfo {
    pub fn gm(id: impl Into<String>) -> Self {
        Self {
            id: UserId::new(id),
            is_gm: true,
            active: true,
            can_create_drawing: true,
        }
    }

    pub fn player(id: impl Into<String>, can_create_drawing: bool) -> Self {
        Self {
            id: UserId::new(id),
            is_gm: false,
            active: true,
            can_create_drawing,
        }
    }

    pub fn is_active_gm(&self) -> bool {
        self.active && self.is_gm
    }
}

/// Connected users as seen by this client.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Roster {
    users: BTreeMap<UserId, UserInfo>,
}

pub type SharedRoster = Arc<RwLock<Roster>>;

impl Roster {
    pub fn new(users: impl IntoIterator<Item = UserInfo>) -> Self {
        Self {
            users: users.into_iter().map(|user| (user.id.clone(), user)).collect(),
        }
    }

    pub fn shared(self) -> SharedRoster {
        Arc::new(RwLock::new(self))
    }

    pub fn upsert(&mut self, user: UserInfo) {
        self.users.insert(user.id.clone(), user);
    }

    pub fn set_active(&mut self, id: &UserId, active: bool) -> bool {
        match self.users.get_mut(id) {
            Some(user) => {
                user.active = active;
                true
            }
            None => false,
        }
    }

    pub fn get(&self, id: &UserId) -> Option<&UserInfo> {
        self.users.get(id)
    }

    pub fn active_gms(&self) -> impl Iterator<Item = &UserInfo> {
        self.users.values().filter(|user| user.is_active_gm())
    }

    pub fn any_active_gm(&self) -> bool {
        self.active_gms().next().is_some()
    }

    /// Lowest identifier among connected GMs.
    pub fn responsible_authority(&self) -> Option<&UserId> {
        self.active_gms().map(|user| &user.id).min()
    }

    /// True only for the one active GM no other active GM sorts before.
    pub fn is_responsible(&self, id: &UserId) -> bool {
        let Some(user) = self.users.get(id) else {
            return false;
        };
        if !user.is_active_gm() {
            return false;
        }
        !self.active_gms().any(|other| other.id < *id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exactly_one_gm_is_responsible() {
        let roster = Roster::new([
            UserInfo::gm("gm-c"),
            UserInfo::gm("gm-a"),
            UserInfo::gm("gm-b"),
            UserInfo::player("p-0", true),
        ]);
        let responsible: Vec<_> = ["gm-a", "gm-b", "gm-c", "p-0"]
            .into_iter()
            .map(UserId::new)
            .filter(|id| roster.is_responsible(id))
            .collect();
        assert_eq!(responsible, vec![UserId::new("gm-a")]);
        assert_eq!(roster.responsible_authority(), Some(&UserId::new("gm-a")));
    }

    #[test]
    fn inactive_gm_hands_over_responsibility() {
        let mut roster = Roster::new([UserInfo::gm("gm-a"), UserInfo::gm("gm-b")]);
        assert!(roster.set_active(&UserId::new("gm-a"), false));
        assert!(roster.is_responsible(&UserId::new("gm-b")));
        assert!(!roster.is_responsible(&UserId::new("gm-a")));
    }

    #[test]
    fn no_authority_without_active_gm() {
        let mut gm = UserInfo::gm("gm-a");
        gm.active = false;
        let mut roster = Roster::new([gm, UserInfo::player("p", true)]);
        assert!(!roster.any_active_gm());
        assert_eq!(roster.responsible_authority(), None);
        assert!(!roster.set_active(&UserId::new("missing"), true));
    }
}
