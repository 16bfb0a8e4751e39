//! This node's role and its belief about who the primary and backup are.

use tandem_core::{Address, NodeRole};

/// Outcome of a role transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoleChange {
    pub from: NodeRole,
    pub to: NodeRole,
}

impl RoleChange {
    /// Whether the node stopped being primary with this change.
    pub fn left_primary(&self) -> bool {
        self.from == NodeRole::Primary && self.to != NodeRole::Primary
    }

    pub fn entered_primary(&self) -> bool {
        self.from != NodeRole::Primary && self.to == NodeRole::Primary
    }
}

/// Role state machine: Replica, Backup, Primary.
///
/// Nothing moves a node to Primary except `promote_primary`; a Backup is
/// promoted only by the failover path.
#[derive(Debug, Clone)]
pub struct RoleController {
    here: Address,
    role: NodeRole,
    primary: Option<Address>,
    backup: Option<Address>,
}

impl RoleController {
    /// Start as a replica with beliefs taken from the initial membership.
    pub fn new(here: Address, primary: Option<Address>, backup: Option<Address>) -> Self {
        Self {
            here,
            role: NodeRole::Replica,
            primary,
            backup,
        }
    }

    pub fn role(&self) -> NodeRole {
        self.role
    }

    pub fn is_primary(&self) -> bool {
        self.role == NodeRole::Primary
    }

    pub fn primary(&self) -> Option<&Address> {
        self.primary.as_ref()
    }

    pub fn backup(&self) -> Option<&Address> {
        self.backup.as_ref()
    }

    /// Become primary. The backup becomes unknown until one is elected.
    pub fn promote_primary(&mut self) -> RoleChange {
        let from = self.role;
        self.role = NodeRole::Primary;
        self.primary = Some(self.here.clone());
        self.backup = None;
        RoleChange {
            from,
            to: self.role,
        }
    }

    pub fn promote_backup(&mut self) -> RoleChange {
        let from = self.role;
        self.role = NodeRole::Backup;
        self.backup = Some(self.here.clone());
        if self.primary.as_ref() == Some(&self.here) {
            self.primary = None;
        }
        RoleChange {
            from,
            to: self.role,
        }
    }

    /// Drop back to replica after the node stopped trusting its role.
    pub fn demote(&mut self) -> RoleChange {
        let from = self.role;
        self.role = NodeRole::Replica;
        if self.primary.as_ref() == Some(&self.here) {
            self.primary = None;
        }
        if self.backup.as_ref() == Some(&self.here) {
            self.backup = None;
        }
        RoleChange {
            from,
            to: self.role,
        }
    }

    pub fn believe_primary(&mut self, primary: Option<Address>) {
        self.primary = primary;
    }

    pub fn believe_backup(&mut self, backup: Option<Address>) {
        self.backup = backup;
    }

    /// Forget the backup if it is `address`; returns whether it was.
    pub fn forget_backup(&mut self, address: &Address) -> bool {
        if self.backup.as_ref() == Some(address) {
            self.backup = None;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn here() -> Address {
        Address::local(9000, "me")
    }

    fn other() -> Address {
        Address::local(9001, "other")
    }

    #[test]
    fn starts_as_replica() {
        let roles = RoleController::new(here(), Some(other()), None);
        assert_eq!(roles.role(), NodeRole::Replica);
        assert_eq!(roles.primary(), Some(&other()));
    }

    #[test]
    fn promote_primary_clears_backup() {
        let mut roles = RoleController::new(here(), Some(other()), Some(here()));
        let change = roles.promote_primary();
        assert!(change.entered_primary());
        assert!(roles.is_primary());
        assert_eq!(roles.primary(), Some(&here()));
        assert_eq!(roles.backup(), None);
    }

    #[test]
    fn repeated_promotion_is_not_an_entry() {
        let mut roles = RoleController::new(here(), None, None);
        roles.promote_primary();
        let change = roles.promote_primary();
        assert!(!change.entered_primary());
        assert!(!change.left_primary());
    }

    #[test]
    fn primary_to_backup_leaves_primary() {
        let mut roles = RoleController::new(here(), None, None);
        roles.promote_primary();
        let change = roles.promote_backup();
        assert!(change.left_primary());
        assert_eq!(roles.role(), NodeRole::Backup);
        assert_eq!(roles.primary(), None);
        assert_eq!(roles.backup(), Some(&here()));
    }

    #[test]
    fn demote_forgets_self() {
        let mut roles = RoleController::new(here(), None, None);
        roles.promote_primary();
        roles.believe_backup(Some(other()));
        let change = roles.demote();
        assert!(change.left_primary());
        assert_eq!(roles.role(), NodeRole::Replica);
        assert_eq!(roles.primary(), None);
        assert_eq!(roles.backup(), Some(&other()));
    }

    #[test]
    fn forget_backup_only_matches_current() {
        let mut roles = RoleController::new(here(), None, Some(other()));
        assert!(!roles.forget_backup(&here()));
        assert!(roles.forget_backup(&other()));
        assert_eq!(roles.backup(), None);
    }
}
