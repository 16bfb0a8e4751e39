//! Locally cached copy of the tracker's node list.

use tandem_core::Address;

/// Ordered node list. Index 0 is the primary, index 1 the backup.
///
/// Replaced wholesale on refresh; the only in-place mutation is `remove`,
/// which callers follow with `Tracker::update_list`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MembershipView {
    nodes: Vec<Address>,
}

impl MembershipView {
    pub fn new(nodes: Vec<Address>) -> Self {
        let mut view = Self::default();
        view.replace(nodes);
        view
    }

    /// Replace the whole list, dropping repeated addresses after their first
    /// occurrence.
    pub fn replace(&mut self, nodes: Vec<Address>) {
        let mut unique: Vec<Address> = Vec::with_capacity(nodes.len());
        for node in nodes {
            if !unique.contains(&node) {
                unique.push(node);
            }
        }
        self.nodes = unique;
    }

    pub fn primary(&self) -> Option<&Address> {
        self.nodes.first()
    }

    pub fn backup(&self) -> Option<&Address> {
        self.nodes.get(1)
    }

    /// Remove `address`; returns whether it was listed.
    pub fn remove(&mut self, address: &Address) -> bool {
        let before = self.nodes.len();
        self.nodes.retain(|node| node != address);
        self.nodes.len() != before
    }

    pub fn contains(&self, address: &Address) -> bool {
        self.nodes.contains(address)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Address> {
        self.nodes.iter()
    }

    pub fn to_vec(&self) -> Vec<Address> {
        self.nodes.clone()
    }
}
