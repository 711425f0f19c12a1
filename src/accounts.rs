use std::collections::HashSet;

/// Account status as seen by the user service. The ledger only needs to know
/// whether an owner may still move money.
pub trait AccountLookup: Send + Sync {
    fn is_enabled(&self, owner_id: &str) -> bool;
}

// owners blocked through configuration, everyone else is enabled
#[derive(Debug, Default, Clone)]
pub struct DisabledOwners {
    owners: HashSet<String>,
}

impl DisabledOwners {
    pub fn new(owners: impl IntoIterator<Item = String>) -> Self {
        Self {
            owners: owners.into_iter().collect(),
        }
    }
}

impl AccountLookup for DisabledOwners {
    fn is_enabled(&self, owner_id: &str) -> bool {
        !self.owners.contains(owner_id)
    }
}
