//! Decides which relays may take part in an auction.

use {
    alloy::primitives::Address,
    std::{collections::HashSet, sync::Arc},
};

/// Registration status of relays on the settlement layer.
#[mockall::automock]
pub trait SettlementRegistry: Send + Sync {
    fn is_registered(&self, address: Address) -> bool;
}

/// Registry that considers every relay registered.
///
/// Stands in until the settlement layer exposes its registry, eligibility is
/// then decided by the allow-list alone.
pub struct AlwaysRegistered;

impl SettlementRegistry for AlwaysRegistered {
    fn is_registered(&self, _: Address) -> bool {
        true
    }
}

pub struct EligibilityPolicy {
    allow_list: HashSet<Address>,
    registry: Arc<dyn SettlementRegistry>,
}

impl EligibilityPolicy {
    pub fn new(
        allow_list: impl IntoIterator<Item = Address>,
        registry: Arc<dyn SettlementRegistry>,
    ) -> Self {
        Self {
            allow_list: allow_list.into_iter().collect(),
            registry,
        }
    }

    /// A relay is eligible if it is allow-listed and registered on the
    /// settlement layer. The registry is only queried for allow-listed
    /// relays.
    pub fn is_eligible(&self, address: Address) -> bool {
        self.allow_list.contains(&address) && self.registry.is_registered(address)
    }
}

#[cfg(test)]
mod tests {
    use {super::*, mockall::predicate::eq, testlib::bidders};

    #[test]
    fn requires_allow_list_membership() {
        let policy = EligibilityPolicy::new([bidders::ALICE], Arc::new(AlwaysRegistered));
        assert!(policy.is_eligible(bidders::ALICE));
        assert!(!policy.is_eligible(bidders::bob().address()));
    }

    #[test]
    fn requires_registration() {
        let bob = bidders::bob().address();
        let mut registry = MockSettlementRegistry::new();
        registry
            .expect_is_registered()
            .with(eq(bidders::ALICE))
            .return_const(true);
        registry
            .expect_is_registered()
            .with(eq(bob))
            .return_const(false);

        let policy = EligibilityPolicy::new([bidders::ALICE, bob], Arc::new(registry));
        assert!(policy.is_eligible(bidders::ALICE));
        assert!(!policy.is_eligible(bob));
    }

    #[test]
    fn skips_registry_for_unlisted_relays() {
        let mut registry = MockSettlementRegistry::new();
        registry.expect_is_registered().never();

        let policy = EligibilityPolicy::new([], Arc::new(registry));
        assert!(!policy.is_eligible(bidders::ALICE));
    }
}
