//! # Fixture Collectible
//!
//! A minimal non-fungible registry with a public faucet: each call to
//! [`CollectibleRegistry::claim_free_nifty`] mints the next sequential id
//! (starting at 0) to the caller. Used as loan collateral on the
//! development network and in tests.
//!
//! Approval follows the usual two-level model. An owner can approve one
//! address per item, and can appoint operators who may move any of its
//! items. A transfer clears the item's single approval.
//!
//! Like the fixture currency, the journal records each overwritten entry
//! while a checkpoint is open and replays them backwards on rollback.

use pawnda_protocol::identity::Address;
use std::collections::{BTreeMap, HashMap, HashSet};

use crate::assets::{Journaled, NonFungibleCollateral};
use crate::error::TransferError;

#[derive(Debug, Clone, Default)]
struct Registry {
    owners: BTreeMap<u128, Address>,
    item_approvals: HashMap<u128, Address>,
    operators: HashSet<(Address, Address)>,
    next_id: u128,
}

/// A value overwritten since the open checkpoint.
#[derive(Debug, Clone)]
enum Undo {
    Owner(u128, Option<Address>),
    Approval(u128, Option<Address>),
    Operator((Address, Address), bool),
    NextId(u128),
}

/// A faucet-backed collectible contract.
#[derive(Debug, Clone)]
pub struct CollectibleRegistry {
    address: Address,
    name: String,
    state: Registry,
    journal: Option<Vec<Undo>>,
}

impl CollectibleRegistry {
    /// Deploys an empty registry at `address`.
    pub fn new(address: Address, name: impl Into<String>) -> Self {
        Self {
            address,
            name: name.into(),
            state: Registry::default(),
            journal: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Mints the next id to `to` and returns it.
    pub fn claim_free_nifty(&mut self, to: &Address) -> Result<u128, TransferError> {
        let item_id = self.state.next_id;
        let next_id = item_id.checked_add(1).ok_or(TransferError::Overflow {
            asset: self.address,
        })?;
        self.state.next_id = next_id;
        self.record(Undo::NextId(item_id));
        self.set_owner(item_id, *to);

        tracing::debug!(registry = %self.address, to = %to, item_id, "faucet mint");
        Ok(item_id)
    }

    /// Number of items minted so far.
    pub fn total_minted(&self) -> u128 {
        self.state.next_id
    }

    /// Every item `owner` currently holds, in id order.
    pub fn items_of(&self, owner: &Address) -> Vec<u128> {
        self.state
            .owners
            .iter()
            .filter(|(_, holder)| *holder == owner)
            .map(|(id, _)| *id)
            .collect()
    }

    pub fn get_approved(&self, item_id: u128) -> Option<Address> {
        self.state.item_approvals.get(&item_id).copied()
    }

    pub fn is_approved_for_all(&self, owner: &Address, operator: &Address) -> bool {
        self.state.operators.contains(&(*owner, *operator))
    }

    fn record(&mut self, undo: Undo) {
        if let Some(journal) = self.journal.as_mut() {
            journal.push(undo);
        }
    }

    fn set_owner(&mut self, item_id: u128, owner: Address) {
        let previous = self.state.owners.insert(item_id, owner);
        self.record(Undo::Owner(item_id, previous));
    }

    fn set_item_approval(&mut self, item_id: u128, approved: Option<Address>) {
        let previous = match approved {
            Some(approved) => self.state.item_approvals.insert(item_id, approved),
            None => self.state.item_approvals.remove(&item_id),
        };
        self.record(Undo::Approval(item_id, previous));
    }

    fn set_operator(&mut self, pair: (Address, Address), approved: bool) {
        let was = if approved {
            !self.state.operators.insert(pair)
        } else {
            self.state.operators.remove(&pair)
        };
        self.record(Undo::Operator(pair, was));
    }

    fn existing_owner(&self, item_id: u128) -> Result<Address, TransferError> {
        self.owner_of(item_id).ok_or(TransferError::UnknownItem {
            asset: self.address,
            item_id,
        })
    }

    fn may_move(&self, operator: &Address, owner: &Address, item_id: u128) -> bool {
        operator == owner
            || self.get_approved(item_id).as_ref() == Some(operator)
            || self.is_approved_for_all(owner, operator)
    }
}

impl Journaled for CollectibleRegistry {
    fn checkpoint(&mut self) {
        self.journal = Some(Vec::new());
    }

    fn commit(&mut self) {
        self.journal = None;
    }

    fn rollback(&mut self) {
        let Some(journal) = self.journal.take() else {
            return;
        };
        for undo in journal.into_iter().rev() {
            match undo {
                Undo::Owner(item_id, Some(owner)) => {
                    self.state.owners.insert(item_id, owner);
                }
                Undo::Owner(item_id, None) => {
                    self.state.owners.remove(&item_id);
                }
                Undo::Approval(item_id, Some(approved)) => {
                    self.state.item_approvals.insert(item_id, approved);
                }
                Undo::Approval(item_id, None) => {
                    self.state.item_approvals.remove(&item_id);
                }
                Undo::Operator(pair, true) => {
                    self.state.operators.insert(pair);
                }
                Undo::Operator(pair, false) => {
                    self.state.operators.remove(&pair);
                }
                Undo::NextId(next_id) => self.state.next_id = next_id,
            }
        }
    }
}

impl NonFungibleCollateral for CollectibleRegistry {
    fn address(&self) -> Address {
        self.address
    }

    fn owner_of(&self, item_id: u128) -> Option<Address> {
        self.state.owners.get(&item_id).copied()
    }

    fn approve(
        &mut self,
        caller: &Address,
        approved: &Address,
        item_id: u128,
    ) -> Result<(), TransferError> {
        let owner = self.existing_owner(item_id)?;
        if *caller != owner && !self.is_approved_for_all(&owner, caller) {
            return Err(TransferError::NotApproved {
                asset: self.address,
                item_id,
                operator: *caller,
            });
        }

        let approved = (!approved.is_zero()).then_some(*approved);
        self.set_item_approval(item_id, approved);
        Ok(())
    }

    fn set_approval_for_all(&mut self, owner: &Address, operator: &Address, approved: bool) {
        self.set_operator((*owner, *operator), approved);
    }

    fn check_transfer_from(
        &self,
        operator: &Address,
        from: &Address,
        _to: &Address,
        item_id: u128,
    ) -> Result<(), TransferError> {
        let owner = self.existing_owner(item_id)?;
        if owner != *from {
            return Err(TransferError::NotOwner {
                asset: self.address,
                item_id,
                claimed: *from,
            });
        }
        if !self.may_move(operator, &owner, item_id) {
            return Err(TransferError::NotApproved {
                asset: self.address,
                item_id,
                operator: *operator,
            });
        }
        Ok(())
    }

    fn transfer_from(
        &mut self,
        operator: &Address,
        from: &Address,
        to: &Address,
        item_id: u128,
    ) -> Result<(), TransferError> {
        self.check_transfer_from(operator, from, to, item_id)?;
        self.set_item_approval(item_id, None);
        self.set_owner(item_id, *to);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> CollectibleRegistry {
        CollectibleRegistry::new(Address::from_label("nifties"), "Dummy Nifties")
    }

    fn alice() -> Address {
        Address::from_label("alice")
    }

    fn bob() -> Address {
        Address::from_label("bob")
    }

    fn operator() -> Address {
        Address::from_label("operator")
    }

    #[test]
    fn faucet_mints_sequential_ids() {
        let mut r = registry();
        assert_eq!(r.claim_free_nifty(&alice()).unwrap(), 0);
        assert_eq!(r.claim_free_nifty(&bob()).unwrap(), 1);
        assert_eq!(r.claim_free_nifty(&alice()).unwrap(), 2);
        assert_eq!(r.items_of(&alice()), vec![0, 2]);
        assert_eq!(r.owner_of(1), Some(bob()));
        assert_eq!(r.total_minted(), 3);
    }

    #[test]
    fn unknown_item_rejected() {
        let r = registry();
        assert!(matches!(
            r.check_transfer_from(&alice(), &alice(), &bob(), 9),
            Err(TransferError::UnknownItem { item_id: 9, .. })
        ));
    }

    #[test]
    fn owner_moves_own_item() {
        let mut r = registry();
        let id = r.claim_free_nifty(&alice()).unwrap();
        r.transfer_from(&alice(), &alice(), &bob(), id).unwrap();
        assert_eq!(r.owner_of(id), Some(bob()));
    }

    #[test]
    fn wrong_from_is_not_owner() {
        let mut r = registry();
        let id = r.claim_free_nifty(&alice()).unwrap();
        assert!(matches!(
            r.transfer_from(&bob(), &bob(), &operator(), id),
            Err(TransferError::NotOwner { .. })
        ));
    }

    #[test]
    fn item_approval_allows_one_transfer() {
        let mut r = registry();
        let id = r.claim_free_nifty(&alice()).unwrap();

        assert!(matches!(
            r.transfer_from(&operator(), &alice(), &operator(), id),
            Err(TransferError::NotApproved { .. })
        ));

        r.approve(&alice(), &operator(), id).unwrap();
        assert_eq!(r.get_approved(id), Some(operator()));
        r.transfer_from(&operator(), &alice(), &operator(), id).unwrap();

        assert_eq!(r.owner_of(id), Some(operator()));
        assert_eq!(r.get_approved(id), None);
    }

    #[test]
    fn only_owner_or_operator_may_approve() {
        let mut r = registry();
        let id = r.claim_free_nifty(&alice()).unwrap();
        assert!(r.approve(&bob(), &bob(), id).is_err());

        r.set_approval_for_all(&alice(), &operator(), true);
        r.approve(&operator(), &bob(), id).unwrap();
        assert_eq!(r.get_approved(id), Some(bob()));
    }

    #[test]
    fn operator_approval_covers_all_items() {
        let mut r = registry();
        let a = r.claim_free_nifty(&alice()).unwrap();
        let b = r.claim_free_nifty(&alice()).unwrap();
        r.set_approval_for_all(&alice(), &operator(), true);

        r.transfer_from(&operator(), &alice(), &bob(), a).unwrap();
        r.transfer_from(&operator(), &alice(), &bob(), b).unwrap();
        assert_eq!(r.items_of(&bob()), vec![a, b]);

        r.set_approval_for_all(&alice(), &operator(), false);
        assert!(!r.is_approved_for_all(&alice(), &operator()));
    }

    #[test]
    fn rollback_restores_ownership_and_approvals() {
        let mut r = registry();
        let id = r.claim_free_nifty(&alice()).unwrap();
        r.approve(&alice(), &operator(), id).unwrap();

        r.checkpoint();
        r.transfer_from(&operator(), &alice(), &bob(), id).unwrap();
        r.rollback();

        assert_eq!(r.owner_of(id), Some(alice()));
        assert_eq!(r.get_approved(id), Some(operator()));
    }

    #[test]
    fn rollback_undoes_mints_and_operator_changes() {
        let mut r = registry();
        for _ in 0..500 {
            r.claim_free_nifty(&bob()).unwrap();
        }
        r.set_approval_for_all(&bob(), &operator(), true);

        r.checkpoint();
        let id = r.claim_free_nifty(&alice()).unwrap();
        r.set_approval_for_all(&bob(), &operator(), false);
        r.set_approval_for_all(&alice(), &operator(), true);
        assert_eq!(r.journal.as_ref().map(Vec::len), Some(4));
        r.rollback();

        assert_eq!(r.owner_of(id), None);
        assert_eq!(r.total_minted(), 500);
        assert!(r.is_approved_for_all(&bob(), &operator()));
        assert!(!r.is_approved_for_all(&alice(), &operator()));
    }
}
