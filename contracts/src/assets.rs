//! # Asset Capabilities
//!
//! The ledger never owns balances or collectibles itself. It drives external
//! asset contracts through two narrow capabilities:
//!
//! - [`FungibleCurrency`]: balances, allowances, `transfer_from`.
//! - [`NonFungibleCollateral`]: item ownership, per-item and operator
//!   approval, `transfer_from`.
//!
//! Both extend [`Journaled`], the host's transaction boundary: the escrow
//! checkpoints every contract a batch touches, and either commits them all
//! or rolls them all back.
//!
//! Hosts that need to keep talking to an asset after handing it to the
//! escrow (faucets, balance queries) register an `Arc<Mutex<T>>`; the
//! blanket impls at the bottom forward through the lock.

use parking_lot::Mutex;
use pawnda_protocol::identity::Address;
use std::sync::Arc;

use crate::error::TransferError;

/// Participates in an all-or-nothing batch.
pub trait Journaled {
    /// Remember the current state.
    fn checkpoint(&mut self);

    /// Forget the checkpoint, keeping every change since.
    fn commit(&mut self);

    /// Restore the checkpointed state.
    fn rollback(&mut self);
}

/// A fungible currency contract.
pub trait FungibleCurrency: Journaled + Send + Sync {
    fn address(&self) -> Address;

    fn balance_of(&self, owner: &Address) -> u128;

    fn allowance(&self, owner: &Address, spender: &Address) -> u128;

    /// Lets `spender` move up to `amount` of `owner`'s balance. Replaces any
    /// previous allowance.
    fn approve(&mut self, owner: &Address, spender: &Address, amount: u128);

    /// Would [`transfer_from`](Self::transfer_from) succeed right now?
    /// Never mutates.
    fn check_transfer_from(
        &self,
        spender: &Address,
        from: &Address,
        to: &Address,
        amount: u128,
    ) -> Result<(), TransferError>;

    /// Moves `amount` from `from` to `to` on `spender`'s authority,
    /// consuming allowance unless `spender == from`.
    fn transfer_from(
        &mut self,
        spender: &Address,
        from: &Address,
        to: &Address,
        amount: u128,
    ) -> Result<(), TransferError>;
}

/// A non-fungible collectible contract.
pub trait NonFungibleCollateral: Journaled + Send + Sync {
    fn address(&self) -> Address;

    fn owner_of(&self, item_id: u128) -> Option<Address>;

    /// Approves `approved` to move a single item. Only the owner or one of
    /// its operators may do this.
    fn approve(
        &mut self,
        caller: &Address,
        approved: &Address,
        item_id: u128,
    ) -> Result<(), TransferError>;

    /// Grants or revokes `operator` control over every item `owner` holds.
    fn set_approval_for_all(&mut self, owner: &Address, operator: &Address, approved: bool);

    /// Would [`transfer_from`](Self::transfer_from) succeed right now?
    /// Never mutates.
    fn check_transfer_from(
        &self,
        operator: &Address,
        from: &Address,
        to: &Address,
        item_id: u128,
    ) -> Result<(), TransferError>;

    /// Moves `item_id` from `from` to `to`, clearing its single-item approval.
    fn transfer_from(
        &mut self,
        operator: &Address,
        from: &Address,
        to: &Address,
        item_id: u128,
    ) -> Result<(), TransferError>;
}

// ---------------------------------------------------------------------------
// Shared handles
// ---------------------------------------------------------------------------

impl<T: Journaled> Journaled for Arc<Mutex<T>> {
    fn checkpoint(&mut self) {
        self.lock().checkpoint();
    }

    fn commit(&mut self) {
        self.lock().commit();
    }

    fn rollback(&mut self) {
        self.lock().rollback();
    }
}

impl<T: FungibleCurrency> FungibleCurrency for Arc<Mutex<T>> {
    fn address(&self) -> Address {
        self.lock().address()
    }

    fn balance_of(&self, owner: &Address) -> u128 {
        self.lock().balance_of(owner)
    }

    fn allowance(&self, owner: &Address, spender: &Address) -> u128 {
        self.lock().allowance(owner, spender)
    }

    fn approve(&mut self, owner: &Address, spender: &Address, amount: u128) {
        self.lock().approve(owner, spender, amount);
    }

    fn check_transfer_from(
        &self,
        spender: &Address,
        from: &Address,
        to: &Address,
        amount: u128,
    ) -> Result<(), TransferError> {
        self.lock().check_transfer_from(spender, from, to, amount)
    }

    fn transfer_from(
        &mut self,
        spender: &Address,
        from: &Address,
        to: &Address,
        amount: u128,
    ) -> Result<(), TransferError> {
        self.lock().transfer_from(spender, from, to, amount)
    }
}

impl<T: NonFungibleCollateral> NonFungibleCollateral for Arc<Mutex<T>> {
    fn address(&self) -> Address {
        self.lock().address()
    }

    fn owner_of(&self, item_id: u128) -> Option<Address> {
        self.lock().owner_of(item_id)
    }

    fn approve(
        &mut self,
        caller: &Address,
        approved: &Address,
        item_id: u128,
    ) -> Result<(), TransferError> {
        self.lock().approve(caller, approved, item_id)
    }

    fn set_approval_for_all(&mut self, owner: &Address, operator: &Address, approved: bool) {
        self.lock().set_approval_for_all(owner, operator, approved);
    }

    fn check_transfer_from(
        &self,
        operator: &Address,
        from: &Address,
        to: &Address,
        item_id: u128,
    ) -> Result<(), TransferError> {
        self.lock().check_transfer_from(operator, from, to, item_id)
    }

    fn transfer_from(
        &mut self,
        operator: &Address,
        from: &Address,
        to: &Address,
        item_id: u128,
    ) -> Result<(), TransferError> {
        self.lock().transfer_from(operator, from, to, item_id)
    }
}
