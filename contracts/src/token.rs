//! # Fixture Currency
//!
//! A minimal fungible token with a public faucet. It exists so the ledger
//! can be exercised end to end on the development network and in tests:
//! anyone may call [`FungibleToken::claim_free_tokens`].
//!
//! ## Rules
//!
//! - **Supply tracking**: total supply and per-address balances move
//!   together. Every addition is checked.
//! - **Allowances**: `transfer_from` by a third party consumes allowance;
//!   an owner moving its own balance does not need one.
//! - **Journal**: one checkpoint deep. The escrow never nests batches.
//!   While a checkpoint is open every write records the value it replaced,
//!   so a batch costs what it touches, not the size of the ledger.

use pawnda_protocol::config::CURRENCY_DECIMALS;
use pawnda_protocol::identity::Address;
use std::collections::HashMap;

use crate::assets::{FungibleCurrency, Journaled};
use crate::error::TransferError;

#[derive(Debug, Clone, Default)]
struct Ledger {
    balances: HashMap<Address, u128>,
    allowances: HashMap<(Address, Address), u128>,
    total_supply: u128,
}

/// A value overwritten since the open checkpoint.
#[derive(Debug, Clone)]
enum Undo {
    Balance(Address, Option<u128>),
    Allowance((Address, Address), Option<u128>),
    Supply(u128),
}

/// A faucet-backed fungible token.
#[derive(Debug, Clone)]
pub struct FungibleToken {
    address: Address,
    name: String,
    symbol: String,
    decimals: u8,
    state: Ledger,
    journal: Option<Vec<Undo>>,
}

impl FungibleToken {
    /// Deploys an empty token at `address`.
    pub fn new(address: Address, name: impl Into<String>, symbol: impl Into<String>) -> Self {
        Self {
            address,
            name: name.into(),
            symbol: symbol.into(),
            decimals: CURRENCY_DECIMALS,
            state: Ledger::default(),
            journal: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn decimals(&self) -> u8 {
        self.decimals
    }

    pub fn total_supply(&self) -> u128 {
        self.state.total_supply
    }

    /// Mints `amount` to `to`. The faucet has no limit.
    ///
    /// # Errors
    ///
    /// Returns [`TransferError::Overflow`] if supply or the balance would
    /// exceed `u128::MAX`.
    pub fn claim_free_tokens(&mut self, to: &Address, amount: u128) -> Result<(), TransferError> {
        let overflow = TransferError::Overflow {
            asset: self.address,
        };
        let new_supply = self
            .state
            .total_supply
            .checked_add(amount)
            .ok_or_else(|| overflow.clone())?;
        let new_balance = self
            .balance_of(to)
            .checked_add(amount)
            .ok_or(overflow)?;

        self.set_supply(new_supply);
        self.set_balance(*to, new_balance);

        tracing::debug!(token = %self.address, to = %to, amount, "faucet mint");
        Ok(())
    }

    /// Moves the caller's own balance.
    pub fn transfer(
        &mut self,
        from: &Address,
        to: &Address,
        amount: u128,
    ) -> Result<(), TransferError> {
        self.transfer_from(from, from, to, amount)
    }

    fn record(&mut self, undo: Undo) {
        if let Some(journal) = self.journal.as_mut() {
            journal.push(undo);
        }
    }

    fn set_balance(&mut self, owner: Address, amount: u128) {
        let previous = self.state.balances.insert(owner, amount);
        self.record(Undo::Balance(owner, previous));
    }

    fn set_allowance(&mut self, key: (Address, Address), amount: u128) {
        let previous = self.state.allowances.insert(key, amount);
        self.record(Undo::Allowance(key, previous));
    }

    fn set_supply(&mut self, supply: u128) {
        let previous = std::mem::replace(&mut self.state.total_supply, supply);
        self.record(Undo::Supply(previous));
    }

    fn check_balance(&self, from: &Address, amount: u128) -> Result<(), TransferError> {
        let balance = self.balance_of(from);
        if balance < amount {
            return Err(TransferError::InsufficientBalance {
                asset: self.address,
                account: *from,
                balance,
                required: amount,
            });
        }
        Ok(())
    }

    fn check_allowance(
        &self,
        spender: &Address,
        from: &Address,
        amount: u128,
    ) -> Result<(), TransferError> {
        if spender == from {
            return Ok(());
        }
        let allowance = self.allowance(from, spender);
        if allowance < amount {
            return Err(TransferError::InsufficientAllowance {
                asset: self.address,
                owner: *from,
                spender: *spender,
                allowance,
                required: amount,
            });
        }
        Ok(())
    }
}

impl Journaled for FungibleToken {
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
                Undo::Balance(owner, Some(amount)) => {
                    self.state.balances.insert(owner, amount);
                }
                Undo::Balance(owner, None) => {
                    self.state.balances.remove(&owner);
                }
                Undo::Allowance(key, Some(amount)) => {
                    self.state.allowances.insert(key, amount);
                }
                Undo::Allowance(key, None) => {
                    self.state.allowances.remove(&key);
                }
                Undo::Supply(supply) => self.state.total_supply = supply,
            }
        }
    }
}

impl FungibleCurrency for FungibleToken {
    fn address(&self) -> Address {
        self.address
    }

    fn balance_of(&self, owner: &Address) -> u128 {
        self.state.balances.get(owner).copied().unwrap_or(0)
    }

    fn allowance(&self, owner: &Address, spender: &Address) -> u128 {
        self.state
            .allowances
            .get(&(*owner, *spender))
            .copied()
            .unwrap_or(0)
    }

    fn approve(&mut self, owner: &Address, spender: &Address, amount: u128) {
        self.set_allowance((*owner, *spender), amount);
    }

    fn check_transfer_from(
        &self,
        spender: &Address,
        from: &Address,
        to: &Address,
        amount: u128,
    ) -> Result<(), TransferError> {
        self.check_allowance(spender, from, amount)?;
        self.check_balance(from, amount)?;
        if from != to {
            self.balance_of(to)
                .checked_add(amount)
                .ok_or(TransferError::Overflow {
                    asset: self.address,
                })?;
        }
        Ok(())
    }

    fn transfer_from(
        &mut self,
        spender: &Address,
        from: &Address,
        to: &Address,
        amount: u128,
    ) -> Result<(), TransferError> {
        self.check_transfer_from(spender, from, to, amount)?;

        if spender != from {
            let remaining = self.allowance(from, spender) - amount;
            self.set_allowance((*from, *spender), remaining);
        }

        if from != to {
            let from_balance = self.balance_of(from) - amount;
            let to_balance = self.balance_of(to) + amount;
            self.set_balance(*from, from_balance);
            self.set_balance(*to, to_balance);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token() -> FungibleToken {
        FungibleToken::new(Address::from_label("token"), "Dummy Token", "DUM")
    }

    fn alice() -> Address {
        Address::from_label("alice")
    }

    fn bob() -> Address {
        Address::from_label("bob")
    }

    fn spender() -> Address {
        Address::from_label("spender")
    }

    #[test]
    fn faucet_increases_supply_and_balance() {
        let mut t = token();
        t.claim_free_tokens(&alice(), 1_000).unwrap();
        t.claim_free_tokens(&alice(), 500).unwrap();
        assert_eq!(t.total_supply(), 1_500);
        assert_eq!(t.balance_of(&alice()), 1_500);
        assert_eq!(t.decimals(), 18);
        assert_eq!(t.symbol(), "DUM");
    }

    #[test]
    fn faucet_overflow_rejected() {
        let mut t = token();
        t.claim_free_tokens(&alice(), u128::MAX).unwrap();
        assert!(matches!(
            t.claim_free_tokens(&bob(), 1),
            Err(TransferError::Overflow { .. })
        ));
        assert_eq!(t.balance_of(&bob()), 0);
    }

    #[test]
    fn owner_transfer_needs_no_allowance() {
        let mut t = token();
        t.claim_free_tokens(&alice(), 100).unwrap();
        t.transfer(&alice(), &bob(), 40).unwrap();
        assert_eq!(t.balance_of(&alice()), 60);
        assert_eq!(t.balance_of(&bob()), 40);
        assert_eq!(t.total_supply(), 100);
    }

    #[test]
    fn third_party_transfer_consumes_allowance() {
        let mut t = token();
        t.claim_free_tokens(&alice(), 100).unwrap();
        t.approve(&alice(), &spender(), 70);

        t.transfer_from(&spender(), &alice(), &bob(), 50).unwrap();
        assert_eq!(t.allowance(&alice(), &spender()), 20);
        assert_eq!(t.balance_of(&bob()), 50);

        assert!(matches!(
            t.transfer_from(&spender(), &alice(), &bob(), 30),
            Err(TransferError::InsufficientAllowance {
                allowance: 20,
                required: 30,
                ..
            })
        ));
    }

    #[test]
    fn insufficient_balance_rejected() {
        let mut t = token();
        t.claim_free_tokens(&alice(), 10).unwrap();
        t.approve(&alice(), &spender(), 100);
        assert!(matches!(
            t.transfer_from(&spender(), &alice(), &bob(), 11),
            Err(TransferError::InsufficientBalance {
                balance: 10,
                required: 11,
                ..
            })
        ));
        assert_eq!(t.balance_of(&alice()), 10);
        assert_eq!(t.allowance(&alice(), &spender()), 100);
    }

    #[test]
    fn self_transfer_keeps_balance() {
        let mut t = token();
        t.claim_free_tokens(&alice(), 10).unwrap();
        t.transfer(&alice(), &alice(), 10).unwrap();
        assert_eq!(t.balance_of(&alice()), 10);
    }

    #[test]
    fn rollback_restores_checkpoint() {
        let mut t = token();
        t.claim_free_tokens(&alice(), 100).unwrap();

        t.checkpoint();
        t.transfer(&alice(), &bob(), 100).unwrap();
        t.approve(&alice(), &spender(), 5);
        t.rollback();

        assert_eq!(t.balance_of(&alice()), 100);
        assert_eq!(t.balance_of(&bob()), 0);
        assert_eq!(t.allowance(&alice(), &spender()), 0);
    }

    #[test]
    fn commit_keeps_changes() {
        let mut t = token();
        t.claim_free_tokens(&alice(), 100).unwrap();
        t.checkpoint();
        t.transfer(&alice(), &bob(), 30).unwrap();
        t.commit();
        t.rollback();
        assert_eq!(t.balance_of(&bob()), 30);
    }

    #[test]
    fn journal_holds_only_touched_entries() {
        let mut t = token();
        for i in 0..1_000 {
            t.claim_free_tokens(&Address::from_label(&format!("holder {i}")), 1)
                .unwrap();
        }
        t.claim_free_tokens(&alice(), 50).unwrap();
        t.approve(&alice(), &spender(), 50);

        t.checkpoint();
        t.transfer_from(&spender(), &alice(), &bob(), 20).unwrap();
        assert_eq!(t.journal.as_ref().map(Vec::len), Some(3));

        t.transfer_from(&spender(), &alice(), &bob(), 20).unwrap();
        t.rollback();
        assert_eq!(t.balance_of(&alice()), 50);
        assert_eq!(t.balance_of(&bob()), 0);
        assert_eq!(t.allowance(&alice(), &spender()), 50);
        assert_eq!(t.total_supply(), 1_050);
        assert!(t.journal.is_none());
    }
}
