//! # Asset Escrow
//!
//! Moves currency and collateral for the ledger as a single unit of work.
//! A batch of [`AssetTransfer`]s either lands completely or leaves every
//! asset contract exactly as it was.
//!
//! ## Two phases
//!
//! 1. **Pre-flight**: every transfer is checked with the contract's
//!    side-effect-free `check_transfer_from`. Most failures (missing
//!    approval, empty balance, wrong owner, unknown asset) stop here and
//!    nothing has been touched.
//! 2. **Apply**: every contract the batch touches is checkpointed, the
//!    transfers run in order, and the contracts are committed. If a transfer
//!    still fails (e.g. two transfers in the batch compete for the same
//!    balance) every touched contract is rolled back.

use pawnda_protocol::identity::Address;
use std::collections::{BTreeSet, HashMap};

use crate::assets::{FungibleCurrency, Journaled, NonFungibleCollateral};
use crate::error::TransferError;

/// One movement of value within a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetTransfer {
    /// Fungible amount of `asset`.
    Currency {
        asset: Address,
        from: Address,
        to: Address,
        amount: u128,
    },
    /// A single collectible item of `asset`.
    Collateral {
        asset: Address,
        from: Address,
        to: Address,
        item_id: u128,
    },
}

/// Registry of the asset contracts the ledger can move, keyed by address.
#[derive(Default)]
pub struct AssetEscrow {
    currencies: HashMap<Address, Box<dyn FungibleCurrency>>,
    collectibles: HashMap<Address, Box<dyn NonFungibleCollateral>>,
}

impl AssetEscrow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a currency contract under its own address.
    pub fn register_currency<C: FungibleCurrency + 'static>(&mut self, currency: C) -> Address {
        let address = currency.address();
        self.currencies.insert(address, Box::new(currency));
        tracing::debug!(asset = %address, "currency registered");
        address
    }

    /// Registers a collectible contract under its own address.
    pub fn register_collateral<N>(&mut self, registry: N) -> Address
    where
        N: NonFungibleCollateral + 'static,
    {
        let address = registry.address();
        self.collectibles.insert(address, Box::new(registry));
        tracing::debug!(asset = %address, "collateral registry registered");
        address
    }

    pub fn currency(&self, address: &Address) -> Option<&dyn FungibleCurrency> {
        self.currencies.get(address).map(|c| c.as_ref())
    }

    pub fn collateral(&self, address: &Address) -> Option<&dyn NonFungibleCollateral> {
        self.collectibles.get(address).map(|n| n.as_ref())
    }

    /// Runs `transfers` on `operator`'s authority, all or nothing.
    pub fn execute(
        &mut self,
        operator: &Address,
        transfers: &[AssetTransfer],
    ) -> Result<(), TransferError> {
        self.preflight(operator, transfers)?;

        let mut touched_currencies = BTreeSet::new();
        let mut touched_collectibles = BTreeSet::new();
        for transfer in transfers {
            match transfer {
                AssetTransfer::Currency { asset, .. } => touched_currencies.insert(*asset),
                AssetTransfer::Collateral { asset, .. } => touched_collectibles.insert(*asset),
            };
        }

        for asset in &touched_currencies {
            self.currency_mut(asset)?.checkpoint();
        }
        for asset in &touched_collectibles {
            self.collateral_mut(asset)?.checkpoint();
        }

        let outcome = transfers
            .iter()
            .try_for_each(|transfer| self.apply(operator, transfer));

        match outcome {
            Ok(()) => {
                for asset in &touched_currencies {
                    self.currency_mut(asset)?.commit();
                }
                for asset in &touched_collectibles {
                    self.collateral_mut(asset)?.commit();
                }
                Ok(())
            }
            Err(err) => {
                tracing::warn!(error = %err, "asset batch failed mid-flight, rolling back");
                for asset in &touched_currencies {
                    self.currency_mut(asset)?.rollback();
                }
                for asset in &touched_collectibles {
                    self.collateral_mut(asset)?.rollback();
                }
                Err(err)
            }
        }
    }

    fn preflight(
        &self,
        operator: &Address,
        transfers: &[AssetTransfer],
    ) -> Result<(), TransferError> {
        for transfer in transfers {
            let checked = match *transfer {
                AssetTransfer::Currency {
                    asset,
                    from,
                    to,
                    amount,
                } => self
                    .currency(&asset)
                    .ok_or(TransferError::UnknownAsset(asset))?
                    .check_transfer_from(operator, &from, &to, amount),
                AssetTransfer::Collateral {
                    asset,
                    from,
                    to,
                    item_id,
                } => self
                    .collateral(&asset)
                    .ok_or(TransferError::UnknownAsset(asset))?
                    .check_transfer_from(operator, &from, &to, item_id),
            };
            if let Err(err) = checked {
                tracing::warn!(error = %err, "asset batch rejected in pre-flight");
                return Err(err);
            }
        }
        Ok(())
    }

    fn apply(&mut self, operator: &Address, transfer: &AssetTransfer) -> Result<(), TransferError> {
        match *transfer {
            AssetTransfer::Currency {
                asset,
                from,
                to,
                amount,
            } => self
                .currency_mut(&asset)?
                .transfer_from(operator, &from, &to, amount),
            AssetTransfer::Collateral {
                asset,
                from,
                to,
                item_id,
            } => self
                .collateral_mut(&asset)?
                .transfer_from(operator, &from, &to, item_id),
        }
    }

    fn currency_mut(
        &mut self,
        address: &Address,
    ) -> Result<&mut Box<dyn FungibleCurrency>, TransferError> {
        self.currencies
            .get_mut(address)
            .ok_or(TransferError::UnknownAsset(*address))
    }

    fn collateral_mut(
        &mut self,
        address: &Address,
    ) -> Result<&mut Box<dyn NonFungibleCollateral>, TransferError> {
        self.collectibles
            .get_mut(address)
            .ok_or(TransferError::UnknownAsset(*address))
    }
}

impl std::fmt::Debug for AssetEscrow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssetEscrow")
            .field("currencies", &self.currencies.keys().collect::<Vec<_>>())
            .field("collectibles", &self.collectibles.keys().collect::<Vec<_>>())
            .finish()
    }
}
