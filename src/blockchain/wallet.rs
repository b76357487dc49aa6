use dashmap::DashMap;
use thiserror::Error;

use std::sync::Arc;

use super::transaction::Address;

/// Errors that can occur when funding a wallet
#[derive(Debug, Error, PartialEq)]
pub enum WalletError {
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Insufficient funds: required {required}, available {available}")]
    InsufficientFunds { required: f64, available: f64 },
}

/// Buyer balances, checked before a purchase and spent when it commits
pub trait BalanceSource: Send + Sync {
    fn get_balance(&self, address: &Address) -> f64;

    /// Deducts `amount`, failing without change if the balance is short
    fn spend(&self, address: &Address, amount: f64) -> Result<f64, WalletError>;

    /// Gives back an `amount` spent by a purchase that did not go through
    fn refund(&self, address: &Address, amount: f64) -> Result<f64, WalletError>;
}

/// Balances kept in memory
///
/// Addresses never funded report `default_balance`, the allowance every new
/// storefront wallet starts with.
#[derive(Debug, Clone)]
pub struct InMemoryWallet {
    balances: Arc<DashMap<Address, f64>>,
    default_balance: f64,
}

impl InMemoryWallet {
    pub fn new(default_balance: f64) -> Self {
        InMemoryWallet {
            balances: Arc::new(DashMap::new()),
            default_balance,
        }
    }

    /// Adds funds to `address`
    ///
    /// # Returns
    ///
    /// The new balance
    pub fn fund(&self, address: &Address, amount: f64) -> Result<f64, WalletError> {
        check_amount(amount)?;

        let mut entry = self
            .balances
            .entry(address.clone())
            .or_insert(self.default_balance);
        *entry += amount;
        Ok(*entry)
    }
}

fn check_amount(amount: f64) -> Result<(), WalletError> {
    if amount.is_nan() || amount <= 0.0 {
        return Err(WalletError::InvalidAmount(format!(
            "Amount must be positive: {}",
            amount
        )));
    }
    Ok(())
}

// purchases of free products move a zero amount
fn check_payment(amount: f64) -> Result<(), WalletError> {
    if amount.is_nan() || amount < 0.0 {
        return Err(WalletError::InvalidAmount(format!(
            "Amount must not be negative: {}",
            amount
        )));
    }
    Ok(())
}

impl BalanceSource for InMemoryWallet {
    fn get_balance(&self, address: &Address) -> f64 {
        self.balances
            .get(address)
            .map(|entry| *entry.value())
            .unwrap_or(self.default_balance)
    }

    fn spend(&self, address: &Address, amount: f64) -> Result<f64, WalletError> {
        check_payment(amount)?;

        let mut entry = self
            .balances
            .entry(address.clone())
            .or_insert(self.default_balance);
        if *entry < amount {
            return Err(WalletError::InsufficientFunds {
                required: amount,
                available: *entry,
            });
        }
        *entry -= amount;
        Ok(*entry)
    }

    fn refund(&self, address: &Address, amount: f64) -> Result<f64, WalletError> {
        check_payment(amount)?;

        let mut entry = self
            .balances
            .entry(address.clone())
            .or_insert(self.default_balance);
        *entry += amount;
        Ok(*entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_address_gets_default() {
        let wallet = InMemoryWallet::new(5.0);
        assert_eq!(wallet.get_balance(&Address::from("new")), 5.0);
    }

    #[test]
    fn test_fund_accumulates() {
        let wallet = InMemoryWallet::new(5.0);
        let address = Address::from("buyer");

        assert_eq!(wallet.fund(&address, 2.5).unwrap(), 7.5);
        assert_eq!(wallet.get_balance(&address), 7.5);

        assert_eq!(wallet.fund(&address, 1.0).unwrap(), 8.5);
        assert_eq!(wallet.get_balance(&Address::from("other")), 5.0);
    }

    #[test]
    fn test_fund_rejects_non_positive() {
        let wallet = InMemoryWallet::new(0.0);
        let address = Address::from("buyer");

        assert!(wallet.fund(&address, 0.0).is_err());
        assert!(wallet.fund(&address, -1.0).is_err());
        assert!(wallet.fund(&address, f64::NAN).is_err());
        assert_eq!(wallet.get_balance(&address), 0.0);
    }

    #[test]
    fn test_spend_and_refund() {
        let wallet = InMemoryWallet::new(5.0);
        let address = Address::from("buyer");

        assert_eq!(wallet.spend(&address, 2.0).unwrap(), 3.0);
        assert_eq!(
            wallet.spend(&address, 4.0),
            Err(WalletError::InsufficientFunds {
                required: 4.0,
                available: 3.0
            })
        );
        assert_eq!(wallet.get_balance(&address), 3.0);

        assert_eq!(wallet.refund(&address, 2.0).unwrap(), 5.0);
        assert!(wallet.spend(&address, -1.0).is_err());
        assert_eq!(wallet.spend(&address, 0.0).unwrap(), 5.0);
    }
}
