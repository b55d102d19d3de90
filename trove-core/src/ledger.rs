//! Extraction permits and held coins.

use std::collections::VecDeque;

use thiserror::Error;

use crate::model::{CoinId, License, PermitId};
use crate::request::ApiRequest;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// Every slot holds a permit with attempts left. Callers defer.
    #[error("no permit has attempts left")]
    NoAvailablePermit,

    #[error("no free permit slot for permit {0}")]
    PoolFull(PermitId),

    #[error("unknown permit {0}")]
    UnknownPermit(PermitId),

    #[error("permit {0} confirmed more attempts than were sent")]
    ConfirmWithoutUse(PermitId),
}

/// A permit held in one of the ledger's slots.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Permit {
    pub id: PermitId,
    /// Attempts the service allows.
    pub allowed: u32,
    /// Attempts dispatched.
    pub used: u32,
    /// Attempts the service has answered.
    pub confirmed: u32,
}

impl Permit {
    pub fn available(&self) -> u32 {
        self.allowed.saturating_sub(self.used)
    }

    pub fn is_exhausted(&self) -> bool {
        self.confirmed >= self.allowed
    }
}

impl From<License> for Permit {
    fn from(license: License) -> Self {
        Self {
            id: license.id,
            allowed: license.dig_allowed,
            used: license.dig_used,
            confirmed: license.dig_used,
        }
    }
}

/// Fixed pool of permit slots plus the coins available for paid issuance.
#[derive(Debug)]
pub struct PermitLedger {
    slots: Vec<Option<Permit>>,
    coins: VecDeque<CoinId>,
}

impl PermitLedger {
    pub fn new(slots: usize) -> Self {
        Self {
            slots: vec![None; slots],
            coins: VecDeque::new(),
        }
    }

    pub fn has_available_permit(&self) -> bool {
        self.slots
            .iter()
            .flatten()
            .any(|permit| permit.available() > 0)
    }

    /// Claim one attempt on the first permit that has any left.
    pub fn reserve(&mut self) -> Result<PermitId, LedgerError> {
        let permit = self
            .slots
            .iter_mut()
            .flatten()
            .find(|permit| permit.available() > 0)
            .ok_or(LedgerError::NoAvailablePermit)?;
        permit.used += 1;
        Ok(permit.id)
    }

    /// Install a freshly issued permit into the first empty or exhausted
    /// slot.
    pub fn issue(&mut self, license: License) -> Result<(), LedgerError> {
        let slot = self
            .slots
            .iter_mut()
            .find(|slot| slot.is_none_or(|permit| permit.is_exhausted()))
            .ok_or(LedgerError::PoolFull(license.id))?;
        *slot = Some(Permit::from(license));
        Ok(())
    }

    /// Record the service's answer to one attempt. Returns `true` when the
    /// permit is now exhausted and should be replaced.
    pub fn confirm_attempt(&mut self, id: PermitId) -> Result<bool, LedgerError> {
        let permit = self
            .slots
            .iter_mut()
            .flatten()
            .find(|permit| permit.id == id)
            .ok_or(LedgerError::UnknownPermit(id))?;
        if permit.confirmed >= permit.used {
            return Err(LedgerError::ConfirmWithoutUse(id));
        }
        permit.confirmed += 1;
        Ok(permit.is_exhausted())
    }

    pub fn has_currency(&self) -> bool {
        !self.coins.is_empty()
    }

    pub fn borrow_currency(&mut self) -> Option<CoinId> {
        self.coins.pop_front()
    }

    pub fn add_currency(&mut self, coins: impl IntoIterator<Item = CoinId>) {
        self.coins.extend(coins);
    }

    /// Next issuance request: paid with a held coin when there is one.
    pub fn next_issuance(&mut self) -> ApiRequest {
        match self.borrow_currency() {
            Some(coin) => ApiRequest::IssuePaidLicense { coin },
            None => ApiRequest::IssueFreeLicense,
        }
    }

    /// Permits that still have unanswered attempts or attempts left.
    pub fn in_use_count(&self) -> usize {
        self.slots
            .iter()
            .flatten()
            .filter(|permit| !permit.is_exhausted())
            .count()
    }

    pub fn coin_count(&self) -> usize {
        self.coins.len()
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    pub fn permit(&self, id: PermitId) -> Option<&Permit> {
        self.slots.iter().flatten().find(|permit| permit.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn license(id: u64, allowed: u32) -> License {
        License {
            id: PermitId(id),
            dig_allowed: allowed,
            dig_used: 0,
        }
    }

    #[test]
    fn three_attempt_permit_gates_the_fourth_dig() {
        let mut ledger = PermitLedger::new(1);
        ledger.issue(license(1, 3)).expect("slot free");

        for _ in 0..3 {
            assert_eq!(ledger.reserve(), Ok(PermitId(1)));
        }
        assert_eq!(ledger.reserve(), Err(LedgerError::NoAvailablePermit));
        assert!(!ledger.has_available_permit());

        assert_eq!(ledger.confirm_attempt(PermitId(1)), Ok(false));
        assert_eq!(ledger.confirm_attempt(PermitId(1)), Ok(false));
        assert_eq!(ledger.confirm_attempt(PermitId(1)), Ok(true));
        assert_eq!(ledger.in_use_count(), 0);

        ledger.issue(license(2, 3)).expect("exhausted slot is reused");
        assert_eq!(ledger.reserve(), Ok(PermitId(2)));
    }

    #[test]
    fn issuing_into_a_busy_pool_fails() {
        let mut ledger = PermitLedger::new(1);
        ledger.issue(license(1, 2)).expect("slot free");
        assert_eq!(
            ledger.issue(license(2, 2)),
            Err(LedgerError::PoolFull(PermitId(2)))
        );
    }

    #[test]
    fn confirmations_cannot_outrun_attempts() {
        let mut ledger = PermitLedger::new(2);
        ledger.issue(license(4, 2)).expect("slot free");
        assert_eq!(
            ledger.confirm_attempt(PermitId(4)),
            Err(LedgerError::ConfirmWithoutUse(PermitId(4)))
        );
        assert_eq!(
            ledger.confirm_attempt(PermitId(9)),
            Err(LedgerError::UnknownPermit(PermitId(9)))
        );
    }

    #[test]
    fn paid_issuance_spends_a_coin() {
        let mut ledger = PermitLedger::new(2);
        assert_eq!(ledger.next_issuance(), ApiRequest::IssueFreeLicense);

        ledger.add_currency([CoinId(5), CoinId(6)]);
        assert!(ledger.has_currency());
        assert_eq!(
            ledger.next_issuance(),
            ApiRequest::IssuePaidLicense { coin: CoinId(5) }
        );
        assert_eq!(ledger.coin_count(), 1);
    }
}
