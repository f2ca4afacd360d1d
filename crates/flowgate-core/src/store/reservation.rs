//! RAII guard for cancellation-safe in-flight slot accounting.

use dashmap::DashMap;
use flowgate_types::error::StoreError;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Holds one in-flight slot on an account. Releases on drop, so a
/// cancelled job task can never leak capacity.
#[derive(Debug)]
pub struct ReservationGuard {
    in_flight: Arc<DashMap<String, AtomicU32>>,
    account_id: String,
}

impl ReservationGuard {
    /// Atomically reserve a slot if the current count is below `capacity`.
    /// Returns `None` when the account is full (no race window).
    pub(crate) fn try_new(
        in_flight: Arc<DashMap<String, AtomicU32>>,
        account_id: String,
        capacity: u32,
    ) -> Option<Self> {
        in_flight.entry(account_id.clone()).or_insert_with(|| AtomicU32::new(0));

        let counter_ref = in_flight.get(&account_id)?;
        loop {
            let current = counter_ref.load(Ordering::SeqCst);
            if current >= capacity {
                return None;
            }
            if counter_ref
                .compare_exchange(current, current + 1, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                drop(counter_ref);
                return Some(Self { in_flight, account_id });
            }
        }
    }

    pub fn account_id(&self) -> &str {
        &self.account_id
    }
}

impl Drop for ReservationGuard {
    fn drop(&mut self) {
        if let Some(counter) = self.in_flight.get(&self.account_id) {
            let released = counter.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |v| {
                if v > 0 {
                    Some(v - 1)
                } else {
                    None
                }
            });
            if released.is_err() {
                // Drop cannot propagate; the counter stays at zero.
                let error = StoreError::InvariantViolation {
                    id: self.account_id.clone(),
                    message: "in-flight counter already zero on release".to_string(),
                };
                tracing::error!(error = %error, "double release detected");
            }
        }
    }
}
