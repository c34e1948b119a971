//! Security rule priority allocation
//!
//! Every rule in a security group needs a unique priority. A
//! [`PriorityGenerator`] lives for one provisioning session (one VM's rule
//! set) and must not be shared between concurrent deployments.

use crate::defaults::MAX_RULE_PRIORITY;
use std::collections::BTreeSet;
use std::sync::Mutex;

/// No priority is left below the Azure maximum
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("No free security rule priority between {start_from} and {max}")]
pub struct PriorityExhausted {
    pub start_from: u32,
    pub max: u32,
}

#[derive(Debug, Default)]
struct State {
    last: Option<u32>,
    reserved: BTreeSet<u32>,
}

/// Hands out strictly increasing rule priorities.
///
/// The first call returns `start_from` (unless that priority is reserved);
/// every later call returns a value strictly greater than all values
/// returned before.
#[derive(Debug, Default)]
pub struct PriorityGenerator {
    state: Mutex<State>,
}

impl PriorityGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a generator that skips priorities already used in the group
    pub fn with_reserved(reserved: impl IntoIterator<Item = u32>) -> Self {
        Self {
            state: Mutex::new(State {
                last: None,
                reserved: reserved.into_iter().collect(),
            }),
        }
    }

    /// Next free priority at or above `start_from`
    pub fn next_priority(&self, start_from: u32) -> Result<u32, PriorityExhausted> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());

        let mut candidate = match state.last {
            Some(last) => start_from.max(last.saturating_add(1)),
            None => start_from,
        };
        // Bounded before every step, so `candidate + 1` cannot overflow
        loop {
            if candidate > MAX_RULE_PRIORITY {
                return Err(PriorityExhausted {
                    start_from,
                    max: MAX_RULE_PRIORITY,
                });
            }
            if !state.reserved.contains(&candidate) {
                break;
            }
            candidate += 1;
        }

        state.last = Some(candidate);
        Ok(candidate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_priority_is_start() {
        let generator = PriorityGenerator::new();
        assert_eq!(generator.next_priority(1000).unwrap(), 1000);
    }

    #[test]
    fn test_strictly_increasing() {
        let generator = PriorityGenerator::new();
        let values: Vec<u32> = (0..50)
            .map(|_| generator.next_priority(1000).unwrap())
            .collect();

        assert_eq!(values[0], 1000);
        assert!(values.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_lower_start_never_goes_backwards() {
        let generator = PriorityGenerator::new();
        assert_eq!(generator.next_priority(2000).unwrap(), 2000);
        assert_eq!(generator.next_priority(100).unwrap(), 2001);
    }

    #[test]
    fn test_higher_start_jumps_forward() {
        let generator = PriorityGenerator::new();
        assert_eq!(generator.next_priority(1000).unwrap(), 1000);
        assert_eq!(generator.next_priority(3000).unwrap(), 3000);
    }

    #[test]
    fn test_reserved_priorities_are_skipped() {
        let generator = PriorityGenerator::with_reserved([1000, 1001, 1003]);
        assert_eq!(generator.next_priority(1000).unwrap(), 1002);
        assert_eq!(generator.next_priority(1000).unwrap(), 1004);
    }

    #[test]
    fn test_exhausted() {
        let generator = PriorityGenerator::new();
        assert_eq!(generator.next_priority(MAX_RULE_PRIORITY).unwrap(), MAX_RULE_PRIORITY);
        let err = generator.next_priority(MAX_RULE_PRIORITY).unwrap_err();
        assert_eq!(err.max, MAX_RULE_PRIORITY);
    }

    #[test]
    fn test_reserved_tail_is_exhausted() {
        let generator =
            PriorityGenerator::with_reserved([MAX_RULE_PRIORITY - 1, MAX_RULE_PRIORITY]);
        let err = generator.next_priority(MAX_RULE_PRIORITY - 1).unwrap_err();
        assert_eq!(err.start_from, MAX_RULE_PRIORITY - 1);
    }

    #[test]
    fn test_reserved_u32_max_terminates() {
        let generator = PriorityGenerator::with_reserved([u32::MAX]);
        let err = generator.next_priority(u32::MAX).unwrap_err();
        assert_eq!(
            err,
            PriorityExhausted {
                start_from: u32::MAX,
                max: MAX_RULE_PRIORITY
            }
        );
    }
}
