//! Rate/Latency Arbiter
//!
//! Reduces every live client request on a sensor to the one hardware rate
//! and latency its implementation must be told to use.
//!
//! ## Rate
//!
//! ```text
//! requests: 1Hz, 5Hz, on-change     table: [1, 4, 5, on-change]
//!                 │                               │
//!          highest numeric = 5Hz ──── first ≥ ────┘──▶ 5Hz
//! ```
//!
//! - On-demand votes count as "someone is listening" but carry no number.
//! - On-change votes do the same and also make on-change the fallback when
//!   no numeric vote exists.
//! - With no votes at all the sensor should be off (`Ok(None)`).
//! - If the table has no numeric rate at least as fast as the fastest vote,
//!   the combination is impossible.
//!
//! ## Latency
//!
//! The smallest requested latency wins: batches are shared, so the most
//! demanding client sets the flush deadline for everyone.

use crate::errors::{HubError, HubResult};
use crate::rate::SensorRate;
use crate::requests::RequestMatrix;
use crate::sensor::{SensorHandle, SensorInfo};

/// What a sensor can be asked to do, as seen by the arbiter
#[derive(Debug, Clone, Copy)]
pub struct RateCaps<'a> {
    /// Ascending rate table, sentinels allowed
    pub rates: &'a [SensorRate],
    /// On-change appears in the table
    pub has_onchange: bool,
    /// On-demand appears in the table
    pub has_ondemand: bool,
}

impl<'a> RateCaps<'a> {
    /// Capabilities advertised by a static descriptor
    pub fn of(info: &'a SensorInfo) -> Self {
        Self {
            rates: info.supported_rates,
            has_onchange: info.supports_onchange(),
            has_ondemand: info.supports_ondemand(),
        }
    }
}

/// Compute the hardware rate for `handle`
///
/// `extra` is a vote not yet in the matrix (a request being validated).
/// `excluded` removes one matching vote from the aggregate, so a client
/// changing its rate does not count its own previous request.
///
/// Returns `Ok(None)` when nobody is listening.
pub fn compute_hw_rate(
    caps: RateCaps<'_>,
    handle: SensorHandle,
    requests: &RequestMatrix,
    extra: Option<SensorRate>,
    excluded: Option<SensorRate>,
) -> HubResult<Option<SensorRate>> {
    let mut have_users = false;
    let mut have_onchange = false;
    let mut highest = 0u32;

    if let Some(rate) = extra {
        match rate {
            SensorRate::OnChange if !caps.has_onchange => return Err(HubError::RateImpossible),
            SensorRate::OnDemand if !caps.has_ondemand => return Err(HubError::RateImpossible),
            SensorRate::Hz(hz) if hz.raw() == 0 => return Err(HubError::RateImpossible),
            _ => {}
        }
        have_users = true;
        vote(rate, &mut highest, &mut have_onchange);
    }

    let mut excluded = excluded;
    for req in requests.for_sensor(handle) {
        if excluded == Some(req.rate) {
            excluded = None;
            continue;
        }
        have_users = true;
        vote(req.rate, &mut highest, &mut have_onchange);
    }

    if highest == 0 {
        return Ok(if have_onchange {
            Some(SensorRate::OnChange)
        } else if have_users {
            Some(SensorRate::OnDemand)
        } else {
            None
        });
    }

    caps.rates
        .iter()
        .copied()
        .find(|rate| rate.numeric().is_some_and(|hz| hz.raw() >= highest))
        .map(Some)
        .ok_or(HubError::RateImpossible)
}

fn vote(rate: SensorRate, highest: &mut u32, have_onchange: &mut bool) {
    match rate {
        SensorRate::Hz(hz) => *highest = (*highest).max(hz.raw()),
        SensorRate::OnChange => *have_onchange = true,
        SensorRate::OnDemand => {}
    }
}

/// Smallest latency among the live requests on `handle`, `None` if there are none
pub fn compute_hw_latency(handle: SensorHandle, requests: &RequestMatrix) -> Option<u64> {
    requests.for_sensor(handle).map(|req| req.latency).min()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    static TABLE: [SensorRate; 4] = [
        SensorRate::hz(1),
        SensorRate::hz(4),
        SensorRate::hz(5),
        SensorRate::OnChange,
    ];

    fn caps() -> RateCaps<'static> {
        RateCaps {
            rates: &TABLE,
            has_onchange: true,
            has_ondemand: false,
        }
    }

    fn handle() -> SensorHandle {
        SensorHandle::from_raw(0x0002_0001).unwrap()
    }

    #[test]
    fn no_votes_means_off() {
        let matrix = RequestMatrix::new();
        assert_eq!(compute_hw_rate(caps(), handle(), &matrix, None, None), Ok(None));
        assert_eq!(compute_hw_latency(handle(), &matrix), None);
    }

    #[test]
    fn rounds_up_to_table() {
        let mut matrix = RequestMatrix::new();
        matrix.add(handle(), 1, SensorRate::hz(1), 0).unwrap();

        let rate = compute_hw_rate(caps(), handle(), &matrix, Some(SensorRate::hz(3)), None);
        assert_eq!(rate, Ok(Some(SensorRate::hz(4))));

        let rate = compute_hw_rate(caps(), handle(), &matrix, Some(SensorRate::hz(6)), None);
        assert_eq!(rate, Err(HubError::RateImpossible));
    }

    #[test]
    fn missing_capability_is_impossible() {
        let matrix = RequestMatrix::new();
        let rate = compute_hw_rate(caps(), handle(), &matrix, Some(SensorRate::OnDemand), None);
        assert_eq!(rate, Err(HubError::RateImpossible));
    }

    #[test]
    fn sentinel_votes() {
        let mut matrix = RequestMatrix::new();
        matrix.add(handle(), 1, SensorRate::OnChange, 0).unwrap();
        assert_eq!(
            compute_hw_rate(caps(), handle(), &matrix, None, None),
            Ok(Some(SensorRate::OnChange))
        );

        // A numeric vote beats on-change
        assert_eq!(
            compute_hw_rate(caps(), handle(), &matrix, Some(SensorRate::hz(1)), None),
            Ok(Some(SensorRate::hz(1)))
        );

        let ondemand = RateCaps {
            rates: &[SensorRate::OnDemand],
            has_onchange: false,
            has_ondemand: true,
        };
        let mut matrix = RequestMatrix::new();
        matrix.add(handle(), 1, SensorRate::OnDemand, 0).unwrap();
        assert_eq!(
            compute_hw_rate(ondemand, handle(), &matrix, None, None),
            Ok(Some(SensorRate::OnDemand))
        );
    }

    #[test]
    fn excluded_vote_is_skipped_once() {
        let mut matrix = RequestMatrix::new();
        matrix.add(handle(), 1, SensorRate::hz(5), 0).unwrap();
        matrix.add(handle(), 2, SensorRate::hz(1), 0).unwrap();

        // Client 1 moving from 5Hz to 1Hz
        let rate = compute_hw_rate(
            caps(),
            handle(),
            &matrix,
            Some(SensorRate::hz(1)),
            Some(SensorRate::hz(5)),
        );
        assert_eq!(rate, Ok(Some(SensorRate::hz(1))));
    }

    #[test]
    fn latency_takes_minimum() {
        let mut matrix = RequestMatrix::new();
        matrix.add(handle(), 1, SensorRate::hz(1), 3_000).unwrap();
        matrix.add(handle(), 2, SensorRate::hz(1), 1_000).unwrap();
        matrix.add(SensorHandle::from_raw(9).unwrap(), 3, SensorRate::hz(1), 5).unwrap();
        assert_eq!(compute_hw_latency(handle(), &matrix), Some(1_000));
    }

    proptest! {
        #[test]
        fn result_covers_fastest_vote(votes in prop::collection::vec(0usize..3, 1..8)) {
            let mut matrix = RequestMatrix::new();
            let mut fastest = 0;
            for (client, pick) in votes.iter().enumerate() {
                let hz = [1u32, 4, 5][*pick];
                fastest = fastest.max(hz);
                matrix.add(handle(), client as u16, SensorRate::hz(hz), 0).unwrap();
            }
            let rate = compute_hw_rate(caps(), handle(), &matrix, None, None).unwrap();
            prop_assert_eq!(rate, Some(SensorRate::hz(fastest)));
        }
    }
}
