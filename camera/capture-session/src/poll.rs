//! Bounded polling for asynchronously completing driver commands.
//!
//! Some device commands (packet size negotiation, action command
//! acknowledgement, force-IP) only signal completion through a separate
//! "is done" query. An unbounded busy-wait can hang forever on a
//! misbehaving device, so polling here always carries a retry budget.

use std::time::Duration;

use crate::driver::DriverError;

#[derive(thiserror::Error, Debug)]
pub enum PollError {
    #[error("command did not complete within {attempts} polls")]
    RetriesExceeded { attempts: usize },
    #[error(transparent)]
    Driver(#[from] DriverError),
}

/// Poll `is_done` up to `max_retries` times, sleeping `interval` between
/// polls.
pub fn wait_until<F>(max_retries: usize, interval: Duration, mut is_done: F) -> Result<(), PollError>
where
    F: FnMut() -> Result<bool, DriverError>,
{
    for attempt in 0..max_retries {
        if is_done()? {
            return Ok(());
        }
        tracing::debug!("not done yet (attempt {})", attempt + 1);
        std::thread::sleep(interval);
    }
    Err(PollError::RetriesExceeded {
        attempts: max_retries,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::DriverErrorKind;

    const TICK: Duration = Duration::from_millis(1);

    #[test]
    fn completes_when_done() {
        let mut calls = 0;
        let result = wait_until(10, TICK, || {
            calls += 1;
            Ok(calls >= 3)
        });
        assert!(result.is_ok());
        assert_eq!(calls, 3);
    }

    #[test]
    fn budget_exhaustion_is_an_error() {
        let mut calls = 0;
        let result = wait_until(4, TICK, || {
            calls += 1;
            Ok(false)
        });
        assert_eq!(calls, 4);
        match result {
            Err(PollError::RetriesExceeded { attempts }) => assert_eq!(attempts, 4),
            other => panic!("unexpected result: {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn driver_errors_propagate() {
        let result = wait_until(10, TICK, || {
            Err(DriverError::new(DriverErrorKind::NotFound, -5, "no such feature"))
        });
        assert!(matches!(result, Err(PollError::Driver(_))));
    }
}
