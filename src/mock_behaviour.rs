//! This module provides ways to tweak mocked services, so that they can return errors on some tests

use crate::error::{DavError, Result};

/// This stores some behaviour tweaks, that describe how a mocked instance will behave during a given test
///
/// So that a functions fails _n_ times after _m_ initial successes, set `(m, n)` for the suited parameter
#[derive(Default, Clone, Debug)]
pub struct MockBehaviour {
    /// If this is true, every action will be allowed
    pub is_suspended: bool,

    /// The error a failing action returns. Defaults to a network error.
    pub failure: Option<DavError>,

    // From the MergeService trait
    pub duplicate_check_behaviour: (u32, u32),
    pub import_behaviour: (u32, u32),

    // From the AccountStore trait
    pub set_credentials_behaviour: (u32, u32),
}

impl MockBehaviour {
    pub fn new() -> Self {
        Self::default()
    }

    /// All actions will fail at once, for `n_fails` times
    pub fn fail_now(n_fails: u32) -> Self {
        Self {
            duplicate_check_behaviour: (0, n_fails),
            import_behaviour: (0, n_fails),
            set_credentials_behaviour: (0, n_fails),
            ..Self::default()
        }
    }

    /// Failing actions will return `error`
    pub fn failing_with(mut self, error: DavError) -> Self {
        self.failure = Some(error);
        self
    }

    /// Suspend this mock behaviour until you call `resume`
    pub fn suspend(&mut self) {
        self.is_suspended = true;
    }
    /// Make this behaviour active again
    pub fn resume(&mut self) {
        self.is_suspended = false;
    }

    pub fn can_duplicate_check(&mut self) -> Result<()> {
        if self.is_suspended { return Ok(()) }
        decrement(&mut self.duplicate_check_behaviour, "duplicate_check", &self.failure)
    }
    pub fn can_import(&mut self) -> Result<()> {
        if self.is_suspended { return Ok(()) }
        decrement(&mut self.import_behaviour, "import", &self.failure)
    }
    pub fn can_set_credentials(&mut self) -> Result<()> {
        if self.is_suspended { return Ok(()) }
        decrement(&mut self.set_credentials_behaviour, "set_credentials", &self.failure)
    }
}


/// Return Ok(()) in case the value is `(1+, _)` or `(_, 0)`, or return Err and decrement otherwise
fn decrement(value: &mut (u32, u32), descr: &str, failure: &Option<DavError>) -> Result<()> {
    let remaining_successes = value.0;
    let remaining_failures = value.1;

    if remaining_successes > 0 {
        value.0 -= 1;
        log::debug!("Mock behaviour: allowing a {} ({:?})", descr, value);
        Ok(())
    } else if remaining_failures > 0 {
        value.1 -= 1;
        log::debug!("Mock behaviour: failing a {} ({:?})", descr, value);
        Err(failure.clone().unwrap_or_else(|| {
            DavError::Network(format!("Mocked behaviour requires this {} to fail this time. ({:?})", descr, value))
        }))
    } else {
        log::debug!("Mock behaviour: allowing a {} ({:?})", descr, value);
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_mock_behaviour() {
        let mut ok = MockBehaviour::new();
        for _ in 0..5 {
            assert!(ok.can_duplicate_check().is_ok());
        }

        let mut now = MockBehaviour::fail_now(2);
        assert!(now.can_duplicate_check().is_err());
        assert!(now.can_import().is_err());
        assert!(now.can_import().is_err());
        assert!(now.can_duplicate_check().is_err());
        assert!(now.can_duplicate_check().is_ok());
        assert!(now.can_import().is_ok());

        let mut custom = MockBehaviour {
            duplicate_check_behaviour: (1, 1),
            ..MockBehaviour::default()
        }.failing_with(DavError::TooManyContacts);
        assert!(custom.can_duplicate_check().is_ok());
        assert_eq!(custom.can_duplicate_check(), Err(DavError::TooManyContacts));
        assert!(custom.can_duplicate_check().is_ok());

        custom.duplicate_check_behaviour = (0, 1);
        custom.suspend();
        assert!(custom.can_duplicate_check().is_ok());
        custom.resume();
        assert!(custom.can_duplicate_check().is_err());
    }
}
