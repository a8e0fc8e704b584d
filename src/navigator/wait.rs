use crate::config::ExtractionSettings;
use crate::driver::{ElementHandle, Locator, PageDriver};
use crate::errors::ExtractError;
use std::fmt;
use std::time::Duration;
use tokio::time::{Instant, sleep};
use tracing::{debug, trace};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Condition {
    Present,
    Clickable,
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Present => f.write_str("presence of"),
            Self::Clickable => f.write_str("clickable"),
        }
    }
}

/// Bounded polling against the page. Never waits past the caller's timeout.
#[derive(Debug, Clone, Copy)]
pub struct WaitPolicy {
    poll_interval: Duration,
}

impl WaitPolicy {
    pub fn new(poll_interval: Duration) -> Self {
        Self {
            poll_interval: poll_interval.max(Duration::from_millis(1)),
        }
    }

    pub fn from_settings(settings: &ExtractionSettings) -> Self {
        Self::new(settings.poll_interval())
    }

    pub async fn present<D: PageDriver + ?Sized>(
        &self,
        driver: &mut D,
        locator: &Locator,
        timeout: Duration,
    ) -> Result<ElementHandle, ExtractError> {
        self.await_condition(driver, locator, Condition::Present, timeout)
            .await
    }

    pub async fn clickable<D: PageDriver + ?Sized>(
        &self,
        driver: &mut D,
        locator: &Locator,
        timeout: Duration,
    ) -> Result<ElementHandle, ExtractError> {
        self.await_condition(driver, locator, Condition::Clickable, timeout)
            .await
    }

    /// Poll until `condition` holds for the first element at `locator`.
    ///
    /// Stale or vanished elements between polls are part of normal page
    /// churn and just mean "not yet". Any other driver error ends the wait.
    pub async fn await_condition<D: PageDriver + ?Sized>(
        &self,
        driver: &mut D,
        locator: &Locator,
        condition: Condition,
        timeout: Duration,
    ) -> Result<ElementHandle, ExtractError> {
        let deadline = Instant::now() + timeout;
        let mut polls = 0u32;

        loop {
            polls += 1;
            match check(driver, locator, condition).await {
                Ok(Some(el)) => {
                    debug!("{} {} after {} polls", condition, locator, polls);
                    return Ok(el);
                }
                Ok(None) => {}
                Err(e) if e.is_transient() => trace!("{} {}: {}", condition, locator, e),
                Err(e) => return Err(e.into()),
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(ExtractError::Timeout {
                    what: format!("{condition} {locator}"),
                    after: timeout,
                });
            }
            sleep(self.poll_interval.min(deadline - now)).await;
        }
    }
}

async fn check<D: PageDriver + ?Sized>(
    driver: &mut D,
    locator: &Locator,
    condition: Condition,
) -> Result<Option<ElementHandle>, crate::errors::DriverError> {
    let Some(el) = driver.find(locator).await? else {
        return Ok(None);
    };
    match condition {
        Condition::Present => Ok(Some(el)),
        Condition::Clickable => Ok(driver.is_interactable(&el).await?.then_some(el)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::fake::{FakeDriver, FakeElement, FakePage};
    use tokio_test::{assert_err, assert_ok};

    const URL: &str = "https://example.com/";

    #[tokio::test(start_paused = true)]
    async fn test_waits_for_late_element() {
        let loc = Locator::css("table");
        let page = FakePage::new().with(
            loc.clone(),
            FakeElement::html("<table></table>").appearing_after(Duration::from_secs(3)),
        );
        let mut driver = FakeDriver::new(URL).page(URL, page);
        let wait = WaitPolicy::new(Duration::from_millis(250));

        let started = Instant::now();
        assert_ok!(wait.present(&mut driver, &loc, Duration::from_secs(20)).await);
        assert!(started.elapsed() >= Duration::from_secs(3));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_times_out_at_bound() {
        let mut driver = FakeDriver::new(URL).page(URL, FakePage::new());
        let wait = WaitPolicy::new(Duration::from_millis(250));

        let started = Instant::now();
        let err = assert_err!(
            wait.present(&mut driver, &Locator::css("table"), Duration::from_secs(10))
                .await
        );
        assert!(matches!(err, ExtractError::Timeout { after, .. } if after == Duration::from_secs(10)));
        assert_eq!(started.elapsed(), Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_hidden_element_is_not_clickable() {
        let loc = Locator::id("onetrust-accept-btn-handler");
        let mut hidden = FakeElement::html("<button>Accept</button>");
        hidden.hidden = true;
        let mut driver = FakeDriver::new(URL).page(URL, FakePage::new().with(loc.clone(), hidden));
        let wait = WaitPolicy::new(Duration::from_millis(100));

        assert_ok!(wait.present(&mut driver, &loc, Duration::from_secs(1)).await);
        assert_err!(wait.clickable(&mut driver, &loc, Duration::from_secs(1)).await);
    }
}
