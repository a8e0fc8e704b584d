use super::wait::WaitPolicy;
use crate::config::ExtractionSettings;
use crate::driver::{Locator, PageDriver};
use crate::errors::ExtractError;
use tokio::time::sleep;
use tokio_retry::strategy::FixedInterval;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpandOutcome {
    Expanded,
    /// Only the default page of rows is rendered. Still usable.
    PartiallyExpanded,
}

/// Pick the "all rows" option of a page-size dropdown.
///
/// The dropdown is often re-rendered right after page load, so a handle can
/// go stale between locating and selecting; each attempt locates again.
/// After a successful pick we sit out the settle delay, since nothing
/// signals that the table finished re-rendering.
pub async fn expand_to_all<D: PageDriver + ?Sized>(
    driver: &mut D,
    control: &Locator,
    all_option: &str,
    settings: &ExtractionSettings,
) -> ExpandOutcome {
    let wait = WaitPolicy::from_settings(settings);
    let attempts = settings.expand_attempts.max(1);
    let mut backoff =
        FixedInterval::new(settings.expand_backoff()).take(attempts as usize - 1);

    for attempt in 1..=attempts {
        match select_all(driver, &wait, control, all_option, settings).await {
            Ok(()) => {
                info!("Selected \"{}\" in {} (attempt {})", all_option, control, attempt);
                sleep(settings.expand_settle()).await;
                return ExpandOutcome::Expanded;
            }
            Err(ExtractError::Driver(e)) => {
                warn!("Page size control {} unusable: {}", control, e);
                break;
            }
            Err(e) => {
                warn!("Expand attempt {}/{} failed: {}", attempt, attempts, e);
                match backoff.next() {
                    Some(delay) => sleep(delay).await,
                    None => break,
                }
            }
        }
    }

    warn!("Proceeding with the rows currently rendered");
    ExpandOutcome::PartiallyExpanded
}

async fn select_all<D: PageDriver + ?Sized>(
    driver: &mut D,
    wait: &WaitPolicy,
    control: &Locator,
    all_option: &str,
    settings: &ExtractionSettings,
) -> Result<(), ExtractError> {
    let select = wait
        .clickable(driver, control, settings.chrome_timeout())
        .await?;
    driver.select_option(&select, all_option).await?;
    Ok(())
}
