use super::wait::WaitPolicy;
use crate::config::ExtractionSettings;
use crate::driver::{Locator, PageDriver};
use tokio::time::sleep;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsentOutcome {
    Dismissed,
    Absent,
}

/// Click the cookie banner away if it shows up within the chrome timeout.
/// Whether it shows up depends on the session, so every failure here ends
/// in `Absent` and the caller carries on.
pub async fn dismiss_if_present<D: PageDriver + ?Sized>(
    driver: &mut D,
    control: &Locator,
    settings: &ExtractionSettings,
) -> ConsentOutcome {
    let wait = WaitPolicy::from_settings(settings);

    let button = match wait.clickable(driver, control, settings.chrome_timeout()).await {
        Ok(button) => button,
        Err(e) => {
            info!("No consent banner ({}), continuing", e);
            return ConsentOutcome::Absent;
        }
    };

    if let Err(e) = driver.click(&button).await {
        warn!("Consent banner found but click failed: {}", e);
        return ConsentOutcome::Absent;
    }

    sleep(settings.consent_settle()).await;
    info!("Consent banner dismissed");
    ConsentOutcome::Dismissed
}
