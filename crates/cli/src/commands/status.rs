use std::time::Duration;

use serde_json::{Value, json};

use watify::SessionService;

use crate::error::Result;

/// Connects, observes the session for up to `wait`, and reports health
/// plus connection stats. Reaching readiness ends the observation early;
/// not reaching it is still a successful status report.
pub async fn run(service: &SessionService, wait: Duration) -> Result<Value> {
    service.connect().await?;

    let _ = service.wait_until_ready(wait).await;

    let health = service.health();
    let stats = service.stats();
    let driver_state = service.driver_state().await;
    Ok(json!({
        "health": health,
        "stats": stats,
        "driverState": driver_state,
    }))
}
