use std::time::Duration;

use serde_json::Value;

use watify::SessionService;

use crate::error::Result;

pub async fn run(
    service: &SessionService,
    recipients: &[String],
    message: &str,
    delay: Duration,
    ready_timeout: Duration,
) -> Result<Value> {
    service.connect().await?;
    service.wait_until_ready(ready_timeout).await?;

    let outcome = service.send_bulk(recipients, message, Some(delay)).await?;
    Ok(serde_json::to_value(outcome).map_err(anyhow::Error::from)?)
}
