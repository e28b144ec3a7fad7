use serde_json::{Value, json};

use watify::SessionService;

use crate::error::Result;

/// Triggers a manual teardown/recreate cycle and reports the resulting
/// health snapshot.
pub async fn run(service: &SessionService) -> Result<Value> {
    service.connect().await?;
    service.restart().await?;

    Ok(json!({
        "restarted": true,
        "health": service.health(),
    }))
}
