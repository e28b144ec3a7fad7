use std::time::Duration;

use serde_json::{Value, json};

use watify::SessionService;

use crate::error::Result;

/// Waits for the bridge to surface an authentication QR code and prints
/// its raw payload for the operator to render and scan.
pub async fn run(service: &SessionService, timeout: Duration) -> Result<Value> {
    service.connect().await?;

    let payload = service.wait_for_qr(timeout).await?;
    Ok(json!({
        "qr": payload,
        "hasQR": true,
    }))
}
