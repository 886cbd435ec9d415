// Session establishment
//
// Resolves the configured protocol into a concrete client and performs the
// login handshake. Recovery of an established session lives in the update
// loop.

use duetly_api::{MachineClient, Session, Variant};
use tracing::{info, warn};

use crate::config::{ConnectorConfig, Protocol};

/// Log in to the configured controller.
pub(crate) async fn establish(
    config: &ConnectorConfig,
) -> Result<(MachineClient, Session), duetly_api::Error> {
    let transport = config.transport();
    let variant = match config.protocol {
        Protocol::Auto => {
            return MachineClient::detect(config.url.clone(), transport, &config.password).await;
        }
        Protocol::Poll => Variant::Poll,
        Protocol::Rest => Variant::Rest,
    };
    let client = MachineClient::new(variant, config.url.clone(), transport)?;
    let session = client.connect(&config.password).await?;
    info!(host = %session.hostname, %variant, "logged in");
    Ok((client, session))
}

/// Release the session. A failed logout is logged, never returned: local
/// state is dropped either way.
pub(crate) async fn teardown(client: &MachineClient, graceful: bool) {
    if !graceful {
        return;
    }
    if let Err(e) = client.disconnect().await {
        warn!(error = %e, "logout failed (non-fatal)");
    }
}
