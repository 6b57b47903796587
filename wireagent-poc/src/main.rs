use std::sync::Arc;

use tracing::{info, warn};
use wireagent_core::config::ProtocolSettings;
use wireagent_core::transport::HttpTransport;
use wireagent_core::wireserver::Protocol;

type Result<T> = std::result::Result<T, Box<dyn std::error::Error>>;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let mut settings = match std::env::args().nth(1) {
        Some(endpoint) => ProtocolSettings::new(endpoint),
        None => ProtocolSettings::default(),
    };
    if let Ok(dir) = std::env::var("WIREAGENT_LIB_DIR") {
        settings.lib_dir = dir.into();
    }
    info!(endpoint = %settings.endpoint, lib_dir = %settings.lib_dir.display(), "starting");

    let mut protocol = Protocol::new(settings, Arc::new(HttpTransport::new()))?;

    // One synchronization pass.
    protocol.refresh().await?;

    match protocol.vm_info() {
        Some(vm) => info!(
            vm_name = %vm.vm_name,
            role = %vm.role_name,
            deployment = %vm.deployment_name,
            incarnation = vm.incarnation,
            "goal state loaded"
        ),
        None => warn!("goal state loaded without vm identity"),
    }
    info!(count = protocol.certs().len(), "certificates resolved");
    for thumbprint in protocol.certs().keys() {
        info!(%thumbprint, "certificate available");
    }

    let requests: Vec<(String, String)> = protocol
        .extensions()
        .iter()
        .flat_map(|ext| {
            ext.instances
                .iter()
                .map(|i| (ext.name.clone(), i.requested_version.clone()))
        })
        .collect();
    for (name, requested) in requests {
        match protocol.resolve_package(&name, &requested).await {
            Ok(resolved) => info!(
                extension = %name,
                requested = %requested,
                version = %resolved.version,
                package = %resolved.package_uri,
                "package resolved"
            ),
            Err(err) => warn!(extension = %name, requested = %requested, error = %err, "resolution failed"),
        }
    }

    protocol.report_provision_status("Ready", "", "").await?;
    info!("provisioning health reported");

    Ok(())
}
