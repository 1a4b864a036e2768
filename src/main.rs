use eddyscan::{App, BtleplugBackend, PlatformPermission, Result, ScanParams};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so the beacon list owns stdout
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    info!("eddyscan {} scanning for Eddystone UID beacons", eddyscan::VERSION);
    info!("Press Ctrl+C to stop");

    let params = ScanParams::default();
    let app = App::new(BtleplugBackend::new(params.clone()), params)?;

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    };

    app.run(&PlatformPermission, std::io::stdout(), shutdown).await?;

    info!("Scanner stopped");
    Ok(())
}
