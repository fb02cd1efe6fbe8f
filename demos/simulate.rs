use std::{sync::Arc, time::Duration};
use tokio::{sync::Mutex, time::sleep};
use tracing::{error, info, warn};
use m18sim::{
    mock::MockCharger, ChargerLink, ProfileCatalog, ProfileSelection, Result, SessionSupervisor,
    TracingObserver,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    info!("🔋 m18sim Charging Simulation Example");
    info!("No real charging current flows - only parameters and message cadence change");

    let pack = Arc::new(Mutex::new(MockCharger::new(300, 6000)));
    let mut supervisor = SessionSupervisor::new(Arc::new(TracingObserver));
    supervisor.bind_device(pack.clone());
    info!("📊 {}", supervisor.status());

    for selection in ProfileSelection::ALL {
        info!("  {}", ProfileCatalog::describe(selection));
    }

    // Edit the custom profile through the amps fields
    {
        let custom = supervisor.catalog_mut().custom_mut();
        custom.cutoff_amps = "0.25".to_string();
        custom.max_amps = "4.5".to_string();
        custom.commit_amps_fields();
        info!(
            "✏️ Custom profile now cutoff {} / max {}",
            custom.cutoff_raw, custom.max_raw
        );
    }

    // Full run
    info!("▶️ Running a 3 second Gentle session at simulated 4800 baud...");
    if let Err(e) = supervisor.start(3.0, "4800", ProfileSelection::Gentle) {
        error!("❌ Failed to start: {}", e);
        return Err(e);
    }

    // A second start while running is rejected
    if let Err(e) = supervisor.start(3.0, "4800", ProfileSelection::Normal) {
        warn!("⚠️ Second start rejected as expected: {}", e);
    }

    let report = supervisor.join().await?;
    info!(
        "✅ Session {} {} after {} ticks ({:.1}s)",
        report.session_id,
        report.outcome,
        report.ticks,
        report.elapsed.as_secs_f64()
    );

    // Stopped run
    info!("▶️ Running a Custom session and stopping it early...");
    supervisor.start_from_text("60", "9600", "Custom")?;
    sleep(Duration::from_secs(2)).await;
    supervisor.stop();
    supervisor.stop();

    let report = supervisor.join().await?;
    info!("🛑 Session {} after {} ticks", report.outcome, report.ticks);

    let pack = pack.lock().await;
    info!(
        "🔧 Pack parameters after both runs: cutoff {} / max {} (idle: {})",
        pack.cutoff_current(),
        pack.max_current(),
        pack.is_idle()
    );
    info!("📊 {}", supervisor.status());

    info!("🎉 Simulation example completed!");
    Ok(())
}
