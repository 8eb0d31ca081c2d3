// Activity Core - activity and recording lifecycle management
//
// Owns activities, their audio recordings and transcripts:
// - Activity state machine and soft deletion
// - One live recording per user, with file allocation and finalization
// - Transcript chunk storage and search
// - Startup maintenance for crashed sessions and orphaned files

// Performance logging macros - exported for use by other modules
#[macro_use]
pub mod macros;

pub mod commands;
pub mod config;
pub mod database;
pub mod devices;
pub mod error;
pub mod logging;
pub mod services;
pub mod state;
pub mod storage;

pub use config::AppConfig;
pub use error::{CoreError, CoreResult, ErrorResponse};
pub use logging::LogContext;
pub use state::{AppState, AppStatus, MaintenanceReport, RecordingIndicator};

/// Open the data directory, run startup maintenance and report status
fn start(config: AppConfig) -> CoreResult<()> {
    let state = AppState::open(config)?;

    match state.run_maintenance() {
        Ok(report) => log::info!(
            "Startup maintenance: {} interrupted recordings failed, {} deleted directories removed, {} orphaned files reclaimed",
            state.recovered_recordings(),
            report.deleted_dirs_removed,
            report.orphans.files_removed
        ),
        Err(e) => log::warn!("Startup maintenance failed: {}", e),
    }

    let status = state.get_app_status()?;
    log::info!(
        "Data directory {:?} ({} bytes), database {:?}",
        status.data_dir, status.disk_usage_bytes, status.db_path
    );
    Ok(())
}

// ============== Main App Entry ==============

pub fn run() {
    let config = AppConfig::from_env();

    let guard = match logging::init(&config.logging) {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("Failed to initialize logging: {:#}", e);
            None
        }
    };
    if let Some(path) = guard.as_ref().and_then(|g| g.log_file()) {
        log::info!("Logging to {:?}", path);
    }

    log::info!("Activity core starting...");
    let result = start(config);
    if let Err(e) = &result {
        log::error!("Activity core failed to start: {}", e);
    }

    drop(guard);
    if result.is_err() {
        std::process::exit(1);
    }
}
