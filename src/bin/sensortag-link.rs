use clap::Parser;
use log::{error, info};
use sensortag_link::{init_logging, run};
use sensortag_link::cli::Cli;
use sensortag_link::error::{AppRunError, ConfigError};

#[tokio::main]
async fn main() -> Result<(), AppRunError> {
    init_logging();
    info!(concat!("SensorTag Link ", env!("CARGO_PKG_VERSION")));

    let cli = Cli::parse();

    match run(cli).await {
        Err(AppRunError::ConfigError { source: ConfigError::CanNotLock { .. } }) => {
            error!("This application has already been started");
            Ok(())
        },
        Err(err) => {
            error!("Unexpected error: {}", err);
            Err(err)
        },
        Ok(_) => Ok(()),
    }
}
