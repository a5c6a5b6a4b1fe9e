use dpscore::param;
use dpscore::param::Param;
use flexi_logger::{FileSpec, FlexiLoggerError, Logger, LoggerHandle};
use log::{error, info, warn};
use std::env;
use std::process::exit;

fn start_logger(param: &Param) -> Result<LoggerHandle, FlexiLoggerError> {
    let logger = Logger::try_with_env_or_str(&param.general.log_level)?;
    if param.general.log_base.is_empty() {
        logger.start()
    } else {
        logger
            .log_to_file(
                FileSpec::default()
                    .basename(param.general.log_base.clone())
                    .suffix(param.general.log_suffix.clone()),
            )
            .start()
    }
}

fn main() {
    let param_path = env::args().nth(1).unwrap_or_else(|| "param.yaml".to_string());

    let param = match param::get(param_path.clone()) {
        Ok(param) => param,
        Err(e) => {
            eprintln!("dpscore: cannot use {}: {}", param_path, e);
            exit(1);
        }
    };

    // the handle must stay alive until the end of the run
    let _logger = match start_logger(&param) {
        Ok(handle) => handle,
        Err(e) => {
            eprintln!("dpscore: cannot start the logger: {}", e);
            exit(1);
        }
    };

    info!(
        "dpscore {} starting with {}",
        env!("CARGO_PKG_VERSION"),
        param_path
    );

    match dpscore::run(&param) {
        Ok(analysis) => {
            info!("{}", analysis);
            if let Err(e) = analysis.write_tables(&param.general.output_dir) {
                error!("Cannot write the output tables: {}", e);
                exit(1);
            }
            info!("Output tables written to {}", param.general.output_dir);
            if !param.general.save_run.is_empty() {
                match analysis.save_auto(&param.general.save_run) {
                    Ok(()) => info!("Run record saved to {}", param.general.save_run),
                    Err(e) => warn!("Cannot save the run record: {}", e),
                }
            }
        }
        Err(e) => {
            error!("{}", e);
            exit(1);
        }
    }
}
