use log::error;

use small_redo::{log_init, RecoveryConfig, RecoverySystem};

fn main() {
    log_init::init_log();

    let config = match RecoveryConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            error!("failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    let mut system = match RecoverySystem::open(&config) {
        Ok(s) => s,
        Err(e) => {
            error!("failed to open recovery system: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = system.run() {
        error!("recovery failed: {}", e);
        std::process::exit(1);
    }
}
