//! Hearth - embeddable application shell
//!
//! Entry point: drives the browser-process lifecycle and exits with its code.

use env_logger::Env;
use hearth::utils::CommandLine;
use hearth::{Collaborators, HostDriver, LifecycleController, NAME, ShellConfig, VERSION};
use log::info;

fn main() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let command_line = CommandLine::from_env();
    let config = ShellConfig::from_command_line(&command_line);
    info!(
        "{} v{} starting (user data: {})",
        NAME,
        VERSION,
        config.user_data_dir.display()
    );

    let collaborators = Collaborators::for_current_target(&config);
    let mut controller = LifecycleController::new(config, command_line.into_shared(), collaborators);

    let result = HostDriver::run(&mut controller);
    let status = if result.is_ok() {
        controller.exit_code()
    } else {
        result.as_i32()
    };
    drop(controller);

    info!("{} exiting with status {}", NAME, status);
    std::process::exit(status);
}
