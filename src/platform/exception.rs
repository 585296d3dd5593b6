//! Last-chance failure reporting for the UI thread

use std::sync::Once;

use log::error;

use crate::utils::Result;

static INSTALL: Once = Once::new();

/// Log panics through the logger before the previous hook runs
pub fn install_exception_filter() -> Result<()> {
    INSTALL.call_once(|| {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            let thread = std::thread::current();
            error!(
                "Unhandled panic on thread {}: {}",
                thread.name().unwrap_or("<unnamed>"),
                info
            );
            previous(info);
        }));
    });
    Ok(())
}
