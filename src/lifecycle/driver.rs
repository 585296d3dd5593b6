//! Host driver: invokes every phase callback in order

use log::error;

use super::controller::LifecycleController;
use super::state::HostCallback;
use crate::utils::ResultCode;

/// Stands in for the host application that owns the phase sequence
pub struct HostDriver;

impl HostDriver {
    /// Drive `controller` through all nine callbacks. Stops at the first
    /// failing phase and returns its result code.
    pub fn run(controller: &mut LifecycleController) -> ResultCode {
        for callback in HostCallback::ORDER {
            if let Err(e) = controller.dispatch(callback) {
                error!("{} failed: {}", callback.name(), e);
                return e.result_code();
            }
        }
        ResultCode::Ok
    }
}
