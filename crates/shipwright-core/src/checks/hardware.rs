//! CPU and memory requirements.

use crate::{
    error::{OpsError, Result},
    models::{Requirements, ServerInfo},
};

/// Fails when the server has fewer cores than required.
pub fn check_cpu(info: &ServerInfo, requirements: &Requirements) -> Result<()> {
    if requirements.cpu_min > 0 && info.cpus < requirements.cpu_min {
        return Err(OpsError::bad_parameter(format!(
            "server {} has {} CPUs which is less than required minimum of {}",
            info.hostname, info.cpus, requirements.cpu_min
        )));
    }
    Ok(())
}

/// Fails when the server's available memory (free plus reclaimable) is
/// below the required minimum.
pub fn check_ram(info: &ServerInfo, requirements: &Requirements) -> Result<()> {
    let available = info.memory.available();
    if requirements.ram_min > 0 && available < requirements.ram_min {
        return Err(OpsError::bad_parameter(format!(
            "server {} has {} bytes of available RAM which is less than required minimum of {} bytes",
            info.hostname, available, requirements.ram_min
        )));
    }
    Ok(())
}
