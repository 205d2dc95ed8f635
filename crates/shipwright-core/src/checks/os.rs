//! Operating system uniformity across servers.

use crate::{
    error::{OpsError, Result},
    models::{ServerInfo, ServerInfos},
};

/// Verifies that every server runs the same distribution and version.
///
/// Versions are compared by their major component, unless every server
/// reports a single-component version, in which case the whole strings are
/// compared.
///
/// ```
/// use shipwright_core::checks::check_same_os;
/// use shipwright_core::models::{OsInfo, ServerInfo, ServerInfos};
///
/// let server = |version: &str| ServerInfo {
///     os: OsInfo::new("centos", version),
///     ..Default::default()
/// };
/// let servers = ServerInfos(vec![server("7.2.1511"), server("7.4.1708")]);
/// assert!(check_same_os(&servers).is_ok());
/// ```
pub fn check_same_os(servers: &ServerInfos) -> Result<()> {
    let Some(first) = servers.iter().next() else {
        return Ok(());
    };

    if servers.iter().any(|info| info.os.id != first.os.id) {
        let distributions: Vec<String> = servers
            .iter()
            .map(|info| format!("{} ({})", info.os.id, info.hostname))
            .collect();
        return Err(OpsError::bad_parameter(format!(
            "servers have different OS distributions: {}",
            distributions.join(", ")
        )));
    }

    let compare_full = servers.iter().all(|info| !info.os.is_multi_component());
    let version = |info: &ServerInfo| -> String {
        if compare_full {
            info.os.version.clone()
        } else {
            info.os.major_version().to_string()
        }
    };
    let expected = version(first);
    if servers.iter().any(|info| version(info) != expected) {
        let versions: Vec<String> = servers
            .iter()
            .map(|info| format!("{} {} ({})", info.os.id, info.os.version, info.hostname))
            .collect();
        return Err(OpsError::bad_parameter(format!(
            "servers have different OS versions: {}",
            versions.join(", ")
        )));
    }
    Ok(())
}
