//! Clock skew between servers.

use std::time::Duration;

use crate::{
    error::{OpsError, Result},
    models::{ServerInfo, ServerInfos},
};

/// Default maximum allowed difference between server clocks.
pub const MAX_OUT_OF_SYNC_TIME_DELTA: Duration = Duration::from_millis(300);

/// Verifies that every server's clock is within `max_delta` of the first
/// server's clock.
///
/// Each reading is shifted forward by half of the round-trip latency of the
/// request that fetched it, which approximates the moment the server
/// actually sampled its clock. The anchor gets the same treatment.
pub fn check_time(max_delta: Duration, servers: &ServerInfos) -> Result<()> {
    let mut iter = servers.iter();
    let Some(anchor) = iter.next() else {
        return Ok(());
    };
    let anchor_time = normalized_nanos(anchor);
    let max_delta = max_delta.as_nanos() as i128;

    for info in iter {
        let delta = (normalized_nanos(info) - anchor_time).abs();
        if delta > max_delta {
            return Err(OpsError::bad_parameter(format!(
                "time on server {} is out of sync with {} by {:?}, maximum allowed is {:?}",
                info.hostname,
                anchor.hostname,
                Duration::from_nanos(delta.min(u64::MAX as i128) as u64),
                Duration::from_nanos(max_delta as u64),
            )));
        }
    }
    Ok(())
}

fn normalized_nanos(info: &ServerInfo) -> i128 {
    info.server_time.time.as_nanosecond() + (info.server_time.latency.as_nanos() / 2) as i128
}

#[cfg(test)]
mod tests {
    use jiff::{SignedDuration, Timestamp};

    use super::*;
    use crate::models::ServerTime;

    fn server(hostname: &str, offset_ms: i64, latency_ms: u64) -> ServerInfo {
        let base = Timestamp::from_second(1_700_000_000).unwrap();
        ServerInfo {
            hostname: hostname.to_string(),
            server_time: ServerTime {
                time: base
                    .checked_add(SignedDuration::from_millis(offset_ms))
                    .unwrap(),
                latency: Duration::from_millis(latency_ms),
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_single_server_always_passes() {
        let servers = ServerInfos(vec![server("node-1", 10_000, 500)]);
        check_time(Duration::ZERO, &servers).unwrap();
        check_time(Duration::ZERO, &servers).unwrap();
    }

    #[test]
    fn test_within_delta() {
        let servers = ServerInfos(vec![
            server("node-1", 0, 20),
            server("node-2", 250, 20),
            server("node-3", -250, 20),
        ]);
        check_time(MAX_OUT_OF_SYNC_TIME_DELTA, &servers).unwrap();
    }

    #[test]
    fn test_out_of_sync_names_server() {
        let servers = ServerInfos(vec![
            server("node-1", 0, 20),
            server("node-2", 100, 20),
            server("node-3", 400, 20),
        ]);
        let err = check_time(MAX_OUT_OF_SYNC_TIME_DELTA, &servers).unwrap_err();
        assert!(err.is_bad_parameter());
        assert!(err.to_string().contains("node-3"));
    }

    #[test]
    fn test_latency_is_accounted_for() {
        // node-2 reports 200ms behind, but half of its 400ms round trip
        // elapsed before the clock was sampled.
        let servers = ServerInfos(vec![server("node-1", 0, 0), server("node-2", -200, 400)]);
        check_time(Duration::from_millis(1), &servers).unwrap();

        let servers = ServerInfos(vec![server("node-1", 0, 0), server("node-2", 200, 400)]);
        assert!(check_time(Duration::from_millis(300), &servers).is_err());
    }
}
