//! etcd disk performance check.
//!
//! etcd is sensitive to fsync latency on its write-ahead log. The check runs
//! a short `fio` benchmark that mimics WAL writes (small sequential writes,
//! each followed by `fdatasync`) in the directory the WAL will live in, and
//! classifies the measured IOPS and 99th percentile sync latency against
//! soft (warning) and hard (critical) thresholds.

use std::collections::BTreeMap;
use std::env;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{debug, info};
use serde::{Deserialize, Serialize};
use tokio::process::Command;

use crate::{
    error::{OpsError, Result},
    models::{Probe, ProbeSeverity},
};

pub const ENV_MIN_IOPS_SOFT: &str = "GRAVITY_ETCD_MIN_IOPS_SOFT";
pub const ENV_MIN_IOPS_HARD: &str = "GRAVITY_ETCD_MIN_IOPS_HARD";
pub const ENV_MAX_LATENCY_SOFT: &str = "GRAVITY_ETCD_MAX_LATENCY_SOFT";
pub const ENV_MAX_LATENCY_HARD: &str = "GRAVITY_ETCD_MAX_LATENCY_HARD";

/// Name of the checker attached to disk probes.
pub const DISK_CHECKER: &str = "etcd-disk";

/// Name of the benchmark job.
pub const ETCD_JOB_NAME: &str = "etcd";

const FIO_BINARY: &str = "fio";
const PERCENTILE_99: &str = "99.000000";
const DEFAULT_RUNTIME: Duration = Duration::from_secs(10);

/// Limits the disk benchmark is classified against.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DiskThresholds {
    /// Below this many IOPS a warning is raised
    pub min_iops_soft: f64,
    /// Below this many IOPS the check fails
    pub min_iops_hard: f64,
    /// Above this p99 sync latency (ms) a warning is raised
    pub max_latency_soft_ms: f64,
    /// Above this p99 sync latency (ms) the check fails
    pub max_latency_hard_ms: f64,
}

impl Default for DiskThresholds {
    fn default() -> Self {
        Self {
            min_iops_soft: 50.0,
            min_iops_hard: 10.0,
            max_latency_soft_ms: 50.0,
            max_latency_hard_ms: 150.0,
        }
    }
}

impl DiskThresholds {
    /// Reads thresholds from the `GRAVITY_ETCD_*` environment variables.
    /// Unset or unparsable values fall back to the defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let read = |name: &str, default: f64| -> f64 {
            lookup(name)
                .and_then(|value| value.trim().parse::<f64>().ok())
                .unwrap_or(default)
        };
        Self {
            min_iops_soft: read(ENV_MIN_IOPS_SOFT, defaults.min_iops_soft),
            min_iops_hard: read(ENV_MIN_IOPS_HARD, defaults.min_iops_hard),
            max_latency_soft_ms: read(ENV_MAX_LATENCY_SOFT, defaults.max_latency_soft_ms),
            max_latency_hard_ms: read(ENV_MAX_LATENCY_HARD, defaults.max_latency_hard_ms),
        }
    }
}

/// A benchmark job to run on a node.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FioJobSpec {
    pub name: String,
    /// Directory the job writes its test file into
    pub directory: PathBuf,
    /// Upper bound on the job's run time
    pub runtime: Duration,
}

impl FioJobSpec {
    /// The WAL-like job for an etcd data directory.
    pub fn etcd(directory: impl Into<PathBuf>) -> Self {
        Self {
            name: ETCD_JOB_NAME.to_string(),
            directory: directory.into(),
            runtime: DEFAULT_RUNTIME,
        }
    }

    /// Renders the job in fio's ini format.
    pub fn to_job_file(&self) -> String {
        format!(
            "[{name}]\n\
             rw=write\n\
             ioengine=sync\n\
             fdatasync=1\n\
             directory={directory}\n\
             bs=2300\n\
             size=22m\n\
             runtime={runtime}s\n\
             time_based=0\n",
            name = self.name,
            directory = self.directory.display(),
            runtime = self.runtime.as_secs().max(1),
        )
    }

    /// File fio writes for a single-process job.
    pub fn test_file(&self) -> PathBuf {
        self.directory.join(format!("{}.0.0", self.name))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct CheckDisksRequest {
    pub jobs: Vec<FioJobSpec>,
}

/// Results of disk benchmark jobs.
///
/// Mirrors the structure of fio's JSON output so the output of a local run
/// deserializes into it directly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct CheckDisksResponse {
    pub jobs: Vec<FioJobResult>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct FioJobResult {
    #[serde(rename = "jobname")]
    pub name: String,
    #[serde(default)]
    pub write: FioWriteStats,
    #[serde(default)]
    pub sync: FioSyncStats,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct FioWriteStats {
    pub iops: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct FioSyncStats {
    #[serde(default)]
    pub lat_ns: FioLatency,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct FioLatency {
    /// Percentile (formatted like `99.000000`) to nanoseconds
    #[serde(default)]
    pub percentile: BTreeMap<String, f64>,
}

impl FioJobResult {
    pub fn write_iops(&self) -> f64 {
        self.write.iops
    }

    /// 99th percentile sync latency in milliseconds.
    pub fn sync_latency_p99_ms(&self) -> Result<f64> {
        self.sync
            .lat_ns
            .percentile
            .get(PERCENTILE_99)
            .map(|ns| ns / 1_000_000.0)
            .ok_or_else(|| {
                OpsError::not_found(format!(
                    "fio job {} output has no 99th percentile sync latency",
                    self.name
                ))
            })
    }
}

impl CheckDisksResponse {
    pub fn parse(output: &str) -> Result<Self> {
        Ok(serde_json::from_str(output)?)
    }

    /// The first job's results.
    pub fn first_job(&self) -> Result<&FioJobResult> {
        self.jobs
            .first()
            .ok_or_else(|| OpsError::not_found("fio output contains no jobs"))
    }
}

/// Classifies a measured IOPS value. At most one probe is produced: the hard
/// threshold takes precedence over the soft one.
pub fn classify_iops(iops: f64, thresholds: &DiskThresholds) -> Option<Probe> {
    let (severity, limit) = if iops < thresholds.min_iops_hard {
        (ProbeSeverity::Critical, thresholds.min_iops_hard)
    } else if iops < thresholds.min_iops_soft {
        (ProbeSeverity::Warning, thresholds.min_iops_soft)
    } else {
        return None;
    };
    Some(
        Probe::failed(
            DISK_CHECKER,
            severity,
            format!("etcd disk performance is too low: {iops:.0} sequential write IOPS, minimum is {limit:.0}"),
        )
        .with_detail("etcd requires fast sequential writes to its write-ahead log"),
    )
}

/// Classifies a measured p99 sync latency in milliseconds.
pub fn classify_latency(latency_ms: f64, thresholds: &DiskThresholds) -> Option<Probe> {
    let (severity, limit) = if latency_ms > thresholds.max_latency_hard_ms {
        (ProbeSeverity::Critical, thresholds.max_latency_hard_ms)
    } else if latency_ms > thresholds.max_latency_soft_ms {
        (ProbeSeverity::Warning, thresholds.max_latency_soft_ms)
    } else {
        return None;
    };
    Some(
        Probe::failed(
            DISK_CHECKER,
            severity,
            format!("etcd disk latency is too high: {latency_ms:.2}ms 99th percentile fsync, maximum is {limit:.0}ms"),
        )
        .with_detail("high fsync latency on the write-ahead log slows down every etcd write"),
    )
}

/// Classifies a job's results, returning zero, one or two failed probes.
pub fn classify(result: &FioJobResult, thresholds: &DiskThresholds) -> Result<Vec<Probe>> {
    let latency_ms = result.sync_latency_p99_ms()?;
    let iops = result.write_iops();
    debug!(
        "disk job {}: {iops:.1} IOPS, {latency_ms:.2}ms p99 sync latency",
        result.name
    );
    Ok(classify_iops(iops, thresholds)
        .into_iter()
        .chain(classify_latency(latency_ms, thresholds))
        .collect())
}

/// Runs a fio job on this host and returns its parsed output.
pub async fn run_fio(spec: &FioJobSpec) -> Result<CheckDisksResponse> {
    run_benchmark(FIO_BINARY, spec).await
}

async fn run_benchmark(binary: &str, spec: &FioJobSpec) -> Result<CheckDisksResponse> {
    tokio::fs::create_dir_all(&spec.directory)
        .await
        .map_err(|source| OpsError::FileSystem {
            path: spec.directory.clone(),
            source,
        })?;

    let job_file = write_job_file(spec)?;
    info!("running disk benchmark in {}", spec.directory.display());
    let output = Command::new(binary)
        .arg("--output-format=json")
        .arg(job_file.path())
        .output()
        .await;
    // fio leaves its test file behind whether or not the job succeeded.
    remove_test_file(&spec.test_file()).await;

    let output = output.map_err(|e| OpsError::Exec {
        command: binary.to_string(),
        message: e.to_string(),
    })?;
    if !output.status.success() {
        return Err(OpsError::Exec {
            command: format!("{binary} --output-format=json {}", job_file.path().display()),
            message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    CheckDisksResponse::parse(&String::from_utf8_lossy(&output.stdout))
}

async fn remove_test_file(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!("removed {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => debug!("failed to remove {}: {e}", path.display()),
    }
}

fn write_job_file(spec: &FioJobSpec) -> Result<tempfile::NamedTempFile> {
    let temp_dir = env::temp_dir();
    let fs_error = |source: std::io::Error| OpsError::FileSystem {
        path: temp_dir.clone(),
        source,
    };
    let mut file = tempfile::Builder::new()
        .prefix("fio")
        .suffix(".job")
        .tempfile()
        .map_err(fs_error)?;
    file.write_all(spec.to_job_file().as_bytes())
        .map_err(fs_error)?;
    Ok(file)
}

/// Benchmarks `directory` on this host and classifies the results.
pub async fn check_local_disk(directory: &Path, thresholds: &DiskThresholds) -> Result<Vec<Probe>> {
    let response = run_fio(&FioJobSpec::etcd(directory)).await?;
    classify(response.first_job()?, thresholds)
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIO_OUTPUT: &str = r#"{
        "fio version": "fio-3.16",
        "jobs": [
            {
                "jobname": "etcd",
                "write": { "io_bytes": 23068000, "iops": 285.417, "runtime": 35054 },
                "sync": {
                    "lat_ns": {
                        "min": 200,
                        "max": 120402201,
                        "percentile": {
                            "1.000000": 1512,
                            "99.000000": 12124160,
                            "99.900000": 35913728
                        }
                    }
                }
            }
        ]
    }"#;

    fn result(iops: f64, latency_ms: f64) -> FioJobResult {
        let mut percentile = BTreeMap::new();
        percentile.insert(PERCENTILE_99.to_string(), latency_ms * 1_000_000.0);
        FioJobResult {
            name: ETCD_JOB_NAME.to_string(),
            write: FioWriteStats { iops },
            sync: FioSyncStats {
                lat_ns: FioLatency { percentile },
            },
        }
    }

    #[test]
    fn test_parse_fio_output() {
        let response = CheckDisksResponse::parse(FIO_OUTPUT).unwrap();
        let job = response.first_job().unwrap();
        assert_eq!(job.name, "etcd");
        assert!((job.write_iops() - 285.417).abs() < f64::EPSILON);
        assert!((job.sync_latency_p99_ms().unwrap() - 12.12416).abs() < 1e-9);
    }

    #[test]
    fn test_missing_percentile() {
        let job = FioJobResult {
            name: "etcd".to_string(),
            ..Default::default()
        };
        assert!(job.sync_latency_p99_ms().unwrap_err().is_not_found());
        assert!(CheckDisksResponse::default().first_job().unwrap_err().is_not_found());
    }

    #[test]
    fn test_iops_below_hard_is_single_critical() {
        let thresholds = DiskThresholds {
            min_iops_soft: 50.0,
            min_iops_hard: 10.0,
            ..Default::default()
        };
        let probes = classify(&result(5.0, 1.0), &thresholds).unwrap();
        assert_eq!(probes.len(), 1);
        assert!(probes[0].is_critical());
    }

    #[test]
    fn test_iops_between_thresholds_warns() {
        let probe = classify_iops(30.0, &DiskThresholds::default()).unwrap();
        assert!(probe.is_warning());
        assert!(classify_iops(50.0, &DiskThresholds::default()).is_none());
    }

    #[test]
    fn test_latency_classification() {
        let thresholds = DiskThresholds::default();
        assert!(classify_latency(10.0, &thresholds).is_none());
        assert!(classify_latency(50.0, &thresholds).is_none());
        assert!(classify_latency(100.0, &thresholds).unwrap().is_warning());
        assert!(classify_latency(200.0, &thresholds).unwrap().is_critical());
    }

    #[test]
    fn test_both_metrics_can_fail() {
        let probes = classify(&result(20.0, 200.0), &DiskThresholds::default()).unwrap();
        assert_eq!(probes.len(), 2);
        assert!(probes[0].is_warning());
        assert!(probes[1].is_critical());
    }

    #[test]
    fn test_thresholds_from_lookup() {
        let thresholds = DiskThresholds::from_lookup(|name| match name {
            ENV_MIN_IOPS_SOFT => Some("100".to_string()),
            ENV_MAX_LATENCY_HARD => Some("not-a-number".to_string()),
            _ => None,
        });
        assert_eq!(thresholds.min_iops_soft, 100.0);
        assert_eq!(thresholds.min_iops_hard, 10.0);
        assert_eq!(thresholds.max_latency_soft_ms, 50.0);
        assert_eq!(thresholds.max_latency_hard_ms, 150.0);
    }

    #[test]
    fn test_job_file() {
        let job = FioJobSpec::etcd("/var/lib/gravity/planet/etcd").to_job_file();
        assert!(job.starts_with("[etcd]\n"));
        assert!(job.contains("fdatasync=1\n"));
        assert!(job.contains("bs=2300\n"));
        assert!(job.contains("size=22m\n"));
        assert!(job.contains("directory=/var/lib/gravity/planet/etcd\n"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failed_benchmark_removes_test_file() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let spec = FioJobSpec::etcd(temp_dir.path());
        std::fs::write(spec.test_file(), b"leftover").unwrap();

        let err = run_benchmark("false", &spec).await.unwrap_err();

        assert!(matches!(err, OpsError::Exec { .. }));
        assert!(!spec.test_file().exists());
    }

    #[tokio::test]
    async fn test_missing_binary_is_exec_error() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let spec = FioJobSpec::etcd(temp_dir.path());

        let err = run_benchmark("shipwright-no-such-fio", &spec)
            .await
            .unwrap_err();

        assert!(matches!(err, OpsError::Exec { .. }));
        assert!(!spec.test_file().exists());
    }
}
