//! Collection wrappers with empty-collection handling.

use std::fmt;

use super::LocalDateTime;
use crate::models::{Operation, Probe};

/// Table of operations, newest first as returned by the operator.
pub struct OperationList(pub Vec<Operation>);

impl OperationList {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl fmt::Display for OperationList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return writeln!(f, "No operations found.");
        }
        writeln!(f, "| ID | Kind | Cluster | State | Created |")?;
        writeln!(f, "|:-|:-|:-|:-|:-|")?;
        for operation in &self.0 {
            writeln!(
                f,
                "| {} | {} | {} | {} | {} |",
                operation.key.operation_id,
                operation.kind,
                operation.key.cluster_name,
                operation.state,
                LocalDateTime(&operation.created_at)
            )?;
        }
        Ok(())
    }
}

/// Failed probes of a preflight run.
pub struct ProbeList(pub Vec<Probe>);

impl fmt::Display for ProbeList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let failed: Vec<&Probe> = self.0.iter().filter(|probe| probe.is_failed()).collect();
        if failed.is_empty() {
            return writeln!(f, "All checks passed.");
        }
        for probe in failed {
            writeln!(f, "- {probe}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ProbeSeverity;

    #[test]
    fn test_empty_collections() {
        assert_eq!(OperationList(Vec::new()).to_string(), "No operations found.\n");
        assert_eq!(ProbeList(Vec::new()).to_string(), "All checks passed.\n");
    }

    #[test]
    fn test_probe_list() {
        let probes = vec![Probe::failed("etcd-disk", ProbeSeverity::Critical, "slow disk")];
        assert_eq!(
            ProbeList(probes).to_string(),
            "- [critical] etcd-disk: slow disk\n"
        );
    }
}
