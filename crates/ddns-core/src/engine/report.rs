//! Outcome of one update pass

use crate::traits::IpVersion;

/// What happened to one provider/family push
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushStatus {
    /// The provider answered with an accepted body
    Accepted,
    /// The provider answered, but not with an accepted body
    Rejected {
        /// The observed response body
        body: String,
    },
    /// The request could not be built, sent or read
    Failed {
        /// Error description
        error: String,
    },
    /// The provider has no request shape for this family
    Unsupported,
}

impl PushStatus {
    /// Whether this push counts as a failure
    pub fn is_failure(&self) -> bool {
        matches!(self, PushStatus::Rejected { .. } | PushStatus::Failed { .. })
    }
}

/// One provider/family entry of a [`PassReport`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushOutcome {
    /// Provider name
    pub provider: String,
    /// Address family
    pub version: IpVersion,
    /// Result of the push
    pub status: PushStatus,
}

/// Summary of one update pass
///
/// Failures recorded here have already been logged; the report exists for
/// callers that want to inspect a one-shot pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassReport {
    /// Resolved IPv4 address, if that family was configured and resolved
    pub ipv4: Option<String>,
    /// Resolved IPv6 address, if that family was configured and resolved
    pub ipv6: Option<String>,
    /// Push outcomes in provider order
    pub outcomes: Vec<PushOutcome>,
}

impl PassReport {
    /// Resolved address for `version`
    pub fn address(&self, version: IpVersion) -> Option<&str> {
        match version {
            IpVersion::V4 => self.ipv4.as_deref(),
            IpVersion::V6 => self.ipv6.as_deref(),
        }
    }

    /// Outcome for one provider/family, if it was attempted
    pub fn outcome(&self, provider: &str, version: IpVersion) -> Option<&PushStatus> {
        self.outcomes
            .iter()
            .find(|outcome| outcome.provider == provider && outcome.version == version)
            .map(|outcome| &outcome.status)
    }

    /// Failed or rejected pushes
    pub fn failures(&self) -> impl Iterator<Item = &PushOutcome> {
        self.outcomes.iter().filter(|outcome| outcome.status.is_failure())
    }

    /// Number of accepted pushes
    pub fn accepted_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|outcome| outcome.status == PushStatus::Accepted)
            .count()
    }
}
