use std::fmt;

/// Pod identity as assigned by the cluster at creation time.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct PodKey {
    pub namespace: String,
    pub name: String,
    pub uid: String,
}

impl fmt::Display for PodKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// The created pod: its identity plus the containers to tail.
#[derive(Clone, Debug)]
pub struct PodHandle {
    pub key: PodKey,
    pub containers: Vec<String>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum PodPhase {
    Pending,
    Running,
    Succeeded,
    Failed,
    Unknown,
}

impl PodPhase {
    pub fn parse(phase: Option<&str>) -> Self {
        match phase {
            Some("Pending") => PodPhase::Pending,
            Some("Running") => PodPhase::Running,
            Some("Succeeded") => PodPhase::Succeeded,
            Some("Failed") => PodPhase::Failed,
            _ => PodPhase::Unknown,
        }
    }
}

impl fmt::Display for PodPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PodPhase::Pending => "Pending",
            PodPhase::Running => "Running",
            PodPhase::Succeeded => "Succeeded",
            PodPhase::Failed => "Failed",
            PodPhase::Unknown => "Unknown",
        };
        f.write_str(s)
    }
}

/// What the gateway reports when asked about a pod.
#[derive(Clone, Debug)]
pub struct PodStatusSummary {
    pub phase: PodPhase,
    pub message: Option<String>,
}

/// Session lifecycle, in order. The coordinator is the only writer.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub enum SessionState {
    Created,
    PodCreating,
    PodReady,
    Active,
    Cancelling,
    PodDeleting,
    Closed,
    /// The pod could not be confirmed deleted.
    ClosedWithWarning,
}

impl SessionState {
    pub fn is_closed(self) -> bool {
        matches!(self, SessionState::Closed | SessionState::ClosedWithWarning)
    }
}
