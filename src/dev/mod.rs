//! A simulated cluster for running sessions without one.

mod cluster;
mod forwarder;

pub use cluster::DevCluster;
pub use forwarder::DevForwarder;

/// Which failure, if any, the simulated cluster injects.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum DevFault {
    #[default]
    None,
    /// The pod never leaves `Pending`.
    NotReady,
    /// Every tunnel fails shortly after it starts.
    Forward,
    /// Every delete attempt fails.
    Delete,
}
