use futures_util::future::join_all;
use tracing::info;
use w3bench_race::{Backend, Endpoint, GeoLocator, RemoteShell, discover_target};

use crate::config::Settings;

/// Every endpoint a record of each backend is raced over.
#[derive(Debug, Clone, Default)]
pub struct Topology {
    pub swarm: Vec<Endpoint>,
    pub ipfs: Vec<Endpoint>,
}

impl Topology {
    /// Endpoints from `settings` without remote discovery or locations;
    /// remote-shell-HTTP endpoints target the local hostname.
    pub fn from_settings(settings: &Settings) -> Self {
        let mut swarm = Vec::new();
        swarm.extend(settings.ssh_servers.iter().map(|host| Endpoint::shell_http(Backend::Swarm, host, settings.hostname())));
        swarm.extend(settings.http_servers.iter().map(|gw| Endpoint::http(Backend::Swarm, gw)));
        swarm.extend(settings.tool_servers.iter().map(|host| Endpoint::shell_tool(Backend::Swarm, host)));

        let ipfs = settings.ipfs_servers.iter().map(|gw| Endpoint::http(Backend::Ipfs, gw)).collect();
        Self { swarm, ipfs }
    }

    /// Like [`from_settings`](Self::from_settings), with each control host's
    /// node address discovered remotely and every endpoint geolocated.
    pub async fn discover<S: RemoteShell>(settings: &Settings, shell: &S, geo: &GeoLocator) -> Self {
        let mut topology = Self::from_settings(settings);

        let targets = join_all(
            settings
                .ssh_servers
                .iter()
                .map(|host| discover_target(shell, host, settings.hostname())),
        )
        .await;
        for (endpoint, target) in topology.swarm.iter_mut().zip(targets) {
            endpoint.target = Some(target);
        }

        let all = topology.swarm.iter_mut().chain(topology.ipfs.iter_mut());
        join_all(all.map(|endpoint| async move {
            endpoint.location = geo.locate_address(&endpoint.address).await;
        }))
        .await;

        info!(swarm = topology.swarm.len(), ipfs = topology.ipfs.len(), "endpoints ready");
        topology
    }

    pub fn for_backend(&self, backend: Backend) -> &[Endpoint] {
        match backend {
            Backend::Swarm => &self.swarm,
            Backend::Ipfs => &self.ipfs,
        }
    }
}

#[cfg(test)]
mod tests {
    use w3bench_race::Transport;

    use super::*;

    #[test]
    fn test_endpoints_per_backend() {
        let settings = Settings {
            ssh_servers: vec!["ctl-1".into()],
            http_servers: vec!["gw-1".into(), "gw-2".into()],
            ipfs_servers: vec!["ipfs-1".into()],
            tool_servers: vec!["ctl-2".into()],
            hostname: Some("node.local".into()),
            ..Settings::default()
        };
        let topology = Topology::from_settings(&settings);

        let transports: Vec<_> = topology.swarm.iter().map(|e| e.transport).collect();
        assert_eq!(transports, [
            Transport::RemoteShellHttp,
            Transport::Http,
            Transport::Http,
            Transport::RemoteShellTool
        ]);
        assert_eq!(topology.swarm[0].target.as_deref(), Some("node.local"));
        assert_eq!(topology.for_backend(Backend::Ipfs).len(), 1);
        assert_eq!(topology.ipfs[0].backend, Backend::Ipfs);
    }
}
