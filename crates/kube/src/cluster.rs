//! Cluster connection and namespace discovery.

use k8s_openapi::api::core::v1::Namespace;
use kube::api::ListParams;
use kube::config::KubeConfigOptions;
use kube::{Api, Client, Config};
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Where cluster credentials come from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CredentialMode {
    /// The pod's service account token and CA.
    InCluster,
    /// The local kubeconfig (`KUBECONFIG` or `~/.kube/config`).
    #[default]
    Kubeconfig,
}

impl CredentialMode {
    /// Pick the mode from the `--in-cluster` switch.
    pub const fn from_in_cluster(in_cluster: bool) -> Self {
        if in_cluster {
            Self::InCluster
        } else {
            Self::Kubeconfig
        }
    }
}

/// Connect to the API server with the given credentials.
///
/// # Errors
///
/// Returns [`Error::Credentials`] if the credentials cannot be loaded, or the
/// client error if the connection cannot be set up.
pub async fn connect(mode: CredentialMode) -> Result<Client> {
    let config = match mode {
        CredentialMode::InCluster => {
            Config::incluster().map_err(|e| Error::credentials(e.to_string()))?
        }
        CredentialMode::Kubeconfig => Config::from_kubeconfig(&KubeConfigOptions::default())
            .await
            .map_err(|e| Error::credentials(e.to_string()))?,
    };
    info!(mode = ?mode, cluster = %config.cluster_url, "Connecting to cluster");
    Ok(Client::try_from(config)?)
}

/// List every namespace in the cluster, sorted by name.
///
/// # Errors
///
/// Returns the API error if the namespaces cannot be listed.
pub async fn discover_namespaces(client: Client) -> Result<Vec<String>> {
    let api: Api<Namespace> = Api::all(client);
    let list = api.list(&ListParams::default()).await?;
    let names = namespace_names(list.items);
    debug!(count = names.len(), "Discovered namespaces");
    Ok(names)
}

/// Names of `namespaces`, sorted and without duplicates.
pub fn namespace_names(namespaces: impl IntoIterator<Item = Namespace>) -> Vec<String> {
    let mut names: Vec<String> = namespaces
        .into_iter()
        .filter_map(|ns| ns.metadata.name)
        .collect();
    names.sort();
    names.dedup();
    names
}
