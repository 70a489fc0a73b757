use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{Container, Pod, PodSpec, ResourceRequirements};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

use crate::errors::AppResult;
use crate::session::SessionOption;

pub const GENERATE_NAME: &str = "kubectl-external-forward-";
pub const CONTAINER_NAME: &str = "envoy";

/// A bare pod blocks cluster autoscaler scale-down unless marked safe to evict.
pub const SAFE_TO_EVICT_ANNOTATION: &str = "cluster-autoscaler.kubernetes.io/safe-to-evict";

const CPU_REQUEST: &str = "10m";
const MEMORY_REQUEST: &str = "10Mi";

/// Describe the proxy pod for `option`. The name is left to the cluster.
pub fn build(option: &SessionOption) -> AppResult<Pod> {
    let config = crate::envoy::generate(&option.tunnels)?;

    let requests = BTreeMap::from([
        ("cpu".to_string(), Quantity(CPU_REQUEST.to_string())),
        ("memory".to_string(), Quantity(MEMORY_REQUEST.to_string())),
    ]);

    let container = Container {
        name: CONTAINER_NAME.to_string(),
        image: Some(option.pod_image.clone()),
        args: Some(vec!["--config-yaml".to_string(), config]),
        resources: Some(ResourceRequirements {
            requests: Some(requests),
            ..Default::default()
        }),
        ..Default::default()
    };

    Ok(Pod {
        metadata: ObjectMeta {
            generate_name: Some(GENERATE_NAME.to_string()),
            annotations: Some(BTreeMap::from([(
                SAFE_TO_EVICT_ANNOTATION.to_string(),
                "true".to_string(),
            )])),
            ..Default::default()
        },
        spec: Some(PodSpec {
            containers: vec![container],
            ..Default::default()
        }),
        ..Default::default()
    })
}
