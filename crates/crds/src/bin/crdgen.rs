//! Prints the ClusterPolicy CRD as YAML.

use crds::ClusterPolicy;
use kube::CustomResourceExt;

fn main() -> Result<(), serde_yaml::Error> {
    print!("{}", serde_yaml::to_string(&ClusterPolicy::crd())?);
    Ok(())
}
