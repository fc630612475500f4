//! Built-in machine table.

use super::types::{Component, Config, NetworkStack, Pmix};

/// Names of the built-in machines, sorted.
pub const MACHINES: &[&str] = &["leonardo", "thea"];

/// Look up a built-in machine configuration by name.
pub fn machine(name: &str) -> Option<Config> {
  match name {
    "leonardo" => Some(leonardo()),
    "thea" => Some(thea()),
    _ => None,
  }
}

/// Leonardo booster partition: x86 hosts with A100 GPUs.
fn leonardo() -> Config {
  Config {
    arch: "x86_64".to_string(),
    march: "skylake".to_string(),
    cuda_arch: "80".to_string(),
    base_image: "nvidia/cuda".to_string(),
    base_os: "ubuntu22".to_string(),
    cuda_version: "12.6".to_string(),
    tag_devel: "12.6.3-devel-ubuntu22.04".to_string(),
    digest_devel: "sha256:1608a19a5d6f013d36abfb9ad50a42b4c0ef86f4ab48e351c6899f0280b946c1".to_string(),
    tag_runtime: "12.6.3-runtime-ubuntu22.04".to_string(),
    digest_runtime: "sha256:4cf7f8137bdeeb099b1f2de126e505aa1f01b6e4471d13faf93727a9bf83d539".to_string(),
    network_stack: NetworkStack {
      mlnx_ofed: "5.8-2.0.3.0".to_string(),
      knem: Component::Default,
      xpmem: Component::Default,
      gdrcopy: Component::Disabled,
      ucx: "1.13.1".to_string(),
      pmix: Pmix::Version("3.1.5".to_string()),
      ompi: "4.1.6".to_string(),
    },
  }
}

/// Grace Hopper GH200 nodes.
fn thea() -> Config {
  Config {
    arch: "aarch64".to_string(),
    march: "neoverse_v2".to_string(),
    cuda_arch: "90".to_string(),
    base_image: "nvidia/cuda".to_string(),
    base_os: "ubuntu22".to_string(),
    cuda_version: "12.6".to_string(),
    tag_devel: "12.6.3-devel-ubuntu22.04".to_string(),
    digest_devel: "sha256:12cf7fda869f87f821113f010ee64b3a230a3fed2a56fb6d3c93fb8a82472816".to_string(),
    tag_runtime: "12.6.3-runtime-ubuntu22.04".to_string(),
    digest_runtime: "sha256:77e5fa9d1849bdba5a340be90d8ca30fb13d8f62fb433b1fa9d2903bb7a68498".to_string(),
    network_stack: NetworkStack {
      mlnx_ofed: "24.04-0.7.0.0".to_string(),
      knem: Component::Default,
      xpmem: Component::Default,
      gdrcopy: Component::Default,
      ucx: "1.18.0".to_string(),
      pmix: Pmix::Internal,
      ompi: "5.0.3".to_string(),
    },
  }
}
