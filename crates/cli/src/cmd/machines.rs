use std::collections::BTreeMap;

use anyhow::{Context, Result};

use hpcstack_lib::config::{Component, Config, Pmix, machines, resolve_machine};

use crate::output::{print_heading, print_json, symbols};

pub fn cmd_machines(json: bool) -> Result<()> {
  let configs = machines()
    .into_iter()
    .map(|name| resolve_machine(name).map(|config| (name, config)))
    .collect::<Result<BTreeMap<_, _>, _>>()
    .context("Failed to load built-in machines")?;

  if json {
    return print_json(&configs);
  }

  print_heading(&format!(
    "{:<10} {:<8} {:<12} {:<6} {:<9} {:<6} {:<7} {}",
    "MACHINE", "ARCH", "MARCH", "GPU", "OS", "CUDA", "OMPI", "NETWORK"
  ));
  for (name, config) in &configs {
    println!(
      "{:<10} {:<8} {:<12} {:<6} {:<9} {:<6} {:<7} {}",
      name,
      config.arch,
      config.march,
      config.sm_arch(),
      config.base_os,
      config.cuda_version,
      config.network_stack.ompi,
      network_summary(config)
    );
  }
  Ok(())
}

/// `ucx 1.18.0, pmix internal, gdrcopy` style one-liner.
fn network_summary(config: &Config) -> String {
  let net = &config.network_stack;
  let mut parts = vec![format!("ucx {}", net.ucx)];
  parts.push(match &net.pmix {
    Pmix::Internal => "pmix internal".to_string(),
    Pmix::Version(v) => format!("pmix {v}"),
  });
  for (name, component) in [("knem", &net.knem), ("xpmem", &net.xpmem), ("gdrcopy", &net.gdrcopy)] {
    match component {
      Component::Disabled => {}
      Component::Default => parts.push(name.to_string()),
      Component::Version(v) => parts.push(format!("{name} {v}")),
    }
  }
  format!("{} {}", symbols::INFO, parts.join(", "))
}
