// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Implementation of the `topology` command.

use std::path::PathBuf;

use uagate_client::{FileStorage, LocalFileStorage, PersistedTopology};

use crate::cli::{Cli, OutputFormat, TopologyArgs};
use crate::error::{BinError, BinResult};

/// Executes the `topology` command to print the persisted topology.
pub async fn topology(cli: &Cli, args: TopologyArgs) -> BinResult<()> {
    let (root, path) = match &args.file {
        Some(file) => split_file(file)?,
        None => {
            let config = uagate_config::load_config(&cli.config)?;
            (config.storage.root, config.client.persistence_path)
        }
    };

    let display = root.join(&path).display().to_string();
    let unreadable = |source: uagate_client::ClientError| BinError::Topology {
        path: display.clone(),
        source,
    };

    let storage = LocalFileStorage::new(&root);
    let Some(bytes) = storage.load(&path).await.map_err(unreadable)? else {
        eprintln!("No persisted topology at {}", display);
        return Ok(());
    };
    let topology = PersistedTopology::from_json(&bytes).map_err(unreadable)?;

    match args.format {
        OutputFormat::Text => print!("{}", render_text(&topology)),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&topology)?),
    }
    Ok(())
}

fn split_file(file: &std::path::Path) -> BinResult<(PathBuf, String)> {
    let name = file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| BinError::config(format!("Not a file: {}", file.display())))?;
    let root = file
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    Ok((root, name))
}

/// Renders one block per server with an indented line per node.
pub(crate) fn render_text(topology: &PersistedTopology) -> String {
    if topology.is_empty() {
        return "Topology is empty\n".to_string();
    }

    let mut out = format!(
        "{} server(s), {} node(s)\n",
        topology.servers.len(),
        topology.node_count()
    );
    for server in &topology.servers {
        out.push_str(&format!(
            "\n{} [{}{}]\n",
            server.endpoint_url,
            server.opc_authentication_mode,
            if server.encrypted_auth_credential.is_some() { ", credentials stored" } else { "" }
        ));
        for node in &server.opc_nodes {
            let mut flags = Vec::new();
            if node.heartbeat_interval > 0 {
                flags.push(format!("heartbeat {}s", node.heartbeat_interval));
            }
            if node.skip_first {
                flags.push("skip-first".to_string());
            }
            out.push_str(&format!(
                "  {} publishing={}ms sampling={}ms",
                node.id, node.opc_publishing_interval, node.opc_sampling_interval
            ));
            if !node.display_name.is_empty() {
                out.push_str(&format!(" \"{}\"", node.display_name));
            }
            if !flags.is_empty() {
                out.push_str(&format!(" ({})", flags.join(", ")));
            }
            out.push('\n');
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    const SNAPSHOT: &str = r#"[
  {
    "EndpointUrl": "opc.tcp://plant1:4840",
    "OpcAuthenticationMode": "Anonymous",
    "OpcNodes": [
      {
        "Id": "ns=2;s=Temperature",
        "OpcPublishingInterval": 1000,
        "OpcSamplingInterval": 500,
        "DisplayName": "Temperature",
        "HeartbeatInterval": 30,
        "SkipFirst": true
      }
    ]
  }
]"#;

    #[test]
    fn test_render_text() {
        let topology = PersistedTopology::from_json(SNAPSHOT.as_bytes()).unwrap();
        let text = render_text(&topology);
        assert!(text.starts_with("1 server(s), 1 node(s)"));
        assert!(text.contains("opc.tcp://plant1:4840 [Anonymous]"));
        assert!(text.contains(
            "ns=2;s=Temperature publishing=1000ms sampling=500ms \"Temperature\" (heartbeat 30s, skip-first)"
        ));

        assert_eq!(render_text(&PersistedTopology::default()), "Topology is empty\n");
    }

    #[tokio::test]
    async fn test_topology_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("persistency.json");
        std::fs::write(&file, SNAPSHOT).unwrap();

        let file_arg = file.to_string_lossy().into_owned();
        let cli = Cli::parse_from(["uagate", "topology", "--file", file_arg.as_str()]);
        let crate::cli::Commands::Topology(args) = cli.command.clone() else {
            panic!("Expected Topology command");
        };
        topology(&cli, args).await.unwrap();

        let missing = TopologyArgs {
            file: Some(dir.path().join("absent.json")),
            ..TopologyArgs::default()
        };
        topology(&cli, missing).await.unwrap();
    }
}
