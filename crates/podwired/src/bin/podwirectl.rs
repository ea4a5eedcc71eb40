//! podwirectl - send remote CNI requests to podwired by hand.

use std::collections::HashMap;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use podwired::grpc::cni_proto::remote_cni_client::RemoteCniClient;
use podwired::grpc::cni_proto::{CniReply, CniRequest};
use serde_json::{Value, json};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Address of the podwired gRPC service
    #[arg(long, env = "PODWIRE_GRPC_ADDR", default_value = "127.0.0.1:9111")]
    address: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Attach a network namespace
    Add(RequestArgs),
    /// Detach a network namespace
    Del(RequestArgs),
}

#[derive(Args, Debug)]
struct RequestArgs {
    /// Container ID
    #[arg(long)]
    container_id: String,

    /// Interface name inside the namespace
    #[arg(long, default_value = "eth0")]
    ifname: String,

    /// Network namespace path
    #[arg(long)]
    netns: String,

    /// CNI version sent with the request
    #[arg(long, default_value = "0.3.1")]
    cni_version: String,

    /// Extra arguments as KEY=VALUE
    #[arg(long = "arg", value_parser = parse_key_value)]
    args: Vec<(String, String)>,
}

impl RequestArgs {
    fn into_request(self) -> CniRequest {
        CniRequest {
            version: self.cni_version,
            container_id: self.container_id,
            interface_name: self.ifname,
            network_namespace: self.netns,
            extra_arguments: self.args.into_iter().collect::<HashMap<_, _>>(),
            ..CniRequest::default()
        }
    }
}

fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected KEY=VALUE, got {raw}"))
}

fn reply_json(reply: &CniReply) -> Value {
    json!({
        "result": reply.result,
        "error": reply.error,
        "interfaces": reply.interfaces.iter().map(|iface| json!({
            "name": iface.name,
            "mac": iface.mac,
            "sandbox": iface.sandbox,
            "ips": iface.ip_addresses.iter().map(|ip| json!({
                "version": if ip.version == 0 { "4" } else { "6" },
                "address": ip.address,
                "gateway": ip.gateway,
            })).collect::<Vec<_>>(),
        })).collect::<Vec<_>>(),
        "routes": reply.routes.iter().map(|r| json!({ "dst": r.dst, "gw": r.gw })).collect::<Vec<_>>(),
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut client = RemoteCniClient::connect(format!("http://{}", cli.address))
        .await
        .with_context(|| format!("connecting to {}", cli.address))?;

    let reply = match cli.command {
        Command::Add(args) => client.add(args.into_request()).await?,
        Command::Del(args) => client.delete(args.into_request()).await?,
    }
    .into_inner();

    println!("{}", serde_json::to_string_pretty(&reply_json(&reply))?);

    if reply.result != 0 {
        anyhow::bail!("request failed: {}", reply.error);
    }
    Ok(())
}
