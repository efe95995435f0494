//! `pcectl`: run label, workload and raw API calls against a PCE.
//!
//! Credentials and tunables come from `PCE_*` environment variables (see
//! `ClientConfig`). Results are printed as JSON on stdout; failures print
//! `<kind>: <message>` on stderr and exit non-zero.

use std::process::ExitCode;

use anyhow::{anyhow, bail, Context, Result};
use pce_core::{
    ApiError, CancellationReceiver, CancellationToken, ClientConfig, Dispatcher, HttpMethod, HttpResponse,
    PceClient, Request, UnmanagedWorkload, UreqTransport, Volume,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const USAGE: &str = "usage:
  pcectl labels list
  pcectl labels create <key> <value>
  pcectl labels rename <href> <value>
  pcectl workloads list
  pcectl workloads update <href> <json>
  pcectl workloads create-unmanaged <name> <hostname> <ip> [label-href...]
  pcectl workloads assign-labels <ip> <key=value>...
  pcectl call <verb> <resource> [json]";

#[tokio::main]
async fn main() -> ExitCode {
    let config = match ClientConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("config: {e}");
            return ExitCode::from(2);
        }
    };
    init_tracing(&config);

    let args: Vec<String> = std::env::args().skip(1).collect();
    match run(&config, &args).await {
        Ok(output) => {
            println!("{output}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            match e.downcast_ref::<ApiError>() {
                Some(api) => eprintln!("{}: {api}", api.kind()),
                None => eprintln!("{e:#}"),
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(config: &ClientConfig, args: &[String]) -> Result<String> {
    let credential = config.credential();
    let dispatcher = Dispatcher::with_config(UreqTransport::new(), config.dispatch_config());

    let (token, cancel) = CancellationToken::new();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted, cancelling call");
            token.cancel();
        }
    });

    tracing::debug!(
        host = %credential.host(),
        identity = %credential.masked_identity(),
        threshold = config.async_threshold,
        "running command"
    );

    let args: Vec<&str> = args.iter().map(String::as_str).collect();
    match args.as_slice() {
        ["call", verb, resource, rest @ ..] => raw_call(&dispatcher, config, &cancel, verb, resource, rest).await,
        _ => {
            let mut client = PceClient::new(dispatcher).with_cancellation(cancel);
            if let Some(deadline) = config.deadline() {
                client = client.with_call_timeout(deadline);
            }
            resource_command(&client, config, &args).await
        }
    }
}

async fn resource_command(client: &PceClient<UreqTransport>, config: &ClientConfig, args: &[&str]) -> Result<String> {
    let cred = config.credential();
    let output = match args {
        ["labels", "list"] => serde_json::to_string_pretty(&client.list_labels(&cred).await?)?,
        ["labels", "create", key, value] => serde_json::to_string_pretty(&client.create_label(&cred, key, value).await?)?,
        ["labels", "rename", href, value] => {
            client.update_label(&cred, href, value).await?;
            format!("renamed {href}")
        }
        ["workloads", "list"] => serde_json::to_string_pretty(&client.list_workloads(&cred).await?)?,
        ["workloads", "update", href, body] => {
            let payload = serde_json::from_str(body).context("workload update body is not JSON")?;
            client.update_workload(&cred, href, payload).await?;
            format!("updated {href}")
        }
        ["workloads", "create-unmanaged", name, hostname, ip, labels @ ..] => {
            let input = UnmanagedWorkload::new(name, hostname, ip, labels.iter().copied());
            serde_json::to_string_pretty(&client.create_unmanaged_workload(&cred, &input).await?)?
        }
        ["workloads", "assign-labels", ip, pairs @ ..] if !pairs.is_empty() => {
            let labels = parse_label_pairs(pairs)?;
            let assigned = client.assign_labels(&cred, ip, &labels).await?;
            if assigned.is_empty() {
                tracing::warn!(ip, "no workload has this address");
            }
            serde_json::to_string_pretty(&serde_json::json!({ "ip": ip, "assigned": assigned }))?
        }
        _ => bail!("{USAGE}"),
    };
    Ok(output)
}

fn parse_label_pairs<'a>(pairs: &[&'a str]) -> Result<Vec<(&'a str, &'a str)>> {
    pairs
        .iter()
        .map(|&pair| {
            pair.split_once('=')
                .ok_or_else(|| anyhow!("expected key=value, got {pair:?}"))
        })
        .collect()
}

/// Org-scoped call through the dispatcher; GETs probe the collection size.
async fn raw_call(
    dispatcher: &Dispatcher<UreqTransport>,
    config: &ClientConfig,
    cancel: &CancellationReceiver,
    verb: &str,
    resource: &str,
    rest: &[&str],
) -> Result<String> {
    let method = HttpMethod::parse(verb).ok_or_else(|| anyhow!("unknown verb {verb:?}\n{USAGE}"))?;
    let mut request = Request::new(method, resource).in_org().with_volume(Volume::Unknown);
    if let [body] = rest {
        request = request.with_payload(serde_json::from_str(body).context("request body is not JSON")?);
    }
    let cancel = match config.deadline() {
        Some(deadline) => cancel.clone().with_timeout(deadline),
        None => cancel.clone(),
    };
    let response = dispatcher
        .call_with_cancellation(&config.credential(), request, &cancel)
        .await?;
    Ok(render(&response))
}

fn render(response: &HttpResponse) -> String {
    let body = serde_json::from_slice::<serde_json::Value>(&response.body)
        .ok()
        .and_then(|v| serde_json::to_string_pretty(&v).ok())
        .unwrap_or_else(|| response.body_text());
    format!("HTTP {}\n{body}", response.status)
}

fn init_tracing(config: &ClientConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level));

    // Logs go to stderr so stdout stays parseable.
    if config.log_format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().pretty().with_writer(std::io::stderr))
            .init();
    }
}
