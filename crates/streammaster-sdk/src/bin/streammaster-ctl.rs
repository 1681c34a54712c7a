// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! StreamMaster Control CLI
//!
//! CLI tool for poking a StreamMaster backend over its hub and REST API.
//!
//! Usage:
//!   streammaster-ctl <command> [options]
//!
//! Commands:
//!   status                        Connect to the hub and report the state
//!   invoke <method> [json...]     Invoke a hub method
//!   fetch <method> [json...]      Run a catalog operation over REST
//!   watch                         Print hub events until Ctrl-C

use std::process::ExitCode;

use anyhow::{Context, bail};
use serde_json::Value;
use streammaster_sdk::{OperationExecutor, SdkConfig, StreamMasterSdk};
use tracing::warn;

fn print_usage() {
    eprintln!(
        r#"Usage: streammaster-ctl <command> [options]

Talk to a StreamMaster backend.

COMMANDS:
    status                          Connect to the hub and report the state
    invoke <method> [json...]       Invoke a hub method with JSON arguments
    fetch <method> [json...]        Run a catalog operation over REST only
    watch                           Print hub events and entity changes until Ctrl-C

ARGUMENTS:
    Each argument after the method is parsed as JSON; anything that is not
    valid JSON is passed as a string.

ENVIRONMENT:
    STREAMMASTER_BASE_URL           Backend URL, e.g. http://127.0.0.1:7095 (required)
    STREAMMASTER_HUB_PATH           Hub path (default: hub)
    STREAMMASTER_API_KEY            API key sent as x-api-key
    STREAMMASTER_CONNECT_TIMEOUT_MS Connection timeout (default: 10000)
    RUST_LOG                        Log filter (default: streammaster_sdk=warn)

EXAMPLES:
    streammaster-ctl status
    streammaster-ctl invoke GetPagedM3UFiles '{{"pageNumber":1,"pageSize":10}}'
    streammaster-ctl fetch GetSettings
    streammaster-ctl watch
"#
    );
}

#[derive(Debug, PartialEq)]
enum Command {
    Status,
    Invoke { method: String, args: Vec<Value> },
    Fetch { method: String, args: Vec<Value> },
    Watch,
}

fn parse_args() -> Result<Command, String> {
    let args: Vec<String> = std::env::args().collect();
    parse_args_from_vec(&args)
}

fn parse_args_from_vec(args: &[String]) -> Result<Command, String> {
    if args.len() < 2 {
        return Err("No command specified".to_string());
    }

    match args[1].as_str() {
        "help" | "--help" | "-h" => {
            print_usage();
            std::process::exit(0);
        }
        "status" => Ok(Command::Status),
        "watch" => Ok(Command::Watch),
        "invoke" => {
            let method = args.get(2).ok_or("Method name required")?.clone();
            Ok(Command::Invoke {
                method,
                args: parse_json_args(&args[3..]),
            })
        }
        "fetch" => {
            let method = args.get(2).ok_or("Method name required")?.clone();
            Ok(Command::Fetch {
                method,
                args: parse_json_args(&args[3..]),
            })
        }
        cmd => Err(format!("Unknown command: {}", cmd)),
    }
}

fn parse_json_args(raw: &[String]) -> Vec<Value> {
    raw.iter()
        .map(|arg| serde_json::from_str(arg).unwrap_or_else(|_| Value::String(arg.clone())))
        .collect()
}

fn print_json(value: &Value) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn execute_command(sdk: &StreamMasterSdk, cmd: Command) -> anyhow::Result<()> {
    match cmd {
        Command::Status => {
            let hub_url = sdk.config().hub_url()?;
            match sdk.connect().await {
                Ok(()) => println!("{}: {}", hub_url, sdk.state()),
                Err(e) => bail!("{}: {} ({})", hub_url, sdk.state(), e),
            }
        }

        Command::Invoke { method, args } => {
            sdk.connect().await.context("hub unavailable")?;
            let result = sdk.session().invoke(&method, args).await?;
            print_json(&result)?;
        }

        Command::Fetch { method, args } => {
            let result = sdk.http().execute(&method, args).await?;
            print_json(&result)?;
        }

        Command::Watch => {
            let session = sdk.session();
            session.add_message_listener(|n| {
                println!("message   {:?} {} {}", n.severity, n.summary, n.detail.as_deref().unwrap_or(""))
            });
            session.add_data_refresh_listener(|entities| println!("refresh   {}", entities.join(", ")));
            session.add_set_field_listener(|patches| {
                for p in patches {
                    println!("set-field {}[{}].{} = {}", p.entity, p.id, p.field, p.value);
                }
            });
            session.add_clear_by_tag_listener(|c| println!("clear     {} tag={}", c.entity, c.tag));
            session.add_logout_listener(|_| println!("logout"));
            session.add_entity_changed_listener(|entity| println!("changed   {}", entity));

            let mut state = session.subscribe_state();
            sdk.start();
            println!("state     {}", *state.borrow_and_update());

            loop {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => break,
                    changed = state.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        println!("state     {}", *state.borrow_and_update());
                    }
                }
            }
            sdk.close();
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "streammaster_sdk=warn".into()),
        )
        .init();

    if let Err(e) = dotenvy::dotenv() {
        warn!("No .env file loaded: {}", e);
    }

    let cmd = match parse_args() {
        Ok(cmd) => cmd,
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!();
            print_usage();
            return ExitCode::FAILURE;
        }
    };

    let config = match SdkConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let sdk = match StreamMasterSdk::new(config) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Failed to create SDK: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match execute_command(&sdk, cmd).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
