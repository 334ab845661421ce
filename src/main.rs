use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::interval;

use chadwall::backends::BackendInfo;
use chadwall::backends::firewall::detect_firewall_backends;
use chadwall::backends::interface::detect_interface_backends;
use chadwall::backends::process::socket_mapper::detect_socket_mappers;
use chadwall::{Config, CoreHandle, Scheduler, format_rate};

/// ChadWall - per-process network monitor with a firewall block button
#[derive(Parser, Debug)]
#[command(name = "chadwall")]
#[command(version)]
#[command(about = "Network monitor and blocker - like NetLimiter but chad", long_about = None)]
struct Args {
    /// Config file to use instead of the per-user one
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,

    /// Interface to sample (default: first wired/wireless interface that is up)
    #[arg(long, value_name = "NAME", global = true)]
    interface: Option<String>,

    /// Socket mapper backend to use
    #[arg(long, value_name = "BACKEND", global = true)]
    socket_mapper: Option<String>,

    /// Firewall backend to use
    #[arg(long, value_name = "BACKEND", global = true)]
    firewall_backend: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print interface, per-application and connection activity (default)
    Watch {
        /// Stop after this many refreshes (default: until Ctrl+C)
        #[arg(long, value_name = "N")]
        ticks: Option<u64>,

        /// Applications to show per refresh
        #[arg(long, value_name = "N", default_value_t = 10)]
        top: usize,
    },
    /// List processes currently blocked by the firewall
    Blocked,
    /// Block all traffic for the executable behind a PID
    Block {
        #[arg(long, value_name = "PID")]
        pid: i32,

        /// Name used for the rules (default: the process name)
        #[arg(long, value_name = "NAME")]
        name: Option<String>,
    },
    /// Remove the block rules for a process name
    Unblock {
        #[arg(value_name = "NAME")]
        name: String,
    },
    /// Remove every block rule this tool created
    UnblockAll,
    /// Kill a process
    Kill {
        #[arg(long, value_name = "PID")]
        pid: i32,
    },
    /// List all backends and whether they work here
    ListBackends,
}

fn print_backend_list(title: &str, backends: &[BackendInfo]) {
    println!("{}:", title);
    if backends.is_empty() {
        println!("  (none compiled in)");
    }
    for backend in backends {
        let status = if backend.available {
            "✅ available"
        } else {
            "❌ unavailable"
        };
        println!(
            "  {:20} [priority: {:?}] {}",
            backend.name, backend.priority, status
        );
    }
    println!();
}

fn print_available_backends() {
    println!("ChadWall v{} - Available Backends\n", env!("CARGO_PKG_VERSION"));
    print_backend_list("Socket Mappers", &detect_socket_mappers());
    print_backend_list("Interface Backends", &detect_interface_backends());
    print_backend_list("Firewall Backends", &detect_firewall_backends());
}

fn load_config(args: &Args) -> Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    if args.interface.is_some() {
        config.preferred_interface = args.interface.clone();
    }
    if args.socket_mapper.is_some() {
        config.preferred_socket_mapper = args.socket_mapper.clone();
    }
    if args.firewall_backend.is_some() {
        config.preferred_firewall_backend = args.firewall_backend.clone();
    }

    Ok(config)
}

fn print_snapshot(handle: &CoreHandle, top: usize) {
    let sample = handle.interface_sample();
    let summary = handle.summary();
    println!(
        "[{}] {}  ↓ {}  ↑ {}  |  {} apps, {} processes",
        sample.sampled_at.format("%H:%M:%S"),
        sample.interface.as_deref().unwrap_or("no interface"),
        format_rate(sample.download_bytes_per_sec),
        format_rate(sample.upload_bytes_per_sec),
        summary.apps,
        summary.processes
    );

    let mut groups = handle.groups();
    groups.sort_by(|a, b| {
        (b.total_download + b.total_upload).total_cmp(&(a.total_download + a.total_upload))
    });
    for group in groups.iter().take(top) {
        let blocked = if handle.is_blocked(&group.name) {
            " [blocked]"
        } else {
            ""
        };
        println!(
            "  {:24} x{:<3} ↓ {:>12}  ↑ {:>12}{}",
            group.name,
            group.instance_count(),
            format_rate(group.total_download),
            format_rate(group.total_upload),
            blocked
        );
    }

    for entry in handle.connections().iter().take(top) {
        println!(
            "  PID {:<7} {:24} {} connections",
            entry.pid,
            entry.name,
            entry.connection_count()
        );
        for connection in &entry.connections {
            println!("      {}", connection.display_text());
        }
    }
    println!();
}

async fn run_watch(config: &Config, ticks: Option<u64>, top: usize) -> Result<()> {
    let (scheduler, handle) = Scheduler::from_config(config)?;
    handle.list_blocked().await?;

    let mut ticker = interval(Duration::from_millis(config.sample_interval_ms.max(1)));
    // The first tick fires immediately and would print an empty table
    ticker.tick().await;

    let mut printed = 0;
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                print_snapshot(&handle, top);
                printed += 1;
                if ticks.is_some_and(|limit| printed >= limit) {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                println!("\n🛑 Received Ctrl+C, stopping...");
                break;
            }
        }
    }

    scheduler.shutdown();
    Ok(())
}

async fn run_command(args: &Args) -> Result<()> {
    let config = load_config(args)?;

    let command = match &args.command {
        Some(command) => command,
        None => {
            return run_watch(&config, None, 10).await;
        }
    };

    match command {
        Command::Watch { ticks, top } => run_watch(&config, *ticks, *top).await,
        Command::ListBackends => {
            print_available_backends();
            Ok(())
        }
        Command::Blocked => {
            let handle = CoreHandle::from_config(&config);
            let blocked = handle.list_blocked().await?;
            if blocked.is_empty() {
                println!("No processes blocked");
            }
            for name in blocked {
                println!("{}", name);
            }
            Ok(())
        }
        Command::Block { pid, name } => {
            let handle = CoreHandle::from_config(&config);
            let name = match name {
                Some(name) => name.clone(),
                None => handle
                    .process_name(*pid)
                    .await
                    .with_context(|| format!("No process with PID {}", pid))?,
            };
            handle.block(&name, *pid).await?;
            println!("✅ Blocked {} (PID {})", name, pid);
            Ok(())
        }
        Command::Unblock { name } => {
            let handle = CoreHandle::from_config(&config);
            handle.unblock(name).await?;
            println!("✅ Unblocked {}", name);
            Ok(())
        }
        Command::UnblockAll => {
            let handle = CoreHandle::from_config(&config);
            let summary = handle.unblock_all().await?;
            for name in &summary.succeeded {
                println!("✅ Unblocked {}", name);
            }
            for name in &summary.failed {
                println!("❌ Failed to unblock {}", name);
            }
            if !summary.failed.is_empty() {
                anyhow::bail!("{} processes could not be unblocked", summary.failed.len());
            }
            Ok(())
        }
        Command::Kill { pid } => {
            let handle = CoreHandle::from_config(&config);
            handle.kill_process(*pid).await?;
            println!("Killed PID {}", pid);
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    if std::env::var("RUST_LOG").is_ok() {
        pretty_env_logger::formatted_builder()
            .parse_default_env()
            .init();
    }

    if let Err(e) = run_command(&args).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
