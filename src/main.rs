use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, BufReader};

use tunnelswitch_lib::commands::{self, profiles, system, AppState};
use tunnelswitch_lib::config;
use tunnelswitch_lib::controller::Controller;
use tunnelswitch_lib::core::{Profile, ProfileKey, Provider, RuleMode};
use tunnelswitch_lib::drivers::DriverRegistry;
use tunnelswitch_lib::network::{NmcliSource, SnapshotSource};
use tunnelswitch_lib::notify::LogNotifier;
use tunnelswitch_lib::services::BackgroundServices;
use tunnelswitch_lib::Storage;

#[derive(Parser, Debug)]
#[command(name = "tunnelswitch", version, about = "Pick and start a VPN tunnel for the current network")]
struct Cli {
    /// SQLite database holding profiles and settings.
    #[arg(long, global = true)]
    db: Option<PathBuf>,
    /// Keep everything in memory (nothing is saved).
    #[arg(long, global = true, conflicts_with = "db")]
    memory: bool,
    /// Print results as JSON.
    #[arg(long, global = true)]
    json: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Watch the network and switch tunnels until `quit` or Ctrl-C.
    /// Reads `reload`, `toggle`, and `quit` lines from stdin.
    Run {
        #[arg(long, default_value_t = config::NETWORK_POLL_INTERVAL_MS)]
        poll_ms: u64,
    },
    /// List profiles, enabled first.
    List,
    /// Show one profile.
    Show { id: ProfileKey },
    /// Create a profile.
    Add(ProfileArgs),
    /// Replace a profile definition, keeping its enabled flag.
    Edit {
        id: ProfileKey,
        #[command(flatten)]
        profile: ProfileArgs,
    },
    Remove { id: ProfileKey },
    /// Flip a profile between enabled and disabled.
    Enable { id: ProfileKey },
    /// Show which profile would be selected now, without touching tunnels.
    Check,
    /// Show or hide the connected notification with its toggle action.
    SetNotifications {
        #[arg(value_name = "on|off")]
        state: String,
    },
    /// Delay between stopping tunnels and starting the selected one.
    SetSettleDelay { ms: u64 },
    /// Print current settings.
    Settings,
}

#[derive(Args, Debug)]
struct ProfileArgs {
    #[arg(long)]
    name: String,
    /// wireguard, openvpn-profile, openvpn-as, ics-openvpn
    #[arg(long)]
    provider: Provider,
    /// Tunnel name as the provider knows it.
    #[arg(long)]
    tunnel: String,
    /// none, all, some
    #[arg(long, default_value = "none")]
    wifi: RuleMode,
    #[arg(long, default_value = "none")]
    mobile: RuleMode,
    /// Comma separated SSIDs.
    #[arg(long, default_value = "")]
    ssid_include: String,
    #[arg(long, default_value = "")]
    ssid_exclude: String,
    /// Comma separated carrier names.
    #[arg(long, default_value = "")]
    carrier_include: String,
    #[arg(long, default_value = "")]
    carrier_exclude: String,
    #[arg(long, default_value_t = 1, allow_hyphen_values = true)]
    priority: i64,
}

impl ProfileArgs {
    fn into_profile(self) -> Profile {
        let mut profile = Profile::new(self.name, self.provider, self.tunnel);
        profile.wifi_rule = self.wifi;
        profile.mobile_rule = self.mobile;
        profile.ssid_include = commands::parse_name_list(&self.ssid_include);
        profile.ssid_exclude = commands::parse_name_list(&self.ssid_exclude);
        profile.carrier_include = commands::parse_name_list(&self.carrier_include);
        profile.carrier_exclude = commands::parse_name_list(&self.carrier_exclude);
        profile.priority = self.priority;
        profile
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    tunnelswitch_lib::init_logging();

    let storage = if cli.memory {
        Storage::in_memory()
    } else {
        let path = cli.db.clone().unwrap_or_else(tunnelswitch_lib::default_database_path);
        Storage::open(&path)?
    };
    let source: Arc<dyn SnapshotSource> = Arc::new(NmcliSource::new());
    let state = AppState {
        repository: storage.repository,
        settings: storage.settings,
        source,
        controller: None,
    };

    match cli.command {
        Command::Run { poll_ms } => run(state, Duration::from_millis(poll_ms), cli.json).await?,
        Command::List => {
            let entries = profiles::list_profiles(&state)?;
            if cli.json {
                print_json(&entries)?;
            } else if entries.is_empty() {
                println!("No profiles.");
            } else {
                for entry in &entries {
                    let p = &entry.profile;
                    println!(
                        "#{:<4} {:<3} {:<24} {:<22} tunnel={} prio={} wifi={} mobile={}",
                        entry.key,
                        if p.enabled { "on" } else { "off" },
                        p.name,
                        p.provider.label(),
                        p.tunnel_name,
                        p.priority,
                        p.wifi_rule,
                        p.mobile_rule
                    );
                }
            }
        }
        Command::Show { id } => print_json(&profiles::get_profile(&state, id)?)?,
        Command::Add(args) => {
            let key = profiles::save_profile(&state, None, args.into_profile())?;
            println!("Created profile #{key}");
        }
        Command::Edit { id, profile } => {
            profiles::save_profile(&state, Some(id), profile.into_profile())?;
            println!("Updated profile #{id}");
        }
        Command::Remove { id } => {
            profiles::delete_profile(&state, id)?;
            println!("Removed profile #{id}");
        }
        Command::Enable { id } => {
            let enabled = profiles::toggle_profile_enabled(&state, id)?;
            println!("Profile #{id} {}", if enabled { "enabled" } else { "disabled" });
        }
        Command::Check => {
            let report = system::dry_run_check(&state).await?;
            if cli.json {
                print_json(&report)?;
            } else {
                match &report.selected {
                    Some(entry) => println!(
                        "Would activate #{} '{}' ({} {})",
                        entry.key,
                        entry.profile.name,
                        entry.profile.provider.label(),
                        entry.profile.tunnel_name
                    ),
                    None => println!("No profile matches the current network"),
                }
                for command in &report.commands {
                    println!(
                        "  {} {} '{}'",
                        if command.up { "start" } else { "stop " },
                        command.provider,
                        command.tunnel_name
                    );
                }
            }
        }
        Command::SetNotifications { state: switch } => {
            let enabled = commands::parse_switch(&switch)?;
            system::set_show_toggle_notification(&state, enabled)?;
            println!("Notifications {}", if enabled { "on" } else { "off" });
        }
        Command::SetSettleDelay { ms } => system::set_settle_delay(&state, ms)?,
        Command::Settings => print_json(&system::get_settings(&state)?)?,
    }

    Ok(())
}

async fn run(mut state: AppState, poll_interval: Duration, json: bool) -> Result<()> {
    let controller = Controller::new(
        Arc::clone(&state.repository),
        Arc::clone(&state.settings),
        Arc::clone(&state.source),
        DriverRegistry::with_command_drivers(),
        Arc::new(LogNotifier),
    );
    let services = BackgroundServices::start(controller, Arc::clone(&state.source), poll_interval)?;
    state.controller = Some(services.handle().clone());
    tracing::info!("tunnelswitch running; commands: reload, toggle, quit");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => break,
        };
        let Some(line) = line else { break };

        let outcome = match line.trim() {
            "" => continue,
            "reload" | "check" => system::check_now(&state).await,
            "toggle" => system::toggle_override(&state).await,
            "quit" | "exit" => break,
            other => {
                eprintln!("Unknown command '{other}' (expected reload, toggle, quit)");
                continue;
            }
        };
        match outcome {
            Ok(outcome) if json => print_json(&outcome)?,
            Ok(outcome) => println!("{outcome:?}"),
            Err(e) => eprintln!("error ({}): {e}", e.kind()),
        }
    }

    services.shutdown().await;
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
