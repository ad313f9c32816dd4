mod render;

use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use dinerlight::{ClientConfig, LightingStore, ScheduleRule, StoreEvent, StoreSnapshot};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "dinerlight", version, about = "Restaurant lighting control client")]
struct Cli {
    /// Backend base URL (overrides config file and DINERLIGHT_API_URL)
    #[arg(long, global = true)]
    api_url: Option<String>,
    /// Restaurant to control (overrides config file and DINERLIGHT_RESTAURANT_ID)
    #[arg(long, global = true)]
    restaurant_id: Option<i64>,
    /// Print JSON instead of text
    #[arg(long, global = true, default_value_t = false)]
    json: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show the current light state and the latest history entries
    Status,
    /// Show the light history, newest first
    History {
        /// Only show the newest N entries
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Flip the light; the backend decides the new state
    Toggle,
    /// Set the single daily on/off schedule
    Schedule {
        /// On time, HH:MM (24h)
        #[arg(long)]
        on: String,
        /// Off time, HH:MM (24h)
        #[arg(long)]
        off: String,
    },
    /// Replace the full day-specific schedule
    ScheduleSet {
        /// DAYS=HH:MM-HH:MM, optionally suffixed with /off (repeat for multiple)
        /// e.g. MON,TUES,WED=18:00-23:30 or SUN=18:00-22:00/off
        #[arg(long = "rule", required = true, value_parser = parse_rule)]
        rules: Vec<ScheduleRule>,
    },
    /// Show the full day-specific schedule
    ScheduleShow,
    /// Poll status, history and schedule until interrupted
    Watch {
        /// Seconds between polls
        #[arg(long, default_value_t = 2)]
        interval: u64,
    },
    /// Show the effective configuration
    ConfigShow,
    /// Persist settings to the config file
    ConfigSet {
        #[arg(long)]
        api_url: Option<String>,
        #[arg(long)]
        restaurant_id: Option<i64>,
        /// Request timeout in seconds
        #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
        timeout: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let json = cli.json;

    match cli.command {
        Command::ConfigShow => {
            let path = ClientConfig::default_path()?;
            let config = effective_config(cli.api_url, cli.restaurant_id)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&config)?);
            } else {
                println!("config_file={}", path.display());
                render::print_config(&config);
            }
            return Ok(());
        }
        Command::ConfigSet {
            api_url,
            restaurant_id,
            timeout,
        } => {
            let path = ClientConfig::default_path()?;
            let config = ClientConfig::load_from(&path)?;
            let config = apply_config_set(config, api_url, restaurant_id, timeout)?;
            config.save_to(&path)?;
            println!("Saved config to {}", path.display());
            return Ok(());
        }
        _ => {}
    }

    let config = effective_config(cli.api_url, cli.restaurant_id)?;
    let store = LightingStore::from_config(&config)?;
    let result = run(&store, cli.command, json).await;
    store.close();
    result
}

fn apply_config_set(
    mut config: ClientConfig,
    api_url: Option<String>,
    restaurant_id: Option<i64>,
    timeout: Option<u64>,
) -> Result<ClientConfig> {
    if api_url.is_none() && restaurant_id.is_none() && timeout.is_none() {
        bail!("config-set requires at least one of --api-url, --restaurant-id, --timeout");
    }
    if let Some(url) = api_url {
        config.api_base_url = url;
    }
    if let Some(id) = restaurant_id {
        config.restaurant_id = id;
    }
    if let Some(secs) = timeout {
        config.timeout_secs = secs;
    }
    config.validate()?;
    Ok(config)
}

fn effective_config(api_url: Option<String>, restaurant_id: Option<i64>) -> Result<ClientConfig> {
    let mut config = ClientConfig::load()?;
    if let Some(url) = api_url {
        config.api_base_url = url;
    }
    if let Some(id) = restaurant_id {
        config.restaurant_id = id;
    }
    debug!("Effective config: {:?}", config);
    Ok(config)
}

async fn run(store: &LightingStore, command: Command, json: bool) -> Result<()> {
    match command {
        Command::Status => {
            store.initialize().await;
            if let Some(err) = store.error() {
                bail!(err);
            }
            let snapshot = store.snapshot();
            if json {
                print_json(&snapshot)?;
            } else {
                render::print_status(&snapshot);
                render::print_history(&snapshot.history, Some(5));
            }
        }
        Command::History { limit } => {
            let history = store.refresh_history().await?;
            if json {
                let shown = &history[..limit.unwrap_or(history.len()).min(history.len())];
                print_json(&shown)?;
            } else {
                render::print_history(&history, limit);
            }
        }
        Command::Toggle => {
            let status = store.toggle_light().await?;
            if json {
                print_json(&status)?;
            } else {
                println!("Light is now {}", status.state);
                render::print_status(&store.snapshot());
            }
        }
        Command::Schedule { on, off } => {
            let status = store
                .save_schedule(&on, &off)
                .await
                .context("Failed to save schedule")?;
            if json {
                print_json(&status)?;
            } else {
                println!("Backend schedule updated ({} -> {})", on, off);
            }
        }
        Command::ScheduleSet { rules } => {
            let schedule = store
                .save_full_schedule(rules)
                .await
                .context("Failed to save full schedule")?;
            if json {
                print_json(&schedule)?;
            } else {
                println!("Saved {} schedule rule(s)", schedule.rules.len());
                render::print_schedule(Some(&schedule));
            }
        }
        Command::ScheduleShow => {
            let schedule = store.load_full_schedule().await;
            if json {
                print_json(&schedule)?;
            } else {
                render::print_schedule(schedule.as_ref());
            }
        }
        Command::Watch { interval } => {
            watch(store, Duration::from_secs(interval.max(1)), json).await?;
        }
        Command::ConfigShow | Command::ConfigSet { .. } => {}
    }
    Ok(())
}

/// Polls the backend on an interval and redraws whenever the store settles
/// with a different snapshot than the last one drawn.
async fn watch(store: &LightingStore, interval: Duration, json: bool) -> Result<()> {
    let events = store.subscribe();
    let poller = tokio::spawn({
        let store = store.clone();
        async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let (status, history, _) = tokio::join!(
                    store.refresh_status(),
                    store.refresh_history(),
                    store.load_full_schedule(),
                );
                // Refreshes leave an earlier failure in place; a clean poll dismisses it.
                if status.is_ok() && history.is_ok() {
                    store.clear_error();
                }
            }
        }
    });
    println!(
        "Watching restaurant {} every {}s. Press Ctrl+C to stop.",
        store.restaurant_id(),
        interval.as_secs()
    );

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut drawn: Option<StoreSnapshot> = None;
    loop {
        tokio::select! {
            event = events.recv_async() => match event {
                Ok(StoreEvent::Closed) | Err(_) => break,
                Ok(event) => debug!("Store event: {:?}", event),
            },
            _ = &mut ctrl_c => {
                println!("Monitoring stopped");
                break;
            }
        }
        if store.loading() {
            continue;
        }
        let snapshot = store.snapshot();
        if drawn.as_ref() == Some(&snapshot) {
            continue;
        }
        if json {
            print_json(&snapshot)?;
        } else {
            render::print_watch_frame(drawn.as_ref(), &snapshot);
        }
        drawn = Some(snapshot);
    }

    poller.abort();
    Ok(())
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn parse_rule(raw: &str) -> Result<ScheduleRule, String> {
    let (days, times) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected DAYS=HH:MM-HH:MM, got '{}'", raw))?;
    let (times, enabled) = match times.strip_suffix("/off") {
        Some(times) => (times, false),
        None => (times, true),
    };
    let (start, end) = times
        .split_once('-')
        .ok_or_else(|| format!("expected HH:MM-HH:MM, got '{}'", times))?;
    let days: Vec<String> = days
        .split(',')
        .map(|day| day.trim().to_ascii_uppercase())
        .filter(|day| !day.is_empty())
        .collect();
    if days.is_empty() {
        return Err(format!("rule '{}' names no days", raw));
    }
    let mut rule = ScheduleRule::new(days, start.trim(), end.trim());
    rule.enabled = enabled;
    Ok(rule)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_rule_reads_days_and_times() {
        let rule = parse_rule("mon, tues,WED=18:00-23:30").unwrap();
        assert_eq!(rule.days, vec!["MON", "TUES", "WED"]);
        assert_eq!(rule.start_time, "18:00");
        assert_eq!(rule.end_time, "23:30");
        assert!(rule.enabled);
    }

    #[test]
    fn parse_rule_off_suffix_disables() {
        let rule = parse_rule("SUN=18:00-22:00/off").unwrap();
        assert!(!rule.enabled);
        assert_eq!(rule.end_time, "22:00");
    }

    #[test]
    fn parse_rule_rejects_malformed_input() {
        assert!(parse_rule("MON 18:00-23:30").is_err());
        assert!(parse_rule("MON=18:00").is_err());
        assert!(parse_rule(",=18:00-23:30").is_err());
    }

    #[test]
    fn cli_parses_repeated_rules() {
        let cli = Cli::try_parse_from([
            "dinerlight",
            "schedule-set",
            "--rule",
            "MON,TUES=18:00-23:30",
            "--rule",
            "SAT=10:00-22:00/off",
        ])
        .unwrap();
        match cli.command {
            Command::ScheduleSet { rules } => assert_eq!(rules.len(), 2),
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn config_set_rejects_zero_timeout() {
        assert!(Cli::try_parse_from(["dinerlight", "config-set", "--timeout", "0"]).is_err());

        let result = apply_config_set(ClientConfig::default(), None, None, Some(0));
        assert!(result.is_err());
    }

    #[test]
    fn config_set_applies_given_fields_only() {
        let config = apply_config_set(
            ClientConfig::default(),
            Some("http://10.0.0.5:8000".into()),
            None,
            Some(3),
        )
        .unwrap();
        assert_eq!(config.api_base_url, "http://10.0.0.5:8000");
        assert_eq!(config.restaurant_id, 1);
        assert_eq!(config.timeout_secs, 3);

        assert!(apply_config_set(ClientConfig::default(), None, None, None).is_err());
    }

    #[test]
    fn global_flags_follow_subcommand() {
        let cli = Cli::try_parse_from(["dinerlight", "status", "--restaurant-id", "4", "--json"])
            .unwrap();
        assert_eq!(cli.restaurant_id, Some(4));
        assert!(cli.json);
    }
}
