use dinerlight::{ClientConfig, DeviceStatus, HistoryEntry, Schedule, StoreSnapshot};

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S UTC";

pub fn print_config(config: &ClientConfig) {
    println!(
        "api_url={}, restaurant_id={}, timeout_secs={}",
        config.base_url(),
        config.restaurant_id,
        config.timeout_secs
    );
}

pub fn print_status(snapshot: &StoreSnapshot) {
    match &snapshot.status {
        Some(status) => println!("{}", status_line(status)),
        None => println!("restaurant={}, state=unknown", snapshot.restaurant_id),
    }
    if let Some(err) = &snapshot.error {
        println!("error={}", err);
    }
}

/// Newest first, as the backend returns it.
pub fn print_history(history: &[HistoryEntry], limit: Option<usize>) {
    if history.is_empty() {
        println!("No events yet. Toggle the light to see history.");
        return;
    }
    let shown = limit.unwrap_or(history.len());
    for entry in history.iter().take(shown) {
        println!("{}", history_line(entry));
    }
    if history.len() > shown {
        println!("... {} older event(s)", history.len() - shown);
    }
}

pub fn print_schedule(schedule: Option<&Schedule>) {
    let Some(schedule) = schedule else {
        println!("No schedule configured yet");
        return;
    };
    if let Some(device) = &schedule.device_id {
        println!("device={}", device);
    }
    for (index, rule) in schedule.rules.iter().enumerate() {
        println!(
            "rule[{}]: days={}, on={}, off={}, enabled={}",
            index,
            rule.days.join(","),
            rule.start_time,
            rule.end_time,
            rule.enabled
        );
    }
    println!("{}", schedule_summary(schedule));
}

/// Redraw for `watch`; marks which parts moved since the previous frame.
pub fn print_watch_frame(previous: Option<&StoreSnapshot>, current: &StoreSnapshot) {
    if let Some(previous) = previous {
        if previous.status != current.status {
            println!("* status changed");
        }
        if previous.schedule != current.schedule {
            match &current.schedule {
                Some(schedule) => println!("* schedule updated ({})", schedule_summary(schedule)),
                None => println!("* schedule removed"),
            }
        }
        if previous.history.first() != current.history.first() {
            println!("* new activity");
        }
    }
    print_status(current);
    print_history(&current.history, Some(3));
    print_schedule(current.schedule.as_ref());
    println!();
}

fn status_line(status: &DeviceStatus) -> String {
    let updated = status
        .last_updated_at()
        .map(|at| at.format(TIME_FORMAT).to_string())
        .unwrap_or_else(|| status.last_updated.clone());
    format!(
        "restaurant={}, state={}, brightness={}, last_updated={}",
        status.restaurant_id, status.state, status.brightness, updated
    )
}

fn history_line(entry: &HistoryEntry) -> String {
    let when = entry
        .recorded_at()
        .map(|at| at.format(TIME_FORMAT).to_string())
        .unwrap_or_else(|| entry.timestamp.clone());
    format!(
        "[{}] {} ({}) id={}",
        when,
        entry.kind(),
        entry.action,
        entry.id
    )
}

fn schedule_summary(schedule: &Schedule) -> String {
    if schedule.rules.is_empty() {
        return "Schedule has no rules".to_string();
    }
    let enabled: Vec<String> = schedule
        .enabled_rules()
        .map(|rule| {
            format!(
                "{} {}-{}",
                rule.days.join(","),
                rule.start_time,
                rule.end_time
            )
        })
        .collect();
    if enabled.is_empty() {
        return format!("all {} rule(s) disabled", schedule.rules.len());
    }
    format!(
        "{} of {} rule(s) enabled: {}",
        enabled.len(),
        schedule.rules.len(),
        enabled.join("; ")
    )
}
