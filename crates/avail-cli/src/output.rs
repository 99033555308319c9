//! Terminal formatting for protocol results.

use avail_core::{AvailabilityEvent, AvailabilitySlot, AvailabilityStatus, Professional};
use chrono::{DateTime, Utc};
use colored::{ColoredString, Colorize};

pub fn status_label(status: AvailabilityStatus) -> ColoredString {
    let text = status.as_str();
    match status {
        AvailabilityStatus::Available => text.green(),
        AvailabilityStatus::Busy => text.yellow(),
        AvailabilityStatus::Offline => text.dimmed(),
        AvailabilityStatus::Emergency => text.red().bold(),
    }
}

fn timestamp(at: &DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M:%S").to_string()
}

pub fn professional_line(p: &Professional) -> String {
    format!(
        "{} {} {} {}",
        p.id.as_str().cyan(),
        p.name,
        format!("[{}]", p.profession).dimmed(),
        status_label(p.status)
    )
}

pub fn professional_detail(p: &Professional) -> String {
    format!(
        "{}\n  {} {}\n  {} {}\n  {} {}\n  {} {}",
        p.name.bold(),
        "Id:".dimmed(),
        p.id,
        "Profession:".dimmed(),
        p.profession,
        "Status:".dimmed(),
        status_label(p.status),
        "Since:".dimmed(),
        timestamp(&p.changed_at)
    )
}

pub fn event_line(e: &AvailabilityEvent) -> String {
    format!(
        "{} {} {} {} -> {} {}",
        format!("#{}", e.sequence).dimmed(),
        timestamp(&e.timestamp),
        e.professional_id.as_str().cyan(),
        status_label(e.previous_status),
        status_label(e.new_status),
        format!("({})", e.reason).dimmed()
    )
}

pub fn slot_line(s: &AvailabilitySlot) -> String {
    format!(
        "{} {} .. {} {}",
        s.id.to_string().dimmed(),
        timestamp(&s.start),
        timestamp(&s.end),
        status_label(s.status)
    )
}
