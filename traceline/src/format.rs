use colored::Colorize;
use std::fmt::Write;
use time::macros::format_description;
use time::UtcOffset;
use tracery::types::{Event, Profile, User, UserSummary};

/// The event date in UTC, or the raw string if it is not RFC 3339.
pub fn event_date(event: &Event) -> String {
    event
        .parsed_date()
        .and_then(|date| {
            date.to_offset(UtcOffset::UTC)
                .format(format_description!(
                    "[year]-[month]-[day] [hour]:[minute] UTC"
                ))
                .ok()
        })
        .unwrap_or_else(|| event.date.clone())
}

pub fn user_line(user: &UserSummary) -> String {
    format!(
        "{:>5}  {:16} {} <{}>",
        user.id,
        user.nickname.bold(),
        user.full_name(),
        user.email.dimmed()
    )
}

pub fn event_line(event: &Event, joined: bool) -> String {
    let marker = if joined { "✓" } else { " " };
    let line = format!(
        "{marker} {:>5}  {:24} {}  @ {}",
        event.id,
        event.title,
        event_date(event),
        event.location
    );
    if joined {
        line.green().to_string()
    } else {
        line
    }
}

fn push_section(output: &mut String, title: &str, lines: &[String], limit: usize) {
    let _ = writeln!(output, "{}", title.underline());
    if lines.is_empty() {
        let _ = writeln!(output, "  {}", "(none)".dimmed());
        return;
    }
    for line in lines.iter().take(limit) {
        let _ = writeln!(output, "  {line}");
    }
    if lines.len() > limit {
        let _ = writeln!(output, "  {}", format!("... {} more", lines.len() - limit).dimmed());
    }
}

pub fn profile(profile: &Profile, limit: usize) -> String {
    let mut output = format!(
        "{} ({} {}) <{}>\n",
        profile.nickname.bold(),
        profile.first_name,
        profile.last_name,
        profile.email
    );
    let friends: Vec<_> = profile.friends.iter().map(user_line).collect();
    let events: Vec<_> = profile
        .events
        .iter()
        .map(|event| event_line(event, true))
        .collect();
    push_section(&mut output, "Friends", &friends, limit);
    push_section(&mut output, "Events", &events, limit);
    output
}

pub fn user(user: &User, is_friend: bool, limit: usize) -> String {
    let badge = if is_friend {
        " [friend]".green().to_string()
    } else {
        String::new()
    };
    let mut output = format!(
        "{} ({} {}) <{}>{badge}\n",
        user.nickname.bold(),
        user.first_name,
        user.last_name,
        user.email
    );
    let friends: Vec<_> = user.friends.iter().map(user_line).collect();
    push_section(&mut output, "Friends", &friends, limit);
    output
}

pub fn event(event: &Event, joined: bool, limit: usize) -> String {
    let mut output = format!("{}\n", event.title.bold());
    let _ = writeln!(output, "  when:  {}", event_date(event));
    let _ = writeln!(output, "  where: {}", event.location);
    if joined {
        let _ = writeln!(output, "  {}", "you are going".green());
    }
    if !event.description.trim().is_empty() {
        let _ = writeln!(output, "\n{}\n", event.description.trim());
    }
    let participants: Vec<_> = event.users.iter().map(user_line).collect();
    push_section(&mut output, "Participants", &participants, limit);
    output
}

/// Search results split the way the friends panel shows them.
pub fn user_search(profile: &Profile, users: &[UserSummary], limit: usize) -> String {
    let (friends, potential) = profile.partition_search(users);
    let friends: Vec<_> = friends.into_iter().map(user_line).collect();
    let potential: Vec<_> = potential.into_iter().map(user_line).collect();
    let mut output = String::new();
    push_section(&mut output, "Friends", &friends, limit);
    push_section(&mut output, "Potential friends", &potential, limit);
    output
}

pub fn event_search(profile: &Profile, events: &[Event], limit: usize) -> String {
    let lines: Vec<_> = events
        .iter()
        .map(|event| event_line(event, profile.has_joined(event.id)))
        .collect();
    let mut output = String::new();
    push_section(&mut output, "Events", &lines, limit);
    output
}
