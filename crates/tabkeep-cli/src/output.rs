//! Output formatting for CLI
//!
//! Provides consistent output formatting across all commands:
//! - Human-readable default output
//! - JSON output (--json flag)
//! - Quiet mode for scripting (--quiet flag)

use serde::Serialize;

use tabkeep_core::curate::InclusionResult;
use tabkeep_core::views::{GroupKey, View};
use tabkeep_core::{Item, ItemId, Tag, TagsDoc};

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable output (default)
    Human,
    /// JSON output
    Json,
    /// Quiet mode - minimal output
    Quiet,
}

impl OutputFormat {
    /// Create format from CLI flags
    pub fn from_flags(json: bool, quiet: bool) -> Self {
        if quiet {
            OutputFormat::Quiet
        } else if json {
            OutputFormat::Json
        } else {
            OutputFormat::Human
        }
    }
}

/// Output helper for consistent formatting
pub struct Output {
    /// The output format
    pub format: OutputFormat,
}

impl Output {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    pub fn is_json(&self) -> bool {
        matches!(self.format, OutputFormat::Json)
    }

    pub fn is_quiet(&self) -> bool {
        matches!(self.format, OutputFormat::Quiet)
    }

    /// Print any serializable value as pretty JSON
    pub fn json<T: Serialize + ?Sized>(&self, value: &T) {
        match serde_json::to_string_pretty(value) {
            Ok(text) => println!("{}", text),
            Err(e) => eprintln!("Failed to encode output: {}", e),
        }
    }

    /// Print a derived view, one block per group
    pub fn print_view(&self, view: &View, items: &[Item], tags: &TagsDoc) {
        match self.format {
            OutputFormat::Human => {
                let ids = view.item_ids();
                if ids.is_empty() {
                    println!("No items found.");
                    return;
                }
                let show_headers = !matches!(
                    view.groups.as_slice(),
                    [only] if only.key == GroupKey::All
                );
                for group in &view.groups {
                    if show_headers {
                        let label = group_label(&group.key, tags);
                        println!("── {} ({}) ──", label, group.len());
                    }
                    for id in &group.item_ids {
                        if let Some(item) = items.iter().find(|i| &i.id == id) {
                            println!("{}", item_line(item, tags));
                        }
                    }
                    if show_headers {
                        println!();
                    }
                }
                println!("{} item(s)", ids.len());
            }
            OutputFormat::Json => self.json(view),
            OutputFormat::Quiet => {
                for id in view.item_ids() {
                    println!("{}", id);
                }
            }
        }
    }

    /// Print tags with usage counts
    pub fn print_tags(&self, tags: &[(Tag, usize)]) {
        match self.format {
            OutputFormat::Human => {
                for (tag, count) in tags {
                    let mut flags = Vec::new();
                    if tag.favorite {
                        flags.push("favorite");
                    }
                    if tag.is_quick {
                        flags.push("quick");
                    }
                    if tag.is_ai {
                        flags.push("ai");
                    }
                    let flags = if flags.is_empty() {
                        String::new()
                    } else {
                        format!(" [{}]", flags.join(", "))
                    };
                    println!(
                        "{:>4} | {} {}{} ({})",
                        tag.id, tag.color, tag.name, flags, count
                    );
                }
                println!("\n{} tag(s)", tags.len());
            }
            OutputFormat::Json => {
                let json_tags: Vec<_> = tags
                    .iter()
                    .map(|(tag, count)| serde_json::json!({"tag": tag, "count": count}))
                    .collect();
                self.json(&json_tags);
            }
            OutputFormat::Quiet => {
                for (tag, _) in tags {
                    println!("{}", tag.id);
                }
            }
        }
    }

    /// Print the curation queue
    pub fn print_queue(&self, queue: &[InclusionResult], items: &[Item], tags: &TagsDoc) {
        match self.format {
            OutputFormat::Human => {
                if queue.is_empty() {
                    println!("Nothing to curate.");
                    return;
                }
                for result in queue {
                    let Some(item) = items.iter().find(|i| i.id == result.item_id) else {
                        continue;
                    };
                    println!("{}", item_line(item, tags));
                    println!("       {}", reason_labels(result).join(", "));
                }
                println!("\n{} item(s) to curate", queue.len());
            }
            OutputFormat::Json => self.json(queue),
            OutputFormat::Quiet => {
                for result in queue {
                    println!("{}", result.item_id);
                }
            }
        }
    }

    /// Print ids touched by a command
    pub fn print_ids(&self, ids: &[ItemId]) {
        match self.format {
            OutputFormat::Human | OutputFormat::Quiet => {
                for id in ids {
                    println!("{}", id);
                }
            }
            OutputFormat::Json => self.json(ids),
        }
    }

    /// Print a success message
    pub fn success(&self, message: &str) {
        match self.format {
            OutputFormat::Human => println!("✓ {}", message),
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::json!({"status": "success", "message": message})
                );
            }
            OutputFormat::Quiet => {}
        }
    }

    /// Print an informational message
    pub fn message(&self, msg: &str) {
        match self.format {
            OutputFormat::Human => println!("{}", msg),
            OutputFormat::Json => {
                println!("{}", serde_json::json!({"message": msg}));
            }
            OutputFormat::Quiet => {}
        }
    }
}

fn group_label(key: &GroupKey, tags: &TagsDoc) -> String {
    match key {
        GroupKey::All => "All".to_string(),
        GroupKey::Tag(id) => tags
            .get(*id)
            .map(|t| t.name.clone())
            .unwrap_or_else(|| format!("tag {}", id)),
        GroupKey::Window(id) => format!("Window {}", id),
        GroupKey::Domain(domain) => domain.clone(),
        GroupKey::Other => "Other".to_string(),
    }
}

fn item_line(item: &Item, tags: &TagsDoc) -> String {
    let tag_names: Vec<&str> = item
        .tag_ids
        .iter()
        .filter_map(|id| tags.get(*id).map(|t| t.name.as_str()))
        .collect();
    format!(
        "{} | {} | {} | {}",
        short_id(&item.id),
        truncate(&item.title, 35),
        truncate(&item.url, 45),
        tag_names.join(", ")
    )
}

fn reason_labels(result: &InclusionResult) -> Vec<&'static str> {
    let r = &result.reasons;
    [
        (r.manual, "picked"),
        (r.has_unassigned_tag, "untagged"),
        (r.has_quick_tag, "quick tag"),
        (r.has_ai_tag, "ai tag"),
        (r.older_than_threshold, "old"),
    ]
    .into_iter()
    .filter(|(on, _)| *on)
    .map(|(_, label)| label)
    .collect()
}

fn short_id(id: &ItemId) -> String {
    id.as_str().chars().take(8).collect()
}

/// Truncate a string to max length, adding "..." if truncated
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
