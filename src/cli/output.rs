use chrono::NaiveDate;
use serde::Serialize;
use unicode_width::UnicodeWidthStr;

use crate::model::config::DisplayConfig;
use crate::model::item::PresentationItem;
use crate::model::task::{SubTask, Task};
use crate::store::repository::format_deadline;
use crate::sync::differ::DiffOp;
use crate::sync::pipeline::ListState;

// ---------------------------------------------------------------------------
// JSON output structs
// ---------------------------------------------------------------------------

#[derive(Serialize)]
pub struct TaskJson {
    pub id: Option<String>,
    pub title: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
    pub completed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deadline: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub subtasks: Vec<SubTaskJson>,
}

#[derive(Serialize)]
pub struct SubTaskJson {
    pub index: usize,
    pub id: Option<String>,
    pub title: String,
    pub completed: bool,
}

/// One date group of the task list. `date` is absent for the no-deadline group.
#[derive(Serialize)]
pub struct SectionJson {
    pub date: Option<String>,
    pub tasks: Vec<TaskJson>,
}

/// `list --json` output. `state` is `"no_data"` when signed out or the
/// store is unavailable, so it never reads as an empty list.
#[derive(Serialize)]
pub struct ListJson {
    pub state: &'static str,
    pub sections: Vec<SectionJson>,
}

// ---------------------------------------------------------------------------
// Conversions
// ---------------------------------------------------------------------------

pub fn task_to_json(task: &Task, subtasks: &[SubTask]) -> TaskJson {
    TaskJson {
        id: task.id.clone(),
        title: task.title.clone(),
        description: task.description.clone(),
        completed: task.completed,
        deadline: task.deadline.as_ref().map(format_deadline),
        subtasks: subtasks
            .iter()
            .enumerate()
            .map(|(index, s)| SubTaskJson {
                index,
                id: s.id.clone(),
                title: s.title.clone(),
                completed: s.completed,
            })
            .collect(),
    }
}

pub fn sections_to_json(items: &[PresentationItem], show_completed: bool) -> Vec<SectionJson> {
    group(items, show_completed)
        .into_iter()
        .map(|(date, tasks)| SectionJson {
            date: date.map(|d| d.format("%Y-%m-%d").to_string()),
            tasks: tasks.into_iter().map(|t| task_to_json(t, &[])).collect(),
        })
        .collect()
}

pub fn list_to_json(state: &ListState, show_completed: bool) -> ListJson {
    let state_name = match state {
        ListState::Loading => "loading",
        ListState::NoData => "no_data",
        ListState::Items(_) => "ready",
    };
    ListJson {
        state: state_name,
        sections: sections_to_json(state.items(), show_completed),
    }
}

// ---------------------------------------------------------------------------
// Human-readable formatting
// ---------------------------------------------------------------------------

/// Pad `s` with spaces to `width` terminal cells
fn pad_to_width(s: &str, width: usize) -> String {
    let w = UnicodeWidthStr::width(s);
    if w >= width {
        s.to_string()
    } else {
        format!("{}{}", s, " ".repeat(width - w))
    }
}

fn check_char(completed: bool) -> char {
    if completed { 'x' } else { ' ' }
}

pub fn format_separator(date: Option<NaiveDate>, display: &DisplayConfig) -> String {
    match date {
        Some(d) => format!("-- {} --", d.format(&display.date_format)),
        None => "-- No deadline --".to_string(),
    }
}

/// Format a task row, padding the ID and title columns to the given widths
pub fn format_task_row(task: &Task, display: &DisplayConfig, id_width: usize, title_width: usize) -> String {
    let id = task.id.as_deref().unwrap_or("-");
    let time = task
        .deadline
        .map(|d| d.format(&display.time_format).to_string())
        .unwrap_or_default();
    let line = format!(
        "[{}] {} {}  {}",
        check_char(task.completed),
        pad_to_width(id, id_width),
        pad_to_width(&task.title, title_width),
        time
    );
    line.trim_end().to_string()
}

pub fn format_item(item: &PresentationItem, display: &DisplayConfig) -> String {
    match item {
        PresentationItem::DateSeparator { date } => format_separator(*date, display),
        PresentationItem::TaskRow { task } => format_task_row(task, display, 0, 0),
    }
}

/// Split a presentation sequence into its date groups, optionally without
/// completed tasks. Groups left empty are dropped.
fn group(items: &[PresentationItem], show_completed: bool) -> Vec<(Option<NaiveDate>, Vec<&Task>)> {
    let mut groups: Vec<(Option<NaiveDate>, Vec<&Task>)> = Vec::new();
    for item in items {
        match item {
            PresentationItem::DateSeparator { date } => groups.push((*date, Vec::new())),
            PresentationItem::TaskRow { task } => {
                if groups.is_empty() {
                    groups.push((task.deadline.map(|d| d.date()), Vec::new()));
                }
                if (show_completed || !task.completed)
                    && let Some((_, tasks)) = groups.last_mut()
                {
                    tasks.push(task);
                }
            }
        }
    }
    groups.retain(|(_, tasks)| !tasks.is_empty());
    groups
}

/// Render the task list with aligned columns
pub fn format_task_list(items: &[PresentationItem], display: &DisplayConfig) -> Vec<String> {
    let groups = group(items, display.show_completed);
    let rows = groups.iter().flat_map(|(_, tasks)| tasks.iter());
    let (id_width, title_width) = rows.fold((0, 0), |(iw, tw), task| {
        (
            iw.max(task.id.as_deref().map_or(1, UnicodeWidthStr::width)),
            tw.max(UnicodeWidthStr::width(task.title.as_str())),
        )
    });

    let mut lines = Vec::new();
    for (i, (date, tasks)) in groups.iter().enumerate() {
        if i > 0 {
            lines.push(String::new());
        }
        lines.push(format_separator(*date, display));
        for task in tasks {
            lines.push(format_task_row(task, display, id_width, title_width));
        }
    }
    lines
}

/// One line per diff operation, as printed by `tm watch`
pub fn format_op(op: &DiffOp, display: &DisplayConfig) -> String {
    match op {
        DiffOp::Insert { index, item } => format!("+{} {}", index, format_item(item, display)),
        DiffOp::Remove { index } => format!("-{}", index),
        DiffOp::Update { index, item } => format!("~{} {}", index, format_item(item, display)),
    }
}

pub fn format_subtasks(subtasks: &[SubTask]) -> Vec<String> {
    let width = subtasks.len().saturating_sub(1).to_string().len();
    subtasks
        .iter()
        .enumerate()
        .map(|(i, s)| format!("{:>width$} [{}] {}", i, check_char(s.completed), s.title))
        .collect()
}

/// Format detailed task view
pub fn format_task_detail(task: &Task, subtasks: &[SubTask], display: &DisplayConfig) -> Vec<String> {
    let mut lines = vec![format!(
        "[{}] {} {}",
        check_char(task.completed),
        task.id.as_deref().unwrap_or("-"),
        task.title
    )];
    if let Some(deadline) = task.deadline {
        lines.push(format!(
            "deadline: {} {}",
            deadline.format(&display.date_format),
            deadline.format(&display.time_format)
        ));
    }

    if !task.description.is_empty() {
        lines.push("description:".to_string());
        for line in task.description.lines() {
            lines.push(format!("  {}", line));
        }
    }

    if !subtasks.is_empty() {
        lines.push(String::new());
        lines.push("subtasks:".to_string());
        for line in format_subtasks(subtasks) {
            lines.push(format!("  {}", line));
        }
    }
    lines
}
