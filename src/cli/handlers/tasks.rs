use std::sync::Arc;

use crate::cli::commands::*;
use crate::cli::output::{format_subtasks, task_to_json};
use crate::sync::editor::{EditMode, TaskEditor};
use crate::sync::scheduler::Immediate;

use super::{Context, now, parse_deadline_arg};

pub fn cmd_add(args: AddArgs, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let ctx = Context::load()?;
    let user = ctx.require_user()?;
    if args.title.trim().is_empty() {
        return Err("title cannot be empty".into());
    }

    let editor = TaskEditor::open(ctx.store.clone(), Arc::new(Immediate), None, EditMode::Edit);
    editor.set_title(args.title.trim())?;
    if let Some(description) = args.description {
        editor.set_description(description)?;
    }
    if let Some(deadline) = args.deadline {
        editor.set_deadline(parse_deadline_arg(&deadline)?, now())?;
    }
    let id = editor.save(&user)?;
    ctx.persist()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&task_to_json(&editor.task(), &[]))?);
    } else {
        println!("{}", id);
    }
    Ok(())
}

pub fn cmd_edit(args: EditArgs) -> Result<(), Box<dyn std::error::Error>> {
    let ctx = Context::load()?;
    let user = ctx.require_user()?;
    let editor = ctx.open(&args.id, EditMode::Edit)?;

    if let Some(title) = args.title {
        if title.trim().is_empty() {
            return Err("title cannot be empty".into());
        }
        editor.set_title(title.trim())?;
    }
    if let Some(description) = args.description {
        editor.set_description(description)?;
    }
    if let Some(deadline) = args.deadline {
        editor.set_deadline(parse_deadline_arg(&deadline)?, now())?;
    }
    if args.no_deadline {
        editor.clear_deadline()?;
    }
    editor.save(&user)?;
    ctx.persist()?;
    println!("Updated {}", args.id);
    Ok(())
}

pub fn cmd_done(args: DoneArgs) -> Result<(), Box<dyn std::error::Error>> {
    let ctx = Context::load()?;
    let user = ctx.require_user()?;
    let editor = ctx.open(&args.id, EditMode::Edit)?;
    editor.set_completed(!args.undo)?;
    editor.save(&user)?;
    ctx.persist()?;
    let title = editor.task().title;
    if args.undo {
        println!("{} [ ] {}", args.id, title);
    } else {
        println!("{} [x] {}", args.id, title);
    }
    Ok(())
}

pub fn cmd_rm(args: IdArg) -> Result<(), Box<dyn std::error::Error>> {
    let ctx = Context::load()?;
    let editor = ctx.open(&args.id, EditMode::Edit)?;
    editor.delete_task()?;
    ctx.persist()?;
    println!("Deleted {}", args.id);
    Ok(())
}

// ---------------------------------------------------------------------------
// Subtasks
// ---------------------------------------------------------------------------

fn check_index(editor: &TaskEditor, index: usize) -> Result<(), Box<dyn std::error::Error>> {
    let len = editor.subtasks().len();
    if index >= len {
        return Err(format!("no subtask at index {} (task has {})", index, len).into());
    }
    Ok(())
}

fn sub_list(ctx: &Context, id: &str, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let editor = ctx.open(id, EditMode::View)?;
    let subtasks = editor.subtasks();
    if json {
        let task = task_to_json(&editor.task(), &subtasks);
        println!("{}", serde_json::to_string_pretty(&task.subtasks)?);
    } else {
        for line in format_subtasks(&subtasks) {
            println!("{}", line);
        }
    }
    Ok(())
}

/// Open `id` for editing, apply `change`, then save and persist.
fn edit_subtasks(
    ctx: &Context,
    id: &str,
    change: impl FnOnce(&TaskEditor) -> Result<String, Box<dyn std::error::Error>>,
) -> Result<(), Box<dyn std::error::Error>> {
    let user = ctx.require_user()?;
    let editor = ctx.open(id, EditMode::Edit)?;
    let message = change(&editor)?;
    editor.save(&user)?;
    ctx.persist()?;
    println!("{}: {}", id, message);
    Ok(())
}

pub fn cmd_sub(args: SubCmd, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let ctx = Context::load()?;
    match args.action {
        SubAction::List(a) => sub_list(&ctx, &a.id, json),
        SubAction::Add(a) => edit_subtasks(&ctx, &a.id, |editor| {
            editor.add_subtask(a.title.trim())?;
            Ok(format!("Added subtask {}", editor.subtasks().len() - 1))
        }),
        SubAction::Done(a) => edit_subtasks(&ctx, &a.id, |editor| {
            check_index(editor, a.index)?;
            editor.set_subtask_completed(a.index, !a.undo)?;
            let state = if a.undo { "not done" } else { "done" };
            Ok(format!("Subtask {} marked {}", a.index, state))
        }),
        SubAction::Title(a) => edit_subtasks(&ctx, &a.id, |editor| {
            check_index(editor, a.index)?;
            editor.set_subtask_title(a.index, a.title.trim())?;
            Ok(format!("Subtask {} renamed", a.index))
        }),
        SubAction::Rm(a) => edit_subtasks(&ctx, &a.id, |editor| {
            check_index(editor, a.index)?;
            editor.remove_subtask(a.index)?;
            Ok(format!("Removed subtask {}", a.index))
        }),
    }
}
