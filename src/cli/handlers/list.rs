use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::cli::commands::{IdArg, ListArgs, WatchArgs};
use crate::cli::output::{format_op, format_task_detail, format_task_list, list_to_json, task_to_json};
use crate::io::config_io::{read_config, session_from_config};
use crate::io::watcher::{WorkspaceEvent, WorkspaceWatcher};
use crate::model::config::DisplayConfig;
use crate::store::session::SessionCell;
use crate::sync::editor::EditMode;
use crate::sync::pipeline::{ListObserver, ListRefresh, ListState, TaskListPipeline};
use crate::sync::scheduler::{MainQueue, Schedulers, ThreadScheduler};

use super::Context;

fn schedulers(queue: &MainQueue) -> Schedulers {
    Schedulers::new(
        Arc::new(ThreadScheduler::new("tm-sectioner")),
        Arc::new(queue.handle()),
    )
}

/// Run the pipeline until it has something to show, then stop it.
fn load_list(ctx: &Context, all: bool) -> Result<ListState, Box<dyn std::error::Error>> {
    let queue = MainQueue::new();
    let latest = Arc::new(Mutex::new(ListState::Loading));
    let sink = latest.clone();
    let observer: Arc<dyn ListObserver> = Arc::new(move |r: &ListRefresh| {
        *sink.lock().unwrap_or_else(|e| e.into_inner()) = r.state.clone();
    });

    let mut pipeline = TaskListPipeline::new(ctx.store.clone(), schedulers(&queue), observer);
    if all {
        pipeline.start_unscoped();
    } else {
        pipeline.start(Arc::new(SessionCell::new(ctx.session())));
    }

    let current = || latest.lock().unwrap_or_else(|e| e.into_inner()).clone();
    let timeout = Duration::from_millis(ctx.config.sync.first_snapshot_timeout_ms);
    let loaded = queue.run_until(timeout, || current() != ListState::Loading);
    pipeline.stop();

    if !loaded {
        return Err(format!("no task list after {}ms", timeout.as_millis()).into());
    }
    Ok(current())
}

pub fn cmd_list(args: ListArgs, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let ctx = Context::load()?;
    let state = load_list(&ctx, args.all)?;
    let display = &ctx.config.display;

    if json {
        let listing = list_to_json(&state, display.show_completed);
        println!("{}", serde_json::to_string_pretty(&listing)?);
        return Ok(());
    }

    match state {
        ListState::NoData => println!("Not signed in (run `tm login <user>`)"),
        _ => {
            let lines = format_task_list(state.items(), display);
            if lines.is_empty() {
                println!("No tasks");
            }
            for line in &lines {
                println!("{}", line);
            }
        }
    }
    Ok(())
}

pub fn cmd_show(args: IdArg, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let ctx = Context::load()?;
    let editor = ctx.open(&args.id, EditMode::View)?;
    let task = editor.task();
    let subtasks = editor.subtasks();

    if json {
        println!("{}", serde_json::to_string_pretty(&task_to_json(&task, &subtasks))?);
    } else {
        for line in format_task_detail(&task, &subtasks, &ctx.config.display) {
            println!("{}", line);
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Watch
// ---------------------------------------------------------------------------

fn print_refresh(refresh: &ListRefresh, display: &DisplayConfig, json: bool) {
    if json {
        match serde_json::to_string(&refresh.ops) {
            Ok(line) => println!("{}", line),
            Err(e) => warn!("could not serialize changes: {}", e),
        }
        return;
    }
    for op in &refresh.ops {
        println!("{}", format_op(op, display));
    }
    if refresh.state == ListState::NoData {
        println!("(signed out)");
    }
}

pub fn cmd_watch(args: WatchArgs, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let ctx = Context::load()?;
    let watcher = WorkspaceWatcher::start(&ctx.workspace.dir())?;

    let queue = MainQueue::new();
    let display = ctx.config.display.clone();
    let observer: Arc<dyn ListObserver> =
        Arc::new(move |r: &ListRefresh| print_refresh(r, &display, json));
    let sessions = Arc::new(SessionCell::new(ctx.session()));

    let mut pipeline = TaskListPipeline::new(ctx.store.clone(), schedulers(&queue), observer);
    if args.all {
        pipeline.start_unscoped();
    } else {
        pipeline.start(sessions.clone());
    }
    info!(workspace = %ctx.workspace.root.display(), "watching");

    let stop_at = args.duration_ms.map(|ms| Instant::now() + Duration::from_millis(ms));
    loop {
        queue.run_pending();
        if let Some(at) = stop_at
            && Instant::now() >= at
        {
            break;
        }

        for event in watcher.wait(Duration::from_millis(50)) {
            match event {
                WorkspaceEvent::StoreChanged => match ctx.workspace.load_store() {
                    Ok(data) => ctx.store.replace_data(data),
                    Err(e) => warn!("could not reload store: {}", e),
                },
                WorkspaceEvent::ConfigChanged => match read_config(&ctx.workspace) {
                    Ok((config, _)) => sessions.set(session_from_config(&config)),
                    Err(e) => warn!("could not reload config: {}", e),
                },
            }
        }
    }

    pipeline.stop();
    Ok(())
}
