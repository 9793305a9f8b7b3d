use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use client_core::{ControllerEvent, GenerateOutcome, ScanOutcome, ViewController, ViewSnapshot};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::{broadcast, oneshot},
};
use tracing::{debug, warn};

use crate::render;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Upload(PathBuf),
    /// 1-based position in the story list.
    Generate(usize),
    Back,
    Reset,
    History,
    Show,
    Help,
    Quit,
}

pub const HELP: &str = "\
commands:
  upload <path>   scan a package.json
  generate <n>    make a comic from story n
  back            return to the story list
  reset           start over
  history         list past scans
  show            redraw the current screen
  quit";

pub fn parse_command(line: &str) -> Result<Command, String> {
    let line = line.trim();
    let (verb, rest) = line
        .split_once(char::is_whitespace)
        .map(|(verb, rest)| (verb, rest.trim()))
        .unwrap_or((line, ""));

    match verb.to_ascii_lowercase().as_str() {
        "upload" | "scan" if !rest.is_empty() => Ok(Command::Upload(PathBuf::from(rest))),
        "upload" | "scan" => Err("usage: upload <path>".into()),
        "generate" | "g" => rest
            .parse::<usize>()
            .ok()
            .filter(|n| *n > 0)
            .map(Command::Generate)
            .ok_or_else(|| "usage: generate <n> (n from the story list)".to_string()),
        "back" | "b" => Ok(Command::Back),
        "reset" | "start-over" => Ok(Command::Reset),
        "history" => Ok(Command::History),
        "show" | "" => Ok(Command::Show),
        "help" | "?" => Ok(Command::Help),
        "quit" | "exit" | "q" => Ok(Command::Quit),
        other => Err(format!("unknown command '{other}', try 'help'")),
    }
}

pub async fn run(controller: Arc<ViewController>) -> Result<()> {
    println!("{HELP}\n");
    print!("{}", render::screen(&controller.snapshot().await));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("failed to read stdin")? {
        let command = match parse_command(&line) {
            Ok(command) => command,
            Err(usage) => {
                println!("{usage}");
                continue;
            }
        };
        debug!(?command, "command");

        match command {
            Command::Upload(path) => upload(&controller, path).await,
            Command::Generate(position) => spawn_generate(&controller, position).await,
            Command::Back => match controller.back().await {
                Ok(()) => print!("{}", render::screen(&controller.snapshot().await)),
                Err(err) => println!("{err}"),
            },
            Command::Reset => {
                controller.start_over().await;
                print!("{}", render::screen(&controller.snapshot().await));
            }
            Command::History => match controller.history().list_entries().await {
                Ok(entries) => print!("{}", render::history_list(&entries)),
                Err(err) => println!("history unavailable: {err:#}"),
            },
            Command::Show => print!("{}", render::screen(&controller.snapshot().await)),
            Command::Help => println!("{HELP}"),
            Command::Quit => break,
        }
    }
    Ok(())
}

async fn upload(controller: &ViewController, path: PathBuf) {
    let content = match tokio::fs::read(&path).await {
        Ok(content) => content,
        Err(err) => {
            println!("cannot read {}: {err}", path.display());
            return;
        }
    };
    let filename = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    println!("Scanning {filename}...");
    match controller.upload(&filename, content).await {
        Ok(ScanOutcome::Stale) => {}
        Ok(_) => print!("{}", render::screen(&controller.snapshot().await)),
        Err(err) => println!("{err}"),
    }
}

/// Generation runs in the background so the prompt stays usable.
async fn spawn_generate(controller: &Arc<ViewController>, position: usize) {
    let snapshot = controller.snapshot().await;
    let Some(story_id) = snapshot
        .view
        .scan()
        .and_then(|scan| scan.story_cards.get(position - 1))
        .map(|card| card.id.clone())
    else {
        println!("no story {position} on this screen");
        return;
    };

    let mut events = controller.subscribe_events();
    let (settled_tx, settled_rx) = oneshot::channel();
    let background = controller.clone();
    tokio::spawn(async move {
        let outcome = background.generate(&story_id).await;
        let _ = settled_tx.send(());
        match outcome {
            Ok(GenerateOutcome::Suppressed) => {
                println!("That comic is already being generated.");
            }
            Ok(GenerateOutcome::Stale) => {
                debug!(%story_id, "comic finished off screen");
            }
            Ok(GenerateOutcome::Completed(_) | GenerateOutcome::Failed(_)) => {
                print!("{}", render::screen(&background.snapshot().await));
            }
            Err(err) => warn!(%story_id, error = %err, "generate rejected"),
        }
    });

    // Suppressed or rejected requests never change the screen.
    tokio::select! {
        biased;
        Some(snapshot) = next_state(&mut events) => print!("{}", render::screen(&snapshot)),
        _ = settled_rx => {}
    }
}

/// Waits for the next screen change, skipping other controller events.
async fn next_state(events: &mut broadcast::Receiver<ControllerEvent>) -> Option<ViewSnapshot> {
    loop {
        match events.recv().await {
            Ok(ControllerEvent::StateChanged(snapshot)) => return Some(snapshot),
            Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
            Err(broadcast::error::RecvError::Closed) => return None,
        }
    }
}

#[cfg(test)]
#[path = "tests/interactive_tests.rs"]
mod tests;
