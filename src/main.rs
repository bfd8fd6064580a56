use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use log::{info, LevelFilter};

use tubechat::backend::{AnswerBackend, CannedBackend, HttpBackend, VideoProcessor};
use tubechat::config::SettingsStore;
use tubechat::popup::Popup;
use tubechat::runtime::Runtime;
use tubechat::store::VideoStore;

/// Interactive harness around a single simulated tab. Commands:
///   open <url> [title..]   navigate the page
///   popup                  reopen the chat popup
///   ask <question>         send a chat message
///   process                trigger transcript processing
///   status                 print the transcript and badge state
///   quit
#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(LevelFilter::Info)
        .init();

    let data_dir = std::env::var("TUBECHAT_DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."));
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("failed to create data dir {}", data_dir.display()))?;

    let settings_store = SettingsStore::new(data_dir.join("settings.json"))?;
    let settings = settings_store.current();
    let store = VideoStore::new(data_dir.join("tubechat.db"))?;

    let (backend, processor): (Arc<dyn AnswerBackend>, Arc<dyn VideoProcessor>) =
        match std::env::var("TUBECHAT_BACKEND_URL") {
            Ok(url) => {
                let http = Arc::new(
                    HttpBackend::new(&url, settings.request_timeout())
                        .context("failed to build http backend")?,
                );
                info!("using http backend at {url}");
                (http.clone(), http)
            }
            Err(_) => {
                let canned = Arc::new(CannedBackend::new(settings.process_simulated()));
                info!("using canned backend");
                (canned.clone(), canned)
            }
        };

    let mut runtime = Runtime::start(1, settings, store, backend, processor)?;
    let mut popup: Option<Popup> = None;

    let stdin = std::io::stdin();
    let mut stdout = std::io::stdout();
    println!("tubechat ready. type 'help' for commands.");

    loop {
        print!("> ");
        stdout.flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let line = line.trim();
        let (command, rest) = match line.split_once(' ') {
            Some((command, rest)) => (command, rest.trim()),
            None => (line, ""),
        };

        match command {
            "" => {}
            "help" => {
                println!("open <url> [title..] | popup | ask <question> | process | status | quit");
            }
            "open" => {
                let (url, title) = match rest.split_once(' ') {
                    Some((url, title)) => (url, Some(title.trim())),
                    None => (rest, None),
                };
                if url.is_empty() {
                    println!("usage: open <url> [title..]");
                    continue;
                }
                runtime.page().navigate(url);
                if let Some(title) = title {
                    runtime.page().set_heading(title);
                }
                println!("navigated to {url}");
            }
            "popup" => {
                let mut opened = runtime.open_popup();
                opened.open().await;
                print_popup(&opened);
                popup = Some(opened);
            }
            "ask" => {
                let Some(popup) = popup.as_mut() else {
                    println!("no popup open. run 'popup' first.");
                    continue;
                };
                popup.ask(rest).await;
                print_popup(popup);
            }
            "process" => {
                let Some(popup) = popup.as_mut() else {
                    println!("no popup open. run 'popup' first.");
                    continue;
                };
                match popup.process_video().await {
                    Ok(message) => println!("{message}"),
                    Err(err) => println!("error: {err}"),
                }
            }
            "status" => {
                let badge = runtime.coordinator().badge_text(1).await;
                println!("badge: {:?}", badge);
                match popup.as_ref() {
                    Some(popup) => print_popup(popup),
                    None => println!("no popup open"),
                }
            }
            "quit" | "exit" => break,
            other => println!("unknown command: {other}"),
        }
    }

    runtime.shutdown().await?;
    Ok(())
}

fn print_popup(popup: &Popup) {
    if let Some(status) = popup.status() {
        println!("[{}]", status.text);
    }
    for line in popup.rendered_lines() {
        println!("{line}");
    }
}
