//! Interactive capture/display loop.
//!
//! UI state lives on this task only; the network round-trip runs on a
//! background [`worker::ParseWorker`] task that communicates through
//! [`worker::ParseEvent`] messages. At most one submission is in flight at a
//! time, and the busy spinner is always cleared on a terminal event.

mod capture;
mod worker;

pub use capture::ScreenCapture;
pub use worker::{ParseEvent, ParseWorker};

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::ClientConfig;
use crate::server::ParseResponse;

fn busy_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap(),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

fn screenshot_path(config: &ClientConfig) -> PathBuf {
    let name = chrono::Local::now()
        .format("screenshot-%Y%m%d-%H%M%S.png")
        .to_string();
    config.screenshot_dir.join(name)
}

/// Print the element summary in contract order, one element per line.
fn print_outcome(response: &ParseResponse, annotated_path: &std::path::Path) {
    println!(
        "{} {} elements",
        style("parsed:").green().bold(),
        response.parsed_content_list.len()
    );
    for entry in &response.parsed_content_list {
        println!("{}, {}, {}", entry.kind, entry.content, entry.interactivity);
    }
    println!(
        "{} {}",
        style("annotated image:").cyan(),
        annotated_path.display()
    );
}

/// Run the interactive capture loop until the user quits.
pub async fn run(config: &ClientConfig) -> anyhow::Result<()> {
    std::fs::create_dir_all(&config.screenshot_dir)?;
    let capture = ScreenCapture::detect(config.capture_command.as_deref())?;
    let worker = Arc::new(ParseWorker::new(
        config.endpoint.clone(),
        config.screenshot_dir.clone(),
        config.timeout(),
    )?);

    println!(
        "screenlens capture ({} via {})",
        config.endpoint,
        capture.command()
    );
    println!("press Enter to take a screenshot, 'q' to quit");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let (tx, mut rx) = mpsc::channel::<ParseEvent>(16);

    let mut in_flight: Option<JoinHandle<()>> = None;
    let mut spinner: Option<ProgressBar> = None;

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                match line.trim() {
                    "q" | "quit" | "exit" => break,
                    "" | "s" => {
                        if in_flight.is_some() {
                            println!("{}", style("a submission is already in flight").yellow());
                            continue;
                        }

                        let file = screenshot_path(config);
                        if let Err(e) = capture.capture(&file).await {
                            println!("{} {e:#}", style("capture failed:").red());
                            continue;
                        }

                        spinner = Some(busy_spinner("submitting screenshot..."));
                        in_flight = Some(worker.clone().spawn(file, tx.clone()));
                    }
                    _ => println!("press Enter to take a screenshot, 'q' to quit"),
                }
            }
            event = rx.recv() => {
                let Some(event) = event else { break };
                match event {
                    ParseEvent::Progress(message) => {
                        if let Some(ref pb) = spinner {
                            pb.set_message(message);
                        }
                    }
                    ParseEvent::Finished { response, annotated_path } => {
                        // The worker is done; make sure the task is fully
                        // stopped before the next capture may start.
                        if let Some(handle) = in_flight.take() {
                            let _ = handle.await;
                        }
                        if let Some(pb) = spinner.take() {
                            pb.finish_and_clear();
                        }
                        print_outcome(&response, &annotated_path);
                    }
                    ParseEvent::Failed(message) => {
                        if let Some(handle) = in_flight.take() {
                            let _ = handle.await;
                        }
                        if let Some(pb) = spinner.take() {
                            pb.finish_and_clear();
                        }
                        println!("{} {message}", style("error:").red().bold());
                    }
                }
            }
        }
    }

    Ok(())
}

/// Submit an existing image file once and print the outcome.
pub async fn submit_once(config: &ClientConfig, file: PathBuf) -> anyhow::Result<()> {
    std::fs::create_dir_all(&config.screenshot_dir)?;
    let worker = Arc::new(ParseWorker::new(
        config.endpoint.clone(),
        config.screenshot_dir.clone(),
        config.timeout(),
    )?);

    let (tx, mut rx) = mpsc::channel::<ParseEvent>(16);
    let spinner = busy_spinner("submitting image...");
    let handle = worker.spawn(file, tx);

    let mut failed = false;
    while let Some(event) = rx.recv().await {
        match event {
            ParseEvent::Progress(message) => spinner.set_message(message),
            ParseEvent::Finished { response, annotated_path } => {
                spinner.finish_and_clear();
                print_outcome(&response, &annotated_path);
                break;
            }
            ParseEvent::Failed(message) => {
                spinner.finish_and_clear();
                println!("{} {message}", style("error:").red().bold());
                failed = true;
                break;
            }
        }
    }
    let _ = handle.await;

    if failed {
        anyhow::bail!("parse request failed");
    }
    Ok(())
}
