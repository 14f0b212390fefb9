//! One-shot CLI commands, each driving a short-lived controller.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use tokio::sync::mpsc;

use crate::api::ApiClient;
use crate::config::Config;
use crate::messaging::{Controller, ControllerEvent, Phase, SystemClock};
use crate::models::{Delivery, Message};
use crate::realtime;
use crate::session;

type Events = mpsc::UnboundedReceiver<ControllerEvent>;

/// Build a controller for the stored session.
fn start(config: &Config) -> Result<(Controller, Events)> {
    let client = ApiClient::from_config(config)?;
    let identity = client.session().identity.clone();
    let mut settings = config.controller_settings();
    // Nothing stays on screen in one-shot mode, so persist right away.
    settings.mark_read_delay = Duration::ZERO;
    Ok(Controller::new(
        identity,
        Arc::new(client),
        Arc::new(SystemClock),
        settings,
    ))
}

/// Feed events into the controller until `done` matches one. The matching
/// event is handled too.
async fn drive_until<F>(ctrl: &mut Controller, rx: &mut Events, done: F) -> Result<()>
where
    F: Fn(&ControllerEvent) -> Result<bool>,
{
    while let Some(event) = rx.recv().await {
        let finished = done(&event)?;
        ctrl.handle(event);
        if finished {
            return Ok(());
        }
    }
    bail!("Controller event channel closed")
}

fn format_message(msg: &Message, local: &str, unread: bool) -> String {
    let who = if msg.sender_id == local {
        "you".to_string()
    } else {
        format!("{} ({})", msg.sender_id, msg.sender_role)
    };
    let marker = if unread { "* " } else { "  " };
    let state = match &msg.delivery {
        Delivery::Confirmed => String::new(),
        Delivery::Pending => " [sending]".to_string(),
        Delivery::Sent { .. } => " [sent]".to_string(),
        Delivery::Failed { reason } => format!(" [failed: {}]", reason),
    };
    format!(
        "{}[{}] {}: {}{}",
        marker,
        msg.created_at.format("%Y-%m-%d %H:%M"),
        who,
        msg.content,
        state
    )
}

/// List conversations of the logged-in participant.
pub async fn list_conversations(limit: usize) -> Result<()> {
    let config = Config::load()?;
    let (mut ctrl, mut rx) = start(&config)?;
    ctrl.load_conversations();
    drive_until(&mut ctrl, &mut rx, |event| match event {
        ControllerEvent::ConversationsLoaded(Err(e)) => Err(e.clone().into()),
        ControllerEvent::ConversationsLoaded(Ok(_)) => Ok(true),
        _ => Ok(false),
    })
    .await?;

    println!("\nConversations:");
    println!("{:-<60}", "");
    if ctrl.conversations().is_empty() {
        println!("  (no conversations)");
        return Ok(());
    }
    for summary in ctrl.conversations().iter().take(limit) {
        let badge = if summary.unread_count > 0 {
            format!(" ({} unread)", summary.unread_count)
        } else {
            String::new()
        };
        println!("{}{}", summary.title(), badge);
        println!("  with: {}  job: {}", summary.other_id, summary.job_id);
        if let Some(ref last) = summary.last_message {
            let when = summary
                .last_message_at
                .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_default();
            println!("  last: [{}] {}", when, last.trim());
        }
        println!();
    }
    Ok(())
}

/// Print one conversation, optionally marking it read afterwards.
pub async fn read(remote: &str, job: &str, mark: bool) -> Result<()> {
    let config = Config::load()?;
    let (mut ctrl, mut rx) = start(&config)?;
    let key = ctrl.key_for(remote, job);
    ctrl.select(key);
    drive_until(&mut ctrl, &mut rx, |event| {
        Ok(matches!(event, ControllerEvent::ConversationLoaded { .. }))
    })
    .await?;

    if ctrl.phase() == Phase::Failed {
        if let Some(notice) = ctrl.notice() {
            bail!("{}", notice.text);
        }
    }

    let local = ctrl.identity().id.clone();
    if ctrl.messages().is_empty() {
        println!("(no messages)");
    }
    for msg in ctrl.messages() {
        println!("{}", format_message(msg, &local, ctrl.is_unread(&msg.id)));
    }
    let unread = ctrl.unread_banner();
    if unread > 0 {
        println!("\n{} unread", unread);
    }

    if mark && unread > 0 {
        ctrl.mark_read();
        drive_until(&mut ctrl, &mut rx, |event| match event {
            ControllerEvent::ReadPersisted { result: Err(e), .. } => Err(e.clone().into()),
            ControllerEvent::ReadPersisted { .. } => Ok(true),
            _ => Ok(false),
        })
        .await?;
        println!("Marked read.");
    }
    Ok(())
}

/// Send a message and wait for the server's acknowledgement.
pub async fn send(remote: &str, job: &str, text: &str) -> Result<()> {
    let config = Config::load()?;
    let (mut ctrl, mut rx) = start(&config)?;
    let key = ctrl.key_for(remote, job);
    ctrl.send_to(&key, text)?;
    drive_until(&mut ctrl, &mut rx, |event| match event {
        ControllerEvent::SendFinished { result: Err(e), .. } => Err(e.clone().into()),
        ControllerEvent::SendFinished { .. } => Ok(true),
        _ => Ok(false),
    })
    .await?;
    println!("Message sent.");
    Ok(())
}

/// Mark a conversation read on the server.
pub async fn mark_read(remote: &str, job: &str) -> Result<()> {
    let config = Config::load()?;
    let (mut ctrl, mut rx) = start(&config)?;
    let key = ctrl.key_for(remote, job);
    ctrl.select(key);
    drive_until(&mut ctrl, &mut rx, |event| match event {
        ControllerEvent::ConversationLoaded { result: Err(e), .. } => Err(e.clone().into()),
        ControllerEvent::ConversationLoaded { .. } => Ok(true),
        _ => Ok(false),
    })
    .await?;
    ctrl.mark_read();
    drive_until(&mut ctrl, &mut rx, |event| match event {
        ControllerEvent::ReadPersisted { result: Err(e), .. } => Err(e.clone().into()),
        ControllerEvent::ReadPersisted { .. } => Ok(true),
        _ => Ok(false),
    })
    .await?;
    println!("Marked read.");
    Ok(())
}

/// Print unread counts per remote participant and in total.
pub async fn unread() -> Result<()> {
    let config = Config::load()?;
    let (mut ctrl, mut rx) = start(&config)?;
    ctrl.refresh_unread_counts();
    drive_until(&mut ctrl, &mut rx, |event| match event {
        ControllerEvent::UnreadLoaded(Err(e)) => Err(e.clone().into()),
        ControllerEvent::UnreadLoaded(Ok(_)) => Ok(true),
        _ => Ok(false),
    })
    .await?;

    let tracker = ctrl.unread();
    for (remote, count) in tracker.by_remote() {
        println!("{:<30} {}", remote, count);
    }
    println!("{:<30} {}", "total", tracker.total());
    Ok(())
}

/// Stay connected to live delivery and print incoming messages.
pub async fn watch() -> Result<()> {
    let config = Config::load()?;
    let session = session::load_active(&config)?;
    let (mut ctrl, mut rx) = start(&config)?;
    let local = ctrl.identity().id.clone();

    let listener = tokio::spawn(realtime::run(
        config.realtime_url(),
        session,
        ctrl.event_sender(),
    ));
    ctrl.refresh_unread_counts();

    println!("Listening for messages... (Ctrl-C to stop)");
    loop {
        tokio::select! {
            event = rx.recv() => {
                let Some(event) = event else { break };
                let inbound = match &event {
                    ControllerEvent::Inbound(msg) => Some(msg.clone()),
                    _ => None,
                };
                ctrl.handle(event);
                if let Some(msg) = inbound {
                    println!("{}", format_message(&msg, &local, !msg.read && msg.sender_id != local));
                    println!(
                        "  job {} -- {} unread from {}, {} in total",
                        msg.job_id,
                        ctrl.unread().for_remote(&msg.sender_id),
                        msg.sender_id,
                        ctrl.unread().total()
                    );
                }
            }
            _ = tokio::signal::ctrl_c() => {
                println!("Shutting down...");
                break;
            }
        }
    }

    listener.abort();
    Ok(())
}
