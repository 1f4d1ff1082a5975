//! Console driver for the telenav engine.
//!
//! Reads one command per line from stdin and dispatches it as the given user:
//!
//! ```text
//! text <query>                 a typed message
//! inline <messageId> <query>   a button tap on a bot message
//! blocks                       list the user's most recent blocks
//! pages <blockId>              list the pages of one block
//! quit
//! ```
//!
//! Usage:
//!   cargo run -p telenav-cli
//!   cargo run -p telenav-cli -- --sqlite /tmp/telenav.db --user 7

mod console;
mod demo;

use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use telenav_session::{Dispatcher, LAST_BLOCKS_LIMIT, StoreConfig, TelenavConfig};
use telenav_types::{BlockId, InputMessage, MessageId, UserId};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use console::ConsoleSender;

/// Drive a telenav bot from the terminal.
#[derive(Parser, Debug)]
#[command(name = "telenav")]
#[command(about = "Console driver for the telenav navigation engine")]
struct Args {
    /// RON config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// SQLite database; overrides the configured store
    #[arg(long)]
    sqlite: Option<PathBuf>,

    /// User id to act as
    #[arg(long, default_value_t = 1)]
    user: i64,

    /// Chat id to send to
    #[arg(long, default_value_t = 1)]
    chat: i64,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => TelenavConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => TelenavConfig::default().with_root_command(demo::ROOT),
    };
    if let Some(path) = &args.sqlite {
        config = config.with_store(StoreConfig::Sqlite { path: path.clone() });
    }

    let default_filter = config.log_filter.clone().unwrap_or_else(|| "info".to_string());
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let dispatcher = Dispatcher::builder()
        .with_config(&config)?
        .with_sender(Arc::new(ConsoleSender::new()))
        .with_command(demo::Start)
        .with_command(demo::Counter)
        .with_command(demo::Close)
        .build()?;
    tracing::info!(user = args.user, chat = args.chat, store = ?config.store, "telenav ready");

    let user = UserId::new(args.user);
    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "quit" || line == "exit" {
            break;
        }
        if let Err(e) = run_line(&dispatcher, user, args.chat, line) {
            eprintln!("error: {e:#}");
        }
    }
    Ok(())
}

fn run_line(dispatcher: &Dispatcher, user: UserId, chat: i64, line: &str) -> Result<()> {
    let (cmd, rest) = line.split_once(' ').unwrap_or((line, ""));
    match cmd {
        "text" => {
            let handled = dispatcher.dispatch(&InputMessage::text(user, chat, rest))?;
            if !handled {
                println!("(not handled)");
            }
        }
        "inline" => {
            let (id, query) = rest
                .split_once(' ')
                .context("usage: inline <messageId> <query>")?;
            let message_id = MessageId::new(id.parse().context("message id must be a number")?);
            dispatcher.dispatch(&InputMessage::inline(user, chat, message_id, query))?;
        }
        "blocks" => {
            let session = dispatcher.session(user);
            let _read = session.lock_read();
            for block in session.last_blocks(0, LAST_BLOCKS_LIMIT)? {
                println!(
                    "block {} → message #{} ({}), {} page(s)",
                    block.id,
                    block.message_id,
                    block.message_type,
                    session.pages(block.id)?.len()
                );
            }
        }
        "pages" => {
            let block_id = BlockId::new(rest.trim().parse().context("usage: pages <blockId>")?);
            let session = dispatcher.session(user);
            let _read = session.lock_read();
            for page in session.pages(block_id)? {
                let buttons: Vec<&str> = page.commands().map(|c| c.title_id.as_str()).collect();
                println!("page {} [{}] {}", page.id, page.handler, buttons.join(" "));
            }
        }
        other => anyhow::bail!("unknown command {other:?}; try text, inline, blocks, pages, quit"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::mpsc;
    use std::time::Duration;

    use telenav_session::MemorySender;

    use super::*;

    const USER: UserId = UserId::new(7);

    fn bot() -> Dispatcher {
        Dispatcher::builder()
            .with_sender(Arc::new(MemorySender::new()))
            .with_root(demo::ROOT)
            .with_command(demo::Start)
            .with_command(demo::Counter)
            .with_command(demo::Close)
            .build()
            .unwrap()
    }

    #[test]
    fn test_diagnostics_list_blocks_and_pages() {
        let bot = bot();
        run_line(&bot, USER, 1, "text hi").unwrap();
        let block = bot.session(USER).last_block().unwrap().unwrap();
        run_line(&bot, USER, 1, "blocks").unwrap();
        run_line(&bot, USER, 1, &format!("pages {}", block.id)).unwrap();
        assert!(run_line(&bot, USER, 1, "pages x").is_err());
        assert!(run_line(&bot, USER, 1, "bogus").is_err());
    }

    #[test]
    fn test_diagnostics_wait_for_running_turn() {
        let bot = bot();
        run_line(&bot, USER, 1, "text hi").unwrap();
        let released = AtomicBool::new(false);
        let (tx, rx) = mpsc::channel();

        std::thread::scope(|s| {
            s.spawn(|| {
                let turn = bot.session(USER).lock_turn();
                tx.send(()).unwrap();
                std::thread::sleep(Duration::from_millis(50));
                released.store(true, Ordering::SeqCst);
                drop(turn);
            });
            rx.recv().unwrap();
            run_line(&bot, USER, 1, "blocks").unwrap();
            assert!(released.load(Ordering::SeqCst));
        });
    }
}
