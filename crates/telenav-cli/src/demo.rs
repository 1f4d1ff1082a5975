//! A small bot to drive from the console.
//!
//! `/name <who>` remembers a name in user state. Any other text opens the
//! main menu, which counts visits in global state and links to a counter
//! page with its own local count.

use telenav_session::{Command, CommandDescriptor, HandlerArgs, PageSpec};
use telenav_types::{CommandBehaviour, PageId, StateDef, StateKind, SubCommand};

pub const ROOT: &str = "Start";

fn main_menu(name: Option<&str>, visits: i64) -> PageSpec {
    let greeting = match name {
        Some(name) => format!("Hello, {name}!"),
        None => "Hello! Tell me your name with /name <who>.".to_string(),
    };
    PageSpec::inline(format!("{greeting}\nMenu opened {visits} time(s)."))
        .with_row([SubCommand::of("Counter")])
        .with_row([
            SubCommand::new("COUNTER_AT_100")
                .with_title("Counter from 100")
                .with_handler("Counter")
                .with_state(start_at(100)),
            SubCommand::of("Close").with_behaviour(CommandBehaviour::ParentPageState),
        ])
}

fn start_at(n: i64) -> StateDef {
    // Literal values always serialize.
    StateDef::single(Some("count"), &n).unwrap_or_default()
}

fn counter_page(count: i64) -> PageSpec {
    PageSpec::inline(format!("Count: {count}"))
        .with_row([
            SubCommand::new("DEC").with_title("−"),
            SubCommand::nothing(count.to_string()),
            SubCommand::new("INC").with_title("+"),
        ])
        .with_row([SubCommand::back(), SubCommand::refresh()])
}

/// Root command.
pub struct Start;

impl Command for Start {
    fn descriptor(&self) -> CommandDescriptor {
        CommandDescriptor::new(ROOT)
            .text()
            .inline()
            .query()
            .context()
            .state::<String>(StateKind::User, Some("name"))
            .state::<i64>(StateKind::Global, Some("visits"))
    }

    fn on_text(&self, args: &HandlerArgs<'_>) -> anyhow::Result<bool> {
        let name = args.state::<String>(StateKind::User, Some("name"))?;
        if let Some(who) = args.query().strip_prefix("/name ") {
            name.set(Some(who.trim().to_string()))?;
            args.context().send_message(format!("Nice to meet you, {}.", who.trim()))?;
            return Ok(true);
        }

        let visits = args.state::<i64>(StateKind::Global, Some("visits"))?;
        let n = visits.get_or(0)? + 1;
        visits.set(Some(n))?;
        args.context().create_page(main_menu(name.get()?.as_deref(), n))?;
        Ok(true)
    }

    fn on_inline(&self, args: &HandlerArgs<'_>) -> anyhow::Result<()> {
        if args.input().is_refresh() {
            let name = args.state::<String>(StateKind::User, Some("name"))?.get()?;
            let visits = args.state::<i64>(StateKind::Global, Some("visits"))?.get_or(0)?;
            args.context().update_page(main_menu(name.as_deref(), visits))?;
        }
        Ok(())
    }
}

/// Page with a local counter.
pub struct Counter;

impl Command for Counter {
    fn descriptor(&self) -> CommandDescriptor {
        CommandDescriptor::new("Counter")
            .inline()
            .query()
            .context()
            .state::<i64>(StateKind::Local, Some("count"))
    }

    fn on_inline(&self, args: &HandlerArgs<'_>) -> anyhow::Result<()> {
        let count = args.state::<i64>(StateKind::Local, Some("count"))?;
        let mut n = count.get_or(0)?;
        match args.query() {
            "INC" => n += 1,
            "DEC" => n -= 1,
            _ => {}
        }
        count.set(Some(n))?;
        args.context().update_page(counter_page(n))?;
        Ok(())
    }
}

/// Removes the current page.
pub struct Close;

impl Command for Close {
    fn descriptor(&self) -> CommandDescriptor {
        CommandDescriptor::new("Close").inline().context()
    }

    fn on_inline(&self, args: &HandlerArgs<'_>) -> anyhow::Result<()> {
        args.context().delete_page(PageId::NONE)?;
        Ok(())
    }
}
