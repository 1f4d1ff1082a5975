//! Fixture bot shared by the integration tests.
//!
//! Every command records its invocation in a [`Journal`] service so tests
//! can assert which handler ran, with which query, on which block and page.

#![allow(dead_code)]

use std::sync::Arc;

use parking_lot::Mutex;
use telenav_session::{
    Command, CommandDescriptor, CommandInterceptor, Dispatcher, DispatcherBuilder, HandlerArgs,
    MemorySender, PageSpec, SessionResult, StateStore, UserSession,
};
use telenav_types::{
    BlockId, CommandBehaviour, HandlerTag, InputMessage, MessageId, Page, PageId, StateDef,
    StateKey, StateKind, SubCommand, UserId,
};

pub const USER: UserId = UserId::new(42);
pub const CHAT: i64 = 4200;
/// Id the [`MemorySender`] assigns to the first message.
pub const FIRST_MESSAGE: MessageId = MessageId::new(100);

// ============================================================================
// Journal
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub tag: String,
    pub query: String,
    pub block: BlockId,
    pub page: PageId,
    pub note: Option<String>,
}

#[derive(Debug, Default)]
pub struct Journal {
    calls: Mutex<Vec<Call>>,
}

impl Journal {
    fn record(&self, args: &HandlerArgs<'_>, note: Option<String>) {
        let ctx = args.context();
        self.calls.lock().push(Call {
            tag: ctx.current_command().to_string(),
            query: args.query().to_string(),
            block: ctx.block_id(),
            page: ctx.page_id(),
            note,
        });
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn last(&self) -> Call {
        self.calls.lock().last().cloned().expect("journal is empty")
    }

    pub fn len(&self) -> usize {
        self.calls.lock().len()
    }
}

fn journal(args: &HandlerArgs<'_>) -> SessionResult<Arc<Journal>> {
    args.service::<Journal>()
}

// ============================================================================
// Pages
// ============================================================================

pub fn count_state(n: i64) -> StateDef {
    StateDef::single(Some("count"), &n).unwrap()
}

pub fn count_key() -> StateKey {
    StateKey::named::<i64>("count")
}

fn welcome() -> PageSpec {
    PageSpec::inline("Welcome")
        .with_row([SubCommand::of("Next")])
        .with_row([SubCommand::of("Boom").with_behaviour(CommandBehaviour::ParentPage)])
        .with_row([
            SubCommand::new("COUNT_NEW")
                .with_handler("Counter")
                .with_state(count_state(10)),
            SubCommand::new("COUNT_TEMP")
                .with_handler("Counter")
                .with_behaviour(CommandBehaviour::ParentPage)
                .with_state(count_state(10)),
            SubCommand::new("COUNT_HERE")
                .with_handler("Counter")
                .with_behaviour(CommandBehaviour::ParentPageState),
            SubCommand::new("PEEK_TEMP")
                .with_handler("Peek")
                .with_behaviour(CommandBehaviour::ParentPage)
                .with_state(count_state(10)),
        ])
        .with_row([
            SubCommand::nothing("·"),
            SubCommand::of("Close").with_behaviour(CommandBehaviour::ParentPageState),
            SubCommand::new("INFO").with_title("Info"),
        ])
}

fn step() -> PageSpec {
    PageSpec::inline("Step")
        .with_row([SubCommand::back(), SubCommand::refresh()])
        .with_row([SubCommand::of("Next")])
        .with_row([
            SubCommand::of("Close").with_behaviour(CommandBehaviour::ParentPageState),
            SubCommand::of("Repost").with_behaviour(CommandBehaviour::ParentPageState),
            SubCommand::new("INSPECT"),
        ])
}

fn text_menu() -> PageSpec {
    PageSpec::text("Menu")
        .with_handler("Picky")
        .with_row([SubCommand::new("HELP").with_title("Help")])
}

// ============================================================================
// Commands
// ============================================================================

/// Root: `/menu` opens a text menu, `/quiet` declines, anything else opens
/// the inline welcome page. Re-renders the welcome page on refresh.
pub struct Start;

impl Command for Start {
    fn descriptor(&self) -> CommandDescriptor {
        CommandDescriptor::new("Start")
            .text()
            .inline()
            .query()
            .context()
            .service::<Journal>()
    }

    fn on_text(&self, args: &HandlerArgs<'_>) -> anyhow::Result<bool> {
        journal(args)?.record(args, None);
        match args.query() {
            "/quiet" => return Ok(false),
            "/menu" => args.context().create_page(text_menu())?,
            _ => args.context().create_page(welcome())?,
        };
        Ok(true)
    }

    fn on_inline(&self, args: &HandlerArgs<'_>) -> anyhow::Result<()> {
        journal(args)?.record(args, None);
        if args.input().is_refresh() {
            args.context().update_page(welcome())?;
        }
        Ok(())
    }
}

/// Second-level page with back/refresh and a diagnostics button.
pub struct Next;

impl Command for Next {
    fn descriptor(&self) -> CommandDescriptor {
        CommandDescriptor::new("Next")
            .inline()
            .query()
            .context()
            .service::<Journal>()
    }

    fn on_inline(&self, args: &HandlerArgs<'_>) -> anyhow::Result<()> {
        let ctx = args.context();
        if args.query() == "INSPECT" {
            let first = ctx.block_pages(BlockId::NONE)?[0].id;
            let note = format!(
                "visible={} first_visible={} pages={} blocks={} picky={}",
                ctx.page_visible(PageId::NONE)?,
                ctx.page_visible(first)?,
                ctx.block_pages(BlockId::NONE)?.len(),
                ctx.last_blocks(0)?.len(),
                ctx.execute_text_command(&HandlerTag::from("Picky"), "Help")?,
            );
            journal(args)?.record(args, Some(note));
            return Ok(());
        }
        journal(args)?.record(args, None);
        if args.input().is_refresh() {
            ctx.update_page(step())?;
        }
        Ok(())
    }
}

/// Text menu handler: accepts only "Help".
pub struct Picky;

impl Command for Picky {
    fn descriptor(&self) -> CommandDescriptor {
        CommandDescriptor::new("Picky")
            .text()
            .query()
            .service::<Journal>()
    }

    fn on_text(&self, args: &HandlerArgs<'_>) -> anyhow::Result<bool> {
        journal(args)?.record(args, None);
        Ok(args.query() == "Help")
    }
}

/// Writes user state, then fails.
pub struct Boom;

impl Command for Boom {
    fn descriptor(&self) -> CommandDescriptor {
        CommandDescriptor::new("Boom")
            .inline()
            .state::<String>(StateKind::User, Some("last_error"))
            .service::<Journal>()
    }

    fn on_inline(&self, args: &HandlerArgs<'_>) -> anyhow::Result<()> {
        journal(args)?.record(args, None);
        args.state::<String>(StateKind::User, Some("last_error"))?
            .set(Some("boom".to_string()))?;
        anyhow::bail!("kaboom")
    }
}

/// Increments a local counter.
pub struct Counter;

impl Command for Counter {
    fn descriptor(&self) -> CommandDescriptor {
        CommandDescriptor::new("Counter")
            .inline()
            .state::<i64>(StateKind::Local, Some("count"))
            .service::<Journal>()
    }

    fn on_inline(&self, args: &HandlerArgs<'_>) -> anyhow::Result<()> {
        let cell = args.state::<i64>(StateKind::Local, Some("count"))?;
        let n = cell.get_or(0)? + 1;
        cell.set(Some(n))?;
        journal(args)?.record(args, Some(n.to_string()));
        Ok(())
    }
}

/// Reads the local counter without changing it.
pub struct Peek;

impl Command for Peek {
    fn descriptor(&self) -> CommandDescriptor {
        CommandDescriptor::new("Peek")
            .inline()
            .state::<i64>(StateKind::Local, Some("count"))
            .service::<Journal>()
    }

    fn on_inline(&self, args: &HandlerArgs<'_>) -> anyhow::Result<()> {
        let count = args.state::<i64>(StateKind::Local, Some("count"))?.get()?;
        journal(args)?.record(args, count.map(|n| n.to_string()));
        Ok(())
    }
}

/// Marks the current page as closing, then deletes it.
pub struct Close;

impl Command for Close {
    fn descriptor(&self) -> CommandDescriptor {
        CommandDescriptor::new("Close")
            .inline()
            .context()
            .state::<bool>(StateKind::Local, Some("closing"))
            .service::<Journal>()
    }

    fn on_inline(&self, args: &HandlerArgs<'_>) -> anyhow::Result<()> {
        journal(args)?.record(args, None);
        args.state::<bool>(StateKind::Local, Some("closing"))?.set(Some(true))?;
        args.context().delete_page(PageId::NONE)?;
        Ok(())
    }
}

/// Re-posts the current block under a fresh message.
pub struct Repost;

impl Command for Repost {
    fn descriptor(&self) -> CommandDescriptor {
        CommandDescriptor::new("Repost")
            .inline()
            .context()
            .service::<Journal>()
    }

    fn on_inline(&self, args: &HandlerArgs<'_>) -> anyhow::Result<()> {
        let ctx = args.context();
        let message_id = ctx.send_message("moved")?;
        let page = ctx.promote_block(message_id)?;
        let block = ctx.session().require_block(page.block_id)?;
        journal(args)?.record(args, Some(block.message_id.to_string()));
        Ok(())
    }
}

/// Interceptor that remembers every tag it saw.
#[derive(Debug, Default)]
pub struct Recorder {
    pub tags: Mutex<Vec<String>>,
}

impl CommandInterceptor for Recorder {
    fn executed(&self, tag: &HandlerTag, _input: &InputMessage) -> anyhow::Result<()> {
        self.tags.lock().push(tag.to_string());
        Ok(())
    }
}

/// Interceptor that always fails.
pub struct Failing;

impl CommandInterceptor for Failing {
    fn executed(&self, tag: &HandlerTag, _input: &InputMessage) -> anyhow::Result<()> {
        anyhow::bail!("interceptor rejected {tag}")
    }
}

// ============================================================================
// Harness
// ============================================================================

pub struct Harness {
    pub dispatcher: Dispatcher,
    pub sender: Arc<MemorySender>,
    pub journal: Arc<Journal>,
}

impl Harness {
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self::with(store, |b| b)
    }

    pub fn with(store: Arc<dyn StateStore>, configure: impl FnOnce(DispatcherBuilder) -> DispatcherBuilder) -> Self {
        let sender = Arc::new(MemorySender::starting_at(FIRST_MESSAGE.get()));
        let journal = Arc::new(Journal::default());
        let builder = Dispatcher::builder()
            .with_store(store)
            .with_sender(sender.clone())
            .with_service(journal.clone())
            .with_root("Start")
            .with_command(Start)
            .with_command(Next)
            .with_command(Picky)
            .with_command(Boom)
            .with_command(Counter)
            .with_command(Peek)
            .with_command(Close)
            .with_command(Repost);
        let dispatcher = configure(builder).build().unwrap();
        Self {
            dispatcher,
            sender,
            journal,
        }
    }

    pub fn text(&self, query: &str) -> SessionResult<bool> {
        self.dispatcher.dispatch(&InputMessage::text(USER, CHAT, query))
    }

    pub fn inline(&self, message_id: MessageId, query: &str) -> SessionResult<bool> {
        self.dispatcher
            .dispatch(&InputMessage::inline(USER, CHAT, message_id, query))
    }

    pub fn session(&self) -> Arc<UserSession> {
        self.dispatcher.session(USER)
    }

    /// Pages of the block bound to `message_id`.
    pub fn pages(&self, message_id: MessageId) -> Vec<Page> {
        let session = self.session();
        match session.block_by_message_id(message_id).unwrap() {
            Some(block) => session.pages(block.id).unwrap(),
            None => Vec::new(),
        }
    }

    pub fn page_ids(&self, message_id: MessageId) -> Vec<PageId> {
        self.pages(message_id).iter().map(|p| p.id).collect()
    }

    /// Local `count` of a page, if set.
    pub fn count(&self, page_id: PageId) -> Option<i64> {
        self.session()
            .page_state(page_id)
            .unwrap()
            .into_iter()
            .find(|item| item.key == count_key())
            .map(|item| item.decode().unwrap())
    }
}
