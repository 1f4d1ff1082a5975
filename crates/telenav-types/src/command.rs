//! Buttons: persisted command definitions and the sub-commands handlers emit.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use strum::{EnumIter, EnumString, IntoEnumIterator};

use crate::state::StateDef;

/// Stable registered tag of a command handler.
///
/// Tags are what pages persist, so they must survive renames of the Rust type
/// implementing the command.
#[derive(Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HandlerTag(String);

impl HandlerTag {
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl From<&str> for HandlerTag {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for HandlerTag {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for HandlerTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for HandlerTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HandlerTag({})", self.0)
    }
}

/// How a button's handler is bound to pages and local state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default, EnumString)]
#[strum(ascii_case_insensitive)]
pub enum CommandBehaviour {
    /// Append a new page to the block; the handler gets that page's local state.
    #[default]
    #[strum(serialize = "separate_page", serialize = "separate")]
    SeparatePage,
    /// Run against the caller's page with a read-only local snapshot.
    #[strum(serialize = "parent_page", serialize = "parent")]
    ParentPage,
    /// Run against the caller's page and its persisted local state.
    #[strum(serialize = "parent_page_state", serialize = "parent_state")]
    ParentPageState,
}

impl CommandBehaviour {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandBehaviour::SeparatePage => "separate_page",
            CommandBehaviour::ParentPage => "parent_page",
            CommandBehaviour::ParentPageState => "parent_page_state",
        }
    }
}

impl fmt::Display for CommandBehaviour {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// System commands
// ============================================================================

/// Reserved button ids the resolver handles itself.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, EnumString, EnumIter)]
pub enum SystemCommand {
    /// Drop the current page and refresh the previous one.
    #[strum(serialize = "_GO_BACK")]
    GoBack,
    /// Re-run the current page's handler.
    #[strum(serialize = "_REFRESH")]
    Refresh,
    /// Do nothing at all (placeholder buttons).
    #[strum(serialize = "_NOTHING")]
    Nothing,
}

impl SystemCommand {
    pub fn id(&self) -> &'static str {
        match self {
            SystemCommand::GoBack => "_GO_BACK",
            SystemCommand::Refresh => "_REFRESH",
            SystemCommand::Nothing => "_NOTHING",
        }
    }

    /// Parse a raw title id.
    pub fn parse(id: &str) -> Option<Self> {
        Self::from_str(id).ok()
    }

    pub fn is_reserved(id: &str) -> bool {
        Self::parse(id).is_some()
    }

    pub fn all() -> impl Iterator<Item = SystemCommand> {
        Self::iter()
    }
}

impl fmt::Display for SystemCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

// ============================================================================
// CommandDef
// ============================================================================

/// One persisted button on a page.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CommandDef {
    pub title_id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handler: Option<HandlerTag>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub behaviour: Option<CommandBehaviour>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<StateDef>,
}

impl CommandDef {
    pub fn new(title_id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            title_id: title_id.into(),
            title: title.into(),
            handler: None,
            behaviour: None,
            state: None,
        }
    }

    /// A button for a reserved system command.
    pub fn system(cmd: SystemCommand, title: impl Into<String>) -> Self {
        Self::new(cmd.id(), title)
    }

    pub fn with_handler(mut self, handler: impl Into<HandlerTag>) -> Self {
        self.handler = Some(handler.into());
        self
    }

    pub fn with_behaviour(mut self, behaviour: CommandBehaviour) -> Self {
        self.behaviour = Some(behaviour);
        self
    }

    pub fn with_state(mut self, state: StateDef) -> Self {
        self.state = Some(state);
        self
    }

    pub fn system_command(&self) -> Option<SystemCommand> {
        SystemCommand::parse(&self.title_id)
    }

    pub fn is_back_command(&self) -> bool {
        self.title_id == SystemCommand::GoBack.id()
    }

    pub fn is_refresh_command(&self) -> bool {
        self.title_id == SystemCommand::Refresh.id()
    }

    pub fn is_nothing_command(&self) -> bool {
        self.title_id == SystemCommand::Nothing.id()
    }

    /// Explicit handler, ignoring blank tags.
    pub fn explicit_handler(&self) -> Option<&HandlerTag> {
        self.handler.as_ref().filter(|h| !h.is_blank())
    }
}

// ============================================================================
// SubCommand
// ============================================================================

/// A button as a handler describes it when saving a page.
///
/// Converted to a [`CommandDef`] by the session, which resolves the display
/// title through the localizer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SubCommand {
    pub title_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handler: Option<HandlerTag>,
    #[serde(default)]
    pub behaviour: CommandBehaviour,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<StateDef>,
}

impl SubCommand {
    /// A button with an explicit title id and no handler.
    pub fn new(title_id: impl Into<String>) -> Self {
        Self {
            title_id: title_id.into(),
            title: None,
            handler: None,
            behaviour: CommandBehaviour::default(),
            state: None,
        }
    }

    /// A button that opens `handler`; its title id derives from the tag.
    pub fn of(handler: impl Into<HandlerTag>) -> Self {
        Self::new("").with_handler(handler)
    }

    pub fn system(cmd: SystemCommand) -> Self {
        Self::new(cmd.id())
    }

    pub fn back() -> Self {
        Self::system(SystemCommand::GoBack)
    }

    pub fn refresh() -> Self {
        Self::system(SystemCommand::Refresh)
    }

    /// A placeholder button with a fixed title that does nothing when pressed.
    pub fn nothing(title: impl Into<String>) -> Self {
        Self::system(SystemCommand::Nothing).with_title(title)
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_handler(mut self, handler: impl Into<HandlerTag>) -> Self {
        self.handler = Some(handler.into());
        self
    }

    pub fn with_behaviour(mut self, behaviour: CommandBehaviour) -> Self {
        self.behaviour = behaviour;
        self
    }

    pub fn with_state(mut self, state: StateDef) -> Self {
        self.state = Some(state);
        self
    }

    pub fn is_system_command(&self) -> bool {
        SystemCommand::is_reserved(&self.title_id)
    }

    /// Title id to persist: explicit, or derived from the handler tag.
    pub fn effective_title_id(&self) -> String {
        if !self.title_id.trim().is_empty() {
            return self.title_id.clone();
        }
        self.handler
            .as_ref()
            .map(|h| title_id_of(h.as_str()))
            .unwrap_or_default()
    }

    /// Convert into the persisted form with an already resolved title.
    pub fn into_def(self, title: String) -> CommandDef {
        let title_id = self.effective_title_id();
        let behaviour = if self.is_system_command() {
            None
        } else {
            Some(self.behaviour)
        };
        CommandDef {
            title_id,
            title,
            handler: self.handler,
            behaviour,
            state: self.state,
        }
    }
}

static CAMEL_BOUNDARY: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"([a-z0-9])([A-Z])").ok());

/// Default title id for a handler tag.
///
/// The last path segment is converted to UPPER_SNAKE and a trailing
/// `_COMMAND` is dropped: `app::ShowItemsCommand` → `SHOW_ITEMS`.
pub fn title_id_of(tag: &str) -> String {
    let name = tag.rsplit([':', '.', '/']).next().unwrap_or(tag);
    let snake = match CAMEL_BOUNDARY.as_ref() {
        Some(re) => re.replace_all(name, "${1}_${2}").into_owned(),
        None => name.to_string(),
    };
    let upper = snake.replace(['-', ' '], "_").to_uppercase();
    match upper.strip_suffix("_COMMAND") {
        Some(stripped) if !stripped.is_empty() => stripped.to_string(),
        _ => upper,
    }
}
