//! Title lookup for button ids.

use std::collections::HashMap;

use telenav_types::SystemCommand;

/// Resolves a title id to the text shown on a button.
pub trait Localizer: Send + Sync {
    fn title(&self, title_id: &str) -> String;
}

/// Table-backed localizer; unknown ids render as themselves.
#[derive(Debug, Clone, Default)]
pub struct StaticLocalizer {
    titles: HashMap<String, String>,
}

impl StaticLocalizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Localizer with English titles for the system buttons.
    pub fn with_system_defaults() -> Self {
        Self::new()
            .with_title(SystemCommand::GoBack.id(), "« Back")
            .with_title(SystemCommand::Refresh.id(), "⟳ Refresh")
            .with_title(SystemCommand::Nothing.id(), "·")
    }

    pub fn with_title(mut self, title_id: impl Into<String>, title: impl Into<String>) -> Self {
        self.titles.insert(title_id.into(), title.into());
        self
    }

    pub fn extend(&mut self, titles: impl IntoIterator<Item = (String, String)>) {
        self.titles.extend(titles);
    }
}

impl Localizer for StaticLocalizer {
    fn title(&self, title_id: &str) -> String {
        self.titles
            .get(title_id)
            .cloned()
            .unwrap_or_else(|| title_id.to_string())
    }
}
