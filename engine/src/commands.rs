//! Named commands shared between independent parts of the UI.
//!
//! A component registers a handler for a [`CommandName`] when the app is
//! assembled; any other component invokes it by name. There is no ambient
//! global registry: the table is owned and passed like any other state.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use quire_types::EnumParseError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandName {
    Save,
    ClearChat,
    RefreshTree,
    ToggleHeadings,
}

const COMMAND_NAMES: &[&str] = &["save", "clear-chat", "refresh-tree", "toggle-headings"];

impl CommandName {
    pub const ALL: [CommandName; 4] = [
        CommandName::Save,
        CommandName::ClearChat,
        CommandName::RefreshTree,
        CommandName::ToggleHeadings,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            CommandName::Save => "save",
            CommandName::ClearChat => "clear-chat",
            CommandName::RefreshTree => "refresh-tree",
            CommandName::ToggleHeadings => "toggle-headings",
        }
    }
}

impl fmt::Display for CommandName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CommandName {
    type Err = EnumParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        CommandName::ALL
            .into_iter()
            .find(|name| name.as_str().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| EnumParseError::new("command", trimmed, COMMAND_NAMES))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("No handler registered for command '{0}'")]
    NotRegistered(CommandName),
    #[error("Command '{name}' failed: {message}")]
    Failed { name: CommandName, message: String },
}

type Handler<C> = Box<dyn Fn(&mut C) -> Result<(), String> + Send + Sync>;

/// Command handlers over a context `C` (typically the session).
pub struct CommandTable<C> {
    handlers: HashMap<CommandName, Handler<C>>,
}

impl<C> Default for CommandTable<C> {
    fn default() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }
}

impl<C> fmt::Debug for CommandTable<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.handlers.keys().map(|name| name.as_str()).collect();
        names.sort_unstable();
        f.debug_struct("CommandTable")
            .field("registered", &names)
            .finish()
    }
}

impl<C> CommandTable<C> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `name`, replacing any earlier handler.
    pub fn register<F>(&mut self, name: CommandName, handler: F)
    where
        F: Fn(&mut C) -> Result<(), String> + Send + Sync + 'static,
    {
        if self.handlers.insert(name, Box::new(handler)).is_some() {
            tracing::debug!(command = name.as_str(), "Command handler replaced");
        }
    }

    #[must_use]
    pub fn is_registered(&self, name: CommandName) -> bool {
        self.handlers.contains_key(&name)
    }

    pub fn invoke(&self, name: CommandName, ctx: &mut C) -> Result<(), CommandError> {
        let handler = self
            .handlers
            .get(&name)
            .ok_or(CommandError::NotRegistered(name))?;
        handler(ctx).map_err(|message| CommandError::Failed { name, message })
    }
}

#[cfg(test)]
mod tests {
    use super::{CommandError, CommandName, CommandTable};

    #[test]
    fn names_parse_case_insensitively() {
        for name in CommandName::ALL {
            assert_eq!(name.as_str().parse::<CommandName>().unwrap(), name);
        }
        assert_eq!(
            " Toggle-Headings ".parse::<CommandName>().unwrap(),
            CommandName::ToggleHeadings
        );
        assert!("quit".parse::<CommandName>().is_err());
    }

    #[test]
    fn invoke_runs_registered_handler() {
        let mut table: CommandTable<u32> = CommandTable::new();
        table.register(CommandName::Save, |count| {
            *count += 1;
            Ok(())
        });
        let mut count = 0;
        table.invoke(CommandName::Save, &mut count).unwrap();
        table.invoke(CommandName::Save, &mut count).unwrap();
        assert_eq!(count, 2);
    }

    #[test]
    fn unregistered_and_failing_commands_are_errors() {
        let mut table: CommandTable<()> = CommandTable::new();
        assert!(matches!(
            table.invoke(CommandName::RefreshTree, &mut ()),
            Err(CommandError::NotRegistered(CommandName::RefreshTree))
        ));

        table.register(CommandName::ClearChat, |()| Err("busy".to_string()));
        let err = table.invoke(CommandName::ClearChat, &mut ()).unwrap_err();
        assert_eq!(err.to_string(), "Command 'clear-chat' failed: busy");
    }
}
