//! The closed set of slash commands.
//!
//! Commands are declared statically; nothing registers commands at runtime.
//! Parameter order here is the binding order.

use std::fmt::Write;

/// Value type of a command parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterKind {
    /// Free text
    Text,
    /// `@mention` resolved against channel members
    UserRef,
    /// Calendar date, `YYYY-MM-DD`
    Date,
    /// One of a fixed set of options (case-sensitive)
    Enum(&'static [&'static str]),
}

impl ParameterKind {
    /// Short label for usage lines.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::UserRef => "@member",
            Self::Date => "YYYY-MM-DD",
            Self::Enum(_) => "option",
        }
    }
}

/// One declared parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandParameter {
    /// Name used as the wire key
    pub name: &'static str,
    /// Value type
    pub kind: ParameterKind,
    /// Whether execution requires a value
    pub required: bool,
    /// Help text
    pub description: &'static str,
}

impl CommandParameter {
    const fn required(name: &'static str, kind: ParameterKind, description: &'static str) -> Self {
        Self { name, kind, required: true, description }
    }

    const fn optional(name: &'static str, kind: ParameterKind, description: &'static str) -> Self {
        Self { name, kind, required: false, description }
    }

    fn usage(&self) -> String {
        let shape = match self.kind {
            ParameterKind::Text => self.name.to_owned(),
            ParameterKind::UserRef => format!("@{}", self.name),
            ParameterKind::Date => format!("{}:YYYY-MM-DD", self.name),
            ParameterKind::Enum(options) => format!("{}:{}", self.name, options.join("|")),
        };
        if self.required { format!("<{shape}>") } else { format!("[{shape}]") }
    }
}

/// A command in the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandDefinition {
    /// Name without the marker
    pub name: &'static str,
    /// One-line summary
    pub description: &'static str,
    /// Parameters in binding order
    pub parameters: &'static [CommandParameter],
    /// Example invocation
    pub example: &'static str,
}

impl CommandDefinition {
    /// Parameter named `name`.
    pub fn parameter(&self, name: &str) -> Option<&'static CommandParameter> {
        self.parameters.iter().find(|p| p.name == name)
    }

    /// Usage line, e.g. `/delegate <task> <@to>`.
    pub fn usage(&self, marker: char) -> String {
        let mut line = format!("{marker}{}", self.name);
        for param in self.parameters {
            line.push(' ');
            line.push_str(&param.usage());
        }
        line
    }
}

/// Task priorities accepted by `create-task`.
pub const PRIORITIES: &[&str] = &["low", "medium", "high", "urgent"];

static COMMANDS: &[CommandDefinition] = &[
    CommandDefinition {
        name: "create-task",
        description: "Create a task and assign it",
        parameters: &[
            CommandParameter::required("title", ParameterKind::Text, "What needs doing"),
            CommandParameter::required("assignee", ParameterKind::UserRef, "Who does it"),
            CommandParameter::optional("dueDate", ParameterKind::Date, "When it is due"),
            CommandParameter::optional("priority", ParameterKind::Enum(PRIORITIES), "Urgency"),
        ],
        example: "/create-task Fix login bug @alice 2024-03-01 high",
    },
    CommandDefinition {
        name: "set-milestone",
        description: "Set a project milestone",
        parameters: &[
            CommandParameter::required("name", ParameterKind::Text, "Milestone name"),
            CommandParameter::required("dueDate", ParameterKind::Date, "Target date"),
            CommandParameter::optional("description", ParameterKind::Text, "Details"),
        ],
        example: "/set-milestone Beta 2024-02-15",
    },
    CommandDefinition {
        name: "delegate",
        description: "Hand a task to another member",
        parameters: &[
            CommandParameter::required("task", ParameterKind::Text, "Task to hand over"),
            CommandParameter::required("to", ParameterKind::UserRef, "New owner"),
        ],
        example: "/delegate \"Write release notes\" @bob",
    },
    CommandDefinition {
        name: "link-reference",
        description: "Pin a link to the project",
        parameters: &[
            CommandParameter::required("url", ParameterKind::Text, "Link target"),
            CommandParameter::optional("label", ParameterKind::Text, "Link text"),
        ],
        example: "/link-reference https://example.com/docs Design notes",
    },
];

/// Read-only command catalog.
#[derive(Debug, Clone, Copy)]
pub struct Catalog {
    commands: &'static [CommandDefinition],
}

impl Default for Catalog {
    fn default() -> Self {
        Self::standard()
    }
}

impl Catalog {
    /// The built-in project commands.
    pub fn standard() -> Self {
        Self { commands: COMMANDS }
    }

    /// Exact lookup by name (without marker).
    pub fn get(&self, name: &str) -> Option<&'static CommandDefinition> {
        self.commands.iter().find(|c| c.name == name)
    }

    /// Commands whose name contains `query`, prefix matches first.
    pub fn candidates(&self, query: &str) -> Vec<&'static CommandDefinition> {
        let (mut prefixed, contained): (Vec<_>, Vec<_>) = self
            .commands
            .iter()
            .filter(|c| c.name.contains(query))
            .partition(|c| c.name.starts_with(query));
        prefixed.extend(contained);
        prefixed
    }

    /// All commands in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &'static CommandDefinition> {
        self.commands.iter()
    }

    /// Multi-line help text listing every command.
    pub fn help(&self, marker: char) -> String {
        let mut text = String::new();
        for command in self.commands {
            let _ = writeln!(text, "{}  {}", command.usage(marker), command.description);
        }
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn candidates_match_substrings() {
        let catalog = Catalog::standard();
        let names = |q: &str| catalog.candidates(q).iter().map(|c| c.name).collect::<Vec<_>>();

        assert_eq!(names("create"), vec!["create-task"]);
        assert_eq!(names("set"), vec!["set-milestone"]);
        assert_eq!(names("e"), vec!["create-task", "set-milestone", "delegate", "link-reference"]);
        assert!(names("deploy").is_empty());
    }

    #[test]
    fn prefix_matches_come_first() {
        let catalog = Catalog::standard();
        let names: Vec<_> = catalog.candidates("de").iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["delegate"]);

        let names: Vec<_> = catalog.candidates("l").iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["link-reference", "set-milestone", "delegate"]);
    }

    #[test]
    fn usage_marks_optional_parameters() {
        let catalog = Catalog::standard();
        insta::assert_snapshot!(catalog.help('/').trim_end(), @r"
        /create-task <title> <@assignee> [dueDate:YYYY-MM-DD] [priority:low|medium|high|urgent]  Create a task and assign it
        /set-milestone <name> <dueDate:YYYY-MM-DD> [description]  Set a project milestone
        /delegate <task> <@to>  Hand a task to another member
        /link-reference <url> [label]  Pin a link to the project
        ");
    }
}
