//! Static help content for the console.

/// One line of the command reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HelpEntry {
    pub usage: &'static str,
    pub summary: &'static str,
}

pub const COMMANDS: &[HelpEntry] = &[
    HelpEntry {
        usage: "help",
        summary: "print this help",
    },
    HelpEntry {
        usage: "ls",
        summary: "list all rooms; inside a room also lists its members",
    },
    HelpEntry {
        usage: "mkroom <name>",
        summary: "create an open room and join it",
    },
    HelpEntry {
        usage: "mkroom <name> close",
        summary: "create a closed room and join it",
    },
    HelpEntry {
        usage: "cd <room id>",
        summary: "join a room",
    },
    HelpEntry {
        usage: "cd <current room>",
        summary: "change your nickname",
    },
    HelpEntry {
        usage: "cd | cd ..",
        summary: "leave the current room",
    },
    HelpEntry {
        usage: "send",
        summary: "type your message on the next line",
    },
    HelpEntry {
        usage: "set open",
        summary: "let new members join (room owner only)",
    },
    HelpEntry {
        usage: "set close",
        summary: "stop new members joining (room owner only)",
    },
    HelpEntry {
        usage: "rm <room id>",
        summary: "dismiss a room (room owner only)",
    },
    HelpEntry {
        usage: "quit | exit",
        summary: "disconnect and leave",
    },
];

/// The command reference as printable text.
pub fn render() -> String {
    let width = COMMANDS.iter().map(|e| e.usage.len()).max().unwrap_or(0);
    let rule = "-".repeat(width + 40);

    let mut out = format!("{rule}\n");
    for entry in COMMANDS {
        out.push_str(&format!(" {:<width$}  {}\n", entry.usage, entry.summary));
    }
    out.push_str(&rule);
    out.push('\n');
    out
}
