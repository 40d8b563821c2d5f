use console::{Alignment, Style, Term, measure_text_width, pad_str, style, truncate_str};
use ember_core::agent::{AgentEvent, StopReason};
use ember_core::traits::{ToolKind, ToolResult};
use ember_core::utils::display_path_rel_to_cwd;
use serde_json::{Map, Value};
use std::path::PathBuf;

const MAX_PANEL_WIDTH: usize = 100;
const PATH_KEYS: &[&str] = &["path", "cwd"];

fn preferred_order(tool_name: &str) -> &'static [&'static str] {
    match tool_name {
        "read_file" => &["path", "offset", "limit"],
        "write_file" => &["path", "content"],
        "shell" => &["command", "timeout_secs"],
        _ => &[],
    }
}

fn kind_style(kind: Option<ToolKind>) -> Style {
    match kind {
        Some(ToolKind::Read) => Style::new().cyan(),
        Some(ToolKind::Write) => Style::new().yellow(),
        Some(ToolKind::Shell) => Style::new().magenta(),
        Some(ToolKind::Network) => Style::new().blue().bright(),
        Some(ToolKind::Memory) => Style::new().green(),
        Some(ToolKind::Mcp) => Style::new().cyan().bright(),
        None => Style::new().magenta().bright().bold(),
    }
}

fn short_id(call_id: &str) -> &str {
    call_id.get(..8).unwrap_or(call_id)
}

/// Arguments in display order: the tool's preferred keys first, then the rest sorted.
pub fn ordered_args<'a>(tool_name: &str, args: &'a Map<String, Value>) -> Vec<(&'a str, &'a Value)> {
    let preferred = preferred_order(tool_name);
    let mut ordered: Vec<(&str, &Value)> = preferred
        .iter()
        .filter_map(|key| args.get_key_value(*key))
        .map(|(k, v)| (k.as_str(), v))
        .collect();

    let mut rest: Vec<(&str, &Value)> = args
        .iter()
        .filter(|(k, _)| !preferred.contains(&k.as_str()))
        .map(|(k, v)| (k.as_str(), v))
        .collect();
    rest.sort_by(|a, b| a.0.cmp(b.0));

    ordered.extend(rest);
    ordered
}

fn format_value(key: &str, value: &Value, cwd: &std::path::Path) -> String {
    let text = match value {
        Value::String(s) if PATH_KEYS.contains(&key) => display_path_rel_to_cwd(s, Some(cwd)),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };

    let mut lines = text.lines();
    let first = lines.next().unwrap_or_default().to_string();
    let more = lines.count();
    if more > 0 {
        format!("{} … (+{} lines)", first, more)
    } else {
        first
    }
}

/// Renders a bordered panel announcing a tool call.
pub fn render_tool_panel(
    call_id: &str,
    name: &str,
    kind: Option<ToolKind>,
    args: &Map<String, Value>,
    cwd: &std::path::Path,
    width: usize,
) -> Vec<String> {
    let border = kind_style(kind);
    let inner = width.saturating_sub(4).max(20);

    let title = format!(
        " {} {}  {} ",
        style("●").dim(),
        style(name).magenta().bright().bold(),
        style(format!("#{}", short_id(call_id))).dim()
    );
    let status = format!(" {} ", style("running").dim());
    let fill = (inner + 2)
        .saturating_sub(1 + measure_text_width(&title) + measure_text_width(&status) + 1);

    let mut lines = vec![format!(
        "{}{}{}{}{}",
        border.apply_to("╭─"),
        title,
        border.apply_to("─".repeat(fill)),
        status,
        border.apply_to("─╮")
    )];

    let side = border.apply_to("│").to_string();
    let row = |content: String| {
        let content = truncate_str(&content, inner, "…");
        format!(
            "{} {} {}",
            side,
            pad_str(&content, inner, Alignment::Left, None),
            side
        )
    };

    lines.push(row(String::new()));
    if args.is_empty() {
        lines.push(row(style("no args").dim().to_string()));
    } else {
        let ordered = ordered_args(name, args);
        let key_width = ordered.iter().map(|(k, _)| k.len()).max().unwrap_or(0);
        for (key, value) in ordered {
            let label = pad_str(key, key_width, Alignment::Right, None);
            lines.push(row(format!(
                "{}  {}",
                style(label).dim(),
                format_value(key, value, cwd)
            )));
        }
    }
    lines.push(row(String::new()));
    lines.push(border.apply_to(format!("╰{}╯", "─".repeat(inner + 2))).to_string());
    lines
}

pub fn render_tool_result(call_id: &str, name: &str, result: &ToolResult) -> String {
    let id = style(format!("#{}", short_id(call_id))).dim();
    if result.success {
        let line_count = result.output.lines().count();
        let truncated = if result.truncated { ", truncated" } else { "" };
        format!(
            "{} {} {} {}",
            style("✓").green(),
            style(name).bold(),
            id,
            style(format!("({} lines{})", line_count, truncated)).dim()
        )
    } else {
        format!(
            "{} {} {} {}",
            style("✗").red(),
            style(name).bold(),
            id,
            style(result.error.as_deref().unwrap_or("failed")).red()
        )
    }
}

pub struct Tui {
    term: Term,
    cwd: PathBuf,
    assistant_open: bool,
}

impl Tui {
    pub fn new(cwd: impl Into<PathBuf>) -> Self {
        Self {
            term: Term::stdout(),
            cwd: cwd.into(),
            assistant_open: false,
        }
    }

    fn width(&self) -> usize {
        (self.term.size().1 as usize).clamp(40, MAX_PANEL_WIDTH)
    }

    pub fn handle_event(&mut self, event: &AgentEvent) {
        match event {
            AgentEvent::RunStarted { .. } => {}
            AgentEvent::TextDelta { content } => self.stream_assistant_delta(content),
            AgentEvent::TextComplete { .. } => self.end_assistant(),
            AgentEvent::ToolCallStarted {
                call_id,
                name,
                kind,
                arguments,
            } => self.tool_call_start(call_id, name, *kind, arguments),
            AgentEvent::ToolCallFinished {
                call_id,
                name,
                result,
            } => self.print(&render_tool_result(call_id, name, result)),
            AgentEvent::RunError { message } => {
                self.end_assistant();
                self.print(&format!("{} {}", style("error:").red().bold(), message));
            }
            AgentEvent::RunEnded { stop_reason, .. } => self.run_ended(*stop_reason),
        }
    }

    fn print(&self, line: &str) {
        let _ = self.term.write_line(line);
    }

    fn begin_assistant(&mut self) {
        self.print("");
        let label = " Assistant ";
        let rule = "─".repeat(self.width().saturating_sub(label.len()) / 2);
        self.print(&format!(
            "{}{}{}",
            style(&rule).dim(),
            style(label).white().bright(),
            style(&rule).dim()
        ));
        self.assistant_open = true;
    }

    fn end_assistant(&mut self) {
        if self.assistant_open {
            self.print("");
        }
        self.assistant_open = false;
    }

    fn stream_assistant_delta(&mut self, content: &str) {
        if !self.assistant_open {
            self.begin_assistant();
        }
        let _ = self.term.write_str(content);
    }

    fn tool_call_start(
        &mut self,
        call_id: &str,
        name: &str,
        kind: Option<ToolKind>,
        arguments: &Map<String, Value>,
    ) {
        self.end_assistant();
        self.print("");
        for line in render_tool_panel(call_id, name, kind, arguments, &self.cwd, self.width()) {
            self.print(&line);
        }
    }

    fn run_ended(&mut self, stop_reason: StopReason) {
        self.end_assistant();
        match stop_reason {
            StopReason::Completed => {}
            StopReason::MaxTurns => self.print(&format!(
                "{}",
                style("Stopped: turn limit reached before the task finished (incomplete).")
                    .yellow()
            )),
            StopReason::StreamFailed => self.print(&format!(
                "{}",
                style("Stopped: the model response failed.").red()
            )),
        }
    }
}
