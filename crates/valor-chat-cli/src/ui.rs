//! UI rendering with ratatui.
//!
//! Single chat column: header, messages, staged attachments, input, status.

use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style, Stylize};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{
    Block, Borders, Clear, Paragraph, Scrollbar, ScrollbarOrientation, ScrollbarState, Wrap,
};
use ratatui::Frame;
use valor_chat_core::turn::ERROR_PREFIX;
use valor_chat_core::{Message, Role};

use crate::app::{App, BackendHealth, InputMode};

/// Horizontal padding for chat content.
const CHAT_PADDING: u16 = 2;

/// Render the UI.
pub fn render(frame: &mut Frame, app: &App) {
    let area = frame.area();
    let strip_height = u16::from(!app.staging.is_empty());

    let main_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),            // Header bar
            Constraint::Min(3),               // Messages
            Constraint::Length(strip_height), // Staged attachments
            Constraint::Length(1),            // Separator
            Constraint::Length(1),            // Input line
            Constraint::Length(1),            // Status bar
        ])
        .split(area);

    render_header_bar(frame, app, main_layout[0]);
    render_messages(frame, app, main_layout[1]);
    if strip_height > 0 {
        render_attachment_strip(frame, app, main_layout[2]);
    }
    render_input_line(frame, app, main_layout[3], main_layout[4]);
    render_status_bar(frame, app, main_layout[5]);

    if app.input_mode == InputMode::AttachingFile {
        render_attach_dialog(frame, app, area);
    }
}

/// Truncate a string in the middle with ellipsis if it exceeds `max_len` chars.
fn truncate_middle(s: &str, max_len: usize) -> String {
    let len = s.chars().count();
    if len <= max_len {
        return s.to_string();
    }
    if max_len < 5 {
        return s.chars().take(max_len).collect();
    }
    let keep = (max_len - 3) / 2;
    let start: String = s.chars().take(keep).collect();
    let end: String = s.chars().skip(len - keep).collect();
    format!("{start}...{end}")
}

/// Render the header bar with title, model and backend status.
fn render_header_bar(frame: &mut Frame, app: &App, area: Rect) {
    let (status_text, status_style) = match app.backend {
        BackendHealth::Unknown => ("checking", Style::default().fg(Color::Yellow)),
        BackendHealth::Up => ("connected", Style::default().fg(Color::Green)),
        BackendHealth::Down(_) => ("disconnected", Style::default().fg(Color::Red)),
    };

    let title = format!("VALOR MM · {}", app.model.short_name());
    let max_url_width = (area.width as usize / 2).saturating_sub(15);
    let display_url = truncate_middle(app.base_url(), max_url_width);
    let right_text = format!("{display_url} [{status_text}]");
    let padding = (area.width as usize)
        .saturating_sub(title.chars().count() + right_text.chars().count());

    let line = Line::from(vec![
        Span::styled(title, Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)),
        Span::raw(" ".repeat(padding)),
        Span::raw(display_url),
        Span::raw(" ["),
        Span::styled(status_text, status_style),
        Span::raw("]"),
    ]);

    let header = Paragraph::new(line).style(Style::default().bg(Color::DarkGray));
    frame.render_widget(header, area);
}

/// Lines for one message.
fn message_lines<'a>(message: &'a Message, pending: bool, spinner: &'static str) -> Vec<Line<'a>> {
    let mut lines = Vec::new();
    match message.role {
        Role::User => {
            let mut content = message.content.lines();
            lines.push(Line::from(vec![
                Span::styled(
                    "[You] ",
                    Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
                ),
                Span::styled(content.next().unwrap_or(""), Style::default().fg(Color::White)),
            ]));
            lines.extend(
                content.map(|l| Line::from(Span::styled(l, Style::default().fg(Color::White)))),
            );
            for attachment in &message.attachments {
                let icon = if attachment.is_image() { "🖼" } else { "📄" };
                lines.push(Line::from(Span::styled(
                    format!("      {icon} {} ({})", attachment.name, attachment.mime_type),
                    Style::default().fg(Color::DarkGray),
                )));
            }
        }
        Role::Assistant => {
            lines.push(Line::from(Span::styled(
                "[ValorMM]",
                Style::default().fg(Color::Green).add_modifier(Modifier::BOLD),
            )));
            if pending && message.content.is_empty() {
                lines.push(Line::from(vec![
                    Span::styled(spinner, Style::default().fg(Color::Yellow)),
                    Span::styled(" thinking...", Style::default().fg(Color::DarkGray)),
                ]));
            } else {
                let style = if message.content.starts_with(ERROR_PREFIX) {
                    Style::default().fg(Color::Red)
                } else {
                    Style::default()
                };
                lines.extend(message.content.lines().map(|l| Line::from(Span::styled(l, style))));
                if pending {
                    lines.push(Line::from(Span::styled(
                        spinner,
                        Style::default().fg(Color::Yellow),
                    )));
                }
            }
        }
    }
    lines.push(Line::from(""));
    lines
}

/// Render the message list.
fn render_messages(frame: &mut Frame, app: &App, area_full: Rect) {
    let chat_area = Rect::new(
        area_full.x + CHAT_PADDING,
        area_full.y,
        area_full.width.saturating_sub(CHAT_PADDING * 2 + 1),
        area_full.height,
    );
    let content_width = chat_area.width as usize;

    if app.conversation.is_empty() {
        let help = Paragraph::new(
            "Type a message and press Enter. Esc then [a] attaches an image or PDF, \
             or drop files onto the terminal.",
        )
        .style(Style::default().fg(Color::DarkGray))
        .wrap(Wrap { trim: true });
        frame.render_widget(help, chat_area);
        return;
    }

    let pending = app.turn.target();
    let spinner = app.spinner_char();
    let lines: Vec<Line> = app
        .conversation
        .messages()
        .iter()
        .flat_map(|m| message_lines(m, pending == Some(m.id), spinner))
        .collect();

    let text = Text::from(lines);
    let visible_lines = chat_area.height as usize;
    let total_wrapped_lines = calculate_wrapped_line_count(&text, content_width);
    let max_scroll = total_wrapped_lines.saturating_sub(visible_lines);
    let effective_scroll = app.chat_scroll.min(max_scroll);

    // chat_scroll counts up from the bottom; Paragraph scrolls down from the top
    let scroll_offset = max_scroll.saturating_sub(effective_scroll);

    let paragraph = Paragraph::new(text)
        .wrap(Wrap { trim: false })
        .scroll((u16::try_from(scroll_offset).unwrap_or(u16::MAX), 0));
    frame.render_widget(paragraph, chat_area);

    if total_wrapped_lines > visible_lines {
        let scrollbar = Scrollbar::new(ScrollbarOrientation::VerticalRight)
            .begin_symbol(Some("▲"))
            .end_symbol(Some("▼"));
        let mut scrollbar_state = ScrollbarState::new(total_wrapped_lines)
            .position(scroll_offset)
            .viewport_content_length(visible_lines);
        frame.render_stateful_widget(scrollbar, area_full, &mut scrollbar_state);
    }
}

/// Render the staged attachments as a numbered strip.
fn render_attachment_strip(frame: &mut Frame, app: &App, area: Rect) {
    let mut spans = vec![Span::styled(" 📎 ", Style::default().fg(Color::Yellow))];
    for preview in app.staging.previews() {
        let icon = if preview.is_image { "🖼" } else { "📄" };
        spans.push(Span::styled(
            format!("[{}]", preview.index + 1),
            Style::default().fg(Color::Yellow),
        ));
        spans.push(Span::raw(format!(" {icon} {}  ", preview.name)));
    }
    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

/// Render the input line with its separator.
fn render_input_line(frame: &mut Frame, app: &App, separator_area: Rect, input_area: Rect) {
    let separator = Paragraph::new("─".repeat(separator_area.width as usize))
        .style(Style::default().fg(Color::DarkGray));
    frame.render_widget(separator, separator_area);

    let in_modal = app.input_mode != InputMode::Normal;
    let prompt = if app.command_mode { ": " } else { "> " };
    let input_text = if in_modal { "" } else { app.input.as_str() };

    let prompt_color = if app.command_mode { Color::DarkGray } else { Color::Cyan };
    let input_line = Line::from(vec![
        Span::styled(prompt, Style::default().fg(prompt_color)),
        Span::styled(input_text, Style::default().fg(Color::White)),
    ]);
    frame.render_widget(Paragraph::new(input_line), input_area);

    // Hide cursor during streaming to prevent flickering
    if !in_modal && !app.command_mode && !app.is_busy() {
        let x = input_area.x + 2 + u16::try_from(app.cursor_position).unwrap_or(u16::MAX);
        frame.set_cursor_position((x.min(input_area.right().saturating_sub(1)), input_area.y));
    }
}

/// Render the status bar.
fn render_status_bar(frame: &mut Frame, app: &App, area: Rect) {
    let mode_indicator = match (&app.input_mode, app.command_mode) {
        (InputMode::AttachingFile, _) => {
            Span::styled(" ATTACH ", Style::default().fg(Color::Black).bg(Color::Magenta))
        }
        (InputMode::Normal, true) => {
            Span::styled(" COMMAND ", Style::default().fg(Color::Black).bg(Color::Blue))
        }
        (InputMode::Normal, false) => {
            Span::styled(" INSERT ", Style::default().fg(Color::Black).bg(Color::Green))
        }
    };

    let key = |k: &'static str| Span::styled(k, Style::default().fg(Color::Yellow));

    let status = if let Some(ref error) = app.error_message {
        Line::from(vec![
            mode_indicator,
            Span::styled(" ERROR: ", Style::default().fg(Color::Red).bold()),
            Span::styled(error, Style::default().fg(Color::Red)),
        ])
    } else if let BackendHealth::Down(ref reason) = app.backend {
        Line::from(vec![
            mode_indicator,
            Span::styled(" ⚠ backend unreachable: ", Style::default().fg(Color::Yellow).bold()),
            Span::styled(reason, Style::default().fg(Color::Yellow)),
        ])
    } else if let Some(ref status) = app.status_message {
        Line::from(vec![
            mode_indicator,
            Span::styled(format!(" {status}"), Style::default().fg(Color::Green)),
        ])
    } else if app.command_mode {
        Line::from(vec![
            mode_indicator,
            Span::raw(" "),
            key("a"),
            Span::raw(":attach "),
            key("1-9"),
            Span::raw(":remove "),
            key("x"),
            Span::raw(":clear files "),
            key("j/k"),
            Span::raw(":scroll "),
            key("q"),
            Span::raw(":quit "),
            key("Esc"),
            Span::raw(":type"),
        ])
    } else {
        Line::from(vec![
            mode_indicator,
            Span::raw(" "),
            key("Enter"),
            Span::raw(":send "),
            key("Esc"),
            Span::raw(":commands "),
            key("PgUp/PgDn"),
            Span::raw(":scroll"),
        ])
    };

    let status_bar = Paragraph::new(status).style(Style::default().bg(Color::DarkGray));
    frame.render_widget(status_bar, area);
}

/// Render the attach-file dialog.
fn render_attach_dialog(frame: &mut Frame, app: &App, area: Rect) {
    let dialog_width = 70.min(area.width.saturating_sub(4));
    let dialog_height = 9.min(area.height.saturating_sub(4));

    let dialog_area = Rect::new(
        area.x + (area.width.saturating_sub(dialog_width)) / 2,
        area.y + (area.height.saturating_sub(dialog_height)) / 2,
        dialog_width,
        dialog_height,
    );

    frame.render_widget(Clear, dialog_area);

    let block = Block::default()
        .title(" Attach File ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan));

    let inner = block.inner(dialog_area);
    frame.render_widget(block, dialog_area);

    let layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1), // Label
            Constraint::Length(1), // Spacer
            Constraint::Length(3), // Input box
            Constraint::Length(1), // Help text
        ])
        .split(inner);

    let label = Paragraph::new("Path to an image or PDF:").style(Style::default().fg(Color::White));
    frame.render_widget(label, layout[0]);

    let input_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan));
    let input = Paragraph::new(app.input.as_str())
        .style(Style::default().fg(Color::Yellow))
        .block(input_block);
    frame.render_widget(input, layout[2]);

    let help = Paragraph::new("Enter to attach, Esc to cancel")
        .style(Style::default().fg(Color::DarkGray));
    frame.render_widget(help, layout[3]);

    let x = layout[2].x + 1 + u16::try_from(app.cursor_position).unwrap_or(u16::MAX);
    frame.set_cursor_position((x.min(layout[2].right().saturating_sub(2)), layout[2].y + 1));
}

/// Calculate the number of visual lines after text wrapping.
fn calculate_wrapped_line_count(text: &Text, available_width: usize) -> usize {
    if available_width == 0 {
        return text.lines.len();
    }
    text.lines
        .iter()
        .map(|line| line.width().div_ceil(available_width).max(1))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ratatui::backend::TestBackend;
    use ratatui::Terminal;
    use valor_chat_core::{ModelConfig, TurnEvent};

    fn draw(app: &App) -> String {
        let mut terminal = Terminal::new(TestBackend::new(80, 20)).unwrap();
        terminal.draw(|f| render(f, app)).unwrap();
        let buffer = terminal.backend().buffer();
        buffer
            .content()
            .chunks(buffer.area.width as usize)
            .map(|row| row.iter().map(ratatui::buffer::Cell::symbol).collect::<String>())
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[test]
    fn truncate_middle_keeps_ends() {
        assert_eq!(truncate_middle("http://example.com", 50), "http://example.com");
        assert_eq!(truncate_middle("abcdefghijkl", 9), "abc...jkl");
    }

    #[test]
    fn wrapped_line_count_rounds_up() {
        let text = Text::from(vec![Line::from("x".repeat(25)), Line::from("")]);
        assert_eq!(calculate_wrapped_line_count(&text, 10), 4);
    }

    #[test]
    fn renders_conversation_and_spinner() {
        let mut app = App::new("http://127.0.0.1:8000", ModelConfig::default());
        app.insert_str("hello there");
        app.submit().unwrap();

        let screen = draw(&app);
        assert!(screen.contains("[You] hello there"));
        assert!(screen.contains("thinking..."));
        assert!(screen.contains("Qwen2-VL-2B-Instruct"));

        app.handle_turn_event(TurnEvent::Delta(" General Kenobi".to_string()));
        app.handle_turn_event(TurnEvent::Ended);
        let screen = draw(&app);
        assert!(screen.contains("General Kenobi"));
        assert!(!screen.contains("thinking..."));
    }

    #[test]
    fn renders_attach_dialog() {
        let mut app = App::new("http://127.0.0.1:8000", ModelConfig::default());
        app.enter_dialog_mode(InputMode::AttachingFile);
        let screen = draw(&app);
        assert!(screen.contains("Attach File"));
        assert!(screen.contains("ATTACH"));
    }
}
