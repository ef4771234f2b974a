use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, Wrap},
    Frame,
};

use crate::app::{App, View};
use crate::models::{AnalysisStatus, Keyword, Priority, SeoAnalysis, TrendStatus};
use crate::tui::InputMode;

pub fn draw(frame: &mut Frame, app: &App) {
    // Main horizontal split: 1/3 left, 2/3 right
    let main_chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Ratio(1, 3), Constraint::Ratio(2, 3)])
        .split(frame.area());

    let left_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Title bar
            Constraint::Min(0),    // Keyword list
            Constraint::Length(1), // Status line
        ])
        .split(main_chunks[0]);

    let right_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(0),
            Constraint::Length(1),
        ])
        .split(main_chunks[1]);

    render_header(frame, app, left_chunks[0]);
    render_keyword_list(frame, app, left_chunks[1]);
    render_left_status(frame, app, left_chunks[2]);

    match app.view {
        View::Keywords => {
            render_keyword_title(frame, app, right_chunks[0]);
            render_keyword_detail(frame, app, right_chunks[1]);
        }
        View::Trending => {
            render_view_title(frame, " Trending Queries ", trending_subtitle(app), right_chunks[0]);
            render_trending(frame, app, right_chunks[1]);
        }
        View::Suggestions => {
            render_view_title(
                frame,
                " Suggestions ",
                "Enter: track keyword | Tab: back".to_string(),
                right_chunks[0],
            );
            render_suggestions(frame, app, right_chunks[1]);
        }
    }
    render_right_status(frame, app, right_chunks[2]);

    if app.input_mode != InputMode::Normal {
        render_input(frame, app);
    }

    if app.show_help {
        render_help(frame);
    }
}

fn priority_color(priority: Priority) -> Color {
    match priority {
        Priority::High => Color::Red,
        Priority::Medium => Color::Yellow,
        Priority::Low => Color::Blue,
    }
}

fn score_color(score: u8) -> Color {
    match score {
        80..=100 => Color::Green,
        50..=79 => Color::Yellow,
        _ => Color::Red,
    }
}

fn render_header(frame: &mut Frame, app: &App, area: Rect) {
    let total = app.keywords.len();
    let with_url = app.keywords.iter().filter(|k| k.target_url.is_some()).count();

    let title = format!(" Keyword Intel [{}] ", app.filter.label());
    let stats = format!(" {total} Keywords | {with_url} With URL");

    let block = Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan));

    let inner = block.inner(area);
    frame.render_widget(block, area);

    let paragraph = Paragraph::new(stats).style(Style::default().fg(Color::White));
    frame.render_widget(paragraph, inner);
}

fn render_keyword_list(frame: &mut Frame, app: &App, area: Rect) {
    let items: Vec<ListItem> = app
        .keywords
        .iter()
        .map(|keyword| {
            let marker = if app.pending_analyses.contains(&keyword.id) {
                "… "
            } else if keyword.target_url.is_some() {
                "  "
            } else {
                "- "
            };

            let line = Line::from(vec![
                Span::styled(marker, Style::default().fg(Color::DarkGray)),
                Span::styled(
                    format!("[{}] ", keyword.priority),
                    Style::default().fg(priority_color(keyword.priority)),
                ),
                Span::styled(keyword.keyword.as_str(), Style::default().fg(Color::White)),
            ]);

            ListItem::new(line)
        })
        .collect();

    let border_style = if app.view == View::Keywords {
        Style::default()
    } else {
        Style::default().fg(Color::DarkGray)
    };

    let list = List::new(items)
        .block(Block::default().borders(Borders::ALL).border_style(border_style))
        .highlight_style(
            Style::default()
                .bg(Color::DarkGray)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("> ");

    let mut state = ListState::default();
    state.select((!app.keywords.is_empty()).then_some(app.selected_index));

    frame.render_stateful_widget(list, area, &mut state);
}

fn render_left_status(frame: &mut Frame, app: &App, area: Rect) {
    let (text, style) = match &app.status {
        Some(status) if status.is_error => (status.text.as_str(), Style::default().fg(Color::Red)),
        Some(status) => (status.text.as_str(), Style::default().fg(Color::Gray)),
        None => (
            "j/k:nav  Enter:analyze  a:add  t:trending  ?:help  q:quit",
            Style::default().fg(Color::DarkGray),
        ),
    };

    frame.render_widget(Paragraph::new(text).style(style), area);
}

fn render_keyword_title(frame: &mut Frame, app: &App, area: Rect) {
    let title = app
        .selected_keyword()
        .map(|k| k.keyword.as_str())
        .unwrap_or("No keyword selected. Press 'a' to add one");

    let block = Block::default()
        .title(" Keyword ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Green));

    let paragraph = Paragraph::new(title).block(block).wrap(Wrap { trim: true });
    frame.render_widget(paragraph, area);
}

fn render_view_title(frame: &mut Frame, title: &str, subtitle: String, area: Rect) {
    let block = Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Green));

    let paragraph = Paragraph::new(subtitle).block(block);
    frame.render_widget(paragraph, area);
}

fn render_keyword_detail(frame: &mut Frame, app: &App, area: Rect) {
    let block = Block::default()
        .title(" SEO Analysis ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Magenta));

    let Some(keyword) = app.selected_keyword() else {
        frame.render_widget(Paragraph::new("").block(block), area);
        return;
    };

    let mut lines = keyword_lines(keyword);
    lines.push(Line::from(""));

    match (&app.current_analysis, app.analysis_status) {
        (Some(analysis), _) => lines.extend(analysis_lines(analysis, keyword)),
        (None, AnalysisStatus::Analyzing) => lines.push(Line::from("Analyzing page...")),
        (None, AnalysisStatus::Failed) => {
            lines.push(Line::from("Analysis failed. Press Enter to retry."))
        }
        (None, AnalysisStatus::NoTargetUrl) => {
            lines.push(Line::from("No target URL. Press 'u' to set one."))
        }
        (None, _) => lines.push(Line::from("Press Enter to analyze the target page...")),
    }

    let paragraph = Paragraph::new(lines).block(block).wrap(Wrap { trim: false });
    frame.render_widget(paragraph, area);
}

fn keyword_lines(keyword: &Keyword) -> Vec<Line<'_>> {
    let label = |text: &'static str| Span::styled(text, Style::default().fg(Color::DarkGray));

    let mut lines = vec![
        Line::from(vec![
            label("Priority:  "),
            Span::styled(
                keyword.priority.as_str(),
                Style::default().fg(priority_color(keyword.priority)),
            ),
            label("   Focus: "),
            Span::raw(keyword.focus_score.to_string()),
            label("   Status: "),
            Span::raw(keyword.content_status.label()),
        ]),
        Line::from(vec![
            label("Target:    "),
            Span::raw(keyword.target_url.as_deref().unwrap_or("(none)")),
        ]),
    ];

    if let Some(category) = &keyword.category {
        lines.push(Line::from(vec![label("Category:  "), Span::raw(category.as_str())]));
    }
    if let Some(content_id) = &keyword.assigned_content_id {
        lines.push(Line::from(vec![label("Content:   "), Span::raw(content_id.as_str())]));
    }
    if let Some(notes) = &keyword.notes {
        lines.push(Line::from(vec![label("Notes:     "), Span::raw(notes.as_str())]));
    }

    lines
}

fn analysis_lines<'a>(analysis: &'a SeoAnalysis, keyword: &Keyword) -> Vec<Line<'a>> {
    let page = &analysis.page;
    let check = |ok: bool| {
        if ok {
            Span::styled("✓ ", Style::default().fg(Color::Green))
        } else {
            Span::styled("✗ ", Style::default().fg(Color::Red))
        }
    };

    let mut lines = vec![Line::from(vec![
        Span::raw("Score: "),
        Span::styled(
            format!("{}/100", page.seo_score),
            Style::default()
                .fg(score_color(page.seo_score))
                .add_modifier(Modifier::BOLD),
        ),
        Span::styled(
            format!("   analyzed {}", analysis.analyzed_at.format("%Y-%m-%d %H:%M")),
            Style::default().fg(Color::DarkGray),
        ),
    ])];

    if analysis.is_stale_for(keyword) {
        lines.push(Line::styled(
            format!("Stale: analyzed {}", page.target_url),
            Style::default().fg(Color::Yellow),
        ));
    }

    lines.push(Line::from(vec![
        check(page.meta_title_match),
        Span::raw(format!(
            "Title: {}",
            page.meta_title.as_deref().unwrap_or("(missing)")
        )),
    ]));
    lines.push(Line::from(vec![
        check(page.meta_description_match),
        Span::raw(format!(
            "Description: {}",
            page.meta_description.as_deref().unwrap_or("(missing)")
        )),
    ]));
    let h1 = match page.h1_matches.first() {
        Some(heading) => heading.clone(),
        None if page.has_h1 => "(keyword not in H1)".to_string(),
        None => "(missing)".to_string(),
    };
    lines.push(Line::from(vec![
        check(!page.h1_matches.is_empty()),
        Span::raw(format!("H1: {h1}")),
    ]));
    lines.push(Line::from(format!(
        "  Density: {:.2}% ({} of {} words)",
        page.keyword_density, page.keyword_count, page.word_count
    )));

    if !page.recommendations.is_empty() {
        lines.push(Line::from(""));
        lines.push(Line::styled(
            "Recommendations:",
            Style::default().add_modifier(Modifier::BOLD),
        ));
        for rec in &page.recommendations {
            lines.push(Line::from(vec![
                Span::styled(
                    format!("  [{}] ", rec.priority),
                    Style::default().fg(priority_color(rec.priority)),
                ),
                Span::raw(rec.message.as_str()),
            ]));
        }
    }

    lines
}

fn trending_subtitle(app: &App) -> String {
    match app.trend_status {
        TrendStatus::Idle => "Press 't' to sync Search Console".to_string(),
        TrendStatus::Syncing => "Syncing Search Console...".to_string(),
        TrendStatus::Ready => format!(
            "Last {days} days vs previous {days} | Enter: track query",
            days = app.trending_days()
        ),
        TrendStatus::NotConnected => "Search Console not connected".to_string(),
        TrendStatus::Failed => "Sync failed. Press 't' to retry".to_string(),
    }
}

fn render_trending(frame: &mut Frame, app: &App, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Magenta));

    if app.trend_status == TrendStatus::NotConnected {
        let text = "Google Search Console is not connected.\n\n\
            Add a [gsc] table (client_id, client_secret, site_url) to the config file,\n\
            then run:\n\n  keyword-intel --gsc-auth-url\n  keyword-intel --gsc-connect <code>";
        frame.render_widget(Paragraph::new(text).block(block).wrap(Wrap { trim: false }), area);
        return;
    }

    let items: Vec<ListItem> = app
        .trending
        .iter()
        .map(|query| {
            let change = if query.is_new {
                Span::styled(" NEW ", Style::default().fg(Color::Black).bg(Color::Green))
            } else {
                let color = if query.clicks_change >= 0.0 { Color::Green } else { Color::Red };
                Span::styled(
                    format!("{:+.0}%", query.clicks_change),
                    Style::default().fg(color),
                )
            };
            let tracked = if app.is_tracked(&query.keyword) { "● " } else { "  " };

            ListItem::new(Line::from(vec![
                Span::styled(tracked, Style::default().fg(Color::Cyan)),
                Span::styled(
                    format!("{:>6.1} ", query.trend_score),
                    Style::default().fg(Color::DarkGray),
                ),
                Span::raw(format!("{:<40} ", query.keyword)),
                Span::raw(format!(
                    "{} clicks ({} prev) ",
                    query.current_clicks, query.previous_clicks
                )),
                change,
            ]))
        })
        .collect();

    let list = List::new(items)
        .block(block)
        .highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD))
        .highlight_symbol("> ");

    let mut state = ListState::default();
    state.select((!app.trending.is_empty()).then_some(app.trending_index));
    frame.render_stateful_widget(list, area, &mut state);
}

fn render_suggestions(frame: &mut Frame, app: &App, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Magenta));

    if app.suggestions_loading {
        frame.render_widget(Paragraph::new("Asking Claude for keyword ideas...").block(block), area);
        return;
    }

    let items: Vec<ListItem> = app
        .suggestions
        .iter()
        .map(|s| {
            let mut lines = vec![Line::from(vec![
                Span::styled(
                    format!("[{}] ", s.priority),
                    Style::default().fg(priority_color(s.priority)),
                ),
                Span::styled(s.keyword.as_str(), Style::default().add_modifier(Modifier::BOLD)),
                Span::styled(
                    format!("  focus {}", s.focus_score),
                    Style::default().fg(Color::DarkGray),
                ),
            ])];
            if let Some(rationale) = &s.rationale {
                lines.push(Line::styled(
                    format!("    {rationale}"),
                    Style::default().fg(Color::Gray),
                ));
            }
            ListItem::new(lines)
        })
        .collect();

    let list = List::new(items)
        .block(block)
        .highlight_style(Style::default().bg(Color::DarkGray))
        .highlight_symbol("> ");

    let mut state = ListState::default();
    state.select((!app.suggestions.is_empty()).then_some(app.suggestion_index));
    frame.render_stateful_widget(list, area, &mut state);
}

fn render_right_status(frame: &mut Frame, app: &App, area: Rect) {
    let analysis = match app.analysis_status {
        AnalysisStatus::NotAnalyzed => "",
        AnalysisStatus::Analyzing => "⏳ Analyzing...",
        AnalysisStatus::Analyzed => "✓ Analyzed",
        AnalysisStatus::Failed => "❌ Failed",
        AnalysisStatus::NoTargetUrl => "⚠️  No target URL",
    };

    let pending = match app.pending_analyses.len() {
        0 => String::new(),
        n => format!(" | {n} pending (Esc to cancel)"),
    };

    let paragraph = Paragraph::new(format!("{analysis}{pending}"))
        .style(Style::default().fg(Color::DarkGray));
    frame.render_widget(paragraph, area);
}

fn render_input(frame: &mut Frame, app: &App) {
    let area = centered_rect(60, 20, frame.area());

    let block = Block::default()
        .title(app.input_mode.title())
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow));

    let inner = block.inner(area);

    frame.render_widget(Clear, area);
    frame.render_widget(block, area);

    let text = if app.input_mode == InputMode::ConfirmDelete {
        app.selected_keyword()
            .map(|k| format!("Delete \"{}\" and its analysis?", k.keyword))
            .unwrap_or_default()
    } else {
        format!("> {}_", app.input)
    };
    let paragraph = Paragraph::new(text).style(Style::default().fg(Color::White));
    frame.render_widget(paragraph, inner);
}

fn render_help(frame: &mut Frame) {
    let area = centered_rect(50, 70, frame.area());

    let help_text = [
        "",
        " Navigation:",
        "   j / ↓    Move down",
        "   k / ↑    Move up",
        "   Enter    Analyze / track / accept",
        "   Tab      Back to keywords",
        "",
        " Keywords:",
        "   a        Add keyword (keyword | url)",
        "   u        Set target URL",
        "   p        Cycle priority",
        "   s        Cycle content status",
        "   + / -    Adjust focus score",
        "   d        Delete keyword",
        "   f        Cycle priority filter",
        "   /        Search",
        "   o        Open target URL",
        "",
        " Analysis:",
        "   A        Analyze all",
        "   Esc      Cancel running analyses",
        "   t        Trending queries (Search Console)",
        "   g        Suggest keywords (Claude)",
        "",
        " General:",
        "   ?        Toggle this help",
        "   q        Quit",
        "",
        " Press any key to close",
    ];

    let block = Block::default()
        .title(" Help ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan));

    let paragraph = Paragraph::new(help_text.join("\n"))
        .block(block)
        .style(Style::default().fg(Color::White));

    frame.render_widget(Clear, area);
    frame.render_widget(paragraph, area);
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}
