//! UI rendering functions
//!
//! Two tabs:
//! - Overview: GPU table plus one live panel per GPU
//! - History: one peak panel per GPU over the rolling window

use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Paragraph, Row, Table, Tabs},
    Frame,
};

use super::app::{App, DevicePanel};
use crate::analyzer::Bottleneck;
use crate::baseline::Baseline;

/// Color palette
mod colors {
    use ratatui::style::Color;

    pub const TITLE: Color = Color::Cyan;
    pub const LABEL: Color = Color::Cyan;
    pub const VALUE: Color = Color::Yellow;
    pub const SEPARATOR: Color = Color::DarkGray;
    pub const LIVE_BORDER: Color = Color::Green;
    pub const PEAK_BORDER: Color = Color::Yellow;
}

const BAR_WIDTH: usize = 20;
const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Display color for a bottleneck category
pub fn bottleneck_color(bottleneck: Bottleneck) -> Color {
    match bottleneck {
        Bottleneck::MemoryBound => Color::Cyan,
        Bottleneck::ComputeBound => Color::Blue,
        Bottleneck::ThermalThrottling => Color::Red,
        Bottleneck::PowerLimited => Color::Yellow,
        Bottleneck::Balanced => Color::Green,
        Bottleneck::Idle => Color::DarkGray,
        Bottleneck::Unknown => Color::White,
    }
}

/// Text progress bar; the ratio is clamped to [0, 1]
pub fn make_bar(value: f64, max_value: f64, width: usize) -> String {
    let ratio = if max_value > 0.0 && value.is_finite() {
        (value / max_value).clamp(0.0, 1.0)
    } else {
        0.0
    };

    let filled = (ratio * width as f64) as usize;
    format!("{}{}", "█".repeat(filled), "░".repeat(width - filled))
}

fn gib(bytes: u64) -> f64 {
    bytes as f64 / GIB
}

/// Main drawing function
pub fn draw(f: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Header
            Constraint::Min(5),    // Content
            Constraint::Length(3), // Footer
        ])
        .split(f.area());

    draw_header(f, app, chunks[0]);
    match app.selected_tab {
        0 => draw_overview(f, app, chunks[1]),
        _ => draw_history(f, app, chunks[1]),
    }
    draw_footer(f, app, chunks[2]);
}

fn draw_header(f: &mut Frame, app: &App, area: Rect) {
    let titles: Vec<Line> = app.tabs.iter().map(|t| Line::from(*t)).collect();

    let title = Line::from(vec![
        Span::styled(
            " NVSonar ",
            Style::default()
                .fg(colors::TITLE)
                .add_modifier(Modifier::BOLD),
        ),
        Span::styled("│", Style::default().fg(colors::SEPARATOR)),
        Span::raw(format!(" GPU Diagnostic Tool @ {} ", app.hostname)),
        Span::styled("│", Style::default().fg(colors::SEPARATOR)),
        Span::raw(format!(" GPUs: {} ", app.panels.len())),
    ]);

    let tabs = Tabs::new(titles)
        .block(Block::default().borders(Borders::ALL).title(title))
        .select(app.selected_tab)
        .style(Style::default().fg(Color::Cyan))
        .highlight_style(
            Style::default()
                .add_modifier(Modifier::BOLD)
                .bg(Color::Cyan)
                .fg(Color::Black),
        );

    f.render_widget(tabs, area);
}

/// Centered one-line notice inside a bordered block
fn draw_notice(f: &mut Frame, area: Rect, text: &str, color: Color) {
    let notice = Paragraph::new(Span::styled(text.to_string(), Style::default().fg(color)))
        .block(Block::default().borders(Borders::ALL))
        .alignment(Alignment::Center);
    f.render_widget(notice, area);
}

fn draw_overview(f: &mut Frame, app: &App, area: Rect) {
    if !app.library_available {
        draw_notice(f, area, "Failed to initialize NVML", Color::Red);
        return;
    }
    if app.panels.is_empty() {
        draw_notice(f, area, "No GPUs found", Color::Yellow);
        return;
    }

    let table_height = app.devices.len() as u16 + 4;
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(table_height), Constraint::Min(0)])
        .split(area);

    draw_device_table(f, app, chunks[0]);
    draw_panels(f, app, chunks[1], PanelKind::Live);
}

fn draw_history(f: &mut Frame, app: &App, area: Rect) {
    if app.panels.is_empty() {
        draw_notice(f, area, "No peak data available", Color::Yellow);
        return;
    }
    if app.panels.iter().all(|p| p.peaks.is_none()) {
        draw_notice(
            f,
            area,
            "No peak data yet - run a workload to collect data",
            Color::DarkGray,
        );
        return;
    }

    draw_panels(f, app, area, PanelKind::Peak);
}

fn draw_device_table(f: &mut Frame, app: &App, area: Rect) {
    let header = Row::new(vec!["Index", "Name", "Memory", "Driver", "CUDA"])
        .style(Style::default().add_modifier(Modifier::BOLD));

    let rows: Vec<Row> = app
        .devices
        .iter()
        .map(|d| {
            Row::new(vec![
                Cell::from(d.index.to_string()).style(Style::default().fg(Color::Cyan)),
                Cell::from(d.name.clone()).style(Style::default().fg(Color::Green)),
                Cell::from(format!("{:.1} GB", gib(d.memory_total)))
                    .style(Style::default().fg(Color::Yellow)),
                Cell::from(d.driver_version.clone()).style(Style::default().fg(Color::Magenta)),
                Cell::from(d.cuda_version.clone()).style(Style::default().fg(Color::Blue)),
            ])
        })
        .collect();

    let table = Table::new(
        rows,
        [
            Constraint::Length(6),
            Constraint::Min(24),
            Constraint::Length(10),
            Constraint::Length(14),
            Constraint::Length(6),
        ],
    )
    .header(header)
    .block(
        Block::default()
            .borders(Borders::ALL)
            .title("Available GPUs"),
    );

    f.render_widget(table, area);
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum PanelKind {
    Live,
    Peak,
}

fn draw_panels(f: &mut Frame, app: &App, area: Rect, kind: PanelKind) {
    let panels: Vec<&DevicePanel> = match kind {
        PanelKind::Live => app.panels.iter().collect(),
        PanelKind::Peak => app.panels.iter().filter(|p| p.peaks.is_some()).collect(),
    };
    if panels.is_empty() {
        return;
    }

    let constraints: Vec<Constraint> =
        std::iter::repeat(Constraint::Ratio(1, panels.len() as u32))
            .take(panels.len())
            .collect();
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints(constraints)
        .split(area);

    for (panel, chunk) in panels.into_iter().zip(chunks.iter()) {
        let (lines, title, border) = match kind {
            PanelKind::Live => (
                live_lines(panel),
                format!("{} Metrics", panel.name),
                colors::LIVE_BORDER,
            ),
            PanelKind::Peak => (
                peak_lines(panel),
                format!("{} Peak Values (last {}s)", panel.name, app.window_secs),
                colors::PEAK_BORDER,
            ),
        };

        let widget = Paragraph::new(lines).block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(border))
                .title(Span::styled(
                    title,
                    Style::default().add_modifier(Modifier::BOLD),
                )),
        );
        f.render_widget(widget, *chunk);
    }
}

fn metric_line(label: &str, value: String) -> Line<'static> {
    Line::from(vec![
        Span::styled(format!("{:<20}", label), Style::default().fg(colors::LABEL)),
        Span::styled(value, Style::default().fg(colors::VALUE)),
    ])
}

fn status_line(label: &str, bottleneck: Bottleneck) -> Line<'static> {
    Line::from(vec![
        Span::styled(format!("{:<20}", label), Style::default().fg(colors::LABEL)),
        Span::styled(
            bottleneck.explanation(),
            Style::default()
                .fg(bottleneck_color(bottleneck))
                .add_modifier(Modifier::BOLD),
        ),
    ])
}

fn percent_line(label: &str, percent: f64) -> Line<'static> {
    metric_line(
        label,
        format!("{} {:.0}%", make_bar(percent, 100.0, BAR_WIDTH), percent),
    )
}

fn power_line(power: f32, limit: Option<f32>) -> Line<'static> {
    let value = match limit {
        Some(limit) => format!(
            "{} {:.1}W / {:.1}W",
            make_bar(power as f64, limit as f64, BAR_WIDTH),
            power,
            limit
        ),
        None => format!("{:.1}W", power),
    };
    metric_line("Power", value)
}

fn temperature_line(temperature: f32, baseline: Option<&Baseline>) -> Line<'static> {
    let value = match baseline {
        Some(b) => format!(
            "{} {:.1}°C / {}°C",
            make_bar(temperature as f64, b.max_temperature as f64, BAR_WIDTH),
            temperature,
            b.max_temperature
        ),
        None => format!("{:.1}°C", temperature),
    };
    metric_line("Temperature", value)
}

fn memory_used_line(used: u64, total: u64) -> Line<'static> {
    metric_line(
        "Memory Used",
        format!(
            "{} {:.1} / {:.1} GB",
            make_bar(used as f64, total as f64, BAR_WIDTH),
            gib(used),
            gib(total)
        ),
    )
}

fn live_lines(panel: &DevicePanel) -> Vec<Line<'static>> {
    let Some(record) = &panel.current else {
        let text = panel
            .last_error
            .clone()
            .unwrap_or_else(|| "Waiting for first sample...".to_string());
        return vec![metric_line("", text)];
    };
    let m = &record.metrics;
    let a = &record.analysis;

    let mut lines = vec![
        percent_line("Compute", a.compute_utilization as f64),
        percent_line("Memory", a.memory_utilization as f64),
    ];
    if let Some(thermal) = record.thermal_percent {
        lines.push(percent_line("Thermal", thermal as f64));
    }
    lines.push(Line::default());
    lines.push(status_line("Status", a.bottleneck));
    lines.push(Line::default());

    if let Some(power) = m.power_draw.filter(|p| *p > 0.0) {
        lines.push(power_line(power, m.power_limit));
    }
    lines.push(temperature_line(m.temperature, panel.baseline.as_ref()));
    if let Some(fan) = m.fan_speed {
        lines.push(percent_line("Fan Speed", fan as f64));
    }
    lines.push(percent_line("GPU Utilization", m.compute_utilization as f64));
    lines.push(percent_line("Memory Utilization", m.memory_utilization as f64));
    lines.push(memory_used_line(m.memory_used, m.memory_total));
    lines.push(metric_line("GPU Clock", format!("{} MHz", m.core_clock)));
    lines.push(metric_line("Memory Clock", format!("{} MHz", m.memory_clock)));

    if let Some(err) = &panel.last_error {
        lines.push(Line::from(Span::styled(
            format!("Last read failed: {}", err),
            Style::default().fg(Color::Red),
        )));
    }
    lines
}

fn peak_lines(panel: &DevicePanel) -> Vec<Line<'static>> {
    let Some(peaks) = &panel.peaks else {
        return Vec::new();
    };

    let mut lines = vec![
        percent_line("Compute", peaks.compute_utilization as f64),
        percent_line("Memory", peaks.memory_utilization as f64),
    ];
    if let Some(thermal) = peaks.thermal_percent {
        lines.push(percent_line("Thermal", thermal as f64));
    }
    lines.push(Line::default());
    lines.push(status_line("Peak Status", peaks.status));
    lines.push(Line::default());

    if let Some(power) = peaks.power_draw.filter(|p| *p > 0.0) {
        lines.push(power_line(power, panel.power_limit()));
    }
    lines.push(temperature_line(peaks.temperature, panel.baseline.as_ref()));
    if let Some(fan) = peaks.fan_speed {
        lines.push(percent_line("Fan Speed", fan as f64));
    }
    lines.push(percent_line("GPU Utilization", peaks.compute_utilization as f64));
    lines.push(percent_line("Memory Utilization", peaks.memory_utilization as f64));
    lines.push(memory_used_line(peaks.memory_used, panel.memory_total()));
    lines.push(metric_line("GPU Clock", format!("{} MHz", peaks.core_clock)));
    lines.push(metric_line("Memory Clock", format!("{} MHz", peaks.memory_clock)));
    lines.push(metric_line("Samples", peaks.samples.to_string()));
    lines
}

fn draw_footer(f: &mut Frame, app: &App, area: Rect) {
    if let Some(status_msg) = app.get_status_message() {
        let status = Paragraph::new(Line::from(vec![Span::styled(
            status_msg.to_string(),
            Style::default()
                .fg(Color::Green)
                .add_modifier(Modifier::BOLD),
        )]))
        .block(Block::default().borders(Borders::ALL))
        .alignment(Alignment::Center);
        f.render_widget(status, area);
        return;
    }

    let key = |k: &'static str| {
        Span::styled(
            k,
            Style::default()
                .fg(colors::TITLE)
                .add_modifier(Modifier::BOLD),
        )
    };
    let mut help_text = vec![
        key("q"),
        Span::raw(" Quit  "),
        key("1/2 ←→"),
        Span::raw(" Tabs  "),
        key("r"),
        Span::raw(" Reset history  "),
        Span::styled("│", Style::default().fg(colors::SEPARATOR)),
    ];
    for (label, bottleneck) in [
        ("compute", Bottleneck::ComputeBound),
        ("memory", Bottleneck::MemoryBound),
        ("thermal", Bottleneck::ThermalThrottling),
        ("power", Bottleneck::PowerLimited),
        ("balanced", Bottleneck::Balanced),
    ] {
        help_text.push(Span::raw(" "));
        help_text.push(Span::styled(
            label,
            Style::default().fg(bottleneck_color(bottleneck)),
        ));
    }

    let help = Paragraph::new(Line::from(help_text))
        .block(Block::default().borders(Borders::ALL))
        .alignment(Alignment::Center);

    f.render_widget(help, area);
}
