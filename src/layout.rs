use crate::aggregate::{self, AttendanceSummary, SubjectAverage};
use crate::periods::{Trend, TrendComparison};
use crate::records::AttendanceRecord;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const PASS_AVERAGE: f64 = 6.0;
pub const PASS_ATTENDANCE_PERCENT: f64 = 75.0;

const TITLE_SIZE: f64 = 18.0;
const SUBTITLE_SIZE: f64 = 14.0;
const BODY_SIZE: f64 = 11.0;
const CELL_SIZE: f64 = 10.0;
const FOOTER_SIZE: f64 = 8.0;
const LABEL_WIDTH: f64 = 90.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Color(&'static str);

impl Color {
    pub const HEADER: Color = Color("#2E5090");
    pub const WHITE: Color = Color("#FFFFFF");
    pub const BLACK: Color = Color("#000000");
    pub const ZEBRA: Color = Color("#F0F0F0");
    pub const GRID: Color = Color("#808080");
    pub const PASS: Color = Color("#008000");
    pub const FAIL: Color = Color("#FF0000");
    pub const NEUTRAL: Color = Color("#808080");
    pub const SUMMARY_FILL: Color = Color("#E8F4F8");
    pub const MUTED: Color = Color("#666666");
    pub const RULE: Color = Color("#CCCCCC");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Align {
    Left,
    Center,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum DrawOp {
    Rect {
        x: f64,
        y: f64,
        width: f64,
        height: f64,
        fill: Option<Color>,
        stroke: Option<Color>,
    },
    Text {
        x: f64,
        y: f64,
        width: f64,
        text: String,
        size: f64,
        bold: bool,
        color: Color,
        align: Align,
    },
    Line {
        x1: f64,
        y1: f64,
        x2: f64,
        y2: f64,
        color: Color,
    },
    PageBreak,
}

#[cfg(test)]
impl DrawOp {
    fn y(&self) -> Option<f64> {
        match self {
            DrawOp::Rect { y, .. } | DrawOp::Text { y, .. } => Some(*y),
            DrawOp::Line { y1, .. } => Some(*y1),
            DrawOp::PageBreak => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub page_count: usize,
    pub instructions: Vec<DrawOp>,
}

#[derive(Debug, thiserror::Error)]
pub enum LayoutError {
    #[error("invalid layout configuration: {0}")]
    InvalidConfig(String),
}

impl LayoutError {
    pub fn code(&self) -> &'static str {
        match self {
            LayoutError::InvalidConfig(_) => "bad_config",
        }
    }
}

/// Page geometry, in points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LayoutConfig {
    pub page_height: f64,
    pub margin: f64,
    pub content_right: f64,
    pub page_break_y: f64,
    pub footer_y: f64,
    pub grade_row_height: f64,
    pub subject_width: f64,
    pub average_width: f64,
    pub trend_width: f64,
    pub attendance_row_height: f64,
    pub attendance_column_width: f64,
    pub summary_width: f64,
    pub wrap_chars: usize,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            page_height: 842.0,
            margin: 50.0,
            content_right: 545.0,
            page_break_y: 700.0,
            footer_y: 750.0,
            grade_row_height: 30.0,
            subject_width: 300.0,
            average_width: 90.0,
            trend_width: 100.0,
            attendance_row_height: 25.0,
            attendance_column_width: 245.0,
            summary_width: 490.0,
            wrap_chars: 90,
        }
    }
}

impl LayoutConfig {
    pub fn validate(&self) -> Result<(), LayoutError> {
        let positive = [
            ("pageHeight", self.page_height),
            ("gradeRowHeight", self.grade_row_height),
            ("subjectWidth", self.subject_width),
            ("averageWidth", self.average_width),
            ("trendWidth", self.trend_width),
            ("attendanceRowHeight", self.attendance_row_height),
            ("attendanceColumnWidth", self.attendance_column_width),
            ("summaryWidth", self.summary_width),
        ];
        for (name, v) in positive {
            if !v.is_finite() || v <= 0.0 {
                return Err(LayoutError::InvalidConfig(format!(
                    "{} must be positive, got {}",
                    name, v
                )));
            }
        }
        if !self.margin.is_finite() || self.margin < 0.0 {
            return Err(LayoutError::InvalidConfig("margin must not be negative".into()));
        }
        if self.content_right <= self.margin {
            return Err(LayoutError::InvalidConfig(
                "contentRight must be right of the margin".into(),
            ));
        }
        if self.page_break_y <= self.margin || self.page_break_y >= self.page_height {
            return Err(LayoutError::InvalidConfig(
                "pageBreakY must lie between the top margin and the page height".into(),
            ));
        }
        if self.footer_y >= self.page_height {
            return Err(LayoutError::InvalidConfig(
                "footerY must lie on the page".into(),
            ));
        }
        if self.page_break_y >= self.footer_y {
            return Err(LayoutError::InvalidConfig(
                "pageBreakY must lie above footerY".into(),
            ));
        }
        let content = self.content_width();
        let widths = [
            (
                "grade table",
                self.subject_width + self.average_width + self.trend_width,
            ),
            ("attendance table", 2.0 * self.attendance_column_width),
            ("summary box", self.summary_width),
        ];
        for (name, width) in widths {
            if width > content {
                return Err(LayoutError::InvalidConfig(format!(
                    "{} is {}pt wide but the content area is {}pt",
                    name, width, content
                )));
            }
        }
        if self.grade_row_height > self.page_break_y - self.margin
            || self.attendance_row_height > self.page_break_y - self.margin
        {
            return Err(LayoutError::InvalidConfig(
                "row height does not fit between the margin and pageBreakY".into(),
            ));
        }
        if self.wrap_chars == 0 {
            return Err(LayoutError::InvalidConfig("wrapChars must be positive".into()));
        }
        Ok(())
    }

    fn content_width(&self) -> f64 {
        self.content_right - self.margin
    }
}

pub fn average_color(average: f64) -> Color {
    if average >= PASS_AVERAGE {
        Color::PASS
    } else {
        Color::FAIL
    }
}

pub fn attendance_color(percentage: f64) -> Color {
    if percentage >= PASS_ATTENDANCE_PERCENT {
        Color::PASS
    } else {
        Color::FAIL
    }
}

pub fn trend_style(trend: Trend) -> (&'static str, Color) {
    match trend {
        Trend::Improved => ("↑", Color::PASS),
        Trend::Declined => ("↓", Color::FAIL),
        Trend::Stable => ("=", Color::NEUTRAL),
    }
}

pub fn trend_text(c: &TrendComparison) -> String {
    let (symbol, _) = trend_style(c.classification);
    let sign = if c.percent_delta > 0.0 { "+" } else { "" };
    format!("{} {}{:.1}%", symbol, sign, c.percent_delta)
}

fn line_height(size: f64) -> f64 {
    size * 1.2
}

/// Title and labelled lines printed above the body of every document.
#[derive(Debug, Clone)]
pub struct DocumentHeader {
    pub school_name: String,
    pub title: String,
    pub lines: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
pub struct ReportOptions {
    pub show_legend: bool,
    pub footer_text: String,
    pub generated_at: NaiveDateTime,
}

struct Column {
    title: &'static str,
    width: f64,
}

struct Cell {
    text: String,
    color: Color,
    bold: bool,
}

impl Cell {
    fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            color: Color::BLACK,
            bold: false,
        }
    }

    fn strong(text: impl Into<String>, color: Color) -> Self {
        Self {
            text: text.into(),
            color,
            bold: true,
        }
    }
}

struct Flow<'a> {
    cfg: &'a LayoutConfig,
    ops: Vec<DrawOp>,
    y: f64,
    pages: usize,
}

impl<'a> Flow<'a> {
    fn new(cfg: &'a LayoutConfig) -> Self {
        Self {
            cfg,
            ops: Vec::new(),
            y: cfg.margin,
            pages: 1,
        }
    }

    /// Starts a new page when a block of `height` would cross the break line.
    fn ensure_room(&mut self, height: f64) {
        if self.y + height > self.cfg.page_break_y {
            self.ops.push(DrawOp::PageBreak);
            self.y = self.cfg.margin;
            self.pages += 1;
        }
    }

    fn rect(&mut self, x: f64, y: f64, width: f64, height: f64, fill: Color, stroke: Color) {
        self.ops.push(DrawOp::Rect {
            x,
            y,
            width,
            height,
            fill: Some(fill),
            stroke: Some(stroke),
        });
    }

    #[allow(clippy::too_many_arguments)]
    fn text(
        &mut self,
        x: f64,
        y: f64,
        width: f64,
        text: impl Into<String>,
        size: f64,
        bold: bool,
        color: Color,
        align: Align,
    ) {
        self.ops.push(DrawOp::Text {
            x,
            y,
            width,
            text: text.into(),
            size,
            bold,
            color,
            align,
        });
    }

    fn header(&mut self, header: &DocumentHeader) {
        let x = self.cfg.margin;
        let width = self.cfg.content_width();
        let y = self.y;
        self.text(
            x,
            y,
            width,
            header.school_name.to_uppercase(),
            TITLE_SIZE,
            true,
            Color::BLACK,
            Align::Center,
        );
        self.y += line_height(TITLE_SIZE) * 1.5;

        let y = self.y;
        self.text(
            x,
            y,
            width,
            header.title.clone(),
            SUBTITLE_SIZE,
            true,
            Color::BLACK,
            Align::Center,
        );
        self.y += line_height(SUBTITLE_SIZE) * 2.5;

        for (label, value) in &header.lines {
            let y = self.y;
            self.text(
                x,
                y,
                LABEL_WIDTH,
                format!("{}:", label),
                BODY_SIZE,
                true,
                Color::BLACK,
                Align::Left,
            );
            self.text(
                x + LABEL_WIDTH,
                y,
                width - LABEL_WIDTH,
                value.clone(),
                BODY_SIZE,
                false,
                Color::BLACK,
                Align::Left,
            );
            self.y += line_height(BODY_SIZE) + 5.0;
        }
        self.y += line_height(BODY_SIZE) * 1.5;
    }

    fn table(&mut self, columns: &[Column], row_height: f64, rows: Vec<Vec<Cell>>) {
        let x0 = self.cfg.margin;
        let total: f64 = columns.iter().map(|c| c.width).sum();
        let inset = (row_height - CELL_SIZE) / 2.0;

        // Header band is drawn once; rows continuing on later pages get none.
        self.ensure_room(row_height);
        let y = self.y;
        self.rect(x0, y, total, row_height, Color::HEADER, Color::HEADER);
        let mut x = x0;
        for c in columns {
            self.text(x, y + inset, c.width, c.title, BODY_SIZE, true, Color::WHITE, Align::Center);
            x += c.width;
        }
        self.y += row_height;

        for (i, row) in rows.into_iter().enumerate() {
            self.ensure_room(row_height);
            let y = self.y;
            let bg = if i % 2 == 0 { Color::ZEBRA } else { Color::WHITE };
            self.rect(x0, y, total, row_height, bg, Color::GRID);

            let mut x = x0;
            for (j, (col, cell)) in columns.iter().zip(row).enumerate() {
                if !cell.text.is_empty() {
                    if j == 0 {
                        self.text(
                            x + 10.0,
                            y + inset,
                            col.width - 20.0,
                            cell.text,
                            CELL_SIZE,
                            cell.bold,
                            cell.color,
                            Align::Left,
                        );
                    } else {
                        self.text(
                            x,
                            y + inset,
                            col.width,
                            cell.text,
                            CELL_SIZE,
                            cell.bold,
                            cell.color,
                            Align::Center,
                        );
                    }
                }
                x += col.width;
            }
            self.y += row_height;
        }
    }

    fn legend(&mut self) {
        let entries = [
            (Trend::Improved, "Improved:", "performance above the previous period"),
            (Trend::Declined, "Declined:", "performance below the previous period"),
            (Trend::Stable, "Stable:", "performance similar to the previous period"),
        ];
        let height = line_height(10.0) + 3.0 * (line_height(9.0) + 3.0);
        self.y += line_height(BODY_SIZE) * 2.0;
        self.ensure_room(height);

        let x = self.cfg.margin;
        let y = self.y;
        self.text(
            x,
            y,
            self.cfg.content_width(),
            "TREND LEGEND:",
            10.0,
            true,
            Color::BLACK,
            Align::Left,
        );
        self.y += line_height(10.0);
        for (trend, label, description) in entries {
            let (symbol, color) = trend_style(trend);
            let y = self.y;
            self.text(
                x + 10.0,
                y,
                80.0,
                format!("{} {}", symbol, label),
                9.0,
                false,
                color,
                Align::Left,
            );
            self.text(
                x + 90.0,
                y,
                self.cfg.content_width() - 90.0,
                description,
                9.0,
                false,
                Color::BLACK,
                Align::Left,
            );
            self.y += line_height(9.0) + 3.0;
        }
    }

    fn summary_box(&mut self, title: &str, height: f64) -> f64 {
        self.y += line_height(BODY_SIZE) * 2.0;
        self.ensure_room(height);
        let y = self.y;
        let x = self.cfg.margin;
        let width = self.cfg.summary_width;
        self.rect(x, y, width, height, Color::SUMMARY_FILL, Color::HEADER);
        self.text(x, y + 10.0, width, title, 12.0, true, Color::BLACK, Align::Center);
        self.y += height;
        y
    }

    fn footer(&mut self, y: f64, options: &ReportOptions) {
        let text = format!(
            "{} on {}",
            options.footer_text,
            options.generated_at.format("%d/%m/%Y %H:%M")
        );
        self.text(
            self.cfg.margin,
            y,
            self.cfg.summary_width,
            text,
            FOOTER_SIZE,
            false,
            Color::MUTED,
            Align::Center,
        );
    }

    fn finish(self) -> Document {
        Document {
            page_count: self.pages,
            instructions: self.ops,
        }
    }
}

/// Report card: one row per discipline with its average, plus a trend
/// column when a prior window exists (`comparisons` is `Some`).
pub fn layout_grade_card(
    header: &DocumentHeader,
    subjects: &[SubjectAverage],
    comparisons: Option<&[TrendComparison]>,
    options: &ReportOptions,
    cfg: &LayoutConfig,
) -> Result<Document, LayoutError> {
    cfg.validate()?;
    let mut flow = Flow::new(cfg);
    flow.header(header);

    let mut columns = vec![
        Column {
            title: "SUBJECT",
            width: cfg.subject_width,
        },
        Column {
            title: "AVERAGE",
            width: cfg.average_width,
        },
    ];
    if comparisons.is_some() {
        columns.push(Column {
            title: "TREND",
            width: cfg.trend_width,
        });
    }

    let by_discipline: HashMap<&str, &TrendComparison> = comparisons
        .unwrap_or_default()
        .iter()
        .map(|c| (c.discipline_id.as_str(), c))
        .collect();

    let rows = subjects
        .iter()
        .map(|s| {
            let mut row = vec![
                Cell::plain(s.discipline_name.clone()),
                Cell::strong(format!("{:.2}", s.average), average_color(s.average)),
            ];
            if comparisons.is_some() {
                row.push(match by_discipline.get(s.discipline_id.as_str()) {
                    Some(c) => Cell::strong(trend_text(c), trend_style(c.classification).1),
                    None => Cell::plain(""),
                });
            }
            row
        })
        .collect();
    flow.table(&columns, cfg.grade_row_height, rows);

    if comparisons.is_some() && options.show_legend {
        flow.legend();
    }

    let overall = aggregate::overall_average(subjects);
    let y = flow.summary_box("SUMMARY", 60.0);
    let x = cfg.margin + 10.0;
    flow.text(
        x,
        y + 35.0,
        180.0,
        format!("Subjects: {}", subjects.len()),
        BODY_SIZE,
        false,
        Color::BLACK,
        Align::Left,
    );
    flow.text(
        x + 190.0,
        y + 35.0,
        110.0,
        "Overall average:",
        BODY_SIZE,
        false,
        Color::BLACK,
        Align::Left,
    );
    flow.text(
        x + 300.0,
        y + 35.0,
        60.0,
        format!("{:.2}", overall),
        BODY_SIZE,
        true,
        average_color(overall),
        Align::Left,
    );

    flow.footer(cfg.footer_y, options);
    Ok(flow.finish())
}

pub fn layout_attendance(
    header: &DocumentHeader,
    calls: &[AttendanceRecord],
    summary: &AttendanceSummary,
    options: &ReportOptions,
    cfg: &LayoutConfig,
) -> Result<Document, LayoutError> {
    cfg.validate()?;
    let mut flow = Flow::new(cfg);
    flow.header(header);

    let columns = [
        Column {
            title: "DATE",
            width: cfg.attendance_column_width,
        },
        Column {
            title: "PRESENCE",
            width: cfg.attendance_column_width,
        },
    ];
    let rows = calls
        .iter()
        .map(|c| {
            let presence = if c.present {
                Cell::strong("PRESENT", Color::PASS)
            } else {
                Cell::strong("ABSENT", Color::FAIL)
            };
            vec![Cell::plain(c.date.format("%d/%m/%Y").to_string()), presence]
        })
        .collect();
    flow.table(&columns, cfg.attendance_row_height, rows);

    let y = flow.summary_box("SUMMARY", 80.0);
    let x = cfg.margin + 10.0;
    flow.text(
        x,
        y + 30.0,
        cfg.summary_width - 20.0,
        format!(
            "Classes: {}    Present: {}    Absent: {}",
            summary.total_classes,
            summary.total_present,
            summary.total_absent()
        ),
        BODY_SIZE,
        false,
        Color::BLACK,
        Align::Left,
    );
    flow.text(x, y + 50.0, 90.0, "Attendance:", SUBTITLE_SIZE, true, Color::BLACK, Align::Left);
    flow.text(
        x + 90.0,
        y + 50.0,
        100.0,
        format!("{:.2}%", summary.percentage),
        SUBTITLE_SIZE,
        true,
        attendance_color(summary.percentage),
        Align::Left,
    );

    flow.footer(cfg.footer_y, options);
    Ok(flow.finish())
}

/// Greedy word wrap; blank lines in the input are kept as paragraph breaks.
pub fn wrap_text(content: &str, max_chars: usize) -> Vec<String> {
    let mut out = Vec::new();
    for paragraph in content.lines() {
        let mut line = String::new();
        for word in paragraph.split_whitespace() {
            let needed = if line.is_empty() {
                word.chars().count()
            } else {
                line.chars().count() + 1 + word.chars().count()
            };
            if needed > max_chars && !line.is_empty() {
                out.push(std::mem::take(&mut line));
            }
            if !line.is_empty() {
                line.push(' ');
            }
            line.push_str(word);
        }
        out.push(line);
    }
    out
}

/// Free-text teacher observations about one student.
pub fn layout_narrative(
    header: &DocumentHeader,
    content: &str,
    options: &ReportOptions,
    cfg: &LayoutConfig,
) -> Result<Document, LayoutError> {
    cfg.validate()?;
    let mut flow = Flow::new(cfg);
    flow.header(header);

    let y = flow.y;
    flow.ops.push(DrawOp::Line {
        x1: cfg.margin,
        y1: y,
        x2: cfg.content_right,
        y2: y,
        color: Color::RULE,
    });
    flow.y += line_height(BODY_SIZE);

    flow.ensure_room(line_height(12.0));
    let y = flow.y;
    flow.text(
        cfg.margin,
        y,
        cfg.content_width(),
        "TEACHER OBSERVATIONS",
        12.0,
        true,
        Color::HEADER,
        Align::Left,
    );
    flow.y += line_height(12.0) * 1.5;

    let step = line_height(BODY_SIZE) + 5.0;
    for line in wrap_text(content, cfg.wrap_chars) {
        flow.ensure_room(step);
        let y = flow.y;
        if !line.is_empty() {
            flow.text(
                cfg.margin,
                y,
                cfg.content_width(),
                line,
                BODY_SIZE,
                false,
                Color::BLACK,
                Align::Left,
            );
        }
        flow.y += step;
    }

    let lowest = cfg.page_height - cfg.margin - 40.0;
    let footer_y = (flow.y + 40.0).min(lowest);
    flow.footer(footer_y, options);
    Ok(flow.finish())
}
