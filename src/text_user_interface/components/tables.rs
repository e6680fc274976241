use ratatui::{prelude::*, widgets::*};

use crate::query::Gas;
use crate::table::{Reading, SensorTable, COLUMNS};

use super::Frame;

const WIDTHS: [Constraint; 8] = [
    Constraint::Length(7),
    Constraint::Length(18),
    Constraint::Length(26),
    Constraint::Length(5),
    Constraint::Length(5),
    Constraint::Length(11),
    Constraint::Length(7),
    Constraint::Length(7),
];

/// Draws the newest rows of a sensor table that fit into the area.
pub fn render_table(f: &mut Frame<'_>, rect: Rect, table: &SensorTable, gas: Gas) {
    // borders and header
    let visible = usize::from(rect.height.saturating_sub(3));
    let rows = visible_rows(table, visible)
        .iter()
        .map(|reading| Row::new(reading.cells()));

    let header = Row::new(COLUMNS)
        .style(Style::default().bold().underlined());

    let widget = Table::new(rows, WIDTHS)
        .header(header)
        .column_spacing(1)
        .block(
            Block::default()
                .title(format!("Table View of {gas} ({} rows)", table.len()))
                .title_alignment(Alignment::Left)
                .borders(Borders::ALL)
                .border_type(BorderType::Rounded),
        )
        .style(Style::default().fg(Color::Gray));

    f.render_widget(widget, rect);
}

fn visible_rows(table: &SensorTable, count: usize) -> &[Reading] {
    let rows = table.rows();
    &rows[rows.len().saturating_sub(count)..]
}
