use chrono_tz::Tz;
use ratatui::{prelude::*, widgets::*};

use crate::query::Gas;
use crate::table::{local_datetime, SensorTable};
use crate::theme::SensorTheme;

use super::Frame;

/// Draws the value-over-time chart of one sensor.
pub fn render_chart(
    f: &mut Frame<'_>,
    rect: Rect,
    table: &SensorTable,
    gas: Gas,
    theme: &SensorTheme,
    time_zone: Tz,
) {
    let points = table.points();
    let unit = table.latest().map(|r| r.unit.as_str()).unwrap_or_default();
    let ([x_min, x_max], [y_min, y_max]) = table.bounds();

    let background = rgb(theme.background);
    let foreground = rgb(theme.foreground);
    let series = rgb(theme.series);

    let datasets = vec![Dataset::default()
        .name(gas.to_string())
        .marker(symbols::Marker::Braille)
        .graph_type(GraphType::Line)
        .style(Style::default().fg(series))
        .data(&points)];

    let time_label = |ts: f64| {
        let datetime = local_datetime(ts, time_zone).unwrap_or_default();
        Span::raw(datetime.get(11..19).unwrap_or_default().to_string())
    };
    let value_label = |v: f64| Span::raw(format!("{v:.1}"));

    let chart = Chart::new(datasets)
        .block(
            Block::default()
                .title(format!("Time series {gas}"))
                .title_alignment(Alignment::Left)
                .borders(Borders::ALL)
                .border_type(BorderType::Rounded),
        )
        .style(Style::default().fg(foreground).bg(background))
        .x_axis(
            Axis::default()
                .title("Date and Time")
                .bounds([x_min, x_max])
                .labels(vec![
                    time_label(x_min),
                    time_label((x_min + x_max) / 2.0),
                    time_label(x_max),
                ]),
        )
        .y_axis(
            Axis::default()
                .title(format!("{gas} [{unit}]"))
                .bounds([y_min, y_max])
                .labels(vec![
                    value_label(y_min),
                    value_label((y_min + y_max) / 2.0),
                    value_label(y_max),
                ]),
        );

    f.render_widget(chart, rect);
}

fn rgb((r, g, b): (u8, u8, u8)) -> Color {
    Color::Rgb(r, g, b)
}
