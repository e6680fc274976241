use std::fs::File;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use chrono_tz::Tz;
use plotters::prelude::*;
use polars::prelude::*;

use crate::query::{Gas, QueryParameters};
use crate::session::{SensorState, Session};
use crate::table::{local_datetime, SensorTable, COLUMNS};
use crate::theme::{self, SensorTheme};

const CHART_WIDTH: u32 = 1280;
const CHART_HEIGHT: u32 = 480;

/// Builds a data frame with one column per table field.
pub fn to_data_frame(table: &SensorTable) -> PolarsResult<DataFrame> {
    let rows = table.rows();
    let address: Vec<i64> = rows.iter().map(|r| r.address).collect();
    let timestamp: Vec<f64> = rows.iter().map(|r| r.timestamp).collect();
    let datetime: Vec<String> = rows.iter().map(|r| r.datetime.clone()).collect();
    let gas: Vec<String> = rows.iter().map(|r| r.gas.clone()).collect();
    let unit: Vec<String> = rows.iter().map(|r| r.unit.clone()).collect();
    let value: Vec<f64> = rows.iter().map(|r| r.float_value).collect();
    let warmup1: Vec<String> = rows.iter().map(|r| r.warmup1.to_string()).collect();
    let warmup2: Vec<String> = rows.iter().map(|r| r.warmup2.to_string()).collect();

    DataFrame::new(vec![
        Series::new(COLUMNS[0], address),
        Series::new(COLUMNS[1], timestamp),
        Series::new(COLUMNS[2], datetime),
        Series::new(COLUMNS[3], gas),
        Series::new(COLUMNS[4], unit),
        Series::new(COLUMNS[5], value),
        Series::new(COLUMNS[6], warmup1),
        Series::new(COLUMNS[7], warmup2),
    ])
}

pub fn write_csv(table: &SensorTable, path: &Path) -> color_eyre::Result<()> {
    let mut df = to_data_frame(table)?;
    let mut file = File::create(path)?;
    CsvWriter::new(&mut file)
        .include_header(true)
        .with_separator(b',')
        .finish(&mut df)?;
    Ok(())
}

/// Draws the value-over-time line chart of a table.
pub fn plot_chart(
    table: &SensorTable,
    gas: Gas,
    sensor_theme: &SensorTheme,
    time_zone: Tz,
    path: &Path,
) -> color_eyre::Result<()> {
    let points = table.points();
    let ([x_min, x_max], [y_min, y_max]) = table.bounds();
    let unit = table.latest().map(|r| r.unit.as_str()).unwrap_or_default();

    let background = rgb(sensor_theme.background);
    let foreground = rgb(sensor_theme.foreground);
    let series = rgb(sensor_theme.series);
    let grid = rgb(sensor_theme.grid);

    let out_file_name = format!("{}", path.display());
    let root_area =
        BitMapBackend::new(&out_file_name, (CHART_WIDTH, CHART_HEIGHT)).into_drawing_area();
    root_area.fill(&background)?;

    let caption = format!("Time series {gas}");
    let mut cc = ChartBuilder::on(&root_area)
        .margin(15)
        .caption(caption, ("sans-serif", 28).into_font().color(&foreground))
        .set_label_area_size(LabelAreaPosition::Left, 70)
        .set_label_area_size(LabelAreaPosition::Bottom, 50)
        .build_cartesian_2d(x_min..x_max, y_min..y_max)?;

    let time_label = |ts: &f64| {
        local_datetime(*ts, time_zone)
            .map(|dt| short_time(&dt).to_string())
            .unwrap_or_default()
    };

    cc.configure_mesh()
        .x_labels(8)
        .y_labels(8)
        .x_desc("Date and Time")
        .y_desc(format!("{gas} [{unit}]"))
        .x_label_formatter(&time_label)
        .y_label_formatter(&|v| format!("{:.1}", v))
        .label_style(("sans-serif", 14).into_font().color(&foreground))
        .axis_desc_style(("sans-serif", 16).into_font().color(&foreground))
        .bold_line_style(grid)
        .light_line_style(grid.mix(0.4))
        .axis_style(foreground)
        .draw()?;

    cc.draw_series(LineSeries::new(points.iter().copied(), series.stroke_width(2)))?;
    cc.draw_series(
        points
            .iter()
            .map(|&point| Circle::new(point, 3, series.filled())),
    )?;

    root_area.present()?;
    Ok(())
}

/// Writes CSV and chart of one table into the directory.
pub fn export_table(
    table: &SensorTable,
    query: &QueryParameters,
    sensor_theme: &SensorTheme,
    time_zone: Tz,
    directory: &Path,
    taken_at: DateTime<Local>,
) -> color_eyre::Result<Vec<PathBuf>> {
    std::fs::create_dir_all(directory)?;
    let stem = file_stem(query, taken_at);

    let csv_path = directory.join(format!("{stem}.csv"));
    write_csv(table, &csv_path)?;

    let png_path = directory.join(format!("{stem}.png"));
    plot_chart(table, query.gas, sensor_theme, time_zone, &png_path)?;

    log::info!("Exported {} rows to {}", table.len(), csv_path.display());
    Ok(vec![csv_path, png_path])
}

/// Exports every active sensor of the session.
pub fn export_session(
    session: &Session,
    time_zone: Tz,
    directory: &Path,
) -> color_eyre::Result<Vec<PathBuf>> {
    let taken_at = Local::now();
    let mut written = Vec::new();
    for sensor in session.sensors() {
        let table = match &*sensor.state() {
            SensorState::Active(table) => table.clone(),
            SensorState::Failed(_) => continue,
        };
        let sensor_theme = theme::for_slot(sensor.slot);
        written.extend(export_table(
            &table,
            &sensor.query,
            &sensor_theme,
            time_zone,
            directory,
            taken_at,
        )?);
    }
    Ok(written)
}

fn file_stem(query: &QueryParameters, taken_at: DateTime<Local>) -> String {
    format!(
        "{}-{}-{}{}{}-{}",
        query.gas,
        query.address,
        query.date.yyyy,
        query.date.mm,
        query.date.dd,
        taken_at.format("%H%M%S")
    )
}

/// The `HH:MM:SS` part of an ISO-8601 datetime.
fn short_time(datetime: &str) -> &str {
    datetime.get(11..19).unwrap_or(datetime)
}

fn rgb((r, g, b): (u8, u8, u8)) -> RGBColor {
    RGBColor(r, g, b)
}
