use std::sync::Arc;

use chrono_tz::Tz;
use color_eyre::eyre::Result;
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::{prelude::*, widgets::*};

use crate::session::{SensorState, Session};
use crate::text_user_interface::action::Action;
use crate::theme;

use super::charts::render_chart;
use super::tables::render_table;
use super::{Component, Frame};

const TITLE: &str = "Real-Time BLE Sensor Dashboard";

/// Charts and tables of the running session.
pub struct DashboardView {
    active: bool,
    loading: bool,
    session: Option<Arc<Session>>,
    status: Option<String>,
    time_zone: Tz,
}

impl DashboardView {
    pub fn new(time_zone: Tz) -> Self {
        Self {
            active: false,
            loading: false,
            session: None,
            status: None,
            time_zone,
        }
    }

    fn status_line(&self) -> Line<'static> {
        let mut spans = Vec::new();
        if let Some(session) = &self.session {
            spans.push(Span::styled(
                format!("polls: {}", session.polls()),
                Style::default().dim(),
            ));
            if let Some(last) = session.last_update() {
                spans.push(Span::styled(
                    format!("  last update: {}", last.format("%H:%M:%S")),
                    Style::default().dim(),
                ));
            }
            if session.active_count() == 0 {
                spans.push(Span::styled("  polling stopped", Style::default().red()));
            }
        }
        if let Some(status) = &self.status {
            spans.push("  ".into());
            spans.push(Span::styled(status.clone(), Style::default().yellow()));
        }
        spans.push(Span::styled(
            "  [b] back  [s] export  [q] quit",
            Style::default().dim(),
        ));
        Line::from(spans)
    }

    fn draw_session(&self, f: &mut Frame<'_>, rect: Rect, session: &Session) {
        let active = session.active_count();
        if active == 0 {
            return;
        }

        let columns = Layout::default()
            .direction(Direction::Horizontal)
            .constraints(vec![Constraint::Ratio(1, active as u32); active])
            .split(rect);

        // drawn from the read guard
        let mut columns = columns.iter();
        for sensor in session.sensors() {
            let state = sensor.state();
            let SensorState::Active(table) = &*state else {
                continue;
            };
            let Some(column) = columns.next() else {
                break;
            };

            let [chart_area, table_area] = Layout::vertical([
                Constraint::Percentage(55),
                Constraint::Percentage(45),
            ])
            .areas(*column);
            render_chart(
                f,
                chart_area,
                table,
                sensor.query.gas,
                &theme::for_slot(sensor.slot),
                self.time_zone,
            );
            render_table(f, table_area, table, sensor.query.gas);
        }
    }
}

impl Component for DashboardView {
    fn handle_key_events(&mut self, key: KeyEvent) -> Result<Option<Action>> {
        if !self.active || self.loading {
            return Ok(None);
        }
        let action = match key.code {
            KeyCode::Char('b') => Some(Action::EnterForm),
            KeyCode::Char('s') => Some(Action::Export),
            _ => None,
        };
        Ok(action)
    }

    fn update(&mut self, action: Action) -> Result<Option<Action>> {
        match action {
            Action::Submit(_) => {
                self.active = true;
                self.loading = true;
                self.session = None;
                self.status = None;
            }
            Action::SessionStarted(session) => {
                self.loading = false;
                self.session = Some(session);
            }
            Action::EnterForm => {
                self.active = false;
                self.session = None;
            }
            Action::Status(status) | Action::Error(status) => self.status = Some(status),
            _ => {}
        }
        Ok(None)
    }

    fn draw(&mut self, f: &mut Frame<'_>, rect: Rect) -> Result<()> {
        if !self.active {
            return Ok(());
        }

        let errors: Vec<Line> = self
            .session
            .iter()
            .flat_map(|session| session.sensors())
            .filter_map(|sensor| sensor.error_text())
            .map(|text| Line::from(Span::styled(text, Style::default().red())))
            .collect();

        let [title_area, error_area, content_area, status_area] = Layout::vertical([
            Constraint::Length(1),
            Constraint::Length(errors.len() as u16),
            Constraint::Min(0),
            Constraint::Length(1),
        ])
        .areas(rect);

        f.render_widget(
            Paragraph::new(Span::styled(TITLE, Style::default().bold())).centered(),
            title_area,
        );
        f.render_widget(Paragraph::new(errors), error_area);

        match &self.session {
            Some(session) => self.draw_session(f, content_area, session),
            None if self.loading => f.render_widget(
                Paragraph::new("Loading…").centered().dim(),
                content_area,
            ),
            None => {}
        }

        f.render_widget(Paragraph::new(self.status_line()), status_area);
        Ok(())
    }
}
