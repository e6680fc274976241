use chrono::NaiveDate;
use color_eyre::eyre::Result;
use crossterm::event::{Event as CrosstermEvent, KeyCode, KeyEvent};
use ratatui::{prelude::*, widgets::*};
use tui_input::backend::crossterm::EventHandler;
use tui_input::Input;

use crate::query::{Gas, SensorAddress};
use crate::session::{DashboardSettings, SensorSettings};
use crate::text_user_interface::action::Action;

use super::{Component, Frame};

const LABEL_WIDTH: u16 = 30;
const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Field {
    Date,
    LastRows,
    NumSensors,
    Address1,
    Address2,
    Gas1,
    Gas2,
    Submit,
}

const FIELDS: [Field; 8] = [
    Field::Date,
    Field::LastRows,
    Field::NumSensors,
    Field::Address1,
    Field::Address2,
    Field::Gas1,
    Field::Gas2,
    Field::Submit,
];

impl Field {
    fn label(&self) -> &'static str {
        match self {
            Field::Date => "Choose the date",
            Field::LastRows => "Number of past measurements",
            Field::NumSensors => "How many active sensors?",
            Field::Address1 => "Sensor1 address",
            Field::Address2 => "Sensor2 address",
            Field::Gas1 => "Sensor1 gas",
            Field::Gas2 => "Sensor2 gas",
            Field::Submit => "",
        }
    }

    fn is_text(&self) -> bool {
        matches!(
            self,
            Field::Date | Field::LastRows | Field::Address1 | Field::Address2
        )
    }
}

/// The dashboard configuration form.
pub struct FormView {
    active: bool,
    focus: usize,
    date: Input,
    last_rows: Input,
    address1: Input,
    address2: Input,
    num_sensors: usize,
    gas: [Gas; 2],
    /// Used for sensor 2 while only one sensor is active.
    default_address2: SensorAddress,
    error: Option<String>,
}

impl FormView {
    pub fn new(defaults: &DashboardSettings) -> Self {
        Self {
            active: true,
            focus: 0,
            date: Input::new(defaults.date.format(DATE_FORMAT).to_string()),
            last_rows: Input::new(defaults.last_rows.to_string()),
            address1: Input::new(defaults.sensors[0].address.value().to_string()),
            address2: Input::new(defaults.sensors[1].address.value().to_string()),
            num_sensors: defaults.num_sensors.clamp(1, 2),
            gas: [defaults.sensors[0].gas, defaults.sensors[1].gas],
            default_address2: defaults.sensors[1].address,
            error: None,
        }
    }

    fn focused(&self) -> Field {
        FIELDS[self.focus]
    }

    fn input_mut(&mut self, field: Field) -> Option<&mut Input> {
        match field {
            Field::Date => Some(&mut self.date),
            Field::LastRows => Some(&mut self.last_rows),
            Field::Address1 => Some(&mut self.address1),
            Field::Address2 => Some(&mut self.address2),
            _ => None,
        }
    }

    fn input(&self, field: Field) -> Option<&Input> {
        match field {
            Field::Date => Some(&self.date),
            Field::LastRows => Some(&self.last_rows),
            Field::Address1 => Some(&self.address1),
            Field::Address2 => Some(&self.address2),
            _ => None,
        }
    }

    fn move_focus(&mut self, forward: bool) {
        let len = FIELDS.len();
        self.focus = if forward {
            (self.focus + 1) % len
        } else {
            (self.focus + len - 1) % len
        };
    }

    fn toggle(&mut self, field: Field) {
        match field {
            Field::NumSensors => self.num_sensors = if self.num_sensors == 1 { 2 } else { 1 },
            Field::Gas1 => self.gas[0] = self.gas[0].toggled(),
            Field::Gas2 => self.gas[1] = self.gas[1].toggled(),
            _ => {}
        }
    }

    /// Validates the inputs.
    fn settings(&self) -> Result<DashboardSettings, String> {
        let date = NaiveDate::parse_from_str(self.date.value().trim(), DATE_FORMAT)
            .map_err(|_| format!("Invalid date {:?}, expected YYYY-MM-DD", self.date.value()))?;
        let last_rows: u32 = self
            .last_rows
            .value()
            .trim()
            .parse()
            .ok()
            .filter(|rows| *rows >= 1)
            .ok_or_else(|| String::from("Number of past measurements must be at least 1"))?;
        let address1: SensorAddress = self
            .address1
            .value()
            .parse()
            .map_err(|e| format!("Sensor1: {e}"))?;
        let address2 = match self.address2.value().parse::<SensorAddress>() {
            Ok(address) => address,
            Err(_) if self.num_sensors == 1 => self.default_address2,
            Err(e) => return Err(format!("Sensor2: {e}")),
        };

        Ok(DashboardSettings {
            date,
            last_rows,
            num_sensors: self.num_sensors,
            sensors: [
                SensorSettings {
                    address: address1,
                    gas: self.gas[0],
                },
                SensorSettings {
                    address: address2,
                    gas: self.gas[1],
                },
            ],
        })
    }

    fn submit(&mut self) -> Option<Action> {
        match self.settings() {
            Ok(settings) => {
                self.error = None;
                Some(Action::Submit(settings))
            }
            Err(e) => {
                self.error = Some(e);
                None
            }
        }
    }

    fn value_spans(&self, field: Field) -> Vec<Span<'static>> {
        let choice = |selected: bool, text: String| {
            if selected {
                Span::styled(format!("(•) {text}"), Style::default().green())
            } else {
                Span::styled(format!("( ) {text}"), Style::default().dim())
            }
        };

        match field {
            Field::NumSensors => vec![
                choice(self.num_sensors == 1, "1".into()),
                "  ".into(),
                choice(self.num_sensors == 2, "2".into()),
            ],
            Field::Gas1 | Field::Gas2 => {
                let index = if field == Field::Gas1 { 0 } else { 1 };
                Gas::ALL
                    .iter()
                    .flat_map(|gas| [choice(self.gas[index] == *gas, gas.to_string()), "  ".into()])
                    .collect()
            }
            Field::Submit => vec![Span::styled("[ Submit ]", Style::default().bold())],
            text => vec![Span::raw(
                self.input(text)
                    .map(|input| input.value().to_string())
                    .unwrap_or_default(),
            )],
        }
    }
}

impl Component for FormView {
    fn handle_key_events(&mut self, key: KeyEvent) -> Result<Option<Action>> {
        if !self.active {
            return Ok(None);
        }

        let field = self.focused();
        let action = match key.code {
            KeyCode::Tab | KeyCode::Down => {
                self.move_focus(true);
                None
            }
            KeyCode::BackTab | KeyCode::Up => {
                self.move_focus(false);
                None
            }
            KeyCode::Enter => self.submit(),
            KeyCode::Char(' ') | KeyCode::Left | KeyCode::Right if !field.is_text() => {
                self.toggle(field);
                None
            }
            KeyCode::Char(c) if !(c.is_ascii_digit() || c == '-') => None,
            KeyCode::Char(_)
            | KeyCode::Backspace
            | KeyCode::Delete
            | KeyCode::Left
            | KeyCode::Right
            | KeyCode::Home
            | KeyCode::End => {
                if let Some(input) = self.input_mut(field) {
                    input.handle_event(&CrosstermEvent::Key(key));
                }
                None
            }
            _ => None,
        };
        Ok(action)
    }

    fn update(&mut self, action: Action) -> Result<Option<Action>> {
        match action {
            Action::Submit(_) => self.active = false,
            Action::EnterForm => self.active = true,
            _ => {}
        }
        Ok(None)
    }

    fn draw(&mut self, f: &mut Frame<'_>, rect: Rect) -> Result<()> {
        if !self.active {
            return Ok(());
        }

        let area = centered(rect, 72, 16);
        let block = Block::default()
            .title("Please configure the dashboard")
            .title_alignment(Alignment::Left)
            .borders(Borders::ALL)
            .border_type(BorderType::Rounded);
        let inner = block.inner(area);
        f.render_widget(Clear, area);
        f.render_widget(block, area);

        let focused = self.focused();
        let mut lines: Vec<Line> = Vec::with_capacity(FIELDS.len() + 3);
        for field in FIELDS {
            let inactive_sensor =
                self.num_sensors == 1 && matches!(field, Field::Address2 | Field::Gas2);
            let mut label_style = Style::default();
            if field == focused {
                label_style = label_style.yellow().bold();
            } else if inactive_sensor {
                label_style = label_style.dim();
            }

            let mut spans = vec![Span::styled(
                format!("{:<width$}", field.label(), width = LABEL_WIDTH as usize),
                label_style,
            )];
            spans.extend(self.value_spans(field));
            lines.push(Line::from(spans));
        }

        lines.push(Line::default());
        if let Some(error) = &self.error {
            lines.push(Line::from(Span::styled(error.clone(), Style::default().red())));
        } else {
            lines.push(Line::default());
        }
        lines.push(Line::from(Span::styled(
            "Tab/↑↓ move · Space toggle · Enter submit · Esc quit",
            Style::default().dim(),
        )));

        f.render_widget(Paragraph::new(lines), inner);

        if let Some(input) = self.input(focused) {
            let row = self.focus as u16;
            let column = LABEL_WIDTH + input.visual_cursor() as u16;
            f.set_cursor_position((inner.x + column, inner.y + row));
        }

        Ok(())
    }
}

fn centered(rect: Rect, width: u16, height: u16) -> Rect {
    let width = width.min(rect.width);
    let height = height.min(rect.height);
    Rect::new(
        rect.x + (rect.width - width) / 2,
        rect.y + (rect.height - height) / 2,
        width,
        height,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::KeyModifiers;
    use pretty_assertions::assert_eq;

    fn defaults() -> DashboardSettings {
        DashboardSettings {
            date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            last_rows: 1,
            num_sensors: 1,
            sensors: [
                SensorSettings {
                    address: SensorAddress::new(1).unwrap(),
                    gas: Gas::Co2,
                },
                SensorSettings {
                    address: SensorAddress::new(2).unwrap(),
                    gas: Gas::Co2,
                },
            ],
        }
    }

    fn press(form: &mut FormView, code: KeyCode) -> Option<Action> {
        form.handle_key_events(KeyEvent::new(code, KeyModifiers::NONE))
            .unwrap()
    }

    #[test]
    fn submitting_defaults_yields_the_defaults() {
        let mut form = FormView::new(&defaults());
        let Some(Action::Submit(settings)) = press(&mut form, KeyCode::Enter) else {
            panic!("expected a submission");
        };
        assert_eq!(settings, defaults());
    }

    #[test]
    fn toggles_sensor_count_and_gas() {
        let mut form = FormView::new(&defaults());
        press(&mut form, KeyCode::Down);
        press(&mut form, KeyCode::Down);
        press(&mut form, KeyCode::Char(' '));
        for _ in 0..4 {
            press(&mut form, KeyCode::Down);
        }
        press(&mut form, KeyCode::Right);

        let Some(Action::Submit(settings)) = press(&mut form, KeyCode::Enter) else {
            panic!("expected a submission");
        };
        assert_eq!(settings.num_sensors, 2);
        assert_eq!(settings.sensors[1].gas, Gas::O2);
    }

    #[test]
    fn text_fields_accept_digits_only() {
        let mut form = FormView::new(&defaults());
        press(&mut form, KeyCode::Down);
        press(&mut form, KeyCode::Char('x'));
        press(&mut form, KeyCode::Char('5'));
        assert_eq!(form.last_rows.value(), "15");
    }

    #[test]
    fn invalid_input_blocks_submission() {
        let mut form = FormView::new(&defaults());
        press(&mut form, KeyCode::Down);
        press(&mut form, KeyCode::Backspace);
        press(&mut form, KeyCode::Char('0'));

        assert!(press(&mut form, KeyCode::Enter).is_none());
        assert!(form.error.as_deref().unwrap().contains("at least 1"));
    }

    #[test]
    fn form_hides_after_submission_and_returns() {
        let mut form = FormView::new(&defaults());
        form.update(Action::Submit(defaults())).unwrap();
        assert!(press(&mut form, KeyCode::Enter).is_none());
        form.update(Action::EnterForm).unwrap();
        assert!(press(&mut form, KeyCode::Enter).is_some());
    }

    #[test]
    fn second_address_is_only_checked_for_two_sensors() {
        let mut form = FormView::new(&defaults());
        for _ in 0..4 {
            press(&mut form, KeyCode::Down);
        }
        press(&mut form, KeyCode::Backspace);
        assert_eq!(form.address2.value(), "");

        let Some(Action::Submit(settings)) = press(&mut form, KeyCode::Enter) else {
            panic!("expected a submission");
        };
        assert_eq!(settings.num_sensors, 1);
        assert_eq!(settings.sensors[1].address, SensorAddress::new(2).unwrap());

        form.update(Action::EnterForm).unwrap();
        form.num_sensors = 2;
        assert!(press(&mut form, KeyCode::Enter).is_none());
        assert!(form.error.as_deref().unwrap().starts_with("Sensor2:"));
    }
}
