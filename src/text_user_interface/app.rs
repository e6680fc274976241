use std::sync::Arc;

use chrono_tz::Tz;
use color_eyre::eyre::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use ratatui::prelude::Rect;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::Config;
use crate::session::{run_poller, DashboardSettings, Session};
use crate::source::HttpSource;

use super::components::dashboard::DashboardView;
use super::components::form::FormView;
use super::tui::Tui;
use super::{
    action::Action,
    components::Component,
    tui,
};

#[derive(Default, Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Mode {
    #[default]
    Form,
    Loading,
    Dashboard,
}

impl Mode {
    /// Whether `action` applies in this mode. A session that finishes loading
    /// after the user has left the loading screen is dropped.
    fn accepts(self, action: &Action) -> bool {
        match action {
            Action::Submit(_) => self == Mode::Form,
            Action::SessionStarted(_) => self == Mode::Loading,
            Action::Export => self == Mode::Dashboard,
            _ => true,
        }
    }
}

pub struct App {
    pub config: Config,
    pub time_zone: Tz,
    pub frame_rate: f64,
    pub tick_rate: f64,
    pub components: Vec<Box<dyn Component>>,
    pub should_quit: bool,
    pub should_suspend: bool,
    pub mode: Mode,
    source: Arc<HttpSource>,
    session: Option<Arc<Session>>,
    poller: Option<CancellationToken>,
}

impl App {
    pub fn new(
        config: Config,
        defaults: DashboardSettings,
        frame_rate: f64,
        tick_rate: f64,
    ) -> Result<Self> {
        let time_zone = config.time_zone()?;
        let source = HttpSource::new(
            config.base_url.clone(),
            config.timeout(),
            time_zone,
            config.retention,
        )?;

        let form = FormView::new(&defaults);
        let dashboard = DashboardView::new(time_zone);

        Ok(Self {
            config,
            time_zone,
            frame_rate,
            tick_rate,
            components: vec![Box::new(form), Box::new(dashboard)],
            should_quit: false,
            should_suspend: false,
            mode: Mode::Form,
            source: Arc::new(source),
            session: None,
            poller: None,
        })
    }

    pub async fn run(&mut self) -> Result<()> {
        let (action_tx, mut action_rx) = mpsc::unbounded_channel();

        let mut tui = Tui::new()?;
        tui.tick_rate(self.tick_rate);
        tui.frame_rate(self.frame_rate);
        tui.enter()?;

        for component in self.components.iter_mut() {
            component.register_action_handler(action_tx.clone())?;
        }

        for component in self.components.iter_mut() {
            component.init()?;
        }

        loop {
            if let Some(e) = tui.next().await {
                match e {
                    tui::Event::Quit => action_tx.send(Action::Quit)?,
                    tui::Event::Tick => action_tx.send(Action::Tick)?,
                    tui::Event::Render => action_tx.send(Action::Render)?,
                    tui::Event::Resize(x, y) => action_tx.send(Action::Resize(x, y))?,
                    tui::Event::Key(key) => {
                        if key == KeyEvent::from(KeyCode::Char('q'))
                            || key == KeyEvent::from(KeyCode::Esc)
                            || key == KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL)
                        {
                            action_tx.send(Action::Quit)?;
                        } else if key == KeyEvent::new(KeyCode::Char('z'), KeyModifiers::CONTROL) {
                            action_tx.send(Action::Suspend)?;
                        }
                    }
                    _ => {}
                }
                for component in self.components.iter_mut() {
                    if let Some(action) = component.handle_events(Some(e.clone()))? {
                        action_tx.send(action)?;
                    }
                }
            }

            while let Ok(action) = action_rx.try_recv() {
                if !matches!(action, Action::Tick | Action::Render) {
                    debug!("{action}");
                }
                if !self.mode.accepts(&action) {
                    debug!("Ignoring {action} in {:?} mode", self.mode);
                    continue;
                }

                match &action {
                    Action::Quit => self.should_quit = true,
                    Action::Suspend => self.should_suspend = true,
                    Action::Resume => self.should_suspend = false,
                    Action::Resize(w, h) => {
                        tui.resize(Rect::new(0, 0, *w, *h))?;
                        self.draw_components(&action_tx, &mut tui)?;
                    }
                    Action::Render | Action::Refresh => {
                        self.draw_components(&action_tx, &mut tui)?;
                    }
                    Action::Submit(settings) => {
                        self.mode = Mode::Loading;
                        self.start_session(settings.clone(), action_tx.clone());
                    }
                    Action::SessionStarted(session) => {
                        self.mode = Mode::Dashboard;
                        self.start_polling(session.clone(), action_tx.clone());
                    }
                    Action::EnterForm => {
                        self.mode = Mode::Form;
                        self.stop_polling();
                    }
                    Action::Export => self.export(&action_tx)?,
                    _ => {}
                }

                for component in self.components.iter_mut() {
                    if let Some(action) = component.update(action.clone())? {
                        action_tx.send(action)?
                    };
                }
            }

            if self.should_suspend {
                tui.suspend()?;
                action_tx.send(Action::Resume)?;
                tui = Tui::new()?;
                tui.tick_rate(self.tick_rate);
                tui.frame_rate(self.frame_rate);
                tui.enter()?;
            } else if self.should_quit {
                self.stop_polling();
                tui.stop()?;
                break;
            }
        }
        tui.exit()?;
        Ok(())
    }

    /// Runs the initial fetch in the background and reports the new session.
    fn start_session(&mut self, settings: DashboardSettings, action_tx: UnboundedSender<Action>) {
        self.stop_polling();
        self.session = None;

        let source = self.source.clone();
        tokio::spawn(async move {
            let session = Session::start(source.as_ref(), settings).await;
            action_tx.send(Action::SessionStarted(Arc::new(session))).ok();
        });
    }

    fn start_polling(&mut self, session: Arc<Session>, action_tx: UnboundedSender<Action>) {
        self.stop_polling();

        let cancel = CancellationToken::new();
        self.poller = Some(cancel.clone());
        self.session = Some(session.clone());

        let source = self.source.clone();
        let period = self.config.poll_interval();
        tokio::spawn(run_poller(session, source, period, cancel, move || {
            action_tx.send(Action::Refresh).ok();
        }));
    }

    fn stop_polling(&mut self) {
        if let Some(cancel) = self.poller.take() {
            info!("Stopping the poller");
            cancel.cancel();
        }
    }

    #[cfg(feature = "export")]
    fn export(&self, action_tx: &UnboundedSender<Action>) -> Result<()> {
        let Some(session) = &self.session else {
            return Ok(());
        };
        let status = match crate::export::export_session(
            session,
            self.time_zone,
            &self.config.export_dir(),
        ) {
            Ok(files) => format!(
                "Exported {} files to {}",
                files.len(),
                self.config.export_dir().display()
            ),
            Err(e) => format!("Export failed: {e}"),
        };
        action_tx.send(Action::Status(status))?;
        Ok(())
    }

    #[cfg(not(feature = "export"))]
    fn export(&self, action_tx: &UnboundedSender<Action>) -> Result<()> {
        action_tx.send(Action::Status(String::from(
            "Export is not available in this build",
        )))?;
        Ok(())
    }

    fn draw_components(
        &mut self,
        action_tx: &UnboundedSender<Action>,
        tui: &mut Tui,
    ) -> Result<()> {
        tui.draw(|f| {
            for component in self.components.iter_mut() {
                let r = component.draw(f, f.area());
                if let Err(e) = r {
                    action_tx
                        .send(Action::Error(format!("Failed to draw: {:?}", e)))
                        .ok();
                }
            }
        })?;
        Ok(())
    }
}
