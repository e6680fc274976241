use std::sync::Arc;

use serde::{Deserialize, Serialize};
use strum::Display;

use crate::session::{DashboardSettings, Session};

#[derive(Debug, Clone, Serialize, Deserialize, Display)]
pub enum Action {
    Tick,
    Render,
    Resize(u16, u16),
    Suspend,
    Resume,
    Quit,
    /// A poll finished; the dashboard needs to be redrawn.
    Refresh,
    Error(String),
    /// The form was submitted with valid settings.
    #[serde(skip)]
    Submit(DashboardSettings),
    /// The initial fetch completed.
    #[serde(skip)]
    SessionStarted(Arc<Session>),
    /// Leave the dashboard and show the form again.
    EnterForm,
    Export,
    /// A message for the status line.
    Status(String),
}
