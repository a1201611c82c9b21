pub mod autosave;
pub mod buffer;
pub mod clock;
pub mod config;
pub mod coordinator;
pub mod editor;
pub mod error;
pub mod gateway;
pub mod logging;
pub mod model;
pub mod navigation;
pub mod retry;
pub mod session;
pub mod state;
pub mod store;
pub mod supply;
pub mod tui;
pub mod ui;

pub use error::{GatewayError, SessionError};
pub use gateway::PersistenceGateway;
pub use model::{Attempt, AutosaveStatus, Question, QuestionKind, SessionEvent, SubmissionState};
pub use session::{AttemptSession, SessionView};
