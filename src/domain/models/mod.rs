pub mod assessment;
pub mod config;
pub mod exam;
pub mod generation_job;
pub mod material;
pub mod question;
pub mod status;

pub use assessment::Assessment;
pub use config::{BackendConfig, Config, LoggingConfig, RealtimeConfig, SyncConfig};
pub use exam::Exam;
pub use generation_job::{GenerationJob, GenerationRequest, GenerationSpec};
pub use material::Material;
pub use question::{BloomLevel, Question, QuestionEdit, QuestionOption, QuestionSource};
pub use status::WorkStatus;
