pub mod broadcast;
pub mod collaborators;
pub mod config;
pub mod converter;
pub mod db;
pub mod error;
pub mod pipeline;
pub mod queue;
pub mod sanitize;
pub mod secrets;
pub mod session;

pub use broadcast::{BroadcastHub, ChannelSink, ErrorDetails, EventSink, ProcessingEvent};
pub use config::{load_config, Config};
pub use converter::{ConversionOutput, Encoding, FeatureConverter};
pub use error::{CollaboratorError, ConfigError, ConvertError, QueueError, Result, TtpipeError};
pub use pipeline::{Collaborators, Pipeline, PipelineConfig, PipelineContext, Stage};
pub use queue::{JobHandler, JobQueue, MemoryJobQueue, PipelineJob};
pub use secrets::{CredentialCipher, SecretError, SecretSource};
pub use session::{Provider, SessionSettings, SessionStore};
